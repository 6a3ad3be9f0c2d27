//! Purpose: Load and save whole graphs as JSON documents.
//! Exports: `GraphStore`, `JsonStore`, `GraphDoc`, `NodeDoc`.
//! Role: Persistence collaborator behind `vpp_load_file` and every mutation.
//! Invariants: Saving writes the full graph under an exclusive advisory lock.
//! Invariants: Only writable properties are written; links are written by value.
//! Invariants: Unknown node kinds or tool types are `Corrupt`, never skipped.
//! Invariants: A save that could not be loaded back (cycles, unknown nodes) fails instead.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::rc::Rc;

use fs2::FileExt;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::convert::convert_literal;
use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{Named, Node, NodeRef, Value, node_ref};
use crate::core::path::find_property;
use crate::core::registry::node_display_name;
use crate::model::catalog::{container_kind, find_tool_def};
use crate::model::nodes::{
    CogJob, CogJobManager, IMAGE_TYPE, Image, TOOL_BLOCK_TYPE, TOOL_GROUP_TYPE, ToolGroup,
};
use crate::model::tool::Tool;

pub const GRAPH_FORMAT: &str = "vpp-driver-graph";
pub const GRAPH_VERSION: u32 = 1;

/// Loads a graph root from a path and writes it back.
pub trait GraphStore {
    fn load(&self, path: &Path) -> Result<NodeRef, Error>;
    fn save(&self, root: &NodeRef, path: &Path) -> Result<(), Error>;
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GraphDoc {
    pub format: String,
    pub version: u32,
    pub root: NodeDoc,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeDoc {
    JobManager {
        #[serde(default)]
        jobs: Vec<NodeDoc>,
    },
    Job {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        vision_tool: Option<Box<NodeDoc>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        job_script: Option<String>,
    },
    ToolGroup {
        name: String,
        #[serde(default)]
        script: String,
        #[serde(default)]
        tools: Vec<NodeDoc>,
    },
    ToolBlock {
        name: String,
        #[serde(default)]
        script: String,
        #[serde(default)]
        tools: Vec<NodeDoc>,
    },
    Tool {
        #[serde(rename = "type")]
        type_name: String,
        name: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        properties: BTreeMap<String, ValueDoc>,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        run_params: BTreeMap<String, ValueDoc>,
    },
    Image {
        width: i64,
        height: i64,
    },
}

/// A stored property value: canonical literal text or an image by value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueDoc {
    Literal(String),
    Image { width: i64, height: i64 },
}

#[derive(Clone, Copy, Debug, Default)]
pub struct JsonStore;

impl JsonStore {
    pub fn new() -> Self {
        Self
    }
}

impl GraphStore for JsonStore {
    fn load(&self, path: &Path) -> Result<NodeRef, Error> {
        let file = File::open(path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message("failed to open graph file")
                .with_path(path)
                .with_source(err)
        })?;
        let doc: GraphDoc = serde_json::from_reader(BufReader::new(file)).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("graph file is not a valid graph document")
                .with_path(path)
                .with_source(err)
        })?;
        if doc.format != GRAPH_FORMAT || doc.version != GRAPH_VERSION {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message(format!(
                    "unsupported graph format '{}' v{}",
                    doc.format, doc.version
                ))
                .with_path(path));
        }
        build_node(&doc.root).map_err(|err| err.with_path(path))
    }

    fn save(&self, root: &NodeRef, path: &Path) -> Result<(), Error> {
        let doc = GraphDoc {
            format: GRAPH_FORMAT.to_string(),
            version: GRAPH_VERSION,
            root: capture_node(root).map_err(|err| err.with_path(path))?,
        };
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(persistence(path, "failed to open graph file for writing"))?;
        let _lock =
            SaveLock::acquire(&file).map_err(persistence(path, "failed to lock graph file"))?;
        file.set_len(0)
            .map_err(persistence(path, "failed to truncate graph file"))?;

        let mut writer = BufWriter::new(&file);
        serde_json::to_writer_pretty(&mut writer, &doc).map_err(|err| {
            Error::new(ErrorKind::Persistence)
                .with_message("failed to encode graph document")
                .with_path(path)
                .with_source(err)
        })?;
        writer
            .write_all(b"\n")
            .map_err(persistence(path, "failed to write graph file"))?;
        writer
            .flush()
            .map_err(persistence(path, "failed to flush graph file"))?;
        debug!(path = %path.display(), "graph saved");
        Ok(())
    }
}

fn persistence<'a>(
    path: &'a Path,
    message: &'static str,
) -> impl FnOnce(io::Error) -> Error + 'a {
    move |err| {
        Error::new(ErrorKind::Persistence)
            .with_message(message)
            .with_path(path)
            .with_source(err)
    }
}

struct SaveLock<'a> {
    file: &'a File,
}

impl<'a> SaveLock<'a> {
    fn acquire(file: &'a File) -> io::Result<Self> {
        file.lock_exclusive()?;
        Ok(Self { file })
    }
}

impl Drop for SaveLock<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// Snapshot of a node and everything under it, read through capabilities.
///
/// Nodes shared between two places are written once per place. A node that
/// contains itself, or a node kind the codec cannot rebuild, is refused so a
/// save never produces a file that fails to load.
pub fn capture_node(node: &NodeRef) -> Result<NodeDoc, Error> {
    let mut ancestors = Vec::new();
    capture(node, &mut ancestors)
}

fn capture(node: &NodeRef, ancestors: &mut Vec<*const ()>) -> Result<NodeDoc, Error> {
    let key = Rc::as_ptr(node).cast::<()>();
    if ancestors.contains(&key) {
        return Err(Error::new(ErrorKind::Persistence).with_message(format!(
            "graph contains a cycle through '{}'",
            node_display_name(node)
        )));
    }
    ancestors.push(key);
    let doc = capture_shape(node, ancestors);
    ancestors.pop();
    doc
}

fn capture_shape(node: &NodeRef, ancestors: &mut Vec<*const ()>) -> Result<NodeDoc, Error> {
    let borrowed = node.borrow();
    if let Some(manager) = borrowed.as_job_manager() {
        let jobs = (0..manager.job_count())
            .filter_map(|index| manager.job(index))
            .map(|job| capture(&job, ancestors))
            .collect::<Result<_, _>>()?;
        return Ok(NodeDoc::JobManager { jobs });
    }
    if let Some(job) = borrowed.as_job() {
        let job_script = borrowed
            .get("JobScript")
            .ok()
            .and_then(|script| script.as_node().cloned())
            .and_then(|script| script.borrow().get("Source").ok())
            .and_then(|source| source.literal_text());
        let vision_tool = match job.vision_tool() {
            Some(slot) => Some(Box::new(capture(&slot, ancestors)?)),
            None => None,
        };
        return Ok(NodeDoc::Job {
            name: node_display_name(node),
            vision_tool,
            job_script,
        });
    }
    if let Some(container) = borrowed.as_tool_container() {
        let name = node_display_name(node);
        let script = borrowed
            .as_script_host()
            .and_then(|host| host.script_source())
            .unwrap_or_default();
        let tools = container
            .tools()
            .iter()
            .map(|tool| capture(tool, ancestors))
            .collect::<Result<_, _>>()?;
        return Ok(if borrowed.type_name() == TOOL_BLOCK_TYPE {
            NodeDoc::ToolBlock {
                name,
                script,
                tools,
            }
        } else {
            NodeDoc::ToolGroup {
                name,
                script,
                tools,
            }
        });
    }
    if borrowed.type_name() == IMAGE_TYPE {
        return match image_size(&*borrowed) {
            Some((width, height)) => Ok(NodeDoc::Image { width, height }),
            None => Err(unsavable(borrowed.type_name())),
        };
    }
    if find_tool_def(borrowed.type_name()).is_none() {
        return Err(unsavable(borrowed.type_name()));
    }

    let run_params = borrowed
        .get("RunParams")
        .ok()
        .and_then(|params| params.as_node().cloned())
        .map(|params| capture_properties(&params))
        .unwrap_or_default();
    Ok(NodeDoc::Tool {
        type_name: borrowed.type_name().to_string(),
        name: node_display_name(node),
        properties: capture_properties(node),
        run_params,
    })
}

fn unsavable(type_name: &str) -> Error {
    Error::new(ErrorKind::Persistence)
        .with_message(format!("nodes of type '{type_name}' cannot be saved in a graph document"))
}

fn image_size(node: &dyn Node) -> Option<(i64, i64)> {
    let dimension = |name: &str| match node.get(name) {
        Ok(Value::Int(size)) => Some(size),
        _ => None,
    };
    Some((dimension("Width")?, dimension("Height")?))
}

fn capture_properties(node: &NodeRef) -> BTreeMap<String, ValueDoc> {
    let borrowed = node.borrow();
    borrowed
        .properties()
        .into_iter()
        .filter(|property| property.writable && property.name != "Name")
        .filter_map(|property| {
            let value = borrowed.get(&property.name).ok()?;
            capture_value(&value).map(|doc| (property.name, doc))
        })
        .collect()
}

fn capture_value(value: &Value) -> Option<ValueDoc> {
    if let Some(text) = value.literal_text() {
        return (!value.is_null()).then_some(ValueDoc::Literal(text));
    }
    let node = value.as_node()?.borrow();
    if node.type_name() != IMAGE_TYPE {
        return None;
    }
    let (width, height) = image_size(&*node)?;
    Some(ValueDoc::Image { width, height })
}

/// Rebuilds a live node from its document.
pub fn build_node(doc: &NodeDoc) -> Result<NodeRef, Error> {
    match doc {
        NodeDoc::JobManager { jobs } => {
            let mut manager = CogJobManager::new();
            for job in jobs {
                manager = manager.with_job(build_node(job)?);
            }
            Ok(node_ref(manager))
        }
        NodeDoc::Job {
            name,
            vision_tool,
            job_script,
        } => {
            let mut job = CogJob::new(name.clone());
            if let Some(slot) = vision_tool {
                job = job.with_vision_tool(build_node(slot)?);
            }
            if let Some(source) = job_script {
                job = job.with_job_script(source.clone());
            }
            Ok(node_ref(job))
        }
        NodeDoc::ToolGroup {
            name,
            script,
            tools,
        } => build_container(TOOL_GROUP_TYPE, name, script, tools),
        NodeDoc::ToolBlock {
            name,
            script,
            tools,
        } => build_container(TOOL_BLOCK_TYPE, name, script, tools),
        NodeDoc::Tool {
            type_name,
            name,
            properties,
            run_params,
        } => {
            let def = find_tool_def(type_name).ok_or_else(|| {
                Error::new(ErrorKind::Corrupt)
                    .with_message(format!("unknown tool type '{type_name}' in graph document"))
            })?;
            let mut tool = Tool::new(def);
            tool.set_name(name);
            let tool = node_ref(tool);
            restore_properties(&tool, properties)?;
            if !run_params.is_empty() {
                let params = tool
                    .borrow()
                    .get("RunParams")
                    .ok()
                    .and_then(|params| params.as_node().cloned())
                    .ok_or_else(|| {
                        Error::new(ErrorKind::Corrupt)
                            .with_message(format!("tool type '{type_name}' has no RunParams"))
                    })?;
                restore_properties(&params, run_params)?;
            }
            Ok(tool)
        }
        NodeDoc::Image { width, height } => Ok(node_ref(Image::new(*width, *height))),
    }
}

fn build_container(
    type_name: &str,
    name: &str,
    script: &str,
    tools: &[NodeDoc],
) -> Result<NodeRef, Error> {
    let kind = container_kind(type_name).ok_or_else(|| {
        Error::new(ErrorKind::Corrupt).with_message(format!("'{type_name}' is not a container"))
    })?;
    let container = node_ref(ToolGroup::new(kind, name).with_script(script));
    for tool in tools {
        let child = build_node(tool)?;
        if let Some(target) = container.borrow_mut().as_tool_container_mut() {
            target.add_tool(child);
        }
    }
    Ok(container)
}

fn restore_properties(node: &NodeRef, values: &BTreeMap<String, ValueDoc>) -> Result<(), Error> {
    for (name, doc) in values {
        let property = find_property(node, name).ok_or_else(|| {
            Error::new(ErrorKind::Corrupt).with_message(format!(
                "property '{name}' does not exist on {}",
                node.borrow().type_name()
            ))
        })?;
        let value = match doc {
            ValueDoc::Literal(raw) => convert_literal(raw, &property.ty).map_err(|err| {
                Error::new(ErrorKind::Corrupt)
                    .with_message(format!("bad value for '{name}'"))
                    .with_source(err)
            })?,
            ValueDoc::Image { width, height } => Value::Node(node_ref(Image::new(*width, *height))),
        };
        node.borrow_mut().set(&property.name, value)?;
    }
    Ok(())
}
