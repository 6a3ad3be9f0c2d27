//! Purpose: Own the loaded graph and sequence the engine's operations over it.
//! Exports: `Session`, `LoadedGraph`, `Created`.
//! Role: State behind every `vpp_*` tool; one instance per driver process.
//! Invariants: Graph, origin path and registry change together, and only on a successful load.
//! Invariants: Every successful mutation is followed by exactly one full-graph save.
//! Invariants: Node names are looked up case-insensitively through the registry.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{NodeRef, Value};
use crate::core::inspect::{self, DEFAULT_MAX_DEPTH};
use crate::core::mutate::{self, Assigned};
use crate::core::path;
use crate::core::registry::{Registry, node_display_name};
use crate::core::typeres::TypeResolver;
use crate::store::GraphStore;

pub struct LoadedGraph {
    pub root: NodeRef,
    pub path: PathBuf,
}

/// Outcome of a successful `create_tool`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Created {
    pub name: String,
    pub type_name: String,
    pub parent: String,
}

pub struct Session {
    store: Box<dyn GraphStore>,
    resolver: TypeResolver,
    graph: Option<LoadedGraph>,
    registry: Registry,
}

impl Session {
    pub fn new(store: impl GraphStore + 'static, resolver: TypeResolver) -> Self {
        Self {
            store: Box::new(store),
            resolver,
            graph: None,
            registry: Registry::new(),
        }
    }

    pub fn graph(&self) -> Option<&LoadedGraph> {
        self.graph.as_ref()
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn resolver(&self) -> &TypeResolver {
        &self.resolver
    }

    /// Loads `path`, replacing the current graph. Returns the number of indexed nodes.
    pub fn load_file(&mut self, path: &Path) -> Result<usize, Error> {
        let root = self.store.load(path)?;
        let mut registry = Registry::new();
        registry.rebuild(&root);
        self.graph = Some(LoadedGraph {
            root,
            path: path.to_path_buf(),
        });
        self.registry = registry;
        info!(path = %path.display(), nodes = self.registry.len(), "graph loaded");
        Ok(self.registry.len())
    }

    /// `(name, runtime type)` for every indexed node, in discovery order.
    pub fn list_tools(&self) -> Vec<(String, String)> {
        self.registry
            .iter()
            .map(|(name, node)| (name.to_string(), node.borrow().type_name().to_string()))
            .collect()
    }

    pub fn find_tool(&self, name: &str) -> Result<NodeRef, Error> {
        self.registry.lookup(name).ok_or_else(|| {
            Error::new(ErrorKind::NodeNotFound).with_message(format!("Tool '{name}' not found."))
        })
    }

    /// Text view of the value at `path`: `null`, a literal, or a structure report.
    pub fn get_property(&self, tool: &str, path: &str) -> Result<String, Error> {
        let node = self.find_tool(tool)?;
        let value = path::resolve(&node, path)?.read()?;
        Ok(match &value {
            Value::Node(object) => inspect::dump(object, DEFAULT_MAX_DEPTH),
            other => other.literal_text().unwrap_or_default(),
        })
    }

    pub fn set_property(&mut self, tool: &str, path: &str, raw: &str) -> Result<Assigned, Error> {
        let node = self.find_tool(tool)?;
        let target = path::resolve(&node, path)?;
        mutate::set(&self.registry, &target, path, raw, || self.persist())
    }

    /// Script source of `tool`; `None` when it has no script support or the source is blank.
    pub fn extract_script(&self, tool: &str) -> Result<Option<String>, Error> {
        let host = self.find_tool(tool)?;
        let source = host
            .borrow()
            .as_script_host()
            .and_then(|script| script.script_source());
        Ok(source.filter(|text| !text.trim().is_empty()))
    }

    pub fn inject_script(&mut self, tool: &str, code: &str) -> Result<(), Error> {
        let host = self.find_tool(tool)?;
        {
            let mut borrowed = host.borrow_mut();
            let script = borrowed.as_script_host_mut().ok_or_else(|| {
                Error::new(ErrorKind::NoScriptSupport)
                    .with_message("No script support found on this host.")
            })?;
            script.set_script_source(code.to_string())?;
        }
        debug!(tool, bytes = code.len(), "script injected");
        self.persist()
    }

    /// Constructs `type_id` inside `parent`, names it, indexes it and saves.
    pub fn create_tool(
        &mut self,
        parent: &str,
        type_id: &str,
        name: Option<&str>,
    ) -> Result<Created, Error> {
        let container = self
            .registry
            .lookup(parent)
            .and_then(|node| tool_collection_of(&node))
            .ok_or_else(|| {
                Error::new(ErrorKind::ContainerInvalid)
                    .with_message("Parent is not a valid container (Block, Group, or Job).")
            })?;

        let ty = self.resolver.resolve(type_id)?;
        let created = ty.construct();
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            let mut borrowed = created.borrow_mut();
            let named = borrowed.as_named_mut().ok_or_else(|| {
                Error::new(ErrorKind::ContainerInvalid).with_message(format!(
                    "Type '{}' cannot be placed in a tool collection.",
                    ty.short_name()
                ))
            })?;
            named.set_name(name);
        }

        if let Some(target) = container.borrow_mut().as_tool_container_mut() {
            target.add_tool(created.clone());
        }
        let created_name = node_display_name(&created);
        self.registry.insert(&created_name, created);
        info!(name = %created_name, ty = ty.short_name(), parent, "tool created");

        self.persist()?;
        Ok(Created {
            name: created_name,
            type_name: ty.short_name().to_string(),
            parent: parent.to_string(),
        })
    }

    fn persist(&self) -> Result<(), Error> {
        let graph = self.graph.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::NoGraph).with_message("No graph loaded; nothing to save.")
        })?;
        self.store.save(&graph.root, &graph.path)
    }
}

/// The node whose tool collection receives new children. A job with an empty
/// slot gets a default tool group installed first.
fn tool_collection_of(node: &NodeRef) -> Option<NodeRef> {
    if node.borrow().as_tool_container().is_some() {
        return Some(node.clone());
    }
    let slot = node.borrow_mut().as_job_mut()?.vision_tool_or_default();
    let is_container = slot.borrow().as_tool_container().is_some();
    is_container.then_some(slot)
}
