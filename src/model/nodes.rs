//! Purpose: Structural nodes of the reference graph.
//! Exports: `CogJobManager`, `CogJob`, `ToolGroup`, `Script`, `Image`, `NodeList`, type names.
//! Role: Everything in a graph that is not a parameterised leaf tool.
//! Invariants: A job's `VisionTool` slot only ever holds a tool or a tool container.
//! Invariants: Collections are read-only; children are added through `ToolContainer`.
use std::cell::RefCell;
use std::rc::Rc;

use crate::core::error::{Error, ErrorKind};
use crate::core::graph::{
    Indexable, Iterable, Job, JobManager, Named, Node, NodeRef, PropertyInfo, PropertyType,
    ScriptHost, ToolContainer, Value, mismatched_value, read_only_property, unknown_property,
};
use crate::model::share;

pub const JOB_MANAGER_TYPE: &str = "CogJobManager";
pub const JOB_TYPE: &str = "CogJob";
pub const TOOL_GROUP_TYPE: &str = "CogToolGroup";
pub const TOOL_BLOCK_TYPE: &str = "CogToolBlock";
pub const SCRIPT_TYPE: &str = "CogScript";
pub const IMAGE_TYPE: &str = "CogImage";
pub const TOOL_COLLECTION_TYPE: &str = "CogToolCollection";
pub const JOB_COLLECTION_TYPE: &str = "CogJobCollection";

/// Ordered collection reachable by index and by iteration.
pub struct NodeList {
    type_name: &'static str,
    items: Vec<NodeRef>,
}

impl NodeList {
    pub fn new(type_name: &'static str) -> Self {
        Self {
            type_name,
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, node: NodeRef) {
        self.items.push(node);
    }

    pub fn nodes(&self) -> &[NodeRef] {
        &self.items
    }
}

impl Node for NodeList {
    fn type_name(&self) -> &str {
        self.type_name
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![PropertyInfo::new("Count", PropertyType::Int, false)]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Count" => Ok(Value::Int(self.items.len() as i64)),
            _ => Err(unknown_property(self.type_name, property)),
        }
    }

    fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
        match property {
            "Count" => Err(read_only_property(self.type_name, property)),
            _ => Err(unknown_property(self.type_name, property)),
        }
    }

    fn as_indexable(&self) -> Option<&dyn Indexable> {
        Some(self)
    }

    fn as_iterable(&self) -> Option<&dyn Iterable> {
        Some(self)
    }
}

impl Indexable for NodeList {
    fn len(&self) -> usize {
        self.items.len()
    }

    fn item(&self, index: usize) -> Option<Value> {
        self.items.get(index).cloned().map(Value::Node)
    }
}

impl Iterable for NodeList {
    fn items(&self) -> Box<dyn Iterator<Item = Value> + '_> {
        Box::new(self.items.iter().cloned().map(Value::Node))
    }
}

/// Script support attached to tool groups, tool blocks and jobs.
#[derive(Default)]
pub struct Script {
    source: String,
}

impl Script {
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

impl Node for Script {
    fn type_name(&self) -> &str {
        SCRIPT_TYPE
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![PropertyInfo::new("Source", PropertyType::Text, true)]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Source" => Ok(Value::Text(self.source.clone())),
            _ => Err(unknown_property(SCRIPT_TYPE, property)),
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
        match (property, value) {
            ("Source", Value::Text(source)) => {
                self.source = source;
                Ok(())
            }
            ("Source", other) => Err(mismatched_value(
                &PropertyInfo::new("Source", PropertyType::Text, true),
                &other,
            )),
            _ => Err(unknown_property(SCRIPT_TYPE, property)),
        }
    }
}

/// Placeholder image; pixel data is out of scope.
pub struct Image {
    width: i64,
    height: i64,
}

impl Image {
    pub fn new(width: i64, height: i64) -> Self {
        Self { width, height }
    }
}

impl Node for Image {
    fn type_name(&self) -> &str {
        IMAGE_TYPE
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![
            PropertyInfo::new("Height", PropertyType::Int, false),
            PropertyInfo::new("Width", PropertyType::Int, false),
        ]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Width" => Ok(Value::Int(self.width)),
            "Height" => Ok(Value::Int(self.height)),
            _ => Err(unknown_property(IMAGE_TYPE, property)),
        }
    }

    fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
        match property {
            "Width" | "Height" => Err(read_only_property(IMAGE_TYPE, property)),
            _ => Err(unknown_property(IMAGE_TYPE, property)),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContainerKind {
    Group,
    Block,
}

impl ContainerKind {
    pub fn type_name(self) -> &'static str {
        match self {
            ContainerKind::Group => TOOL_GROUP_TYPE,
            ContainerKind::Block => TOOL_BLOCK_TYPE,
        }
    }
}

/// Tool group or tool block: named, holds child tools and a script.
pub struct ToolGroup {
    kind: ContainerKind,
    name: String,
    tools: Rc<RefCell<NodeList>>,
    script: Rc<RefCell<Script>>,
}

impl ToolGroup {
    pub fn new(kind: ContainerKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            tools: Rc::new(RefCell::new(NodeList::new(TOOL_COLLECTION_TYPE))),
            script: Rc::new(RefCell::new(Script::default())),
        }
    }

    pub fn with_script(self, source: impl Into<String>) -> Self {
        *self.script.borrow_mut() = Script::with_source(source);
        self
    }

    pub fn kind(&self) -> ContainerKind {
        self.kind
    }
}

impl Node for ToolGroup {
    fn type_name(&self) -> &str {
        self.kind.type_name()
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![
            PropertyInfo::new("Name", PropertyType::Text, true),
            PropertyInfo::new(
                "Tools",
                PropertyType::Object(TOOL_COLLECTION_TYPE.to_string()),
                false,
            ),
            PropertyInfo::new("Script", PropertyType::Object(SCRIPT_TYPE.to_string()), false),
        ]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Name" => Ok(Value::Text(self.name.clone())),
            "Tools" => Ok(Value::Node(share(&self.tools))),
            "Script" => Ok(Value::Node(share(&self.script))),
            _ => Err(unknown_property(self.kind.type_name(), property)),
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
        match (property, value) {
            ("Name", Value::Text(name)) => {
                self.name = name;
                Ok(())
            }
            ("Name", other) => Err(mismatched_value(
                &PropertyInfo::new("Name", PropertyType::Text, true),
                &other,
            )),
            ("Tools" | "Script", _) => Err(read_only_property(self.kind.type_name(), property)),
            _ => Err(unknown_property(self.kind.type_name(), property)),
        }
    }

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }

    fn as_named_mut(&mut self) -> Option<&mut dyn Named> {
        Some(self)
    }

    fn as_tool_container(&self) -> Option<&dyn ToolContainer> {
        Some(self)
    }

    fn as_tool_container_mut(&mut self) -> Option<&mut dyn ToolContainer> {
        Some(self)
    }

    fn as_script_host(&self) -> Option<&dyn ScriptHost> {
        Some(self)
    }

    fn as_script_host_mut(&mut self) -> Option<&mut dyn ScriptHost> {
        Some(self)
    }
}

impl Named for ToolGroup {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

impl ToolContainer for ToolGroup {
    fn tools(&self) -> Vec<NodeRef> {
        self.tools.borrow().nodes().to_vec()
    }

    fn add_tool(&mut self, tool: NodeRef) {
        self.tools.borrow_mut().push(tool);
    }
}

impl ScriptHost for ToolGroup {
    fn script_source(&self) -> Option<String> {
        Some(self.script.borrow().source().to_string())
    }

    fn set_script_source(&mut self, source: String) -> Result<(), Error> {
        self.script.borrow_mut().source = source;
        Ok(())
    }
}

/// A job: named, one visual-processing slot, optional job script.
pub struct CogJob {
    name: String,
    vision_tool: Option<NodeRef>,
    job_script: Option<Rc<RefCell<Script>>>,
}

impl CogJob {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vision_tool: None,
            job_script: None,
        }
    }

    pub fn with_vision_tool(mut self, tool: NodeRef) -> Self {
        self.vision_tool = Some(tool);
        self
    }

    pub fn with_job_script(mut self, source: impl Into<String>) -> Self {
        self.job_script = Some(Rc::new(RefCell::new(Script::with_source(source))));
        self
    }

    pub fn job_script(&self) -> Option<String> {
        self.job_script
            .as_ref()
            .map(|script| script.borrow().source().to_string())
    }

    /// The slot contents when they carry script support (tool groups and blocks).
    fn slot_script_host(&self) -> Option<NodeRef> {
        self.vision_tool.clone().filter(|slot| {
            let slot = slot.borrow();
            slot.as_tool_container().is_some() && slot.as_script_host().is_some()
        })
    }
}

impl Node for CogJob {
    fn type_name(&self) -> &str {
        JOB_TYPE
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![
            PropertyInfo::new("Name", PropertyType::Text, true),
            PropertyInfo::new("VisionTool", PropertyType::Object("Object".to_string()), true),
            PropertyInfo::new("JobScript", PropertyType::Object(SCRIPT_TYPE.to_string()), false),
        ]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "Name" => Ok(Value::Text(self.name.clone())),
            "VisionTool" => Ok(self.vision_tool.clone().map(Value::Node).unwrap_or(Value::Null)),
            "JobScript" => Ok(self
                .job_script
                .as_ref()
                .map(|script| Value::Node(share(script)))
                .unwrap_or(Value::Null)),
            _ => Err(unknown_property(JOB_TYPE, property)),
        }
    }

    fn set(&mut self, property: &str, value: Value) -> Result<(), Error> {
        match (property, value) {
            ("Name", Value::Text(name)) => {
                self.name = name;
                Ok(())
            }
            ("VisionTool", Value::Node(node)) => {
                check_slot_candidate(&node)?;
                self.vision_tool = Some(node);
                Ok(())
            }
            ("VisionTool", Value::Null) => {
                self.vision_tool = None;
                Ok(())
            }
            ("JobScript", _) => Err(read_only_property(JOB_TYPE, property)),
            (name @ ("Name" | "VisionTool"), other) => {
                let info = self
                    .properties()
                    .into_iter()
                    .find(|info| info.name == name)
                    .ok_or_else(|| unknown_property(JOB_TYPE, name))?;
                Err(mismatched_value(&info, &other))
            }
            _ => Err(unknown_property(JOB_TYPE, property)),
        }
    }

    fn as_named(&self) -> Option<&dyn Named> {
        Some(self)
    }

    fn as_named_mut(&mut self) -> Option<&mut dyn Named> {
        Some(self)
    }

    fn as_job(&self) -> Option<&dyn Job> {
        Some(self)
    }

    fn as_job_mut(&mut self) -> Option<&mut dyn Job> {
        Some(self)
    }

    fn as_script_host(&self) -> Option<&dyn ScriptHost> {
        Some(self)
    }

    fn as_script_host_mut(&mut self) -> Option<&mut dyn ScriptHost> {
        Some(self)
    }
}

/// A job slot holds a tool or a tool container, never a job, a manager or a
/// plain value such as an image.
fn check_slot_candidate(node: &NodeRef) -> Result<(), Error> {
    // The job being assigned to is mutably borrowed for the duration of `set`.
    let Ok(candidate) = node.try_borrow() else {
        return Err(Error::new(ErrorKind::ContainerInvalid)
            .with_message("A job cannot hold itself in its VisionTool slot."));
    };
    let is_structural = candidate.as_job().is_some() || candidate.as_job_manager().is_some();
    let is_tool = candidate.as_tool_container().is_some() || candidate.as_named().is_some();
    if is_structural || !is_tool {
        return Err(Error::new(ErrorKind::ContainerInvalid).with_message(format!(
            "VisionTool only accepts tools, tool groups or tool blocks, not {}.",
            candidate.type_name()
        )));
    }
    Ok(())
}

impl Named for CogJob {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

impl Job for CogJob {
    fn vision_tool(&self) -> Option<NodeRef> {
        self.vision_tool.clone()
    }

    fn vision_tool_or_default(&mut self) -> NodeRef {
        self.vision_tool
            .get_or_insert_with(|| {
                crate::core::graph::node_ref(ToolGroup::new(
                    ContainerKind::Group,
                    format!("{TOOL_GROUP_TYPE}1"),
                ))
            })
            .clone()
    }
}

impl ScriptHost for CogJob {
    fn script_source(&self) -> Option<String> {
        if let Some(slot) = self.slot_script_host() {
            let slot = slot.borrow();
            return slot.as_script_host().and_then(|host| host.script_source());
        }
        self.job_script()
    }

    fn set_script_source(&mut self, source: String) -> Result<(), Error> {
        if let Some(slot) = self.slot_script_host() {
            let mut slot = slot.borrow_mut();
            if let Some(host) = slot.as_script_host_mut() {
                return host.set_script_source(source);
            }
        }
        match &self.job_script {
            Some(script) => {
                script.borrow_mut().source = source;
                Ok(())
            }
            None => Err(Error::new(ErrorKind::NoScriptSupport)
                .with_message("No script support found on this host.")),
        }
    }
}

/// Root manager holding jobs. Not named; indexed as `Unnamed`.
pub struct CogJobManager {
    jobs: Rc<RefCell<NodeList>>,
}

impl Default for CogJobManager {
    fn default() -> Self {
        Self {
            jobs: Rc::new(RefCell::new(NodeList::new(JOB_COLLECTION_TYPE))),
        }
    }
}

impl CogJobManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_job(self, job: NodeRef) -> Self {
        self.jobs.borrow_mut().push(job);
        self
    }
}

impl Node for CogJobManager {
    fn type_name(&self) -> &str {
        JOB_MANAGER_TYPE
    }

    fn properties(&self) -> Vec<PropertyInfo> {
        vec![
            PropertyInfo::new("JobCount", PropertyType::Int, false),
            PropertyInfo::new(
                "Jobs",
                PropertyType::Object(JOB_COLLECTION_TYPE.to_string()),
                false,
            ),
        ]
    }

    fn get(&self, property: &str) -> Result<Value, Error> {
        match property {
            "JobCount" => Ok(Value::Int(self.jobs.borrow().len() as i64)),
            "Jobs" => Ok(Value::Node(share(&self.jobs))),
            _ => Err(unknown_property(JOB_MANAGER_TYPE, property)),
        }
    }

    fn set(&mut self, property: &str, _value: Value) -> Result<(), Error> {
        match property {
            "JobCount" | "Jobs" => Err(read_only_property(JOB_MANAGER_TYPE, property)),
            _ => Err(unknown_property(JOB_MANAGER_TYPE, property)),
        }
    }

    fn as_job_manager(&self) -> Option<&dyn JobManager> {
        Some(self)
    }
}

impl JobManager for CogJobManager {
    fn job_count(&self) -> usize {
        self.jobs.borrow().len()
    }

    fn job(&self, index: usize) -> Option<NodeRef> {
        self.jobs.borrow().nodes().get(index).cloned()
    }
}
