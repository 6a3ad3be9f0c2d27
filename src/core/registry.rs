//! Purpose: Index named nodes of a loaded graph for case-insensitive lookup.
//! Exports: `Registry`, `node_display_name`.
//! Role: Tool cache consulted by every tool-addressed operation.
//! Invariants: During a rebuild the first node seen for a name wins.
//! Invariants: Traversal follows only job-manager, job, tool-container and tool-list shapes.

use std::collections::HashMap;

use tracing::debug;

use crate::core::graph::{NodeRef, Value};

pub const UNNAMED: &str = "Unnamed";

#[derive(Default)]
pub struct Registry {
    entries: Vec<(String, NodeRef)>,
    index: HashMap<String, usize>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }

    /// Clears the index and re-walks the graph from `root`.
    pub fn rebuild(&mut self, root: &NodeRef) {
        self.clear();
        self.visit(root);
        debug!(entries = self.entries.len(), "registry rebuilt");
    }

    pub fn lookup(&self, name: &str) -> Option<NodeRef> {
        self.index
            .get(&fold(name))
            .map(|&slot| self.entries[slot].1.clone())
    }

    /// Records `node` under `name` unless the name is already taken.
    pub fn insert_first(&mut self, name: &str, node: NodeRef) -> bool {
        let key = fold(name);
        if self.index.contains_key(&key) {
            return false;
        }
        self.index.insert(key, self.entries.len());
        self.entries.push((name.to_string(), node));
        true
    }

    /// Records `node` under `name`, replacing any existing entry in place.
    pub fn insert(&mut self, name: &str, node: NodeRef) {
        let key = fold(name);
        match self.index.get(&key) {
            Some(&slot) => self.entries[slot].1 = node,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push((name.to_string(), node));
            }
        }
    }

    /// Entries in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.entries.iter().map(|(name, node)| (name.as_str(), node))
    }

    fn visit(&mut self, node: &NodeRef) {
        let name = node_display_name(node);
        self.insert_first(&name, node.clone());

        let children: Vec<NodeRef> = {
            let borrowed = node.borrow();
            if let Some(manager) = borrowed.as_job_manager() {
                (0..manager.job_count())
                    .filter_map(|index| manager.job(index))
                    .collect()
            } else if let Some(job) = borrowed.as_job() {
                job.vision_tool().into_iter().collect()
            } else if let Some(container) = borrowed.as_tool_container() {
                container.tools()
            } else if let Some(iterable) = borrowed.as_iterable() {
                iterable
                    .items()
                    .filter_map(|item| match item {
                        Value::Node(child) if is_tool_like(&child) => Some(child),
                        _ => None,
                    })
                    .collect()
            } else {
                Vec::new()
            }
        };

        for child in &children {
            self.visit(child);
        }
    }
}

/// Name a node is indexed under: its `Named` capability, else a text
/// `Name` property, else a placeholder.
pub fn node_display_name(node: &NodeRef) -> String {
    let borrowed = node.borrow();
    if let Some(named) = borrowed.as_named() {
        return named.name();
    }
    let has_name = borrowed
        .properties()
        .iter()
        .any(|property| property.name == "Name");
    if has_name {
        if let Ok(Value::Text(name)) = borrowed.get("Name") {
            return name;
        }
    }
    UNNAMED.to_string()
}

fn is_tool_like(node: &NodeRef) -> bool {
    let borrowed = node.borrow();
    borrowed.as_named().is_some() || borrowed.as_job().is_some()
}

fn fold(name: &str) -> String {
    name.to_lowercase()
}
