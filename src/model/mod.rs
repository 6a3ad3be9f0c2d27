//! Purpose: Reference object model served by the driver.
//! Exports: `catalog`, `nodes`, `tool`.
//! Role: Concrete `Node` implementations plus the type catalog that constructs them.

use std::cell::RefCell;
use std::rc::Rc;

use crate::core::graph::{Node, NodeRef};

pub mod catalog;
pub mod nodes;
pub mod tool;

/// Hands out a type-erased handle to a concretely typed shared node.
pub(crate) fn share<N: Node + 'static>(rc: &Rc<RefCell<N>>) -> NodeRef {
    rc.clone()
}
