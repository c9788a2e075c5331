//! Owning Nodes
//!
//! A node is the owner of a group of fields: it gives them a name prefix,
//! an identity for access checks, and a shared lifetime. Fields only refer
//! to their node by [`NodeId`]; the node is looked up through the graph.
//!
//! # Teardown
//!
//! Destroying a node unroutes every field it owns before removing it, so
//! no remaining field can hold a route to a destroyed one.

use smallvec::SmallVec;
use tracing::debug;

use crate::error::{FieldError, Result};
use crate::field::{FieldHandle, FieldId, NodeId};

use super::field_graph::FieldGraph;

/// Graph-side record of a node.
#[derive(Debug, Clone)]
pub(crate) struct NodeEntry {
    pub name: String,
    /// Owned fields in creation order.
    pub fields: Vec<FieldId>,
    /// Set once the node finished initializing; locks initialize-only fields.
    pub initialized: bool,
    /// The node's display cache, found by parents checking their children.
    pub display_cache: Option<FieldId>,
}

impl NodeEntry {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
            initialized: false,
            display_cache: None,
        }
    }
}

impl FieldGraph {
    pub fn create_node(&mut self, name: &str) -> NodeId {
        let id = NodeId::next();
        self.nodes.insert(id, NodeEntry::new(name));
        id
    }

    /// Mark a node initialized. From now on its initialize-only fields
    /// refuse writes from outside.
    pub fn initialize_node(&mut self, node: NodeId) -> Result<()> {
        self.node_mut(node)?.initialized = true;
        Ok(())
    }

    pub fn is_initialized(&self, node: NodeId) -> Result<bool> {
        Ok(self.node(node)?.initialized)
    }

    pub fn node_name(&self, node: NodeId) -> Result<&str> {
        Ok(self.node(node)?.name.as_str())
    }

    /// Fields owned by `node`, in creation order.
    pub fn node_fields(&self, node: NodeId) -> Result<Vec<FieldId>> {
        Ok(self.node(node)?.fields.clone())
    }

    /// The display cache of `node`, if it created one.
    pub fn node_display_cache(&self, node: NodeId) -> Result<Option<FieldId>> {
        Ok(self.node(node)?.display_cache)
    }

    /// Owning node of `field`.
    pub fn owner(&self, field: impl FieldHandle) -> Result<Option<NodeId>> {
        Ok(self.cell(field.id())?.owner)
    }

    /// Unroute and remove every field of `node`, then the node itself.
    ///
    /// Returns the number of routes removed.
    pub fn destroy_node(&mut self, node: NodeId) -> Result<usize> {
        let fields = self.node(node)?.fields.clone();
        let mut routes = 0;
        for field in fields {
            if self.cells.contains_key(&field) {
                routes += self.remove_field(field)?;
            }
        }
        if let Some(entry) = self.nodes.remove(&node) {
            debug!(node = %entry.name, routes, "node destroyed");
        }
        Ok(routes)
    }

    /// Unroute and remove one field. Removing a display cache releases its
    /// command list and removes its activity probe as well.
    ///
    /// Returns the number of routes removed.
    pub fn remove_field(&mut self, field: impl FieldHandle) -> Result<usize> {
        let id = field.id();
        self.cell(id)?;
        if self.is_builtin(id) {
            return Err(FieldError::BuiltinField(self.full_name(id)));
        }

        let mut removed: SmallVec<[FieldId; 2]> = SmallVec::new();
        removed.push(id);
        if let Some(cache) = self.cells.get_mut(&id).and_then(|c| c.cache.as_mut()) {
            cache.discard();
            removed.push(cache.probe);
        }

        let mut routes = 0;
        for id in removed {
            if !self.cells.contains_key(&id) {
                continue;
            }
            routes += self.disconnect(id)?;
            if let Some(cell) = self.cells.remove(&id) {
                if let Some(entry) = cell.owner.and_then(|n| self.nodes.get_mut(&n)) {
                    entry.fields.retain(|&f| f != id);
                    if entry.display_cache == Some(id) {
                        entry.display_cache = None;
                    }
                }
            }
        }
        Ok(routes)
    }

    fn node(&self, node: NodeId) -> Result<&NodeEntry> {
        self.nodes.get(&node).ok_or(FieldError::UnknownNode(node))
    }

    fn node_mut(&mut self, node: NodeId) -> Result<&mut NodeEntry> {
        self.nodes.get_mut(&node).ok_or(FieldError::UnknownNode(node))
    }
}
