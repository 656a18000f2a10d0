//! Programmatic document assembly.
//!
//! [TreeBuilder] fills the node container the way a flattened-tree parser
//! would: nodes are created in insertion order, names split at `@`, property
//! values stored in flattened-tree encoding. Conventional description nodes
//! (`/chosen`, `/aliases`, memory nodes) are tagged on [TreeBuilder::build]
//! so device enumeration skips them.

use crate::{
    node::{DocNode, NodeType, TreeDoc},
    prop::DocProp,
};
use alloc::{boxed::Box, vec, vec::Vec};
use log::debug;

/// Root-level nodes that describe the platform rather than a device.
const DESCRIPTION_NODES: &[&str] = &["chosen", "aliases", "memory", "reserved-memory"];

pub struct TreeBuilder {
    tree: TreeDoc,
}

impl TreeBuilder {
    pub fn new() -> TreeBuilder {
        TreeBuilder {
            tree: TreeDoc {
                root_id: 0,
                container: vec![DocNode {
                    node_id: 0,
                    parent_id: 0,
                    full_name: Box::from(""),
                    node_name: Box::from(""),
                    unit_addr: Box::from(""),
                    children: vec![],
                    props: vec![],
                    node_type: NodeType::Device,
                }],
            },
        }
    }

    /// Create the node at `path`, along with any missing interior nodes.
    /// Existing nodes are left untouched.
    pub fn add_node(&mut self, path: &str) {
        self.ensure_node(path);
    }

    fn ensure_node(&mut self, path: &str) -> usize {
        let mut cur = self.tree.root_id;
        for section in path.split('/') {
            let section = section.trim();
            if section.is_empty() {
                continue;
            }
            cur = match self.find_child(cur, section) {
                Some(id) => id,
                None => self.push_child(cur, section),
            };
        }
        cur
    }

    fn find_child(&self, parent: usize, full_name: &str) -> Option<usize> {
        self.tree.container[parent]
            .children
            .iter()
            .copied()
            .find(|id| self.tree.container[*id].full_name.as_ref() == full_name)
    }

    fn push_child(&mut self, parent: usize, full_name: &str) -> usize {
        let (node_name, unit_addr) = match full_name.split_once('@') {
            Some((name, addr)) => (name, addr),
            None => (full_name, ""),
        };
        let node_id = self.tree.container.len();
        self.tree.container.push(DocNode {
            node_id,
            parent_id: parent,
            full_name: Box::from(full_name),
            node_name: Box::from(node_name),
            unit_addr: Box::from(unit_addr),
            children: vec![],
            props: vec![],
            node_type: NodeType::Device,
        });
        self.tree.container[parent].children.push(node_id);
        node_id
    }

    /// Set a property on an existing node, replacing any previous value.
    pub fn set_prop_bytes(&mut self, path: &str, name: &str, data: &[u8]) -> Result<(), BuildError> {
        let id = self
            .tree
            .get_node(path)
            .map(|node| node.node_id)
            .ok_or(BuildError::NodeNotFound {
                path: Box::from(path),
            })?;
        let node = &mut self.tree.container[id];
        let prop = DocProp {
            name: Box::from(name),
            data: Box::from(data),
        };
        match node.props.iter_mut().find(|p| p.name.as_ref() == name) {
            Some(existing) => *existing = prop,
            None => node.props.push(prop),
        }
        Ok(())
    }

    pub fn set_prop_u32(&mut self, path: &str, name: &str, value: u32) -> Result<(), BuildError> {
        self.set_prop_bytes(path, name, &value.to_be_bytes())
    }

    pub fn set_prop_u64(&mut self, path: &str, name: &str, value: u64) -> Result<(), BuildError> {
        self.set_prop_bytes(path, name, &value.to_be_bytes())
    }

    pub fn set_prop_u32s(&mut self, path: &str, name: &str, values: &[u32]) -> Result<(), BuildError> {
        let mut data = Vec::with_capacity(values.len() * 4);
        for value in values {
            data.extend_from_slice(&value.to_be_bytes());
        }
        self.set_prop_bytes(path, name, &data)
    }

    pub fn set_prop_str(&mut self, path: &str, name: &str, value: &str) -> Result<(), BuildError> {
        let mut data = Vec::with_capacity(value.len() + 1);
        data.extend_from_slice(value.as_bytes());
        data.push(0);
        self.set_prop_bytes(path, name, &data)
    }

    pub fn set_prop_strs(&mut self, path: &str, name: &str, values: &[&str]) -> Result<(), BuildError> {
        let mut data = vec![];
        for value in values {
            data.extend_from_slice(value.as_bytes());
            data.push(0);
        }
        self.set_prop_bytes(path, name, &data)
    }

    pub fn build(self) -> TreeDoc {
        let mut tree = self.tree;
        let root_children = tree.container[tree.root_id].children.clone();
        for id in root_children {
            let node = &mut tree.container[id];
            if DESCRIPTION_NODES.contains(&node.node_name.as_ref()) {
                debug!("document node '{}' excluded from dispatch", node.full_name);
                node.node_type = NodeType::Description;
            }
        }
        tree
    }
}

#[derive(Debug)]
pub enum BuildError {
    NodeNotFound { path: Box<str> },
}
