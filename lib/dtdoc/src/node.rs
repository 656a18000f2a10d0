use crate::prop::{DocProp, PropError};
use alloc::{boxed::Box, string::String, vec, vec::Vec};
use core::ops::Range;

pub struct TreeDoc {
    pub root_id: usize,
    pub container: Vec<DocNode>,
}

pub struct DocNode {
    pub node_id: usize,
    pub parent_id: usize,
    pub full_name: Box<str>,
    pub node_name: Box<str>,
    pub unit_addr: Box<str>,
    pub children: Vec<usize>,
    pub props: Vec<DocProp>,
    pub node_type: NodeType,
}

#[derive(PartialEq, Eq, Debug, Clone, Copy)]
pub enum NodeType {
    Device,
    Description,
}

impl TreeDoc {
    pub fn is_root(&self, node: &DocNode) -> bool {
        self.get_parent(node).node_id == node.node_id
    }
    fn full_path(&self, node: &DocNode) -> String {
        if self.is_root(node) {
            return String::from("");
        } else {
            return self.full_path(self.get_parent(node)) + "/" + node.full_name.as_ref();
        }
    }
    pub fn get_full_path(&self, node: &DocNode) -> Box<str> {
        self.full_path(node).into_boxed_str()
    }
    pub fn get_parent(&self, node: &DocNode) -> &DocNode {
        &self.container[node.parent_id]
    }
    pub fn get_children<'b>(&'b self, node: &DocNode) -> impl Iterator<Item = &'b DocNode> {
        node.children.iter().map(|x| &self.container[*x])
    }
    pub fn get_property<'b>(&self, node: &'b DocNode, name: impl AsRef<str>) -> Option<&'b DocProp> {
        let name = name.as_ref();
        for prop in &node.props {
            if prop.name.as_ref().eq(name) {
                return Some(prop);
            }
        }
        None
    }
    pub fn get_node(&self, path: impl AsRef<str>) -> Option<&DocNode> {
        let path_str = path.as_ref();
        let mut node = &self.container[self.root_id];
        for section in path_str.split('/') {
            if section.trim().is_empty() {
                continue;
            }
            let mut found = false;
            for subnode in self.get_children(node) {
                if subnode.full_name.as_ref().eq(section) {
                    node = subnode;
                    found = true;
                    break;
                }
            }
            if !found {
                return None;
            }
        }
        Some(node)
    }

    /// Full paths of all device nodes, pre-order. The root itself and
    /// description subtrees (`/chosen`, `/aliases`, memory nodes) are skipped.
    pub fn device_paths(&self) -> Vec<Box<str>> {
        let mut res = vec![];
        self.collect_devices(&self.container[self.root_id], &mut res);
        res
    }
    fn collect_devices(&self, node: &DocNode, out: &mut Vec<Box<str>>) {
        for child in self.get_children(node) {
            if child.node_type == NodeType::Description {
                continue;
            }
            out.push(self.get_full_path(child));
            self.collect_devices(child, out);
        }
    }

    /// The node's `compatible` strings in listed order, empty when the
    /// property is absent or malformed.
    pub fn compat_strs<'b>(&'b self, node: &'b DocNode) -> Vec<&'b str> {
        match self.get_property(node, "compatible") {
            Some(prop) => prop.value_as_strlist().unwrap_or_default(),
            None => vec![],
        }
    }

    pub fn get_reg_value(&self, node: &DocNode) -> Result<Vec<Range<u64>>, PropError> {
        let mut size_cel = 1;
        let mut addr_cel = 2;
        if !self.is_root(node) {
            let parent = self.get_parent(node);
            if let Some(prop) = self.get_property(parent, "#address-cells") {
                addr_cel = prop.value_as_u32()? as usize;
            }
            if let Some(prop) = self.get_property(parent, "#size-cells") {
                size_cel = prop.value_as_u32()? as usize;
            }
        }
        let reg = self
            .get_property(node, "reg")
            .ok_or(PropError::PropNotFound)?;
        let cells = reg.value_as_cells()?;
        let width = size_cel + addr_cel;
        if width == 0 {
            return Err(PropError::InvalidPropFormat);
        }
        let count = cells.len() / width;
        let mut res = vec![];
        for i in 0..count {
            let index = width * i;
            let mut addr: u64 = 0;
            let mut sz: u64 = 0;
            for j in index..index + addr_cel {
                addr = (addr << 32) + cells[j] as u64;
            }
            for j in index + addr_cel..index + width {
                sz = (sz << 32) + cells[j] as u64;
            }
            res.push(Range {
                start: addr,
                end: addr + sz,
            });
        }
        Ok(res)
    }
}
