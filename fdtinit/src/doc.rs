//! Document boundary for the dispatch walk.
//!
//! The core consumes an already-resolved device tree through [DeviceDoc] and
//! never reads raw properties itself; initializers that need `reg` or
//! `interrupts` downcast to the concrete document type via
//! [DeviceDoc::as_any].

use alloc::{boxed::Box, vec::Vec};
use core::any::Any;
use dtdoc::node::TreeDoc;

/// Read-only view of a device document.
pub trait DeviceDoc: Send + Sync {
    /// Full paths of dispatchable device nodes, in document order.
    fn node_paths(&self) -> Vec<Box<str>>;

    /// The node's name with the unit address stripped; this is the key
    /// matched against the instance table.
    fn node_name(&self, path: &str) -> Option<&str>;

    /// The node's `compatible` strings in listed order, most specific first.
    /// Empty when the node has none.
    fn compatibles(&self, path: &str) -> Vec<&str>;

    /// Concrete document escape hatch for initializers that read properties.
    fn as_any(&self) -> &dyn Any;
}

impl DeviceDoc for TreeDoc {
    fn node_paths(&self) -> Vec<Box<str>> {
        self.device_paths()
    }

    fn node_name(&self, path: &str) -> Option<&str> {
        self.get_node(path).map(|node| node.node_name.as_ref())
    }

    fn compatibles(&self, path: &str) -> Vec<&str> {
        match self.get_node(path) {
            Some(node) => self.compat_strs(node),
            None => Vec::new(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtdoc::builder::TreeBuilder;

    fn doc() -> TreeDoc {
        let mut b = TreeBuilder::new();
        b.add_node("/soc/intc@c000000");
        b.set_prop_strs("/soc/intc@c000000", "compatible", &["vendor,intc"])
            .expect("compatible");
        b.add_node("/soc/uart@9000000");
        b.set_prop_strs(
            "/soc/uart@9000000",
            "compatible",
            &["vendor,uart-v2", "ns16550a"],
        )
        .expect("compatible");
        b.add_node("/chosen");
        b.build()
    }

    #[test]
    fn node_paths_follow_document_order() {
        let tree = doc();
        let paths = tree.node_paths();
        let paths: Vec<&str> = paths.iter().map(|p| p.as_ref()).collect();
        assert_eq!(
            paths,
            ["/soc", "/soc/intc@c000000", "/soc/uart@9000000"]
        );
    }

    #[test]
    fn node_name_strips_the_unit_address() {
        let tree = doc();
        assert_eq!(tree.node_name("/soc/uart@9000000"), Some("uart"));
        assert_eq!(tree.node_name("/nope"), None);
    }

    #[test]
    fn compatibles_keep_listed_order() {
        let tree = doc();
        assert_eq!(
            tree.compatibles("/soc/uart@9000000"),
            ["vendor,uart-v2", "ns16550a"]
        );
        assert!(tree.compatibles("/soc").is_empty());
    }

    #[test]
    fn as_any_recovers_the_concrete_document() {
        let tree = doc();
        let doc: &dyn DeviceDoc = &tree;
        assert!(doc.as_any().downcast_ref::<TreeDoc>().is_some());
    }
}
