//! In-memory device tree documents.
//!
//! A [TreeDoc] holds an already-resolved device tree: an id-indexed node
//! container with per-node properties stored in flattened-tree encoding
//! (big-endian cells, NUL-joined string lists). Documents are assembled
//! programmatically through [TreeBuilder]; blob parsing stays outside this
//! crate.

#![no_std]

extern crate alloc;

pub mod builder;
pub mod node;
pub mod prop;

pub use builder::{BuildError, TreeBuilder};
pub use node::{DocNode, NodeType, TreeDoc};
pub use prop::{DocProp, PropError};
