//! Initializer callback contract.
//!
//! A [Binding] ties a table key to a device initializer plus an optional
//! registration-time payload. Initializers are re-entrant: one that returns
//! [InitStatus::Deferred] is re-invoked from the top once the machine makes
//! progress, so any work it completed before deferring must be guarded by
//! the write-once opaque store rather than by local state.

use crate::machine::{FdtMachine, StoreError};
use alloc::{boxed::Box, sync::Arc};
use core::any::Any;
use dtdoc::prop::PropError;

/// Payload attached to a binding at registration time and handed back on
/// every invocation.
pub type BindOpaque = Arc<dyn Any + Send + Sync>;

/// Value published into the machine opaque store under a node path.
pub type NodeOpaque = Arc<dyn Any + Send + Sync>;

/// Device initializer signature: node path (empty for force bindings),
/// machine context, registration payload.
pub type InitFn = dyn Fn(&str, &FdtMachine, Option<&BindOpaque>) -> InitResult + Send + Sync;

pub type InitResult = Result<InitStatus, InitError>;

/// Terminal state of one initializer invocation.
#[derive(Debug, PartialEq, Eq)]
pub enum InitStatus {
    /// The node is fully initialized.
    Done,
    /// A dependency is missing; re-invoke after the next progress event.
    /// `waiting_on` optionally names the peer path for diagnostics.
    Deferred { waiting_on: Option<Box<str>> },
}

/// A registered initializer. The key is the compatibility string, instance
/// name or force label it was registered under.
pub struct Binding {
    pub key: Box<str>,
    init: Box<InitFn>,
    opaque: Option<BindOpaque>,
}

impl Binding {
    pub(crate) fn new(key: &str, init: Box<InitFn>, opaque: Option<BindOpaque>) -> Arc<Binding> {
        Arc::new(Binding {
            key: Box::from(key),
            init,
            opaque,
        })
    }

    pub fn invoke(&self, node_path: &str, machine: &FdtMachine) -> InitResult {
        (self.init)(node_path, machine, self.opaque.as_ref())
    }
}

// region: Error Types

/// Errors that may be returned by initializers.
///
/// Use these variants to express common failure reasons; device models may
/// wrap their own diagnostics in [InitError::Custom].
#[derive(Debug)]
pub enum InitError {
    /// Node data missing or malformed.
    Prop(PropError),
    /// Opaque store misuse, e.g. publishing a node path twice.
    Store(StoreError),
    /// The machine document is not the concrete type the initializer needs.
    UnexpectedDoc,
    /// Initializer-specific failure information.
    Custom { info: &'static str },
}

impl From<PropError> for InitError {
    fn from(err: PropError) -> InitError {
        InitError::Prop(err)
    }
}

impl From<StoreError> for InitError {
    fn from(err: StoreError) -> InitError {
        InitError::Store(err)
    }
}

// endregion
