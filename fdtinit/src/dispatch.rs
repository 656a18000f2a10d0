//! Dispatch engine: key lookup to initializer invocation.
//!
//! Dispatch never treats an empty table bucket as a failure: a missing key
//! reports [DispatchOutcome::NoMatch] and touches nothing, so callers can
//! probe several keys per node. A deferring initializer is parked on the
//! machine wait queue before the outcome is returned.

use crate::{
    binding::{Binding, InitError, InitStatus},
    machine::{FdtMachine, ParkedInit},
    registry::BindingRegistry,
};
use alloc::{boxed::Box, sync::Arc};
use log::{debug, error};

/// Outcome of one dispatch attempt.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DispatchOutcome {
    /// No binding is registered under the key. Not an error.
    NoMatch,
    /// The initializer ran to completion.
    Done,
    /// The initializer suspended; its continuation is parked on the machine.
    Deferred,
}

impl BindingRegistry {
    /// Dispatch one compatibility string for `node_path`.
    pub fn init_compat(
        &self,
        machine: &FdtMachine,
        node_path: &str,
        compat: &str,
    ) -> Result<DispatchOutcome, InitError> {
        let Some(binding) = self.lookup_compat(compat) else {
            return Ok(DispatchOutcome::NoMatch);
        };
        debug!("'{}': dispatching compat binding '{}'", node_path, compat);
        run_binding(machine, node_path, binding)
    }

    /// Dispatch the instance name for `node_path`.
    pub fn init_inst_bind(
        &self,
        machine: &FdtMachine,
        node_path: &str,
        name: &str,
    ) -> Result<DispatchOutcome, InitError> {
        let Some(binding) = self.lookup_inst(name) else {
            return Ok(DispatchOutcome::NoMatch);
        };
        debug!("'{}': dispatching instance binding '{}'", node_path, name);
        run_binding(machine, node_path, binding)
    }

    /// Invoke every force binding once, in registration order. Force
    /// initializers receive the empty node path. Deferring bindings park
    /// like any other; failures are logged as they happen and the first one
    /// is returned after the sweep completes.
    pub fn force_bind_all(&self, machine: &FdtMachine) -> Result<(), InitError> {
        let mut first_err = None;
        for binding in self.force_bindings() {
            let label = binding.key.clone();
            match run_binding(machine, "", binding) {
                Ok(_) => {}
                Err(err) => {
                    error!("force binding '{}' failed: {:?}", label, err);
                    if first_err.is_none() {
                        first_err = Some(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Invoke `binding` with `node_path`, parking the continuation when it
/// defers. No table lock is held here, so an initializer may itself dispatch
/// further nodes.
pub(crate) fn run_binding(
    machine: &FdtMachine,
    node_path: &str,
    binding: Arc<Binding>,
) -> Result<DispatchOutcome, InitError> {
    match binding.invoke(node_path, machine)? {
        InitStatus::Done => Ok(DispatchOutcome::Done),
        InitStatus::Deferred { waiting_on } => {
            let parked = ParkedInit {
                node_path: Box::from(node_path),
                binding,
                waiting_on,
            };
            match &parked.waiting_on {
                Some(peer) => debug!("'{}' suspended waiting on '{}'", parked.subject(), peer),
                None => debug!("'{}' suspended", parked.subject()),
            }
            machine.park(parked);
            Ok(DispatchOutcome::Deferred)
        }
    }
}

/// Re-invoke a parked continuation from the top.
pub(crate) fn resume(
    machine: &FdtMachine,
    parked: ParkedInit,
) -> Result<DispatchOutcome, InitError> {
    let ParkedInit {
        node_path, binding, ..
    } = parked;
    run_binding(machine, &node_path, binding)
}
