//! Dependency scheduler: drives one full instantiation pass.
//!
//! Pass structure:
//! 1. Walk the document's device nodes in order. For each node, try every
//!    compatibility string against the compat table, then the node name
//!    against the instance table; the first non-`NoMatch` outcome ends the
//!    node's matching. Nodes nothing matches are recorded and skipped.
//! 2. Invoke every force binding once.
//! 3. Re-run suspended initializers to a fixed point: whenever the machine
//!    progress stamp advances, all parked continuations move FIFO onto the
//!    ready queue and are re-invoked; one that defers again re-parks.
//!
//! The pass ends when the ready queue drains. If parked continuations remain
//! at that point, every one of them has re-run since the last progress event
//! without anything new being published, so no further attempt can change
//! the store: the pass is stalled and fails with [RunError::Unresolved].

use crate::{
    binding::InitError,
    dispatch::{self, DispatchOutcome},
    machine::{FdtMachine, ParkedInit, PendingDep},
    registry::BindingRegistry,
};
use alloc::{boxed::Box, collections::vec_deque::VecDeque, vec, vec::Vec};
use log::{debug, error, info, warn};

pub struct InitScheduler<'a> {
    registry: &'a BindingRegistry,
    machine: &'a FdtMachine,
    ready: VecDeque<ParkedInit>,
    stamp: usize,
    report: InitReport,
}

/// Summary of one machine pass.
#[derive(Debug)]
pub struct InitReport {
    /// Node paths whose initializer completed, in completion order.
    pub succeeded: Vec<Box<str>>,
    /// Device nodes no binding matched.
    pub unmatched: Vec<Box<str>>,
    /// Labels of force bindings that completed.
    pub forced: Vec<Box<str>>,
    /// Initializer failures by node path or force label. A failure aborts
    /// that node only, never the pass.
    pub failed: Vec<(Box<str>, InitError)>,
}

#[derive(Debug)]
pub enum RunError {
    /// The pass stalled: no runnable work remains while initializers are
    /// still suspended.
    Unresolved { pending: Vec<PendingDep> },
}

/// Run one full pass of `registry` bindings over `machine`.
pub fn init_machine(
    registry: &BindingRegistry,
    machine: &FdtMachine,
) -> Result<InitReport, RunError> {
    InitScheduler::new(registry, machine).run()
}

impl<'a> InitScheduler<'a> {
    pub fn new(registry: &'a BindingRegistry, machine: &'a FdtMachine) -> InitScheduler<'a> {
        InitScheduler {
            registry,
            machine,
            ready: VecDeque::new(),
            stamp: machine.progress_stamp(),
            report: InitReport {
                succeeded: vec![],
                unmatched: vec![],
                forced: vec![],
                failed: vec![],
            },
        }
    }

    pub fn run(mut self) -> Result<InitReport, RunError> {
        let paths = self.machine.doc().node_paths();
        info!("instantiation pass over {} device node(s)", paths.len());
        for path in &paths {
            self.attempt_node(path);
            self.pump_wakes();
        }
        self.force_pass();
        self.drain_ready();
        self.finish()
    }

    fn attempt_node(&mut self, path: &str) {
        let doc = self.machine.doc();
        let compats = doc.compatibles(path);
        let mut outcome = Ok(DispatchOutcome::NoMatch);
        for compat in &compats {
            outcome = self.registry.init_compat(self.machine, path, compat);
            if !matches!(outcome, Ok(DispatchOutcome::NoMatch)) {
                break;
            }
        }
        if matches!(outcome, Ok(DispatchOutcome::NoMatch))
            && let Some(name) = doc.node_name(path)
        {
            outcome = self.registry.init_inst_bind(self.machine, path, name);
        }
        match outcome {
            Ok(DispatchOutcome::Done) => {
                debug!("'{}' initialized", path);
                self.report.succeeded.push(Box::from(path));
                self.machine.bump_progress();
            }
            Ok(DispatchOutcome::Deferred) => {}
            Ok(DispatchOutcome::NoMatch) => {
                warn!("no binding matches '{}' (compatible: {:?})", path, compats);
                self.report.unmatched.push(Box::from(path));
            }
            Err(err) => {
                error!("initializer for '{}' failed: {:?}", path, err);
                self.report.failed.push((Box::from(path), err));
            }
        }
    }

    fn force_pass(&mut self) {
        for binding in self.registry.force_bindings() {
            let label = binding.key.clone();
            match dispatch::run_binding(self.machine, "", binding) {
                Ok(DispatchOutcome::Done) => {
                    debug!("force binding '{}' completed", label);
                    self.report.forced.push(label);
                    self.machine.bump_progress();
                }
                Ok(DispatchOutcome::Deferred) => {}
                Ok(DispatchOutcome::NoMatch) => {}
                Err(err) => {
                    error!("force binding '{}' failed: {:?}", label, err);
                    self.report.failed.push((label, err));
                }
            }
            self.pump_wakes();
        }
    }

    /// Move every parked continuation to the ready queue if the machine made
    /// progress since the last check.
    fn pump_wakes(&mut self) {
        let stamp = self.machine.progress_stamp();
        if stamp == self.stamp {
            return;
        }
        self.stamp = stamp;
        let mut woken = self.machine.take_parked();
        if !woken.is_empty() {
            debug!(
                "progress event: waking {} suspended initializer(s)",
                woken.len()
            );
        }
        self.ready.append(&mut woken);
    }

    fn drain_ready(&mut self) {
        while let Some(parked) = self.ready.pop_front() {
            let subject: Box<str> = Box::from(parked.subject());
            let is_force = parked.node_path.is_empty();
            match dispatch::resume(self.machine, parked) {
                Ok(DispatchOutcome::Done) => {
                    debug!("'{}' initialized after wake", subject);
                    if is_force {
                        self.report.forced.push(subject);
                    } else {
                        self.report.succeeded.push(subject);
                    }
                    self.machine.bump_progress();
                }
                Ok(DispatchOutcome::Deferred) => {}
                Ok(DispatchOutcome::NoMatch) => {}
                Err(err) => {
                    error!("initializer for '{}' failed: {:?}", subject, err);
                    self.report.failed.push((subject, err));
                }
            }
            self.pump_wakes();
        }
    }

    fn finish(self) -> Result<InitReport, RunError> {
        let pending = self.machine.pending_deps();
        if !pending.is_empty() {
            error!(
                "instantiation stalled with {} unresolved initializer(s):",
                pending.len()
            );
            for dep in &pending {
                match &dep.waiting_on {
                    Some(peer) => error!("\t'{}' waiting on '{}'", dep.subject, peer),
                    None => error!("\t'{}'", dep.subject),
                }
            }
            return Err(RunError::Unresolved { pending });
        }
        info!(
            "instantiation pass complete: {} initialized, {} forced, {} unmatched, {} failed",
            self.report.succeeded.len(),
            self.report.forced.len(),
            self.report.unmatched.len(),
            self.report.failed.len()
        );
        Ok(self.report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::{BindOpaque, InitResult, InitStatus};
    use alloc::sync::Arc;
    use dtdoc::builder::TreeBuilder;

    fn done_init(_: &str, _: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
        Ok(InitStatus::Done)
    }

    fn publish_init(path: &str, machine: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
        machine.set_opaque(path, Arc::new(()))?;
        Ok(InitStatus::Done)
    }

    #[test]
    fn unmatched_nodes_are_reported_not_fatal() {
        let mut b = TreeBuilder::new();
        b.add_node("/uart@9000000");
        b.set_prop_strs("/uart@9000000", "compatible", &["ns16550a"])
            .expect("compatible");
        b.add_node("/mystery@0");
        let m = FdtMachine::new(Arc::new(b.build()));

        let reg = BindingRegistry::new();
        reg.register_compat("ns16550a", publish_init);

        let report = init_machine(&reg, &m).expect("pass succeeds");
        let succeeded: Vec<&str> = report.succeeded.iter().map(|p| p.as_ref()).collect();
        let unmatched: Vec<&str> = report.unmatched.iter().map(|p| p.as_ref()).collect();
        assert_eq!(succeeded, ["/uart@9000000"]);
        assert_eq!(unmatched, ["/mystery@0"]);
        assert!(report.failed.is_empty());
    }

    #[test]
    fn compat_binding_takes_precedence_over_instance_binding() {
        let mut b = TreeBuilder::new();
        b.add_node("/eth@81000000");
        b.set_prop_strs("/eth@81000000", "compatible", &["vendor,eth"])
            .expect("compatible");
        let m = FdtMachine::new(Arc::new(b.build()));

        let reg = BindingRegistry::new();
        reg.register_compat("vendor,eth", |path, m, _| {
            m.set_opaque(path, Arc::new("compat"))?;
            Ok(InitStatus::Done)
        });
        reg.register_inst("eth", |path, m, _| {
            m.set_opaque(path, Arc::new("inst"))?;
            Ok(InitStatus::Done)
        });

        init_machine(&reg, &m).expect("pass succeeds");
        let marker = m
            .opaque_of::<&str>("/eth@81000000")
            .expect("published marker");
        assert_eq!(*marker, "compat");
    }

    #[test]
    fn instance_binding_matches_when_no_compat_does() {
        let mut b = TreeBuilder::new();
        b.add_node("/watchdog@44000");
        let m = FdtMachine::new(Arc::new(b.build()));

        let reg = BindingRegistry::new();
        reg.register_inst("watchdog", publish_init);

        let report = init_machine(&reg, &m).expect("pass succeeds");
        assert_eq!(report.succeeded.len(), 1);
        assert!(m.has_opaque("/watchdog@44000"));
    }

    #[test]
    fn stalled_pass_names_the_waiting_initializers() {
        let mut b = TreeBuilder::new();
        b.add_node("/eth@81000000");
        b.set_prop_strs("/eth@81000000", "compatible", &["vendor,eth"])
            .expect("compatible");
        let m = FdtMachine::new(Arc::new(b.build()));

        let reg = BindingRegistry::new();
        reg.register_compat("vendor,eth", |_, m, _| m.defer_on("/missing-intc"));

        let err = init_machine(&reg, &m).expect_err("pass must stall");
        let RunError::Unresolved { pending } = err;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].subject.as_ref(), "/eth@81000000");
        assert_eq!(pending[0].waiting_on.as_deref(), Some("/missing-intc"));
    }

    #[test]
    fn completed_force_bindings_are_reported_by_label() {
        let m = FdtMachine::new(Arc::new(TreeBuilder::new().build()));
        let reg = BindingRegistry::new();
        reg.register_force("board-glue", done_init);

        let report = init_machine(&reg, &m).expect("pass succeeds");
        let forced: Vec<&str> = report.forced.iter().map(|p| p.as_ref()).collect();
        assert_eq!(forced, ["board-glue"]);
        assert!(report.succeeded.is_empty());
    }
}
