//! Per-machine instantiation context.
//!
//! Responsibilities:
//! - Hold the device document handle and the client-assigned IRQ-base table
//!   and system-bus base for one machine being built.
//! - Provide the write-once opaque store keyed by node path, the only channel
//!   initializers use to publish and look up each other's results.
//! - Hold the wait queue of suspended initializer continuations
//!   ([ParkedInit]) for the dependency scheduler.
//!
//! Ownership and concurrency notes:
//! - Every field sits behind `&self` interior mutability so the context can
//!   be handed to initializers by shared reference.
//! - One pass mutates a context from a single logical thread; distinct
//!   contexts are independent and may be driven in parallel.

use crate::{
    binding::{Binding, InitResult, InitStatus, NodeOpaque},
    doc::DeviceDoc,
};
use alloc::{
    boxed::Box,
    collections::{btree_map::BTreeMap, vec_deque::VecDeque},
    sync::Arc,
    vec::Vec,
};
use core::{
    any::Any,
    mem::take,
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};
use log::warn;
use spin::{Mutex, RwLock};

/// Entry of the machine IRQ-base table. Interrupt semantics stay with the
/// client; the table is an opaque hand-off to initializers.
pub type IrqRef = Arc<dyn Any + Send + Sync>;

pub struct FdtMachine {
    doc: Arc<dyn DeviceDoc>,
    irq_base: RwLock<Vec<IrqRef>>,
    sysbus_base: AtomicU64,
    opaques: RwLock<BTreeMap<Box<str>, NodeOpaque>>,
    wait_queue: Mutex<VecDeque<ParkedInit>>,
    progress: AtomicUsize,
}

/// Suspended initializer continuation. The scheduler re-invokes the binding
/// with the stored path once the machine makes progress.
pub struct ParkedInit {
    /// Node path the binding was dispatched with; empty for force bindings.
    pub node_path: Box<str>,
    pub binding: Arc<Binding>,
    /// Peer path declared via [FdtMachine::defer_on], if any.
    pub waiting_on: Option<Box<str>>,
}

impl ParkedInit {
    /// Diagnostic identity: the node path, or the binding key for force
    /// bindings.
    pub fn subject(&self) -> &str {
        if self.node_path.is_empty() {
            &self.binding.key
        } else {
            &self.node_path
        }
    }
}

/// Diagnostic row reported for an initializer still waiting when a pass
/// stalls or a context is dropped.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct PendingDep {
    pub subject: Box<str>,
    pub waiting_on: Option<Box<str>>,
}

impl FdtMachine {
    /// Create an empty context for `doc`. The caller assigns the IRQ-base
    /// table and system-bus base before running a pass.
    pub fn new(doc: Arc<dyn DeviceDoc>) -> FdtMachine {
        FdtMachine {
            doc,
            irq_base: RwLock::new(Vec::new()),
            sysbus_base: AtomicU64::new(0),
            opaques: RwLock::new(BTreeMap::new()),
            wait_queue: Mutex::new(VecDeque::new()),
            progress: AtomicUsize::new(0),
        }
    }

    pub fn doc(&self) -> &dyn DeviceDoc {
        self.doc.as_ref()
    }

    // region: client-assigned machine state

    pub fn set_irq_base(&self, irqs: Vec<IrqRef>) {
        *self.irq_base.write() = irqs;
    }

    pub fn irq_ref(&self, index: usize) -> Option<IrqRef> {
        self.irq_base.read().get(index).cloned()
    }

    pub fn irq_count(&self) -> usize {
        self.irq_base.read().len()
    }

    pub fn set_sysbus_base(&self, base: u64) {
        self.sysbus_base.store(base, Ordering::SeqCst);
    }

    pub fn sysbus_base(&self) -> u64 {
        self.sysbus_base.load(Ordering::SeqCst)
    }

    // endregion

    // region: opaque store

    /// Publish `opaque` under `node_path`. The first publication wins; a
    /// second attempt fails and leaves the stored value untouched.
    pub fn set_opaque(&self, node_path: &str, opaque: NodeOpaque) -> Result<(), StoreError> {
        {
            let mut guard = self.opaques.write();
            if guard.contains_key(node_path) {
                return Err(StoreError::DuplicatePublish {
                    node_path: Box::from(node_path),
                });
            }
            guard.insert(Box::from(node_path), opaque);
        }
        self.bump_progress();
        Ok(())
    }

    pub fn has_opaque(&self, node_path: &str) -> bool {
        self.opaques.read().contains_key(node_path)
    }

    pub fn get_opaque(&self, node_path: &str) -> Option<NodeOpaque> {
        self.opaques.read().get(node_path).cloned()
    }

    /// Typed accessor over [Self::get_opaque]. `None` if nothing is published
    /// under `node_path` or the published value is of a different type.
    pub fn opaque_of<T: Any + Send + Sync>(&self, node_path: &str) -> Option<Arc<T>> {
        self.get_opaque(node_path)?.downcast::<T>().ok()
    }

    // endregion

    // region: suspension protocol

    /// Suspend the calling initializer until the next progress event.
    pub fn defer(&self) -> InitResult {
        Ok(InitStatus::Deferred { waiting_on: None })
    }

    /// Suspend the calling initializer, naming the peer whose publication it
    /// waits for. The path is diagnostic only; wake-up is driven by progress,
    /// not by that specific publication.
    pub fn defer_on(&self, node_path: &str) -> InitResult {
        Ok(InitStatus::Deferred {
            waiting_on: Some(Box::from(node_path)),
        })
    }

    pub(crate) fn park(&self, parked: ParkedInit) {
        self.wait_queue.lock().push_back(parked);
    }

    pub(crate) fn take_parked(&self) -> VecDeque<ParkedInit> {
        take(&mut *self.wait_queue.lock())
    }

    /// Snapshot of the initializers still parked on the wait queue.
    pub fn pending_deps(&self) -> Vec<PendingDep> {
        self.wait_queue
            .lock()
            .iter()
            .map(|parked| PendingDep {
                subject: Box::from(parked.subject()),
                waiting_on: parked.waiting_on.clone(),
            })
            .collect()
    }

    pub fn pending_count(&self) -> usize {
        self.wait_queue.lock().len()
    }

    pub(crate) fn progress_stamp(&self) -> usize {
        self.progress.load(Ordering::SeqCst)
    }

    pub(crate) fn bump_progress(&self) {
        self.progress.fetch_add(1, Ordering::SeqCst);
    }

    // endregion
}

/// Opaque-store misuse.
#[derive(Debug)]
pub enum StoreError {
    /// A value is already published under this node path.
    DuplicatePublish { node_path: Box<str> },
}

impl Drop for FdtMachine {
    fn drop(&mut self) {
        let queue = self.wait_queue.get_mut();
        if queue.is_empty() {
            return;
        }
        warn!(
            "machine context dropped with {} unresolved initializer(s):",
            queue.len()
        );
        for parked in queue.iter() {
            match &parked.waiting_on {
                Some(peer) => warn!("\t'{}' waiting on '{}'", parked.subject(), peer),
                None => warn!("\t'{}'", parked.subject()),
            }
        }
    }
}

/// Fetch a peer's published opaque or suspend the calling initializer until
/// it appears. With a third type argument the opaque is downcast, and a
/// published value of the wrong type is a hard error rather than a wait.
#[macro_export]
macro_rules! require_peer {
    ($machine:expr, $path:expr) => {
        match $machine.get_opaque($path) {
            Some(opaque) => opaque,
            None => return $machine.defer_on($path),
        }
    };
    ($machine:expr, $path:expr, $ty:ty) => {
        match $machine.get_opaque($path) {
            Some(opaque) => match opaque.downcast::<$ty>() {
                Ok(opaque) => opaque,
                Err(_) => {
                    return Err($crate::binding::InitError::Custom {
                        info: "peer opaque has an unexpected type",
                    });
                }
            },
            None => return $machine.defer_on($path),
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::BindOpaque;
    use alloc::{boxed::Box, sync::Arc, vec};
    use dtdoc::builder::TreeBuilder;

    fn machine() -> FdtMachine {
        FdtMachine::new(Arc::new(TreeBuilder::new().build()))
    }

    fn defer_init(_: &str, machine: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
        machine.defer()
    }

    #[test]
    fn first_publication_wins() {
        let m = machine();
        m.set_opaque("/uart", Arc::new(1u32)).expect("first publish");
        let err = m
            .set_opaque("/uart", Arc::new(2u32))
            .expect_err("second publish must fail");
        assert!(matches!(err, StoreError::DuplicatePublish { node_path } if node_path.as_ref() == "/uart"));
        assert_eq!(*m.opaque_of::<u32>("/uart").expect("stored value"), 1);
    }

    #[test]
    fn lookups_do_not_disturb_the_store() {
        let m = machine();
        m.set_opaque("/a", Arc::new(7u32)).expect("publish");
        let stamp = m.progress_stamp();
        assert!(m.has_opaque("/a"));
        assert!(m.has_opaque("/a"));
        assert!(m.get_opaque("/a").is_some());
        assert!(m.get_opaque("/b").is_none());
        assert!(!m.has_opaque("/b"));
        assert_eq!(m.progress_stamp(), stamp);
    }

    #[test]
    fn typed_accessor_rejects_other_types() {
        let m = machine();
        m.set_opaque("/a", Arc::new(7u32)).expect("publish");
        assert!(m.opaque_of::<u64>("/a").is_none());
        assert!(m.opaque_of::<u32>("/a").is_some());
    }

    #[test]
    fn publication_advances_the_progress_stamp() {
        let m = machine();
        let before = m.progress_stamp();
        m.set_opaque("/a", Arc::new(())).expect("publish");
        assert!(m.progress_stamp() > before);
    }

    #[test]
    fn defer_on_records_the_peer() {
        let m = machine();
        let status = m.defer_on("/intc").expect("defer_on");
        assert_eq!(
            status,
            InitStatus::Deferred {
                waiting_on: Some(Box::from("/intc"))
            }
        );
        let status = m.defer().expect("defer");
        assert_eq!(status, InitStatus::Deferred { waiting_on: None });
    }

    #[test]
    fn parked_continuations_drain_in_fifo_order() {
        let m = machine();
        let binding = Binding::new("x", Box::new(defer_init), None);
        m.park(ParkedInit {
            node_path: Box::from("/a"),
            binding: binding.clone(),
            waiting_on: None,
        });
        m.park(ParkedInit {
            node_path: Box::from("/b"),
            binding,
            waiting_on: Some(Box::from("/a")),
        });
        assert_eq!(m.pending_count(), 2);
        let deps = m.pending_deps();
        assert_eq!(deps[0].subject.as_ref(), "/a");
        assert_eq!(deps[1].subject.as_ref(), "/b");
        assert_eq!(deps[1].waiting_on.as_deref(), Some("/a"));
        let drained = m.take_parked();
        assert_eq!(drained.len(), 2);
        assert_eq!(m.pending_count(), 0);
    }

    #[test]
    fn force_parks_report_under_the_binding_key() {
        let m = machine();
        let binding = Binding::new("board-clock", Box::new(defer_init), None);
        m.park(ParkedInit {
            node_path: Box::from(""),
            binding,
            waiting_on: None,
        });
        let deps = m.pending_deps();
        assert_eq!(deps[0].subject.as_ref(), "board-clock");
    }

    #[test]
    fn irq_base_is_assigned_after_creation() {
        let m = machine();
        assert_eq!(m.irq_count(), 0);
        let lines: Vec<IrqRef> = vec![Arc::new(10u32), Arc::new(11u32)];
        m.set_irq_base(lines);
        assert_eq!(m.irq_count(), 2);
        let line = m.irq_ref(1).expect("second line");
        assert_eq!(*line.downcast::<u32>().expect("u32 line"), 11);
        assert!(m.irq_ref(2).is_none());
    }

    #[test]
    fn sysbus_base_round_trips() {
        let m = machine();
        assert_eq!(m.sysbus_base(), 0);
        m.set_sysbus_base(0x4000_0000);
        assert_eq!(m.sysbus_base(), 0x4000_0000);
    }
}
