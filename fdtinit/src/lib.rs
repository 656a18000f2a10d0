//! Device-tree driven machine instantiation.
//!
//! Responsibilities:
//! - Provide the [BindingRegistry] mapping compatibility strings, instance
//!   names and force labels to device initializers.
//! - Provide the per-machine [FdtMachine] context: the device document
//!   handle, the IRQ-base table and a write-once opaque store keyed by node
//!   path.
//! - Drive a full instantiation pass over a document with [InitScheduler],
//!   re-running suspended initializers until every cross-node dependency is
//!   resolved or the pass provably stalls.
//!
//! Ownership and concurrency notes:
//! - Registration happens before the first pass; afterwards the registry is
//!   only read, so one registry may serve machine passes on several threads.
//! - All [FdtMachine] state is behind `&self` (spin locks and atomics), but a
//!   single pass runs on one logical thread: initializers are invoked one at
//!   a time and never concurrently for the same machine.

#![no_std]

extern crate alloc;

pub mod binding;
pub mod dispatch;
pub mod doc;
pub mod machine;
pub mod registry;
pub mod sched;

pub use binding::{BindOpaque, Binding, InitError, InitResult, InitStatus, NodeOpaque};
pub use dispatch::DispatchOutcome;
pub use doc::DeviceDoc;
pub use machine::{FdtMachine, IrqRef, ParkedInit, PendingDep, StoreError};
pub use registry::BindingRegistry;
pub use sched::{InitReport, InitScheduler, RunError, init_machine};
