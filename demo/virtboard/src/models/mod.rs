//! Device models for the virt board.
//!
//! Responsibilities:
//! - Provide the board's interrupt controller, UART, ethernet and clock
//!   models together with their binding initializers.
//! - [register_all] wires every model into a [BindingRegistry]. Each model
//!   publishes its core as the node opaque so peers and the demo driver can
//!   reach it after bring-up.

use dtdoc::TreeDoc;
use fdtinit::{BindingRegistry, FdtMachine, InitError, InitStatus};
use log::debug;

pub mod clock;
pub mod ethernet;
pub mod intc;
pub mod uart;

/// Register every model the board knows about.
pub fn register_all(reg: &BindingRegistry) {
    debug!("Registering board models...");
    intc::register(reg);
    uart::register(reg);
    ethernet::register(reg);
    clock::register(reg);
    // The soc container itself needs no model.
    reg.register_inst("soc", |_, _, _| Ok(InitStatus::Done));
    debug!("Board models registered.");
}

/// The concrete document behind the machine handle.
pub(crate) fn tree_doc(machine: &FdtMachine) -> Result<&TreeDoc, InitError> {
    machine
        .doc()
        .as_any()
        .downcast_ref::<TreeDoc>()
        .ok_or(InitError::UnexpectedDoc)
}
