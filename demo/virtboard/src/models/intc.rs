use crate::models;
use fdtinit::{
    BindOpaque, BindingRegistry, FdtMachine, InitError, InitResult, InitStatus, IrqRef,
};
use log::{debug, warn};
use spin::Mutex;
use std::sync::Arc;

/// Interrupt controller core: a bank of level-style input lines backed by a
/// pending mask.
pub struct IntcCore {
    base: u64,
    lines: u32,
    pending: Mutex<u32>,
}

impl IntcCore {
    /// The pending mask caps the bank at 32 lines.
    pub(crate) fn new(base: u64, lines: u32) -> IntcCore {
        if lines > 32 {
            warn!("intc: {} line(s) requested, capping at 32", lines);
        }
        IntcCore {
            base,
            lines: lines.min(32),
            pending: Mutex::new(0),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn raise(&self, line: u32) {
        if line >= self.lines {
            warn!("intc: raise on line {} out of range", line);
            return;
        }
        *self.pending.lock() |= 1 << line;
    }

    pub fn lower(&self, line: u32) {
        if line >= self.lines {
            warn!("intc: lower on line {} out of range", line);
            return;
        }
        *self.pending.lock() &= !(1 << line);
    }

    pub fn is_raised(&self, line: u32) -> bool {
        line < self.lines && *self.pending.lock() & (1 << line) != 0
    }

    pub fn pending(&self) -> u32 {
        *self.pending.lock()
    }

    /// Lowest pending line, if any.
    pub fn claim(&self) -> Option<u32> {
        let mask = *self.pending.lock();
        if mask == 0 {
            None
        } else {
            Some(mask.trailing_zeros())
        }
    }

    pub fn complete(&self, line: u32) {
        self.lower(line);
    }
}

/// One input line of an [IntcCore]. Devices hold these through the machine
/// IRQ-base table.
pub struct IrqLine {
    core: Arc<IntcCore>,
    line: u32,
}

impl IrqLine {
    pub(crate) fn new(core: Arc<IntcCore>, line: u32) -> IrqLine {
        IrqLine { core, line }
    }

    pub fn raise(&self) {
        self.core.raise(self.line);
    }

    pub fn lower(&self) {
        self.core.lower(self.line);
    }

    pub fn is_raised(&self) -> bool {
        self.core.is_raised(self.line)
    }

    pub fn line(&self) -> u32 {
        self.line
    }
}

/// Claim one controller input line through the machine IRQ-base table.
pub fn line_ref(machine: &FdtMachine, index: u32) -> Result<Arc<IrqLine>, InitError> {
    machine
        .irq_ref(index as usize)
        .and_then(|line| line.downcast::<IrqLine>().ok())
        .ok_or(InitError::Custom {
            info: "irq line index out of range",
        })
}

fn init(path: &str, machine: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
    let doc = models::tree_doc(machine)?;
    let node = doc.get_node(path).ok_or(InitError::Custom {
        info: "node missing from the board document",
    })?;
    let reg = doc.get_reg_value(node)?;
    let bank = reg.first().ok_or(InitError::Custom {
        info: "empty reg property",
    })?;
    let lines = match doc.get_property(node, "lines") {
        Some(prop) => prop.value_as_u32()?,
        None => 32,
    };

    let core = Arc::new(IntcCore::new(bank.start, lines));
    let irqs: Vec<IrqRef> = (0..lines)
        .map(|n| Arc::new(IrqLine::new(core.clone(), n)) as IrqRef)
        .collect();
    machine.set_irq_base(irqs);
    machine.set_opaque(path, core)?;
    debug!("intc '{}': {} line(s) at {:#x}", path, lines, bank.start);
    Ok(InitStatus::Done)
}

pub fn register(reg: &BindingRegistry) {
    reg.register_compat("virt,intc", init);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_mask_tracks_raise_and_lower() {
        let core = IntcCore::new(0xc00_0000, 8);
        assert_eq!(core.pending(), 0);
        core.raise(2);
        core.raise(5);
        assert!(core.is_raised(2));
        assert_eq!(core.pending(), 0b10_0100);
        core.lower(2);
        assert!(!core.is_raised(2));
        assert_eq!(core.pending(), 0b10_0000);
    }

    #[test]
    fn claim_returns_the_lowest_pending_line() {
        let core = IntcCore::new(0, 8);
        assert_eq!(core.claim(), None);
        core.raise(6);
        core.raise(3);
        assert_eq!(core.claim(), Some(3));
        core.complete(3);
        assert_eq!(core.claim(), Some(6));
    }

    #[test]
    fn out_of_range_lines_are_ignored() {
        let core = IntcCore::new(0, 4);
        core.raise(9);
        assert_eq!(core.pending(), 0);
        assert!(!core.is_raised(9));
    }

    #[test]
    fn irq_line_drives_its_controller_bit() {
        let core = Arc::new(IntcCore::new(0, 4));
        let line = IrqLine::new(core.clone(), 1);
        line.raise();
        assert!(line.is_raised());
        assert!(core.is_raised(1));
        line.lower();
        assert!(!core.is_raised(1));
    }
}
