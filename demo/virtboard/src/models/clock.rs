use fdtinit::{BindOpaque, BindingRegistry, FdtMachine, InitResult, InitStatus};
use log::debug;
use std::sync::Arc;

/// The clock has no board document node; its handle is published under this
/// synthetic path.
pub const SYSCLK_PATH: &str = "/sysclk";

const DEFAULT_HZ: u64 = 25_000_000;

/// Fixed-rate system clock.
pub struct BoardClock {
    hz: u64,
}

impl BoardClock {
    pub fn hz(&self) -> u64 {
        self.hz
    }

    /// Ticks of this clock in `micros` microseconds.
    pub fn ticks_in(&self, micros: u64) -> u64 {
        self.hz / 1_000_000 * micros
    }
}

/// Force-registered: the clock exists on every board regardless of what the
/// document lists. The configured rate rides in as the binding opaque.
fn init(_: &str, machine: &FdtMachine, opaque: Option<&BindOpaque>) -> InitResult {
    let hz = match opaque.and_then(|rate| rate.clone().downcast::<u64>().ok()) {
        Some(rate) => *rate,
        None => DEFAULT_HZ,
    };
    machine.set_opaque(SYSCLK_PATH, Arc::new(BoardClock { hz }))?;
    debug!("system clock fixed at {} Hz", hz);
    Ok(InitStatus::Done)
}

pub fn register(reg: &BindingRegistry) {
    reg.register_force_opaque("sysclk", init, Arc::new(crate::board_flags::SYSCLK_HZ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtdoc::TreeBuilder;
    use fdtinit::require_peer;

    #[test]
    fn publishes_the_clock_handle() {
        let m = FdtMachine::new(Arc::new(TreeBuilder::new().build()));
        let status = init("", &m, None).expect("clock init");
        assert_eq!(status, InitStatus::Done);
        let clock = m.opaque_of::<BoardClock>(SYSCLK_PATH).expect("published");
        assert_eq!(clock.hz(), DEFAULT_HZ);
    }

    #[test]
    fn registration_opaque_overrides_the_rate() {
        let m = FdtMachine::new(Arc::new(TreeBuilder::new().build()));
        let rate: BindOpaque = Arc::new(100_000_000u64);
        init("", &m, Some(&rate)).expect("clock init");
        let clock = m.opaque_of::<BoardClock>(SYSCLK_PATH).expect("published");
        assert_eq!(clock.hz(), 100_000_000);
        assert_eq!(clock.ticks_in(10), 1_000);
    }

    #[test]
    fn waiting_on_the_clock_resolves_after_publication() {
        fn consumer(_: &str, machine: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
            let clock = require_peer!(machine, SYSCLK_PATH, BoardClock);
            assert!(clock.hz() > 0);
            Ok(InitStatus::Done)
        }
        let m = FdtMachine::new(Arc::new(TreeBuilder::new().build()));
        let status = consumer("/eth", &m, None).expect("first call defers");
        assert!(matches!(status, InitStatus::Deferred { .. }));
        init("", &m, None).expect("clock init");
        let status = consumer("/eth", &m, None).expect("second call completes");
        assert_eq!(status, InitStatus::Done);
    }
}
