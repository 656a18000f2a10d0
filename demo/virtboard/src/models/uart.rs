use crate::models::{
    self,
    intc::{IntcCore, IrqLine},
};
use bitflags::bitflags;
use dtdoc::PropError;
use fdtinit::{
    BindOpaque, BindingRegistry, FdtMachine, InitError, InitResult, InitStatus, require_peer,
};
use log::debug;
use spin::Mutex;
use std::{collections::VecDeque, sync::Arc};

/// IER bit: interrupt when receive data is available.
pub const IER_RX_AVAIL: u8 = 0b01;
/// IER bit: interrupt when the transmit holding register drains.
pub const IER_THR_EMPTY: u8 = 0b10;

bitflags! {
    pub struct LineStatus: u8 {
        /// Data Ready (DR) indicator.
        const DR            = 0b00000001;
        /// Overrun Error (OE) indicator
        const OE            = 0b00000010;
        /// Parity Error (PE) indicator
        const PE            = 0b00000100;
        /// Framing Error (FE) indicator
        const FE            = 0b00001000;
        /// Break Interrupt (BI) indicator
        const BI            = 0b00010000;
        /// Transmit FIFO is empty
        const THR_EMPTY     = 0b00100000;
        /// Transmitter Empty indicator
        const EMPTY_TRANS   = 0b01000000;
        /// Whether at least one error indication sits in the FIFO.
        const ERR           = 0b10000000;
    }
}

/// 16550-flavored UART model. Bytes written to the holding register land in
/// a transmit log the board driver can drain; received bytes are fed in with
/// [Uart16550::push_rx].
pub struct Uart16550 {
    base: u64,
    irq: Arc<IrqLine>,
    state: Mutex<UartState>,
}

struct UartState {
    intr_en: u8,
    rx_fifo: VecDeque<u8>,
    tx_log: Vec<u8>,
}

impl Uart16550 {
    pub(crate) fn create(base: u64, irq: Arc<IrqLine>) -> Uart16550 {
        Uart16550 {
            base,
            irq,
            state: Mutex::new(UartState {
                intr_en: 0,
                rx_fifo: VecDeque::new(),
                tx_log: Vec::new(),
            }),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn write(&self, word: u8) {
        let mut st = self.state.lock();
        st.tx_log.push(word);
        self.update_irq(&st);
    }

    pub fn read(&self) -> Option<u8> {
        let mut st = self.state.lock();
        let word = st.rx_fifo.pop_front();
        self.update_irq(&st);
        word
    }

    /// Feed one received byte from the host side.
    pub fn push_rx(&self, word: u8) {
        let mut st = self.state.lock();
        st.rx_fifo.push_back(word);
        self.update_irq(&st);
    }

    pub fn set_intr_en(&self, mask: u8) {
        let mut st = self.state.lock();
        st.intr_en = mask & (IER_RX_AVAIL | IER_THR_EMPTY);
        self.update_irq(&st);
    }

    /// The model transmits instantly, so the holding register always reads
    /// empty.
    pub fn line_status(&self) -> LineStatus {
        let st = self.state.lock();
        let mut lsr = LineStatus::THR_EMPTY | LineStatus::EMPTY_TRANS;
        if !st.rx_fifo.is_empty() {
            lsr |= LineStatus::DR;
        }
        lsr
    }

    pub fn drain_tx(&self) -> Vec<u8> {
        let mut st = self.state.lock();
        std::mem::take(&mut st.tx_log)
    }

    fn update_irq(&self, st: &UartState) {
        let rx_ready = st.intr_en & IER_RX_AVAIL != 0 && !st.rx_fifo.is_empty();
        let tx_ready = st.intr_en & IER_THR_EMPTY != 0;
        if rx_ready || tx_ready {
            self.irq.raise();
        } else {
            self.irq.lower();
        }
    }
}

fn init(path: &str, machine: &FdtMachine, _: Option<&BindOpaque>) -> InitResult {
    let doc = models::tree_doc(machine)?;
    let node = doc.get_node(path).ok_or(InitError::Custom {
        info: "node missing from the board document",
    })?;
    let parent = doc
        .get_property(node, "interrupt-parent")
        .ok_or(InitError::Prop(PropError::PropNotFound))?
        .value_as_str()?;
    let controller = require_peer!(machine, parent, IntcCore);

    let reg = doc.get_reg_value(node)?;
    let bank = reg.first().ok_or(InitError::Custom {
        info: "empty reg property",
    })?;
    let line = doc
        .get_property(node, "interrupts")
        .ok_or(InitError::Prop(PropError::PropNotFound))?
        .value_as_u32()?;
    let irq = models::intc::line_ref(machine, line)?;

    let uart = Uart16550::create(bank.start, irq);
    machine.set_opaque(path, Arc::new(uart))?;
    debug!(
        "uart '{}' at {:#x}, line {} of intc at {:#x}",
        path,
        bank.start,
        line,
        controller.base()
    );
    Ok(InitStatus::Done)
}

pub fn register(reg: &BindingRegistry) {
    reg.register_compat_list(&["ns16550a", "ns16550"], init);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn uart_with_core() -> (Arc<IntcCore>, Uart16550) {
        let core = Arc::new(IntcCore::new(0, 4));
        let line = Arc::new(IrqLine::new(core.clone(), 0));
        (core, Uart16550::create(0x1000_0100, line))
    }

    #[test]
    fn tx_bytes_land_in_the_log() {
        let (_core, uart) = uart_with_core();
        for byte in b"ok" {
            uart.write(*byte);
        }
        assert_eq!(uart.drain_tx(), b"ok");
        assert!(uart.drain_tx().is_empty());
    }

    #[test]
    fn thr_interrupt_follows_the_enable_bit() {
        let (core, uart) = uart_with_core();
        uart.write(b'x');
        assert!(!core.is_raised(0));
        uart.set_intr_en(IER_THR_EMPTY);
        assert!(core.is_raised(0));
        uart.set_intr_en(0);
        assert!(!core.is_raised(0));
    }

    #[test]
    fn rx_sets_data_ready_and_interrupts() {
        let (core, uart) = uart_with_core();
        uart.set_intr_en(IER_RX_AVAIL);
        assert!(!core.is_raised(0));
        uart.push_rx(0x55);
        assert!(uart.line_status().contains(LineStatus::DR));
        assert!(core.is_raised(0));
        assert_eq!(uart.read(), Some(0x55));
        assert!(!uart.line_status().contains(LineStatus::DR));
        assert!(!core.is_raised(0));
        assert_eq!(uart.read(), None);
    }

    #[test]
    fn holding_register_always_reads_empty() {
        let (_core, uart) = uart_with_core();
        let lsr = uart.line_status();
        assert!(lsr.contains(LineStatus::THR_EMPTY));
        assert!(lsr.contains(LineStatus::EMPTY_TRANS));
    }
}
