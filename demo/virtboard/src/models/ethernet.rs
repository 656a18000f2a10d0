//! Legacy ethernet core model: a host register bank for MDIO and interrupt
//! plumbing plus a packet FIFO bank with word rings for data and lengths.
//! Frames pushed through the transmit FIFO land on a software wire the demo
//! driver can inspect.

use crate::models::{
    self,
    clock::BoardClock,
    intc::{IntcCore, IrqLine},
};
use bitflags::bitflags;
use dtdoc::PropError;
use fdtinit::{
    BindOpaque, BindingRegistry, FdtMachine, InitError, InitResult, InitStatus, require_peer,
};
use log::{debug, warn};
use spin::Mutex;
use std::sync::Arc;

pub const FIFO_RAM_BYTES: usize = 2048;
pub const LENGTH_FIFO_WORDS: usize = 16;

// Host register bank, word offsets.
pub const REG_MDIO_CONTROL: usize = 0x0;
pub const REG_MDIO_DATA: usize = 0x1;
pub const REG_IRQ_MASK: usize = 0x2;
pub const REG_IRQ_FLAGS: usize = 0x3;
pub const REG_VLAN_MASK: usize = 0x4;
pub const REG_REVISION: usize = 0xF;

const REVISION: u32 = 0x0000_0010;

/// Host IRQ flag bit set when an MDIO transfer completes.
pub const HOST_IRQ_MDIO: u32 = 0x1;
const HOST_IRQ_BITS: u32 = 0x3;

// FIFO register bank, word offsets.
pub const FIFO_INT_STATUS: usize = 0x0;
pub const FIFO_INT_ENABLE: usize = 0x1;
pub const FIFO_TX_RESET: usize = 0x2;
pub const FIFO_TX_VACANCY: usize = 0x3;
pub const FIFO_TX_DATA: usize = 0x4;
pub const FIFO_TX_LENGTH: usize = 0x5;
pub const FIFO_RX_RESET: usize = 0x6;
pub const FIFO_RX_OCCUPANCY: usize = 0x7;
pub const FIFO_RX_DATA: usize = 0x8;
pub const FIFO_RX_LENGTH: usize = 0x9;

pub const FIFO_RESET_MAGIC: u32 = 0xA5;

bitflags! {
    /// FIFO interrupt status and enable bits.
    pub struct FifoInt: u32 {
        /// Receive packet underrun read error.
        const RPURE = 0x8000_0000;
        /// Receive packet overrun read error.
        const RPORE = 0x4000_0000;
        /// Receive packet underrun error.
        const RPUE  = 0x2000_0000;
        /// Transmit packet overrun error.
        const TPOE  = 0x1000_0000;
        /// Transmit complete.
        const TC    = 0x0800_0000;
        /// Receive complete.
        const RC    = 0x0400_0000;
    }
}

/// Word ring shared by the data and length FIFOs. One slot is kept free to
/// tell full from empty.
struct WordRing {
    words: Vec<u32>,
    push_at: usize,
    pop_at: usize,
}

impl WordRing {
    fn new(len: usize) -> WordRing {
        WordRing {
            words: vec![0; len],
            push_at: 0,
            pop_at: 0,
        }
    }

    fn is_full(&self) -> bool {
        (self.push_at + 1) % self.words.len() == self.pop_at
    }

    fn is_empty(&self) -> bool {
        self.push_at == self.pop_at
    }

    fn vacancy(&self) -> u32 {
        ((self.pop_at + self.words.len() - self.push_at - 1) % self.words.len()) as u32
    }

    fn occupancy(&self) -> u32 {
        ((self.push_at + self.words.len() - self.pop_at) % self.words.len()) as u32
    }

    fn push(&mut self, word: u32) -> bool {
        if self.is_full() {
            return false;
        }
        self.words[self.push_at] = word;
        self.push_at = (self.push_at + 1) % self.words.len();
        true
    }

    fn pop(&mut self) -> Option<u32> {
        if self.is_empty() {
            return None;
        }
        let word = self.words[self.pop_at];
        self.pop_at = (self.pop_at + 1) % self.words.len();
        Some(word)
    }

    /// The word a read would return; the cursor only advances when the ring
    /// is non-empty.
    fn peek(&self) -> u32 {
        self.words[self.pop_at]
    }

    fn reset(&mut self) {
        self.push_at = 0;
        self.pop_at = 0;
    }
}

pub struct LabxEthernet {
    base: u64,
    host_irq: Arc<IrqLine>,
    fifo_irq: Arc<IrqLine>,
    phy_irq: Arc<IrqLine>,
    state: Mutex<EthState>,
}

struct EthState {
    host_regs: [u32; 0x10],
    fifo_regs: [u32; 0x10],
    tx_data: WordRing,
    tx_len: WordRing,
    rx_data: WordRing,
    rx_len: WordRing,
    wire: Vec<Vec<u8>>,
}

impl LabxEthernet {
    pub(crate) fn create(
        base: u64,
        host_irq: Arc<IrqLine>,
        fifo_irq: Arc<IrqLine>,
        phy_irq: Arc<IrqLine>,
    ) -> LabxEthernet {
        LabxEthernet {
            base,
            host_irq,
            fifo_irq,
            phy_irq,
            state: Mutex::new(EthState {
                host_regs: [0; 0x10],
                fifo_regs: [0; 0x10],
                tx_data: WordRing::new(FIFO_RAM_BYTES / 4),
                tx_len: WordRing::new(LENGTH_FIFO_WORDS),
                rx_data: WordRing::new(FIFO_RAM_BYTES / 4),
                rx_len: WordRing::new(LENGTH_FIFO_WORDS),
                wire: Vec::new(),
            }),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn phy_line(&self) -> &IrqLine {
        &self.phy_irq
    }

    // region: host register bank

    pub fn host_read(&self, word_off: usize) -> u32 {
        let st = self.state.lock();
        match word_off & 0xF {
            REG_MDIO_CONTROL | REG_MDIO_DATA | REG_IRQ_MASK | REG_IRQ_FLAGS | REG_VLAN_MASK => {
                st.host_regs[word_off & 0xF]
            }
            REG_REVISION => REVISION,
            off => {
                warn!("ethernet: read of unknown host register {:#x}", off);
                0
            }
        }
    }

    pub fn host_write(&self, word_off: usize, value: u32) {
        let mut st = self.state.lock();
        match word_off & 0xF {
            REG_MDIO_CONTROL => {
                st.host_regs[REG_MDIO_CONTROL] = value & 0x0000_07FF;
                self.mdio_xfer(
                    &mut st,
                    (value >> 10) & 1 != 0,
                    (value >> 5) & 0x1F,
                    value & 0x1F,
                );
            }
            REG_MDIO_DATA => {
                st.host_regs[REG_MDIO_DATA] = value & 0x0000_FFFF;
            }
            REG_IRQ_MASK => {
                st.host_regs[REG_IRQ_MASK] = value & HOST_IRQ_BITS;
                self.update_host_irq(&st);
            }
            REG_IRQ_FLAGS => {
                st.host_regs[REG_IRQ_FLAGS] &= !(value & HOST_IRQ_BITS);
                self.update_host_irq(&st);
            }
            REG_VLAN_MASK | REG_REVISION => {}
            off => {
                warn!(
                    "ethernet: write of unknown host register {:#x} = {:#010x}",
                    off, value
                );
            }
        }
    }

    fn mdio_xfer(&self, st: &mut EthState, read: bool, phy_addr: u32, reg_addr: u32) {
        debug!(
            "ethernet: MDIO {}: addr={}, reg={}",
            if read { "READ" } else { "WRITE" },
            phy_addr,
            reg_addr
        );
        if read {
            st.host_regs[REG_MDIO_DATA] = 0x0000_FFFF;
        }
        st.host_regs[REG_IRQ_FLAGS] |= HOST_IRQ_MDIO;
        self.update_host_irq(st);
    }

    fn update_host_irq(&self, st: &EthState) {
        if st.host_regs[REG_IRQ_FLAGS] & st.host_regs[REG_IRQ_MASK] != 0 {
            self.host_irq.raise();
        } else {
            self.host_irq.lower();
        }
    }

    // endregion

    // region: FIFO register bank

    pub fn fifo_read(&self, word_off: usize) -> u32 {
        let mut st = self.state.lock();
        match word_off & 0xF {
            FIFO_INT_STATUS | FIFO_INT_ENABLE | FIFO_TX_RESET | FIFO_TX_DATA | FIFO_TX_LENGTH
            | FIFO_RX_RESET => st.fifo_regs[word_off & 0xF],
            FIFO_TX_VACANCY => {
                if st.tx_len.is_full() {
                    0
                } else {
                    st.tx_data.vacancy()
                }
            }
            FIFO_RX_OCCUPANCY => st.rx_data.occupancy(),
            FIFO_RX_DATA => {
                let word = st.rx_data.peek();
                if st.rx_data.pop().is_none() {
                    st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::RPURE.bits();
                    self.update_fifo_irq(&st);
                }
                word
            }
            FIFO_RX_LENGTH => {
                let word = st.rx_len.peek();
                if st.rx_len.pop().is_none() {
                    st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::RPURE.bits();
                    self.update_fifo_irq(&st);
                }
                word
            }
            off => {
                warn!("ethernet: read of unknown fifo register {:#x}", off);
                0
            }
        }
    }

    pub fn fifo_write(&self, word_off: usize, value: u32) {
        let mut st = self.state.lock();
        match word_off & 0xF {
            FIFO_INT_STATUS => {
                st.fifo_regs[FIFO_INT_STATUS] &= !(value & FifoInt::all().bits());
                self.update_fifo_irq(&st);
            }
            FIFO_INT_ENABLE => {
                st.fifo_regs[FIFO_INT_ENABLE] = value & FifoInt::all().bits();
                self.update_fifo_irq(&st);
            }
            FIFO_TX_RESET => {
                if value == FIFO_RESET_MAGIC {
                    st.tx_data.reset();
                    st.tx_len.reset();
                }
            }
            FIFO_TX_DATA => {
                if st.tx_len.is_full() || !st.tx_data.push(value) {
                    st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::TPOE.bits();
                    self.update_fifo_irq(&st);
                }
            }
            FIFO_TX_LENGTH => {
                if st.tx_len.push(value) {
                    self.send_frames(&mut st);
                } else {
                    st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::TPOE.bits();
                    self.update_fifo_irq(&st);
                }
            }
            FIFO_RX_RESET => {
                if value == FIFO_RESET_MAGIC {
                    st.rx_data.reset();
                    st.rx_len.reset();
                }
            }
            FIFO_TX_VACANCY | FIFO_RX_OCCUPANCY | FIFO_RX_DATA | FIFO_RX_LENGTH => {}
            off => {
                warn!(
                    "ethernet: write of unknown fifo register {:#x} = {:#010x}",
                    off, value
                );
            }
        }
    }

    /// Drain every queued frame length, pulling its words off the data ring
    /// and putting the frame on the wire big-endian, as the core stores it.
    fn send_frames(&self, st: &mut EthState) {
        while let Some(length) = st.tx_len.pop() {
            let words = (length as usize).div_ceil(4);
            let mut frame = Vec::with_capacity(words * 4);
            for _ in 0..words {
                let word = st.tx_data.pop().unwrap_or_else(|| {
                    warn!("ethernet: tx data ring ran dry mid-frame");
                    0
                });
                frame.extend_from_slice(&word.to_be_bytes());
            }
            frame.truncate(length as usize);
            debug!("ethernet: sent {} byte frame", frame.len());
            st.wire.push(frame);
        }
        st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::TC.bits();
        self.update_fifo_irq(st);
    }

    fn update_fifo_irq(&self, st: &EthState) {
        if st.fifo_regs[FIFO_INT_STATUS] & st.fifo_regs[FIFO_INT_ENABLE] != 0 {
            self.fifo_irq.raise();
        } else {
            self.fifo_irq.lower();
        }
    }

    // endregion

    /// Push one received frame into the RX FIFO. An overrun drops the frame
    /// and latches the overrun error bit.
    pub fn receive(&self, frame: &[u8]) {
        let mut st = self.state.lock();
        let words = frame.len().div_ceil(4);
        if st.rx_len.is_full() || st.rx_data.vacancy() < words as u32 {
            warn!("ethernet: rx overrun, dropping {} byte frame", frame.len());
            st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::RPORE.bits();
            self.update_fifo_irq(&st);
            return;
        }
        for chunk in frame.chunks(4) {
            let mut word = [0u8; 4];
            word[..chunk.len()].copy_from_slice(chunk);
            st.rx_data.push(u32::from_be_bytes(word));
        }
        st.rx_len.push(frame.len() as u32);
        st.fifo_regs[FIFO_INT_STATUS] |= FifoInt::RC.bits();
        self.update_fifo_irq(&st);
    }

    /// Frames the core has transmitted since the last call.
    pub fn take_wire(&self) -> Vec<Vec<u8>> {
        let mut st = self.state.lock();
        std::mem::take(&mut st.wire)
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
    let clock = require_peer!(machine, models::clock::SYSCLK_PATH, BoardClock);

    let reg = doc.get_reg_value(node)?;
    let bank = reg.first().ok_or(InitError::Custom {
        info: "empty reg property",
    })?;
    let lines = doc
        .get_property(node, "interrupts")
        .ok_or(InitError::Prop(PropError::PropNotFound))?
        .value_as_cells()?;
    let &[host, fifo, phy] = &lines[..] else {
        return Err(InitError::Prop(PropError::InvalidPropFormat));
    };

    let eth = LabxEthernet::create(
        bank.start,
        models::intc::line_ref(machine, host)?,
        models::intc::line_ref(machine, fifo)?,
        models::intc::line_ref(machine, phy)?,
    );
    machine.set_opaque(path, Arc::new(eth))?;
    debug!(
        "ethernet '{}' at {:#x}, lines {}/{}/{} of intc at {:#x}, phy clock {} Hz",
        path,
        bank.start,
        host,
        fifo,
        phy,
        controller.base(),
        clock.hz()
    );
    Ok(InitStatus::Done)
}

pub fn register(reg: &BindingRegistry) {
    reg.register_compat("labx,ethernet", init);
}
