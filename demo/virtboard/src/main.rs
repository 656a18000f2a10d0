//! virtboard: a small software board brought up through fdtinit.
//!
//! The board document is assembled in code from the generated board flags,
//! bindings for the on-board models are registered, and one instantiation
//! pass wires everything together. Afterwards the demo pushes bytes through
//! the UART and frames through the ethernet FIFOs to show the models are
//! live.

mod board_flags;
mod logging;
mod models;

use dtdoc::{BuildError, TreeBuilder, TreeDoc};
use fdtinit::{BindingRegistry, FdtMachine, init_machine};
use log::{error, info};
use models::{
    ethernet::{self, FifoInt, LabxEthernet},
    intc::IntcCore,
    uart::{self, Uart16550},
};
use std::sync::Arc;

static REGISTRY: BindingRegistry = BindingRegistry::new();

fn reg_cells(base: u64, size: u32) -> [u32; 3] {
    [(base >> 32) as u32, base as u32, size]
}

fn board_doc(intc_path: &str, uart_path: &str, eth_path: &str) -> Result<TreeDoc, BuildError> {
    let mut b = TreeBuilder::new();

    b.add_node("/chosen");
    b.set_prop_str("/chosen", "stdout-path", uart_path)?;

    b.add_node(intc_path);
    b.set_prop_strs(intc_path, "compatible", &["virt,intc"])?;
    b.set_prop_u32s(intc_path, "reg", &reg_cells(board_flags::INTC_BASE, 0x1000))?;
    b.set_prop_u32(intc_path, "lines", board_flags::INTC_LINES as u32)?;

    b.add_node(uart_path);
    b.set_prop_strs(uart_path, "compatible", &["ns16550a"])?;
    b.set_prop_u32s(uart_path, "reg", &reg_cells(board_flags::UART0_BASE, 0x100))?;
    b.set_prop_u32(uart_path, "interrupts", board_flags::UART0_IRQ as u32)?;
    b.set_prop_str(uart_path, "interrupt-parent", intc_path)?;

    b.add_node(eth_path);
    b.set_prop_strs(eth_path, "compatible", &["labx,ethernet"])?;
    b.set_prop_u32s(eth_path, "reg", &reg_cells(board_flags::ETH0_BASE, 0x3000))?;
    b.set_prop_u32s(
        eth_path,
        "interrupts",
        &[
            board_flags::ETH0_HOST_IRQ as u32,
            board_flags::ETH0_FIFO_IRQ as u32,
            board_flags::ETH0_PHY_IRQ as u32,
        ],
    )?;
    b.set_prop_str(eth_path, "interrupt-parent", intc_path)?;

    Ok(b.build())
}

fn exercise_uart(machine: &FdtMachine, uart_path: &str) {
    let Some(console) = machine.opaque_of::<Uart16550>(uart_path) else {
        error!("uart model missing after bring-up");
        return;
    };
    console.set_intr_en(uart::IER_THR_EMPTY);
    for byte in b"hello from virtboard" {
        console.write(*byte);
    }
    let tx = console.drain_tx();
    info!(
        "uart tx ({} byte(s)): {}",
        tx.len(),
        String::from_utf8_lossy(&tx)
    );

    // Loop a byte back through the receive side.
    console.set_intr_en(uart::IER_RX_AVAIL);
    console.push_rx(b'!');
    info!(
        "uart rx: {:?}, line status {:?}",
        console.read().map(char::from),
        console.line_status()
    );
}

fn exercise_ethernet(machine: &FdtMachine, eth_path: &str) {
    let Some(nic) = machine.opaque_of::<LabxEthernet>(eth_path) else {
        error!("ethernet model missing after bring-up");
        return;
    };

    nic.fifo_write(ethernet::FIFO_TX_RESET, ethernet::FIFO_RESET_MAGIC);
    nic.fifo_write(ethernet::FIFO_RX_RESET, ethernet::FIFO_RESET_MAGIC);
    nic.fifo_write(ethernet::FIFO_INT_ENABLE, (FifoInt::TC | FifoInt::RC).bits());

    // One ARP-sized frame out through the tx FIFO.
    let frame: Vec<u8> = (0..42u8).collect();
    for chunk in frame.chunks(4) {
        let mut word = [0u8; 4];
        word[..chunk.len()].copy_from_slice(chunk);
        nic.fifo_write(ethernet::FIFO_TX_DATA, u32::from_be_bytes(word));
    }
    nic.fifo_write(ethernet::FIFO_TX_LENGTH, frame.len() as u32);
    for sent in nic.take_wire() {
        info!("ethernet tx: {} byte(s) on the wire", sent.len());
    }
    nic.fifo_write(ethernet::FIFO_INT_STATUS, FifoInt::TC.bits());

    // And one frame back in through the rx FIFO.
    nic.receive(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x00, 0x0a]);
    let length = nic.fifo_read(ethernet::FIFO_RX_LENGTH);
    let mut rx = Vec::with_capacity(length as usize);
    while rx.len() < length as usize {
        let word = nic.fifo_read(ethernet::FIFO_RX_DATA);
        rx.extend_from_slice(&word.to_be_bytes());
    }
    rx.truncate(length as usize);
    // Leave RC latched; the intc sweep below gets to service it.
    info!("ethernet rx: {:02x?}", rx);

    // The MDIO path answers reads with an interrupt.
    nic.host_write(ethernet::REG_IRQ_MASK, ethernet::HOST_IRQ_MDIO);
    // Read of phy 0, reg 1.
    nic.host_write(ethernet::REG_MDIO_CONTROL, (1 << 10) | 1);
    info!(
        "ethernet phy reg 1 = {:#06x} (revision {:#x}, phy line {})",
        nic.host_read(ethernet::REG_MDIO_DATA),
        nic.host_read(ethernet::REG_REVISION),
        nic.phy_line().line()
    );
    nic.host_write(ethernet::REG_IRQ_FLAGS, ethernet::HOST_IRQ_MDIO);
}

fn main() {
    logging::init();
    info!("virtboard bring-up");

    let intc_path = format!("/soc/intc@{:x}", board_flags::INTC_BASE);
    let uart_path = format!("/soc/serial@{:x}", board_flags::UART0_BASE);
    let eth_path = format!("/soc/ethernet@{:x}", board_flags::ETH0_BASE);

    let doc = match board_doc(&intc_path, &uart_path, &eth_path) {
        Ok(doc) => doc,
        Err(err) => {
            error!("board document assembly failed: {:?}", err);
            return;
        }
    };

    models::register_all(&REGISTRY);
    REGISTRY.dump_compat_table();
    REGISTRY.dump_inst_table();

    let machine = FdtMachine::new(Arc::new(doc));
    machine.set_sysbus_base(board_flags::SYSBUS_BASE);

    let report = match init_machine(&REGISTRY, &machine) {
        Ok(report) => report,
        Err(err) => {
            error!("board bring-up failed: {:?}", err);
            return;
        }
    };
    info!(
        "bring-up complete: {} device(s), {} forced binding(s), {} unmatched, {} failed",
        report.succeeded.len(),
        report.forced.len(),
        report.unmatched.len(),
        report.failed.len()
    );
    for (subject, err) in &report.failed {
        error!("'{}' failed to initialize: {:?}", subject, err);
    }

    exercise_uart(&machine, &uart_path);
    exercise_ethernet(&machine, &eth_path);

    if let Some(controller) = machine.opaque_of::<IntcCore>(&intc_path) {
        info!("intc pending mask: {:#010x}", controller.pending());
        while let Some(line) = controller.claim() {
            info!("servicing line {}", line);
            controller.complete(line);
        }
    }
    info!("virtboard down");
}
