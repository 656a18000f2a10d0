#![allow(dead_code)]
pub const ETH0_HOST_IRQ: u64 = 16;
pub const SYSCLK_HZ: u64 = 25_000_000;
pub const ETH0_FIFO_IRQ: u64 = 17;
pub const SYSBUS_BASE: u64 = 0x4000_0000;
pub const INTC_LINES: u64 = 32;
pub const ETH0_PHY_IRQ: u64 = 18;
pub const UART0_BASE: u64 = 0x1000_0100;
pub const INTC_BASE: u64 = 0xc00_0000;
pub const ETH0_BASE: u64 = 0x1001_0000;
pub const UART0_IRQ: u64 = 10;
