//! ATA/ATAPI-4 channel emulation for the Aeon console.
//!
//! The console exposes two fixed IDE channels, each hosting up to two devices
//! that share one register file. This crate models the guest-visible protocol:
//! the register file and its decoded status bits, the per-opcode command state
//! machines, DMA transfer orchestration, and interrupt signaling. Media
//! backends plug in behind [`drvs::AtaDeviceDriver`].
//!
//! Reference: ATA/ATAPI-4 (T13 d1153r18). Comments citing section numbers in
//! brackets refer to that document.

#![forbid(unsafe_code)]

pub mod atapi;
pub mod channel;
pub mod cmds;
pub mod device;
pub mod drvs;
pub mod irq;
pub mod regs;

pub use channel::{AtaChannel, ChannelId, DmaTransfer};
pub use device::AtaDevice;
pub use irq::{InterruptHook, IrqLine};
pub use regs::{AccessError, AtaRegisters, Register};
