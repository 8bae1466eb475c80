//! Console machine assembly: wires the two IDE channels to their legacy port
//! ranges and IRQ lines, and hosts the CPU core selected at startup.

#![forbid(unsafe_code)]

pub mod cpu;
pub mod irq;
pub mod machine;

pub use cpu::{available_cores, CpuCore, CpuCoreInfo};
pub use irq::IrqRouter;
pub use machine::{ConsoleModel, Machine, MachineError};
