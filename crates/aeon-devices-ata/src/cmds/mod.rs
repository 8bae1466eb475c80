//! Per-opcode command state machines.
//!
//! A command object is transient and one-shot: the channel creates it from
//! the factory table when the Command register is written, drives it through
//! data-register and DMA calls, and drops it once it reports completion.
//! Commands mutate the register file only through [`CmdEnv`] and never touch
//! the interrupt line; they request an interrupt and the channel applies its
//! masking policy.

mod identify_device;
mod identify_packet_device;
mod init_dev_params;
mod packet;
mod read_dma;
mod security_unlock;
mod set_features;
mod write_dma;

pub use identify_device::IdentifyDevice;
pub use identify_packet_device::IdentifyPacketDevice;
pub use init_dev_params::InitDeviceParameters;
pub use packet::Packet;
pub use read_dma::ReadDma;
pub use security_unlock::SecurityUnlock;
pub use set_features::SetFeatures;
pub use write_dma::WriteDma;

use crate::device::AtaDevice;
use crate::regs::{AtaRegisters, ErrorBits, Status};

/// Outcome of one DMA transfer call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaTransfer {
    /// Data moved; the command expects more.
    Ok,
    /// The transfer is satisfied and the command completed.
    End,
    /// The command aborted; error state is in the registers.
    Error,
}

/// Command opcodes this controller implements [6.2].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    InitDeviceParameters = 0x91,
    Packet = 0xA0,
    IdentifyPacketDevice = 0xA1,
    ReadDma = 0xC8,
    WriteDma = 0xCA,
    IdentifyDevice = 0xEC,
    SetFeatures = 0xEF,
    SecurityUnlock = 0xF2,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x91 => Some(Opcode::InitDeviceParameters),
            0xA0 => Some(Opcode::Packet),
            0xA1 => Some(Opcode::IdentifyPacketDevice),
            0xC8 => Some(Opcode::ReadDma),
            0xCA => Some(Opcode::WriteDma),
            0xEC => Some(Opcode::IdentifyDevice),
            0xEF => Some(Opcode::SetFeatures),
            0xF2 => Some(Opcode::SecurityUnlock),
            _ => None,
        }
    }
}

pub type CommandFactory = fn() -> Box<dyn AtaCommand>;

/// Fixed opcode-to-constructor table. Resolved at compile time; lookups need
/// no synchronization.
pub fn factory_for(opcode: u8) -> Option<CommandFactory> {
    let factory: CommandFactory = match Opcode::from_u8(opcode)? {
        Opcode::InitDeviceParameters => || Box::new(InitDeviceParameters::new()),
        Opcode::Packet => || Box::new(Packet::new()),
        Opcode::IdentifyPacketDevice => || Box::new(IdentifyPacketDevice::new()),
        Opcode::ReadDma => || Box::new(ReadDma::new()),
        Opcode::WriteDma => || Box::new(WriteDma::new()),
        Opcode::IdentifyDevice => || Box::new(IdentifyDevice::new()),
        Opcode::SetFeatures => || Box::new(SetFeatures::new()),
        Opcode::SecurityUnlock => || Box::new(SecurityUnlock::new()),
    };
    Some(factory)
}

/// The narrow window a command sees: the shared register file, the selected
/// device, and a completion-interrupt request consumed by the channel after
/// each entry point.
pub struct CmdEnv<'a> {
    pub regs: &'a mut AtaRegisters,
    pub device: &'a mut AtaDevice,
    interrupt: bool,
}

impl<'a> CmdEnv<'a> {
    pub fn new(regs: &'a mut AtaRegisters, device: &'a mut AtaDevice) -> Self {
        Self {
            regs,
            device,
            interrupt: false,
        }
    }

    /// Command finished successfully; request the completion interrupt.
    pub fn complete(&mut self) {
        self.regs
            .set_status(Status::DRDY, Status::BSY | Status::DRQ);
        self.regs.clear_error();
        self.interrupt = true;
    }

    /// Command aborted with the given error bits; request the interrupt.
    pub fn abort(&mut self, bits: ErrorBits) {
        self.regs.set_error(bits);
        self.regs
            .set_status(Status::DRDY, Status::BSY | Status::DRQ);
        self.interrupt = true;
    }

    /// ATAPI check-condition abort: the sense key rides in the high nibble
    /// of the Error register [8.23.6].
    pub fn abort_packet(&mut self, sense_key: u8) {
        self.regs.set_interrupt_reason(true, true);
        self.regs.error = (sense_key << 4) | ErrorBits::ABRT.bits();
        self.regs.status |= Status::ERR.bits();
        self.regs
            .set_status(Status::DRDY, Status::BSY | Status::DRQ);
        self.interrupt = true;
    }

    /// Device has staged data for the host to read; DRQ plus interrupt.
    pub fn data_ready(&mut self) {
        self.regs
            .set_status(Status::DRDY | Status::DRQ, Status::BSY);
        self.regs.clear_error();
        self.interrupt = true;
    }

    /// Device awaits data from the host; DRQ without an interrupt.
    pub fn await_host_data(&mut self) {
        self.regs.set_status(Status::DRQ, Status::BSY);
        self.regs.clear_error();
    }

    /// Clear DRQ after the host drained a PIO-in buffer. No interrupt: the
    /// host already observed the transfer it asked for.
    pub fn end_data_phase(&mut self) {
        self.regs
            .set_status(Status::DRDY, Status::BSY | Status::DRQ);
    }

    pub(crate) fn take_interrupt_request(&mut self) -> bool {
        std::mem::take(&mut self.interrupt)
    }
}

/// One ATA/ATAPI command state machine.
pub trait AtaCommand: Send {
    /// Run the command up to its first suspension point (needs-host-data,
    /// needs-host-read, or immediate completion).
    fn begin(&mut self, env: &mut CmdEnv<'_>);

    /// Data register read while DRQ is set (PIO-in). `out` is zeroed by the
    /// channel; commands without staged data leave it that way.
    fn read_data(&mut self, _env: &mut CmdEnv<'_>, _out: &mut [u8]) {}

    /// Data register write while DRQ is set (PIO-out).
    fn write_data(&mut self, _env: &mut CmdEnv<'_>, _data: &[u8]) {}

    /// Host-driven DMA read (device to host).
    fn read_dma(&mut self, env: &mut CmdEnv<'_>, _out: &mut [u8]) -> DmaTransfer {
        env.abort(ErrorBits::ABRT);
        DmaTransfer::Error
    }

    /// Host-driven DMA write (host to device).
    fn write_dma(&mut self, env: &mut CmdEnv<'_>, _data: &[u8]) -> DmaTransfer {
        env.abort(ErrorBits::ABRT);
        DmaTransfer::Error
    }

    /// Completed or aborted; the channel drops the object once true.
    fn is_finished(&self) -> bool;
}

/// Staged data buffer with a read/write cursor — the per-command
/// remaining-byte counter behind PIO transfers.
#[derive(Debug, Default)]
pub(crate) struct DataBuffer {
    data: Vec<u8>,
    pos: usize,
}

impl DataBuffer {
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, pos: 0 }
    }

    /// Empty buffer expecting `len` bytes from the host.
    pub fn expecting(len: usize) -> Self {
        Self {
            data: vec![0; len],
            pos: 0,
        }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Copy staged bytes out, advancing the cursor. Returns bytes copied.
    pub fn read(&mut self, out: &mut [u8]) -> usize {
        let n = self.remaining().min(out.len());
        out[..n].copy_from_slice(&self.data[self.pos..self.pos + n]);
        self.pos += n;
        n
    }

    /// Copy host bytes in, advancing the cursor. Returns bytes consumed.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let n = self.remaining().min(src.len());
        self.data[self.pos..self.pos + n].copy_from_slice(&src[..n]);
        self.pos += n;
        n
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Truncate staged data to `len` bytes (driver produced fewer bytes than
    /// the allocation).
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}
