//! Command-port and control-port register file, shared by both devices on a
//! channel.
//!
//! [7.1]: "In this standard, the register contents go to both devices (and
//! their embedded controllers)." The channel therefore owns a single register
//! file; the Device/Head register selects which device responds.

use bitflags::bitflags;
use thiserror::Error;

bitflags! {
    /// Status register bits [7.15.6].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u8 {
        /// An error occurred; details are in the Error register.
        const ERR = 0x01;
        /// Data Request: the device is ready to transfer a word of data.
        const DRQ = 0x08;
        /// Device Ready.
        const DRDY = 0x40;
        /// Busy: the device owns the command block registers.
        const BSY = 0x80;
    }
}

bitflags! {
    /// Error register bits [7.11.6].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorBits: u8 {
        /// Media Change Request.
        const MCR = 0x08;
        /// Aborted command.
        const ABRT = 0x04;
        /// ID Not Found: the addressed sector is out of range.
        const IDNF = 0x10;
        /// Media Changed.
        const MC = 0x20;
    }
}

bitflags! {
    /// Device Control register bits [7.9.6].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeviceControl: u8 {
        /// Negate INTRQ: masks interrupt assertion while set.
        const NIEN = 0x02;
        /// Software reset.
        const SRST = 0x04;
    }
}

/// Device/Head register device-select bit [7.10.6].
const DEV_SELECT: u8 = 0x10;
/// Device/Head register LBA-mode bit.
const DEV_LBA: u8 = 0x40;

/// Command block and control block registers, named per [7].
///
/// `Error`/`Features` and `Status`/`Command` share an address; the direction
/// of the access picks the register, so reads of `Features`/`Command` and
/// writes of `Error`/`Status` are undefined accesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Data,
    Error,
    Features,
    SectorCount,
    LbaLow,
    LbaMid,
    LbaHigh,
    DeviceHead,
    Status,
    Command,
    /// Control block: Status without interrupt side effects.
    AltStatus,
    /// Control block: nIEN and SRST.
    DeviceControl,
}

impl Register {
    /// Decode a command block offset (0..=7) for a read access.
    pub fn from_read_offset(offset: u16) -> Option<Self> {
        match offset {
            0 => Some(Register::Data),
            1 => Some(Register::Error),
            2 => Some(Register::SectorCount),
            3 => Some(Register::LbaLow),
            4 => Some(Register::LbaMid),
            5 => Some(Register::LbaHigh),
            6 => Some(Register::DeviceHead),
            7 => Some(Register::Status),
            _ => None,
        }
    }

    /// Decode a command block offset (0..=7) for a write access.
    pub fn from_write_offset(offset: u16) -> Option<Self> {
        match offset {
            0 => Some(Register::Data),
            1 => Some(Register::Features),
            2 => Some(Register::SectorCount),
            3 => Some(Register::LbaLow),
            4 => Some(Register::LbaMid),
            5 => Some(Register::LbaHigh),
            6 => Some(Register::DeviceHead),
            7 => Some(Register::Command),
            _ => None,
        }
    }
}

/// A register access the channel refuses without touching any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AccessError {
    #[error("unsupported access width {size} for register {reg:?}")]
    UnsupportedWidth { reg: Register, size: u8 },
    #[error("offset {offset:#x} is outside the register block")]
    OffsetOutOfRange { offset: u16 },
}

/// The shared register file. Derived conditions (busy, ready, DRQ, error,
/// interrupts enabled) are always computed from the raw bytes; nothing is
/// stored twice.
#[derive(Debug, Clone)]
pub struct AtaRegisters {
    pub error: u8,
    pub features: u8,
    pub sector_count: u8,
    pub lba_low: u8,
    pub lba_mid: u8,
    pub lba_high: u8,
    pub device_head: u8,
    pub status: u8,
    pub control: u8,
}

impl AtaRegisters {
    pub fn new() -> Self {
        Self {
            error: 0,
            features: 0,
            sector_count: 0,
            lba_low: 0,
            lba_mid: 0,
            lba_high: 0,
            device_head: 0,
            status: Status::DRDY.bits(),
            control: 0,
        }
    }

    /// Index of the currently selected device (0 = master, 1 = slave).
    pub fn selected_device(&self) -> usize {
        usize::from((self.device_head & DEV_SELECT) != 0)
    }

    pub fn uses_lba(&self) -> bool {
        (self.device_head & DEV_LBA) != 0
    }

    /// 28-bit LBA assembled from the address registers [8.26.3].
    pub fn lba28(&self) -> u64 {
        ((self.device_head as u64 & 0x0F) << 24)
            | ((self.lba_high as u64) << 16)
            | ((self.lba_mid as u64) << 8)
            | self.lba_low as u64
    }

    /// Sector count for 28-bit commands; zero encodes 256 [8.27.3].
    pub fn sector_count28(&self) -> u32 {
        if self.sector_count == 0 {
            256
        } else {
            self.sector_count as u32
        }
    }

    // ----- Derived conditions ------------------------------------------------

    pub fn is_busy(&self) -> bool {
        (self.status & Status::BSY.bits()) != 0
    }

    pub fn is_ready(&self) -> bool {
        (self.status & Status::DRDY.bits()) != 0
    }

    pub fn data_request(&self) -> bool {
        (self.status & Status::DRQ.bits()) != 0
    }

    pub fn has_error(&self) -> bool {
        (self.status & Status::ERR.bits()) != 0
    }

    pub fn interrupts_enabled(&self) -> bool {
        (self.control & DeviceControl::NIEN.bits()) == 0
    }

    pub fn software_reset_requested(&self) -> bool {
        (self.control & DeviceControl::SRST.bits()) != 0
    }

    // ----- Status mutation ---------------------------------------------------

    pub fn set_status(&mut self, set: Status, clear: Status) {
        self.status = (self.status & !clear.bits()) | set.bits();
    }

    pub fn set_error(&mut self, bits: ErrorBits) {
        self.error = bits.bits();
        self.status |= Status::ERR.bits();
    }

    pub fn clear_error(&mut self) {
        self.error = 0;
        self.status &= !Status::ERR.bits();
    }

    // ----- ATAPI byte count / interrupt reason -------------------------------

    /// ATAPI byte count limit registers (LBA Mid/High) [8.23.3].
    pub fn byte_count_limit(&self) -> u16 {
        u16::from_le_bytes([self.lba_mid, self.lba_high])
    }

    pub fn set_byte_count(&mut self, count: u16) {
        let [lo, hi] = count.to_le_bytes();
        self.lba_mid = lo;
        self.lba_high = hi;
    }

    /// ATAPI interrupt reason (Sector Count register) [8.23.3]: bit 0 = CoD,
    /// bit 1 = IO.
    pub fn set_interrupt_reason(&mut self, cod: bool, io: bool) {
        self.sector_count = (u8::from(cod)) | (u8::from(io) << 1);
    }

    /// Place the device signature in the command block [9.1], as devices do
    /// after a software reset or a refused IDENTIFY DEVICE. Device selection
    /// is untouched: a refused IDENTIFY must leave the responding device
    /// selected so the host can read the signature back.
    pub fn set_signature(&mut self, packet_device: bool) {
        self.sector_count = 0x01;
        self.lba_low = 0x01;
        if packet_device {
            self.lba_mid = 0x14;
            self.lba_high = 0xEB;
        } else {
            self.lba_mid = 0x00;
            self.lba_high = 0x00;
        }
    }

    /// Reset the command block to its power-on state. The Device Control
    /// register is host-owned and survives.
    pub fn reset_command_block(&mut self) {
        let control = self.control;
        *self = Self::new();
        self.control = control;
    }
}

impl Default for AtaRegisters {
    fn default() -> Self {
        Self::new()
    }
}
