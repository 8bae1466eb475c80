//! Device driver strategies: the media-specific backends behind a channel's
//! device slots.
//!
//! The channel and command objects own protocol framing and error
//! translation; a driver owns medium semantics. ATA disk drivers implement
//! the sector operations and leave the ATAPI methods at their failing
//! defaults; packet-device drivers do the reverse.

mod dummy_dvd;
mod dvd_common;
mod hdd;
mod image_dvd;

pub use dummy_dvd::NoMediaDvdDrive;
pub use hdd::ImageHardDrive;
pub use image_dvd::ImageDvdDrive;

use crate::atapi::{PacketInfo, SENSE_ILLEGAL_REQUEST};

/// Length of the IDENTIFY (PACKET) DEVICE data block [8.12.8].
pub const IDENTIFY_DATA_LEN: usize = 512;

/// Transfer modes accepted by SET FEATURES subcommand 03h [8.37.10].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    PioDefault,
    PioFlowControl(u8),
    MultiwordDma(u8),
    UltraDma(u8),
}

impl TransferMode {
    /// Decode a Sector Count register value written for subcommand 03h.
    pub fn decode(value: u8) -> Option<Self> {
        match value & 0xF8 {
            0x00 if value <= 0x01 => Some(TransferMode::PioDefault),
            0x08 => Some(TransferMode::PioFlowControl(value & 0x07)),
            0x20 => Some(TransferMode::MultiwordDma(value & 0x07)),
            0x40 => Some(TransferMode::UltraDma(value & 0x07)),
            _ => None,
        }
    }
}

/// Media backend strategy bound to one device slot.
///
/// Boolean returns follow the hardware contract: `false` means the operation
/// failed and the caller reflects that into the error/status registers (or,
/// for ATAPI, into the sense data left in the [`PacketInfo`]). Drivers never
/// see the register file.
pub trait AtaDeviceDriver: Send {
    /// Whether a device responds in this slot at all.
    fn is_attached(&self) -> bool {
        true
    }

    /// ATAPI packet device (responds to PACKET / IDENTIFY PACKET DEVICE).
    fn is_packet_device(&self) -> bool;

    /// Fill the 512-byte identification block for IDENTIFY DEVICE or
    /// IDENTIFY PACKET DEVICE, whichever matches the device class.
    fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]);

    /// Addressable sectors (512-byte units for ATA disks).
    fn sector_count(&self) -> u64 {
        0
    }

    fn read_sectors(&mut self, _lba: u64, _buf: &mut [u8]) -> bool {
        false
    }

    fn write_sectors(&mut self, _lba: u64, _buf: &[u8]) -> bool {
        false
    }

    /// INITIALIZE DEVICE PARAMETERS: record a logical head/sector
    /// translation, rejecting geometries the medium cannot express.
    fn set_device_parameters(&mut self, _heads: u8, _sectors_per_track: u8) -> bool {
        false
    }

    /// SET FEATURES subcommand 03h.
    fn set_transfer_mode(&mut self, _mode: TransferMode) -> bool {
        false
    }

    /// SECURITY UNLOCK with the 512-byte password block's password field.
    fn security_unlock(&mut self, _password: &[u8]) -> bool {
        false
    }

    // ----- ATAPI ------------------------------------------------------------

    /// Check a decoded packet before any data phase. On `false` the command
    /// aborts check-condition style with the sense left in `packet`.
    fn validate_atapi_packet(&mut self, packet: &mut PacketInfo) -> bool {
        packet.set_sense(SENSE_ILLEGAL_REQUEST, crate::atapi::ASC_INVALID_COMMAND, 0);
        false
    }

    fn process_atapi_non_data(&mut self, packet: &mut PacketInfo) -> bool {
        packet.set_sense(SENSE_ILLEGAL_REQUEST, crate::atapi::ASC_INVALID_COMMAND, 0);
        false
    }

    /// Produce the packet's data-in payload into `buf`, returning the byte
    /// count actually produced (bounded by `buf.len()`).
    fn process_atapi_data_read(&mut self, packet: &mut PacketInfo, _buf: &mut [u8]) -> Option<u32> {
        packet.set_sense(SENSE_ILLEGAL_REQUEST, crate::atapi::ASC_INVALID_COMMAND, 0);
        None
    }

    /// Consume the packet's data-out payload from `buf`.
    fn process_atapi_data_write(&mut self, packet: &mut PacketInfo, _buf: &[u8]) -> bool {
        packet.set_sense(SENSE_ILLEGAL_REQUEST, crate::atapi::ASC_INVALID_COMMAND, 0);
        false
    }
}

/// Driver for an empty device slot: nothing responds.
pub struct AbsentDriver;

impl AtaDeviceDriver for AbsentDriver {
    fn is_attached(&self) -> bool {
        false
    }

    fn is_packet_device(&self) -> bool {
        false
    }

    fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]) {
        data.fill(0);
    }
}

/// Write an ATA identify string: space-padded ASCII with the two characters
/// of each word swapped [8.12.8].
pub(crate) fn put_ata_string(words: &mut [u16], s: &str) {
    let bytes = s.as_bytes();
    for (i, word) in words.iter_mut().enumerate() {
        let hi = bytes.get(i * 2).copied().unwrap_or(b' ');
        let lo = bytes.get(i * 2 + 1).copied().unwrap_or(b' ');
        *word = u16::from_be_bytes([hi, lo]);
    }
}

/// Serialize an identify word array into the guest-visible little-endian
/// byte block.
pub(crate) fn identify_words_to_bytes(words: &[u16; 256], data: &mut [u8; IDENTIFY_DATA_LEN]) {
    for (i, w) in words.iter().enumerate() {
        data[i * 2..i * 2 + 2].copy_from_slice(&w.to_le_bytes());
    }
}

/// Space-padded plain ASCII, as SCSI INQUIRY wants it.
pub(crate) fn put_scsi_ascii(dst: &mut [u8], src: &[u8]) {
    dst.fill(b' ');
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_mode_decoding() {
        assert_eq!(TransferMode::decode(0x00), Some(TransferMode::PioDefault));
        assert_eq!(
            TransferMode::decode(0x0C),
            Some(TransferMode::PioFlowControl(4))
        );
        assert_eq!(
            TransferMode::decode(0x22),
            Some(TransferMode::MultiwordDma(2))
        );
        assert_eq!(TransferMode::decode(0x42), Some(TransferMode::UltraDma(2)));
        assert_eq!(TransferMode::decode(0x80), None);
        assert_eq!(TransferMode::decode(0x13), None);
    }

    #[test]
    fn ata_strings_swap_characters_within_words() {
        let mut words = [0u16; 4];
        put_ata_string(&mut words, "AB");
        // "AB" then space padding; each word holds [even, odd] big-endian.
        assert_eq!(words[0], u16::from_be_bytes([b'A', b'B']));
        assert_eq!(words[1], u16::from_be_bytes([b' ', b' ']));
    }
}
