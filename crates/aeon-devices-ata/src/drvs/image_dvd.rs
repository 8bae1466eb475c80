//! DVD drive driver backed by a raw 2048-byte-sector image.

use aeon_storage::VirtualDisk;

use crate::atapi::{
    PacketInfo, Sense, ATAPI_SECTOR_SIZE, ASC_INVALID_COMMAND, ASC_INVALID_FIELD_IN_CDB,
    ASC_LBA_OUT_OF_RANGE, ASC_MEDIUM_CHANGED, OP_INQUIRY, OP_MODE_SENSE_10,
    OP_PREVENT_ALLOW_REMOVAL, OP_READ_10, OP_READ_12, OP_READ_CAPACITY, OP_READ_TOC,
    OP_REQUEST_SENSE, OP_START_STOP_UNIT, OP_TEST_UNIT_READY, SENSE_ILLEGAL_REQUEST,
    SENSE_UNIT_ATTENTION,
};

use super::{dvd_common, AtaDeviceDriver, TransferMode, IDENTIFY_DATA_LEN};

/// DVD drive with mounted media.
pub struct ImageDvdDrive {
    media: Box<dyn VirtualDisk>,
    sector_count: u32,
    sense: Sense,
    /// A freshly mounted disc reports UNIT ATTENTION / MEDIUM CHANGED once,
    /// which is how guests notice the medium under them moved.
    media_changed: bool,
}

impl ImageDvdDrive {
    pub fn new(media: Box<dyn VirtualDisk>) -> Result<Self, aeon_storage::DiskError> {
        let capacity = media.capacity_bytes();
        if !capacity.is_multiple_of(ATAPI_SECTOR_SIZE as u64) {
            return Err(aeon_storage::DiskError::InvalidImage(
                "capacity is not a multiple of 2048-byte sectors",
            ));
        }
        let sector_count = u32::try_from(capacity / ATAPI_SECTOR_SIZE as u64)
            .map_err(|_| aeon_storage::DiskError::InvalidImage("image exceeds 32-bit LBA range"))?;
        Ok(Self {
            media,
            sector_count,
            sense: Sense::ok(),
            media_changed: true,
        })
    }

    fn check_attention(&mut self, packet: &mut PacketInfo) -> bool {
        if self.media_changed {
            self.media_changed = false;
            self.sense = Sense::new(SENSE_UNIT_ATTENTION, ASC_MEDIUM_CHANGED, 0);
            packet.sense = self.sense;
            return false;
        }
        true
    }

    fn illegal(&mut self, packet: &mut PacketInfo, asc: u8) -> bool {
        self.sense = Sense::new(SENSE_ILLEGAL_REQUEST, asc, 0);
        packet.sense = self.sense;
        false
    }

    fn read_capacity_data(&self) -> Vec<u8> {
        let last_lba = self.sector_count.saturating_sub(1);
        let mut out = vec![0u8; 8];
        out[..4].copy_from_slice(&last_lba.to_be_bytes());
        out[4..].copy_from_slice(&(ATAPI_SECTOR_SIZE as u32).to_be_bytes());
        out
    }

    fn read_toc_data(&self) -> Vec<u8> {
        // Header + track 1 descriptor + lead-out descriptor.
        let mut out = vec![0u8; 20];
        out[0..2].copy_from_slice(&18u16.to_be_bytes());
        out[2] = 1; // first track
        out[3] = 1; // last track

        out[5] = 0x14; // ADR=1, control=4 (data track)
        out[6] = 0x01;

        out[13] = 0x14;
        out[14] = 0xAA; // lead-out
        out[16..20].copy_from_slice(&self.sector_count.to_be_bytes());
        out
    }

    fn mode_sense_data(&self) -> Vec<u8> {
        // Mode page 0x2A, CD/DVD capabilities, mostly-zero read-only page.
        let mut page = vec![0u8; 0x16];
        page[0] = 0x2A;
        page[1] = (page.len() - 2) as u8;
        page[2] = 0x01;

        let mut out = vec![0u8; 8 + page.len()];
        let mdl = (out.len() - 2) as u16;
        out[0..2].copy_from_slice(&mdl.to_be_bytes());
        out[3] = 0x80; // write protected
        out[8..].copy_from_slice(&page);
        out
    }

    fn read_blocks(&mut self, packet: &mut PacketInfo, lba: u32, buf: &mut [u8]) -> Option<u32> {
        let blocks = buf.len() / ATAPI_SECTOR_SIZE;
        let end = u64::from(lba) + blocks as u64;
        if end > u64::from(self.sector_count) {
            self.illegal(packet, ASC_LBA_OUT_OF_RANGE);
            return None;
        }
        let byte_len = blocks * ATAPI_SECTOR_SIZE;
        if self
            .media
            .read_sectors(u64::from(lba), ATAPI_SECTOR_SIZE, &mut buf[..byte_len])
            .is_err()
        {
            self.illegal(packet, ASC_LBA_OUT_OF_RANGE);
            return None;
        }
        self.sense = Sense::ok();
        Some(byte_len as u32)
    }
}

impl AtaDeviceDriver for ImageDvdDrive {
    fn is_packet_device(&self) -> bool {
        true
    }

    fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]) {
        dvd_common::identify_packet_device(data);
    }

    fn set_transfer_mode(&mut self, mode: TransferMode) -> bool {
        matches!(
            mode,
            TransferMode::PioDefault
                | TransferMode::PioFlowControl(0..=4)
                | TransferMode::MultiwordDma(0..=2)
                | TransferMode::UltraDma(0..=2)
        )
    }

    fn validate_atapi_packet(&mut self, packet: &mut PacketInfo) -> bool {
        match packet.opcode() {
            // REQUEST SENSE and INQUIRY must not be perturbed by a pending
            // unit attention; they are how the guest learns about it.
            OP_REQUEST_SENSE | OP_INQUIRY => true,
            OP_TEST_UNIT_READY | OP_START_STOP_UNIT | OP_PREVENT_ALLOW_REMOVAL => true,
            OP_READ_CAPACITY | OP_READ_TOC | OP_MODE_SENSE_10 => self.check_attention(packet),
            OP_READ_10 | OP_READ_12 => {
                if !self.check_attention(packet) {
                    return false;
                }
                let blocks = packet.transfer_len / ATAPI_SECTOR_SIZE as u32;
                if u64::from(packet.lba()) + u64::from(blocks) > u64::from(self.sector_count) {
                    return self.illegal(packet, ASC_LBA_OUT_OF_RANGE);
                }
                true
            }
            _ => self.illegal(packet, ASC_INVALID_COMMAND),
        }
    }

    fn process_atapi_non_data(&mut self, packet: &mut PacketInfo) -> bool {
        match packet.opcode() {
            OP_TEST_UNIT_READY => {
                if !self.check_attention(packet) {
                    return false;
                }
                self.sense = Sense::ok();
                true
            }
            OP_START_STOP_UNIT | OP_PREVENT_ALLOW_REMOVAL => true,
            _ => self.illegal(packet, ASC_INVALID_COMMAND),
        }
    }

    fn process_atapi_data_read(&mut self, packet: &mut PacketInfo, buf: &mut [u8]) -> Option<u32> {
        let payload = match packet.opcode() {
            OP_INQUIRY => dvd_common::inquiry_data(),
            OP_REQUEST_SENSE => {
                let block = self.sense.fixed_block().to_vec();
                self.sense = Sense::ok();
                block
            }
            OP_READ_CAPACITY => self.read_capacity_data(),
            OP_READ_TOC => self.read_toc_data(),
            OP_MODE_SENSE_10 => {
                let page_code = packet.cdb[2] & 0x3F;
                if page_code != 0x2A && page_code != 0x3F {
                    self.illegal(packet, ASC_INVALID_FIELD_IN_CDB);
                    return None;
                }
                self.mode_sense_data()
            }
            OP_READ_10 | OP_READ_12 => {
                let lba = packet.lba();
                return self.read_blocks(packet, lba, buf);
            }
            _ => {
                self.illegal(packet, ASC_INVALID_COMMAND);
                return None;
            }
        };

        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Some(n as u32)
    }

    fn process_atapi_data_write(&mut self, packet: &mut PacketInfo, _buf: &[u8]) -> bool {
        // Read-only medium.
        self.illegal(packet, ASC_INVALID_COMMAND)
    }
}
