//! ATAPI packet framing: the SCSI-style command descriptor block tunneled
//! through the PACKET command, plus the sense machinery drivers report
//! errors with.

/// ATAPI packets on this hardware are always 12 bytes [8.23].
pub const PACKET_LEN: usize = 12;

/// ATAPI media sector size (Mode 1 / ISO user data).
pub const ATAPI_SECTOR_SIZE: usize = 2048;

// SCSI operation codes (the MMC subset console firmware issues).
pub const OP_TEST_UNIT_READY: u8 = 0x00;
pub const OP_REQUEST_SENSE: u8 = 0x03;
pub const OP_INQUIRY: u8 = 0x12;
pub const OP_START_STOP_UNIT: u8 = 0x1B;
pub const OP_PREVENT_ALLOW_REMOVAL: u8 = 0x1E;
pub const OP_READ_CAPACITY: u8 = 0x25;
pub const OP_READ_10: u8 = 0x28;
pub const OP_READ_TOC: u8 = 0x43;
pub const OP_MODE_SENSE_10: u8 = 0x5A;
pub const OP_READ_12: u8 = 0xA8;

// Sense keys.
pub const SENSE_NO_SENSE: u8 = 0x00;
pub const SENSE_NOT_READY: u8 = 0x02;
pub const SENSE_ILLEGAL_REQUEST: u8 = 0x05;
pub const SENSE_UNIT_ATTENTION: u8 = 0x06;

// Additional sense codes.
pub const ASC_INVALID_COMMAND: u8 = 0x20;
pub const ASC_LBA_OUT_OF_RANGE: u8 = 0x21;
pub const ASC_INVALID_FIELD_IN_CDB: u8 = 0x24;
pub const ASC_MEDIUM_CHANGED: u8 = 0x28;
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

/// Direction of a packet's data phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    NonData,
    DataIn,
    DataOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub fn ok() -> Self {
        Self {
            key: SENSE_NO_SENSE,
            asc: 0,
            ascq: 0,
        }
    }

    pub fn new(key: u8, asc: u8, ascq: u8) -> Self {
        Self { key, asc, ascq }
    }

    pub fn is_ok(&self) -> bool {
        self.key == SENSE_NO_SENSE
    }

    /// Fixed-format sense data block [SPC REQUEST SENSE].
    pub fn fixed_block(&self) -> [u8; 18] {
        let mut data = [0u8; 18];
        data[0] = 0x70; // current errors, fixed format
        data[2] = self.key & 0x0F;
        data[7] = 10; // additional sense length
        data[12] = self.asc;
        data[13] = self.ascq;
        data
    }
}

/// A decoded packet: the raw CDB plus the transfer framing the command object
/// needs, and the sense outcome the driver fills in.
#[derive(Debug, Clone)]
pub struct PacketInfo {
    pub cdb: [u8; PACKET_LEN],
    pub kind: TransferKind,
    /// Total bytes the data phase moves (0 for non-data packets). For
    /// allocation-length commands this is the guest's allocation length; the
    /// driver may produce fewer bytes.
    pub transfer_len: u32,
    pub sense: Sense,
}

impl PacketInfo {
    pub fn decode(cdb: [u8; PACKET_LEN]) -> Self {
        let (kind, transfer_len) = match cdb[0] {
            OP_TEST_UNIT_READY | OP_START_STOP_UNIT | OP_PREVENT_ALLOW_REMOVAL => {
                (TransferKind::NonData, 0)
            }
            OP_REQUEST_SENSE | OP_INQUIRY => (TransferKind::DataIn, cdb[4] as u32),
            OP_MODE_SENSE_10 | OP_READ_TOC => (
                TransferKind::DataIn,
                u16::from_be_bytes([cdb[7], cdb[8]]) as u32,
            ),
            OP_READ_CAPACITY => (TransferKind::DataIn, 8),
            OP_READ_10 => {
                let blocks = u16::from_be_bytes([cdb[7], cdb[8]]) as u32;
                (
                    TransferKind::DataIn,
                    blocks.saturating_mul(ATAPI_SECTOR_SIZE as u32),
                )
            }
            OP_READ_12 => {
                let blocks = u32::from_be_bytes([cdb[6], cdb[7], cdb[8], cdb[9]]);
                (
                    TransferKind::DataIn,
                    blocks.saturating_mul(ATAPI_SECTOR_SIZE as u32),
                )
            }
            // Unknown opcodes carry no data phase; validation rejects them.
            _ => (TransferKind::NonData, 0),
        };

        Self {
            cdb,
            kind,
            transfer_len,
            sense: Sense::ok(),
        }
    }

    pub fn opcode(&self) -> u8 {
        self.cdb[0]
    }

    pub fn set_sense(&mut self, key: u8, asc: u8, ascq: u8) {
        self.sense = Sense::new(key, asc, ascq);
    }

    /// LBA field of READ(10)/READ(12)-shaped CDBs.
    pub fn lba(&self) -> u32 {
        u32::from_be_bytes([self.cdb[2], self.cdb[3], self.cdb[4], self.cdb[5]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cdb(op: u8) -> [u8; PACKET_LEN] {
        let mut c = [0u8; PACKET_LEN];
        c[0] = op;
        c
    }

    #[test]
    fn read_10_frames_block_transfer() {
        let mut c = cdb(OP_READ_10);
        c[2..6].copy_from_slice(&16u32.to_be_bytes());
        c[7..9].copy_from_slice(&3u16.to_be_bytes());
        let info = PacketInfo::decode(c);
        assert_eq!(info.kind, TransferKind::DataIn);
        assert_eq!(info.transfer_len, 3 * ATAPI_SECTOR_SIZE as u32);
        assert_eq!(info.lba(), 16);
    }

    #[test]
    fn request_sense_uses_allocation_length() {
        let mut c = cdb(OP_REQUEST_SENSE);
        c[4] = 18;
        let info = PacketInfo::decode(c);
        assert_eq!(info.kind, TransferKind::DataIn);
        assert_eq!(info.transfer_len, 18);
    }

    #[test]
    fn test_unit_ready_is_non_data() {
        let info = PacketInfo::decode(cdb(OP_TEST_UNIT_READY));
        assert_eq!(info.kind, TransferKind::NonData);
        assert_eq!(info.transfer_len, 0);
    }

    #[test]
    fn fixed_sense_block_layout() {
        let sense = Sense::new(SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT, 0);
        let block = sense.fixed_block();
        assert_eq!(block[0], 0x70);
        assert_eq!(block[2], SENSE_NOT_READY);
        assert_eq!(block[12], ASC_MEDIUM_NOT_PRESENT);
    }
}
