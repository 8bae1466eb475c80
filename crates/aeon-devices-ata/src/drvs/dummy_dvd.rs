//! DVD drive driver with no media in the tray.
//!
//! The drive itself responds normally (IDENTIFY PACKET DEVICE, INQUIRY,
//! REQUEST SENSE); anything touching the medium fails with NOT READY /
//! MEDIUM NOT PRESENT sense. The console firmware probes this state at boot
//! when the tray is empty.

use crate::atapi::{
    PacketInfo, Sense, ASC_MEDIUM_NOT_PRESENT, OP_INQUIRY, OP_PREVENT_ALLOW_REMOVAL,
    OP_REQUEST_SENSE, OP_START_STOP_UNIT, OP_TEST_UNIT_READY, SENSE_NOT_READY, SENSE_NO_SENSE,
};

use super::{dvd_common, AtaDeviceDriver, TransferMode, IDENTIFY_DATA_LEN};

pub struct NoMediaDvdDrive {
    sense: Sense,
}

impl NoMediaDvdDrive {
    pub fn new() -> Self {
        Self { sense: Sense::ok() }
    }

    fn not_ready(&mut self, packet: &mut PacketInfo) -> bool {
        self.sense = Sense::new(SENSE_NOT_READY, ASC_MEDIUM_NOT_PRESENT, 0);
        packet.sense = self.sense;
        false
    }
}

impl Default for NoMediaDvdDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaDeviceDriver for NoMediaDvdDrive {
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
            // Commands that do not reference the medium stay valid.
            OP_TEST_UNIT_READY | OP_REQUEST_SENSE | OP_INQUIRY | OP_START_STOP_UNIT
            | OP_PREVENT_ALLOW_REMOVAL => true,
            _ => self.not_ready(packet),
        }
    }

    fn process_atapi_non_data(&mut self, packet: &mut PacketInfo) -> bool {
        match packet.opcode() {
            OP_TEST_UNIT_READY => self.not_ready(packet),
            OP_START_STOP_UNIT | OP_PREVENT_ALLOW_REMOVAL => {
                self.sense = Sense::new(SENSE_NO_SENSE, 0, 0);
                true
            }
            _ => self.not_ready(packet),
        }
    }

    fn process_atapi_data_read(&mut self, packet: &mut PacketInfo, buf: &mut [u8]) -> Option<u32> {
        let payload = match packet.opcode() {
            OP_INQUIRY => dvd_common::inquiry_data(),
            OP_REQUEST_SENSE => {
                let block = self.sense.fixed_block().to_vec();
                // A successful REQUEST SENSE clears the pending sense.
                self.sense = Sense::ok();
                block
            }
            _ => {
                self.not_ready(packet);
                return None;
            }
        };

        let n = payload.len().min(buf.len());
        buf[..n].copy_from_slice(&payload[..n]);
        Some(n as u32)
    }

    fn process_atapi_data_write(&mut self, packet: &mut PacketInfo, _buf: &[u8]) -> bool {
        self.not_ready(packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::atapi::{PacketInfo, OP_READ_10, PACKET_LEN};

    fn packet(op: u8) -> PacketInfo {
        let mut cdb = [0u8; PACKET_LEN];
        cdb[0] = op;
        PacketInfo::decode(cdb)
    }

    #[test]
    fn medium_reads_are_rejected_as_not_ready() {
        let mut drv = NoMediaDvdDrive::new();
        let mut pkt = packet(OP_READ_10);
        assert!(!drv.validate_atapi_packet(&mut pkt));
        assert_eq!(pkt.sense.key, SENSE_NOT_READY);
        assert_eq!(pkt.sense.asc, ASC_MEDIUM_NOT_PRESENT);
    }

    #[test]
    fn test_unit_ready_reports_not_ready_then_sense_reads_back() {
        let mut drv = NoMediaDvdDrive::new();

        let mut tur = packet(OP_TEST_UNIT_READY);
        assert!(drv.validate_atapi_packet(&mut tur));
        assert!(!drv.process_atapi_non_data(&mut tur));

        let mut sense = packet(OP_REQUEST_SENSE);
        let mut buf = [0u8; 18];
        let n = drv
            .process_atapi_data_read(&mut sense, &mut buf)
            .expect("REQUEST SENSE must succeed");
        assert_eq!(n, 18);
        assert_eq!(buf[2] & 0x0F, SENSE_NOT_READY);
        assert_eq!(buf[12], ASC_MEDIUM_NOT_PRESENT);

        // Sense is cleared by the read.
        let mut again = [0u8; 18];
        drv.process_atapi_data_read(&mut packet(OP_REQUEST_SENSE), &mut again)
            .unwrap();
        assert_eq!(again[2] & 0x0F, SENSE_NO_SENSE);
    }

    #[test]
    fn inquiry_succeeds_without_media() {
        let mut drv = NoMediaDvdDrive::new();
        let mut pkt = packet(OP_INQUIRY);
        let mut buf = [0u8; 36];
        let n = drv.process_atapi_data_read(&mut pkt, &mut buf).unwrap();
        assert_eq!(n, 36);
        assert_eq!(buf[0], 0x05);
        assert_eq!(buf[1], 0x80);
    }
}
