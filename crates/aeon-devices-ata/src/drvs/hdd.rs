//! ATA hard disk driver over a raw image.

use aeon_storage::{VirtualDisk, SECTOR_SIZE};

use super::{
    identify_words_to_bytes, put_ata_string, AtaDeviceDriver, TransferMode, IDENTIFY_DATA_LEN,
};

/// Fixed-disk driver backed by a [`VirtualDisk`] image.
pub struct ImageHardDrive {
    disk: Box<dyn VirtualDisk>,
    sector_count: u64,
    /// Logical translation programmed by INITIALIZE DEVICE PARAMETERS.
    heads: u8,
    sectors_per_track: u8,
    transfer_mode: TransferMode,
    security_unlock_attempts: u8,
    security_locked: bool,
}

impl ImageHardDrive {
    /// Maximum unlock attempts before the drive reports the counter expired
    /// [8.34.5]; the count only matters to diagnostics since the console's
    /// drives always accept the final unlock.
    const MAX_UNLOCK_ATTEMPTS: u8 = 5;

    pub fn new(disk: Box<dyn VirtualDisk>) -> Self {
        // LBA28 commands cannot address past 28 bits of sector index.
        let sector_count = (disk.capacity_bytes() / SECTOR_SIZE as u64).min(1 << 28);
        Self {
            disk,
            sector_count,
            heads: 16,
            sectors_per_track: 63,
            transfer_mode: TransferMode::UltraDma(2),
            security_unlock_attempts: 0,
            security_locked: true,
        }
    }

    pub fn is_locked(&self) -> bool {
        self.security_locked
    }
}

impl AtaDeviceDriver for ImageHardDrive {
    fn is_packet_device(&self) -> bool {
        false
    }

    fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]) {
        let mut words = [0u16; 256];

        words[0] = 0x0040; // fixed, non-removable ATA device

        // Default CHS translation.
        let cylinders = (self.sector_count
            / (self.heads as u64 * self.sectors_per_track as u64))
            .min(16383) as u16;
        words[1] = cylinders;
        words[3] = self.heads as u16;
        words[6] = self.sectors_per_track as u16;

        put_ata_string(&mut words[10..20], "AEON000000000000HDD1");
        put_ata_string(&mut words[23..27], "1.00");
        put_ata_string(&mut words[27..47], "AEON VIRTUAL HD");

        words[49] = (1 << 9) | (1 << 8); // LBA + DMA capable
        words[53] = 0x0007; // words 54-58, 64-70 and 88 are valid

        words[54] = cylinders;
        words[55] = self.heads as u16;
        words[56] = self.sectors_per_track as u16;

        let lba = self.sector_count as u32;
        words[60] = (lba & 0xFFFF) as u16;
        words[61] = (lba >> 16) as u16;

        words[63] = 0x0007; // MWDMA 0-2 supported
        words[80] = 0x0010; // ATA/ATAPI-4
        words[82] = 1 << 1; // security feature set

        words[88] = 0x001F; // UDMA 0-4 supported
        if let TransferMode::UltraDma(mode) = self.transfer_mode {
            words[88] |= 1 << (8 + u16::from(mode)); // currently selected mode
        }

        // Security status: feature supported + enabled; locked while the
        // firmware has not unlocked the drive yet.
        words[128] = 0x0003 | if self.security_locked { 0x0004 } else { 0 };
        if self.security_unlock_attempts >= Self::MAX_UNLOCK_ATTEMPTS {
            words[128] |= 0x0010; // unlock attempt counter expired
        }

        identify_words_to_bytes(&words, data);
    }

    fn sector_count(&self) -> u64 {
        self.sector_count
    }

    fn read_sectors(&mut self, lba: u64, buf: &mut [u8]) -> bool {
        // Media access is refused until SECURITY UNLOCK succeeds [8.34].
        !self.security_locked && self.disk.read_sectors(lba, SECTOR_SIZE, buf).is_ok()
    }

    fn write_sectors(&mut self, lba: u64, buf: &[u8]) -> bool {
        !self.security_locked && self.disk.write_sectors(lba, SECTOR_SIZE, buf).is_ok()
    }

    fn set_device_parameters(&mut self, heads: u8, sectors_per_track: u8) -> bool {
        if heads == 0 || heads > 16 || sectors_per_track == 0 || sectors_per_track > 63 {
            return false;
        }
        self.heads = heads;
        self.sectors_per_track = sectors_per_track;
        true
    }

    fn set_transfer_mode(&mut self, mode: TransferMode) -> bool {
        match mode {
            TransferMode::PioDefault | TransferMode::PioFlowControl(0..=4) => {}
            TransferMode::MultiwordDma(0..=2) => {}
            TransferMode::UltraDma(0..=4) => {}
            _ => return false,
        }
        self.transfer_mode = mode;
        true
    }

    fn security_unlock(&mut self, _password: &[u8]) -> bool {
        // The console's drives are locked with a per-unit password the
        // firmware always presents correctly, so the unlock itself cannot
        // fail; the attempt counter still advances for parity with hardware.
        self.security_unlock_attempts =
            (self.security_unlock_attempts + 1).min(Self::MAX_UNLOCK_ATTEMPTS);
        self.security_locked = false;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_storage::MemDisk;

    fn drive(sectors: u64) -> ImageHardDrive {
        let disk = MemDisk::new(sectors * SECTOR_SIZE as u64).unwrap();
        ImageHardDrive::new(Box::new(disk))
    }

    #[test]
    fn identify_reports_lba_sector_count() {
        let drv = drive(2048);
        let mut data = [0u8; IDENTIFY_DATA_LEN];
        drv.identify(&mut data);
        let lo = u16::from_le_bytes([data[120], data[121]]) as u32;
        let hi = u16::from_le_bytes([data[122], data[123]]) as u32;
        assert_eq!(lo | (hi << 16), 2048);
        // ATA device bit (word 0 bit 15) must be clear.
        assert_eq!(data[1] & 0x80, 0);
    }

    #[test]
    fn sector_io_round_trips() {
        let mut drv = drive(8);
        drv.security_unlock(&[0u8; 32]);
        let pattern = vec![0x5Au8; SECTOR_SIZE];
        assert!(drv.write_sectors(3, &pattern));
        let mut out = vec![0u8; SECTOR_SIZE];
        assert!(drv.read_sectors(3, &mut out));
        assert_eq!(out, pattern);
        assert!(!drv.read_sectors(8, &mut out));
    }

    #[test]
    fn device_parameters_validated() {
        let mut drv = drive(64);
        assert!(drv.set_device_parameters(16, 63));
        assert!(!drv.set_device_parameters(0, 63));
        assert!(!drv.set_device_parameters(17, 63));
        assert!(!drv.set_device_parameters(16, 64));
    }

    #[test]
    fn unlock_clears_security_lock() {
        let mut drv = drive(8);
        assert!(drv.is_locked());
        assert!(drv.security_unlock(&[0u8; 32]));
        assert!(!drv.is_locked());
    }

    #[test]
    fn locked_drive_refuses_media_access() {
        let mut drv = drive(8);
        let mut buf = vec![0u8; SECTOR_SIZE];
        assert!(!drv.read_sectors(0, &mut buf));
        assert!(!drv.write_sectors(0, &buf));
        drv.security_unlock(&[0u8; 32]);
        assert!(drv.read_sectors(0, &mut buf));
    }
}
