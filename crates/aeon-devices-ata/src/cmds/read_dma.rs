//! READ DMA (C8h) [8.26].

use aeon_storage::SECTOR_SIZE;

use crate::cmds::{AtaCommand, CmdEnv, DataBuffer, DmaTransfer};
use crate::regs::ErrorBits;

/// Streams sectors from the device driver into host-sized DMA chunks. One
/// sector is staged at a time so chunk boundaries need not align with sector
/// boundaries.
pub struct ReadDma {
    lba: u64,
    remaining_sectors: u32,
    stage: DataBuffer,
    finished: bool,
}

impl ReadDma {
    pub fn new() -> Self {
        Self {
            lba: 0,
            remaining_sectors: 0,
            stage: DataBuffer::default(),
            finished: false,
        }
    }
}

impl Default for ReadDma {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for ReadDma {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            self.finished = true;
            return;
        }
        let lba = env.regs.lba28();
        let count = env.regs.sector_count28();
        // LBA only; CHS addressing is refused rather than translated. Range
        // check up front: a transfer that would run off the end fails before
        // any data moves [8.26.4].
        if !env.regs.uses_lba() || lba + u64::from(count) > env.device.sector_count() {
            env.abort(ErrorBits::ABRT | ErrorBits::IDNF);
            self.finished = true;
            return;
        }
        self.lba = lba;
        self.remaining_sectors = count;
        // DMARQ phase: the host engine now pulls data via read_dma calls.
        env.regs.set_status(crate::regs::Status::DRQ, crate::regs::Status::BSY);
    }

    fn read_dma(&mut self, env: &mut CmdEnv<'_>, out: &mut [u8]) -> DmaTransfer {
        if self.finished {
            return DmaTransfer::Error;
        }
        let mut produced = 0;
        while produced < out.len() {
            if self.stage.is_exhausted() {
                if self.remaining_sectors == 0 {
                    break;
                }
                let mut sector = vec![0u8; SECTOR_SIZE];
                if !env.device.driver_mut().read_sectors(self.lba, &mut sector) {
                    env.abort(ErrorBits::ABRT);
                    self.finished = true;
                    return DmaTransfer::Error;
                }
                self.stage = DataBuffer::from_vec(sector);
                self.lba += 1;
                self.remaining_sectors -= 1;
            }
            produced += self.stage.read(&mut out[produced..]);
        }
        if self.remaining_sectors == 0 && self.stage.is_exhausted() {
            self.finished = true;
            env.complete();
            DmaTransfer::End
        } else {
            DmaTransfer::Ok
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
