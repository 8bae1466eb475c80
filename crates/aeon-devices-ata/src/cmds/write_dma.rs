//! WRITE DMA (CAh) [8.45].

use aeon_storage::SECTOR_SIZE;

use crate::cmds::{AtaCommand, CmdEnv, DataBuffer, DmaTransfer};
use crate::regs::ErrorBits;

/// Accumulates host DMA chunks into full sectors and commits each sector to
/// the driver as it fills. Bytes past the requested transfer are discarded.
pub struct WriteDma {
    lba: u64,
    remaining_sectors: u32,
    stage: DataBuffer,
    finished: bool,
}

impl WriteDma {
    pub fn new() -> Self {
        Self {
            lba: 0,
            remaining_sectors: 0,
            stage: DataBuffer::default(),
            finished: false,
        }
    }

    fn commit_sector(&mut self, env: &mut CmdEnv<'_>) -> bool {
        let sector = std::mem::take(&mut self.stage);
        if !env
            .device
            .driver_mut()
            .write_sectors(self.lba, sector.as_slice())
        {
            env.abort(ErrorBits::ABRT);
            self.finished = true;
            return false;
        }
        self.lba += 1;
        self.remaining_sectors -= 1;
        if self.remaining_sectors > 0 {
            self.stage = DataBuffer::expecting(SECTOR_SIZE);
        }
        true
    }
}

impl Default for WriteDma {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for WriteDma {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            self.finished = true;
            return;
        }
        let lba = env.regs.lba28();
        let count = env.regs.sector_count28();
        if !env.regs.uses_lba() || lba + u64::from(count) > env.device.sector_count() {
            env.abort(ErrorBits::ABRT | ErrorBits::IDNF);
            self.finished = true;
            return;
        }
        self.lba = lba;
        self.remaining_sectors = count;
        self.stage = DataBuffer::expecting(SECTOR_SIZE);
        env.regs.set_status(crate::regs::Status::DRQ, crate::regs::Status::BSY);
    }

    fn write_dma(&mut self, env: &mut CmdEnv<'_>, data: &[u8]) -> DmaTransfer {
        if self.finished {
            return DmaTransfer::Error;
        }
        let mut consumed = 0;
        while consumed < data.len() && self.remaining_sectors > 0 {
            consumed += self.stage.write(&data[consumed..]);
            if self.stage.is_exhausted() && !self.commit_sector(env) {
                return DmaTransfer::Error;
            }
        }
        if self.remaining_sectors == 0 {
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
