//! SECURITY UNLOCK (F2h) [8.34].
//!
//! The host sends a 512-byte password block over PIO-out; word 0 selects the
//! user or master password, words 1..=16 hold the password itself.

use crate::cmds::{AtaCommand, CmdEnv, DataBuffer};
use crate::regs::ErrorBits;

const PASSWORD_BLOCK_LEN: usize = 512;
/// Byte range of the password field within the block.
const PASSWORD_FIELD: std::ops::Range<usize> = 2..34;

pub struct SecurityUnlock {
    block: DataBuffer,
    finished: bool,
}

impl SecurityUnlock {
    pub fn new() -> Self {
        Self {
            block: DataBuffer::expecting(PASSWORD_BLOCK_LEN),
            finished: false,
        }
    }
}

impl Default for SecurityUnlock {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for SecurityUnlock {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            self.finished = true;
            return;
        }
        env.await_host_data();
    }

    fn write_data(&mut self, env: &mut CmdEnv<'_>, data: &[u8]) {
        self.block.write(data);
        if !self.block.is_exhausted() {
            return;
        }
        self.finished = true;
        let password = &self.block.as_slice()[PASSWORD_FIELD];
        if env.device.driver_mut().security_unlock(password) {
            env.complete();
        } else {
            env.abort(ErrorBits::ABRT);
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
