//! IDENTIFY PACKET DEVICE (A1h) [8.13].

use crate::cmds::{AtaCommand, CmdEnv, DataBuffer};
use crate::regs::ErrorBits;

pub struct IdentifyPacketDevice {
    data: DataBuffer,
    finished: bool,
}

impl IdentifyPacketDevice {
    pub fn new() -> Self {
        Self {
            data: DataBuffer::default(),
            finished: false,
        }
    }
}

impl Default for IdentifyPacketDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for IdentifyPacketDevice {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if !env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            self.finished = true;
            return;
        }
        self.data = DataBuffer::from_vec(env.device.identify().to_vec());
        env.data_ready();
    }

    fn read_data(&mut self, env: &mut CmdEnv<'_>, out: &mut [u8]) {
        self.data.read(out);
        if self.data.is_exhausted() {
            env.end_data_phase();
            self.finished = true;
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
