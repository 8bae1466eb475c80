//! IDENTIFY DEVICE (ECh) [8.12].

use crate::cmds::{AtaCommand, CmdEnv, DataBuffer};
use crate::regs::ErrorBits;

pub struct IdentifyDevice {
    data: DataBuffer,
    finished: bool,
}

impl IdentifyDevice {
    pub fn new() -> Self {
        Self {
            data: DataBuffer::default(),
            finished: false,
        }
    }
}

impl Default for IdentifyDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for IdentifyDevice {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if env.device.is_packet_device() {
            // Packet devices post their signature and abort so the host
            // learns to send IDENTIFY PACKET DEVICE instead [8.12.5.2].
            env.regs.set_signature(true);
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
