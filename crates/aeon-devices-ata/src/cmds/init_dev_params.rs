//! INITIALIZE DEVICE PARAMETERS (91h) [8.16].

use crate::cmds::{AtaCommand, CmdEnv};
use crate::regs::ErrorBits;

/// Sets the logical head and sectors-per-track translation. Completes or
/// aborts synchronously in `begin`; there is no data phase.
pub struct InitDeviceParameters {
    finished: bool,
}

impl InitDeviceParameters {
    pub fn new() -> Self {
        Self { finished: false }
    }
}

impl Default for InitDeviceParameters {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for InitDeviceParameters {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        self.finished = true;
        if env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            return;
        }
        // Device/Head low nibble encodes heads-1; Sector Count carries the
        // sectors per track, where zero is not a valid geometry [8.16.3].
        let heads = (env.regs.device_head & 0x0F) + 1;
        let sectors_per_track = env.regs.sector_count;
        if sectors_per_track == 0 {
            env.abort(ErrorBits::ABRT);
            return;
        }
        if env
            .device
            .driver_mut()
            .set_device_parameters(heads, sectors_per_track)
        {
            env.complete();
        } else {
            env.abort(ErrorBits::ABRT);
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
