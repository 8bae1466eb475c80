//! SET FEATURES (EFh) [8.37].

use crate::cmds::{AtaCommand, CmdEnv};
use crate::drvs::TransferMode;
use crate::regs::ErrorBits;

const FEAT_SET_TRANSFER_MODE: u8 = 0x03;
const FEAT_ENABLE_WRITE_CACHE: u8 = 0x02;
const FEAT_DISABLE_WRITE_CACHE: u8 = 0x82;

pub struct SetFeatures {
    finished: bool,
}

impl SetFeatures {
    pub fn new() -> Self {
        Self { finished: false }
    }
}

impl Default for SetFeatures {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for SetFeatures {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        self.finished = true;
        match env.regs.features {
            FEAT_SET_TRANSFER_MODE => {
                let accepted = TransferMode::decode(env.regs.sector_count)
                    .is_some_and(|mode| env.device.driver_mut().set_transfer_mode(mode));
                if accepted {
                    env.complete();
                } else {
                    env.abort(ErrorBits::ABRT);
                }
            }
            // Writes are already synchronous in this model; caching toggles
            // are accepted as no-ops.
            FEAT_ENABLE_WRITE_CACHE | FEAT_DISABLE_WRITE_CACHE => env.complete(),
            _ => env.abort(ErrorBits::ABRT),
        }
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
