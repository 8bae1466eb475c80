//! Legacy interrupt routing.

use std::sync::Mutex;

use aeon_devices_ata::IrqLine;

/// Level-tracking stand-in for the interrupt controller pair: devices drive
/// lines through [`IrqLine`], the machine (and tests) observe the levels.
#[derive(Default)]
pub struct IrqRouter {
    levels: Mutex<[bool; 16]>,
}

impl IrqRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn level(&self, irq: u8) -> bool {
        let levels = match self.levels.lock() {
            Ok(levels) => levels,
            Err(poisoned) => poisoned.into_inner(),
        };
        levels.get(irq as usize).copied().unwrap_or(false)
    }
}

impl IrqLine for IrqRouter {
    fn set_irq(&self, irq: u8, asserted: bool) {
        let mut levels = match self.levels.lock() {
            Ok(levels) => levels,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(level) = levels.get_mut(irq as usize) {
            *level = asserted;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_follow_the_last_write() {
        let router = IrqRouter::new();
        assert!(!router.level(14));
        router.set_irq(14, true);
        assert!(router.level(14));
        router.set_irq(14, false);
        assert!(!router.level(14));
        // Out-of-range lines are ignored.
        router.set_irq(99, true);
        assert!(!router.level(99));
    }
}
