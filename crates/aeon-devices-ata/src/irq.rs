//! Interrupt line plumbing between a channel and the machine.
//!
//! The channel owns a level-style INTRQ line [5.2.9]. Assertion and negation
//! happen only inside the channel's dispatch paths; the machine observes the
//! line through an [`IrqLine`] sink and auxiliary [`InterruptHook`]s.

/// Sink for channel IRQ line transitions (the machine's interrupt
/// controller). Implementations must tolerate being called from whichever
/// thread drives channel I/O, including a DMA worker.
pub trait IrqLine: Send + Sync {
    fn set_irq(&self, irq: u8, asserted: bool);
}

/// Secondary observer of interrupt line transitions (debug tooling, tests).
///
/// Hooks see *every* transition, in registration order, before the triggering
/// channel call returns.
pub trait InterruptHook: Send + Sync {
    fn on_interrupt(&self, asserted: bool);
}

/// An [`IrqLine`] that drops transitions; used for channels whose IRQ output
/// is not wired up (and by unit tests that only inspect register state).
pub struct UnwiredIrqLine;

impl IrqLine for UnwiredIrqLine {
    fn set_irq(&self, _irq: u8, _asserted: bool) {}
}
