//! CPU core selection.
//!
//! Cores register in a fixed built-in table rather than being discovered at
//! runtime; the machine refuses to start when the requested core (or any
//! core at all) is missing.

/// An execution engine the machine drives. The machine owns setup and
/// teardown; `run` returns when the guest halts.
pub trait CpuCore: Send {
    fn name(&self) -> &'static str;

    /// Execute until the guest halts or the core decides to stop.
    fn run(&mut self) -> Result<(), CpuHalt>;
}

/// Why a core stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpuHalt {
    /// The guest executed a halt with interrupts disabled.
    Wedged,
}

pub struct CpuCoreInfo {
    pub name: &'static str,
    pub build: fn() -> Box<dyn CpuCore>,
}

/// Placeholder core for device bring-up: runs nothing and halts immediately.
struct NullCore;

impl CpuCore for NullCore {
    fn name(&self) -> &'static str {
        "null"
    }

    fn run(&mut self) -> Result<(), CpuHalt> {
        Ok(())
    }
}

const CORES: &[CpuCoreInfo] = &[CpuCoreInfo {
    name: "null",
    build: || Box::new(NullCore),
}];

/// Every core compiled into this build.
pub fn available_cores() -> &'static [CpuCoreInfo] {
    CORES
}

/// Look up a core by name, or pick the first available one.
pub fn build_core(name: Option<&str>) -> Option<Box<dyn CpuCore>> {
    let info = match name {
        Some(name) => CORES.iter().find(|c| c.name == name)?,
        None => CORES.first()?,
    };
    Some((info.build)())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_core_is_first_in_the_table() {
        let core = build_core(None).unwrap();
        assert_eq!(core.name(), "null");
    }

    #[test]
    fn unknown_core_name_is_refused() {
        assert!(build_core(Some("missing")).is_none());
    }
}
