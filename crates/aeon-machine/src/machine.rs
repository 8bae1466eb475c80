//! Port decode and machine assembly.

use std::sync::Arc;

use aeon_devices_ata::drvs::{ImageDvdDrive, ImageHardDrive, NoMediaDvdDrive};
use aeon_devices_ata::{AtaChannel, ChannelId};
use aeon_storage::{DiskError, VirtualDisk};
use thiserror::Error;

use crate::cpu::{build_core, CpuCore, CpuHalt};
use crate::irq::IrqRouter;

pub const PRIMARY_COMMAND_BASE: u16 = 0x1F0;
pub const PRIMARY_CONTROL_PORT: u16 = 0x3F6;
pub const SECONDARY_COMMAND_BASE: u16 = 0x170;
pub const SECONDARY_CONTROL_PORT: u16 = 0x376;

pub const PRIMARY_IRQ: u8 = 14;
pub const SECONDARY_IRQ: u8 = 15;

/// Device slots on the primary channel.
const SLOT_HDD: usize = 0;
const SLOT_DVD: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleModel {
    Retail,
    Debug,
}

#[derive(Debug, Error)]
pub enum MachineError {
    #[error("no CPU core named {0:?} is available")]
    UnknownCpuCore(String),
    #[error("no CPU cores are available in this build")]
    NoCpuCore,
    #[error(transparent)]
    Disk(#[from] DiskError),
}

pub struct Machine {
    model: ConsoleModel,
    cpu: Box<dyn CpuCore>,
    router: Arc<IrqRouter>,
    primary: AtaChannel,
    secondary: AtaChannel,
}

impl Machine {
    /// Assemble a machine with empty device slots. The DVD slot starts with
    /// a media-less drive: the console always has the drive, not the disc.
    pub fn new(model: ConsoleModel, cpu_core: Option<&str>) -> Result<Self, MachineError> {
        let cpu = match build_core(cpu_core) {
            Some(cpu) => cpu,
            None => {
                return Err(match cpu_core {
                    Some(name) => MachineError::UnknownCpuCore(name.to_owned()),
                    None => MachineError::NoCpuCore,
                })
            }
        };
        let router = Arc::new(IrqRouter::new());
        let primary = AtaChannel::new(ChannelId::Primary, PRIMARY_IRQ, router.clone());
        let secondary = AtaChannel::new(ChannelId::Secondary, SECONDARY_IRQ, router.clone());
        primary.attach(SLOT_DVD, Box::new(NoMediaDvdDrive::new()));
        Ok(Self {
            model,
            cpu,
            router,
            primary,
            secondary,
        })
    }

    pub fn model(&self) -> ConsoleModel {
        self.model
    }

    pub fn cpu_name(&self) -> &'static str {
        self.cpu.name()
    }

    pub fn irq_router(&self) -> &Arc<IrqRouter> {
        &self.router
    }

    pub fn primary_channel(&self) -> &AtaChannel {
        &self.primary
    }

    pub fn secondary_channel(&self) -> &AtaChannel {
        &self.secondary
    }

    pub fn attach_hard_drive(&self, disk: Box<dyn VirtualDisk>) {
        self.primary
            .attach(SLOT_HDD, Box::new(ImageHardDrive::new(disk)));
    }

    pub fn attach_dvd_image(&self, media: Box<dyn VirtualDisk>) -> Result<(), MachineError> {
        let drive = ImageDvdDrive::new(media)?;
        self.primary.attach(SLOT_DVD, Box::new(drive));
        Ok(())
    }

    /// Eject: put the media-less drive back in the slot.
    pub fn eject_dvd(&self) {
        self.primary.attach(SLOT_DVD, Box::new(NoMediaDvdDrive::new()));
    }

    pub fn run(&mut self) -> Result<(), CpuHalt> {
        self.cpu.run()
    }

    /// Guest port read. Unmapped ports and refused accesses read as open
    /// bus, matching what absent hardware does.
    pub fn io_read(&self, port: u16, size: u8) -> u32 {
        let result = match port {
            PRIMARY_COMMAND_BASE..=0x1F7 => self
                .primary
                .read_command_port(port - PRIMARY_COMMAND_BASE, size),
            PRIMARY_CONTROL_PORT => self.primary.read_control_port(size),
            SECONDARY_COMMAND_BASE..=0x177 => self
                .secondary
                .read_command_port(port - SECONDARY_COMMAND_BASE, size),
            SECONDARY_CONTROL_PORT => self.secondary.read_control_port(size),
            _ => return open_bus(size),
        };
        result.unwrap_or_else(|_| open_bus(size))
    }

    /// Guest port write. Unmapped ports and refused accesses are dropped.
    pub fn io_write(&self, port: u16, size: u8, value: u32) {
        let _ = match port {
            PRIMARY_COMMAND_BASE..=0x1F7 => {
                self.primary
                    .write_command_port(port - PRIMARY_COMMAND_BASE, size, value)
            }
            PRIMARY_CONTROL_PORT => self.primary.write_control_port(size, value),
            SECONDARY_COMMAND_BASE..=0x177 => {
                self.secondary
                    .write_command_port(port - SECONDARY_COMMAND_BASE, size, value)
            }
            SECONDARY_CONTROL_PORT => self.secondary.write_control_port(size, value),
            _ => Ok(()),
        };
    }
}

fn open_bus(size: u8) -> u32 {
    match size {
        1 => 0xFF,
        2 => 0xFFFF,
        _ => 0xFFFF_FFFF,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aeon_storage::{MemDisk, SECTOR_SIZE};

    fn machine_with_disk(sectors: usize) -> Machine {
        let machine = Machine::new(ConsoleModel::Retail, None).unwrap();
        let disk = MemDisk::from_bytes(vec![0u8; sectors * SECTOR_SIZE]);
        machine.attach_hard_drive(Box::new(disk));
        machine
    }

    #[test]
    fn unknown_cpu_core_fails_assembly() {
        assert!(matches!(
            Machine::new(ConsoleModel::Debug, Some("turbo")),
            Err(MachineError::UnknownCpuCore(_))
        ));
    }

    #[test]
    fn primary_ports_reach_the_hard_drive() {
        let machine = machine_with_disk(4);
        // IDENTIFY DEVICE through the legacy ports.
        machine.io_write(0x1F7, 1, 0xEC);
        let status = machine.io_read(0x1F7, 1) as u8;
        assert_ne!(status & 0x08, 0); // DRQ
        assert!(!machine.irq_router().level(PRIMARY_IRQ)); // acknowledged by the read
    }

    #[test]
    fn interrupts_route_to_irq14() {
        let machine = machine_with_disk(4);
        machine.io_write(0x1F7, 1, 0x55); // unsupported opcode
        assert!(machine.irq_router().level(PRIMARY_IRQ));
        machine.io_read(0x1F7, 1);
        assert!(!machine.irq_router().level(PRIMARY_IRQ));
    }

    #[test]
    fn secondary_channel_is_empty_and_floats() {
        let machine = machine_with_disk(4);
        assert_eq!(machine.io_read(0x177, 1), 0xFF);
        assert_eq!(machine.io_read(0x376, 1), 0xFF);
    }

    #[test]
    fn unmapped_ports_read_open_bus() {
        let machine = machine_with_disk(4);
        assert_eq!(machine.io_read(0x80, 1), 0xFF);
        assert_eq!(machine.io_read(0x80, 4), 0xFFFF_FFFF);
        machine.io_write(0x80, 1, 0x12); // dropped
    }

    #[test]
    fn dvd_slot_swaps_between_media_and_empty() {
        let machine = machine_with_disk(4);
        let image = MemDisk::from_bytes(vec![0u8; 2048 * 2]);
        machine.attach_dvd_image(Box::new(image)).unwrap();

        // Select the slave and check the ATAPI identify class word.
        machine.io_write(0x1F6, 1, 0x10);
        machine.io_write(0x1F7, 1, 0xA1);
        let word0 = machine.io_read(0x1F0, 2) as u16;
        assert_eq!(word0 & 0xC000, 0x8000);

        machine.eject_dvd();
        machine.io_write(0x1F7, 1, 0xA1);
        let word0 = machine.io_read(0x1F0, 2) as u16;
        assert_eq!(word0 & 0xC000, 0x8000);
    }
}
