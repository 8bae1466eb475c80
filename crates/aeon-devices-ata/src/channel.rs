//! One ATA channel: the shared register file, two device slots, the active
//! command, and the interrupt line.
//!
//! All port accesses and DMA transfers serialize on one mutex per channel, so
//! a DMA engine running on another thread observes the same ordering as the
//! vCPU issuing port I/O. The IRQ line and any registered hooks are invoked
//! while that lock is held; implementations must not call back into the
//! channel.

use std::sync::{Arc, Mutex};

use crate::cmds::{factory_for, AtaCommand, CmdEnv};
use crate::device::AtaDevice;
use crate::drvs::AtaDeviceDriver;
use crate::irq::{InterruptHook, IrqLine};
use crate::regs::{AccessError, AtaRegisters, ErrorBits, Register, Status};

pub use crate::cmds::DmaTransfer;

/// Which of the two legacy channels this is. Informational only; port
/// decoding happens in the machine layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    Primary,
    Secondary,
}

/// The active command, pinned to the device slot it was issued to. The host
/// may rewrite Device/Head mid-command; the transfer keeps talking to the
/// original device.
struct InFlightCommand {
    device: usize,
    cmd: Box<dyn AtaCommand>,
}

struct ChannelState {
    regs: AtaRegisters,
    devices: [AtaDevice; 2],
    current: Option<InFlightCommand>,
    irq_asserted: bool,
    hooks: Vec<Arc<dyn InterruptHook>>,
}

pub struct AtaChannel {
    id: ChannelId,
    irq: u8,
    irq_line: Arc<dyn IrqLine>,
    state: Mutex<ChannelState>,
}

impl AtaChannel {
    pub fn new(id: ChannelId, irq: u8, irq_line: Arc<dyn IrqLine>) -> Self {
        Self {
            id,
            irq,
            irq_line,
            state: Mutex::new(ChannelState {
                regs: AtaRegisters::new(),
                devices: [AtaDevice::absent(), AtaDevice::absent()],
                current: None,
                irq_asserted: false,
                hooks: Vec::new(),
            }),
        }
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn irq(&self) -> u8 {
        self.irq
    }

    /// Plug a driver into a device slot (0 = master, 1 = slave).
    pub fn attach(&self, slot: usize, driver: Box<dyn AtaDeviceDriver>) {
        let mut state = self.lock();
        state.devices[slot].set_driver(driver);
    }

    /// Hooks observe every edge of the channel interrupt line, in
    /// registration order. Requests dropped by nIEN never reach them.
    pub fn register_interrupt_hook(&self, hook: Arc<dyn InterruptHook>) {
        let mut state = self.lock();
        state.hooks.push(hook);
    }

    #[cfg(test)]
    pub(crate) fn irq_asserted(&self) -> bool {
        self.lock().irq_asserted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChannelState> {
        match self.state.lock() {
            Ok(guard) => guard,
            // A panic mid-command leaves register state valid; the registers
            // are plain bytes and every method re-derives from them.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ----- Interrupt line ----------------------------------------------------

    fn set_line(&self, state: &mut ChannelState, asserted: bool) {
        if state.irq_asserted == asserted {
            return;
        }
        state.irq_asserted = asserted;
        self.irq_line.set_irq(self.irq, asserted);
        for hook in &state.hooks {
            hook.on_interrupt(asserted);
        }
    }

    /// Apply a command's completion-interrupt request. nIEN drops the
    /// request; there is no latch to replay when nIEN clears.
    fn raise_irq(&self, state: &mut ChannelState) {
        if state.regs.interrupts_enabled() {
            self.set_line(state, true);
        }
    }

    // ----- Command block (command ports) -------------------------------------

    pub fn read_command_port(&self, offset: u16, size: u8) -> Result<u32, AccessError> {
        let reg = Register::from_read_offset(offset)
            .ok_or(AccessError::OffsetOutOfRange { offset })?;
        match reg {
            Register::Data => {
                if !matches!(size, 1 | 2 | 4) {
                    return Err(AccessError::UnsupportedWidth { reg, size });
                }
            }
            _ => {
                if size != 1 {
                    return Err(AccessError::UnsupportedWidth { reg, size });
                }
            }
        }

        let state = &mut *self.lock();
        let selected = state.regs.selected_device();
        // An empty slot floats the bus: reads return all ones and no
        // register state changes.
        if !state.devices[selected].is_attached() {
            return Ok(open_bus(size));
        }

        let value = match reg {
            Register::Data => {
                let mut bytes = [0u8; 4];
                let buf = &mut bytes[..size as usize];
                if let Some(inflight) = state.current.as_mut() {
                    let mut env =
                        CmdEnv::new(&mut state.regs, &mut state.devices[inflight.device]);
                    inflight.cmd.read_data(&mut env, buf);
                    let request = env.take_interrupt_request();
                    if inflight.cmd.is_finished() {
                        state.current = None;
                    }
                    if request {
                        self.raise_irq(state);
                    }
                }
                u32::from_le_bytes(bytes)
            }
            Register::Error => u32::from(state.regs.error),
            Register::SectorCount => u32::from(state.regs.sector_count),
            Register::LbaLow => u32::from(state.regs.lba_low),
            Register::LbaMid => u32::from(state.regs.lba_mid),
            Register::LbaHigh => u32::from(state.regs.lba_high),
            Register::DeviceHead => u32::from(state.regs.device_head),
            Register::Status => {
                // Reading Status acknowledges the pending interrupt.
                self.set_line(state, false);
                u32::from(state.regs.status)
            }
            _ => unreachable!("not a command block read register"),
        };
        Ok(value)
    }

    pub fn write_command_port(&self, offset: u16, size: u8, value: u32) -> Result<(), AccessError> {
        let reg = Register::from_write_offset(offset)
            .ok_or(AccessError::OffsetOutOfRange { offset })?;
        match reg {
            Register::Data => {
                if !matches!(size, 1 | 2 | 4) {
                    return Err(AccessError::UnsupportedWidth { reg, size });
                }
            }
            _ => {
                if size != 1 {
                    return Err(AccessError::UnsupportedWidth { reg, size });
                }
            }
        }

        let state = &mut *self.lock();
        match reg {
            Register::Data => {
                let bytes = value.to_le_bytes();
                let data = &bytes[..size as usize];
                if let Some(inflight) = state.current.as_mut() {
                    let mut env =
                        CmdEnv::new(&mut state.regs, &mut state.devices[inflight.device]);
                    inflight.cmd.write_data(&mut env, data);
                    let request = env.take_interrupt_request();
                    if inflight.cmd.is_finished() {
                        state.current = None;
                    }
                    if request {
                        self.raise_irq(state);
                    }
                }
            }
            Register::Features => state.regs.features = value as u8,
            Register::SectorCount => state.regs.sector_count = value as u8,
            Register::LbaLow => state.regs.lba_low = value as u8,
            Register::LbaMid => state.regs.lba_mid = value as u8,
            Register::LbaHigh => state.regs.lba_high = value as u8,
            Register::DeviceHead => state.regs.device_head = value as u8,
            Register::Command => self.issue_command(state, value as u8),
            _ => unreachable!("not a command block write register"),
        }
        Ok(())
    }

    fn issue_command(&self, state: &mut ChannelState, opcode: u8) {
        // A new command supersedes whatever was in flight and clears the
        // previous completion interrupt.
        state.current = None;
        self.set_line(state, false);

        let selected = state.regs.selected_device();
        // An empty slot never responds; the host sees its writes vanish and
        // its reads float.
        if !state.devices[selected].is_attached() {
            return;
        }
        let Some(factory) = factory_for(opcode) else {
            self.reject_command(state);
            return;
        };

        let mut cmd = factory();
        let mut env = CmdEnv::new(&mut state.regs, &mut state.devices[selected]);
        cmd.begin(&mut env);
        let request = env.take_interrupt_request();
        if !cmd.is_finished() {
            state.current = Some(InFlightCommand {
                device: selected,
                cmd,
            });
        }
        if request {
            self.raise_irq(state);
        }
    }

    /// Unknown opcode or empty slot: Aborted error, no command object.
    fn reject_command(&self, state: &mut ChannelState) {
        state.regs.set_error(ErrorBits::ABRT);
        state
            .regs
            .set_status(Status::DRDY, Status::BSY | Status::DRQ);
        self.raise_irq(state);
    }

    // ----- Control block (control port) --------------------------------------

    /// Alternate Status: same byte as Status, no interrupt acknowledge.
    pub fn read_control_port(&self, size: u8) -> Result<u32, AccessError> {
        if size != 1 {
            return Err(AccessError::UnsupportedWidth {
                reg: Register::AltStatus,
                size,
            });
        }
        let state = self.lock();
        if !state.devices[state.regs.selected_device()].is_attached() {
            return Ok(open_bus(size));
        }
        Ok(u32::from(state.regs.status))
    }

    pub fn write_control_port(&self, size: u8, value: u32) -> Result<(), AccessError> {
        if size != 1 {
            return Err(AccessError::UnsupportedWidth {
                reg: Register::DeviceControl,
                size,
            });
        }
        let state = &mut *self.lock();
        let was_reset = state.regs.software_reset_requested();
        state.regs.control = value as u8;
        if !state.regs.interrupts_enabled() {
            self.set_line(state, false);
        }
        // Reset runs on the asserting edge only; holding SRST is idempotent.
        if !was_reset && state.regs.software_reset_requested() {
            self.soft_reset(state);
        }
        Ok(())
    }

    fn soft_reset(&self, state: &mut ChannelState) {
        state.current = None;
        self.set_line(state, false);
        state.regs.reset_command_block();
        // The signature in the command block is device 0's: reset leaves the
        // master selected.
        let packet = state.devices[0].is_attached() && state.devices[0].is_packet_device();
        state.regs.set_signature(packet);
    }

    // ----- DMA ---------------------------------------------------------------

    /// Device-to-host DMA. Called by the bus-master engine, possibly from
    /// another thread; serialized with port I/O by the channel lock.
    pub fn read_dma(&self, out: &mut [u8]) -> DmaTransfer {
        let state = &mut *self.lock();
        let Some(inflight) = state.current.as_mut() else {
            // Host-side sequencing bug; degrade to a protocol abort so the
            // guest sees an error instead of the host misbehaving.
            debug_assert!(false, "DMA read with no command in flight");
            self.reject_command(state);
            return DmaTransfer::Error;
        };
        let mut env = CmdEnv::new(&mut state.regs, &mut state.devices[inflight.device]);
        let result = inflight.cmd.read_dma(&mut env, out);
        let request = env.take_interrupt_request();
        if inflight.cmd.is_finished() {
            state.current = None;
        }
        if request {
            self.raise_irq(state);
        }
        result
    }

    /// Host-to-device DMA.
    pub fn write_dma(&self, data: &[u8]) -> DmaTransfer {
        let state = &mut *self.lock();
        let Some(inflight) = state.current.as_mut() else {
            debug_assert!(false, "DMA write with no command in flight");
            self.reject_command(state);
            return DmaTransfer::Error;
        };
        let mut env = CmdEnv::new(&mut state.regs, &mut state.devices[inflight.device]);
        let result = inflight.cmd.write_dma(&mut env, data);
        let request = env.take_interrupt_request();
        if inflight.cmd.is_finished() {
            state.current = None;
        }
        if request {
            self.raise_irq(state);
        }
        result
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
    use crate::drvs::IDENTIFY_DATA_LEN;
    use crate::regs::DeviceControl;

    #[derive(Default)]
    struct RecordingIrq(Mutex<Vec<(u8, bool)>>);

    impl IrqLine for RecordingIrq {
        fn set_irq(&self, irq: u8, asserted: bool) {
            self.0.lock().unwrap().push((irq, asserted));
        }
    }

    struct FakeDisk;

    impl AtaDeviceDriver for FakeDisk {
        fn is_packet_device(&self) -> bool {
            false
        }
        fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]) {
            data[0] = 0x40;
        }
        fn sector_count(&self) -> u64 {
            16
        }
    }

    struct FakeCdrom;

    impl AtaDeviceDriver for FakeCdrom {
        fn is_packet_device(&self) -> bool {
            true
        }
        fn identify(&self, data: &mut [u8; IDENTIFY_DATA_LEN]) {
            data[0] = 0x85;
        }
    }

    fn channel_with_disk() -> (AtaChannel, Arc<RecordingIrq>) {
        let irq = Arc::new(RecordingIrq::default());
        let chan = AtaChannel::new(ChannelId::Primary, 14, irq.clone());
        chan.attach(0, Box::new(FakeDisk));
        (chan, irq)
    }

    #[test]
    fn unknown_opcode_aborts_and_interrupts() {
        let (chan, irq) = channel_with_disk();
        chan.write_command_port(7, 1, 0x55).unwrap();

        let status = chan.read_command_port(7, 1).unwrap() as u8;
        assert_ne!(status & Status::ERR.bits(), 0);
        assert_eq!(status & Status::DRQ.bits(), 0);
        let error = chan.read_command_port(1, 1).unwrap() as u8;
        assert_eq!(error, ErrorBits::ABRT.bits());
        // Asserted on rejection, negated by the Status read.
        assert_eq!(*irq.0.lock().unwrap(), vec![(14, true), (14, false)]);
    }

    #[test]
    fn nien_drops_interrupt_requests_without_latching() {
        let (chan, irq) = channel_with_disk();
        chan.write_control_port(1, DeviceControl::NIEN.bits() as u32)
            .unwrap();
        chan.write_command_port(7, 1, 0x55).unwrap();
        assert!(irq.0.lock().unwrap().is_empty());

        // Clearing nIEN afterwards replays nothing.
        chan.write_control_port(1, 0).unwrap();
        assert!(irq.0.lock().unwrap().is_empty());
    }

    #[test]
    fn alternate_status_does_not_acknowledge_interrupt() {
        let (chan, _irq) = channel_with_disk();
        chan.write_command_port(7, 1, 0x55).unwrap();
        assert!(chan.irq_asserted());

        chan.read_control_port(1).unwrap();
        assert!(chan.irq_asserted());
        chan.read_command_port(7, 1).unwrap();
        assert!(!chan.irq_asserted());
    }

    #[test]
    fn srst_edge_resets_and_places_signature() {
        let irq = Arc::new(RecordingIrq::default());
        let chan = AtaChannel::new(ChannelId::Secondary, 15, irq);
        chan.attach(0, Box::new(FakeCdrom));

        let srst = DeviceControl::SRST.bits() as u32;
        chan.write_control_port(1, srst).unwrap();
        assert_eq!(chan.read_command_port(2, 1).unwrap(), 0x01);
        assert_eq!(chan.read_command_port(3, 1).unwrap(), 0x01);
        assert_eq!(chan.read_command_port(4, 1).unwrap(), 0x14);
        assert_eq!(chan.read_command_port(5, 1).unwrap(), 0xEB);

        // Holding SRST changes nothing more; scribble then rewrite the same
        // control value.
        chan.write_command_port(3, 1, 0x77).unwrap();
        chan.write_control_port(1, srst).unwrap();
        assert_eq!(chan.read_command_port(3, 1).unwrap(), 0x77);

        // Releasing and reasserting runs the reset again.
        chan.write_control_port(1, 0).unwrap();
        chan.write_control_port(1, srst).unwrap();
        assert_eq!(chan.read_command_port(3, 1).unwrap(), 0x01);
    }

    #[test]
    fn absent_device_floats_the_bus() {
        let irq = Arc::new(RecordingIrq::default());
        let chan = AtaChannel::new(ChannelId::Primary, 14, irq.clone());

        assert_eq!(chan.read_command_port(7, 1).unwrap(), 0xFF);
        assert_eq!(chan.read_command_port(0, 2).unwrap(), 0xFFFF);
        assert_eq!(chan.read_control_port(1).unwrap(), 0xFF);

        // Commands to an empty slot vanish.
        chan.write_command_port(7, 1, 0xEC).unwrap();
        assert!(irq.0.lock().unwrap().is_empty());
    }

    #[test]
    fn access_width_is_validated_before_any_side_effect() {
        let (chan, _irq) = channel_with_disk();
        assert!(matches!(
            chan.read_command_port(7, 2),
            Err(AccessError::UnsupportedWidth { .. })
        ));
        assert!(matches!(
            chan.read_command_port(9, 1),
            Err(AccessError::OffsetOutOfRange { offset: 9 })
        ));
        assert!(matches!(
            chan.write_control_port(2, 0),
            Err(AccessError::UnsupportedWidth { .. })
        ));
    }

    #[test]
    fn identify_streams_512_bytes_over_pio() {
        let (chan, irq) = channel_with_disk();
        chan.write_command_port(7, 1, 0xEC).unwrap();
        assert_eq!(*irq.0.lock().unwrap(), vec![(14, true)]);

        let first = chan.read_command_port(0, 2).unwrap();
        assert_eq!(first & 0xFF, 0x40);
        for _ in 1..IDENTIFY_DATA_LEN / 2 {
            chan.read_command_port(0, 2).unwrap();
        }
        let status = chan.read_control_port(1).unwrap() as u8;
        assert_eq!(status & Status::DRQ.bits(), 0);
        // Draining the buffer raises no second interrupt.
        assert_eq!(irq.0.lock().unwrap().len(), 1);
    }
}
