//! PACKET (A0h) [8.23]: carries a 12-byte SCSI command descriptor block to a
//! packet device, then runs its data phase over PIO bursts or DMA.
//!
//! The Features register bit 0, latched when the command is issued, selects
//! DMA for the data phase. In PIO the byte count limit registers bound each
//! burst and the interrupt reason bits (CoD/IO in the Sector Count register)
//! tell the host which phase the device is in.

use crate::atapi::{PacketInfo, TransferKind, PACKET_LEN, SENSE_ILLEGAL_REQUEST};
use crate::cmds::{AtaCommand, CmdEnv, DataBuffer, DmaTransfer};
use crate::regs::{ErrorBits, Status};

/// Upper bound on a single packet's data phase; larger requests are refused
/// as malformed rather than allocated.
const MAX_TRANSFER_BYTES: u32 = 4 << 20;

enum Phase {
    AwaitCdb(DataBuffer),
    PioIn {
        stage: DataBuffer,
        burst_remaining: usize,
    },
    DmaIn {
        stage: DataBuffer,
    },
    PioOut {
        info: PacketInfo,
        buf: DataBuffer,
    },
    DmaOut {
        info: PacketInfo,
        buf: DataBuffer,
    },
    Done,
}

pub struct Packet {
    phase: Phase,
    dma: bool,
    limit: u16,
}

impl Packet {
    pub fn new() -> Self {
        Self {
            phase: Phase::AwaitCdb(DataBuffer::expecting(PACKET_LEN)),
            dma: false,
            limit: 0,
        }
    }

    fn fail(&mut self, env: &mut CmdEnv<'_>, sense_key: u8) {
        env.abort_packet(sense_key);
        self.phase = Phase::Done;
    }

    fn finish(&mut self, env: &mut CmdEnv<'_>) {
        env.regs.set_interrupt_reason(true, true);
        env.complete();
        self.phase = Phase::Done;
    }

    /// Open the next PIO-in burst: publish its size in the byte count
    /// registers and interrupt the host.
    fn start_pio_in_burst(&self, env: &mut CmdEnv<'_>, remaining: usize) -> usize {
        let burst = remaining.min(self.limit as usize);
        env.regs.set_byte_count(burst as u16);
        env.regs.set_interrupt_reason(false, true);
        env.data_ready();
        burst
    }

    fn dispatch(&mut self, env: &mut CmdEnv<'_>, cdb: [u8; PACKET_LEN]) {
        let mut info = PacketInfo::decode(cdb);
        if info.transfer_len > MAX_TRANSFER_BYTES {
            self.fail(env, SENSE_ILLEGAL_REQUEST);
            return;
        }
        if !env.device.driver_mut().validate_atapi_packet(&mut info) {
            self.fail(env, info.sense.key);
            return;
        }
        match info.kind {
            TransferKind::NonData => {
                if env.device.driver_mut().process_atapi_non_data(&mut info) {
                    self.finish(env);
                } else {
                    self.fail(env, info.sense.key);
                }
            }
            TransferKind::DataIn => {
                let mut buf = vec![0u8; info.transfer_len as usize];
                let Some(produced) = env
                    .device
                    .driver_mut()
                    .process_atapi_data_read(&mut info, &mut buf)
                else {
                    self.fail(env, info.sense.key);
                    return;
                };
                let mut stage = DataBuffer::from_vec(buf);
                stage.truncate(produced as usize);
                if stage.is_exhausted() {
                    self.finish(env);
                } else if self.dma {
                    env.regs.set_interrupt_reason(false, true);
                    env.regs.set_status(Status::DRQ, Status::BSY);
                    self.phase = Phase::DmaIn { stage };
                } else {
                    let burst = self.start_pio_in_burst(env, stage.remaining());
                    self.phase = Phase::PioIn {
                        stage,
                        burst_remaining: burst,
                    };
                }
            }
            TransferKind::DataOut => {
                if info.transfer_len == 0 {
                    if env.device.driver_mut().process_atapi_data_write(&mut info, &[]) {
                        self.finish(env);
                    } else {
                        self.fail(env, info.sense.key);
                    }
                    return;
                }
                let buf = DataBuffer::expecting(info.transfer_len as usize);
                if self.dma {
                    env.regs.set_interrupt_reason(false, false);
                    env.regs.set_status(Status::DRQ, Status::BSY);
                    self.phase = Phase::DmaOut { info, buf };
                } else {
                    let burst = buf.remaining().min(self.limit as usize);
                    env.regs.set_byte_count(burst as u16);
                    env.regs.set_interrupt_reason(false, false);
                    env.data_ready();
                    self.phase = Phase::PioOut { info, buf };
                }
            }
        }
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl AtaCommand for Packet {
    fn begin(&mut self, env: &mut CmdEnv<'_>) {
        if !env.device.is_packet_device() {
            env.abort(ErrorBits::ABRT);
            self.phase = Phase::Done;
            return;
        }
        self.dma = (env.regs.features & 0x01) != 0;
        // FFFFh is reserved as a byte count limit [8.23.4]; devices run the
        // burst as FFFEh.
        self.limit = env.regs.byte_count_limit().min(0xFFFE);
        if !self.dma && self.limit == 0 {
            // PIO data phases need a nonzero burst bound [8.23.4].
            env.abort(ErrorBits::ABRT);
            self.phase = Phase::Done;
            return;
        }
        // Command phase: CoD set, IO clear; DRQ invites the CDB bytes.
        env.regs.set_interrupt_reason(true, false);
        env.await_host_data();
    }

    fn write_data(&mut self, env: &mut CmdEnv<'_>, data: &[u8]) {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::AwaitCdb(mut cdb) => {
                cdb.write(data);
                if cdb.is_exhausted() {
                    let mut bytes = [0u8; PACKET_LEN];
                    bytes.copy_from_slice(cdb.as_slice());
                    self.dispatch(env, bytes);
                } else {
                    self.phase = Phase::AwaitCdb(cdb);
                }
            }
            Phase::PioOut { mut info, mut buf } => {
                buf.write(data);
                if buf.is_exhausted() {
                    if env
                        .device
                        .driver_mut()
                        .process_atapi_data_write(&mut info, buf.as_slice())
                    {
                        self.finish(env);
                    } else {
                        self.fail(env, info.sense.key);
                    }
                } else {
                    self.phase = Phase::PioOut { info, buf };
                }
            }
            other => self.phase = other,
        }
    }

    fn read_data(&mut self, env: &mut CmdEnv<'_>, out: &mut [u8]) {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::PioIn {
                mut stage,
                mut burst_remaining,
            } => {
                let take = out.len().min(burst_remaining);
                burst_remaining -= stage.read(&mut out[..take]);
                if stage.is_exhausted() {
                    self.finish(env);
                } else if burst_remaining == 0 {
                    let burst = self.start_pio_in_burst(env, stage.remaining());
                    self.phase = Phase::PioIn {
                        stage,
                        burst_remaining: burst,
                    };
                } else {
                    self.phase = Phase::PioIn {
                        stage,
                        burst_remaining,
                    };
                }
            }
            other => self.phase = other,
        }
    }

    fn read_dma(&mut self, env: &mut CmdEnv<'_>, out: &mut [u8]) -> DmaTransfer {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::DmaIn { mut stage } => {
                stage.read(out);
                if stage.is_exhausted() {
                    self.finish(env);
                    DmaTransfer::End
                } else {
                    self.phase = Phase::DmaIn { stage };
                    DmaTransfer::Ok
                }
            }
            _ => {
                env.abort(ErrorBits::ABRT);
                DmaTransfer::Error
            }
        }
    }

    fn write_dma(&mut self, env: &mut CmdEnv<'_>, data: &[u8]) -> DmaTransfer {
        match std::mem::replace(&mut self.phase, Phase::Done) {
            Phase::DmaOut { mut info, mut buf } => {
                buf.write(data);
                if buf.is_exhausted() {
                    if env
                        .device
                        .driver_mut()
                        .process_atapi_data_write(&mut info, buf.as_slice())
                    {
                        self.finish(env);
                        DmaTransfer::End
                    } else {
                        self.fail(env, info.sense.key);
                        DmaTransfer::Error
                    }
                } else {
                    self.phase = Phase::DmaOut { info, buf };
                    DmaTransfer::Ok
                }
            }
            _ => {
                env.abort(ErrorBits::ABRT);
                DmaTransfer::Error
            }
        }
    }

    fn is_finished(&self) -> bool {
        matches!(self.phase, Phase::Done)
    }
}
