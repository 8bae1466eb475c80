//! End-to-end PACKET command flows through the channel: CDB delivery over
//! PIO, sense reporting, byte-count-limited data bursts, and ATAPI DMA.

use std::sync::{Arc, Mutex};

use aeon_devices_ata::drvs::{ImageDvdDrive, NoMediaDvdDrive};
use aeon_devices_ata::{AtaChannel, ChannelId, DmaTransfer, IrqLine};
use aeon_storage::MemDisk;

const ATAPI_SECTOR: usize = 2048;

const REG_DATA: u16 = 0;
const REG_FEATURES: u16 = 1;
const REG_ERROR: u16 = 1;
const REG_SECTOR_COUNT: u16 = 2;
const REG_BYTE_COUNT_LO: u16 = 4;
const REG_BYTE_COUNT_HI: u16 = 5;
const REG_STATUS: u16 = 7;
const REG_COMMAND: u16 = 7;

const STATUS_ERR: u8 = 0x01;
const STATUS_DRQ: u8 = 0x08;

#[derive(Default)]
struct CountingIrq(Mutex<usize>);

impl IrqLine for CountingIrq {
    fn set_irq(&self, _irq: u8, asserted: bool) {
        if asserted {
            *self.0.lock().unwrap() += 1;
        }
    }
}

impl CountingIrq {
    fn asserts(&self) -> usize {
        *self.0.lock().unwrap()
    }
}

fn wr(chan: &AtaChannel, offset: u16, value: u8) {
    chan.write_command_port(offset, 1, u32::from(value)).unwrap();
}

fn rd(chan: &AtaChannel, offset: u16) -> u8 {
    chan.read_command_port(offset, 1).unwrap() as u8
}

fn dvd_image(sectors: usize) -> Box<MemDisk> {
    let mut data = vec![0u8; sectors * ATAPI_SECTOR];
    for (i, chunk) in data.chunks_mut(ATAPI_SECTOR).enumerate() {
        chunk.fill(i as u8 | 0x40);
    }
    Box::new(MemDisk::from_bytes(data))
}

fn image_channel(sectors: usize) -> (AtaChannel, Arc<CountingIrq>) {
    let irq = Arc::new(CountingIrq::default());
    let chan = AtaChannel::new(ChannelId::Secondary, 15, irq.clone());
    let drive = ImageDvdDrive::new(dvd_image(sectors)).unwrap();
    chan.attach(0, Box::new(drive));
    (chan, irq)
}

fn no_media_channel() -> (AtaChannel, Arc<CountingIrq>) {
    let irq = Arc::new(CountingIrq::default());
    let chan = AtaChannel::new(ChannelId::Secondary, 15, irq.clone());
    chan.attach(0, Box::new(NoMediaDvdDrive::new()));
    (chan, irq)
}

/// Issue PACKET and feed the 12-byte CDB over the data register.
fn send_packet(chan: &AtaChannel, cdb: [u8; 12], dma: bool, limit: u16) {
    wr(chan, REG_FEATURES, u8::from(dma));
    wr(chan, REG_BYTE_COUNT_LO, limit as u8);
    wr(chan, REG_BYTE_COUNT_HI, (limit >> 8) as u8);
    wr(chan, REG_COMMAND, 0xA0);
    assert_ne!(rd(chan, REG_STATUS) & STATUS_DRQ, 0);
    // Command phase: CoD set, IO clear.
    assert_eq!(rd(chan, REG_SECTOR_COUNT) & 0x03, 0x01);
    for pair in cdb.chunks(2) {
        let word = u16::from_le_bytes([pair[0], pair[1]]);
        chan.write_command_port(REG_DATA, 2, u32::from(word)).unwrap();
    }
}

fn read_pio(chan: &AtaChannel, len: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len.div_ceil(2) {
        let word = chan.read_command_port(REG_DATA, 2).unwrap() as u16;
        out.extend_from_slice(&word.to_le_bytes());
    }
    out.truncate(len);
    out
}

fn cdb_test_unit_ready() -> [u8; 12] {
    [0; 12]
}

fn cdb_request_sense(alloc: u8) -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = 0x03;
    cdb[4] = alloc;
    cdb
}

fn cdb_read_capacity() -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = 0x25;
    cdb
}

fn cdb_read10(lba: u32, blocks: u16) -> [u8; 12] {
    let mut cdb = [0u8; 12];
    cdb[0] = 0x28;
    cdb[2..6].copy_from_slice(&lba.to_be_bytes());
    cdb[7..9].copy_from_slice(&blocks.to_be_bytes());
    cdb
}

/// Consume the initial MEDIUM CHANGED unit attention a fresh drive reports.
fn settle(chan: &AtaChannel) {
    send_packet(chan, cdb_test_unit_ready(), false, 0xFFFE);
    assert_ne!(rd(chan, REG_STATUS) & STATUS_ERR, 0);
    send_packet(chan, cdb_test_unit_ready(), false, 0xFFFE);
    assert_eq!(rd(chan, REG_STATUS) & STATUS_ERR, 0);
}

#[test]
fn no_media_drive_fails_test_unit_ready_with_sense() {
    let (chan, _irq) = no_media_channel();
    send_packet(&chan, cdb_test_unit_ready(), false, 0xFFFE);

    let status = rd(&chan, REG_STATUS);
    assert_ne!(status & STATUS_ERR, 0);
    // NOT READY in the sense-key nibble, ABRT below it.
    assert_eq!(rd(&chan, REG_ERROR), 0x24);

    send_packet(&chan, cdb_request_sense(18), false, 0xFFFE);
    let sense = read_pio(&chan, 18);
    assert_eq!(sense[0], 0x70);
    assert_eq!(sense[2] & 0x0F, 0x02); // NOT READY
    assert_eq!(sense[12], 0x3A); // MEDIUM NOT PRESENT
}

#[test]
fn image_drive_reports_medium_changed_then_becomes_ready() {
    let (chan, _irq) = image_channel(4);

    send_packet(&chan, cdb_test_unit_ready(), false, 0xFFFE);
    assert_ne!(rd(&chan, REG_STATUS) & STATUS_ERR, 0);
    assert_eq!(rd(&chan, REG_ERROR) >> 4, 0x06); // UNIT ATTENTION

    send_packet(&chan, cdb_request_sense(18), false, 0xFFFE);
    let sense = read_pio(&chan, 18);
    assert_eq!(sense[2] & 0x0F, 0x06);
    assert_eq!(sense[12], 0x28); // MEDIUM CHANGED

    send_packet(&chan, cdb_test_unit_ready(), false, 0xFFFE);
    assert_eq!(rd(&chan, REG_STATUS) & STATUS_ERR, 0);
}

#[test]
fn read_capacity_round_trips_through_pio() {
    let (chan, _irq) = image_channel(4);
    settle(&chan);

    send_packet(&chan, cdb_read_capacity(), false, 0xFFFE);
    // Data-in phase: IO set, CoD clear; byte count published.
    assert_eq!(rd(&chan, REG_SECTOR_COUNT) & 0x03, 0x02);
    let limit = u16::from_le_bytes([rd(&chan, REG_BYTE_COUNT_LO), rd(&chan, REG_BYTE_COUNT_HI)]);
    assert_eq!(limit, 8);

    let data = read_pio(&chan, 8);
    assert_eq!(u32::from_be_bytes([data[0], data[1], data[2], data[3]]), 3);
    assert_eq!(
        u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        2048
    );
    // Status phase: CoD and IO both set, DRQ clear.
    assert_eq!(rd(&chan, REG_SECTOR_COUNT) & 0x03, 0x03);
    assert_eq!(rd(&chan, REG_STATUS) & (STATUS_DRQ | STATUS_ERR), 0);
}

#[test]
fn read10_pio_splits_into_byte_count_bursts() {
    let (chan, irq) = image_channel(4);
    settle(&chan);
    let before = irq.asserts();

    // Two blocks with a one-block byte count limit: two bursts. Each Status
    // read acknowledges the pending interrupt so the next burst produces a
    // fresh edge.
    send_packet(&chan, cdb_read10(1, 2), false, ATAPI_SECTOR as u16);
    assert_ne!(rd(&chan, REG_STATUS) & STATUS_DRQ, 0);
    let mut payload = read_pio(&chan, ATAPI_SECTOR);
    assert_ne!(rd(&chan, REG_STATUS) & STATUS_DRQ, 0);
    payload.extend_from_slice(&read_pio(&chan, ATAPI_SECTOR));
    assert_eq!(rd(&chan, REG_STATUS) & STATUS_DRQ, 0);

    assert!(payload[..ATAPI_SECTOR].iter().all(|&b| b == 0x41));
    assert!(payload[ATAPI_SECTOR..].iter().all(|&b| b == 0x42));
    // One interrupt per burst plus the completion interrupt.
    assert_eq!(irq.asserts() - before, 3);
}

#[test]
fn read10_dma_streams_blocks_to_the_engine() {
    let (chan, irq) = image_channel(4);
    settle(&chan);
    let before = irq.asserts();

    send_packet(&chan, cdb_read10(0, 2), true, 0);
    assert_ne!(rd(&chan, REG_STATUS) & STATUS_DRQ, 0);

    let mut collected = Vec::new();
    let mut chunk = vec![0u8; 1024];
    for _ in 0..3 {
        assert_eq!(chan.read_dma(&mut chunk), DmaTransfer::Ok);
        collected.extend_from_slice(&chunk);
    }
    assert_eq!(chan.read_dma(&mut chunk), DmaTransfer::End);
    collected.extend_from_slice(&chunk);

    assert!(collected[..ATAPI_SECTOR].iter().all(|&b| b == 0x40));
    assert!(collected[ATAPI_SECTOR..].iter().all(|&b| b == 0x41));
    // DMA interrupts once, at completion.
    assert_eq!(irq.asserts() - before, 1);
    assert_eq!(rd(&chan, REG_SECTOR_COUNT) & 0x03, 0x03);
}

#[test]
fn read10_past_capacity_checks_condition_without_data() {
    let (chan, _irq) = image_channel(4);
    settle(&chan);

    send_packet(&chan, cdb_read10(3, 2), false, 0xFFFE);
    let status = rd(&chan, REG_STATUS);
    assert_ne!(status & STATUS_ERR, 0);
    assert_eq!(status & STATUS_DRQ, 0);
    assert_eq!(rd(&chan, REG_ERROR) >> 4, 0x05); // ILLEGAL REQUEST

    send_packet(&chan, cdb_request_sense(18), false, 0xFFFE);
    let sense = read_pio(&chan, 18);
    assert_eq!(sense[12], 0x21); // LBA OUT OF RANGE
}

#[test]
fn unsupported_packet_opcode_reports_illegal_request() {
    let (chan, _irq) = image_channel(4);
    settle(&chan);

    let mut cdb = [0u8; 12];
    cdb[0] = 0x35; // SYNCHRONIZE CACHE: not implemented by this drive
    send_packet(&chan, cdb, false, 0xFFFE);
    assert_ne!(rd(&chan, REG_STATUS) & STATUS_ERR, 0);
    assert_eq!(rd(&chan, REG_ERROR) >> 4, 0x05);
}

#[test]
fn reserved_byte_count_limit_runs_as_fffe() {
    let (chan, _irq) = image_channel(33);
    settle(&chan);

    // FFFFh is reserved; a 64 KiB read must open an FFFEh-byte burst, not a
    // 65535-byte one.
    send_packet(&chan, cdb_read10(0, 32), false, 0xFFFF);
    let burst = u16::from_le_bytes([rd(&chan, REG_BYTE_COUNT_LO), rd(&chan, REG_BYTE_COUNT_HI)]);
    assert_eq!(burst, 0xFFFE);
}
