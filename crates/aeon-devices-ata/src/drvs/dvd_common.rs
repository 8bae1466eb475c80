//! Pieces shared by the DVD drive drivers: the IDENTIFY PACKET DEVICE block
//! and the INQUIRY payload, which do not depend on whether media is present.

use super::{identify_words_to_bytes, put_ata_string, put_scsi_ascii, IDENTIFY_DATA_LEN};

pub(super) fn identify_packet_device(data: &mut [u8; IDENTIFY_DATA_LEN]) {
    let mut words = [0u16; 256];

    // ATAPI device, CD/DVD class, removable media, 12-byte packets.
    words[0] = 0x8580 | 0x0001;

    put_ata_string(&mut words[10..20], "AEON000000000000DVD1");
    put_ata_string(&mut words[23..27], "1.00");
    put_ata_string(&mut words[27..47], "AEON DVD-ROM DRIVE");

    words[49] = (1 << 9) | (1 << 8); // LBA + DMA capable
    words[53] = 0x0007;
    words[63] = 0x0007; // MWDMA 0-2
    words[80] = 0x0010; // ATA/ATAPI-4
    words[88] = 0x0007; // UDMA 0-2

    identify_words_to_bytes(&words, data);
}

/// Standard INQUIRY payload for a read-only CD/DVD unit.
pub(super) fn inquiry_data() -> Vec<u8> {
    let mut data = vec![0u8; 36];
    data[0] = 0x05; // CD/DVD device
    data[1] = 0x80; // removable
    data[2] = 0x05; // SPC-3
    data[3] = 0x02; // response data format
    data[4] = (data.len() - 5) as u8;
    put_scsi_ascii(&mut data[8..16], b"AEON");
    put_scsi_ascii(&mut data[16..32], b"DVD-ROM DRIVE");
    put_scsi_ascii(&mut data[32..36], b"1.00");
    data
}
