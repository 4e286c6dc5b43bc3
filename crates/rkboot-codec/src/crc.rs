//! Table-driven CRC-16-CCITT, polynomial 0x1021, MSB-first.
//!
//! The ID block stamps this CRC over the unscrambled 512-byte bodies of
//! sectors 0, 1 and 3. Initial accumulator is zero with no reflection and
//! no final XOR (the XModem variant); "123456789" hashes to 0x31C3.

use std::sync::OnceLock;

const POLY: u16 = 0x1021;

static TABLE: OnceLock<[u16; 256]> = OnceLock::new();

fn table() -> &'static [u16; 256] {
    TABLE.get_or_init(|| {
        let mut table = [0u16; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            let mut data = (i as u16) << 8;
            let mut accum = 0u16;
            for _ in 0..8 {
                if (data ^ accum) & 0x8000 != 0 {
                    accum = (accum << 1) ^ POLY;
                } else {
                    accum <<= 1;
                }
                data <<= 1;
            }
            *entry = accum;
        }
        table
    })
}

/// CRC-16-CCITT of `data`, starting from a zero accumulator.
pub fn crc16(data: &[u8]) -> u16 {
    let table = table();
    let mut accum = 0u16;
    for &byte in data {
        accum = (accum << 8) ^ table[usize::from((accum >> 8) ^ u16::from(byte))];
    }
    accum
}
