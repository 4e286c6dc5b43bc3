//! Parsed flash-geometry and bad-block responses.

use std::fmt;

use crate::error::TransportError;

/// Highest block index the ID-block scan will look at.
pub const IDB_BLOCK_TOP: usize = 50;
/// Block count requested from the bad-block test command.
pub const MAX_TEST_BLOCKS: u16 = 512;

/// NAND manufacturer as encoded in the flash info response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Manufacturer {
    Samsung,
    Toshiba,
    Hynix,
    Infineon,
    Micron,
    Renesas,
    St,
    Intel,
    Unknown,
}

impl Manufacturer {
    const TABLE: [Manufacturer; 8] = [
        Manufacturer::Samsung,
        Manufacturer::Toshiba,
        Manufacturer::Hynix,
        Manufacturer::Infineon,
        Manufacturer::Micron,
        Manufacturer::Renesas,
        Manufacturer::St,
        Manufacturer::Intel,
    ];

    pub fn from_code(code: u8) -> Manufacturer {
        Self::TABLE
            .get(usize::from(code))
            .copied()
            .unwrap_or(Manufacturer::Unknown)
    }

    pub fn name(self) -> &'static str {
        match self {
            Manufacturer::Samsung => "SAMSUNG",
            Manufacturer::Toshiba => "TOSHIBA",
            Manufacturer::Hynix => "HYNIX",
            Manufacturer::Infineon => "INFINEON",
            Manufacturer::Micron => "MICRON",
            Manufacturer::Renesas => "RENESAS",
            Manufacturer::St => "ST",
            Manufacturer::Intel => "INTEL",
            Manufacturer::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for Manufacturer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Geometry derived from the 11-byte flash info response.
///
/// The raw `block_size` field counts 512-byte sectors per block; the
/// kibibyte forms are the human-facing halves the vendor tool derives.
#[derive(Clone, Debug)]
pub struct FlashInfo {
    pub manufacturer: Manufacturer,
    pub flash_size_mib: u32,
    pub block_num: u32,
    pub block_size_kib: u32,
    pub page_size_kib: u8,
    pub sectors_per_block: u32,
    pub valid_sectors_per_block: u32,
    pub ecc_bits: u8,
    pub access_time: u8,
    pub flash_cs: u8,
}

impl FlashInfo {
    /// Parses the big-endian response: `{flash_size: u32 (KiB), block_size:
    /// u16, page_size: u8, ecc_bits: u8, access_time: u8, manuf_code: u8,
    /// flash_cs: u8}`.
    pub fn parse(data: &[u8]) -> Result<FlashInfo, TransportError> {
        if data.len() < 11 {
            return Err(TransportError::ShortFlashInfo(data.len()));
        }
        let flash_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let block_size = u16::from_be_bytes([data[4], data[5]]);
        let page_size = data[6];

        if block_size == 0 || page_size == 0 {
            return Err(TransportError::BadGeometry {
                block_size,
                page_size,
            });
        }

        Ok(FlashInfo {
            manufacturer: Manufacturer::from_code(data[9]),
            flash_size_mib: flash_size / 1024,
            block_num: (u64::from(flash_size) * 1024 / u64::from(block_size)) as u32,
            block_size_kib: u32::from(block_size) / 2,
            page_size_kib: page_size / 2,
            sectors_per_block: u32::from(block_size),
            valid_sectors_per_block: u32::from(block_size / u16::from(page_size)) * 4,
            ecc_bits: data[7],
            access_time: data[8],
            flash_cs: data[10],
        })
    }
}

/// Bad-block bitmap over the ID-block scan window.
#[derive(Clone, Debug)]
pub struct BadBlockMap {
    bad: [bool; IDB_BLOCK_TOP],
}

impl BadBlockMap {
    /// Parses the bad-block test response; bit `i` of byte `j` marks block
    /// `8 * j + i` bad. At least 64 bytes are required.
    pub fn parse(data: &[u8]) -> Result<BadBlockMap, TransportError> {
        if data.len() < 64 {
            return Err(TransportError::ShortBadBlockMap(data.len()));
        }
        let mut bad = [false; IDB_BLOCK_TOP];
        for (block, flag) in bad.iter_mut().enumerate() {
            *flag = data[block / 8] & (1 << (block % 8)) != 0;
        }
        Ok(BadBlockMap { bad })
    }

    /// Out-of-window blocks count as bad; nothing may be stored there.
    pub fn is_bad(&self, block: usize) -> bool {
        self.bad.get(block).copied().unwrap_or(true)
    }

    /// First good block at or after `from`, confined to the scan window.
    pub fn next_good_block(&self, from: usize) -> Option<usize> {
        (from..IDB_BLOCK_TOP).find(|&block| !self.bad[block])
    }
}
