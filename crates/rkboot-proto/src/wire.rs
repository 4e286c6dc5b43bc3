//! Command Block Wrapper / Command Status Wrapper wire formats.
//!
//! Both wrappers are big-endian on the wire. The 16-byte command block
//! inside the CBW is `{opcode, selector, address: u32, reserved, length:
//! u16, reserved[7]}`; physical-sector commands put a pre-shifted
//! `sector << 8` address in the address field, LBA commands use the flat
//! LBA and carry the partition selector in the byte after the opcode.

use crate::error::TransportError;

/// "USBC".
pub const CBW_SIGNATURE: u32 = 0x5553_4243;
/// "USBS".
pub const CSW_SIGNATURE: u32 = 0x5553_4253;

/// Serialized CBW size.
pub const CBW_LEN: usize = 31;
/// Serialized CSW size.
pub const CSW_LEN: usize = 13;

/// The bootloader command set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    TestUnitReady = 0x00,
    TestBadBlock = 0x03,
    ReadSector = 0x04,
    WriteSector = 0x05,
    EraseNormal = 0x06,
    ReadLba = 0x14,
    WriteLba = 0x15,
    ReadFlashInfo = 0x1A,
    ReadChipInfo = 0x1B,
    DeviceReset = 0xFF,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

impl Direction {
    fn flags(self) -> u8 {
        match self {
            Direction::In => 0x80,
            Direction::Out => 0x00,
        }
    }
}

impl Opcode {
    pub fn direction(self) -> Direction {
        match self {
            Opcode::TestUnitReady
            | Opcode::TestBadBlock
            | Opcode::ReadSector
            | Opcode::ReadLba
            | Opcode::ReadFlashInfo
            | Opcode::ReadChipInfo => Direction::In,
            Opcode::WriteSector
            | Opcode::EraseNormal
            | Opcode::WriteLba
            | Opcode::DeviceReset => Direction::Out,
        }
    }

    /// Command block length advertised in the CBW header: 6 for the
    /// parameterless commands, 10 for those carrying address and length.
    pub fn cbwcb_len(self) -> u8 {
        match self {
            Opcode::TestUnitReady
            | Opcode::ReadFlashInfo
            | Opcode::ReadChipInfo
            | Opcode::DeviceReset => 0x06,
            Opcode::TestBadBlock
            | Opcode::ReadSector
            | Opcode::WriteSector
            | Opcode::EraseNormal
            | Opcode::ReadLba
            | Opcode::WriteLba => 0x0A,
        }
    }
}

/// One command, ready to frame. Tags are random per command and correlate
/// the CSW with its CBW.
#[derive(Clone, Copy, Debug)]
pub struct Cbw {
    pub tag: u32,
    pub transfer_length: u32,
    pub opcode: Opcode,
    /// Partition selector byte used by the LBA commands, zero elsewhere.
    pub selector: u8,
    pub address: u32,
    /// Transfer length in command units (sectors or blocks).
    pub length: u16,
}

impl Cbw {
    pub fn new(opcode: Opcode) -> Self {
        Cbw {
            tag: fastrand::u32(..),
            transfer_length: 0,
            opcode,
            selector: 0,
            address: 0,
            length: 0,
        }
    }

    pub fn to_bytes(&self) -> [u8; CBW_LEN] {
        let mut out = [0u8; CBW_LEN];
        out[0..4].copy_from_slice(&CBW_SIGNATURE.to_be_bytes());
        out[4..8].copy_from_slice(&self.tag.to_be_bytes());
        out[8..12].copy_from_slice(&self.transfer_length.to_be_bytes());
        out[12] = self.opcode.direction().flags();
        out[13] = 0; // LUN
        out[14] = self.opcode.cbwcb_len();
        out[15] = self.opcode as u8;
        out[16] = self.selector;
        out[17..21].copy_from_slice(&self.address.to_be_bytes());
        // out[21] reserved
        out[22..24].copy_from_slice(&self.length.to_be_bytes());
        // out[24..31] reserved
        out
    }
}

/// Parsed Command Status Wrapper.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Csw {
    pub signature: u32,
    pub tag: u32,
    pub data_residue: u32,
    pub status: u8,
}

impl Csw {
    /// Parses exactly [`CSW_LEN`] bytes; anything else is rejected.
    pub fn parse(bytes: &[u8]) -> Result<Csw, TransportError> {
        if bytes.len() != CSW_LEN {
            return Err(TransportError::ShortCsw(bytes.len()));
        }
        let word = |at: usize| {
            u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
        };
        Ok(Csw {
            signature: word(0),
            tag: word(4),
            data_residue: word(8),
            status: bytes[12],
        })
    }
}
