//! Command execution over an opaque bulk pipe pair.

use crate::error::TransportError;
use crate::flash::{BadBlockMap, FlashInfo, MAX_TEST_BLOCKS};
use crate::wire::{Cbw, Csw, Opcode, CSW_LEN, CSW_SIGNATURE};

/// Logical sector size; also the LBA transfer unit.
pub const SECTOR_LEN: usize = 512;
/// Physical sector size: 512 data bytes plus 16 OOB bytes.
pub const PHYS_SECTOR_LEN: usize = 528;
/// Largest sector count the device accepts in one transfer.
pub const MAX_TRANSFER_SECTORS: u16 = 16;

/// Read chunk size while draining the IN pipe.
const IN_CHUNK: usize = 1024;

/// A paired bulk IN/OUT byte pipe. The CLI backs this with a claimed USB
/// interface; tests back it with in-memory device models.
pub trait BulkPipe {
    fn bulk_out(&mut self, buf: &[u8]) -> std::io::Result<usize>;
    fn bulk_in(&mut self, buf: &mut [u8]) -> std::io::Result<usize>;
}

impl<P: BulkPipe + ?Sized> BulkPipe for &mut P {
    fn bulk_out(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        (**self).bulk_out(buf)
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        (**self).bulk_in(buf)
    }
}

/// Strictly sequential command transport: one CBW on the wire at a time,
/// each answered by payload bytes and a CSW.
pub struct Transport<P> {
    pipe: P,
}

impl<P: BulkPipe> Transport<P> {
    pub fn new(pipe: P) -> Self {
        Transport { pipe }
    }

    pub fn test_unit_ready(&mut self) -> Result<(), TransportError> {
        self.execute(Cbw::new(Opcode::TestUnitReady), None).map(drop)
    }

    pub fn device_reset(&mut self) -> Result<(), TransportError> {
        self.execute(Cbw::new(Opcode::DeviceReset), None).map(drop)
    }

    /// Raw chip identification bytes. The transfer length mirrors the
    /// vendor tool, which requests 0x10000000 for this command only.
    pub fn read_chip_info(&mut self) -> Result<Vec<u8>, TransportError> {
        let mut cbw = Cbw::new(Opcode::ReadChipInfo);
        cbw.transfer_length = 0x1000_0000;
        self.execute(cbw, None)
    }

    pub fn read_flash_info(&mut self) -> Result<FlashInfo, TransportError> {
        let data = self.execute(Cbw::new(Opcode::ReadFlashInfo), None)?;
        FlashInfo::parse(&data)
    }

    pub fn read_bad_block_map(&mut self) -> Result<BadBlockMap, TransportError> {
        let mut cbw = Cbw::new(Opcode::TestBadBlock);
        cbw.length = MAX_TEST_BLOCKS;
        let data = self.execute(cbw, None)?;
        BadBlockMap::parse(&data)
    }

    /// Reads `count` physical sectors. `address` is the device form,
    /// `sector_index << 8 | selector`.
    pub fn read_sectors(&mut self, address: u32, count: u16) -> Result<Vec<u8>, TransportError> {
        let mut cbw = Cbw::new(Opcode::ReadSector);
        cbw.address = address;
        cbw.length = count;
        self.execute(cbw, None)
    }

    /// Writes whole physical sectors; `data` must be a multiple of 528
    /// bytes.
    pub fn write_sectors(&mut self, address: u32, data: &[u8]) -> Result<(), TransportError> {
        if data.len() % PHYS_SECTOR_LEN != 0 {
            return Err(TransportError::UnalignedPayload {
                len: data.len(),
                unit: PHYS_SECTOR_LEN,
            });
        }
        let mut cbw = Cbw::new(Opcode::WriteSector);
        cbw.address = address;
        cbw.length = (data.len() / PHYS_SECTOR_LEN) as u16;
        self.execute(cbw, Some(data)).map(drop)
    }

    /// Erases `count` flash blocks starting at block index `block`.
    pub fn erase_blocks(&mut self, block: u32, count: u16) -> Result<(), TransportError> {
        let mut cbw = Cbw::new(Opcode::EraseNormal);
        cbw.address = block;
        cbw.length = count;
        self.execute(cbw, None).map(drop)
    }

    /// Reads `len` bytes (a multiple of 512) from the flat LBA space.
    pub fn read_lba(
        &mut self,
        lba: u32,
        len: usize,
        selector: u8,
    ) -> Result<Vec<u8>, TransportError> {
        if len % SECTOR_LEN != 0 {
            return Err(TransportError::UnalignedPayload {
                len,
                unit: SECTOR_LEN,
            });
        }
        let mut cbw = Cbw::new(Opcode::ReadLba);
        cbw.address = lba;
        cbw.selector = selector;
        cbw.length = (len / SECTOR_LEN) as u16;
        self.execute(cbw, None)
    }

    /// Writes to the flat LBA space; `data` must be a multiple of 512
    /// bytes.
    pub fn write_lba(
        &mut self,
        lba: u32,
        data: &[u8],
        selector: u8,
    ) -> Result<(), TransportError> {
        if data.len() % SECTOR_LEN != 0 {
            return Err(TransportError::UnalignedPayload {
                len: data.len(),
                unit: SECTOR_LEN,
            });
        }
        let mut cbw = Cbw::new(Opcode::WriteLba);
        cbw.address = lba;
        cbw.selector = selector;
        cbw.length = (data.len() / SECTOR_LEN) as u16;
        self.execute(cbw, Some(data)).map(drop)
    }

    /// Frames one command: CBW out, optional payload out, then IN data
    /// accumulated until the in-band CSW shows up as an exactly 13-byte
    /// chunk starting with "USBS". Returns the pre-CSW bytes.
    fn execute(
        &mut self,
        cbw: Cbw,
        out_data: Option<&[u8]>,
    ) -> Result<Vec<u8>, TransportError> {
        tracing::trace!(opcode = ?cbw.opcode, tag = cbw.tag, "command");

        let frame = cbw.to_bytes();
        let written = self.pipe.bulk_out(&frame)?;
        if written != frame.len() {
            return Err(TransportError::ShortWrite {
                written,
                expected: frame.len(),
            });
        }

        if let Some(data) = out_data {
            let written = self.pipe.bulk_out(data)?;
            if written != data.len() {
                return Err(TransportError::ShortWrite {
                    written,
                    expected: data.len(),
                });
            }
        }

        let mut payload = Vec::new();
        let csw = loop {
            let mut chunk = [0u8; IN_CHUNK];
            let n = self.pipe.bulk_in(&mut chunk)?;
            if n == CSW_LEN && chunk[..4] == CSW_SIGNATURE.to_be_bytes() {
                break Csw::parse(&chunk[..CSW_LEN])?;
            }
            if n == 0 {
                return Err(TransportError::MissingCsw);
            }
            payload.extend_from_slice(&chunk[..n]);
        };

        if csw.signature != CSW_SIGNATURE {
            return Err(TransportError::BadCswSignature(csw.signature));
        }
        if csw.tag != cbw.tag {
            return Err(TransportError::TagMismatch {
                want: cbw.tag,
                got: csw.tag,
            });
        }
        if csw.status == 1 {
            return Err(TransportError::CommandFailed);
        }

        Ok(payload)
    }
}
