//! In-memory bootloader-mode device behind a [`BulkPipe`]: raw physical
//! sector space for the ID block plus two flat LBA spaces (selector 0 and
//! 1) for the flasher.
#![allow(dead_code)] // not every test binary uses every knob

use std::collections::VecDeque;
use std::io;

use rkboot_proto::{BulkPipe, CBW_LEN, CSW_LEN, PHYS_SECTOR_LEN};

const OP_TEST_UNIT_READY: u8 = 0x00;
const OP_TEST_BAD_BLOCK: u8 = 0x03;
const OP_READ_SECTOR: u8 = 0x04;
const OP_WRITE_SECTOR: u8 = 0x05;
const OP_ERASE_NORMAL: u8 = 0x06;
const OP_READ_LBA: u8 = 0x14;
const OP_WRITE_LBA: u8 = 0x15;
const OP_READ_FLASH_INFO: u8 = 0x1A;
const OP_READ_CHIP_INFO: u8 = 0x1B;
const OP_DEVICE_RESET: u8 = 0xFF;

const LBA_SPACE_LEN: usize = 0x100_0000;

enum PendingWrite {
    Sectors { sector: u32, len: usize },
    Lba { selector: u8, lba: u32, len: usize },
}

pub struct FakeDevice {
    pub sectors_per_block: u32,
    pub blocks: u32,
    pub phys: Vec<u8>,
    pub bad_map: [u8; 64],
    pub erased: Vec<u32>,
    /// Flat LBA spaces, one per selector value.
    pub lba: [Vec<u8>; 2],
    /// (selector, lba, byte length) of every LBA write, in order.
    pub lba_writes: Vec<(u8, u32, usize)>,
    pub probes: u32,
    pub resets: u32,
    /// When set, the first byte of every LBA write is flipped after it
    /// lands, so the read-back verify must fail.
    pub corrupt_lba_writes: bool,

    in_queue: VecDeque<Vec<u8>>,
    pending_write: Option<PendingWrite>,
    pending_csw: VecDeque<Vec<u8>>,
}

impl FakeDevice {
    pub fn new(sectors_per_block: u32, blocks: u32) -> Self {
        FakeDevice {
            sectors_per_block,
            blocks,
            phys: vec![0u8; (sectors_per_block * blocks) as usize * PHYS_SECTOR_LEN],
            bad_map: [0u8; 64],
            erased: Vec::new(),
            lba: [vec![0u8; LBA_SPACE_LEN], vec![0u8; LBA_SPACE_LEN]],
            lba_writes: Vec::new(),
            probes: 0,
            resets: 0,
            corrupt_lba_writes: false,
            in_queue: VecDeque::new(),
            pending_write: None,
            pending_csw: VecDeque::new(),
        }
    }

    pub fn mark_bad(&mut self, block: u32) {
        self.bad_map[(block / 8) as usize] |= 1 << (block % 8);
    }

    pub fn place_sectors(&mut self, block: u32, sectors: &[u8]) {
        let start = (block * self.sectors_per_block) as usize * PHYS_SECTOR_LEN;
        self.phys[start..start + sectors.len()].copy_from_slice(sectors);
    }

    pub fn block_sectors(&self, block: u32, count: usize) -> &[u8] {
        let start = (block * self.sectors_per_block) as usize * PHYS_SECTOR_LEN;
        &self.phys[start..start + count * PHYS_SECTOR_LEN]
    }

    fn queue_response(&mut self, tag: u32, payload: &[u8], status: u8) {
        for chunk in payload.chunks(1024) {
            self.in_queue.push_back(chunk.to_vec());
        }
        let mut csw = [0u8; CSW_LEN];
        csw[0..4].copy_from_slice(&0x5553_4253u32.to_be_bytes());
        csw[4..8].copy_from_slice(&tag.to_be_bytes());
        csw[12] = status;
        self.pending_csw.push_back(csw.to_vec());
    }

    fn flush_csw(&mut self) {
        if let Some(csw) = self.pending_csw.pop_front() {
            self.in_queue.push_back(csw);
        }
    }

    fn handle_cbw(&mut self, cbw: &[u8]) {
        let tag = u32::from_be_bytes([cbw[4], cbw[5], cbw[6], cbw[7]]);
        let selector = cbw[16];
        let address = u32::from_be_bytes([cbw[17], cbw[18], cbw[19], cbw[20]]);
        let length = u16::from_be_bytes([cbw[22], cbw[23]]);

        match cbw[15] {
            OP_TEST_UNIT_READY => {
                self.probes += 1;
                self.queue_response(tag, &[], 0);
            }
            OP_DEVICE_RESET => {
                self.resets += 1;
                self.queue_response(tag, &[], 0);
            }
            OP_READ_CHIP_INFO => self.queue_response(tag, b"RK28-chip-info!!", 0),
            OP_READ_FLASH_INFO => {
                let mut data = Vec::new();
                data.extend_from_slice(&1024u32.to_be_bytes());
                data.extend_from_slice(&(self.sectors_per_block as u16).to_be_bytes());
                data.push(4); // page size: valid window spans the block
                data.push(8);
                data.push(40);
                data.push(0); // SAMSUNG
                data.push(0);
                self.queue_response(tag, &data, 0);
            }
            OP_TEST_BAD_BLOCK => {
                let map = self.bad_map;
                self.queue_response(tag, &map, 0);
            }
            OP_READ_SECTOR => {
                let sector = (address >> 8) as usize;
                let start = sector * PHYS_SECTOR_LEN;
                let end = start + usize::from(length) * PHYS_SECTOR_LEN;
                if end > self.phys.len() {
                    self.queue_response(tag, &[], 1);
                } else {
                    let data = self.phys[start..end].to_vec();
                    self.queue_response(tag, &data, 0);
                }
            }
            OP_WRITE_SECTOR => {
                self.pending_write = Some(PendingWrite::Sectors {
                    sector: address >> 8,
                    len: usize::from(length) * PHYS_SECTOR_LEN,
                });
                self.queue_response(tag, &[], 0);
            }
            OP_ERASE_NORMAL => {
                for block in address..address + u32::from(length) {
                    self.erased.push(block);
                    let start = (block * self.sectors_per_block) as usize * PHYS_SECTOR_LEN;
                    let end = start + self.sectors_per_block as usize * PHYS_SECTOR_LEN;
                    if end <= self.phys.len() {
                        self.phys[start..end].fill(0xFF);
                    }
                }
                self.queue_response(tag, &[], 0);
            }
            OP_READ_LBA => {
                let start = address as usize * 512;
                let end = start + usize::from(length) * 512;
                let space = &self.lba[usize::from(selector.min(1))];
                if end > space.len() {
                    self.queue_response(tag, &[], 1);
                } else {
                    let data = space[start..end].to_vec();
                    self.queue_response(tag, &data, 0);
                }
            }
            OP_WRITE_LBA => {
                self.pending_write = Some(PendingWrite::Lba {
                    selector: selector.min(1),
                    lba: address,
                    len: usize::from(length) * 512,
                });
                self.queue_response(tag, &[], 0);
            }
            _ => self.queue_response(tag, &[], 1),
        }
    }
}

impl BulkPipe for FakeDevice {
    fn bulk_out(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(pending) = self.pending_write.take() {
            match pending {
                PendingWrite::Sectors { sector, len } => {
                    assert_eq!(buf.len(), len, "sector write payload length mismatch");
                    let start = sector as usize * PHYS_SECTOR_LEN;
                    self.phys[start..start + len].copy_from_slice(buf);
                }
                PendingWrite::Lba { selector, lba, len } => {
                    assert_eq!(buf.len(), len, "LBA write payload length mismatch");
                    let start = lba as usize * 512;
                    let space = &mut self.lba[usize::from(selector)];
                    space[start..start + len].copy_from_slice(buf);
                    if self.corrupt_lba_writes {
                        space[start] ^= 0x01;
                    }
                    self.lba_writes.push((selector, lba, len));
                }
            }
            self.flush_csw();
            return Ok(buf.len());
        }

        assert_eq!(buf.len(), CBW_LEN, "expected a CBW frame");
        self.handle_cbw(buf);
        if self.pending_write.is_none() {
            self.flush_csw();
        }
        Ok(buf.len())
    }

    fn bulk_in(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.in_queue.pop_front() {
            Some(chunk) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            None => Ok(0),
        }
    }
}
