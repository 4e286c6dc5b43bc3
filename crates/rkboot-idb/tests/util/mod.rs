//! In-memory model of a device in bootloader mode, exposed as a
//! [`BulkPipe`]: parses CBWs, serves a raw physical-sector space, and
//! answers with payload chunks followed by a tag-matched CSW.
#![allow(dead_code)] // not every test binary uses every knob

use std::collections::VecDeque;
use std::io;

use rkboot_proto::{BulkPipe, FlashInfo, Manufacturer, CBW_LEN, CSW_LEN, PHYS_SECTOR_LEN};

const OP_TEST_UNIT_READY: u8 = 0x00;
const OP_TEST_BAD_BLOCK: u8 = 0x03;
const OP_READ_SECTOR: u8 = 0x04;
const OP_WRITE_SECTOR: u8 = 0x05;
const OP_ERASE_NORMAL: u8 = 0x06;
const OP_READ_FLASH_INFO: u8 = 0x1A;
const OP_READ_CHIP_INFO: u8 = 0x1B;

pub struct FakeFlash {
    pub sectors_per_block: u32,
    pub blocks: u32,
    /// Raw physical sector space, 528 bytes per sector.
    pub phys: Vec<u8>,
    /// Bad-block bitmap as returned by the bad-block test.
    pub bad_map: [u8; 64],
    /// Erased block indices, in order.
    pub erased: Vec<u32>,
    /// When set, the lowest payload byte of every sector write is flipped
    /// after it lands, so read-back verification must fail.
    pub corrupt_writes: bool,

    in_queue: VecDeque<Vec<u8>>,
    pending_write: Option<(u32, usize)>,
    pending_csw: VecDeque<Vec<u8>>,
}

impl FakeFlash {
    pub fn new(sectors_per_block: u32, blocks: u32) -> Self {
        FakeFlash {
            sectors_per_block,
            blocks,
            phys: vec![0u8; (sectors_per_block * blocks) as usize * PHYS_SECTOR_LEN],
            bad_map: [0u8; 64],
            erased: Vec::new(),
            corrupt_writes: false,
            in_queue: VecDeque::new(),
            pending_write: None,
            pending_csw: VecDeque::new(),
        }
    }

    pub fn mark_bad(&mut self, block: u32) {
        self.bad_map[(block / 8) as usize] |= 1 << (block % 8);
    }

    /// Geometry the transport would derive for this model.
    pub fn flash_info(&self) -> FlashInfo {
        FlashInfo {
            manufacturer: Manufacturer::Samsung,
            flash_size_mib: 1,
            block_num: self.blocks,
            block_size_kib: self.sectors_per_block / 2,
            page_size_kib: 1,
            sectors_per_block: self.sectors_per_block,
            valid_sectors_per_block: self.sectors_per_block,
            ecc_bits: 8,
            access_time: 40,
            flash_cs: 0,
        }
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
        let opcode = cbw[15];
        let address = u32::from_be_bytes([cbw[17], cbw[18], cbw[19], cbw[20]]);
        let length = u16::from_be_bytes([cbw[22], cbw[23]]);

        match opcode {
            OP_TEST_UNIT_READY => self.queue_response(tag, &[], 0),
            OP_READ_CHIP_INFO => self.queue_response(tag, &[0x28u8; 16], 0),
            OP_READ_FLASH_INFO => {
                let mut data = Vec::new();
                data.extend_from_slice(&1024u32.to_be_bytes());
                data.extend_from_slice(&(self.sectors_per_block as u16).to_be_bytes());
                data.push(4); // page size: valid window spans the block
                data.push(8);
                data.push(40);
                data.push(0);
                data.push(0);
                self.queue_response(tag, &data, 0);
            }
            OP_TEST_BAD_BLOCK => {
                let map = self.bad_map;
                self.queue_response(tag, &map, 0);
            }
            OP_READ_SECTOR => {
                let sector = (address >> 8) as usize;
                let count = usize::from(length);
                let start = sector * PHYS_SECTOR_LEN;
                let end = start + count * PHYS_SECTOR_LEN;
                if end > self.phys.len() {
                    self.queue_response(tag, &[], 1);
                } else {
                    let data = self.phys[start..end].to_vec();
                    self.queue_response(tag, &data, 0);
                }
            }
            OP_WRITE_SECTOR => {
                let sector = address >> 8;
                let len = usize::from(length) * PHYS_SECTOR_LEN;
                self.pending_write = Some((sector, len));
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
            _ => self.queue_response(tag, &[], 1),
        }
    }
}

impl BulkPipe for FakeFlash {
    fn bulk_out(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some((sector, len)) = self.pending_write.take() {
            assert_eq!(buf.len(), len, "write payload length mismatch");
            let start = sector as usize * PHYS_SECTOR_LEN;
            self.phys[start..start + len].copy_from_slice(buf);
            if self.corrupt_writes {
                self.phys[start] ^= 0x01;
            }
            self.flush_csw();
            return Ok(buf.len());
        }

        assert_eq!(buf.len(), CBW_LEN, "expected a CBW frame");
        self.handle_cbw(buf);
        // OUT commands with payload get their CSW only after the payload;
        // everything else can flush immediately.
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
