//! RKFW firmware image containers.
//!
//! A container is a 512-byte outer header ("RKFW") pointing at an embedded
//! firmware block ("RKAF") that lists up to sixteen partitions, and ends
//! with 32 ASCII-hex characters of MD5 over everything before them. The
//! digest is verified before any parsing; partition positions are
//! rebased onto the container so callers can read payload bytes directly.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use thiserror::Error;

/// "RKFW", little-endian at offset 0.
pub const RKFW_MAGIC: u32 = 0x5746_4B52;
/// "RKAF", little-endian at the firmware offset.
pub const RKAF_MAGIC: u32 = 0x4641_4B52;

const OUTER_HEADER_LEN: usize = 512;
const FW_OFFSET_AT: usize = 0x21;
const FW_SIZE_AT: usize = 0x25;
const MD5_TRAILER_LEN: u64 = 32;

const MODEL_LEN: usize = 64;
const MANUFACTURER_LEN: usize = 60;
const ITEM_SLOTS: usize = 16;
const ITEM_NAME_LEN: usize = 32;
const ITEM_FILE_LEN: usize = 60;
/// name + file + five u32 fields.
const ITEM_LEN: usize = ITEM_NAME_LEN + ITEM_FILE_LEN + 20;
/// tag + size + model + manufacturer + version + item count + item slots.
const FW_HEADER_LEN: usize = 8 + MODEL_LEN + MANUFACTURER_LEN + 8 + ITEM_SLOTS * ITEM_LEN;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("image checksum mismatch")]
    ChecksumMismatch,

    #[error("not an RKFW image")]
    BadContainerTag,

    #[error("firmware header tag does not match")]
    BadFirmwareTag,

    #[error("firmware header declares {0} partitions")]
    BadItemCount(i32),

    #[error("image file truncated")]
    Truncated,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// One partition entry, with `pos` already rebased onto the container
/// file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImagePart {
    pub name: String,
    pub file: String,
    pub nand_size: u32,
    pub pos: u64,
    pub nand_addr: u32,
    pub padded_size: u32,
    pub size: u32,
}

impl ImagePart {
    /// Only `.img` payloads are flashed; everything else in the item table
    /// is metadata.
    pub fn is_image(&self) -> bool {
        self.file.ends_with(".img")
    }

    pub fn is_parameter(&self) -> bool {
        self.name == "parameter"
    }
}

/// An opened and checksum-verified firmware image.
#[derive(Debug)]
pub struct RkImage {
    pub fw_offset: u32,
    pub fw_size: u32,
    pub machine_model: String,
    pub manufacturer: String,
    pub parts: Vec<ImagePart>,
    file: File,
}

impl RkImage {
    pub fn open(path: &Path) -> Result<RkImage, ImageError> {
        let mut file = File::open(path)?;
        verify_md5(&mut file)?;

        let mut header = [0u8; OUTER_HEADER_LEN];
        file.seek(SeekFrom::Start(0))?;
        read_exact_or_truncated(&mut file, &mut header)?;
        if read_u32(&header, 0) != RKFW_MAGIC {
            return Err(ImageError::BadContainerTag);
        }
        let fw_offset = read_u32(&header, FW_OFFSET_AT);
        let fw_size = read_u32(&header, FW_SIZE_AT);

        let mut fw_header = vec![0u8; FW_HEADER_LEN];
        file.seek(SeekFrom::Start(u64::from(fw_offset)))?;
        read_exact_or_truncated(&mut file, &mut fw_header)?;
        if read_u32(&fw_header, 0) != RKAF_MAGIC {
            return Err(ImageError::BadFirmwareTag);
        }
        let machine_model = printable_prefix(&fw_header[8..8 + MODEL_LEN]);
        let manufacturer =
            printable_prefix(&fw_header[8 + MODEL_LEN..8 + MODEL_LEN + MANUFACTURER_LEN]);
        let item_count = read_u32(&fw_header, 8 + MODEL_LEN + MANUFACTURER_LEN + 4) as i32;
        if item_count < 0 || item_count as usize > ITEM_SLOTS {
            return Err(ImageError::BadItemCount(item_count));
        }

        let items_at = 8 + MODEL_LEN + MANUFACTURER_LEN + 8;
        let mut parts = Vec::with_capacity(item_count as usize);
        for slot in 0..item_count as usize {
            let item = &fw_header[items_at + slot * ITEM_LEN..items_at + (slot + 1) * ITEM_LEN];
            parts.push(ImagePart {
                name: printable_prefix(&item[..ITEM_NAME_LEN]),
                file: printable_prefix(&item[ITEM_NAME_LEN..ITEM_NAME_LEN + ITEM_FILE_LEN]),
                nand_size: read_u32(item, 92),
                pos: u64::from(read_u32(item, 96)) + u64::from(fw_offset),
                nand_addr: read_u32(item, 100),
                padded_size: read_u32(item, 104),
                size: read_u32(item, 108),
            });
        }

        Ok(RkImage {
            fw_offset,
            fw_size,
            machine_model,
            manufacturer,
            parts,
            file,
        })
    }

    /// Reads exactly `buf.len()` payload bytes at absolute file position
    /// `pos`.
    pub fn read_exact_at(&mut self, pos: u64, buf: &mut [u8]) -> Result<(), ImageError> {
        self.file.seek(SeekFrom::Start(pos))?;
        read_exact_or_truncated(&mut self.file, buf)
    }
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn read_exact_or_truncated(file: &mut File, buf: &mut [u8]) -> Result<(), ImageError> {
    file.read_exact(buf).map_err(|err| {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            ImageError::Truncated
        } else {
            ImageError::Io(err)
        }
    })
}

/// NUL-terminated string fields, cut at the first unprintable byte.
fn printable_prefix(bytes: &[u8]) -> String {
    bytes
        .split(|&b| b == 0)
        .next()
        .unwrap_or(&[])
        .iter()
        .copied()
        .take_while(|&b| (0x21..=0x7F).contains(&b))
        .map(char::from)
        .collect()
}

/// Streams the file in 512-byte chunks and compares its MD5 against the
/// lowercase ASCII-hex trailer.
fn verify_md5(file: &mut File) -> Result<(), ImageError> {
    let len = file.metadata()?.len();
    if len < MD5_TRAILER_LEN + OUTER_HEADER_LEN as u64 {
        return Err(ImageError::Truncated);
    }
    let body_len = len - MD5_TRAILER_LEN;

    file.seek(SeekFrom::Start(0))?;
    let mut context = md5::Context::new();
    let mut remaining = body_len;
    let mut buf = [0u8; 512];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        read_exact_or_truncated(file, &mut buf[..chunk])?;
        context.consume(&buf[..chunk]);
        remaining -= chunk as u64;
    }

    let mut trailer = [0u8; MD5_TRAILER_LEN as usize];
    read_exact_or_truncated(file, &mut trailer)?;

    let digest = context.compute();
    if format!("{digest:x}").as_bytes() != trailer {
        return Err(ImageError::ChecksumMismatch);
    }
    Ok(())
}
