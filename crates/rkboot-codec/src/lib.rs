//! Leaf codecs for the Rockchip ID block.
//!
//! Three small, self-contained primitives that every ID-block read or write
//! goes through:
//!
//! * a BCH(8191, 7683, t = 8) encoder over GF(2^13) that wraps a 515-byte
//!   sector payload into a 528-byte physical sector,
//! * the CRC-16-CCITT used for the per-sector integrity fields,
//! * the fixed-key RC4 scrambler applied to logical sectors 0, 2 and 3.
//!
//! All lookup tables are derived once per process and shared read-only
//! afterwards.

mod bch;
mod crc;
mod rc4;

pub use bch::{bch_encode, BCH_CODE_LEN, BCH_DATA_LEN};
pub use crc::crc16;
pub use rc4::rc4_xor;
