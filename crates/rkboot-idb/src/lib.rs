//! The on-NAND ID block: four 512-byte logical sectors replicated across up
//! to five flash blocks.
//!
//! Sector 0 carries the boot-code layout, sector 1 the flash and chip
//! descriptors, sector 2 the integrity fields, and sector 3 the device
//! identity (serial number, IMEI, UID, MAC and Bluetooth addresses). This
//! crate owns the fixed little-endian record layouts, the scramble/CRC/BCH
//! codec between records and physical sectors, and the replicated store:
//! discovery, reconciliation of the copies, and the erase-write-verify
//! rewrite cycle.

mod codec;
mod error;
mod sector;
mod store;

pub use codec::{IdbSectors, IDB_SECTORS};
pub use error::IdbError;
pub use sector::{
    Sec0, Sec1, Sec2, Sec3, BT_LEN, CHIP_TAG_RK28, IMEI_LEN, MAC_LEN, SEC0_TAG, SN_LEN, UID_LEN,
};
pub use store::{IdbStore, IDB_MAX_COPIES};
