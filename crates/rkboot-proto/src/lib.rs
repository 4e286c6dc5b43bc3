//! Bulk transport for the Rockchip mass-storage bootloader protocol.
//!
//! The bootloader speaks a USB mass-storage-style framing: every command is
//! a 31-byte Command Block Wrapper on the OUT pipe, optionally followed by
//! payload data, and every response ends with a 13-byte Command Status
//! Wrapper delivered in-band on the IN pipe. This crate owns that framing,
//! the ten-opcode command set, and the parsed forms of the flash-geometry
//! and bad-block responses.
//!
//! USB device enumeration is out of scope; callers provide any byte pipe
//! implementing [`BulkPipe`].

mod error;
mod flash;
mod transport;
mod wire;

pub use error::TransportError;
pub use flash::{BadBlockMap, FlashInfo, Manufacturer, IDB_BLOCK_TOP, MAX_TEST_BLOCKS};
pub use transport::{BulkPipe, Transport, MAX_TRANSFER_SECTORS, PHYS_SECTOR_LEN, SECTOR_LEN};
pub use wire::{Cbw, Csw, Direction, Opcode, CBW_LEN, CBW_SIGNATURE, CSW_LEN, CSW_SIGNATURE};
