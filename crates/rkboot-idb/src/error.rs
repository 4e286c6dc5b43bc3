use thiserror::Error;

use rkboot_proto::TransportError;

#[derive(Debug, Error)]
pub enum IdbError {
    #[error("no id block present on the device")]
    NoIdb,

    #[error("none of the {0} id block copies could be read")]
    NoReadableCopy(usize),

    #[error("device returned {got} bytes where {want} were expected")]
    ShortRead { want: usize, got: usize },

    #[error("{field} may be at most {max} characters")]
    FieldTooLong { field: &'static str, max: usize },

    #[error("{field} must be exactly {expected} hex digits")]
    BadAddressLength {
        field: &'static str,
        expected: usize,
    },

    #[error(transparent)]
    BadHex(#[from] hex::FromHexError),

    #[error("implausible boot region of {0} sectors")]
    BadBootRegion(u32),

    #[error("read-back mismatch at sector address {0:#010x}")]
    VerifyMismatch(u32),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
