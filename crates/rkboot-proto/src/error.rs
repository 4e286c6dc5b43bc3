use thiserror::Error;

/// Failures of the bulk transport or of parsing its fixed-size responses.
///
/// Any transport error taints the session: the device may have partially
/// processed a command, so callers must not retry.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("short write on bulk-out pipe: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("pipe went quiet before a status wrapper arrived")]
    MissingCsw,

    #[error("status wrapper truncated to {0} bytes")]
    ShortCsw(usize),

    #[error("bad status wrapper signature {0:#010x}")]
    BadCswSignature(u32),

    #[error("status wrapper tag {got:#010x} does not match command tag {want:#010x}")]
    TagMismatch { want: u32, got: u32 },

    #[error("device reported command failure")]
    CommandFailed,

    #[error("sector payload of {len} bytes is not a multiple of {unit}")]
    UnalignedPayload { len: usize, unit: usize },

    #[error("flash info response truncated to {0} bytes")]
    ShortFlashInfo(usize),

    #[error("implausible flash geometry (block size {block_size}, page size {page_size})")]
    BadGeometry { block_size: u16, page_size: u8 },

    #[error("bad block map truncated to {0} bytes")]
    ShortBadBlockMap(usize),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
