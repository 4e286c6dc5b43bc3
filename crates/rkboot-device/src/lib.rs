//! Device session: the read-modify-write orchestration over one open
//! bootloader connection.
//!
//! [`RkDevice`] owns the transport and the ID-block state for exactly one
//! device. All operations are synchronous and strictly sequential; any
//! transport error taints the session. The LBA image flasher lives here
//! too, reporting through the [`Progress`] capability so the core never
//! depends on a UI.

mod error;
mod flasher;
mod progress;
mod session;

pub use error::DeviceError;
pub use progress::{NoProgress, Progress};
pub use session::RkDevice;
