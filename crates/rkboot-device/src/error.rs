use thiserror::Error;

use rkboot_idb::IdbError;
use rkboot_image::ImageError;
use rkboot_proto::TransportError;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device data has not been read yet")]
    NotRead,

    #[error("image has no parameter partition")]
    NoParameterPartition,

    #[error("partition {0:?} did not read back identically")]
    ImageVerifyMismatch(String),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Idb(#[from] IdbError),

    #[error(transparent)]
    Image(#[from] ImageError),
}
