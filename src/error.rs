use thiserror::Error;

use crate::ArrayDataType;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),
    #[error("Invalid output target: {0}")]
    InvalidOutputTarget(String),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Unsupported sample type: {0}")]
    UnsupportedSampleType(ArrayDataType),
    #[error("Native operation failed: {0}")]
    NativeOperationFailure(String),
    #[error("Resource exhaustion: {0}")]
    ResourceExhaustion(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(err: gdal::errors::GdalError) -> Self {
        Error::NativeOperationFailure(err.to_string())
    }
}

impl From<std::collections::TryReserveError> for Error {
    fn from(err: std::collections::TryReserveError) -> Self {
        Error::ResourceExhaustion(format!("Failed to allocate pixel buffer ({err})"))
    }
}
