use crate::{DriverCapability, Error, RasterEngine, Result};

/// How a dataset in the destination format gets created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStrategy {
    /// Create the destination dataset and write the pixels into it
    Create,
    /// Populate an intermediate dataset and copy it into the destination format
    CreateCopy,
}

/// Verifies that the driver can produce new datasets, this check precedes any other work of a write.
pub fn check_write_capability<E: RasterEngine + ?Sized>(engine: &E, driver_name: &str) -> Result<WriteStrategy> {
    match engine.driver_capability(driver_name) {
        DriverCapability::Create => Ok(WriteStrategy::Create),
        DriverCapability::CreateCopy => Ok(WriteStrategy::CreateCopy),
        DriverCapability::ReadOnly => Err(Error::UnsupportedCapability(format!(
            "The '{driver_name}' driver does not support writing"
        ))),
        DriverCapability::Unavailable => Err(Error::UnsupportedCapability(format!(
            "The '{driver_name}' driver is not available"
        ))),
    }
}
