use std::path::Path;

use crate::{GeoTransform, RasterSize, Result, SampleType};

#[cfg(feature = "gdal")]
pub mod gdal;
pub mod memory;

/// The level of write support a native driver offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverCapability {
    /// Datasets can be allocated directly and filled afterwards
    Create,
    /// New datasets can only be created as a copy of a populated dataset
    CreateCopy,
    /// The driver can only read datasets
    ReadOnly,
    /// The driver is not known to the engine as a raster driver, or the engine could not be initialized
    Unavailable,
}

/// The bands of a dataset targeted by a raster block write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandSelection {
    /// All bands of the dataset, the buffer contains the band data sequentially
    All(usize),
    /// A single band (1-based index)
    Band(usize),
}

impl BandSelection {
    pub fn band_count(&self) -> usize {
        match self {
            BandSelection::All(count) => *count,
            BandSelection::Band(_) => 1,
        }
    }
}

/// Pixel window of a dataset targeted by a raster block write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterWindow {
    pub x_off: usize,
    pub y_off: usize,
    pub size: RasterSize,
}

impl RasterWindow {
    pub fn with_size(size: RasterSize) -> Self {
        RasterWindow { x_off: 0, y_off: 0, size }
    }
}

/// Parameters for the direct creation of a dataset
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    pub driver_name: &'a str,
    pub path: &'a Path,
    pub size: RasterSize,
    pub band_count: usize,
    pub sample_type: SampleType,
    pub options: &'a [String],
}

/// The operation surface of a native raster engine used for writing rasters.
///
/// Datasets returned from the create functions are owned by the caller and must be passed to
/// [`RasterEngine::close`] when they are no longer needed.
pub trait RasterEngine {
    type Dataset;

    /// The write support of the driver with the provided name.
    /// Engine initialization failures are reported as [`DriverCapability::Unavailable`].
    fn driver_capability(&self, driver_name: &str) -> DriverCapability;

    /// Allocate a dataset in the destination format
    fn create(&self, request: &CreateRequest<'_>) -> Result<Self::Dataset>;

    /// Allocate an intermediate in-memory dataset that serves as the source of a create-copy.
    /// The path is the location of the temporary file backing the dataset.
    fn create_temporary(&self, path: &Path, size: RasterSize, band_count: usize, sample_type: SampleType) -> Result<Self::Dataset>;

    /// Create a dataset in the destination format as a copy of a populated dataset
    fn create_copy(&self, driver_name: &str, path: &Path, source: &Self::Dataset, options: &[String]) -> Result<Self::Dataset>;

    /// Transfer a packed buffer to the pixel storage of the dataset.
    /// The buffer holds the samples of the selected bands sequentially, in native byte order.
    fn write_block(
        &self,
        dataset: &mut Self::Dataset,
        bands: BandSelection,
        window: RasterWindow,
        sample_type: SampleType,
        data: &[u8],
    ) -> Result;

    fn flush(&self, dataset: &mut Self::Dataset) -> Result;

    fn close(&self, dataset: Self::Dataset) -> Result;

    fn geo_transform(&self, dataset: &Self::Dataset) -> Result<Option<GeoTransform>>;

    fn set_geo_transform(&self, dataset: &mut Self::Dataset, geo_transform: &GeoTransform) -> Result;

    fn projection(&self, dataset: &Self::Dataset) -> Result<String>;

    fn set_projection(&self, dataset: &mut Self::Dataset, projection: &str) -> Result;

    /// Remove the (partial) output of a failed write
    fn remove_output(&self, _driver_name: &str, path: &Path) -> Result {
        if path.exists() {
            std::fs::remove_file(path)?;
        }

        Ok(())
    }
}
