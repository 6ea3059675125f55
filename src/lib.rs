//! Write in-memory banded raster images to disk using a native raster engine (GDAL).
//!
//! The [`RasterWriter`] moves the pixel data of any [`RasterSource`] into a dataset of the requested
//! format, either by creating the dataset directly or, for formats that only support it,
//! by copying a populated (temporary) dataset.

#![warn(clippy::unwrap_used)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub type Result<T = ()> = std::result::Result<T, Error>;

mod arraydatatype;
mod arraynum;
pub mod capability;
pub mod engine;
mod error;
pub mod formats;
pub mod fs;
#[cfg(feature = "gdal")]
#[cfg_attr(docsrs, doc(cfg(feature = "gdal")))]
pub mod gdalinterop;
pub mod geometry;
mod geotransform;
mod metadata;
pub mod output;
pub mod packing;
mod rastersize;
#[cfg(feature = "gdal")]
mod runtimeconfiguration;
pub mod source;
pub mod writer;

#[cfg(test)]
mod testutils;

#[doc(inline)]
pub use arraydatatype::{ArrayDataType, SampleType};
#[doc(inline)]
pub use arraynum::ArrayNum;
#[doc(inline)]
pub use engine::{DriverCapability, RasterEngine};
#[doc(inline)]
pub use error::Error;
#[doc(inline)]
pub use geometry::{PixelRegion, Subsampling, WriteGeometry};
#[doc(inline)]
pub use geotransform::GeoTransform;
#[doc(inline)]
pub use metadata::StreamMetadata;
#[doc(inline)]
pub use output::OutputTarget;
#[doc(inline)]
pub use rastersize::RasterSize;
#[cfg(feature = "gdal")]
pub use runtimeconfiguration::RuntimeConfiguration;
#[doc(inline)]
pub use source::{ImageBuffer, NativeImage, RasterSource, ReadParams};
#[doc(inline)]
pub use writer::{RasterWriter, WriteOptions};
