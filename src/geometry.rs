//! Resolves the source region and destination size of a write operation.

use crate::{Error, RasterSize, Result};

/// Rectangle in source pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PixelRegion {
    pub x_off: usize,
    pub y_off: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRegion {
    pub const fn new(x_off: usize, y_off: usize, width: usize, height: usize) -> Self {
        PixelRegion {
            x_off,
            y_off,
            width,
            height,
        }
    }

    /// Region covering a complete raster of the given size
    pub const fn full(size: RasterSize) -> Self {
        PixelRegion::new(0, 0, size.cols, size.rows)
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn size(&self) -> RasterSize {
        RasterSize::with_width_height(self.width, self.height)
    }

    pub fn is_full_extent_of(&self, size: RasterSize) -> bool {
        *self == PixelRegion::full(size)
    }

    /// Shrinks the extent so the region lies within a raster of the given size.
    /// The offset is never modified, a region that starts outside of the raster results in an empty region.
    pub fn clipped_to(&self, size: RasterSize) -> PixelRegion {
        PixelRegion {
            x_off: self.x_off,
            y_off: self.y_off,
            width: self.width.min(size.cols.saturating_sub(self.x_off)),
            height: self.height.min(size.rows.saturating_sub(self.y_off)),
        }
    }
}

/// Source subsampling factors: every n-th column and every m-th row is used
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Subsampling {
    pub x: u32,
    pub y: u32,
}

impl Default for Subsampling {
    fn default() -> Self {
        Subsampling { x: 1, y: 1 }
    }
}

impl Subsampling {
    pub const fn new(x: u32, y: u32) -> Self {
        Subsampling { x, y }
    }

    pub fn is_identity(&self) -> bool {
        self.x == 1 && self.y == 1
    }

    pub fn validate(&self) -> Result {
        if self.x == 0 || self.y == 0 {
            return Err(Error::InvalidParameter(format!(
                "Subsampling factors must be positive (x: {}, y: {})",
                self.x, self.y
            )));
        }

        Ok(())
    }

    /// Number of samples remaining from an extent of `len` pixels when taking every `factor`-th pixel
    fn subsampled_len(len: usize, factor: u32) -> usize {
        (len - 1) / factor as usize + 1
    }
}

/// The resolved geometry of a write: the clipped source region and the resulting destination size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteGeometry {
    pub region: PixelRegion,
    pub subsampling: Subsampling,
    pub destination: RasterSize,
}

impl WriteGeometry {
    /// Geometry that copies the complete raster without subsampling
    pub fn full(size: RasterSize) -> Self {
        WriteGeometry {
            region: PixelRegion::full(size),
            subsampling: Subsampling::default(),
            destination: size,
        }
    }

    pub fn pixel_count(&self) -> usize {
        self.destination.cell_count()
    }

    pub fn is_full_copy_of(&self, size: RasterSize) -> bool {
        self.subsampling.is_identity() && self.region.is_full_extent_of(size)
    }
}

/// Computes the effective source region and the destination dimensions.
/// When no region is provided the full source extent is used.
/// Regions that extend beyond the source are clipped instead of rejected.
pub fn resolve_write_geometry(source_size: RasterSize, region: Option<PixelRegion>, subsampling: Subsampling) -> Result<WriteGeometry> {
    subsampling.validate()?;

    if source_size.is_empty() {
        return Err(Error::InvalidParameter(format!("Source image has no pixels {source_size}")));
    }

    let region = match region {
        Some(requested) => {
            let clipped = requested.clipped_to(source_size);
            if clipped != requested {
                log::debug!("Clipped source region {requested:?} to {clipped:?} for source size {source_size}");
            }
            clipped
        }
        None => PixelRegion::full(source_size),
    };

    if region.width == 0 || region.height == 0 {
        return Err(Error::InvalidParameter(format!(
            "Source region {region:?} does not overlap the source image {source_size}"
        )));
    }

    let destination = RasterSize::with_width_height(
        Subsampling::subsampled_len(region.width, subsampling.x),
        Subsampling::subsampled_len(region.height, subsampling.y),
    );

    Ok(WriteGeometry {
        region,
        subsampling,
        destination,
    })
}
