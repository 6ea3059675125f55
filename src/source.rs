//! The raster image collaborator: anything that can hand out the samples of its bands.

use crate::{
    ArrayDataType, ArrayNum, Error, GeoTransform, PixelRegion, RasterSize, Result, Subsampling, WriteGeometry,
    geometry::resolve_write_geometry,
};

/// Read-only access to a banded raster image.
///
/// `D` is the dataset type of the native engine the image may originate from.
/// Images that were not read through a native engine use the default implementations
/// of [`RasterSource::originating_dataset`] and [`RasterSource::read_params`].
pub trait RasterSource<D> {
    fn raster_size(&self) -> RasterSize;
    fn band_count(&self) -> usize;
    fn data_type(&self) -> ArrayDataType;

    /// Copies the samples of the band (0-based) within the region into the provided buffer.
    /// The buffer must hold exactly `region.cell_count() * data_type().bytes()` bytes,
    /// the samples are stored row by row in native byte order.
    fn read_band_region_into_byte_buffer(&self, band_index: usize, region: &PixelRegion, dst: &mut [u8]) -> Result;

    /// The native dataset this image was read from, if any
    fn originating_dataset(&self) -> Option<&D> {
        None
    }

    /// The parameters of the read operation that produced this image, if any
    fn read_params(&self) -> Option<&ReadParams> {
        None
    }
}

pub trait RasterSourceExt<D>: RasterSource<D> {
    /// Typed variant of [`RasterSource::read_band_region_into_byte_buffer`]
    fn read_band_region<T: ArrayNum>(&self, band_index: usize, region: &PixelRegion, dst: &mut [T]) -> Result {
        if T::TYPE != self.data_type() {
            return Err(Error::InvalidParameter(format!(
                "Reading {} samples into a buffer of type {}",
                self.data_type(),
                T::TYPE
            )));
        }

        self.read_band_region_into_byte_buffer(band_index, region, bytemuck::cast_slice_mut(dst))
    }
}

impl<D, S: RasterSource<D> + ?Sized> RasterSourceExt<D> for S {}

/// Parameters of the read operation that produced an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReadParams {
    pub source_region: Option<PixelRegion>,
    pub subsampling: Subsampling,
    pub subsampling_x_offset: usize,
    pub subsampling_y_offset: usize,
}

impl ReadParams {
    /// True when the read modified the size or position of the image compared to the dataset
    pub fn is_parametrized(&self) -> bool {
        !self.subsampling.is_identity()
            || self.subsampling_x_offset != 0
            || self.subsampling_y_offset != 0
            || self.source_region.is_some()
    }

    /// The part of a dataset of the given size that is covered by the read
    pub fn geometry(&self, dataset_size: RasterSize) -> Result<WriteGeometry> {
        let region = self.source_region.unwrap_or(PixelRegion::full(dataset_size));
        let region = PixelRegion::new(
            region.x_off + self.subsampling_x_offset,
            region.y_off + self.subsampling_y_offset,
            region.width.saturating_sub(self.subsampling_x_offset),
            region.height.saturating_sub(self.subsampling_y_offset),
        );

        resolve_write_geometry(dataset_size, Some(region), self.subsampling)
    }

    /// The transformation of the image produced by the read, given the transformation of the dataset
    pub fn image_geo_transform(&self, dataset_transform: &GeoTransform) -> GeoTransform {
        let (x_off, y_off) = self.source_region.map_or((0, 0), |region| (region.x_off, region.y_off));
        let origin = PixelRegion::new(x_off + self.subsampling_x_offset, y_off + self.subsampling_y_offset, 0, 0);
        dataset_transform.for_window(&origin, self.subsampling)
    }
}

/// In-memory raster image with band sequential sample storage.
#[derive(Clone, PartialEq)]
pub struct ImageBuffer {
    size: RasterSize,
    band_count: usize,
    data_type: ArrayDataType,
    data: Vec<u8>,
}

impl ImageBuffer {
    /// Creates an image from band sequential samples
    pub fn new<T: ArrayNum>(size: RasterSize, band_count: usize, samples: &[T]) -> Result<Self> {
        Self::from_bytes(size, band_count, T::TYPE, bytemuck::cast_slice(samples).to_vec())
    }

    /// Creates an image with one sample vector per band
    pub fn from_bands<T: ArrayNum>(size: RasterSize, bands: &[Vec<T>]) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(size.cell_count() * bands.len() * T::TYPE.bytes())?;
        for band in bands {
            if band.len() != size.cell_count() {
                return Err(Error::InvalidParameter(format!(
                    "Band has {} samples, expected {} for size {size}",
                    band.len(),
                    size.cell_count()
                )));
            }
            data.extend_from_slice(bytemuck::cast_slice(band));
        }

        Self::from_bytes(size, bands.len(), T::TYPE, data)
    }

    /// Creates an image where every sample is obtained from the provided function called with (band, row, col)
    pub fn from_fn<T: ArrayNum>(size: RasterSize, band_count: usize, mut sample: impl FnMut(usize, usize, usize) -> T) -> Result<Self> {
        let mut samples = Vec::new();
        samples.try_reserve_exact(size.cell_count() * band_count)?;
        for band in 0..band_count {
            for row in 0..size.rows {
                for col in 0..size.cols {
                    samples.push(sample(band, row, col));
                }
            }
        }

        Self::new(size, band_count, &samples)
    }

    /// Creates an image from raw band sequential sample bytes in native byte order
    pub fn from_bytes(size: RasterSize, band_count: usize, data_type: ArrayDataType, data: Vec<u8>) -> Result<Self> {
        let expected = size.cell_count() * band_count * data_type.bytes();
        if data.len() != expected {
            return Err(Error::InvalidParameter(format!(
                "Image data has {} bytes, expected {expected} bytes for {band_count} {data_type} band(s) of size {size}",
                data.len()
            )));
        }

        Ok(ImageBuffer {
            size,
            band_count,
            data_type,
            data,
        })
    }

    /// Reads the part of the source described by the geometry into a new image
    pub fn from_source_window<D, S: RasterSource<D> + ?Sized>(source: &S, geometry: &WriteGeometry) -> Result<Self> {
        let band_count = source.band_count();
        let data_type = source.data_type();
        let sample_size = data_type.bytes();

        let mut data = Vec::new();
        data.try_reserve_exact(geometry.pixel_count() * band_count * sample_size)?;
        let mut region_data = vec![0u8; geometry.region.cell_count() * sample_size];

        for band in 0..band_count {
            source.read_band_region_into_byte_buffer(band, &geometry.region, &mut region_data)?;
            let row_bytes = geometry.region.width * sample_size;
            for line in region_data.chunks_exact(row_bytes).step_by(geometry.subsampling.y as usize) {
                for sample in line.chunks_exact(sample_size).step_by(geometry.subsampling.x as usize) {
                    data.extend_from_slice(sample);
                }
            }
        }

        Self::from_bytes(geometry.destination, band_count, data_type, data)
    }

    pub fn raster_size(&self) -> RasterSize {
        self.size
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    pub fn data_type(&self) -> ArrayDataType {
        self.data_type
    }

    /// The samples of a band (0-based)
    pub fn band_samples<T: ArrayNum>(&self, band_index: usize) -> Result<Vec<T>> {
        if T::TYPE != self.data_type {
            return Err(Error::InvalidParameter(format!(
                "Requested {} samples from a {} image",
                T::TYPE,
                self.data_type
            )));
        }

        Ok(bytemuck::pod_collect_to_vec(self.band_bytes(band_index)?))
    }

    /// The sample at the provided location, `None` when out of bounds or when the type does not match
    pub fn sample<T: ArrayNum>(&self, band_index: usize, row: usize, col: usize) -> Option<T> {
        if T::TYPE != self.data_type || row >= self.size.rows || col >= self.size.cols {
            return None;
        }

        let sample_size = self.data_type.bytes();
        let offset = (row * self.size.cols + col) * sample_size;
        let band = self.band_bytes(band_index).ok()?;
        Some(bytemuck::pod_read_unaligned(&band[offset..offset + sample_size]))
    }

    pub fn read_band_region_into_byte_buffer(&self, band_index: usize, region: &PixelRegion, dst: &mut [u8]) -> Result {
        if region.clipped_to(self.size) != *region {
            return Err(Error::InvalidParameter(format!(
                "Region {region:?} is not contained in the image {}",
                self.size
            )));
        }

        let sample_size = self.data_type.bytes();
        if dst.len() != region.cell_count() * sample_size {
            return Err(Error::InvalidParameter(format!(
                "Invalid data buffer provided: incorrect size (got {} bytes but should be {} bytes)",
                dst.len(),
                region.cell_count() * sample_size
            )));
        }

        if region.cell_count() == 0 {
            return Ok(());
        }

        let band = self.band_bytes(band_index)?;
        let row_bytes = region.width * sample_size;
        for (row, dst_row) in dst.chunks_exact_mut(row_bytes).enumerate() {
            let start = ((region.y_off + row) * self.size.cols + region.x_off) * sample_size;
            dst_row.copy_from_slice(&band[start..start + row_bytes]);
        }

        Ok(())
    }

    fn band_bytes(&self, band_index: usize) -> Result<&[u8]> {
        if band_index >= self.band_count {
            return Err(Error::InvalidParameter(format!(
                "Band index {band_index} out of range, image has {} band(s)",
                self.band_count
            )));
        }

        let band_size = self.size.cell_count() * self.data_type.bytes();
        Ok(&self.data[band_index * band_size..(band_index + 1) * band_size])
    }
}

impl std::fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("size", &self.size)
            .field("band_count", &self.band_count)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl<D> RasterSource<D> for ImageBuffer {
    fn raster_size(&self) -> RasterSize {
        ImageBuffer::raster_size(self)
    }

    fn band_count(&self) -> usize {
        ImageBuffer::band_count(self)
    }

    fn data_type(&self) -> ArrayDataType {
        ImageBuffer::data_type(self)
    }

    fn read_band_region_into_byte_buffer(&self, band_index: usize, region: &PixelRegion, dst: &mut [u8]) -> Result {
        ImageBuffer::read_band_region_into_byte_buffer(self, band_index, region, dst)
    }
}

/// An image that was read through a native engine.
/// Keeps the originating dataset so writers on the same engine can copy it directly.
pub struct NativeImage<D> {
    image: ImageBuffer,
    dataset: D,
    read_params: Option<ReadParams>,
}

impl<D> NativeImage<D> {
    pub fn new(image: ImageBuffer, dataset: D, read_params: Option<ReadParams>) -> Self {
        NativeImage {
            image,
            dataset,
            read_params,
        }
    }

    pub fn image(&self) -> &ImageBuffer {
        &self.image
    }

    pub fn dataset(&self) -> &D {
        &self.dataset
    }

    /// Releases the image data and hands back the dataset, e.g. to close it
    pub fn into_dataset(self) -> D {
        self.dataset
    }
}

impl<D> RasterSource<D> for NativeImage<D> {
    fn raster_size(&self) -> RasterSize {
        self.image.raster_size()
    }

    fn band_count(&self) -> usize {
        self.image.band_count()
    }

    fn data_type(&self) -> ArrayDataType {
        self.image.data_type()
    }

    fn read_band_region_into_byte_buffer(&self, band_index: usize, region: &PixelRegion, dst: &mut [u8]) -> Result {
        self.image.read_band_region_into_byte_buffer(band_index, region, dst)
    }

    fn originating_dataset(&self) -> Option<&D> {
        Some(&self.dataset)
    }

    fn read_params(&self) -> Option<&ReadParams> {
        self.read_params.as_ref()
    }
}
