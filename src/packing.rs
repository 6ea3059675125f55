//! Packs the band samples of a raster source into flat native ordered buffers
//! and transfers them to a dataset of a raster engine.

use crate::{
    ArrayNum, Error, Result, SampleType, WriteGeometry,
    engine::{BandSelection, RasterEngine, RasterWindow},
    source::{RasterSource, RasterSourceExt},
};

/// The largest buffer (in bytes) that is transferred to the engine in a single call
pub const DEFAULT_SINGLE_TRANSFER_LIMIT: u64 = i32::MAX as u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackingMode {
    /// All bands are stored sequentially in one buffer and written in one call
    SingleBuffer,
    /// Every band has its own buffer and is written separately
    PerBand,
}

/// Selects the packing mode based on the total buffer size.
/// Falls back to one buffer per band when the combined size overflows or exceeds the transfer limit.
pub fn select_packing_mode(pixel_count: usize, sample_type: SampleType, band_count: usize, transfer_limit: u64) -> PackingMode {
    let capacity = (pixel_count as u64)
        .checked_mul(sample_type.bytes() as u64)
        .and_then(|band_size| band_size.checked_mul(band_count as u64));

    match capacity {
        Some(capacity) if capacity <= transfer_limit => PackingMode::SingleBuffer,
        _ => {
            log::debug!(
                "Buffer for {band_count} band(s) of {pixel_count} {sample_type} pixels exceeds the transfer limit of {transfer_limit} bytes, writing per band"
            );
            PackingMode::PerBand
        }
    }
}

/// The packed samples of all the bands of a write operation
#[derive(Debug)]
pub struct PackedBands<T: ArrayNum> {
    mode: PackingMode,
    geometry: WriteGeometry,
    band_count: usize,
    buffers: Vec<Vec<T>>,
}

impl<T: ArrayNum> PackedBands<T> {
    pub fn mode(&self) -> PackingMode {
        self.mode
    }

    pub fn band_count(&self) -> usize {
        self.band_count
    }

    /// Single buffer mode holds one buffer with all the bands, per band mode holds one buffer for every band
    pub fn buffers(&self) -> &[Vec<T>] {
        &self.buffers
    }

    /// Transfers the packed buffers to the dataset: one call in single buffer mode, one call per band otherwise
    pub fn write_to<E: RasterEngine>(&self, engine: &E, dataset: &mut E::Dataset) -> Result {
        let sample_type = SampleType::try_from(T::TYPE)?;
        let window = RasterWindow::with_size(self.geometry.destination);

        match self.mode {
            PackingMode::SingleBuffer => {
                let data = self.buffers.first().map(Vec::as_slice).unwrap_or_default();
                engine.write_block(
                    dataset,
                    BandSelection::All(self.band_count),
                    window,
                    sample_type,
                    bytemuck::cast_slice(data),
                )
            }
            PackingMode::PerBand => {
                for (band_index, data) in self.buffers.iter().enumerate() {
                    engine.write_block(
                        dataset,
                        BandSelection::Band(band_index + 1),
                        window,
                        sample_type,
                        bytemuck::cast_slice(data),
                    )?;
                }

                Ok(())
            }
        }
    }
}

fn allocate_buffer<T: ArrayNum>(capacity: usize) -> Result<Vec<T>> {
    let mut buffer = Vec::new();
    buffer.try_reserve_exact(capacity)?;
    Ok(buffer)
}

/// Appends the samples of a band within the geometry region to the buffer, applying the subsampling
fn append_band<T: ArrayNum, D, S: RasterSource<D> + ?Sized>(
    source: &S,
    band_index: usize,
    geometry: &WriteGeometry,
    buffer: &mut Vec<T>,
) -> Result {
    let region = &geometry.region;

    if geometry.subsampling.is_identity() {
        let start = buffer.len();
        buffer.resize(start + region.cell_count(), T::zeroed());
        return RasterSourceExt::<D>::read_band_region(source, band_index, region, &mut buffer[start..]);
    }

    let mut region_samples = allocate_buffer::<T>(region.cell_count())?;
    region_samples.resize(region.cell_count(), T::zeroed());
    RasterSourceExt::<D>::read_band_region(source, band_index, region, &mut region_samples)?;

    for line in region_samples.chunks_exact(region.width).step_by(geometry.subsampling.y as usize) {
        buffer.extend(line.iter().step_by(geometry.subsampling.x as usize).copied());
    }

    Ok(())
}

/// Extracts the band samples of the source for the provided geometry into buffers of type `T`
pub fn pack_bands<T: ArrayNum, D, S: RasterSource<D> + ?Sized>(
    source: &S,
    geometry: &WriteGeometry,
    transfer_limit: u64,
) -> Result<PackedBands<T>> {
    if source.data_type() != T::TYPE {
        return Err(Error::InvalidParameter(format!(
            "Packing {} samples into {} buffers",
            source.data_type(),
            T::TYPE
        )));
    }

    let sample_type = SampleType::try_from(T::TYPE)?;
    let band_count = source.band_count();
    let pixel_count = geometry.pixel_count();
    let mode = select_packing_mode(pixel_count, sample_type, band_count, transfer_limit);

    let buffers = match mode {
        PackingMode::SingleBuffer => {
            let mut buffer = allocate_buffer(pixel_count * band_count)?;
            for band_index in 0..band_count {
                append_band(source, band_index, geometry, &mut buffer)?;
            }

            vec![buffer]
        }
        PackingMode::PerBand => {
            let mut buffers = Vec::with_capacity(band_count);
            for band_index in 0..band_count {
                let mut buffer = allocate_buffer(pixel_count)?;
                append_band(source, band_index, geometry, &mut buffer)?;
                buffers.push(buffer);
            }

            buffers
        }
    };

    debug_assert!(buffers.iter().map(Vec::len).sum::<usize>() == pixel_count * band_count);

    Ok(PackedBands {
        mode,
        geometry: *geometry,
        band_count,
        buffers,
    })
}

fn pack_and_write_typed<T: ArrayNum, E: RasterEngine, S: RasterSource<E::Dataset> + ?Sized>(
    engine: &E,
    dataset: &mut E::Dataset,
    source: &S,
    geometry: &WriteGeometry,
    transfer_limit: u64,
) -> Result<PackingMode> {
    let packed = pack_bands::<T, E::Dataset, S>(source, geometry, transfer_limit)?;
    packed.write_to(engine, dataset)?;
    Ok(packed.mode())
}

/// Packs the source samples for the geometry and writes them to the dataset.
/// Returns the packing mode that was used for the transfer.
pub fn pack_and_write<E: RasterEngine, S: RasterSource<E::Dataset> + ?Sized>(
    engine: &E,
    dataset: &mut E::Dataset,
    source: &S,
    sample_type: SampleType,
    geometry: &WriteGeometry,
    transfer_limit: u64,
) -> Result<PackingMode> {
    match sample_type {
        SampleType::Uint8 => pack_and_write_typed::<u8, _, _>(engine, dataset, source, geometry, transfer_limit),
        SampleType::Uint16 => pack_and_write_typed::<u16, _, _>(engine, dataset, source, geometry, transfer_limit),
        SampleType::Int16 => pack_and_write_typed::<i16, _, _>(engine, dataset, source, geometry, transfer_limit),
        SampleType::Int32 => pack_and_write_typed::<i32, _, _>(engine, dataset, source, geometry, transfer_limit),
        SampleType::Float32 => pack_and_write_typed::<f32, _, _>(engine, dataset, source, geometry, transfer_limit),
        SampleType::Float64 => pack_and_write_typed::<f64, _, _>(engine, dataset, source, geometry, transfer_limit),
    }
}
