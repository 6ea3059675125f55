//! Writes raster images to a dataset of a native raster engine.
//!
//! Formats that support direct creation get their dataset allocated in the destination format and
//! the pixels are written into it. Formats that only support copies are populated via an intermediate
//! dataset, or by copying the dataset the image was read from when the image is an unmodified read.

use std::path::{Path, PathBuf};

use crate::{
    Error, GeoTransform, PixelRegion, RasterEngine, Result, SampleType, StreamMetadata, Subsampling, WriteGeometry,
    capability::{WriteStrategy, check_write_capability},
    engine::CreateRequest,
    formats::RasterFileFormat,
    fs,
    geometry::resolve_write_geometry,
    output::{OutputTarget, resolve_output_target},
    packing::{self, DEFAULT_SINGLE_TRANSFER_LIMIT},
    source::{RasterSource, ReadParams},
};

/// Parameters of a single write operation
#[derive(Debug, Clone, PartialEq, Eq, bon::Builder)]
pub struct WriteOptions {
    /// The part of the source image that is written, the full image when not provided
    pub source_region: Option<PixelRegion>,
    #[builder(default = 1)]
    pub x_subsampling: u32,
    #[builder(default = 1)]
    pub y_subsampling: u32,
    /// Driver specific creation options (KEY=VALUE)
    #[builder(default)]
    pub creation_options: Vec<String>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            source_region: None,
            x_subsampling: 1,
            y_subsampling: 1,
            creation_options: Vec::new(),
        }
    }
}

impl WriteOptions {
    pub fn subsampling(&self) -> Subsampling {
        Subsampling::new(self.x_subsampling, self.y_subsampling)
    }
}

/// Closes the dataset when going out of scope.
/// Use `finish` to obtain the outcome of the flush and close operations.
struct ScopedDataset<'e, E: RasterEngine> {
    engine: &'e E,
    dataset: Option<E::Dataset>,
    role: &'static str,
}

impl<'e, E: RasterEngine> ScopedDataset<'e, E> {
    fn new(engine: &'e E, dataset: E::Dataset, role: &'static str) -> Self {
        ScopedDataset {
            engine,
            dataset: Some(dataset),
            role,
        }
    }

    fn get(&self) -> &E::Dataset {
        match &self.dataset {
            Some(dataset) => dataset,
            None => unreachable!("{} dataset accessed after close", self.role),
        }
    }

    fn get_mut(&mut self) -> &mut E::Dataset {
        match &mut self.dataset {
            Some(dataset) => dataset,
            None => unreachable!("{} dataset accessed after close", self.role),
        }
    }

    /// Flushes and closes the dataset, the dataset is closed even when the flush fails
    fn finish(mut self) -> Result {
        match self.dataset.take() {
            Some(mut dataset) => {
                let flushed = self.engine.flush(&mut dataset);
                let closed = self.engine.close(dataset);
                flushed.and(closed)
            }
            None => Ok(()),
        }
    }
}

impl<E: RasterEngine> Drop for ScopedDataset<'_, E> {
    fn drop(&mut self) {
        if let Some(mut dataset) = self.dataset.take() {
            if let Err(e) = self.engine.flush(&mut dataset) {
                log::warn!("Failed to flush {} dataset: {e}", self.role);
            }

            if let Err(e) = self.engine.close(dataset) {
                log::warn!("Failed to close {} dataset: {e}", self.role);
            }
        }
    }
}

/// Writes raster images to a single output using the driver with the configured name.
///
/// The output target is resolved on construction, all writes go to the same file.
pub struct RasterWriter<E: RasterEngine> {
    engine: E,
    driver_name: String,
    output: PathBuf,
    transfer_limit: u64,
    temp_dir: Option<PathBuf>,
}

impl<E: RasterEngine> RasterWriter<E> {
    pub fn new(engine: E, driver_name: impl Into<String>, output: impl Into<OutputTarget>) -> Result<Self> {
        let output = resolve_output_target(&output.into())?;
        let driver_name = driver_name.into();
        log::debug!("Writer for '{}' using driver {driver_name}", output.display());

        Ok(RasterWriter {
            engine,
            driver_name,
            output,
            transfer_limit: DEFAULT_SINGLE_TRANSFER_LIMIT,
            temp_dir: None,
        })
    }

    /// Writer for the provided path, the driver is selected based on the file extension
    pub fn for_path(engine: E, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        match RasterFileFormat::guess_from_path(path) {
            RasterFileFormat::Unknown => Err(Error::InvalidOutputTarget(format!(
                "Could not determine the raster format of '{}'",
                path.display()
            ))),
            format => Self::new(engine, format.gdal_driver_name(), path),
        }
    }

    /// The largest buffer in bytes that is transferred to the engine in a single call,
    /// larger images are transferred one band at a time
    pub fn with_transfer_limit(mut self, bytes: u64) -> Self {
        self.transfer_limit = bytes;
        self
    }

    /// Location of the temporary files backing intermediate datasets, the system temp directory by default
    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn driver_name(&self) -> &str {
        &self.driver_name
    }

    pub fn output_path(&self) -> &Path {
        &self.output
    }

    /// Writes the complete image using the default options
    pub fn write_image<S: RasterSource<E::Dataset> + ?Sized>(&self, image: &S) -> Result {
        self.write(None, image, &WriteOptions::default())
    }

    pub fn write<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        stream_metadata: Option<&StreamMetadata>,
        image: &S,
        options: &WriteOptions,
    ) -> Result {
        let strategy = check_write_capability(&self.engine, &self.driver_name)?;

        if let Some(metadata) = stream_metadata {
            log::debug!("Stream metadata with {} dataset name(s) is not written", metadata.dataset_count());
        }

        let size = image.raster_size();
        let band_count = image.band_count();
        if size.is_empty() || band_count == 0 {
            return Err(Error::InvalidParameter(format!(
                "Image without pixel data: size {size} with {band_count} band(s)"
            )));
        }

        let sample_type = SampleType::try_from(image.data_type())?;
        let geometry = resolve_write_geometry(size, options.source_region, options.subsampling())?;
        fs::create_directory_for_file(&self.output)?;

        match strategy {
            WriteStrategy::Create => self.write_created(image, sample_type, &geometry, options),
            WriteStrategy::CreateCopy => self.write_copied(image, sample_type, &geometry, options),
        }
    }

    fn write_created<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        image: &S,
        sample_type: SampleType,
        geometry: &WriteGeometry,
        options: &WriteOptions,
    ) -> Result {
        let dataset = self.engine.create(&CreateRequest {
            driver_name: &self.driver_name,
            path: &self.output,
            size: geometry.destination,
            band_count: image.band_count(),
            sample_type,
            options: &options.creation_options,
        })?;

        let output = ScopedDataset::new(&self.engine, dataset, "output");
        let result = self.populate_created(output, image, sample_type, geometry);
        self.discard_output_on_error(result)
    }

    /// Writes the pixels and georeferencing, the output dataset is closed when this returns
    fn populate_created<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        mut output: ScopedDataset<'_, E>,
        image: &S,
        sample_type: SampleType,
        geometry: &WriteGeometry,
    ) -> Result {
        let mode = packing::pack_and_write(
            &self.engine,
            output.get_mut(),
            image,
            sample_type,
            geometry,
            self.transfer_limit,
        )?;
        log::debug!(
            "Wrote {} band(s) of {} to '{}' ({mode:?})",
            image.band_count(),
            geometry.destination,
            self.output.display()
        );

        if let Some(origin) = image.originating_dataset() {
            self.copy_georeference(origin, output.get_mut(), image.read_params(), Some(geometry))?;
        }

        output.finish()
    }

    fn write_copied<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        image: &S,
        sample_type: SampleType,
        geometry: &WriteGeometry,
        options: &WriteOptions,
    ) -> Result {
        if !geometry.is_full_copy_of(image.raster_size()) {
            log::warn!(
                "The {} driver only supports dataset copies, the requested source region and subsampling are not applied",
                self.driver_name
            );
        }

        let unmodified_read = !image.read_params().is_some_and(ReadParams::is_parametrized);
        match image.originating_dataset() {
            Some(origin) if unmodified_read => {
                log::debug!("Copying the originating dataset to '{}'", self.output.display());
                self.copy_to_output(origin, options)
            }
            _ => self.write_via_temporary(image, sample_type, options),
        }
    }

    fn write_via_temporary<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        image: &S,
        sample_type: SampleType,
        options: &WriteOptions,
    ) -> Result {
        let mut builder = tempfile::Builder::new();
        builder.prefix("datasetTemp").suffix(".ds");
        let temp_file = match &self.temp_dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };

        let result = self.populate_temporary_and_copy(temp_file.path(), image, sample_type, options);

        let temp_path = temp_file.path().to_path_buf();
        if let Err(e) = temp_file.close() {
            log::warn!("Failed to remove temporary file '{}' ({e})", temp_path.display());
        }

        result
    }

    fn populate_temporary_and_copy<S: RasterSource<E::Dataset> + ?Sized>(
        &self,
        temp_path: &Path,
        image: &S,
        sample_type: SampleType,
        options: &WriteOptions,
    ) -> Result {
        let size = image.raster_size();
        let dataset = self.engine.create_temporary(temp_path, size, image.band_count(), sample_type)?;
        let mut temporary = ScopedDataset::new(&self.engine, dataset, "temporary");

        packing::pack_and_write(
            &self.engine,
            temporary.get_mut(),
            image,
            sample_type,
            &WriteGeometry::full(size),
            self.transfer_limit,
        )?;

        if let Some(origin) = image.originating_dataset() {
            self.copy_georeference(origin, temporary.get_mut(), image.read_params(), None)?;
        }

        self.engine.flush(temporary.get_mut())?;
        self.copy_to_output(temporary.get(), options)?;
        temporary.finish()
    }

    fn copy_to_output(&self, source: &E::Dataset, options: &WriteOptions) -> Result {
        let dataset = self
            .engine
            .create_copy(&self.driver_name, &self.output, source, &options.creation_options)?;
        let output = ScopedDataset::new(&self.engine, dataset, "output");
        self.discard_output_on_error(output.finish())
    }

    /// Applies the georeferencing of the originating dataset, adjusted for the read parameters
    /// and the region and subsampling of the write
    fn copy_georeference(
        &self,
        origin: &E::Dataset,
        target: &mut E::Dataset,
        read_params: Option<&ReadParams>,
        write_geometry: Option<&WriteGeometry>,
    ) -> Result {
        if let Some(dataset_transform) = self.engine.geo_transform(origin)? {
            let mut geo_transform: GeoTransform = match read_params {
                Some(params) => params.image_geo_transform(&dataset_transform),
                None => dataset_transform,
            };

            if let Some(geometry) = write_geometry {
                geo_transform = geo_transform.for_window(&geometry.region, geometry.subsampling);
            }

            self.engine.set_geo_transform(target, &geo_transform)?;
        }

        let projection = self.engine.projection(origin)?;
        if !projection.is_empty() {
            self.engine.set_projection(target, &projection)?;
        }

        Ok(())
    }

    /// Removes the partially written output when the result is an error, the original error is returned.
    /// Only used once the output dataset was created, and after its handle was released.
    fn discard_output_on_error<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            if let Err(e) = self.engine.remove_output(&self.driver_name, &self.output) {
                log::warn!("Failed to remove incomplete output '{}' ({e})", self.output.display());
            }
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use std::path::{Path, PathBuf};

    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        ArrayDataType, ImageBuffer, RasterSize,
        engine::{
            BandSelection,
            memory::{MemoryCall, MemoryEngine, MemoryOperation},
        },
        testutils,
    };

    fn output_path(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().join("out").join(name)
    }

    fn temporary_paths(engine: &MemoryEngine) -> Vec<PathBuf> {
        engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MemoryCall::CreateTemporary { path } => Some(path),
                _ => None,
            })
            .collect()
    }

    #[test_log::test]
    fn create_path_writes_all_bands() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<u16>(RasterSize::with_width_height(10, 6), 3)?;
        let path = output_path(&tmp, "image.tif");

        let writer = RasterWriter::new(engine.clone(), "GTiff", path.as_path())?;
        writer.write_image(&image)?;

        assert_eq!(engine.open_handle_count(), 0);
        let stored = engine.stored_raster(&path).expect("output was written");
        assert_eq!(stored.driver, "GTiff");
        assert_eq!(stored.to_image()?, image);
        assert!(path.parent().is_some_and(Path::is_dir));

        let calls = engine.calls();
        assert_eq!(calls.len(), 4);
        assert!(matches!(&calls[0], MemoryCall::Create { driver, .. } if driver == "GTiff"));
        assert!(matches!(&calls[1], MemoryCall::WriteBlock { bands: BandSelection::All(3), len, .. } if *len == 10 * 6 * 3 * 2));
        assert!(matches!(&calls[2], MemoryCall::Flush { .. }));
        assert!(matches!(&calls[3], MemoryCall::Close { .. }));
        Ok(())
    }

    #[test_log::test]
    fn create_path_with_region_and_subsampling() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = ImageBuffer::from_fn(RasterSize::with_width_height(90, 200), 1, |_, row, col| (row * 1000 + col) as i32)?;
        let path = output_path(&tmp, "region.tif");

        let options = WriteOptions::builder()
            .source_region(PixelRegion::new(10, 10, 100, 50))
            .x_subsampling(2)
            .creation_options(vec!["TILED=YES".to_string()])
            .build();
        RasterWriter::new(engine.clone(), "GTiff", path.as_path())?.write(None, &image, &options)?;

        let stored = engine.stored_raster(&path).expect("output was written");
        assert_eq!(stored.size, RasterSize::with_width_height(40, 50));
        assert_eq!(stored.options, ["TILED=YES"]);

        let samples = stored.band_samples::<i32>(0)?;
        assert_eq!(samples[0], 10 * 1000 + 10);
        assert_eq!(samples[1], 10 * 1000 + 12);
        assert_eq!(samples[40], 11 * 1000 + 10);
        assert_eq!(engine.open_handle_count(), 0);
        Ok(())
    }

    #[test_log::test]
    fn split_mode_writes_every_band_separately() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<f64>(RasterSize::with_width_height(8, 8), 4)?;
        let path = output_path(&tmp, "split.tif");

        RasterWriter::new(engine.clone(), "GTiff", path.as_path())?
            .with_transfer_limit(8 * 8 * 8)
            .write_image(&image)?;

        let band_writes: Vec<BandSelection> = engine
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                MemoryCall::WriteBlock { bands, .. } => Some(bands),
                _ => None,
            })
            .collect();
        assert_eq!(
            band_writes,
            [BandSelection::Band(1), BandSelection::Band(2), BandSelection::Band(3), BandSelection::Band(4)]
        );
        assert_eq!(engine.stored_raster(&path).expect("output").to_image()?, image);
        Ok(())
    }

    #[test_log::test]
    fn read_only_driver_is_rejected_before_any_work() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(4, 4), 1)?;
        let path = output_path(&tmp, "image.hdf");

        for driver in ["HDF4Image", "NotADriver"] {
            let writer = RasterWriter::new(engine.clone(), driver, path.as_path())?;
            assert!(matches!(writer.write_image(&image), Err(Error::UnsupportedCapability(_))));
        }

        assert!(engine.calls().is_empty());
        assert!(!engine.contains_file(&path));
        assert!(!tmp.path().join("out").exists());
        Ok(())
    }

    #[test_log::test]
    fn unsupported_sample_type_is_rejected_before_create() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let writer = RasterWriter::new(engine.clone(), "GTiff", output_path(&tmp, "image.tif"))?;

        for data_type in [ArrayDataType::Int8, ArrayDataType::Uint32, ArrayDataType::Int64, ArrayDataType::Uint64] {
            let image = ImageBuffer::from_bytes(RasterSize::with_width_height(2, 2), 1, data_type, vec![0; 4 * data_type.bytes()])?;
            assert!(matches!(writer.write_image(&image), Err(Error::UnsupportedSampleType(t)) if t == data_type));
        }

        assert!(engine.calls().is_empty());
        Ok(())
    }

    #[test]
    fn empty_image_is_rejected() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let writer = RasterWriter::new(engine.clone(), "GTiff", output_path(&tmp, "image.tif"))?;

        let no_pixels = ImageBuffer::new::<u8>(RasterSize::with_width_height(0, 5), 1, &[])?;
        assert!(matches!(writer.write_image(&no_pixels), Err(Error::InvalidParameter(_))));

        let no_bands = ImageBuffer::new::<u8>(RasterSize::with_width_height(5, 5), 0, &[])?;
        assert!(matches!(writer.write_image(&no_bands), Err(Error::InvalidParameter(_))));

        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(5, 5), 1)?;
        let options = WriteOptions::builder().x_subsampling(0).build();
        assert!(matches!(writer.write(None, &image, &options), Err(Error::InvalidParameter(_))));

        assert!(engine.calls().is_empty());
        Ok(())
    }

    #[test_log::test]
    fn create_copy_via_temporary_dataset() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<f32>(RasterSize::with_width_height(7, 3), 2)?;
        let path = output_path(&tmp, "grid.asc");

        let writer = RasterWriter::for_path(engine.clone(), &path)?;
        assert_eq!(writer.driver_name(), "AAIGrid");
        writer.write(Some(&StreamMetadata::with_dataset_names(["grid"])), &image, &WriteOptions::default())?;

        assert_eq!(engine.open_handle_count(), 0);
        let stored = engine.stored_raster(&path).expect("output was written");
        assert_eq!(stored.driver, "AAIGrid");
        assert_eq!(stored.to_image()?, image);

        let temporaries = temporary_paths(&engine);
        assert_eq!(temporaries.len(), 1);
        let temp_path = &temporaries[0];
        assert!(!temp_path.exists());
        let file_name = temp_path.file_name().expect("file name").to_string_lossy().to_string();
        assert!(file_name.starts_with("datasetTemp"));
        assert!(file_name.ends_with(".ds"));

        let calls = engine.calls();
        let copy = calls
            .iter()
            .position(|call| matches!(call, MemoryCall::CreateCopy { source, .. } if source == temp_path))
            .expect("copy of the temporary dataset");
        let temp_close = calls
            .iter()
            .position(|call| matches!(call, MemoryCall::Close { path } if path == temp_path))
            .expect("temporary dataset closed");
        assert!(copy < temp_close);
        assert!(!calls.iter().any(|call| matches!(call, MemoryCall::Create { .. })));
        Ok(())
    }

    #[test_log::test]
    fn temporary_dataset_in_configured_directory() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let temp_dir = tmp.path().join("scratch");
        std::fs::create_dir(&temp_dir)?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(3, 3), 1)?;

        RasterWriter::new(engine.clone(), "AAIGrid", output_path(&tmp, "grid.asc"))?
            .with_temp_dir(&temp_dir)
            .write_image(&image)?;

        let temporaries = temporary_paths(&engine);
        assert_eq!(temporaries.len(), 1);
        assert!(temporaries[0].starts_with(&temp_dir));
        assert_eq!(std::fs::read_dir(&temp_dir)?.count(), 0);
        Ok(())
    }

    #[test_log::test]
    fn create_copy_reuses_unmodified_originating_dataset() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let input = Path::new("/input.tif");
        let geo_transform = GeoTransform::new([22000.0, 100.0, 0.0, 245000.0, 0.0, -100.0]);
        let image = testutils::create_test_image::<i16>(RasterSize::with_width_height(6, 4), 1)?;
        engine.store_image(input, "GTiff", &image, Some(geo_transform), "EPSG:31370")?;

        for read_params in [None, Some(ReadParams::default())] {
            engine.clear_calls();
            let native = engine.open_image(input, read_params)?;
            let path = output_path(&tmp, "copy.asc");
            RasterWriter::new(engine.clone(), "AAIGrid", path.as_path())?.write_image(&native)?;

            assert!(temporary_paths(&engine).is_empty());
            assert!(
                engine
                    .calls()
                    .iter()
                    .any(|call| matches!(call, MemoryCall::CreateCopy { source, .. } if source == input))
            );

            // the originating dataset belongs to the reader
            assert_eq!(engine.open_handle_count(), 1);
            engine.close(native.into_dataset())?;
            assert_eq!(engine.open_handle_count(), 0);

            let stored = engine.stored_raster(&path).expect("output was written");
            assert_eq!(stored.to_image()?, image);
            assert_eq!(stored.geo_transform, Some(geo_transform));
            assert_eq!(stored.projection, "EPSG:31370");
        }

        Ok(())
    }

    #[test_log::test]
    fn create_copy_of_parametrized_read_uses_temporary() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let input = Path::new("/input.tif");
        let image = ImageBuffer::from_fn(RasterSize::with_width_height(8, 8), 1, |_, row, col| (row * 8 + col) as u8)?;
        engine.store_image(
            input,
            "GTiff",
            &image,
            Some(GeoTransform::new([0.0, 10.0, 0.0, 80.0, 0.0, -10.0])),
            "EPSG:4326",
        )?;

        let read_params = ReadParams {
            source_region: Some(PixelRegion::new(2, 2, 6, 6)),
            subsampling: Subsampling::new(2, 2),
            ..Default::default()
        };
        let native = engine.open_image(input, Some(read_params))?;
        let path = output_path(&tmp, "subset.asc");
        RasterWriter::new(engine.clone(), "AAIGrid", path.as_path())?.write_image(&native)?;

        assert_eq!(temporary_paths(&engine).len(), 1);
        engine.close(native.into_dataset())?;
        assert_eq!(engine.open_handle_count(), 0);

        let stored = engine.stored_raster(&path).expect("output was written");
        assert_eq!(stored.size, RasterSize::with_width_height(3, 3));
        assert_eq!(stored.band_samples::<u8>(0)?, [18, 20, 22, 34, 36, 38, 50, 52, 54]);
        assert_relative_eq!(
            stored.geo_transform.expect("georeferenced output"),
            GeoTransform::new([20.0, 20.0, 0.0, 60.0, 0.0, -20.0])
        );
        assert_eq!(stored.projection, "EPSG:4326");
        Ok(())
    }

    #[test_log::test]
    fn create_path_propagates_adjusted_georeference() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let input = Path::new("/input.tif");
        let image = testutils::create_test_image::<f32>(RasterSize::with_width_height(10, 10), 1)?;
        engine.store_image(
            input,
            "GTiff",
            &image,
            Some(GeoTransform::new([100.0, 10.0, 0.0, 500.0, 0.0, -10.0])),
            "EPSG:31370",
        )?;

        let native = engine.open_image(input, None)?;
        let path = output_path(&tmp, "georef.tif");
        let options = WriteOptions::builder()
            .source_region(PixelRegion::new(2, 1, 8, 8))
            .x_subsampling(2)
            .y_subsampling(2)
            .build();
        RasterWriter::new(engine.clone(), "GTiff", path.as_path())?.write(None, &native, &options)?;
        engine.close(native.into_dataset())?;

        let stored = engine.stored_raster(&path).expect("output was written");
        assert_eq!(stored.size, RasterSize::with_width_height(4, 4));
        assert_relative_eq!(
            stored.geo_transform.expect("georeferenced output"),
            GeoTransform::new([120.0, 20.0, 0.0, 490.0, 0.0, -20.0])
        );
        assert_eq!(stored.projection, "EPSG:31370");
        assert_eq!(engine.open_handle_count(), 0);
        Ok(())
    }

    #[test_log::test]
    fn failed_block_write_closes_and_removes_output() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<i32>(RasterSize::with_width_height(5, 5), 2)?;
        let path = output_path(&tmp, "failed.tif");

        engine.fail_on(MemoryOperation::WriteBlock);
        let writer = RasterWriter::new(engine.clone(), "GTiff", path.as_path())?;
        assert!(matches!(writer.write_image(&image), Err(Error::NativeOperationFailure(_))));

        assert_eq!(engine.open_handle_count(), 0);
        assert!(!engine.contains_file(&path));
        assert!(
            engine
                .calls()
                .iter()
                .any(|call| matches!(call, MemoryCall::RemoveOutput { path: p } if p == &path))
        );
        Ok(())
    }

    #[test_log::test]
    fn failures_during_create_copy_release_all_handles() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(5, 5), 1)?;

        for operation in [
            MemoryOperation::CreateTemporary,
            MemoryOperation::WriteBlock,
            MemoryOperation::CreateCopy,
            MemoryOperation::Flush,
            MemoryOperation::Close,
        ] {
            let engine = MemoryEngine::new();
            engine.fail_on(operation);

            let path = output_path(&tmp, "failed.asc");
            let writer = RasterWriter::new(engine.clone(), "AAIGrid", path.as_path())?;
            assert!(matches!(writer.write_image(&image), Err(Error::NativeOperationFailure(_))));

            assert_eq!(engine.open_handle_count(), 0, "handles leaked on {operation:?} failure");
            assert!(!engine.contains_file(&path), "output kept on {operation:?} failure");
            for temp_path in temporary_paths(&engine) {
                assert!(!temp_path.exists(), "temporary file kept on {operation:?} failure");
            }
        }

        Ok(())
    }

    #[test_log::test]
    fn failures_during_create_release_all_handles() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let input = Path::new("/input.tif");
        let image = testutils::create_test_image::<f32>(RasterSize::with_width_height(6, 5), 2)?;

        for operation in [
            MemoryOperation::Create,
            MemoryOperation::WriteBlock,
            MemoryOperation::SetGeoTransform,
            MemoryOperation::Flush,
            MemoryOperation::Close,
        ] {
            let engine = MemoryEngine::new();
            engine.store_image(
                input,
                "GTiff",
                &image,
                Some(GeoTransform::new([0.0, 1.0, 0.0, 5.0, 0.0, -1.0])),
                "",
            )?;
            let native = engine.open_image(input, None)?;
            engine.fail_on(operation);

            let path = output_path(&tmp, "failed.tif");
            let writer = RasterWriter::new(engine.clone(), "GTiff", path.as_path())?;
            assert!(matches!(writer.write_image(&native), Err(Error::NativeOperationFailure(_))));

            // only the originating dataset remains open
            assert_eq!(engine.open_handle_count(), 1, "handles leaked on {operation:?} failure");
            assert!(!engine.contains_file(&path), "output kept on {operation:?} failure");

            engine.clear_failures();
            engine.close(native.into_dataset())?;
            assert_eq!(engine.open_handle_count(), 0);
        }

        Ok(())
    }

    #[test_log::test]
    fn failed_create_keeps_existing_file() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(4, 4), 1)?;

        for (driver, operation, name) in [
            ("GTiff", MemoryOperation::Create, "existing.tif"),
            ("AAIGrid", MemoryOperation::CreateCopy, "existing.asc"),
        ] {
            let engine = MemoryEngine::new();
            let path = output_path(&tmp, name);
            engine.store_image(&path, driver, &image, None, "")?;
            engine.fail_on(operation);

            let writer = RasterWriter::new(engine.clone(), driver, path.as_path())?;
            assert!(matches!(writer.write_image(&image), Err(Error::NativeOperationFailure(_))));

            assert_eq!(engine.stored_raster(&path).expect("existing file").to_image()?, image);
            assert!(!engine.calls().iter().any(|call| matches!(call, MemoryCall::RemoveOutput { .. })));
            assert_eq!(engine.open_handle_count(), 0);
        }

        Ok(())
    }

    #[test_log::test]
    fn failed_copy_onto_the_originating_file_keeps_it() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let path = output_path(&tmp, "grid.asc");
        let image = testutils::create_test_image::<i16>(RasterSize::with_width_height(5, 3), 1)?;
        engine.store_image(&path, "AAIGrid", &image, None, "")?;

        let native = engine.open_image(&path, None)?;
        engine.fail_on(MemoryOperation::CreateCopy);
        let writer = RasterWriter::new(engine.clone(), "AAIGrid", path.as_path())?;
        assert!(matches!(writer.write_image(&native), Err(Error::NativeOperationFailure(_))));
        engine.close(native.into_dataset())?;

        assert!(engine.contains_file(&path));
        assert_eq!(engine.open_handle_count(), 0);
        Ok(())
    }

    #[test_log::test]
    fn close_failure_is_reported() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = MemoryEngine::new();
        let image = testutils::create_test_image::<u8>(RasterSize::with_width_height(5, 5), 1)?;

        engine.fail_on(MemoryOperation::Close);
        let writer = RasterWriter::new(engine.clone(), "GTiff", output_path(&tmp, "image.tif"))?;
        assert!(matches!(writer.write_image(&image), Err(Error::NativeOperationFailure(_))));
        assert_eq!(engine.open_handle_count(), 0);
        Ok(())
    }

    #[test_log::test]
    fn output_is_resolved_once() -> Result<()> {
        let engine = MemoryEngine::new();
        let writer = RasterWriter::new(engine.clone(), "GTiff", PathBuf::from("relative/out.tif"))?;
        assert!(writer.output_path().is_absolute());
        assert!(writer.output_path().ends_with("relative/out.tif"));

        assert!(matches!(
            RasterWriter::new(engine.clone(), "GTiff", OutputTarget::Url("http://host/out.tif".to_string())),
            Err(Error::InvalidOutputTarget(_))
        ));
        assert!(matches!(
            RasterWriter::for_path(engine, "out.unknown"),
            Err(Error::InvalidOutputTarget(_))
        ));
        Ok(())
    }

    #[test]
    fn write_options_builder_defaults() {
        assert_eq!(WriteOptions::builder().build(), WriteOptions::default());
        assert_eq!(WriteOptions::default().subsampling(), Subsampling::default());
    }
}
