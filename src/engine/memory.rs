//! In-process raster engine that keeps its datasets in memory.
//!
//! Tracks the open dataset handles, records every call and supports failure injection
//! so the dataset lifecycle of a writer can be verified without a native library.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
    rc::Rc,
};

use crate::{
    ArrayNum, Error, GeoTransform, ImageBuffer, NativeImage, RasterSize, ReadParams, Result, SampleType,
    engine::{BandSelection, CreateRequest, DriverCapability, RasterEngine, RasterWindow},
};

/// Operations of the memory engine that can be configured to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryOperation {
    Create,
    CreateTemporary,
    CreateCopy,
    WriteBlock,
    Flush,
    Close,
    SetGeoTransform,
}

/// A call that was made on the memory engine
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryCall {
    Create { driver: String, path: PathBuf },
    CreateTemporary { path: PathBuf },
    CreateCopy { driver: String, path: PathBuf, source: PathBuf },
    WriteBlock { path: PathBuf, bands: BandSelection, window: RasterWindow, len: usize },
    Flush { path: PathBuf },
    Close { path: PathBuf },
    RemoveOutput { path: PathBuf },
}

/// The contents of a dataset
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRaster {
    pub driver: String,
    pub size: RasterSize,
    pub sample_type: SampleType,
    pub bands: Vec<Vec<u8>>,
    pub geo_transform: Option<GeoTransform>,
    pub projection: String,
    pub options: Vec<String>,
}

impl StoredRaster {
    fn new(driver: &str, size: RasterSize, band_count: usize, sample_type: SampleType) -> Self {
        StoredRaster {
            driver: driver.to_string(),
            size,
            sample_type,
            bands: vec![vec![0; size.cell_count() * sample_type.bytes()]; band_count],
            geo_transform: None,
            projection: String::new(),
            options: Vec::new(),
        }
    }

    pub fn from_image(driver: &str, image: &ImageBuffer) -> Result<Self> {
        let sample_type = SampleType::try_from(image.data_type())?;
        let mut raster = StoredRaster::new(driver, image.raster_size(), image.band_count(), sample_type);
        let region = crate::PixelRegion::full(image.raster_size());
        for (band_index, band) in raster.bands.iter_mut().enumerate() {
            image.read_band_region_into_byte_buffer(band_index, &region, band)?;
        }

        Ok(raster)
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    /// The samples of a band (0-based)
    pub fn band_samples<T: ArrayNum>(&self, band_index: usize) -> Result<Vec<T>> {
        if T::TYPE != self.sample_type.data_type() {
            return Err(Error::InvalidParameter(format!(
                "Requested {} samples from a {} raster",
                T::TYPE,
                self.sample_type
            )));
        }

        let band = self
            .bands
            .get(band_index)
            .ok_or_else(|| Error::InvalidParameter(format!("Band index {band_index} out of range")))?;
        Ok(bytemuck::pod_collect_to_vec(band))
    }

    pub fn to_image(&self) -> Result<ImageBuffer> {
        ImageBuffer::from_bytes(self.size, self.band_count(), self.sample_type.data_type(), self.bands.concat())
    }

    fn write_block(&mut self, bands: BandSelection, window: RasterWindow, sample_type: SampleType, data: &[u8]) -> Result {
        if sample_type != self.sample_type {
            return Err(Error::NativeOperationFailure(format!(
                "Writing {sample_type} data to a {} dataset",
                self.sample_type
            )));
        }

        if window.x_off + window.size.cols > self.size.cols || window.y_off + window.size.rows > self.size.rows {
            return Err(Error::NativeOperationFailure(format!(
                "Access window out of range ({window:?} on dataset {})",
                self.size
            )));
        }

        let band_indexes: Vec<usize> = match bands {
            BandSelection::All(count) if count == self.band_count() => (0..count).collect(),
            BandSelection::Band(band_nr) if band_nr >= 1 && band_nr <= self.band_count() => vec![band_nr - 1],
            _ => {
                return Err(Error::NativeOperationFailure(format!(
                    "Invalid band selection {bands:?} for dataset with {} band(s)",
                    self.band_count()
                )));
            }
        };

        let sample_size = sample_type.bytes();
        let window_bytes = window.size.cell_count() * sample_size;
        if data.len() != window_bytes * band_indexes.len() {
            return Err(Error::NativeOperationFailure(format!(
                "Buffer has {} bytes, expected {}",
                data.len(),
                window_bytes * band_indexes.len()
            )));
        }

        if window_bytes == 0 {
            return Ok(());
        }

        let row_bytes = window.size.cols * sample_size;
        for (band_index, band_data) in band_indexes.into_iter().zip(data.chunks_exact(window_bytes)) {
            let band = &mut self.bands[band_index];
            for (row, line) in band_data.chunks_exact(row_bytes).enumerate() {
                let start = ((window.y_off + row) * self.size.cols + window.x_off) * sample_size;
                band[start..start + row_bytes].copy_from_slice(line);
            }
        }

        Ok(())
    }
}

struct OpenDataset {
    path: PathBuf,
    raster: StoredRaster,
    /// Temporary datasets are never persisted to the file store
    persistent: bool,
}

struct MemoryState {
    drivers: HashMap<String, DriverCapability>,
    files: HashMap<PathBuf, StoredRaster>,
    open: HashMap<u64, OpenDataset>,
    next_id: u64,
    calls: Vec<MemoryCall>,
    failures: HashSet<MemoryOperation>,
}

impl MemoryState {
    fn check_failure(&self, operation: MemoryOperation) -> Result {
        if self.failures.contains(&operation) {
            return Err(Error::NativeOperationFailure(format!("Injected {operation:?} failure")));
        }

        Ok(())
    }

    fn open_dataset(&mut self, path: &Path, raster: StoredRaster, persistent: bool) -> MemoryDataset {
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(
            id,
            OpenDataset {
                path: path.to_path_buf(),
                raster,
                persistent,
            },
        );

        MemoryDataset {
            id,
            path: path.to_path_buf(),
        }
    }

    fn dataset(&self, dataset: &MemoryDataset) -> Result<&OpenDataset> {
        self.open
            .get(&dataset.id)
            .ok_or_else(|| Error::NativeOperationFailure(format!("Dataset '{}' is not open", dataset.path.display())))
    }

    fn dataset_mut(&mut self, dataset: &MemoryDataset) -> Result<&mut OpenDataset> {
        self.open
            .get_mut(&dataset.id)
            .ok_or_else(|| Error::NativeOperationFailure(format!("Dataset '{}' is not open", dataset.path.display())))
    }

    fn persist(&mut self, dataset: &MemoryDataset) -> Result {
        let open = self.dataset(dataset)?;
        if open.persistent {
            let (path, raster) = (open.path.clone(), open.raster.clone());
            self.files.insert(path, raster);
        }

        Ok(())
    }
}

/// Handle to a dataset of the [`MemoryEngine`].
/// The handle stays registered as open until it is passed to [`RasterEngine::close`].
#[derive(Debug, PartialEq, Eq)]
pub struct MemoryDataset {
    id: u64,
    path: PathBuf,
}

impl MemoryDataset {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Raster engine that keeps its files in memory, clones share the same state.
#[derive(Clone)]
pub struct MemoryEngine {
    state: Rc<RefCell<MemoryState>>,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryEngine {
    /// Engine with a create capable "GTiff" driver, a create-copy only "AAIGrid" driver
    /// and a read-only "HDF4Image" driver.
    pub fn new() -> Self {
        let drivers = HashMap::from([
            ("GTiff".to_string(), DriverCapability::Create),
            ("AAIGrid".to_string(), DriverCapability::CreateCopy),
            ("HDF4Image".to_string(), DriverCapability::ReadOnly),
        ]);

        MemoryEngine {
            state: Rc::new(RefCell::new(MemoryState {
                drivers,
                files: HashMap::new(),
                open: HashMap::new(),
                next_id: 1,
                calls: Vec::new(),
                failures: HashSet::new(),
            })),
        }
    }

    pub fn with_driver(self, driver_name: &str, capability: DriverCapability) -> Self {
        self.state.borrow_mut().drivers.insert(driver_name.to_string(), capability);
        self
    }

    /// Every following invocation of the operation fails
    pub fn fail_on(&self, operation: MemoryOperation) {
        self.state.borrow_mut().failures.insert(operation);
    }

    pub fn clear_failures(&self) {
        self.state.borrow_mut().failures.clear();
    }

    /// The number of datasets that were opened or created and not closed yet
    pub fn open_handle_count(&self) -> usize {
        self.state.borrow().open.len()
    }

    pub fn calls(&self) -> Vec<MemoryCall> {
        self.state.borrow().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state.borrow_mut().calls.clear();
    }

    pub fn stored_raster(&self, path: &Path) -> Option<StoredRaster> {
        self.state.borrow().files.get(path).cloned()
    }

    pub fn contains_file(&self, path: &Path) -> bool {
        self.state.borrow().files.contains_key(path)
    }

    /// Store an image as a file of the engine, e.g. to serve as input for [`MemoryEngine::open_image`]
    pub fn store_image(
        &self,
        path: &Path,
        driver_name: &str,
        image: &ImageBuffer,
        geo_transform: Option<GeoTransform>,
        projection: &str,
    ) -> Result {
        let mut raster = StoredRaster::from_image(driver_name, image)?;
        raster.geo_transform = geo_transform;
        raster.projection = projection.to_string();
        self.state.borrow_mut().files.insert(path.to_path_buf(), raster);
        Ok(())
    }

    /// Opens a stored file and reads its pixels, the read parameters select the part of the file that is read.
    /// The returned image keeps the dataset open, pass it to [`RasterEngine::close`] when done.
    pub fn open_image(&self, path: &Path, read_params: Option<ReadParams>) -> Result<NativeImage<MemoryDataset>> {
        let raster = self
            .stored_raster(path)
            .ok_or_else(|| Error::NativeOperationFailure(format!("No such file: '{}'", path.display())))?;

        let full_image = raster.to_image()?;
        let image = match &read_params {
            Some(params) if params.is_parametrized() => {
                let geometry = params.geometry(raster.size)?;
                ImageBuffer::from_source_window::<MemoryDataset, _>(&full_image, &geometry)?
            }
            _ => full_image,
        };

        let dataset = self.state.borrow_mut().open_dataset(path, raster, false);
        Ok(NativeImage::new(image, dataset, read_params))
    }
}

impl RasterEngine for MemoryEngine {
    type Dataset = MemoryDataset;

    fn driver_capability(&self, driver_name: &str) -> DriverCapability {
        self.state
            .borrow()
            .drivers
            .get(driver_name)
            .copied()
            .unwrap_or(DriverCapability::Unavailable)
    }

    fn create(&self, request: &CreateRequest<'_>) -> Result<MemoryDataset> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::Create {
            driver: request.driver_name.to_string(),
            path: request.path.to_path_buf(),
        });
        state.check_failure(MemoryOperation::Create)?;

        if state.drivers.get(request.driver_name) != Some(&DriverCapability::Create) {
            return Err(Error::NativeOperationFailure(format!(
                "Driver '{}' does not support dataset creation",
                request.driver_name
            )));
        }

        let mut raster = StoredRaster::new(request.driver_name, request.size, request.band_count, request.sample_type);
        raster.options = request.options.to_vec();
        state.files.insert(request.path.to_path_buf(), raster.clone());
        Ok(state.open_dataset(request.path, raster, true))
    }

    fn create_temporary(&self, path: &Path, size: RasterSize, band_count: usize, sample_type: SampleType) -> Result<MemoryDataset> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::CreateTemporary { path: path.to_path_buf() });
        state.check_failure(MemoryOperation::CreateTemporary)?;

        let raster = StoredRaster::new("MEM", size, band_count, sample_type);
        Ok(state.open_dataset(path, raster, false))
    }

    fn create_copy(&self, driver_name: &str, path: &Path, source: &MemoryDataset, options: &[String]) -> Result<MemoryDataset> {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::CreateCopy {
            driver: driver_name.to_string(),
            path: path.to_path_buf(),
            source: source.path.clone(),
        });
        state.check_failure(MemoryOperation::CreateCopy)?;

        if !matches!(
            state.drivers.get(driver_name),
            Some(DriverCapability::Create | DriverCapability::CreateCopy)
        ) {
            return Err(Error::NativeOperationFailure(format!(
                "Driver '{driver_name}' does not support dataset copies"
            )));
        }

        let mut raster = state.dataset(source)?.raster.clone();
        raster.driver = driver_name.to_string();
        raster.options = options.to_vec();
        state.files.insert(path.to_path_buf(), raster.clone());
        Ok(state.open_dataset(path, raster, true))
    }

    fn write_block(
        &self,
        dataset: &mut MemoryDataset,
        bands: BandSelection,
        window: RasterWindow,
        sample_type: SampleType,
        data: &[u8],
    ) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::WriteBlock {
            path: dataset.path.clone(),
            bands,
            window,
            len: data.len(),
        });
        state.check_failure(MemoryOperation::WriteBlock)?;
        state.dataset_mut(dataset)?.raster.write_block(bands, window, sample_type, data)
    }

    fn flush(&self, dataset: &mut MemoryDataset) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::Flush {
            path: dataset.path.clone(),
        });
        state.check_failure(MemoryOperation::Flush)?;
        state.persist(dataset)
    }

    fn close(&self, dataset: MemoryDataset) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::Close {
            path: dataset.path.clone(),
        });

        // The handle is released, even when closing fails
        let open = state
            .open
            .remove(&dataset.id)
            .ok_or_else(|| Error::NativeOperationFailure(format!("Dataset '{}' is not open", dataset.path.display())))?;
        state.check_failure(MemoryOperation::Close)?;

        if open.persistent {
            state.files.insert(open.path, open.raster);
        }

        Ok(())
    }

    fn geo_transform(&self, dataset: &MemoryDataset) -> Result<Option<GeoTransform>> {
        Ok(self.state.borrow().dataset(dataset)?.raster.geo_transform)
    }

    fn set_geo_transform(&self, dataset: &mut MemoryDataset, geo_transform: &GeoTransform) -> Result {
        let mut state = self.state.borrow_mut();
        state.check_failure(MemoryOperation::SetGeoTransform)?;
        state.dataset_mut(dataset)?.raster.geo_transform = Some(*geo_transform);
        Ok(())
    }

    fn projection(&self, dataset: &MemoryDataset) -> Result<String> {
        Ok(self.state.borrow().dataset(dataset)?.raster.projection.clone())
    }

    fn set_projection(&self, dataset: &mut MemoryDataset, projection: &str) -> Result {
        self.state.borrow_mut().dataset_mut(dataset)?.raster.projection = projection.to_string();
        Ok(())
    }

    fn remove_output(&self, _driver_name: &str, path: &Path) -> Result {
        let mut state = self.state.borrow_mut();
        state.calls.push(MemoryCall::RemoveOutput { path: path.to_path_buf() });
        state.files.remove(path);
        Ok(())
    }
}
