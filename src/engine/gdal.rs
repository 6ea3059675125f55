//! [`RasterEngine`] implementation on top of the GDAL drivers.

use std::{
    ffi::{CString, c_void},
    path::Path,
};

use gdal::{DriverManager, Metadata, raster::GdalDataType};
use libc::c_int;

use crate::{
    ArrayDataType, Error, GeoTransform, ImageBuffer, NativeImage, RasterSize, ReadParams, Result, SampleType,
    engine::{BandSelection, CreateRequest, DriverCapability, RasterEngine, RasterWindow},
    gdalinterop::{self, check_last_error, check_pointer, check_rc, create_string_list, gdal_ordinal_for_sample_type},
};

impl TryFrom<GdalDataType> for ArrayDataType {
    type Error = Error;

    fn try_from(value: GdalDataType) -> std::result::Result<Self, Self::Error> {
        match value {
            GdalDataType::UInt8 => Ok(ArrayDataType::Uint8),
            GdalDataType::UInt16 => Ok(ArrayDataType::Uint16),
            GdalDataType::UInt32 => Ok(ArrayDataType::Uint32),
            GdalDataType::Int16 => Ok(ArrayDataType::Int16),
            GdalDataType::Int32 => Ok(ArrayDataType::Int32),
            GdalDataType::Float32 => Ok(ArrayDataType::Float32),
            GdalDataType::Float64 => Ok(ArrayDataType::Float64),
            _ => Err(Error::NativeOperationFailure(format!("Unsupported GDAL raster data type: {value:?}"))),
        }
    }
}

fn to_c_int(value: usize, name: &str) -> Result<c_int> {
    c_int::try_from(value).map_err(|_| Error::InvalidParameter(format!("The {name} ({value}) exceeds the range supported by GDAL")))
}

fn path_to_cstring(path: &Path) -> Result<CString> {
    CString::new(path.to_string_lossy().as_bytes())
        .map_err(|e| Error::InvalidOutputTarget(format!("Invalid path '{}' ({e})", path.display())))
}

/// Takes ownership of a dataset handle returned by the GDAL C API
fn dataset_from_handle(handle: gdal_sys::GDALDatasetH, method_name: &'static str) -> Result<gdal::Dataset> {
    let handle = check_pointer(handle, method_name)?;
    Ok(unsafe { gdal::Dataset::from_c_dataset(handle) })
}

fn open_dataset_read_only(path: &Path) -> Result<gdal::Dataset> {
    let options = gdal::DatasetOptions {
        open_flags: gdal::GdalOpenFlags::GDAL_OF_READONLY | gdal::GdalOpenFlags::GDAL_OF_RASTER,
        ..Default::default()
    };

    gdal::Dataset::open_ex(path, options).map_err(|err| {
        if path.exists() {
            Error::from(err)
        } else {
            Error::InvalidParameter(format!("Raster file does not exist: '{}'", path.display()))
        }
    })
}

/// Raster engine backed by the GDAL drivers.
/// The drivers get registered on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalEngine;

impl GdalEngine {
    pub fn new() -> Self {
        GdalEngine
    }

    fn driver(&self, driver_name: &str) -> Result<gdal::Driver> {
        if !gdalinterop::initialize() {
            return Err(Error::UnsupportedCapability("GDAL could not be initialized".to_string()));
        }

        Ok(DriverManager::get_driver_by_name(driver_name)?)
    }

    fn create_dataset(
        &self,
        driver_name: &str,
        path: &Path,
        size: RasterSize,
        band_count: usize,
        sample_type: SampleType,
        options: &[String],
    ) -> Result<gdal::Dataset> {
        let driver = self.driver(driver_name)?;
        let c_path = path_to_cstring(path)?;
        let c_opts = create_string_list(options)?;

        let handle = unsafe {
            gdal_sys::GDALCreate(
                driver.c_driver(),
                c_path.as_ptr(),
                to_c_int(size.cols, "raster width")?,
                to_c_int(size.rows, "raster height")?,
                to_c_int(band_count, "band count")?,
                gdal_ordinal_for_sample_type(sample_type),
                c_opts.as_ptr(),
            )
        };

        dataset_from_handle(handle, "GDALCreate")
    }

    /// Opens a raster file and reads its pixels, the read parameters select the part of the file that is read.
    /// The returned image keeps the dataset open so it can be copied directly by create-copy writers.
    pub fn open_image(&self, path: impl AsRef<Path>, read_params: Option<ReadParams>) -> Result<NativeImage<gdal::Dataset>> {
        let path = path.as_ref();
        if !gdalinterop::initialize() {
            return Err(Error::UnsupportedCapability("GDAL could not be initialized".to_string()));
        }

        let dataset = open_dataset_read_only(path)?;
        let (cols, rows) = dataset.raster_size();
        let size = RasterSize::with_width_height(cols, rows);
        let band_count = dataset.raster_count();
        if band_count == 0 {
            return Err(Error::InvalidParameter(format!("'{}' contains no raster bands", path.display())));
        }

        let data_type = ArrayDataType::try_from(dataset.rasterband(1)?.band_type())?;
        let band_bytes = size.cell_count() * data_type.bytes();
        let mut data = Vec::new();
        data.try_reserve_exact(band_bytes * band_count)?;
        data.resize(band_bytes * band_count, 0u8);

        for (band_index, band_data) in data.chunks_exact_mut(band_bytes).enumerate() {
            let band = dataset.rasterband(band_index + 1)?;
            let band_type = ArrayDataType::try_from(band.band_type())?;
            if band_type != data_type {
                return Err(Error::InvalidParameter(format!(
                    "'{}' has bands of different data types ({data_type} and {band_type})",
                    path.display()
                )));
            }

            unsafe {
                check_rc(gdal_sys::GDALRasterIO(
                    band.c_rasterband(),
                    gdal_sys::GDALRWFlag::GF_Read,
                    0,
                    0,
                    to_c_int(size.cols, "raster width")?,
                    to_c_int(size.rows, "raster height")?,
                    band_data.as_mut_ptr().cast::<c_void>(),
                    to_c_int(size.cols, "raster width")?,
                    to_c_int(size.rows, "raster height")?,
                    gdal_sys::GDALGetRasterDataType(band.c_rasterband()),
                    0,
                    0,
                ))?;
            }
        }

        let full_image = ImageBuffer::from_bytes(size, band_count, data_type, data)?;
        let image = match &read_params {
            Some(params) if params.is_parametrized() => {
                ImageBuffer::from_source_window::<gdal::Dataset, _>(&full_image, &params.geometry(size)?)?
            }
            _ => full_image,
        };

        Ok(NativeImage::new(image, dataset, read_params))
    }
}

impl RasterEngine for GdalEngine {
    type Dataset = gdal::Dataset;

    fn driver_capability(&self, driver_name: &str) -> DriverCapability {
        if !gdalinterop::initialize() {
            return DriverCapability::Unavailable;
        }

        let driver = match DriverManager::get_driver_by_name(driver_name) {
            Ok(driver) => driver,
            Err(e) => {
                log::debug!("GDAL driver '{driver_name}' not available ({e})");
                return DriverCapability::Unavailable;
            }
        };

        let has_capability = |key: &str| {
            driver
                .metadata_item(key, "")
                .is_some_and(|value| value.eq_ignore_ascii_case("YES"))
        };

        if !has_capability("DCAP_RASTER") {
            log::debug!("GDAL driver '{driver_name}' has no raster support");
            DriverCapability::Unavailable
        } else if has_capability("DCAP_CREATE") {
            DriverCapability::Create
        } else if has_capability("DCAP_CREATECOPY") {
            DriverCapability::CreateCopy
        } else {
            DriverCapability::ReadOnly
        }
    }

    fn create(&self, request: &CreateRequest<'_>) -> Result<gdal::Dataset> {
        self.create_dataset(
            request.driver_name,
            request.path,
            request.size,
            request.band_count,
            request.sample_type,
            request.options,
        )
    }

    fn create_temporary(&self, path: &Path, size: RasterSize, band_count: usize, sample_type: SampleType) -> Result<gdal::Dataset> {
        self.create_dataset("MEM", path, size, band_count, sample_type, &[])
    }

    fn create_copy(&self, driver_name: &str, path: &Path, source: &gdal::Dataset, options: &[String]) -> Result<gdal::Dataset> {
        let driver = self.driver(driver_name)?;
        let c_path = path_to_cstring(path)?;
        let c_opts = create_string_list(options)?;

        let handle = unsafe {
            gdal_sys::GDALCreateCopy(
                driver.c_driver(),
                c_path.as_ptr(),
                source.c_dataset(),
                0,
                c_opts.as_ptr(),
                Some(gdal_sys::GDALDummyProgress),
                std::ptr::null_mut(),
            )
        };

        dataset_from_handle(handle, "GDALCreateCopy")
    }

    fn write_block(
        &self,
        dataset: &mut gdal::Dataset,
        bands: BandSelection,
        window: RasterWindow,
        sample_type: SampleType,
        data: &[u8],
    ) -> Result {
        let expected_len = window.size.cell_count() * sample_type.bytes() * bands.band_count();
        if data.len() != expected_len {
            return Err(Error::InvalidParameter(format!(
                "Invalid data buffer provided: incorrect size (got {} bytes but should be {expected_len} bytes)",
                data.len()
            )));
        }

        let x_off = to_c_int(window.x_off, "x offset")?;
        let y_off = to_c_int(window.y_off, "y offset")?;
        let width = to_c_int(window.size.cols, "window width")?;
        let height = to_c_int(window.size.rows, "window height")?;
        let data_ptr = data.as_ptr().cast_mut().cast::<c_void>();
        let data_type = gdal_ordinal_for_sample_type(sample_type);

        let rc = match bands {
            BandSelection::All(band_count) => unsafe {
                gdal_sys::GDALDatasetRasterIO(
                    dataset.c_dataset(),
                    gdal_sys::GDALRWFlag::GF_Write,
                    x_off,
                    y_off,
                    width,
                    height,
                    data_ptr,
                    width,
                    height,
                    data_type,
                    to_c_int(band_count, "band count")?,
                    std::ptr::null_mut::<c_int>(),
                    0,
                    0,
                    0,
                )
            },
            BandSelection::Band(band_nr) => {
                let band = dataset.rasterband(band_nr)?;
                unsafe {
                    gdal_sys::GDALRasterIO(
                        band.c_rasterband(),
                        gdal_sys::GDALRWFlag::GF_Write,
                        x_off,
                        y_off,
                        width,
                        height,
                        data_ptr,
                        width,
                        height,
                        data_type,
                        0,
                        0,
                    )
                }
            }
        };

        Ok(check_rc(rc)?)
    }

    fn flush(&self, dataset: &mut gdal::Dataset) -> Result {
        Ok(dataset.flush_cache()?)
    }

    fn close(&self, dataset: gdal::Dataset) -> Result {
        unsafe { gdal_sys::CPLErrorReset() };
        dataset.close()?;
        Ok(check_last_error()?)
    }

    fn geo_transform(&self, dataset: &gdal::Dataset) -> Result<Option<GeoTransform>> {
        match dataset.geo_transform() {
            Ok(coefficients) => Ok(Some(GeoTransform::new(coefficients))),
            Err(e) => {
                log::debug!("Dataset without geo transform ({e})");
                Ok(None)
            }
        }
    }

    fn set_geo_transform(&self, dataset: &mut gdal::Dataset, geo_transform: &GeoTransform) -> Result {
        Ok(dataset.set_geo_transform(&geo_transform.coefficients())?)
    }

    fn projection(&self, dataset: &gdal::Dataset) -> Result<String> {
        Ok(dataset.projection())
    }

    fn set_projection(&self, dataset: &mut gdal::Dataset, projection: &str) -> Result {
        Ok(dataset.set_projection(projection)?)
    }

    fn remove_output(&self, driver_name: &str, path: &Path) -> Result {
        if !path.exists() {
            return Ok(());
        }

        let driver = self.driver(driver_name)?;
        let c_path = path_to_cstring(path)?;
        let rc = unsafe { gdal_sys::GDALDeleteDataset(driver.c_driver(), c_path.as_ptr()) };
        if rc != gdal_sys::CPLErr::CE_None {
            log::debug!("GDAL could not delete '{}', removing the file", path.display());
            std::fs::remove_file(path)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_log::test]
    fn driver_capabilities() {
        let engine = GdalEngine::new();
        assert_eq!(engine.driver_capability("GTiff"), DriverCapability::Create);
        assert_eq!(engine.driver_capability("AAIGrid"), DriverCapability::CreateCopy);
        assert_eq!(engine.driver_capability("NoSuchDriver"), DriverCapability::Unavailable);
    }

    #[test_log::test]
    fn vector_drivers_are_not_raster_writers() {
        let engine = GdalEngine::new();
        assert_eq!(engine.driver_capability("ESRI Shapefile"), DriverCapability::Unavailable);
        assert_eq!(engine.driver_capability("MEM"), DriverCapability::Create);
    }

    #[test_log::test]
    fn georeference_is_stored_on_the_dataset() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = GdalEngine::new();
        let mut dataset = engine.create_temporary(&tmp.path().join("tmp.ds"), RasterSize::with_width_height(3, 3), 1, SampleType::Float32)?;
        assert_eq!(engine.geo_transform(&dataset)?, None);

        let geo_transform = GeoTransform::new([10.0, 2.0, 0.0, 20.0, 0.0, -2.0]);
        engine.set_geo_transform(&mut dataset, &geo_transform)?;
        assert_eq!(engine.geo_transform(&dataset)?, Some(geo_transform));
        engine.close(dataset)?;
        Ok(())
    }

    #[test_log::test]
    fn write_and_read_band() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let path = tmp.path().join("band.tif");
        let engine = GdalEngine::new();
        let size = RasterSize::with_width_height(4, 3);

        let mut dataset = engine.create(&CreateRequest {
            driver_name: "GTiff",
            path: &path,
            size,
            band_count: 2,
            sample_type: SampleType::Int16,
            options: &[],
        })?;

        let data: Vec<i16> = (0..12).collect();
        engine.write_block(
            &mut dataset,
            BandSelection::Band(2),
            RasterWindow::with_size(size),
            SampleType::Int16,
            bytemuck::cast_slice(&data),
        )?;
        engine.flush(&mut dataset)?;
        engine.close(dataset)?;

        let native = engine.open_image(&path, None)?;
        assert_eq!(native.image().raster_size(), size);
        assert_eq!(native.image().band_samples::<i16>(1)?, data);
        assert_eq!(native.image().band_samples::<i16>(0)?, vec![0; 12]);
        engine.close(native.into_dataset())?;
        Ok(())
    }

    #[test_log::test]
    fn invalid_buffer_size_is_rejected() -> Result<()> {
        let tmp = tempfile::tempdir()?;
        let engine = GdalEngine::new();
        let mut dataset = engine.create_temporary(&tmp.path().join("tmp.ds"), RasterSize::with_width_height(2, 2), 1, SampleType::Uint8)?;
        let res = engine.write_block(
            &mut dataset,
            BandSelection::All(1),
            RasterWindow::with_size(RasterSize::with_width_height(2, 2)),
            SampleType::Uint8,
            &[0; 3],
        );
        assert!(matches!(res, Err(Error::InvalidParameter(_))));
        engine.close(dataset)?;
        Ok(())
    }
}
