use std::{
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

use crate::{Result, SampleType};
use gdal::{cpl::CslStringList, errors::GdalError, raster::GdalType};

/// Process wide GDAL settings
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub debug_logging: bool,
    pub proj_db_search_location: Option<PathBuf>,
    /// Additional GDAL configuration options (key, value)
    pub config_options: Vec<(String, String)>,
}

impl Config {
    pub fn apply(&self) -> Result<()> {
        setup_logging(self.debug_logging);
        if let Some(proj_db) = &self.proj_db_search_location {
            let proj_db_path = proj_db.to_string_lossy().to_string();
            if !proj_db_path.is_empty() {
                gdal::config::set_config_option("PROJ_DATA", proj_db_path.as_str())?;

                // Also set the environment variable unless it is already set by the user
                // e.g. Spatialite library does not use gdal settings
                if std::env::var_os("PROJ_DATA").is_none() {
                    unsafe { std::env::set_var("PROJ_DATA", proj_db_path.as_str()) };
                }
            }
        }

        for (key, value) in &self.config_options {
            gdal::config::set_config_option(key, value)?;
        }

        Ok(())
    }
}

pub fn setup_logging(debug: bool) {
    if debug && gdal::config::set_config_option("CPL_DEBUG", "ON").is_err() {
        log::debug!("Failed to set GDAL debug level")
    }

    gdal::config::set_error_handler(|sev, _ec, msg| {
        use gdal::errors::CplErrType;
        match sev {
            CplErrType::Debug => log::debug!("GDAL: {msg}"),
            CplErrType::Warning => log::warn!("GDAL: {msg}"),
            CplErrType::Failure | CplErrType::Fatal => log::error!("GDAL: {msg}"),
            CplErrType::None => {}
        }
    });
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverRegistration {
    Uninitialized,
    Ready,
    Failed,
    /// The driver manager was destroyed, GDAL does not support registering drivers again
    TornDown,
}

impl DriverRegistration {
    fn initialize(&mut self, register_drivers: impl FnOnce() -> usize) -> bool {
        if *self == DriverRegistration::Uninitialized {
            let driver_count = register_drivers();
            *self = if driver_count > 0 {
                log::debug!("Registered {driver_count} GDAL drivers");
                DriverRegistration::Ready
            } else {
                log::error!("No GDAL drivers available");
                DriverRegistration::Failed
            };
        }

        *self == DriverRegistration::Ready
    }

    fn teardown(&mut self, destroy_driver_manager: impl FnOnce()) {
        if *self == DriverRegistration::Ready {
            destroy_driver_manager();
        }

        *self = DriverRegistration::TornDown;
    }
}

static DRIVER_REGISTRATION: Mutex<DriverRegistration> = Mutex::new(DriverRegistration::Uninitialized);

/// Registers the GDAL drivers, only the first invocation has an effect.
/// Returns false when no drivers are available after registration or after [`teardown`].
pub fn initialize() -> bool {
    let mut state = DRIVER_REGISTRATION.lock().unwrap_or_else(PoisonError::into_inner);
    state.initialize(|| {
        gdal::DriverManager::register_all();
        gdal::DriverManager::count()
    })
}

/// Destroys the GDAL driver manager, meant to be called once at process exit.
/// No datasets can be open when calling this and GDAL can not be initialized again afterwards.
pub fn teardown() {
    let mut state = DRIVER_REGISTRATION.lock().unwrap_or_else(PoisonError::into_inner);
    state.teardown(|| unsafe { gdal_sys::GDALDestroyDriverManager() });
}

pub fn create_string_list(options: &[String]) -> Result<CslStringList> {
    let mut result = CslStringList::new();
    for opt in options {
        result.add_string(opt)?;
    }

    Ok(result)
}

pub fn gdal_ordinal_for_sample_type(sample_type: SampleType) -> gdal_sys::GDALDataType::Type {
    match sample_type {
        SampleType::Uint8 => u8::gdal_ordinal(),
        SampleType::Uint16 => u16::gdal_ordinal(),
        SampleType::Int16 => i16::gdal_ordinal(),
        SampleType::Int32 => i32::gdal_ordinal(),
        SampleType::Float32 => f32::gdal_ordinal(),
        SampleType::Float64 => f64::gdal_ordinal(),
    }
}

pub fn check_rc(rc: gdal_sys::CPLErr::Type) -> std::result::Result<(), GdalError> {
    if rc != 0 {
        let msg = last_error_message();
        let last_err_no = unsafe { gdal_sys::CPLGetLastErrorNo() };
        Err(GdalError::CplError {
            class: rc,
            number: last_err_no,
            msg,
        })
    } else {
        Ok(())
    }
}

pub fn check_pointer<T>(ptr: *mut T, method_name: &'static str) -> std::result::Result<*mut T, GdalError> {
    if ptr.is_null() {
        let msg = last_error_message();
        unsafe { gdal_sys::CPLErrorReset() };
        Err(GdalError::NullPointer { method_name, msg })
    } else {
        Ok(ptr)
    }
}

/// Checks the GDAL error state for failures, for functions that do not report a return code.
/// Reset the error state with `CPLErrorReset` before calling the function.
pub fn check_last_error() -> std::result::Result<(), GdalError> {
    let class = unsafe { gdal_sys::CPLGetLastErrorType() };
    if class >= gdal_sys::CPLErr::CE_Failure {
        check_rc(class)
    } else {
        Ok(())
    }
}

fn raw_string_to_string(raw_ptr: *const libc::c_char) -> String {
    if raw_ptr.is_null() {
        return String::new();
    }

    let c_str = unsafe { std::ffi::CStr::from_ptr(raw_ptr) };
    c_str.to_string_lossy().into_owned()
}

fn last_error_message() -> String {
    raw_string_to_string(unsafe { gdal_sys::CPLGetLastErrorMsg() })
}
