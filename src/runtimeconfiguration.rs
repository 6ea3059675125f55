use crate::gdalinterop;
use crate::{Error, Result};
use bon::bon;

/// Process wide configuration of the native raster engine
pub struct RuntimeConfiguration {
    gdal_config: gdalinterop::Config,
}

#[bon]
impl RuntimeConfiguration {
    #[builder]
    pub fn new(
        proj_db: Option<&std::path::Path>,
        gdal_debug_log: Option<bool>,
        #[builder(default)] config_options: Vec<(String, String)>,
    ) -> Self {
        Self {
            gdal_config: gdalinterop::Config {
                debug_logging: gdal_debug_log.unwrap_or(false),
                proj_db_search_location: proj_db.map(std::path::Path::to_path_buf),
                config_options,
            },
        }
    }

    /// Registers the GDAL drivers and applies the configuration
    pub fn apply(&self) -> Result<()> {
        if !gdalinterop::initialize() {
            return Err(Error::UnsupportedCapability("No GDAL drivers could be registered".to_string()));
        }

        self.gdal_config.apply()?;
        Ok(())
    }
}
