use std::path::Path;

/// Raster file formats with a known native driver
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RasterFileFormat {
    Memory,
    ArcAscii,
    GeoTiff,
    Gif,
    Png,
    PcRaster,
    Netcdf,
    Vrt,
    Unknown,
}

impl RasterFileFormat {
    /// Given a file path, guess the raster type based on the file extension
    pub fn guess_from_path(file_path: impl AsRef<Path>) -> RasterFileFormat {
        let ext = file_path
            .as_ref()
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase());

        match ext.as_deref() {
            Some("asc") => RasterFileFormat::ArcAscii,
            Some("tiff" | "tif") => RasterFileFormat::GeoTiff,
            Some("gif") => RasterFileFormat::Gif,
            Some("png") => RasterFileFormat::Png,
            Some("map") => RasterFileFormat::PcRaster,
            Some("nc") => RasterFileFormat::Netcdf,
            Some("vrt") => RasterFileFormat::Vrt,
            _ => RasterFileFormat::Unknown,
        }
    }

    /// The name of the native driver that handles the format
    pub fn gdal_driver_name(&self) -> &'static str {
        match self {
            RasterFileFormat::Memory => "MEM",
            RasterFileFormat::ArcAscii => "AAIGrid",
            RasterFileFormat::GeoTiff => "GTiff",
            RasterFileFormat::Gif => "GIF",
            RasterFileFormat::Png => "PNG",
            RasterFileFormat::PcRaster => "PCRaster",
            RasterFileFormat::Netcdf => "netCDF",
            RasterFileFormat::Vrt => "VRT",
            RasterFileFormat::Unknown => "Unknown",
        }
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum TiffChunkType {
    #[default]
    Striped,
    Tiled,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Compression {
    Lzw,
    Zstd,
    Deflate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Predictor {
    Horizontal,
    FloatingPoint,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoTiffWriteOptions {
    /// data layout of the raster (in tiles or strips)
    pub chunk_type: TiffChunkType,
    /// The compression type to use for writing the raster
    pub compression: Option<Compression>,
    /// The predictor selection to use for writing the raster (only relevant when compression is used)
    pub predictor: Option<Predictor>,
    /// Sparse files have 0 tile/strip offsets for blocks that contain only nodata and save space
    pub sparse_ok: bool,
}

impl GeoTiffWriteOptions {
    /// The GTiff driver creation options
    pub fn to_creation_options(&self) -> Vec<String> {
        vec![
            format!(
                "TILED={}",
                match self.chunk_type {
                    TiffChunkType::Tiled => "YES",
                    TiffChunkType::Striped => "NO",
                }
            ),
            format!(
                "COMPRESS={}",
                match self.compression {
                    Some(Compression::Lzw) => "LZW",
                    Some(Compression::Zstd) => "ZSTD",
                    Some(Compression::Deflate) => "DEFLATE",
                    None => "NONE",
                }
            ),
            format!(
                "PREDICTOR={}",
                match self.predictor {
                    None => "1",
                    Some(Predictor::Horizontal) => "2",
                    Some(Predictor::FloatingPoint) => "3",
                }
            ),
            format!("SPARSE_OK={}", if self.sparse_ok { "TRUE" } else { "FALSE" }),
        ]
    }
}
