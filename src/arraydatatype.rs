use crate::Error;

/// Element type of the samples of a raster image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u8)]
pub enum ArrayDataType {
    Int8 = 0,
    Uint8 = 1,
    Int16 = 2,
    Uint16 = 3,
    Int32 = 4,
    Uint32 = 5,
    Int64 = 6,
    Uint64 = 7,
    Float32 = 8,
    Float64 = 9,
}

impl ArrayDataType {
    pub fn to_str(&self) -> &'static str {
        match self {
            Self::Int8 => "int8",
            Self::Uint8 => "uint8",
            Self::Int16 => "int16",
            Self::Uint16 => "uint16",
            Self::Int32 => "int32",
            Self::Uint32 => "uint32",
            Self::Int64 => "int64",
            Self::Uint64 => "uint64",
            Self::Float32 => "float32",
            Self::Float64 => "float64",
        }
    }

    /// Size of a single sample in bytes
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Int8 | Self::Uint8 => 1,
            Self::Int16 | Self::Uint16 => 2,
            Self::Int32 | Self::Uint32 | Self::Float32 => 4,
            Self::Int64 | Self::Uint64 | Self::Float64 => 8,
        }
    }
}

impl std::fmt::Display for ArrayDataType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.to_str())
    }
}

/// The sample types that can be transferred to the native raster engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleType {
    Uint8,
    Uint16,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    pub const fn bytes(&self) -> usize {
        match self {
            Self::Uint8 => 1,
            Self::Uint16 | Self::Int16 => 2,
            Self::Int32 | Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    pub const fn data_type(&self) -> ArrayDataType {
        match self {
            Self::Uint8 => ArrayDataType::Uint8,
            Self::Uint16 => ArrayDataType::Uint16,
            Self::Int16 => ArrayDataType::Int16,
            Self::Int32 => ArrayDataType::Int32,
            Self::Float32 => ArrayDataType::Float32,
            Self::Float64 => ArrayDataType::Float64,
        }
    }
}

impl TryFrom<ArrayDataType> for SampleType {
    type Error = Error;

    fn try_from(data_type: ArrayDataType) -> Result<Self, Self::Error> {
        match data_type {
            ArrayDataType::Uint8 => Ok(SampleType::Uint8),
            ArrayDataType::Uint16 => Ok(SampleType::Uint16),
            ArrayDataType::Int16 => Ok(SampleType::Int16),
            ArrayDataType::Int32 => Ok(SampleType::Int32),
            ArrayDataType::Float32 => Ok(SampleType::Float32),
            ArrayDataType::Float64 => Ok(SampleType::Float64),
            ArrayDataType::Int8 | ArrayDataType::Uint32 | ArrayDataType::Int64 | ArrayDataType::Uint64 => {
                Err(Error::UnsupportedSampleType(data_type))
            }
        }
    }
}

impl std::fmt::Display for SampleType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.data_type())
    }
}
