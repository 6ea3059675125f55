use crate::ArrayDataType;

// Type requirements for the samples of a raster image
pub trait ArrayNum: bytemuck::Pod + num::NumCast + std::cmp::PartialOrd + std::fmt::Debug + Send + Sync {
    const TYPE: ArrayDataType;
}

macro_rules! impl_array_num {
    ($t:ty, $data_type:ident) => {
        impl ArrayNum for $t {
            const TYPE: ArrayDataType = ArrayDataType::$data_type;
        }
    };
}

impl_array_num!(i8, Int8);
impl_array_num!(u8, Uint8);
impl_array_num!(i16, Int16);
impl_array_num!(u16, Uint16);
impl_array_num!(i32, Int32);
impl_array_num!(u32, Uint32);
impl_array_num!(i64, Int64);
impl_array_num!(u64, Uint64);
impl_array_num!(f32, Float32);
impl_array_num!(f64, Float64);
