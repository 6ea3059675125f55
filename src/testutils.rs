use crate::{ArrayNum, ImageBuffer, RasterSize, Result};

pub fn number_cast<T: ArrayNum>(val: f64) -> T {
    num::NumCast::from(val).expect("F64 could not be converted to the specified type")
}

/// Image with varying sample values that fit in every writable sample type
pub fn create_test_image<T: ArrayNum>(size: RasterSize, band_count: usize) -> Result<ImageBuffer> {
    ImageBuffer::from_fn(size, band_count, |band, row, col| {
        number_cast::<T>(((band * 31 + row * size.cols + col) % 120) as f64)
    })
}
