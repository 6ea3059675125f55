use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{PixelRegion, Subsampling};

/// Affine transformation from pixel space to georeferenced space.
#[derive(Clone, Copy, PartialEq, Default)]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a new `GeoTransform` from the provided coefficients.
    ///
    /// The coefficients are in the order: [top left x, pixel width, rotation (0 if north is up), top left y, rotation (0 if north is up), pixel height].
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    /// Translates a pixel location to a point in georeferenced space.
    /// Location (0, 0) is the top left corner of the raster.
    pub fn apply(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        (x, y)
    }

    pub fn top_left(&self) -> (f64, f64) {
        (self.0[0], self.0[3])
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    /// The verical cell size
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    /// Returns the coefficients of the transformation.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// The transformation of a raster that was obtained by taking the provided region
    /// of this raster and keeping every n-th pixel of it.
    pub fn for_window(&self, region: &PixelRegion, subsampling: Subsampling) -> GeoTransform {
        let (x, y) = self.apply(region.x_off as f64, region.y_off as f64);
        let x_factor = f64::from(subsampling.x);
        let y_factor = f64::from(subsampling.y);

        GeoTransform([
            x,
            self.0[1] * x_factor,
            self.0[2] * y_factor,
            y,
            self.0[4] * x_factor,
            self.0[5] * y_factor,
        ])
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(topleft: ({}, {}), pixel_width: {}, pixel_height: {})",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y()
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0[..].abs_diff_eq(&other.0[..], epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0[..].relative_eq(&other.0[..], epsilon, max_relative)
    }
}
