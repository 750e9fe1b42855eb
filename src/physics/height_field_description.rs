use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{HeightFieldError, Result};
use crate::physics::trees::coarse_min_max::{CoarseMinMaxPyramid, MAXIMUM_RESOLUTION};

/// Default slack used by coarse tree rejection tests, in sample units.
pub const DEFAULT_HEIGHT_TOLERANCE: f32 = 1e-3;

/// Describes the grid of a height field shape. Sample `(x, z)` with height `h` sits at
/// `Vec3::new(x, h, z) * scale + offset` in shape space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeightFieldDescription {
    /// Number of samples along x, at least 2.
    pub x_res: i32,
    /// Number of samples along z, at least 2.
    pub z_res: i32,
    /// Scale from grid space to shape space. Components must be non-zero and may be negative.
    pub scale: Vec3,
    /// Shape space position of sample (0, 0) at height 0.
    pub offset: Vec3,
    /// `[min, max]` height in sample units used to clip rays while no coarse tree is present.
    /// Scanned from the sampler when absent.
    pub height_range: Option<[f32; 2]>,
    /// Slack applied to every coarse tree rejection test, in sample units.
    pub height_tolerance: f32,
    /// Coarseness of the coarse min/max tree to build when the shape is created.
    pub coarseness: Option<u32>,
}

impl Default for HeightFieldDescription {
    fn default() -> Self {
        Self {
            x_res: 2,
            z_res: 2,
            scale: Vec3::ONE,
            offset: Vec3::ZERO,
            height_range: None,
            height_tolerance: DEFAULT_HEIGHT_TOLERANCE,
            coarseness: None,
        }
    }
}

impl HeightFieldDescription {
    /// Builds a unit-scaled description of an `x_res` by `z_res` grid.
    #[inline]
    pub fn new(x_res: i32, z_res: i32) -> Self {
        Self {
            x_res,
            z_res,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    #[inline]
    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }

    #[inline]
    pub fn with_height_range(mut self, min: f32, max: f32) -> Self {
        self.height_range = Some([min, max]);
        self
    }

    #[inline]
    pub fn with_coarseness(mut self, coarseness: u32) -> Self {
        self.coarseness = Some(coarseness);
        self
    }

    /// Number of cells along x.
    #[inline]
    pub fn cells_x(&self) -> i32 {
        self.x_res - 1
    }

    /// Number of cells along z.
    #[inline]
    pub fn cells_z(&self) -> i32 {
        self.z_res - 1
    }

    /// Checks the description for values that would produce a degenerate shape.
    pub fn validate(&self) -> Result<()> {
        if self.x_res < 2 || self.z_res < 2 || self.x_res > MAXIMUM_RESOLUTION || self.z_res > MAXIMUM_RESOLUTION {
            return Err(HeightFieldError::invalid(format!(
                "grid resolution {}x{} must be within 2..={} per axis",
                self.x_res, self.z_res, MAXIMUM_RESOLUTION
            )));
        }
        if !self.scale.is_finite() || self.scale.cmpeq(Vec3::ZERO).any() {
            return Err(HeightFieldError::invalid(format!(
                "scale {} must be finite with non-zero components",
                self.scale
            )));
        }
        if !self.offset.is_finite() {
            return Err(HeightFieldError::invalid(format!("offset {} must be finite", self.offset)));
        }
        if !(self.height_tolerance >= 0.0 && self.height_tolerance.is_finite()) {
            return Err(HeightFieldError::invalid(format!(
                "height tolerance {} must be finite and non-negative",
                self.height_tolerance
            )));
        }
        if let Some([min, max]) = self.height_range {
            if !(min.is_finite() && max.is_finite() && min <= max) {
                return Err(HeightFieldError::invalid(format!(
                    "height range [{}, {}] must be finite and ordered",
                    min, max
                )));
            }
        }
        if let Some(coarseness) = self.coarseness {
            let coarseness = i32::try_from(coarseness)
                .map_err(|_| HeightFieldError::invalid(format!("coarseness {} is too large", coarseness)))?;
            CoarseMinMaxPyramid::validate(self.x_res, self.z_res, coarseness)?;
        }
        Ok(())
    }
}
