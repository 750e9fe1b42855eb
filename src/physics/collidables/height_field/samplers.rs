use serde::{Deserialize, Serialize};

use crate::error::{HeightFieldError, Result};
use crate::physics::collidables::shape::IHeightSampler;

/// How the stock samplers pick the diagonal of each cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriangleFlipPolicy {
    /// Every cell uses the same diagonal.
    Uniform(bool),
    /// Alternates the diagonal like a checkerboard; cell (0, 0) is flipped.
    Checkerboard,
}

impl Default for TriangleFlipPolicy {
    fn default() -> Self {
        Self::Uniform(false)
    }
}

impl TriangleFlipPolicy {
    #[inline(always)]
    pub fn triangle_flip(&self, x: i32, z: i32) -> bool {
        match *self {
            Self::Uniform(flip) => flip,
            Self::Checkerboard => (x + z) & 1 == 0,
        }
    }
}

fn validate_sample_count(x_res: i32, z_res: i32, len: usize) -> Result<()> {
    if x_res <= 0 || z_res <= 0 {
        return Err(HeightFieldError::invalid(format!(
            "sampler resolution {}x{} must be positive",
            x_res, z_res
        )));
    }
    let expected = x_res as usize * z_res as usize;
    if len != expected {
        return Err(HeightFieldError::invalid(format!(
            "expected {} samples for a {}x{} grid, got {}",
            expected, x_res, z_res, len
        )));
    }
    Ok(())
}

/// Sampler storing one `f32` per sample in x-major rows: `index = x + z * x_res`.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageHeightSampler {
    heights: Vec<f32>,
    x_res: i32,
    z_res: i32,
    flip: TriangleFlipPolicy,
}

impl StorageHeightSampler {
    /// Wraps existing samples.
    pub fn new(heights: Vec<f32>, x_res: i32, z_res: i32, flip: TriangleFlipPolicy) -> Result<Self> {
        validate_sample_count(x_res, z_res, heights.len())?;
        debug_assert!(heights.iter().all(|h| h.is_finite()), "Height samples must be finite.");
        Ok(Self {
            heights,
            x_res,
            z_res,
            flip,
        })
    }

    /// Creates a flat grid at the given height.
    pub fn flat(x_res: i32, z_res: i32, height: f32, flip: TriangleFlipPolicy) -> Result<Self> {
        let count = x_res.max(0) as usize * z_res.max(0) as usize;
        Self::new(vec![height; count], x_res, z_res, flip)
    }

    /// Creates a grid by evaluating `f(x, z)` for every sample.
    pub fn from_fn<F>(x_res: i32, z_res: i32, flip: TriangleFlipPolicy, mut f: F) -> Result<Self>
    where
        F: FnMut(i32, i32) -> f32,
    {
        let mut heights = Vec::with_capacity(x_res.max(0) as usize * z_res.max(0) as usize);
        for z in 0..z_res {
            for x in 0..x_res {
                heights.push(f(x, z));
            }
        }
        Self::new(heights, x_res, z_res, flip)
    }

    #[inline]
    pub fn x_res(&self) -> i32 {
        self.x_res
    }

    #[inline]
    pub fn z_res(&self) -> i32 {
        self.z_res
    }

    #[inline]
    pub fn heights(&self) -> &[f32] {
        &self.heights
    }

    /// Overwrites one sample. Any coarse tree built over this sampler is stale afterwards.
    pub fn set_height(&mut self, x: i32, z: i32, height: f32) {
        debug_assert!(height.is_finite(), "Height samples must be finite.");
        if x >= 0 && x < self.x_res && z >= 0 && z < self.z_res {
            self.heights[(x + z * self.x_res) as usize] = height;
        }
    }

    pub fn set_triangle_flip_policy(&mut self, flip: TriangleFlipPolicy) {
        self.flip = flip;
    }
}

impl IHeightSampler for StorageHeightSampler {
    #[inline(always)]
    fn height_at(&self, x: i32, z: i32) -> f32 {
        debug_assert!(x >= 0 && x < self.x_res && z >= 0 && z < self.z_res);
        self.heights[(x + z * self.x_res) as usize]
    }

    #[inline(always)]
    fn triangle_flip(&self, x: i32, z: i32) -> bool {
        self.flip.triangle_flip(x, z)
    }
}

/// Sampler storing one `u16` per sample; heights are `quantized * scale + offset`.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedHeightSampler {
    quantized: Vec<u16>,
    x_res: i32,
    z_res: i32,
    scale: f32,
    offset: f32,
    flip: TriangleFlipPolicy,
}

impl CompressedHeightSampler {
    /// Wraps already quantized samples.
    pub fn new(
        quantized: Vec<u16>,
        x_res: i32,
        z_res: i32,
        scale: f32,
        offset: f32,
        flip: TriangleFlipPolicy,
    ) -> Result<Self> {
        validate_sample_count(x_res, z_res, quantized.len())?;
        if !scale.is_finite() || !offset.is_finite() {
            return Err(HeightFieldError::invalid("compressed height scale and offset must be finite"));
        }
        Ok(Self {
            quantized,
            x_res,
            z_res,
            scale,
            offset,
            flip,
        })
    }

    /// Quantizes `f32` samples into the full `u16` range spanned by their min and max.
    pub fn from_heights(heights: &[f32], x_res: i32, z_res: i32, flip: TriangleFlipPolicy) -> Result<Self> {
        validate_sample_count(x_res, z_res, heights.len())?;
        let (min, max) = heights
            .iter()
            .fold((f32::MAX, -f32::MAX), |(lo, hi), &h| (lo.min(h), hi.max(h)));
        let scale = if max > min { (max - min) / u16::MAX as f32 } else { 1.0 };
        let quantized = heights
            .iter()
            .map(|&h| (((h - min) / scale).round()).clamp(0.0, u16::MAX as f32) as u16)
            .collect();
        Self::new(quantized, x_res, z_res, scale, min, flip)
    }

    #[inline]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[inline]
    pub fn offset(&self) -> f32 {
        self.offset
    }

    /// Overwrites one quantized sample. Any coarse tree built over this sampler is stale afterwards.
    pub fn set_quantized(&mut self, x: i32, z: i32, value: u16) {
        if x >= 0 && x < self.x_res && z >= 0 && z < self.z_res {
            self.quantized[(x + z * self.x_res) as usize] = value;
        }
    }
}

impl IHeightSampler for CompressedHeightSampler {
    #[inline(always)]
    fn height_at(&self, x: i32, z: i32) -> f32 {
        debug_assert!(x >= 0 && x < self.x_res && z >= 0 && z < self.z_res);
        self.quantized[(x + z * self.x_res) as usize] as f32 * self.scale + self.offset
    }

    #[inline(always)]
    fn triangle_flip(&self, x: i32, z: i32) -> bool {
        self.flip.triangle_flip(x, z)
    }
}
