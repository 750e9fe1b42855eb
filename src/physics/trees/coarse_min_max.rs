use glam::Vec4;
use log::debug;

use crate::error::{HeightFieldError, Result};
use crate::physics::collidables::shape::IHeightSampler;
use crate::utilities::math_helper;

/// Largest supported grid resolution per axis, in samples.
pub const MAXIMUM_RESOLUTION: i32 = 16384;

/// Largest coarseness that can still produce a whole cell on a maximum size grid.
pub const MAXIMUM_COARSENESS: i32 = 14;

/// Min/max bounds of a 2x2 block of cells, packed into vector lanes.
///
/// Lanes are ordered (2x, 2z), (2x+1, 2z), (2x+1, 2z+1), (2x, 2z+1). A lane whose cell lies outside
/// the level holds the empty interval `[f32::MAX, -f32::MAX]`, so it never survives a range test
/// and never affects a reduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoarseMinMaxBlock {
    pub min: Vec4,
    pub max: Vec4,
}

impl CoarseMinMaxBlock {
    pub const EMPTY: CoarseMinMaxBlock = CoarseMinMaxBlock {
        min: Vec4::splat(f32::MAX),
        max: Vec4::splat(-f32::MAX),
    };

    /// Lane holding the cell with the given parity inside its block.
    #[inline(always)]
    pub fn lane(odd_x: bool, odd_z: bool) -> usize {
        match (odd_x, odd_z) {
            (false, false) => 0,
            (true, false) => 1,
            (true, true) => 2,
            (false, true) => 3,
        }
    }

    /// Bounds over every lane.
    #[inline(always)]
    pub fn reduce(&self) -> (f32, f32) {
        (self.min.min_element(), self.max.max_element())
    }
}

/// One level of the coarse tree.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseMinMaxLevel {
    /// Number of cells along x at this level.
    pub x_res: i32,
    /// Number of cells along z at this level.
    pub z_res: i32,
    /// Cell size in grid cells.
    pub cell_size: i32,
    blocks: Vec<CoarseMinMaxBlock>,
}

impl CoarseMinMaxLevel {
    fn new(x_res: i32, z_res: i32, cell_size: i32) -> Self {
        let block_count = math_helper::ceil_div(x_res, 2) as usize * math_helper::ceil_div(z_res, 2) as usize;
        Self {
            x_res,
            z_res,
            cell_size,
            blocks: vec![CoarseMinMaxBlock::EMPTY; block_count],
        }
    }

    #[inline(always)]
    pub fn block_x_res(&self) -> i32 {
        math_helper::ceil_div(self.x_res, 2)
    }

    #[inline(always)]
    pub fn block_z_res(&self) -> i32 {
        math_helper::ceil_div(self.z_res, 2)
    }

    /// Block at (x, z); the caller guarantees the coordinates are in range.
    #[inline(always)]
    pub fn block(&self, x: i32, z: i32) -> &CoarseMinMaxBlock {
        debug_assert!(x >= 0 && x < self.block_x_res() && z >= 0 && z < self.block_z_res());
        &self.blocks[(z * self.block_x_res() + x) as usize]
    }

    /// Bounds of cell (x, z); the caller guarantees the coordinates are in range.
    #[inline(always)]
    pub fn cell(&self, x: i32, z: i32) -> (f32, f32) {
        debug_assert!(x >= 0 && x < self.x_res && z >= 0 && z < self.z_res);
        let block = self.block(x >> 1, z >> 1);
        let lane = CoarseMinMaxBlock::lane(x & 1 == 1, z & 1 == 1);
        (block.min[lane], block.max[lane])
    }

    fn set_cell(&mut self, x: i32, z: i32, min: f32, max: f32) {
        let index = ((z >> 1) * self.block_x_res() + (x >> 1)) as usize;
        let lane = CoarseMinMaxBlock::lane(x & 1 == 1, z & 1 == 1);
        let block = &mut self.blocks[index];
        block.min[lane] = min;
        block.max[lane] = max;
    }
}

/// Conservative min/max height pyramid over a height grid, used to skip empty regions during
/// ray casts.
///
/// Level 0 is the coarsest, with cells `1 << coarseness` grid cells wide. Each following level
/// halves the cell size, down to level `coarseness` whose cells are the grid cells themselves.
/// Cells along the far edges may be partial; they only cover the samples that exist.
///
/// The tree is a snapshot: editing the sampler afterwards leaves it stale until it is rebuilt.
#[derive(Debug, Clone, PartialEq)]
pub struct CoarseMinMaxPyramid {
    coarseness: i32,
    levels: Vec<CoarseMinMaxLevel>,
    height_range: (f32, f32),
}

impl CoarseMinMaxPyramid {
    /// Checks that a grid of `x_res` by `z_res` samples can carry a tree of the given coarseness.
    pub fn validate(x_res: i32, z_res: i32, coarseness: i32) -> Result<()> {
        if x_res < 2 || z_res < 2 || x_res > MAXIMUM_RESOLUTION || z_res > MAXIMUM_RESOLUTION {
            return Err(HeightFieldError::invalid(format!(
                "grid resolution {}x{} must be within 2..={} per axis",
                x_res, z_res, MAXIMUM_RESOLUTION
            )));
        }
        if !(0..=MAXIMUM_COARSENESS).contains(&coarseness) {
            return Err(HeightFieldError::invalid(format!(
                "coarseness {} must be within 0..={}",
                coarseness, MAXIMUM_COARSENESS
            )));
        }
        let widest = (x_res - 1).max(z_res - 1);
        if widest >> coarseness == 0 {
            return Err(HeightFieldError::invalid(format!(
                "coarseness {} gives {}-cell wide tree cells, larger than the {}-cell wide grid",
                coarseness,
                1 << coarseness,
                widest
            )));
        }
        Ok(())
    }

    /// Builds the tree by reading every sample once.
    pub fn build<S: IHeightSampler>(sampler: &S, x_res: i32, z_res: i32, coarseness: i32) -> Result<Self> {
        Self::validate(x_res, z_res, coarseness)?;
        let cells_x = x_res - 1;
        let cells_z = z_res - 1;

        let mut levels: Vec<CoarseMinMaxLevel> = (0..=coarseness)
            .map(|level| {
                let cell_size = 1 << (coarseness - level);
                CoarseMinMaxLevel::new(
                    math_helper::ceil_div(cells_x, cell_size),
                    math_helper::ceil_div(cells_z, cell_size),
                    cell_size,
                )
            })
            .collect();

        // Finest level: the corners of every grid cell. Each row of samples is read once and
        // shared with the next row of cells.
        let finest = &mut levels[coarseness as usize];
        let mut previous_row: Vec<f32> = (0..x_res).map(|x| sampler.height_at(x, 0)).collect();
        let mut current_row = vec![0.0f32; x_res as usize];
        for z in 0..cells_z {
            for (x, height) in current_row.iter_mut().enumerate() {
                *height = sampler.height_at(x as i32, z + 1);
            }
            for x in 0..cells_x {
                let i = x as usize;
                let a = previous_row[i];
                let b = previous_row[i + 1];
                let c = current_row[i + 1];
                let d = current_row[i];
                finest.set_cell(x, z, a.min(b).min(c.min(d)), a.max(b).max(c.max(d)));
            }
            std::mem::swap(&mut previous_row, &mut current_row);
        }

        // Coarser levels: each cell is the reduction of the block of its four children.
        for level in (0..coarseness as usize).rev() {
            let (coarser, finer) = levels.split_at_mut(level + 1);
            let target = &mut coarser[level];
            let source = &finer[0];
            for z in 0..target.z_res {
                for x in 0..target.x_res {
                    let (min, max) = source.block(x, z).reduce();
                    target.set_cell(x, z, min, max);
                }
            }
        }

        let height_range = levels[0]
            .blocks
            .iter()
            .fold((f32::MAX, -f32::MAX), |(lo, hi), block| {
                let (min, max) = block.reduce();
                (lo.min(min), hi.max(max))
            });
        let pyramid = Self {
            coarseness,
            levels,
            height_range,
        };
        debug!(
            "built coarse min/max tree over {}x{} samples: coarseness {}, {} levels, root {}x{}",
            x_res,
            z_res,
            coarseness,
            pyramid.level_count(),
            pyramid.levels[0].x_res,
            pyramid.levels[0].z_res
        );
        Ok(pyramid)
    }

    #[inline]
    pub fn coarseness(&self) -> i32 {
        self.coarseness
    }

    #[inline]
    pub fn level_count(&self) -> i32 {
        self.levels.len() as i32
    }

    #[inline]
    pub fn levels(&self) -> &[CoarseMinMaxLevel] {
        &self.levels
    }

    /// Finest level index; its cells are grid cells.
    #[inline]
    pub fn finest_level(&self) -> i32 {
        self.coarseness
    }

    /// Cells per axis at the given level.
    pub fn level_resolution(&self, level: i32) -> Result<(i32, i32)> {
        self.level(level)
            .map(|l| (l.x_res, l.z_res))
            .ok_or(HeightFieldError::OutOfBounds { level, x: 0, z: 0 })
    }

    #[inline]
    pub(crate) fn level(&self, level: i32) -> Option<&CoarseMinMaxLevel> {
        if level < 0 {
            return None;
        }
        self.levels.get(level as usize)
    }

    /// Returns the minimum and maximum heights of the four cells (2x, 2z), (2x+1, 2z),
    /// (2x+1, 2z+1) and (2x, 2z+1) of `level`, packed into the lanes of the two vectors.
    /// Think of `level` as a mipmap level: higher levels are finer.
    /// Lanes of cells beyond the grid edge hold `min = f32::MAX, max = -f32::MAX`.
    pub fn query_level(&self, level: i32, x: i32, z: i32) -> Result<(Vec4, Vec4)> {
        let out_of_bounds = HeightFieldError::OutOfBounds { level, x, z };
        let l = self.level(level).ok_or_else(|| out_of_bounds.clone())?;
        if x < 0 || z < 0 || x >= l.block_x_res() || z >= l.block_z_res() {
            return Err(out_of_bounds);
        }
        let block = l.block(x, z);
        Ok((block.min, block.max))
    }

    /// Bounds of a single cell of `level`.
    pub fn cell_min_max(&self, level: i32, x: i32, z: i32) -> Result<(f32, f32)> {
        let out_of_bounds = HeightFieldError::OutOfBounds { level, x, z };
        let l = self.level(level).ok_or_else(|| out_of_bounds.clone())?;
        if x < 0 || z < 0 || x >= l.x_res || z >= l.z_res {
            return Err(out_of_bounds);
        }
        Ok(l.cell(x, z))
    }

    /// Lowest and highest sample of the whole grid.
    #[inline]
    pub fn height_range(&self) -> (f32, f32) {
        self.height_range
    }
}
