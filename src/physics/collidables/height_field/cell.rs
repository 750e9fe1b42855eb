use glam::Vec3;

use crate::physics::collidables::ray::HeightFieldHitKey;
use crate::physics::collidables::shape::IHeightSampler;
use crate::physics::collidables::triangle::Triangle;
use crate::utilities::math_helper;

/// Hit of a ray against the triangles of one cell, in grid space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellHit {
    /// Ray parameter of the hit.
    pub t: f32,
    /// Unit face normal in grid space, pointing up the height axis.
    pub normal: Vec3,
    /// Which of the two cell triangles was hit.
    pub triangle_index: i32,
}

/// The four corner heights of a grid cell plus its diagonal.
///
/// Corners are stored as `[h(x,z), h(x+1,z), h(x+1,z+1), h(x,z+1)]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightFieldCell {
    pub x: i32,
    pub z: i32,
    pub heights: [f32; 4],
    pub flip: bool,
}

impl HeightFieldCell {
    /// Reads the corners of cell (x, z). The cell must be inside the grid.
    /// `height_offset` is added to every corner.
    #[inline(always)]
    pub fn gather<S: IHeightSampler>(sampler: &S, x: i32, z: i32, height_offset: f32) -> Self {
        let heights = [
            sampler.height_at(x, z) + height_offset,
            sampler.height_at(x + 1, z) + height_offset,
            sampler.height_at(x + 1, z + 1) + height_offset,
            sampler.height_at(x, z + 1) + height_offset,
        ];
        debug_assert!(heights.iter().all(|h| h.is_finite()), "Height samples must be finite.");
        Self {
            x,
            z,
            heights,
            flip: sampler.triangle_flip(x, z),
        }
    }

    /// The two triangles of the cell in cell-local grid space (corner (x, z) at the origin),
    /// wound so their face normals point up.
    #[inline(always)]
    pub fn triangles(&self) -> [Triangle; 2] {
        let [h00, h10, h11, h01] = self.heights;
        let p00 = Vec3::new(0.0, h00, 0.0);
        let p10 = Vec3::new(1.0, h10, 0.0);
        let p11 = Vec3::new(1.0, h11, 1.0);
        let p01 = Vec3::new(0.0, h01, 1.0);
        if self.flip {
            [Triangle::new(p00, p10, p11), Triangle::new(p00, p11, p01)]
        } else {
            [Triangle::new(p00, p10, p01), Triangle::new(p10, p11, p01)]
        }
    }

    /// Lowest and highest corner.
    #[inline(always)]
    pub fn min_max(&self) -> (f32, f32) {
        let [a, b, c, d] = self.heights;
        (a.min(b).min(c.min(d)), a.max(b).max(c.max(d)))
    }

    /// Intersects the grid space ray `origin + t * direction` with both triangles and keeps the
    /// closer hit. Hits from below the surface are not reported.
    #[inline]
    pub fn intersect(&self, origin: Vec3, direction: Vec3) -> Option<CellHit> {
        let local_origin = origin - Vec3::new(self.x as f32, 0.0, self.z as f32);
        let [t0, t1] = self.triangles();
        let hit0 = t0.ray_test(local_origin, direction);
        let hit1 = t1.ray_test(local_origin, direction);
        match (hit0, hit1) {
            (Some((ta, na)), Some((tb, nb))) => Some(if tb < ta {
                CellHit { t: tb, normal: nb, triangle_index: 1 }
            } else {
                CellHit { t: ta, normal: na, triangle_index: 0 }
            }),
            (Some((t, normal)), None) => Some(CellHit { t, normal, triangle_index: 0 }),
            (None, Some((t, normal))) => Some(CellHit { t, normal, triangle_index: 1 }),
            (None, None) => None,
        }
    }

    /// Interpolated height, unit grid space normal and triangle index at the sub-cell position
    /// `(sub_x, sub_z)`, both in `[0, 1]`.
    pub fn height_and_normal_at(&self, sub_x: f32, sub_z: f32) -> (f32, Vec3, i32) {
        let [h00, h10, h11, h01] = self.heights;
        // Each triangle is a plane h = base + dx * sub_x + dz * sub_z.
        let (height, dx, dz, triangle_index) = if self.flip {
            if sub_x >= sub_z {
                let dx = h10 - h00;
                let dz = h11 - h10;
                (h00 + dx * sub_x + dz * sub_z, dx, dz, 0)
            } else {
                let dx = h11 - h01;
                let dz = h01 - h00;
                (h00 + dx * sub_x + dz * sub_z, dx, dz, 1)
            }
        } else if sub_x + sub_z <= 1.0 {
            let dx = h10 - h00;
            let dz = h01 - h00;
            (h00 + dx * sub_x + dz * sub_z, dx, dz, 0)
        } else {
            let dx = h11 - h01;
            let dz = h11 - h10;
            (h11 - dx * (1.0 - sub_x) - dz * (1.0 - sub_z), dx, dz, 1)
        };
        (height, Vec3::new(-dx, 1.0, -dz).normalize(), triangle_index)
    }
}

/// Gathers cell (x, z) and intersects the grid space ray `origin + t * direction` with it.
#[inline]
pub fn intersect_cell<S: IHeightSampler>(
    sampler: &S,
    x: i32,
    z: i32,
    origin: Vec3,
    direction: Vec3,
    height_offset: f32,
) -> Option<CellHit> {
    HeightFieldCell::gather(sampler, x, z, height_offset).intersect(origin, direction)
}

/// Height, unit grid space normal and key of the triangle under grid position (x, z).
/// Positions beyond the grid are clamped to the border cells.
pub fn surface_at<S: IHeightSampler>(
    sampler: &S,
    cells_x: i32,
    cells_z: i32,
    x: f32,
    z: f32,
    height_offset: f32,
) -> (f32, Vec3, HeightFieldHitKey) {
    let cell_x = math_helper::clamp(x.floor() as i32, 0, cells_x - 1);
    let cell_z = math_helper::clamp(z.floor() as i32, 0, cells_z - 1);
    let cell = HeightFieldCell::gather(sampler, cell_x, cell_z, height_offset);
    let (height, normal, triangle_index) = cell.height_and_normal_at(x - cell_x as f32, z - cell_z as f32);
    (height, normal, HeightFieldHitKey::new(cell_x, cell_z, triangle_index))
}
