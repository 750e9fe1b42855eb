use glam::{Vec2, Vec3};
use log::trace;

use super::coarse_min_max::{CoarseMinMaxPyramid, MAXIMUM_COARSENESS};
use crate::physics::collidables::height_field::cell::{intersect_cell, surface_at};
use crate::physics::collidables::ray::{HeightFieldHitKey, HeightFieldRayHit, RayCastControl};
use crate::physics::collidables::shape::{IHeightSampler, IRayHitCollector};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::math_helper;

/// Hits within this fraction of the previously reported hit are the same crossing seen from a
/// neighbouring cell.
const DUPLICATE_HIT_EPSILON: f32 = 1e-6;

/// Rays whose horizontal travel is at most this share of their vertical travel are tested as a column.
const NEAR_VERTICAL_RATIO: f32 = 1e-4;

/// Every level of the coarse tree leaves at most two pending siblings on the stack.
pub const TRAVERSAL_STACK_CAPACITY: usize = 2 * (MAXIMUM_COARSENESS as usize + 1) + 2;

/// Ray in grid space. Fractions along it match fractions along the shape space segment it was
/// built from, since the grid transform is affine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRay {
    pub origin: Vec3,
    pub direction: Vec3,
    pub inverse_direction: Vec3,
}

impl GridRay {
    #[inline(always)]
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self {
            origin,
            direction,
            inverse_direction: math_helper::clamped_reciprocal(direction),
        }
    }

    /// Maps the shape space segment `from -> to` into grid space.
    #[inline(always)]
    pub fn from_segment(from: Vec3, to: Vec3, offset: Vec3, inverse_scale: Vec3) -> Self {
        Self::new((from - offset) * inverse_scale, (to - from) * inverse_scale)
    }

    #[inline(always)]
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Fraction at which the ray crosses the plane `x = value`.
    #[inline(always)]
    pub fn crossing_x(&self, value: f32) -> f32 {
        (value - self.origin.x) * self.inverse_direction.x
    }

    /// Fraction at which the ray crosses the plane `z = value`.
    #[inline(always)]
    pub fn crossing_z(&self, value: f32) -> f32 {
        (value - self.origin.z) * self.inverse_direction.z
    }
}

/// Visits the cells of a `res_x` by `res_z` grid of `cell_size` wide cells that the ray crosses
/// over `[t_enter, t_exit]`, in order of increasing fraction. Each visited cell shares an edge with
/// the previous one. `visit` receives the cell and its fraction interval and returns false to end
/// the walk.
pub fn for_each_cell_on_ray<F>(
    ray: &GridRay,
    cell_size: i32,
    res_x: i32,
    res_z: i32,
    t_enter: f32,
    t_exit: f32,
    mut visit: F,
) where
    F: FnMut(i32, i32, f32, f32) -> bool,
{
    debug_assert!(cell_size > 0 && res_x > 0 && res_z > 0);
    let size = cell_size as f32;
    let start = ray.point_at(t_enter);
    let mut x = math_helper::clamp((start.x / size).floor() as i32, 0, res_x - 1);
    let mut z = math_helper::clamp((start.z / size).floor() as i32, 0, res_z - 1);
    let step_x = if ray.direction.x > 0.0 {
        1
    } else if ray.direction.x < 0.0 {
        -1
    } else {
        0
    };
    let step_z = if ray.direction.z > 0.0 {
        1
    } else if ray.direction.z < 0.0 {
        -1
    } else {
        0
    };

    let mut t = t_enter;
    loop {
        // Boundaries are measured from the origin every step so errors do not accumulate.
        let t_next_x = if step_x != 0 {
            ray.crossing_x((x + (step_x > 0) as i32) as f32 * size)
        } else {
            f32::MAX
        };
        let t_next_z = if step_z != 0 {
            ray.crossing_z((z + (step_z > 0) as i32) as f32 * size)
        } else {
            f32::MAX
        };
        let cell_exit = t_next_x.min(t_next_z).min(t_exit).max(t);
        if !visit(x, z, t, cell_exit) || cell_exit >= t_exit {
            return;
        }
        if t_next_x <= t_next_z {
            x += step_x;
        } else {
            z += step_z;
        }
        if x < 0 || x >= res_x || z < 0 || z >= res_z {
            return;
        }
        t = cell_exit;
    }
}

/// Forwards hits to a collector, dropping duplicates and hits beyond the maximum fraction.
struct HitReporter<'c, C: IRayHitCollector> {
    collector: &'c mut C,
    maximum_fraction: f32,
    last_reported: f32,
}

impl<'c, C: IRayHitCollector> HitReporter<'c, C> {
    fn new(collector: &'c mut C) -> Self {
        Self {
            collector,
            maximum_fraction: 1.0,
            last_reported: -1.0,
        }
    }

    /// Returns false once the collector asks to stop.
    #[inline]
    fn report(&mut self, fraction: f32, normal: Vec3, key: HeightFieldHitKey) -> bool {
        if fraction < 0.0 || fraction > self.maximum_fraction || fraction <= self.last_reported + DUPLICATE_HIT_EPSILON {
            return true;
        }
        self.last_reported = fraction;
        let hit = HeightFieldRayHit { fraction, normal, key };
        self.collector.on_ray_hit(&hit, &mut self.maximum_fraction) == RayCastControl::Continue
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct TraversalEntry {
    level: i32,
    x: i32,
    z: i32,
    t_enter: f32,
    t_exit: f32,
}

/// Walks a height grid along a ray, reporting every surface crossing to a collector in order of
/// increasing fraction.
///
/// With a coarse tree the walk steps over the coarsest level and descends into a coarse cell only
/// when the ray's height span over the cell overlaps the cell's height bounds. Without one every
/// crossed grid cell is tested.
pub struct HeightFieldRayCaster<'a, S: IHeightSampler> {
    sampler: &'a S,
    pyramid: Option<&'a CoarseMinMaxPyramid>,
    cells_x: i32,
    cells_z: i32,
    inverse_scale: Vec3,
    height_range: (f32, f32),
    height_tolerance: f32,
    height_offset: f32,
}

impl<'a, S: IHeightSampler> HeightFieldRayCaster<'a, S> {
    /// Creates a caster over a grid of `cells_x` by `cells_z` cells. `height_range` is the sample
    /// range used to clip rays when no coarse tree is attached.
    pub fn new(sampler: &'a S, cells_x: i32, cells_z: i32, inverse_scale: Vec3, height_range: (f32, f32)) -> Self {
        debug_assert!(cells_x > 0 && cells_z > 0);
        Self {
            sampler,
            pyramid: None,
            cells_x,
            cells_z,
            inverse_scale,
            height_range,
            height_tolerance: 0.0,
            height_offset: 0.0,
        }
    }

    /// Attaches a coarse tree. Its root bounds replace the clipping height range.
    pub fn with_pyramid(mut self, pyramid: Option<&'a CoarseMinMaxPyramid>) -> Self {
        if let Some(pyramid) = pyramid {
            self.height_range = pyramid.height_range();
        }
        self.pyramid = pyramid;
        self
    }

    pub fn with_height_tolerance(mut self, height_tolerance: f32) -> Self {
        debug_assert!(height_tolerance >= 0.0);
        self.height_tolerance = height_tolerance;
        self
    }

    /// Raises the surface by `height_offset` sample units, used by sphere casts.
    pub fn with_height_offset(mut self, height_offset: f32) -> Self {
        self.height_offset = height_offset;
        self
    }

    #[inline(always)]
    fn shape_normal(&self, grid_normal: Vec3) -> Vec3 {
        (grid_normal * self.inverse_scale).normalize()
    }

    /// Casts the ray, reporting hits to `collector`. `penetration` holds the allowed extra
    /// penetration when penetrating start positions should be reported.
    pub fn cast<C: IRayHitCollector>(&self, ray: &GridRay, penetration: Option<f32>, collector: &mut C) {
        if ray.direction == Vec3::ZERO {
            return;
        }
        let cells_x = self.cells_x as f32;
        let cells_z = self.cells_z as f32;
        let footprint = BoundingBox::new(Vec3::new(0.0, -f32::MAX, 0.0), Vec3::new(cells_x, f32::MAX, cells_z));
        let Some((_, footprint_exit)) = footprint.clip_segment(ray.origin, ray.direction, 0.0, 1.0) else {
            return;
        };

        let mut reporter = HitReporter::new(collector);
        if let Some(max_extra_penetration) = penetration {
            if !self.report_penetrating_start(ray, footprint_exit, max_extra_penetration, &mut reporter) {
                return;
            }
        }

        let (min_height, max_height) = self.height_range;
        let bounds = BoundingBox::new(
            Vec3::new(0.0, min_height + self.height_offset - self.height_tolerance, 0.0),
            Vec3::new(cells_x, max_height + self.height_offset + self.height_tolerance, cells_z),
        );
        let Some((t_enter, t_exit)) = bounds.clip_segment(ray.origin, ray.direction, 0.0, 1.0) else {
            return;
        };

        if let Some((x_cells, z_cells)) = self.column_cells(ray, t_enter, t_exit) {
            trace!("height field ray cast over [{}, {}]: column of cells {:?} x {:?}", t_enter, t_exit, x_cells, z_cells);
            self.cast_column(ray, x_cells, z_cells, &mut reporter);
        } else if let Some(pyramid) = self.pyramid {
            trace!("height field ray cast over [{}, {}]: coarse walk", t_enter, t_exit);
            self.walk_pyramid(pyramid, ray, t_enter, t_exit, &mut reporter);
        } else {
            trace!("height field ray cast over [{}, {}]: cell walk", t_enter, t_exit);
            for_each_cell_on_ray(ray, 1, self.cells_x, self.cells_z, t_enter, t_exit, |x, z, t, _| {
                t <= reporter.maximum_fraction && self.test_cell(ray, x, z, &mut reporter)
            });
        }
    }

    /// Reports a fraction zero hit if the ray starts under the surface and gets deeper than its
    /// start by more than `max_extra_penetration` before leaving the grid.
    fn report_penetrating_start<C: IRayHitCollector>(
        &self,
        ray: &GridRay,
        footprint_exit: f32,
        max_extra_penetration: f32,
        reporter: &mut HitReporter<C>,
    ) -> bool {
        let start = ray.origin;
        if start.x < 0.0 || start.z < 0.0 || start.x > self.cells_x as f32 || start.z > self.cells_z as f32 {
            return true;
        }
        let (start_height, normal, key) =
            surface_at(self.sampler, self.cells_x, self.cells_z, start.x, start.z, self.height_offset);
        let start_depth = start_height - start.y;
        if start_depth <= 0.0 {
            return true;
        }
        let end = ray.point_at(footprint_exit);
        let (end_height, _, _) = surface_at(self.sampler, self.cells_x, self.cells_z, end.x, end.z, self.height_offset);
        let end_depth = end_height - end.y;
        if end_depth - start_depth > max_extra_penetration {
            reporter.report(0.0, self.shape_normal(normal), key)
        } else {
            true
        }
    }

    /// Returns the cell ranges under a near vertical ray, if it stays within a 2x2 block of cells.
    fn column_cells(&self, ray: &GridRay, t_enter: f32, t_exit: f32) -> Option<((i32, i32), (i32, i32))> {
        let a = ray.point_at(t_enter);
        let b = ray.point_at(t_exit);
        let horizontal = Vec2::new(b.x - a.x, b.z - a.z).length();
        if horizontal > NEAR_VERTICAL_RATIO * (b.y - a.y).abs() {
            return None;
        }
        let cell_range = |lo: f32, hi: f32, cells: i32| {
            (
                math_helper::clamp(lo.floor() as i32, 0, cells - 1),
                math_helper::clamp(hi.floor() as i32, 0, cells - 1),
            )
        };
        let x_cells = cell_range(a.x.min(b.x), a.x.max(b.x), self.cells_x);
        let z_cells = cell_range(a.z.min(b.z), a.z.max(b.z), self.cells_z);
        if x_cells.1 - x_cells.0 > 1 || z_cells.1 - z_cells.0 > 1 {
            return None;
        }
        Some((x_cells, z_cells))
    }

    fn cast_column<C: IRayHitCollector>(
        &self,
        ray: &GridRay,
        x_cells: (i32, i32),
        z_cells: (i32, i32),
        reporter: &mut HitReporter<C>,
    ) {
        let mut hits = [(0.0f32, Vec3::ZERO, HeightFieldHitKey::new(0, 0, 0)); 4];
        let mut count = 0;
        for z in z_cells.0..=z_cells.1 {
            for x in x_cells.0..=x_cells.1 {
                if let Some(hit) = intersect_cell(self.sampler, x, z, ray.origin, ray.direction, self.height_offset) {
                    hits[count] = (hit.t, hit.normal, HeightFieldHitKey::new(x, z, hit.triangle_index));
                    count += 1;
                }
            }
        }
        let hits = &mut hits[..count];
        hits.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
        for &(t, normal, key) in hits.iter() {
            if !reporter.report(t, self.shape_normal(normal), key) {
                return;
            }
        }
    }

    #[inline]
    fn test_cell<C: IRayHitCollector>(&self, ray: &GridRay, x: i32, z: i32, reporter: &mut HitReporter<C>) -> bool {
        match intersect_cell(self.sampler, x, z, ray.origin, ray.direction, self.height_offset) {
            Some(hit) => reporter.report(
                hit.t,
                self.shape_normal(hit.normal),
                HeightFieldHitKey::new(x, z, hit.triangle_index),
            ),
            None => true,
        }
    }

    /// True if the ray's height span over `[t_enter, t_exit]` can touch bounds `[min, max]`.
    #[inline(always)]
    fn may_intersect(&self, ray: &GridRay, t_enter: f32, t_exit: f32, min: f32, max: f32) -> bool {
        let y0 = ray.origin.y + ray.direction.y * t_enter;
        let y1 = ray.origin.y + ray.direction.y * t_exit;
        y0.max(y1) >= min + self.height_offset - self.height_tolerance
            && y0.min(y1) <= max + self.height_offset + self.height_tolerance
    }

    fn walk_pyramid<C: IRayHitCollector>(
        &self,
        pyramid: &CoarseMinMaxPyramid,
        ray: &GridRay,
        t_enter: f32,
        t_exit: f32,
        reporter: &mut HitReporter<C>,
    ) {
        let root = &pyramid.levels()[0];
        let mut stack = [TraversalEntry::default(); TRAVERSAL_STACK_CAPACITY];
        for_each_cell_on_ray(ray, root.cell_size, root.x_res, root.z_res, t_enter, t_exit, |x, z, t0, t1| {
            let entry = TraversalEntry {
                level: 0,
                x,
                z,
                t_enter: t0,
                t_exit: t1,
            };
            t0 <= reporter.maximum_fraction && self.traverse_coarse_cell(pyramid, ray, entry, &mut stack, reporter)
        });
    }

    /// Descends into one coarsest-level cell, visiting surviving children in ray order.
    /// Returns false once the collector asks to stop.
    fn traverse_coarse_cell<C: IRayHitCollector>(
        &self,
        pyramid: &CoarseMinMaxPyramid,
        ray: &GridRay,
        root: TraversalEntry,
        stack: &mut [TraversalEntry; TRAVERSAL_STACK_CAPACITY],
        reporter: &mut HitReporter<C>,
    ) -> bool {
        let levels = pyramid.levels();
        let finest = pyramid.finest_level();
        stack[0] = root;
        let mut stack_end = 1;
        while stack_end > 0 {
            stack_end -= 1;
            let entry = stack[stack_end];
            // Entries pop in increasing fraction, so everything left is beyond the limit too.
            if entry.t_enter > reporter.maximum_fraction {
                return true;
            }
            let level = &levels[entry.level as usize];
            let (min, max) = level.cell(entry.x, entry.z);
            if !self.may_intersect(ray, entry.t_enter, entry.t_exit, min, max) {
                continue;
            }
            if entry.level == finest {
                if !self.test_cell(ray, entry.x, entry.z, reporter) {
                    return false;
                }
                continue;
            }

            let child_level = &levels[entry.level as usize + 1];
            let child_size = child_level.cell_size as f32;
            let mid_x = (2 * entry.x + 1) as f32 * child_size;
            let mid_z = (2 * entry.z + 1) as f32 * child_size;
            let mut bounds = [entry.t_enter, entry.t_exit, entry.t_exit, entry.t_exit];
            let mut bound_count = 1;
            for split in [ray.crossing_x(mid_x), ray.crossing_z(mid_z)] {
                if split > entry.t_enter && split < entry.t_exit {
                    bounds[bound_count] = split;
                    bound_count += 1;
                }
            }
            if bound_count == 3 && bounds[2] < bounds[1] {
                bounds.swap(1, 2);
            }
            bounds[bound_count] = entry.t_exit;

            // Push in reverse so the earliest segment pops first.
            for segment in (0..bound_count).rev() {
                let t0 = bounds[segment];
                let t1 = bounds[segment + 1];
                let midpoint = ray.point_at(0.5 * (t0 + t1));
                // A ray lying in the far boundary plane classifies past the last child.
                let x = (2 * entry.x + (midpoint.x >= mid_x) as i32).min(child_level.x_res - 1);
                let z = (2 * entry.z + (midpoint.z >= mid_z) as i32).min(child_level.z_res - 1);
                debug_assert!(stack_end < TRAVERSAL_STACK_CAPACITY, "Fixed size stack overflow.");
                stack[stack_end] = TraversalEntry {
                    level: entry.level + 1,
                    x,
                    z,
                    t_enter: t0,
                    t_exit: t1,
                };
                stack_end += 1;
            }
        }
        true
    }
}
