pub mod cell;
pub mod samplers;

use std::sync::{Arc, PoisonError};

use crossbeam_utils::sync::ShardedLock;
use glam::{Vec3, Vec4};
use log::{debug, warn};

use self::cell::{surface_at, HeightFieldCell};
use super::ray::{HeightFieldHitKey, HeightFieldRayCastInput, HeightFieldRayHit, HeightFieldSphereCastInput};
use super::shape::{IHeightSampler, IRayHitCollector};
use crate::error::{HeightFieldError, Result};
use crate::physics::collision_detection::ray_hit_collectors::ClosestHitCollector;
use crate::physics::height_field_description::HeightFieldDescription;
use crate::physics::trees::coarse_min_max::CoarseMinMaxPyramid;
use crate::physics::trees::height_field_ray_cast::{GridRay, HeightFieldRayCaster};
use crate::utilities::bounding_box::BoundingBox;
use crate::utilities::math_helper;

/// Sphere passed to [`HeightField::collide_spheres`], in shape space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    #[inline]
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }
}

/// Result of colliding one sphere with the surface.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SphereCollision {
    /// Distance from the sphere surface to the triangle plane below the centre, along the surface
    /// normal. Negative when penetrating, `f32::MAX` when the centre is beyond the grid.
    pub distance: f32,
    /// Unit surface normal in shape space.
    pub normal: Vec3,
    /// Triangle under the centre, if any.
    pub key: Option<HeightFieldHitKey>,
}

/// Regular grid of height samples triangulated into two triangles per cell.
///
/// Heights come from an [`IHeightSampler`]; the shape adds the grid transform, ray and sphere
/// queries and an optional coarse min/max tree that lets ray casts skip regions the ray cannot
/// touch. The tree is published atomically: queries take a reference counted snapshot, so
/// rebuilding it never disturbs casts that are already running.
pub struct HeightField<S: IHeightSampler> {
    sampler: S,
    description: HeightFieldDescription,
    inverse_scale: Vec3,
    raycast_height_range: (f32, f32),
    coarse_min_max: ShardedLock<Option<Arc<CoarseMinMaxPyramid>>>,
}

/// Lowest and highest sample of the grid.
fn scan_height_range<S: IHeightSampler>(sampler: &S, x_res: i32, z_res: i32) -> (f32, f32) {
    let mut range = (f32::MAX, -f32::MAX);
    for z in 0..z_res {
        for x in 0..x_res {
            let height = sampler.height_at(x, z);
            range = (range.0.min(height), range.1.max(height));
        }
    }
    range
}

impl<S: IHeightSampler> HeightField<S> {
    /// Creates the shape, building the coarse tree right away if the description asks for one.
    pub fn new(description: HeightFieldDescription, sampler: S) -> Result<Self> {
        if let Err(err) = description.validate() {
            warn!("rejected height field description: {}", err);
            return Err(err);
        }
        let raycast_height_range = match description.height_range {
            Some([min, max]) => (min, max),
            None => scan_height_range(&sampler, description.x_res, description.z_res),
        };
        let shape = Self {
            sampler,
            description,
            inverse_scale: math_helper::inverse_scale(description.scale),
            raycast_height_range,
            coarse_min_max: ShardedLock::new(None),
        };
        if let Some(coarseness) = description.coarseness {
            shape.build_coarse_min_max_pyramid(coarseness as i32)?;
        }
        debug!(
            "created {}x{} height field, scale {}, offset {}, height range [{}, {}]",
            description.x_res,
            description.z_res,
            description.scale,
            description.offset,
            raycast_height_range.0,
            raycast_height_range.1
        );
        Ok(shape)
    }

    #[inline]
    pub fn description(&self) -> &HeightFieldDescription {
        &self.description
    }

    #[inline]
    pub fn sampler(&self) -> &S {
        &self.sampler
    }

    /// Gives mutable access to the samples. The coarse tree and the ray clipping range are not
    /// updated; rebuild the tree and call [`HeightField::recompute_raycast_height_range`] after editing.
    #[inline]
    pub fn sampler_mut(&mut self) -> &mut S {
        &mut self.sampler
    }

    #[inline]
    pub fn scale(&self) -> Vec3 {
        self.description.scale
    }

    #[inline]
    pub fn inverse_scale(&self) -> Vec3 {
        self.inverse_scale
    }

    #[inline]
    pub fn offset(&self) -> Vec3 {
        self.description.offset
    }

    /// Height range, in sample units, used to clip rays while no coarse tree is present.
    #[inline]
    pub fn raycast_height_range(&self) -> (f32, f32) {
        self.raycast_height_range
    }

    /// Rescans the sampler for the ray clipping range.
    pub fn recompute_raycast_height_range(&mut self) {
        self.raycast_height_range = scan_height_range(&self.sampler, self.description.x_res, self.description.z_res);
    }

    /// Builds a coarse min/max tree and publishes it, replacing any previous one. Readers that
    /// already hold the previous tree keep using it until they drop it.
    pub fn build_coarse_min_max_pyramid(&self, coarseness: i32) -> Result<()> {
        let pyramid = CoarseMinMaxPyramid::build(&self.sampler, self.description.x_res, self.description.z_res, coarseness)?;
        *self.coarse_min_max.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(pyramid));
        debug!("published coarse min/max tree with coarseness {}", coarseness);
        Ok(())
    }

    /// Removes the coarse tree; later ray casts walk every cell.
    pub fn clear_coarse_min_max_pyramid(&self) {
        *self.coarse_min_max.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Snapshot of the current coarse tree.
    #[inline]
    pub fn coarse_min_max_pyramid(&self) -> Option<Arc<CoarseMinMaxPyramid>> {
        self.coarse_min_max.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Coarseness of the current coarse tree, if one is built.
    pub fn coarseness(&self) -> Option<i32> {
        self.coarse_min_max_pyramid().map(|pyramid| pyramid.coarseness())
    }

    /// Packed bounds of the four cells (2x, 2z), (2x+1, 2z), (2x+1, 2z+1), (2x, 2z+1) of `level`
    /// in the current coarse tree.
    pub fn get_coarse_min_max(&self, level: i32, x: i32, z: i32) -> Result<(Vec4, Vec4)> {
        match self.coarse_min_max_pyramid() {
            Some(pyramid) => pyramid.query_level(level, x, z),
            None => Err(HeightFieldError::invalid("no coarse min/max tree has been built")),
        }
    }

    /// Shape space bounding box of the surface, grown by `tolerance` on every side.
    pub fn compute_bounds(&self, tolerance: f32) -> BoundingBox {
        let (min_height, max_height) = match self.coarse_min_max_pyramid() {
            Some(pyramid) => pyramid.height_range(),
            None => self.raycast_height_range,
        };
        let scale = self.description.scale;
        let offset = self.description.offset;
        let a = Vec3::new(0.0, min_height, 0.0) * scale + offset;
        let b = Vec3::new(
            self.description.cells_x() as f32,
            max_height,
            self.description.cells_z() as f32,
        ) * scale
            + offset;
        BoundingBox::from_corners(a, b).expanded(tolerance)
    }

    /// Interpolated height, unit up-facing normal (both in grid space) and triangle index at
    /// sub-cell position `(sub_x, sub_z)` of cell (x, z). Cells beyond the grid are clamped to the
    /// border cells and sub-cell positions to `[0, 1]`.
    pub fn get_height_and_normal_at(&self, x: i32, z: i32, sub_x: f32, sub_z: f32) -> (f32, Vec3, i32) {
        let x = math_helper::clamp(x, 0, self.description.cells_x() - 1);
        let z = math_helper::clamp(z, 0, self.description.cells_z() - 1);
        HeightFieldCell::gather(&self.sampler, x, z, 0.0)
            .height_and_normal_at(math_helper::clamp(sub_x, 0.0, 1.0), math_helper::clamp(sub_z, 0.0, 1.0))
    }

    fn ray_caster<'a>(&'a self, pyramid: Option<&'a CoarseMinMaxPyramid>) -> HeightFieldRayCaster<'a, S> {
        HeightFieldRayCaster::new(
            &self.sampler,
            self.description.cells_x(),
            self.description.cells_z(),
            self.inverse_scale,
            self.raycast_height_range,
        )
        .with_pyramid(pyramid)
        .with_height_tolerance(self.description.height_tolerance)
    }

    /// Returns the nearest hit along `input.from -> input.to`.
    pub fn cast_ray(&self, input: &HeightFieldRayCastInput) -> Option<HeightFieldRayHit> {
        let mut collector = ClosestHitCollector::new();
        self.cast_ray_with_collector(input, &mut collector);
        collector.hit
    }

    /// Reports every hit along `input.from -> input.to` to `collector`, in order of increasing
    /// fraction, until it asks to stop.
    pub fn cast_ray_with_collector<C: IRayHitCollector>(&self, input: &HeightFieldRayCastInput, collector: &mut C) {
        let pyramid = self.coarse_min_max_pyramid();
        let ray = GridRay::from_segment(input.from, input.to, self.description.offset, self.inverse_scale);
        let penetration = input
            .report_penetrating_start_position
            .then_some(input.max_extra_penetration);
        self.ray_caster(pyramid.as_deref()).cast(&ray, penetration, collector);
    }

    /// Sweeps a sphere by casting its centre against the surface raised by the radius along the
    /// height axis. Penetrating start positions are always reported.
    pub fn cast_sphere<C: IRayHitCollector>(&self, input: &HeightFieldSphereCastInput, collector: &mut C) {
        let pyramid = self.coarse_min_max_pyramid();
        let ray = GridRay::from_segment(input.from, input.to, self.description.offset, self.inverse_scale);
        let height_offset = input.radius * self.inverse_scale.y.abs();
        self.ray_caster(pyramid.as_deref())
            .with_height_offset(height_offset)
            .cast(&ray, Some(input.max_extra_penetration), collector);
    }

    /// Measures each sphere against the triangle below its centre.
    pub fn collide_spheres(&self, spheres: &[Sphere]) -> Vec<SphereCollision> {
        let cells_x = self.description.cells_x();
        let cells_z = self.description.cells_z();
        let scale = self.description.scale;
        let offset = self.description.offset;
        spheres
            .iter()
            .map(|sphere| {
                let grid = (sphere.center - offset) * self.inverse_scale;
                if grid.x < 0.0 || grid.z < 0.0 || grid.x > cells_x as f32 || grid.z > cells_z as f32 {
                    return SphereCollision {
                        distance: f32::MAX,
                        normal: (Vec3::Y * self.inverse_scale).normalize(),
                        key: None,
                    };
                }
                let (height, normal, key) = surface_at(&self.sampler, cells_x, cells_z, grid.x, grid.z, 0.0);
                let surface_point = Vec3::new(grid.x, height, grid.z) * scale + offset;
                let normal = (normal * self.inverse_scale).normalize();
                SphereCollision {
                    distance: (sphere.center - surface_point).dot(normal) - sphere.radius,
                    normal,
                    key: Some(key),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::samplers::{CompressedHeightSampler, StorageHeightSampler, TriangleFlipPolicy};
    use super::*;
    use crate::physics::collidables::ray::RayCastControl;
    use crate::physics::collision_detection::ray_hit_collectors::{AllHitsCollector, FirstHitsCollector};
    use approx::assert_relative_eq;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn flat(res: i32, height: f32) -> StorageHeightSampler {
        StorageHeightSampler::flat(res, res, height, TriangleFlipPolicy::default()).unwrap()
    }

    fn hills(res: i32) -> StorageHeightSampler {
        StorageHeightSampler::from_fn(res, res, TriangleFlipPolicy::Checkerboard, |x, z| {
            let (x, z) = (x as f32, z as f32);
            2.0 * (x * 0.4).sin() + 1.5 * (z * 0.23).cos()
        })
        .unwrap()
    }

    /// Ridges along z: even columns at height 0, odd columns at height 10.
    fn sawtooth() -> StorageHeightSampler {
        StorageHeightSampler::from_fn(11, 3, TriangleFlipPolicy::default(), |x, _| if x % 2 == 0 { 0.0 } else { 10.0 })
            .unwrap()
    }

    fn ray(from: Vec3, to: Vec3) -> HeightFieldRayCastInput {
        HeightFieldRayCastInput::new(from, to)
    }

    #[test]
    fn test_vertical_ray_on_flat_grid() {
        init_logging();
        for coarseness in [None, Some(1)] {
            let mut description = HeightFieldDescription::new(4, 4);
            description.coarseness = coarseness;
            let field = HeightField::new(description, flat(4, 0.0)).unwrap();
            let hit = field
                .cast_ray(&ray(Vec3::new(2.0, 10.0, 2.0), Vec3::new(2.0, -10.0, 2.0)))
                .unwrap();
            assert_relative_eq!(hit.fraction, 0.5);
            assert_eq!((hit.key.x, hit.key.z), (2, 2));
            assert!((hit.normal - Vec3::Y).length() < 1e-6);
        }
    }

    #[test]
    fn test_ray_above_and_leaving_misses() {
        let field = HeightField::new(HeightFieldDescription::new(8, 8).with_coarseness(1), hills(8)).unwrap();
        assert!(field
            .cast_ray(&ray(Vec3::new(1.0, 20.0, 1.0), Vec3::new(3.0, 40.0, 2.0)))
            .is_none());
        // Entirely beside the grid.
        assert!(field
            .cast_ray(&ray(Vec3::new(-5.0, 10.0, 1.0), Vec3::new(-1.0, -10.0, 6.0)))
            .is_none());
        // Zero length.
        let point = Vec3::new(2.0, -30.0, 2.0);
        assert!(field.cast_ray(&ray(point, point)).is_none());
    }

    #[test]
    fn test_single_tall_cell() {
        let sampler = StorageHeightSampler::from_fn(10, 10, TriangleFlipPolicy::default(), |x, z| {
            if (x == 4 || x == 5) && (z == 4 || z == 5) {
                100.0
            } else {
                0.0
            }
        })
        .unwrap();
        for coarseness in [None, Some(2)] {
            let mut description = HeightFieldDescription::new(10, 10);
            description.coarseness = coarseness;
            let field = HeightField::new(description, sampler.clone()).unwrap();

            assert!(field
                .cast_ray(&ray(Vec3::new(0.0, 50.0, 1.5), Vec3::new(9.0, 30.0, 1.5)))
                .is_none());

            let input = ray(Vec3::new(0.0, 150.0, 4.5), Vec3::new(9.0, 50.0, 4.5));
            let hit = field.cast_ray(&input).unwrap();
            assert_relative_eq!(hit.fraction, 0.5, epsilon = 1e-5);
            assert_relative_eq!(input.point_at(hit.fraction).y, 100.0, epsilon = 1e-3);
            assert_eq!((hit.key.x, hit.key.z), (4, 4));
        }
    }

    #[test]
    fn test_construction_builds_requested_tree() {
        let field = HeightField::new(HeightFieldDescription::new(8, 8).with_coarseness(2), hills(8)).unwrap();
        let pyramid = field.coarse_min_max_pyramid().unwrap();
        assert_eq!(pyramid.level_count(), 3);
        assert_eq!(pyramid.level_resolution(0).unwrap(), (2, 2));
        assert_eq!(field.coarseness(), Some(2));
        assert!(field.get_coarse_min_max(0, 0, 0).is_ok());
        assert!(matches!(
            field.get_coarse_min_max(0, 1, 0),
            Err(HeightFieldError::OutOfBounds { .. })
        ));

        assert!(matches!(
            HeightField::new(HeightFieldDescription::new(8, 8).with_coarseness(3), hills(8)),
            Err(HeightFieldError::InvalidConfiguration { .. })
        ));

        let field = HeightField::new(HeightFieldDescription::new(8, 8), hills(8)).unwrap();
        assert!(field.coarse_min_max_pyramid().is_none());
        assert!(matches!(
            field.get_coarse_min_max(0, 0, 0),
            Err(HeightFieldError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_collector_stop_ends_walk() {
        struct StopAfterFirst {
            calls: usize,
        }

        impl IRayHitCollector for StopAfterFirst {
            fn on_ray_hit(&mut self, _hit: &HeightFieldRayHit, _maximum_fraction: &mut f32) -> RayCastControl {
                self.calls += 1;
                RayCastControl::Stop
            }
        }

        for coarseness in [None, Some(1)] {
            let mut description = HeightFieldDescription::new(11, 3);
            description.coarseness = coarseness;
            let field = HeightField::new(description, sawtooth()).unwrap();
            let input = ray(Vec3::new(-1.0, 5.0, 1.3), Vec3::new(11.0, 5.0, 1.3));

            let mut all = AllHitsCollector::new();
            field.cast_ray_with_collector(&input, &mut all);
            let columns: Vec<i32> = all.hits.iter().map(|hit| hit.key.x).collect();
            assert_eq!(columns, vec![0, 2, 4, 6, 8]);
            for (hit, x) in all.hits.iter().zip([0.5f32, 2.5, 4.5, 6.5, 8.5]) {
                assert_relative_eq!(hit.fraction, (x + 1.0) / 12.0, epsilon = 1e-5);
            }

            let mut stopper = StopAfterFirst { calls: 0 };
            field.cast_ray_with_collector(&input, &mut stopper);
            assert_eq!(stopper.calls, 1);

            let mut first = FirstHitsCollector::new(1);
            field.cast_ray_with_collector(&input, &mut first);
            assert_eq!(first.hits.len(), 1);
            assert_eq!(first.hits[0].key.x, 0);
        }
    }

    #[test]
    fn test_mirrored_scale_gives_mirrored_hits() {
        let res = 17;
        let extent = (res - 1) as f32;
        let plain = HeightField::new(HeightFieldDescription::new(res, res).with_coarseness(2), hills(res)).unwrap();

        for signs in [Vec3::new(-1.0, 1.0, 1.0), Vec3::new(1.0, 1.0, -1.0), Vec3::new(-1.0, 1.0, -1.0)] {
            let offset = Vec3::new(
                if signs.x < 0.0 { extent } else { 0.0 },
                0.0,
                if signs.z < 0.0 { extent } else { 0.0 },
            );
            let mirrored = HeightField::new(
                HeightFieldDescription::new(res, res)
                    .with_scale(signs)
                    .with_offset(offset)
                    .with_coarseness(2),
                hills(res),
            )
            .unwrap();
            let mirror = |v: Vec3| v * signs + offset;

            let mut hits = 0;
            for i in 0..40 {
                let i = i as f32;
                let from = Vec3::new(0.37 * i % extent, 6.0, (1.3 + 0.71 * i) % extent);
                let to = Vec3::new((5.0 + 0.53 * i) % extent, -4.0, (11.0 - 0.29 * i).abs() % extent);
                let a = plain.cast_ray(&ray(from, to));
                let b = mirrored.cast_ray(&ray(mirror(from), mirror(to)));
                match (a, b) {
                    (Some(a), Some(b)) => {
                        assert_relative_eq!(a.fraction, b.fraction, epsilon = 1e-4);
                        assert!((b.normal - a.normal * signs).length() < 1e-4);
                        hits += 1;
                    }
                    (None, None) => {}
                    (a, b) => panic!("scale {:?}: plain hit {:?}, mirrored hit {:?}", signs, a, b),
                }
            }
            assert!(hits > 0);
        }
    }

    #[test]
    fn test_scaled_grid_hits_in_shape_space() {
        let description = HeightFieldDescription::new(5, 5)
            .with_scale(Vec3::new(2.0, 3.0, 0.5))
            .with_offset(Vec3::new(10.0, -1.0, 4.0));
        let field = HeightField::new(description, flat(5, 1.0)).unwrap();
        // Surface sits at 1 * 3 - 1 = 2 in shape space.
        let input = ray(Vec3::new(13.0, 6.0, 5.0), Vec3::new(15.0, -2.0, 5.5));
        let hit = field.cast_ray(&input).unwrap();
        assert_relative_eq!(input.point_at(hit.fraction).y, 2.0, epsilon = 1e-4);
        assert!((hit.normal - Vec3::Y).length() < 1e-6);
    }

    #[test]
    fn test_rays_from_below_pass_through() {
        let field = HeightField::new(HeightFieldDescription::new(4, 4), flat(4, 0.0)).unwrap();
        assert!(field
            .cast_ray(&ray(Vec3::new(1.5, -1.0, 1.5), Vec3::new(1.7, 1.0, 1.2)))
            .is_none());
    }

    #[test]
    fn test_penetrating_start() {
        let field = HeightField::new(HeightFieldDescription::new(4, 4), flat(4, 0.0)).unwrap();
        let sinking = ray(Vec3::new(1.5, -1.0, 1.5), Vec3::new(1.5, -2.0, 1.5));
        assert!(field.cast_ray(&sinking).is_none());

        let hit = field.cast_ray(&sinking.with_penetrating_start(0.0)).unwrap();
        assert_eq!(hit.fraction, 0.0);
        assert!((hit.normal - Vec3::Y).length() < 1e-6);
        assert_eq!((hit.key.x, hit.key.z), (1, 1));

        assert!(field.cast_ray(&sinking.with_penetrating_start(2.0)).is_none());

        // Leaving the surface never counts as penetrating.
        let rising = ray(Vec3::new(1.5, -1.0, 1.5), Vec3::new(1.5, 1.0, 1.5)).with_penetrating_start(0.0);
        assert!(field.cast_ray(&rising).is_none());
    }

    #[test]
    fn test_sphere_cast() {
        let field = HeightField::new(
            HeightFieldDescription::new(4, 4).with_scale(Vec3::new(1.0, 2.0, 1.0)),
            flat(4, 0.0),
        )
        .unwrap();
        let mut closest = ClosestHitCollector::new();
        let input = HeightFieldSphereCastInput {
            from: Vec3::new(1.5, 5.0, 1.5),
            to: Vec3::new(1.5, -5.0, 1.5),
            radius: 1.0,
            max_extra_penetration: 0.0,
        };
        field.cast_sphere(&input, &mut closest);
        let hit = closest.hit.unwrap();
        assert_relative_eq!(hit.fraction, 0.4, epsilon = 1e-5);

        // Starting inside the raised surface and moving deeper reports the start.
        let mut closest = ClosestHitCollector::new();
        let input = HeightFieldSphereCastInput {
            from: Vec3::new(1.5, 0.4, 1.5),
            to: Vec3::new(1.5, -2.0, 1.5),
            radius: 1.0,
            max_extra_penetration: 0.0,
        };
        field.cast_sphere(&input, &mut closest);
        assert_eq!(closest.hit.map(|hit| hit.fraction), Some(0.0));
    }

    #[test]
    fn test_collide_spheres() {
        let field = HeightField::new(HeightFieldDescription::new(4, 4), flat(4, 2.0)).unwrap();
        let results = field.collide_spheres(&[
            Sphere::new(Vec3::new(1.0, 3.0, 1.0), 0.5),
            Sphere::new(Vec3::new(2.5, 2.2, 0.5), 0.5),
            Sphere::new(Vec3::new(10.0, 3.0, 1.0), 0.5),
        ]);
        assert_relative_eq!(results[0].distance, 0.5, epsilon = 1e-6);
        assert!((results[0].normal - Vec3::Y).length() < 1e-6);
        assert_relative_eq!(results[1].distance, -0.3, epsilon = 1e-6);
        assert_eq!(results[1].key.map(|key| (key.x, key.z)), Some((2, 0)));
        assert_eq!(results[2].distance, f32::MAX);
        assert!(results[2].key.is_none());
    }

    #[test]
    fn test_compute_bounds_with_negative_scale() {
        let sampler = StorageHeightSampler::from_fn(5, 3, TriangleFlipPolicy::default(), |x, z| {
            if x == 1 && z == 1 {
                4.0
            } else if x == 3 && z == 2 {
                -1.0
            } else {
                0.0
            }
        })
        .unwrap();
        let description = HeightFieldDescription::new(5, 3)
            .with_scale(Vec3::new(-2.0, 1.0, 3.0))
            .with_offset(Vec3::new(1.0, 0.0, 0.0));
        let field = HeightField::new(description, sampler).unwrap();
        assert_eq!(field.raycast_height_range(), (-1.0, 4.0));
        let bounds = field.compute_bounds(0.0);
        assert_eq!(bounds.min, Vec3::new(-7.0, -1.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 4.0, 6.0));
        let grown = field.compute_bounds(0.5);
        assert_eq!(grown.min, Vec3::new(-7.5, -1.5, -0.5));
    }

    #[test]
    fn test_height_and_normal_lookup() {
        let sampler = StorageHeightSampler::from_fn(3, 3, TriangleFlipPolicy::default(), |x, z| (x + 2 * z) as f32).unwrap();
        let field = HeightField::new(HeightFieldDescription::new(3, 3), sampler).unwrap();
        let (height, normal, triangle_index) = field.get_height_and_normal_at(1, 0, 0.25, 0.5);
        assert_relative_eq!(height, 1.0 + 0.25 + 1.0);
        assert_eq!(triangle_index, 0);
        assert!((normal - Vec3::new(-1.0, 1.0, -2.0).normalize()).length() < 1e-6);
    }

    #[test]
    fn test_height_and_normal_lookup_clamps_to_border_cells() {
        let sampler = StorageHeightSampler::from_fn(3, 3, TriangleFlipPolicy::default(), |x, z| (x + 2 * z) as f32).unwrap();
        let field = HeightField::new(HeightFieldDescription::new(3, 3), sampler).unwrap();
        // Past the last column: corner (1, 0) of cell (1, 0).
        let (height, _, triangle_index) = field.get_height_and_normal_at(2, 0, 0.0, 0.0);
        assert_relative_eq!(height, 1.0);
        assert_eq!(triangle_index, 0);
        // Past the last row and column: the far edge of cell (1, 1).
        let (height, normal, triangle_index) = field.get_height_and_normal_at(5, 7, 0.5, 2.0);
        assert_relative_eq!(height, 1.5 + 2.0 * 2.0);
        assert_eq!(triangle_index, 1);
        assert!((normal - Vec3::new(-1.0, 1.0, -2.0).normalize()).length() < 1e-6);
        let (height, _, _) = field.get_height_and_normal_at(-3, -1, -1.0, 0.5);
        assert_relative_eq!(height, 1.0);
    }

    #[test]
    fn test_edits_need_explicit_rebuild() {
        let mut field = HeightField::new(HeightFieldDescription::new(4, 4).with_coarseness(0), flat(4, 0.0)).unwrap();
        let input = ray(Vec3::new(1.5, 10.0, 1.5), Vec3::new(1.5, -10.0, 1.5));
        assert_relative_eq!(field.cast_ray(&input).unwrap().fraction, 0.5);

        field.sampler_mut().set_height(1, 1, 5.0);
        field.sampler_mut().set_height(2, 1, 5.0);
        field.sampler_mut().set_height(1, 2, 5.0);
        field.sampler_mut().set_height(2, 2, 5.0);
        field.recompute_raycast_height_range();
        field.build_coarse_min_max_pyramid(0).unwrap();
        assert_relative_eq!(field.cast_ray(&input).unwrap().fraction, 0.25);

        field.clear_coarse_min_max_pyramid();
        assert!(field.coarse_min_max_pyramid().is_none());
        assert_relative_eq!(field.cast_ray(&input).unwrap().fraction, 0.25);
    }

    #[test]
    fn test_compressed_sampler() {
        let heights: Vec<f32> = (0..16).map(|i| (i % 4) as f32 * 0.5).collect();
        let sampler = CompressedHeightSampler::from_heights(&heights, 4, 4, TriangleFlipPolicy::Checkerboard).unwrap();
        let field = HeightField::new(HeightFieldDescription::new(4, 4).with_coarseness(1), sampler).unwrap();
        let input = ray(Vec3::new(2.5, 10.0, 1.5), Vec3::new(2.5, -10.0, 1.5));
        let hit = field.cast_ray(&input).unwrap();
        assert_relative_eq!(input.point_at(hit.fraction).y, 1.25, epsilon = 1e-3);
    }

    #[test]
    fn test_rebuild_while_casting() {
        init_logging();
        let res = 33;
        let field = HeightField::new(HeightFieldDescription::new(res, res).with_coarseness(2), hills(res)).unwrap();
        let snapshot = field.coarse_min_max_pyramid().unwrap();
        field.build_coarse_min_max_pyramid(4).unwrap();
        assert_eq!(snapshot.coarseness(), 2);
        assert_eq!(field.coarseness(), Some(4));

        let inputs: Vec<HeightFieldRayCastInput> = (0..16)
            .map(|i| {
                let i = i as f32;
                ray(Vec3::new(i, 8.0, 1.0 + i * 0.5), Vec3::new(30.0 - i, -6.0, 31.0 - i * 1.5))
            })
            .collect();
        let expected: Vec<Option<f32>> = inputs
            .iter()
            .map(|input| field.cast_ray(input).map(|hit| hit.fraction))
            .collect();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        for (input, expected) in inputs.iter().zip(&expected) {
                            let found = field.cast_ray(input).map(|hit| hit.fraction);
                            match (found, expected) {
                                (Some(a), Some(b)) => assert!((a - b).abs() < 1e-5),
                                (None, None) => {}
                                (a, b) => panic!("found {:?}, expected {:?}", a, b),
                            }
                        }
                    }
                });
            }
            scope.spawn(|| {
                for coarseness in [1, 2, 3, 4, 5, 0] {
                    field.build_coarse_min_max_pyramid(coarseness).unwrap();
                }
                field.clear_coarse_min_max_pyramid();
            });
        });
        assert!(field.coarse_min_max_pyramid().is_none());
    }
}
