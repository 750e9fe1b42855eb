//! Sampled height field shape with ray casts accelerated by a coarse min/max tree.
//!
//! A [`HeightField`] wraps any [`IHeightSampler`] with a grid transform. Rays walk the grid cell by
//! cell; when a [`CoarseMinMaxPyramid`] is built the walk skips whole regions whose height bounds
//! the ray cannot reach.

pub mod error;
pub mod physics;
pub mod utilities;

pub use error::{HeightFieldError, Result};
pub use physics::collidables::height_field::samplers::{CompressedHeightSampler, StorageHeightSampler, TriangleFlipPolicy};
pub use physics::collidables::height_field::{HeightField, Sphere, SphereCollision};
pub use physics::collidables::ray::{
    HeightFieldHitKey, HeightFieldRayCastInput, HeightFieldRayHit, HeightFieldSphereCastInput, RayCastControl,
};
pub use physics::collidables::shape::{IHeightSampler, IRayHitCollector};
pub use physics::collision_detection::ray_hit_collectors::{AllHitsCollector, ClosestHitCollector, FirstHitsCollector};
pub use physics::height_field_description::HeightFieldDescription;
pub use physics::trees::coarse_min_max::CoarseMinMaxPyramid;
