use crate::physics::collidables::ray::{HeightFieldRayHit, RayCastControl};
use crate::physics::collidables::shape::IRayHitCollector;

/// Keeps the nearest hit. Every accepted hit lowers the maximum fraction, so the walk never
/// visits cells beyond it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClosestHitCollector {
    pub hit: Option<HeightFieldRayHit>,
}

impl ClosestHitCollector {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IRayHitCollector for ClosestHitCollector {
    #[inline]
    fn on_ray_hit(&mut self, hit: &HeightFieldRayHit, maximum_fraction: &mut f32) -> RayCastControl {
        if self.hit.map_or(true, |closest| hit.fraction < closest.fraction) {
            self.hit = Some(*hit);
            *maximum_fraction = hit.fraction;
        }
        RayCastControl::Continue
    }
}

/// Keeps every hit in the order it was reported.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AllHitsCollector {
    pub hits: Vec<HeightFieldRayHit>,
}

impl AllHitsCollector {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IRayHitCollector for AllHitsCollector {
    #[inline]
    fn on_ray_hit(&mut self, hit: &HeightFieldRayHit, _maximum_fraction: &mut f32) -> RayCastControl {
        self.hits.push(*hit);
        RayCastControl::Continue
    }
}

/// Keeps hits until `limit` of them have been reported, then stops the walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FirstHitsCollector {
    pub limit: usize,
    pub hits: Vec<HeightFieldRayHit>,
}

impl FirstHitsCollector {
    #[inline]
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            hits: Vec::with_capacity(limit),
        }
    }
}

impl IRayHitCollector for FirstHitsCollector {
    #[inline]
    fn on_ray_hit(&mut self, hit: &HeightFieldRayHit, _maximum_fraction: &mut f32) -> RayCastControl {
        if self.hits.len() < self.limit {
            self.hits.push(*hit);
        }
        if self.hits.len() >= self.limit {
            RayCastControl::Stop
        } else {
            RayCastControl::Continue
        }
    }
}
