use super::ray::{HeightFieldRayHit, RayCastControl};

/// Supplies height samples and triangulation to a height field.
///
/// Coordinates passed in are always inside the grid; implementations must return finite heights.
pub trait IHeightSampler {
    /// Height of the sample at the given grid coordinates.
    fn height_at(&self, x: i32, z: i32) -> f32;

    /// Returns true if the two triangles of cell (x, z) share the edge p(x,z) - p(x+1,z+1),
    /// false if they share the edge p(x,z+1) - p(x+1,z).
    fn triangle_flip(&self, x: i32, z: i32) -> bool;
}

impl<T: IHeightSampler + ?Sized> IHeightSampler for &T {
    #[inline(always)]
    fn height_at(&self, x: i32, z: i32) -> f32 {
        (**self).height_at(x, z)
    }

    #[inline(always)]
    fn triangle_flip(&self, x: i32, z: i32) -> bool {
        (**self).triangle_flip(x, z)
    }
}

/// Receives ray hits from a height field walk.
pub trait IRayHitCollector {
    /// Called for every hit, in order of increasing fraction.
    ///
    /// `maximum_fraction` starts at 1 and may be lowered to prune the rest of the walk; cells that
    /// start beyond it are never visited. Returning [`RayCastControl::Stop`] ends the walk at once.
    fn on_ray_hit(&mut self, hit: &HeightFieldRayHit, maximum_fraction: &mut f32) -> RayCastControl;
}
