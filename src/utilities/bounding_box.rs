use glam::Vec3;

use super::math_helper;

/// Provides simple axis-aligned bounding box functionality.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    /// Location with the lowest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub min: Vec3,
    /// Location with the highest X, Y, and Z coordinates in the axis-aligned bounding box.
    pub max: Vec3,
}

impl BoundingBox {
    /// Constructs a bounding box from the specified minimum and maximum.
    #[inline]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Constructs the smallest bounding box containing both points, in any order.
    #[inline]
    pub fn from_corners(a: Vec3, b: Vec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    /// Returns a copy expanded by `margin` on every side.
    #[inline]
    pub fn expanded(&self, margin: f32) -> Self {
        Self {
            min: self.min - Vec3::splat(margin),
            max: self.max + Vec3::splat(margin),
        }
    }

    /// Clips the parametric segment `origin + t * direction`, `t` in `[t_min, t_max]`, against the box.
    /// Returns the surviving parameter interval, or `None` if the segment misses the box.
    /// The box is closed: a segment running along a face is inside.
    #[inline]
    pub fn clip_segment(&self, origin: Vec3, direction: Vec3, t_min: f32, t_max: f32) -> Option<(f32, f32)> {
        let inverse_direction = math_helper::clamped_reciprocal(direction);
        let mut entry = t_min;
        let mut exit = t_max;
        for axis in 0..3 {
            if direction[axis] == 0.0 {
                if origin[axis] < self.min[axis] || origin[axis] > self.max[axis] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[axis] - origin[axis]) * inverse_direction[axis];
            let t1 = (self.max[axis] - origin[axis]) * inverse_direction[axis];
            entry = entry.max(t0.min(t1));
            exit = exit.min(t0.max(t1));
        }
        if entry <= exit {
            Some((entry, exit))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_corners_orders_components() {
        let b = BoundingBox::from_corners(Vec3::new(1.0, -2.0, 3.0), Vec3::new(-1.0, 2.0, 0.0));
        assert_eq!(b.min, Vec3::new(-1.0, -2.0, 0.0));
        assert_eq!(b.max, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn test_expanded() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::ONE).expanded(0.5);
        assert_eq!(b.min, Vec3::splat(-0.5));
        assert_eq!(b.max, Vec3::splat(1.5));
    }

    #[test]
    fn test_clip_segment_through_box() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0));
        let (entry, exit) = b
            .clip_segment(Vec3::new(-4.0, 2.0, 2.0), Vec3::new(12.0, 0.0, 0.0), 0.0, 1.0)
            .unwrap();
        assert!((entry - 1.0 / 3.0).abs() < 1e-6);
        assert!((exit - 2.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_clip_segment_parallel_outside() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0));
        assert!(b
            .clip_segment(Vec3::new(-1.0, 5.0, 2.0), Vec3::new(6.0, 0.0, 0.0), 0.0, 1.0)
            .is_none());
    }

    #[test]
    fn test_clip_segment_along_face() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0));
        let (entry, exit) = b
            .clip_segment(Vec3::new(4.0, 8.0, 0.0), Vec3::new(0.0, -16.0, 0.0), 0.0, 1.0)
            .unwrap();
        assert!((entry - 0.25).abs() < 1e-6);
        assert!((exit - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_clip_segment_stops_short() {
        let b = BoundingBox::new(Vec3::ZERO, Vec3::splat(4.0));
        assert!(b
            .clip_segment(Vec3::new(-4.0, 2.0, 2.0), Vec3::new(2.0, 0.0, 0.0), 0.0, 1.0)
            .is_none());
    }
}
