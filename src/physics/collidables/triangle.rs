use glam::Vec3;

/// A single triangle of a height field cell, in grid space.
///
/// Ray tests are one-sided: only rays travelling against the face normal `(c - a) x (b - a)`
/// report a hit. Height field triangles are wound so that this normal points up the height axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub a: Vec3,
    pub b: Vec3,
    pub c: Vec3,
}

impl Triangle {
    /// Creates a triangle from its vertices.
    #[inline]
    pub fn new(a: Vec3, b: Vec3, c: Vec3) -> Self {
        Self { a, b, c }
    }

    /// Unnormalized face normal.
    #[inline(always)]
    pub fn face_normal(&self) -> Vec3 {
        (self.c - self.a).cross(self.b - self.a)
    }

    /// Tests the ray `origin + t * direction` against the triangle.
    /// Returns the ray parameter and unit face normal of the hit. Edges are inclusive, so a ray
    /// crossing the shared edge of two triangles hits at least one of them.
    #[inline(always)]
    pub fn ray_test(&self, origin: Vec3, direction: Vec3) -> Option<(f32, Vec3)> {
        let ab = self.b - self.a;
        let ac = self.c - self.a;
        let normal = ac.cross(ab);
        let dn = -direction.dot(normal);
        if dn <= 0.0 {
            return None;
        }
        let ao = origin - self.a;
        let t = ao.dot(normal);
        if t < 0.0 {
            return None;
        }
        let aoxd = ao.cross(direction);
        let v = -ac.dot(aoxd);
        if v < 0.0 || v > dn {
            return None;
        }
        let w = ab.dot(aoxd);
        if w < 0.0 || v + w > dn {
            return None;
        }
        Some((t / dn, normal / normal.length()))
    }
}
