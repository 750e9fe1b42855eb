use glam::Vec3;

/// Input for a ray cast against a height field. The ray is the segment `from -> to` in the
/// height field's shape space; hit fractions are measured along that segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightFieldRayCastInput {
    /// Start of the segment.
    pub from: Vec3,
    /// End of the segment.
    pub to: Vec3,
    /// If the start point lies below the surface, report a hit at fraction zero (subject to
    /// `max_extra_penetration`) instead of silently ignoring the penetrating part.
    pub report_penetrating_start_position: bool,
    /// A penetrating start is only reported if the segment gets deeper than its start by more
    /// than this distance, in sample units. Must be non-negative.
    pub max_extra_penetration: f32,
}

impl HeightFieldRayCastInput {
    /// Creates a plain ray cast input with penetration reporting disabled.
    #[inline]
    pub fn new(from: Vec3, to: Vec3) -> Self {
        Self {
            from,
            to,
            report_penetrating_start_position: false,
            max_extra_penetration: 0.0,
        }
    }

    /// Returns a copy that reports penetrating start positions.
    #[inline]
    pub fn with_penetrating_start(mut self, max_extra_penetration: f32) -> Self {
        debug_assert!(max_extra_penetration >= 0.0);
        self.report_penetrating_start_position = true;
        self.max_extra_penetration = max_extra_penetration;
        self
    }

    /// Point on the segment at the given fraction.
    #[inline]
    pub fn point_at(&self, fraction: f32) -> Vec3 {
        self.from + (self.to - self.from) * fraction
    }
}

/// Input for a sphere cast against a height field. Swept spheres are approximated by casting the
/// centre against the surface raised by the radius along the height axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightFieldSphereCastInput {
    /// Sphere centre at the start of the sweep.
    pub from: Vec3,
    /// Sphere centre at the end of the sweep.
    pub to: Vec3,
    /// Radius in shape space units.
    pub radius: f32,
    /// Allowed growth of the initial penetration before a start-position hit is reported.
    pub max_extra_penetration: f32,
}

/// Identifies the triangle a ray hit.
///
/// Triangle index 0 holds the cell edge `p(x,z) - p(x+1,z)`, index 1 holds `p(x,z+1) - p(x+1,z+1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HeightFieldHitKey {
    pub x: i32,
    pub z: i32,
    pub triangle_index: i32,
}

impl HeightFieldHitKey {
    #[inline]
    pub fn new(x: i32, z: i32, triangle_index: i32) -> Self {
        debug_assert!((triangle_index & !1) == 0, "A cell only has triangles 0 and 1.");
        Self { x, z, triangle_index }
    }

    /// Packs the key into the legacy shape key layout: `(x << 1) | triangle_index | (z << 16)`.
    /// Only valid for grids up to 16k samples per axis.
    #[inline]
    pub fn to_packed(&self) -> u32 {
        debug_assert!(self.x >= 0 && self.x < 1 << 15 && self.z >= 0 && self.z < 1 << 16);
        ((self.x as u32) << 1) | (self.triangle_index as u32 & 1) | ((self.z as u32) << 16)
    }

    /// Unpacks a key produced by [`HeightFieldHitKey::to_packed`].
    #[inline]
    pub fn from_packed(packed: u32) -> Self {
        Self {
            x: ((packed & 0xFFFF) >> 1) as i32,
            z: (packed >> 16) as i32,
            triangle_index: (packed & 1) as i32,
        }
    }
}

/// A single ray hit against a height field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeightFieldRayHit {
    /// Fraction along `from -> to` at which the surface was hit.
    pub fraction: f32,
    /// Unit surface normal in shape space, facing the side the ray came from.
    pub normal: Vec3,
    /// Cell and triangle that was hit.
    pub key: HeightFieldHitKey,
}

/// Returned by hit collectors to continue or abort the current walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RayCastControl {
    Continue,
    Stop,
}
