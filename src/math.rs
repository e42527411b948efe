//! Types, aliases and helper operations for doing math with `ultraviolet`.
pub use ultraviolet as uv;

pub type Vec3 = uv::DVec3;
pub type Mat3 = uv::DMat3;
pub type Rotor3 = uv::DRotor3;
pub type Bivec3 = uv::DBivec3;

/// Lengths below this are treated as zero when a direction is needed.
pub const DIRECTION_EPSILON: f64 = 1e-9;

/// Position and orientation of a body, no scaling.
///
/// The rotation is around the position, which is assumed to be the center of mass.
#[derive(Clone, Copy, Debug)]
pub struct Pose {
    pub position: Vec3,
    pub rotation: Rotor3,
}

impl Default for Pose {
    fn default() -> Self {
        Self {
            position: Vec3::zero(),
            rotation: Rotor3::identity(),
        }
    }
}

impl Pose {
    #[inline]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            rotation: Rotor3::identity(),
        }
    }

    #[inline]
    pub fn with_rotation(mut self, rotation: Rotor3) -> Self {
        self.rotation = rotation;
        self
    }

    /// Move the pose forward in time by the given velocities.
    pub fn integrate(&mut self, linear: Vec3, angular: Vec3, dt: f64) {
        self.position += linear * dt;
        let ang_speed = angular.mag();
        if ang_speed > DIRECTION_EPSILON {
            let axis = angular / ang_speed;
            let step = Rotor3::from_angle_plane(ang_speed * dt, Bivec3::from_normalized_axis(axis));
            self.rotation = step * self.rotation;
            self.rotation.normalize();
        }
    }
}

/// A wrapper type to indicate a vector should always be normalized.
#[derive(Clone, Copy, Debug)]
pub struct Unit<T>(T);

impl Unit<Vec3> {
    pub fn new_normalize(v: Vec3) -> Self {
        Unit(v.normalized())
    }

    /// Normalize a vector, substituting `fallback` if it's too short to have a direction.
    pub fn try_new_normalize(v: Vec3, fallback: Unit<Vec3>) -> Self {
        let mag = v.mag();
        if mag > DIRECTION_EPSILON {
            Unit(v / mag)
        } else {
            fallback
        }
    }

    pub const fn new_unchecked(v: Vec3) -> Self {
        Unit(v)
    }

    pub fn unit_x() -> Self {
        Unit(Vec3::unit_x())
    }

    pub fn unit_y() -> Self {
        Unit(Vec3::unit_y())
    }

    pub fn unit_z() -> Self {
        Unit(Vec3::unit_z())
    }

    #[inline]
    pub fn into_inner(self) -> Vec3 {
        self.0
    }
}

impl std::ops::Mul<Unit<Vec3>> for Rotor3 {
    type Output = Unit<Vec3>;

    fn mul(self, rhs: Unit<Vec3>) -> Self::Output {
        Unit(self * rhs.0)
    }
}

impl<T> std::ops::Deref for Unit<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> std::ops::Neg for Unit<T>
where
    T: std::ops::Neg,
{
    type Output = Unit<<T as std::ops::Neg>::Output>;

    fn neg(self) -> Self::Output {
        Unit(-self.0)
    }
}

// Vec3 utils

/// Some unit vector perpendicular to `u`.
pub fn any_perpendicular(u: Unit<Vec3>) -> Unit<Vec3> {
    // cross with whichever axis is least aligned to avoid a degenerate result
    let v = *u;
    let axis = if v.x.abs() < 0.57 {
        Vec3::unit_x()
    } else if v.y.abs() < 0.57 {
        Vec3::unit_y()
    } else {
        Vec3::unit_z()
    };
    Unit::new_normalize(v.cross(axis))
}

/// Build a matrix with the given values on the diagonal.
#[inline]
pub fn diagonal(d: Vec3) -> Mat3 {
    Mat3::new(
        Vec3::new(d.x, 0.0, 0.0),
        Vec3::new(0.0, d.y, 0.0),
        Vec3::new(0.0, 0.0, d.z),
    )
}

/// Rotate a body-space tensor into world space: `R * T * R^T`.
#[inline]
pub fn rotate_tensor(rotation: Rotor3, tensor: Mat3) -> Mat3 {
    let r = rotation.into_matrix();
    r * tensor * r.transposed()
}
