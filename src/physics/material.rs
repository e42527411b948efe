//! Surface properties of bodies and how they combine when two bodies touch.

/// Friction and bounciness of a body's surface.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct Material {
    /// Coulomb friction coefficient.
    pub friction: f64,
    /// Restitution coefficient, 0 for no bounce and 1 for a perfectly elastic bounce.
    pub restitution: f64,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            friction: 0.6,
            restitution: 0.0,
        }
    }
}

/// Ways to combine a material property of two bodies into one value for their contact.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub enum BlendMethod {
    Average,
    Min,
    Max,
    Multiply,
}

impl BlendMethod {
    #[inline]
    pub fn blend(self, a: f64, b: f64) -> f64 {
        match self {
            BlendMethod::Average => 0.5 * (a + b),
            BlendMethod::Min => a.min(b),
            BlendMethod::Max => a.max(b),
            BlendMethod::Multiply => a * b,
        }
    }
}

/// How materials are combined for contacts.
///
/// Owned by the contact configuration rather than being global state,
/// so separate worlds can blend differently.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde-types", derive(serde::Serialize, serde::Deserialize))]
pub struct MaterialBlending {
    pub friction: BlendMethod,
    pub restitution: BlendMethod,
}

impl Default for MaterialBlending {
    fn default() -> Self {
        Self {
            friction: BlendMethod::Average,
            restitution: BlendMethod::Max,
        }
    }
}

impl MaterialBlending {
    #[inline]
    pub fn friction(&self, a: &Material, b: &Material) -> f64 {
        self.friction.blend(a.friction, b.friction)
    }

    #[inline]
    pub fn restitution(&self, a: &Material, b: &Material) -> f64 {
        self.restitution.blend(a.restitution, b.restitution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blending() {
        let ice = Material {
            friction: 0.1,
            restitution: 0.2,
        };
        let rubber = Material {
            friction: 0.9,
            restitution: 0.8,
        };
        let blend = MaterialBlending::default();
        assert!((blend.friction(&ice, &rubber) - 0.5).abs() < 1e-12);
        assert_eq!(blend.restitution(&ice, &rubber), 0.8);

        let strict = MaterialBlending {
            friction: BlendMethod::Min,
            restitution: BlendMethod::Multiply,
        };
        assert_eq!(strict.friction(&ice, &rubber), 0.1);
        assert!((strict.restitution(&ice, &rubber) - 0.16).abs() < 1e-12);
    }
}
