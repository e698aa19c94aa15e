use std::ops::{Add, Mul, Neg, Sub};

/// Angle in radians.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Radians(pub f32);

/// Angle in degrees.
#[derive(Debug, Default, Clone, Copy, PartialEq, PartialOrd)]
pub struct Degree(pub f32);

impl From<Degree> for Radians {
    fn from(value: Degree) -> Self {
        Radians(value.0.to_radians())
    }
}

impl From<Radians> for Degree {
    fn from(value: Radians) -> Self {
        Degree(value.0.to_degrees())
    }
}

impl From<Radians> for f32 {
    fn from(value: Radians) -> Self {
        value.0
    }
}

impl Add for Radians {
    type Output = Radians;
    fn add(self, rhs: Self) -> Self::Output { Radians(self.0 + rhs.0) }
}

impl Sub for Radians {
    type Output = Radians;
    fn sub(self, rhs: Self) -> Self::Output { Radians(self.0 - rhs.0) }
}

impl Mul<f32> for Radians {
    type Output = Radians;
    fn mul(self, rhs: f32) -> Self::Output { Radians(self.0 * rhs) }
}

impl Neg for Radians {
    type Output = Radians;
    fn neg(self) -> Self::Output { Radians(-self.0) }
}

impl Radians {
    pub fn clamp(self, min: Radians, max: Radians) -> Radians {
        Radians(self.0.clamp(min.0, max.0))
    }
}

/// Round `value` up to the next multiple of `alignment` (a power of two or any non-zero value).
#[inline]
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment <= 1 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use super::*;

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(0, 256), 0);
        assert_eq!(align_up(1, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
        assert_eq!(align_up(12, 0), 12);
        assert_eq!(align_up(12, 48), 48);
    }

    #[test]
    fn degree_radian_conversion() {
        let r: Radians = Degree(180.0).into();
        assert!((r.0 - std::f32::consts::PI).abs() < 1e-6);
    }
}
