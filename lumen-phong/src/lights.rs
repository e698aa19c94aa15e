//! Light descriptors and their packed uniform block.

use bytemuck::{Pod, Zeroable};
use glam::{Vec3, Vec4};
use lumen_core::math::Radians;
use lumen_gpu::{GpuError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AmbientLight {
    pub color: Vec3,
}

/// Light arriving from infinitely far away, travelling along `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionalLight {
    pub color: Vec3,
    pub direction: Vec3,
}

/// Omnidirectional light with `1 / (1 + linear * d + quadratic * d^2)` attenuation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointLight {
    pub color: Vec3,
    pub position: Vec3,
    pub linear: f32,
    pub quadratic: f32,
}

/// Point light restricted to a cone of half-angle `angle` around `direction`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpotLight {
    pub color: Vec3,
    pub position: Vec3,
    pub direction: Vec3,
    pub angle: Radians,
    /// Falloff exponent from the cone axis to its edge.
    pub decay: f32,
    pub linear: f32,
    pub quadratic: f32,
}

/// Maximum number of lights of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightLimits {
    pub ambient: usize,
    pub directional: usize,
    pub point: usize,
    pub spot: usize,
}

impl Default for LightLimits {
    fn default() -> Self {
        Self {
            ambient: 2,
            directional: 4,
            point: 8,
            spot: 8,
        }
    }
}

impl LightLimits {
    /// Array lengths of the uniform block. Shader arrays cannot be empty.
    pub(crate) fn array_lens(&self) -> [usize; 4] {
        [self.ambient, self.directional, self.point, self.spot].map(|n| n.max(1))
    }

    /// Byte size of the packed uniform block.
    pub(crate) fn uniform_size(&self) -> usize {
        let [ambient, directional, point, spot] = self.array_lens();
        size_of::<[u32; 4]>()
            + ambient * size_of::<AmbientUniform>()
            + directional * size_of::<DirectionalUniform>()
            + point * size_of::<PointUniform>()
            + spot * size_of::<SpotUniform>()
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct AmbientUniform {
    color: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct DirectionalUniform {
    color: [f32; 4],
    direction: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct PointUniform {
    color: [f32; 4],
    position: [f32; 4],
    attenuation: [f32; 4],
}

#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct SpotUniform {
    color: [f32; 4],
    position: [f32; 4],
    direction: [f32; 4],
    cone: [f32; 4],
}

fn vec4(v: Vec3, w: f32) -> [f32; 4] {
    v.extend(w).to_array()
}

/// Registered lights, bounded per kind.
#[derive(Debug, Clone, Default)]
pub struct Lights {
    limits: LightLimits,
    ambient: Vec<AmbientLight>,
    directional: Vec<DirectionalLight>,
    point: Vec<PointLight>,
    spot: Vec<SpotLight>,
}

fn push<T>(lights: &mut Vec<T>, light: T, kind: &'static str, max: usize) -> Result<usize> {
    if lights.len() >= max {
        return Err(GpuError::TooManyLights { kind, max });
    }
    lights.push(light);
    Ok(lights.len() - 1)
}

impl Lights {
    pub fn new(limits: LightLimits) -> Self {
        Self {
            limits,
            ..Default::default()
        }
    }

    #[inline]
    pub fn limits(&self) -> &LightLimits {
        &self.limits
    }

    pub fn add_ambient(&mut self, light: AmbientLight) -> Result<usize> {
        push(&mut self.ambient, light, "ambient", self.limits.ambient)
    }

    pub fn add_directional(&mut self, light: DirectionalLight) -> Result<usize> {
        push(&mut self.directional, light, "directional", self.limits.directional)
    }

    pub fn add_point(&mut self, light: PointLight) -> Result<usize> {
        push(&mut self.point, light, "point", self.limits.point)
    }

    pub fn add_spot(&mut self, light: SpotLight) -> Result<usize> {
        push(&mut self.spot, light, "spot", self.limits.spot)
    }

    pub fn reset(&mut self) {
        self.ambient.clear();
        self.directional.clear();
        self.point.clear();
        self.spot.clear();
    }

    pub fn ambient(&self) -> &[AmbientLight] {
        &self.ambient
    }

    pub fn directional(&self) -> &[DirectionalLight] {
        &self.directional
    }

    pub fn point(&self) -> &[PointLight] {
        &self.point
    }

    pub fn spot(&self) -> &[SpotLight] {
        &self.spot
    }

    pub fn len(&self) -> usize {
        self.ambient.len() + self.directional.len() + self.point.len() + self.spot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Pack counts and light arrays into the layout of the shader's `Lights` block.
    pub(crate) fn to_uniform(&self) -> Vec<u8> {
        let [ambient_len, directional_len, point_len, spot_len] = self.limits.array_lens();
        let mut bytes = Vec::with_capacity(self.limits.uniform_size());

        let counts = [self.ambient.len(), self.directional.len(), self.point.len(), self.spot.len()].map(|n| n as u32);
        bytes.extend_from_slice(bytemuck::bytes_of(&counts));

        let mut ambient = vec![AmbientUniform::zeroed(); ambient_len];
        for (slot, light) in ambient.iter_mut().zip(&self.ambient) {
            slot.color = vec4(light.color, 1.0);
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&ambient));

        let mut directional = vec![DirectionalUniform::zeroed(); directional_len];
        for (slot, light) in directional.iter_mut().zip(&self.directional) {
            slot.color = vec4(light.color, 1.0);
            slot.direction = vec4(light.direction.normalize_or_zero(), 0.0);
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&directional));

        let mut point = vec![PointUniform::zeroed(); point_len];
        for (slot, light) in point.iter_mut().zip(&self.point) {
            slot.color = vec4(light.color, 1.0);
            slot.position = vec4(light.position, 1.0);
            slot.attenuation = [light.linear, light.quadratic, 0.0, 0.0];
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&point));

        let mut spot = vec![SpotUniform::zeroed(); spot_len];
        for (slot, light) in spot.iter_mut().zip(&self.spot) {
            slot.color = vec4(light.color, 1.0);
            slot.position = vec4(light.position, 1.0);
            slot.direction = vec4(light.direction.normalize_or_zero(), 0.0);
            slot.cone = Vec4::new(light.angle.0.cos(), light.decay, light.linear, light.quadratic).to_array();
        }
        bytes.extend_from_slice(bytemuck::cast_slice(&spot));

        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn point(x: f32) -> PointLight {
        PointLight {
            color: Vec3::ONE,
            position: Vec3::new(x, 0.0, 0.0),
            linear: 0.1,
            quadratic: 0.01,
        }
    }

    #[test]
    fn overflow_leaves_registered_lights_untouched() {
        let mut lights = Lights::new(LightLimits { point: 2, ..Default::default() });
        assert_eq!(lights.add_point(point(1.0)).unwrap(), 0);
        assert_eq!(lights.add_point(point(2.0)).unwrap(), 1);

        let err = lights.add_point(point(3.0)).unwrap_err();
        assert!(matches!(err, GpuError::TooManyLights { kind: "point", max: 2 }));
        assert_eq!(lights.point(), &[point(1.0), point(2.0)]);

        lights.add_ambient(AmbientLight { color: Vec3::splat(0.1) }).unwrap();
        assert_eq!(lights.len(), 3);
    }

    #[test]
    fn zero_limit_rejects_every_light() {
        let mut lights = Lights::new(LightLimits { spot: 0, ..Default::default() });
        let spot = SpotLight {
            color: Vec3::ONE,
            position: Vec3::Y,
            direction: Vec3::NEG_Y,
            angle: Radians(0.5),
            decay: 1.0,
            linear: 0.0,
            quadratic: 0.0,
        };
        assert!(matches!(lights.add_spot(spot), Err(GpuError::TooManyLights { kind: "spot", max: 0 })));
        assert!(lights.is_empty());
    }

    #[test]
    fn uniform_block_has_fixed_size() {
        let limits = LightLimits { ambient: 1, directional: 2, point: 0, spot: 1 };
        let mut lights = Lights::new(limits);
        assert_eq!(limits.uniform_size(), 16 + 16 + 2 * 32 + 48 + 64);
        assert_eq!(lights.to_uniform().len(), limits.uniform_size());

        lights
            .add_directional(DirectionalLight { color: Vec3::ONE, direction: Vec3::new(0.0, -2.0, 0.0) })
            .unwrap();
        let bytes = lights.to_uniform();
        assert_eq!(bytes.len(), limits.uniform_size());

        let counts: [u32; 4] = bytemuck::pod_read_unaligned(&bytes[..16]);
        assert_eq!(counts, [0, 1, 0, 0]);
        let direction: [f32; 4] = bytemuck::pod_read_unaligned(&bytes[48..64]);
        assert_eq!(direction, [0.0, -1.0, 0.0, 0.0]);

        lights.reset();
        assert!(lights.is_empty());
    }
}
