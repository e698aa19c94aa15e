use bytemuck::{Pod, Zeroable};
use derive_builder::Builder;
use glam::{Mat4, Vec2, Vec3, Vec4};

/// Surface response of an object.
#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(setter(into))]
pub struct Material {
    #[builder(default = Vec4::ONE)]
    pub color: Vec4,
    #[builder(default = Vec3::ZERO)]
    pub emissive: Vec3,
    /// Specular exponent.
    #[builder(default = 30.0)]
    pub shininess: f32,
    /// Specular intensity.
    #[builder(default = 1.0)]
    pub reflect: f32,
    /// Overall brightness multiplier.
    #[builder(default = 1.0)]
    pub bright: f32,
    /// Name of a registered texture modulating `color`.
    #[builder(default, setter(strip_option))]
    pub texture: Option<String>,
    #[builder(default = Vec2::ONE)]
    pub tiling: Vec2,
    #[builder(default = Vec2::ZERO)]
    pub tile_offset: Vec2,
}

impl Default for Material {
    fn default() -> Self {
        Self::from_color(Vec4::ONE)
    }
}

impl Material {
    pub fn from_color(color: Vec4) -> Self {
        Self {
            color,
            emissive: Vec3::ZERO,
            shininess: 30.0,
            reflect: 1.0,
            bright: 1.0,
            texture: None,
            tiling: Vec2::ONE,
            tile_offset: Vec2::ZERO,
        }
    }
}

/// A mesh placed in the world with a material.
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    pub mesh: String,
    pub transform: Mat4,
    pub material: Material,
}

impl Object {
    pub fn new(mesh: &str, transform: Mat4, material: Material) -> Self {
        Self {
            mesh: mesh.to_owned(),
            transform,
            material,
        }
    }
}

/// Per-object uniform block as read by the shader.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct ObjectUniform {
    model: [f32; 16],
    normal: [f32; 16],
    color: [f32; 4],
    emissive: [f32; 4],
    /// Shininess, reflect, bright and the textured flag.
    shading: [f32; 4],
    tiling: [f32; 4],
}

impl ObjectUniform {
    pub fn new(object: &Object, textured: bool) -> Self {
        let material = &object.material;
        Self {
            model: object.transform.to_cols_array(),
            normal: object.transform.inverse().transpose().to_cols_array(),
            color: material.color.to_array(),
            emissive: material.emissive.extend(0.0).to_array(),
            shading: [material.shininess, material.reflect, material.bright, if textured { 1.0 } else { 0.0 }],
            tiling: [material.tiling.x, material.tiling.y, material.tile_offset.x, material.tile_offset.y],
        }
    }
}

/// Camera uniform block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub(crate) struct CameraUniform {
    view: [f32; 16],
    projection: [f32; 16],
    eye: [f32; 4],
}

impl CameraUniform {
    pub fn new(view: Mat4, projection: Mat4) -> Self {
        let eye = view.inverse().w_axis;
        Self {
            view: view.to_cols_array(),
            projection: projection.to_cols_array(),
            eye: eye.to_array(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builder_defaults_match_plain_material() {
        let built = MaterialBuilder::default().build().unwrap();
        assert_eq!(built, Material::default());

        let textured = MaterialBuilder::default().texture("bricks").shininess(8.0_f32).build().unwrap();
        assert_eq!(textured.texture.as_deref(), Some("bricks"));
        assert_eq!(textured.shininess, 8.0);
    }

    #[test]
    fn normal_matrix_undoes_non_uniform_scale() {
        let object = Object::new("box", Mat4::from_scale(Vec3::new(2.0, 1.0, 1.0)), Material::default());
        let uniform = ObjectUniform::new(&object, false);
        let normal = Mat4::from_cols_array(&uniform.normal);
        assert!(normal.transform_vector3(Vec3::X).abs_diff_eq(Vec3::new(0.5, 0.0, 0.0), 1e-6));
        assert_eq!(uniform.shading[3], 0.0);
    }

    #[test]
    fn camera_eye_is_the_view_origin() {
        let view = Mat4::look_at_rh(Vec3::new(0.0, 2.0, 5.0), Vec3::ZERO, Vec3::Y);
        let uniform = CameraUniform::new(view, Mat4::IDENTITY);
        let eye = Vec4::from_array(uniform.eye);
        assert!(eye.truncate().abs_diff_eq(Vec3::new(0.0, 2.0, 5.0), 1e-5));
        assert!((eye.w - 1.0).abs() < 1e-6);
    }
}
