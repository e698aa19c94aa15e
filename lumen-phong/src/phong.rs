use derive_builder::Builder;
use glam::Mat4;
use log::{debug, info};
use lumen_core::camera::Camera;
use lumen_gpu::{
    CommandEncoder, CommandList, CullMode, Device, Frame, GpuError, ImageData, RenderConfig, Result, ShaderSource,
    ShaderStage, Surface, System, VarRole, VarType,
};
use crate::lights::{AmbientLight, DirectionalLight, LightLimits, Lights, PointLight, SpotLight};
use crate::mesh::MeshData;
use crate::object::{CameraUniform, Object, ObjectUniform};
use crate::registry::Registry;
use crate::shapes::Shape;

const PIPELINE: &str = "phong";
const CAMERA_SET: u32 = 0;
const LIGHTS_SET: u32 = 1;
const OBJECT_SET: u32 = 2;
const TEXTURE_SET: u32 = 3;

const SHADER: &str = include_str!("shaders/phong.wgsl");

#[derive(Debug, Clone, PartialEq, Builder)]
#[builder(default, setter(into))]
pub struct PhongConfig {
    /// Light array sizes compiled into the shader.
    pub lights: LightLimits,
    pub clear_color: [f32; 4],
}

impl Default for PhongConfig {
    fn default() -> Self {
        Self {
            lights: LightLimits::default(),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

fn shader_source(limits: &LightLimits) -> String {
    let [ambient, directional, point, spot] = limits.array_lens();
    format!(
        "const MAX_AMBIENT: u32 = {ambient}u;\n\
         const MAX_DIRECTIONAL: u32 = {directional}u;\n\
         const MAX_POINT: u32 = {point}u;\n\
         const MAX_SPOT: u32 = {spot}u;\n\
         {SHADER}"
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Counts {
    meshes: usize,
    textures: usize,
    objects: usize,
}

/// Meshes, textures, objects and lights drawn by a fixed Phong pipeline.
///
/// Bind sets: 0 camera, 1 lights, 2 per-object uniforms, 3 textures. Every mesh occupies one value of
/// the vertex set. Registering a new mesh, texture or object changes value counts and requires
/// [`Phong::config`] before the next frame.
pub struct Phong {
    config: PhongConfig,
    system: System,
    meshes: Registry<MeshData>,
    textures: Registry<ImageData>,
    objects: Registry<Object>,
    lights: Lights,
    configured: Option<Counts>,
}

impl Phong {
    pub fn new(device: &Device, config: PhongConfig) -> Result<Self> {
        let mut system = System::new(device, "phong");
        let both = ShaderStage::Vertex | ShaderStage::Fragment;

        let vars = system.vars_mut();
        let vertex = vars.vertex_set_mut();
        vertex.add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into())?;
        vertex.add("norm", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into())?;
        vertex.add("tex", VarType::Float32x2, VarRole::Vertex, ShaderStage::Vertex.into())?;
        vertex.add("index", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into())?;

        let sets = [
            ("camera", size_of::<CameraUniform>(), both),
            ("lights", config.lights.uniform_size(), ShaderStage::Fragment.into()),
            ("object", size_of::<ObjectUniform>(), both),
        ];
        for (name, size, stages) in sets {
            let set = vars.add_set()?;
            let ty = VarType::Struct { size: size as u32 };
            vars.set_mut(set)?.add(name, ty, VarRole::Uniform, stages)?;
        }
        let textures = vars.add_set()?;
        vars.set_mut(textures)?
            .add("color", VarType::Texture, VarRole::Texture, ShaderStage::Fragment.into())?;

        system
            .add_pipeline(PIPELINE)?
            .add_shader("phong", ShaderSource::wgsl(shader_source(&config.lights)))?
            .add_entry("phong", ShaderStage::Vertex, "vs_main")?
            .add_entry("phong", ShaderStage::Fragment, "fs_main")?
            .set_cull_mode(CullMode::Back);

        let mut phong = Self {
            lights: Lights::new(config.lights),
            config,
            system,
            meshes: Registry::default(),
            textures: Registry::default(),
            objects: Registry::default(),
            configured: None,
        };
        phong.set_camera(Mat4::IDENTITY, Mat4::IDENTITY)?;
        phong.write_lights()?;
        Ok(phong)
    }

    #[inline]
    pub fn phong_config(&self) -> &PhongConfig {
        &self.config
    }

    #[inline]
    pub fn system(&self) -> &System {
        &self.system
    }

    #[inline]
    pub fn system_mut(&mut self) -> &mut System {
        &mut self.system
    }

    /// Register geometry under `name`. Returns its mesh index.
    pub fn set_mesh(&mut self, name: &str, mesh: MeshData) -> Result<usize> {
        mesh.validate(name)?;
        let (index, _) = self.meshes.insert(name, mesh);
        if let Some(mesh) = self.meshes.get(name) {
            write_mesh(&mut self.system, index, mesh)?;
        }
        debug!("mesh `{name}` set at index {index}");
        Ok(index)
    }

    pub fn set_shape(&mut self, name: &str, shape: &dyn Shape) -> Result<usize> {
        self.set_mesh(name, shape.generate())
    }

    pub fn mesh(&self, name: &str) -> Option<&MeshData> {
        self.meshes.get(name)
    }

    pub fn set_texture(&mut self, name: &str, image: ImageData) -> Result<usize> {
        let (index, _) = self.textures.insert(name, image);
        let var = self.system.vars_mut().var_mut(TEXTURE_SET, "color")?;
        if let (Some(image), true) = (self.textures.get(name), index < var.n_values()) {
            var.value_mut(index)?.set_image(image.clone());
        }
        debug!("texture `{name}` set at index {index}");
        Ok(index)
    }

    /// Register or replace an object. Returns its object index, which stays stable on replacement.
    pub fn set_object(&mut self, name: &str, object: Object) -> Result<usize> {
        let (index, _) = self.objects.insert(name, object);
        self.write_object(index)?;
        Ok(index)
    }

    /// Last object written under `name`.
    pub fn object(&self, name: &str) -> Option<&Object> {
        self.objects.get(name)
    }

    pub fn object_index(&self, name: &str) -> Option<usize> {
        self.objects.index_of(name)
    }

    pub fn lights(&self) -> &Lights {
        &self.lights
    }

    pub fn add_ambient(&mut self, light: AmbientLight) -> Result<usize> {
        let index = self.lights.add_ambient(light)?;
        self.write_lights()?;
        Ok(index)
    }

    pub fn add_directional(&mut self, light: DirectionalLight) -> Result<usize> {
        let index = self.lights.add_directional(light)?;
        self.write_lights()?;
        Ok(index)
    }

    pub fn add_point(&mut self, light: PointLight) -> Result<usize> {
        let index = self.lights.add_point(light)?;
        self.write_lights()?;
        Ok(index)
    }

    pub fn add_spot(&mut self, light: SpotLight) -> Result<usize> {
        let index = self.lights.add_spot(light)?;
        self.write_lights()?;
        Ok(index)
    }

    pub fn reset_lights(&mut self) -> Result<()> {
        self.lights.reset();
        self.write_lights()
    }

    pub fn set_camera(&mut self, view: Mat4, projection: Mat4) -> Result<()> {
        let uniform = CameraUniform::new(view, projection);
        self.system
            .vars_mut()
            .var_mut(CAMERA_SET, "camera")?
            .value_mut(0)?
            .set_from(&[uniform]);
        Ok(())
    }

    pub fn set_camera_from(&mut self, camera: &Camera) -> Result<()> {
        self.set_camera(camera.view(), camera.projection())
    }

    fn write_lights(&mut self) -> Result<()> {
        let bytes = self.lights.to_uniform();
        self.system
            .vars_mut()
            .var_mut(LIGHTS_SET, "lights")?
            .value_mut(0)?
            .copy_from_bytes(&bytes);
        Ok(())
    }

    fn write_object(&mut self, index: usize) -> Result<()> {
        let Some((_, object)) = self.objects.get_index(index) else {
            return Ok(());
        };
        let textured = object
            .material
            .texture
            .as_deref()
            .is_some_and(|texture| self.textures.index_of(texture).is_some());
        let uniform = ObjectUniform::new(object, textured);

        let var = self.system.vars_mut().var_mut(OBJECT_SET, "object")?;
        if index < var.n_values() {
            var.value_mut(index)?.set_from(&[uniform]);
        }
        Ok(())
    }

    fn counts(&self) -> Counts {
        Counts {
            meshes: self.meshes.len(),
            textures: self.textures.len(),
            objects: self.objects.len(),
        }
    }

    /// Size value arrays after the registered meshes, textures and objects, configure against the
    /// formats of `surface` and stage every value for upload.
    #[profiling::function]
    pub fn config(&mut self, surface: &Surface) -> Result<()> {
        let counts = self.counts();
        let vars = self.system.vars_mut();
        vars.vertex_set_mut().set_n_values(counts.meshes);
        vars.set_mut(OBJECT_SET)?.set_n_values(counts.objects);
        vars.set_mut(TEXTURE_SET)?.set_n_values(counts.textures);

        for (index, (_, mesh)) in self.meshes.iter().enumerate() {
            write_mesh(&mut self.system, index, mesh)?;
        }
        let color = self.system.vars_mut().var_mut(TEXTURE_SET, "color")?;
        for (index, (_, image)) in self.textures.iter().enumerate() {
            color.value_mut(index)?.set_image(image.clone());
        }
        for index in 0..counts.objects {
            self.write_object(index)?;
        }

        match self.system.render_config() {
            None => {
                let render = RenderConfig::for_surface(surface).with_clear_color(self.config.clear_color);
                self.system.config_render(render)?;
            }
            Some(render) if render.color_format != surface.format() || render.depth_format != surface.depth_format() => {
                return Err(GpuError::config("phong", "surface formats differ from the first configuration"));
            }
            Some(_) => {}
        }
        if self.system.is_configured() {
            self.system.reconfig_memory()?;
        } else {
            self.system.config()?;
        }
        self.configured = Some(counts);

        info!(
            "Phong configured: {} mesh(es), {} texture(s), {} object(s), {} light(s)",
            counts.meshes,
            counts.textures,
            counts.objects,
            self.lights.len()
        );
        Ok(())
    }

    fn check_configured(&self) -> Result<()> {
        if self.configured != Some(self.counts()) {
            return Err(GpuError::NotConfigured {
                what: "phong for the registered meshes, textures and objects".to_owned(),
            });
        }
        Ok(())
    }

    /// Upload dirty values, begin the pass and bind the Phong pipeline.
    pub fn render_start(&mut self, frame: &Frame) -> Result<CommandEncoder> {
        self.check_configured()?;
        self.system.sync_to_gpu()?;
        let mut encoder = self.system.begin_render_pass(frame)?;
        self.system.bind_pipeline(&mut encoder, PIPELINE)?;
        Ok(encoder)
    }

    pub fn use_object_index(&mut self, index: usize) -> Result<()> {
        self.system.vars_mut().bind_dynamic_value(OBJECT_SET, "object", index)
    }

    pub fn use_object(&mut self, name: &str) -> Result<()> {
        let index = lookup(self.objects.index_of(name), "object", name)?;
        self.use_object_index(index)
    }

    pub fn use_mesh(&mut self, name: &str) -> Result<()> {
        let index = lookup(self.meshes.index_of(name), "mesh", name)?;
        self.system.vars_mut().bind_vertex_value(index)
    }

    pub fn use_texture(&mut self, name: &str) -> Result<()> {
        let index = lookup(self.textures.index_of(name), "texture", name)?;
        self.system.vars_mut().bind_dynamic_value(TEXTURE_SET, "color", index)
    }

    /// Draw the selected mesh with the selected object and texture.
    pub fn render(&mut self, encoder: &mut CommandEncoder) -> Result<()> {
        self.system.bind_vars(encoder)?;
        self.system.draw_indexed(encoder)
    }

    /// Select the object `name` with its mesh and texture, then draw it.
    pub fn render_object(&mut self, encoder: &mut CommandEncoder, name: &str) -> Result<()> {
        let object = self
            .objects
            .get(name)
            .ok_or_else(|| GpuError::config("phong", format!("no object `{name}`")))?;
        let mesh = object.mesh.clone();
        let texture = object
            .material
            .texture
            .clone()
            .filter(|texture| self.textures.index_of(texture).is_some());

        self.use_object(name)?;
        self.use_mesh(&mesh)?;
        if let Some(texture) = texture {
            self.use_texture(&texture)?;
        }
        self.render(encoder)
    }

    /// Draw every registered object in registration order.
    pub fn render_objects(&mut self, encoder: &mut CommandEncoder) -> Result<()> {
        let names: Vec<String> = self.objects.iter().map(|(name, _)| name.to_owned()).collect();
        for name in names {
            self.render_object(encoder, &name)?;
        }
        Ok(())
    }

    pub fn render_end(&mut self, encoder: CommandEncoder) -> Result<CommandList> {
        self.system.end_render_pass(encoder)
    }

    pub fn release(self) {}
}

fn lookup(index: Option<usize>, kind: &str, name: &str) -> Result<usize> {
    index.ok_or_else(|| GpuError::config("phong", format!("no {kind} `{name}`")))
}

fn write_mesh(system: &mut System, index: usize, mesh: &MeshData) -> Result<()> {
    let vertex = system.vars_mut().vertex_set_mut();
    if index >= vertex.n_values() {
        return Ok(());
    }
    vertex.var_mut("pos")?.value_mut(index)?.set_from(&mesh.positions());
    vertex.var_mut("norm")?.value_mut(index)?.set_from(&mesh.normals());
    vertex.var_mut("tex")?.value_mut(index)?.set_from(&mesh.tex_coords());
    vertex.var_mut("index")?.value_mut(index)?.set_from(&mesh.indices);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn shader_declares_light_array_sizes() {
        let limits = LightLimits { ambient: 1, directional: 0, point: 3, spot: 2 };
        let source = shader_source(&limits);
        assert!(source.starts_with("const MAX_AMBIENT: u32 = 1u;\n"));
        assert!(source.contains("const MAX_DIRECTIONAL: u32 = 1u;"));
        assert!(source.contains("const MAX_POINT: u32 = 3u;"));
        assert!(source.contains("const MAX_SPOT: u32 = 2u;"));
        assert!(source.contains("fn fs_main"));
    }

    #[test]
    fn config_builder_overrides_defaults() {
        let config = PhongConfigBuilder::default()
            .clear_color([0.1_f32, 0.2, 0.3, 1.0])
            .build()
            .unwrap();
        assert_eq!(config.lights, LightLimits::default());
        assert_eq!(config.clear_color, [0.1, 0.2, 0.3, 1.0]);
    }
}
