use std::sync::Arc;
use glam::{Mat4, Quat, Vec3, Vec4};
use winit::window::Window;
use lumen::core::camera::Camera;
use lumen::core::cli::EngineArgs;
use lumen::gpu::{CommandList, Frame, GpuError, ImageData};
use lumen::phong::{
    AmbientLight, Cuboid, Cylinder, DirectionalLight, Material, MaterialBuilder, Object, Phong, PhongConfigBuilder,
    Plane, PointLight, Sphere, SpotLight,
};
use lumen::{launch, App, RenderContext, RenderableApp};

const CHECKER_SIZE: u32 = 64;

fn checker() -> lumen::gpu::Result<ImageData> {
    let mut rgba = Vec::with_capacity((CHECKER_SIZE * CHECKER_SIZE * 4) as usize);
    for y in 0..CHECKER_SIZE {
        for x in 0..CHECKER_SIZE {
            let light = ((x / 8) + (y / 8)) % 2 == 0;
            rgba.extend_from_slice(if light { &[230, 230, 230, 255] } else { &[60, 60, 70, 255] });
        }
    }
    ImageData::new(CHECKER_SIZE, CHECKER_SIZE, rgba)
}

pub struct PhongApp {
    phong: Option<Phong>,
    camera: Camera,
    time: f32,
}

impl App for PhongApp {
    fn new(_args: &EngineArgs) -> anyhow::Result<Self> {
        let mut camera = Camera::default();
        camera.set_location(Vec3::new(0.0, 3.0, 8.0));
        camera.look_at(Vec3::ZERO);

        Ok(Self {
            phong: None,
            camera,
            time: 0.0,
        })
    }

    #[profiling::function]
    fn tick(&mut self, delta_time: f32) {
        self.time += delta_time;
        let Some(phong) = self.phong.as_mut() else {
            return;
        };

        if let Some(mut spinning) = phong.object("cube").cloned() {
            spinning.transform = Mat4::from_rotation_translation(
                Quat::from_rotation_y(self.time) * Quat::from_rotation_x(self.time * 0.5),
                Vec3::new(-2.0, 0.75, 0.0),
            );
            if let Err(err) = phong.set_object("cube", spinning) {
                log::warn!("Failed to update the cube: {err}");
            }
        }
    }
}

impl RenderableApp for PhongApp {
    fn prepare(&mut self, context: RenderContext, _window: Arc<Window>) -> anyhow::Result<()> {
        let config = PhongConfigBuilder::default().clear_color([0.05_f32, 0.05, 0.08, 1.0]).build()?;
        let mut phong = Phong::new(context.device(), config)?;

        phong.set_shape("floor", &Plane::new(glam::Vec2::splat(12.0)))?;
        phong.set_shape("cube", &Cuboid::cube(1.5))?;
        phong.set_shape("sphere", &Sphere::new(0.8))?;
        phong.set_shape("cylinder", &Cylinder::new(0.6, 1.6))?;
        phong.set_texture("checker", checker()?)?;

        let floor = MaterialBuilder::default()
            .texture("checker")
            .tiling(glam::Vec2::splat(4.0))
            .shininess(4.0_f32)
            .build()?;
        phong.set_object("floor", Object::new("floor", Mat4::IDENTITY, floor))?;
        phong.set_object(
            "cube",
            Object::new("cube", Mat4::from_translation(Vec3::new(-2.0, 0.75, 0.0)), Material::from_color(Vec4::new(0.9, 0.3, 0.2, 1.0))),
        )?;
        phong.set_object(
            "sphere",
            Object::new("sphere", Mat4::from_translation(Vec3::new(0.0, 0.8, 0.0)), Material::from_color(Vec4::new(0.2, 0.5, 0.9, 1.0))),
        )?;
        phong.set_object(
            "cylinder",
            Object::new("cylinder", Mat4::from_translation(Vec3::new(2.0, 0.8, 0.0)), Material::from_color(Vec4::new(0.3, 0.8, 0.4, 1.0))),
        )?;

        phong.add_ambient(AmbientLight { color: Vec3::splat(0.08) })?;
        phong.add_directional(DirectionalLight { color: Vec3::splat(0.6), direction: Vec3::new(-0.3, -1.0, -0.4) })?;
        phong.add_point(PointLight {
            color: Vec3::new(1.0, 0.8, 0.6),
            position: Vec3::new(0.0, 3.0, 2.0),
            linear: 0.09,
            quadratic: 0.032,
        })?;
        phong.add_spot(SpotLight {
            color: Vec3::new(0.4, 0.4, 1.0),
            position: Vec3::new(0.0, 5.0, 0.0),
            direction: Vec3::NEG_Y,
            angle: lumen::core::math::Degree(25.0).into(),
            decay: 2.0,
            linear: 0.0,
            quadratic: 0.01,
        })?;

        let size = context.surface().size();
        self.camera.set_aspect_ratio(size.width as f32 / size.height.max(1) as f32);
        phong.config(context.surface())?;
        self.phong = Some(phong);
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.camera.set_aspect_ratio(width as f32 / height as f32);
        }
    }

    fn render(&mut self, frame: &Frame) -> lumen::gpu::Result<CommandList> {
        let phong = self.phong.as_mut().ok_or_else(|| GpuError::NotConfigured { what: "phong scene".to_owned() })?;
        phong.set_camera_from(&self.camera)?;

        let mut encoder = phong.render_start(frame)?;
        phong.render_objects(&mut encoder)?;
        phong.render_end(encoder)
    }

    fn release(&mut self) {
        self.phong = None;
    }
}

fn main() {
    launch::<PhongApp>().expect("Failed to launch lumen engine loop!");
}
