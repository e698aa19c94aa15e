use glam::{Mat4, Vec3, Vec4};
use lumen_core::camera::Camera;
use lumen_gpu::rhi::{HeadlessBackend, HeadlessProbe};
use lumen_gpu::*;
use lumen_phong::*;
use pretty_assertions::assert_eq;

struct Scene {
    probe: HeadlessProbe,
    _gpu: Gpu,
    device: Device,
    surface: Surface,
}

fn scene() -> Scene {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let config = GpuConfigBuilder::default()
        .backend(BackendKind::Headless)
        .build()
        .unwrap();
    let gpu = Gpu::with_backend("phong", Box::new(backend), config).unwrap();
    let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
    let surface = Surface::new(&device, SurfaceTarget::Offscreen, Size::new(640, 480)).unwrap();
    Scene { probe, _gpu: gpu, device, surface }
}

fn white_light() -> PointLight {
    PointLight {
        color: Vec3::ONE,
        position: Vec3::new(0.0, 3.0, 3.0),
        linear: 0.09,
        quadratic: 0.032,
    }
}

fn populated(device: &Device) -> Phong {
    let mut phong = Phong::new(device, PhongConfig::default()).unwrap();
    phong.set_shape("cube", &Cuboid::cube(1.0)).unwrap();
    phong.set_shape("ball", &Sphere::new(0.5)).unwrap();
    phong.set_texture("checker", ImageData::solid(2, 2, [200, 50, 50, 255])).unwrap();

    let textured = MaterialBuilder::default().texture("checker").build().unwrap();
    phong.set_object("crate", Object::new("cube", Mat4::IDENTITY, textured)).unwrap();
    let red = Material::from_color(Vec4::new(1.0, 0.0, 0.0, 1.0));
    phong
        .set_object("ball", Object::new("ball", Mat4::from_translation(Vec3::X * 2.0), red))
        .unwrap();

    phong.add_ambient(AmbientLight { color: Vec3::splat(0.1) }).unwrap();
    phong.add_point(white_light()).unwrap();
    let mut camera = Camera::default();
    camera.set_location(Vec3::new(0.0, 2.0, 6.0));
    camera.look_at(Vec3::ZERO);
    phong.set_camera_from(&camera).unwrap();
    phong
}

#[test]
fn renders_every_object_with_its_mesh() {
    let Scene { probe, _gpu, device, mut surface } = scene();
    let mut phong = populated(&device);
    phong.config(&surface).unwrap();

    let outcome = present_frame(&mut surface, |frame| {
        let mut encoder = phong.render_start(frame)?;
        phong.render_object(&mut encoder, "crate")?;
        phong.render_object(&mut encoder, "ball")?;
        phong.render_end(encoder)
    })
    .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);

    let sphere_indices = Sphere::new(0.5).counts().1 as u32;
    let draws: Vec<_> = probe
        .last_submitted()
        .unwrap()
        .commands
        .into_iter()
        .filter_map(|command| match command {
            RenderCommand::DrawIndexed { indices, .. } => Some(indices),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![0..36, 0..sphere_indices]);
}

#[test]
fn objects_read_back_the_last_write() {
    let Scene { device, .. } = scene();
    let mut phong = populated(&device);

    let moved = Object::new("cube", Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)), Material::default());
    let index = phong.set_object("crate", moved.clone()).unwrap();
    assert_eq!(index, 0);
    assert_eq!(phong.object("crate"), Some(&moved));
    assert_eq!(phong.object_index("ball"), Some(1));
    assert_eq!(phong.object("missing"), None);
}

#[test]
fn light_overflow_is_rejected_per_kind() {
    let Scene { device, .. } = scene();
    let limits = LightLimits { point: 1, ..Default::default() };
    let config = PhongConfigBuilder::default().lights(limits).build().unwrap();
    let mut phong = Phong::new(&device, config).unwrap();

    phong.add_point(white_light()).unwrap();
    let err = phong.add_point(white_light()).unwrap_err();
    assert!(matches!(err, GpuError::TooManyLights { kind: "point", max: 1 }));
    assert_eq!(err.class(), ErrorClass::Setup);
    assert_eq!(phong.lights().point(), &[white_light()]);

    phong.add_directional(DirectionalLight { color: Vec3::ONE, direction: Vec3::NEG_Y }).unwrap();
    phong.reset_lights().unwrap();
    assert!(phong.lights().is_empty());
}

#[test]
fn new_objects_require_reconfiguration() {
    let Scene { device, mut surface, .. } = scene();
    let mut phong = populated(&device);
    phong.config(&surface).unwrap();

    phong
        .set_object("second", Object::new("cube", Mat4::from_scale(Vec3::splat(0.5)), Material::default()))
        .unwrap();
    let frame = surface.acquire_next().unwrap();
    assert!(matches!(phong.render_start(&frame), Err(GpuError::NotConfigured { .. })));
    surface.abandon_frame();

    phong.config(&surface).unwrap();
    let outcome = present_frame(&mut surface, |frame| {
        let mut encoder = phong.render_start(frame)?;
        phong.render_objects(&mut encoder)?;
        phong.render_end(encoder)
    })
    .unwrap();
    assert_eq!(outcome, FrameOutcome::Presented);
}

#[test]
fn unknown_names_are_config_errors() {
    let Scene { device, surface, .. } = scene();
    let mut phong = populated(&device);
    phong.config(&surface).unwrap();

    assert!(matches!(phong.use_mesh("cone"), Err(GpuError::Config { .. })));
    assert!(matches!(phong.use_texture("marble"), Err(GpuError::Config { .. })));
    assert!(matches!(phong.use_object("ghost"), Err(GpuError::Config { .. })));
    assert!(matches!(phong.use_object_index(2), Err(GpuError::ValueIndexOutOfRange { .. })));

    let broken = MeshData::new(vec![Vertex::new(Vec3::ZERO, Vec3::Y, glam::Vec2::ZERO)], vec![0, 0, 1]);
    assert!(matches!(phong.set_mesh("broken", broken), Err(GpuError::Config { .. })));
    assert!(phong.mesh("broken").is_none());
}

#[test]
fn replacing_a_mesh_keeps_the_configuration() {
    let Scene { probe, _gpu, device, mut surface } = scene();
    let mut phong = populated(&device);
    phong.config(&surface).unwrap();

    let index = phong.set_shape("cube", &Cuboid { segments: glam::UVec3::splat(2), ..Cuboid::cube(1.0) }).unwrap();
    assert_eq!(index, 0);

    present_frame(&mut surface, |frame| {
        let mut encoder = phong.render_start(frame)?;
        phong.render_object(&mut encoder, "crate")?;
        phong.render_end(encoder)
    })
    .unwrap();

    let last = probe.last_submitted().unwrap();
    assert!(last.commands.contains(&RenderCommand::DrawIndexed {
        indices: 0..6 * 4 * 6,
        base_vertex: 0,
        instances: 0..1,
    }));
}
