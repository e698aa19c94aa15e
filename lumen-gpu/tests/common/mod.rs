#![allow(dead_code)]

use lumen_gpu::rhi::{HeadlessBackend, HeadlessProbe};
use lumen_gpu::*;

pub const TRIANGLE: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) pos: vec3<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(pos, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;

pub const POSITIONS: [[f32; 3]; 3] = [[0.0, 0.5, 0.0], [-0.5, -0.5, 0.0], [0.5, -0.5, 0.0]];
pub const COLORS: [[f32; 3]; 3] = [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
pub const INDICES: [u32; 3] = [0, 1, 2];

pub struct Harness {
    pub probe: HeadlessProbe,
    pub gpu: Gpu,
    pub device: Device,
}

pub fn harness() -> Harness {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let config = GpuConfigBuilder::default()
        .app_name("test")
        .backend(BackendKind::Headless)
        .build()
        .expect("gpu config");
    let gpu = Gpu::with_backend("test", Box::new(backend), config).expect("headless gpu");
    let device = Device::new(&gpu, QueueCapability::Graphics.into()).expect("graphics device");
    Harness { probe, gpu, device }
}

pub fn offscreen(device: &Device, width: u32, height: u32) -> Surface {
    Surface::new(device, SurfaceTarget::Offscreen, Size::new(width, height)).expect("offscreen surface")
}

/// Register the triangle variables and pipeline without configuring anything.
pub fn triangle_system(device: &Device) -> System {
    let mut system = System::new(device, "triangle");
    let vertex = system.vars_mut().vertex_set_mut();
    vertex
        .add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into())
        .unwrap()
        .value_mut(0)
        .unwrap()
        .set_from(&POSITIONS);
    vertex
        .add("color", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into())
        .unwrap()
        .value_mut(0)
        .unwrap()
        .set_from(&COLORS);
    vertex
        .add("index", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into())
        .unwrap()
        .value_mut(0)
        .unwrap()
        .set_from(&INDICES);

    system
        .add_pipeline("triangle")
        .unwrap()
        .add_shader("triangle", ShaderSource::wgsl(TRIANGLE))
        .unwrap()
        .add_entry("triangle", ShaderStage::Vertex, "vs_main")
        .unwrap()
        .add_entry("triangle", ShaderStage::Fragment, "fs_main")
        .unwrap();
    system
}

/// Triangle system configured against `surface`.
pub fn configured_triangle(device: &Device, surface: &Surface) -> System {
    let mut system = triangle_system(device);
    system.config_render(RenderConfig::for_surface(surface)).unwrap();
    system.config().unwrap();
    system
}

pub fn draw_triangle(system: &mut System, encoder: &mut CommandEncoder) -> Result<()> {
    system.bind_draw_indexed(encoder, "triangle")
}

pub fn empty_list(frame: &Frame) -> CommandList {
    CommandList { surface: frame.surface(), image_index: frame.index(), commands: vec![] }
}
