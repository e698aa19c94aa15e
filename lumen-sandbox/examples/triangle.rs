use std::sync::Arc;
use bytemuck::{Pod, Zeroable};
use winit::window::Window;
use lumen::core::cli::EngineArgs;
use lumen::gpu::{
    CommandList, Frame, GpuError, RenderConfig, ShaderSource, ShaderStage, System, VarRole, VarType, VertexLayout,
};
use lumen::{launch, App, RenderContext, RenderableApp};

const SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) color: vec3<f32>,
}

@vertex
fn vs_main(@location(0) pos: vec2<f32>, @location(1) color: vec3<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.position = vec4<f32>(pos, 0.0, 1.0);
    out.color = color;
    return out;
}

@fragment
fn fs_main(@location(0) color: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(color, 1.0);
}
"#;

#[repr(C)]
#[derive(Clone, Copy, Pod, Zeroable, VertexLayout)]
struct Vertex {
    position: [f32; 2],
    color: [f32; 3],
}

const VERTICES: [Vertex; 3] = [
    Vertex { position: [0.0, 0.5], color: [1.0, 0.0, 0.0] },
    Vertex { position: [-0.5, -0.5], color: [0.0, 1.0, 0.0] },
    Vertex { position: [0.5, -0.5], color: [0.0, 0.0, 1.0] },
];

pub struct TriangleApp {
    system: Option<System>,
}

impl App for TriangleApp {
    fn new(_args: &EngineArgs) -> anyhow::Result<Self> {
        Ok(Self { system: None })
    }
}

impl RenderableApp for TriangleApp {
    fn prepare(&mut self, context: RenderContext, _window: Arc<Window>) -> anyhow::Result<()> {
        let mut system = System::new(context.device(), "triangle");

        let vertex = system.vars_mut().vertex_set_mut();
        vertex
            .add("vertex", VarType::interleaved::<Vertex>(), VarRole::Vertex, ShaderStage::Vertex.into())?
            .value_mut(0)?
            .set_from(&VERTICES);
        vertex
            .add("index", VarType::Uint32, VarRole::Index, ShaderStage::Vertex.into())?
            .value_mut(0)?
            .set_from(&[0u32, 1, 2]);

        system
            .add_pipeline("triangle")?
            .add_shader("triangle", ShaderSource::wgsl(SHADER))?
            .add_entry("triangle", ShaderStage::Vertex, "vs_main")?
            .add_entry("triangle", ShaderStage::Fragment, "fs_main")?;

        system.config_render(RenderConfig::for_surface(context.surface()).with_clear_color([0.1, 0.1, 0.1, 1.0]))?;
        system.config()?;

        self.system = Some(system);
        Ok(())
    }

    fn render(&mut self, frame: &Frame) -> lumen::gpu::Result<CommandList> {
        let system = self.system.as_mut().ok_or_else(|| GpuError::NotConfigured { what: "triangle".to_owned() })?;
        system.sync_to_gpu()?;

        let mut encoder = system.begin_render_pass(frame)?;
        system.bind_draw_indexed(&mut encoder, "triangle")?;
        system.end_render_pass(encoder)
    }

    fn release(&mut self) {
        self.system = None;
    }
}

fn main() {
    launch::<TriangleApp>().expect("Failed to launch lumen engine loop!");
}
