use std::time::Duration;
use pretty_assertions::assert_eq;
use smallvec::smallvec;
use lumen_rhi::*;

const TRIANGLE: &str = r#"
struct Params { tint: vec4<f32> }
@group(0) @binding(0) var<uniform> params: Params;

@vertex
fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return params.tint;
}
"#;

fn device(backend: &HeadlessBackend) -> Box<dyn DeviceBackend> {
    backend.create_device(0, 0).expect("headless device")
}

fn surface_config(width: u32, height: u32) -> SurfaceConfig {
    SurfaceConfig {
        size: Size::new(width, height),
        present_mode: PresentMode::Fifo,
        depth_format: Some(Format::Depth32Float),
        frames_in_flight: 2,
    }
}

struct Scene {
    buffer: BufferId,
    layout: BindGroupLayoutId,
    group: BindGroupId,
    pipeline: PipelineId,
    module: ShaderModuleId,
}

fn build_scene(device: &mut dyn DeviceBackend) -> Scene {
    let buffer = device
        .create_buffer(&BufferDesc { label: "params".into(), size: 512, usage: BufferUsage::Uniform.into() })
        .unwrap();
    let layout = device
        .create_bind_group_layout(&BindGroupLayoutDesc {
            label: "params".into(),
            entries: vec![BindGroupLayoutEntry {
                binding: 0,
                kind: BindingKind::UniformDynamic { min_size: 16 },
                stages: ShaderStage::Fragment.into(),
            }],
        })
        .unwrap();
    let group = device
        .create_bind_group(&BindGroupDesc {
            label: "params".into(),
            layout,
            entries: vec![BindGroupEntry {
                binding: 0,
                resource: BindingResource::Buffer { buffer, offset: 0, size: 16 },
            }],
        })
        .unwrap();
    let shader = ShaderModule::parse("triangle", &ShaderSource::wgsl(TRIANGLE)).unwrap();
    let module = device.create_shader_module(&shader).unwrap();
    let pipeline = device
        .create_pipeline(&PipelineDesc {
            label: "triangle".into(),
            vertex: ShaderEntry { module, entry: "vs_main".into() },
            fragment: Some(ShaderEntry { module, entry: "fs_main".into() }),
            bind_group_layouts: vec![layout],
            vertex_buffers: vec![],
            topology: PrimitiveTopology::TriangleList,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            blend: BlendMode::Replace,
            color_format: HEADLESS_SURFACE_FORMAT,
            depth_format: Some(Format::Depth32Float),
            sample_count: 1,
        })
        .unwrap();
    Scene { buffer, layout, group, pipeline, module }
}

#[test]
fn exposes_one_cpu_adapter() {
    let backend = HeadlessBackend::new();
    let adapters = backend.adapters();
    assert_eq!(adapters.len(), 1);
    assert_eq!(adapters[0].name, HEADLESS_ADAPTER_NAME);
    assert_eq!(adapters[0].kind, AdapterKind::Cpu);
    assert!(adapters[0].queue_families[0].capabilities.contains(QueueCapability::Graphics));
    assert!(!adapters[0].queue_families[1].capabilities.contains(QueueCapability::Graphics));
}

#[test]
fn unknown_queue_family_is_rejected() {
    let backend = HeadlessBackend::new();
    assert!(matches!(backend.create_device(0, 7), Err(GpuError::NoSuitableQueue { .. })));
    assert_eq!(backend.probe().live_devices(), 0);
}

#[test]
fn buffer_writes_land_at_offsets() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut device = device(&backend);

    let buffer = device
        .create_buffer(&BufferDesc { label: "data".into(), size: 8, usage: BufferUsage::Storage.into() })
        .unwrap();
    device.write_buffer(buffer, 4, &[1, 2, 3, 4]).unwrap();

    assert_eq!(probe.buffer_contents(buffer), Some(vec![0, 0, 0, 0, 1, 2, 3, 4]));
    assert!(device.write_buffer(buffer, 6, &[9, 9, 9]).is_err());
    assert_eq!(probe.stats().buffer_writes, 1);

    device.destroy_buffer(buffer);
    assert!(!probe.is_buffer_alive(buffer));
}

#[test]
fn texture_writes_require_matching_size() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut device = device(&backend);

    let texture = device
        .create_texture(&TextureDesc { label: "tex".into(), size: Size::new(2, 2), format: Format::Rgba8Srgb })
        .unwrap();
    device.write_texture(texture, &ImageData::solid(2, 2, [255, 0, 0, 255])).unwrap();
    assert!(device.write_texture(texture, &ImageData::solid(1, 1, [0; 4])).is_err());

    let contents = probe.texture_contents(texture).unwrap();
    assert_eq!(&contents[..4], &[255, 0, 0, 255]);
    assert_eq!(probe.texture_size(texture), Some(Size::new(2, 2)));
}

#[test]
fn bind_group_must_match_layout() {
    let backend = HeadlessBackend::new();
    let mut device = device(&backend);
    let scene = build_scene(device.as_mut());

    let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
    let result = device.create_bind_group(&BindGroupDesc {
        label: "wrong".into(),
        layout: scene.layout,
        entries: vec![BindGroupEntry { binding: 0, resource: BindingResource::Sampler(sampler) }],
    });
    assert!(result.is_err());
}

#[test]
fn multisampling_is_unsupported() {
    let backend = HeadlessBackend::new();
    let mut device = device(&backend);
    let scene = build_scene(device.as_mut());

    let result = device.create_pipeline(&PipelineDesc {
        label: "msaa".into(),
        vertex: ShaderEntry { module: scene.module, entry: "vs_main".into() },
        fragment: None,
        bind_group_layouts: vec![],
        vertex_buffers: vec![],
        topology: PrimitiveTopology::TriangleList,
        cull_mode: CullMode::Back,
        front_face: FrontFace::Ccw,
        blend: BlendMode::Replace,
        color_format: HEADLESS_SURFACE_FORMAT,
        depth_format: None,
        sample_count: 4,
    });
    assert!(matches!(result, Err(GpuError::Unsupported(_))));
}

#[test]
fn surface_ring_round_robins_and_rebuilds() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut device = device(&backend);

    let (surface, info) = device.create_surface(&SurfaceTarget::Offscreen, &surface_config(800, 600)).unwrap();
    assert_eq!(info.image_count, 3);
    assert_eq!(info.format, HEADLESS_SURFACE_FORMAT);

    let indices: Vec<u32> = (0..4)
        .map(|_| device.acquire_image(surface, Duration::from_secs(1)).unwrap().index)
        .collect();
    assert_eq!(indices, vec![0, 1, 2, 0]);

    let info = device.configure_surface(surface, &surface_config(400, 300)).unwrap();
    assert_eq!(info.size, Size::new(400, 300));
    assert_eq!(probe.surface_size(surface), Some(Size::new(400, 300)));
    assert_eq!(probe.stats().ring_builds, 2);
    assert_eq!(probe.stats().ring_releases, 1);
    assert_eq!(device.acquire_image(surface, Duration::from_secs(1)).unwrap().index, 0);

    device.destroy_surface(surface);
    assert_eq!(probe.stats().ring_releases, 2);
    assert_eq!(probe.live_surfaces(), 0);
}

#[test]
fn injected_faults_are_consumed_in_order() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut device = device(&backend);
    let (surface, _) = device.create_surface(&SurfaceTarget::Offscreen, &surface_config(64, 64)).unwrap();

    probe.inject_acquire_timeout(1);
    probe.inject_outdated_acquire(1);
    let timeout = Duration::from_millis(10);
    assert!(matches!(device.acquire_image(surface, timeout), Err(GpuError::Timeout(_))));
    assert!(matches!(device.acquire_image(surface, timeout), Err(GpuError::SurfaceOutdated)));
    assert!(device.acquire_image(surface, timeout).is_ok());

    probe.inject_outdated_present(1);
    assert!(matches!(device.present(surface, 0), Err(GpuError::SurfaceOutdated)));
    assert!(device.present(surface, 0).is_ok());
}

#[test]
fn valid_command_list_is_recorded() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let mut device = device(&backend);
    let scene = build_scene(device.as_mut());
    let (surface, info) = device.create_surface(&SurfaceTarget::Offscreen, &surface_config(800, 600)).unwrap();
    let image = device.acquire_image(surface, Duration::from_secs(1)).unwrap();

    let list = CommandList {
        surface,
        image_index: image.index,
        commands: vec![
            RenderCommand::BeginRenderPass(RenderPassDesc {
                surface,
                image_index: image.index,
                size: info.size,
                color: LoadOp::Clear([0.0, 0.0, 0.0, 1.0]),
                depth: Some(LoadOp::Clear(1.0)),
            }),
            RenderCommand::BindPipeline(scene.pipeline),
            RenderCommand::BindGroup { index: 0, group: scene.group, dynamic_offsets: smallvec![256] },
            RenderCommand::Draw { vertices: 0..3, instances: 0..1 },
            RenderCommand::EndRenderPass,
        ],
    };
    device.submit(&list).unwrap();
    device.present(surface, image.index).unwrap();

    assert_eq!(probe.last_submitted().map(|l| l.draw_count()), Some(1));
    assert_eq!(probe.stats().presents, 1);
    assert!(probe.is_buffer_alive(scene.buffer));
}

#[test]
fn invalid_command_lists_are_rejected() {
    let backend = HeadlessBackend::new();
    let mut device = device(&backend);
    let scene = build_scene(device.as_mut());
    let (surface, info) = device.create_surface(&SurfaceTarget::Offscreen, &surface_config(800, 600)).unwrap();
    let begin = RenderCommand::BeginRenderPass(RenderPassDesc {
        surface,
        image_index: 0,
        size: info.size,
        color: LoadOp::Load,
        depth: None,
    });
    let list = |commands| CommandList { surface, image_index: 0, commands };

    // draw without pipeline
    let no_pipeline = list(vec![begin.clone(), RenderCommand::Draw { vertices: 0..3, instances: 0..1 }, RenderCommand::EndRenderPass]);
    assert!(device.submit(&no_pipeline).is_err());

    // dynamic offset past the end of the buffer
    let overrun = list(vec![
        begin.clone(),
        RenderCommand::BindPipeline(scene.pipeline),
        RenderCommand::BindGroup { index: 0, group: scene.group, dynamic_offsets: smallvec![1024] },
        RenderCommand::EndRenderPass,
    ]);
    assert!(device.submit(&overrun).is_err());

    let open = list(vec![begin]);
    assert!(device.submit(&open).is_err());
}

#[test]
fn dropping_the_device_is_tracked() {
    let backend = HeadlessBackend::new();
    let probe = backend.probe();
    let device = device(&backend);
    assert_eq!(probe.live_devices(), 1);
    drop(device);
    assert_eq!(probe.live_devices(), 0);
}
