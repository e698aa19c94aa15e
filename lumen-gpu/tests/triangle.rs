mod common;

use pretty_assertions::assert_eq;
use lumen_gpu::*;
use common::*;

#[test]
fn renders_one_triangle_frame() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);

    let frame = surface.acquire_next().unwrap();
    assert_eq!(frame.size(), Size::new(800, 600));

    let mut encoder = system.begin_render_pass(&frame).unwrap();
    system.bind_pipeline(&mut encoder, "triangle").unwrap();
    system.bind_vars(&mut encoder).unwrap();
    system.draw_indexed(&mut encoder).unwrap();
    let commands = system.end_render_pass(encoder).unwrap();
    surface.submit_render(commands).unwrap();
    surface.present(frame).unwrap();

    let stats = probe.stats();
    assert_eq!((stats.acquires, stats.submissions, stats.presents), (1, 1, 1));

    let submitted = probe.last_submitted().unwrap();
    assert_eq!(submitted.draw_count(), 1);
    assert!(submitted.commands.contains(&RenderCommand::DrawIndexed {
        indices: 0..3,
        base_vertex: 0,
        instances: 0..1,
    }));
    let vertex_buffers = submitted
        .commands
        .iter()
        .filter(|c| matches!(c, RenderCommand::BindVertexBuffer { .. }))
        .count();
    assert_eq!(vertex_buffers, 2);

    assert_eq!(system.sync_to_gpu().unwrap(), 0);
}

#[test]
fn render_frame_drives_the_whole_protocol() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);

    let outcome = render_frame(
        &mut surface,
        &mut system,
        |system| {
            system
                .vars_mut()
                .vertex_var_mut("color")?
                .value_mut(0)?
                .set_from(&[[1.0f32, 1.0, 1.0]; 3]);
            Ok(())
        },
        draw_triangle,
    )
    .unwrap();

    assert_eq!(outcome, FrameOutcome::Presented);
    assert_eq!(probe.stats().presents, 1);
    assert!(!system.vars().vertex_set().var("color").unwrap().current_value().is_dirty());
}

#[test]
fn last_write_wins_with_a_single_copy() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    let writes = probe.stats().buffer_writes;

    let color = system.vars_mut().vertex_var_mut("color").unwrap().value_mut(0).unwrap();
    color.set_from(&[[0.1f32, 0.1, 0.1]; 3]);
    color.copy_from_bytes(&[0; 36]);
    color.set_from(&[[0.5f32, 0.25, 0.125]; 3]);

    assert_eq!(system.sync_to_gpu().unwrap(), 1);
    assert_eq!(probe.stats().buffer_writes, writes + 1);

    let (buffer, offset) = system.memory().buffer_location(None, "color", 0).unwrap();
    let contents = probe.buffer_contents(buffer).unwrap();
    let expected: Vec<u8> = bytemuck::cast_slice(&[[0.5f32, 0.25, 0.125]; 3]).to_vec();
    assert_eq!(contents[offset as usize..offset as usize + 36].to_vec(), expected);

    assert_eq!(system.sync_to_gpu().unwrap(), 0);
    assert_eq!(probe.stats().buffer_writes, writes + 1);
}

#[test]
fn pipeline_config_twice_fails_until_released() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);

    let err = system.config_pipeline("triangle").unwrap_err();
    assert!(matches!(err, GpuError::AlreadyConfigured { .. }));
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Configured);

    system.release_pipeline("triangle").unwrap();
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Released);
    system.config_pipeline("triangle").unwrap();
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Configured);

    let err = system
        .pipeline_mut("triangle")
        .unwrap()
        .add_entry("triangle", ShaderStage::Compute, "cs_main")
        .unwrap_err();
    assert!(matches!(err, GpuError::AlreadyConfigured { .. }));
}

#[test]
fn system_config_twice_fails_but_memory_can_be_reallocated() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    assert!(system.is_configured());

    let err = system.config().unwrap_err();
    assert!(matches!(err, GpuError::AlreadyConfigured { .. }));
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Configured);

    let (before, _) = system.memory().buffer_location(None, "pos", 0).unwrap();
    system.reconfig_memory().unwrap();
    let (after, _) = system.memory().buffer_location(None, "pos", 0).unwrap();
    assert_ne!(before, after);
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Configured);

    system.release_pipeline("triangle").unwrap();
    assert!(!system.is_configured());
    system.config().unwrap();
    assert_eq!(system.pipeline("triangle").unwrap().state(), PipelineState::Configured);

    let mut fresh = triangle_system(&device);
    fresh.config_render(RenderConfig::for_surface(&surface)).unwrap();
    assert!(matches!(fresh.reconfig_memory(), Err(GpuError::NotConfigured { .. })));
}

#[test]
fn render_configuration_is_fixed_once() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    let err = system
        .config_render(RenderConfig::for_surface(&surface).with_clear_color([1.0; 4]))
        .unwrap_err();
    assert!(matches!(err, GpuError::AlreadyConfigured { .. }));

    let mut fresh = triangle_system(&device);
    assert!(matches!(fresh.config(), Err(GpuError::NotConfigured { .. })));
    let multisampled = RenderConfig { sample_count: 4, ..RenderConfig::for_surface(&surface) };
    assert!(matches!(fresh.config_render(multisampled), Err(GpuError::Unsupported(_))));
}

#[test]
fn released_pipeline_cannot_be_bound() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    system.release_pipeline("triangle").unwrap();

    let frame = surface.acquire_next().unwrap();
    let mut encoder = system.begin_render_pass(&frame).unwrap();
    let err = system.bind_pipeline(&mut encoder, "triangle").unwrap_err();
    assert!(matches!(err, GpuError::Released { .. }));
    surface.abandon_frame();
}

#[test]
fn render_pass_protocol_is_enforced() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    let frame = surface.acquire_next().unwrap();

    let mut encoder = system.begin_render_pass(&frame).unwrap();
    assert!(matches!(system.draw(&mut encoder, 3), Err(GpuError::RenderPass(_))));
    assert!(matches!(system.bind_vars(&mut encoder), Err(GpuError::RenderPass(_))));
    assert!(matches!(system.bind_pipeline(&mut encoder, "missing"), Err(GpuError::RenderPass(_))));

    system.bind_pipeline(&mut encoder, "triangle").unwrap();
    assert!(matches!(system.draw_indexed(&mut encoder), Err(GpuError::RenderPass(_))));

    system.vars_mut().vertex_var_mut("pos").unwrap().value_mut(0).unwrap().set_from(&POSITIONS);
    assert!(matches!(system.bind_vars(&mut encoder), Err(GpuError::RenderPass(_))));

    system.sync_to_gpu().unwrap();
    system.bind_vars(&mut encoder).unwrap();
    system.draw(&mut encoder, 3).unwrap();
    assert_eq!(encoder.draw_count(), 1);

    let commands = system.end_render_pass(encoder).unwrap();
    surface.submit_render(commands).unwrap();
    surface.present(frame).unwrap();
}

#[test]
fn shader_variable_mismatches_are_config_errors() {
    const UNIFORM_SHADER: &str = r#"
struct Tint { color: vec4<f32> }
@group(0) @binding(0) var<uniform> tint: Tint;

@vertex
fn vs_main(@location(0) pos: vec3<f32>) -> @builtin(position) vec4<f32> {
    return vec4<f32>(pos, 1.0);
}

@fragment
fn fs_main() -> @location(0) vec4<f32> {
    return tint.color;
}
"#;

    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let surface = offscreen(&device, 64, 64);

    let configure = |build: &dyn Fn(&mut System)| -> GpuError {
        let mut system = System::new(&device, "mismatch");
        system
            .vars_mut()
            .vertex_set_mut()
            .add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into())
            .unwrap();
        build(&mut system);
        system.config_render(RenderConfig::for_surface(&surface)).unwrap();
        system.config().unwrap_err()
    };

    let missing_set = configure(&|system| {
        system
            .add_pipeline("tint")
            .unwrap()
            .add_shader("tint", ShaderSource::wgsl(UNIFORM_SHADER))
            .unwrap()
            .add_entry("tint", ShaderStage::Vertex, "vs_main")
            .unwrap()
            .add_entry("tint", ShaderStage::Fragment, "fs_main")
            .unwrap();
    });
    match missing_set {
        GpuError::Config { what, message } => {
            assert_eq!(what, "pipeline `tint`");
            assert!(message.contains("@group(0) @binding(0)"), "{message}");
        }
        other => panic!("unexpected error {other:?}"),
    }

    let wrong_kind = configure(&|system| {
        let set = system.vars_mut().add_set().unwrap();
        system
            .vars_mut()
            .set_mut(set)
            .unwrap()
            .add("tint", VarType::Float32x4, VarRole::Storage, ShaderStage::Fragment.into())
            .unwrap();
        system
            .add_pipeline("tint")
            .unwrap()
            .add_shader("tint", ShaderSource::wgsl(UNIFORM_SHADER))
            .unwrap()
            .add_entry("tint", ShaderStage::Vertex, "vs_main")
            .unwrap();
    });
    assert!(matches!(wrong_kind, GpuError::Config { .. }));

    let missing_location = configure(&|system| {
        system
            .add_pipeline("triangle")
            .unwrap()
            .add_shader("triangle", ShaderSource::wgsl(TRIANGLE))
            .unwrap()
            .add_entry("triangle", ShaderStage::Vertex, "vs_main")
            .unwrap();
    });
    match missing_location {
        GpuError::Config { message, .. } => assert!(message.contains("@location(1)"), "{message}"),
        other => panic!("unexpected error {other:?}"),
    }

    let missing_entry = configure(&|system| {
        system
            .add_pipeline("triangle")
            .unwrap()
            .add_shader("triangle", ShaderSource::wgsl(TRIANGLE))
            .unwrap()
            .add_entry("triangle", ShaderStage::Vertex, "main")
            .unwrap();
    });
    assert!(matches!(missing_entry, GpuError::Config { .. }));

    let wrong_stage = configure(&|system| {
        system
            .add_pipeline("triangle")
            .unwrap()
            .add_shader("triangle", ShaderSource::wgsl(TRIANGLE))
            .unwrap()
            .add_entry("triangle", ShaderStage::Vertex, "fs_main")
            .unwrap();
    });
    assert!(matches!(wrong_stage, GpuError::Config { .. }));

    let broken = configure(&|system| {
        system
            .add_pipeline("broken")
            .unwrap()
            .add_shader("broken", ShaderSource::wgsl("@vertex fn vs_main( {"))
            .unwrap()
            .add_entry("broken", ShaderStage::Vertex, "vs_main")
            .unwrap();
    });
    match broken {
        GpuError::Config { what, .. } => assert_eq!(what, "broken/broken"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn outgrown_buffers_are_released_after_frames_in_flight() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    let (old, _) = system.memory().buffer_location(None, "index", 0).unwrap();

    system
        .vars_mut()
        .vertex_var_mut("index")
        .unwrap()
        .value_mut(0)
        .unwrap()
        .set_from(&[0u32, 1, 2, 2, 1, 0]);
    system.sync_to_gpu().unwrap();

    let (grown, _) = system.memory().buffer_location(None, "index", 0).unwrap();
    assert_ne!(old, grown);
    assert!(probe.is_buffer_alive(old));

    let render = |surface: &mut Surface, system: &mut System| {
        render_frame(surface, system, |_| Ok(()), draw_triangle).unwrap()
    };
    render(&mut surface, &mut system);
    render(&mut surface, &mut system);
    assert!(probe.is_buffer_alive(old));

    render(&mut surface, &mut system);
    assert!(!probe.is_buffer_alive(old));
    assert!(probe.is_buffer_alive(grown));

    let last = probe.last_submitted().unwrap();
    assert!(last.commands.contains(&RenderCommand::DrawIndexed {
        indices: 0..6,
        base_vertex: 0,
        instances: 0..1,
    }));
}

#[test]
fn frame_updates_do_not_stall_the_device() {
    let Harness { probe, gpu: _gpu, device } = harness();
    assert_eq!(probe.wait_timeout(), Some(std::time::Duration::from_secs(2)));

    let mut surface = offscreen(&device, 800, 600);
    let mut system = configured_triangle(&device, &surface);
    let idles = probe.stats().wait_idles;

    for shade in [0.25f32, 0.5, 0.75] {
        render_frame(
            &mut surface,
            &mut system,
            |system| {
                system
                    .vars_mut()
                    .vertex_var_mut("color")?
                    .value_mut(0)?
                    .set_from(&[[shade; 3]; 3]);
                Ok(())
            },
            draw_triangle,
        )
        .unwrap();
    }

    let stats = probe.stats();
    assert_eq!(stats.submissions, 3);
    assert_eq!(stats.wait_idles, idles);
}
