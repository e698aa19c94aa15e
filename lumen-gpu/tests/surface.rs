mod common;

use pretty_assertions::assert_eq;
use lumen_gpu::*;
use common::*;

fn present_empty(surface: &mut Surface) -> FrameOutcome {
    present_frame(surface, |frame| Ok(empty_list(frame))).unwrap()
}

#[test]
fn resizing_to_the_same_size_is_a_no_op() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let before = probe.stats();

    assert!(!surface.set_size(Size::new(800, 600)).unwrap());

    let after = probe.stats();
    assert_eq!(after.ring_builds, before.ring_builds);
    assert_eq!(after.ring_releases, before.ring_releases);
    assert_eq!(after.wait_idles, before.wait_idles);
}

#[test]
fn resize_rebuilds_the_ring_once() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);

    assert!(surface.set_size(Size::new(400, 300)).unwrap());

    let stats = probe.stats();
    assert_eq!(stats.ring_builds, 2);
    assert_eq!(stats.ring_releases, 1);
    assert_eq!(probe.surface_size(surface.id()), Some(Size::new(400, 300)));

    let frame = surface.acquire_next().unwrap();
    assert_eq!(frame.size(), Size::new(400, 300));
    surface.abandon_frame();
}

#[test]
fn minimized_surface_defers_the_rebuild() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let builds = probe.stats().ring_builds;

    assert!(!surface.set_size(Size::new(0, 0)).unwrap());
    assert!(surface.is_minimized());
    assert_eq!(probe.stats().ring_builds, builds);
    assert!(matches!(surface.acquire_next(), Err(GpuError::SurfaceOutdated)));
    assert_eq!(present_empty(&mut surface), FrameOutcome::Skipped(SkipReason::ZeroSize));
    assert_eq!(probe.stats().acquires, 0);

    assert!(surface.set_size(Size::new(1024, 768)).unwrap());
    assert_eq!(probe.stats().ring_builds, builds + 1);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
    assert_eq!(surface.size(), Size::new(1024, 768));
}

#[test]
fn frames_follow_acquire_submit_present_order() {
    let Harness { probe: _probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 320, 240);

    let frame = surface.acquire_next().unwrap();
    assert!(matches!(surface.acquire_next(), Err(GpuError::FrameOrder(_))));

    let list = empty_list(&frame);
    surface.submit_render(list.clone()).unwrap();
    assert!(matches!(surface.submit_render(list), Err(GpuError::FrameOrder(_))));
    assert!(matches!(surface.acquire_next(), Err(GpuError::FrameOrder(_))));

    surface.present(frame).unwrap();
    let next = surface.acquire_next().unwrap();
    assert_eq!(next.index(), 1);
    surface.abandon_frame();
}

#[test]
fn frame_indices_cycle_through_the_ring() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 320, 240);
    let count = surface.frame_count();
    assert_eq!(count, 3);

    let mut indices = Vec::new();
    for _ in 0..count + 1 {
        present_frame(&mut surface, |frame| {
            indices.push(frame.index());
            Ok(empty_list(frame))
        })
        .unwrap();
    }

    assert_eq!(indices, vec![0, 1, 2, 0]);
    assert_eq!(probe.stats().presents, 4);
}

#[test]
fn outdated_acquire_is_retried_once() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let builds = probe.stats().ring_builds;

    probe.inject_outdated_acquire(1);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
    assert_eq!(probe.stats().ring_builds, builds + 1);

    probe.inject_outdated_acquire(2);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Skipped(SkipReason::SurfaceOutdated));
    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
    assert_eq!(probe.stats().presents, 2);
}

#[test]
fn acquire_timeout_skips_the_frame() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);
    let builds = probe.stats().ring_builds;

    probe.inject_acquire_timeout(1);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Skipped(SkipReason::Timeout));
    assert_eq!(probe.stats().ring_builds, builds + 1);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
}

#[test]
fn outdated_present_skips_and_recovers() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);

    probe.inject_outdated_present(1);
    assert_eq!(present_empty(&mut surface), FrameOutcome::Skipped(SkipReason::SurfaceOutdated));
    let stats = probe.stats();
    assert_eq!((stats.submissions, stats.presents), (1, 0));

    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
    assert_eq!(probe.stats().presents, 1);
}

#[test]
fn recording_errors_abandon_the_frame() {
    let Harness { probe, gpu: _gpu, device } = harness();
    let mut surface = offscreen(&device, 800, 600);

    let err = present_frame(&mut surface, |_| Err(GpuError::RenderPass("nothing to draw".to_owned()))).unwrap_err();
    assert!(matches!(err, GpuError::RenderPass(_)));
    assert_eq!(probe.stats().submissions, 0);

    assert_eq!(present_empty(&mut surface), FrameOutcome::Presented);
}
