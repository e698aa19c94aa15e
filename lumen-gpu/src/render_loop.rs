//! One iteration of the host-driven render loop.

use log::warn;
use lumen_rhi::{CommandList, GpuError, Result};
use crate::surface::{Frame, Surface};
use crate::system::{CommandEncoder, System};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    SurfaceOutdated,
    Timeout,
    ZeroSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    Skipped(SkipReason),
}

fn skip_reason(err: &GpuError) -> SkipReason {
    match err {
        GpuError::Timeout(_) => SkipReason::Timeout,
        _ => SkipReason::SurfaceOutdated,
    }
}

/// Acquire, record with `record`, submit and present one frame of `surface`.
///
/// An out-of-date acquisition is retried once after rebuilding the ring. Timeouts and out-of-date
/// presents rebuild the ring and skip the frame. Other errors propagate.
#[profiling::function]
pub fn present_frame<F>(surface: &mut Surface, record: F) -> Result<FrameOutcome>
where
    F: FnOnce(&Frame) -> Result<CommandList>,
{
    if surface.is_minimized() {
        return Ok(FrameOutcome::Skipped(SkipReason::ZeroSize));
    }

    let frame = match surface.acquire_next() {
        Ok(frame) => frame,
        Err(GpuError::SurfaceOutdated) => {
            surface.reconfigure()?;
            match surface.acquire_next() {
                Ok(frame) => frame,
                Err(err) if err.is_transient() => {
                    warn!("Skipping frame: {err}");
                    surface.reconfigure()?;
                    return Ok(FrameOutcome::Skipped(skip_reason(&err)));
                }
                Err(err) => return Err(err),
            }
        }
        Err(err @ GpuError::Timeout(_)) => {
            warn!("Skipping frame: {err}");
            surface.reconfigure()?;
            return Ok(FrameOutcome::Skipped(SkipReason::Timeout));
        }
        Err(err) => return Err(err),
    };

    let commands = match record(&frame) {
        Ok(commands) => commands,
        Err(err) => {
            surface.abandon_frame();
            return Err(err);
        }
    };
    surface.submit_render(commands)?;

    match surface.present(frame) {
        Ok(()) => Ok(FrameOutcome::Presented),
        Err(GpuError::SurfaceOutdated) => {
            warn!("Surface out of date at present, frame skipped");
            surface.reconfigure()?;
            Ok(FrameOutcome::Skipped(SkipReason::SurfaceOutdated))
        }
        Err(err) => Err(err),
    }
}

/// Render one frame of `system` into `surface`.
///
/// `update` writes per-frame values, which are synced before `draw` records the pass.
pub fn render_frame<U, D>(surface: &mut Surface, system: &mut System, update: U, draw: D) -> Result<FrameOutcome>
where
    U: FnOnce(&mut System) -> Result<()>,
    D: FnOnce(&mut System, &mut CommandEncoder) -> Result<()>,
{
    present_frame(surface, |frame| {
        update(system)?;
        system.sync_to_gpu()?;
        let mut encoder = system.begin_render_pass(frame)?;
        draw(system, &mut encoder)?;
        system.end_render_pass(encoder)
    })
}
