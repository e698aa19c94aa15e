use std::sync::Arc;
use log::{debug, info};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::window::Window;
use lumen_core::cli::{BackendArg, EngineArgs, PresentModeArg};
use lumen_gpu::{
    present_frame, BackendKind, Device, FrameOutcome, Gpu, GpuConfigBuilder, PresentMode, QueueCapability, Size,
    Surface, SurfaceTarget,
};
use crate::app::{RenderContext, RenderableApp};

/// GPU configuration requested on the command line.
pub fn gpu_config(args: &EngineArgs) -> GpuConfigBuilder {
    let mut builder = GpuConfigBuilder::default();
    builder
        .backend(match args.backend {
            BackendArg::Vulkan => BackendKind::Vulkan,
            BackendArg::Headless => BackendKind::Headless,
        })
        .validation(args.validation)
        .frames_in_flight(args.frames_in_flight)
        .present_mode(match args.present_mode {
            PresentModeArg::Fifo => PresentMode::Fifo,
            PresentModeArg::Mailbox => PresentMode::Mailbox,
            PresentModeArg::Immediate => PresentMode::Immediate,
        });
    builder
}

pub struct Engine {
    // dropped in declaration order: surface, device, gpu, window
    surface: Surface,
    device: Device,
    _gpu: Gpu,
    pub main_window: Arc<Window>,

    presented: u64,
    skipped: u64,
    should_exit: bool,
}

impl Engine {
    pub fn new(main_window: Arc<Window>, args: &EngineArgs) -> Result<Self, anyhow::Error> {
        let display = main_window.display_handle()?.as_raw();
        let window = main_window.window_handle()?.as_raw();

        let config = gpu_config(args).app_name("lumen").display(display).build()?;
        let gpu = Gpu::config(config)?;
        info!("Rendering on {}", gpu.adapter().name);

        let device = Device::new(&gpu, QueueCapability::Graphics.into())?;
        let inner_size = main_window.inner_size();
        let surface = Surface::new(
            &device,
            SurfaceTarget::Window { display, window },
            Size::new(inner_size.width, inner_size.height),
        )?;

        Ok(Self {
            surface,
            device,
            _gpu: gpu,
            main_window,

            presented: 0,
            skipped: 0,
            should_exit: false,
        })
    }

    #[inline]
    pub fn context(&self) -> RenderContext<'_> {
        RenderContext::new(&self.device, &self.surface)
    }

    #[profiling::function]
    pub fn render<A: RenderableApp>(&mut self, app: &mut A) -> Result<(), anyhow::Error> {
        match present_frame(&mut self.surface, |frame| app.render(frame))? {
            FrameOutcome::Presented => self.presented += 1,
            FrameOutcome::Skipped(reason) => {
                debug!("frame skipped: {reason:?}");
                self.skipped += 1;
            }
        }
        Ok(())
    }

    #[profiling::function]
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), anyhow::Error> {
        self.surface.set_size(Size::new(width, height))?;
        Ok(())
    }

    /// Frames presented and skipped so far.
    #[inline]
    pub fn frame_stats(&self) -> (u64, u64) { (self.presented, self.skipped) }

    #[inline]
    pub fn request_exit(&mut self) { self.should_exit = true; }

    #[inline]
    pub fn should_exit(&self) -> bool { self.should_exit }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            log::error!("Failed to wait for the device before shutdown: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use clap::Parser;

    #[test]
    fn command_line_maps_onto_gpu_config() {
        let args = EngineArgs::try_parse_from([
            "lumen", "--backend", "headless", "--frames-in-flight", "3", "--present-mode", "immediate",
        ])
        .unwrap();
        let config = gpu_config(&args).build().unwrap();
        assert_eq!(config.backend, BackendKind::Headless);
        assert_eq!(config.frames_in_flight, 3);
        assert_eq!(config.present_mode, PresentMode::Immediate);
        assert!(!config.validation);
    }
}
