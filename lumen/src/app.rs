use std::sync::Arc;
use winit::event::{DeviceEvent, WindowEvent};
use winit::window::Window;
use lumen_core::cli::EngineArgs;
use lumen_gpu::{CommandList, Device, Frame, Surface};

pub trait App: Sized + 'static {
    fn new(args: &EngineArgs) -> anyhow::Result<Self>;
    fn on_window_event(&mut self, _event: &WindowEvent, _window: &Window) {}
    fn on_device_event(&mut self, _event: &DeviceEvent) {}
    fn tick(&mut self, _delta_time: f32) {}
}

/// GPU objects an app renders with.
pub struct RenderContext<'a> {
    device: &'a Device,
    surface: &'a Surface,
}

impl<'a> RenderContext<'a> {
    pub fn new(device: &'a Device, surface: &'a Surface) -> Self {
        Self { device, surface }
    }

    #[inline]
    pub fn device(&self) -> &Device { self.device }

    #[inline]
    pub fn surface(&self) -> &Surface { self.surface }
}

pub trait RenderableApp: App {
    /// Create systems once the device and the window surface exist.
    fn prepare(&mut self, _context: RenderContext, _window: Arc<Window>) -> anyhow::Result<()> { Ok(()) }
    fn resize(&mut self, _width: u32, _height: u32) {}
    /// Record the commands of `frame`.
    fn render(&mut self, frame: &Frame) -> lumen_gpu::Result<CommandList>;
    /// Release GPU objects before the device goes away.
    fn release(&mut self) {}
}
