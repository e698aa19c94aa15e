use std::sync::Arc;
use log::{error, info};
use winit::application::ApplicationHandler;
use winit::dpi::LogicalSize;
use winit::event::{DeviceEvent, DeviceId, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowId};
use lumen_core::cli::EngineArgs;
use crate::app::RenderableApp;
use crate::Engine;

pub struct EngineLoop<A: RenderableApp> {
    engine: Option<Engine>,
    app: A,
    args: EngineArgs,

    frame_count: u64,
    last_tick: std::time::Instant,
    last_time_printed: std::time::Instant,
    failure: Option<anyhow::Error>,
}

impl<A: RenderableApp> ApplicationHandler for EngineLoop<A> {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.engine.is_some() {
            return;
        }

        let window_attributes = Window::default_attributes()
            .with_title("Lumen")
            .with_min_inner_size(LogicalSize::new(32, 32))
            .with_inner_size(LogicalSize::new(self.args.width, self.args.height));

        let result = event_loop
            .create_window(window_attributes)
            .map_err(anyhow::Error::from)
            .and_then(|window| {
                let main_window = Arc::new(window);
                let engine = Engine::new(main_window.clone(), &self.args)?;
                self.app.prepare(engine.context(), main_window.clone())?;
                main_window.request_redraw();
                Ok(engine)
            });

        match result {
            Ok(engine) => self.engine = Some(engine),
            Err(err) => self.fail(event_loop, err),
        }
    }

    #[profiling::function]
    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Err(err) = self.process_window_event(&event) {
            self.fail(event_loop, err);
            return;
        }

        if self.engine.as_ref().is_some_and(Engine::should_exit) {
            event_loop.exit();
        }
    }

    #[profiling::function]
    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device_id: DeviceId, event: DeviceEvent) {
        self.app.on_device_event(&event);
    }
}

impl<A: RenderableApp> EngineLoop<A> {
    pub(super) fn new(app: A, args: EngineArgs) -> Result<Self, anyhow::Error> {
        Ok(Self {
            engine: None,
            app,
            args,

            frame_count: 0u64,
            last_tick: std::time::Instant::now(),
            last_time_printed: std::time::Instant::now(),
            failure: None,
        })
    }

    pub fn run(mut self) -> Result<(), anyhow::Error> {
        let event_loop = EventLoop::new()?;
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop.run_app(&mut self)?;

        self.app.release();
        self.engine = None;
        match self.failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        error!("Stopping the main loop: {err:#}");
        self.failure = Some(err);
        event_loop.exit();
    }

    #[profiling::function("main_loop")]
    fn process_window_event(&mut self, event: &WindowEvent) -> Result<(), anyhow::Error> {
        let Some(engine) = self.engine.as_mut() else {
            return Ok(());
        };
        self.app.on_window_event(event, engine.main_window.as_ref());

        match event {
            WindowEvent::Resized(size) => {
                engine.resize(size.width, size.height)?;
                self.app.resize(size.width, size.height);
            }
            WindowEvent::CloseRequested => {
                engine.request_exit();
            }
            WindowEvent::RedrawRequested => {
                self.tick();

                let Some(engine) = self.engine.as_mut() else {
                    return Ok(());
                };
                engine.render(&mut self.app)?;
                engine.main_window.request_redraw();

                profiling::finish_frame!();
            }
            _ => {}
        }
        Ok(())
    }

    #[profiling::function]
    fn tick(&mut self) {
        let delta_time = {
            let now = std::time::Instant::now();
            let delta_time = now - self.last_tick;
            self.last_tick = now;

            let last_time_print_elapsed = (now - self.last_time_printed).as_secs_f32();
            if last_time_print_elapsed > 1. {
                info!("Frame rate: {} fps", self.frame_count as f32 / last_time_print_elapsed);
                self.last_time_printed = now;
                self.frame_count = 0;
            }

            delta_time.as_secs_f32()
        };

        self.app.tick(delta_time);
        self.frame_count += 1;
    }
}
