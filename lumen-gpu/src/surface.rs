use std::rc::Rc;
use log::{debug, error, info};
use lumen_rhi::{CommandList, Format, GpuError, PresentMode, Result, Size, SurfaceConfig, SurfaceId, SurfaceInfo, SurfaceTarget};
use crate::device::{Device, DeviceShared};

/// Creation options of a [`Surface`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceOptions {
    pub size: Size,
    pub depth_format: Option<Format>,
    /// Falls back to the GPU's configured present mode.
    pub present_mode: Option<PresentMode>,
}

impl SurfaceOptions {
    pub fn new(size: Size) -> Self {
        Self {
            size,
            depth_format: Some(Format::Depth32Float),
            present_mode: None,
        }
    }
}

/// One acquired image of a surface's frame ring.
#[derive(Debug, PartialEq, Eq)]
pub struct Frame {
    index: u32,
    size: Size,
    format: Format,
    depth_format: Option<Format>,
    surface: SurfaceId,
    generation: u64,
}

impl Frame {
    /// Index of the image inside the ring.
    #[inline]
    pub fn index(&self) -> u32 {
        self.index
    }

    #[inline]
    pub fn size(&self) -> Size {
        self.size
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.format
    }

    #[inline]
    pub fn depth_format(&self) -> Option<Format> {
        self.depth_format
    }

    #[inline]
    pub fn surface(&self) -> SurfaceId {
        self.surface
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameState {
    Idle,
    Acquired(u32),
    Submitted(u32),
}

/// A presentable target with a ring of frames.
///
/// Frames are acquired, submitted and presented strictly one after another.
pub struct Surface {
    device: Rc<DeviceShared>,
    id: SurfaceId,
    config: SurfaceConfig,
    info: SurfaceInfo,
    state: FrameState,
    /// Bumped on every ring rebuild so frames of an old ring are rejected.
    generation: u64,
    needs_rebuild: bool,
}

impl Surface {
    /// Create a surface with a `Depth32Float` depth attachment.
    pub fn new(device: &Device, target: SurfaceTarget, size: Size) -> Result<Self> {
        Self::with_options(device, target, SurfaceOptions::new(size))
    }

    pub fn with_options(device: &Device, target: SurfaceTarget, options: SurfaceOptions) -> Result<Self> {
        if options.size.is_zero_area() {
            return Err(GpuError::config(
                "surface",
                format!("cannot create a {}x{} surface", options.size.width, options.size.height),
            ));
        }

        let device = device.shared().clone();
        let config = SurfaceConfig {
            size: options.size,
            present_mode: options.present_mode.unwrap_or(device.present_mode()),
            depth_format: options.depth_format,
            frames_in_flight: device.frames_in_flight(),
        };
        let (id, info) = device.backend().create_surface(&target, &config)?;
        info!(
            "Surface {}x{} created: {:?}, {} images, depth {:?}",
            info.size.width, info.size.height, info.format, info.image_count, info.depth_format
        );

        Ok(Self {
            device,
            id,
            config,
            info,
            state: FrameState::Idle,
            generation: 0,
            needs_rebuild: false,
        })
    }

    /// Wait for the next frame slot and acquire its image.
    #[profiling::function]
    pub fn acquire_next(&mut self) -> Result<Frame> {
        if self.state != FrameState::Idle {
            return Err(GpuError::FrameOrder(format!(
                "cannot acquire while frame {:?} is outstanding",
                self.state
            )));
        }
        if self.is_minimized() {
            return Err(GpuError::SurfaceOutdated);
        }
        if self.needs_rebuild {
            self.rebuild()?;
        }

        let acquired = self.device.backend().acquire_image(self.id, self.device.timeout())?;
        if acquired.suboptimal {
            debug!("surface image {} is suboptimal", acquired.index);
        }
        self.state = FrameState::Acquired(acquired.index);
        self.device.collect_garbage();

        Ok(Frame {
            index: acquired.index,
            size: self.info.size,
            format: self.info.format,
            depth_format: self.info.depth_format,
            surface: self.id,
            generation: self.generation,
        })
    }

    /// Submit the recorded commands of the acquired frame.
    #[profiling::function]
    pub fn submit_render(&mut self, commands: CommandList) -> Result<()> {
        if commands.surface != self.id || self.state != FrameState::Acquired(commands.image_index) {
            return Err(GpuError::FrameOrder(format!(
                "command list for image {} does not target the acquired frame ({:?})",
                commands.image_index, self.state
            )));
        }

        let result = self.device.backend().submit(&commands);
        match result {
            Ok(()) => {
                self.state = FrameState::Submitted(commands.image_index);
                self.device.on_submitted();
                Ok(())
            }
            Err(err) => {
                self.abandon_frame();
                Err(err)
            }
        }
    }

    /// Present `frame`, which must be the most recently submitted one.
    #[profiling::function]
    pub fn present(&mut self, frame: Frame) -> Result<()> {
        if frame.surface != self.id
            || frame.generation != self.generation
            || self.state != FrameState::Submitted(frame.index)
        {
            return Err(GpuError::FrameOrder(format!(
                "frame {} is not the most recently submitted frame ({:?})",
                frame.index, self.state
            )));
        }

        self.state = FrameState::Idle;
        self.device.backend().present(self.id, frame.index)
    }

    /// Drop an acquired frame that will not be submitted. The ring is rebuilt before the next acquisition.
    pub fn abandon_frame(&mut self) {
        if let FrameState::Acquired(index) = self.state {
            debug!("frame {index} abandoned");
            self.state = FrameState::Idle;
            self.needs_rebuild = true;
        }
    }

    /// Resize the frame ring. Returns whether the ring was rebuilt.
    ///
    /// A zero-area size is recorded and the rebuild waits for the next non-zero size.
    pub fn set_size(&mut self, size: Size) -> Result<bool> {
        if size == self.config.size {
            return Ok(false);
        }

        self.config.size = size;
        if size.is_zero_area() {
            debug!("surface minimized, rebuild deferred");
            return Ok(false);
        }
        self.rebuild()?;
        Ok(true)
    }

    /// Rebuild the ring at the current size.
    pub fn reconfigure(&mut self) -> Result<()> {
        if self.is_minimized() {
            return Ok(());
        }
        self.rebuild()
    }

    fn rebuild(&mut self) -> Result<()> {
        self.device.wait_idle()?;
        let info = self.device.backend().configure_surface(self.id, &self.config)?;
        self.info = info;
        self.generation += 1;
        self.state = FrameState::Idle;
        self.needs_rebuild = false;
        info!(
            "Surface reconfigured to {}x{} with {} images",
            info.size.width, info.size.height, info.image_count
        );
        Ok(())
    }

    /// Whether the last requested size has zero area.
    #[inline]
    pub fn is_minimized(&self) -> bool {
        self.config.size.is_zero_area()
    }

    #[inline]
    pub fn id(&self) -> SurfaceId {
        self.id
    }

    #[inline]
    pub fn format(&self) -> Format {
        self.info.format
    }

    /// Size of the current frame ring.
    #[inline]
    pub fn size(&self) -> Size {
        self.info.size
    }

    #[inline]
    pub fn frame_count(&self) -> u32 {
        self.info.image_count
    }

    #[inline]
    pub fn depth_format(&self) -> Option<Format> {
        self.info.depth_format
    }

    /// Wait idle and destroy the ring.
    pub fn release(self) {}
}

impl Drop for Surface {
    fn drop(&mut self) {
        if let Err(err) = self.device.wait_idle() {
            error!("Failed to wait for device idle before releasing a surface: {err}");
        }
        self.device.backend().destroy_surface(self.id);
        debug!("surface released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::{BackendKind, HeadlessBackend, HeadlessProbe, QueueCapability};
    use pretty_assertions::assert_eq;
    use crate::gpu::{Gpu, GpuConfig};

    fn setup() -> (Gpu, Device, HeadlessProbe) {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let config = GpuConfig { backend: BackendKind::Headless, ..Default::default() };
        let gpu = Gpu::with_backend("test", Box::new(backend), config).unwrap();
        let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
        (gpu, device, probe)
    }

    fn empty_list(frame: &Frame) -> CommandList {
        CommandList { surface: frame.surface(), image_index: frame.index(), commands: vec![] }
    }

    #[test]
    fn zero_area_creation_is_rejected() {
        let (_gpu, device, _probe) = setup();
        let err = Surface::new(&device, SurfaceTarget::Offscreen, Size::new(0, 600)).err().unwrap();
        assert!(matches!(err, GpuError::Config { .. }));
    }

    #[test]
    fn stale_frame_is_rejected_after_rebuild() {
        let (_gpu, device, _probe) = setup();
        let mut surface = Surface::new(&device, SurfaceTarget::Offscreen, Size::new(64, 64)).unwrap();

        let frame = surface.acquire_next().unwrap();
        surface.submit_render(empty_list(&frame)).unwrap();
        surface.present(frame).unwrap();

        let frame = surface.acquire_next().unwrap();
        let list = empty_list(&frame);
        surface.abandon_frame();
        assert!(matches!(surface.submit_render(list), Err(GpuError::FrameOrder(_))));

        let next = surface.acquire_next().unwrap();
        assert_eq!(next.index(), 0);
        surface.submit_render(empty_list(&next)).unwrap();
        assert!(matches!(surface.present(frame), Err(GpuError::FrameOrder(_))));
        surface.present(next).unwrap();
    }

    #[test]
    fn failed_submission_abandons_the_frame() {
        let (_gpu, device, probe) = setup();
        let mut surface = Surface::new(&device, SurfaceTarget::Offscreen, Size::new(64, 64)).unwrap();
        let builds = probe.stats().ring_builds;

        let frame = surface.acquire_next().unwrap();
        let mut list = empty_list(&frame);
        list.commands.push(lumen_rhi::RenderCommand::EndRenderPass);
        assert!(matches!(surface.submit_render(list), Err(GpuError::Backend(_))));

        surface.acquire_next().unwrap();
        assert_eq!(probe.stats().ring_builds, builds + 1);
    }
}
