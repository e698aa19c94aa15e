use std::cell::{Cell, RefCell, RefMut};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;
use log::{debug, error, info, trace};
use lumen_rhi::{
    BindGroupId, BindGroupLayoutId, BufferId, DeviceBackend, DeviceLimits, GpuError, PipelineId, PresentMode,
    QueueCapabilities, Result, SamplerId, ShaderModuleId, TextureId,
};
use crate::gpu::{Gpu, GpuShared};

/// A backend object whose destruction waits for the frames that may still read it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Garbage {
    Buffer(BufferId),
    Texture(TextureId),
    Sampler(SamplerId),
    BindGroup(BindGroupId),
    BindGroupLayout(BindGroupLayoutId),
    Pipeline(PipelineId),
    ShaderModule(ShaderModuleId),
}

impl Garbage {
    fn destroy(self, backend: &mut dyn DeviceBackend) {
        match self {
            Garbage::Buffer(id) => backend.destroy_buffer(id),
            Garbage::Texture(id) => backend.destroy_texture(id),
            Garbage::Sampler(id) => backend.destroy_sampler(id),
            Garbage::BindGroup(id) => backend.destroy_bind_group(id),
            Garbage::BindGroupLayout(id) => backend.destroy_bind_group_layout(id),
            Garbage::Pipeline(id) => backend.destroy_pipeline(id),
            Garbage::ShaderModule(id) => backend.destroy_shader_module(id),
        }
    }
}

pub(crate) struct DeviceShared {
    backend: RefCell<Box<dyn DeviceBackend>>,
    queue_family: u32,
    limits: DeviceLimits,
    frames_in_flight: u32,
    timeout: Duration,
    present_mode: PresentMode,
    /// Number of command lists submitted so far.
    serial: Cell<u64>,
    /// Retired objects tagged with the serial at retirement, oldest first.
    garbage: RefCell<VecDeque<(u64, Garbage)>>,
    _gpu: Rc<GpuShared>,
}

impl DeviceShared {
    #[inline]
    pub(crate) fn backend(&self) -> RefMut<'_, Box<dyn DeviceBackend>> {
        self.backend.borrow_mut()
    }

    #[inline]
    pub(crate) fn limits(&self) -> DeviceLimits {
        self.limits
    }

    #[inline]
    pub(crate) fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }

    #[inline]
    pub(crate) fn timeout(&self) -> Duration {
        self.timeout
    }

    #[inline]
    pub(crate) fn present_mode(&self) -> PresentMode {
        self.present_mode
    }

    #[inline]
    pub(crate) fn serial(&self) -> u64 {
        self.serial.get()
    }

    pub(crate) fn on_submitted(&self) {
        self.serial.set(self.serial.get() + 1);
    }

    /// Queue `garbage` for destruction once no in-flight frame can reference it.
    pub(crate) fn retire(&self, garbage: Garbage) {
        trace!("retire {garbage:?} at serial {}", self.serial());
        self.garbage.borrow_mut().push_back((self.serial(), garbage));
    }

    /// Destroy retired objects that every frame slot has moved past.
    pub(crate) fn collect_garbage(&self) {
        let now = self.serial();
        let horizon = self.frames_in_flight as u64;
        let mut garbage = self.garbage.borrow_mut();
        let mut backend = self.backend.borrow_mut();
        while let Some((retired, _)) = garbage.front() {
            if now < retired + horizon {
                break;
            }
            if let Some((_, object)) = garbage.pop_front() {
                object.destroy(backend.as_mut());
            }
        }
    }

    /// Block until the queue is idle, then destroy every retired object.
    pub(crate) fn wait_idle(&self) -> Result<()> {
        self.backend.borrow_mut().wait_idle()?;
        self.flush_garbage();
        Ok(())
    }

    fn flush_garbage(&self) {
        let mut garbage = self.garbage.borrow_mut();
        let mut backend = self.backend.borrow_mut();
        for (_, object) in garbage.drain(..) {
            object.destroy(backend.as_mut());
        }
    }

    #[cfg(test)]
    pub(crate) fn pending_garbage(&self) -> usize {
        self.garbage.borrow().len()
    }
}

impl Drop for DeviceShared {
    fn drop(&mut self) {
        if let Err(err) = self.backend.get_mut().wait_idle() {
            error!("Failed to wait for device idle on drop: {err}");
        }
        self.flush_garbage();
        debug!("device on queue family {} released", self.queue_family);
    }
}

/// A release that was refused, handing the object back so it can be retried.
pub struct Refused<T> {
    object: T,
    error: GpuError,
}

impl<T> Refused<T> {
    pub(crate) fn new(object: T, error: GpuError) -> Self {
        Self { object, error }
    }

    #[inline]
    pub fn error(&self) -> &GpuError {
        &self.error
    }

    /// Take the object back.
    pub fn into_inner(self) -> T {
        self.object
    }

    pub fn into_parts(self) -> (T, GpuError) {
        (self.object, self.error)
    }
}

impl<T> std::fmt::Debug for Refused<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refused").field("error", &self.error).finish_non_exhaustive()
    }
}

impl<T> std::fmt::Display for Refused<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl<T> std::error::Error for Refused<T> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl<T> From<Refused<T>> for GpuError {
    fn from(refused: Refused<T>) -> Self {
        refused.error
    }
}

/// Logical device with one queue.
///
/// Surfaces, systems and memories created from a device keep it alive; [`Device::destroy`]
/// refuses to tear it down while any of them exist.
pub struct Device {
    shared: Rc<DeviceShared>,
}

impl Device {
    /// Create a device on the first queue family of the GPU's adapter whose capabilities contain `capabilities`.
    pub fn new(gpu: &Gpu, capabilities: QueueCapabilities) -> Result<Self> {
        let adapter = gpu.adapter();
        let family = adapter
            .queue_families
            .iter()
            .find(|family| family.capabilities.contains(capabilities))
            .ok_or_else(|| GpuError::NoSuitableQueue {
                requested: format!("{capabilities:?}"),
            })?;

        let shared = gpu.shared();
        let mut backend = shared.backend.create_device(shared.adapter, family.index)?;
        backend.set_wait_timeout(shared.config.timeout);
        let limits = backend.limits();
        info!(
            "Device created on `{}` queue family {} ({:?})",
            adapter.name, family.index, family.capabilities
        );

        Ok(Self {
            shared: Rc::new(DeviceShared {
                backend: RefCell::new(backend),
                queue_family: family.index,
                limits,
                frames_in_flight: shared.config.frames_in_flight,
                timeout: shared.config.timeout,
                present_mode: shared.config.present_mode,
                serial: Cell::new(0),
                garbage: RefCell::new(VecDeque::new()),
                _gpu: shared.clone(),
            }),
        })
    }

    /// Block until all submitted work finished and release retired resources.
    pub fn wait_idle(&self) -> Result<()> {
        self.shared.wait_idle()
    }

    #[inline]
    pub fn limits(&self) -> DeviceLimits {
        self.shared.limits
    }

    #[inline]
    pub fn queue_family(&self) -> u32 {
        self.shared.queue_family
    }

    #[inline]
    pub fn frames_in_flight(&self) -> u32 {
        self.shared.frames_in_flight
    }

    /// Number of surfaces, systems and memories still holding this device.
    #[inline]
    pub fn live_dependents(&self) -> usize {
        Rc::strong_count(&self.shared) - 1
    }

    /// Wait idle and release the device.
    ///
    /// Fails with [`GpuError::StillInUse`] while dependents are alive; the device is handed back
    /// in the error so it can be destroyed once they are released.
    pub fn destroy(self) -> std::result::Result<(), Refused<Device>> {
        let count = self.live_dependents();
        if count > 0 {
            return Err(Refused::new(self, GpuError::StillInUse { what: "device", count }));
        }
        match self.shared.wait_idle() {
            Ok(()) => Ok(()),
            Err(err) => Err(Refused::new(self, err)),
        }
    }

    pub(crate) fn shared(&self) -> &Rc<DeviceShared> {
        &self.shared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::{BackendKind, BufferDesc, BufferUsage, HeadlessBackend, QueueCapability};
    use crate::gpu::GpuConfig;

    fn headless() -> (Gpu, lumen_rhi::HeadlessProbe) {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let config = GpuConfig { backend: BackendKind::Headless, ..Default::default() };
        (Gpu::with_backend("test", Box::new(backend), config).unwrap(), probe)
    }

    fn buffer(device: &DeviceShared) -> BufferId {
        device
            .backend()
            .create_buffer(&BufferDesc { label: "garbage".into(), size: 16, usage: BufferUsage::Uniform.into() })
            .unwrap()
    }

    #[test]
    fn retired_objects_wait_for_frames_in_flight() {
        let (gpu, probe) = headless();
        let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
        let shared = device.shared().clone();

        let id = buffer(&shared);
        shared.retire(Garbage::Buffer(id));

        shared.collect_garbage();
        assert!(probe.is_buffer_alive(id));

        shared.on_submitted();
        shared.collect_garbage();
        assert!(probe.is_buffer_alive(id));

        shared.on_submitted();
        shared.collect_garbage();
        assert!(!probe.is_buffer_alive(id));
        assert_eq!(shared.pending_garbage(), 0);
    }

    #[test]
    fn wait_idle_flushes_garbage() {
        let (gpu, probe) = headless();
        let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
        let id = buffer(device.shared());
        device.shared().retire(Garbage::Buffer(id));

        device.wait_idle().unwrap();
        assert!(!probe.is_buffer_alive(id));
    }

    #[test]
    fn queue_request_must_be_satisfiable() {
        let backend = HeadlessBackend::with_queue_families(vec![QueueCapability::Transfer.into()]);
        let config = GpuConfig { backend: BackendKind::Headless, ..Default::default() };
        let err = Gpu::with_backend("test", Box::new(backend), config).err().unwrap();
        assert!(matches!(err, GpuError::NoSuitableAdapter(_)));

        let backend = HeadlessBackend::with_queue_families(vec![
            QueueCapability::Transfer.into(),
            QueueCapability::Graphics | QueueCapability::Transfer,
        ]);
        let config = GpuConfig { backend: BackendKind::Headless, ..Default::default() };
        let gpu = Gpu::with_backend("test", Box::new(backend), config).unwrap();
        let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
        assert_eq!(device.queue_family(), 1);
        assert!(matches!(
            Device::new(&gpu, QueueCapability::Compute.into()),
            Err(GpuError::NoSuitableQueue { .. })
        ));
    }
}
