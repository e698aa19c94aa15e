use std::rc::Rc;
use std::time::Duration;
use derive_builder::Builder;
use log::{info, warn};
use raw_window_handle::RawDisplayHandle;
use lumen_rhi::{
    AdapterInfo, AdapterKind, Backend, BackendKind, GpuError, HeadlessBackend, InstanceDesc, PresentMode,
    QueueCapabilities, QueueCapability, Result, VulkanBackend,
};
use crate::device::Refused;

/// Settings of a GPU connection.
#[derive(Debug, Clone, Builder)]
#[builder(default, setter(into))]
pub struct GpuConfig {
    pub app_name: String,
    pub backend: BackendKind,
    pub validation: bool,
    /// Case-insensitive substring of the adapter name that wins over scoring.
    #[builder(setter(into, strip_option))]
    pub preferred_adapter: Option<String>,
    pub frames_in_flight: u32,
    /// Queue capabilities the selected adapter must offer in one family.
    pub required_queues: QueueCapabilities,
    /// Bound of every fence wait and image acquisition.
    pub timeout: Duration,
    pub present_mode: PresentMode,
    /// Display the surfaces will be created on. Required for window surfaces on Vulkan.
    #[builder(setter(strip_option))]
    pub display: Option<RawDisplayHandle>,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            app_name: "lumen".to_owned(),
            backend: BackendKind::Vulkan,
            validation: false,
            preferred_adapter: None,
            frames_in_flight: 2,
            required_queues: QueueCapability::Graphics.into(),
            timeout: Duration::from_secs(2),
            present_mode: PresentMode::Fifo,
            display: None,
        }
    }
}

pub(crate) struct GpuShared {
    pub(crate) backend: Box<dyn Backend>,
    pub(crate) name: String,
    pub(crate) adapter: usize,
    pub(crate) config: GpuConfig,
}

impl Drop for GpuShared {
    fn drop(&mut self) {
        info!("GPU `{}` released", self.name);
    }
}

/// Connection to a graphics backend with one selected adapter.
///
/// Devices keep the shared state alive, so the instance outlives every device created from it.
pub struct Gpu {
    shared: Rc<GpuShared>,
}

impl Gpu {
    /// Create the backend instance named by `config.backend` and select an adapter.
    ///
    /// Only adapters with a queue family offering `config.required_queues` (graphics by default)
    /// are candidates; with none, this fails with [`GpuError::NoSuitableAdapter`].
    pub fn config(config: GpuConfig) -> Result<Self> {
        let backend: Box<dyn Backend> = match config.backend {
            BackendKind::Vulkan => Box::new(VulkanBackend::new(&InstanceDesc {
                app_name: config.app_name.clone(),
                validation: config.validation,
                display: config.display,
            })?),
            BackendKind::Headless => Box::new(HeadlessBackend::new()),
        };
        let name = config.app_name.clone();
        Self::with_backend(&name, backend, config)
    }

    /// Select an adapter of an already created backend.
    pub fn with_backend(name: &str, backend: Box<dyn Backend>, config: GpuConfig) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(GpuError::config("gpu", "frames in flight must be at least 1"));
        }

        let adapter = select_adapter(backend.adapters(), config.required_queues, config.preferred_adapter.as_deref())?;
        let info = &backend.adapters()[adapter];
        info!(
            "GPU `{name}` on {:?} adapter `{}` (API {}.{}.{}, {} MiB)",
            info.kind,
            info.name,
            info.api_version.0,
            info.api_version.1,
            info.api_version.2,
            info.vram_bytes >> 20
        );

        Ok(Self {
            shared: Rc::new(GpuShared {
                backend,
                name: name.to_owned(),
                adapter,
                config,
            }),
        })
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    #[inline]
    pub fn adapter(&self) -> &AdapterInfo {
        &self.shared.backend.adapters()[self.shared.adapter]
    }

    #[inline]
    pub fn adapters(&self) -> &[AdapterInfo] {
        self.shared.backend.adapters()
    }

    #[inline]
    pub fn backend_kind(&self) -> BackendKind {
        self.shared.backend.kind()
    }

    #[inline]
    pub fn gpu_config(&self) -> &GpuConfig {
        &self.shared.config
    }

    /// Number of devices created from this GPU that are still alive.
    #[inline]
    pub fn live_devices(&self) -> usize {
        Rc::strong_count(&self.shared) - 1
    }

    /// Tear down the instance. Fails while devices created from it are alive, handing the GPU back.
    pub fn release(self) -> std::result::Result<(), Refused<Gpu>> {
        let count = self.live_devices();
        if count > 0 {
            return Err(Refused::new(self, GpuError::StillInUse { what: "gpu", count }));
        }
        Ok(())
    }

    pub(crate) fn shared(&self) -> &Rc<GpuShared> {
        &self.shared
    }
}

fn kind_rank(kind: AdapterKind) -> u32 {
    match kind {
        AdapterKind::Discrete => 4,
        AdapterKind::Integrated => 3,
        AdapterKind::Virtual => 2,
        AdapterKind::Cpu => 1,
        AdapterKind::Other => 0,
    }
}

/// Pick the adapter to render with among those offering `required` in one queue family: the
/// preferred name if present, otherwise the best score.
pub(crate) fn select_adapter(
    adapters: &[AdapterInfo],
    required: QueueCapabilities,
    preferred: Option<&str>,
) -> Result<usize> {
    let candidates: Vec<(usize, &AdapterInfo)> = adapters
        .iter()
        .enumerate()
        .filter(|(_, adapter)| {
            adapter
                .queue_families
                .iter()
                .any(|family| family.capabilities.contains(required))
        })
        .collect();

    if candidates.is_empty() {
        return Err(GpuError::NoSuitableAdapter(format!(
            "none of {} adapter(s) has a {required:?} queue",
            adapters.len()
        )));
    }

    if let Some(preferred) = preferred {
        let needle = preferred.to_lowercase();
        if let Some((index, _)) = candidates
            .iter()
            .find(|(_, adapter)| adapter.name.to_lowercase().contains(&needle))
        {
            return Ok(*index);
        }
        warn!("Preferred adapter `{preferred}` not found, falling back to scoring");
    }

    candidates
        .iter()
        .max_by_key(|(_, adapter)| (kind_rank(adapter.kind), adapter.api_version, adapter.vram_bytes))
        .map(|(index, _)| *index)
        .ok_or_else(|| GpuError::NoSuitableAdapter("no candidate".to_owned()))
}
