//! Vulkan 1.3 backend built on `ash`, using dynamic rendering and synchronization2.

mod barrier;
mod buffer;
mod command;
mod core;
mod descriptor;
mod device;
mod pipeline;
mod sampler;
mod swapchain;
mod sync;
mod texture;
mod utility;

use std::rc::Rc;
use crate::backend::{Backend, BackendKind, DeviceBackend};
use crate::error::{GpuError, Result};
use crate::types::AdapterInfo;

pub use self::core::InstanceDesc;
pub use self::device::VulkanDevice;
use self::core::{PhysicalDevice, VulkanInstance};

pub struct VulkanBackend {
    instance: Rc<VulkanInstance>,
    physical_devices: Vec<PhysicalDevice>,
    adapters: Vec<AdapterInfo>,
}

impl VulkanBackend {
    pub fn new(desc: &InstanceDesc) -> Result<Self> {
        let instance = Rc::new(VulkanInstance::new(desc)?);
        let (physical_devices, adapters) = instance.enumerate_adapters()?.into_iter().unzip();
        Ok(Self { instance, physical_devices, adapters })
    }
}

impl Backend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn adapters(&self) -> &[AdapterInfo] {
        &self.adapters
    }

    fn create_device(&self, adapter: usize, queue_family: u32) -> Result<Box<dyn DeviceBackend>> {
        let physical = self
            .physical_devices
            .get(adapter)
            .ok_or_else(|| GpuError::NoSuitableAdapter(format!("adapter index {adapter} out of range")))?;
        let device = VulkanDevice::new(self.instance.clone(), physical.clone(), queue_family)?;
        Ok(Box::new(device))
    }
}
