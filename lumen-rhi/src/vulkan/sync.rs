use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::error::Result;

#[DeviceObject]
pub struct Fence {
    fence: vk::Fence,
}

impl Fence {
    pub fn new(device: &ash::Device, signaled: bool) -> Result<Self> {
        let flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe { device.create_fence(&vk::FenceCreateInfo::default().flags(flags), None)? };
        Ok(Self { fence, device: device.clone() })
    }

    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Wait up to `timeout_ns`; a timeout surfaces as `GpuError::Timeout`.
    pub fn wait(&self, timeout_ns: u64) -> Result<()> {
        unsafe { self.device.wait_for_fences(&[self.fence], true, timeout_ns)? };
        Ok(())
    }

    pub fn reset(&self) -> Result<()> {
        unsafe { self.device.reset_fences(&[self.fence])? };
        Ok(())
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.destroy_fence(self.fence, None) };
    }
}

#[DeviceObject]
pub struct Semaphore {
    semaphore: vk::Semaphore,
}

impl Semaphore {
    pub fn new(device: &ash::Device) -> Result<Self> {
        let semaphore = unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)? };
        Ok(Self { semaphore, device: device.clone() })
    }

    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe { self.device.destroy_semaphore(self.semaphore, None) };
    }
}
