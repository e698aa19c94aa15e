//! Host-visible buffers, persistently mapped for their whole lifetime.

use ash::vk;
use lumen_rhi_derive::DeviceObject;
use crate::error::{GpuError, Result};
use crate::types::BufferDesc;
use super::utility::{allocate_memory, to_vk_buffer_usage};

#[DeviceObject]
pub struct Buffer {
    label: String,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    mapped: *mut u8,
}

impl Buffer {
    pub fn new(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        desc: &BufferDesc,
    ) -> Result<Self> {
        Self::with_usage(device, memory_properties, &desc.label, desc.size, to_vk_buffer_usage(desc.usage))
    }

    /// Staging source for texture uploads.
    pub fn staging(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        size: u64,
    ) -> Result<Self> {
        Self::with_usage(device, memory_properties, "staging", size, vk::BufferUsageFlags::TRANSFER_SRC)
    }

    fn with_usage(
        device: &ash::Device,
        memory_properties: &vk::PhysicalDeviceMemoryProperties,
        label: &str,
        size: u64,
        usage: vk::BufferUsageFlags,
    ) -> Result<Self> {
        let create_info = vk::BufferCreateInfo::default()
            .size(size.max(4))
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        unsafe {
            let buffer = device.create_buffer(&create_info, None)?;
            let requirements = device.get_buffer_memory_requirements(buffer);
            let memory = match allocate_memory(
                device,
                memory_properties,
                requirements,
                vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            ) {
                Ok(memory) => memory,
                Err(err) => {
                    device.destroy_buffer(buffer, None);
                    return Err(err);
                }
            };

            let mapped = device
                .bind_buffer_memory(buffer, memory, 0)
                .and_then(|_| device.map_memory(memory, 0, vk::WHOLE_SIZE, vk::MemoryMapFlags::empty()));
            let mapped = match mapped {
                Ok(ptr) => ptr as *mut u8,
                Err(err) => {
                    device.destroy_buffer(buffer, None);
                    device.free_memory(memory, None);
                    return Err(err.into());
                }
            };

            Ok(Self {
                label: label.to_owned(),
                buffer,
                memory,
                size,
                mapped,
                device: device.clone(),
            })
        }
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Copy `data` into the mapping at `offset`.
    pub fn write(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.is_none_or(|end| end > self.size) {
            return Err(GpuError::Backend(format!(
                "write of {} bytes at offset {offset} overruns buffer {} ({} bytes)",
                data.len(),
                self.label,
                self.size
            )));
        }
        unsafe {
            std::ptr::copy_nonoverlapping(data.as_ptr(), self.mapped.add(offset as usize), data.len());
        }
        Ok(())
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe {
            self.device.unmap_memory(self.memory);
            self.device.destroy_buffer(self.buffer, None);
            self.device.free_memory(self.memory, None);
        }
    }
}
