//! Descriptor set layouts and a growing descriptor allocator.

use ash::vk;
use log::debug;
use lumen_rhi_derive::DeviceObject;
use crate::error::Result;
use crate::types::{BindGroupLayoutDesc, BindingKind};
use super::utility::{to_vk_descriptor_type, to_vk_stages};

const SETS_PER_POOL: u32 = 256;

#[DeviceObject]
pub struct DescriptorSetLayout {
    layout: vk::DescriptorSetLayout,
    kinds: Vec<(u32, BindingKind)>,
}

impl DescriptorSetLayout {
    pub fn new(device: &ash::Device, desc: &BindGroupLayoutDesc) -> Result<Self> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = desc
            .entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(to_vk_descriptor_type(entry.kind))
                    .descriptor_count(1)
                    .stage_flags(to_vk_stages(entry.stages))
            })
            .collect();

        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);
        let layout = unsafe { device.create_descriptor_set_layout(&create_info, None)? };

        Ok(Self {
            layout,
            kinds: desc.entries.iter().map(|e| (e.binding, e.kind)).collect(),
            device: device.clone(),
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn kind_of(&self, binding: u32) -> Option<BindingKind> {
        self.kinds.iter().find(|(b, _)| *b == binding).map(|(_, kind)| *kind)
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

#[DeviceObject]
struct DescriptorPool {
    pool: vk::DescriptorPool,
}

impl DescriptorPool {
    fn new(device: &ash::Device) -> Result<Self> {
        let pool_sizes = [
            vk::DescriptorPoolSize { ty: vk::DescriptorType::UNIFORM_BUFFER_DYNAMIC, descriptor_count: SETS_PER_POOL * 2 },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::STORAGE_BUFFER_DYNAMIC, descriptor_count: SETS_PER_POOL },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLED_IMAGE, descriptor_count: SETS_PER_POOL },
            vk::DescriptorPoolSize { ty: vk::DescriptorType::SAMPLER, descriptor_count: SETS_PER_POOL },
        ];
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(SETS_PER_POOL)
            .pool_sizes(&pool_sizes)
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET);

        let pool = unsafe { device.create_descriptor_pool(&create_info, None)? };
        Ok(Self { pool, device: device.clone() })
    }

    fn allocate(&self, layout: vk::DescriptorSetLayout) -> std::result::Result<vk::DescriptorSet, vk::Result> {
        let layouts = [layout];
        let alloc_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.pool)
            .set_layouts(&layouts);
        unsafe { self.device.allocate_descriptor_sets(&alloc_info).map(|sets| sets[0]) }
    }
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.destroy_descriptor_pool(self.pool, None) };
    }
}

/// A descriptor set and the pool it came from.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSet {
    pub set: vk::DescriptorSet,
    pool: usize,
}

/// Allocates sets from a list of pools, adding a pool when the last one runs dry.
pub struct DescriptorAllocator {
    device: ash::Device,
    pools: Vec<DescriptorPool>,
}

impl DescriptorAllocator {
    pub fn new(device: &ash::Device) -> Result<Self> {
        Ok(Self { device: device.clone(), pools: vec![DescriptorPool::new(device)?] })
    }

    pub fn allocate(&mut self, layout: &DescriptorSetLayout) -> Result<DescriptorSet> {
        let last = self.pools.len() - 1;
        match self.pools[last].allocate(layout.handle()) {
            Ok(set) => return Ok(DescriptorSet { set, pool: last }),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY | vk::Result::ERROR_FRAGMENTED_POOL) => {}
            Err(err) => return Err(err.into()),
        }

        debug!("Descriptor pool {last} exhausted, growing.");
        self.pools.push(DescriptorPool::new(&self.device)?);
        let set = self.pools[last + 1].allocate(layout.handle())?;
        Ok(DescriptorSet { set, pool: last + 1 })
    }

    pub fn free(&mut self, set: DescriptorSet) {
        let pool = &self.pools[set.pool];
        if let Err(err) = unsafe { self.device.free_descriptor_sets(pool.pool, &[set.set]) } {
            log::warn!("Failed to free descriptor set: {err}");
        }
    }
}

/// A resolved resource written into one binding.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorResource {
    Buffer { buffer: vk::Buffer, offset: u64, size: u64 },
    Image(vk::ImageView),
    Sampler(vk::Sampler),
}

pub fn write_descriptor(
    device: &ash::Device,
    set: vk::DescriptorSet,
    binding: u32,
    kind: BindingKind,
    resource: DescriptorResource,
) {
    let descriptor_type = to_vk_descriptor_type(kind);
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .descriptor_type(descriptor_type);

    match resource {
        DescriptorResource::Buffer { buffer, offset, size } => {
            let info = [vk::DescriptorBufferInfo { buffer, offset, range: size }];
            unsafe { device.update_descriptor_sets(&[write.buffer_info(&info)], &[]) };
        }
        DescriptorResource::Image(view) => {
            let info = [vk::DescriptorImageInfo::default()
                .image_view(view)
                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)];
            unsafe { device.update_descriptor_sets(&[write.image_info(&info)], &[]) };
        }
        DescriptorResource::Sampler(sampler) => {
            let info = [vk::DescriptorImageInfo::default().sampler(sampler)];
            unsafe { device.update_descriptor_sets(&[write.image_info(&info)], &[]) };
        }
    }
}
