//! GPU residency of variable values.
//!
//! Every buffer-backed variable owns one buffer holding all of its values at aligned slots. Uniform
//! and storage slots share one stride and are selected with dynamic offsets; vertex and index slots
//! are packed. Texture variables own one texture per value, and sets with textures get one bind
//! group per value index.

use std::rc::Rc;
use log::{debug, trace};
use smallvec::SmallVec;
use lumen_core::math::align_up;
use lumen_rhi::{
    BindGroupDesc, BindGroupEntry, BindGroupId, BindGroupLayoutDesc, BindGroupLayoutEntry, BindGroupLayoutId,
    BindingKind, BindingResource, BufferDesc, BufferId, BufferUsage, BufferUsages, Format, GpuError, ImageData,
    IndexFormat, RenderCommand, Result, SamplerDesc, SamplerId, Size, TextureDesc, TextureId, VertexBufferLayout,
};
use crate::device::{Device, DeviceShared, Garbage};
use crate::value::Value;
use crate::vars::{Var, VarRole, VarSet, Vars};

const VERTEX_ALIGNMENT: u64 = 16;
const PLACEHOLDER_TEXEL: [u8; 4] = [255, 255, 255, 255];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    offset: u64,
    capacity: u64,
}

#[derive(Debug)]
struct BufferAlloc {
    buffer: BufferId,
    slots: Vec<Slot>,
}

#[derive(Debug, Clone, Copy)]
struct TextureSlot {
    texture: TextureId,
    size: Size,
}

#[derive(Debug)]
enum VarAlloc {
    Buffer(BufferAlloc),
    Textures(Vec<TextureSlot>),
}

#[derive(Debug, Default)]
struct SetAlloc {
    /// Parallel to the set's variables.
    vars: Vec<VarAlloc>,
    groups: Vec<BindGroupId>,
    n_values: usize,
}

/// Creates and retires the GPU objects backing variables.
struct Allocator<'a> {
    device: &'a DeviceShared,
    label: &'a str,
    sampler: Option<SamplerId>,
}

impl Allocator<'_> {
    fn alignment(&self, role: VarRole) -> u64 {
        let limits = self.device.limits();
        match role {
            VarRole::Uniform => limits.min_uniform_buffer_offset_alignment,
            VarRole::Storage => limits.min_storage_buffer_offset_alignment,
            _ => VERTEX_ALIGNMENT,
        }
    }

    /// Slots fitting the current values, never smaller than `previous`.
    fn slot_layout(&self, var: &Var, previous: Option<&[Slot]>) -> Vec<Slot> {
        match var.role() {
            VarRole::Uniform | VarRole::Storage => {
                let largest = var.values().iter().map(Value::len).max().unwrap_or(0) as u64;
                let floor = previous.and_then(|slots| slots.first()).map_or(0, |slot| slot.capacity);
                let stride = align_up(largest.max(var.element_size()).max(floor).max(4), self.alignment(var.role()));
                (0..var.n_values() as u64)
                    .map(|i| Slot { offset: i * stride, capacity: stride })
                    .collect()
            }
            _ => {
                let mut offset = 0;
                var.values()
                    .iter()
                    .enumerate()
                    .map(|(i, value)| {
                        let floor = previous.and_then(|slots| slots.get(i)).map_or(0, |slot| slot.capacity);
                        let capacity = align_up((value.len() as u64).max(floor).max(1), VERTEX_ALIGNMENT);
                        let slot = Slot { offset, capacity };
                        offset += capacity;
                        slot
                    })
                    .collect()
            }
        }
    }

    fn create_buffer(&self, var: &Var, slots: Vec<Slot>) -> Result<BufferAlloc> {
        let usage: BufferUsages = match var.role() {
            VarRole::Vertex => BufferUsage::Vertex | BufferUsage::CopyDst,
            VarRole::Index => BufferUsage::Index | BufferUsage::CopyDst,
            VarRole::Storage => BufferUsage::Storage | BufferUsage::CopyDst,
            _ => BufferUsage::Uniform | BufferUsage::CopyDst,
        };
        let size = slots.last().map_or(VERTEX_ALIGNMENT, |slot| slot.offset + slot.capacity);
        let buffer = self.device.backend().create_buffer(&BufferDesc {
            label: format!("{}/{}", self.label, var.name()),
            size,
            usage,
        })?;
        trace!("`{}/{}`: {size} byte buffer, {} slot(s)", self.label, var.name(), slots.len());
        Ok(BufferAlloc { buffer, slots })
    }

    fn create_texture(&self, var: &Var, index: usize, image: &ImageData) -> Result<TextureSlot> {
        let mut backend = self.device.backend();
        let texture = backend.create_texture(&TextureDesc {
            label: format!("{}/{}[{index}]", self.label, var.name()),
            size: image.size(),
            format: Format::Rgba8Srgb,
        })?;
        if let Err(err) = backend.write_texture(texture, image) {
            backend.destroy_texture(texture);
            return Err(err);
        }
        Ok(TextureSlot { texture, size: image.size() })
    }

    fn allocate_var(&self, var: &Var) -> Result<VarAlloc> {
        if var.role() != VarRole::Texture {
            let slots = self.slot_layout(var, None);
            return Ok(VarAlloc::Buffer(self.create_buffer(var, slots)?));
        }

        let placeholder = ImageData::solid(1, 1, PLACEHOLDER_TEXEL);
        let mut textures = Vec::with_capacity(var.n_values());
        for (index, value) in var.values().iter().enumerate() {
            match self.create_texture(var, index, value.image().unwrap_or(&placeholder)) {
                Ok(texture) => textures.push(texture),
                Err(err) => {
                    self.retire(VarAlloc::Textures(textures));
                    return Err(err);
                }
            }
        }
        Ok(VarAlloc::Textures(textures))
    }

    /// Copy value `index` of `var` into its GPU location. Returns whether a texture was recreated.
    fn upload(&self, var: &Var, alloc: &mut VarAlloc, index: usize) -> Result<bool> {
        let value = &var.values()[index];
        match alloc {
            VarAlloc::Buffer(buffer) => {
                if !value.is_empty() {
                    let slot = buffer.slots[index];
                    self.device.backend().write_buffer(buffer.buffer, slot.offset, value.bytes())?;
                }
                Ok(false)
            }
            VarAlloc::Textures(textures) => {
                let Some(image) = value.image() else {
                    return Ok(false);
                };
                let current = textures[index];
                if current.size == image.size() {
                    self.device.backend().write_texture(current.texture, image)?;
                    return Ok(false);
                }
                let replacement = self.create_texture(var, index, image)?;
                self.device.retire(Garbage::Texture(current.texture));
                textures[index] = replacement;
                debug!("`{}/{}[{index}]` recreated at {}x{}", self.label, var.name(), image.width, image.height);
                Ok(true)
            }
        }
    }

    /// Copy every dirty value of `set`. Returns the number of copies and whether bind groups must be rebuilt.
    fn sync_set(&self, set: &mut VarSet, alloc: &mut SetAlloc) -> Result<(usize, bool)> {
        let mut copies = 0;
        let mut regroup = false;

        for (var, var_alloc) in set.vars_mut().iter_mut().zip(alloc.vars.iter_mut()) {
            if !var.values().iter().any(Value::is_dirty) {
                continue;
            }

            if let VarAlloc::Buffer(buffer) = var_alloc {
                let outgrown = var
                    .values()
                    .iter()
                    .zip(&buffer.slots)
                    .any(|(value, slot)| value.len() as u64 > slot.capacity);
                if outgrown {
                    let slots = self.slot_layout(var, Some(&buffer.slots));
                    let grown = self.create_buffer(var, slots)?;
                    let old = std::mem::replace(buffer, grown);
                    self.device.retire(Garbage::Buffer(old.buffer));
                    debug!("`{}/{}` outgrew its buffer, reallocated", self.label, var.name());
                    for value in var.values_mut() {
                        value.mark_dirty();
                    }
                    regroup |= !var.role().is_vertex_input();
                }
            }

            for index in 0..var.n_values() {
                if var.values()[index].is_dirty() {
                    regroup |= self.upload(var, var_alloc, index)?;
                    var.values_mut()[index].clear_dirty();
                    copies += 1;
                }
            }
        }
        Ok((copies, regroup))
    }

    fn build_groups(&self, set: &VarSet, alloc: &SetAlloc, layout: BindGroupLayoutId) -> Result<Vec<BindGroupId>> {
        let count = if set.has_textures() { set.n_values() } else { 1 };
        let mut groups = Vec::with_capacity(count);

        for index in 0..count {
            let mut entries = Vec::new();
            for (var, var_alloc) in set.vars().iter().zip(&alloc.vars) {
                match var_alloc {
                    VarAlloc::Buffer(buffer) => entries.push(BindGroupEntry {
                        binding: var.binding(),
                        resource: BindingResource::Buffer {
                            buffer: buffer.buffer,
                            offset: 0,
                            size: buffer.slots[0].capacity,
                        },
                    }),
                    VarAlloc::Textures(textures) => {
                        let sampler = self.sampler.ok_or_else(|| GpuError::NotConfigured {
                            what: format!("sampler of `{}`", self.label),
                        })?;
                        entries.push(BindGroupEntry {
                            binding: var.binding(),
                            resource: BindingResource::Texture(textures[index].texture),
                        });
                        entries.push(BindGroupEntry {
                            binding: var.binding() + 1,
                            resource: BindingResource::Sampler(sampler),
                        });
                    }
                }
            }

            let desc = BindGroupDesc {
                label: format!("{}/{}[{index}]", self.label, set.label()),
                layout,
                entries,
            };
            let created = self.device.backend().create_bind_group(&desc);
            match created {
                Ok(group) => groups.push(group),
                Err(err) => {
                    for group in groups {
                        self.device.retire(Garbage::BindGroup(group));
                    }
                    return Err(err);
                }
            }
        }
        Ok(groups)
    }

    fn allocate_set(&self, set: &mut VarSet, layout: Option<BindGroupLayoutId>) -> Result<SetAlloc> {
        let mut alloc = SetAlloc { n_values: set.n_values(), ..Default::default() };
        match self.fill_set(set, layout, &mut alloc) {
            Ok(()) => Ok(alloc),
            Err(err) => {
                self.release_set(alloc);
                Err(err)
            }
        }
    }

    fn fill_set(&self, set: &mut VarSet, layout: Option<BindGroupLayoutId>, alloc: &mut SetAlloc) -> Result<()> {
        for var in set.vars() {
            alloc.vars.push(self.allocate_var(var)?);
        }
        for var in set.vars_mut() {
            let is_texture = var.role() == VarRole::Texture;
            for value in var.values_mut() {
                // textures were written at creation
                if is_texture {
                    value.clear_dirty();
                } else {
                    value.mark_dirty();
                }
            }
        }
        self.sync_set(set, alloc)?;
        if let Some(layout) = layout {
            alloc.groups = self.build_groups(set, alloc, layout)?;
        }
        Ok(())
    }

    fn retire(&self, alloc: VarAlloc) {
        match alloc {
            VarAlloc::Buffer(buffer) => self.device.retire(Garbage::Buffer(buffer.buffer)),
            VarAlloc::Textures(textures) => {
                for slot in textures {
                    self.device.retire(Garbage::Texture(slot.texture));
                }
            }
        }
    }

    fn release_set(&self, alloc: SetAlloc) {
        for group in alloc.groups {
            self.device.retire(Garbage::BindGroup(group));
        }
        for var in alloc.vars {
            self.retire(var);
        }
    }
}

fn layout_desc(label: &str, set: &VarSet) -> BindGroupLayoutDesc {
    let mut entries = Vec::new();
    for var in set.vars() {
        match var.role() {
            VarRole::Uniform => entries.push(BindGroupLayoutEntry {
                binding: var.binding(),
                kind: BindingKind::UniformDynamic { min_size: var.element_size() },
                stages: var.stages(),
            }),
            VarRole::Storage => entries.push(BindGroupLayoutEntry {
                binding: var.binding(),
                kind: BindingKind::StorageDynamic { min_size: var.element_size() },
                stages: var.stages(),
            }),
            VarRole::Texture => {
                entries.push(BindGroupLayoutEntry {
                    binding: var.binding(),
                    kind: BindingKind::SampledTexture,
                    stages: var.stages(),
                });
                entries.push(BindGroupLayoutEntry {
                    binding: var.binding() + 1,
                    kind: BindingKind::Sampler,
                    stages: var.stages(),
                });
            }
            VarRole::Vertex | VarRole::Index => {}
        }
    }
    BindGroupLayoutDesc {
        label: format!("{label}/{}", set.label()),
        entries,
    }
}

/// Variables together with the GPU resources holding their values.
pub struct Memory {
    device: Rc<DeviceShared>,
    label: String,
    vars: Vars,
    /// Created on the first configuration; the set layout is frozen from then on.
    layouts: Option<Vec<BindGroupLayoutId>>,
    sampler: Option<SamplerId>,
    vertex: Option<SetAlloc>,
    sets: Vec<SetAlloc>,
}

impl Memory {
    pub fn new(device: &Device, label: &str) -> Self {
        Self {
            device: device.shared().clone(),
            label: label.to_owned(),
            vars: Vars::new(),
            layouts: None,
            sampler: None,
            vertex: None,
            sets: Vec::new(),
        }
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn vars(&self) -> &Vars {
        &self.vars
    }

    #[inline]
    pub fn vars_mut(&mut self) -> &mut Vars {
        &mut self.vars
    }

    #[inline]
    pub fn is_configured(&self) -> bool {
        self.vertex.is_some()
    }

    /// Freeze the variables and allocate GPU storage for every value at its current size.
    ///
    /// Running it again reallocates for the current value counts; previous resources are retired.
    #[profiling::function]
    pub fn config(&mut self) -> Result<()> {
        self.vars.config()?;

        if self.layouts.is_none() {
            let mut layouts = Vec::with_capacity(self.vars.n_sets());
            for set in self.vars.sets() {
                match self.device.backend().create_bind_group_layout(&layout_desc(&self.label, set)) {
                    Ok(layout) => layouts.push(layout),
                    Err(err) => {
                        for layout in layouts {
                            self.device.retire(Garbage::BindGroupLayout(layout));
                        }
                        return Err(err);
                    }
                }
            }
            self.layouts = Some(layouts);
        }

        let needs_sampler = self.vars.sets().iter().any(VarSet::has_textures);
        if needs_sampler && self.sampler.is_none() {
            self.sampler = Some(self.device.backend().create_sampler(&SamplerDesc {
                label: format!("{}/sampler", self.label),
                ..Default::default()
            })?);
        }

        self.release_allocations();

        let allocator = Allocator {
            device: &self.device,
            label: &self.label,
            sampler: self.sampler,
        };
        let vertex = allocator.allocate_set(self.vars.vertex_set_mut(), None)?;
        let layouts = self.layouts.as_deref().unwrap_or_default();
        let mut sets = Vec::with_capacity(layouts.len());
        for (index, layout) in layouts.iter().enumerate() {
            let set = self.vars.set_mut(index as u32)?;
            match allocator.allocate_set(set, Some(*layout)) {
                Ok(alloc) => sets.push(alloc),
                Err(err) => {
                    allocator.release_set(vertex);
                    for alloc in sets {
                        allocator.release_set(alloc);
                    }
                    return Err(err);
                }
            }
        }

        self.vertex = Some(vertex);
        self.sets = sets;
        debug!("memory `{}` configured with {} bind set(s)", self.label, self.sets.len());
        Ok(())
    }

    /// Copy every dirty value to the GPU and return the number of values copied.
    #[profiling::function]
    pub fn sync_to_gpu(&mut self) -> Result<usize> {
        self.check_allocations()?;

        let allocator = Allocator {
            device: &self.device,
            label: &self.label,
            sampler: self.sampler,
        };
        let mut copies = 0;

        if let Some(vertex) = self.vertex.as_mut() {
            copies += allocator.sync_set(self.vars.vertex_set_mut(), vertex)?.0;
        }

        let layouts = self.layouts.as_deref().unwrap_or_default();
        for (index, alloc) in self.sets.iter_mut().enumerate() {
            let set = self.vars.set_mut(index as u32)?;
            let (count, regroup) = allocator.sync_set(set, alloc)?;
            copies += count;
            if regroup {
                let groups = allocator.build_groups(set, alloc, layouts[index])?;
                for old in std::mem::replace(&mut alloc.groups, groups) {
                    self.device.retire(Garbage::BindGroup(old));
                }
            }
        }

        if copies > 0 {
            trace!("memory `{}` synced {copies} value(s)", self.label);
        }
        Ok(copies)
    }

    fn check_allocations(&self) -> Result<()> {
        let Some(vertex) = &self.vertex else {
            return Err(GpuError::NotConfigured { what: format!("memory `{}`", self.label) });
        };
        let stale = vertex.n_values != self.vars.vertex_set().n_values()
            || self
                .sets
                .iter()
                .zip(self.vars.sets())
                .any(|(alloc, set)| alloc.n_values != set.n_values());
        if stale {
            return Err(GpuError::NotConfigured {
                what: format!("memory `{}` for the current value counts", self.label),
            });
        }
        Ok(())
    }

    fn release_allocations(&mut self) {
        let allocator = Allocator {
            device: &self.device,
            label: &self.label,
            sampler: self.sampler,
        };
        if let Some(vertex) = self.vertex.take() {
            allocator.release_set(vertex);
        }
        for alloc in self.sets.drain(..) {
            allocator.release_set(alloc);
        }
    }

    /// Buffer and byte offset holding value `index` of a buffer-backed variable.
    ///
    /// `set` is `None` for the vertex set.
    pub fn buffer_location(&self, set: Option<u32>, name: &str, index: usize) -> Option<(BufferId, u64)> {
        let (vars, alloc) = self.set_and_alloc(set)?;
        let position = vars.vars().iter().position(|var| var.name() == name)?;
        match &alloc.vars[position] {
            VarAlloc::Buffer(buffer) => buffer.slots.get(index).map(|slot| (buffer.buffer, slot.offset)),
            VarAlloc::Textures(_) => None,
        }
    }

    /// Texture holding value `index` of a texture variable.
    pub fn texture(&self, set: u32, name: &str, index: usize) -> Option<TextureId> {
        let (vars, alloc) = self.set_and_alloc(Some(set))?;
        let position = vars.vars().iter().position(|var| var.name() == name)?;
        match &alloc.vars[position] {
            VarAlloc::Textures(textures) => textures.get(index).map(|slot| slot.texture),
            VarAlloc::Buffer(_) => None,
        }
    }

    fn set_and_alloc(&self, set: Option<u32>) -> Option<(&VarSet, &SetAlloc)> {
        match set {
            None => Some((self.vars.vertex_set(), self.vertex.as_ref()?)),
            Some(index) => Some((self.vars.set(index)?, self.sets.get(index as usize)?)),
        }
    }

    pub(crate) fn layouts(&self) -> &[BindGroupLayoutId] {
        self.layouts.as_deref().unwrap_or_default()
    }

    pub(crate) fn vertex_buffer_layouts(&self) -> Vec<VertexBufferLayout> {
        self.vars
            .vertex_set()
            .vars()
            .iter()
            .filter_map(Var::vertex_buffer_layout)
            .collect()
    }

    /// Commands binding the selected value of every variable.
    pub(crate) fn bind_commands(&self) -> Result<Vec<RenderCommand>> {
        self.check_allocations()?;

        let all_sets = std::iter::once(self.vars.vertex_set()).chain(self.vars.sets());
        for set in all_sets {
            if let Some(var) = set.vars().iter().find(|var| var.values().iter().any(Value::is_dirty)) {
                return Err(GpuError::RenderPass(format!(
                    "`{}` in {} changed since the last sync",
                    var.name(),
                    set.label()
                )));
            }
        }

        let mut commands = Vec::new();
        for (index, (set, alloc)) in self.vars.sets().iter().zip(&self.sets).enumerate() {
            let dynamic_offsets: SmallVec<[u32; 4]> = set
                .vars()
                .iter()
                .zip(&alloc.vars)
                .filter_map(|(var, var_alloc)| match var_alloc {
                    VarAlloc::Buffer(buffer) => Some(buffer.slots[var.current_index()].offset as u32),
                    VarAlloc::Textures(_) => None,
                })
                .collect();
            let group = if set.has_textures() { set.texture_index() } else { 0 };
            commands.push(RenderCommand::BindGroup {
                index: index as u32,
                group: alloc.groups[group],
                dynamic_offsets,
            });
        }

        if let Some(vertex) = &self.vertex {
            for (var, var_alloc) in self.vars.vertex_set().vars().iter().zip(&vertex.vars) {
                let VarAlloc::Buffer(buffer) = var_alloc else {
                    continue;
                };
                let offset = buffer.slots[var.current_index()].offset;
                commands.push(match var.role() {
                    VarRole::Index => RenderCommand::BindIndexBuffer {
                        buffer: buffer.buffer,
                        offset,
                        format: IndexFormat::Uint32,
                    },
                    _ => RenderCommand::BindVertexBuffer {
                        slot: var.location(),
                        buffer: buffer.buffer,
                        offset,
                    },
                });
            }
        }
        Ok(commands)
    }

    /// Number of indices in the selected index value.
    pub(crate) fn index_count(&self) -> Option<u32> {
        self.vars
            .index_var()
            .map(|var| (var.current_value().len() / IndexFormat::Uint32.size() as usize) as u32)
    }

    /// Release every resource. Destruction waits for the frames still using them.
    pub fn release(self) {}
}

impl Drop for Memory {
    fn drop(&mut self) {
        self.release_allocations();
        if let Some(layouts) = self.layouts.take() {
            for layout in layouts {
                self.device.retire(Garbage::BindGroupLayout(layout));
            }
        }
        if let Some(sampler) = self.sampler.take() {
            self.device.retire(Garbage::Sampler(sampler));
        }
        trace!("memory `{}` released", self.label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_rhi::{BackendKind, HeadlessBackend, HeadlessProbe, QueueCapability, ShaderStage};
    use pretty_assertions::assert_eq;
    use crate::gpu::{Gpu, GpuConfig};
    use crate::vars::VarType;

    fn setup() -> (Gpu, Device, HeadlessProbe) {
        let backend = HeadlessBackend::new();
        let probe = backend.probe();
        let config = GpuConfig { backend: BackendKind::Headless, ..Default::default() };
        let gpu = Gpu::with_backend("test", Box::new(backend), config).unwrap();
        let device = Device::new(&gpu, QueueCapability::Graphics.into()).unwrap();
        (gpu, device, probe)
    }

    #[test]
    fn uniform_slots_follow_offset_alignment() {
        let (_gpu, device, _probe) = setup();
        let mut memory = Memory::new(&device, "test");
        let set = memory.vars_mut().add_set().unwrap();
        let objects = memory.vars_mut().set_mut(set).unwrap();
        objects.add("model", VarType::Mat4, VarRole::Uniform, ShaderStage::Vertex.into()).unwrap();
        objects.set_n_values(3);
        memory.config().unwrap();

        let offsets: Vec<u64> = (0..3)
            .map(|i| memory.buffer_location(Some(set), "model", i).unwrap().1)
            .collect();
        assert_eq!(offsets, vec![0, 256, 512]);
    }

    #[test]
    fn vertex_slots_are_packed() {
        let (_gpu, device, _probe) = setup();
        let mut memory = Memory::new(&device, "test");
        let vertex = memory.vars_mut().vertex_set_mut();
        let pos = vertex.add("pos", VarType::Float32x3, VarRole::Vertex, ShaderStage::Vertex.into()).unwrap();
        pos.value_mut(0).unwrap().set_from(&[0.0f32; 9]);
        vertex.set_n_values(2);
        vertex.var_mut("pos").unwrap().value_mut(1).unwrap().set_from(&[0.0f32; 3]);
        memory.config().unwrap();

        assert_eq!(memory.buffer_location(None, "pos", 0).unwrap().1, 0);
        assert_eq!(memory.buffer_location(None, "pos", 1).unwrap().1, 48);
    }

    #[test]
    fn sync_requires_config() {
        let (_gpu, device, _probe) = setup();
        let mut memory = Memory::new(&device, "test");
        assert!(matches!(memory.sync_to_gpu(), Err(GpuError::NotConfigured { .. })));
    }

    #[test]
    fn changed_value_counts_require_reconfig() {
        let (_gpu, device, _probe) = setup();
        let mut memory = Memory::new(&device, "test");
        let set = memory.vars_mut().add_set().unwrap();
        memory
            .vars_mut()
            .set_mut(set)
            .unwrap()
            .add("model", VarType::Mat4, VarRole::Uniform, ShaderStage::Vertex.into())
            .unwrap();
        memory.config().unwrap();

        memory.vars_mut().set_mut(set).unwrap().set_n_values(4);
        assert!(matches!(memory.sync_to_gpu(), Err(GpuError::NotConfigured { .. })));
        memory.config().unwrap();
        assert_eq!(memory.sync_to_gpu().unwrap(), 0);
        assert!(memory.buffer_location(Some(set), "model", 3).is_some());
    }

    #[test]
    fn textures_get_placeholders_and_one_group_per_value() {
        let (_gpu, device, probe) = setup();
        let mut memory = Memory::new(&device, "test");
        let set = memory.vars_mut().add_set().unwrap();
        let textures = memory.vars_mut().set_mut(set).unwrap();
        textures.add("albedo", VarType::Texture, VarRole::Texture, ShaderStage::Fragment.into()).unwrap();
        textures.set_n_values(2);
        textures
            .var_mut("albedo")
            .unwrap()
            .value_mut(1)
            .unwrap()
            .set_image(ImageData::solid(4, 2, [1, 2, 3, 4]));
        memory.config().unwrap();

        let placeholder = memory.texture(set, "albedo", 0).unwrap();
        assert_eq!(probe.texture_contents(placeholder).unwrap(), PLACEHOLDER_TEXEL.to_vec());
        let image = memory.texture(set, "albedo", 1).unwrap();
        assert_eq!(probe.texture_size(image), Some(lumen_rhi::Size::new(4, 2)));
        assert_eq!(probe.live_bind_groups(), 2);
        assert_eq!(probe.live_samplers(), 1);
    }

    #[test]
    fn resized_images_recreate_the_texture() {
        let (_gpu, device, probe) = setup();
        let mut memory = Memory::new(&device, "test");
        let set = memory.vars_mut().add_set().unwrap();
        memory
            .vars_mut()
            .set_mut(set)
            .unwrap()
            .add("albedo", VarType::Texture, VarRole::Texture, ShaderStage::Fragment.into())
            .unwrap();
        memory.config().unwrap();
        let before = memory.texture(set, "albedo", 0).unwrap();

        memory
            .vars_mut()
            .var_mut(set, "albedo")
            .unwrap()
            .value_mut(0)
            .unwrap()
            .set_image(ImageData::solid(8, 8, [0, 0, 0, 255]));
        assert_eq!(memory.sync_to_gpu().unwrap(), 1);

        let after = memory.texture(set, "albedo", 0).unwrap();
        assert_ne!(before, after);
        assert_eq!(probe.texture_size(after), Some(lumen_rhi::Size::new(8, 8)));
        // the replaced texture and group stay alive for frames in flight
        assert_eq!(probe.live_bind_groups(), 2);
        assert!(probe.texture_size(before).is_some());

        device.wait_idle().unwrap();
        assert_eq!(probe.live_bind_groups(), 1);
        assert_eq!(probe.texture_size(before), None);
    }

    #[test]
    fn dropping_memory_releases_everything_after_idle() {
        let (_gpu, device, probe) = setup();
        {
            let mut memory = Memory::new(&device, "test");
            let set = memory.vars_mut().add_set().unwrap();
            let uniforms = memory.vars_mut().set_mut(set).unwrap();
            uniforms.add("color", VarType::Float32x4, VarRole::Uniform, ShaderStage::Fragment.into()).unwrap();
            uniforms.add("albedo", VarType::Texture, VarRole::Texture, ShaderStage::Fragment.into()).unwrap();
            memory.config().unwrap();
            assert!(probe.live_objects() > 0);
        }
        device.wait_idle().unwrap();
        // only the device itself
        assert_eq!(probe.live_objects(), 1);
    }
}
