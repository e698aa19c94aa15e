use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;
use crate::command::CommandList;
use crate::handle::{BufferId, SurfaceId, TextureId};
use crate::types::Size;
use super::HeadlessState;

/// Counters accumulated by the headless backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadlessStats {
    pub buffer_writes: u64,
    pub bytes_written: u64,
    pub texture_writes: u64,
    pub ring_builds: u64,
    pub ring_releases: u64,
    pub acquires: u64,
    pub submissions: u64,
    pub presents: u64,
    pub wait_idles: u64,
}

/// Read-only window into a headless backend, plus fault injection.
#[derive(Clone)]
pub struct HeadlessProbe {
    state: Rc<RefCell<HeadlessState>>,
}

impl HeadlessProbe {
    pub(crate) fn new(state: Rc<RefCell<HeadlessState>>) -> Self {
        Self { state }
    }

    pub fn stats(&self) -> HeadlessStats {
        self.state.borrow().stats.clone()
    }

    /// Timeout the last device was given for write waits.
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.state.borrow().wait_timeout
    }

    pub fn live_devices(&self) -> usize {
        self.state.borrow().live_devices
    }

    pub fn live_buffers(&self) -> usize {
        self.state.borrow().buffers.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state.borrow().textures.len()
    }

    pub fn live_samplers(&self) -> usize {
        self.state.borrow().samplers.len()
    }

    pub fn live_shader_modules(&self) -> usize {
        self.state.borrow().shader_modules.len()
    }

    pub fn live_bind_group_layouts(&self) -> usize {
        self.state.borrow().layouts.len()
    }

    pub fn live_bind_groups(&self) -> usize {
        self.state.borrow().bind_groups.len()
    }

    pub fn live_pipelines(&self) -> usize {
        self.state.borrow().pipelines.len()
    }

    pub fn live_surfaces(&self) -> usize {
        self.state.borrow().surfaces.len()
    }

    /// Every backend object still alive, devices included.
    pub fn live_objects(&self) -> usize {
        let state = self.state.borrow();
        state.buffers.len()
            + state.textures.len()
            + state.samplers.len()
            + state.shader_modules.len()
            + state.layouts.len()
            + state.bind_groups.len()
            + state.pipelines.len()
            + state.surfaces.len()
            + state.live_devices
    }

    pub fn is_buffer_alive(&self, buffer: BufferId) -> bool {
        self.state.borrow().buffers.contains_key(buffer)
    }

    pub fn buffer_contents(&self, buffer: BufferId) -> Option<Vec<u8>> {
        self.state.borrow().buffers.get(buffer).map(|b| b.data.clone())
    }

    pub fn texture_contents(&self, texture: TextureId) -> Option<Vec<u8>> {
        self.state.borrow().textures.get(texture).map(|t| t.data.clone())
    }

    pub fn texture_size(&self, texture: TextureId) -> Option<Size> {
        self.state.borrow().textures.get(texture).map(|t| t.desc.size)
    }

    pub fn surface_size(&self, surface: SurfaceId) -> Option<Size> {
        self.state.borrow().surfaces.get(surface).map(|s| s.info.size)
    }

    pub fn submitted(&self) -> Vec<CommandList> {
        self.state.borrow().submitted.clone()
    }

    pub fn last_submitted(&self) -> Option<CommandList> {
        self.state.borrow().submitted.last().cloned()
    }

    /// Make the next `count` acquisitions report an out-of-date surface.
    pub fn inject_outdated_acquire(&self, count: u32) {
        self.state.borrow_mut().faults.outdated_acquires += count;
    }

    /// Make the next `count` acquisitions time out.
    pub fn inject_acquire_timeout(&self, count: u32) {
        self.state.borrow_mut().faults.acquire_timeouts += count;
    }

    /// Make the next `count` presentations report an out-of-date surface.
    pub fn inject_outdated_present(&self, count: u32) {
        self.state.borrow_mut().faults.outdated_presents += count;
    }
}
