//! Recorded render commands.
//!
//! Command lists are built on the CPU without touching the backend and are
//! translated into native command buffers when a surface submits them.

use std::ops::Range;
use smallvec::SmallVec;
use crate::handle::{BindGroupId, BufferId, PipelineId, SurfaceId};
use crate::types::{IndexFormat, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadOp<T> {
    Clear(T),
    Load,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderPassDesc {
    pub surface: SurfaceId,
    pub image_index: u32,
    pub size: Size,
    pub color: LoadOp<[f32; 4]>,
    /// `None` when the pass renders without a depth attachment.
    pub depth: Option<LoadOp<f32>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    BeginRenderPass(RenderPassDesc),
    EndRenderPass,
    BindPipeline(PipelineId),
    BindGroup {
        index: u32,
        group: BindGroupId,
        dynamic_offsets: SmallVec<[u32; 4]>,
    },
    BindVertexBuffer {
        slot: u32,
        buffer: BufferId,
        offset: u64,
    },
    BindIndexBuffer {
        buffer: BufferId,
        offset: u64,
        format: IndexFormat,
    },
    Draw {
        vertices: Range<u32>,
        instances: Range<u32>,
    },
    DrawIndexed {
        indices: Range<u32>,
        base_vertex: i32,
        instances: Range<u32>,
    },
}

/// A finished recording targeting one acquired surface image.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandList {
    pub surface: SurfaceId,
    pub image_index: u32,
    pub commands: Vec<RenderCommand>,
}

impl CommandList {
    pub fn draw_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::Draw { .. } | RenderCommand::DrawIndexed { .. }))
            .count()
    }
}
