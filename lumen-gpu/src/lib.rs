//! Rendering system layer of Lumen.
//!
//! A [`Gpu`] selects an adapter, a [`Device`] owns a queue, a [`Surface`] owns a ring of frames and
//! a [`System`] owns variables, their GPU memory and the pipelines reading them. Objects are created
//! from their parent and must be released in reverse order; releasing a parent with live children fails.

mod device;
mod gpu;
mod memory;
mod pipeline;
mod render_loop;
mod surface;
mod system;
mod value;
mod vars;

pub use device::{Device, Refused};
pub use gpu::{Gpu, GpuConfig, GpuConfigBuilder, GpuConfigBuilderError};
pub use memory::Memory;
pub use pipeline::{Pipeline, PipelineState};
pub use render_loop::{present_frame, render_frame, FrameOutcome, SkipReason};
pub use surface::{Frame, Surface, SurfaceOptions};
pub use system::{CommandEncoder, LoadAction, RenderConfig, System};
pub use value::Value;
pub use vars::{Var, VarRole, VarSet, VarType, Vars};

pub use lumen_rhi as rhi;
pub use lumen_rhi::{
    AdapterInfo, AdapterKind, BackendKind, BlendMode, CommandList, CullMode, DeviceLimits, ErrorClass, Format,
    FrontFace, GpuError, ImageData, PresentMode, PrimitiveTopology, QueueCapabilities, QueueCapability, RenderCommand,
    Result, ShaderSource, ShaderStage, ShaderStages, Size, SurfaceTarget, VertexLayout,
};
