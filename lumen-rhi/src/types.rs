//! Backend-neutral descriptions of devices, resources and pipelines.

use enumflags2::{bitflags, BitFlags};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use crate::handle::{BindGroupLayoutId, BufferId, SamplerId, ShaderModuleId, TextureId};

#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum QueueCapability {
    Graphics = 1 << 0,
    Compute = 1 << 1,
    Transfer = 1 << 2,
}

pub type QueueCapabilities = BitFlags<QueueCapability>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueFamilyInfo {
    pub index: u32,
    pub capabilities: QueueCapabilities,
    pub queue_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterKind {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

/// A physical adapter as reported by a backend.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub kind: AdapterKind,
    /// (major, minor, patch)
    pub api_version: (u32, u32, u32),
    /// Total device-local memory in bytes.
    pub vram_bytes: u64,
    pub queue_families: Vec<QueueFamilyInfo>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: u64,
    pub min_storage_buffer_offset_alignment: u64,
    pub max_texture_dimension_2d: u32,
    pub max_bind_groups: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    Rgba8Unorm,
    Rgba8Srgb,
    Bgra8Unorm,
    Bgra8Srgb,
    Depth32Float,
    Depth24PlusStencil8,
}

impl Format {
    #[inline]
    pub fn is_depth(self) -> bool {
        matches!(self, Format::Depth32Float | Format::Depth24PlusStencil8)
    }

    #[inline]
    pub fn bytes_per_pixel(self) -> u32 {
        4
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexFormat {
    Float32,
    Float32x2,
    Float32x3,
    Float32x4,
    Uint32,
    Uint32x2,
    Uint32x3,
    Uint32x4,
    Sint32,
}

impl VertexFormat {
    pub fn size(self) -> u32 {
        match self {
            VertexFormat::Float32 | VertexFormat::Uint32 | VertexFormat::Sint32 => 4,
            VertexFormat::Float32x2 | VertexFormat::Uint32x2 => 8,
            VertexFormat::Float32x3 | VertexFormat::Uint32x3 => 12,
            VertexFormat::Float32x4 | VertexFormat::Uint32x4 => 16,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    pub fn size(self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VertexAttribute {
    pub location: u32,
    pub format: VertexFormat,
    pub offset: u32,
}

/// Implemented by `#[derive(VertexLayout)]` for interleaved vertex structs.
pub trait VertexLayout {
    fn stride() -> u32;
    fn attributes() -> Vec<VertexAttribute>;
}

/// One vertex buffer binding slot and the attributes it feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VertexBufferLayout {
    pub slot: u32,
    pub stride: u32,
    pub attributes: Vec<VertexAttribute>,
}

#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex = 1 << 0,
    Fragment = 1 << 1,
    Compute = 1 << 2,
}

pub type ShaderStages = BitFlags<ShaderStage>;

#[bitflags]
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferUsage {
    Vertex = 1 << 0,
    Index = 1 << 1,
    Uniform = 1 << 2,
    Storage = 1 << 3,
    CopyDst = 1 << 4,
}

pub type BufferUsages = BitFlags<BufferUsage>;

/// Host-visible buffer description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferDesc {
    pub label: String,
    pub size: u64,
    pub usage: BufferUsages,
}

/// Sampled 2D texture description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: String,
    pub size: Size,
    pub format: Format,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FilterMode {
    Nearest,
    #[default]
    Linear,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddressMode {
    #[default]
    Repeat,
    MirrorRepeat,
    ClampToEdge,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerDesc {
    pub label: String,
    pub filter: FilterMode,
    pub address_mode: AddressMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            label: "sampler".to_owned(),
            filter: FilterMode::Linear,
            address_mode: AddressMode::Repeat,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Uniform buffer selected through a dynamic offset.
    UniformDynamic { min_size: u64 },
    /// Storage buffer selected through a dynamic offset.
    StorageDynamic { min_size: u64 },
    SampledTexture,
    Sampler,
}

impl BindingKind {
    #[inline]
    pub fn is_dynamic(self) -> bool {
        matches!(self, BindingKind::UniformDynamic { .. } | BindingKind::StorageDynamic { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupLayoutEntry {
    pub binding: u32,
    pub kind: BindingKind,
    pub stages: ShaderStages,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupLayoutDesc {
    pub label: String,
    pub entries: Vec<BindGroupLayoutEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingResource {
    Buffer { buffer: BufferId, offset: u64, size: u64 },
    Texture(TextureId),
    Sampler(SamplerId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupEntry {
    pub binding: u32,
    pub resource: BindingResource,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindGroupDesc {
    pub label: String,
    pub layout: BindGroupLayoutId,
    pub entries: Vec<BindGroupEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrimitiveTopology {
    #[default]
    TriangleList,
    TriangleStrip,
    LineList,
    LineStrip,
    PointList,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullMode {
    None,
    Front,
    #[default]
    Back,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrontFace {
    #[default]
    Ccw,
    Cw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Replace,
    Alpha,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderEntry {
    pub module: ShaderModuleId,
    pub entry: String,
}

/// Graphics pipeline description targeting dynamic rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineDesc {
    pub label: String,
    pub vertex: ShaderEntry,
    pub fragment: Option<ShaderEntry>,
    pub bind_group_layouts: Vec<BindGroupLayoutId>,
    pub vertex_buffers: Vec<VertexBufferLayout>,
    pub topology: PrimitiveTopology,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub blend: BlendMode,
    pub color_format: Format,
    pub depth_format: Option<Format>,
    pub sample_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PresentMode {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}

/// What a surface presents to.
#[derive(Debug, Clone, Copy)]
pub enum SurfaceTarget {
    Window {
        display: RawDisplayHandle,
        window: RawWindowHandle,
    },
    /// Ring of images that are never shown. Only the headless backend supports it.
    Offscreen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceConfig {
    pub size: Size,
    pub present_mode: PresentMode,
    pub depth_format: Option<Format>,
    pub frames_in_flight: u32,
}

/// State of a configured frame ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SurfaceInfo {
    pub format: Format,
    pub size: Size,
    pub image_count: u32,
    pub depth_format: Option<Format>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
}
