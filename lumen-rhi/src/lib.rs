//! Lumen render hardware interface.
//!
//! Backend-neutral resource descriptions, the [`Backend`]/[`DeviceBackend`]
//! capability traits and two implementations: Vulkan (via `ash`) and a
//! headless backend that keeps everything in host memory.

mod backend;
mod command;
mod error;
mod handle;
mod headless;
mod image;
mod shader;
mod types;
pub mod vulkan;

pub use backend::*;
pub use command::*;
pub use error::*;
pub use handle::*;
pub use headless::{HeadlessBackend, HeadlessProbe, HeadlessStats, HEADLESS_ADAPTER_NAME, HEADLESS_SURFACE_FORMAT};
pub use image::ImageData;
pub use shader::*;
pub use types::*;

pub use vulkan::{InstanceDesc, VulkanBackend};

pub use lumen_rhi_derive::VertexLayout;

#[doc(hidden)]
pub use memoffset;
