//! Error taxonomy shared by every Lumen rendering crate.

use ash::vk;
use thiserror::Error;

pub type Result<T, E = GpuError> = std::result::Result<T, E>;

/// How the caller is expected to react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Invalid configuration requested before a component was configured. Never retried.
    Setup,
    /// Recoverable by reconfiguring the surface and skipping the current frame.
    Transient,
    /// Backend allocation failure. Reported, no fallback.
    ResourceExhausted,
    /// Programming error or unrecoverable backend failure.
    Fatal,
}

#[derive(Debug, Error)]
pub enum GpuError {
    #[error("no suitable adapter found: {0}")]
    NoSuitableAdapter(String),

    #[error("no queue family supports the requested capabilities {requested}")]
    NoSuitableQueue { requested: String },

    #[error("{what} is already configured")]
    AlreadyConfigured { what: String },

    #[error("{what} is not configured")]
    NotConfigured { what: String },

    #[error("{what} has been released")]
    Released { what: String },

    #[error("configuration of {what} failed: {message}")]
    Config { what: String, message: String },

    #[error("unknown variable `{name}` in set {set}")]
    UnknownVar { set: String, name: String },

    #[error("value index {index} out of range for `{var}` ({count} values)")]
    ValueIndexOutOfRange { var: String, index: usize, count: usize },

    #[error("too many {kind} lights (maximum {max})")]
    TooManyLights { kind: &'static str, max: usize },

    #[error("{what} is still used by {count} dependent object(s)")]
    StillInUse { what: &'static str, count: usize },

    #[error("surface is out of date")]
    SurfaceOutdated,

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("out of {0} memory")]
    OutOfMemory(&'static str),

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("render pass protocol violation: {0}")]
    RenderPass(String),

    #[error("frame order violation: {0}")]
    FrameOrder(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl GpuError {
    pub fn config(what: impl Into<String>, message: impl Into<String>) -> Self {
        GpuError::Config { what: what.into(), message: message.into() }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            GpuError::NoSuitableAdapter(_)
            | GpuError::NoSuitableQueue { .. }
            | GpuError::AlreadyConfigured { .. }
            | GpuError::NotConfigured { .. }
            | GpuError::Config { .. }
            | GpuError::UnknownVar { .. }
            | GpuError::ValueIndexOutOfRange { .. }
            | GpuError::TooManyLights { .. }
            | GpuError::Unsupported(_)
            | GpuError::Io(_) => ErrorClass::Setup,
            GpuError::SurfaceOutdated | GpuError::Timeout(_) => ErrorClass::Transient,
            GpuError::OutOfMemory(_) => ErrorClass::ResourceExhausted,
            GpuError::Released { .. }
            | GpuError::StillInUse { .. }
            | GpuError::RenderPass(_)
            | GpuError::FrameOrder(_)
            | GpuError::Backend(_) => ErrorClass::Fatal,
        }
    }

    #[inline]
    pub fn is_transient(&self) -> bool {
        self.class() == ErrorClass::Transient
    }
}

impl From<vk::Result> for GpuError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_OUT_OF_DATE_KHR | vk::Result::ERROR_SURFACE_LOST_KHR => GpuError::SurfaceOutdated,
            vk::Result::TIMEOUT | vk::Result::NOT_READY => GpuError::Timeout("vulkan"),
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY => GpuError::OutOfMemory("device"),
            vk::Result::ERROR_OUT_OF_HOST_MEMORY => GpuError::OutOfMemory("host"),
            other => GpuError::Backend(format!("{other:?}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn vulkan_results_map_to_classes() {
        assert_eq!(GpuError::from(vk::Result::ERROR_OUT_OF_DATE_KHR).class(), ErrorClass::Transient);
        assert_eq!(GpuError::from(vk::Result::TIMEOUT).class(), ErrorClass::Transient);
        assert_eq!(GpuError::from(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).class(), ErrorClass::ResourceExhausted);
        assert_eq!(GpuError::from(vk::Result::ERROR_DEVICE_LOST).class(), ErrorClass::Fatal);
    }

    #[test]
    fn setup_errors_are_not_transient() {
        let err = GpuError::TooManyLights { kind: "point", max: 4 };
        assert!(!err.is_transient());
        assert_eq!(err.to_string(), "too many point lights (maximum 4)");
    }
}
