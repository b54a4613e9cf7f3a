// Error types for the presentation core
//
// Recoverable surface conditions (out-of-date, suboptimal, minimized window)
// are NOT errors here: they are reported through `AcquiredImage` and
// `PresentStatus`. Everything in this enum ends the render loop.

use ash::vk;
use thiserror::Error;

use crate::present::SurfaceFormats;

pub type Result<T> = std::result::Result<T, RenderError>;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("failed to load the Vulkan library: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("validation layer {0} requested but not available")]
    MissingLayer(String),

    #[error("required instance extension {0} is not available")]
    MissingExtension(String),

    #[error("window was closed before it had a drawable area")]
    WindowClosed,

    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("none of the candidate depth formats supports depth/stencil attachments")]
    UnsupportedDepthFormat,

    #[error("failed to allocate GPU memory: {0}")]
    Allocation(#[from] gpu_allocator::AllocationError),

    #[error("{context}: {result}")]
    Vulkan {
        context: &'static str,
        result: vk::Result,
    },

    #[error("timed out after {timeout_ms}ms waiting for frame slot {slot}")]
    FenceTimeout { slot: usize, timeout_ms: u64 },

    #[error("failed to acquire swapchain image: {0}")]
    AcquireFailed(vk::Result),

    #[error("failed to submit frame commands: {0}")]
    SubmitFailed(vk::Result),

    #[error("failed to present swapchain image: {0}")]
    PresentFailed(vk::Result),

    #[error("swapchain color or depth format changed across rebuild ({old:?} -> {new:?})")]
    FormatChanged {
        old: SurfaceFormats,
        new: SurfaceFormats,
    },
}

impl RenderError {
    /// Attach a short description to a raw Vulkan status
    pub fn vulkan(context: &'static str) -> impl FnOnce(vk::Result) -> Self {
        move |result| Self::Vulkan { context, result }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vulkan_errors_carry_their_context() {
        let err = Err::<(), _>(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY)
            .map_err(RenderError::vulkan("create depth image"))
            .unwrap_err();

        assert!(err.to_string().starts_with("create depth image: "));
        assert!(matches!(
            err,
            RenderError::Vulkan {
                result: vk::Result::ERROR_OUT_OF_DEVICE_MEMORY,
                ..
            }
        ));
    }

    #[test]
    fn format_change_names_both_formats() {
        let err = RenderError::FormatChanged {
            old: SurfaceFormats {
                color: vk::Format::B8G8R8A8_SRGB,
                depth: vk::Format::D32_SFLOAT,
            },
            new: SurfaceFormats {
                color: vk::Format::B8G8R8A8_UNORM,
                depth: vk::Format::D32_SFLOAT,
            },
        };
        let text = err.to_string();
        assert!(text.contains("B8G8R8A8_SRGB"));
        assert!(text.contains("B8G8R8A8_UNORM"));
    }
}
