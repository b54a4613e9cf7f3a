// Backend module - Vulkan implementation of the presentation seams
//
// Design: Thin wrapper around ash. Every GPU object a swapchain generation
// creates lives in a `ResourceArena` and is released in reverse order.

pub mod arena;
pub mod commands;
pub mod debug;
pub mod device;
pub mod render_pass;
pub mod selector;
pub mod swapchain;
pub mod sync;

pub use commands::VulkanBackend;
pub use debug::{LogSink, ValidationSink};
pub use device::VulkanDevice;
pub use swapchain::{Swapchain, SwapchainSettings};
