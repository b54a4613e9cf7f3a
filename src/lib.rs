//! Vulkan presentation core: device selection, swapchain management and a
//! frame coordinator that paces CPU recording against GPU work and the
//! display.
//!
//! The frame protocol in [`renderer`] is written against the traits in
//! [`present`] and [`window`]; [`backend`] provides the Vulkan
//! implementation.

pub mod backend;
pub mod config;
pub mod error;
pub mod present;
pub mod renderer;
pub mod window;

pub use error::{RenderError, Result};
pub use present::{AcquiredImage, ClearValues, Extent, PresentBackend, PresentStatus, PresentSurface, SurfaceFormats};
pub use renderer::Renderer;
pub use window::{PlatformWindow, WindowSystem};
