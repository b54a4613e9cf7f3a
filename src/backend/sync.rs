// Synchronization primitives
//
// One set per frame in flight. The fence gates reuse of the slot's command
// recorder; the semaphores order acquire -> render -> present on the GPU.

use ash::vk;
use std::sync::Arc;
use std::time::Duration;

use super::arena::{GpuResource, ResourceArena};
use super::VulkanDevice;
use crate::error::{RenderError, Result};

/// Frame synchronization - one per frame in flight
#[derive(Clone, Copy, Debug)]
pub struct FrameSync {
    pub image_available: vk::Semaphore,
    pub render_finished: vk::Semaphore,
    pub in_flight: vk::Fence,
}

impl FrameSync {
    /// Objects are owned by `arena`; this struct only keeps the handles.
    pub fn new(arena: &mut ResourceArena<Arc<VulkanDevice>>) -> Result<Self> {
        let device = arena.owner().device.clone();
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        // Start signaled so the first wait on a fresh slot returns at once
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        let image_available = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(RenderError::vulkan("create image-available semaphore"))?;
        arena.push(GpuResource::Semaphore(image_available));

        let render_finished = unsafe { device.create_semaphore(&semaphore_info, None) }
            .map_err(RenderError::vulkan("create render-finished semaphore"))?;
        arena.push(GpuResource::Semaphore(render_finished));

        let in_flight = unsafe { device.create_fence(&fence_info, None) }
            .map_err(RenderError::vulkan("create in-flight fence"))?;
        arena.push(GpuResource::Fence(in_flight));

        Ok(Self {
            image_available,
            render_finished,
            in_flight,
        })
    }
}

/// Block until `fence` signals, giving up after `timeout`.
///
/// The timeout only catches a hung GPU; a slow frame must never reach it.
pub fn wait_for_fence(
    device: &ash::Device,
    fence: vk::Fence,
    timeout: Duration,
    slot: usize,
) -> Result<()> {
    match unsafe { device.wait_for_fences(&[fence], true, timeout_nanos(timeout)) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RenderError::FenceTimeout {
            slot,
            timeout_ms: timeout.as_millis() as u64,
        }),
        Err(e) => Err(RenderError::vulkan("wait for frame fence")(e)),
    }
}

fn timeout_nanos(timeout: Duration) -> u64 {
    u64::try_from(timeout.as_nanos()).unwrap_or(u64::MAX)
}
