// Scoped GPU object ownership
//
// Objects are registered right after they are created and released in the
// exact reverse order when the arena drops. A constructor that bails out with
// `?` half way through therefore still cleans up everything it made.

use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use super::VulkanDevice;

/// Something that knows how to destroy the resources it hands out
pub trait Release {
    type Resource;

    fn release(&self, resource: Self::Resource);
}

pub struct ResourceArena<O: Release> {
    owner: O,
    resources: Vec<O::Resource>,
}

impl<O: Release> ResourceArena<O> {
    pub fn new(owner: O) -> Self {
        Self {
            owner,
            resources: Vec::new(),
        }
    }

    pub fn owner(&self) -> &O {
        &self.owner
    }

    pub fn push(&mut self, resource: O::Resource) {
        self.resources.push(resource);
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl<O: Release> Drop for ResourceArena<O> {
    fn drop(&mut self) {
        while let Some(resource) = self.resources.pop() {
            self.owner.release(resource);
        }
    }
}

/// Everything a swapchain generation owns on the device
pub enum GpuResource {
    Swapchain(vk::SwapchainKHR),
    ImageView(vk::ImageView),
    Image(vk::Image),
    Memory(Allocation),
    RenderPass(vk::RenderPass),
    Framebuffer(vk::Framebuffer),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
}

impl Release for Arc<VulkanDevice> {
    type Resource = GpuResource;

    fn release(&self, resource: GpuResource) {
        let device = &self.device;
        unsafe {
            match resource {
                GpuResource::Swapchain(swapchain) => {
                    self.swapchain_loader.destroy_swapchain(swapchain, None)
                }
                GpuResource::ImageView(view) => device.destroy_image_view(view, None),
                GpuResource::Image(image) => device.destroy_image(image, None),
                GpuResource::Memory(allocation) => {
                    if let Err(e) = self.allocator.lock().free(allocation) {
                        log::warn!("Failed to free GPU allocation: {}", e);
                    }
                }
                GpuResource::RenderPass(pass) => device.destroy_render_pass(pass, None),
                GpuResource::Framebuffer(fb) => device.destroy_framebuffer(fb, None),
                GpuResource::Semaphore(semaphore) => device.destroy_semaphore(semaphore, None),
                GpuResource::Fence(fence) => device.destroy_fence(fence, None),
            }
        }
    }
}
