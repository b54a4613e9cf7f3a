// Command recorders and the production `PresentBackend`
//
// Recorders are primary command buffers from the device's pool, re-begun
// every frame (the pool allows per-buffer reset).

use ash::vk;
use std::sync::Arc;

use super::swapchain::{Swapchain, SwapchainSettings};
use super::VulkanDevice;
use crate::error::{RenderError, Result};
use crate::present::{Extent, PresentBackend};

pub struct VulkanBackend {
    device: Arc<VulkanDevice>,
    settings: SwapchainSettings,
}

impl VulkanBackend {
    pub fn new(device: Arc<VulkanDevice>, settings: SwapchainSettings) -> Self {
        Self { device, settings }
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn settings(&self) -> &SwapchainSettings {
        &self.settings
    }
}

impl PresentBackend for VulkanBackend {
    type Recorder = vk::CommandBuffer;
    type Surface = Swapchain;

    fn create_surface(&self, extent: Extent, previous: Option<&Swapchain>) -> Result<Swapchain> {
        Swapchain::new(self.device.clone(), &self.settings, extent, previous)
    }

    fn wait_idle(&self) -> Result<()> {
        self.device.wait_idle()
    }

    fn allocate_recorders(&self, count: usize) -> Result<Vec<vk::CommandBuffer>> {
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count as u32);

        unsafe { self.device.device.allocate_command_buffers(&info) }
            .map_err(RenderError::vulkan("allocate command buffers"))
    }

    fn free_recorders(&self, recorders: &[vk::CommandBuffer]) {
        if recorders.is_empty() {
            return;
        }
        unsafe {
            self.device
                .device
                .free_command_buffers(self.device.command_pool, recorders)
        };
    }

    fn begin_recording(&self, recorder: vk::CommandBuffer) -> Result<()> {
        let info = vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        // Implicitly resets the buffer; its slot fence has already signaled
        unsafe { self.device.device.begin_command_buffer(recorder, &info) }
            .map_err(RenderError::vulkan("begin command buffer"))
    }

    fn end_recording(&self, recorder: vk::CommandBuffer) -> Result<()> {
        unsafe { self.device.device.end_command_buffer(recorder) }
            .map_err(RenderError::vulkan("end command buffer"))
    }
}
