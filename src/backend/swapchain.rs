// Swapchain - Window presentation
//
// One generation of presentable images with everything that is sized or
// formatted after them: color views, per-image depth buffers, the render
// pass, framebuffers and the per-slot sync objects. A resize builds a new
// generation instead of patching this one.

use ash::vk;
use gpu_allocator::vulkan::{AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use std::time::Duration;

use super::arena::{GpuResource, ResourceArena};
use super::render_pass;
use super::sync::{self, FrameSync};
use super::VulkanDevice;
use crate::error::{RenderError, Result};
use crate::present::{
    AcquiredImage, ClearValues, Extent, PresentStatus, PresentSurface, SurfaceFormats,
};

/// Depth formats in order of preference
pub const DEPTH_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

pub const PREFERRED_SRGB_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

pub const PREFERRED_UNORM_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Knobs that stay fixed across rebuilds
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainSettings {
    pub frames_in_flight: usize,
    pub present_mode: vk::PresentModeKHR,
    pub preferred_format: vk::SurfaceFormatKHR,
    pub fence_timeout: Duration,
}

impl Default for SwapchainSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 2,
            present_mode: vk::PresentModeKHR::MAILBOX,
            preferred_format: PREFERRED_SRGB_FORMAT,
            fence_timeout: Duration::from_secs(30),
        }
    }
}

// =============================================================================
// SURFACE PROPERTY SELECTION
// =============================================================================

/// The preferred format when supported, otherwise whatever comes first.
pub fn choose_surface_format(
    available: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> Option<vk::SurfaceFormatKHR> {
    available
        .iter()
        .copied()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| available.first().copied())
}

pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO // FIFO is always supported
    }
}

/// The surface dictates its size unless `current_extent` is the
/// `u32::MAX` sentinel, in which case the request is clamped per axis.
pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: Extent) -> Extent {
    if caps.current_extent.width != u32::MAX {
        return caps.current_extent.into();
    }

    Extent::new(
        requested
            .width
            .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
        requested
            .height
            .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
    )
}

/// One more than the minimum; a zero maximum means unbounded.
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = caps.min_image_count + 1;
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

/// First candidate whose optimal-tiling features include depth/stencil
/// attachment use.
pub fn find_depth_format(
    candidates: &[vk::Format],
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Result<vk::Format> {
    candidates
        .iter()
        .copied()
        .find(|&format| {
            properties(format)
                .optimal_tiling_features
                .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
        })
        .ok_or(RenderError::UnsupportedDepthFormat)
}

// =============================================================================
// SWAPCHAIN
// =============================================================================

pub struct Swapchain {
    handle: vk::SwapchainKHR,
    formats: SurfaceFormats,
    present_mode: vk::PresentModeKHR,
    extent: Extent,
    render_pass: vk::RenderPass,
    framebuffers: Vec<vk::Framebuffer>,
    frames: Vec<FrameSync>,
    /// Fence of the slot whose work last used each image (null when unused)
    images_in_flight: Vec<vk::Fence>,
    current_frame: usize,
    fence_timeout: Duration,
    arena: ResourceArena<Arc<VulkanDevice>>,
}

impl Swapchain {
    pub fn new(
        device: Arc<VulkanDevice>,
        settings: &SwapchainSettings,
        requested: Extent,
        previous: Option<&Swapchain>,
    ) -> Result<Self> {
        let pd = device.physical_device;
        let surface = device.surface();
        let surface_loader = device.surface_loader();

        let caps = unsafe { surface_loader.get_physical_device_surface_capabilities(pd, surface) }
            .map_err(RenderError::vulkan("query surface capabilities"))?;
        let available_formats = unsafe { surface_loader.get_physical_device_surface_formats(pd, surface) }
            .map_err(RenderError::vulkan("query surface formats"))?;
        let available_modes = unsafe { surface_loader.get_physical_device_surface_present_modes(pd, surface) }
            .map_err(RenderError::vulkan("query present modes"))?;

        let surface_format = choose_surface_format(&available_formats, settings.preferred_format)
            .ok_or(RenderError::Vulkan {
                context: "choose surface format",
                result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
            })?;
        let present_mode = choose_present_mode(&available_modes, settings.present_mode);
        let extent = choose_extent(&caps, requested);
        let image_count = choose_image_count(&caps);
        let depth_format = find_depth_format(&DEPTH_CANDIDATES, |format| unsafe {
            device.instance().get_physical_device_format_properties(pd, format)
        })?;

        log::info!(
            "Creating swapchain: {} {:?}/{:?} depth {:?}, {:?}",
            extent,
            surface_format.format,
            surface_format.color_space,
            depth_format,
            present_mode
        );

        let formats = SurfaceFormats {
            color: surface_format.format,
            depth: depth_format,
        };

        // Everything below is registered in the arena the moment it exists
        let mut arena = ResourceArena::new(device.clone());

        // Sharing mode depends on whether graphics and present are one family
        let family_indices = [device.graphics_queue_family, device.present_queue_family];
        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent.into())
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .pre_transform(caps.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(previous.map_or(vk::SwapchainKHR::null(), |p| p.handle));
        let create_info = if family_indices[0] != family_indices[1] {
            create_info
                .image_sharing_mode(vk::SharingMode::CONCURRENT)
                .queue_family_indices(&family_indices)
        } else {
            create_info.image_sharing_mode(vk::SharingMode::EXCLUSIVE)
        };

        let handle = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
            .map_err(RenderError::vulkan("create swapchain"))?;
        arena.push(GpuResource::Swapchain(handle));

        let images = unsafe { device.swapchain_loader.get_swapchain_images(handle) }
            .map_err(RenderError::vulkan("get swapchain images"))?;

        let render_pass = render_pass::create_render_pass(&device.device, formats)?;
        arena.push(GpuResource::RenderPass(render_pass));

        let mut framebuffers = Vec::with_capacity(images.len());
        for &image in &images {
            let color_view = create_view(&mut arena, image, formats.color, vk::ImageAspectFlags::COLOR)?;
            let depth_view = create_depth_buffer(&mut arena, formats.depth, extent)?;
            let framebuffer =
                render_pass::create_framebuffer(&device.device, render_pass, color_view, depth_view, extent)?;
            arena.push(GpuResource::Framebuffer(framebuffer));
            framebuffers.push(framebuffer);
        }

        let frames = (0..settings.frames_in_flight.max(1))
            .map(|_| FrameSync::new(&mut arena))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "Created swapchain with {} images, {} frames in flight",
            images.len(),
            frames.len()
        );

        Ok(Self {
            handle,
            formats,
            present_mode,
            extent,
            render_pass,
            framebuffers,
            frames,
            images_in_flight: vec![vk::Fence::null(); images.len()],
            current_frame: 0,
            fence_timeout: settings.fence_timeout,
            arena,
        })
    }

    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    pub fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    fn device(&self) -> &Arc<VulkanDevice> {
        self.arena.owner()
    }
}

fn create_view(
    arena: &mut ResourceArena<Arc<VulkanDevice>>,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    let view = unsafe { arena.owner().device.create_image_view(&info, None) }
        .map_err(RenderError::vulkan("create image view"))?;
    arena.push(GpuResource::ImageView(view));
    Ok(view)
}

/// Depth image + memory + view for one swapchain image. Returns the view.
fn create_depth_buffer(
    arena: &mut ResourceArena<Arc<VulkanDevice>>,
    format: vk::Format,
    extent: Extent,
) -> Result<vk::ImageView> {
    let device = arena.owner().clone();

    let info = vk::ImageCreateInfo::builder()
        .image_type(vk::ImageType::TYPE_2D)
        .format(format)
        .extent(vk::Extent3D {
            width: extent.width,
            height: extent.height,
            depth: 1,
        })
        .mip_levels(1)
        .array_layers(1)
        .samples(vk::SampleCountFlags::TYPE_1)
        .tiling(vk::ImageTiling::OPTIMAL)
        .usage(vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT)
        .sharing_mode(vk::SharingMode::EXCLUSIVE)
        .initial_layout(vk::ImageLayout::UNDEFINED);

    let image = unsafe { device.device.create_image(&info, None) }
        .map_err(RenderError::vulkan("create depth image"))?;
    arena.push(GpuResource::Image(image));

    let requirements = unsafe { device.device.get_image_memory_requirements(image) };
    let allocation = device.allocator.lock().allocate(&AllocationCreateDesc {
        name: "depth buffer",
        requirements,
        location: MemoryLocation::GpuOnly,
        linear: false,
        allocation_scheme: AllocationScheme::GpuAllocatorManaged,
    })?;
    let (memory, offset) = (unsafe { allocation.memory() }, allocation.offset());
    arena.push(GpuResource::Memory(allocation));

    unsafe { device.device.bind_image_memory(image, memory, offset) }
        .map_err(RenderError::vulkan("bind depth image memory"))?;

    create_view(arena, image, format, vk::ImageAspectFlags::DEPTH)
}

impl PresentSurface for Swapchain {
    type Recorder = vk::CommandBuffer;

    fn formats(&self) -> SurfaceFormats {
        self.formats
    }

    fn extent(&self) -> Extent {
        self.extent
    }

    fn image_count(&self) -> usize {
        self.framebuffers.len()
    }

    fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    fn frame_index(&self) -> usize {
        self.current_frame
    }

    fn acquire_next_image(&mut self) -> Result<AcquiredImage> {
        let frame = self.frames[self.current_frame];
        let device = self.device();

        sync::wait_for_fence(&device.device, frame.in_flight, self.fence_timeout, self.current_frame)?;

        let result = unsafe {
            device.swapchain_loader.acquire_next_image(
                self.handle,
                u64::MAX,
                frame.image_available,
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquiredImage::Ready { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
            Err(e) => Err(RenderError::AcquireFailed(e)),
        }
    }

    fn submit_and_present(
        &mut self,
        recorder: vk::CommandBuffer,
        image_index: u32,
    ) -> Result<PresentStatus> {
        let slot = self.current_frame;
        let frame = self.frames[slot];
        let device = self.device().clone();

        // A previous frame in another slot may still be rendering to this image
        let image = image_index as usize;
        let in_use = self.images_in_flight[image];
        if in_use != vk::Fence::null() {
            sync::wait_for_fence(&device.device, in_use, self.fence_timeout, slot)?;
        }
        self.images_in_flight[image] = frame.in_flight;

        unsafe { device.device.reset_fences(&[frame.in_flight]) }
            .map_err(RenderError::vulkan("reset frame fence"))?;

        let wait_semaphores = [frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [recorder];
        let signal_semaphores = [frame.render_finished];
        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue, &[submit_info], frame.in_flight)
        }
        .map_err(RenderError::SubmitFailed)?;

        let swapchains = [self.handle];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&signal_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = unsafe {
            device
                .swapchain_loader
                .queue_present(device.present_queue, &present_info)
        };

        let status = match result {
            Ok(false) => PresentStatus::Optimal,
            Ok(true) => PresentStatus::Suboptimal,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => PresentStatus::OutOfDate,
            Err(e) => return Err(RenderError::PresentFailed(e)),
        };

        self.current_frame = (slot + 1) % self.frames.len();
        Ok(status)
    }

    fn begin_render_pass(&self, recorder: vk::CommandBuffer, image_index: u32, clear: &ClearValues) {
        let device = &self.device().device;
        let clear_values = clear.to_vk();
        let scissor = render_pass::full_scissor(self.extent);

        let info = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass)
            .framebuffer(self.framebuffers[image_index as usize])
            .render_area(scissor)
            .clear_values(&clear_values);

        unsafe {
            device.cmd_begin_render_pass(recorder, &info, vk::SubpassContents::INLINE);
            device.cmd_set_viewport(recorder, 0, &[render_pass::full_viewport(self.extent)]);
            device.cmd_set_scissor(recorder, 0, &[scissor]);
        }
    }

    fn end_render_pass(&self, recorder: vk::CommandBuffer) {
        unsafe { self.device().device.cmd_end_render_pass(recorder) };
    }
}
