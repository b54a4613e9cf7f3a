// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface creation
// - Physical device selection (see `selector`)
// - Logical device + graphics/present queues
// - Command pool and memory allocator setup

use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::Mutex;
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};
use std::ffi::{c_char, CStr, CString};
use std::mem::ManuallyDrop;
use std::sync::Arc;

use super::debug::{self, SinkBox, ValidationSink};
use super::selector::{self, DeviceCapabilities, QueueFamilyIndices, SelectedDevice};
use crate::error::{RenderError, Result};

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

fn required_device_extensions() -> [&'static CStr; 1] {
    [khr::Swapchain::name()]
}

/// Names from `required` that do not appear in `available`
fn find_missing(required: &[&CStr], available: &[&CStr]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

/// Instance-level objects. Dropping this tears them down, which is also what
/// happens when device creation fails after the instance exists.
struct InstanceContext {
    surface: vk::SurfaceKHR,
    surface_loader: khr::Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    // Must outlive the messenger that points at it
    sink: SinkBox,
    instance: ash::Instance,
    entry: Entry,
}

impl InstanceContext {
    unsafe fn new(
        app_name: &str,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        enable_validation: bool,
        sink: Box<dyn ValidationSink>,
    ) -> Result<Self> {
        // Step 1: Load Vulkan library
        let entry = Entry::load()?;

        // Step 2: Check layers and extensions before asking for them
        let mut extensions: Vec<*const c_char> = ash_window::enumerate_required_extensions(display)
            .map_err(RenderError::vulkan("query required surface extensions"))?
            .to_vec();
        if enable_validation {
            extensions.push(DebugUtils::name().as_ptr());
            check_layer_support(&entry)?;
        }
        check_extension_support(&entry, &extensions)?;

        // Step 3: Create instance
        let app_name = CString::new(app_name).unwrap_or_default();
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"vk-present")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_3);

        let layer_names = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            vec![]
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance = entry
            .create_instance(&create_info, None)
            .map_err(RenderError::vulkan("create instance"))?;

        // From here on `ctx` owns everything, so early returns clean up
        let sink: SinkBox = Box::new(sink);
        let mut ctx = Self {
            surface: vk::SurfaceKHR::null(),
            surface_loader: khr::Surface::new(&entry, &instance),
            debug_utils: None,
            sink,
            instance,
            entry,
        };

        // Step 4: Debug messenger reporting to the injected sink
        if enable_validation {
            let debug_utils = DebugUtils::new(&ctx.entry, &ctx.instance);
            let info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
                .message_severity(
                    vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
                        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
                        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
                )
                .message_type(
                    vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
                )
                .pfn_user_callback(Some(debug::debug_callback))
                .user_data(debug::user_data(&ctx.sink));

            let messenger = debug_utils
                .create_debug_utils_messenger(&info, None)
                .map_err(RenderError::vulkan("create debug messenger"))?;
            ctx.debug_utils = Some((debug_utils, messenger));
        }

        // Step 5: Window surface
        ctx.surface = ash_window::create_surface(&ctx.entry, &ctx.instance, display, window, None)
            .map_err(RenderError::vulkan("create window surface"))?;

        Ok(ctx)
    }

    /// Reduce one physical device to what the selector scores.
    fn probe(&self, physical_device: vk::PhysicalDevice) -> Result<DeviceCapabilities> {
        let instance = &self.instance;
        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        let features = unsafe { instance.get_physical_device_features(physical_device) };
        let families = unsafe { instance.get_physical_device_queue_family_properties(physical_device) };

        let queue_families = QueueFamilyIndices::find(&families, |i| {
            unsafe {
                self.surface_loader
                    .get_physical_device_surface_support(physical_device, i, self.surface)
            }
            .unwrap_or(false)
        });

        let extension_props = unsafe { instance.enumerate_device_extension_properties(physical_device) }
            .map_err(RenderError::vulkan("enumerate device extensions"))?;
        let available: Vec<&CStr> = extension_props
            .iter()
            .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
            .collect();
        let missing_extensions = find_missing(&required_device_extensions(), &available);

        // Surface queries are only meaningful once the swapchain extension exists
        let (surface_format_count, present_mode_count) = if missing_extensions.is_empty() {
            let formats = unsafe {
                self.surface_loader
                    .get_physical_device_surface_formats(physical_device, self.surface)
            }
            .map_err(RenderError::vulkan("query surface formats"))?;
            let modes = unsafe {
                self.surface_loader
                    .get_physical_device_surface_present_modes(physical_device, self.surface)
            }
            .map_err(RenderError::vulkan("query present modes"))?;
            (formats.len(), modes.len())
        } else {
            (0, 0)
        };

        Ok(DeviceCapabilities {
            name: unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
                .to_string_lossy()
                .into_owned(),
            class: props.device_type.into(),
            max_image_dimension_2d: props.limits.max_image_dimension2_d,
            queue_families,
            missing_extensions,
            surface_format_count,
            present_mode_count,
            sampler_anisotropy: features.sampler_anisotropy == vk::TRUE,
        })
    }

    fn pick_physical_device(&self) -> Result<SelectedDevice<vk::PhysicalDevice>> {
        let devices = unsafe { self.instance.enumerate_physical_devices() }
            .map_err(RenderError::vulkan("enumerate physical devices"))?;

        let candidates = devices
            .into_iter()
            .map(|pd| self.probe(pd).map(|caps| (pd, caps)))
            .collect::<Result<Vec<_>>>()?;

        selector::select_device(candidates)
    }
}

impl Drop for InstanceContext {
    fn drop(&mut self) {
        unsafe {
            if self.surface != vk::SurfaceKHR::null() {
                self.surface_loader.destroy_surface(self.surface, None);
            }
            if let Some((debug_utils, messenger)) = self.debug_utils.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn check_layer_support(entry: &Entry) -> Result<()> {
    let layers = entry
        .enumerate_instance_layer_properties()
        .map_err(RenderError::vulkan("enumerate instance layers"))?;
    let available: Vec<&CStr> = layers
        .iter()
        .map(|l| unsafe { CStr::from_ptr(l.layer_name.as_ptr()) })
        .collect();

    match find_missing(&[VALIDATION_LAYER], &available).pop() {
        Some(name) => Err(RenderError::MissingLayer(name)),
        None => Ok(()),
    }
}

fn check_extension_support(entry: &Entry, required: &[*const c_char]) -> Result<()> {
    let props = entry
        .enumerate_instance_extension_properties(None)
        .map_err(RenderError::vulkan("enumerate instance extensions"))?;
    let available: Vec<&CStr> = props
        .iter()
        .map(|e| unsafe { CStr::from_ptr(e.extension_name.as_ptr()) })
        .collect();
    let required: Vec<&CStr> = required.iter().map(|&p| unsafe { CStr::from_ptr(p) }).collect();

    match find_missing(&required, &available).into_iter().next() {
        Some(name) => Err(RenderError::MissingExtension(name)),
        None => Ok(()),
    }
}

/// Vulkan device wrapper with automatic cleanup
///
/// IMPORTANT: Field order matters for Drop! The allocator and command pool
/// go first, the instance-level objects last.
pub struct VulkanDevice {
    pub allocator: ManuallyDrop<Mutex<Allocator>>,
    pub command_pool: vk::CommandPool,
    pub swapchain_loader: khr::Swapchain,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,

    // Queue handles (may be the same queue)
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,

    pub capabilities: DeviceCapabilities,
    pub properties: vk::PhysicalDeviceProperties,

    ctx: InstanceContext,
}

impl VulkanDevice {
    /// Create the instance, surface and logical device for a window.
    ///
    /// Validation output (if enabled) goes to `sink`.
    ///
    /// # Safety
    /// `display` and `window` must be valid handles for a window that
    /// outlives the returned device.
    pub unsafe fn new(
        app_name: &str,
        display: RawDisplayHandle,
        window: RawWindowHandle,
        enable_validation: bool,
        sink: Box<dyn ValidationSink>,
    ) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", app_name);

        let ctx = InstanceContext::new(app_name, display, window, enable_validation, sink)?;
        let selected = ctx.pick_physical_device()?;
        let physical_device = selected.handle;

        let properties = ctx.instance.get_physical_device_properties(physical_device);
        log::info!("Selected GPU: {} (score {})", selected.capabilities, selected.score);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let device = create_logical_device(&ctx.instance, &selected)?;
        let graphics_queue = device.get_device_queue(selected.graphics_family, 0);
        let present_queue = device.get_device_queue(selected.present_family, 0);

        let command_pool = match create_command_pool(&device, selected.graphics_family) {
            Ok(pool) => pool,
            Err(e) => {
                device.destroy_device(None);
                return Err(e);
            }
        };

        let allocator = match Allocator::new(&AllocatorCreateDesc {
            instance: ctx.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        }) {
            Ok(allocator) => allocator,
            Err(e) => {
                device.destroy_command_pool(command_pool, None);
                device.destroy_device(None);
                return Err(e.into());
            }
        };

        let swapchain_loader = khr::Swapchain::new(&ctx.instance, &device);

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            command_pool,
            swapchain_loader,
            device,
            physical_device,
            graphics_queue,
            graphics_queue_family: selected.graphics_family,
            present_queue,
            present_queue_family: selected.present_family,
            capabilities: selected.capabilities,
            properties,
            ctx,
        }))
    }

    pub fn instance(&self) -> &ash::Instance {
        &self.ctx.instance
    }

    pub fn surface(&self) -> vk::SurfaceKHR {
        self.ctx.surface
    }

    pub fn surface_loader(&self) -> &khr::Surface {
        &self.ctx.surface_loader
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.map_err(RenderError::vulkan("wait for device idle"))
    }
}

fn create_logical_device(
    instance: &ash::Instance,
    selected: &SelectedDevice<vk::PhysicalDevice>,
) -> Result<ash::Device> {
    let mut families = vec![selected.graphics_family, selected.present_family];
    families.sort_unstable();
    families.dedup();

    let priorities = [1.0];
    let queue_infos: Vec<_> = families
        .iter()
        .map(|&family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&priorities)
                .build()
        })
        .collect();

    let extensions = required_device_extensions().map(CStr::as_ptr);
    let features = vk::PhysicalDeviceFeatures::builder().sampler_anisotropy(true);

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_infos)
        .enabled_extension_names(&extensions)
        .enabled_features(&features);

    unsafe { instance.create_device(selected.handle, &create_info, None) }
        .map_err(RenderError::vulkan("create logical device"))
}

fn create_command_pool(device: &ash::Device, family: u32) -> Result<vk::CommandPool> {
    let info = vk::CommandPoolCreateInfo::builder()
        .queue_family_index(family)
        .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

    unsafe { device.create_command_pool(&info, None) }.map_err(RenderError::vulkan("create command pool"))
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        if let Err(e) = self.wait_idle() {
            log::warn!("{}", e);
        }

        unsafe {
            // The allocator frees its memory blocks through the device
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
        }
        // `ctx` drops next: surface, messenger, instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_names_keep_required_order() {
        let required = [c"VK_KHR_surface", c"VK_KHR_xlib_surface", c"VK_EXT_debug_utils"];
        let available = [c"VK_KHR_surface", c"VK_KHR_wayland_surface"];

        assert_eq!(
            find_missing(&required, &available),
            vec!["VK_KHR_xlib_surface".to_string(), "VK_EXT_debug_utils".to_string()]
        );
    }

    #[test]
    fn nothing_missing_when_all_present() {
        let required = [khr::Swapchain::name()];
        let available = [c"VK_KHR_maintenance1", khr::Swapchain::name()];
        assert!(find_missing(&required, &available).is_empty());
    }
}
