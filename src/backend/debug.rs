// Validation layer messages
//
// The messenger callback reaches its sink through the user-data pointer, so
// there is no process-wide hook: whoever builds the device decides where
// validation output goes.

use ash::vk;
use std::ffi::{c_void, CStr};

pub trait ValidationSink: Send + Sync {
    fn report(&self, level: log::Level, message: &str);
}

/// Forwards validation output to the `log` facade
#[derive(Clone, Copy, Debug, Default)]
pub struct LogSink;

impl ValidationSink for LogSink {
    fn report(&self, level: log::Level, message: &str) {
        log::log!(target: "vulkan", level, "[Vulkan] {}", message);
    }
}

/// Anything below a warning is logged at trace level.
pub fn severity_level(severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::ERROR) {
        log::Level::Error
    } else if severity.contains(vk::DebugUtilsMessageSeverityFlagsEXT::WARNING) {
        log::Level::Warn
    } else {
        log::Level::Trace
    }
}

/// Boxed twice so the user-data pointer is thin and stays put.
pub(crate) type SinkBox = Box<Box<dyn ValidationSink>>;

pub(crate) fn user_data(sink: &SinkBox) -> *mut c_void {
    &**sink as *const Box<dyn ValidationSink> as *mut c_void
}

pub(crate) unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    p_user_data: *mut c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || p_user_data.is_null() {
        return vk::FALSE;
    }

    // SAFETY: p_user_data was produced by `user_data` and the sink outlives
    // the messenger (both are owned by `VulkanDevice`).
    let sink = unsafe { &*(p_user_data as *const Box<dyn ValidationSink>) };
    let message = unsafe { CStr::from_ptr((*p_callback_data).p_message) };

    sink.report(severity_level(message_severity), &message.to_string_lossy());

    vk::FALSE
}
