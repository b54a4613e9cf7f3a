// Window collaborator
//
// The renderer only needs the client-area size, a resize flag and a way to
// sleep until the platform has something to say. `PlatformWindow` provides
// those on top of winit by pumping the event loop by hand instead of handing
// control to `run_app`.

use anyhow::{Context, Result};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle, RawDisplayHandle, RawWindowHandle};
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    platform::pump_events::{EventLoopExtPumpEvents, PumpStatus},
    window::{Window, WindowAttributes, WindowId},
};

use crate::present::Extent;

pub trait WindowSystem {
    /// Current client-area size in physical pixels
    fn extent(&self) -> Extent;

    fn was_resized(&self) -> bool;
    fn reset_resized_flag(&mut self);

    /// Block until the platform delivers at least one event
    fn wait_events(&mut self);

    /// Lets a blocked renderer give up waiting once the user closed the window
    fn is_closing(&self) -> bool {
        false
    }
}

/// Event handler state driven by `pump_app_events`
struct WindowState {
    attributes: Option<WindowAttributes>,
    window: Option<Window>,
    creation_error: Option<winit::error::OsError>,
    resized: bool,
    close_requested: bool,
}

impl ApplicationHandler for WindowState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        let Some(attributes) = self.attributes.take() else {
            return;
        };

        match event_loop.create_window(attributes) {
            Ok(window) => self.window = Some(window),
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.creation_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested");
                self.close_requested = true;
            }
            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                self.resized = true;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                use winit::keyboard::{KeyCode, PhysicalKey};

                if event.state.is_pressed() && event.physical_key == PhysicalKey::Code(KeyCode::Escape) {
                    log::info!("ESC pressed, exiting...");
                    self.close_requested = true;
                }
            }
            _ => {}
        }
    }
}

pub struct PlatformWindow {
    state: WindowState,
    event_loop: EventLoop<()>,
}

impl PlatformWindow {
    /// Create the event loop and pump it until the window exists.
    pub fn new(title: &str, width: u32, height: u32) -> Result<Self> {
        let event_loop = EventLoop::new().context("Failed to create event loop")?;
        let attributes = WindowAttributes::default()
            .with_title(title)
            .with_inner_size(PhysicalSize::new(width, height));

        let mut this = Self {
            state: WindowState {
                attributes: Some(attributes),
                window: None,
                creation_error: None,
                resized: false,
                close_requested: false,
            },
            event_loop,
        };

        while this.state.window.is_none() {
            if let Some(e) = this.state.creation_error.take() {
                return Err(e).context("Failed to create window");
            }
            if let PumpStatus::Exit(code) = this.pump(None) {
                anyhow::bail!("Event loop exited with code {} before a window was created", code);
            }
        }

        Ok(this)
    }

    /// Drain pending events without blocking
    pub fn poll_events(&mut self) {
        if let PumpStatus::Exit(_) = self.pump(Some(Duration::ZERO)) {
            self.state.close_requested = true;
        }
    }

    pub fn close_requested(&self) -> bool {
        self.state.close_requested
    }

    pub fn set_title(&self, title: &str) {
        if let Some(window) = &self.state.window {
            window.set_title(title);
        }
    }

    /// Raw handles for surface creation. Only valid while this window lives.
    pub fn raw_handles(&self) -> Result<(RawDisplayHandle, RawWindowHandle)> {
        let window = self.state.window.as_ref().context("Window was not created")?;
        Ok((window.raw_display_handle(), window.raw_window_handle()))
    }

    fn pump(&mut self, timeout: Option<Duration>) -> PumpStatus {
        self.event_loop.pump_app_events(timeout, &mut self.state)
    }
}

impl WindowSystem for PlatformWindow {
    fn extent(&self) -> Extent {
        self.state
            .window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                Extent::new(size.width, size.height)
            })
            .unwrap_or_default()
    }

    fn was_resized(&self) -> bool {
        self.state.resized
    }

    fn reset_resized_flag(&mut self) {
        self.state.resized = false;
    }

    fn wait_events(&mut self) {
        if let PumpStatus::Exit(_) = self.pump(None) {
            self.state.close_requested = true;
        }
    }

    fn is_closing(&self) -> bool {
        self.state.close_requested
    }
}
