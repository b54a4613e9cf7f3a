// =============================================================================
// VK-PRESENT DEMO - Clears the window every frame
// =============================================================================
//
// Smallest useful driver of the frame protocol: no pipelines, no geometry,
// just the swapchain render pass with its clear values.
//
// FRAME FLOW:
// 1. Pump window events (resize, close, Escape)
// 2. begin_frame: wait for the slot, acquire an image, begin recording
// 3. Begin + end the swapchain render pass (clears color and depth)
// 4. end_frame: submit, present, rebuild the swapchain if it went stale
//
// =============================================================================

use anyhow::{Context, Result};
use std::time::Instant;

use vk_present::backend::{LogSink, VulkanBackend, VulkanDevice};
use vk_present::config::Config;
use vk_present::{PlatformWindow, Renderer};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let config = Config::load();

    // Initialize logging
    init_logging(&config);
    log::info!("Starting vk-present");
    log::info!(
        "Window: {}x{}, present mode {:?}, validation {}",
        config.window.width,
        config.window.height,
        config.graphics.present_mode,
        config.debug.validation_layers
    );

    let window = PlatformWindow::new(&config.window.title, config.window.width, config.window.height)?;
    let (display, handle) = window.raw_handles()?;

    // SAFETY: the window moves into the renderer together with the device's
    // only owner (the backend), and the renderer drops the backend first.
    let device = unsafe {
        VulkanDevice::new(
            &config.window.title,
            display,
            handle,
            config.debug.validation_layers,
            Box::new(LogSink),
        )
    }
    .context("Failed to initialize Vulkan")?;

    let backend = VulkanBackend::new(device, config.swapchain_settings());
    let mut renderer = Renderer::new(backend, window).context("Failed to create renderer")?;
    renderer.set_clear_values(config.clear_values());

    run(&mut renderer, &config)?;

    log::info!(
        "Shutting down after {} swapchain rebuilds",
        renderer.rebuild_count()
    );
    Ok(())
}

/// Configured level, overridable with RUST_LOG
fn init_logging(config: &Config) {
    use env_logger::Builder;
    use log::LevelFilter;

    let level = config.debug.log_level.parse().unwrap_or(LevelFilter::Info);

    let mut builder = Builder::new();
    builder.filter_level(level);
    builder.parse_default_env();
    builder.init();
}

// =============================================================================
// MAIN LOOP
// =============================================================================

fn run(renderer: &mut Renderer<VulkanBackend, PlatformWindow>, config: &Config) -> Result<()> {
    let mut fps = FpsCounter::new(&config.window.title, config.debug.show_fps);

    loop {
        renderer.window_mut().poll_events();
        if renderer.window().close_requested() {
            return Ok(());
        }

        // None = skipped tick (out-of-date swapchain or closing while minimized)
        let Some(cmd) = renderer.begin_frame()? else {
            continue;
        };

        renderer.begin_swapchain_render_pass(cmd);
        renderer.end_swapchain_render_pass(cmd);
        renderer.end_frame()?;

        fps.tick(renderer.window());
    }
}

// =============================================================================
// FPS TRACKING
// =============================================================================

struct FpsCounter {
    title: String,
    enabled: bool,
    frame_count: u32,
    last_frame_time: Instant,
    last_fps_update: Instant,
}

impl FpsCounter {
    fn new(title: &str, enabled: bool) -> Self {
        let now = Instant::now();
        Self {
            title: title.to_string(),
            enabled,
            frame_count: 0,
            last_frame_time: now,
            last_fps_update: now,
        }
    }

    fn tick(&mut self, window: &PlatformWindow) {
        if !self.enabled {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;
            window.set_title(&format!(
                "{} - {:.0} FPS ({:.2}ms)",
                self.title,
                fps,
                frame_time * 1000.0
            ));

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}
