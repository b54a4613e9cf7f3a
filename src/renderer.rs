// Frame coordinator
//
// Runs acquire -> record -> submit -> present exactly once per logical frame
// and rebuilds the swapchain whenever the display stops matching it.
//
// FRAME TIMELINE:
// ┌──────────────────────────────────────────────────────────────────────┐
// │  begin_frame ─> wait slot fence ─> acquire ─> begin recording        │
// │  (caller records draw commands between the render pass helpers)      │
// │  end_frame   ─> end recording ─> submit ─> present ─> next slot      │
// └──────────────────────────────────────────────────────────────────────┘

use std::mem;

use crate::error::{RenderError, Result};
use crate::present::{AcquiredImage, ClearValues, Extent, PresentBackend, PresentSurface};
use crate::window::WindowSystem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FrameState<R> {
    Idle,
    Open { image_index: u32, recorder: R },
}

/// Owns the presentation surface and one command recorder per frame slot.
///
/// IMPORTANT: Field order matters for Drop! The surface must go before the
/// backend that created it, and the backend before the window it presents to.
pub struct Renderer<B: PresentBackend, W: WindowSystem> {
    surface: B::Surface,
    recorders: Vec<B::Recorder>,
    frame: FrameState<B::Recorder>,
    clear: ClearValues,
    rebuilds: u64,
    backend: B,
    window: W,
}

impl<B: PresentBackend, W: WindowSystem> Renderer<B, W> {
    /// Build the first surface and the recorder pool.
    ///
    /// Blocks while the window has a zero-sized client area and fails with
    /// `WindowClosed` if it is closed before it ever gets one.
    pub fn new(backend: B, mut window: W) -> Result<Self> {
        // Rebound so an early return drops the backend before the window
        let backend = backend;

        if !wait_for_drawable_extent(&mut window) {
            return Err(RenderError::WindowClosed);
        }

        let surface = backend.create_surface(window.extent(), None)?;
        let recorders = backend.allocate_recorders(surface.frames_in_flight())?;
        log::info!(
            "Renderer ready: {} images, {} frames in flight, {}",
            surface.image_count(),
            recorders.len(),
            surface.extent()
        );

        Ok(Self {
            surface,
            recorders,
            frame: FrameState::Idle,
            clear: ClearValues::default(),
            rebuilds: 0,
            backend,
            window,
        })
    }

    // =========================================================================
    // FRAME PROTOCOL
    // =========================================================================

    /// Start a frame.
    ///
    /// Returns `Ok(None)` when this tick has to be skipped: the surface was
    /// out of date (and has been rebuilt) or the window closed while
    /// minimized. The caller simply tries again on its next loop iteration.
    pub fn begin_frame(&mut self) -> Result<Option<B::Recorder>> {
        assert!(
            !self.is_frame_in_progress(),
            "Cannot call begin_frame while a frame is already in progress"
        );

        if !wait_for_drawable_extent(&mut self.window) {
            return Ok(None);
        }

        let image_index = match self.surface.acquire_next_image()? {
            AcquiredImage::Ready { index, suboptimal } => {
                if suboptimal {
                    log::trace!("Acquired image {} from a suboptimal swapchain", index);
                }
                index
            }
            AcquiredImage::OutOfDate => {
                log::debug!("Swapchain out of date at acquire, skipping frame");
                self.rebuild_surface()?;
                return Ok(None);
            }
        };

        let recorder = self.recorders[self.surface.frame_index()];
        self.backend.begin_recording(recorder)?;
        self.frame = FrameState::Open {
            image_index,
            recorder,
        };

        Ok(Some(recorder))
    }

    /// Finish the open frame: submit its commands and present the image.
    pub fn end_frame(&mut self) -> Result<()> {
        let FrameState::Open {
            image_index,
            recorder,
        } = self.frame
        else {
            panic!("Cannot call end_frame while no frame is in progress");
        };
        self.frame = FrameState::Idle;

        self.backend.end_recording(recorder)?;
        let status = self.surface.submit_and_present(recorder, image_index)?;

        if status.is_stale() || self.window.was_resized() {
            log::debug!(
                "Rebuilding swapchain after present (status {:?}, resized {})",
                status,
                self.window.was_resized()
            );
            self.window.reset_resized_flag();
            self.rebuild_surface()?;
        }

        Ok(())
    }

    /// Begin the swapchain render pass on the current frame's recorder.
    pub fn begin_swapchain_render_pass(&self, recorder: B::Recorder) {
        let image_index = self.expect_current_recorder(recorder, "begin");
        self.surface.begin_render_pass(recorder, image_index, &self.clear);
    }

    pub fn end_swapchain_render_pass(&self, recorder: B::Recorder) {
        self.expect_current_recorder(recorder, "end");
        self.surface.end_render_pass(recorder);
    }

    fn expect_current_recorder(&self, recorder: B::Recorder, action: &str) -> u32 {
        let FrameState::Open {
            image_index,
            recorder: current,
        } = self.frame
        else {
            panic!("Cannot {} the swapchain render pass while no frame is in progress", action);
        };
        assert_eq!(
            recorder, current,
            "Cannot {} a render pass with a command recorder from a different frame",
            action
        );
        image_index
    }

    // =========================================================================
    // SWAPCHAIN RECREATION
    // =========================================================================

    /// Replace the surface with one matching the window's current size.
    ///
    /// The old surface is handed to the backend as a hint, then owned here by
    /// value until the device is idle and the formats have been compared.
    fn rebuild_surface(&mut self) -> Result<()> {
        if !wait_for_drawable_extent(&mut self.window) {
            return Ok(());
        }
        let extent = self.window.extent();

        // Old framebuffers may still be referenced by pending command buffers
        self.backend.wait_idle()?;

        let fresh = self.backend.create_surface(extent, Some(&self.surface))?;
        let previous = mem::replace(&mut self.surface, fresh);
        self.rebuilds += 1;

        if !previous.compatible_with(&self.surface) {
            let (old, new) = (previous.formats(), self.surface.formats());
            log::error!("Swapchain image (or depth) format has changed: {:?} -> {:?}", old, new);
            return Err(RenderError::FormatChanged { old, new });
        }
        drop(previous);

        log::info!("Swapchain rebuilt at {}", self.surface.extent());
        Ok(())
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn is_frame_in_progress(&self) -> bool {
        matches!(self.frame, FrameState::Open { .. })
    }

    /// Frame-in-flight slot of the open frame (or of the next one when idle)
    pub fn frame_index(&self) -> usize {
        self.surface.frame_index()
    }

    /// Swapchain image of the open frame
    pub fn image_index(&self) -> Option<u32> {
        match self.frame {
            FrameState::Open { image_index, .. } => Some(image_index),
            FrameState::Idle => None,
        }
    }

    pub fn extent(&self) -> Extent {
        self.surface.extent()
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.surface.extent().aspect_ratio()
    }

    pub fn surface(&self) -> &B::Surface {
        &self.surface
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn window(&self) -> &W {
        &self.window
    }

    pub fn window_mut(&mut self) -> &mut W {
        &mut self.window
    }

    /// Number of swapchain rebuilds since construction
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn set_clear_values(&mut self, clear: ClearValues) {
        self.clear = clear;
    }
}

/// Returns false if the window closed while we were waiting.
fn wait_for_drawable_extent(window: &mut impl WindowSystem) -> bool {
    while window.extent().is_zero() {
        if window.is_closing() {
            return false;
        }
        window.wait_events();
    }
    true
}

impl<B: PresentBackend, W: WindowSystem> Drop for Renderer<B, W> {
    fn drop(&mut self) {
        if let Err(e) = self.backend.wait_idle() {
            log::warn!("wait_idle failed during renderer teardown: {}", e);
        }
        self.backend.free_recorders(&self.recorders);
        self.recorders.clear();
    }
}
