// Presentation seams
//
// The frame protocol in `renderer` only talks to these traits. The Vulkan
// backend implements them for real hardware; tests implement them with
// scripted doubles.

use ash::vk;
use std::fmt;

use crate::error::Result;

/// Size of a drawable area in physical pixels
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Extent {
    pub width: u32,
    pub height: u32,
}

impl Extent {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A zero-area target can never be rendered to
    pub fn is_zero(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn aspect_ratio(&self) -> f32 {
        self.width as f32 / self.height.max(1) as f32
    }
}

impl From<vk::Extent2D> for Extent {
    fn from(e: vk::Extent2D) -> Self {
        Self::new(e.width, e.height)
    }
}

impl From<Extent> for vk::Extent2D {
    fn from(e: Extent) -> Self {
        vk::Extent2D {
            width: e.width,
            height: e.height,
        }
    }
}

impl fmt::Display for Extent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Color + depth format pair that cached pipeline state is built against
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceFormats {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// Clear values used when the swapchain render pass begins
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ClearValues {
    pub color: [f32; 4],
    pub depth: f32,
    pub stencil: u32,
}

impl Default for ClearValues {
    fn default() -> Self {
        Self {
            color: [0.1, 0.1, 0.1, 1.0],
            depth: 1.0,
            stencil: 0,
        }
    }
}

impl ClearValues {
    pub fn to_vk(&self) -> [vk::ClearValue; 2] {
        [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: self.color,
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth: self.depth,
                    stencil: self.stencil,
                },
            },
        ]
    }
}

/// Outcome of asking the surface for the next image
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquiredImage {
    Ready { index: u32, suboptimal: bool },
    /// Surface no longer matches the display and must be rebuilt
    OutOfDate,
}

/// Outcome of submit + present
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PresentStatus {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentStatus {
    /// Whether the surface should be rebuilt before the next frame
    pub fn is_stale(self) -> bool {
        !matches!(self, PresentStatus::Optimal)
    }
}

/// A set of presentable images plus the per-slot sync objects that pace them.
pub trait PresentSurface {
    type Recorder: Copy;

    fn formats(&self) -> SurfaceFormats;
    fn extent(&self) -> Extent;
    fn image_count(&self) -> usize;
    fn frames_in_flight(&self) -> usize;

    /// Frame-in-flight slot the next acquire/submit pair will use
    fn frame_index(&self) -> usize;

    /// True iff cached rendering state built for `other` is still valid here
    fn compatible_with(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.formats() == other.formats()
    }

    /// Waits for the current slot to retire, then acquires an image.
    fn acquire_next_image(&mut self) -> Result<AcquiredImage>;

    /// Submits `recorder` for `image_index` and queues the image for display.
    /// Advances the frame slot unless an error is returned.
    fn submit_and_present(
        &mut self,
        recorder: Self::Recorder,
        image_index: u32,
    ) -> Result<PresentStatus>;

    fn begin_render_pass(&self, recorder: Self::Recorder, image_index: u32, clear: &ClearValues);
    fn end_render_pass(&self, recorder: Self::Recorder);
}

/// Device-side services the frame protocol depends on.
pub trait PresentBackend {
    type Recorder: Copy + PartialEq + fmt::Debug;
    type Surface: PresentSurface<Recorder = Self::Recorder>;

    /// Build a surface for `extent`; `previous` is the instance being replaced.
    fn create_surface(&self, extent: Extent, previous: Option<&Self::Surface>)
        -> Result<Self::Surface>;

    /// Block until every queue has drained
    fn wait_idle(&self) -> Result<()>;

    fn allocate_recorders(&self, count: usize) -> Result<Vec<Self::Recorder>>;
    fn free_recorders(&self, recorders: &[Self::Recorder]);

    fn begin_recording(&self, recorder: Self::Recorder) -> Result<()>;
    fn end_recording(&self, recorder: Self::Recorder) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_extent_detection() {
        assert!(Extent::new(0, 0).is_zero());
        assert!(Extent::new(800, 0).is_zero());
        assert!(Extent::new(0, 600).is_zero());
        assert!(!Extent::new(1, 1).is_zero());
    }

    #[test]
    fn aspect_ratio_survives_zero_height() {
        assert_eq!(Extent::new(800, 400).aspect_ratio(), 2.0);
        assert!(Extent::new(800, 0).aspect_ratio().is_finite());
    }

    #[test]
    fn only_optimal_presents_keep_the_surface() {
        assert!(!PresentStatus::Optimal.is_stale());
        assert!(PresentStatus::Suboptimal.is_stale());
        assert!(PresentStatus::OutOfDate.is_stale());
    }

    #[test]
    fn clear_values_map_to_color_then_depth() {
        let clear = ClearValues {
            color: [0.2, 0.3, 0.4, 1.0],
            depth: 0.5,
            stencil: 7,
        };
        let [color, depth] = clear.to_vk();
        unsafe {
            assert_eq!(color.color.float32, [0.2, 0.3, 0.4, 1.0]);
            assert_eq!(depth.depth_stencil.depth, 0.5);
            assert_eq!(depth.depth_stencil.stencil, 7);
        }
    }
}
