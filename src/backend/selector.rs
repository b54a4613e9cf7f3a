// Physical device selection
//
// Every enumerated GPU is reduced to a `DeviceCapabilities` record; the
// selection itself is pure so it can be checked without a Vulkan driver.

use ash::vk;
use std::fmt;

use crate::error::{RenderError, Result};

/// Score bonus for dedicated GPUs. Large enough to dominate any realistic
/// image-dimension limit.
pub const DISCRETE_GPU_WEIGHT: u32 = 1000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeviceClass {
    Discrete,
    Integrated,
    Virtual,
    Cpu,
    Other,
}

impl From<vk::PhysicalDeviceType> for DeviceClass {
    fn from(ty: vk::PhysicalDeviceType) -> Self {
        match ty {
            vk::PhysicalDeviceType::DISCRETE_GPU => DeviceClass::Discrete,
            vk::PhysicalDeviceType::INTEGRATED_GPU => DeviceClass::Integrated,
            vk::PhysicalDeviceType::VIRTUAL_GPU => DeviceClass::Virtual,
            vk::PhysicalDeviceType::CPU => DeviceClass::Cpu,
            _ => DeviceClass::Other,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics: Option<u32>,
    pub present: Option<u32>,
}

impl QueueFamilyIndices {
    pub fn is_complete(&self) -> bool {
        self.graphics.is_some() && self.present.is_some()
    }

    /// Scan queue families in order, stopping once both roles are filled.
    /// `can_present` is asked for every family visited.
    pub fn find(
        families: &[vk::QueueFamilyProperties],
        mut can_present: impl FnMut(u32) -> bool,
    ) -> Self {
        let mut indices = Self::default();

        for (i, family) in families.iter().enumerate() {
            let i = i as u32;
            let presents = can_present(i);

            if indices.graphics.is_none() && family.queue_flags.contains(vk::QueueFlags::GRAPHICS) {
                indices.graphics = Some(i);
            }
            if indices.present.is_none() && presents {
                indices.present = Some(i);
            }
            if indices.is_complete() {
                break;
            }
        }

        indices
    }
}

/// Everything the selector needs to know about one physical device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub name: String,
    pub class: DeviceClass,
    pub max_image_dimension_2d: u32,
    pub queue_families: QueueFamilyIndices,
    /// Required device extensions this device lacks
    pub missing_extensions: Vec<String>,
    pub surface_format_count: usize,
    pub present_mode_count: usize,
    pub sampler_anisotropy: bool,
}

impl DeviceCapabilities {
    pub fn is_suitable(&self) -> bool {
        self.queue_families.is_complete()
            && self.missing_extensions.is_empty()
            && self.surface_format_count > 0
            && self.present_mode_count > 0
            && self.sampler_anisotropy
    }

    /// Zero for unusable devices
    pub fn score(&self) -> u32 {
        if !self.is_suitable() {
            return 0;
        }

        let mut score = 0u32;
        if self.class == DeviceClass::Discrete {
            score += DISCRETE_GPU_WEIGHT;
        }
        // Maximum possible size of textures affects graphics quality
        score.saturating_add(self.max_image_dimension_2d)
    }
}

impl fmt::Display for DeviceCapabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({:?}, max 2D {})", self.name, self.class, self.max_image_dimension_2d)
    }
}

/// The winning device with its resolved queue families
#[derive(Clone, Debug)]
pub struct SelectedDevice<H> {
    pub handle: H,
    pub capabilities: DeviceCapabilities,
    pub score: u32,
    pub graphics_family: u32,
    pub present_family: u32,
}

/// Pick the highest-scoring usable device. Ties go to the device enumerated
/// first.
pub fn select_device<H>(
    candidates: impl IntoIterator<Item = (H, DeviceCapabilities)>,
) -> Result<SelectedDevice<H>> {
    let mut best: Option<(u32, H, DeviceCapabilities)> = None;

    for (handle, caps) in candidates {
        let score = caps.score();
        log::debug!("GPU candidate {} scored {}", caps, score);

        if score == 0 {
            continue;
        }
        if best.as_ref().map_or(true, |(top, _, _)| score > *top) {
            best = Some((score, handle, caps));
        }
    }

    let (score, handle, capabilities) = best.ok_or(RenderError::NoSuitableDevice)?;
    let (Some(graphics_family), Some(present_family)) = (
        capabilities.queue_families.graphics,
        capabilities.queue_families.present,
    ) else {
        return Err(RenderError::NoSuitableDevice);
    };

    Ok(SelectedDevice {
        handle,
        capabilities,
        score,
        graphics_family,
        present_family,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usable(name: &str, class: DeviceClass, max_dim: u32) -> DeviceCapabilities {
        DeviceCapabilities {
            name: name.to_string(),
            class,
            max_image_dimension_2d: max_dim,
            queue_families: QueueFamilyIndices {
                graphics: Some(0),
                present: Some(0),
            },
            missing_extensions: Vec::new(),
            surface_format_count: 2,
            present_mode_count: 1,
            sampler_anisotropy: true,
        }
    }

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn discrete_weight_dominates_dimension() {
        let discrete = usable("dGPU", DeviceClass::Discrete, 200);
        let integrated = usable("iGPU", DeviceClass::Integrated, 300);
        assert_eq!(discrete.score(), 1200);
        assert_eq!(integrated.score(), 300);

        let picked = select_device(vec![("first", discrete), ("second", integrated)]).unwrap();

        assert_eq!(picked.handle, "first");
        assert_eq!(picked.score, 1200);
    }

    #[test]
    fn highest_score_wins_regardless_of_order() {
        let picked = select_device(vec![
            (1, usable("a", DeviceClass::Integrated, 4096)),
            (2, usable("b", DeviceClass::Integrated, 16384)),
            (3, usable("c", DeviceClass::Cpu, 8192)),
        ])
        .unwrap();

        assert_eq!(picked.handle, 2);
        assert_eq!(picked.capabilities.name, "b");
    }

    #[test]
    fn ties_go_to_first_enumerated() {
        let picked = select_device(vec![
            ('a', usable("a", DeviceClass::Discrete, 8192)),
            ('b', usable("b", DeviceClass::Discrete, 8192)),
        ])
        .unwrap();
        assert_eq!(picked.handle, 'a');
    }

    #[test]
    fn empty_candidate_set_fails() {
        let none: Vec<((), DeviceCapabilities)> = Vec::new();
        assert!(matches!(select_device(none), Err(RenderError::NoSuitableDevice)));
    }

    #[test]
    fn unsuitable_devices_score_zero_and_are_skipped() {
        let mut no_present = usable("no present", DeviceClass::Discrete, 16384);
        no_present.queue_families.present = None;
        let mut no_swapchain = usable("no swapchain", DeviceClass::Discrete, 16384);
        no_swapchain.missing_extensions = vec!["VK_KHR_swapchain".into()];
        let mut no_formats = usable("no formats", DeviceClass::Discrete, 16384);
        no_formats.surface_format_count = 0;
        let mut no_modes = usable("no modes", DeviceClass::Discrete, 16384);
        no_modes.present_mode_count = 0;
        let mut no_aniso = usable("no aniso", DeviceClass::Discrete, 16384);
        no_aniso.sampler_anisotropy = false;

        for caps in [&no_present, &no_swapchain, &no_formats, &no_modes, &no_aniso] {
            assert_eq!(caps.score(), 0, "{} should be unusable", caps.name);
        }

        let only_bad = vec![(0, no_present.clone()), (1, no_formats.clone())];
        assert!(matches!(select_device(only_bad), Err(RenderError::NoSuitableDevice)));

        let picked = select_device(vec![
            (0, no_present),
            (1, no_swapchain),
            (2, usable("fallback", DeviceClass::Integrated, 1024)),
            (3, no_aniso),
        ])
        .unwrap();
        assert_eq!(picked.handle, 2);
    }

    #[test]
    fn selected_device_carries_both_queue_families() {
        let mut caps = usable("split", DeviceClass::Discrete, 4096);
        caps.queue_families = QueueFamilyIndices {
            graphics: Some(0),
            present: Some(2),
        };

        let picked = select_device(vec![((), caps)]).unwrap();
        assert_eq!(picked.graphics_family, 0);
        assert_eq!(picked.present_family, 2);
    }

    #[test]
    fn queue_scan_finds_shared_family() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
        ];
        let indices = QueueFamilyIndices::find(&families, |i| i == 1);
        assert_eq!(
            indices,
            QueueFamilyIndices {
                graphics: Some(1),
                present: Some(1),
            }
        );
    }

    #[test]
    fn queue_scan_finds_separate_families_and_stops_early() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut asked = Vec::new();
        let indices = QueueFamilyIndices::find(&families, |i| {
            asked.push(i);
            i == 1
        });

        assert_eq!(indices.graphics, Some(0));
        assert_eq!(indices.present, Some(1));
        assert_eq!(asked, vec![0, 1]);
    }

    #[test]
    fn queue_scan_reports_incomplete_without_graphics() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = QueueFamilyIndices::find(&families, |_| true);
        assert!(!indices.is_complete());
        assert_eq!(indices.present, Some(0));
    }

    #[test]
    fn device_types_map_to_classes() {
        assert_eq!(DeviceClass::from(vk::PhysicalDeviceType::DISCRETE_GPU), DeviceClass::Discrete);
        assert_eq!(DeviceClass::from(vk::PhysicalDeviceType::INTEGRATED_GPU), DeviceClass::Integrated);
        assert_eq!(DeviceClass::from(vk::PhysicalDeviceType::OTHER), DeviceClass::Other);
    }
}
