//! Adapter (physical device) selection.
//!
//! Selection walks the adapters in enumeration order and takes the first one
//! that passes every check:
//! 1. a graphics queue family and a present queue family (may coincide)
//! 2. all [`REQUIRED_DEVICE_EXTENSIONS`]
//! 3. at least one surface format and one present mode
//! 4. sampler anisotropy
//!
//! There is no scoring. The chosen adapter's name and maximum usable MSAA
//! sample count are logged.

use std::ffi::{CStr, CString};

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every adapter must expose.
pub const REQUIRED_DEVICE_EXTENSIONS: [&CStr; 1] = [ash::khr::swapchain::NAME];

/// Depth formats in order of preference.
pub const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Queue family scan result; either index may still be missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    pub graphics_family: Option<u32>,
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Both indices, once the scan found them.
    pub fn complete(&self) -> Option<QueueFamilies> {
        Some(QueueFamilies {
            graphics: self.graphics_family?,
            present: self.present_family?,
        })
    }
}

/// Queue families of a selected adapter.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, graphics first.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    /// Whether images must be shared concurrently between two families.
    #[inline]
    pub fn is_split(&self) -> bool {
        self.graphics != self.present
    }
}

/// Immutable record of the selected adapter.
#[derive(Clone)]
pub struct AdapterCapabilities {
    pub device: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub features: vk::PhysicalDeviceFeatures,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilies,
    pub supported_extensions: Vec<CString>,
    /// Highest sample count usable for both color and depth.
    pub msaa_samples: vk::SampleCountFlags,
}

impl AdapterCapabilities {
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Format properties for `format` on this adapter.
    pub fn format_properties(
        &self,
        instance: &ash::Instance,
        format: vk::Format,
    ) -> vk::FormatProperties {
        // SAFETY: the physical device handle belongs to `instance`.
        unsafe { instance.get_physical_device_format_properties(self.device, format) }
    }

    /// First of [`DEPTH_FORMAT_CANDIDATES`] usable as an optimally tiled
    /// depth/stencil attachment.
    pub fn find_depth_format(&self, instance: &ash::Instance) -> RhiResult<vk::Format> {
        find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| self.format_properties(instance, format),
        )
        .ok_or_else(|| RhiError::NoSupportedDepthFormat(DEPTH_FORMAT_CANDIDATES.to_vec()))
    }

    /// Whether an optimally tiled image of `format` can be blitted with
    /// linear filtering.
    pub fn supports_linear_blit(&self, instance: &ash::Instance, format: vk::Format) -> bool {
        self.format_properties(instance, format)
            .optimal_tiling_features
            .contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR)
    }
}

impl std::fmt::Debug for AdapterCapabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("AdapterCapabilities")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{major}.{minor}.{patch}"))
            .field("queue_families", &self.queue_families)
            .field("msaa_samples", &self.msaa_samples)
            .finish()
    }
}

/// Picks the first adapter that can render to `surface`.
///
/// # Errors
///
/// [`RhiError::NoSuitableAdapter`] when no adapter passes every check.
pub fn select_adapter(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<AdapterCapabilities> {
    // SAFETY: enumeration on a live instance.
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::NoSuitableAdapter);
    }
    debug!("Found {} GPU(s)", devices.len());

    let selected = first_suitable(devices, |&device| {
        check_adapter(instance, device, surface, surface_loader)
    });

    if let Some(adapter) = selected {
        let (major, minor, patch) = adapter.api_version();
        info!(
            device = adapter.device_name(),
            kind = adapter.device_type_name(),
            api = %format!("{major}.{minor}.{patch}"),
            msaa_samples = adapter.msaa_samples.as_raw(),
            "Selected GPU"
        );
        if adapter.queue_families.is_split() {
            debug!(
                graphics = adapter.queue_families.graphics,
                present = adapter.queue_families.present,
                "Graphics and present families differ, swapchain images use concurrent sharing"
            );
        }
        return Ok(adapter);
    }

    warn!("No GPU satisfies the adapter requirements");
    Err(RhiError::NoSuitableAdapter)
}

/// Runs `check` over `candidates` in order and returns the first accepted
/// one. A check that fails counts as a rejection.
pub fn first_suitable<C: std::fmt::Debug, T>(
    candidates: impl IntoIterator<Item = C>,
    mut check: impl FnMut(&C) -> RhiResult<Option<T>>,
) -> Option<T> {
    for candidate in candidates {
        match check(&candidate) {
            Ok(Some(accepted)) => return Some(accepted),
            Ok(None) => {}
            Err(e) => debug!(?candidate, error = %e, "GPU skipped: query failed"),
        }
    }
    None
}

fn check_adapter(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<Option<AdapterCapabilities>> {
    // SAFETY: `device` was enumerated from `instance`.
    let (properties, features, memory_properties, family_properties, extension_properties) = unsafe {
        (
            instance.get_physical_device_properties(device),
            instance.get_physical_device_features(device),
            instance.get_physical_device_memory_properties(device),
            instance.get_physical_device_queue_family_properties(device),
            instance.enumerate_device_extension_properties(device)?,
        )
    };

    let name = properties
        .device_name_as_c_str()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let indices = scan_queue_families(&family_properties, |index| {
        // SAFETY: index is within the family count of this device.
        unsafe {
            surface_loader
                .get_physical_device_surface_support(device, index, surface)
                .unwrap_or(false)
        }
    });
    let Some(queue_families) = indices.complete() else {
        debug!(device = %name, ?indices, "GPU skipped: missing queue families");
        return Ok(None);
    };

    let supported_extensions: Vec<CString> = extension_properties
        .iter()
        .filter_map(|ext| ext.extension_name_as_c_str().ok().map(CStr::to_owned))
        .collect();
    let missing = missing_extensions(&REQUIRED_DEVICE_EXTENSIONS, &supported_extensions);
    if !missing.is_empty() {
        debug!(device = %name, ?missing, "GPU skipped: missing device extensions");
        return Ok(None);
    }

    let support = SwapchainSupportDetails::query(device, surface, surface_loader)?;
    if !support.is_adequate() {
        debug!(device = %name, "GPU skipped: no surface formats or present modes");
        return Ok(None);
    }

    if features.sampler_anisotropy == vk::FALSE {
        debug!(device = %name, "GPU skipped: sampler anisotropy not supported");
        return Ok(None);
    }

    Ok(Some(AdapterCapabilities {
        device,
        properties,
        features,
        memory_properties,
        queue_families,
        supported_extensions,
        msaa_samples: max_usable_sample_count(&properties.limits),
    }))
}

/// First graphics-capable family and first family that can present.
///
/// The scan stops as soon as both are known, so a family that does both is
/// preferred only if it comes first.
pub fn scan_queue_families(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: impl FnMut(u32) -> bool,
) -> QueueFamilyIndices {
    let mut indices = QueueFamilyIndices::default();

    for (i, family) in families.iter().enumerate() {
        let i = i as u32;
        if family.queue_count == 0 {
            continue;
        }

        if indices.graphics_family.is_none()
            && family.queue_flags.contains(vk::QueueFlags::GRAPHICS)
        {
            indices.graphics_family = Some(i);
        }
        if indices.present_family.is_none() && supports_present(i) {
            indices.present_family = Some(i);
        }
        if indices.is_complete() {
            break;
        }
    }

    indices
}

/// Highest sample count set in both the color and depth framebuffer limits.
pub fn max_usable_sample_count(limits: &vk::PhysicalDeviceLimits) -> vk::SampleCountFlags {
    let counts =
        limits.framebuffer_color_sample_counts & limits.framebuffer_depth_sample_counts;

    [
        vk::SampleCountFlags::TYPE_64,
        vk::SampleCountFlags::TYPE_32,
        vk::SampleCountFlags::TYPE_16,
        vk::SampleCountFlags::TYPE_8,
        vk::SampleCountFlags::TYPE_4,
        vk::SampleCountFlags::TYPE_2,
    ]
    .into_iter()
    .find(|&bit| counts.contains(bit))
    .unwrap_or(vk::SampleCountFlags::TYPE_1)
}

/// First candidate whose tiling features include `features`.
pub fn find_supported_format(
    candidates: &[vk::Format],
    tiling: vk::ImageTiling,
    features: vk::FormatFeatureFlags,
    mut properties: impl FnMut(vk::Format) -> vk::FormatProperties,
) -> Option<vk::Format> {
    candidates.iter().copied().find(|&format| {
        let props = properties(format);
        match tiling {
            vk::ImageTiling::LINEAR => props.linear_tiling_features.contains(features),
            vk::ImageTiling::OPTIMAL => props.optimal_tiling_features.contains(features),
            _ => false,
        }
    })
}

fn missing_extensions(required: &[&CStr], supported: &[CString]) -> Vec<String> {
    required
        .iter()
        .filter(|name| !supported.iter().any(|s| s.as_c_str() == **name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_scan_same_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)];
        let indices = scan_queue_families(&families, |_| true);
        assert_eq!(indices.complete(), Some(QueueFamilies { graphics: 0, present: 0 }));
    }

    #[test]
    fn test_scan_first_match_wins() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let indices = scan_queue_families(&families, |i| i >= 1);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_scan_split_families() {
        let families = [family(vk::QueueFlags::GRAPHICS), family(vk::QueueFlags::COMPUTE)];
        let families = scan_queue_families(&families, |i| i == 1).complete().unwrap();
        assert!(families.is_split());
        assert_eq!(families.unique(), vec![0, 1]);
    }

    #[test]
    fn test_scan_incomplete() {
        let families = [family(vk::QueueFlags::COMPUTE)];
        let indices = scan_queue_families(&families, |_| true);
        assert!(!indices.is_complete());
        assert_eq!(indices.complete(), None);

        let empty = vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::GRAPHICS,
            queue_count: 0,
            ..Default::default()
        };
        assert_eq!(scan_queue_families(&[empty], |_| true), QueueFamilyIndices::default());
    }

    #[test]
    fn test_max_usable_sample_count() {
        let limits = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&limits), vk::SampleCountFlags::TYPE_4);

        let single = vk::PhysicalDeviceLimits {
            framebuffer_color_sample_counts: vk::SampleCountFlags::TYPE_1,
            framebuffer_depth_sample_counts: vk::SampleCountFlags::TYPE_1,
            ..Default::default()
        };
        assert_eq!(max_usable_sample_count(&single), vk::SampleCountFlags::TYPE_1);
    }

    #[test]
    fn test_find_supported_format_prefers_candidate_order() {
        let found = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |format| {
                if format == vk::Format::D32_SFLOAT {
                    vk::FormatProperties::default()
                } else {
                    vk::FormatProperties {
                        optimal_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                        ..Default::default()
                    }
                }
            },
        );
        assert_eq!(found, Some(vk::Format::D32_SFLOAT_S8_UINT));
    }

    #[test]
    fn test_find_supported_format_respects_tiling() {
        let found = find_supported_format(
            &DEPTH_FORMAT_CANDIDATES,
            vk::ImageTiling::OPTIMAL,
            vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
            |_| vk::FormatProperties {
                linear_tiling_features: vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT,
                ..Default::default()
            },
        );
        assert_eq!(found, None);
    }

    #[test]
    fn test_missing_extensions() {
        let supported = vec![CString::from(c"VK_KHR_swapchain")];
        assert!(missing_extensions(&REQUIRED_DEVICE_EXTENSIONS, &supported).is_empty());
        assert_eq!(
            missing_extensions(&REQUIRED_DEVICE_EXTENSIONS, &[]),
            vec!["VK_KHR_swapchain".to_owned()]
        );
    }

    #[test]
    fn test_failed_query_moves_on_to_next_adapter() {
        let adapters = ["lost surface", "suitable"];
        let selected = first_suitable(adapters, |&name| match name {
            "lost surface" => Err(RhiError::Vulkan(vk::Result::ERROR_SURFACE_LOST_KHR)),
            other => Ok(Some(other)),
        });
        assert_eq!(selected, Some("suitable"));
    }

    #[test]
    fn test_first_accepted_adapter_wins() {
        let mut checked = Vec::new();
        let selected = first_suitable([0, 1, 2, 3], |&index| {
            checked.push(index);
            Ok((index >= 1).then_some(index * 10))
        });
        assert_eq!(selected, Some(10));
        assert_eq!(checked, vec![0, 1]);
    }

    #[test]
    fn test_no_adapter_accepted() {
        let selected: Option<u32> = first_suitable([0u32, 1], |&index| {
            if index == 0 {
                Err(RhiError::NoSuitableAdapter)
            } else {
                Ok(None)
            }
        });
        assert_eq!(selected, None);
    }
}
