//! Physical device (GPU) selection and queue family resolution.
//!
//! The selection process is:
//! 1. Enumerate all available GPUs
//! 2. Resolve graphics and present queue families for the surface
//! 3. Verify the required device extensions are supported
//! 4. Verify the surface reports at least one format and one present mode
//! 5. Take the first device that passes every check
//!
//! The decision logic is kept in pure functions ([`resolve_queue_families`],
//! [`check_suitability`], [`find_memory_type`]) so it can be tested without a GPU.
//!
//! # Example
//!
//! ```no_run
//! use triangle_rhi::instance::Instance;
//! use triangle_rhi::physical_device::select_physical_device;
//! use ash::vk;
//!
//! let instance = Instance::new("Triangle", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("Failed to select physical device");
//!
//! println!("Selected GPU: {}", device_info.device_name());
//! ```

use std::ffi::CStr;
use std::fmt;

use ash::vk;
use tracing::{debug, info, warn};

use crate::error::{RhiError, RhiResult};
use crate::swapchain::SwapchainSupportDetails;

/// Device extensions every candidate GPU must support.
///
/// Portability subset is required by non-native presentation backends
/// (MoltenVK on macOS).
pub fn required_device_extensions() -> Vec<&'static CStr> {
    let mut extensions = vec![ash::khr::swapchain::NAME];
    if cfg!(target_os = "macos") {
        extensions.push(ash::khr::portability_subset::NAME);
    }
    extensions
}

/// Queue family indices for graphics and presentation.
///
/// Graphics and present may resolve to the same family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Index of the first queue family that supports graphics operations.
    pub graphics_family: Option<u32>,
    /// Index of the first queue family that can present to the surface.
    pub present_family: Option<u32>,
}

impl QueueFamilyIndices {
    /// Both a graphics and a present family were found.
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.graphics_family.is_some() && self.present_family.is_some()
    }

    /// Returns the unique queue family indices, graphics first.
    ///
    /// One queue is requested per entry when creating the logical device.
    pub fn unique_families(&self) -> Vec<u32> {
        let mut families = Vec::with_capacity(2);

        if let Some(graphics) = self.graphics_family {
            families.push(graphics);
        }
        if let Some(present) = self.present_family
            && !families.contains(&present)
        {
            families.push(present);
        }

        families
    }

    /// Swapchain image sharing mode: concurrent only when the two families differ.
    pub fn sharing_mode(&self) -> vk::SharingMode {
        if self.unique_families().len() > 1 {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        }
    }
}

/// Scans queue families in order and records the first graphics-capable and
/// the first present-capable family.
///
/// Families with no queues are skipped. The scan stops as soon as both are
/// found, so `supports_present` is not called for later families.
pub fn resolve_queue_families(
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

/// Resolves queue families for `device` against `surface`.
///
/// Never cached: call again whenever the device or surface changes. A failed
/// present-support query counts as "not supported".
pub fn find_queue_families(
    instance: &ash::Instance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> QueueFamilyIndices {
    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };

    let indices = resolve_queue_families(&families, |i| unsafe {
        surface_loader
            .get_physical_device_surface_support(device, i, surface)
            .unwrap_or(false)
    });

    debug!(
        "Queue families resolved: graphics={:?}, present={:?}",
        indices.graphics_family, indices.present_family
    );

    indices
}

/// Why a physical device was not selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    MissingQueueFamilies { graphics: bool, present: bool },
    MissingExtension(String),
    ExtensionQueryFailed(vk::Result),
    SurfaceQueryFailed(vk::Result),
    InadequateSwapchainSupport { formats: usize, present_modes: usize },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::MissingQueueFamilies { graphics, present } => write!(
                f,
                "missing required queue families (graphics={}, present={})",
                graphics, present
            ),
            Rejection::MissingExtension(name) => write!(f, "missing extension {}", name),
            Rejection::ExtensionQueryFailed(r) => {
                write!(f, "could not enumerate device extensions: {}", r)
            }
            Rejection::SurfaceQueryFailed(r) => write!(f, "surface query failed: {}", r),
            Rejection::InadequateSwapchainSupport {
                formats,
                present_modes,
            } => write!(
                f,
                "inadequate swapchain support ({} formats, {} present modes)",
                formats, present_modes
            ),
        }
    }
}

/// Applies the three suitability checks in order.
///
/// `query_support` is only invoked once the queue family and extension
/// checks have passed, since surface queries need the swapchain extension.
pub fn check_suitability(
    indices: &QueueFamilyIndices,
    available_extensions: &[&CStr],
    required_extensions: &[&CStr],
    query_support: impl FnOnce() -> RhiResult<SwapchainSupportDetails>,
) -> Result<SwapchainSupportDetails, Rejection> {
    if !indices.is_complete() {
        return Err(Rejection::MissingQueueFamilies {
            graphics: indices.graphics_family.is_some(),
            present: indices.present_family.is_some(),
        });
    }

    if let Some(missing) = required_extensions
        .iter()
        .find(|required| !available_extensions.contains(required))
    {
        return Err(Rejection::MissingExtension(
            missing.to_string_lossy().into_owned(),
        ));
    }

    let support = query_support().map_err(|e| {
        Rejection::SurfaceQueryFailed(match e {
            RhiError::SurfaceQuery(r) | RhiError::Vulkan(r) => r,
            _ => vk::Result::ERROR_UNKNOWN,
        })
    })?;

    if !support.is_adequate() {
        return Err(Rejection::InadequateSwapchainSupport {
            formats: support.formats.len(),
            present_modes: support.present_modes.len(),
        });
    }

    Ok(support)
}

/// Information about the selected physical device (GPU).
#[derive(Clone)]
pub struct PhysicalDeviceInfo {
    pub device: vk::PhysicalDevice,
    /// Device properties (name, limits, API version, etc.).
    pub properties: vk::PhysicalDeviceProperties,
    /// Memory properties (heap sizes, memory types).
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Returns the device name as a string.
    pub fn device_name(&self) -> &str {
        self.properties
            .device_name_as_c_str()
            .ok()
            .and_then(|name| name.to_str().ok())
            .unwrap_or("Unknown Device")
    }

    /// Returns a human-readable string for the device type.
    pub fn device_type_name(&self) -> &'static str {
        match self.properties.device_type {
            vk::PhysicalDeviceType::DISCRETE_GPU => "Discrete GPU",
            vk::PhysicalDeviceType::INTEGRATED_GPU => "Integrated GPU",
            vk::PhysicalDeviceType::VIRTUAL_GPU => "Virtual GPU",
            vk::PhysicalDeviceType::CPU => "CPU",
            _ => "Other",
        }
    }

    /// Returns the Vulkan API version supported by the device.
    pub fn api_version(&self) -> (u32, u32, u32) {
        let version = self.properties.api_version;
        (
            vk::api_version_major(version),
            vk::api_version_minor(version),
            vk::api_version_patch(version),
        )
    }

    /// Memory type index for `type_filter` with at least `flags`.
    pub fn find_memory_type(
        &self,
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    ) -> RhiResult<u32> {
        find_memory_type(&self.memory_properties, type_filter, flags)
    }
}

impl fmt::Debug for PhysicalDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (major, minor, patch) = self.api_version();
        f.debug_struct("PhysicalDeviceInfo")
            .field("name", &self.device_name())
            .field("type", &self.device_type_name())
            .field("api_version", &format!("{}.{}.{}", major, minor, patch))
            .field("queue_families", &self.queue_families)
            .finish()
    }
}

/// Finds the first memory type whose bit is set in `type_filter` and whose
/// property flags contain all of `flags`.
///
/// # Errors
///
/// Returns [`RhiError::NoSuitableMemoryType`] when no type matches both.
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    flags: vk::MemoryPropertyFlags,
) -> RhiResult<u32> {
    memory_properties
        .memory_types
        .iter()
        .take(memory_properties.memory_type_count as usize)
        .enumerate()
        .find(|(i, memory_type)| {
            type_filter & (1 << i) != 0 && memory_type.property_flags.contains(flags)
        })
        .map(|(i, _)| i as u32)
        .ok_or(RhiError::NoSuitableMemoryType { type_filter, flags })
}

/// Selects the first physical device that can render and present to `surface`.
///
/// # Errors
///
/// - [`RhiError::Enumeration`] if no Vulkan devices exist
/// - [`RhiError::Selection`] if no device passes the suitability checks
pub fn select_physical_device(
    instance: &ash::Instance,
    surface: vk::SurfaceKHR,
    surface_loader: &ash::khr::surface::Instance,
) -> RhiResult<PhysicalDeviceInfo> {
    let devices = unsafe { instance.enumerate_physical_devices()? };

    if devices.is_empty() {
        warn!("No Vulkan-capable GPUs found");
        return Err(RhiError::Enumeration(
            "no Vulkan-capable GPUs found".to_string(),
        ));
    }

    info!("Found {} GPU(s)", devices.len());

    let required = required_device_extensions();

    for device in devices {
        let properties = unsafe { instance.get_physical_device_properties(device) };
        let name = properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown".to_string());

        let queue_families = find_queue_families(instance, device, surface, surface_loader);

        let extension_properties =
            match unsafe { instance.enumerate_device_extension_properties(device) } {
                Ok(props) => props,
                Err(r) => {
                    debug!("GPU '{}' skipped: {}", name, Rejection::ExtensionQueryFailed(r));
                    continue;
                }
            };
        let available: Vec<&CStr> = extension_properties
            .iter()
            .filter_map(|ext| ext.extension_name_as_c_str().ok())
            .collect();

        let verdict = check_suitability(&queue_families, &available, &required, || {
            SwapchainSupportDetails::query(device, surface, surface_loader)
        });

        match verdict {
            Ok(support) => {
                let info = PhysicalDeviceInfo {
                    device,
                    properties,
                    memory_properties: unsafe {
                        instance.get_physical_device_memory_properties(device)
                    },
                    queue_families,
                };
                let (major, minor, patch) = info.api_version();
                info!(
                    "Selected GPU: '{}' ({}) - Vulkan {}.{}.{}, {} surface formats, {} present modes",
                    info.device_name(),
                    info.device_type_name(),
                    major,
                    minor,
                    patch,
                    support.formats.len(),
                    support.present_modes.len()
                );
                return Ok(info);
            }
            Err(rejection) => {
                debug!("GPU '{}' skipped: {}", name, rejection);
            }
        }
    }

    warn!("No suitable GPU found with required capabilities");
    Err(RhiError::Selection(
        "no device supports graphics, presentation and the swapchain extension".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            ..Default::default()
        }
    }

    fn adequate_support() -> SwapchainSupportDetails {
        SwapchainSupportDetails {
            capabilities: vk::SurfaceCapabilitiesKHR::default(),
            formats: vec![vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            }],
            present_modes: vec![vk::PresentModeKHR::FIFO],
        }
    }

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_queue_family_indices_default() {
        let indices = QueueFamilyIndices::default();
        assert!(indices.graphics_family.is_none());
        assert!(indices.present_family.is_none());
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_queue_family_indices_incomplete() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        assert!(!indices.is_complete());

        let indices2 = QueueFamilyIndices {
            graphics_family: None,
            present_family: Some(0),
        };
        assert!(!indices2.is_complete());
    }

    #[test]
    fn test_unique_families_shared() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        assert_eq!(indices.unique_families(), vec![0]);
        assert_eq!(indices.sharing_mode(), vk::SharingMode::EXCLUSIVE);
    }

    #[test]
    fn test_unique_families_split() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(2),
        };
        assert_eq!(indices.unique_families(), vec![0, 2]);
        assert_eq!(indices.sharing_mode(), vk::SharingMode::CONCURRENT);
    }

    #[test]
    fn test_resolve_same_family() {
        let families = [family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE, 1)];
        let indices = resolve_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(0));
    }

    #[test]
    fn test_resolve_picks_first_matches() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let indices = resolve_queue_families(&families, |i| i >= 1);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_resolve_separate_present_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::TRANSFER, 1),
        ];
        let indices = resolve_queue_families(&families, |i| i == 1);
        assert_eq!(indices.graphics_family, Some(0));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_resolve_skips_empty_families() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0),
            family(vk::QueueFlags::GRAPHICS, 2),
        ];
        let indices = resolve_queue_families(&families, |_| true);
        assert_eq!(indices.graphics_family, Some(1));
        assert_eq!(indices.present_family, Some(1));
    }

    #[test]
    fn test_resolve_stops_once_complete() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
            family(vk::QueueFlags::GRAPHICS, 1),
        ];
        let mut queried = Vec::new();
        let indices = resolve_queue_families(&families, |i| {
            queried.push(i);
            true
        });
        assert!(indices.is_complete());
        assert_eq!(queried, vec![0]);
    }

    #[test]
    fn test_resolve_no_present_support() {
        let families = [family(vk::QueueFlags::GRAPHICS, 1)];
        let indices = resolve_queue_families(&families, |_| false);
        assert_eq!(indices.graphics_family, Some(0));
        assert!(!indices.is_complete());
    }

    #[test]
    fn test_suitability_passes() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let available = [ash::khr::swapchain::NAME];
        let result = check_suitability(&indices, &available, &[ash::khr::swapchain::NAME], || {
            Ok(adequate_support())
        });
        let support = result.unwrap();
        assert_eq!(support.present_modes, vec![vk::PresentModeKHR::FIFO]);
    }

    #[test]
    fn test_suitability_rejects_incomplete_queues_without_querying() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: None,
        };
        let result = check_suitability(&indices, &[], &[], || {
            panic!("support must not be queried")
        });
        assert_eq!(
            result.unwrap_err(),
            Rejection::MissingQueueFamilies {
                graphics: true,
                present: false
            }
        );
    }

    #[test]
    fn test_suitability_rejects_missing_extension() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let result = check_suitability(&indices, &[], &[ash::khr::swapchain::NAME], || {
            Ok(adequate_support())
        });
        assert_eq!(
            result.unwrap_err(),
            Rejection::MissingExtension("VK_KHR_swapchain".to_string())
        );
    }

    #[test]
    fn test_suitability_rejects_no_present_modes() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let result = check_suitability(&indices, &[], &[], || {
            let mut support = adequate_support();
            support.present_modes.clear();
            Ok(support)
        });
        assert_eq!(
            result.unwrap_err(),
            Rejection::InadequateSwapchainSupport {
                formats: 1,
                present_modes: 0
            }
        );
    }

    #[test]
    fn test_suitability_surface_query_failure() {
        let indices = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let result = check_suitability(&indices, &[], &[], || {
            Err(RhiError::SurfaceQuery(vk::Result::ERROR_SURFACE_LOST_KHR))
        });
        assert_eq!(
            result.unwrap_err(),
            Rejection::SurfaceQueryFailed(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn test_required_extensions_include_swapchain() {
        let extensions = required_device_extensions();
        assert_eq!(extensions[0], ash::khr::swapchain::NAME);
        #[cfg(target_os = "macos")]
        assert!(extensions.contains(&ash::khr::portability_subset::NAME));
    }

    #[test]
    fn test_find_memory_type_first_match() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
            vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT
                | vk::MemoryPropertyFlags::HOST_CACHED,
        ]);
        let flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        assert_eq!(find_memory_type(&props, 0b111, flags).unwrap(), 1);
        assert_eq!(find_memory_type(&props, 0b100, flags).unwrap(), 2);
    }

    #[test]
    fn test_find_memory_type_filter_excludes_compatible() {
        // Only the device-local type is allowed by the filter
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::DEVICE_LOCAL,
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let flags = vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT;

        let err = find_memory_type(&props, 0b01, flags).unwrap_err();
        assert!(matches!(
            err,
            RhiError::NoSuitableMemoryType { type_filter: 0b01, .. }
        ));
    }

    #[test]
    fn test_find_memory_type_ignores_types_past_count() {
        let mut props = memory_properties(&[vk::MemoryPropertyFlags::DEVICE_LOCAL]);
        props.memory_types[1].property_flags = vk::MemoryPropertyFlags::HOST_VISIBLE;

        assert!(
            find_memory_type(&props, 0b11, vk::MemoryPropertyFlags::HOST_VISIBLE).is_err()
        );
    }
}
