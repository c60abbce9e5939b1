//! Vulkan logical device and queue management.
//!
//! The [`Device`] owns the logical device plus the graphics and present queue
//! handles. It is shared through `Arc` by every object created from it, so it
//! is destroyed only after all of them.
//!
//! # Example
//!
//! ```no_run
//! use triangle_rhi::instance::Instance;
//! use triangle_rhi::physical_device::select_physical_device;
//! use triangle_rhi::device::Device;
//! use ash::vk;
//!
//! let instance = Instance::new("Triangle", &[], false).expect("Failed to create instance");
//! let surface: vk::SurfaceKHR = vk::SurfaceKHR::null(); // placeholder
//! let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
//!
//! let physical_device_info = select_physical_device(instance.handle(), surface, &surface_loader)
//!     .expect("No suitable GPU found");
//!
//! let device = Device::new(&instance, &physical_device_info)
//!     .expect("Failed to create logical device");
//!
//! let graphics_queue = device.graphics_queue();
//! let present_queue = device.present_queue();
//! ```

use std::ffi::c_char;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::{PhysicalDeviceInfo, QueueFamilyIndices, required_device_extensions};

/// Builds one queue create info per unique family, each requesting a single
/// queue at priority 1.0.
fn queue_create_infos<'a>(
    queue_families: &QueueFamilyIndices,
    priorities: &'a [f32],
) -> Vec<vk::DeviceQueueCreateInfo<'a>> {
    queue_families
        .unique_families()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(family)
                .queue_priorities(priorities)
        })
        .collect()
}

/// Vulkan logical device wrapper.
pub struct Device {
    device: ash::Device,
    physical_device: vk::PhysicalDevice,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    queue_families: QueueFamilyIndices,
}

impl Device {
    /// Creates the logical device with exactly the required extensions and
    /// retrieves queue 0 of the graphics and present families.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::Selection`] if the queue families are incomplete and
    /// [`RhiError::DeviceCreation`] if the driver rejects the device.
    pub fn new(
        instance: &Instance,
        physical_device_info: &PhysicalDeviceInfo,
    ) -> RhiResult<Arc<Self>> {
        let queue_families = physical_device_info.queue_families;
        let (Some(graphics_family), Some(present_family)) =
            (queue_families.graphics_family, queue_families.present_family)
        else {
            return Err(RhiError::Selection(
                "queue family indices are incomplete".to_string(),
            ));
        };

        let queue_priorities = [1.0f32];
        let queue_create_infos = queue_create_infos(&queue_families, &queue_priorities);

        debug!(
            "Creating {} queue(s) for families: {:?}",
            queue_create_infos.len(),
            queue_families.unique_families()
        );

        let extensions = required_device_extensions();
        let extension_names: Vec<*const c_char> =
            extensions.iter().map(|ext| ext.as_ptr()).collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extension_names)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .handle()
                .create_device(physical_device_info.device, &create_info, None)
                .map_err(RhiError::DeviceCreation)?
        };

        info!(
            "Logical device created with {} extension(s)",
            extension_names.len()
        );

        let graphics_queue = unsafe { device.get_device_queue(graphics_family, 0) };
        debug!("Graphics queue retrieved from family {}", graphics_family);

        let present_queue = unsafe { device.get_device_queue(present_family, 0) };
        debug!("Present queue retrieved from family {}", present_family);

        Ok(Arc::new(Self {
            device,
            physical_device: physical_device_info.device,
            memory_properties: physical_device_info.memory_properties,
            graphics_queue,
            present_queue,
            queue_families,
        }))
    }

    /// Returns the Vulkan logical device handle.
    #[inline]
    pub fn handle(&self) -> &ash::Device {
        &self.device
    }

    #[inline]
    pub fn physical_device(&self) -> vk::PhysicalDevice {
        self.physical_device
    }

    #[inline]
    pub fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.memory_properties
    }

    #[inline]
    pub fn graphics_queue(&self) -> vk::Queue {
        self.graphics_queue
    }

    #[inline]
    pub fn present_queue(&self) -> vk::Queue {
        self.present_queue
    }

    #[inline]
    pub fn queue_families(&self) -> &QueueFamilyIndices {
        &self.queue_families
    }

    /// Blocks until every queue on the device is idle.
    ///
    /// `vkDeviceWaitIdle` has no timeout; callers that need a bound wait on
    /// their fences first.
    pub fn wait_idle(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .device_wait_idle()
                .map_err(RhiError::from_submission)?
        };
        Ok(())
    }

    /// Submits command buffers to the graphics queue.
    ///
    /// # Safety
    ///
    /// The caller must ensure:
    /// - All command buffers are valid and recorded
    /// - The fence (if provided) is unsignaled and not in use
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::DeviceLost`] on device loss and
    /// [`RhiError::Submission`] for any other failure.
    pub unsafe fn submit_graphics(
        &self,
        submit_infos: &[vk::SubmitInfo],
        fence: vk::Fence,
    ) -> RhiResult<()> {
        unsafe {
            self.device
                .queue_submit(self.graphics_queue, submit_infos, fence)
                .map_err(RhiError::from_submission)?;
        }
        Ok(())
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.device.device_wait_idle() {
                tracing::error!("Failed to wait for device idle during drop: {:?}", e);
            }
            self.device.destroy_device(None);
        }
        info!("Logical device destroyed");
    }
}

// Safety: Device is Send+Sync because:
// - ash::Device is Send+Sync
// - vk::PhysicalDevice and vk::Queue are Copy handles
// - Queue submission is only done through &mut Renderer
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_queue_per_unique_family() {
        let priorities = [1.0f32];
        let shared = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(0),
        };
        let infos = queue_create_infos(&shared, &priorities);
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].queue_family_index, 0);
        assert_eq!(infos[0].queue_count, 1);

        let split = QueueFamilyIndices {
            graphics_family: Some(0),
            present_family: Some(1),
        };
        let infos = queue_create_infos(&split, &priorities);
        assert_eq!(infos.len(), 2);
        assert_eq!(infos[1].queue_family_index, 1);
        assert_eq!(unsafe { *infos[1].p_queue_priorities }, 1.0);
    }

    #[test]
    fn test_device_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Device>();
    }
}
