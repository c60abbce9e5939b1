//! Synchronization primitives for Vulkan.
//!
//! This module provides wrappers for Vulkan synchronization objects:
//! - [`Semaphore`] - GPU-to-GPU synchronization (between queue operations)
//! - [`Fence`] - GPU-to-CPU synchronization (for host waiting)
//! - [`FrameSync`] - Per-frame synchronization primitives for rendering
//!
//! Every host-side wait is bounded. A fence that does not signal within the
//! timeout surfaces as [`RhiError::DeviceTimeout`] instead of hanging the app.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triangle_rhi::device::Device;
//! use triangle_rhi::sync::{Semaphore, Fence};
//!
//! # fn example(device: Arc<Device>) -> Result<(), triangle_rhi::RhiError> {
//! let image_available = Semaphore::new(device.clone())?;
//! let in_flight_fence = Fence::new(device.clone(), true)?;
//!
//! in_flight_fence.wait(1_000_000_000)?;
//! in_flight_fence.reset()?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Maps the result of a bounded fence wait onto the renderer's error space.
pub fn wait_outcome(result: Result<(), vk::Result>, timeout_ns: u64) -> RhiResult<()> {
    match result {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => Err(RhiError::DeviceTimeout(format!(
            "fence not signaled within {} ms",
            timeout_ns / 1_000_000
        ))),
        Err(vk::Result::ERROR_DEVICE_LOST) => Err(RhiError::DeviceLost),
        Err(other) => Err(RhiError::Vulkan(other)),
    }
}

/// Waits until every fence in `fences` is signaled, or the timeout expires.
pub fn wait_for_fences(device: &Device, fences: &[vk::Fence], timeout_ns: u64) -> RhiResult<()> {
    if fences.is_empty() {
        return Ok(());
    }
    let result = unsafe { device.handle().wait_for_fences(fences, true, timeout_ns) };
    wait_outcome(result, timeout_ns)
}

/// Vulkan semaphore wrapper.
///
/// Used for the image-available and render-finished signals of each frame.
pub struct Semaphore {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan semaphore handle.
    semaphore: vk::Semaphore,
}

impl Semaphore {
    /// Creates a new unsignaled semaphore.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SyncObjectCreation`] if creation fails.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::SemaphoreCreateInfo::default();

        let semaphore = unsafe {
            device
                .handle()
                .create_semaphore(&create_info, None)
                .map_err(RhiError::SyncObjectCreation)?
        };

        debug!("Created semaphore");

        Ok(Self { device, semaphore })
    }

    /// Returns the Vulkan semaphore handle.
    #[inline]
    pub fn handle(&self) -> vk::Semaphore {
        self.semaphore
    }
}

impl Drop for Semaphore {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_semaphore(self.semaphore, None);
        }
        debug!("Destroyed semaphore");
    }
}

/// Vulkan fence wrapper.
///
/// Signaled by the GPU when a frame's submission completes.
pub struct Fence {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan fence handle.
    fence: vk::Fence,
}

impl Fence {
    /// Creates a new fence, optionally already signaled.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SyncObjectCreation`] if creation fails.
    pub fn new(device: Arc<Device>, signaled: bool) -> RhiResult<Self> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };

        let create_info = vk::FenceCreateInfo::default().flags(flags);

        let fence = unsafe {
            device
                .handle()
                .create_fence(&create_info, None)
                .map_err(RhiError::SyncObjectCreation)?
        };

        debug!(
            "Created fence ({})",
            if signaled { "signaled" } else { "unsignaled" }
        );

        Ok(Self { device, fence })
    }

    /// Returns the Vulkan fence handle.
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }

    /// Blocks until the fence is signaled or `timeout_ns` elapses.
    ///
    /// # Errors
    ///
    /// - [`RhiError::DeviceTimeout`] if the timeout expires
    /// - [`RhiError::DeviceLost`] if the device was lost
    pub fn wait(&self, timeout_ns: u64) -> RhiResult<()> {
        wait_for_fences(&self.device, &[self.fence], timeout_ns)
    }

    /// Resets the fence to the unsignaled state.
    ///
    /// The fence must not be pending on any queue submission.
    pub fn reset(&self) -> RhiResult<()> {
        let fences = [self.fence];
        unsafe {
            self.device
                .handle()
                .reset_fences(&fences)
                .map_err(RhiError::from_submission)
        }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_fence(self.fence, None);
        }
        debug!("Destroyed fence");
    }
}

/// Per-frame synchronization primitives.
///
/// # Usage Pattern
///
/// ```text
/// 1. Wait for in_flight_fence (bounded)
/// 2. Acquire swapchain image (signals image_available_semaphore)
/// 3. Reset in_flight_fence, only once an image was acquired
/// 4. Submit command buffer:
///    - Wait on image_available_semaphore
///    - Signal render_finished_semaphore
///    - Signal in_flight_fence on completion
/// 5. Present (waits on render_finished_semaphore)
/// ```
pub struct FrameSync {
    /// Semaphore signaled when a swapchain image is available.
    image_available_semaphore: Semaphore,
    /// Semaphore signaled when rendering is complete.
    render_finished_semaphore: Semaphore,
    /// Fence used to wait for frame completion before reusing the slot.
    in_flight_fence: Fence,
}

impl FrameSync {
    /// Creates one slot's semaphores and fence.
    ///
    /// The in-flight fence is created in the signaled state so the first
    /// frame can proceed without waiting.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let image_available_semaphore = Semaphore::new(device.clone())?;
        let render_finished_semaphore = Semaphore::new(device.clone())?;
        let in_flight_fence = Fence::new(device, true)?;

        info!("Created frame synchronization primitives");

        Ok(Self {
            image_available_semaphore,
            render_finished_semaphore,
            in_flight_fence,
        })
    }

    #[inline]
    pub fn image_available_semaphore(&self) -> &Semaphore {
        &self.image_available_semaphore
    }

    #[inline]
    pub fn render_finished_semaphore(&self) -> &Semaphore {
        &self.render_finished_semaphore
    }

    #[inline]
    pub fn in_flight_fence(&self) -> &Fence {
        &self.in_flight_fence
    }

    #[inline]
    pub fn image_available_handle(&self) -> vk::Semaphore {
        self.image_available_semaphore.handle()
    }

    #[inline]
    pub fn render_finished_handle(&self) -> vk::Semaphore {
        self.render_finished_semaphore.handle()
    }

    #[inline]
    pub fn in_flight_fence_handle(&self) -> vk::Fence {
        self.in_flight_fence.handle()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wait_outcome_success() {
        assert!(wait_outcome(Ok(()), 1_000).is_ok());
    }

    #[test]
    fn test_wait_outcome_timeout() {
        let err = wait_outcome(Err(vk::Result::TIMEOUT), 10_000_000_000).unwrap_err();
        match err {
            RhiError::DeviceTimeout(message) => assert!(message.contains("10000 ms")),
            other => panic!("expected DeviceTimeout, got {other:?}"),
        }
    }

    #[test]
    fn test_wait_outcome_device_lost() {
        let err = wait_outcome(Err(vk::Result::ERROR_DEVICE_LOST), 1_000).unwrap_err();
        assert!(matches!(err, RhiError::DeviceLost));
    }

    #[test]
    fn test_wait_outcome_other_error() {
        let err = wait_outcome(Err(vk::Result::ERROR_OUT_OF_HOST_MEMORY), 1_000).unwrap_err();
        assert!(matches!(
            err,
            RhiError::Vulkan(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn test_sync_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Semaphore>();
        assert_send_sync::<Fence>();
        assert_send_sync::<FrameSync>();
    }
}
