//! Swapchain management.
//!
//! This module handles VkSwapchainKHR creation, image acquisition, and presentation.
//!
//! # Overview
//!
//! The [`Swapchain`] struct owns the swapchain and one image view per image:
//! - Surface support is queried fresh on every (re)build
//! - Format, present mode, extent and image count are chosen by the pure
//!   functions at the bottom of this module
//! - Recreation passes the outgoing handle as `old_swapchain` and destroys the
//!   old swapchain only after the new one exists
//! - Acquire and present results are classified into [`AcquireResult`] and
//!   [`SwapchainStatus`] so the caller can tell a stale swapchain from a fatal
//!   error
//!
//! # Example
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use triangle_rhi::{device::Device, instance::Instance, swapchain::*, vk};
//! # fn example(instance: &Instance, device: Arc<Device>, surface: vk::SurfaceKHR,
//! #     semaphore: vk::Semaphore, render_finished: vk::Semaphore) -> triangle_rhi::RhiResult<()> {
//! let mut swapchain = Swapchain::new(instance, device.clone(), surface, 800, 600)?;
//!
//! match swapchain.acquire_next_image(semaphore, 1_000_000_000)? {
//!     AcquireResult::Ready { image_index, .. } => {
//!         // ... submit work rendering into image_index ...
//!         let status = swapchain.present(device.present_queue(), image_index, render_finished)?;
//!         if status != SwapchainStatus::Optimal {
//!             swapchain.recreate(instance, surface, 1024, 768)?;
//!         }
//!     }
//!     AcquireResult::OutOfDate => swapchain.recreate(instance, surface, 1024, 768)?,
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info, warn};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::instance::Instance;
use crate::physical_device::QueueFamilyIndices;

/// Format used when the surface accepts any format, and preferred otherwise.
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Swapchain surface support details.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    /// Surface capabilities (min/max image count, extents, transforms, etc.)
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    /// Supported surface formats (format and color space combinations)
    pub formats: Vec<vk::SurfaceFormatKHR>,
    /// Supported present modes (FIFO, MAILBOX, IMMEDIATE, etc.)
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    /// Queries swapchain support details for a physical device and surface.
    ///
    /// Empty format or present mode lists are returned as-is; use
    /// [`is_adequate`](Self::is_adequate) to reject them.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::SurfaceQuery`] if any of the queries fail.
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(physical_device, surface)
                .map_err(RhiError::SurfaceQuery)?
        };

        let formats = unsafe {
            surface_loader
                .get_physical_device_surface_formats(physical_device, surface)
                .map_err(RhiError::SurfaceQuery)?
        };

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(physical_device, surface)
                .map_err(RhiError::SurfaceQuery)?
        };

        debug!(
            "Swapchain support: {} formats, {} present modes, image count: {}-{}",
            formats.len(),
            present_modes.len(),
            capabilities.min_image_count,
            if capabilities.max_image_count == 0 {
                "unlimited".to_string()
            } else {
                capabilities.max_image_count.to_string()
            }
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode are available.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// State of the swapchain reported by acquire or present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Still usable, but no longer matches the surface exactly.
    Suboptimal,
    /// Must be recreated before it can be used again.
    OutOfDate,
}

/// Outcome of acquiring the next swapchain image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    Ready { image_index: u32, suboptimal: bool },
    OutOfDate,
}

/// Maps a raw acquire result. Out-of-date is recoverable, everything else
/// that is not a success is an error.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquireResult> {
    match result {
        Ok((image_index, suboptimal)) => Ok(AcquireResult::Ready {
            image_index,
            suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquireResult::OutOfDate),
        Err(r) => Err(frame_error(r, "acquire")),
    }
}

/// Maps a raw present result.
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(r) => Err(frame_error(r, "present")),
    }
}

fn frame_error(result: vk::Result, operation: &str) -> RhiError {
    match result {
        vk::Result::TIMEOUT | vk::Result::NOT_READY => {
            RhiError::DeviceTimeout(format!("swapchain {} returned {:?}", operation, result))
        }
        other => RhiError::from_submission(other),
    }
}

/// Vulkan swapchain wrapper.
///
/// Owns the swapchain and the image views; the images themselves belong to
/// the swapchain. `images.len() == image_views.len()` at all times.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::Format,
    extent: vk::Extent2D,
    present_mode: vk::PresentModeKHR,
}

impl Swapchain {
    /// Creates a new swapchain sized to the given drawable size.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Surface queries fail ([`RhiError::SurfaceQuery`])
    /// - The surface reports no formats or present modes ([`RhiError::Enumeration`])
    /// - The surface extent has a zero side, or swapchain creation fails
    ///   ([`RhiError::SwapchainCreation`])
    /// - Image view creation fails ([`RhiError::ImageViewCreation`])
    pub fn new(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<Self> {
        Self::create_internal(
            instance,
            device,
            surface,
            width,
            height,
            vk::SwapchainKHR::null(),
        )
    }

    fn create_internal(
        instance: &Instance,
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
        old_swapchain: vk::SwapchainKHR,
    ) -> RhiResult<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(instance.handle(), device.handle());
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());

        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, &surface_loader)?;

        let surface_format = choose_surface_format(&support.formats)?;
        if support.present_modes.is_empty() {
            return Err(RhiError::Enumeration(
                "surface reports no present modes".to_string(),
            ));
        }
        let present_mode = choose_present_mode(&support.present_modes);
        let extent = choose_extent(&support.capabilities, width, height);
        if !is_presentable(extent) {
            return Err(RhiError::SwapchainCreation(vk::Result::ERROR_OUT_OF_DATE_KHR));
        }
        let image_count = determine_image_count(&support.capabilities);

        info!(
            "Creating swapchain: {}x{}, format {:?}, color space {:?}, present mode {:?}, {} images",
            extent.width,
            extent.height,
            surface_format.format,
            surface_format.color_space,
            present_mode,
            image_count
        );

        let (sharing_mode, queue_family_indices) = sharing_config(device.queue_families());
        debug!(
            "Using {:?} sharing mode for queue families {:?}",
            sharing_mode, queue_family_indices
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&queue_family_indices)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            swapchain_loader
                .create_swapchain(&create_info, None)
                .map_err(RhiError::SwapchainCreation)?
        };

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(RhiError::SwapchainCreation(e));
            }
        };
        info!("Swapchain created with {} images", images.len());

        let image_views = match create_image_views(&device, &images, surface_format.format) {
            Ok(views) => views,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        Ok(Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views,
            format: surface_format.format,
            extent,
            present_mode,
        })
    }

    /// Rebuilds the swapchain for a new drawable size.
    ///
    /// The image views are destroyed first, the new swapchain is created with
    /// the current one as `old_swapchain`, and only then is the old swapchain
    /// destroyed.
    ///
    /// The caller must ensure no submitted work still references the old
    /// images, and that framebuffers built on the old views are gone.
    pub fn recreate(
        &mut self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<()> {
        info!(
            "Recreating swapchain: {}x{} -> requested {}x{}",
            self.extent.width, self.extent.height, width, height
        );

        self.destroy_image_views();

        let new_swapchain = Self::create_internal(
            instance,
            self.device.clone(),
            surface,
            width,
            height,
            self.swapchain,
        )?;

        // Dropping the previous value destroys the old swapchain
        let old = std::mem::replace(self, new_swapchain);
        drop(old);

        Ok(())
    }

    /// Extent a rebuild for a `width` x `height` drawable would get right now.
    ///
    /// Surfaces that dictate their size report it here, so this is zero while
    /// the window is minimized even if the caller's drawable size is stale.
    pub fn target_extent(
        &self,
        instance: &Instance,
        surface: vk::SurfaceKHR,
        width: u32,
        height: u32,
    ) -> RhiResult<vk::Extent2D> {
        let surface_loader = ash::khr::surface::Instance::new(instance.entry(), instance.handle());
        let capabilities = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(self.device.physical_device(), surface)
                .map_err(RhiError::SurfaceQuery)?
        };
        Ok(choose_extent(&capabilities, width, height))
    }

    /// Acquires the next swapchain image, waiting at most `timeout_ns`.
    ///
    /// # Errors
    ///
    /// [`RhiError::DeviceLost`] on device loss, [`RhiError::DeviceTimeout`] if
    /// no image became available in time, [`RhiError::Submission`] otherwise.
    pub fn acquire_next_image(
        &self,
        semaphore: vk::Semaphore,
        timeout_ns: u64,
    ) -> RhiResult<AcquireResult> {
        classify_acquire(unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                timeout_ns,
                semaphore,
                vk::Fence::null(),
            )
        })
    }

    /// Queues `image_index` for presentation after `wait_semaphore` signals.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// Returns the swapchain extent (resolution).
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn present_mode(&self) -> vk::PresentModeKHR {
        self.present_mode
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }

    fn destroy_image_views(&mut self) {
        for &image_view in &self.image_views {
            unsafe {
                self.device.handle().destroy_image_view(image_view, None);
            }
        }
        self.image_views.clear();
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        self.destroy_image_views();

        if self.swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader
                    .destroy_swapchain(self.swapchain, None);
            }

            info!(
                "Swapchain destroyed (was {}x{}, {} images)",
                self.extent.width,
                self.extent.height,
                self.images.len()
            );
        }
    }
}

/// Sharing mode and the queue family list to pass with it.
///
/// Concurrent sharing lists both families; exclusive sharing lists none.
pub fn sharing_config(queue_families: &QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    match queue_families.sharing_mode() {
        vk::SharingMode::CONCURRENT => {
            (vk::SharingMode::CONCURRENT, queue_families.unique_families())
        }
        mode => (mode, Vec::new()),
    }
}

fn is_preferred(format: &vk::SurfaceFormatKHR) -> bool {
    format.format == PREFERRED_SURFACE_FORMAT.format
        && format.color_space == PREFERRED_SURFACE_FORMAT.color_space
}

/// Chooses the surface format.
///
/// 1. A single `UNDEFINED` entry means any format is acceptable: use
///    [`PREFERRED_SURFACE_FORMAT`]
/// 2. Otherwise the first entry equal to the preferred format
/// 3. Otherwise the first entry in the list
///
/// # Errors
///
/// Returns [`RhiError::Enumeration`] for an empty list.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    let Some(&first) = formats.first() else {
        return Err(RhiError::Enumeration(
            "surface reports no formats".to_string(),
        ));
    };

    if formats.len() == 1 && first.format == vk::Format::UNDEFINED {
        debug!("Surface accepts any format, using B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return Ok(PREFERRED_SURFACE_FORMAT);
    }

    if let Some(&preferred) = formats.iter().find(|f| is_preferred(f)) {
        debug!("Selected preferred surface format: B8G8R8A8_UNORM with SRGB_NONLINEAR");
        return Ok(preferred);
    }

    warn!(
        "Using first available surface format: {:?} / {:?}",
        first.format, first.color_space
    );
    Ok(first)
}

/// Chooses the present mode: MAILBOX, then IMMEDIATE, then FIFO.
///
/// FIFO is always supported, so it is the fallback even if not listed.
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    let selected = [vk::PresentModeKHR::MAILBOX, vk::PresentModeKHR::IMMEDIATE]
        .into_iter()
        .find(|mode| present_modes.contains(mode))
        .unwrap_or(vk::PresentModeKHR::FIFO);

    debug!("Selected {:?} present mode", selected);
    selected
}

/// Chooses the swapchain extent (resolution).
///
/// A `current_extent` of `u32::MAX` means the surface size follows the
/// swapchain: the drawable size is clamped to the surface limits. Any other
/// value is dictated by the surface and used as-is.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    width: u32,
    height: u32,
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        debug!(
            "Using current surface extent: {}x{}",
            capabilities.current_extent.width, capabilities.current_extent.height
        );
        return capabilities.current_extent;
    }

    let extent = vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    };

    debug!(
        "Calculated extent: {}x{} (requested: {}x{}, min: {}x{}, max: {}x{})",
        extent.width,
        extent.height,
        width,
        height,
        capabilities.min_image_extent.width,
        capabilities.min_image_extent.height,
        capabilities.max_image_extent.width,
        capabilities.max_image_extent.height
    );

    extent
}

/// A swapchain can only be built for an extent with both sides non-zero.
#[inline]
pub fn is_presentable(extent: vk::Extent2D) -> bool {
    extent.width > 0 && extent.height > 0
}

/// One more image than the minimum, capped by the maximum when it is non-zero.
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;

    // 0 means no maximum
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}

/// Creates one 2D color view per swapchain image.
///
/// Views created before a failure are destroyed before returning the error.
fn create_image_views(
    device: &Device,
    images: &[vk::Image],
    format: vk::Format,
) -> RhiResult<Vec<vk::ImageView>> {
    let mut image_views = Vec::with_capacity(images.len());

    for &image in images {
        let create_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(vk::ImageAspectFlags::COLOR)
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        match unsafe { device.handle().create_image_view(&create_info, None) } {
            Ok(view) => image_views.push(view),
            Err(e) => {
                for view in image_views {
                    unsafe { device.handle().destroy_image_view(view, None) };
                }
                return Err(RhiError::ImageViewCreation(e));
            }
        }
    }

    debug!("Created {} image views", image_views.len());
    Ok(image_views)
}
