//! One framebuffer per swapchain image view.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;

/// Framebuffers for every swapchain image, all sized to the swapchain extent.
///
/// Must be dropped before the image views and render pass they reference.
pub struct FramebufferSet {
    device: Arc<Device>,
    framebuffers: Vec<vk::Framebuffer>,
}

impl FramebufferSet {
    /// Creates one framebuffer per entry in `image_views`.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::FramebufferCreation`]. Framebuffers created before
    /// the failure are destroyed.
    pub fn new(
        device: Arc<Device>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> RhiResult<Self> {
        let mut set = Self {
            device,
            framebuffers: Vec::with_capacity(image_views.len()),
        };

        for &view in image_views {
            let attachments = [view];
            let create_info = vk::FramebufferCreateInfo::default()
                .render_pass(render_pass.handle())
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            // On error `set` drops and destroys what was created so far
            let framebuffer = unsafe {
                set.device
                    .handle()
                    .create_framebuffer(&create_info, None)
                    .map_err(RhiError::FramebufferCreation)?
            };
            set.framebuffers.push(framebuffer);
        }

        debug!(
            "Created {} framebuffers ({}x{})",
            set.framebuffers.len(),
            extent.width,
            extent.height
        );

        Ok(set)
    }

    #[inline]
    pub fn framebuffers(&self) -> &[vk::Framebuffer] {
        &self.framebuffers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.framebuffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.framebuffers.is_empty()
    }
}

impl Drop for FramebufferSet {
    fn drop(&mut self) {
        for &framebuffer in &self.framebuffers {
            unsafe {
                self.device.handle().destroy_framebuffer(framebuffer, None);
            }
        }
        debug!("Destroyed {} framebuffers", self.framebuffers.len());
    }
}
