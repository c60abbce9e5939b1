//! Main renderer orchestration.
//!
//! This module provides the [`Renderer`] struct that owns every Vulkan object
//! needed to draw the triangle and keeps the swapchain-dependent ones in step
//! with the window size.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, trace, warn};

use triangle_core::RendererConfig;
use triangle_platform::{Surface, Window};
use triangle_rhi::buffer::VertexBuffer;
use triangle_rhi::command::{CommandBufferSet, CommandPool};
use triangle_rhi::device::Device;
use triangle_rhi::framebuffer::FramebufferSet;
use triangle_rhi::instance::Instance;
use triangle_rhi::physical_device::select_physical_device;
use triangle_rhi::pipeline::GraphicsPipeline;
use triangle_rhi::swapchain::{AcquireResult, Swapchain, SwapchainStatus, is_presentable};
use triangle_rhi::vertex::TRIANGLE_VERTICES;
use triangle_rhi::{RhiError, RhiResult};

use crate::frame::FrameSynchronizer;
use crate::lifecycle::{Lifecycle, RendererState};

/// Everything built on top of the swapchain images.
///
/// Fields drop in declaration order: command buffers, framebuffers, then the
/// pipeline state (pipeline, layout, render pass).
struct SwapchainTargets {
    command_buffers: CommandBufferSet,
    framebuffers: FramebufferSet,
    pipeline: GraphicsPipeline,
}

impl SwapchainTargets {
    fn new(
        device: &Arc<Device>,
        config: &RendererConfig,
        swapchain: &Swapchain,
        command_pool: &CommandPool,
        vertex_buffer: &VertexBuffer,
    ) -> RhiResult<Self> {
        let extent = swapchain.extent();

        let pipeline = GraphicsPipeline::new(device.clone(), config, extent, swapchain.format())?;

        let framebuffers = FramebufferSet::new(
            device.clone(),
            pipeline.render_pass(),
            swapchain.image_views(),
            extent,
        )?;

        let command_buffers = CommandBufferSet::record(
            device.clone(),
            command_pool,
            &framebuffers,
            pipeline.render_pass(),
            pipeline.pipeline(),
            vertex_buffer,
            extent,
            config.clear_color,
        )?;

        Ok(Self {
            command_buffers,
            framebuffers,
            pipeline,
        })
    }
}

/// Result of one pass through the acquire/submit/present sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameOutcome {
    Presented {
        acquire_suboptimal: bool,
        status: SwapchainStatus,
    },
    OutOfDate,
}

/// A frame can only be drawn while the drawable has a non-zero area.
fn has_drawable((width, height): (u32, u32)) -> bool {
    width > 0 && height > 0
}

/// Whether the swapchain must be rebuilt once a frame has finished.
fn needs_rebuild(outcome: FrameOutcome, resize_pending: bool) -> bool {
    match outcome {
        FrameOutcome::OutOfDate => true,
        FrameOutcome::Presented {
            acquire_suboptimal,
            status,
        } => acquire_suboptimal || resize_pending || status != SwapchainStatus::Optimal,
    }
}

/// Main renderer that manages all Vulkan resources.
///
/// # Resource Destruction Order
///
/// 1. Wait for all GPU work to complete
/// 2. Destroy per-frame semaphores and fences
/// 3. Destroy command buffers, framebuffers, pipeline, layout, render pass
/// 4. Destroy image views and swapchain
/// 5. Destroy vertex buffer and its memory
/// 6. Destroy command pool
/// 7. Destroy device
/// 8. Destroy surface
/// 9. Destroy instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    lifecycle: Lifecycle,
    config: RendererConfig,

    // Per-frame resources
    frames: ManuallyDrop<FrameSynchronizer>,

    // Swapchain-dependent resources, `None` only while being rebuilt
    targets: Option<SwapchainTargets>,
    swapchain: ManuallyDrop<Swapchain>,

    // Long-lived resources
    vertex_buffer: ManuallyDrop<VertexBuffer>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    /// Last drawable size reported by the window.
    drawable: (u32, u32),
    /// Set when the swapchain no longer matches the drawable size.
    resize_pending: bool,
}

impl Renderer {
    /// Creates every Vulkan object for `window` and moves to `Ready`.
    ///
    /// # Errors
    ///
    /// Returns the error of the first creation step that fails. Objects
    /// created before the failure are released.
    pub fn new(window: &Window, config: RendererConfig) -> RhiResult<Self> {
        let mut lifecycle = Lifecycle::new();
        let (width, height) = window.drawable_size();

        info!("Initializing Vulkan renderer ({}x{})", width, height);

        let surface_extensions = window.required_extensions()?;
        let instance = Instance::new(
            &config.window_title,
            &surface_extensions,
            config.enable_validation,
        )?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let physical_device_info =
            select_physical_device(instance.handle(), surface.handle(), surface.loader())?;

        let device = Device::new(&instance, &physical_device_info)?;

        let swapchain = Swapchain::new(&instance, device.clone(), surface.handle(), width, height)?;

        let graphics_family = device.queue_families().graphics_family.ok_or_else(|| {
            RhiError::Selection("selected device has no graphics queue".to_string())
        })?;
        let command_pool = CommandPool::new(device.clone(), graphics_family)?;

        let vertex_buffer = VertexBuffer::new(device.clone(), &TRIANGLE_VERTICES)?;

        let targets =
            SwapchainTargets::new(&device, &config, &swapchain, &command_pool, &vertex_buffer)?;

        let frames = FrameSynchronizer::new(device.clone(), config.frames_in_flight)?;

        lifecycle.transition(RendererState::Ready)?;

        info!(
            "Renderer ready: {} swapchain images, {:?}, {} frames in flight",
            swapchain.image_count(),
            swapchain.present_mode(),
            frames.len()
        );

        Ok(Self {
            lifecycle,
            config,
            frames: ManuallyDrop::new(frames),
            targets: Some(targets),
            swapchain: ManuallyDrop::new(swapchain),
            vertex_buffer: ManuallyDrop::new(vertex_buffer),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            drawable: (width, height),
            resize_pending: false,
        })
    }

    /// Records a new drawable size and rebuilds the swapchain for it.
    ///
    /// A zero size (minimized window) only marks the swapchain as stale; the
    /// rebuild happens once a non-zero size arrives.
    pub fn resize(&mut self, width: u32, height: u32) -> RhiResult<()> {
        self.drawable = (width, height);

        if width == 0 || height == 0 {
            debug!("Drawable is {}x{}, deferring swapchain rebuild", width, height);
            self.resize_pending = true;
            return Ok(());
        }

        let extent = self.swapchain.extent();
        if !self.resize_pending && extent.width == width && extent.height == height {
            trace!("Resize to current extent {}x{}, nothing to do", width, height);
            return Ok(());
        }

        debug!(
            "Resize: {}x{} -> {}x{}",
            extent.width, extent.height, width, height
        );
        self.recreate_swapchain()
    }

    /// Draws and presents one frame.
    ///
    /// Out-of-date and suboptimal swapchains are rebuilt transparently. While
    /// the drawable size is zero, frames are skipped.
    ///
    /// # Errors
    ///
    /// Device loss, a fence timeout and any other failure are returned to the
    /// caller as fatal.
    pub fn draw_frame(&mut self) -> RhiResult<()> {
        if !has_drawable(self.drawable) {
            trace!("Drawable is empty, skipping frame");
            return Ok(());
        }

        self.lifecycle.transition(RendererState::Drawing)?;

        let outcome = self.render()?;
        if needs_rebuild(outcome, self.resize_pending) {
            debug!("Swapchain needs recreation: {:?}", outcome);
            self.recreate_swapchain()
        } else {
            self.lifecycle.transition(RendererState::Ready)
        }
    }

    /// Wait, acquire, submit, present, advance.
    fn render(&mut self) -> RhiResult<FrameOutcome> {
        let timeout = self.config.fence_timeout_ns();
        let sync = self.frames.current();

        sync.in_flight_fence().wait(timeout)?;

        let (image_index, acquire_suboptimal) = match self
            .swapchain
            .acquire_next_image(sync.image_available_handle(), timeout)?
        {
            AcquireResult::OutOfDate => return Ok(FrameOutcome::OutOfDate),
            AcquireResult::Ready {
                image_index,
                suboptimal,
            } => (image_index, suboptimal),
        };

        let targets = self.targets.as_ref().ok_or_else(|| RhiError::InvalidState {
            from: self.lifecycle.state().to_string(),
            to: RendererState::Drawing.to_string(),
        })?;
        let command_buffer = targets
            .command_buffers
            .get(image_index)
            .ok_or(RhiError::CommandBuffer(vk::Result::ERROR_UNKNOWN))?;

        // Only reset once an image was acquired, otherwise the next wait would never return
        sync.in_flight_fence().reset()?;

        let wait_semaphores = [sync.image_available_handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [sync.render_finished_handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device
                .submit_graphics(&[submit_info], sync.in_flight_fence_handle())?;
        }

        let status = self.swapchain.present(
            self.device.present_queue(),
            image_index,
            sync.render_finished_handle(),
        )?;

        self.frames.advance();

        if status != SwapchainStatus::Optimal {
            debug!("Present reported {:?}", status);
        }

        Ok(FrameOutcome::Presented {
            acquire_suboptimal,
            status,
        })
    }

    /// Rebuilds the swapchain and everything that depends on it.
    ///
    /// Waits (bounded) for all in-flight frames, then for the device to go
    /// idle. The vertex buffer and the per-frame sync objects are kept.
    ///
    /// Nothing is destroyed while either the drawable or the extent the
    /// surface currently dictates is empty; the rebuild stays pending.
    pub fn recreate_swapchain(&mut self) -> RhiResult<()> {
        if !has_drawable(self.drawable) {
            return self.defer_rebuild();
        }

        let (width, height) = self.drawable;
        let target =
            self.swapchain
                .target_extent(&self.instance, self.surface.handle(), width, height)?;
        if !is_presentable(target) {
            debug!(
                "Surface extent is {}x{}, deferring swapchain rebuild",
                target.width, target.height
            );
            return self.defer_rebuild();
        }

        self.lifecycle.transition(RendererState::Recreating)?;

        self.frames.wait_all(self.config.fence_timeout_ns())?;
        self.device.wait_idle()?;

        // Framebuffers reference the image views, so they go before the swapchain rebuild
        self.targets = None;

        self.swapchain
            .recreate(&self.instance, self.surface.handle(), width, height)?;

        self.targets = Some(SwapchainTargets::new(
            &self.device,
            &self.config,
            &self.swapchain,
            &self.command_pool,
            &self.vertex_buffer,
        )?);

        self.resize_pending = false;
        self.lifecycle.transition(RendererState::Ready)?;

        let extent = self.swapchain.extent();
        info!(
            "Swapchain recreated: {}x{}, {} images",
            extent.width,
            extent.height,
            self.swapchain.image_count()
        );

        Ok(())
    }

    fn defer_rebuild(&mut self) -> RhiResult<()> {
        self.resize_pending = true;
        if self.lifecycle.state() == RendererState::Drawing {
            self.lifecycle.transition(RendererState::Ready)?;
        }
        Ok(())
    }

    #[inline]
    pub fn state(&self) -> RendererState {
        self.lifecycle.state()
    }

    /// Current swapchain extent.
    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.swapchain.format()
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.swapchain.image_count()
    }

    /// Index of the frame slot the next `draw_frame` will use.
    #[inline]
    pub fn current_frame(&self) -> usize {
        self.frames.current_index()
    }

    /// Number of framebuffers, zero while the swapchain is being rebuilt.
    pub fn framebuffer_count(&self) -> usize {
        self.targets
            .as_ref()
            .map_or(0, |targets| targets.framebuffers.len())
    }

    #[inline]
    pub fn vertex_buffer_handle(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    #[inline]
    pub fn vertex_buffer(&self) -> &VertexBuffer {
        &self.vertex_buffer
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.lifecycle.transition(RendererState::ShuttingDown) {
            warn!("Shutting down renderer from unexpected state: {}", e);
        }

        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.device.wait_idle() {
            error!(
                "Failed to wait for device idle during renderer drop: {:?}",
                e
            );
        }

        // Manually drop resources in correct order
        unsafe {
            ManuallyDrop::drop(&mut self.frames);
        }
        self.targets = None;
        unsafe {
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.vertex_buffer);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        if let Err(e) = self.lifecycle.transition(RendererState::Destroyed) {
            warn!("{}", e);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presented(acquire_suboptimal: bool, status: SwapchainStatus) -> FrameOutcome {
        FrameOutcome::Presented {
            acquire_suboptimal,
            status,
        }
    }

    #[test]
    fn test_optimal_frame_keeps_swapchain() {
        assert!(!needs_rebuild(
            presented(false, SwapchainStatus::Optimal),
            false
        ));
    }

    #[test]
    fn test_out_of_date_at_acquire_rebuilds() {
        assert!(needs_rebuild(FrameOutcome::OutOfDate, false));
        assert!(needs_rebuild(FrameOutcome::OutOfDate, true));
    }

    #[test]
    fn test_stale_present_rebuilds() {
        assert!(needs_rebuild(
            presented(false, SwapchainStatus::Suboptimal),
            false
        ));
        assert!(needs_rebuild(
            presented(false, SwapchainStatus::OutOfDate),
            false
        ));
    }

    #[test]
    fn test_suboptimal_acquire_rebuilds_after_present() {
        assert!(needs_rebuild(
            presented(true, SwapchainStatus::Optimal),
            false
        ));
    }

    #[test]
    fn test_pending_resize_rebuilds_after_present() {
        assert!(needs_rebuild(
            presented(false, SwapchainStatus::Optimal),
            true
        ));
    }

    #[test]
    fn test_empty_drawable_is_skipped() {
        assert!(!has_drawable((0, 0)));
        assert!(!has_drawable((0, 600)));
        assert!(!has_drawable((800, 0)));
        assert!(has_drawable((800, 600)));
        assert!(has_drawable((1, 1)));
    }
}
