//! Command pool and command buffer management.
//!
//! # Overview
//!
//! - [`CommandPool`] manages the VkCommandPool for the graphics queue family
//! - [`CommandBuffer`] wraps a VkCommandBuffer with the recording calls the triangle needs
//! - [`CommandBufferSet`] holds one pre-recorded buffer per framebuffer
//!
//! The draw commands never change between frames, so every buffer is recorded
//! once with `SIMULTANEOUS_USE` and resubmitted until the swapchain is rebuilt.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triangle_rhi::device::Device;
//! use triangle_rhi::command::CommandPool;
//!
//! # fn example(device: Arc<Device>) -> Result<(), triangle_rhi::RhiError> {
//! let queue_family = device.queue_families().graphics_family.unwrap();
//! let pool = CommandPool::new(device.clone(), queue_family)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::buffer::VertexBuffer;
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::framebuffer::FramebufferSet;
use crate::pipeline::Pipeline;
use crate::render_pass::RenderPass;

/// Vulkan command pool wrapper.
///
/// Lives for the whole renderer lifetime. Buffers allocated from it are
/// freed and re-allocated on each swapchain rebuild.
pub struct CommandPool {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan command pool handle.
    pool: vk::CommandPool,
    /// Queue family index this pool belongs to.
    queue_family_index: u32,
}

impl CommandPool {
    /// Creates a new command pool for the specified queue family.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CommandPoolCreation`] if the driver rejects it.
    pub fn new(device: Arc<Device>, queue_family_index: u32) -> RhiResult<Self> {
        let create_info =
            vk::CommandPoolCreateInfo::default().queue_family_index(queue_family_index);

        let pool = unsafe {
            device
                .handle()
                .create_command_pool(&create_info, None)
                .map_err(RhiError::CommandPoolCreation)?
        };

        info!(
            "Command pool created for queue family {}",
            queue_family_index
        );

        Ok(Self {
            device,
            pool,
            queue_family_index,
        })
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandPool {
        self.pool
    }

    #[inline]
    pub fn queue_family_index(&self) -> u32 {
        self.queue_family_index
    }

    /// Allocates `count` primary command buffers.
    pub fn allocate_command_buffers(&self, count: u32) -> RhiResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(self.pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);

        unsafe {
            self.device
                .handle()
                .allocate_command_buffers(&alloc_info)
                .map_err(RhiError::CommandBuffer)
        }
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_command_pool(self.pool, None);
        }
        info!(
            "Command pool destroyed for queue family {}",
            self.queue_family_index
        );
    }
}

/// Thin recording wrapper over a VkCommandBuffer.
///
/// Does NOT own the handle. Freeing is left to [`CommandBufferSet`].
pub struct CommandBuffer<'a> {
    device: &'a Device,
    buffer: vk::CommandBuffer,
}

impl<'a> CommandBuffer<'a> {
    #[inline]
    pub fn from_handle(device: &'a Device, buffer: vk::CommandBuffer) -> Self {
        Self { device, buffer }
    }

    #[inline]
    pub fn handle(&self) -> vk::CommandBuffer {
        self.buffer
    }

    // =========================================================================
    // Recording Control
    // =========================================================================

    /// Begins recording a buffer that may be pending on several frames at once.
    pub fn begin_simultaneous(&self) -> RhiResult<()> {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);

        unsafe {
            self.device
                .handle()
                .begin_command_buffer(self.buffer, &begin_info)
                .map_err(RhiError::CommandBuffer)
        }
    }

    /// Ends recording. The buffer is ready for submission afterwards.
    pub fn end(&self) -> RhiResult<()> {
        unsafe {
            self.device
                .handle()
                .end_command_buffer(self.buffer)
                .map_err(RhiError::CommandBuffer)
        }
    }

    // =========================================================================
    // Render Pass
    // =========================================================================

    pub fn begin_render_pass(&self, begin_info: &vk::RenderPassBeginInfo) {
        unsafe {
            self.device.handle().cmd_begin_render_pass(
                self.buffer,
                begin_info,
                vk::SubpassContents::INLINE,
            );
        }
    }

    pub fn end_render_pass(&self) {
        unsafe {
            self.device.handle().cmd_end_render_pass(self.buffer);
        }
    }

    // =========================================================================
    // Binding
    // =========================================================================

    pub fn bind_pipeline(&self, bind_point: vk::PipelineBindPoint, pipeline: vk::Pipeline) {
        unsafe {
            self.device
                .handle()
                .cmd_bind_pipeline(self.buffer, bind_point, pipeline);
        }
    }

    pub fn bind_vertex_buffers(
        &self,
        first_binding: u32,
        buffers: &[vk::Buffer],
        offsets: &[vk::DeviceSize],
    ) {
        unsafe {
            self.device.handle().cmd_bind_vertex_buffers(
                self.buffer,
                first_binding,
                buffers,
                offsets,
            );
        }
    }

    // =========================================================================
    // Drawing
    // =========================================================================

    pub fn draw(
        &self,
        vertex_count: u32,
        instance_count: u32,
        first_vertex: u32,
        first_instance: u32,
    ) {
        unsafe {
            self.device.handle().cmd_draw(
                self.buffer,
                vertex_count,
                instance_count,
                first_vertex,
                first_instance,
            );
        }
    }
}

/// Clear value for the single color attachment.
pub fn color_clear_value(color: [f32; 4]) -> vk::ClearValue {
    vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }
}

/// Render area covering the whole framebuffer.
pub fn full_render_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

// ============================================================================
// Pre-recorded buffers, one per framebuffer
// ============================================================================

/// Primary command buffers indexed by swapchain image.
///
/// Must be dropped before the pool they came from.
pub struct CommandBufferSet {
    device: Arc<Device>,
    pool: vk::CommandPool,
    buffers: Vec<vk::CommandBuffer>,
}

impl CommandBufferSet {
    /// Allocates one buffer per framebuffer and records the triangle draw into each.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::CommandBuffer`] if allocation or recording fails.
    /// Buffers allocated before the failure are freed.
    #[allow(clippy::too_many_arguments)]
    pub fn record(
        device: Arc<Device>,
        pool: &CommandPool,
        framebuffers: &FramebufferSet,
        render_pass: &RenderPass,
        pipeline: &Pipeline,
        vertex_buffer: &VertexBuffer,
        extent: vk::Extent2D,
        clear_color: [f32; 4],
    ) -> RhiResult<Self> {
        let buffers = pool.allocate_command_buffers(framebuffers.len() as u32)?;
        let set = Self {
            device,
            pool: pool.handle(),
            buffers,
        };

        let clear_values = [color_clear_value(clear_color)];
        let vertex_buffers = [vertex_buffer.handle()];
        let offsets = [0];

        for (&buffer, &framebuffer) in set.buffers.iter().zip(framebuffers.framebuffers()) {
            let cmd = CommandBuffer::from_handle(&set.device, buffer);

            cmd.begin_simultaneous()?;

            let render_pass_info = vk::RenderPassBeginInfo::default()
                .render_pass(render_pass.handle())
                .framebuffer(framebuffer)
                .render_area(full_render_area(extent))
                .clear_values(&clear_values);

            cmd.begin_render_pass(&render_pass_info);
            cmd.bind_pipeline(pipeline.bind_point(), pipeline.handle());
            cmd.bind_vertex_buffers(0, &vertex_buffers, &offsets);
            cmd.draw(vertex_buffer.vertex_count(), 1, 0, 0);
            cmd.end_render_pass();

            cmd.end()?;
        }

        debug!("Recorded {} command buffers", set.buffers.len());

        Ok(set)
    }

    /// Buffer for swapchain image `image_index`.
    #[inline]
    pub fn get(&self, image_index: u32) -> Option<vk::CommandBuffer> {
        self.buffers.get(image_index as usize).copied()
    }

    #[inline]
    pub fn buffers(&self) -> &[vk::CommandBuffer] {
        &self.buffers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl Drop for CommandBufferSet {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            unsafe {
                self.device
                    .handle()
                    .free_command_buffers(self.pool, &self.buffers);
            }
        }
        debug!("Freed {} command buffers", self.buffers.len());
    }
}
