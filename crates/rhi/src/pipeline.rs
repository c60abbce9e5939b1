//! Graphics pipeline management.
//!
//! This module handles VkPipeline and VkPipelineLayout creation for the single
//! graphics pipeline that draws the triangle.
//!
//! # Overview
//!
//! - [`PipelineLayout`] wraps an empty VkPipelineLayout (no descriptor sets, no push constants)
//! - [`Pipeline`] wraps a graphics VkPipeline
//! - [`GraphicsPipelineBuilder`] collects the fixed-function state
//! - [`GraphicsPipeline`] owns render pass, layout and pipeline for one swapchain generation
//!
//! All viewport and scissor state is baked in for one extent, so the pipeline
//! is rebuilt whenever the swapchain is.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::path::Path;
//! use triangle_rhi::device::Device;
//! use triangle_rhi::shader::{Shader, ShaderStage};
//! use triangle_rhi::pipeline::{PipelineLayout, GraphicsPipelineBuilder};
//! use triangle_rhi::render_pass::RenderPass;
//! use triangle_rhi::vertex::Vertex;
//! use ash::vk;
//!
//! # fn example(device: Arc<Device>) -> Result<(), triangle_rhi::RhiError> {
//! let vertex_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("assets/shaders/vert.spv"),
//!     ShaderStage::Vertex,
//! )?;
//! let fragment_shader = Shader::from_spirv_file(
//!     device.clone(),
//!     Path::new("assets/shaders/frag.spv"),
//!     ShaderStage::Fragment,
//! )?;
//!
//! let render_pass = RenderPass::new(device.clone(), vk::Format::B8G8R8A8_UNORM)?;
//! let layout = PipelineLayout::new(device.clone())?;
//!
//! let pipeline = GraphicsPipelineBuilder::new()
//!     .vertex_shader(&vertex_shader)
//!     .fragment_shader(&fragment_shader)
//!     .vertex_binding(Vertex::binding_description())
//!     .vertex_attributes(&Vertex::attribute_descriptions())
//!     .extent(vk::Extent2D { width: 800, height: 600 })
//!     .build(device, &layout, &render_pass)?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};
use triangle_core::RendererConfig;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::render_pass::RenderPass;
use crate::shader::{Shader, ShaderStage};
use crate::vertex::Vertex;

/// Vulkan pipeline layout wrapper.
///
/// The triangle shaders read no descriptors and no push constants, so the
/// layout is empty.
pub struct PipelineLayout {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline layout handle.
    layout: vk::PipelineLayout,
}

impl PipelineLayout {
    /// Creates an empty pipeline layout.
    ///
    /// # Errors
    ///
    /// Returns [`RhiError::PipelineLayout`] if the driver rejects it.
    pub fn new(device: Arc<Device>) -> RhiResult<Self> {
        let create_info = vk::PipelineLayoutCreateInfo::default();

        let layout = unsafe {
            device
                .handle()
                .create_pipeline_layout(&create_info, None)
                .map_err(RhiError::PipelineLayout)?
        };

        debug!("Created empty pipeline layout");

        Ok(Self { device, layout })
    }

    /// Returns the Vulkan pipeline layout handle.
    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.layout
    }
}

impl Drop for PipelineLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .handle()
                .destroy_pipeline_layout(self.layout, None);
        }
        debug!("Pipeline layout destroyed");
    }
}

/// Graphics pipeline wrapper.
pub struct Pipeline {
    /// Reference to the logical device.
    device: Arc<Device>,
    /// Vulkan pipeline handle.
    pipeline: vk::Pipeline,
}

impl Pipeline {
    /// Creates a graphics pipeline from a filled-in create info.
    ///
    /// Internal constructor used by [`GraphicsPipelineBuilder::build`].
    fn create_graphics_internal(
        device: Arc<Device>,
        create_info: &vk::GraphicsPipelineCreateInfo,
    ) -> RhiResult<Self> {
        let pipeline = unsafe {
            device
                .handle()
                .create_graphics_pipelines(vk::PipelineCache::null(), &[*create_info], None)
                .map_err(|(_, result)| RhiError::PipelineCreation(result))?[0]
        };

        info!("Graphics pipeline created");

        Ok(Self { device, pipeline })
    }

    /// Returns the Vulkan pipeline handle.
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    /// Always [`vk::PipelineBindPoint::GRAPHICS`].
    #[inline]
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        vk::PipelineBindPoint::GRAPHICS
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_pipeline(self.pipeline, None);
        }
        info!("Graphics pipeline destroyed");
    }
}

/// Viewport covering the whole extent with depth range 0..1.
pub fn full_viewport(extent: vk::Extent2D) -> vk::Viewport {
    vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    }
}

/// Scissor rectangle covering the whole extent.
pub fn full_scissor(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Fill, cull back faces, clockwise front face, no depth bias.
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo<'static> {
    vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
}

/// Color attachment state with blending disabled and all channels written.
pub fn opaque_color_blend_attachment() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(false)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

/// Builder for the graphics pipeline.
///
/// The fixed-function state is not configurable: triangle list, fill,
/// back-face culling with a clockwise front face (the triangle is wound
/// clockwise in Vulkan clip space), one sample, no depth/stencil, one opaque
/// color attachment and no dynamic state.
pub struct GraphicsPipelineBuilder<'a> {
    // Shader stages
    vertex_shader: Option<&'a Shader>,
    fragment_shader: Option<&'a Shader>,

    // Vertex input state
    vertex_bindings: Vec<vk::VertexInputBindingDescription>,
    vertex_attributes: Vec<vk::VertexInputAttributeDescription>,

    // Viewport state
    extent: vk::Extent2D,
}

impl Default for GraphicsPipelineBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a> GraphicsPipelineBuilder<'a> {
    /// Creates a new graphics pipeline builder with default settings.
    pub fn new() -> Self {
        Self {
            vertex_shader: None,
            fragment_shader: None,
            vertex_bindings: Vec::new(),
            vertex_attributes: Vec::new(),
            extent: vk::Extent2D::default(),
        }
    }

    /// Sets the vertex shader. Required.
    pub fn vertex_shader(mut self, shader: &'a Shader) -> Self {
        self.vertex_shader = Some(shader);
        self
    }

    /// Sets the fragment shader. Required.
    pub fn fragment_shader(mut self, shader: &'a Shader) -> Self {
        self.fragment_shader = Some(shader);
        self
    }

    /// Adds a vertex input binding description.
    pub fn vertex_binding(mut self, binding: vk::VertexInputBindingDescription) -> Self {
        self.vertex_bindings.push(binding);
        self
    }

    /// Adds vertex input attribute descriptions.
    pub fn vertex_attributes(mut self, attributes: &[vk::VertexInputAttributeDescription]) -> Self {
        self.vertex_attributes.extend_from_slice(attributes);
        self
    }

    /// Sets the extent used for the static viewport and scissor.
    pub fn extent(mut self, extent: vk::Extent2D) -> Self {
        self.extent = extent;
        self
    }

    /// Builds the graphics pipeline for subpass 0 of `render_pass`.
    ///
    /// # Errors
    ///
    /// - [`RhiError::ShaderModule`] if a shader stage is missing or has the wrong stage
    /// - [`RhiError::PipelineCreation`] if the driver rejects the pipeline
    pub fn build(
        self,
        device: Arc<Device>,
        layout: &PipelineLayout,
        render_pass: &RenderPass,
    ) -> RhiResult<Pipeline> {
        let vertex_shader = self
            .vertex_shader
            .ok_or_else(|| RhiError::ShaderModule("vertex shader is required".to_string()))?;
        let fragment_shader = self
            .fragment_shader
            .ok_or_else(|| RhiError::ShaderModule("fragment shader is required".to_string()))?;

        if vertex_shader.stage() != ShaderStage::Vertex
            || fragment_shader.stage() != ShaderStage::Fragment
        {
            return Err(RhiError::ShaderModule(format!(
                "shader stages out of order: got {} and {}",
                vertex_shader.stage(),
                fragment_shader.stage()
            )));
        }

        let shader_stages = [
            vertex_shader.stage_create_info(),
            fragment_shader.stage_create_info(),
        ];

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&self.vertex_bindings)
            .vertex_attribute_descriptions(&self.vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        let viewports = [full_viewport(self.extent)];
        let scissors = [full_scissor(self.extent)];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = rasterization_state();

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        let color_blend_attachments = [opaque_color_blend_attachment()];
        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_blend_attachments);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages)
            .vertex_input_state(&vertex_input_state)
            .input_assembly_state(&input_assembly_state)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization_state)
            .multisample_state(&multisample_state)
            .color_blend_state(&color_blend_state)
            .layout(layout.handle())
            .render_pass(render_pass.handle())
            .subpass(0);

        Pipeline::create_graphics_internal(device, &pipeline_info)
    }
}

// ============================================================================
// Pipeline state for one swapchain generation
// ============================================================================

/// Render pass, layout and pipeline built for one swapchain format and extent.
///
/// Fields drop in declaration order: pipeline, then layout, then render pass.
pub struct GraphicsPipeline {
    pipeline: Pipeline,
    _layout: PipelineLayout,
    render_pass: RenderPass,
}

impl GraphicsPipeline {
    /// Loads both shaders from the configured paths and builds the full
    /// pipeline state for `format` and `extent`.
    ///
    /// Shader modules are released before this returns, on success or failure.
    ///
    /// # Errors
    ///
    /// [`RhiError::FileAccess`], [`RhiError::ShaderModule`],
    /// [`RhiError::RenderPassCreation`], [`RhiError::PipelineLayout`] or
    /// [`RhiError::PipelineCreation`] for the step that failed.
    pub fn new(
        device: Arc<Device>,
        config: &RendererConfig,
        extent: vk::Extent2D,
        format: vk::Format,
    ) -> RhiResult<Self> {
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &config.vertex_shader_path,
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &config.fragment_shader_path,
            ShaderStage::Fragment,
        )?;

        let render_pass = RenderPass::new(device.clone(), format)?;
        let layout = PipelineLayout::new(device.clone())?;

        let pipeline = GraphicsPipelineBuilder::new()
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .extent(extent)
            .build(device, &layout, &render_pass)?;

        debug!(
            "Pipeline state ready: {:?}, {}x{}",
            format, extent.width, extent.height
        );

        Ok(Self {
            pipeline,
            _layout: layout,
            render_pass,
        })
    }

    #[inline]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    #[inline]
    pub fn render_pass(&self) -> &RenderPass {
        &self.render_pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rasterization_state() {
        let state = rasterization_state();
        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.line_width, 1.0);
        assert_eq!(state.depth_clamp_enable, vk::FALSE);
        assert_eq!(state.rasterizer_discard_enable, vk::FALSE);
        assert_eq!(state.depth_bias_enable, vk::FALSE);
    }

    #[test]
    fn test_graphics_pipeline_builder_default() {
        let builder = GraphicsPipelineBuilder::new();
        assert!(builder.vertex_shader.is_none());
        assert!(builder.fragment_shader.is_none());
        assert!(builder.vertex_bindings.is_empty());
        assert!(builder.vertex_attributes.is_empty());
        assert_eq!(builder.extent.width, 0);
        assert_eq!(builder.extent.height, 0);
    }

    #[test]
    fn test_graphics_pipeline_builder_vertex_input() {
        let builder = GraphicsPipelineBuilder::new()
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions());

        assert_eq!(builder.vertex_bindings.len(), 1);
        assert_eq!(builder.vertex_bindings[0].stride, size_of::<Vertex>() as u32);
        assert_eq!(builder.vertex_attributes.len(), 2);
        assert_eq!(builder.vertex_attributes[0].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(builder.vertex_attributes[1].format, vk::Format::R32G32B32_SFLOAT);
    }

    #[test]
    fn test_full_viewport_and_scissor() {
        let extent = vk::Extent2D {
            width: 1280,
            height: 720,
        };

        let viewport = full_viewport(extent);
        assert_eq!(viewport.x, 0.0);
        assert_eq!(viewport.y, 0.0);
        assert_eq!(viewport.width, 1280.0);
        assert_eq!(viewport.height, 720.0);
        assert_eq!(viewport.min_depth, 0.0);
        assert_eq!(viewport.max_depth, 1.0);

        let scissor = full_scissor(extent);
        assert_eq!(scissor.offset.x, 0);
        assert_eq!(scissor.offset.y, 0);
        assert_eq!(scissor.extent.width, 1280);
        assert_eq!(scissor.extent.height, 720);
    }

    #[test]
    fn test_opaque_color_blend_attachment() {
        let attachment = opaque_color_blend_attachment();
        assert_eq!(attachment.blend_enable, vk::FALSE);
        assert_eq!(attachment.color_write_mask, vk::ColorComponentFlags::RGBA);
    }
}
