//! Vulkan abstraction layer (Render Hardware Interface).
//!
//! This crate wraps the Vulkan objects needed to put a triangle on screen
//! using the `ash` crate. It handles:
//! - Instance, physical device selection and logical device creation
//! - Swapchain management and recreation
//! - Render pass, pipeline and framebuffer creation
//! - Vertex buffer upload and command buffer recording
//! - Synchronization primitives
//!
//! Each wrapper owns its Vulkan handle and releases it on drop.

mod error;

pub mod buffer;
pub mod command;
pub mod device;
pub mod framebuffer;
pub mod instance;
pub mod physical_device;
pub mod pipeline;
pub mod render_pass;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod vertex;

pub use error::{RhiError, RhiResult};

// Re-export ash types that users might need
pub use ash::vk;
