//! Triangle renderer.
//!
//! This crate orchestrates the rendering process:
//! - Vulkan object creation and teardown in dependency order
//! - Per-frame acquire, submit and present
//! - Swapchain recreation on resize or when the surface goes stale

pub mod frame;
pub mod lifecycle;
pub mod renderer;

pub use frame::{FrameCursor, FrameSynchronizer};
pub use lifecycle::{Lifecycle, RendererState};
pub use renderer::Renderer;
