//! Platform layer for the triangle renderer.
//!
//! This crate provides platform-specific functionality:
//! - Window management via winit
//! - Classification of window events into render-loop actions
//! - Vulkan surface creation from raw window handles

mod event;
mod window;

pub use event::{SurfaceEvent, classify_event};
pub use window::{Surface, Window};

// Re-export winit types that users might need
pub use winit::event::WindowEvent;
pub use winit::event_loop::{ActiveEventLoop, EventLoop};
