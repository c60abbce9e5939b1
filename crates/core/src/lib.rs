//! Core utilities for the triangle renderer.
//!
//! This crate provides foundational types shared by every other crate:
//! - Error types and result aliases
//! - Logging initialization
//! - Renderer configuration
//! - Byte-buffer file reading

mod config;
mod error;
mod fileio;
mod logging;

pub use config::{MAX_FRAMES_IN_FLIGHT, RendererConfig};
pub use error::{Error, Result};
pub use fileio::read_file_to_bytes;
pub use logging::init_logging;
