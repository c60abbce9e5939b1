//! Renderer configuration.
//!
//! Window size, frames in flight and asset locations are fixed for the demo,
//! but they travel through [`RendererConfig`] instead of living as globals so
//! tests can vary them.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Number of frames whose GPU work may be in flight at once.
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

/// Configuration passed to the window and the renderer at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct RendererConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    pub frames_in_flight: usize,
    pub vertex_shader_path: PathBuf,
    pub fragment_shader_path: PathBuf,
    /// Enable `VK_LAYER_KHRONOS_validation` when the layer is installed.
    pub enable_validation: bool,
    /// Upper bound for every host-side wait on the GPU.
    pub fence_timeout: Duration,
    /// RGBA clear color for the single color attachment.
    pub clear_color: [f32; 4],
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            window_title: "Vulkan Triangle".to_string(),
            window_width: 800,
            window_height: 600,
            frames_in_flight: MAX_FRAMES_IN_FLIGHT,
            vertex_shader_path: PathBuf::from("assets/shaders/vert.spv"),
            fragment_shader_path: PathBuf::from("assets/shaders/frag.spv"),
            enable_validation: cfg!(debug_assertions),
            fence_timeout: Duration::from_secs(10),
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl RendererConfig {
    /// Check that the configuration can produce a working renderer.
    pub fn validate(&self) -> Result<()> {
        if self.window_width == 0 || self.window_height == 0 {
            return Err(Error::Config(format!(
                "window size must be non-zero, got {}x{}",
                self.window_width, self.window_height
            )));
        }
        if self.frames_in_flight == 0 {
            return Err(Error::Config(
                "frames_in_flight must be at least 1".to_string(),
            ));
        }
        if self.fence_timeout.is_zero() {
            return Err(Error::Config("fence_timeout must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Fence timeout in nanoseconds, saturating at `u64::MAX`.
    pub fn fence_timeout_ns(&self) -> u64 {
        u64::try_from(self.fence_timeout.as_nanos()).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RendererConfig::default();
        assert_eq!(config.window_width, 800);
        assert_eq!(config.window_height, 600);
        assert_eq!(config.frames_in_flight, 2);
        assert_eq!(config.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_size_rejected() {
        let config = RendererConfig {
            window_width: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_frames_rejected() {
        let config = RendererConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = RendererConfig {
            fence_timeout: Duration::ZERO,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fence_timeout_ns() {
        let config = RendererConfig {
            fence_timeout: Duration::from_millis(5),
            ..Default::default()
        };
        assert_eq!(config.fence_timeout_ns(), 5_000_000);

        let config = RendererConfig {
            fence_timeout: Duration::MAX,
            ..Default::default()
        };
        assert_eq!(config.fence_timeout_ns(), u64::MAX);
    }
}
