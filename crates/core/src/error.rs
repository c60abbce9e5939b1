//! Error types for the renderer.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the non-GPU parts of the renderer.
#[derive(Error, Debug)]
pub enum Error {
    /// A file could not be opened or read
    #[error("Failed to open file {}: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Window creation or management errors
    #[error("Window error: {0}")]
    Window(String),

    /// Vulkan surface creation for a window failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(String),
}

/// Result type alias using the renderer's Error type.
pub type Result<T> = std::result::Result<T, Error>;
