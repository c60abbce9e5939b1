//! RHI-specific error types.

use ash::vk;
use thiserror::Error;

/// RHI-specific error type.
///
/// Every object kind the renderer creates has its own variant so a failure
/// at startup names exactly which step went wrong.
#[derive(Error, Debug)]
pub enum RhiError {
    /// Vulkan API error without a more specific context
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    /// Failed to load Vulkan
    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    /// No adapters, or an adapter reported no formats / present modes
    #[error("Enumeration error: {0}")]
    Enumeration(String),

    /// No adapter or queue family satisfies the requirements
    #[error("No suitable GPU found: {0}")]
    Selection(String),

    /// Surface capability, format or present mode query failed
    #[error("Failed to query surface support: {0}")]
    SurfaceQuery(vk::Result),

    #[error("Failed to create logical device: {0}")]
    DeviceCreation(vk::Result),

    #[error("Failed to create swapchain: {0}")]
    SwapchainCreation(vk::Result),

    #[error("Failed to create image view: {0}")]
    ImageViewCreation(vk::Result),

    #[error("Failed to create framebuffer: {0}")]
    FramebufferCreation(vk::Result),

    /// Shader bytecode was malformed or rejected by the driver
    #[error("Failed to create shader module: {0}")]
    ShaderModule(String),

    #[error("Failed to create pipeline layout: {0}")]
    PipelineLayout(vk::Result),

    #[error("Failed to create render pass: {0}")]
    RenderPassCreation(vk::Result),

    #[error("Failed to create graphics pipeline: {0}")]
    PipelineCreation(vk::Result),

    #[error("Failed to create buffer: {0}")]
    BufferCreation(String),

    #[error("Failed to allocate device memory: {0}")]
    MemoryAllocation(vk::Result),

    /// No memory type satisfies both the type filter and the property flags
    #[error("No suitable memory type (filter {type_filter:#b}, flags {flags:?})")]
    NoSuitableMemoryType {
        type_filter: u32,
        flags: vk::MemoryPropertyFlags,
    },

    #[error("Failed to create command pool: {0}")]
    CommandPoolCreation(vk::Result),

    /// Command buffer allocation or begin/end recording failed
    #[error("Command buffer error: {0}")]
    CommandBuffer(vk::Result),

    /// Semaphore or fence creation failed
    #[error("Failed to create synchronization object: {0}")]
    SyncObjectCreation(vk::Result),

    /// Queue submit or present failed
    #[error("Submission error: {0}")]
    Submission(vk::Result),

    /// A bounded host wait on the GPU expired
    #[error("Timed out waiting for the device: {0}")]
    DeviceTimeout(String),

    #[error("Device lost")]
    DeviceLost,

    /// A required file could not be read
    #[error("File access error: {0}")]
    FileAccess(String),

    /// Surface creation error
    #[error("Surface error: {0}")]
    Surface(String),

    /// Renderer state machine was asked for an illegal transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState { from: String, to: String },
}

impl RhiError {
    /// Map a raw result from a per-frame call, keeping device loss distinct.
    pub fn from_submission(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => RhiError::DeviceLost,
            other => RhiError::Submission(other),
        }
    }
}

impl From<triangle_core::Error> for RhiError {
    fn from(err: triangle_core::Error) -> Self {
        match err {
            triangle_core::Error::Window(_) | triangle_core::Error::Surface(_) => {
                RhiError::Surface(err.to_string())
            }
            other => RhiError::FileAccess(other.to_string()),
        }
    }
}

/// Result type alias for RHI operations.
pub type RhiResult<T> = std::result::Result<T, RhiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_submission_device_lost() {
        let err = RhiError::from_submission(vk::Result::ERROR_DEVICE_LOST);
        assert!(matches!(err, RhiError::DeviceLost));
    }

    #[test]
    fn test_from_submission_other() {
        let err = RhiError::from_submission(vk::Result::ERROR_OUT_OF_HOST_MEMORY);
        assert!(matches!(
            err,
            RhiError::Submission(vk::Result::ERROR_OUT_OF_HOST_MEMORY)
        ));
    }

    #[test]
    fn test_file_error_conversion() {
        let core_err = triangle_core::read_file_to_bytes("nope/frag.spv").unwrap_err();
        let err = RhiError::from(core_err);
        match err {
            RhiError::FileAccess(msg) => assert!(msg.contains("nope/frag.spv")),
            other => panic!("expected FileAccess, got {:?}", other),
        }
    }

    #[test]
    fn test_window_error_conversion() {
        let err = RhiError::from(triangle_core::Error::Surface("no display".to_string()));
        assert!(matches!(err, RhiError::Surface(_)));
    }

    #[test]
    fn test_memory_type_message() {
        let err = RhiError::NoSuitableMemoryType {
            type_filter: 0b101,
            flags: vk::MemoryPropertyFlags::HOST_VISIBLE,
        };
        assert!(err.to_string().contains("0b101"));
    }
}
