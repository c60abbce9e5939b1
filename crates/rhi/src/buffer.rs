//! Host-visible vertex buffer.
//!
//! The vertex list is tiny and written once, so the buffer lives in
//! HOST_VISIBLE | HOST_COHERENT memory and is filled through a plain
//! map / copy / unmap. No staging upload and no flush are needed.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use triangle_rhi::device::Device;
//! use triangle_rhi::buffer::VertexBuffer;
//! use triangle_rhi::vertex::TRIANGLE_VERTICES;
//!
//! # fn example(device: Arc<Device>) -> Result<(), triangle_rhi::RhiError> {
//! let vertex_buffer = VertexBuffer::new(device, &TRIANGLE_VERTICES)?;
//! assert_eq!(vertex_buffer.vertex_count(), 3);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ash::vk;
use bytemuck::Zeroable;
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::physical_device::find_memory_type;
use crate::vertex::Vertex;

/// Memory properties required for a CPU-written vertex buffer.
pub const VERTEX_MEMORY_FLAGS: vk::MemoryPropertyFlags = vk::MemoryPropertyFlags::from_raw(
    vk::MemoryPropertyFlags::HOST_VISIBLE.as_raw() | vk::MemoryPropertyFlags::HOST_COHERENT.as_raw(),
);

/// Size in bytes of a buffer holding `count` vertices.
#[inline]
pub fn vertex_buffer_size(count: usize) -> vk::DeviceSize {
    (size_of::<Vertex>() * count) as vk::DeviceSize
}

/// Memory type index for a buffer with the given requirements.
///
/// # Errors
///
/// [`RhiError::NoSuitableMemoryType`] when none of the types allowed by
/// `requirements.memory_type_bits` is host visible and coherent.
pub fn select_vertex_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    requirements: &vk::MemoryRequirements,
) -> RhiResult<u32> {
    find_memory_type(
        memory_properties,
        requirements.memory_type_bits,
        VERTEX_MEMORY_FLAGS,
    )
}

/// Vertex buffer with its own device memory allocation.
///
/// Created once and kept across swapchain recreation.
pub struct VertexBuffer {
    device: Arc<Device>,
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: vk::DeviceSize,
    vertex_count: u32,
}

impl VertexBuffer {
    /// Creates the buffer, allocates and binds memory, and copies `vertices` in.
    ///
    /// # Errors
    ///
    /// - [`RhiError::BufferCreation`] if `vertices` is empty or the buffer is rejected
    /// - [`RhiError::NoSuitableMemoryType`] if no memory type is host visible and coherent
    /// - [`RhiError::MemoryAllocation`] if allocation, binding or mapping fails
    pub fn new(device: Arc<Device>, vertices: &[Vertex]) -> RhiResult<Self> {
        if vertices.is_empty() {
            return Err(RhiError::BufferCreation(
                "vertex list must not be empty".to_string(),
            ));
        }

        let size = vertex_buffer_size(vertices.len());

        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = unsafe {
            device
                .handle()
                .create_buffer(&buffer_info, None)
                .map_err(|e| RhiError::BufferCreation(e.to_string()))?
        };

        // From here on Drop releases whatever has been created
        let mut vertex_buffer = Self {
            device,
            buffer,
            memory: vk::DeviceMemory::null(),
            size,
            vertex_count: vertices.len() as u32,
        };

        let handle = vertex_buffer.device.handle();
        let requirements = unsafe { handle.get_buffer_memory_requirements(buffer) };
        let memory_type_index =
            select_vertex_memory_type(vertex_buffer.device.memory_properties(), &requirements)?;

        let alloc_info = vk::MemoryAllocateInfo::default()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index);

        vertex_buffer.memory = unsafe {
            handle
                .allocate_memory(&alloc_info, None)
                .map_err(RhiError::MemoryAllocation)?
        };

        unsafe {
            handle
                .bind_buffer_memory(buffer, vertex_buffer.memory, 0)
                .map_err(RhiError::MemoryAllocation)?;
        }

        vertex_buffer.write(vertices)?;

        debug!(
            "Created vertex buffer: {} vertices, {} bytes (memory type {})",
            vertices.len(),
            size,
            memory_type_index
        );

        Ok(vertex_buffer)
    }

    /// Maps the whole allocation, copies `vertices` in, and unmaps.
    fn write(&self, vertices: &[Vertex]) -> RhiResult<()> {
        let bytes: &[u8] = bytemuck::cast_slice(vertices);
        let handle = self.device.handle();

        unsafe {
            let ptr = handle
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(RhiError::MemoryAllocation)?;
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.cast::<u8>(), bytes.len());
            handle.unmap_memory(self.memory);
        }

        Ok(())
    }

    /// Copies the buffer contents back to the host.
    pub fn read_back(&self) -> RhiResult<Vec<Vertex>> {
        let mut vertices = vec![Vertex::zeroed(); self.vertex_count as usize];
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut vertices);
        let handle = self.device.handle();

        unsafe {
            let ptr = handle
                .map_memory(self.memory, 0, self.size, vk::MemoryMapFlags::empty())
                .map_err(RhiError::MemoryAllocation)?;
            std::ptr::copy_nonoverlapping(ptr.cast::<u8>(), bytes.as_mut_ptr(), bytes.len());
            handle.unmap_memory(self.memory);
        }

        Ok(vertices)
    }

    #[inline]
    pub fn handle(&self) -> vk::Buffer {
        self.buffer
    }

    /// Number of vertices to draw.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        unsafe {
            self.device.handle().destroy_buffer(self.buffer, None);
            if self.memory != vk::DeviceMemory::null() {
                self.device.handle().free_memory(self.memory, None);
            }
        }
        debug!("Destroyed vertex buffer");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vertex::TRIANGLE_VERTICES;

    fn memory_properties(types: &[vk::MemoryPropertyFlags]) -> vk::PhysicalDeviceMemoryProperties {
        let mut props = vk::PhysicalDeviceMemoryProperties {
            memory_type_count: types.len() as u32,
            ..Default::default()
        };
        for (i, flags) in types.iter().enumerate() {
            props.memory_types[i].property_flags = *flags;
        }
        props
    }

    #[test]
    fn test_vertex_buffer_size() {
        assert_eq!(vertex_buffer_size(TRIANGLE_VERTICES.len()), 60);
        assert_eq!(vertex_buffer_size(2), 40);
    }

    #[test]
    fn test_vertex_memory_flags() {
        assert!(VERTEX_MEMORY_FLAGS.contains(vk::MemoryPropertyFlags::HOST_VISIBLE));
        assert!(VERTEX_MEMORY_FLAGS.contains(vk::MemoryPropertyFlags::HOST_COHERENT));
        assert!(!VERTEX_MEMORY_FLAGS.contains(vk::MemoryPropertyFlags::DEVICE_LOCAL));
    }

    #[test]
    fn test_select_memory_type_requires_coherent() {
        let props = memory_properties(&[
            vk::MemoryPropertyFlags::HOST_VISIBLE,
            vk::MemoryPropertyFlags::DEVICE_LOCAL
                | vk::MemoryPropertyFlags::HOST_VISIBLE
                | vk::MemoryPropertyFlags::HOST_COHERENT,
        ]);
        let requirements = vk::MemoryRequirements {
            size: 64,
            alignment: 16,
            memory_type_bits: 0b11,
        };

        assert_eq!(select_vertex_memory_type(&props, &requirements).unwrap(), 1);
    }
}
