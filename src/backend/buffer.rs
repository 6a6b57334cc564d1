// Vertex buffer allocation
//
// Creates a buffer, allocates memory for it and binds the two together.
// The memory is host visible and coherent so the vertices are written
// through a plain map/copy/unmap, no staging buffer involved.

use crate::error::{RendererError, RendererResult};
use ash::vk;
use glam::Vec3;

/// Buffer handle plus its backing memory. Destroyed together, buffer first.
#[derive(Debug, Default, Clone, Copy)]
pub struct VertexBuffer {
    pub buffer: vk::Buffer,
    pub memory: vk::DeviceMemory,
    pub size: vk::DeviceSize,
    pub vertex_count: u32,
}

impl VertexBuffer {
    /// Describe `vertices` living in `buffer` / `memory`
    pub fn new(buffer: vk::Buffer, memory: vk::DeviceMemory, vertices: &[Vec3]) -> Self {
        Self {
            buffer,
            memory,
            size: vertex_data_size(vertices),
            vertex_count: vertices.len() as u32,
        }
    }
}

/// Byte size of the vertex data
pub fn vertex_data_size(vertices: &[Vec3]) -> vk::DeviceSize {
    (std::mem::size_of::<Vec3>() * vertices.len()) as vk::DeviceSize
}

/// Find a memory type allowed by `type_filter` with all of `properties`
pub fn find_memory_type(
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    type_filter: u32,
    properties: vk::MemoryPropertyFlags,
) -> Option<u32> {
    (0..memory_properties.memory_type_count).find(|&i| {
        let has_type = (type_filter & (1 << i)) != 0;
        let has_properties = memory_properties.memory_types[i as usize]
            .property_flags
            .contains(properties);

        has_type && has_properties
    })
}

/// Create the vertex buffer and upload `vertices` into it.
///
/// Either everything succeeds or nothing is left allocated.
pub fn create_vertex_buffer(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    vertices: &[Vec3],
) -> RendererResult<VertexBuffer> {
    if vertices.is_empty() {
        return Err(RendererError::allocation("vertex buffer", "no vertex data"));
    }

    let size = vertex_data_size(vertices);

    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(vk::BufferUsageFlags::VERTEX_BUFFER)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);

    let buffer = unsafe { device.create_buffer(&buffer_info, None) }
        .map_err(|e| RendererError::allocation("vertex buffer", format!("{:?}", e)))?;

    let memory = match allocate_and_fill(device, memory_properties, buffer, vertices) {
        Ok(memory) => memory,
        Err(e) => {
            unsafe { device.destroy_buffer(buffer, None) };
            return Err(e);
        }
    };

    let vertex_buffer = VertexBuffer::new(buffer, memory, vertices);
    log::info!(
        "Vertex buffer created: {} vertices, {} bytes",
        vertex_buffer.vertex_count,
        vertex_buffer.size
    );

    Ok(vertex_buffer)
}

fn allocate_and_fill(
    device: &ash::Device,
    memory_properties: &vk::PhysicalDeviceMemoryProperties,
    buffer: vk::Buffer,
    vertices: &[Vec3],
) -> RendererResult<vk::DeviceMemory> {
    let mem_requirements = unsafe { device.get_buffer_memory_requirements(buffer) };

    let memory_type_index = find_memory_type(
        memory_properties,
        mem_requirements.memory_type_bits,
        vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT,
    )
    .ok_or_else(|| {
        RendererError::allocation("vertex buffer memory", "no host-visible coherent memory type")
    })?;

    let alloc_info = vk::MemoryAllocateInfo::builder()
        .allocation_size(mem_requirements.size)
        .memory_type_index(memory_type_index);

    let memory = unsafe { device.allocate_memory(&alloc_info, None) }
        .map_err(|e| RendererError::allocation("vertex buffer memory", format!("{:?}", e)))?;

    let bytes: &[u8] = bytemuck::cast_slice(vertices);
    let upload = unsafe {
        device
            .bind_buffer_memory(buffer, memory, 0)
            .and_then(|_| {
                device.map_memory(memory, 0, bytes.len() as vk::DeviceSize, vk::MemoryMapFlags::empty())
            })
            .map(|ptr| {
                std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr as *mut u8, bytes.len());
                device.unmap_memory(memory);
            })
    };

    match upload {
        Ok(()) => Ok(memory),
        Err(e) => {
            unsafe { device.free_memory(memory, None) };
            Err(RendererError::allocation("vertex buffer binding", format!("{:?}", e)))
        }
    }
}
