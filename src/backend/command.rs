// Command pool and pre-recorded draw commands
//
// The triangle never changes, so each framebuffer gets one command buffer
// recorded up front and resubmitted every frame.

use super::buffer::VertexBuffer;
use crate::error::{RendererError, RendererResult};
use ash::vk;

/// Everything a recording binds
#[derive(Debug, Clone, Copy)]
pub struct DrawTarget {
    pub render_pass: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub extent: vk::Extent2D,
    pub pipeline: vk::Pipeline,
    pub clear_color: [f32; 4],
}

pub fn create_command_pool(device: &ash::Device, queue_family: u32) -> RendererResult<vk::CommandPool> {
    let pool_info = vk::CommandPoolCreateInfo::builder().queue_family_index(queue_family);

    unsafe { device.create_command_pool(&pool_info, None) }
        .map_err(|e| RendererError::allocation("command pool", format!("{:?}", e)))
}

/// Primary command buffers, freed implicitly with the pool
pub fn allocate_command_buffers(
    device: &ash::Device,
    pool: vk::CommandPool,
    count: u32,
) -> RendererResult<Vec<vk::CommandBuffer>> {
    let alloc_info = vk::CommandBufferAllocateInfo::builder()
        .command_pool(pool)
        .level(vk::CommandBufferLevel::PRIMARY)
        .command_buffer_count(count);

    unsafe { device.allocate_command_buffers(&alloc_info) }
        .map_err(|e| RendererError::allocation("command buffers", format!("{:?}", e)))
}

/// SIMULTANEOUS_USE lets the same recording be resubmitted while an earlier
/// submission may still be pending.
pub fn begin_info_flags() -> vk::CommandBufferUsageFlags {
    vk::CommandBufferUsageFlags::SIMULTANEOUS_USE
}

/// The single color attachment is cleared to `color`
pub fn clear_values(color: [f32; 4]) -> [vk::ClearValue; 1] {
    [vk::ClearValue {
        color: vk::ClearColorValue { float32: color },
    }]
}

pub fn render_area(extent: vk::Extent2D) -> vk::Rect2D {
    vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    }
}

/// Arguments to `cmd_draw`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawArgs {
    pub vertex_count: u32,
    pub instance_count: u32,
    pub first_vertex: u32,
    pub first_instance: u32,
}

/// Every vertex in the buffer, one instance
pub fn draw_args(vertex_buffer: &VertexBuffer) -> DrawArgs {
    DrawArgs {
        vertex_count: vertex_buffer.vertex_count,
        instance_count: 1,
        first_vertex: 0,
        first_instance: 0,
    }
}

/// Binding 0 at the start of the buffer
pub fn vertex_bindings(vertex_buffer: &VertexBuffer) -> ([vk::Buffer; 1], [vk::DeviceSize; 1]) {
    ([vertex_buffer.buffer], [0])
}

/// Record one render pass drawing the whole vertex buffer.
pub fn record_frame(
    device: &ash::Device,
    command_buffer: vk::CommandBuffer,
    target: &DrawTarget,
    vertex_buffer: &VertexBuffer,
) -> RendererResult<()> {
    let begin_info = vk::CommandBufferBeginInfo::builder().flags(begin_info_flags());

    let clears = clear_values(target.clear_color);

    let render_pass_info = vk::RenderPassBeginInfo::builder()
        .render_pass(target.render_pass)
        .framebuffer(target.framebuffer)
        .render_area(render_area(target.extent))
        .clear_values(&clears);

    let (buffers, offsets) = vertex_bindings(vertex_buffer);
    let draw = draw_args(vertex_buffer);

    unsafe {
        device
            .begin_command_buffer(command_buffer, &begin_info)
            .map_err(RendererError::Recording)?;

        device.cmd_begin_render_pass(command_buffer, &render_pass_info, vk::SubpassContents::INLINE);
        device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, target.pipeline);
        device.cmd_bind_vertex_buffers(command_buffer, 0, &buffers, &offsets);
        device.cmd_draw(
            command_buffer,
            draw.vertex_count,
            draw.instance_count,
            draw.first_vertex,
            draw.first_instance,
        );
        device.cmd_end_render_pass(command_buffer);

        device
            .end_command_buffer(command_buffer)
            .map_err(RendererError::Recording)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;
    use pretty_assertions::assert_eq;

    fn triangle_buffer() -> VertexBuffer {
        VertexBuffer {
            buffer: vk::Buffer::from_raw(7),
            memory: vk::DeviceMemory::from_raw(8),
            size: 36,
            vertex_count: 3,
        }
    }

    #[test]
    fn recordings_are_resubmittable() {
        assert_eq!(begin_info_flags(), vk::CommandBufferUsageFlags::SIMULTANEOUS_USE);
    }

    #[test]
    fn one_clear_value_with_the_configured_color() {
        let values = clear_values([0.0, 0.0, 0.0, 1.0]);

        assert_eq!(values.len(), 1);
        // Reading the union field the value was written through
        assert_eq!(unsafe { values[0].color.float32 }, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn render_area_covers_the_framebuffer() {
        let extent = vk::Extent2D { width: 800, height: 600 };
        let area = render_area(extent);

        assert_eq!(area.offset, vk::Offset2D { x: 0, y: 0 });
        assert_eq!(area.extent, extent);
    }

    #[test]
    fn binds_the_vertex_buffer_at_offset_zero() {
        let vb = triangle_buffer();
        let (buffers, offsets) = vertex_bindings(&vb);

        assert_eq!(buffers, [vb.buffer]);
        assert_eq!(offsets, [0]);
    }

    #[test]
    fn draws_every_vertex_once() {
        assert_eq!(
            draw_args(&triangle_buffer()),
            DrawArgs {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }
        );
    }
}
