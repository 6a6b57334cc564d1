// Graphics pipeline creation
//
// The graphics pipeline defines how vertices are processed and rasterized.
// Everything is baked in at creation time: one vertex stream of positions,
// a viewport covering the whole target, no depth, no blending.

use super::shader;
use crate::error::{RendererError, RendererResult};
use ash::vk;
use glam::Vec3;
use std::path::Path;

/// Render pass with one color attachment, cleared on load and left in a
/// presentable layout.
pub fn create_render_pass(device: &ash::Device, format: vk::Format) -> RendererResult<vk::RenderPass> {
    // Color attachment (the swapchain image)
    let color_attachment = vk::AttachmentDescription::builder()
        .format(format)
        .samples(vk::SampleCountFlags::TYPE_1)
        .load_op(vk::AttachmentLoadOp::CLEAR)
        .store_op(vk::AttachmentStoreOp::STORE)
        .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
        .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
        .initial_layout(vk::ImageLayout::UNDEFINED)
        .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
        .build();

    let color_attachment_ref = vk::AttachmentReference::builder()
        .attachment(0)
        .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
        .build();

    let color_attachments = &[color_attachment_ref];
    let subpass = vk::SubpassDescription::builder()
        .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
        .color_attachments(color_attachments)
        .build();

    // The image-available wait happens at COLOR_ATTACHMENT_OUTPUT, so the
    // layout transition has to wait there too.
    let dependency = vk::SubpassDependency::builder()
        .src_subpass(vk::SUBPASS_EXTERNAL)
        .dst_subpass(0)
        .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .src_access_mask(vk::AccessFlags::empty())
        .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
        .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
        .build();

    let attachments = &[color_attachment];
    let subpasses = &[subpass];
    let dependencies = &[dependency];

    let render_pass_info = vk::RenderPassCreateInfo::builder()
        .attachments(attachments)
        .subpasses(subpasses)
        .dependencies(dependencies);

    unsafe { device.create_render_pass(&render_pass_info, None) }
        .map_err(|e| RendererError::PipelineCreation(format!("render pass: {:?}", e)))
}

/// Pipeline layout with no descriptor sets and no push constants
pub fn create_pipeline_layout(device: &ash::Device) -> RendererResult<vk::PipelineLayout> {
    let layout_info = vk::PipelineLayoutCreateInfo::builder();

    unsafe { device.create_pipeline_layout(&layout_info, None) }
        .map_err(|e| RendererError::PipelineCreation(format!("pipeline layout: {:?}", e)))
}

/// One framebuffer per swapchain image view. On failure the ones already
/// created are destroyed.
pub fn create_framebuffers(
    device: &ash::Device,
    image_views: &[vk::ImageView],
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
) -> RendererResult<Vec<vk::Framebuffer>> {
    let mut framebuffers = Vec::with_capacity(image_views.len());

    for &image_view in image_views {
        let attachments = &[image_view];
        let framebuffer_info = vk::FramebufferCreateInfo::builder()
            .render_pass(render_pass)
            .attachments(attachments)
            .width(extent.width)
            .height(extent.height)
            .layers(1);

        match unsafe { device.create_framebuffer(&framebuffer_info, None) } {
            Ok(framebuffer) => framebuffers.push(framebuffer),
            Err(e) => {
                for framebuffer in framebuffers {
                    unsafe { device.destroy_framebuffer(framebuffer, None) };
                }
                return Err(RendererError::allocation("framebuffer", format!("{:?}", e)));
            }
        }
    }

    Ok(framebuffers)
}

/// Vertex input: a single binding of tightly packed `Vec3` positions
pub fn vertex_input_descriptions() -> (
    vk::VertexInputBindingDescription,
    vk::VertexInputAttributeDescription,
) {
    let binding = vk::VertexInputBindingDescription::builder()
        .binding(0)
        .stride(std::mem::size_of::<Vec3>() as u32)
        .input_rate(vk::VertexInputRate::VERTEX)
        .build();

    // Position attribute (location 0)
    let position_attr = vk::VertexInputAttributeDescription::builder()
        .binding(0)
        .location(0)
        .format(vk::Format::R32G32B32_SFLOAT)
        .offset(0)
        .build();

    (binding, position_attr)
}

/// Viewport and scissor covering the whole output extent
pub fn full_viewport(extent: vk::Extent2D) -> (vk::Viewport, vk::Rect2D) {
    let viewport = vk::Viewport {
        x: 0.0,
        y: 0.0,
        width: extent.width as f32,
        height: extent.height as f32,
        min_depth: 0.0,
        max_depth: 1.0,
    };

    let scissor = vk::Rect2D {
        offset: vk::Offset2D { x: 0, y: 0 },
        extent,
    };

    (viewport, scissor)
}

/// Rasterizer state: filled polygons, back faces culled, clockwise front
pub fn rasterization_state() -> vk::PipelineRasterizationStateCreateInfo {
    vk::PipelineRasterizationStateCreateInfo::builder()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .line_width(1.0)
        .cull_mode(vk::CullModeFlags::BACK)
        .front_face(vk::FrontFace::CLOCKWISE)
        .depth_bias_enable(false)
        .build()
}

/// Build the graphics pipeline from the two shader files.
///
/// The shader modules only live for the duration of this call: they are
/// destroyed whether or not pipeline creation succeeds.
pub fn create_graphics_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    vertex_shader: &Path,
    fragment_shader: &Path,
) -> RendererResult<vk::Pipeline> {
    let vert_module = shader::load_shader_module(device, vertex_shader).map_err(shader_failure)?;
    let frag_module = match shader::load_shader_module(device, fragment_shader) {
        Ok(module) => module,
        Err(e) => {
            unsafe { device.destroy_shader_module(vert_module, None) };
            return Err(shader_failure(e));
        }
    };

    let result = build_pipeline(device, layout, render_pass, extent, vert_module, frag_module);

    unsafe {
        device.destroy_shader_module(frag_module, None);
        device.destroy_shader_module(vert_module, None);
    }

    if result.is_ok() {
        log::info!("Graphics pipeline created");
    }
    result
}

fn shader_failure(err: RendererError) -> RendererError {
    RendererError::PipelineCreation(err.to_string())
}

fn build_pipeline(
    device: &ash::Device,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
    extent: vk::Extent2D,
    vert_shader: vk::ShaderModule,
    frag_shader: vk::ShaderModule,
) -> RendererResult<vk::Pipeline> {
    let entry_point = c"main";

    let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::VERTEX)
        .module(vert_shader)
        .name(entry_point)
        .build();

    let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
        .stage(vk::ShaderStageFlags::FRAGMENT)
        .module(frag_shader)
        .name(entry_point)
        .build();

    let shader_stages = &[vert_stage, frag_stage];

    // Vertex input
    let (binding, attribute) = vertex_input_descriptions();
    let bindings = &[binding];
    let attributes = &[attribute];
    let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder()
        .vertex_binding_descriptions(bindings)
        .vertex_attribute_descriptions(attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    let (viewport, scissor) = full_viewport(extent);
    let viewports = &[viewport];
    let scissors = &[scissor];
    let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
        .viewports(viewports)
        .scissors(scissors);

    let rasterizer = rasterization_state();

    let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    // Color blending (no blending, opaque)
    let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
        .color_write_mask(vk::ColorComponentFlags::RGBA)
        .blend_enable(false)
        .build();

    let color_blend_attachments = &[color_blend_attachment];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
        .logic_op_enable(false)
        .attachments(color_blend_attachments);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
        .stages(shader_stages)
        .vertex_input_state(&vertex_input_info)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .color_blend_state(&color_blending)
        .layout(layout)
        .render_pass(render_pass)
        .subpass(0)
        .build();

    let pipelines = unsafe {
        device.create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| RendererError::PipelineCreation(format!("{:?}", e)))?;

    pipelines
        .into_iter()
        .next()
        .ok_or_else(|| RendererError::PipelineCreation("driver returned no pipeline".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vertex_input_is_one_vec3_position() {
        let (binding, attribute) = vertex_input_descriptions();

        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 12);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);

        assert_eq!(attribute.location, 0);
        assert_eq!(attribute.binding, 0);
        assert_eq!(attribute.format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attribute.offset, 0);
    }

    #[test]
    fn viewport_matches_extent() {
        let extent = vk::Extent2D {
            width: 800,
            height: 600,
        };
        let (viewport, scissor) = full_viewport(extent);

        assert_eq!(viewport.width, 800.0);
        assert_eq!(viewport.height, 600.0);
        assert_eq!(viewport.max_depth, 1.0);
        assert_eq!(scissor.extent, extent);
        assert_eq!(scissor.offset, vk::Offset2D { x: 0, y: 0 });
    }

    #[test]
    fn rasterizer_culls_back_faces_clockwise_front() {
        let state = rasterization_state();

        assert_eq!(state.polygon_mode, vk::PolygonMode::FILL);
        assert_eq!(state.cull_mode, vk::CullModeFlags::BACK);
        assert_eq!(state.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(state.line_width, 1.0);
    }
}
