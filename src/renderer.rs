// Renderer - the owning GPU context
//
// Every Vulkan object the process creates is owned here. Initialization
// records each handle in `GpuHandles` the moment it exists, and `Drop`
// hands whatever exists to the teardown sequencer. An error anywhere in
// `new` therefore unwinds exactly the objects created so far.
//
// INIT ORDER:
// instance -> messenger -> surface -> adapter -> device -> swapchain
//   -> image views -> render pass -> layout -> pipeline -> framebuffers
//   -> vertex buffer -> command pool + recordings -> frame sync set

use crate::backend::buffer;
use crate::backend::command::{self, DrawTarget};
use crate::backend::device::{self, Adapter, GpuInstance, LogicalDevice};
use crate::backend::frame::{FrameReport, FrameSynchronizer, VulkanFrame};
use crate::backend::pipeline;
use crate::backend::swapchain::{self, SwapchainTarget};
use crate::backend::sync::FrameSync;
use crate::backend::teardown::{self, GpuHandles, VulkanDestroyer};
use crate::config::Config;
use crate::error::{RendererError, RendererResult};
use crate::platform::SurfaceProvider;
use ash::vk;
use glam::Vec3;

/// Counter-clockwise in clip space, which is front-facing under the
/// pipeline's CLOCKWISE front face once Vulkan's Y-down flip applies
pub const TRIANGLE: [Vec3; 3] = [
    Vec3::new(0.0, 0.5, 0.0),
    Vec3::new(-0.5, -0.5, 0.0),
    Vec3::new(0.5, -0.5, 0.0),
];

#[derive(Default)]
pub struct Renderer {
    // Function tables; the handles themselves are owned by `handles`
    instance: Option<GpuInstance>,
    adapter: Option<Adapter>,
    device: Option<LogicalDevice>,

    handles: GpuHandles,
    target: Option<SwapchainTarget>,
    /// One per framebuffer, freed with the command pool
    command_buffers: Vec<vk::CommandBuffer>,
    frames: FrameSynchronizer,
}

impl Renderer {
    /// Bring up the whole context for `window`.
    ///
    /// On error the partially built context is dropped before returning,
    /// which destroys everything created up to the failing step.
    pub fn new(config: &Config, window: &impl SurfaceProvider) -> RendererResult<Self> {
        let mut renderer = Self::default();
        renderer.init(config, window)?;
        log::info!("Renderer ready");
        Ok(renderer)
    }

    fn init(&mut self, config: &Config, window: &impl SurfaceProvider) -> RendererResult<()> {
        // STEP 1: instance + validation
        let surface_extensions =
            ash_window::enumerate_required_extensions(window.raw_display_handle()).map_err(|e| {
                RendererError::Init(format!("window system has no Vulkan surface support: {:?}", e))
            })?;

        let instance = self.instance.insert(device::create_instance(
            &config.window.title,
            config.validation_requested(),
            surface_extensions,
        )?);
        self.handles.instance = instance.instance.handle();
        log::info!(
            "Validation layers {}",
            if instance.validation_enabled { "enabled" } else { "disabled" }
        );

        self.handles.debug_messenger = device::setup_debug_messenger(instance)?;

        // STEP 2: surface, adapter, device
        self.handles.surface = swapchain::create_surface(instance, window)?;
        let adapter = self
            .adapter
            .insert(device::select_adapter(instance, self.handles.surface)?);
        let api_version = adapter.properties.api_version;
        log::info!(
            "Adapter supports Vulkan {}.{}.{}",
            vk::api_version_major(api_version),
            vk::api_version_minor(api_version),
            vk::api_version_patch(api_version)
        );

        let device = self
            .device
            .insert(device::create_logical_device(instance, adapter)?);
        self.handles.device = device.device.handle();

        // STEP 3: presentation targets
        let (swapchain_handle, target) = swapchain::create_swapchain(
            instance,
            adapter,
            device,
            self.handles.surface,
            window.extent(),
            config.present_mode(),
        )?;
        self.handles.swapchain = swapchain_handle;
        let target = self.target.insert(target);
        self.handles.image_views = swapchain::create_image_views(&device.device, target)?;

        // STEP 4: pipeline
        self.handles.render_pass = pipeline::create_render_pass(&device.device, target.format)?;
        self.handles.pipeline_layout = pipeline::create_pipeline_layout(&device.device)?;
        self.handles.pipeline = pipeline::create_graphics_pipeline(
            &device.device,
            self.handles.pipeline_layout,
            self.handles.render_pass,
            target.extent,
            &config.graphics.vertex_shader,
            &config.graphics.fragment_shader,
        )?;
        self.handles.framebuffers = pipeline::create_framebuffers(
            &device.device,
            &self.handles.image_views,
            self.handles.render_pass,
            target.extent,
        )?;

        // STEP 5: geometry
        self.handles.vertex_buffer =
            buffer::create_vertex_buffer(&device.device, &adapter.memory_properties, &TRIANGLE)?;

        // STEP 6: one recording per framebuffer
        self.handles.command_pool =
            command::create_command_pool(&device.device, adapter.queue_families.graphics)?;
        self.command_buffers = command::allocate_command_buffers(
            &device.device,
            self.handles.command_pool,
            self.handles.framebuffers.len() as u32,
        )?;
        for (&command_buffer, &framebuffer) in
            self.command_buffers.iter().zip(&self.handles.framebuffers)
        {
            let draw_target = DrawTarget {
                render_pass: self.handles.render_pass,
                framebuffer,
                extent: target.extent,
                pipeline: self.handles.pipeline,
                clear_color: config.graphics.clear_color,
            };
            command::record_frame(
                &device.device,
                command_buffer,
                &draw_target,
                &self.handles.vertex_buffer,
            )?;
        }
        log::info!("Recorded {} command buffers", self.command_buffers.len());

        // STEP 7: frame sync set, fence starts signaled
        self.handles.sync = FrameSync::new(&device.device)?;

        Ok(())
    }

    /// Run one iteration of the frame protocol
    pub fn draw_frame(&mut self) -> RendererResult<FrameReport> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| RendererError::Init("renderer has no device".into()))?;

        let mut frame = VulkanFrame {
            device,
            swapchain: self.handles.swapchain,
            sync: &self.handles.sync,
            command_buffers: &self.command_buffers,
        };

        self.frames.draw_frame(&mut frame)
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames.frames_drawn()
    }

    pub fn adapter_name(&self) -> Option<&str> {
        self.adapter.as_ref().map(|a| a.name.as_str())
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Idle, not a fence wait: after a failed acquire the fence is reset
        // with nothing submitted and would never signal
        if let Some(device) = &self.device {
            if let Err(e) = unsafe { device.device.device_wait_idle() } {
                log::warn!("device_wait_idle failed during shutdown: {:?}", e);
            }
        }

        let mut destroyer = VulkanDestroyer {
            instance: self.instance.as_ref(),
            device: self.device.as_ref(),
        };
        let destroyed = teardown::teardown(&mut self.handles, &mut destroyer);
        self.command_buffers.clear();

        if destroyed > 0 {
            log::info!(
                "Teardown complete: {} objects destroyed after {} frames ({} present failures)",
                destroyed,
                self.frames.frames_drawn(),
                self.frames.present_failures()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triangle_is_three_vertices_in_clip_space() {
        assert_eq!(TRIANGLE.len(), 3);
        assert_eq!(buffer::vertex_data_size(&TRIANGLE), 36);
        assert!(TRIANGLE
            .iter()
            .all(|v| v.x.abs() <= 1.0 && v.y.abs() <= 1.0 && v.z == 0.0));
    }

    #[test]
    fn triangle_winding_is_counter_clockwise() {
        let [a, b, c] = TRIANGLE;
        let signed_area = (b - a).truncate().perp_dot((c - a).truncate());
        assert!(signed_area > 0.0);
    }

    #[test]
    fn empty_renderer_drops_without_gpu() {
        let renderer = Renderer::default();
        assert_eq!(renderer.frames_drawn(), 0);
        assert!(renderer.adapter_name().is_none());
        drop(renderer);
    }

    #[test]
    fn draw_without_device_is_an_error() {
        let mut renderer = Renderer::default();
        assert!(matches!(renderer.draw_frame(), Err(RendererError::Init(_))));
    }
}
