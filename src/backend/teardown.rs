// Teardown sequencer
//
// All destroyable GPU handles live in `GpuHandles`. Teardown walks them in
// reverse dependency order, skips anything never created, and nulls each
// handle as it goes, so a second run is a no-op and a half-initialized
// context tears down exactly what exists.

use super::buffer::VertexBuffer;
use super::device::{GpuInstance, LogicalDevice};
use super::sync::FrameSync;
use ash::vk::{self, Handle};

/// Every GPU object the renderer owns. Null means "not created".
#[derive(Debug, Default)]
pub struct GpuHandles {
    pub instance: vk::Instance,
    pub debug_messenger: vk::DebugUtilsMessengerEXT,
    pub surface: vk::SurfaceKHR,
    pub device: vk::Device,
    pub swapchain: vk::SwapchainKHR,
    pub image_views: Vec<vk::ImageView>,
    pub render_pass: vk::RenderPass,
    pub pipeline_layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub framebuffers: Vec<vk::Framebuffer>,
    pub vertex_buffer: VertexBuffer,
    pub command_pool: vk::CommandPool,
    pub sync: FrameSync,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpuObject {
    Pipeline(vk::Pipeline),
    PipelineLayout(vk::PipelineLayout),
    Framebuffer(vk::Framebuffer),
    RenderPass(vk::RenderPass),
    Semaphore(vk::Semaphore),
    Fence(vk::Fence),
    Buffer(vk::Buffer),
    Memory(vk::DeviceMemory),
    CommandPool(vk::CommandPool),
    ImageView(vk::ImageView),
    Swapchain(vk::SwapchainKHR),
    Device(vk::Device),
    Surface(vk::SurfaceKHR),
    DebugMessenger(vk::DebugUtilsMessengerEXT),
    Instance(vk::Instance),
}

/// Receives each live object exactly once, in destruction order
pub trait Destroyer {
    fn destroy(&mut self, object: GpuObject);
}

/// Take the handle out of its slot if it is live
fn take<H: Handle + Default + Copy>(slot: &mut H) -> Option<H> {
    let handle = std::mem::take(slot);
    (handle.as_raw() != 0).then_some(handle)
}

/// Destroy everything in `handles`. Returns how many objects were destroyed.
pub fn teardown(handles: &mut GpuHandles, destroyer: &mut impl Destroyer) -> usize {
    let mut order = Vec::new();

    // Pipeline objects: pipeline before what it references
    order.extend(take(&mut handles.pipeline).map(GpuObject::Pipeline));
    order.extend(take(&mut handles.pipeline_layout).map(GpuObject::PipelineLayout));
    order.extend(
        std::mem::take(&mut handles.framebuffers)
            .into_iter()
            .filter_map(|mut fb| take(&mut fb))
            .map(GpuObject::Framebuffer),
    );
    order.extend(take(&mut handles.render_pass).map(GpuObject::RenderPass));

    // Frame sync set
    order.extend(take(&mut handles.sync.image_available).map(GpuObject::Semaphore));
    order.extend(take(&mut handles.sync.render_finished).map(GpuObject::Semaphore));
    order.extend(take(&mut handles.sync.in_flight_fence).map(GpuObject::Fence));

    // Vertex buffer, buffer first
    order.extend(take(&mut handles.vertex_buffer.buffer).map(GpuObject::Buffer));
    order.extend(take(&mut handles.vertex_buffer.memory).map(GpuObject::Memory));
    handles.vertex_buffer = VertexBuffer::default();

    // Frees the command buffers with it
    order.extend(take(&mut handles.command_pool).map(GpuObject::CommandPool));

    // Presentation targets
    order.extend(
        std::mem::take(&mut handles.image_views)
            .into_iter()
            .filter_map(|mut view| take(&mut view))
            .map(GpuObject::ImageView),
    );
    order.extend(take(&mut handles.swapchain).map(GpuObject::Swapchain));

    // Device-level objects are all gone now
    order.extend(take(&mut handles.device).map(GpuObject::Device));

    // Instance-level
    order.extend(take(&mut handles.surface).map(GpuObject::Surface));
    order.extend(take(&mut handles.debug_messenger).map(GpuObject::DebugMessenger));
    order.extend(take(&mut handles.instance).map(GpuObject::Instance));

    let count = order.len();
    for object in order {
        log::trace!("Destroying {:?}", object);
        destroyer.destroy(object);
    }
    count
}

/// Destroys objects through the live ash function tables
pub struct VulkanDestroyer<'a> {
    pub instance: Option<&'a GpuInstance>,
    pub device: Option<&'a LogicalDevice>,
}

impl VulkanDestroyer<'_> {
    fn destroy_device_object(&self, object: GpuObject) -> bool {
        let Some(device) = self.device else {
            return false;
        };
        let fns = &device.device;

        unsafe {
            match object {
                GpuObject::Pipeline(h) => fns.destroy_pipeline(h, None),
                GpuObject::PipelineLayout(h) => fns.destroy_pipeline_layout(h, None),
                GpuObject::Framebuffer(h) => fns.destroy_framebuffer(h, None),
                GpuObject::RenderPass(h) => fns.destroy_render_pass(h, None),
                GpuObject::Semaphore(h) => fns.destroy_semaphore(h, None),
                GpuObject::Fence(h) => fns.destroy_fence(h, None),
                GpuObject::Buffer(h) => fns.destroy_buffer(h, None),
                GpuObject::Memory(h) => fns.free_memory(h, None),
                GpuObject::CommandPool(h) => fns.destroy_command_pool(h, None),
                GpuObject::ImageView(h) => fns.destroy_image_view(h, None),
                GpuObject::Swapchain(h) => device.swapchain_loader.destroy_swapchain(h, None),
                GpuObject::Device(_) => fns.destroy_device(None),
                _ => return false,
            }
        }
        true
    }

    fn destroy_instance_object(&self, object: GpuObject) -> bool {
        let Some(instance) = self.instance else {
            return false;
        };

        unsafe {
            match object {
                GpuObject::Surface(h) => instance.surface_loader.destroy_surface(h, None),
                GpuObject::DebugMessenger(h) => match instance.debug_utils.as_ref() {
                    Some(debug_utils) => debug_utils.destroy_debug_utils_messenger(h, None),
                    None => return false,
                },
                GpuObject::Instance(_) => instance.instance.destroy_instance(None),
                _ => return false,
            }
        }
        true
    }
}

impl Destroyer for VulkanDestroyer<'_> {
    fn destroy(&mut self, object: GpuObject) {
        let destroyed = match object {
            GpuObject::Surface(_) | GpuObject::DebugMessenger(_) | GpuObject::Instance(_) => {
                self.destroy_instance_object(object)
            }
            _ => self.destroy_device_object(object),
        };

        if !destroyed {
            log::warn!("No live owner to destroy {:?}, skipping", object);
        }
    }
}
