// Swapchain - Window presentation
//
// Surface + swapchain creation and the two per-frame handshakes with it:
// acquiring an image and presenting it. The swapchain lives for the whole
// process; it is never recreated.

use super::device::{Adapter, GpuInstance, LogicalDevice};
use crate::error::{RendererError, RendererResult};
use crate::platform::SurfaceProvider;
use ash::vk;

/// The creation contract consumed by the rest of the renderer
#[derive(Debug, Clone)]
pub struct SwapchainTarget {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
}

/// Result of a successful acquire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquiredImage {
    pub index: u32,
    pub suboptimal: bool,
}

/// Create a presentation surface for the window
pub fn create_surface(
    instance: &GpuInstance,
    window: &impl SurfaceProvider,
) -> RendererResult<vk::SurfaceKHR> {
    unsafe {
        ash_window::create_surface(
            &instance.entry,
            &instance.instance,
            window.raw_display_handle(),
            window.raw_window_handle(),
            None,
        )
    }
    .map_err(|e| RendererError::Init(format!("failed to create window surface: {:?}", e)))
}

/// Prefer BGRA8 sRGB, otherwise whatever the surface lists first
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .find(|f| {
            f.format == vk::Format::B8G8R8A8_SRGB
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Use the preferred mode when supported. FIFO is always available.
pub fn choose_present_mode(
    available: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if available.contains(&preferred) {
        preferred
    } else {
        vk::PresentModeKHR::FIFO
    }
}

pub fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, width: u32, height: u32) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: width.clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: height.clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// One more than the minimum, capped when the surface has a maximum
pub fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let image_count = caps.min_image_count + 1;
    if caps.max_image_count > 0 && image_count > caps.max_image_count {
        caps.max_image_count
    } else {
        image_count
    }
}

pub fn create_swapchain(
    instance: &GpuInstance,
    adapter: &Adapter,
    device: &LogicalDevice,
    surface: vk::SurfaceKHR,
    (width, height): (u32, u32),
    preferred_present_mode: vk::PresentModeKHR,
) -> RendererResult<(vk::SwapchainKHR, SwapchainTarget)> {
    let init_err = |what: &str, e: vk::Result| RendererError::Init(format!("{}: {:?}", what, e));
    let loader = &instance.surface_loader;
    let physical_device = adapter.physical_device;

    let surface_caps = unsafe {
        loader.get_physical_device_surface_capabilities(physical_device, surface)
    }
    .map_err(|e| init_err("surface capabilities", e))?;
    let formats = unsafe { loader.get_physical_device_surface_formats(physical_device, surface) }
        .map_err(|e| init_err("surface formats", e))?;
    let present_modes = unsafe {
        loader.get_physical_device_surface_present_modes(physical_device, surface)
    }
    .map_err(|e| init_err("surface present modes", e))?;

    let surface_format = choose_surface_format(&formats)
        .ok_or_else(|| RendererError::Init("surface reports no formats".into()))?;
    let present_mode = choose_present_mode(&present_modes, preferred_present_mode);
    let extent = choose_extent(&surface_caps, width, height);
    let image_count = choose_image_count(&surface_caps);

    let families = adapter.queue_families;
    let family_indices = [families.graphics, families.present];
    let (sharing_mode, shared_families): (_, &[u32]) = if families.graphics == families.present {
        (vk::SharingMode::EXCLUSIVE, &[])
    } else {
        (vk::SharingMode::CONCURRENT, &family_indices)
    };

    let create_info = vk::SwapchainCreateInfoKHR::builder()
        .surface(surface)
        .min_image_count(image_count)
        .image_format(surface_format.format)
        .image_color_space(surface_format.color_space)
        .image_extent(extent)
        .image_array_layers(1)
        .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
        .image_sharing_mode(sharing_mode)
        .queue_family_indices(shared_families)
        .pre_transform(surface_caps.current_transform)
        .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
        .present_mode(present_mode)
        .clipped(true);

    let swapchain = unsafe { device.swapchain_loader.create_swapchain(&create_info, None) }
        .map_err(|e| init_err("swapchain creation", e))?;

    let images = match unsafe { device.swapchain_loader.get_swapchain_images(swapchain) } {
        Ok(images) => images,
        Err(e) => {
            unsafe { device.swapchain_loader.destroy_swapchain(swapchain, None) };
            return Err(init_err("swapchain images", e));
        }
    };

    log::info!(
        "Created swapchain: {}x{} {:?}, {} images, {:?}",
        extent.width,
        extent.height,
        surface_format.format,
        images.len(),
        present_mode
    );

    Ok((
        swapchain,
        SwapchainTarget {
            format: surface_format.format,
            extent,
            images,
        },
    ))
}

/// One color view per swapchain image. On failure the ones already
/// created are destroyed.
pub fn create_image_views(
    device: &ash::Device,
    target: &SwapchainTarget,
) -> RendererResult<Vec<vk::ImageView>> {
    let mut views = Vec::with_capacity(target.images.len());

    for &image in &target.images {
        let create_info = vk::ImageViewCreateInfo::builder()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(target.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::IDENTITY,
                g: vk::ComponentSwizzle::IDENTITY,
                b: vk::ComponentSwizzle::IDENTITY,
                a: vk::ComponentSwizzle::IDENTITY,
            })
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: 1,
            });

        match unsafe { device.create_image_view(&create_info, None) } {
            Ok(view) => views.push(view),
            Err(e) => {
                for view in views {
                    unsafe { device.destroy_image_view(view, None) };
                }
                return Err(RendererError::allocation("swapchain image view", format!("{:?}", e)));
            }
        }
    }

    Ok(views)
}

/// Acquire the next image, signaling `semaphore` once it is usable
pub fn acquire_next_image(
    device: &LogicalDevice,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
) -> Result<AcquiredImage, vk::Result> {
    let (index, suboptimal) = unsafe {
        device
            .swapchain_loader
            .acquire_next_image(swapchain, timeout, semaphore, vk::Fence::null())
    }?;

    Ok(AcquiredImage { index, suboptimal })
}

/// Queue `image_index` for presentation once `wait_semaphores` signal.
/// Returns whether the swapchain reported itself suboptimal.
pub fn present(
    device: &LogicalDevice,
    swapchain: vk::SwapchainKHR,
    image_index: u32,
    wait_semaphores: &[vk::Semaphore],
) -> Result<bool, vk::Result> {
    let swapchains = [swapchain];
    let image_indices = [image_index];

    let present_info = vk::PresentInfoKHR::builder()
        .wait_semaphores(wait_semaphores)
        .swapchains(&swapchains)
        .image_indices(&image_indices);

    unsafe {
        device
            .swapchain_loader
            .queue_present(device.present_queue, &present_info)
    }
}
