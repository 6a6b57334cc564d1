// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation, with validation layers when the loader has them
// - Debug messenger (purely observational)
// - Physical device selection (first adapter that can draw and present)
// - Logical device + queue creation
//
// Nothing here owns a Drop impl. Every handle created in this module is
// recorded in `GpuHandles` and released by the teardown sequencer.

use crate::error::{RendererError, RendererResult};
use ash::extensions::{ext::DebugUtils, khr};
use ash::{vk, Entry};
use std::ffi::{c_char, CStr, CString};

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Loaded Vulkan library plus the instance-level function tables.
pub struct GpuInstance {
    pub entry: Entry,
    pub instance: ash::Instance,
    pub surface_loader: khr::Surface,
    /// Present only when the debug utils extension was enabled
    pub debug_utils: Option<DebugUtils>,
    pub validation_enabled: bool,
}

/// Capabilities of a single queue family on an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyCaps {
    pub index: u32,
    pub graphics: bool,
    pub present: bool,
}

/// Queue families chosen for rendering and presentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilies {
    pub graphics: u32,
    pub present: u32,
}

impl QueueFamilies {
    /// Distinct family indices, one queue is requested per entry.
    pub fn unique(&self) -> Vec<u32> {
        if self.graphics == self.present {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }
}

/// What adapter selection needs to know about one enumerated GPU
#[derive(Debug, Clone)]
pub struct AdapterCandidate {
    pub name: String,
    pub families: Vec<QueueFamilyCaps>,
}

/// The selected physical device. Immutable once chosen.
#[derive(Clone)]
pub struct Adapter {
    pub physical_device: vk::PhysicalDevice,
    pub name: String,
    pub queue_families: QueueFamilies,
    pub properties: vk::PhysicalDeviceProperties,
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
}

/// Logical device with its queues
pub struct LogicalDevice {
    pub device: ash::Device,
    pub graphics_queue: vk::Queue,
    pub present_queue: vk::Queue,
    pub swapchain_loader: khr::Swapchain,
}

// =============================================================================
// INSTANCE
// =============================================================================

/// Layers to enable. A missing validation layer is not an error.
pub fn resolve_validation_layers(requested: bool, available: &[&CStr]) -> Vec<&'static CStr> {
    if !requested {
        return Vec::new();
    }

    if available.contains(&VALIDATION_LAYER) {
        log::info!("Validation layers supported!");
        vec![VALIDATION_LAYER]
    } else {
        log::warn!(
            "Validation layer {:?} not available, continuing without it",
            VALIDATION_LAYER
        );
        Vec::new()
    }
}

/// Instance extension set: every required (surface) extension must be
/// available. Debug utils is appended only when wanted and present.
pub fn resolve_instance_extensions<'a>(
    required: &[&'a CStr],
    available: &[&CStr],
    want_debug_utils: bool,
) -> RendererResult<Vec<&'a CStr>> {
    let missing: Vec<String> = required
        .iter()
        .filter(|name| !available.contains(name))
        .map(|name| name.to_string_lossy().into_owned())
        .collect();

    if !missing.is_empty() {
        return Err(RendererError::Init(format!(
            "missing required instance extensions: {}",
            missing.join(", ")
        )));
    }

    let mut extensions = required.to_vec();
    if want_debug_utils {
        let debug_utils = DebugUtils::name();
        if available.contains(&debug_utils) {
            extensions.push(debug_utils);
        } else {
            log::warn!("{:?} not available, no debug messenger", debug_utils);
        }
    }

    Ok(extensions)
}

/// Create the Vulkan instance
///
/// # Arguments
/// * `app_name` - Application name reported to the driver
/// * `enable_validation` - Request the Khronos validation layer
/// * `surface_extensions` - Extensions the window system needs for presenting
pub fn create_instance(
    app_name: &str,
    enable_validation: bool,
    surface_extensions: &[*const c_char],
) -> RendererResult<GpuInstance> {
    log::info!("Creating Vulkan instance: {}", app_name);

    let entry = unsafe { Entry::load() }
        .map_err(|e| RendererError::Init(format!("failed to load Vulkan library: {}", e)))?;

    let layer_properties = entry
        .enumerate_instance_layer_properties()
        .map_err(|e| RendererError::Init(format!("layer enumeration failed: {:?}", e)))?;
    let available_layers: Vec<&CStr> = layer_properties
        .iter()
        .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
        .collect();
    let layers = resolve_validation_layers(enable_validation, &available_layers);

    let extension_properties = entry
        .enumerate_instance_extension_properties(None)
        .map_err(|e| RendererError::Init(format!("extension enumeration failed: {:?}", e)))?;
    let available_extensions: Vec<&CStr> = extension_properties
        .iter()
        .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
        .collect();
    let required: Vec<&'static CStr> = surface_extensions
        .iter()
        .map(|&ptr| unsafe { CStr::from_ptr(ptr) })
        .collect();
    let extensions =
        resolve_instance_extensions(&required, &available_extensions, !layers.is_empty())?;
    let debug_utils_enabled = extensions.contains(&DebugUtils::name());

    let app_name_cstr = CString::new(app_name)
        .map_err(|e| RendererError::Init(format!("invalid application name: {}", e)))?;
    let engine_name = c"NoEngine";

    let app_info = vk::ApplicationInfo::builder()
        .application_name(&app_name_cstr)
        .application_version(vk::make_api_version(0, 1, 0, 0))
        .engine_name(engine_name)
        .engine_version(vk::make_api_version(0, 1, 0, 0))
        .api_version(vk::API_VERSION_1_0);

    let layer_ptrs: Vec<*const c_char> = layers.iter().map(|l| l.as_ptr()).collect();
    let extension_ptrs: Vec<*const c_char> = extensions.iter().map(|e| e.as_ptr()).collect();

    let create_info = vk::InstanceCreateInfo::builder()
        .application_info(&app_info)
        .enabled_layer_names(&layer_ptrs)
        .enabled_extension_names(&extension_ptrs);

    let instance = unsafe { entry.create_instance(&create_info, None) }
        .map_err(|e| RendererError::Init(format!("vkCreateInstance failed: {:?}", e)))?;

    log::info!(
        "Instance created ({} layers, {} extensions)",
        layer_ptrs.len(),
        extension_ptrs.len()
    );

    let surface_loader = khr::Surface::new(&entry, &instance);
    let debug_utils = debug_utils_enabled.then(|| DebugUtils::new(&entry, &instance));

    Ok(GpuInstance {
        entry,
        instance,
        surface_loader,
        debug_utils,
        validation_enabled: !layers.is_empty(),
    })
}

/// Install the debug messenger. Returns a null handle when debug utils
/// is not enabled on this instance.
pub fn setup_debug_messenger(instance: &GpuInstance) -> RendererResult<vk::DebugUtilsMessengerEXT> {
    let Some(debug_utils) = instance.debug_utils.as_ref() else {
        return Ok(vk::DebugUtilsMessengerEXT::null());
    };

    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
        .map_err(|e| RendererError::Init(format!("failed to set up debug messenger: {:?}", e)))
}

// =============================================================================
// ADAPTER SELECTION
// =============================================================================

/// Graphics goes to the first graphics family. Present prefers the same
/// family, otherwise the first family that can present.
pub fn pick_queue_families(families: &[QueueFamilyCaps]) -> Option<QueueFamilies> {
    let graphics = families.iter().find(|f| f.graphics)?;

    let present = if graphics.present {
        graphics
    } else {
        families.iter().find(|f| f.present)?
    };

    Some(QueueFamilies {
        graphics: graphics.index,
        present: present.index,
    })
}

/// First candidate, in enumeration order, that can draw and present.
pub fn choose_adapter(candidates: &[AdapterCandidate]) -> RendererResult<(usize, QueueFamilies)> {
    if candidates.is_empty() {
        return Err(RendererError::NoAdapter);
    }

    candidates
        .iter()
        .enumerate()
        .find_map(|(i, candidate)| {
            let families = pick_queue_families(&candidate.families);
            if families.is_none() {
                log::debug!("Skipping {}: no graphics + present queue family", candidate.name);
            }
            families.map(|f| (i, f))
        })
        .ok_or(RendererError::NoAdapter)
}

/// Enumerate physical devices and select one for `surface`.
pub fn select_adapter(instance: &GpuInstance, surface: vk::SurfaceKHR) -> RendererResult<Adapter> {
    let devices = unsafe { instance.instance.enumerate_physical_devices() }.map_err(|e| {
        log::error!("Physical device enumeration failed: {:?}", e);
        RendererError::NoAdapter
    })?;

    if devices.is_empty() {
        log::error!("Failed to find a GPU with Vulkan support!");
        return Err(RendererError::NoAdapter);
    }

    let candidates: Vec<AdapterCandidate> = devices
        .iter()
        .map(|&device| describe_adapter(instance, device, surface))
        .collect();

    let (chosen, queue_families) = choose_adapter(&candidates)?;
    let physical_device = devices[chosen];

    let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
    let memory_properties = unsafe {
        instance
            .instance
            .get_physical_device_memory_properties(physical_device)
    };

    log::info!("Selected GPU: {}", candidates[chosen].name);
    log::info!(
        "API Version: {}.{}.{}",
        vk::api_version_major(properties.api_version),
        vk::api_version_minor(properties.api_version),
        vk::api_version_patch(properties.api_version)
    );
    log::info!(
        "Queue families: graphics={}, present={}",
        queue_families.graphics,
        queue_families.present
    );

    Ok(Adapter {
        physical_device,
        name: candidates[chosen].name.clone(),
        queue_families,
        properties,
        memory_properties,
    })
}

fn describe_adapter(
    instance: &GpuInstance,
    device: vk::PhysicalDevice,
    surface: vk::SurfaceKHR,
) -> AdapterCandidate {
    let props = unsafe { instance.instance.get_physical_device_properties(device) };
    let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let queue_families = unsafe {
        instance
            .instance
            .get_physical_device_queue_family_properties(device)
    };

    let families = queue_families
        .iter()
        .enumerate()
        .map(|(i, family)| {
            let index = i as u32;
            let present = unsafe {
                instance
                    .surface_loader
                    .get_physical_device_surface_support(device, index, surface)
            }
            .unwrap_or_else(|e| {
                log::warn!("Surface support query failed for {} family {}: {:?}", name, index, e);
                false
            });

            QueueFamilyCaps {
                index,
                graphics: family.queue_count > 0
                    && family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                present,
            }
        })
        .collect();

    AdapterCandidate { name, families }
}

// =============================================================================
// LOGICAL DEVICE
// =============================================================================

pub fn create_logical_device(
    instance: &GpuInstance,
    adapter: &Adapter,
) -> RendererResult<LogicalDevice> {
    let queue_priorities = [1.0];
    let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = adapter
        .queue_families
        .unique()
        .into_iter()
        .map(|family| {
            vk::DeviceQueueCreateInfo::builder()
                .queue_family_index(family)
                .queue_priorities(&queue_priorities)
                .build()
        })
        .collect();

    let extensions = [khr::Swapchain::name().as_ptr()];

    let create_info = vk::DeviceCreateInfo::builder()
        .queue_create_infos(&queue_create_infos)
        .enabled_extension_names(&extensions);

    let device = unsafe {
        instance
            .instance
            .create_device(adapter.physical_device, &create_info, None)
    }
    .map_err(RendererError::DeviceCreation)?;

    let graphics_queue = unsafe { device.get_device_queue(adapter.queue_families.graphics, 0) };
    let present_queue = unsafe { device.get_device_queue(adapter.queue_families.present, 0) };
    let swapchain_loader = khr::Swapchain::new(&instance.instance, &device);

    log::info!("Logical device created");

    Ok(LogicalDevice {
        device,
        graphics_queue,
        present_queue,
        swapchain_loader,
    })
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn family(index: u32, graphics: bool, present: bool) -> QueueFamilyCaps {
        QueueFamilyCaps {
            index,
            graphics,
            present,
        }
    }

    fn candidate(name: &str, families: Vec<QueueFamilyCaps>) -> AdapterCandidate {
        AdapterCandidate {
            name: name.to_string(),
            families,
        }
    }

    #[test]
    fn validation_layer_enabled_when_available() {
        let available = [c"VK_LAYER_MESA_device_select", VALIDATION_LAYER];
        assert_eq!(resolve_validation_layers(true, &available), vec![VALIDATION_LAYER]);
    }

    #[test]
    fn missing_validation_layer_degrades_to_no_layers() {
        let available = [c"VK_LAYER_MESA_device_select"];
        assert!(resolve_validation_layers(true, &available).is_empty());
        assert!(resolve_validation_layers(true, &[]).is_empty());
    }

    #[test]
    fn validation_not_requested_means_no_layers() {
        assert!(resolve_validation_layers(false, &[VALIDATION_LAYER]).is_empty());
    }

    #[test]
    fn surface_extensions_are_mandatory() {
        let required = [c"VK_KHR_surface", c"VK_KHR_xlib_surface"];
        let available = [c"VK_KHR_surface"];

        match resolve_instance_extensions(&required, &available, false) {
            Err(RendererError::Init(msg)) => assert!(msg.contains("VK_KHR_xlib_surface")),
            other => panic!("expected Init error, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn debug_utils_added_only_when_present() {
        let required = [c"VK_KHR_surface"];

        let without = resolve_instance_extensions(&required, &[c"VK_KHR_surface"], true).unwrap();
        assert_eq!(without, vec![c"VK_KHR_surface"]);

        let with = resolve_instance_extensions(
            &required,
            &[c"VK_KHR_surface", DebugUtils::name()],
            true,
        )
        .unwrap();
        assert_eq!(with, vec![c"VK_KHR_surface", DebugUtils::name()]);

        let not_wanted = resolve_instance_extensions(
            &required,
            &[c"VK_KHR_surface", DebugUtils::name()],
            false,
        )
        .unwrap();
        assert_eq!(not_wanted, vec![c"VK_KHR_surface"]);
    }

    #[test]
    fn queue_families_prefer_shared_graphics_present() {
        let families = [family(0, false, true), family(1, true, true), family(2, true, false)];
        assert_eq!(
            pick_queue_families(&families),
            Some(QueueFamilies { graphics: 1, present: 1 })
        );
    }

    #[test]
    fn queue_families_split_when_needed() {
        let families = [family(0, true, false), family(1, false, true)];
        let picked = pick_queue_families(&families).unwrap();

        assert_eq!(picked, QueueFamilies { graphics: 0, present: 1 });
        assert_eq!(picked.unique(), vec![0, 1]);
        assert_eq!(QueueFamilies { graphics: 3, present: 3 }.unique(), vec![3]);
    }

    #[test]
    fn zero_adapters_is_no_adapter_error() {
        assert!(matches!(choose_adapter(&[]), Err(RendererError::NoAdapter)));
    }

    #[test]
    fn adapters_without_graphics_are_rejected() {
        let candidates = [candidate("compute only", vec![family(0, false, true)])];
        assert!(matches!(choose_adapter(&candidates), Err(RendererError::NoAdapter)));
    }

    #[test]
    fn first_capable_adapter_wins_without_scoring() {
        let candidates = [
            candidate("headless", vec![family(0, true, false)]),
            candidate("integrated", vec![family(0, true, true)]),
            candidate("discrete", vec![family(0, true, true), family(1, true, true)]),
        ];

        let (index, families) = choose_adapter(&candidates).unwrap();
        assert_eq!(index, 1);
        assert_eq!(families, QueueFamilies { graphics: 0, present: 0 });
    }

    #[test]
    fn adapter_choice_is_deterministic() {
        let candidates = vec![
            candidate("a", vec![family(0, false, false), family(1, true, true)]),
            candidate("b", vec![family(0, true, true)]),
        ];

        let first = choose_adapter(&candidates).unwrap();
        for _ in 0..16 {
            assert_eq!(choose_adapter(&candidates).unwrap(), first);
        }
    }
}
