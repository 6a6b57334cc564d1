// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. Creation functions are atomic: they either
// return a live object or leave nothing behind. Ownership of what they
// return belongs to the caller (see `renderer`).

pub mod buffer;
pub mod command;
pub mod device;
pub mod frame;
pub mod pipeline;
pub mod shader;
pub mod swapchain;
pub mod sync;
pub mod teardown;
