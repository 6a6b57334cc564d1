// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU ordering.
// Exactly one set exists: a single frame is ever in flight.

use crate::error::{RendererError, RendererResult};
use ash::prelude::VkResult;
use ash::vk;

/// Frame synchronization set
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSync {
    /// Signaled by acquire, waited on before color output
    pub image_available: vk::Semaphore,
    /// Signaled by the submission, waited on by present
    pub render_finished: vk::Semaphore,
    /// Signaled by the submission, waited on by the CPU before reuse
    pub in_flight_fence: vk::Fence,
}

impl FrameSync {
    /// Create the set. The fence starts signaled so the first frame's wait
    /// returns immediately. On failure nothing is left behind.
    pub fn new(device: &ash::Device) -> RendererResult<Self> {
        let mut sync = Self::default();

        match unsafe { sync.create_objects(device) } {
            Ok(()) => Ok(sync),
            Err(e) => {
                sync.destroy(device);
                Err(RendererError::allocation("synchronization objects", format!("{:?}", e)))
            }
        }
    }

    unsafe fn create_objects(&mut self, device: &ash::Device) -> VkResult<()> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();
        let fence_info = vk::FenceCreateInfo::builder().flags(vk::FenceCreateFlags::SIGNALED);

        self.image_available = device.create_semaphore(&semaphore_info, None)?;
        self.render_finished = device.create_semaphore(&semaphore_info, None)?;
        self.in_flight_fence = device.create_fence(&fence_info, None)?;
        Ok(())
    }

    /// Destroy whatever part of the set exists.
    pub fn destroy(&self, device: &ash::Device) {
        unsafe {
            if self.image_available != vk::Semaphore::null() {
                device.destroy_semaphore(self.image_available, None);
            }
            if self.render_finished != vk::Semaphore::null() {
                device.destroy_semaphore(self.render_finished, None);
            }
            if self.in_flight_fence != vk::Fence::null() {
                device.destroy_fence(self.in_flight_fence, None);
            }
        }
    }
}
