// Frame synchronizer - the per-frame CPU/GPU handshake
//
// FRAME TIMELINE (one frame in flight, no branching):
// ┌──────────────────────────────────────────────────────────────────────┐
// │  wait_fence ─> reset_fence ─> acquire ─> submit ─> present           │
// │                                                                      │
// │  (CPU blocks   (arm fence    (GPU signals (GPU waits   (queue waits  │
// │   on frame N-1) for frame N)  image_avail) image_avail, render_done) │
// │                                            signals render_done+fence)│
// └──────────────────────────────────────────────────────────────────────┘
//
// The fence wait is the only place the control thread blocks. Every error
// is fatal except a failed or stale present, which is logged and skipped.

use super::device::LogicalDevice;
use super::swapchain::{self, AcquiredImage};
use super::sync::FrameSync;
use crate::error::{RendererError, RendererResult};
use ash::vk;

/// Effectively unbounded: a hung driver shows up as a wait error, not a retry
pub const FENCE_TIMEOUT: u64 = u64::MAX;
pub const ACQUIRE_TIMEOUT: u64 = u64::MAX;

/// The five GPU operations a frame is built from
pub trait FrameBackend {
    fn wait_for_fence(&mut self, timeout: u64) -> Result<(), vk::Result>;
    fn reset_fence(&mut self) -> Result<(), vk::Result>;
    fn acquire_image(&mut self, timeout: u64) -> Result<AcquiredImage, vk::Result>;
    fn submit(&mut self, image_index: u32) -> Result<(), vk::Result>;
    /// `Ok(true)` means the swapchain is suboptimal
    fn present(&mut self, image_index: u32) -> Result<bool, vk::Result>;
}

/// How presentation went. None of these stop the loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentStatus {
    Presented,
    Suboptimal,
    Failed(vk::Result),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameReport {
    pub image_index: u32,
    pub present: PresentStatus,
}

#[derive(Debug, Default)]
pub struct FrameSynchronizer {
    frames_drawn: u64,
    present_failures: u64,
}

impl FrameSynchronizer {
    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn present_failures(&self) -> u64 {
        self.present_failures
    }

    /// Run one frame: wait, reset, acquire, submit, present.
    pub fn draw_frame<B: FrameBackend>(&mut self, backend: &mut B) -> RendererResult<FrameReport> {
        // STEP 1: previous submission must be finished before its command
        // buffer and resources are touched again
        backend
            .wait_for_fence(FENCE_TIMEOUT)
            .map_err(RendererError::FenceWait)?;

        // STEP 2: arm the fence for this frame's submission
        backend.reset_fence().map_err(RendererError::FenceWait)?;

        // STEP 3: no swapchain recreation, any acquire failure is fatal
        let acquired = backend
            .acquire_image(ACQUIRE_TIMEOUT)
            .map_err(RendererError::Presentation)?;

        // STEP 4
        backend
            .submit(acquired.index)
            .map_err(RendererError::Submission)?;

        // STEP 5: reported, never escalated
        let present = match backend.present(acquired.index) {
            Ok(false) if !acquired.suboptimal => PresentStatus::Presented,
            Ok(_) => {
                log::warn!("Swapchain is suboptimal (image {})", acquired.index);
                PresentStatus::Suboptimal
            }
            Err(e) => {
                self.present_failures += 1;
                log::warn!("Present failed for image {}: {:?}", acquired.index, e);
                PresentStatus::Failed(e)
            }
        };

        self.frames_drawn += 1;
        log::trace!("Frame {} done (image {})", self.frames_drawn, acquired.index);

        Ok(FrameReport {
            image_index: acquired.index,
            present,
        })
    }
}

/// Vulkan implementation over the renderer's device, swapchain and sync set
pub struct VulkanFrame<'a> {
    pub device: &'a LogicalDevice,
    pub swapchain: vk::SwapchainKHR,
    pub sync: &'a FrameSync,
    /// Pre-recorded, indexed by swapchain image
    pub command_buffers: &'a [vk::CommandBuffer],
}

impl FrameBackend for VulkanFrame<'_> {
    fn wait_for_fence(&mut self, timeout: u64) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .device
                .wait_for_fences(&[self.sync.in_flight_fence], true, timeout)
        }
    }

    fn reset_fence(&mut self) -> Result<(), vk::Result> {
        unsafe { self.device.device.reset_fences(&[self.sync.in_flight_fence]) }
    }

    fn acquire_image(&mut self, timeout: u64) -> Result<AcquiredImage, vk::Result> {
        swapchain::acquire_next_image(
            self.device,
            self.swapchain,
            timeout,
            self.sync.image_available,
        )
    }

    fn submit(&mut self, image_index: u32) -> Result<(), vk::Result> {
        let command_buffer = *self
            .command_buffers
            .get(image_index as usize)
            .ok_or(vk::Result::ERROR_UNKNOWN)?;

        let wait_semaphores = [self.sync.image_available];
        // Earlier stages may run before the image is ready, color writes may not
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let signal_semaphores = [self.sync.render_finished];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores)
            .build();

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info],
                self.sync.in_flight_fence,
            )
        }
    }

    fn present(&mut self, image_index: u32) -> Result<bool, vk::Result> {
        swapchain::present(
            self.device,
            self.swapchain,
            image_index,
            &[self.sync.render_finished],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Call {
        Wait,
        Reset,
        Acquire,
        Submit(u32),
        Present(u32),
    }

    /// Scripted GPU. Work submitted is only finished after `gpu_latency`
    /// fence polls, and a fence wait drains it.
    #[derive(Default)]
    struct MockGpu {
        calls: Vec<Call>,
        image_count: u32,
        next_image: u32,
        fence_signaled: bool,
        gpu_busy_polls: u32,
        gpu_latency: u32,
        command_buffer_in_use: bool,
        fail_wait: Option<vk::Result>,
        fail_acquire: Option<vk::Result>,
        fail_submit: Option<vk::Result>,
        present_result: Option<Result<bool, vk::Result>>,
        suboptimal_acquire: bool,
    }

    impl MockGpu {
        fn new(image_count: u32) -> Self {
            Self {
                image_count,
                fence_signaled: true,
                ..Default::default()
            }
        }
    }

    impl FrameBackend for MockGpu {
        fn wait_for_fence(&mut self, timeout: u64) -> Result<(), vk::Result> {
            assert_eq!(timeout, u64::MAX);
            self.calls.push(Call::Wait);
            if let Some(e) = self.fail_wait {
                return Err(e);
            }
            // Block until the slow GPU finishes
            while !self.fence_signaled {
                self.gpu_busy_polls += 1;
                if self.gpu_busy_polls >= self.gpu_latency {
                    self.fence_signaled = true;
                    self.command_buffer_in_use = false;
                }
            }
            Ok(())
        }

        fn reset_fence(&mut self) -> Result<(), vk::Result> {
            self.calls.push(Call::Reset);
            self.fence_signaled = false;
            Ok(())
        }

        fn acquire_image(&mut self, _timeout: u64) -> Result<AcquiredImage, vk::Result> {
            self.calls.push(Call::Acquire);
            if let Some(e) = self.fail_acquire {
                return Err(e);
            }
            let index = self.next_image;
            self.next_image = (self.next_image + 1) % self.image_count;
            Ok(AcquiredImage {
                index,
                suboptimal: self.suboptimal_acquire,
            })
        }

        fn submit(&mut self, image_index: u32) -> Result<(), vk::Result> {
            self.calls.push(Call::Submit(image_index));
            if let Some(e) = self.fail_submit {
                return Err(e);
            }
            assert!(
                !self.command_buffer_in_use,
                "command buffer resubmitted while the GPU may still read it"
            );
            assert!(!self.fence_signaled, "submitting against a signaled fence");
            self.command_buffer_in_use = true;
            self.gpu_busy_polls = 0;
            Ok(())
        }

        fn present(&mut self, image_index: u32) -> Result<bool, vk::Result> {
            self.calls.push(Call::Present(image_index));
            self.present_result.unwrap_or(Ok(false))
        }
    }

    #[test]
    fn frame_steps_run_in_order() {
        let mut gpu = MockGpu::new(3);
        let mut sync = FrameSynchronizer::default();

        let report = sync.draw_frame(&mut gpu).unwrap();

        assert_eq!(
            gpu.calls,
            vec![Call::Wait, Call::Reset, Call::Acquire, Call::Submit(0), Call::Present(0)]
        );
        assert_eq!(
            report,
            FrameReport {
                image_index: 0,
                present: PresentStatus::Presented
            }
        );
        assert_eq!(sync.frames_drawn(), 1);
    }

    #[test]
    fn submitted_image_follows_acquired_index() {
        let mut gpu = MockGpu::new(2);
        let mut sync = FrameSynchronizer::default();

        let indices: Vec<u32> = (0..4)
            .map(|_| sync.draw_frame(&mut gpu).unwrap().image_index)
            .collect();

        assert_eq!(indices, vec![0, 1, 0, 1]);
        let submits: Vec<Call> = gpu
            .calls
            .iter()
            .copied()
            .filter(|c| matches!(c, Call::Submit(_)))
            .collect();
        assert_eq!(
            submits,
            vec![Call::Submit(0), Call::Submit(1), Call::Submit(0), Call::Submit(1)]
        );
    }

    #[test]
    fn slow_gpu_never_sees_command_buffer_reused_early() {
        let mut gpu = MockGpu::new(1);
        gpu.gpu_latency = 1_000;
        let mut sync = FrameSynchronizer::default();

        for _ in 0..10 {
            sync.draw_frame(&mut gpu).unwrap();
        }

        // Every submit after the first is preceded by a wait that drained the GPU
        assert_eq!(sync.frames_drawn(), 10);
        let waits = gpu.calls.iter().filter(|c| **c == Call::Wait).count();
        assert_eq!(waits, 10);
    }

    #[test]
    fn wait_failure_is_fatal_and_stops_the_frame() {
        let mut gpu = MockGpu::new(2);
        gpu.fail_wait = Some(vk::Result::ERROR_DEVICE_LOST);
        let mut sync = FrameSynchronizer::default();

        let err = sync.draw_frame(&mut gpu).unwrap_err();

        assert!(matches!(err, RendererError::FenceWait(vk::Result::ERROR_DEVICE_LOST)));
        assert_eq!(gpu.calls, vec![Call::Wait]);
        assert_eq!(sync.frames_drawn(), 0);
    }

    #[test]
    fn acquire_failure_is_a_presentation_error() {
        let mut gpu = MockGpu::new(2);
        gpu.fail_acquire = Some(vk::Result::ERROR_OUT_OF_DATE_KHR);
        let mut sync = FrameSynchronizer::default();

        let err = sync.draw_frame(&mut gpu).unwrap_err();

        assert!(matches!(
            err,
            RendererError::Presentation(vk::Result::ERROR_OUT_OF_DATE_KHR)
        ));
        assert_eq!(gpu.calls, vec![Call::Wait, Call::Reset, Call::Acquire]);
    }

    #[test]
    fn submit_failure_is_fatal() {
        let mut gpu = MockGpu::new(2);
        gpu.fail_submit = Some(vk::Result::ERROR_DEVICE_LOST);
        let mut sync = FrameSynchronizer::default();

        let err = sync.draw_frame(&mut gpu).unwrap_err();

        assert!(matches!(err, RendererError::Submission(_)));
        assert!(!gpu.calls.iter().any(|c| matches!(c, Call::Present(_))));
    }

    #[test]
    fn present_failure_is_logged_and_the_loop_continues() {
        let mut gpu = MockGpu::new(2);
        gpu.present_result = Some(Err(vk::Result::ERROR_OUT_OF_DATE_KHR));
        let mut sync = FrameSynchronizer::default();

        let first = sync.draw_frame(&mut gpu).unwrap();
        let second = sync.draw_frame(&mut gpu).unwrap();

        assert_eq!(
            first.present,
            PresentStatus::Failed(vk::Result::ERROR_OUT_OF_DATE_KHR)
        );
        assert_eq!(second.image_index, 1);
        assert_eq!(sync.frames_drawn(), 2);
        assert_eq!(sync.present_failures(), 2);
    }

    #[test]
    fn suboptimal_is_reported_not_escalated() {
        let mut gpu = MockGpu::new(2);
        gpu.present_result = Some(Ok(true));
        let mut sync = FrameSynchronizer::default();
        assert_eq!(
            sync.draw_frame(&mut gpu).unwrap().present,
            PresentStatus::Suboptimal
        );

        let mut gpu = MockGpu::new(2);
        gpu.suboptimal_acquire = true;
        assert_eq!(
            sync.draw_frame(&mut gpu).unwrap().present,
            PresentStatus::Suboptimal
        );
        assert_eq!(sync.present_failures(), 0);
    }
}
