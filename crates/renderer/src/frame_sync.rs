//! Frame-in-flight synchronization.
//!
//! The renderer keeps [`FRAMES_IN_FLIGHT`] rotating slots. Each slot owns a
//! command buffer, an image-available semaphore and a fence that signals when
//! every command submitted from that slot has finished executing:
//!
//! ```text
//! 1. acquire_slot(frame)   wait on the slot fence, then reset it
//! 2. acquire image         signals image_available
//! 3. record
//! 4. submit                waits image_available at COLOR_ATTACHMENT_OUTPUT | TRANSFER,
//!                          signals render_finished[image], signals the slot fence
//! 5. present               waits render_finished[image]
//! ```
//!
//! If step 2 fails after the fence was reset, [`FrameSyncManager::release_unsubmitted`]
//! submits an empty batch so the fence signals again and the slot can be
//! reused. If step 3 fails after the image was acquired,
//! [`FrameSyncManager::abandon_recording`] does the same while also waiting on
//! `image_available`, so the semaphore is unsignaled for the slot's next
//! acquire.
//!
//! The fence protocol is enforced by a pure [`SlotTracker`] so that the
//! manager can be tested against a mock [`SlotSync`] backend.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, warn};

use vesper_rhi::RhiResult;
use vesper_rhi::command::{CommandBuffer, CommandPool};
use vesper_rhi::device::Device;
use vesper_rhi::sync::{Fence, Semaphore};

use crate::FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};

/// Lifecycle of one frame slot as seen by the CPU.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotState {
    /// Fence waited (or never submitted); safe to reset and record.
    Free,
    /// Fence reset, commands are being recorded.
    Recording,
    /// Submitted; the fence signals once the GPU is done.
    InFlight,
}

/// Pure bookkeeping of slot states.
#[derive(Clone, Debug)]
pub struct SlotTracker {
    states: Vec<SlotState>,
}

impl SlotTracker {
    pub fn new(slots: usize) -> Self {
        Self {
            states: vec![SlotState::Free; slots],
        }
    }

    #[inline]
    pub fn slot_count(&self) -> usize {
        self.states.len()
    }

    #[inline]
    pub fn slot_for_frame(&self, frame_index: u64) -> usize {
        (frame_index % self.states.len() as u64) as usize
    }

    pub fn state(&self, slot: usize) -> Option<SlotState> {
        self.states.get(slot).copied()
    }

    /// Number of slots whose work has been submitted but not waited on.
    pub fn in_flight(&self) -> usize {
        self.states
            .iter()
            .filter(|s| **s == SlotState::InFlight)
            .count()
    }

    /// Records that the slot's fence was waited on.
    pub fn mark_waited(&mut self, slot: usize) -> RenderResult<()> {
        match self.get_mut(slot)? {
            s @ (SlotState::Free | SlotState::InFlight) => {
                *s = SlotState::Free;
                Ok(())
            }
            SlotState::Recording => Err(RenderError::SlotProtocol {
                slot,
                reason: "waited on a fence that was reset but never submitted",
            }),
        }
    }

    /// Records that the slot's fence was reset for recording.
    pub fn begin_recording(&mut self, slot: usize) -> RenderResult<()> {
        match self.get_mut(slot)? {
            s @ SlotState::Free => {
                *s = SlotState::Recording;
                Ok(())
            }
            SlotState::InFlight => Err(RenderError::SlotProtocol {
                slot,
                reason: "re-armed while the previous submission is still in flight",
            }),
            SlotState::Recording => Err(RenderError::SlotProtocol {
                slot,
                reason: "re-armed while already recording",
            }),
        }
    }

    /// Records that work carrying the slot's fence was submitted.
    pub fn mark_submitted(&mut self, slot: usize) -> RenderResult<()> {
        match self.get_mut(slot)? {
            s @ SlotState::Recording => {
                *s = SlotState::InFlight;
                Ok(())
            }
            _ => Err(RenderError::SlotProtocol {
                slot,
                reason: "submitted without an acquired slot",
            }),
        }
    }

    fn get_mut(&mut self, slot: usize) -> RenderResult<&mut SlotState> {
        self.states.get_mut(slot).ok_or(RenderError::SlotProtocol {
            slot,
            reason: "slot index out of range",
        })
    }
}

/// Fence and queue operations the manager needs.
///
/// [`VulkanSlotSync`] is the real backend.
pub trait SlotSync {
    /// Blocks until the slot's fence is signaled.
    fn wait(&mut self, slot: usize) -> RenderResult<()>;

    /// Returns the slot's fence to the unsignaled state.
    fn reset(&mut self, slot: usize) -> RenderResult<()>;

    /// Submits the slot's command buffer with the given semaphores, signaling
    /// the slot's fence on completion.
    fn submit(
        &mut self,
        slot: usize,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
    ) -> RenderResult<()>;

    /// Submits no work, only to signal the slot's fence. A `wait` semaphore
    /// is consumed by the submission.
    fn signal_empty(&mut self, slot: usize, wait: Option<vk::Semaphore>) -> RenderResult<()>;
}

/// Proof that a slot was acquired; consumed by submission.
#[derive(Debug, PartialEq, Eq)]
#[must_use]
pub struct SlotHandle {
    slot: usize,
    frame_index: u64,
}

impl SlotHandle {
    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

/// Drives the per-slot fence protocol over a [`SlotSync`] backend.
pub struct FrameSyncManager<S: SlotSync> {
    backend: S,
    tracker: SlotTracker,
}

impl<S: SlotSync> FrameSyncManager<S> {
    /// Creates a manager with every slot free.
    ///
    /// # Arguments
    ///
    /// * `backend` - Fence and queue operations; its fences must start signaled
    /// * `slots` - Number of frame slots, normally [`FRAMES_IN_FLIGHT`]
    pub fn new(backend: S, slots: usize) -> Self {
        Self {
            backend,
            tracker: SlotTracker::new(slots),
        }
    }

    /// Waits for slot `frame_index mod N` to finish its previous work, then
    /// resets its fence for recording.
    ///
    /// The returned handle must be passed to exactly one of [`Self::submit`],
    /// [`Self::release_unsubmitted`] or [`Self::abandon_recording`].
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotProtocol`] if the slot is still recording
    /// (its previous handle was dropped), and propagates fence wait or reset
    /// failures from the backend.
    pub fn acquire_slot(&mut self, frame_index: u64) -> RenderResult<SlotHandle> {
        let slot = self.tracker.slot_for_frame(frame_index);
        if self.tracker.state(slot) == Some(SlotState::Recording) {
            return Err(RenderError::SlotProtocol {
                slot,
                reason: "acquired again before being submitted or released",
            });
        }
        self.backend.wait(slot)?;
        self.tracker.mark_waited(slot)?;
        self.backend.reset(slot)?;
        self.tracker.begin_recording(slot)?;
        Ok(SlotHandle { slot, frame_index })
    }

    /// Submits the slot's recorded commands.
    ///
    /// # Arguments
    ///
    /// * `handle` - The slot acquired for this frame
    /// * `wait` - Semaphore waited at color output and transfer (image acquire)
    /// * `signal` - Semaphore signaled on completion (presentation)
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotProtocol`] if the slot was not acquired, or
    /// the backend's submission error. After a backend error the slot is
    /// released with an empty batch that still consumes `wait`.
    pub fn submit(
        &mut self,
        handle: SlotHandle,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
    ) -> RenderResult<()> {
        if self.tracker.state(handle.slot) != Some(SlotState::Recording) {
            return Err(RenderError::SlotProtocol {
                slot: handle.slot,
                reason: "submitted without an acquired slot",
            });
        }
        if let Err(e) = self.backend.submit(handle.slot, wait, signal) {
            error!("Submission from frame slot {} failed: {}", handle.slot, e);
            if self.backend.signal_empty(handle.slot, wait).is_ok() {
                self.tracker.mark_submitted(handle.slot)?;
            }
            return Err(e);
        }
        self.tracker.mark_submitted(handle.slot)
    }

    /// Re-signals the fence of a slot that will not be submitted this frame.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotProtocol`] if the slot was not acquired.
    pub fn release_unsubmitted(&mut self, handle: SlotHandle) -> RenderResult<()> {
        self.release(handle, None)
    }

    /// Gives up on a frame whose recording failed after an image was
    /// acquired.
    ///
    /// Submits an empty batch that waits on `image_available` and signals the
    /// slot's fence. Nothing is presented, so the acquired image stays with
    /// the application until the swapchain is recreated.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::SlotProtocol`] if the slot was not acquired.
    pub fn abandon_recording(
        &mut self,
        handle: SlotHandle,
        image_available: Option<vk::Semaphore>,
    ) -> RenderResult<()> {
        warn!(
            "Abandoning frame {} recorded in slot {}",
            handle.frame_index, handle.slot
        );
        self.release(handle, image_available)
    }

    fn release(&mut self, handle: SlotHandle, wait: Option<vk::Semaphore>) -> RenderResult<()> {
        if self.tracker.state(handle.slot) != Some(SlotState::Recording) {
            return Err(RenderError::SlotProtocol {
                slot: handle.slot,
                reason: "released a slot that was not acquired",
            });
        }
        debug!("Releasing unsubmitted frame slot {}", handle.slot);
        self.backend.signal_empty(handle.slot, wait)?;
        self.tracker.mark_submitted(handle.slot)
    }

    #[inline]
    pub fn tracker(&self) -> &SlotTracker {
        &self.tracker
    }

    #[inline]
    pub fn backend(&self) -> &S {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut S {
        &mut self.backend
    }
}

/// Per-slot Vulkan objects.
struct SlotResources {
    command_buffer: CommandBuffer,
    image_available: Semaphore,
    in_flight: Fence,
}

/// Vulkan implementation of [`SlotSync`].
///
/// Owns the command pool, the per-slot objects and the render-finished
/// semaphores (one per swapchain image, since presentation of an image may
/// still be pending when the slot is reused).
pub struct VulkanSlotSync {
    device: Arc<Device>,
    slots: Vec<SlotResources>,
    render_finished: Vec<Semaphore>,
    // Declared last: command buffers are freed with the pool.
    _command_pool: CommandPool,
}

impl VulkanSlotSync {
    pub fn new(device: Arc<Device>, image_count: usize) -> RhiResult<Self> {
        let family = device
            .queue_families()
            .graphics_family
            .ok_or(vesper_rhi::RhiError::NoSuitableGpu)?;
        let command_pool = CommandPool::new(device.clone(), family)?;
        let command_buffers = command_pool.allocate_command_buffers(FRAMES_IN_FLIGHT as u32)?;

        let mut slots = Vec::with_capacity(FRAMES_IN_FLIGHT);
        for command_buffer in command_buffers {
            slots.push(SlotResources {
                command_buffer,
                image_available: Semaphore::new(device.clone())?,
                // Signaled so the first wait on each slot returns immediately.
                in_flight: Fence::new(device.clone(), true)?,
            });
        }

        let render_finished = Self::create_semaphores(&device, image_count)?;

        debug!(
            "Created frame sync: {} slots, {} render-finished semaphores",
            FRAMES_IN_FLIGHT,
            render_finished.len()
        );

        Ok(Self {
            device,
            slots,
            render_finished,
            _command_pool: command_pool,
        })
    }

    fn create_semaphores(device: &Arc<Device>, count: usize) -> RhiResult<Vec<Semaphore>> {
        (0..count).map(|_| Semaphore::new(device.clone())).collect()
    }

    /// Matches the render-finished semaphores to a new swapchain image count.
    ///
    /// The device must be idle.
    pub fn resize_image_semaphores(&mut self, image_count: usize) -> RhiResult<()> {
        if self.render_finished.len() != image_count {
            self.render_finished = Self::create_semaphores(&self.device, image_count)?;
        }
        Ok(())
    }

    pub fn command_buffer(&self, slot: usize) -> Option<&CommandBuffer> {
        self.slots.get(slot).map(|s| &s.command_buffer)
    }

    pub fn image_available(&self, slot: usize) -> Option<vk::Semaphore> {
        self.slots.get(slot).map(|s| s.image_available.handle())
    }

    pub fn render_finished(&self, image_index: u32) -> Option<vk::Semaphore> {
        self.render_finished
            .get(image_index as usize)
            .map(Semaphore::handle)
    }

    fn slot(&self, slot: usize) -> RenderResult<&SlotResources> {
        self.slots.get(slot).ok_or(RenderError::SlotProtocol {
            slot,
            reason: "slot index out of range",
        })
    }
}

impl SlotSync for VulkanSlotSync {
    fn wait(&mut self, slot: usize) -> RenderResult<()> {
        self.slot(slot)?.in_flight.wait(u64::MAX)?;
        Ok(())
    }

    fn reset(&mut self, slot: usize) -> RenderResult<()> {
        self.slot(slot)?.in_flight.reset()?;
        Ok(())
    }

    fn submit(
        &mut self,
        slot: usize,
        wait: Option<vk::Semaphore>,
        signal: Option<vk::Semaphore>,
    ) -> RenderResult<()> {
        let resources = self.slot(slot)?;
        let wait_semaphores: Vec<vk::Semaphore> = wait.into_iter().collect();
        let wait_stages = vec![
            vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT | vk::PipelineStageFlags::TRANSFER;
            wait_semaphores.len()
        ];
        let signal_semaphores: Vec<vk::Semaphore> = signal.into_iter().collect();
        let command_buffers = [resources.command_buffer.handle()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        // SAFETY: the slot tracker guarantees the fence was reset and is not
        // attached to another pending submission.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], resources.in_flight.handle())?;
        }
        Ok(())
    }

    fn signal_empty(&mut self, slot: usize, wait: Option<vk::Semaphore>) -> RenderResult<()> {
        let fence = self.slot(slot)?.in_flight.handle();
        let Some(semaphore) = wait else {
            // SAFETY: as in `submit`.
            unsafe {
                self.device.submit_graphics(&[], fence)?;
            }
            return Ok(());
        };

        let wait_semaphores = [semaphore];
        let wait_stages = [vk::PipelineStageFlags::ALL_COMMANDS];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages);
        // SAFETY: as in `submit`.
        unsafe {
            self.device.submit_graphics(&[submit_info], fence)?;
        }
        Ok(())
    }
}

impl Drop for VulkanSlotSync {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            warn!("Failed to wait for device idle before destroying frame sync: {e}");
        }
        debug!("Destroyed frame sync");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Models fences as booleans and the GPU as a queue of pending slots.
    #[derive(Default)]
    struct MockSync {
        signaled: Vec<bool>,
        pending: Vec<usize>,
        submissions: usize,
        empty_submissions: usize,
        waits: Vec<usize>,
        consumed: Vec<vk::Semaphore>,
        fail_submit: bool,
    }

    impl MockSync {
        fn new(slots: usize) -> Self {
            Self {
                signaled: vec![true; slots],
                ..Self::default()
            }
        }

        /// Completes the oldest pending submission.
        fn complete_one(&mut self) {
            if !self.pending.is_empty() {
                let slot = self.pending.remove(0);
                self.signaled[slot] = true;
            }
        }
    }

    impl SlotSync for MockSync {
        fn wait(&mut self, slot: usize) -> RenderResult<()> {
            self.waits.push(slot);
            // A blocking wait drains the queue up to this slot.
            while !self.signaled[slot] {
                assert!(
                    !self.pending.is_empty(),
                    "waiting on a fence that will never signal"
                );
                self.complete_one();
            }
            Ok(())
        }

        fn reset(&mut self, slot: usize) -> RenderResult<()> {
            assert!(self.signaled[slot], "reset of an in-use fence");
            self.signaled[slot] = false;
            Ok(())
        }

        fn submit(
            &mut self,
            slot: usize,
            _wait: Option<vk::Semaphore>,
            _signal: Option<vk::Semaphore>,
        ) -> RenderResult<()> {
            assert!(!self.signaled[slot], "submit with a signaled fence");
            if self.fail_submit {
                return Err(RenderError::Target("device lost".to_string()));
            }
            self.pending.push(slot);
            self.submissions += 1;
            Ok(())
        }

        fn signal_empty(&mut self, slot: usize, wait: Option<vk::Semaphore>) -> RenderResult<()> {
            self.consumed.extend(wait);
            self.pending.push(slot);
            self.empty_submissions += 1;
            Ok(())
        }
    }

    #[test]
    fn test_fence_waited_before_every_reuse() {
        let mut manager = FrameSyncManager::new(MockSync::new(FRAMES_IN_FLIGHT), FRAMES_IN_FLIGHT);

        for frame in 0..1000u64 {
            let handle = manager.acquire_slot(frame).unwrap();
            assert_eq!(handle.slot(), (frame % FRAMES_IN_FLIGHT as u64) as usize);
            assert!(manager.tracker().in_flight() < FRAMES_IN_FLIGHT);
            manager.submit(handle, None, None).unwrap();
            assert!(manager.tracker().in_flight() <= FRAMES_IN_FLIGHT);
            // The GPU lags behind by a frame most of the time.
            if frame % 3 == 0 {
                manager.backend_mut().complete_one();
            }
        }

        let backend = manager.backend();
        assert_eq!(backend.submissions, 1000);
        assert_eq!(backend.waits.len(), 1000);
        assert!(backend.pending.len() <= FRAMES_IN_FLIGHT);
    }

    #[test]
    fn test_release_unsubmitted_keeps_slot_usable() {
        let mut manager = FrameSyncManager::new(MockSync::new(2), 2);

        let handle = manager.acquire_slot(0).unwrap();
        manager.release_unsubmitted(handle).unwrap();
        assert_eq!(manager.backend().empty_submissions, 1);

        // Without the empty submission this wait would never return.
        let handle = manager.acquire_slot(2).unwrap();
        assert_eq!(handle.slot(), 0);
        manager.submit(handle, None, None).unwrap();
    }

    #[test]
    fn test_failed_recording_does_not_stall_later_frames() {
        let mut manager = FrameSyncManager::new(MockSync::new(2), 2);
        let image_available = vk::Semaphore::null();

        // Every frame fails while recording; none may wedge its slot.
        for frame in 0..6u64 {
            let handle = manager.acquire_slot(frame).unwrap();
            manager
                .abandon_recording(handle, Some(image_available))
                .unwrap();
        }
        assert_eq!(manager.backend().consumed.len(), 6);
        assert_eq!(manager.backend().submissions, 0);

        let handle = manager.acquire_slot(6).unwrap();
        assert_eq!(handle.slot(), 0);
        manager.submit(handle, None, None).unwrap();
        assert_eq!(manager.backend().submissions, 1);
    }

    #[test]
    fn test_failed_submit_releases_slot() {
        let mut manager = FrameSyncManager::new(MockSync::new(2), 2);
        manager.backend_mut().fail_submit = true;

        let handle = manager.acquire_slot(0).unwrap();
        let image_available = vk::Semaphore::null();
        assert!(manager.submit(handle, Some(image_available), None).is_err());
        assert_eq!(manager.tracker().state(0), Some(SlotState::InFlight));
        assert_eq!(manager.backend().consumed, vec![image_available]);

        manager.backend_mut().fail_submit = false;
        let handle = manager.acquire_slot(2).unwrap();
        manager.submit(handle, None, None).unwrap();
    }

    #[test]
    fn test_abandon_requires_acquired_slot() {
        let mut manager = FrameSyncManager::new(MockSync::new(2), 2);
        let handle = SlotHandle {
            slot: 1,
            frame_index: 1,
        };
        assert!(manager.abandon_recording(handle, None).is_err());
        assert!(manager.backend().consumed.is_empty());
    }

    #[test]
    fn test_double_acquire_is_rejected() {
        let mut manager = FrameSyncManager::new(MockSync::new(2), 2);
        let _first = manager.acquire_slot(0).unwrap();
        // A real fence would never signal here.
        let err = manager.acquire_slot(2).unwrap_err();
        assert!(matches!(err, RenderError::SlotProtocol { slot: 0, .. }));
    }

    #[test]
    fn test_tracker_rejects_rearm_in_flight() {
        let mut tracker = SlotTracker::new(2);
        tracker.begin_recording(1).unwrap();
        tracker.mark_submitted(1).unwrap();
        assert!(tracker.begin_recording(1).is_err());
        tracker.mark_waited(1).unwrap();
        tracker.begin_recording(1).unwrap();
        assert_eq!(tracker.state(1), Some(SlotState::Recording));
    }

    #[test]
    fn test_tracker_rejects_submit_without_recording() {
        let mut tracker = SlotTracker::new(2);
        assert!(tracker.mark_submitted(0).is_err());
        assert!(tracker.mark_waited(5).is_err());
    }

    #[test]
    fn test_slot_for_frame_wraps() {
        let tracker = SlotTracker::new(2);
        assert_eq!(tracker.slot_for_frame(0), 0);
        assert_eq!(tracker.slot_for_frame(1), 1);
        assert_eq!(tracker.slot_for_frame(u64::MAX), 1);
    }
}
