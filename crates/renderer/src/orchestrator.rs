//! Frame orchestration.
//!
//! [`FrameOrchestrator`] owns the five passes, the scene-color snapshot and
//! the frame slots. Each frame it:
//!
//! 1. resolves material descriptors for the draw list ([`FrameOrchestrator::prepare_frame`]);
//! 2. waits for the slot `frame_index mod N` and acquires a target image;
//! 3. records the passes in the order given by [`plan_frame`];
//! 4. submits and presents, then advances `frame_index` and the simulation clock.
//!
//! Out-of-date or suboptimal targets move the [`ResizeStateMachine`] to
//! `Invalid`; [`FrameOrchestrator::recreate`] rebuilds the target and every
//! extent-dependent resource while the device is idle.
//!
//! A frame that fails after its image was acquired releases its slot with an
//! empty submission and invalidates the target, so the error is reported once
//! and the next frame starts from a rebuilt swapchain.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info, warn};

use vesper_core::{RenderMode, RendererConfig, SimulationClock};
use vesper_resources::ResourceContext;
use vesper_rhi::RhiError;
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::device::Device;
use vesper_rhi::swapchain::Swapchain;
use vesper_scene::FrameParameters;

use crate::FRAMES_IN_FLIGHT;
use crate::attachment::{AttachmentRole, AttachmentState, PassAttachment, transition_image};
use crate::error::{RenderError, RenderResult};
use crate::frame_sync::{FrameSyncManager, SlotHandle, VulkanSlotSync};
use crate::material_cache::CacheError;
use crate::passes::{
    ForwardPass, FrameContext, GBufferPass, LightingPass, RenderPass, ResizeContext, SharedViews,
    SsrPass, TargetView, WaterPass,
};
use crate::shaders::ShaderSet;
use crate::target::{OffscreenTarget, RenderTarget, TargetDesc};

// =============================================================================
// Resize state
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResizeState {
    Ready,
    /// The target no longer matches the surface.
    Invalid,
    Recreating,
}

/// Tracks whether the target must be rebuilt before the next frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResizeStateMachine {
    state: ResizeState,
    pending: Option<vk::Extent2D>,
    /// Set when the target itself reported it must be rebuilt.
    stale: bool,
}

impl Default for ResizeStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ResizeStateMachine {
    pub fn new() -> Self {
        Self {
            state: ResizeState::Ready,
            pending: None,
            stale: false,
        }
    }

    #[inline]
    pub fn state(&self) -> ResizeState {
        self.state
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.state == ResizeState::Ready
    }

    /// The last requested extent, if any.
    #[inline]
    pub fn pending(&self) -> Option<vk::Extent2D> {
        self.pending
    }

    /// Records a new window size. Repeated calls keep only the latest size.
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.pending = Some(vk::Extent2D { width, height });
        if self.state != ResizeState::Recreating {
            self.state = ResizeState::Invalid;
        }
    }

    /// Marks the target stale without a new size (out-of-date, suboptimal).
    pub fn mark_invalid(&mut self) {
        self.stale = true;
        if self.state != ResizeState::Recreating {
            self.state = ResizeState::Invalid;
        }
    }

    /// Starts recreation if the target is invalid and the extent is non-zero.
    ///
    /// `current` is used when no size was requested. A zero extent (a
    /// minimized window) leaves the state `Invalid`. A requested size equal
    /// to `current` on a target that is not stale returns to `Ready` without
    /// rebuilding anything.
    pub fn begin_recreate(&mut self, current: vk::Extent2D) -> Option<vk::Extent2D> {
        if self.state != ResizeState::Invalid {
            return None;
        }
        let extent = self.pending.unwrap_or(current);
        if extent.width == 0 || extent.height == 0 {
            return None;
        }
        if !self.stale && extent == current {
            self.finish_recreate();
            return None;
        }
        self.state = ResizeState::Recreating;
        Some(extent)
    }

    pub fn finish_recreate(&mut self) {
        self.state = ResizeState::Ready;
        self.pending = None;
        self.stale = false;
    }

    /// Leaves the target `Invalid` so the next [`Self::begin_recreate`]
    /// rebuilds it, even at an unchanged size.
    pub fn fail_recreate(&mut self) {
        self.state = ResizeState::Invalid;
        self.stale = true;
    }
}

// =============================================================================
// Frame plan
// =============================================================================

/// One recorded step of a frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStep {
    GBuffer,
    Ssr,
    /// Reflections are sampled but disabled: clear the buffer instead.
    ClearReflections,
    Lighting,
    Forward,
    /// Copy the target into the scene-color snapshot.
    Snapshot,
    Water,
}

/// Pass sequence for a frame with the given toggles.
pub fn plan_frame(mode: RenderMode, ssr_enabled: bool, water_visible: bool) -> Vec<FrameStep> {
    let mut steps = vec![FrameStep::GBuffer];
    if water_visible {
        steps.push(if ssr_enabled {
            FrameStep::Ssr
        } else {
            FrameStep::ClearReflections
        });
    }
    steps.push(match mode {
        RenderMode::Deferred => FrameStep::Lighting,
        RenderMode::Forward => FrameStep::Forward,
    });
    steps.push(FrameStep::Snapshot);
    if water_visible {
        steps.push(FrameStep::Water);
    }
    steps
}

/// Outcome of [`FrameOrchestrator::render_frame`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameStatus {
    Presented,
    /// Presented, but the swapchain should be recreated.
    Suboptimal,
    /// Nothing was presented; the swapchain must be recreated.
    OutOfDate,
    /// The target is waiting for recreation.
    Skipped,
}

/// A target that can be rebuilt at a new size.
pub trait ResizableTarget: RenderTarget {
    /// Rebuilds the images. The device must be idle.
    fn rebuild(&mut self, width: u32, height: u32) -> RenderResult<()>;
}

impl ResizableTarget for Swapchain {
    fn rebuild(&mut self, width: u32, height: u32) -> RenderResult<()> {
        Ok(self.recreate(width, height)?)
    }
}

impl ResizableTarget for OffscreenTarget {
    fn rebuild(&mut self, width: u32, height: u32) -> RenderResult<()> {
        self.resize(width, height)
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct FrameOrchestrator {
    device: Arc<Device>,
    gbuffer: GBufferPass,
    ssr: SsrPass,
    lighting: LightingPass,
    forward: ForwardPass,
    water: WaterPass,
    snapshot: Option<PassAttachment>,
    sync: FrameSyncManager<VulkanSlotSync>,
    frame_index: u64,
    clock: SimulationClock,
    mode: RenderMode,
    ssr_enabled: bool,
    water_enabled: bool,
    resize: ResizeStateMachine,
}

impl FrameOrchestrator {
    /// Creates every pass and sizes them for `target`.
    pub fn new(
        device: Arc<Device>,
        config: &RendererConfig,
        target: &impl RenderTarget,
    ) -> RenderResult<Self> {
        let shaders = ShaderSet::new(device.clone(), &config.render.shader_dir);
        let missing = shaders.missing();
        if !missing.is_empty() {
            warn!(
                "Missing SPIR-V in {}: {}",
                shaders.dir().display(),
                missing.join(", ")
            );
        }

        let capacity = config.render.material_segment_capacity;
        let gbuffer = GBufferPass::new(device.clone(), &shaders, capacity, config.lighting)?;
        let ssr = SsrPass::new(device.clone(), &shaders, config.ssr)?;
        let lighting = LightingPass::new(device.clone(), &shaders, config.lighting)?;
        let forward = ForwardPass::new(device.clone(), &shaders, capacity, config.lighting)?;
        let water = WaterPass::new(device.clone(), &shaders, config.water, config.water_ssr)?;
        let sync = FrameSyncManager::new(
            VulkanSlotSync::new(device.clone(), target.image_count())?,
            FRAMES_IN_FLIGHT,
        );

        let mut orchestrator = Self {
            device,
            gbuffer,
            ssr,
            lighting,
            forward,
            water,
            snapshot: None,
            sync,
            frame_index: 0,
            clock: SimulationClock::default(),
            mode: config.render.mode,
            ssr_enabled: config.render.ssr_enabled,
            water_enabled: config.render.water_enabled,
            resize: ResizeStateMachine::new(),
        };
        orchestrator.resize_passes(target.desc())?;

        info!(
            "Frame orchestrator ready: {:?} mode, ssr={}, water={}, {} slots",
            orchestrator.mode,
            orchestrator.ssr_enabled,
            orchestrator.water_enabled,
            FRAMES_IN_FLIGHT
        );
        Ok(orchestrator)
    }

    /// Resolves material descriptors for every draw, uploading textures on
    /// first use. Draws whose material cannot be allocated are skipped later
    /// with a trace.
    pub fn prepare_frame(
        &mut self,
        params: &FrameParameters<'_>,
        resources: &mut ResourceContext,
    ) -> RenderResult<()> {
        for draw in params.draws {
            let gbuffer = self
                .gbuffer
                .allocate_material_descriptor(&draw.material, resources);
            skip_exhausted(gbuffer)?;
            if self.mode == RenderMode::Forward {
                let forward = self
                    .forward
                    .allocate_material_descriptor(&draw.material, resources);
                skip_exhausted(forward)?;
            }
        }
        Ok(())
    }

    /// Records one frame into `cmd`.
    ///
    /// The target image is treated as undefined on entry and is left in
    /// `final_state`.
    pub fn record_frame(
        &mut self,
        cmd: &CommandBuffer,
        slot: usize,
        params: &FrameParameters<'_>,
        resources: &ResourceContext,
        target: TargetView,
        final_state: AttachmentState,
    ) -> RenderResult<()> {
        let frame = FrameContext {
            slot,
            params,
            resources,
            target,
            time: self.clock.seconds(),
        };
        let water_visible = self.water_enabled && params.has_reflective_content();
        let color = AttachmentRole::Color;
        let mut target_state = AttachmentState::Undefined;

        for step in plan_frame(self.mode, self.ssr_enabled, water_visible) {
            match step {
                FrameStep::GBuffer => self.gbuffer.record(cmd, &frame)?,
                FrameStep::Ssr => self.ssr.record(cmd, &frame)?,
                FrameStep::ClearReflections => self.ssr.clear_reflections(cmd)?,
                FrameStep::Lighting | FrameStep::Forward => {
                    transition_image(
                        cmd,
                        target.image,
                        color,
                        target_state,
                        AttachmentState::ColorWrite,
                    );
                    target_state = AttachmentState::ColorWrite;
                    if step == FrameStep::Lighting {
                        self.lighting.record(cmd, &frame)?;
                    } else {
                        self.forward.record(cmd, &frame)?;
                    }
                }
                FrameStep::Snapshot => {
                    let snapshot = self.snapshot.as_mut().ok_or(RenderError::Target(
                        "scene-color snapshot missing".to_string(),
                    ))?;
                    transition_image(
                        cmd,
                        target.image,
                        color,
                        target_state,
                        AttachmentState::TransferSrc,
                    );
                    target_state = AttachmentState::TransferSrc;
                    snapshot.transition(cmd, AttachmentState::TransferDst);
                    cmd.copy_color_image(target.image, snapshot.image(), target.extent);
                    snapshot.transition(cmd, AttachmentState::ShaderRead);
                }
                FrameStep::Water => {
                    transition_image(
                        cmd,
                        target.image,
                        color,
                        target_state,
                        AttachmentState::ColorWrite,
                    );
                    target_state = AttachmentState::ColorWrite;
                    self.water.record(cmd, &frame)?;
                }
            }
        }

        transition_image(cmd, target.image, color, target_state, final_state);
        Ok(())
    }

    /// Renders and presents one frame to the swapchain.
    pub fn render_frame(
        &mut self,
        swapchain: &Swapchain,
        params: &FrameParameters<'_>,
        resources: &mut ResourceContext,
    ) -> RenderResult<FrameStatus> {
        if !self.resize.is_ready() {
            return Ok(FrameStatus::Skipped);
        }
        self.prepare_frame(params, resources)?;

        let handle = self.sync.acquire_slot(self.frame_index)?;
        let slot = handle.slot();
        let Some(image_available) = self.sync.backend().image_available(slot) else {
            self.sync.release_unsubmitted(handle)?;
            return Err(missing_slot_object(slot));
        };

        let (image_index, acquire_suboptimal) = match swapchain.acquire_next_image(image_available)
        {
            Ok(acquired) => acquired,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on acquire");
                self.sync.release_unsubmitted(handle)?;
                self.resize.mark_invalid();
                return Ok(FrameStatus::OutOfDate);
            }
            Err(e) => {
                self.sync.release_unsubmitted(handle)?;
                return Err(RhiError::VulkanError(e).into());
            }
        };

        let render_finished =
            match self.record_acquired(&handle, swapchain, image_index, params, resources) {
                Ok(render_finished) => render_finished,
                Err(e) => {
                    // The acquired image is never presented; only recreation
                    // hands it back.
                    self.sync.abandon_recording(handle, Some(image_available))?;
                    self.resize.mark_invalid();
                    return Err(e);
                }
            };
        if let Err(e) = self
            .sync
            .submit(handle, Some(image_available), Some(render_finished))
        {
            self.resize.mark_invalid();
            return Err(e);
        }

        let present_queue = self
            .device
            .present_queue()
            .ok_or(RenderError::Rhi(RhiError::NoSuitableGpu))?;
        let status = match swapchain.present(present_queue, image_index, render_finished) {
            Ok(present_suboptimal) if present_suboptimal || acquire_suboptimal => {
                debug!("Swapchain suboptimal");
                self.resize.mark_invalid();
                FrameStatus::Suboptimal
            }
            Ok(_) => FrameStatus::Presented,
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                debug!("Swapchain out of date on present");
                self.resize.mark_invalid();
                FrameStatus::OutOfDate
            }
            Err(e) => return Err(RhiError::VulkanError(e).into()),
        };

        self.advance();
        Ok(status)
    }

    /// Renders one frame into an offscreen target and waits for it, leaving
    /// the image ready for [`OffscreenTarget::read_back`].
    pub fn render_offscreen(
        &mut self,
        target: &OffscreenTarget,
        params: &FrameParameters<'_>,
        resources: &mut ResourceContext,
    ) -> RenderResult<()> {
        self.prepare_frame(params, resources)?;

        let handle = self.sync.acquire_slot(self.frame_index)?;
        let desc = target.desc();
        let (Some(&image), Some(&view)) = (target.images().first(), target.views().first()) else {
            self.sync.release_unsubmitted(handle)?;
            return Err(RenderError::Target("offscreen target has no image".to_string()));
        };
        let view = TargetView {
            image,
            view,
            extent: desc.extent,
            format: desc.format,
        };

        if let Err(e) = self.record_slot(&handle, params, resources, view, desc.final_state) {
            self.sync.abandon_recording(handle, None)?;
            return Err(e);
        }
        self.sync.submit(handle, None, None)?;
        self.device.wait_idle()?;
        self.advance();
        Ok(())
    }

    /// Records into the acquired swapchain image and returns the semaphore
    /// its presentation waits on.
    fn record_acquired(
        &mut self,
        handle: &SlotHandle,
        swapchain: &Swapchain,
        image_index: u32,
        params: &FrameParameters<'_>,
        resources: &ResourceContext,
    ) -> RenderResult<vk::Semaphore> {
        let index = image_index as usize;
        let (Some(&image), Some(&view)) =
            (swapchain.images().get(index), swapchain.image_views().get(index))
        else {
            return Err(RenderError::Target(format!(
                "swapchain returned image {image_index} out of range"
            )));
        };
        let target = TargetView {
            image,
            view,
            extent: swapchain.extent(),
            format: swapchain.format(),
        };
        let render_finished = self
            .sync
            .backend()
            .render_finished(image_index)
            .ok_or_else(|| missing_slot_object(handle.slot()))?;

        self.record_slot(handle, params, resources, target, AttachmentState::Present)?;
        Ok(render_finished)
    }

    fn record_slot(
        &mut self,
        handle: &SlotHandle,
        params: &FrameParameters<'_>,
        resources: &ResourceContext,
        target: TargetView,
        final_state: AttachmentState,
    ) -> RenderResult<()> {
        let slot = handle.slot();
        let cmd = self
            .sync
            .backend()
            .command_buffer(slot)
            .cloned()
            .ok_or_else(|| missing_slot_object(slot))?;
        cmd.reset()?;
        cmd.begin()?;
        self.record_frame(&cmd, slot, params, resources, target, final_state)?;
        cmd.end()?;
        Ok(())
    }

    fn advance(&mut self) {
        self.frame_index += 1;
        self.clock.advance();
    }

    /// Records a new target size; applied by the next [`Self::recreate`].
    pub fn request_resize(&mut self, width: u32, height: u32) {
        self.resize.request_resize(width, height);
    }

    /// Rebuilds `target` and everything sized from it if a resize is pending.
    ///
    /// Returns `false` when nothing was done (ready, or zero extent). On
    /// failure the state stays `Invalid` so the next call retries.
    pub fn recreate<T: ResizableTarget>(&mut self, target: &mut T) -> RenderResult<bool> {
        let Some(extent) = self.resize.begin_recreate(target.extent()) else {
            return Ok(false);
        };
        match self.rebuild_for(target, extent) {
            Ok(()) => {
                self.resize.finish_recreate();
                Ok(true)
            }
            Err(e) => {
                self.resize.fail_recreate();
                Err(e)
            }
        }
    }

    fn rebuild_for<T: ResizableTarget>(
        &mut self,
        target: &mut T,
        extent: vk::Extent2D,
    ) -> RenderResult<()> {
        self.device.wait_idle()?;
        target.rebuild(extent.width, extent.height)?;
        self.sync
            .backend_mut()
            .resize_image_semaphores(target.image_count())?;
        let desc = target.desc();
        self.resize_passes(desc)?;
        debug!(
            "Recreated target at {}x{}",
            desc.extent.width, desc.extent.height
        );
        Ok(())
    }

    /// Resizes the snapshot and then each pass in dependency order.
    fn resize_passes(&mut self, desc: TargetDesc) -> RenderResult<()> {
        self.snapshot = None;
        let snapshot = create_snapshot(&self.device, desc)?;

        let mut ctx = ResizeContext {
            extent: desc.extent,
            target_format: desc.format,
            inputs: SharedViews {
                scene_color: Some(snapshot.view()),
                ..SharedViews::default()
            },
        };
        self.snapshot = Some(snapshot);

        self.gbuffer.resize(&ctx)?;
        ctx.inputs.gbuffer = self.gbuffer.views();
        self.ssr.resize(&ctx)?;
        ctx.inputs.reflection = self.ssr.output_view();

        let consumers: [&mut dyn RenderPass; 3] =
            [&mut self.lighting, &mut self.forward, &mut self.water];
        for pass in consumers {
            pass.resize(&ctx)?;
            debug!("Resized {} pass", pass.kind());
        }
        Ok(())
    }

    // =========================================================================
    // Accessors and toggles
    // =========================================================================

    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    #[inline]
    pub fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    #[inline]
    pub fn resize_state(&self) -> ResizeState {
        self.resize.state()
    }

    #[inline]
    pub fn mode(&self) -> RenderMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: RenderMode) {
        if mode != self.mode {
            info!("Render mode: {:?}", mode);
            self.mode = mode;
        }
    }

    #[inline]
    pub fn ssr_enabled(&self) -> bool {
        self.ssr_enabled
    }

    pub fn set_ssr_enabled(&mut self, enabled: bool) {
        self.ssr_enabled = enabled;
    }

    #[inline]
    pub fn water_enabled(&self) -> bool {
        self.water_enabled
    }

    pub fn set_water_enabled(&mut self, enabled: bool) {
        self.water_enabled = enabled;
    }

    pub fn gbuffer(&self) -> &GBufferPass {
        &self.gbuffer
    }

    pub fn gbuffer_mut(&mut self) -> &mut GBufferPass {
        &mut self.gbuffer
    }

    pub fn ssr_mut(&mut self) -> &mut SsrPass {
        &mut self.ssr
    }

    pub fn forward(&self) -> &ForwardPass {
        &self.forward
    }

    pub fn forward_mut(&mut self) -> &mut ForwardPass {
        &mut self.forward
    }

    pub fn water_mut(&mut self) -> &mut WaterPass {
        &mut self.water
    }
}

impl Drop for FrameOrchestrator {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during orchestrator drop: {}", e);
        }
    }
}

/// Creates the snapshot attachment cleared to opaque black in `ShaderRead`.
fn create_snapshot(device: &Arc<Device>, desc: TargetDesc) -> RenderResult<PassAttachment> {
    let mut snapshot =
        PassAttachment::color(device.clone(), "scene color", desc.extent, desc.format)?;
    device.execute_single_use(|raw| {
        let cmd = CommandBuffer::from_handle(device.clone(), raw);
        snapshot.transition(&cmd, AttachmentState::TransferDst);
        cmd.clear_color_image(snapshot.image(), [0.0, 0.0, 0.0, 1.0]);
        snapshot.transition(&cmd, AttachmentState::ShaderRead);
    })?;
    Ok(snapshot)
}

fn skip_exhausted<T>(result: Result<T, CacheError>) -> RenderResult<()> {
    match result {
        Ok(_) => Ok(()),
        Err(e @ CacheError::Exhausted { .. }) => {
            warn!("{}; draws using it are skipped", e);
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn missing_slot_object(slot: usize) -> RenderError {
    RenderError::SlotProtocol {
        slot,
        reason: "missing per-slot Vulkan object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_resize_request_is_idempotent() {
        let mut once = ResizeStateMachine::new();
        once.request_resize(800, 600);
        let mut twice = ResizeStateMachine::new();
        twice.request_resize(800, 600);
        twice.request_resize(800, 600);
        assert_eq!(once, twice);
        assert_eq!(once.state(), ResizeState::Invalid);
    }

    #[test]
    fn test_resize_to_current_extent_is_a_no_op() {
        let mut machine = ResizeStateMachine::new();
        machine.request_resize(800, 600);
        assert_eq!(machine.begin_recreate(extent(800, 600)), None);
        assert_eq!(machine.state(), ResizeState::Ready);
        assert_eq!(machine.pending(), None);

        // Away and straight back before the next frame.
        machine.request_resize(1024, 768);
        machine.request_resize(800, 600);
        assert_eq!(machine.begin_recreate(extent(800, 600)), None);
        assert!(machine.is_ready());
    }

    #[test]
    fn test_stale_target_rebuilds_at_same_extent() {
        let mut machine = ResizeStateMachine::new();
        machine.mark_invalid();
        machine.request_resize(800, 600);
        assert_eq!(machine.begin_recreate(extent(800, 600)), Some(extent(800, 600)));
        machine.finish_recreate();

        machine.request_resize(800, 600);
        assert_eq!(machine.begin_recreate(extent(800, 600)), None);
    }

    #[test]
    fn test_latest_request_wins() {
        let mut machine = ResizeStateMachine::new();
        machine.request_resize(640, 480);
        machine.request_resize(1024, 768);
        assert_eq!(machine.begin_recreate(extent(1, 1)), Some(extent(1024, 768)));
    }

    #[test]
    fn test_zero_extent_stays_invalid() {
        let mut machine = ResizeStateMachine::new();
        machine.request_resize(0, 600);
        assert_eq!(machine.begin_recreate(extent(800, 600)), None);
        assert_eq!(machine.state(), ResizeState::Invalid);

        machine.request_resize(800, 600);
        assert_eq!(machine.begin_recreate(extent(0, 0)), Some(extent(800, 600)));
        assert_eq!(machine.state(), ResizeState::Recreating);
    }

    #[test]
    fn test_ready_does_not_recreate() {
        let mut machine = ResizeStateMachine::new();
        assert!(machine.is_ready());
        assert_eq!(machine.begin_recreate(extent(800, 600)), None);
    }

    #[test]
    fn test_there_and_back() {
        let mut machine = ResizeStateMachine::new();
        for (w, h) in [(1024, 768), (800, 600)] {
            machine.request_resize(w, h);
            assert_eq!(machine.begin_recreate(extent(1, 1)), Some(extent(w, h)));
            machine.finish_recreate();
            assert!(machine.is_ready());
            assert_eq!(machine.pending(), None);
        }
    }

    #[test]
    fn test_out_of_date_uses_current_extent() {
        let mut machine = ResizeStateMachine::new();
        machine.mark_invalid();
        assert_eq!(machine.begin_recreate(extent(800, 600)), Some(extent(800, 600)));
    }

    #[test]
    fn test_failed_recreate_retries() {
        let mut machine = ResizeStateMachine::new();
        machine.request_resize(800, 600);
        assert!(machine.begin_recreate(extent(1, 1)).is_some());
        machine.fail_recreate();
        assert_eq!(machine.state(), ResizeState::Invalid);
        assert_eq!(machine.begin_recreate(extent(1, 1)), Some(extent(800, 600)));

        // A target half-rebuilt at the requested size is still rebuilt.
        machine.fail_recreate();
        assert_eq!(machine.begin_recreate(extent(800, 600)), Some(extent(800, 600)));
    }

    #[test]
    fn test_request_during_recreate_is_kept() {
        let mut machine = ResizeStateMachine::new();
        machine.request_resize(800, 600);
        assert!(machine.begin_recreate(extent(1, 1)).is_some());
        machine.request_resize(1280, 720);
        assert_eq!(machine.state(), ResizeState::Recreating);
        assert_eq!(machine.pending(), Some(extent(1280, 720)));
    }

    #[test]
    fn test_deferred_plan_with_water() {
        assert_eq!(
            plan_frame(RenderMode::Deferred, true, true),
            vec![
                FrameStep::GBuffer,
                FrameStep::Ssr,
                FrameStep::Lighting,
                FrameStep::Snapshot,
                FrameStep::Water,
            ]
        );
    }

    #[test]
    fn test_ssr_disabled_clears_reflections() {
        let plan = plan_frame(RenderMode::Forward, false, true);
        assert!(plan.contains(&FrameStep::ClearReflections));
        assert!(!plan.contains(&FrameStep::Ssr));
        assert!(plan.contains(&FrameStep::Forward));
    }

    #[test]
    fn test_no_water_skips_reflections() {
        for ssr in [false, true] {
            let plan = plan_frame(RenderMode::Deferred, ssr, false);
            assert_eq!(
                plan,
                vec![FrameStep::GBuffer, FrameStep::Lighting, FrameStep::Snapshot]
            );
        }
    }

    #[test]
    fn test_plan_order_is_fixed() {
        for mode in [RenderMode::Deferred, RenderMode::Forward] {
            for ssr in [false, true] {
                for water in [false, true] {
                    let plan = plan_frame(mode, ssr, water);
                    assert_eq!(plan.first(), Some(&FrameStep::GBuffer));
                    let shade = plan
                        .iter()
                        .position(|s| matches!(s, FrameStep::Lighting | FrameStep::Forward));
                    let snapshot = plan.iter().position(|s| *s == FrameStep::Snapshot);
                    assert!(shade < snapshot);
                    if water {
                        assert_eq!(plan.last(), Some(&FrameStep::Water));
                    }
                }
            }
        }
    }
}
