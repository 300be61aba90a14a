//! Screen-space reflections.
//!
//! For every covered, reflective G-buffer pixel the fragment shader reflects
//! the view ray about the surface normal and marches it in view space with a
//! fixed step of `max_distance / max_steps`. Each sample is projected to the
//! screen and compared against the linearized G-buffer depth; the first
//! sample with `0 < sample_depth - scene_depth < thickness` takes the scene
//! color at that pixel. Misses write transparent black.
//!
//! The scene color comes from the orchestrator's snapshot of the previous
//! frame. [`crate::reference::ssr`] mirrors the march on the CPU.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vesper_rhi::command::CommandBuffer;
use vesper_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, image_info,
    write_combined_images,
};
use vesper_rhi::device::Device;
use vesper_rhi::pipeline::{ColorBlend, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vesper_rhi::rendering::{ColorAttachment, RenderingConfig};
use vesper_rhi::sampler::{Sampler, SamplerKind};

use crate::FRAMES_IN_FLIGHT;
use crate::attachment::{AttachmentRole, AttachmentState, PassAttachment};
use crate::error::{RenderError, RenderResult};
use crate::params::{SsrSettings, SsrUniform};
use crate::passes::{
    FrameContext, GBufferViews, PassKind, RenderPass, ResizeContext, UniformBinding,
};
use crate::shaders::{ShaderSet, names};

pub const REFLECTION_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;

/// Views the input set currently points at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct BoundInputs {
    gbuffer: GBufferViews,
    scene_color: vk::ImageView,
}

pub struct SsrPass {
    device: Arc<Device>,
    output: Option<PassAttachment>,
    bound: Option<BoundInputs>,
    input_set: vk::DescriptorSet,
    uniforms: UniformBinding<SsrUniform>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    _pool: DescriptorPool,
    _input_layout: DescriptorSetLayout,
    _uniform_layout: DescriptorSetLayout,
    point_sampler: Sampler,
    linear_sampler: Sampler,
    settings: SsrSettings,
}

impl SsrPass {
    pub fn new(
        device: Arc<Device>,
        shaders: &ShaderSet,
        settings: SsrSettings,
    ) -> RenderResult<Self> {
        let uniform_layout = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        // position, normal, albedo, depth, scene color
        let input_layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorBindingBuilder::fragment_samplers(5),
        )?;

        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[uniform_layout.handle(), input_layout.handle()],
            &[],
        )?;

        let vertex = shaders.vertex(names::FULLSCREEN_VERT)?;
        let fragment = shaders.fragment(names::SSR_FRAG)?;
        let pipeline = GraphicsPipelineBuilder::new("ssr")
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .cull_mode(CullMode::None)
            .blend(ColorBlend::Opaque)
            .color_attachment_format(REFLECTION_FORMAT)
            .build(device.clone(), &pipeline_layout)?;

        let mut sizes = uniform_layout.pool_sizes(FRAMES_IN_FLIGHT as u32);
        sizes.extend(input_layout.pool_sizes(1));
        let pool = DescriptorPool::new(device.clone(), FRAMES_IN_FLIGHT as u32 + 1, &sizes)?;
        let uniforms = UniformBinding::new(&device, &pool, &uniform_layout)?;
        let input_set = pool
            .allocate(&[input_layout.handle()])?
            .into_iter()
            .next()
            .ok_or(RenderError::MissingInput {
                pass: PassKind::Ssr.name(),
                input: "descriptor set",
            })?;

        debug!(
            "Created SSR pass: max_distance={}, steps={}, thickness={}",
            settings.max_distance, settings.max_steps, settings.thickness
        );

        Ok(Self {
            point_sampler: Sampler::new(device.clone(), SamplerKind::NearestClamp)?,
            linear_sampler: Sampler::new(device.clone(), SamplerKind::LinearClamp)?,
            device,
            output: None,
            bound: None,
            input_set,
            uniforms,
            pipeline,
            pipeline_layout,
            _pool: pool,
            _input_layout: input_layout,
            _uniform_layout: uniform_layout,
            settings,
        })
    }

    /// Records the reflection pass for `slot`.
    ///
    /// The slot's uniform must already be written. The G-buffer must be in
    /// `ShaderRead`; the reflection output ends in `ShaderRead`. Rebinds the
    /// inputs if the views differ from the last call, which only happens
    /// while the device is idle after a resize.
    pub fn execute_reflection_pass(
        &mut self,
        cmd: &CommandBuffer,
        gbuffer: &GBufferViews,
        scene_color_view: vk::ImageView,
        slot: usize,
    ) -> RenderResult<()> {
        let inputs = BoundInputs {
            gbuffer: *gbuffer,
            scene_color: scene_color_view,
        };
        if self.bound != Some(inputs) {
            self.bind_inputs(inputs);
        }
        let uniform_set = self.uniforms.sets.get(slot).copied().ok_or(RenderError::SlotProtocol {
            slot,
            reason: "uniform set slot out of range",
        })?;

        let output = self.output.as_mut().ok_or(RenderError::MissingInput {
            pass: PassKind::Ssr.name(),
            input: "output attachment",
        })?;
        let extent = output.extent();

        output.transition(cmd, AttachmentState::ColorWrite);
        let rendering = RenderingConfig::new(extent)
            .with_color_attachment(ColorAttachment::new(output.view()))
            .build();
        cmd.begin_rendering(&rendering.info());
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.set_viewport_scissor(extent);
        cmd.bind_descriptor_sets(
            self.pipeline_layout.handle(),
            0,
            &[uniform_set, self.input_set],
        );
        cmd.draw(3, 1);
        cmd.end_rendering();
        output.transition(cmd, AttachmentState::ShaderRead);
        Ok(())
    }

    /// Clears the reflection output to transparent black, for frames where
    /// reflections are disabled but the output is still sampled.
    pub fn clear_reflections(&mut self, cmd: &CommandBuffer) -> RenderResult<()> {
        let output = self.output.as_mut().ok_or(RenderError::MissingInput {
            pass: PassKind::Ssr.name(),
            input: "output attachment",
        })?;
        output.transition(cmd, AttachmentState::ColorWrite);
        let rendering = RenderingConfig::new(output.extent())
            .with_color_attachment(ColorAttachment::new(output.view()))
            .build();
        cmd.begin_rendering(&rendering.info());
        cmd.end_rendering();
        output.transition(cmd, AttachmentState::ShaderRead);
        Ok(())
    }

    fn bind_inputs(&mut self, inputs: BoundInputs) {
        let point = self.point_sampler.handle();
        let color_layout = AttachmentState::ShaderRead.layout(AttachmentRole::Color);
        let depth_layout = AttachmentState::ShaderRead.layout(AttachmentRole::Depth);
        write_combined_images(
            &self.device,
            self.input_set,
            &[
                image_info(point, inputs.gbuffer.position, color_layout),
                image_info(point, inputs.gbuffer.normal, color_layout),
                image_info(point, inputs.gbuffer.albedo, color_layout),
                image_info(point, inputs.gbuffer.depth, depth_layout),
                image_info(self.linear_sampler.handle(), inputs.scene_color, color_layout),
            ],
        );
        self.bound = Some(inputs);
        debug!("Bound SSR inputs");
    }

    /// View of the reflection output, once the pass has been sized.
    pub fn output_view(&self) -> Option<vk::ImageView> {
        self.output.as_ref().map(PassAttachment::view)
    }

    pub fn output_extent(&self) -> Option<vk::Extent2D> {
        self.output.as_ref().map(PassAttachment::extent)
    }

    #[inline]
    pub fn settings(&self) -> &SsrSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SsrSettings) {
        self.settings = settings;
    }
}

impl RenderPass for SsrPass {
    fn kind(&self) -> PassKind {
        PassKind::Ssr
    }

    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()> {
        let inputs = BoundInputs {
            gbuffer: ctx.inputs.gbuffer(PassKind::Ssr)?,
            scene_color: ctx.inputs.scene_color(PassKind::Ssr)?,
        };
        self.output = None;
        self.output = Some(PassAttachment::color(
            self.device.clone(),
            "ssr reflection",
            ctx.extent,
            REFLECTION_FORMAT,
        )?);
        self.bind_inputs(inputs);
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()> {
        let bound = self.bound.ok_or(RenderError::MissingInput {
            pass: PassKind::Ssr.name(),
            input: "G-buffer",
        })?;
        let extent = self.output_extent().ok_or(RenderError::MissingInput {
            pass: PassKind::Ssr.name(),
            input: "output attachment",
        })?;
        self.uniforms.update(
            frame.slot,
            &SsrUniform::new(frame.params.camera, extent.width, extent.height, &self.settings),
        )?;
        self.execute_reflection_pass(cmd, &bound.gbuffer, bound.scene_color, frame.slot)
    }
}
