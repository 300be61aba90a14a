//! Deferred lighting composite.
//!
//! A full-screen triangle reads the G-buffer and writes lit color straight
//! into the target: one point light (Lambert diffuse plus Blinn-Phong
//! specular with a smooth radius falloff) and constant ambient. Pixels with
//! zero coverage are written as opaque black.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vesper_core::LightingConfig;
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, image_info,
    write_combined_images,
};
use vesper_rhi::device::Device;
use vesper_rhi::pipeline::{ColorBlend, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout};
use vesper_rhi::rendering::{ColorAttachment, RenderingConfig};
use vesper_rhi::sampler::{Sampler, SamplerKind};
use vesper_rhi::shader::Shader;

use crate::FRAMES_IN_FLIGHT;
use crate::attachment::{AttachmentRole, AttachmentState};
use crate::error::{RenderError, RenderResult};
use crate::params::LightingUniform;
use crate::passes::{FrameContext, PassKind, RenderPass, ResizeContext, UniformBinding};
use crate::shaders::{ShaderSet, names};

pub struct LightingPass {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    pipeline_format: vk::Format,
    input_set: vk::DescriptorSet,
    inputs_bound: bool,
    uniforms: UniformBinding<LightingUniform>,
    pipeline_layout: PipelineLayout,
    _pool: DescriptorPool,
    _input_layout: DescriptorSetLayout,
    _uniform_layout: DescriptorSetLayout,
    sampler: Sampler,
    vertex: Shader,
    fragment: Shader,
    lighting: LightingConfig,
}

impl LightingPass {
    pub fn new(
        device: Arc<Device>,
        shaders: &ShaderSet,
        lighting: LightingConfig,
    ) -> RenderResult<Self> {
        let uniform_layout = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        let input_layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorBindingBuilder::fragment_samplers(3),
        )?;
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[uniform_layout.handle(), input_layout.handle()],
            &[],
        )?;

        let mut sizes = uniform_layout.pool_sizes(FRAMES_IN_FLIGHT as u32);
        sizes.extend(input_layout.pool_sizes(1));
        let pool = DescriptorPool::new(device.clone(), FRAMES_IN_FLIGHT as u32 + 1, &sizes)?;
        let uniforms = UniformBinding::new(&device, &pool, &uniform_layout)?;
        let input_set = pool
            .allocate(&[input_layout.handle()])?
            .into_iter()
            .next()
            .ok_or(RenderError::MissingInput {
                pass: PassKind::Lighting.name(),
                input: "descriptor set",
            })?;

        debug!("Created lighting pass");

        Ok(Self {
            sampler: Sampler::new(device.clone(), SamplerKind::NearestClamp)?,
            vertex: shaders.vertex(names::FULLSCREEN_VERT)?,
            fragment: shaders.fragment(names::LIGHTING_FRAG)?,
            device,
            pipeline: None,
            pipeline_format: vk::Format::UNDEFINED,
            input_set,
            inputs_bound: false,
            uniforms,
            pipeline_layout,
            _pool: pool,
            _input_layout: input_layout,
            _uniform_layout: uniform_layout,
            lighting,
        })
    }

    fn build_pipeline(&self, format: vk::Format) -> RenderResult<Pipeline> {
        Ok(GraphicsPipelineBuilder::new("lighting")
            .vertex_shader(&self.vertex)
            .fragment_shader(&self.fragment)
            .cull_mode(CullMode::None)
            .blend(ColorBlend::Opaque)
            .color_attachment_format(format)
            .build(self.device.clone(), &self.pipeline_layout)?)
    }

    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.lighting = lighting;
    }
}

impl RenderPass for LightingPass {
    fn kind(&self) -> PassKind {
        PassKind::Lighting
    }

    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()> {
        let gbuffer = ctx.inputs.gbuffer(PassKind::Lighting)?;
        let sampler = self.sampler.handle();
        let layout = AttachmentState::ShaderRead.layout(AttachmentRole::Color);
        write_combined_images(
            &self.device,
            self.input_set,
            &[
                image_info(sampler, gbuffer.position, layout),
                image_info(sampler, gbuffer.normal, layout),
                image_info(sampler, gbuffer.albedo, layout),
            ],
        );
        self.inputs_bound = true;

        if self.pipeline.is_none() || self.pipeline_format != ctx.target_format {
            self.pipeline = None;
            self.pipeline = Some(self.build_pipeline(ctx.target_format)?);
            self.pipeline_format = ctx.target_format;
        }
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()> {
        let params = frame.params;
        let uniform_set = self.uniforms.update(
            frame.slot,
            &LightingUniform::new(params.camera, params.lights, &self.lighting),
        )?;
        let pipeline = match (&self.pipeline, self.inputs_bound) {
            (Some(pipeline), true) => pipeline,
            _ => {
                return Err(RenderError::MissingInput {
                    pass: PassKind::Lighting.name(),
                    input: "G-buffer",
                });
            }
        };

        let target = frame.target;
        let rendering = RenderingConfig::new(target.extent)
            .with_color_attachment(
                ColorAttachment::new(target.view).with_clear_color([0.0, 0.0, 0.0, 1.0]),
            )
            .build();

        cmd.begin_rendering(&rendering.info());
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.set_viewport_scissor(target.extent);
        cmd.bind_descriptor_sets(
            self.pipeline_layout.handle(),
            0,
            &[uniform_set, self.input_set],
        );
        cmd.draw(3, 1);
        cmd.end_rendering();
        Ok(())
    }
}
