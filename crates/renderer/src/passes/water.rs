//! Animated water surface.
//!
//! A subdivided grid displaced by summed sine waves in the vertex shader.
//! The fragment shader combines:
//!
//! - refraction: the scene-color snapshot behind the surface, offset by the
//!   wave normal and tinted by the water color over the depth of the water
//!   column (from the G-buffer depth);
//! - reflection: an inline ray march against the G-buffer depth with the
//!   water's own [`SsrSettings`], falling back to the SSR pass output
//!   weighted by its alpha;
//! - a Fresnel term mixing the two.
//!
//! Output is straight alpha (`opacity`) blended over the target. The G-buffer
//! depth is bound read-only so the water is hidden behind opaque geometry.
//! [`crate::reference::water`] mirrors the compose step on the CPU.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vesper_core::WaterConfig;
use vesper_resources::{GpuMesh, MeshData};
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::descriptor::{
    DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout, image_info,
    write_combined_images,
};
use vesper_rhi::device::Device;
use vesper_rhi::physical_device::DEPTH_FORMAT;
use vesper_rhi::pipeline::{
    ColorBlend, CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use vesper_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use vesper_rhi::sampler::{Sampler, SamplerKind};
use vesper_rhi::shader::Shader;
use vesper_rhi::vertex::Vertex;

use crate::FRAMES_IN_FLIGHT;
use crate::attachment::{AttachmentRole, AttachmentState};
use crate::error::{RenderError, RenderResult};
use crate::params::{SsrSettings, WaterFrame, WaterPushConstants, WaterUniform};
use crate::passes::{FrameContext, PassKind, RenderPass, ResizeContext, UniformBinding};
use crate::shaders::{ShaderSet, names};

pub struct WaterPass {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    pipeline_format: vk::Format,
    depth_view: Option<vk::ImageView>,
    input_set: vk::DescriptorSet,
    uniforms: UniformBinding<WaterUniform>,
    pipeline_layout: PipelineLayout,
    _pool: DescriptorPool,
    _input_layout: DescriptorSetLayout,
    _uniform_layout: DescriptorSetLayout,
    linear_sampler: Sampler,
    point_sampler: Sampler,
    vertex: Shader,
    fragment: Shader,
    mesh: GpuMesh,
    config: WaterConfig,
    ssr: SsrSettings,
}

impl WaterPass {
    /// Creates the pass with a grid of `config.size` and `config.subdivisions`.
    pub fn new(
        device: Arc<Device>,
        shaders: &ShaderSet,
        config: WaterConfig,
        ssr: SsrSettings,
    ) -> RenderResult<Self> {
        let grid = MeshData::grid(config.size, config.subdivisions.max(1), 0.0);
        Self::with_mesh(device, shaders, config, ssr, &grid)
    }

    /// Creates the pass with an externally supplied surface mesh.
    pub fn with_mesh(
        device: Arc<Device>,
        shaders: &ShaderSet,
        config: WaterConfig,
        ssr: SsrSettings,
        mesh: &MeshData,
    ) -> RenderResult<Self> {
        let uniform_layout = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        // reflection, depth, scene color
        let input_layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorBindingBuilder::fragment_samplers(3),
        )?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(WaterPushConstants::SIZE);
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[uniform_layout.handle(), input_layout.handle()],
            &[push_range],
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
                pass: PassKind::Water.name(),
                input: "descriptor set",
            })?;

        let mesh = GpuMesh::upload(device.clone(), mesh)?;
        debug!("Created water pass ({} indices)", mesh.index_count());

        Ok(Self {
            linear_sampler: Sampler::new(device.clone(), SamplerKind::LinearClamp)?,
            point_sampler: Sampler::new(device.clone(), SamplerKind::NearestClamp)?,
            vertex: shaders.vertex(names::WATER_VERT)?,
            fragment: shaders.fragment(names::WATER_FRAG)?,
            device,
            pipeline: None,
            pipeline_format: vk::Format::UNDEFINED,
            depth_view: None,
            input_set,
            uniforms,
            pipeline_layout,
            _pool: pool,
            _input_layout: input_layout,
            _uniform_layout: uniform_layout,
            mesh,
            config,
            ssr,
        })
    }

    fn build_pipeline(&self, format: vk::Format) -> RenderResult<Pipeline> {
        Ok(GraphicsPipelineBuilder::new("water")
            .vertex_shader(&self.vertex)
            .fragment_shader(&self.fragment)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::None)
            .depth_test_enable(true)
            .depth_write_enable(false)
            .depth_compare_op(CompareOp::GreaterOrEqual)
            .blend(ColorBlend::StraightAlpha)
            .color_attachment_format(format)
            .depth_attachment_format(DEPTH_FORMAT)
            .build(self.device.clone(), &self.pipeline_layout)?)
    }

    #[inline]
    pub fn config(&self) -> &WaterConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: WaterConfig) {
        self.config = config;
    }

    #[inline]
    pub fn ssr_settings(&self) -> &SsrSettings {
        &self.ssr
    }
}

impl RenderPass for WaterPass {
    fn kind(&self) -> PassKind {
        PassKind::Water
    }

    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()> {
        let depth = ctx.inputs.gbuffer(PassKind::Water)?.depth;
        let reflection = ctx.inputs.reflection(PassKind::Water)?;
        let scene_color = ctx.inputs.scene_color(PassKind::Water)?;

        let color_layout = AttachmentState::ShaderRead.layout(AttachmentRole::Color);
        let depth_layout = AttachmentState::ShaderRead.layout(AttachmentRole::Depth);
        write_combined_images(
            &self.device,
            self.input_set,
            &[
                image_info(self.linear_sampler.handle(), reflection, color_layout),
                image_info(self.point_sampler.handle(), depth, depth_layout),
                image_info(self.linear_sampler.handle(), scene_color, color_layout),
            ],
        );
        self.depth_view = Some(depth);

        if self.pipeline.is_none() || self.pipeline_format != ctx.target_format {
            self.pipeline = None;
            self.pipeline = Some(self.build_pipeline(ctx.target_format)?);
            self.pipeline_format = ctx.target_format;
        }
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()> {
        let Some(surface) = frame.params.water else {
            return Ok(());
        };
        let target = frame.target;
        let uniform_set = self.uniforms.update(
            frame.slot,
            &WaterUniform::new(&WaterFrame {
                camera: frame.params.camera,
                lights: frame.params.lights,
                water: &self.config,
                ssr: &self.ssr,
                time: frame.time,
                width: target.extent.width,
                height: target.extent.height,
            }),
        )?;
        let (Some(pipeline), Some(depth_view)) = (&self.pipeline, self.depth_view) else {
            return Err(RenderError::MissingInput {
                pass: PassKind::Water.name(),
                input: "G-buffer depth",
            });
        };

        let rendering = RenderingConfig::new(target.extent)
            .with_color_attachment(ColorAttachment::new(target.view).load())
            .with_depth_attachment(DepthAttachment::new(depth_view).read_only())
            .build();

        cmd.begin_rendering(&rendering.info());
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.set_viewport_scissor(target.extent);
        cmd.bind_descriptor_sets(
            self.pipeline_layout.handle(),
            0,
            &[uniform_set, self.input_set],
        );
        cmd.push_constants(
            self.pipeline_layout.handle(),
            vk::ShaderStageFlags::VERTEX,
            &WaterPushConstants {
                model: surface.model,
            },
        );
        cmd.bind_vertex_buffer(self.mesh.vertex_buffer());
        cmd.bind_index_buffer(self.mesh.index_buffer(), self.mesh.index_type());
        cmd.draw_indexed(self.mesh.index_count(), 1);
        cmd.end_rendering();
        Ok(())
    }
}
