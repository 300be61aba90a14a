//! Forward shading into the target.
//!
//! Used instead of the lighting composite when the renderer runs in forward
//! mode. Geometry is drawn again with full material shading (sun plus up to
//! four point lights), depth-tested read-only against the G-buffer depth with
//! `GREATER_OR_EQUAL` so that only the front-most surface of each pixel is
//! shaded.
//!
//! Set 0 is the per-slot camera/light block, set 1 the per-material textures.
//! Resizing rebuilds only the pipeline; the layouts and the material cache
//! survive.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, trace, warn};

use vesper_core::LightingConfig;
use vesper_resources::{MaterialIdentity, ResourceContext};
use vesper_rhi::command::CommandBuffer;
use vesper_rhi::descriptor::{DescriptorBindingBuilder, DescriptorPool, DescriptorSetLayout};
use vesper_rhi::device::Device;
use vesper_rhi::physical_device::DEPTH_FORMAT;
use vesper_rhi::pipeline::{
    ColorBlend, CompareOp, CullMode, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use vesper_rhi::rendering::{ColorAttachment, DepthAttachment, RenderingConfig};
use vesper_rhi::shader::Shader;
use vesper_rhi::vertex::Vertex;

use crate::FRAMES_IN_FLIGHT;
use crate::error::{RenderError, RenderResult};
use crate::material_cache::{CacheError, MaterialDescriptorCache, MaterialHandle, VulkanSegments};
use crate::params::{CameraLightUniform, DrawPushConstants};
use crate::passes::{FrameContext, PassKind, RenderPass, ResizeContext, UniformBinding};
use crate::shaders::{ShaderSet, names};

pub struct ForwardPass {
    device: Arc<Device>,
    pipeline: Option<Pipeline>,
    depth_view: Option<vk::ImageView>,
    materials: MaterialDescriptorCache<VulkanSegments>,
    camera: UniformBinding<CameraLightUniform>,
    pipeline_layout: PipelineLayout,
    _uniform_pool: DescriptorPool,
    _material_layout: DescriptorSetLayout,
    _camera_layout: DescriptorSetLayout,
    vertex: Shader,
    fragment: Shader,
    lighting: LightingConfig,
}

impl ForwardPass {
    pub fn new(
        device: Arc<Device>,
        shaders: &ShaderSet,
        segment_capacity: u32,
        lighting: LightingConfig,
    ) -> RenderResult<Self> {
        let camera_layout = DescriptorSetLayout::new(
            device.clone(),
            &[DescriptorBindingBuilder::uniform_buffer(
                0,
                vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
            )],
        )?;
        let material_layout = DescriptorSetLayout::new(
            device.clone(),
            &DescriptorBindingBuilder::fragment_samplers(3),
        )?;

        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(DrawPushConstants::SIZE);
        let pipeline_layout = PipelineLayout::new(
            device.clone(),
            &[camera_layout.handle(), material_layout.handle()],
            &[push_range],
        )?;

        let uniform_pool =
            DescriptorPool::for_layout(device.clone(), &camera_layout, FRAMES_IN_FLIGHT as u32)?;
        let camera = UniformBinding::new(&device, &uniform_pool, &camera_layout)?;
        let materials = MaterialDescriptorCache::new(
            VulkanSegments::new(device.clone(), &material_layout),
            segment_capacity,
        );

        debug!("Created forward pass");

        Ok(Self {
            vertex: shaders.vertex(names::FORWARD_VERT)?,
            fragment: shaders.fragment(names::FORWARD_FRAG)?,
            device,
            pipeline: None,
            depth_view: None,
            materials,
            camera,
            pipeline_layout,
            _uniform_pool: uniform_pool,
            _material_layout: material_layout,
            _camera_layout: camera_layout,
            lighting,
        })
    }

    fn build_pipeline(&self, format: vk::Format) -> RenderResult<Pipeline> {
        Ok(GraphicsPipelineBuilder::new("forward")
            .vertex_shader(&self.vertex)
            .fragment_shader(&self.fragment)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .depth_test_enable(true)
            .depth_write_enable(false)
            .depth_compare_op(CompareOp::GreaterOrEqual)
            .blend(ColorBlend::Opaque)
            .color_attachment_format(format)
            .depth_attachment_format(DEPTH_FORMAT)
            .build(self.device.clone(), &self.pipeline_layout)?)
    }

    pub fn allocate_material_descriptor(
        &mut self,
        material: &MaterialIdentity,
        resources: &mut ResourceContext,
    ) -> Result<MaterialHandle, CacheError> {
        self.materials
            .get_or_allocate(material, || resources.material_images(material))
    }

    pub fn get_material_descriptor(&self, material: &MaterialIdentity) -> Option<MaterialHandle> {
        self.materials.get(material)
    }

    pub fn material_cache(&self) -> &MaterialDescriptorCache<VulkanSegments> {
        &self.materials
    }

    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.lighting = lighting;
    }
}

impl RenderPass for ForwardPass {
    fn kind(&self) -> PassKind {
        PassKind::Forward
    }

    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()> {
        self.depth_view = Some(ctx.inputs.gbuffer(PassKind::Forward)?.depth);
        self.pipeline = None;
        self.pipeline = Some(self.build_pipeline(ctx.target_format)?);
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()> {
        let params = frame.params;
        let camera_set = self.camera.update(
            frame.slot,
            &CameraLightUniform::new(params.camera, params.lights, &self.lighting),
        )?;
        let (Some(pipeline), Some(depth_view)) = (&self.pipeline, self.depth_view) else {
            return Err(RenderError::MissingInput {
                pass: PassKind::Forward.name(),
                input: "G-buffer depth",
            });
        };

        let target = frame.target;
        let rendering = RenderingConfig::new(target.extent)
            .with_color_attachment(
                ColorAttachment::new(target.view).with_clear_color([0.0, 0.0, 0.0, 1.0]),
            )
            .with_depth_attachment(DepthAttachment::new(depth_view).read_only())
            .build();

        cmd.begin_rendering(&rendering.info());
        cmd.bind_graphics_pipeline(pipeline.handle());
        cmd.set_viewport_scissor(target.extent);
        cmd.bind_descriptor_sets(self.pipeline_layout.handle(), 0, &[camera_set]);

        let meshes = frame.resources.meshes();
        for draw in params.draws {
            let Some(material) = self.materials.get(&draw.material) else {
                trace!("Skipping draw without material descriptors: {}", draw.material);
                continue;
            };
            let Some(mesh) = meshes.get(draw.mesh) else {
                warn!("Skipping draw of unknown mesh {:?}", draw.mesh);
                continue;
            };

            cmd.bind_descriptor_sets(
                self.pipeline_layout.handle(),
                1,
                &[material.set(frame.slot)],
            );
            cmd.push_constants(
                self.pipeline_layout.handle(),
                vk::ShaderStageFlags::VERTEX,
                &DrawPushConstants::new(draw.model),
            );
            cmd.bind_vertex_buffer(mesh.vertex_buffer());
            cmd.bind_index_buffer(mesh.index_buffer(), mesh.index_type());
            cmd.draw_indexed(mesh.index_count(), 1);
        }

        cmd.end_rendering();
        Ok(())
    }
}
