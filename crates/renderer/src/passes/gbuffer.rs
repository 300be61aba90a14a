//! Geometry pass: fills the G-buffer.
//!
//! | attachment | format                | contents                         |
//! |------------|-----------------------|----------------------------------|
//! | position   | `R32G32B32A32_SFLOAT` | world position, w = coverage     |
//! | normal     | `R16G16B16A16_SFLOAT` | world normal, w = roughness      |
//! | albedo     | `R8G8B8A8_UNORM`      | base color, a = metallic         |
//! | depth      | `D32_SFLOAT`          | reverse-Z depth                  |
//!
//! Colors clear to 0 (so coverage is 0 where nothing was drawn) and depth
//! clears to 0, the far plane. All four attachments end the pass in
//! [`AttachmentState::ShaderRead`].

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
use vesper_rhi::vertex::Vertex;

use crate::FRAMES_IN_FLIGHT;
use crate::attachment::{AttachmentState, PassAttachment};
use crate::error::{RenderError, RenderResult};
use crate::material_cache::{CacheError, MaterialDescriptorCache, MaterialHandle, VulkanSegments};
use crate::params::{CameraLightUniform, DrawPushConstants};
use crate::passes::{FrameContext, PassKind, RenderPass, ResizeContext, UniformBinding};
use crate::shaders::{ShaderSet, names};
use crate::target::{DepthReadback, copy_image_to_host};

pub const POSITION_FORMAT: vk::Format = vk::Format::R32G32B32A32_SFLOAT;
pub const NORMAL_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
pub const ALBEDO_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

/// Views of the four G-buffer attachments.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GBufferViews {
    pub position: vk::ImageView,
    pub normal: vk::ImageView,
    pub albedo: vk::ImageView,
    pub depth: vk::ImageView,
}

struct GBufferTargets {
    position: PassAttachment,
    normal: PassAttachment,
    albedo: PassAttachment,
    depth: PassAttachment,
}

impl GBufferTargets {
    fn new(device: &Arc<Device>, extent: vk::Extent2D) -> RenderResult<Self> {
        Ok(Self {
            position: PassAttachment::color(
                device.clone(),
                "gbuffer position",
                extent,
                POSITION_FORMAT,
            )?,
            normal: PassAttachment::color(device.clone(), "gbuffer normal", extent, NORMAL_FORMAT)?,
            albedo: PassAttachment::color(device.clone(), "gbuffer albedo", extent, ALBEDO_FORMAT)?,
            depth: PassAttachment::depth(device.clone(), "gbuffer depth", extent, DEPTH_FORMAT)?,
        })
    }

    fn colors_mut(&mut self) -> [&mut PassAttachment; 3] {
        [&mut self.position, &mut self.normal, &mut self.albedo]
    }

    fn transition_all(
        &mut self,
        cmd: &CommandBuffer,
        color: AttachmentState,
        depth: AttachmentState,
    ) {
        for attachment in self.colors_mut() {
            attachment.transition(cmd, color);
        }
        self.depth.transition(cmd, depth);
    }

    fn views(&self) -> GBufferViews {
        GBufferViews {
            position: self.position.view(),
            normal: self.normal.view(),
            albedo: self.albedo.view(),
            depth: self.depth.view(),
        }
    }
}

pub struct GBufferPass {
    device: Arc<Device>,
    targets: Option<GBufferTargets>,
    materials: MaterialDescriptorCache<VulkanSegments>,
    camera: UniformBinding<CameraLightUniform>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    _uniform_pool: DescriptorPool,
    _material_layout: DescriptorSetLayout,
    _camera_layout: DescriptorSetLayout,
    lighting: LightingConfig,
}

impl GBufferPass {
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

        let vertex = shaders.vertex(names::GBUFFER_VERT)?;
        let fragment = shaders.fragment(names::GBUFFER_FRAG)?;
        let pipeline = GraphicsPipelineBuilder::new("gbuffer")
            .vertex_shader(&vertex)
            .fragment_shader(&fragment)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(CompareOp::Greater)
            .blend(ColorBlend::Opaque)
            .color_attachment_formats(&[POSITION_FORMAT, NORMAL_FORMAT, ALBEDO_FORMAT])
            .depth_attachment_format(DEPTH_FORMAT)
            .build(device.clone(), &pipeline_layout)?;

        let uniform_pool =
            DescriptorPool::for_layout(device.clone(), &camera_layout, FRAMES_IN_FLIGHT as u32)?;
        let camera = UniformBinding::new(&device, &uniform_pool, &camera_layout)?;

        let materials = MaterialDescriptorCache::new(
            VulkanSegments::new(device.clone(), &material_layout),
            segment_capacity,
        );

        debug!("Created G-buffer pass");

        Ok(Self {
            device,
            targets: None,
            materials,
            camera,
            pipeline,
            pipeline_layout,
            _uniform_pool: uniform_pool,
            _material_layout: material_layout,
            _camera_layout: camera_layout,
            lighting,
        })
    }

    /// Resolves and caches the descriptor sets of `material`.
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

    /// Views of the current attachments, once the pass has been sized.
    pub fn views(&self) -> Option<GBufferViews> {
        self.targets.as_ref().map(GBufferTargets::views)
    }

    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.targets.as_ref().map(|t| t.depth.extent())
    }

    pub fn set_lighting(&mut self, lighting: LightingConfig) {
        self.lighting = lighting;
    }

    /// Copies the depth attachment of the last frame to host memory.
    ///
    /// The frame must have completed. The attachment is returned to
    /// `ShaderRead` afterwards.
    ///
    /// # Errors
    ///
    /// Returns [`RenderError::MissingInput`] before the pass has been sized,
    /// or the Vulkan error of the copy.
    pub fn read_back_depth(&mut self) -> RenderResult<DepthReadback> {
        let device = self.device.clone();
        let depth = &mut self
            .targets
            .as_mut()
            .ok_or(RenderError::MissingInput {
                pass: PassKind::GBuffer.name(),
                input: "attachments",
            })?
            .depth;

        device.execute_single_use(|raw| {
            let cmd = CommandBuffer::from_handle(device.clone(), raw);
            depth.transition(&cmd, AttachmentState::TransferSrc);
        })?;
        let bytes = copy_image_to_host(
            &device,
            depth.image(),
            depth.extent(),
            vk::ImageAspectFlags::DEPTH,
            4,
        );
        device.execute_single_use(|raw| {
            let cmd = CommandBuffer::from_handle(device.clone(), raw);
            depth.transition(&cmd, AttachmentState::ShaderRead);
        })?;
        Ok(DepthReadback::from_bytes(depth.extent(), &bytes?))
    }
}

impl RenderPass for GBufferPass {
    fn kind(&self) -> PassKind {
        PassKind::GBuffer
    }

    fn resize(&mut self, ctx: &ResizeContext) -> RenderResult<()> {
        // Drop the old attachments before allocating the new ones.
        self.targets = None;
        self.targets = Some(GBufferTargets::new(&self.device, ctx.extent)?);
        debug!(
            "Resized G-buffer to {}x{}",
            ctx.extent.width, ctx.extent.height
        );
        Ok(())
    }

    fn record(&mut self, cmd: &CommandBuffer, frame: &FrameContext<'_>) -> RenderResult<()> {
        let params = frame.params;
        let camera_set = self.camera.update(
            frame.slot,
            &CameraLightUniform::new(params.camera, params.lights, &self.lighting),
        )?;

        let targets = self.targets.as_mut().ok_or(RenderError::MissingInput {
            pass: PassKind::GBuffer.name(),
            input: "attachments",
        })?;
        let extent = targets.depth.extent();

        targets.transition_all(cmd, AttachmentState::ColorWrite, AttachmentState::DepthWrite);

        let rendering = RenderingConfig::new(extent)
            .with_color_attachment(ColorAttachment::new(targets.position.view()))
            .with_color_attachment(ColorAttachment::new(targets.normal.view()))
            .with_color_attachment(ColorAttachment::new(targets.albedo.view()))
            .with_depth_attachment(DepthAttachment::new(targets.depth.view()).with_clear_depth(0.0))
            .build();

        cmd.begin_rendering(&rendering.info());
        cmd.bind_graphics_pipeline(self.pipeline.handle());
        cmd.set_viewport_scissor(extent);
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

        targets.transition_all(cmd, AttachmentState::ShaderRead, AttachmentState::ShaderRead);
        Ok(())
    }
}
