//! Window-facing renderer.
//!
//! [`Renderer`] owns the whole Vulkan object graph for one window and drives
//! the [`FrameOrchestrator`] against its swapchain.
//!
//! # Destruction order
//!
//! 1. Wait for the device to go idle
//! 2. Orchestrator (passes, frame slots, snapshot)
//! 3. Resources (meshes, textures)
//! 4. Swapchain
//! 5. Device
//! 6. Surface
//! 7. Instance
//!
//! `ManuallyDrop` enforces the order.

use std::mem::ManuallyDrop;
use std::sync::Arc;

use ash::vk;
use tracing::{error, info};

use vesper_core::RendererConfig;
use vesper_platform::{Surface, Window};
use vesper_resources::{MeshData, MeshHandle, ResourceContext};
use vesper_rhi::device::Device;
use vesper_rhi::instance::Instance;
use vesper_rhi::physical_device::{PresentSurface, select_physical_device};
use vesper_rhi::swapchain::Swapchain;
use vesper_scene::FrameParameters;

use crate::error::RenderResult;
use crate::orchestrator::{FrameOrchestrator, FrameStatus};

pub struct Renderer {
    orchestrator: ManuallyDrop<FrameOrchestrator>,
    resources: ManuallyDrop<ResourceContext>,
    swapchain: ManuallyDrop<Swapchain>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,
}

impl Renderer {
    /// Initializes Vulkan for `window` and builds every pass.
    ///
    /// # Errors
    ///
    /// Fails if no suitable GPU exists, the surface cannot be created or any
    /// pass fails to build (for example when SPIR-V is missing).
    pub fn new(window: &Window, config: &RendererConfig) -> RenderResult<Self> {
        info!(
            "Initializing renderer ({}x{})",
            window.width(),
            window.height()
        );

        let extensions = window.required_extensions()?;
        let instance = Instance::new(config.render.validation, &extensions)?;
        let surface = window.create_surface(instance.entry(), instance.handle())?;
        let physical_device = select_physical_device(
            instance.handle(),
            Some(PresentSurface {
                surface: surface.handle(),
                loader: surface.loader(),
            }),
        )?;
        let device = Device::new(&instance, &physical_device)?;
        let swapchain = Swapchain::new(
            &instance,
            device.clone(),
            surface.handle(),
            window.width(),
            window.height(),
        )?;
        let resources = ResourceContext::new(device.clone())?;
        let orchestrator = FrameOrchestrator::new(device.clone(), config, &swapchain)?;

        info!(
            "Renderer initialized: {} swapchain images, {:?}",
            swapchain.image_count(),
            swapchain.present_mode()
        );

        Ok(Self {
            orchestrator: ManuallyDrop::new(orchestrator),
            resources: ManuallyDrop::new(resources),
            swapchain: ManuallyDrop::new(swapchain),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
        })
    }

    /// Schedules swapchain recreation at the new window size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.orchestrator.request_resize(width, height);
    }

    /// Recreates the swapchain if needed, then renders and presents a frame.
    pub fn render(&mut self, params: &FrameParameters<'_>) -> RenderResult<FrameStatus> {
        self.orchestrator.recreate(&mut *self.swapchain)?;
        self.orchestrator
            .render_frame(&self.swapchain, params, &mut self.resources)
    }

    pub fn upload_mesh(&mut self, name: &str, data: &MeshData) -> RenderResult<MeshHandle> {
        Ok(self.resources.upload_mesh(name, data)?)
    }

    #[inline]
    pub fn resources(&self) -> &ResourceContext {
        &self.resources
    }

    #[inline]
    pub fn resources_mut(&mut self) -> &mut ResourceContext {
        &mut self.resources
    }

    #[inline]
    pub fn orchestrator(&self) -> &FrameOrchestrator {
        &self.orchestrator
    }

    #[inline]
    pub fn orchestrator_mut(&mut self) -> &mut FrameOrchestrator {
        &mut self.orchestrator
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {}", e);
        }

        // SAFETY: each field is dropped exactly once, here, in dependency order.
        unsafe {
            ManuallyDrop::drop(&mut self.orchestrator);
            ManuallyDrop::drop(&mut self.resources);
            ManuallyDrop::drop(&mut self.swapchain);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}
