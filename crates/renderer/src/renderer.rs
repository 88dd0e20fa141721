//! Main renderer orchestration.
//!
//! [`Renderer`] owns every Vulkan object the application uses and drives the
//! per-frame protocol:
//!
//! 1. wait for the current slot's fence
//! 2. acquire a swapchain image (out of date: recreate and skip the frame)
//! 3. wait for whichever slot still renders into that image
//! 4. write the image's uniform buffer
//! 5. reset the fence, submit the prerecorded command buffer, present
//! 6. recreate when acquire or present was not optimal, or the window resized
//! 7. advance the slot
//!
//! Objects sized by the swapchain live in [`SwapchainResources`] and are torn
//! down and rebuilt together. Everything else is created once.

use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ash::vk;
use tracing::{debug, error, info};

use vkcraft_platform::{FramebufferSource, Surface, Window, required_surface_extensions};
use vkcraft_resources::{ImageCache, LoadSettings, ModelLoader, UniformBufferObject};
use vkcraft_rhi::buffer::{Buffer, BufferUsage};
use vkcraft_rhi::command::{CommandBuffer, CommandPool};
use vkcraft_rhi::descriptor::{
    DescriptorPool, DescriptorSetLayout, buffer_info, image_info, write_forward_set,
};
use vkcraft_rhi::device::Device;
use vkcraft_rhi::image::{Image, Sampler};
use vkcraft_rhi::instance::Instance;
use vkcraft_rhi::physical_device::select_adapter;
use vkcraft_rhi::pipeline::{
    CompareOp, CullMode, FrontFace, GraphicsPipelineBuilder, Pipeline, PipelineLayout,
};
use vkcraft_rhi::render_pass::{
    COLOR_ATTACHMENT_INDEX, DEPTH_ATTACHMENT_INDEX, Framebuffer, RenderPass,
};
use vkcraft_rhi::shader::{Shader, ShaderStage};
use vkcraft_rhi::swapchain::Swapchain;
use vkcraft_rhi::sync::{FrameSync, MAX_FRAMES_IN_FLIGHT};
use vkcraft_rhi::upload::{upload_buffer, upload_texture};
use vkcraft_rhi::vertex::Vertex;
use vkcraft_rhi::RhiResult;
use vkcraft_scene::Camera;

use crate::config::RendererConfig;
use crate::error::{RendererError, RendererResult};
use crate::frame_slots::FrameSlots;
use crate::recreate::{FramePlan, GateState, RecreateGate};
use crate::targets::RenderTargets;

/// Color the frame is cleared to.
pub const CLEAR_COLOR: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// Depth and stencil the frame is cleared to.
pub const CLEAR_DEPTH: vk::ClearDepthStencilValue = vk::ClearDepthStencilValue {
    depth: 1.0,
    stencil: 0,
};

/// Clear values indexed like the render pass attachments.
pub fn clear_values() -> [vk::ClearValue; 2] {
    let mut values = [vk::ClearValue::default(); 2];
    values[COLOR_ATTACHMENT_INDEX as usize] = vk::ClearValue {
        color: vk::ClearColorValue {
            float32: CLEAR_COLOR,
        },
    };
    values[DEPTH_ATTACHMENT_INDEX as usize] = vk::ClearValue {
        depth_stencil: CLEAR_DEPTH,
    };
    values
}

/// What one call to [`Renderer::draw_frame`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented.
    Presented,
    /// The swapchain was rebuilt. A frame may or may not have been presented
    /// before that.
    Recreated,
    /// Nothing happened; the window has no drawable area.
    Skipped,
}

/// Resources created once and kept across swapchain recreation.
struct SceneResources {
    descriptor_set_layout: DescriptorSetLayout,
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
    texture: Image,
    sampler: Sampler,
    depth_format: vk::Format,
    samples: vk::SampleCountFlags,
}

/// SPIR-V binaries, read again for every pipeline build.
struct ShaderPaths {
    vertex: PathBuf,
    fragment: PathBuf,
}

/// Objects whose size or count follows the swapchain.
///
/// Fields drop in declaration order, which is the required destruction
/// order. Command buffers are not dropped but returned to the pool through
/// [`SwapchainResources::release`].
struct SwapchainResources {
    targets: RenderTargets,
    framebuffers: Vec<Framebuffer>,
    command_buffers: Vec<CommandBuffer>,
    pipeline: Pipeline,
    pipeline_layout: PipelineLayout,
    render_pass: RenderPass,
    swapchain: Swapchain,
    uniform_buffers: Vec<Buffer>,
    descriptor_sets: Vec<vk::DescriptorSet>,
    descriptor_pool: DescriptorPool,
}

impl SwapchainResources {
    fn release(mut self, pool: &CommandPool) {
        pool.free_command_buffers(std::mem::take(&mut self.command_buffers));
    }

    fn extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }
}

/// Main renderer that manages all Vulkan resources.
///
/// # Resource Destruction Order
///
/// 1. Wait for the device to go idle
/// 2. Swapchain-sized resources
/// 3. Frame synchronization objects
/// 4. Scene resources (geometry, texture, sampler, set layout)
/// 5. Command pool
/// 6. Device
/// 7. Surface
/// 8. Instance
///
/// ManuallyDrop is used to ensure correct destruction order.
pub struct Renderer {
    swapchain: Option<SwapchainResources>,
    frames: Vec<FrameSync>,
    scene: ManuallyDrop<SceneResources>,
    command_pool: ManuallyDrop<CommandPool>,
    device: ManuallyDrop<Arc<Device>>,
    surface: ManuallyDrop<Surface>,
    instance: ManuallyDrop<Instance>,

    shader_paths: ShaderPaths,
    slots: FrameSlots,
    recreate_gate: RecreateGate,
    images: ImageCache,
    camera: Camera,
    framebuffer_resized: bool,
}

impl Renderer {
    /// Creates a new renderer for the given window.
    ///
    /// Loads the model and its texture, uploads them, and builds the
    /// swapchain for the window's current size. A window with no drawable
    /// area defers the swapchain to the first frame that has one.
    ///
    /// # Errors
    ///
    /// Every failure here is fatal: missing loader, adapter or layer, an
    /// unreadable shader or asset, or a Vulkan call that fails.
    pub fn new(window: &Window, config: &RendererConfig) -> RendererResult<Self> {
        let (width, height) = window.framebuffer_size();
        info!(width, height, title = %config.window_title, "Initializing Vulkan renderer");

        let app_name = CString::new(config.window_title.as_str())
            .unwrap_or_else(|_| CString::from(c"vkcraft"));
        let surface_extensions = required_surface_extensions(window.raw_display_handle()?)?;
        let instance = Instance::new(&app_name, &surface_extensions, config.enable_validation)?;

        let surface = window.create_surface(instance.entry(), instance.handle())?;

        let adapter = select_adapter(instance.handle(), surface.handle(), surface.loader())?;
        let device = Device::new(&instance, &adapter)?;
        let command_pool = CommandPool::new(device.clone())?;

        let mut images = ImageCache::new();
        let scene = Self::create_scene(&device, &command_pool, &mut images, config)?;

        let frames = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| FrameSync::new(device.clone()))
            .collect::<RhiResult<Vec<_>>>()?;

        let mut camera = Camera::new();
        camera.set_extent(width, height);

        let mut renderer = Self {
            swapchain: None,
            frames,
            scene: ManuallyDrop::new(scene),
            command_pool: ManuallyDrop::new(command_pool),
            device: ManuallyDrop::new(device),
            surface: ManuallyDrop::new(surface),
            instance: ManuallyDrop::new(instance),
            shader_paths: ShaderPaths {
                vertex: config.shader_path(ShaderStage::Vertex),
                fragment: config.shader_path(ShaderStage::Fragment),
            },
            slots: FrameSlots::new(0),
            recreate_gate: RecreateGate::pending(),
            images,
            camera,
            framebuffer_resized: false,
        };

        if renderer.service_recreate(window)? == Some(FrameOutcome::Skipped) {
            info!("Window has no drawable area, swapchain deferred");
        }

        info!(
            images = renderer.image_count(),
            cached_images = renderer.images.len(),
            frames_in_flight = MAX_FRAMES_IN_FLIGHT,
            indices = renderer.scene.index_count,
            "Renderer initialized"
        );

        Ok(renderer)
    }

    fn create_scene(
        device: &Arc<Device>,
        pool: &CommandPool,
        images: &mut ImageCache,
        config: &RendererConfig,
    ) -> RendererResult<SceneResources> {
        let descriptor_set_layout = DescriptorSetLayout::forward_pass(device.clone())?;

        let mut loader = ModelLoader::new();
        if let Some(default) = &config.default_texture_path {
            loader = loader.with_default_texture(default);
        }
        let material_dir = config
            .model_path
            .parent()
            .unwrap_or(config.textures_dir.as_path());
        let model = loader.load(
            &config.model_path,
            material_dir,
            LoadSettings {
                flip_winding: config.flip_winding,
                ignore_missing_uvs: false,
            },
        )?;

        let (vertices, indices) = model.merged();
        let index_count = u32::try_from(indices.len())
            .map_err(|_| RendererError::Model(format!("{} indices", indices.len())))?;

        let vertex_buffer = upload_buffer(pool, BufferUsage::Vertex, bytemuck::cast_slice(&vertices))?;
        let index_buffer = upload_buffer(pool, BufferUsage::Index, bytemuck::cast_slice(&indices))?;

        let texture_path = model
            .first_diffuse_texture()
            .unwrap_or(config.texture_path.as_path())
            .to_path_buf();
        let texture = Self::load_texture(pool, images, &texture_path)?;
        let sampler = Sampler::new(device.clone(), texture.mip_levels())?;

        let depth_format = device.adapter().find_depth_format(device.instance())?;
        let samples = device.adapter().msaa_samples;

        info!(
            vertices = vertices.len(),
            indices = index_count,
            texture = %texture_path.display(),
            depth_format = ?depth_format,
            samples = samples.as_raw(),
            "Scene resources created"
        );

        Ok(SceneResources {
            descriptor_set_layout,
            vertex_buffer,
            index_buffer,
            index_count,
            texture,
            sampler,
            depth_format,
            samples,
        })
    }

    fn load_texture(
        pool: &CommandPool,
        images: &mut ImageCache,
        path: &Path,
    ) -> RendererResult<Image> {
        let image = images.load(path)?;
        let texture = upload_texture(pool, "model texture", image.width, image.height, &image.pixels)?;
        Ok(texture)
    }

    /// Builds every swapchain-sized object for a drawable framebuffer.
    fn create_swapchain_resources(
        &self,
        framebuffer_size: (u32, u32),
    ) -> RhiResult<SwapchainResources> {
        let device = Arc::clone(&self.device);
        let scene = &*self.scene;

        let swapchain = Swapchain::new(
            device.clone(),
            self.surface.handle(),
            self.surface.loader(),
            framebuffer_size,
        )?;
        let extent = swapchain.extent();
        let image_count = swapchain.image_count();

        let render_pass = RenderPass::new(
            device.clone(),
            swapchain.format(),
            scene.depth_format,
            scene.samples,
        )?;
        let pipeline_layout =
            PipelineLayout::new(device.clone(), &[scene.descriptor_set_layout.handle()])?;

        // Modules only live until the pipeline is linked.
        let vertex_shader = Shader::from_spirv_file(
            device.clone(),
            &self.shader_paths.vertex,
            ShaderStage::Vertex,
        )?;
        let fragment_shader = Shader::from_spirv_file(
            device.clone(),
            &self.shader_paths.fragment,
            ShaderStage::Fragment,
        )?;
        let pipeline = GraphicsPipelineBuilder::new(extent)
            .vertex_shader(&vertex_shader)
            .fragment_shader(&fragment_shader)
            .vertex_binding(Vertex::binding_description())
            .vertex_attributes(&Vertex::attribute_descriptions())
            .cull_mode(CullMode::Back)
            .front_face(FrontFace::CounterClockwise)
            .rasterization_samples(scene.samples)
            .depth_test_enable(true)
            .depth_write_enable(true)
            .depth_compare_op(CompareOp::Less)
            .build(device.clone(), &pipeline_layout, &render_pass)?;
        drop(vertex_shader);
        drop(fragment_shader);

        let targets = RenderTargets::new(
            device.clone(),
            &self.command_pool,
            extent,
            swapchain.format(),
            scene.depth_format,
            scene.samples,
        )?;

        let framebuffers = swapchain
            .image_views()
            .iter()
            .map(|view| {
                Framebuffer::new(
                    device.clone(),
                    &render_pass,
                    &targets.framebuffer_views(view.handle()),
                    extent,
                )
            })
            .collect::<RhiResult<Vec<_>>>()?;

        let ubo_size = UniformBufferObject::size() as vk::DeviceSize;
        let uniform_buffers = (0..image_count)
            .map(|_| Buffer::new(device.clone(), BufferUsage::Uniform, ubo_size))
            .collect::<RhiResult<Vec<_>>>()?;

        let descriptor_pool = DescriptorPool::for_images(device.clone(), image_count as u32)?;
        let descriptor_sets =
            descriptor_pool.allocate(&scene.descriptor_set_layout, image_count as u32)?;
        let texture_info = image_info(
            scene.sampler.handle(),
            scene.texture.view(),
            vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        );
        for (&set, buffer) in descriptor_sets.iter().zip(&uniform_buffers) {
            write_forward_set(
                &device,
                set,
                buffer_info(buffer.handle(), 0, ubo_size),
                texture_info,
            );
        }

        let command_buffers = self
            .command_pool
            .allocate_command_buffers(image_count as u32)?;

        let resources = SwapchainResources {
            targets,
            framebuffers,
            command_buffers,
            pipeline,
            pipeline_layout,
            render_pass,
            swapchain,
            uniform_buffers,
            descriptor_sets,
            descriptor_pool,
        };

        if let Err(e) = record_draw_commands(&resources, scene) {
            resources.release(&self.command_pool);
            return Err(e);
        }

        Ok(resources)
    }

    /// Tears down and rebuilds the swapchain-sized objects.
    ///
    /// The caller has checked that the framebuffer is drawable.
    fn rebuild_swapchain(&mut self, framebuffer_size: (u32, u32)) -> RendererResult<()> {
        self.device.wait_idle()?;

        if let Some(old) = self.swapchain.take() {
            old.release(&self.command_pool);
        }

        let resources = self.create_swapchain_resources(framebuffer_size)?;
        let extent = resources.extent();

        self.slots.reset_images(resources.swapchain.image_count());
        self.camera.set_extent(extent.width, extent.height);
        self.swapchain = Some(resources);

        info!(
            width = extent.width,
            height = extent.height,
            images = self.image_count(),
            "Swapchain resources rebuilt"
        );
        Ok(())
    }

    /// Runs a pending recreation if the window allows it.
    ///
    /// Returns `None` when nothing was pending.
    fn service_recreate(
        &mut self,
        source: &impl FramebufferSource,
    ) -> RendererResult<Option<FrameOutcome>> {
        match self.recreate_gate.poll(source.framebuffer_size()) {
            GateState::Idle => Ok(None),
            GateState::Blocked => Ok(Some(FrameOutcome::Skipped)),
            GateState::Proceed { width, height } => {
                self.rebuild_swapchain((width, height))?;
                Ok(Some(FrameOutcome::Recreated))
            }
        }
    }

    /// Renders and presents one frame.
    ///
    /// `elapsed_seconds` drives the model rotation.
    ///
    /// # Errors
    ///
    /// Out-of-date and suboptimal swapchains are handled here and never
    /// surface as errors. Anything returned is fatal.
    pub fn draw_frame(
        &mut self,
        source: &impl FramebufferSource,
        elapsed_seconds: f32,
    ) -> RendererResult<FrameOutcome> {
        if let Some(outcome) = self.service_recreate(source)? {
            return Ok(outcome);
        }

        let Some(resources) = self.swapchain.as_ref() else {
            self.recreate_gate.request();
            return Ok(self
                .service_recreate(source)?
                .unwrap_or(FrameOutcome::Skipped));
        };

        let slot = self.slots.current();
        let sync = &self.frames[slot];
        sync.in_flight().wait_forever()?;
        self.slots.mark_waited(slot);

        let acquired = resources
            .swapchain
            .acquire_next_image(sync.image_available().handle())?;
        let resized = std::mem::take(&mut self.framebuffer_resized);
        let plan = FramePlan::after_acquire(acquired, resized);

        let FramePlan::Submit { index: image_index, .. } = plan else {
            debug!("Swapchain out of date on acquire");
            self.recreate_gate.request();
            return Ok(self
                .service_recreate(source)?
                .unwrap_or(FrameOutcome::Skipped));
        };

        if let Some(owner) = self.slots.claim_image(image_index as usize) {
            self.frames[owner].in_flight().wait_forever()?;
            self.slots.mark_waited(owner);
        }

        let ubo = UniformBufferObject::spinning(
            elapsed_seconds,
            self.camera.view_matrix(),
            self.camera.projection_matrix(),
        );
        resources.uniform_buffers[image_index as usize].write_data(0, bytemuck::bytes_of(&ubo))?;

        let wait_semaphores = [sync.image_available().handle()];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [resources.command_buffers[image_index as usize].handle()];
        let signal_semaphores = [sync.render_finished().handle()];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        sync.in_flight().reset()?;
        // SAFETY: the command buffer was recorded at swapchain creation and
        // is not pending (the image's previous owner was waited on above);
        // the fence was just reset.
        unsafe {
            self.device
                .submit_graphics(&[submit_info], sync.in_flight().handle())?;
        }
        self.slots.mark_submitted();

        let present_status = resources.swapchain.present(
            self.device.present_queue(),
            image_index,
            sync.render_finished().handle(),
        )?;
        self.slots.mark_presented();

        self.slots.advance();

        if plan.recreate_after_present(present_status) {
            debug!(
                acquire = ?acquired,
                present = ?present_status,
                resized,
                "Swapchain recreation requested"
            );
            self.recreate_gate.request();
            if let Some(FrameOutcome::Recreated) = self.service_recreate(source)? {
                return Ok(FrameOutcome::Recreated);
            }
        }

        Ok(FrameOutcome::Presented)
    }

    /// Notes a window resize. Recreation happens after the next present.
    pub fn notify_resized(&mut self) {
        self.framebuffer_resized = true;
    }

    /// True while a recreation is waiting for a drawable framebuffer.
    pub fn is_recreate_pending(&self) -> bool {
        self.recreate_gate.is_pending()
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    /// Blocks until the GPU has finished all submitted work.
    pub fn wait_idle(&self) -> RendererResult<()> {
        self.device.wait_idle()?;
        Ok(())
    }

    /// Returns the current swapchain extent.
    pub fn extent(&self) -> Option<vk::Extent2D> {
        self.swapchain.as_ref().map(SwapchainResources::extent)
    }

    /// Returns the swapchain format.
    pub fn format(&self) -> Option<vk::Format> {
        self.swapchain.as_ref().map(|r| r.swapchain.format())
    }

    pub fn image_count(&self) -> usize {
        self.swapchain
            .as_ref()
            .map_or(0, |r| r.swapchain.image_count())
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.scene.samples
    }
}

/// Records one command buffer per swapchain image. They are replayed
/// unchanged every frame until the swapchain is rebuilt.
fn record_draw_commands(resources: &SwapchainResources, scene: &SceneResources) -> RhiResult<()> {
    let clear_values = clear_values();
    let extent = resources.extent();

    for ((cmd, framebuffer), &set) in resources
        .command_buffers
        .iter()
        .zip(&resources.framebuffers)
        .zip(&resources.descriptor_sets)
    {
        cmd.begin()?;
        cmd.begin_render_pass(
            resources.render_pass.handle(),
            framebuffer.handle(),
            extent,
            &clear_values,
        );
        cmd.bind_pipeline(resources.pipeline.handle());
        cmd.bind_vertex_buffers(0, &[scene.vertex_buffer.handle()], &[0]);
        cmd.bind_index_buffer(scene.index_buffer.handle(), 0);
        cmd.bind_descriptor_sets(resources.pipeline_layout.handle(), 0, &[set]);
        cmd.draw_indexed(scene.index_count, 1, 0, 0, 0);
        cmd.end_render_pass();
        cmd.end()?;
    }

    debug!(
        count = resources.command_buffers.len(),
        "Draw commands recorded"
    );
    Ok(())
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Wait for all GPU work to complete before destroying resources
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for device idle during renderer drop: {e}");
        }

        if let Some(resources) = self.swapchain.take() {
            resources.release(&self.command_pool);
        }
        self.frames.clear();

        // SAFETY: each field is dropped exactly once, here, children before
        // the objects they were created from.
        unsafe {
            ManuallyDrop::drop(&mut self.scene);
            ManuallyDrop::drop(&mut self.command_pool);
            ManuallyDrop::drop(&mut self.device);
            ManuallyDrop::drop(&mut self.surface);
            ManuallyDrop::drop(&mut self.instance);
        }

        info!("Renderer destroyed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_values_follow_attachment_order() {
        let values = clear_values();
        // SAFETY: the union members are read as written above.
        unsafe {
            assert_eq!(
                values[COLOR_ATTACHMENT_INDEX as usize].color.float32,
                [0.0, 0.0, 0.0, 1.0]
            );
            assert_eq!(values[DEPTH_ATTACHMENT_INDEX as usize].depth_stencil.depth, 1.0);
            assert_eq!(values[DEPTH_ATTACHMENT_INDEX as usize].depth_stencil.stencil, 0);
        }
    }
}
