//! Multisampled color and depth attachments.
//!
//! Both images match the swapchain extent and are rebuilt with it. The color
//! image only exists when rendering multisampled; otherwise the swapchain image
//! is the color attachment.

use std::sync::Arc;

use ash::vk;
use tracing::debug;

use vkcraft_rhi::RhiResult;
use vkcraft_rhi::command::CommandPool;
use vkcraft_rhi::device::Device;
use vkcraft_rhi::image::{Image, ImageDesc};
use vkcraft_rhi::render_pass::{framebuffer_views, is_multisampled};
use vkcraft_rhi::upload::prepare_depth_image;

/// Usage of the multisampled color image. It is resolved inside the render
/// pass and never read back.
pub const COLOR_TARGET_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::TRANSIENT_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw(),
);

pub const DEPTH_TARGET_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT;

/// The render pass attachments that are not owned by the swapchain.
pub struct RenderTargets {
    color: Option<Image>,
    depth: Image,
    samples: vk::SampleCountFlags,
}

impl RenderTargets {
    /// Creates the attachments and moves the depth image into its attachment
    /// layout.
    pub fn new(
        device: Arc<Device>,
        pool: &CommandPool,
        extent: vk::Extent2D,
        color_format: vk::Format,
        depth_format: vk::Format,
        samples: vk::SampleCountFlags,
    ) -> RhiResult<Self> {
        let color = if is_multisampled(samples) {
            Some(Image::new(
                device.clone(),
                color_target_desc(extent, color_format, samples),
            )?)
        } else {
            None
        };

        let depth = Image::new(device, depth_target_desc(extent, depth_format, samples))?;
        prepare_depth_image(pool, &depth)?;

        debug!(
            width = extent.width,
            height = extent.height,
            samples = samples.as_raw(),
            multisampled = color.is_some(),
            "Render targets created"
        );

        Ok(Self {
            color,
            depth,
            samples,
        })
    }

    pub fn color(&self) -> Option<&Image> {
        self.color.as_ref()
    }

    pub fn depth(&self) -> &Image {
        &self.depth
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    /// Attachment views for the framebuffer wrapping `swapchain_view`.
    pub fn framebuffer_views(&self, swapchain_view: vk::ImageView) -> Vec<vk::ImageView> {
        let color_view = self
            .color
            .as_ref()
            .map_or(vk::ImageView::null(), Image::view);
        framebuffer_views(self.samples, color_view, self.depth.view(), swapchain_view)
    }
}

pub fn color_target_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> ImageDesc {
    ImageDesc {
        name: "msaa color target",
        extent,
        mip_levels: 1,
        samples,
        format,
        usage: COLOR_TARGET_USAGE,
        aspect: vk::ImageAspectFlags::COLOR,
    }
}

pub fn depth_target_desc(
    extent: vk::Extent2D,
    format: vk::Format,
    samples: vk::SampleCountFlags,
) -> ImageDesc {
    ImageDesc {
        name: "depth target",
        extent,
        mip_levels: 1,
        samples,
        format,
        usage: DEPTH_TARGET_USAGE,
        aspect: vk::ImageAspectFlags::DEPTH,
    }
}
