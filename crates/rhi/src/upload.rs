//! Staging uploads, image layout transitions and mipmap generation.
//!
//! Every upload follows the same path: fill a host-visible staging buffer,
//! create the device-local destination, record the copy into a one-shot
//! command buffer, submit, wait for the graphics queue and drop the staging
//! buffer. The queue stall is acceptable because uploads only happen at load
//! time.

use ash::vk;
use tracing::{debug, info};

use crate::buffer::{Buffer, BufferUsage};
use crate::command::{CommandBuffer, CommandPool, OneTimeCommands};
use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::{
    Image, ImageDesc, aspect_for_layout, mip_blit_extents, mip_level_count, transition_masks,
};

/// Format every texture is uploaded in.
pub const TEXTURE_FORMAT: vk::Format = vk::Format::R8G8B8A8_SRGB;

/// An `(old, new)` layout pair.
pub type LayoutTransition = (vk::ImageLayout, vk::ImageLayout);

/// Fresh texture, every level ready for the staging copy.
pub const UPLOAD_DST: LayoutTransition = (
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
);

/// A written mip level becomes the source of the next blit.
pub const MIP_SRC: LayoutTransition = (
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
);

/// A mip level that has been blitted from.
pub const MIP_DONE: LayoutTransition = (
    vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
);

/// The smallest level, only ever a blit destination.
pub const LAST_MIP: LayoutTransition = (
    vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
);

/// Depth attachment, recreated with every swapchain.
pub const DEPTH_INIT: LayoutTransition = (
    vk::ImageLayout::UNDEFINED,
    vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
);

/// Every transition this module records. Each one must resolve through
/// [`transition_masks`].
pub const USED_TRANSITIONS: [LayoutTransition; 5] =
    [UPLOAD_DST, MIP_SRC, MIP_DONE, LAST_MIP, DEPTH_INIT];

/// Subresource range over `level_count` levels starting at `base_level`.
fn subresource_range(
    aspect: vk::ImageAspectFlags,
    base_level: u32,
    level_count: u32,
) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: base_level,
        level_count,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Records a layout transition for the given mip range.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedLayoutTransition`] when the pair is not in
/// the transition table. Nothing is recorded in that case.
pub fn record_transition(
    cmd: &CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    (old, new): LayoutTransition,
    base_level: u32,
    level_count: u32,
) -> RhiResult<()> {
    let masks = transition_masks(old, new)?;

    let barrier = vk::ImageMemoryBarrier::default()
        .old_layout(old)
        .new_layout(new)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(subresource_range(
            aspect_for_layout(new, format),
            base_level,
            level_count,
        ))
        .src_access_mask(masks.src_access)
        .dst_access_mask(masks.dst_access);

    cmd.pipeline_barrier(masks.src_stage, masks.dst_stage, &[barrier]);
    Ok(())
}

/// Transitions every mip level of `image` in a one-shot submission.
pub fn transition_image_layout(
    pool: &CommandPool,
    image: &Image,
    transition: LayoutTransition,
) -> RhiResult<()> {
    // Fail before allocating anything.
    transition_masks(transition.0, transition.1)?;

    OneTimeCommands::new(pool).run(|cmd| {
        record_transition(
            cmd,
            image.handle(),
            image.format(),
            transition,
            0,
            image.mip_levels(),
        )
    })
}

/// Creates a device-local buffer holding `data`.
pub fn upload_buffer(pool: &CommandPool, usage: BufferUsage, data: &[u8]) -> RhiResult<Buffer> {
    let device = pool.device().clone();
    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, data)?;
    let buffer = Buffer::new(device, usage, staging.size())?;

    OneTimeCommands::new(pool).run(|cmd| {
        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: 0,
            size: staging.size(),
        };
        cmd.copy_buffer(staging.handle(), buffer.handle(), &[region]);
        Ok(())
    })?;

    debug!(usage = usage.name(), bytes = data.len(), "Buffer uploaded");
    Ok(buffer)
}

/// Uploads tightly packed RGBA8 pixels into a sampled, fully mipmapped image.
///
/// The image ends in `SHADER_READ_ONLY_OPTIMAL` on every level.
///
/// # Errors
///
/// Returns [`RhiError::UnsupportedBlitFormat`] before any GPU work when the
/// adapter cannot linearly blit [`TEXTURE_FORMAT`].
pub fn upload_texture(
    pool: &CommandPool,
    name: &'static str,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> RhiResult<Image> {
    let device = pool.device().clone();
    let expected = width as usize * height as usize * 4;
    if pixels.len() != expected {
        return Err(RhiError::InvalidHandle(format!(
            "texture '{name}' has {} bytes, expected {expected}",
            pixels.len()
        )));
    }

    let mip_levels = mip_level_count(width, height);
    ensure_linear_blit(&device, TEXTURE_FORMAT)?;

    let staging = Buffer::new_with_data(device.clone(), BufferUsage::Staging, pixels)?;
    let image = Image::new(
        device,
        ImageDesc {
            name,
            extent: vk::Extent2D { width, height },
            mip_levels,
            samples: vk::SampleCountFlags::TYPE_1,
            format: TEXTURE_FORMAT,
            usage: vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::SAMPLED,
            aspect: vk::ImageAspectFlags::COLOR,
        },
    )?;

    OneTimeCommands::new(pool).run(|cmd| {
        record_transition(
            cmd,
            image.handle(),
            TEXTURE_FORMAT,
            UPLOAD_DST,
            0,
            mip_levels,
        )?;

        let region = vk::BufferImageCopy {
            buffer_offset: 0,
            buffer_row_length: 0,
            buffer_image_height: 0,
            image_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: 0,
                base_array_layer: 0,
                layer_count: 1,
            },
            image_offset: vk::Offset3D { x: 0, y: 0, z: 0 },
            image_extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
        };
        cmd.copy_buffer_to_image(
            staging.handle(),
            image.handle(),
            UPLOAD_DST.1,
            &[region],
        );

        record_mipmaps(cmd, image.handle(), TEXTURE_FORMAT, width, height, mip_levels)
    })?;

    info!(name, width, height, mip_levels, "Texture uploaded");
    Ok(image)
}

fn ensure_linear_blit(device: &Device, format: vk::Format) -> RhiResult<()> {
    if device
        .adapter()
        .supports_linear_blit(device.instance(), format)
    {
        Ok(())
    } else {
        Err(RhiError::UnsupportedBlitFormat(format))
    }
}

/// Records the blit chain for an image whose levels are all in
/// `TRANSFER_DST_OPTIMAL` and level 0 holds the source pixels.
///
/// Each level `i - 1` becomes a transfer source, is blitted into the half
/// sized level `i`, then moves to shader read. The last level was only ever
/// written and goes straight from transfer destination to shader read.
pub fn record_mipmaps(
    cmd: &CommandBuffer,
    image: vk::Image,
    format: vk::Format,
    width: u32,
    height: u32,
    mip_levels: u32,
) -> RhiResult<()> {
    for (i, ((src_w, src_h), (dst_w, dst_h))) in
        (1u32..).zip(mip_blit_extents(width, height, mip_levels))
    {
        let src_level = i - 1;
        record_transition(
            cmd,
            image,
            format,
            MIP_SRC,
            src_level,
            1,
        )?;

        let blit = vk::ImageBlit {
            src_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: src_level,
                base_array_layer: 0,
                layer_count: 1,
            },
            src_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: src_w,
                    y: src_h,
                    z: 1,
                },
            ],
            dst_subresource: vk::ImageSubresourceLayers {
                aspect_mask: vk::ImageAspectFlags::COLOR,
                mip_level: i,
                base_array_layer: 0,
                layer_count: 1,
            },
            dst_offsets: [
                vk::Offset3D { x: 0, y: 0, z: 0 },
                vk::Offset3D {
                    x: dst_w,
                    y: dst_h,
                    z: 1,
                },
            ],
        };
        cmd.blit_image(
            image,
            MIP_SRC.1,
            image,
            MIP_SRC.0,
            &[blit],
            vk::Filter::LINEAR,
        );

        record_transition(
            cmd,
            image,
            format,
            MIP_DONE,
            src_level,
            1,
        )?;
    }

    record_transition(
        cmd,
        image,
        format,
        LAST_MIP,
        mip_levels.saturating_sub(1),
        1,
    )
}

/// Moves a freshly created depth image into its attachment layout.
pub fn prepare_depth_image(pool: &CommandPool, image: &Image) -> RhiResult<()> {
    transition_image_layout(pool, image, DEPTH_INIT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_used_transition_is_in_table() {
        for (old, new) in USED_TRANSITIONS {
            assert!(
                transition_masks(old, new).is_ok(),
                "{old:?} -> {new:?} missing from table"
            );
        }
    }

    #[test]
    fn test_mip_chain_ends_every_level_in_shader_read() {
        // The blit loop hands each source level on, the last level never is.
        assert_eq!(MIP_SRC.0, UPLOAD_DST.1);
        assert_eq!(MIP_DONE.0, MIP_SRC.1);
        assert_eq!(LAST_MIP.0, UPLOAD_DST.1);
        assert_eq!(MIP_DONE.1, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(LAST_MIP.1, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
    }

    #[test]
    fn test_depth_init_targets_attachment_layout() {
        assert_eq!(DEPTH_INIT.0, vk::ImageLayout::UNDEFINED);
        assert_eq!(
            aspect_for_layout(DEPTH_INIT.1, vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
    }

    #[test]
    fn test_subresource_range_single_layer() {
        let range = subresource_range(vk::ImageAspectFlags::COLOR, 3, 1);
        assert_eq!(range.base_mip_level, 3);
        assert_eq!(range.level_count, 1);
        assert_eq!(range.base_array_layer, 0);
        assert_eq!(range.layer_count, 1);
    }

    #[test]
    fn test_texture_format_is_srgb() {
        assert_eq!(TEXTURE_FORMAT, vk::Format::R8G8B8A8_SRGB);
    }
}
