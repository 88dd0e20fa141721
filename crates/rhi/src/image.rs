//! Images, image views, samplers and the layout transition table.

use std::sync::Arc;

use ash::vk;
use gpu_allocator::MemoryLocation;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use tracing::debug;

use crate::device::Device;
use crate::error::{RhiError, RhiResult};

/// Access masks and pipeline stages for one layout transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransitionMasks {
    pub src_access: vk::AccessFlags,
    pub dst_access: vk::AccessFlags,
    pub src_stage: vk::PipelineStageFlags,
    pub dst_stage: vk::PipelineStageFlags,
}

/// Looks up the barrier parameters for `old -> new`.
///
/// The table is closed. A pair that is not listed here is an error, never a
/// guess; new transitions must be added explicitly.
pub fn transition_masks(
    old: vk::ImageLayout,
    new: vk::ImageLayout,
) -> RhiResult<TransitionMasks> {
    use vk::ImageLayout as L;

    let masks = match (old, new) {
        (L::UNDEFINED, L::TRANSFER_DST_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::TRANSFER_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        (L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::empty(),
            dst_access: vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            src_stage: vk::PipelineStageFlags::TOP_OF_PIPE,
            dst_stage: vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
        },
        // Mipmap generation: a level that was written becomes a blit source.
        (L::TRANSFER_DST_OPTIMAL, L::TRANSFER_SRC_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_WRITE,
            dst_access: vk::AccessFlags::TRANSFER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::TRANSFER,
        },
        (L::TRANSFER_SRC_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL) => TransitionMasks {
            src_access: vk::AccessFlags::TRANSFER_READ,
            dst_access: vk::AccessFlags::SHADER_READ,
            src_stage: vk::PipelineStageFlags::TRANSFER,
            dst_stage: vk::PipelineStageFlags::FRAGMENT_SHADER,
        },
        _ => return Err(RhiError::UnsupportedLayoutTransition { old, new }),
    };

    Ok(masks)
}

pub fn has_stencil_component(format: vk::Format) -> bool {
    matches!(
        format,
        vk::Format::D32_SFLOAT_S8_UINT | vk::Format::D24_UNORM_S8_UINT
    )
}

/// Aspect flags a barrier into `new_layout` must cover.
pub fn aspect_for_layout(new_layout: vk::ImageLayout, format: vk::Format) -> vk::ImageAspectFlags {
    if new_layout == vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL {
        if has_stencil_component(format) {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        } else {
            vk::ImageAspectFlags::DEPTH
        }
    } else {
        vk::ImageAspectFlags::COLOR
    }
}

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Source and destination sizes of each blit in a mip chain, level 1 onward.
pub fn mip_blit_extents(width: u32, height: u32, levels: u32) -> Vec<((i32, i32), (i32, i32))> {
    let mut w = width as i32;
    let mut h = height as i32;
    let mut blits = Vec::with_capacity(levels.saturating_sub(1) as usize);

    for _ in 1..levels {
        let next = ((w / 2).max(1), (h / 2).max(1));
        blits.push(((w, h), next));
        w = next.0;
        h = next.1;
    }

    blits
}

/// RAII image view.
pub struct ImageView {
    device: Arc<Device>,
    view: vk::ImageView,
}

impl ImageView {
    pub fn new(
        device: Arc<Device>,
        image: vk::Image,
        format: vk::Format,
        aspect: vk::ImageAspectFlags,
        mip_levels: u32,
    ) -> RhiResult<Self> {
        let view_info = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect)
                    .base_mip_level(0)
                    .level_count(mip_levels)
                    .base_array_layer(0)
                    .layer_count(1),
            );

        // SAFETY: `image` is alive and was created with `format`.
        let view = unsafe { device.handle().create_image_view(&view_info, None)? };
        Ok(Self { device, view })
    }

    #[inline]
    pub fn handle(&self) -> vk::ImageView {
        self.view
    }
}

impl Drop for ImageView {
    fn drop(&mut self) {
        // SAFETY: no framebuffer or descriptor using the view is in flight.
        unsafe { self.device.handle().destroy_image_view(self.view, None) };
    }
}

/// Creation parameters for an [`Image`].
#[derive(Clone, Copy, Debug)]
pub struct ImageDesc {
    pub name: &'static str,
    pub extent: vk::Extent2D,
    pub mip_levels: u32,
    pub samples: vk::SampleCountFlags,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
}

/// Device-local 2D image with its memory and a view over all mip levels.
pub struct Image {
    device: Arc<Device>,
    image: vk::Image,
    view: Option<ImageView>,
    allocation: Option<Allocation>,
    desc: ImageDesc,
}

impl Image {
    /// Creates the image, binds freshly allocated memory and creates the view.
    /// The image starts in `UNDEFINED` layout.
    pub fn new(device: Arc<Device>, desc: ImageDesc) -> RhiResult<Self> {
        if desc.extent.width == 0 || desc.extent.height == 0 {
            return Err(RhiError::InvalidHandle(format!(
                "image '{}' has a zero extent",
                desc.name
            )));
        }

        let image_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(desc.format)
            .extent(vk::Extent3D {
                width: desc.extent.width,
                height: desc.extent.height,
                depth: 1,
            })
            .mip_levels(desc.mip_levels)
            .array_layers(1)
            .samples(desc.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(desc.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        // SAFETY: the create info is fully initialized above.
        let image = unsafe { device.handle().create_image(&image_info, None)? };

        let mut this = Self {
            device,
            image,
            view: None,
            allocation: None,
            desc,
        };

        // SAFETY: the image was just created from this device.
        let requirements = unsafe { this.device.handle().get_image_memory_requirements(image) };
        let allocation = this.device.allocator()?.allocate(&AllocationCreateDesc {
            name: desc.name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;

        // SAFETY: the allocation satisfies the image's requirements and is
        // bound exactly once.
        let bind = unsafe {
            this.device
                .handle()
                .bind_image_memory(image, allocation.memory(), allocation.offset())
        };
        this.allocation = Some(allocation);
        bind?;

        this.view = Some(ImageView::new(
            this.device.clone(),
            image,
            desc.format,
            desc.aspect,
            desc.mip_levels,
        )?);

        debug!(
            name = desc.name,
            width = desc.extent.width,
            height = desc.extent.height,
            format = ?desc.format,
            mips = desc.mip_levels,
            samples = desc.samples.as_raw(),
            "Image created"
        );

        Ok(this)
    }

    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
            .as_ref()
            .map(ImageView::handle)
            .unwrap_or(vk::ImageView::null())
    }

    #[inline]
    pub fn desc(&self) -> &ImageDesc {
        &self.desc
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.desc.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.desc.extent
    }

    #[inline]
    pub fn mip_levels(&self) -> u32 {
        self.desc.mip_levels
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        self.view = None;

        // SAFETY: the image is not referenced by pending GPU work.
        unsafe { self.device.handle().destroy_image(self.image, None) };

        if let Some(allocation) = self.allocation.take() {
            match self.device.allocator() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        tracing::error!(name = self.desc.name, "Failed to free image memory: {e}");
                    }
                }
                Err(e) => tracing::error!(name = self.desc.name, "{e}"),
            }
        }
    }
}

/// Texture sampler: linear filtering, repeat addressing, 16x anisotropy.
pub struct Sampler {
    device: Arc<Device>,
    sampler: vk::Sampler,
}

/// Anisotropy level requested for textures.
pub const MAX_ANISOTROPY: f32 = 16.0;

impl Sampler {
    pub fn new(device: Arc<Device>, mip_levels: u32) -> RhiResult<Self> {
        let create_info = vk::SamplerCreateInfo::default()
            .mag_filter(vk::Filter::LINEAR)
            .min_filter(vk::Filter::LINEAR)
            .address_mode_u(vk::SamplerAddressMode::REPEAT)
            .address_mode_v(vk::SamplerAddressMode::REPEAT)
            .address_mode_w(vk::SamplerAddressMode::REPEAT)
            .anisotropy_enable(true)
            .max_anisotropy(MAX_ANISOTROPY)
            .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
            .unnormalized_coordinates(false)
            .compare_enable(false)
            .compare_op(vk::CompareOp::ALWAYS)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .mip_lod_bias(0.0)
            .min_lod(0.0)
            .max_lod(mip_levels as f32);

        // SAFETY: anisotropy was enabled at device creation.
        let sampler = unsafe { device.handle().create_sampler(&create_info, None)? };
        Ok(Self { device, sampler })
    }

    #[inline]
    pub fn handle(&self) -> vk::Sampler {
        self.sampler
    }
}

impl Drop for Sampler {
    fn drop(&mut self) {
        // SAFETY: no descriptor set using the sampler is in flight.
        unsafe { self.device.handle().destroy_sampler(self.sampler, None) };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vk::ImageLayout as L;

    #[test]
    fn test_transition_table_entries() {
        let upload = transition_masks(L::UNDEFINED, L::TRANSFER_DST_OPTIMAL).unwrap();
        assert_eq!(upload.src_access, vk::AccessFlags::empty());
        assert_eq!(upload.dst_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(upload.src_stage, vk::PipelineStageFlags::TOP_OF_PIPE);
        assert_eq!(upload.dst_stage, vk::PipelineStageFlags::TRANSFER);

        let sample = transition_masks(L::TRANSFER_DST_OPTIMAL, L::SHADER_READ_ONLY_OPTIMAL).unwrap();
        assert_eq!(sample.src_access, vk::AccessFlags::TRANSFER_WRITE);
        assert_eq!(sample.dst_access, vk::AccessFlags::SHADER_READ);
        assert_eq!(sample.dst_stage, vk::PipelineStageFlags::FRAGMENT_SHADER);

        let depth = transition_masks(L::UNDEFINED, L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL).unwrap();
        assert_eq!(
            depth.dst_access,
            vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_READ
                | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE
        );
        assert_eq!(depth.dst_stage, vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS);
    }

    #[test]
    fn test_unlisted_transition_is_rejected() {
        let err = transition_masks(L::SHADER_READ_ONLY_OPTIMAL, L::TRANSFER_DST_OPTIMAL).unwrap_err();
        assert!(matches!(
            err,
            RhiError::UnsupportedLayoutTransition {
                old: L::SHADER_READ_ONLY_OPTIMAL,
                new: L::TRANSFER_DST_OPTIMAL
            }
        ));
        assert!(transition_masks(L::UNDEFINED, L::PRESENT_SRC_KHR).is_err());
    }

    #[test]
    fn test_aspect_for_layout() {
        assert_eq!(
            aspect_for_layout(L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, vk::Format::D32_SFLOAT),
            vk::ImageAspectFlags::DEPTH
        );
        assert_eq!(
            aspect_for_layout(L::DEPTH_STENCIL_ATTACHMENT_OPTIMAL, vk::Format::D24_UNORM_S8_UINT),
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        );
        assert_eq!(
            aspect_for_layout(L::TRANSFER_DST_OPTIMAL, vk::Format::R8G8B8A8_SRGB),
            vk::ImageAspectFlags::COLOR
        );
    }

    #[test]
    fn test_mip_level_count() {
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(2, 1), 2);
        assert_eq!(mip_level_count(1024, 1024), 11);
        assert_eq!(mip_level_count(1024, 512), 11);
        assert_eq!(mip_level_count(1000, 3), 10);
        assert_eq!(mip_level_count(0, 0), 1);
    }

    #[test]
    fn test_mip_blit_extents_halve_and_floor_at_one() {
        let blits = mip_blit_extents(8, 2, mip_level_count(8, 2));
        assert_eq!(
            blits,
            vec![((8, 2), (4, 1)), ((4, 1), (2, 1)), ((2, 1), (1, 1))]
        );
        assert!(mip_blit_extents(1, 1, 1).is_empty());
    }
}
