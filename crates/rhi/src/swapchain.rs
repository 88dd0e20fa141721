//! Swapchain creation, image acquisition and presentation.
//!
//! Selection policy is deliberately narrow:
//! - format: exactly `B8G8R8A8_SRGB` + `SRGB_NONLINEAR`, else
//!   [`RhiError::NoAcceptableFormat`]
//! - present mode: exactly `MAILBOX`, else [`RhiError::NoAcceptablePresentMode`]
//! - extent: the surface's current extent; when the surface reports the
//!   `u32::MAX` sentinel the framebuffer size clamped to the surface limits
//! - image count: `min + 1`, capped by `max` when `max > 0`
//!
//! A [`Swapchain`] is never patched in place. Recreation drops the old one and
//! builds a new one from scratch.

use std::sync::Arc;

use ash::vk;
use tracing::{debug, info};

use crate::device::Device;
use crate::error::{RhiError, RhiResult};
use crate::image::ImageView;

/// The only accepted surface format.
pub const REQUIRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::B8G8R8A8_SRGB,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// The only accepted present mode.
pub const REQUIRED_PRESENT_MODE: vk::PresentModeKHR = vk::PresentModeKHR::MAILBOX;

/// What a surface supports, as queried from an adapter.
#[derive(Debug, Clone)]
pub struct SwapchainSupportDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

impl SwapchainSupportDetails {
    pub fn query(
        physical_device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> RhiResult<Self> {
        // SAFETY: the surface and physical device come from the same instance
        // as the loader.
        let (capabilities, formats, present_modes) = unsafe {
            (
                surface_loader.get_physical_device_surface_capabilities(physical_device, surface)?,
                surface_loader.get_physical_device_surface_formats(physical_device, surface)?,
                surface_loader
                    .get_physical_device_surface_present_modes(physical_device, surface)?,
            )
        };

        debug!(
            formats = formats.len(),
            present_modes = present_modes.len(),
            min_images = capabilities.min_image_count,
            max_images = capabilities.max_image_count,
            "Queried swapchain support"
        );

        Ok(Self {
            capabilities,
            formats,
            present_modes,
        })
    }

    /// At least one format and one present mode.
    #[inline]
    pub fn is_adequate(&self) -> bool {
        !self.formats.is_empty() && !self.present_modes.is_empty()
    }
}

/// Settings a swapchain is created with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SwapchainConfig {
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub extent: vk::Extent2D,
    pub image_count: u32,
}

impl SwapchainConfig {
    /// Applies the selection policy to `support`.
    ///
    /// `framebuffer_size` is only consulted when the surface leaves the
    /// extent up to the application.
    pub fn choose(
        support: &SwapchainSupportDetails,
        framebuffer_size: (u32, u32),
    ) -> RhiResult<Self> {
        Ok(Self {
            surface_format: choose_surface_format(&support.formats)?,
            present_mode: choose_present_mode(&support.present_modes)?,
            extent: choose_extent(&support.capabilities, framebuffer_size),
            image_count: determine_image_count(&support.capabilities),
        })
    }
}

/// Outcome of a successful acquire or present.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwapchainStatus {
    Optimal,
    /// Still usable, but the swapchain should be recreated after this frame.
    Suboptimal,
    /// Unusable; the swapchain must be recreated before the next submit.
    OutOfDate,
}

impl SwapchainStatus {
    #[inline]
    pub fn needs_recreate(self) -> bool {
        !matches!(self, SwapchainStatus::Optimal)
    }
}

/// Result of [`Swapchain::acquire_next_image`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcquiredImage {
    /// An image is ready; `status` is `Optimal` or `Suboptimal`.
    Ready { index: u32, status: SwapchainStatus },
    /// Nothing was acquired; recreate and skip this frame.
    OutOfDate,
}

/// Maps a raw acquire result onto [`AcquiredImage`]. Every error other than
/// `ERROR_OUT_OF_DATE_KHR` is fatal.
pub fn classify_acquire(result: Result<(u32, bool), vk::Result>) -> RhiResult<AcquiredImage> {
    match result {
        Ok((index, false)) => Ok(AcquiredImage::Ready {
            index,
            status: SwapchainStatus::Optimal,
        }),
        Ok((index, true)) => Ok(AcquiredImage::Ready {
            index,
            status: SwapchainStatus::Suboptimal,
        }),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
        Err(e) => Err(RhiError::Presentation(e)),
    }
}

/// Maps a raw present result onto [`SwapchainStatus`].
pub fn classify_present(result: Result<bool, vk::Result>) -> RhiResult<SwapchainStatus> {
    match result {
        Ok(false) => Ok(SwapchainStatus::Optimal),
        Ok(true) => Ok(SwapchainStatus::Suboptimal),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(SwapchainStatus::OutOfDate),
        Err(e) => Err(RhiError::Presentation(e)),
    }
}

/// The presentable image chain and one view per image.
pub struct Swapchain {
    device: Arc<Device>,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<ImageView>,
    config: SwapchainConfig,
}

impl Swapchain {
    pub fn new(
        device: Arc<Device>,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
        framebuffer_size: (u32, u32),
    ) -> RhiResult<Self> {
        let support =
            SwapchainSupportDetails::query(device.physical_device(), surface, surface_loader)?;
        let config = SwapchainConfig::choose(&support, framebuffer_size)?;

        let families = device.queue_families();
        let family_indices = [families.graphics, families.present];
        let (sharing_mode, shared_families) = if families.is_split() {
            debug!(
                graphics = families.graphics,
                present = families.present,
                "Queue families differ, swapchain images use concurrent sharing"
            );
            (vk::SharingMode::CONCURRENT, &family_indices[..])
        } else {
            (vk::SharingMode::EXCLUSIVE, &[][..])
        };

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface)
            .min_image_count(config.image_count)
            .image_format(config.surface_format.format)
            .image_color_space(config.surface_format.color_space)
            .image_extent(config.extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(shared_families)
            .pre_transform(support.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(config.present_mode)
            .clipped(true);

        let swapchain_loader =
            ash::khr::swapchain::Device::new(device.instance(), device.handle());

        // SAFETY: surface and device are alive; the previous swapchain for
        // this surface, if any, has already been destroyed.
        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None)? };

        // SAFETY: the swapchain was just created by this loader.
        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e.into());
            }
        };

        let mut this = Self {
            device,
            swapchain_loader,
            swapchain,
            images,
            image_views: Vec::new(),
            config,
        };

        for &image in &this.images {
            let view = ImageView::new(
                this.device.clone(),
                image,
                config.surface_format.format,
                vk::ImageAspectFlags::COLOR,
                1,
            )?;
            this.image_views.push(view);
        }

        info!(
            width = config.extent.width,
            height = config.extent.height,
            format = ?config.surface_format.format,
            present_mode = ?config.present_mode,
            images = this.images.len(),
            "Swapchain created"
        );

        Ok(this)
    }

    /// Acquires the next image, blocking without a timeout.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> RhiResult<AcquiredImage> {
        // SAFETY: the semaphore is unsignaled and has no pending signal
        // (its previous use was waited on by the slot fence).
        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        };
        classify_acquire(result)
    }

    /// Queues `image_index` for presentation after `wait_semaphore`.
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphore: vk::Semaphore,
    ) -> RhiResult<SwapchainStatus> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [wait_semaphore];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        // SAFETY: image_index was acquired from this swapchain and the
        // semaphore is signaled by the submit that rendered it.
        classify_present(unsafe { self.swapchain_loader.queue_present(queue, &present_info) })
    }

    #[inline]
    pub fn handle(&self) -> vk::SwapchainKHR {
        self.swapchain
    }

    #[inline]
    pub fn config(&self) -> SwapchainConfig {
        self.config
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.config.surface_format.format
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.config.extent
    }

    #[inline]
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.images
    }

    #[inline]
    pub fn image_views(&self) -> &[ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        // Views reference the swapchain images.
        self.image_views.clear();

        // SAFETY: the caller drained the device before dropping; images are
        // owned by the swapchain and go with it.
        unsafe {
            self.swapchain_loader
                .destroy_swapchain(self.swapchain, None);
        }

        debug!(
            width = self.config.extent.width,
            height = self.config.extent.height,
            images = self.images.len(),
            "Swapchain destroyed"
        );
    }
}

/// Strict match on [`REQUIRED_SURFACE_FORMAT`].
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> RhiResult<vk::SurfaceFormatKHR> {
    formats
        .iter()
        .copied()
        .find(|f| {
            f.format == REQUIRED_SURFACE_FORMAT.format
                && f.color_space == REQUIRED_SURFACE_FORMAT.color_space
        })
        .ok_or(RhiError::NoAcceptableFormat {
            format: REQUIRED_SURFACE_FORMAT.format,
            color_space: REQUIRED_SURFACE_FORMAT.color_space,
        })
}

/// Strict match on [`REQUIRED_PRESENT_MODE`].
pub fn choose_present_mode(present_modes: &[vk::PresentModeKHR]) -> RhiResult<vk::PresentModeKHR> {
    if present_modes.contains(&REQUIRED_PRESENT_MODE) {
        Ok(REQUIRED_PRESENT_MODE)
    } else {
        Err(RhiError::NoAcceptablePresentMode(REQUIRED_PRESENT_MODE))
    }
}

/// The surface's current extent, or the framebuffer size clamped to the
/// surface limits when the current extent is the `u32::MAX` sentinel.
pub fn choose_extent(
    capabilities: &vk::SurfaceCapabilitiesKHR,
    framebuffer_size: (u32, u32),
) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let (width, height) = framebuffer_size;
    vk::Extent2D {
        width: width.clamp(
            capabilities.min_image_extent.width,
            capabilities.max_image_extent.width,
        ),
        height: height.clamp(
            capabilities.min_image_extent.height,
            capabilities.max_image_extent.height,
        ),
    }
}

/// `min + 1`, capped by `max` unless `max` is 0 (unbounded).
pub fn determine_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let preferred = capabilities.min_image_count + 1;
    if capabilities.max_image_count > 0 {
        preferred.min(capabilities.max_image_count)
    } else {
        preferred
    }
}
