//! RHI error types.

use ash::vk;
use thiserror::Error;

/// Errors raised by the Vulkan layer.
///
/// Everything here is fatal when it happens during setup. Stale swapchains
/// are not errors; they are reported through
/// [`SwapchainStatus`](crate::swapchain::SwapchainStatus) and
/// [`AcquiredImage::OutOfDate`](crate::swapchain::AcquiredImage).
#[derive(Error, Debug)]
pub enum RhiError {
    #[error("Vulkan error: {0}")]
    Vulkan(#[from] vk::Result),

    #[error("Failed to load Vulkan: {0}")]
    Loading(#[from] ash::LoadingError),

    #[error("Allocator error: {0}")]
    Allocator(#[from] gpu_allocator::AllocationError),

    /// A thread panicked while holding the allocator lock.
    #[error("GPU allocator lock poisoned")]
    AllocatorPoisoned,

    /// No physical device satisfies the adapter requirements.
    #[error("No suitable GPU adapter found")]
    NoSuitableAdapter,

    /// The surface does not offer B8G8R8A8_SRGB with SRGB_NONLINEAR.
    #[error("Surface does not support the required format {format:?} / {color_space:?}")]
    NoAcceptableFormat {
        format: vk::Format,
        color_space: vk::ColorSpaceKHR,
    },

    /// The surface does not offer the required present mode.
    #[error("Surface does not support present mode {0:?}")]
    NoAcceptablePresentMode(vk::PresentModeKHR),

    /// The validation layer was requested but is not installed.
    #[error("Validation layer {0} requested but not available")]
    ValidationLayerMissing(String),

    #[error("Required instance extensions not available: {0:?}")]
    MissingExtensions(Vec<String>),

    #[error("Shader error: {0}")]
    Shader(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// The pair is not in the layout transition table.
    #[error("Unsupported layout transition {old:?} -> {new:?}")]
    UnsupportedLayoutTransition {
        old: vk::ImageLayout,
        new: vk::ImageLayout,
    },

    /// The format cannot be the source of a linear-filtered blit.
    #[error("Format {0:?} does not support linear blitting")]
    UnsupportedBlitFormat(vk::Format),

    #[error("No supported depth format among {0:?}")]
    NoSupportedDepthFormat(Vec<vk::Format>),

    /// Acquire or present failed for a reason other than a stale swapchain.
    #[error("Presentation failed: {0}")]
    Presentation(vk::Result),

    #[error("Invalid handle: {0}")]
    InvalidHandle(String),
}

pub type RhiResult<T> = std::result::Result<T, RhiError>;
