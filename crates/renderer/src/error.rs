//! Error type for the renderer.

use thiserror::Error;
use vkcraft_resources::ResourceError;
use vkcraft_rhi::RhiError;

#[derive(Error, Debug)]
pub enum RendererError {
    #[error(transparent)]
    Rhi(#[from] RhiError),

    #[error(transparent)]
    Resource(#[from] ResourceError),

    /// Window, surface or configuration failure.
    #[error(transparent)]
    Platform(#[from] vkcraft_core::Error),

    /// The loaded model cannot be drawn.
    #[error("Model error: {0}")]
    Model(String),
}

pub type RendererResult<T> = Result<T, RendererError>;
