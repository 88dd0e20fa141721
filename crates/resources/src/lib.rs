//! Resource loading and management.
//!
//! This crate handles loading of external assets:
//! - OBJ model loading with vertex deduplication
//! - Image decoding and caching
//! - Per-frame uniform records

mod error;

pub mod image_cache;
pub mod model;
pub mod ubo;

pub use error::{ResourceError, ResourceResult};
pub use image_cache::{ImageCache, LoadedImage};
pub use model::{LoadSettings, LoadedModel, ModelLoader, ModelMaterial, ModelShape};
pub use ubo::UniformBufferObject;
