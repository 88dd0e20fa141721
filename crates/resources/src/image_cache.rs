//! Decoded image cache.
//!
//! Images are decoded once into tightly packed RGBA8 and shared by path until
//! the cache is cleared.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{ResourceError, ResourceResult};

/// RGBA8 pixels of one decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedImage {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl LoadedImage {
    /// Decodes `path` into RGBA8 regardless of its stored channel count.
    pub fn decode(path: &Path) -> ResourceResult<Self> {
        let decoded = image::open(path).map_err(|source| ResourceError::Image {
            path: path.to_path_buf(),
            source,
        })?;
        let rgba = decoded.to_rgba8();
        let (width, height) = rgba.dimensions();

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            pixels: rgba.into_raw(),
        })
    }

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Path-keyed cache of decoded images.
#[derive(Debug, Default)]
pub struct ImageCache {
    entries: HashMap<PathBuf, Arc<LoadedImage>>,
}

impl ImageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached image for `path`, decoding it on first use.
    pub fn load(&mut self, path: &Path) -> ResourceResult<Arc<LoadedImage>> {
        if let Some(image) = self.entries.get(path) {
            debug!(path = %path.display(), "Image cache hit");
            return Ok(Arc::clone(image));
        }

        let image = Arc::new(LoadedImage::decode(path)?);
        info!(
            path = %path.display(),
            width = image.width,
            height = image.height,
            "Image decoded"
        );
        self.entries.insert(path.to_path_buf(), Arc::clone(&image));
        Ok(image)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every cached image. Outstanding `Arc`s stay valid.
    pub fn clear(&mut self) {
        debug!(count = self.entries.len(), "Image cache cleared");
        self.entries.clear();
    }
}
