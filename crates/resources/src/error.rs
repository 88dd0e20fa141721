//! Error types for resource loading.

use std::path::PathBuf;
use thiserror::Error;

/// Error type for resource loading operations.
#[derive(Error, Debug)]
pub enum ResourceError {
    /// The OBJ parser rejected the file.
    #[error("Failed to load OBJ file '{path}': {source}")]
    Obj {
        path: PathBuf,
        #[source]
        source: tobj::LoadError,
    },

    /// The file parsed but produced no triangles.
    #[error("OBJ file '{0}' contains no geometry")]
    NoGeometry(PathBuf),

    /// One mesh switches material partway through its faces.
    #[error("Mesh '{mesh}' mixes materials {first:?} and {second:?}")]
    MixedMaterial {
        mesh: String,
        first: Option<usize>,
        second: Option<usize>,
    },

    /// Winding can only be flipped on whole triangles.
    #[error("Index count {0} is not a multiple of 3")]
    WindingMismatch(usize),

    /// A mesh has no texture coordinates and they were not optional.
    #[error("Mesh '{0}' has no texture coordinates")]
    MissingTexCoords(String),

    /// A referenced texture does not exist and no default is configured.
    #[error("Texture not found: {0}")]
    MissingTexture(PathBuf),

    /// Image decoding error.
    #[error("Failed to decode image '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
