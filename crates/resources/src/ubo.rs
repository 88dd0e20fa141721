//! Uniform Buffer Object (UBO) structures for shader data.
//!
//! The structure uses `#[repr(C)]` for correct memory layout and implements
//! `bytemuck::Pod` and `bytemuck::Zeroable` for safe byte-level operations.
//!
//! # GPU Memory Layout
//!
//! Three `Mat4`s back to back satisfy std140 without padding.
//!
//! # Example
//!
//! ```
//! use vkcraft_resources::ubo::UniformBufferObject;
//! use glam::{Mat4, Vec3};
//!
//! let view = Mat4::look_at_rh(Vec3::splat(2.0), Vec3::ZERO, Vec3::Y);
//! let proj = Mat4::perspective_rh(45.0_f32.to_radians(), 4.0 / 3.0, 0.1, 10.0);
//! let ubo = UniformBufferObject::spinning(1.5, view, proj);
//!
//! let bytes: &[u8] = bytemuck::bytes_of(&ubo);
//! assert_eq!(bytes.len(), UniformBufferObject::size());
//! ```

use bytemuck::{Pod, Zeroable};
use glam::Mat4;

/// How fast the model turns about +Y.
pub const MODEL_ROTATION_DEGREES_PER_SECOND: f32 = 22.5;

/// Transform matrices rewritten every frame.
///
/// # Memory Layout (std140)
///
/// | Offset | Size | Field |
/// |--------|------|-------|
/// | 0      | 64   | model |
/// | 64     | 64   | view  |
/// | 128    | 64   | proj  |
///
/// Total size: 192 bytes
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    /// Object space to world space.
    pub model: Mat4,
    /// World space to camera space.
    pub view: Mat4,
    /// Camera space to clip space, Y already flipped for Vulkan.
    pub proj: Mat4,
}

impl Default for UniformBufferObject {
    fn default() -> Self {
        Self {
            model: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        }
    }
}

impl UniformBufferObject {
    #[inline]
    pub fn new(model: Mat4, view: Mat4, proj: Mat4) -> Self {
        Self { model, view, proj }
    }

    /// Record for a model that has been turning for `elapsed_seconds`.
    pub fn spinning(elapsed_seconds: f32, view: Mat4, proj: Mat4) -> Self {
        Self::new(model_rotation(elapsed_seconds), view, proj)
    }

    /// Returns the size of this structure in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }
}

/// Rotation about +Y after `elapsed_seconds`.
pub fn model_rotation(elapsed_seconds: f32) -> Mat4 {
    Mat4::from_rotation_y((elapsed_seconds * MODEL_ROTATION_DEGREES_PER_SECOND).to_radians())
}
