//! Vertex format, input descriptions and index-buffer deduplication.
//!
//! # Memory Layout
//!
//! [`Vertex`] uses `#[repr(C)]`:
//! - Offset 0: position (12 bytes)
//! - Offset 12: color (12 bytes)
//! - Offset 24: tex_coord (8 bytes)
//! - Total size: 32 bytes
//!
//! # Shader Locations
//!
//! - location 0: position (vec3)
//! - location 1: color (vec3)
//! - location 2: tex_coord (vec2)

use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use ash::vk;
use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};

/// Mesh vertex with position, color and texture coordinates.
///
/// Equality and hashing compare the exact bit patterns of every component,
/// so two vertices are merged only when they are byte-identical.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct Vertex {
    pub position: Vec3,
    pub color: Vec3,
    pub tex_coord: Vec2,
}

impl Vertex {
    #[inline]
    pub const fn new(position: Vec3, color: Vec3, tex_coord: Vec2) -> Self {
        Self {
            position,
            color,
            tex_coord,
        }
    }

    /// Returns the size of the vertex in bytes.
    #[inline]
    pub const fn size() -> usize {
        std::mem::size_of::<Self>()
    }

    /// Get the vertex input binding description.
    ///
    /// Returns a binding description for binding 0 with per-vertex input rate.
    pub fn binding_description() -> vk::VertexInputBindingDescription {
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<Self>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }
    }

    /// Get the vertex attribute descriptions.
    pub fn attribute_descriptions() -> [vk::VertexInputAttributeDescription; 3] {
        [
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 0,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, position) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 1,
                format: vk::Format::R32G32B32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, color) as u32,
            },
            vk::VertexInputAttributeDescription {
                binding: 0,
                location: 2,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(Vertex, tex_coord) as u32,
            },
        ]
    }

    fn key(&self) -> [u32; 8] {
        [
            self.position.x.to_bits(),
            self.position.y.to_bits(),
            self.position.z.to_bits(),
            self.color.x.to_bits(),
            self.color.y.to_bits(),
            self.color.z.to_bits(),
            self.tex_coord.x.to_bits(),
            self.tex_coord.y.to_bits(),
        ]
    }
}

impl PartialEq for Vertex {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Vertex {}

impl Hash for Vertex {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

/// Builds a vertex array and a 32-bit index array from a triangle soup.
///
/// The first occurrence of a vertex is appended and gets the next index;
/// later occurrences reuse that index.
#[derive(Debug, Default)]
pub struct VertexDeduper {
    vertices: Vec<Vertex>,
    indices: Vec<u32>,
    lookup: HashMap<Vertex, u32>,
}

impl VertexDeduper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records one corner of a triangle and returns the index it was given.
    pub fn push(&mut self, vertex: Vertex) -> u32 {
        let index = match self.lookup.get(&vertex) {
            Some(&index) => index,
            None => {
                let index = self.vertices.len() as u32;
                self.vertices.push(vertex);
                self.lookup.insert(vertex, index);
                index
            }
        };
        self.indices.push(index);
        index
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    pub fn index_count(&self) -> usize {
        self.indices.len()
    }

    /// Consumes the deduper, returning `(vertices, indices)`.
    pub fn finish(self) -> (Vec<Vertex>, Vec<u32>) {
        (self.vertices, self.indices)
    }
}

impl Extend<Vertex> for VertexDeduper {
    fn extend<T: IntoIterator<Item = Vertex>>(&mut self, iter: T) {
        for vertex in iter {
            self.push(vertex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner(x: f32, y: f32) -> Vertex {
        Vertex::new(Vec3::new(x, y, 0.0), Vec3::ONE, Vec2::new(x, y))
    }

    #[test]
    fn test_vertex_size() {
        // Vertex: Vec3 (12) + Vec3 (12) + Vec2 (8) = 32 bytes
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
        assert_eq!(Vertex::size(), 32);
    }

    #[test]
    fn test_vertex_binding_description() {
        let binding = Vertex::binding_description();
        assert_eq!(binding.binding, 0);
        assert_eq!(binding.stride, 32);
        assert_eq!(binding.input_rate, vk::VertexInputRate::VERTEX);
    }

    #[test]
    fn test_vertex_attribute_descriptions() {
        let attrs = Vertex::attribute_descriptions();
        assert_eq!(attrs.len(), 3);

        assert_eq!(attrs[0].location, 0);
        assert_eq!(attrs[0].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[0].offset, 0);

        assert_eq!(attrs[1].location, 1);
        assert_eq!(attrs[1].format, vk::Format::R32G32B32_SFLOAT);
        assert_eq!(attrs[1].offset, 12);

        assert_eq!(attrs[2].location, 2);
        assert_eq!(attrs[2].format, vk::Format::R32G32_SFLOAT);
        assert_eq!(attrs[2].offset, 24);
    }

    #[test]
    fn test_vertex_pod_bytes() {
        let vertex = corner(1.0, 2.0);
        let bytes: &[u8] = bytemuck::bytes_of(&vertex);
        assert_eq!(bytes.len(), 32);

        let back: &Vertex = bytemuck::from_bytes(bytes);
        assert_eq!(*back, vertex);
    }

    #[test]
    fn test_equality_is_bitwise() {
        let a = Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO);
        let b = Vertex::new(Vec3::new(-0.0, 0.0, 0.0), Vec3::ONE, Vec2::ZERO);
        assert_ne!(a, b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_same_vertex_twice_is_shared() {
        let mut deduper = VertexDeduper::new();
        let first = deduper.push(corner(0.5, 0.5));
        let second = deduper.push(corner(0.5, 0.5));

        assert_eq!(first, second);
        let (vertices, indices) = deduper.finish();
        assert_eq!(vertices.len(), 1);
        assert_eq!(indices, vec![0, 0]);
    }

    #[test]
    fn test_quad_shares_diagonal() {
        let a = corner(0.0, 0.0);
        let b = corner(1.0, 0.0);
        let c = corner(1.0, 1.0);
        let d = corner(0.0, 1.0);

        let mut deduper = VertexDeduper::new();
        deduper.extend([a, b, c, c, d, a]);
        assert_eq!(deduper.vertex_count(), 4);
        assert_eq!(deduper.index_count(), 6);

        let (vertices, indices) = deduper.finish();
        assert_eq!(vertices, vec![a, b, c, d]);
        assert_eq!(indices, vec![0, 1, 2, 2, 3, 0]);

        let first: std::collections::HashSet<u32> = indices[..3].iter().copied().collect();
        let second: std::collections::HashSet<u32> = indices[3..].iter().copied().collect();
        assert_eq!(first.intersection(&second).count(), 2);
    }

    #[test]
    fn test_differing_tex_coord_is_distinct() {
        let mut deduper = VertexDeduper::new();
        deduper.push(Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::ZERO));
        deduper.push(Vertex::new(Vec3::ZERO, Vec3::ONE, Vec2::X));
        assert_eq!(deduper.vertex_count(), 2);
    }
}
