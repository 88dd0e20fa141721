//! OBJ model loading.
//!
//! Models are parsed with `tobj` (triangulated, single index stream), turned
//! into deduplicated [`Vertex`] arrays per shape, and checked for material
//! consistency. Diffuse textures named by the material library are resolved
//! against the material directory, with a configurable fallback.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use glam::{Vec2, Vec3};
use tracing::{debug, info, warn};
use vkcraft_rhi::vertex::{Vertex, VertexDeduper};

use crate::error::{ResourceError, ResourceResult};

/// Every loaded vertex is white; color comes from the texture.
pub const VERTEX_COLOR: Vec3 = Vec3::ONE;

/// Options that change how a model is turned into vertices.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoadSettings {
    /// Swap the first and last index of every triangle.
    pub flip_winding: bool,
    /// Use `(0, 0)` texture coordinates instead of failing when a mesh has none.
    pub ignore_missing_uvs: bool,
}

/// One mesh with its own vertex and index arrays.
#[derive(Debug, Clone, Default)]
pub struct ModelShape {
    pub name: String,
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
    pub material_id: Option<usize>,
}

/// Material reference; only the diffuse texture is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelMaterial {
    pub name: String,
    pub diffuse_texture: Option<PathBuf>,
}

/// Result of loading one OBJ file.
#[derive(Debug, Clone, Default)]
pub struct LoadedModel {
    pub shapes: Vec<ModelShape>,
    pub materials: Vec<ModelMaterial>,
}

impl LoadedModel {
    /// Concatenates every shape into one vertex and one index array, offsetting
    /// indices so they keep pointing at their own shape's vertices.
    pub fn merged(&self) -> (Vec<Vertex>, Vec<u32>) {
        let mut vertices = Vec::with_capacity(self.shapes.iter().map(|s| s.vertices.len()).sum());
        let mut indices = Vec::with_capacity(self.shapes.iter().map(|s| s.indices.len()).sum());

        for shape in &self.shapes {
            let base = vertices.len() as u32;
            vertices.extend_from_slice(&shape.vertices);
            indices.extend(shape.indices.iter().map(|&i| i + base));
        }

        (vertices, indices)
    }

    pub fn vertex_count(&self) -> usize {
        self.shapes.iter().map(|s| s.vertices.len()).sum()
    }

    pub fn index_count(&self) -> usize {
        self.shapes.iter().map(|s| s.indices.len()).sum()
    }

    /// Diffuse texture of the first material that names one.
    pub fn first_diffuse_texture(&self) -> Option<&Path> {
        self.materials
            .iter()
            .find_map(|m| m.diffuse_texture.as_deref())
    }
}

/// Loads OBJ files into [`LoadedModel`]s.
#[derive(Debug, Clone, Default)]
pub struct ModelLoader {
    default_texture: Option<PathBuf>,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Texture substituted when a material names a file that does not exist.
    pub fn with_default_texture(mut self, path: impl Into<PathBuf>) -> Self {
        self.default_texture = Some(path.into());
        self
    }

    /// Loads `path`, reading material libraries from `material_dir`.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be parsed, contains no triangles, mixes
    /// materials inside one mesh, lacks texture coordinates that were not
    /// declared optional, or cannot have its winding flipped.
    pub fn load(
        &self,
        path: &Path,
        material_dir: &Path,
        settings: LoadSettings,
    ) -> ResourceResult<LoadedModel> {
        info!(path = %path.display(), "Loading model");

        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let options = tobj::LoadOptions {
            single_index: true,
            triangulate: true,
            ignore_points: true,
            ignore_lines: true,
        };

        let (models, materials) =
            tobj::load_obj_buf(&mut reader, &options, |mtl| {
                tobj::load_mtl(material_dir.join(mtl))
            })
            .map_err(|source| ResourceError::Obj {
                path: path.to_path_buf(),
                source,
            })?;

        let materials = match materials {
            Ok(materials) => materials,
            Err(e) => {
                warn!(path = %path.display(), "Material library not loaded: {e}");
                Vec::new()
            }
        };

        let ids: Vec<(&str, Option<usize>)> = models
            .iter()
            .map(|m| (m.name.as_str(), m.mesh.material_id))
            .collect();
        check_material_ids(&ids)?;

        let mut shapes = Vec::with_capacity(models.len());
        for model in &models {
            let shape = build_shape(&model.name, &model.mesh, settings)?;
            debug!(
                shape = %shape.name,
                vertices = shape.vertices.len(),
                indices = shape.indices.len(),
                "Shape built"
            );
            shapes.push(shape);
        }

        let materials = materials
            .into_iter()
            .map(|m| {
                let diffuse_texture = match m.diffuse_texture.as_deref() {
                    Some(name) if !name.is_empty() => {
                        Some(self.resolve_texture(&material_dir.join(name))?)
                    }
                    _ => None,
                };
                Ok(ModelMaterial {
                    name: m.name,
                    diffuse_texture,
                })
            })
            .collect::<ResourceResult<Vec<_>>>()?;

        let model = LoadedModel { shapes, materials };
        if model.index_count() == 0 {
            return Err(ResourceError::NoGeometry(path.to_path_buf()));
        }

        info!(
            path = %path.display(),
            shapes = model.shapes.len(),
            materials = model.materials.len(),
            vertices = model.vertex_count(),
            indices = model.index_count(),
            "Model loaded"
        );

        Ok(model)
    }

    /// Returns `path` when it exists, else the default texture.
    pub fn resolve_texture(&self, path: &Path) -> ResourceResult<PathBuf> {
        if path.is_file() {
            return Ok(path.to_path_buf());
        }

        match &self.default_texture {
            Some(default) => {
                warn!(
                    missing = %path.display(),
                    default = %default.display(),
                    "Texture not found, using default"
                );
                Ok(default.clone())
            }
            None => Err(ResourceError::MissingTexture(path.to_path_buf())),
        }
    }
}

/// Fails when a mesh changes material mid-way.
///
/// The parser starts a new entry with the same name whenever the active
/// material changes, so consecutive entries sharing a name must agree.
pub fn check_material_ids(meshes: &[(&str, Option<usize>)]) -> ResourceResult<()> {
    for pair in meshes.windows(2) {
        let (name_a, id_a) = pair[0];
        let (name_b, id_b) = pair[1];
        if name_a == name_b && id_a != id_b {
            return Err(ResourceError::MixedMaterial {
                mesh: name_a.to_string(),
                first: id_a,
                second: id_b,
            });
        }
    }
    Ok(())
}

/// Reverses every triangle in place by swapping its first and last index.
pub fn flip_winding(indices: &mut [u32]) -> ResourceResult<()> {
    if indices.len() % 3 != 0 {
        return Err(ResourceError::WindingMismatch(indices.len()));
    }
    for triangle in indices.chunks_exact_mut(3) {
        triangle.swap(0, 2);
    }
    Ok(())
}

fn build_shape(name: &str, mesh: &tobj::Mesh, settings: LoadSettings) -> ResourceResult<ModelShape> {
    let has_uvs = !mesh.texcoords.is_empty();
    if !has_uvs && !settings.ignore_missing_uvs && !mesh.indices.is_empty() {
        return Err(ResourceError::MissingTexCoords(name.to_string()));
    }

    let mut deduper = VertexDeduper::new();
    for &index in &mesh.indices {
        let i = index as usize;
        let position = Vec3::new(
            mesh.positions[3 * i],
            mesh.positions[3 * i + 1],
            mesh.positions[3 * i + 2],
        );
        let tex_coord = if has_uvs {
            Vec2::new(mesh.texcoords[2 * i], 1.0 - mesh.texcoords[2 * i + 1])
        } else {
            Vec2::ZERO
        };
        deduper.push(Vertex::new(position, VERTEX_COLOR, tex_coord));
    }

    let (vertices, mut indices) = deduper.finish();
    if settings.flip_winding {
        flip_winding(&mut indices)?;
    }

    Ok(ModelShape {
        name: name.to_string(),
        vertices,
        indices,
        material_id: mesh.material_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flip_winding_swaps_outer_indices() {
        let mut indices = vec![0, 1, 2, 2, 3, 0];
        flip_winding(&mut indices).unwrap();
        assert_eq!(indices, vec![2, 1, 0, 0, 3, 2]);
    }

    #[test]
    fn test_flip_winding_twice_is_identity() {
        let original = vec![4, 5, 6, 7, 8, 9];
        let mut indices = original.clone();
        flip_winding(&mut indices).unwrap();
        flip_winding(&mut indices).unwrap();
        assert_eq!(indices, original);
    }

    #[test]
    fn test_flip_winding_rejects_partial_triangle() {
        let mut indices = vec![0, 1, 2, 3];
        let err = flip_winding(&mut indices).unwrap_err();
        assert!(matches!(err, ResourceError::WindingMismatch(4)));
        assert_eq!(indices, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_material_ids_consistent() {
        let meshes = [("room", Some(0)), ("door", Some(1)), ("door", Some(1))];
        assert!(check_material_ids(&meshes).is_ok());
    }

    #[test]
    fn test_material_ids_mixed_in_one_mesh() {
        let meshes = [("room", Some(0)), ("room", Some(1))];
        let err = check_material_ids(&meshes).unwrap_err();
        match err {
            ResourceError::MixedMaterial {
                mesh,
                first,
                second,
            } => {
                assert_eq!(mesh, "room");
                assert_eq!(first, Some(0));
                assert_eq!(second, Some(1));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_merged_offsets_indices() {
        let v = |x: f32| Vertex::new(Vec3::splat(x), VERTEX_COLOR, Vec2::ZERO);
        let model = LoadedModel {
            shapes: vec![
                ModelShape {
                    name: "a".into(),
                    vertices: vec![v(0.0), v(1.0), v(2.0)],
                    indices: vec![0, 1, 2],
                    material_id: None,
                },
                ModelShape {
                    name: "b".into(),
                    vertices: vec![v(3.0), v(4.0), v(5.0)],
                    indices: vec![2, 1, 0],
                    material_id: None,
                },
            ],
            materials: Vec::new(),
        };

        let (vertices, indices) = model.merged();
        assert_eq!(vertices.len(), 6);
        assert_eq!(indices, vec![0, 1, 2, 5, 4, 3]);
        assert_eq!(model.vertex_count(), 6);
        assert_eq!(model.index_count(), 6);
    }

    #[test]
    fn test_resolve_texture_without_default() {
        let loader = ModelLoader::new();
        let err = loader
            .resolve_texture(Path::new("/definitely/not/here.png"))
            .unwrap_err();
        assert!(matches!(err, ResourceError::MissingTexture(_)));
    }

    #[test]
    fn test_resolve_texture_falls_back_to_default() {
        let loader = ModelLoader::new().with_default_texture("fallback.png");
        let resolved = loader
            .resolve_texture(Path::new("/definitely/not/here.png"))
            .unwrap();
        assert_eq!(resolved, PathBuf::from("fallback.png"));
    }
}
