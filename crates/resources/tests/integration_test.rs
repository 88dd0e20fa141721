//! Integration tests for model loading and the image cache.

use std::fs;
use std::path::Path;

use vkcraft_resources::{ImageCache, LoadSettings, ModelLoader, ResourceError};

const QUAD_OBJ: &str = "\
mtllib quad.mtl
o quad
v -0.5 -0.5 0.0
v  0.5 -0.5 0.0
v  0.5  0.5 0.0
v -0.5  0.5 0.0
vt 0.0 0.0
vt 1.0 0.0
vt 1.0 1.0
vt 0.0 0.25
usemtl stone
f 1/1 2/2 3/3 4/4
";

const QUAD_MTL: &str = "\
newmtl stone
Kd 1.0 1.0 1.0
map_Kd stone.png
";

fn write(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write fixture");
}

fn write_png(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([x as u8 * 10, y as u8 * 10, 128])
    });
    img.save(path).expect("write png");
}

#[test]
fn test_load_quad_deduplicates_vertices() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quad.obj", QUAD_OBJ);
    write(dir.path(), "quad.mtl", QUAD_MTL);
    write_png(&dir.path().join("stone.png"), 2, 2);

    let model = ModelLoader::new()
        .load(
            &dir.path().join("quad.obj"),
            dir.path(),
            LoadSettings::default(),
        )
        .unwrap();

    assert_eq!(model.shapes.len(), 1);
    let shape = &model.shapes[0];
    assert_eq!(shape.vertices.len(), 4);
    assert_eq!(shape.indices.len(), 6);
    assert_eq!(shape.material_id, Some(0));

    // V is flipped on load.
    assert!(shape
        .vertices
        .iter()
        .any(|v| v.tex_coord.x == 0.0 && (v.tex_coord.y - 0.75).abs() < 1e-6));
    assert!(shape.vertices.iter().all(|v| v.color == glam::Vec3::ONE));

    assert_eq!(model.materials.len(), 1);
    assert_eq!(
        model.first_diffuse_texture(),
        Some(dir.path().join("stone.png").as_path())
    );
}

#[test]
fn test_flip_winding_reverses_each_triangle() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quad.obj", QUAD_OBJ);
    write(dir.path(), "quad.mtl", QUAD_MTL);
    write_png(&dir.path().join("stone.png"), 1, 1);

    let loader = ModelLoader::new();
    let path = dir.path().join("quad.obj");
    let plain = loader
        .load(&path, dir.path(), LoadSettings::default())
        .unwrap();
    let flipped = loader
        .load(
            &path,
            dir.path(),
            LoadSettings {
                flip_winding: true,
                ..LoadSettings::default()
            },
        )
        .unwrap();

    let a = &plain.shapes[0].indices;
    let b = &flipped.shapes[0].indices;
    for (ta, tb) in a.chunks(3).zip(b.chunks(3)) {
        assert_eq!([ta[2], ta[1], ta[0]], [tb[0], tb[1], tb[2]]);
    }
}

#[test]
fn test_missing_texture_uses_default() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quad.obj", QUAD_OBJ);
    write(dir.path(), "quad.mtl", QUAD_MTL);
    let fallback = dir.path().join("default.png");
    write_png(&fallback, 1, 1);

    let model = ModelLoader::new()
        .with_default_texture(&fallback)
        .load(
            &dir.path().join("quad.obj"),
            dir.path(),
            LoadSettings::default(),
        )
        .unwrap();

    assert_eq!(model.first_diffuse_texture(), Some(fallback.as_path()));
}

#[test]
fn test_missing_texture_without_default_fails() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "quad.obj", QUAD_OBJ);
    write(dir.path(), "quad.mtl", QUAD_MTL);

    let err = ModelLoader::new()
        .load(
            &dir.path().join("quad.obj"),
            dir.path(),
            LoadSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ResourceError::MissingTexture(_)));
}

#[test]
fn test_missing_texcoords() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "tri.obj",
        "v 0 0 0\nv 1 0 0\nv 0 1 0\nf 1 2 3\n",
    );
    let path = dir.path().join("tri.obj");
    let loader = ModelLoader::new();

    let err = loader
        .load(&path, dir.path(), LoadSettings::default())
        .unwrap_err();
    assert!(matches!(err, ResourceError::MissingTexCoords(_)));

    let model = loader
        .load(
            &path,
            dir.path(),
            LoadSettings {
                ignore_missing_uvs: true,
                ..LoadSettings::default()
            },
        )
        .unwrap();
    assert_eq!(model.vertex_count(), 3);
    assert!(model.materials.is_empty());
}

#[test]
fn test_mesh_switching_material_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "mixed.mtl",
        "newmtl a\nKd 1 0 0\nnewmtl b\nKd 0 1 0\n",
    );
    write(
        dir.path(),
        "mixed.obj",
        "mtllib mixed.mtl\no block\nv 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0\n\
         vt 0 0\nusemtl a\nf 1/1 2/1 3/1\nusemtl b\nf 1/1 3/1 4/1\n",
    );

    let err = ModelLoader::new()
        .load(
            &dir.path().join("mixed.obj"),
            dir.path(),
            LoadSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ResourceError::MixedMaterial { .. }));
}

#[test]
fn test_empty_obj_has_no_geometry() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "empty.obj", "# nothing\n");

    let err = ModelLoader::new()
        .load(
            &dir.path().join("empty.obj"),
            dir.path(),
            LoadSettings::default(),
        )
        .unwrap_err();
    assert!(matches!(err, ResourceError::NoGeometry(_)));
}

#[test]
fn test_image_cache_decodes_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tex.png");
    write_png(&path, 4, 2);

    let mut cache = ImageCache::new();
    let first = cache.load(&path).unwrap();
    assert_eq!((first.width, first.height), (4, 2));
    assert_eq!(first.byte_len(), 4 * 2 * 4);
    // RGB input gains an opaque alpha channel.
    assert_eq!(first.pixels[3], 255);

    let second = cache.load(&path).unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(cache.len(), 1);

    cache.clear();
    assert!(cache.is_empty());
    assert!(!cache.contains(&path));
    // Handles taken before clearing stay usable.
    assert_eq!(first.width, 4);
}
