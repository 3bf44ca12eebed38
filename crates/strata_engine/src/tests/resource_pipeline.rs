//! Archive -> resource pack -> mesh codec -> scene, end to end

use std::path::PathBuf;
use std::sync::Arc;

use crate::assets::{mesh_codec, ArchiveBuilder, ImageData, PackError, ResourcePack};
use crate::config::{ResourceConfig, SceneConfig};
use crate::foundation::math::Vec3;
use crate::foundation::memory::{BufferAllocator, TrackingAllocator};
use crate::render::api::{MaterialId, RecordingBackend};
use crate::render::primitives::{Camera, Mesh, MeshChunk, VertexLayout};
use crate::scene::{MeshNode, Scene};

fn temp_path(tag: &str) -> PathBuf {
    let id = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    std::env::temp_dir().join(format!("strata_pipeline_{tag}_{id}.spk"))
}

fn strip_mesh(segments: u32) -> Mesh {
    let mut vertices = Vec::new();
    let mut indices = Vec::new();
    for i in 0..=segments {
        let x = i as f32;
        vertices.extend_from_slice(&[x, 0.0, 0.0, x, 1.0, 0.0]);
    }
    for i in 0..segments {
        let base = i * 2;
        indices.extend_from_slice(&[base, base + 1, base + 2, base + 1, base + 3, base + 2]);
    }
    Mesh::new(vec![MeshChunk::new(VertexLayout::position(), vertices, indices)])
}

fn write_archive(tag: &str) -> PathBuf {
    let mut builder = ArchiveBuilder::new().with_block_size(64 * 1024);
    builder
        .add("meshes/cube.m", mesh_codec::encode(&Mesh::cube()).unwrap())
        .add("meshes/strip.m", mesh_codec::encode(&strip_mesh(200)).unwrap())
        .add(
            "textures/checker.png",
            ImageData::checkerboard(16, 4, [0, 0, 0, 255], [255, 255, 255, 255])
                .encode_png()
                .unwrap(),
        )
        .add("notes.txt", b"not a mesh".to_vec());
    let path = temp_path(tag);
    builder.write_file(&path).unwrap();
    path
}

#[test]
fn test_archive_backed_pack_feeds_the_scene() {
    let path = write_archive("scene");
    let allocator = Arc::new(TrackingAllocator::new());
    let config = ResourceConfig::new(&path).with_compressed(true).with_memory_limit(0);
    let mut pack = ResourcePack::from_config(&config, allocator.clone()).unwrap();

    assert_eq!(pack.file_names().len(), 4);
    let cube = Arc::new(pack.load_mesh("meshes/cube.m").unwrap());
    let strip = Arc::new(pack.load_mesh("meshes/strip.m").unwrap());
    assert_eq!(*strip, strip_mesh(200));

    // Both meshes share one solid block, so it was inflated once
    let decode = pack.archive_decode_stats().unwrap();
    assert_eq!(decode.blocks_decoded, 1);
    assert_eq!(decode.cache_hits, 1);

    let mut scene = Scene::new(SceneConfig::default());
    let root = scene.root();
    let a = scene
        .add_renderable(root, MeshNode::new(cube).with_materials(vec![MaterialId(1)]))
        .unwrap();
    scene
        .add_renderable(a, MeshNode::new(strip).with_materials(vec![MaterialId(2)]))
        .unwrap();
    scene.transform_mut(a).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));

    let mut camera = Camera::default();
    let mut backend = RecordingBackend::new();
    let stats = *scene.render(&mut camera, &mut backend);
    assert_eq!(stats.objects_rendered, 2);
    assert_eq!(stats.triangles_rendered, 12 + 400);
    assert_eq!(stats.material_switches, 2);
    assert_eq!(backend.triangle_count(), 412);

    let live = allocator.stats().live_bytes;
    assert_eq!(live, pack.memory_used());
    drop(pack);
    assert_eq!(allocator.stats().live_bytes, 0);
    std::fs::remove_file(path).ok();
}

#[test]
fn test_texture_and_bad_mesh_through_pack() {
    let path = write_archive("texture");
    let mut pack = ResourcePack::open(&path, true, 0).unwrap();

    let texture = pack.load_texture("textures/checker.png").unwrap();
    assert_eq!((texture.width, texture.height), (16, 16));
    assert_eq!(&texture.data[0..4], &[0, 0, 0, 255]);

    assert!(matches!(pack.load_mesh("notes.txt"), Err(PackError::Mesh(_))));
    assert!(matches!(pack.load_texture("notes.txt"), Err(PackError::Texture(_))));
    assert!(matches!(pack.load_file("meshes/none.m"), Err(PackError::NotFound(_))));

    // A failed decode still leaves the raw bytes cached
    assert!(pack.is_loaded("notes.txt"));
    std::fs::remove_file(path).ok();
}

#[test]
fn test_archive_pack_eviction_and_reload() {
    let path = write_archive("evict");
    let allocator = Arc::new(TrackingAllocator::new());
    let mut pack = ResourcePack::open_with_allocator(&path, true, 1, allocator.clone()).unwrap();

    pack.load_file("meshes/cube.m").unwrap();
    pack.load_file("meshes/strip.m").unwrap();
    assert!(pack.is_over_budget());

    assert_eq!(pack.purge_unused(), 2);
    assert_eq!(pack.memory_used(), 0);
    assert_eq!(allocator.stats().live_bytes, 0);

    let misses = pack.stats().misses;
    let reloaded = pack.load_file("meshes/cube.m").unwrap();
    assert_eq!(reloaded.archive_index(), Some(0));
    assert_eq!(pack.stats().misses, misses + 1);
    std::fs::remove_file(path).ok();
}
