//! Headless scene demo
//!
//! Builds a small archive of generated meshes and a texture, opens it as a
//! resource pack, arranges a scene of spinning cubes around a light and
//! renders a few frames through a backend that only logs. Set `RUST_LOG`
//! to `debug` or `trace` to watch cache and traversal activity.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{value_parser, Arg, Command};
use strata_engine::assets::{mesh_codec, ArchiveBuilder, ImageData, ResourcePack};
use strata_engine::config::{ApplicationConfig, Config, ResourceConfig};
use strata_engine::foundation::math::{translation_of, Mat4, Quat, Vec3};
use strata_engine::foundation::memory::{BufferAllocator, TrackingAllocator};
use strata_engine::render::{Camera, LightKind, LightSource, MaterialId, Mesh, MeshChunk, RenderBackend};
use strata_engine::scene::{LightNode, MeshNode, Scene, SceneListener, SceneStats};

const DEFAULT_FRAMES: u32 = 4;

/// Backend that logs every submission
#[derive(Default)]
struct LogBackend {
    draws: usize,
}

impl RenderBackend for LogBackend {
    fn draw_mesh_chunk(&mut self, chunk: &MeshChunk, material: MaterialId, model_view: &Mat4) {
        self.draws += 1;
        log::trace!(
            "draw {:?}: {} triangles at view-space {:?}",
            material,
            chunk.triangle_count(),
            translation_of(model_view)
        );
    }

    fn submit_light(&mut self, light: &LightSource, _model_view: &Mat4) {
        log::trace!("light {:?}", light.kind);
    }
}

struct FrameLogger;

impl SceneListener for FrameLogger {
    fn after_render(&mut self, stats: &SceneStats) {
        log::info!(
            "frame {}: {} objects, {} triangles, {} batches, {} material switches, {}/{} nodes recalculated",
            stats.frame,
            stats.objects_rendered,
            stats.triangles_rendered,
            stats.batches_rendered,
            stats.material_switches,
            stats.nodes_recalculated,
            stats.nodes_traversed
        );
    }
}

fn ground_plane(size: f32) -> Mesh {
    let h = size * 0.5;
    let vertices = vec![
        -h, 0.0, -h, 0.0, 1.0, 0.0, 0.0, 0.0, //
        h, 0.0, -h, 0.0, 1.0, 0.0, 1.0, 0.0, //
        h, 0.0, h, 0.0, 1.0, 0.0, 1.0, 1.0, //
        -h, 0.0, h, 0.0, 1.0, 0.0, 0.0, 1.0,
    ];
    Mesh::new(vec![MeshChunk::new(
        strata_engine::render::VertexLayout::position_normal_uv(),
        vertices,
        vec![0, 2, 1, 0, 3, 2],
    )])
}

fn build_archive(path: &std::path::Path) -> Result<(), Box<dyn std::error::Error>> {
    let texture = ImageData::checkerboard(64, 8, [40, 40, 40, 255], [200, 200, 200, 255]);
    let mut builder = ArchiveBuilder::new();
    builder
        .add("meshes/cube.m", mesh_codec::encode(&Mesh::cube())?)
        .add("meshes/ground.m", mesh_codec::encode(&ground_plane(20.0))?)
        .add("textures/ground.png", texture.encode_png()?);
    builder.write_file(path)?;
    Ok(())
}

fn cli() -> Command {
    Command::new("scene_demo")
        .about("Renders a few frames of a generated scene through a logging backend")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("Application config (.toml or .ron); defaults build a temporary archive")
                .value_parser(value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("frames")
                .short('f')
                .long("frames")
                .value_name("COUNT")
                .help("Number of frames to render")
                .value_parser(value_parser!(u32))
                .default_value("4"),
        )
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let matches = cli().get_matches();
    let frames = matches.get_one::<u32>("frames").copied().unwrap_or(DEFAULT_FRAMES);

    let config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ApplicationConfig::load_from_file(path)?,
        None => {
            let mut config = ApplicationConfig::default();
            config.resources = ResourceConfig::new(std::env::temp_dir().join("strata_scene_demo.spk"))
                .with_compressed(true)
                .with_memory_limit(8 * 1024);
            config
        }
    };
    config.validate()?;
    strata_engine::foundation::logging::init_with_level(&config.engine.log_level);

    if config.resources.compressed && !config.resources.pack_path.exists() {
        log::info!("Building demo archive at {:?}", config.resources.pack_path);
        build_archive(&config.resources.pack_path)?;
    }

    let allocator = Arc::new(TrackingAllocator::new());
    let mut pack = ResourcePack::from_config(&config.resources, allocator.clone())?;
    let cube = Arc::new(pack.load_mesh("meshes/cube.m")?);
    let ground = Arc::new(pack.load_mesh("meshes/ground.m")?);
    let texture = pack.load_texture("textures/ground.png")?;
    log::info!("Ground texture {}x{}", texture.width, texture.height);

    let mut scene = Scene::new(config.scene);
    scene.set_listener(Some(Box::new(FrameLogger)));
    let root = scene.root();

    scene.add_renderable(root, MeshNode::new(ground).with_materials(vec![MaterialId(1)]))?;

    let pivot = scene.add_node(root)?;
    scene.node_mut(pivot).ok_or("pivot missing")?.set_name("pivot");
    let mut cubes = Vec::new();
    for i in 0..6u8 {
        let angle = f32::from(i) * std::f32::consts::TAU / 6.0;
        let node = scene.add_renderable(
            pivot,
            MeshNode::new(cube.clone()).with_materials(vec![MaterialId(2 + u32::from(i % 2))]),
        )?;
        if let Some(transform) = scene.transform_mut(node) {
            transform.set_position(Vec3::new(4.0 * angle.cos(), 1.0, 4.0 * angle.sin()));
        }
        cubes.push(node);
    }

    let lamp = scene.add_renderable(
        root,
        LightNode::new(LightSource {
            kind: LightKind::Point { range: 15.0 },
            color: Vec3::new(1.0, 0.9, 0.8),
            intensity: 3.0,
        }),
    )?;
    if let Some(transform) = scene.transform_mut(lamp) {
        transform.set_position(Vec3::new(0.0, 6.0, 0.0));
    }

    let mut camera = Camera::perspective(Vec3::new(0.0, 8.0, 14.0), 60.0, 16.0 / 9.0, 0.1, 100.0);
    camera.look_at(Vec3::zeros(), Vec3::y());
    let mut backend = LogBackend::default();

    for frame in 0..frames {
        if let Some(transform) = scene.transform_mut(pivot) {
            transform.add_rotation(Quat::from_axis_angle(&Vec3::y_axis(), 0.1));
        }
        if frame == 2 {
            // Park one cube so the next frame shows a disabled subtree
            scene.set_enabled(cubes[0], false)?;
        }
        log::debug!("Submitting {} triangles", scene.triangle_count());
        scene.render(&mut camera, &mut backend);
        pack.purge_unused();
    }

    let stats = pack.stats();
    println!(
        "draws: {}, pack hits: {}, misses: {}, evictions: {}, resident: {} bytes, allocator live: {} bytes",
        backend.draws,
        stats.hits,
        stats.misses,
        stats.evictions,
        pack.memory_used(),
        allocator.stats().live_bytes
    );
    pack.close();
    Ok(())
}
