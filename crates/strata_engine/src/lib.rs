//! # Strata Engine
//!
//! The core of a real-time 3D engine: a hierarchical scene graph with
//! incremental transform updates, and a budgeted resource cache fed by a
//! compressed archive and a binary mesh codec.
//!
//! ## Features
//!
//! - **Scene Graph**: arena-backed transform tree, top-down world matrix
//!   propagation, per-frame draw dispatch and statistics
//! - **Resource Packs**: directory or archive backed, LRU eviction under a
//!   memory budget, pinning
//! - **Archives**: lz4 solid blocks with a decode-block cache
//! - **Mesh Codec**: compact binary meshes with 8/16/32-bit indices
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use strata_engine::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     strata_engine::foundation::logging::init_with_level("info");
//!
//!     let mut pack = ResourcePack::open("assets.spk", true, 64 * 1024 * 1024)?;
//!     let mesh = Arc::new(pack.load_mesh("meshes/ship.m")?);
//!
//!     let mut scene = Scene::new(SceneConfig::default());
//!     let ship = scene.add_renderable(scene.root(), MeshNode::new(mesh))?;
//!     scene.transform_mut(ship).unwrap().set_position(Vec3::new(0.0, 0.0, -5.0));
//!
//!     let mut camera = Camera::default();
//!     let mut backend = RecordingBackend::new();
//!     let stats = scene.render(&mut camera, &mut backend);
//!     println!("{} triangles", stats.triangles_rendered);
//!
//!     pack.purge_unused();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod render;
pub mod scene;
pub mod assets;

#[cfg(test)]
mod tests;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{Archive, ArchiveBuilder, ImageData, PackError, ResourcePack},
        config::{ApplicationConfig, Config, EngineConfig, ResourceConfig, SceneConfig},
        foundation::{
            math::{Mat4, Quat, Vec3},
            memory::{BufferAllocator, SystemAllocator, TrackingAllocator},
        },
        render::{Camera, LightKind, LightSource, MaterialId, Mesh, MeshChunk, RecordingBackend, RenderBackend, VertexLayout},
        scene::{LightNode, MeshNode, NodeHandle, Renderable, Scene, SceneStats, TransformNode},
    };
}
