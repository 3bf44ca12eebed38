//! # Rendering System
//!
//! The renderer-facing side of the engine core: geometry primitives, the
//! camera, and the [`RenderBackend`] trait through which the scene graph
//! submits draws. GPU work lives behind that trait; the core never encodes
//! commands itself.

pub mod api;
pub mod primitives;

// Core rendering types that applications need
pub use api::{DrawCall, LightKind, LightSource, MaterialId, RecordingBackend, RenderBackend};
pub use primitives::{Camera, ChunkFlags, IndexWidth, Mesh, MeshChunk, VertexAttribute, VertexLayout, VertexSemantic};
