//! Core primitive types for rendering
//!
//! Chunked meshes with their vertex layouts, and the scene camera.

pub mod mesh;
pub mod camera;

// Re-export commonly used types
pub use mesh::{
    ChunkFlags, IndexWidth, Mesh, MeshChunk, VertexAttribute, VertexLayout, VertexSemantic,
    MAX_VERTEX_ATTRIBUTES,
};
pub use camera::Camera;
