//! Backend that records submissions instead of drawing
//!
//! Used by tests, tools and headless runs to observe what the scene graph
//! dispatched in a frame.

use super::render_backend::{LightSource, MaterialId, RenderBackend};
use crate::foundation::math::Mat4;
use crate::render::primitives::MeshChunk;

/// One recorded chunk draw
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    /// Material bound for the draw
    pub material: MaterialId,
    /// Model-view matrix of the drawing node
    pub model_view: Mat4,
    /// Triangles in the chunk
    pub triangles: usize,
    /// Vertices in the chunk
    pub vertices: usize,
}

/// Headless backend that keeps a log of every submission
#[derive(Debug, Default)]
pub struct RecordingBackend {
    /// Chunk draws in submission order
    pub draws: Vec<DrawCall>,
    /// Lights in submission order
    pub lights: Vec<(LightSource, Mat4)>,
}

impl RecordingBackend {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far
    pub fn clear(&mut self) {
        self.draws.clear();
        self.lights.clear();
    }

    /// Total triangles recorded
    pub fn triangle_count(&self) -> usize {
        self.draws.iter().map(|d| d.triangles).sum()
    }
}

impl RenderBackend for RecordingBackend {
    fn draw_mesh_chunk(&mut self, chunk: &MeshChunk, material: MaterialId, model_view: &Mat4) {
        log::trace!(
            "draw chunk: material {:?}, {} triangles",
            material,
            chunk.triangle_count()
        );
        self.draws.push(DrawCall {
            material,
            model_view: *model_view,
            triangles: chunk.triangle_count(),
            vertices: chunk.vertex_count(),
        });
    }

    fn submit_light(&mut self, light: &LightSource, model_view: &Mat4) {
        self.lights.push((*light, *model_view));
    }
}
