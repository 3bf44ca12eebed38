//! Backend abstraction traits for the rendering system
//!
//! The scene graph never talks to a GPU API directly. Whatever owns the
//! device implements [`RenderBackend`] and receives one call per mesh chunk
//! (and per light) during [`Scene::render`](crate::scene::Scene::render).

use crate::foundation::math::{Mat4, Vec3};
use crate::render::primitives::MeshChunk;

/// Unique identifier for materials
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct MaterialId(pub u32);

/// Kind of light source submitted by a light node
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Infinitely distant light shining along the node's -Z axis
    Directional,
    /// Omni light at the node origin
    Point {
        /// Distance at which the light has no effect
        range: f32,
    },
    /// Cone light along the node's -Z axis
    Spot {
        /// Distance at which the light has no effect
        range: f32,
        /// Half angle of the cone in radians
        cone_angle: f32,
    },
}

/// Light parameters handed to the backend
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LightSource {
    /// Light kind and shape
    pub kind: LightKind,
    /// Linear RGB color
    pub color: Vec3,
    /// Intensity multiplier
    pub intensity: f32,
}

/// Main rendering backend trait
///
/// Draw submission cannot fail from the scene's point of view; a backend
/// that hits an error records it on its own side.
pub trait RenderBackend {
    /// Draw one mesh chunk with the given material and model-view matrix
    fn draw_mesh_chunk(&mut self, chunk: &MeshChunk, material: MaterialId, model_view: &Mat4);

    /// Register a light for this frame
    fn submit_light(&mut self, light: &LightSource, model_view: &Mat4) {
        let _ = (light, model_view);
    }
}
