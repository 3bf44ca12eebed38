//! Drawable node payloads
//!
//! A scene node becomes drawable by holding a boxed [`Renderable`]. The
//! traversal calls [`Renderable::draw`] once per frame with a
//! [`DrawContext`] carrying the node's matrices and the backend.

use std::sync::Arc;

use crate::foundation::math::Mat4;
use crate::render::api::{LightSource, MaterialId, RenderBackend};
use crate::render::primitives::{Mesh, MeshChunk};

use super::stats::SceneStats;

/// Something a scene node can draw
pub trait Renderable {
    /// Submit this frame's draws for the owning node
    fn draw(&mut self, ctx: &mut DrawContext<'_>);

    /// Triangles one draw submits
    fn triangle_count(&self) -> usize {
        0
    }
}

/// Per-node view of the frame being rendered
pub struct DrawContext<'a> {
    backend: &'a mut dyn RenderBackend,
    stats: &'a mut SceneStats,
    bound_material: Option<MaterialId>,
    world: Mat4,
    model_view: Mat4,
}

impl<'a> DrawContext<'a> {
    pub(crate) fn new(backend: &'a mut dyn RenderBackend, stats: &'a mut SceneStats) -> Self {
        Self {
            backend,
            stats,
            bound_material: None,
            world: Mat4::identity(),
            model_view: Mat4::identity(),
        }
    }

    pub(crate) fn set_node_matrices(&mut self, world: Mat4, model_view: Mat4) {
        self.world = world;
        self.model_view = model_view;
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SceneStats {
        self.stats
    }

    /// World matrix of the node being drawn
    pub const fn world(&self) -> &Mat4 {
        &self.world
    }

    /// Camera-relative matrix of the node being drawn
    pub const fn model_view(&self) -> &Mat4 {
        &self.model_view
    }

    /// Material bound by the most recent chunk draw this frame
    pub const fn bound_material(&self) -> Option<MaterialId> {
        self.bound_material
    }

    /// Draw one mesh chunk at the current node's model-view matrix
    pub fn draw_chunk(&mut self, chunk: &MeshChunk, material: MaterialId) {
        if self.bound_material != Some(material) {
            self.stats.material_switches += 1;
            self.bound_material = Some(material);
        }
        self.stats.batches_rendered += 1;
        self.stats.triangles_rendered += chunk.triangle_count();
        self.backend.draw_mesh_chunk(chunk, material, &self.model_view);
    }

    /// Register a light at the current node's model-view matrix
    pub fn submit_light(&mut self, light: &LightSource) {
        self.backend.submit_light(light, &self.model_view);
    }
}

/// Node payload drawing a decoded mesh
///
/// Chunk `material_index` values select from `materials`; an index past the
/// end falls back to the default material.
#[derive(Debug, Clone)]
pub struct MeshNode {
    /// Shared geometry, usually loaded from a resource pack
    pub mesh: Arc<Mesh>,
    /// Material per chunk material slot
    pub materials: Vec<MaterialId>,
}

impl MeshNode {
    /// Mesh drawn with the default material for every slot
    pub fn new(mesh: Arc<Mesh>) -> Self {
        Self {
            mesh,
            materials: Vec::new(),
        }
    }

    /// Assign materials to chunk slots
    #[must_use]
    pub fn with_materials(mut self, materials: Vec<MaterialId>) -> Self {
        self.materials = materials;
        self
    }

    fn material_for(&self, chunk: &MeshChunk) -> MaterialId {
        usize::try_from(chunk.material_index)
            .ok()
            .and_then(|slot| self.materials.get(slot).copied())
            .unwrap_or_default()
    }
}

impl Renderable for MeshNode {
    fn draw(&mut self, ctx: &mut DrawContext<'_>) {
        for chunk in &self.mesh.chunks {
            ctx.draw_chunk(chunk, self.material_for(chunk));
        }
    }

    fn triangle_count(&self) -> usize {
        self.mesh.triangle_count()
    }
}

/// Node payload submitting a light source
#[derive(Debug, Clone, Copy)]
pub struct LightNode {
    /// Light parameters
    pub light: LightSource,
    /// Switched-off lights stay in the scene but submit nothing
    pub enabled: bool,
}

impl LightNode {
    /// Switched-on light
    pub const fn new(light: LightSource) -> Self {
        Self { light, enabled: true }
    }
}

impl Renderable for LightNode {
    fn draw(&mut self, ctx: &mut DrawContext<'_>) {
        if self.enabled {
            ctx.submit_light(&self.light);
        }
    }
}
