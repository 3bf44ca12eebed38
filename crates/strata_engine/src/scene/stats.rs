//! Per-frame rendering statistics

/// Counters gathered during one [`Scene::render`](super::Scene::render) call
///
/// Everything except `frame` is reset to zero at the start of each render.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    /// Triangles submitted to the backend
    pub triangles_rendered: usize,
    /// Renderable nodes whose draw was invoked
    pub objects_rendered: usize,
    /// Mesh chunk draws submitted to the backend
    pub batches_rendered: usize,
    /// Times the bound material changed
    pub material_switches: usize,
    /// Nodes visited by the traversal
    pub nodes_traversed: usize,
    /// Nodes whose world matrix was rebuilt
    pub nodes_recalculated: usize,
    /// Number of completed render calls
    pub frame: u64,
}

impl SceneStats {
    /// Zeroed counters for the next frame, keeping the frame number
    pub(crate) const fn next_frame(&self) -> Self {
        Self {
            triangles_rendered: 0,
            objects_rendered: 0,
            batches_rendered: 0,
            material_switches: 0,
            nodes_traversed: 0,
            nodes_recalculated: 0,
            frame: self.frame + 1,
        }
    }
}
