//! Scene graph: an arena of transform nodes rooted at a single node
//!
//! Nodes live in a [`SlotMap`] and refer to each other by [`NodeHandle`].
//! Each node keeps its parent handle and an ordered list of child handles,
//! so the tree can be walked without raw links between nodes.
//!
//! ## Frame traversal
//!
//! [`Scene::render`] walks the tree depth first from the root:
//!
//! 1. On the way down (pre-order) each node rebuilds its world matrix when it
//!    is dirty or its parent rebuilt this frame. The parent's "recalculated"
//!    flag is passed to every child, so moving an ancestor refreshes the
//!    whole subtree and children always see their parent's new matrix.
//! 2. After the children return, the node's camera-relative matrix is
//!    computed and its [`Renderable`] (if any) is drawn.
//!
//! Disabled nodes are skipped along with their whole subtree. Invisible
//! nodes are traversed but not drawn.
//!
//! The traversal recurses once per tree level and assumes the tree is
//! acyclic. Reparenting through [`Scene::attach`] checks for cycles when
//! [`SceneConfig::debug_cycle_check`] is on in a debug build;
//! [`Scene::validate_acyclic`] runs the same check on demand.

use std::collections::HashSet;

use slotmap::{new_key_type, SlotMap};
use thiserror::Error;

use crate::config::SceneConfig;
use crate::foundation::math::Mat4;
use crate::render::api::RenderBackend;
use crate::render::primitives::Camera;

use super::renderable::{DrawContext, Renderable};
use super::stats::SceneStats;
use super::transform_node::TransformNode;

new_key_type! {
    /// Handle of a node in a [`Scene`]
    pub struct NodeHandle;
}

/// Scene graph errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// The handle does not name a node in this scene
    #[error("Node not found: {0:?}")]
    NodeNotFound(NodeHandle),

    /// The operation is not allowed on the root node
    #[error("Operation not allowed on the root node: {0}")]
    RootNode(&'static str),

    /// The operation would make a node its own ancestor
    #[error("Cycle detected: {child:?} cannot be placed under {parent:?}")]
    CycleDetected {
        /// Node being placed
        child: NodeHandle,
        /// Requested parent
        parent: NodeHandle,
    },
}

/// Hooks invoked around each [`Scene::render`]
pub trait SceneListener {
    /// Called after stats are reset and before the camera is updated
    fn before_render(&mut self, camera: &Camera) {
        let _ = camera;
    }

    /// Called after the traversal with the finished frame's stats
    fn after_render(&mut self, stats: &SceneStats) {
        let _ = stats;
    }
}

/// A node in the scene arena
pub struct SceneNode {
    /// Local and world transform state
    pub transform: TransformNode,
    name: Option<String>,
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    enabled: bool,
    visible: bool,
    renderable: Option<Box<dyn Renderable>>,
}

impl SceneNode {
    fn new(parent: Option<NodeHandle>, renderable: Option<Box<dyn Renderable>>) -> Self {
        Self {
            transform: TransformNode::new(),
            name: None,
            parent,
            children: Vec::new(),
            enabled: true,
            visible: true,
            renderable,
        }
    }

    /// Optional lookup name
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Set the lookup name
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    /// Parent handle; `None` for the root and detached nodes
    pub const fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    /// Child handles in traversal order
    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Whether the node and its subtree are traversed
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Enable or disable the node and its subtree
    ///
    /// Re-enabling marks the transform dirty: ancestors may have moved while
    /// the subtree was skipped, so it is rebuilt on the next traversal.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            self.transform.mark_dirty();
        }
        self.enabled = enabled;
    }

    /// Whether the node's renderable is drawn
    pub const fn is_visible(&self) -> bool {
        self.visible
    }

    /// Show or hide the node's renderable; children are unaffected
    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
    }

    /// Attached renderable, if any
    pub fn renderable(&self) -> Option<&dyn Renderable> {
        self.renderable.as_deref()
    }

    /// Attached renderable, mutably
    pub fn renderable_mut(&mut self) -> Option<&mut (dyn Renderable + 'static)> {
        self.renderable.as_deref_mut()
    }

    /// Replace the renderable, returning the previous one
    pub fn set_renderable(&mut self, renderable: Option<Box<dyn Renderable>>) -> Option<Box<dyn Renderable>> {
        std::mem::replace(&mut self.renderable, renderable)
    }
}

impl std::fmt::Debug for SceneNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneNode")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("enabled", &self.enabled)
            .field("visible", &self.visible)
            .field("renderable", &self.renderable.is_some())
            .finish_non_exhaustive()
    }
}

/// Rooted tree of transform nodes with per-frame render traversal
pub struct Scene {
    nodes: SlotMap<NodeHandle, SceneNode>,
    root: NodeHandle,
    stats: SceneStats,
    config: SceneConfig,
    listener: Option<Box<dyn SceneListener>>,
}

impl Scene {
    /// Create a scene holding only its root node
    pub fn new(config: SceneConfig) -> Self {
        let mut nodes = SlotMap::with_key();
        let root = nodes.insert(SceneNode::new(None, None));
        log::debug!("Created scene (cycle check: {})", config.debug_cycle_check);
        Self {
            nodes,
            root,
            stats: SceneStats::default(),
            config,
            listener: None,
        }
    }

    /// The root node
    pub const fn root(&self) -> NodeHandle {
        self.root
    }

    /// Stats of the last finished render
    pub const fn stats(&self) -> &SceneStats {
        &self.stats
    }

    /// Install pre/post render hooks, replacing any previous listener
    pub fn set_listener(&mut self, listener: Option<Box<dyn SceneListener>>) {
        self.listener = listener;
    }

    /// Number of nodes in the arena, root and detached nodes included
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Triangles the next render will submit
    ///
    /// Sums [`Renderable::triangle_count`] over the visible renderables
    /// reachable from the root through enabled nodes.
    pub fn triangle_count(&self) -> usize {
        let mut total = 0;
        let mut stack = vec![self.root];
        while let Some(handle) = stack.pop() {
            let Some(node) = self.nodes.get(handle) else {
                continue;
            };
            if node.visible {
                total += node.renderable.as_ref().map_or(0, |r| r.triangle_count());
            }
            stack.extend(
                node.children
                    .iter()
                    .copied()
                    .filter(|&c| self.nodes.get(c).is_some_and(SceneNode::is_enabled)),
            );
        }
        total
    }

    /// Node lookup
    pub fn node(&self, handle: NodeHandle) -> Option<&SceneNode> {
        self.nodes.get(handle)
    }

    /// Mutable node lookup
    pub fn node_mut(&mut self, handle: NodeHandle) -> Option<&mut SceneNode> {
        self.nodes.get_mut(handle)
    }

    /// Transform of a node
    pub fn transform(&self, handle: NodeHandle) -> Option<&TransformNode> {
        self.nodes.get(handle).map(|node| &node.transform)
    }

    /// Mutable transform of a node
    pub fn transform_mut(&mut self, handle: NodeHandle) -> Option<&mut TransformNode> {
        self.nodes.get_mut(handle).map(|node| &mut node.transform)
    }

    /// Parent of a node
    pub fn parent(&self, handle: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(handle).and_then(|node| node.parent)
    }

    /// Children of a node; empty for unknown handles
    pub fn children(&self, handle: NodeHandle) -> &[NodeHandle] {
        self.nodes.get(handle).map_or(&[], |node| node.children.as_slice())
    }

    /// First node carrying `name`
    pub fn find_by_name(&self, name: &str) -> Option<NodeHandle> {
        self.nodes
            .iter()
            .find(|(_, node)| node.name.as_deref() == Some(name))
            .map(|(handle, _)| handle)
    }

    /// Add an empty group node under `parent`
    pub fn add_node(&mut self, parent: NodeHandle) -> Result<NodeHandle, SceneError> {
        self.insert_node(parent, None)
    }

    /// Add a drawable node under `parent`
    pub fn add_renderable<R>(&mut self, parent: NodeHandle, renderable: R) -> Result<NodeHandle, SceneError>
    where
        R: Renderable + 'static,
    {
        self.insert_node(parent, Some(Box::new(renderable)))
    }

    fn insert_node(
        &mut self,
        parent: NodeHandle,
        renderable: Option<Box<dyn Renderable>>,
    ) -> Result<NodeHandle, SceneError> {
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        let handle = self.nodes.insert(SceneNode::new(Some(parent), renderable));
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(handle);
        }
        log::trace!("Added node {:?} under {:?}", handle, parent);
        Ok(handle)
    }

    /// Move `child` (and its subtree) under `parent`
    ///
    /// Works for attached and detached nodes alike. The child is marked
    /// dirty so its world matrix picks up the new parent on the next render.
    pub fn attach(&mut self, child: NodeHandle, parent: NodeHandle) -> Result<(), SceneError> {
        if child == self.root {
            return Err(SceneError::RootNode("attach"));
        }
        if !self.nodes.contains_key(child) {
            return Err(SceneError::NodeNotFound(child));
        }
        if !self.nodes.contains_key(parent) {
            return Err(SceneError::NodeNotFound(parent));
        }
        if child == parent || (cfg!(debug_assertions) && self.config.debug_cycle_check && self.is_ancestor(child, parent)) {
            return Err(SceneError::CycleDetected { child, parent });
        }

        self.unlink_from_parent(child);
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.push(child);
        }
        if let Some(child_node) = self.nodes.get_mut(child) {
            child_node.parent = Some(parent);
            child_node.transform.mark_dirty();
        }
        Ok(())
    }

    /// Unlink a node from its parent
    ///
    /// The node keeps its own children and stays in the arena, but neither
    /// it nor its subtree is traversed until it is attached again.
    pub fn detach(&mut self, node: NodeHandle) -> Result<(), SceneError> {
        if node == self.root {
            return Err(SceneError::RootNode("detach"));
        }
        if !self.nodes.contains_key(node) {
            return Err(SceneError::NodeNotFound(node));
        }
        self.unlink_from_parent(node);
        Ok(())
    }

    /// Remove a single node from the arena and return it
    ///
    /// Its children are orphaned: they lose their parent link and are not
    /// traversed until reattached or removed by the caller.
    pub fn remove_node(&mut self, node: NodeHandle) -> Result<SceneNode, SceneError> {
        if node == self.root {
            return Err(SceneError::RootNode("remove"));
        }
        self.unlink_from_parent(node);
        let removed = self.nodes.remove(node).ok_or(SceneError::NodeNotFound(node))?;
        for &child in &removed.children {
            if let Some(child_node) = self.nodes.get_mut(child) {
                child_node.parent = None;
            }
        }
        if !removed.children.is_empty() {
            log::debug!("Removed node {:?}, orphaning {} children", node, removed.children.len());
        }
        Ok(removed)
    }

    /// Enable or disable a node and its subtree
    ///
    /// The root is always traversed and cannot be disabled.
    pub fn set_enabled(&mut self, node: NodeHandle, enabled: bool) -> Result<(), SceneError> {
        if node == self.root && !enabled {
            return Err(SceneError::RootNode("disable"));
        }
        let node_ref = self.nodes.get_mut(node).ok_or(SceneError::NodeNotFound(node))?;
        node_ref.set_enabled(enabled);
        Ok(())
    }

    /// Show or hide a node's renderable
    pub fn set_visible(&mut self, node: NodeHandle, visible: bool) -> Result<(), SceneError> {
        let node_ref = self.nodes.get_mut(node).ok_or(SceneError::NodeNotFound(node))?;
        node_ref.set_visible(visible);
        Ok(())
    }

    fn unlink_from_parent(&mut self, node: NodeHandle) {
        let Some(parent) = self.nodes.get_mut(node).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent_node) = self.nodes.get_mut(parent) {
            parent_node.children.retain(|&c| c != node);
        }
    }

    /// Whether `ancestor` appears on the parent chain of `node`
    fn is_ancestor(&self, ancestor: NodeHandle, node: NodeHandle) -> bool {
        let mut visited = HashSet::new();
        let mut current = Some(node);
        while let Some(handle) = current {
            if handle == ancestor {
                return true;
            }
            if !visited.insert(handle) {
                return false;
            }
            current = self.nodes.get(handle).and_then(|n| n.parent);
        }
        false
    }

    /// Check that no parent chain in the arena loops back on itself
    pub fn validate_acyclic(&self) -> Result<(), SceneError> {
        for (start, _) in &self.nodes {
            let mut visited = HashSet::new();
            let mut current = start;
            while let Some(parent) = self.nodes.get(current).and_then(|n| n.parent) {
                if !visited.insert(current) {
                    return Err(SceneError::CycleDetected { child: start, parent });
                }
                current = parent;
            }
        }
        Ok(())
    }

    /// Render one frame
    ///
    /// Resets the stats, runs the listener's `before_render`, refreshes the
    /// camera view, traverses the tree and runs `after_render`. Returns the
    /// finished frame's stats.
    pub fn render(&mut self, camera: &mut Camera, backend: &mut dyn RenderBackend) -> &SceneStats {
        self.stats = self.stats.next_frame();

        if let Some(listener) = self.listener.as_mut() {
            listener.before_render(camera);
        }

        camera.update_view();

        {
            let mut ctx = DrawContext::new(backend, &mut self.stats);
            visit(&mut self.nodes, self.root, &Mat4::identity(), false, camera, &mut ctx);
        }

        log::trace!(
            "Frame {}: {} objects, {} triangles, {} of {} nodes recalculated",
            self.stats.frame,
            self.stats.objects_rendered,
            self.stats.triangles_rendered,
            self.stats.nodes_recalculated,
            self.stats.nodes_traversed
        );

        if let Some(listener) = self.listener.as_mut() {
            listener.after_render(&self.stats);
        }
        &self.stats
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(SceneConfig::default())
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("root", &self.root)
            .field("nodes", &self.nodes.len())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn visit(
    nodes: &mut SlotMap<NodeHandle, SceneNode>,
    handle: NodeHandle,
    parent_world: &Mat4,
    parent_recalculated: bool,
    camera: &Camera,
    ctx: &mut DrawContext<'_>,
) {
    let (world, recalculated, child_count) = {
        let Some(node) = nodes.get_mut(handle) else {
            return;
        };
        node.transform.begin_frame();
        let recalculated = node.transform.recalculate_with_parent(parent_world, parent_recalculated);
        (*node.transform.world_matrix(), recalculated, node.children.len())
    };

    let stats = ctx.stats_mut();
    stats.nodes_traversed += 1;
    if recalculated {
        stats.nodes_recalculated += 1;
    }

    for index in 0..child_count {
        let Some(child) = nodes.get(handle).and_then(|n| n.children.get(index).copied()) else {
            break;
        };
        if nodes.get(child).is_some_and(SceneNode::is_enabled) {
            visit(nodes, child, &world, recalculated, camera, ctx);
        }
    }

    let Some(node) = nodes.get_mut(handle) else {
        return;
    };
    let model_view = camera.camera_to_node(&world);
    node.transform.set_model_view(model_view);

    if node.visible {
        if let Some(renderable) = node.renderable.as_mut() {
            ctx.set_node_matrices(world, model_view);
            renderable.draw(ctx);
            ctx.stats_mut().objects_rendered += 1;
        }
    }
    node.transform.end_frame();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::render::api::RecordingBackend;
    use approx::assert_relative_eq;

    fn scene() -> Scene {
        Scene::new(SceneConfig::new().with_cycle_check(true))
    }

    #[test]
    fn test_add_and_query_nodes() {
        let mut scene = scene();
        let root = scene.root();
        let a = scene.add_node(root).unwrap();
        let b = scene.add_node(a).unwrap();

        assert_eq!(scene.node_count(), 3);
        assert_eq!(scene.parent(b), Some(a));
        assert_eq!(scene.children(root), &[a]);
        assert_eq!(scene.children(a), &[b]);
    }

    #[test]
    fn test_find_by_name() {
        let mut scene = scene();
        let node = scene.add_node(scene.root()).unwrap();
        scene.node_mut(node).unwrap().set_name("turret");
        assert_eq!(scene.find_by_name("turret"), Some(node));
        assert_eq!(scene.find_by_name("hull"), None);
    }

    #[test]
    fn test_attach_reparents_and_marks_dirty() {
        let mut scene = scene();
        let root = scene.root();
        let a = scene.add_node(root).unwrap();
        let b = scene.add_node(root).unwrap();
        scene.transform_mut(a).unwrap().set_position(Vec3::new(5.0, 0.0, 0.0));
        scene.transform_mut(b).unwrap().set_position(Vec3::new(0.0, 1.0, 0.0));

        let mut camera = Camera::default();
        let mut backend = RecordingBackend::new();
        scene.render(&mut camera, &mut backend);

        scene.attach(b, a).unwrap();
        assert!(scene.transform(b).unwrap().is_dirty());
        assert_eq!(scene.children(root), &[a]);

        scene.render(&mut camera, &mut backend);
        assert_relative_eq!(scene.transform(b).unwrap().world_position(), Vec3::new(5.0, 1.0, 0.0));
    }

    #[test]
    fn test_root_cannot_be_moved_removed_or_disabled() {
        let mut scene = scene();
        let root = scene.root();
        let a = scene.add_node(root).unwrap();
        assert_eq!(scene.attach(root, a), Err(SceneError::RootNode("attach")));
        assert_eq!(scene.detach(root), Err(SceneError::RootNode("detach")));
        assert!(matches!(scene.remove_node(root), Err(SceneError::RootNode(_))));
        assert_eq!(scene.set_enabled(root, false), Err(SceneError::RootNode("disable")));
        assert!(scene.set_enabled(root, true).is_ok());
    }

    #[test]
    fn test_attach_to_self_rejected() {
        let mut scene = scene();
        let a = scene.add_node(scene.root()).unwrap();
        assert_eq!(scene.attach(a, a), Err(SceneError::CycleDetected { child: a, parent: a }));
    }

    #[cfg(debug_assertions)]
    #[test]
    fn test_attach_under_descendant_rejected() {
        let mut scene = scene();
        let a = scene.add_node(scene.root()).unwrap();
        let b = scene.add_node(a).unwrap();
        let c = scene.add_node(b).unwrap();

        assert_eq!(scene.attach(a, c), Err(SceneError::CycleDetected { child: a, parent: c }));
        assert_eq!(scene.parent(a), Some(scene.root()));
        assert!(scene.validate_acyclic().is_ok());
    }

    #[test]
    fn test_detached_subtree_is_not_traversed() {
        let mut scene = scene();
        let a = scene.add_node(scene.root()).unwrap();
        scene.add_node(a).unwrap();
        scene.detach(a).unwrap();

        let mut camera = Camera::default();
        let mut backend = RecordingBackend::new();
        let stats = *scene.render(&mut camera, &mut backend);
        assert_eq!(stats.nodes_traversed, 1);
        assert_eq!(scene.node_count(), 3);
    }

    #[test]
    fn test_remove_node_orphans_children() {
        let mut scene = scene();
        let a = scene.add_node(scene.root()).unwrap();
        let b = scene.add_node(a).unwrap();

        let removed = scene.remove_node(a).unwrap();
        assert_eq!(removed.children(), &[b]);
        assert_eq!(scene.parent(b), None);
        assert!(scene.children(scene.root()).is_empty());
        assert_eq!(scene.remove_node(a).unwrap_err(), SceneError::NodeNotFound(a));
    }

    #[test]
    fn test_unknown_parent_rejected() {
        let mut scene = scene();
        let a = scene.add_node(scene.root()).unwrap();
        scene.remove_node(a).unwrap();
        assert_eq!(scene.add_node(a), Err(SceneError::NodeNotFound(a)));
    }

    #[test]
    fn test_listener_sees_frame_stats() {
        use std::cell::RefCell;
        use std::rc::Rc;

        struct Recorder(Rc<RefCell<Vec<u64>>>);
        impl SceneListener for Recorder {
            fn after_render(&mut self, stats: &SceneStats) {
                self.0.borrow_mut().push(stats.frame);
            }
        }

        let frames = Rc::new(RefCell::new(Vec::new()));
        let mut scene = scene();
        scene.set_listener(Some(Box::new(Recorder(Rc::clone(&frames)))));

        let mut camera = Camera::default();
        let mut backend = RecordingBackend::new();
        scene.render(&mut camera, &mut backend);
        scene.render(&mut camera, &mut backend);
        assert_eq!(*frames.borrow(), vec![1, 2]);
    }
}
