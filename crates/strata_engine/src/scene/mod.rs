//! Scene management system
//!
//! A hierarchical transform tree with incremental world-matrix updates and
//! a per-frame render traversal that hands drawable nodes to a
//! [`RenderBackend`](crate::render::api::RenderBackend).
//!
//! ## Architecture
//!
//! ```text
//! Scene (arena of SceneNode, rooted)
//!      ↓ render(camera, backend)
//! TransformNode recalculation (top-down)
//!      ↓
//! Renderable::draw (after children)
//!      ↓
//! RenderBackend (draw_mesh_chunk / submit_light)
//! ```

mod scene_graph;
mod transform_node;
mod renderable;
mod stats;

pub use scene_graph::{NodeHandle, Scene, SceneError, SceneListener, SceneNode};
pub use transform_node::TransformNode;
pub use renderable::{DrawContext, LightNode, MeshNode, Renderable};
pub use stats::SceneStats;
