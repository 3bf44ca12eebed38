//! Public rendering API
//!
//! The collaborator-facing backend trait plus a headless recording backend.

pub mod render_backend;
pub mod recording;

// Re-export commonly used types
pub use render_backend::{RenderBackend, MaterialId, LightKind, LightSource};
pub use recording::{RecordingBackend, DrawCall};
