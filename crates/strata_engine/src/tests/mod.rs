//! Cross-module scenario tests

mod scene_traversal;
mod resource_pipeline;
