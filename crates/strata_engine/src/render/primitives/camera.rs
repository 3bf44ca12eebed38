//! # 3D Camera
//!
//! The camera is positioned like any scene node: it owns a
//! [`TransformNode`] whose world matrix places it in the scene. Its view
//! matrix is the inverse of that world matrix, and the scene traversal asks
//! it for each node's camera-relative (model-view) matrix.
//!
//! ## Coordinate System
//! Right-handed, Y-up view space with the camera looking down -Z. The
//! projection maps depth to `[0, 1]`.

use crate::foundation::math::{self, constants::DEG_TO_RAD, Mat4, Mat4Ext, Vec3};
use crate::scene::TransformNode;

/// Perspective camera
#[derive(Debug, Clone)]
pub struct Camera {
    /// Placement of the camera in world space
    pub transform: TransformNode,

    /// Vertical field of view in radians
    pub fov: f32,

    /// Aspect ratio (width / height)
    pub aspect: f32,

    /// Distance to near clipping plane
    pub near: f32,

    /// Distance to far clipping plane
    pub far: f32,

    view: Mat4,
}

impl Camera {
    /// Create a perspective camera at `position` looking down -Z
    ///
    /// `fov_degrees` is converted to radians.
    pub fn perspective(position: Vec3, fov_degrees: f32, aspect: f32, near: f32, far: f32) -> Self {
        let mut transform = TransformNode::from_position(position);
        transform.recalculate();
        let view = math::affine_inverse(transform.world_matrix());
        Self {
            transform,
            fov: fov_degrees * DEG_TO_RAD,
            aspect,
            near,
            far,
            view,
        }
    }

    /// Move the camera
    pub fn set_position(&mut self, position: Vec3) {
        self.transform.set_position(position);
        log::trace!("Camera position updated to: {:?}", position);
    }

    /// Point the camera at `target`, keeping `up` vertical
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        self.transform.look_at(target, up);
    }

    /// Update the aspect ratio, e.g. after a viewport resize
    pub fn set_aspect_ratio(&mut self, aspect: f32) {
        self.aspect = aspect;
    }

    /// Refresh the view matrix from the camera transform
    ///
    /// Called once per frame before the scene traversal.
    pub fn update_view(&mut self) {
        if self.transform.recalculate() {
            self.view = math::affine_inverse(self.transform.world_matrix());
        }
    }

    /// World-to-view matrix as of the last [`update_view`](Self::update_view)
    pub const fn view_matrix(&self) -> &Mat4 {
        &self.view
    }

    /// Projection matrix for the current lens parameters
    pub fn projection_matrix(&self) -> Mat4 {
        Mat4::perspective(self.fov, self.aspect, self.near, self.far)
    }

    /// Camera-relative matrix for a node with the given world matrix
    pub fn camera_to_node(&self, world: &Mat4) -> Mat4 {
        self.view * world
    }

    /// Camera position in world space
    pub fn world_position(&self) -> Vec3 {
        self.transform.world_position()
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::perspective(Vec3::new(0.0, 0.0, 5.0), 60.0, 16.0 / 9.0, 0.1, 100.0)
    }
}
