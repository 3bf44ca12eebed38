//! Hierarchical transform state
//!
//! A [`TransformNode`] holds a local TRS transform (or an explicit local
//! matrix), the cached world matrix derived from it, and the model-view
//! matrix computed for the active camera. Mutators only mark the node dirty;
//! matrices are rebuilt lazily by [`TransformNode::recalculate`] or by the
//! scene traversal.
//!
//! Nothing here validates its inputs. A non-unit quaternion or a NaN
//! component simply propagates into the matrices.

use crate::foundation::math::{self, Mat4, Quat, Vec3};

/// Position, rotation and scale of a scene node plus its cached matrices
#[derive(Debug, Clone)]
pub struct TransformNode {
    position: Vec3,
    rotation: Quat,
    scale: Vec3,
    /// Local matrix set directly; overrides TRS composition while present
    explicit_matrix: Option<Mat4>,

    local_matrix: Mat4,
    world_matrix: Mat4,
    model_view_matrix: Mat4,

    /// Local state changed since the last recalculation
    dirty: bool,
    /// World matrix was rebuilt during the current frame
    changed_this_frame: bool,
    /// Latched value of `changed_this_frame` from the last finished frame
    changed_last_frame: bool,
}

impl TransformNode {
    /// Identity transform, dirty so the first traversal computes its matrices
    pub fn new() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Quat::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
            explicit_matrix: None,
            local_matrix: Mat4::identity(),
            world_matrix: Mat4::identity(),
            model_view_matrix: Mat4::identity(),
            dirty: true,
            changed_this_frame: false,
            changed_last_frame: false,
        }
    }

    /// Transform placed at `position`
    pub fn from_position(position: Vec3) -> Self {
        let mut node = Self::new();
        node.position = position;
        node
    }

    // ------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------

    /// Replace the position
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
        self.touch_trs();
    }

    /// Translate by `delta`
    pub fn add_position(&mut self, delta: Vec3) {
        self.position += delta;
        self.touch_trs();
    }

    /// Replace the rotation
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.rotation = rotation;
        self.touch_trs();
    }

    /// Compose `delta` onto the current rotation (`rotation * delta`)
    pub fn add_rotation(&mut self, delta: Quat) {
        self.rotation *= delta;
        self.touch_trs();
    }

    /// Rotate around a local axis by `angle` radians
    pub fn rotate_axis_angle(&mut self, axis: Vec3, angle: f32) {
        let Some(axis) = nalgebra::Unit::try_new(axis, f32::EPSILON) else {
            return;
        };
        self.add_rotation(Quat::from_axis_angle(&axis, angle));
    }

    /// Replace the scale
    pub fn set_scale(&mut self, scale: Vec3) {
        self.scale = scale;
        self.touch_trs();
    }

    /// Set the local matrix directly. It is used as-is and is not
    /// decomposed into position, rotation or scale.
    pub fn set_matrix(&mut self, matrix: Mat4) {
        self.explicit_matrix = Some(matrix);
        self.dirty = true;
    }

    /// Drop an explicit matrix and go back to TRS composition
    pub fn clear_matrix(&mut self) {
        if self.explicit_matrix.take().is_some() {
            self.dirty = true;
        }
    }

    /// Orient the node so its -Z axis points at `target` (parent space)
    pub fn look_at(&mut self, target: Vec3, up: Vec3) {
        let forward = target - self.position;
        if forward.cross(&up).norm_squared() < 1e-8 {
            return;
        }
        self.set_rotation(Quat::face_towards(&-forward, &up));
    }

    /// Force recomputation on the next update
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    fn touch_trs(&mut self) {
        self.explicit_matrix = None;
        self.dirty = true;
    }

    // ------------------------------------------------------------------
    // Recalculation
    // ------------------------------------------------------------------

    /// Rebuild the matrices of a node with no parent
    ///
    /// Returns true when the world matrix was recomputed.
    pub fn recalculate(&mut self) -> bool {
        self.recalculate_with_parent(&Mat4::identity(), false)
    }

    /// Rebuild the world matrix against `parent_world`
    ///
    /// The node recomputes when it is dirty or when `parent_recalculated` is
    /// set, even if its own state is clean. Returns true when the world
    /// matrix was recomputed, which the caller passes on to the children.
    pub fn recalculate_with_parent(&mut self, parent_world: &Mat4, parent_recalculated: bool) -> bool {
        if !self.dirty && !parent_recalculated {
            return false;
        }
        if self.dirty {
            self.local_matrix = match self.explicit_matrix {
                Some(matrix) => matrix,
                None => math::compose_trs(&self.position, &self.rotation, &self.scale),
            };
            self.dirty = false;
        }
        self.world_matrix = parent_world * self.local_matrix;
        self.changed_this_frame = true;
        true
    }

    /// Store the camera-relative matrix computed by the traversal
    pub fn set_model_view(&mut self, model_view: Mat4) {
        self.model_view_matrix = model_view;
    }

    // ------------------------------------------------------------------
    // Frame bracketing
    // ------------------------------------------------------------------

    /// Reset per-frame state before a render pass
    pub fn begin_frame(&mut self) {
        self.changed_this_frame = false;
    }

    /// Latch per-frame state after a render pass
    pub fn end_frame(&mut self) {
        self.changed_last_frame = self.changed_this_frame;
    }

    // ------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------

    /// Local position
    pub const fn position(&self) -> &Vec3 {
        &self.position
    }

    /// Local rotation
    pub const fn rotation(&self) -> &Quat {
        &self.rotation
    }

    /// Local scale
    pub const fn scale(&self) -> &Vec3 {
        &self.scale
    }

    /// Explicit local matrix, when one is set
    pub const fn explicit_matrix(&self) -> Option<&Mat4> {
        self.explicit_matrix.as_ref()
    }

    /// Local matrix as of the last recalculation
    pub const fn local_matrix(&self) -> &Mat4 {
        &self.local_matrix
    }

    /// World matrix as of the last recalculation
    pub const fn world_matrix(&self) -> &Mat4 {
        &self.world_matrix
    }

    /// Camera-relative matrix from the last render
    pub const fn model_view_matrix(&self) -> &Mat4 {
        &self.model_view_matrix
    }

    /// World-space origin of the node
    pub fn world_position(&self) -> Vec3 {
        math::translation_of(&self.world_matrix)
    }

    /// Whether local state changed since the last recalculation
    pub const fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Whether the world matrix was rebuilt in the frame in progress
    pub const fn changed_this_frame(&self) -> bool {
        self.changed_this_frame
    }

    /// Whether the world matrix was rebuilt in the last finished frame
    pub const fn changed_last_frame(&self) -> bool {
        self.changed_last_frame
    }
}

impl Default for TransformNode {
    fn default() -> Self {
        Self::new()
    }
}
