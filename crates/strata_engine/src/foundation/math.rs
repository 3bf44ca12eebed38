//! Math utilities and types
//!
//! Thin aliases over `nalgebra` used by the transform tree, the camera and the
//! mesh codec. Everything is single precision.

pub use nalgebra::{Matrix3, Matrix4, Quaternion, Unit, UnitQuaternion, Vector3, Vector4};

/// 3D vector type
pub type Vec3 = Vector3<f32>;

/// 4D vector type
pub type Vec4 = Vector4<f32>;

/// 3x3 matrix type
pub type Mat3 = Matrix3<f32>;

/// 4x4 matrix type
pub type Mat4 = Matrix4<f32>;

/// Unit quaternion used for every rotation in the engine
pub type Quat = UnitQuaternion<f32>;

/// Compose a TRS matrix: `translation * rotation * scale`
#[inline]
pub fn compose_trs(position: &Vec3, rotation: &Quat, scale: &Vec3) -> Mat4 {
    let mut matrix = rotation.to_homogeneous();
    // Scale the basis columns in place instead of multiplying a scaling matrix
    for (column, factor) in scale.iter().enumerate() {
        for row in 0..3 {
            matrix[(row, column)] *= *factor;
        }
    }
    matrix[(0, 3)] = position.x;
    matrix[(1, 3)] = position.y;
    matrix[(2, 3)] = position.z;
    matrix
}

/// Translation column of an affine matrix
#[inline]
pub fn translation_of(matrix: &Mat4) -> Vec3 {
    Vec3::new(matrix[(0, 3)], matrix[(1, 3)], matrix[(2, 3)])
}

/// Invert a rigid or scaled affine matrix, falling back to identity when singular
pub fn affine_inverse(matrix: &Mat4) -> Mat4 {
    matrix.try_inverse().unwrap_or_else(|| {
        log::warn!("Singular matrix passed to affine_inverse, using identity");
        Mat4::identity()
    })
}

/// Math constants
pub mod constants {
    /// Pi constant
    pub const PI: f32 = std::f32::consts::PI;

    /// Pi / 2
    pub const HALF_PI: f32 = PI * 0.5;

    /// Degrees to radians conversion factor
    pub const DEG_TO_RAD: f32 = PI / 180.0;
}

/// Extension trait for Mat4 with projection helpers
pub trait Mat4Ext {
    /// Create a right-handed perspective projection with depth mapped to `[0, 1]`
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4;
}

impl Mat4Ext for Mat4 {
    fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
        let tan_half_fovy = (fov_y * 0.5).tan();

        let mut result = Mat4::zeros();
        result[(0, 0)] = 1.0 / (aspect * tan_half_fovy);
        result[(1, 1)] = 1.0 / tan_half_fovy;
        result[(2, 2)] = far / (near - far);
        result[(2, 3)] = -(near * far) / (far - near);
        result[(3, 2)] = -1.0;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_trs_matches_matrix_product() {
        let position = Vec3::new(1.0, -2.0, 3.0);
        let rotation = Quat::from_axis_angle(&Vec3::y_axis(), 0.7);
        let scale = Vec3::new(2.0, 0.5, 3.0);

        let expected = Mat4::new_translation(&position)
            * rotation.to_homogeneous()
            * Mat4::new_nonuniform_scaling(&scale);

        assert_relative_eq!(compose_trs(&position, &rotation, &scale), expected, epsilon = 1e-6);
    }

    #[test]
    fn test_affine_inverse_round_trip() {
        let matrix = compose_trs(
            &Vec3::new(4.0, 5.0, 6.0),
            &Quat::from_axis_angle(&Vec3::x_axis(), constants::HALF_PI),
            &Vec3::new(1.0, 1.0, 1.0),
        );
        let inverse = affine_inverse(&matrix);
        assert_relative_eq!(matrix * inverse, Mat4::identity(), epsilon = 1e-5);
    }

    #[test]
    fn test_singular_inverse_is_identity() {
        assert_eq!(affine_inverse(&Mat4::zeros()), Mat4::identity());
    }
}
