//! Pose and camera math for the per-eye render step.
//!
//! All matrices are right-handed with a `[0, 1]` clip-space depth range, the way Direct3D
//! expects them.

use glam::{Mat4, Quat, Vec3};

pub const UP: Vec3 = Vec3::Y;
pub const FORWARD: Vec3 = Vec3::NEG_Z;

/// A rigid transform: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub rotation: Quat,
    pub translation: Vec3,
}

impl Pose {
    pub const IDENTITY: Self = Self {
        rotation: Quat::IDENTITY,
        translation: Vec3::ZERO,
    };

    pub const fn new(rotation: Quat, translation: Vec3) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    /// `self ∘ child`: `child` expressed in the frame described by `self`.
    pub fn compose(&self, child: &Self) -> Self {
        Self {
            rotation: self.rotation * child.rotation,
            translation: self.translation + self.rotation * child.translation,
        }
    }

    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.translation + self.rotation * point
    }

    /// Moves the pose by `offset` measured in its own (head-local) frame.
    pub fn offset_local(&self, offset: Vec3) -> Self {
        Self {
            rotation: self.rotation,
            translation: self.transform_point(offset),
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Field of view as tangents of the half-angles from the view axis to each frustum edge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FovPort {
    pub up_tan: f32,
    pub down_tan: f32,
    pub left_tan: f32,
    pub right_tan: f32,
}

impl FovPort {
    pub const fn symmetric(tan: f32) -> Self {
        Self {
            up_tan: tan,
            down_tan: tan,
            left_tan: tan,
            right_tan: tan,
        }
    }
}

/// Where the viewer's torso sits in the virtual world.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyPose {
    pub position: Vec3,
    /// Rotation around [`UP`], in radians.
    pub yaw: f32,
}

impl BodyPose {
    pub fn rotation(&self) -> Quat {
        Quat::from_axis_angle(UP, self.yaw)
    }

    /// Places a tracked eye pose in the world: body yaw composed with the head rotation,
    /// body position plus the body-rotated tracked offset.
    pub fn world_pose(&self, eye: &Pose) -> Pose {
        Pose::new(self.rotation(), self.position).compose(eye)
    }
}

/// Right-handed look-at view matrix for a camera at `pose`.
pub fn view_matrix(pose: &Pose) -> Mat4 {
    let up = pose.rotation * UP;
    let forward = pose.rotation * FORWARD;
    Mat4::look_at_rh(pose.translation, pose.translation + forward, up)
}

/// Right-handed perspective projection for a possibly asymmetric field of view.
pub fn projection_matrix(fov: &FovPort, near: f32, far: f32) -> Mat4 {
    let x_scale = 2.0 / (fov.left_tan + fov.right_tan);
    let x_offset = (fov.right_tan - fov.left_tan) / (fov.left_tan + fov.right_tan);
    let y_scale = 2.0 / (fov.up_tan + fov.down_tan);
    let y_offset = (fov.up_tan - fov.down_tan) / (fov.up_tan + fov.down_tan);
    let depth = far / (near - far);

    Mat4::from_cols(
        [x_scale, 0.0, 0.0, 0.0].into(),
        [0.0, y_scale, 0.0, 0.0].into(),
        [x_offset, y_offset, depth, -1.0].into(),
        [0.0, 0.0, near * depth, 0.0].into(),
    )
}

/// Combined projection × view transform for one eye.
pub fn eye_transform(body: &BodyPose, eye: &Pose, fov: &FovPort, near: f32, far: f32) -> Mat4 {
    projection_matrix(fov, near, far) * view_matrix(&body.world_pose(eye))
}

/// Transposes `transform` into the sixteen floats the vertex shader's constant buffer holds.
pub fn shader_constants(transform: &Mat4) -> [f32; 16] {
    transform.transpose().to_cols_array()
}
