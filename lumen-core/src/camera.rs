//! Lumen world space coordinate system (right-hand side, y up)
//!
//! ```text
//!                y
//!                ^
//!                |
//!                |
//!                ----------> x
//!               /
//!              z
//! ```

use glam::{EulerRot, Mat4, Quat, Vec3};
use crate::math::{Degree, Radians};

pub const NEAR_PLANE: f32 = 0.1;
pub const FAR_PLANE: f32 = 1000.0;
pub const WORLD_SPACE_UP: Vec3 = Vec3::new(0., 1., 0.);
pub const WORLD_SPACE_FORWARD: Vec3 = Vec3::new(0., 0., -1.);
pub const WORLD_SPACE_RIGHT: Vec3 = Vec3::new(1., 0., 0.);

/// Perspective camera producing the view and projection matrices consumed by shaders.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Vec3,
    rotation: Quat,
    pitch: Radians,
    yaw: Radians,

    fov_y: Radians,
    aspect_ratio: f32,
    z_near: f32,
    z_far: f32,

    forward: Vec3,
    right: Vec3,
    up: Vec3,
    view: Mat4,
    proj: Mat4,
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Degree(45.0).into(), 16.0 / 9.0, NEAR_PLANE, FAR_PLANE)
    }
}

impl Camera {
    pub fn new(fov_y: Radians, aspect_ratio: f32, z_near: f32, z_far: f32) -> Self {
        let mut cam = Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            pitch: Radians::default(),
            yaw: Radians::default(),

            fov_y,
            aspect_ratio: aspect_ratio.max(0.0001),
            z_near: z_near.max(0.0001),
            z_far,

            forward: WORLD_SPACE_FORWARD,
            right: WORLD_SPACE_RIGHT,
            up: WORLD_SPACE_UP,

            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
        };
        cam.update_projection();
        cam.update_view();
        cam
    }

    /// Return the location of camera.
    #[inline]
    pub fn location(&self) -> Vec3 {
        self.position
    }

    /// Return the view matrix of this camera.
    #[inline]
    pub fn view(&self) -> Mat4 { self.view }

    /// Return the projection matrix of this camera.
    #[inline]
    pub fn projection(&self) -> Mat4 {
        self.proj
    }

    /// Return the view-projection matrix of this camera.
    #[inline]
    pub fn view_projection(&self) -> Mat4 {
        self.proj * self.view
    }

    #[inline]
    pub fn forward(&self) -> Vec3 {
        self.forward
    }

    #[inline]
    pub fn right(&self) -> Vec3 {
        self.right
    }

    #[inline]
    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn set_location(&mut self, position: Vec3) {
        self.position = position;
        self.update_view();
    }

    /// Point the camera at `target`, keeping its location.
    pub fn look_at(&mut self, target: Vec3) {
        let dir = (target - self.position).normalize_or_zero();
        if dir == Vec3::ZERO {
            return;
        }
        self.yaw = Radians((-dir.x).atan2(-dir.z));
        self.pitch = Radians(dir.y.clamp(-1.0, 1.0).asin());
        self.rotation = Quat::from_euler(EulerRot::YXZ, self.yaw.into(), self.pitch.into(), 0.);
        self.update_local_basis();
        self.update_view();
    }

    /// Rotate the camera around `target` keeping the current distance.
    pub fn orbit(&mut self, target: Vec3, delta_yaw: Radians, delta_pitch: Radians) {
        let max_pitch: Radians = Degree(89.0).into();
        let distance = (self.position - target).length();

        self.yaw = self.yaw + delta_yaw;
        self.pitch = (self.pitch + delta_pitch).clamp(-max_pitch, max_pitch);
        // eliminate roll and avoid gimbal lock
        self.rotation = Quat::from_euler(EulerRot::YXZ, self.yaw.into(), self.pitch.into(), 0.);
        self.update_local_basis();

        self.position = target - self.forward * distance;
        self.update_view();
    }

    /// Update the aspect ratio, typically after a surface resize.
    pub fn set_aspect_ratio(&mut self, aspect_ratio: f32) {
        self.aspect_ratio = aspect_ratio.max(0.0001);
        self.update_projection();
    }

    #[inline]
    pub fn aspect_ratio(&self) -> f32 { self.aspect_ratio }

    fn update_projection(&mut self) {
        self.proj = Mat4::perspective_rh(self.fov_y.into(), self.aspect_ratio, self.z_near, self.z_far);
    }

    fn update_view(&mut self) {
        self.view = Mat4::look_to_rh(self.position, self.forward, WORLD_SPACE_UP);
    }

    fn update_local_basis(&mut self) {
        self.forward = self.rotation * WORLD_SPACE_FORWARD;
        self.right = self.rotation * WORLD_SPACE_RIGHT;
        self.up = self.rotation * WORLD_SPACE_UP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn look_at_faces_target() {
        let mut camera = Camera::default();
        camera.set_location(Vec3::new(0.0, 0.0, 5.0));
        camera.look_at(Vec3::ZERO);

        assert!((camera.forward() - Vec3::new(0.0, 0.0, -1.0)).length() < 1e-5);
        let origin_in_view = camera.view().transform_point3(Vec3::ZERO);
        assert!((origin_in_view - Vec3::new(0.0, 0.0, -5.0)).length() < 1e-4);
    }

    #[test]
    fn orbit_keeps_distance() {
        let mut camera = Camera::default();
        camera.set_location(Vec3::new(0.0, 0.0, 4.0));
        camera.look_at(Vec3::ZERO);
        camera.orbit(Vec3::ZERO, Radians(0.7), Radians(0.3));

        assert!((camera.location().length() - 4.0).abs() < 1e-4);
    }
}
