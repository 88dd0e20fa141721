//! Perspective camera for rendering.

use glam::{Mat4, Vec3};

/// World up axis used for yaw and for rebuilding the camera basis.
pub const WORLD_UP: Vec3 = Vec3::Y;

/// Pitch stops this close to straight up or down.
const MAX_PITCH_DOT: f32 = 0.999;

/// Projection parameters in the form the camera stores them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Projection {
    /// Vertical field of view in radians.
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Projection {
    fn default() -> Self {
        Self {
            fov_y: 30.0_f32.to_radians(),
            aspect: 800.0 / 600.0,
            near: 0.1,
            far: 10.0,
        }
    }
}

impl Projection {
    /// Horizontal field of view derived from the vertical one and the aspect.
    pub fn fov_x(&self) -> f32 {
        2.0 * ((self.fov_y * 0.5).tan() * self.aspect).atan()
    }
}

/// A camera for rendering the scene.
///
/// Orientation is kept as an orthonormal basis: `direction` is where the
/// camera looks, `right = direction x WORLD_UP` and `up = right x direction`.
#[derive(Clone, Debug)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
    right: Vec3,
    up: Vec3,
    projection: Projection,
    home: (Vec3, Vec3),
}

impl Default for Camera {
    fn default() -> Self {
        Self::looking_at(Vec3::splat(2.0), Vec3::ZERO, Projection::default())
    }
}

impl Camera {
    /// Create a camera at (2, 2, 2) looking at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a camera at `position` looking at `target`. This pose is also
    /// the one [`Camera::reset`] returns to.
    pub fn looking_at(position: Vec3, target: Vec3, projection: Projection) -> Self {
        let direction = (target - position).try_normalize().unwrap_or(Vec3::NEG_Z);
        let mut camera = Self {
            position,
            direction,
            right: Vec3::X,
            up: Vec3::Y,
            projection,
            home: (position, direction),
        };
        camera.rebuild_basis();
        camera
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    pub fn right(&self) -> Vec3 {
        self.right
    }

    pub fn up(&self) -> Vec3 {
        self.up
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Recomputes the aspect ratio for a new framebuffer extent.
    ///
    /// A zero-height extent is ignored; the previous aspect stays in place.
    pub fn set_extent(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.projection.aspect = width as f32 / height as f32;
    }

    /// Moves along the view direction.
    pub fn move_forward(&mut self, amount: f32) {
        self.position += self.direction * amount;
    }

    pub fn move_right(&mut self, amount: f32) {
        self.position += self.right * amount;
    }

    pub fn move_up(&mut self, amount: f32) {
        self.position += self.up * amount;
    }

    /// Turns about the world up axis.
    pub fn yaw(&mut self, radians: f32) {
        self.direction = glam::Quat::from_axis_angle(WORLD_UP, radians) * self.direction;
        self.rebuild_basis();
    }

    /// Tilts about the camera's right axis. Rotations that would point the
    /// camera straight along the world up axis are dropped.
    pub fn pitch(&mut self, radians: f32) {
        let direction = glam::Quat::from_axis_angle(self.right, radians) * self.direction;
        if direction.dot(WORLD_UP).abs() > MAX_PITCH_DOT {
            return;
        }
        self.direction = direction;
        self.rebuild_basis();
    }

    /// Returns to the pose the camera was created with.
    pub fn reset(&mut self) {
        (self.position, self.direction) = self.home;
        self.rebuild_basis();
    }

    /// Get the view matrix.
    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.position, self.position + self.direction, self.up)
    }

    /// Get the projection matrix (with Vulkan Y-flip).
    pub fn projection_matrix(&self) -> Mat4 {
        let p = &self.projection;
        let mut proj = Mat4::perspective_rh(p.fov_y, p.aspect, p.near, p.far);
        // Flip Y for Vulkan coordinate system
        proj.y_axis.y *= -1.0;
        proj
    }

    /// Renormalizes `direction` and derives `right` and `up` from it.
    fn rebuild_basis(&mut self) {
        self.direction = self.direction.normalize();
        self.right = self
            .direction
            .cross(WORLD_UP)
            .try_normalize()
            .unwrap_or(Vec3::X);
        self.up = self.right.cross(self.direction).normalize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f32 = 1e-5;

    fn assert_orthonormal(camera: &Camera) {
        assert!((camera.direction().length() - 1.0).abs() < EPS);
        assert!((camera.right().length() - 1.0).abs() < EPS);
        assert!((camera.up().length() - 1.0).abs() < EPS);
        assert!(camera.direction().dot(camera.right()).abs() < EPS);
        assert!(camera.direction().dot(camera.up()).abs() < EPS);
        assert!(camera.right().dot(camera.up()).abs() < EPS);
    }

    #[test]
    fn test_default_pose() {
        let camera = Camera::new();
        assert_eq!(camera.position(), Vec3::splat(2.0));
        assert!(camera
            .direction()
            .abs_diff_eq(Vec3::splat(-1.0).normalize(), EPS));
        assert_orthonormal(&camera);
        assert!(camera.up().y > 0.0);

        let p = camera.projection();
        assert!((p.fov_y - 30.0_f32.to_radians()).abs() < EPS);
        assert_eq!(p.near, 0.1);
        assert_eq!(p.far, 10.0);
    }

    #[test]
    fn test_view_matrix_moves_eye_to_origin() {
        let camera = Camera::new();
        let eye = camera.view_matrix().transform_point3(camera.position());
        assert!(eye.abs_diff_eq(Vec3::ZERO, EPS));

        // The target ends up straight ahead on -Z.
        let target = camera.view_matrix().transform_point3(Vec3::ZERO);
        assert!(target.x.abs() < EPS && target.y.abs() < EPS);
        assert!(target.z < 0.0);
    }

    #[test]
    fn test_projection_flips_y() {
        let camera = Camera::new();
        let p = camera.projection();
        let unflipped = Mat4::perspective_rh(p.fov_y, p.aspect, p.near, p.far);
        let proj = camera.projection_matrix();
        assert!((proj.y_axis.y + unflipped.y_axis.y).abs() < EPS);
        assert_eq!(proj.x_axis, unflipped.x_axis);
    }

    #[test]
    fn test_fov_x_follows_aspect() {
        let mut camera = Camera::new();
        camera.set_extent(1000, 500);
        let p = *camera.projection();
        assert!((p.aspect - 2.0).abs() < EPS);
        let expected = 2.0 * ((15.0_f32.to_radians()).tan() * 2.0).atan();
        assert!((p.fov_x() - expected).abs() < EPS);

        camera.set_extent(600, 600);
        assert!((camera.projection().fov_x() - p.fov_y).abs() < EPS);
    }

    #[test]
    fn test_zero_extent_keeps_aspect() {
        let mut camera = Camera::new();
        let before = camera.projection().aspect;
        camera.set_extent(0, 0);
        camera.set_extent(640, 0);
        assert_eq!(camera.projection().aspect, before);
    }

    #[test]
    fn test_yaw_keeps_height_and_basis() {
        let mut camera = Camera::new();
        let y = camera.direction().y;
        camera.yaw(0.7);
        assert!((camera.direction().y - y).abs() < EPS);
        assert_orthonormal(&camera);
    }

    #[test]
    fn test_pitch_stops_short_of_vertical() {
        let mut camera = Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z, Projection::default());
        for _ in 0..100 {
            camera.pitch(0.1);
        }
        assert!(camera.direction().dot(WORLD_UP) <= MAX_PITCH_DOT);
        assert!(camera.direction().dot(WORLD_UP) > 0.9);
        assert_orthonormal(&camera);
    }

    #[test]
    fn test_movement_along_basis() {
        let mut camera = Camera::looking_at(Vec3::ZERO, Vec3::NEG_Z, Projection::default());
        camera.move_forward(2.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(0.0, 0.0, -2.0), EPS));
        camera.move_right(1.0);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, 0.0, -2.0), EPS));
        camera.move_up(-0.5);
        assert!(camera.position().abs_diff_eq(Vec3::new(1.0, -0.5, -2.0), EPS));
    }

    #[test]
    fn test_reset_restores_home_pose() {
        let mut camera = Camera::new();
        let (position, direction) = (camera.position(), camera.direction());
        camera.move_forward(3.0);
        camera.yaw(1.0);
        camera.reset();
        assert!(camera.position().abs_diff_eq(position, EPS));
        assert!(camera.direction().abs_diff_eq(direction, EPS));
    }
}
