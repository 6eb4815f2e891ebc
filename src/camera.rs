use glam::{Mat4, Vec3};
use serde::{Deserialize, Serialize};

/// Perspective projection paired with a world-space position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveCamera {
    pub fov_y_degrees: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
    pub position: Vec3,
}

impl PerspectiveCamera {
    pub fn new(fov_y_degrees: f32, aspect: f32, near: f32, far: f32, position: Vec3) -> Self {
        Self {
            fov_y_degrees,
            aspect,
            near,
            far,
            position,
        }
    }

    /// Recomputes the aspect ratio from viewport dimensions.
    pub fn set_viewport(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    pub fn projection(&self) -> Mat4 {
        Mat4::perspective_rh(
            self.fov_y_degrees.to_radians(),
            self.aspect.max(0.01),
            self.near,
            self.far,
        )
    }

    pub fn view(&self, target: Vec3) -> Mat4 {
        Mat4::look_at_rh(self.position, target, Vec3::Y)
    }

    pub fn view_projection(&self, target: Vec3) -> Mat4 {
        self.projection() * self.view(target)
    }
}

// Keep the camera off the poles so look_at never degenerates.
const PITCH_LIMIT: f32 = 1.55;
const MIN_RADIUS: f32 = 0.5;
const MAX_RADIUS: f32 = 50.0;

/// Orbit controller with optional per-frame damping.
///
/// The camera orbits a look-at target on a sphere described by yaw, pitch and
/// radius. Pointer input moves the *target* orientation; `update` advances the
/// current orientation toward it, one exponential step per frame, so motion
/// eases out over successive frames instead of snapping.
#[derive(Debug, Clone, Copy)]
pub struct OrbitControls {
    pub target: Vec3,
    pub damping: bool,
    pub damping_factor: f32,
    yaw: f32,
    pitch: f32,
    radius: f32,
    goal_yaw: f32,
    goal_pitch: f32,
    goal_radius: f32,
}

impl OrbitControls {
    /// Builds a controller whose current orbit matches the camera's position.
    pub fn new(camera_position: Vec3, target: Vec3) -> Self {
        let offset = camera_position - target;
        let radius = offset.length().max(MIN_RADIUS);
        let yaw = offset.x.atan2(offset.z);
        let pitch = (offset.y / radius).clamp(-1.0, 1.0).asin();
        Self {
            target,
            damping: true,
            damping_factor: 0.05,
            yaw,
            pitch,
            radius,
            goal_yaw: yaw,
            goal_pitch: pitch,
            goal_radius: radius,
        }
    }

    /// Feeds a pointer drag into the goal orientation (radians).
    pub fn rotate(&mut self, delta_yaw: f32, delta_pitch: f32) {
        self.goal_yaw += delta_yaw;
        self.goal_pitch = (self.goal_pitch + delta_pitch).clamp(-PITCH_LIMIT, PITCH_LIMIT);
    }

    /// Feeds wheel input into the goal radius; positive steps zoom out.
    pub fn zoom(&mut self, steps: f32) {
        let factor = 1.1_f32.powf(steps);
        self.goal_radius = (self.goal_radius * factor).clamp(MIN_RADIUS, MAX_RADIUS);
    }

    /// Advances the damping integration one frame and repositions the camera.
    pub fn update(&mut self, camera: &mut PerspectiveCamera) {
        if self.damping {
            let t = self.damping_factor;
            self.yaw += (self.goal_yaw - self.yaw) * t;
            self.pitch += (self.goal_pitch - self.pitch) * t;
            self.radius += (self.goal_radius - self.radius) * t;
        } else {
            self.yaw = self.goal_yaw;
            self.pitch = self.goal_pitch;
            self.radius = self.goal_radius;
        }
        camera.position = self.target + self.offset();
    }

    fn offset(&self) -> Vec3 {
        let (sin_yaw, cos_yaw) = self.yaw.sin_cos();
        let (sin_pitch, cos_pitch) = self.pitch.sin_cos();
        Vec3::new(
            self.radius * cos_pitch * sin_yaw,
            self.radius * sin_pitch,
            self.radius * cos_pitch * cos_yaw,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_updates_aspect_exactly() {
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0, Vec3::new(4.0, 5.0, 4.0));
        camera.set_viewport(1920, 1080);
        assert_eq!(camera.aspect, 1920.0 / 1080.0);
        camera.set_viewport(800, 0);
        assert_eq!(camera.aspect, 800.0);
    }

    #[test]
    fn controls_start_at_the_camera_position() {
        let position = Vec3::new(4.0, 5.0, 4.0);
        let target = Vec3::new(0.0, 3.5, 0.0);
        let mut controls = OrbitControls::new(position, target);
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0, position);
        controls.update(&mut camera);
        assert!((camera.position - position).length() < 1e-4);
    }

    #[test]
    fn damping_eases_toward_the_goal_over_frames() {
        let position = Vec3::new(0.0, 0.0, 5.0);
        let mut controls = OrbitControls::new(position, Vec3::ZERO);
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0, position);
        controls.rotate(1.0, 0.0);

        controls.update(&mut camera);
        let after_one = camera.position;
        assert!((after_one - position).length() > 1e-4, "should have moved");

        for _ in 0..400 {
            controls.update(&mut camera);
        }
        // Goal orientation: yaw advanced by 1 radian at radius 5.
        let goal = Vec3::new(5.0 * 1.0_f32.sin(), 0.0, 5.0 * 1.0_f32.cos());
        assert!((camera.position - goal).length() < 1e-2);
    }

    #[test]
    fn disabling_damping_snaps_immediately() {
        let position = Vec3::new(0.0, 0.0, 5.0);
        let mut controls = OrbitControls::new(position, Vec3::ZERO);
        controls.damping = false;
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0, position);
        controls.rotate(std::f32::consts::FRAC_PI_2, 0.0);
        controls.update(&mut camera);
        assert!((camera.position - Vec3::new(5.0, 0.0, 0.0)).length() < 1e-4);
    }

    #[test]
    fn zoom_is_clamped() {
        let mut controls = OrbitControls::new(Vec3::new(0.0, 0.0, 5.0), Vec3::ZERO);
        controls.damping = false;
        controls.zoom(-200.0);
        let mut camera = PerspectiveCamera::new(75.0, 1.0, 0.1, 100.0, Vec3::ZERO);
        controls.update(&mut camera);
        assert!((camera.position.length() - MIN_RADIUS).abs() < 1e-4);
    }
}
