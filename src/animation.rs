use std::time::Instant;

use glam::Vec3;

/// Rate of the linear spin around Y, radians per second.
pub const TURNTABLE_SPIN_RATE: f32 = 0.1;

/// Angular rate of the sine/cosine sway on X and Z, radians per second.
pub const TURNTABLE_SWAY_RATE: f32 = 0.4;

/// Rotation of the showcased model as a pure function of elapsed seconds.
///
/// Elapsed time is measured from render-loop start, not from the model's own
/// load completion, so the animation is reproducible from `t` alone: at
/// t = 2.0 the rotation is exactly `(sin 0.8, 0.2, cos 0.8)`.
pub fn turntable_rotation(elapsed: f32) -> Vec3 {
    Vec3::new(
        (elapsed * TURNTABLE_SWAY_RATE).sin(),
        elapsed * TURNTABLE_SPIN_RATE,
        (elapsed * TURNTABLE_SWAY_RATE).cos(),
    )
}

/// Monotonic elapsed-time source for the render loop.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    started: Instant,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f32 {
        self.started.elapsed().as_secs_f32()
    }

    pub fn restart(&mut self) {
        self.started = Instant::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rotation_is_deterministic_in_elapsed_time() {
        let rotation = turntable_rotation(2.0);
        assert!((rotation.x - 0.8_f32.sin()).abs() < 1e-6);
        assert!((rotation.y - 0.2).abs() < 1e-6);
        assert!((rotation.z - 0.8_f32.cos()).abs() < 1e-6);
    }

    #[test]
    fn rotation_starts_at_rest_pose() {
        let rotation = turntable_rotation(0.0);
        assert_eq!(rotation.x, 0.0);
        assert_eq!(rotation.y, 0.0);
        assert_eq!(rotation.z, 1.0);
    }

    #[test]
    fn clock_moves_forward() {
        let clock = Clock::new();
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(clock.elapsed_seconds() > 0.0);
    }
}
