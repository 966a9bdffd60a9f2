//! Orbit camera controller

use crate::scene::Camera;
use glam::Vec3;

/// Orbits the camera around a target point on mouse drag, zooms on scroll.
#[derive(Debug, Clone)]
pub struct OrbitController {
    pub target: Vec3,
    pub distance: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    /// Angle around the Y axis in radians.
    pub azimuth: f32,
    /// Angle above the XZ plane in radians.
    pub elevation: f32,
    pub min_elevation: f32,
    pub max_elevation: f32,
    pub orbit_sensitivity: f32,
    pub zoom_factor: f32,
}

impl Default for OrbitController {
    fn default() -> Self {
        Self {
            target: Vec3::ZERO,
            distance: 4.0,
            min_distance: 0.5,
            max_distance: 50.0,
            azimuth: 25.0f32.to_radians(),
            elevation: 25.0f32.to_radians(),
            min_elevation: -std::f32::consts::FRAC_PI_2 + 0.05,
            max_elevation: std::f32::consts::FRAC_PI_2 - 0.05,
            orbit_sensitivity: 0.005,
            zoom_factor: 0.9,
        }
    }
}

impl OrbitController {
    pub fn new(target: Vec3, distance: f32) -> Self {
        Self {
            target,
            distance,
            ..Default::default()
        }
    }

    /// Apply a mouse drag in pixels. Dragging right increases azimuth,
    /// dragging up increases elevation; elevation clamps short of the poles.
    pub fn orbit(&mut self, delta_x: f32, delta_y: f32) {
        self.azimuth += delta_x * self.orbit_sensitivity;
        self.elevation = (self.elevation + delta_y * self.orbit_sensitivity)
            .clamp(self.min_elevation, self.max_elevation);
    }

    /// Apply scroll steps. Positive steps move closer.
    pub fn zoom(&mut self, steps: f32) {
        self.distance = (self.distance * self.zoom_factor.powf(steps))
            .clamp(self.min_distance, self.max_distance);
    }

    /// Camera position on the orbit sphere.
    pub fn position(&self) -> Vec3 {
        let (sin_a, cos_a) = self.azimuth.sin_cos();
        let (sin_e, cos_e) = self.elevation.sin_cos();
        self.target
            + Vec3::new(
                self.distance * cos_e * sin_a,
                self.distance * sin_e,
                self.distance * cos_e * cos_a,
            )
    }

    /// Move the camera onto the orbit and aim it at the target.
    pub fn apply(&self, camera: &mut Camera) {
        camera.position = self.position();
        camera.target = self.target;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn position_sits_at_orbit_distance() {
        let controller = OrbitController::default();
        let offset = controller.position() - controller.target;
        assert!((offset.length() - controller.distance).abs() < 1e-4);
    }

    #[test]
    fn elevation_clamps_short_of_poles() {
        let mut controller = OrbitController::default();
        controller.orbit(0.0, 1e6);
        assert!(controller.elevation <= controller.max_elevation);
        controller.orbit(0.0, -1e6);
        assert!(controller.elevation >= controller.min_elevation);
    }

    #[test]
    fn zoom_clamps_to_distance_range() {
        let mut controller = OrbitController::default();
        controller.zoom(1e3);
        assert_eq!(controller.distance, controller.min_distance);
        controller.zoom(-1e3);
        assert_eq!(controller.distance, controller.max_distance);
    }

    #[test]
    fn apply_aims_camera_at_target() {
        let controller = OrbitController::new(Vec3::new(1.0, 0.0, 0.0), 3.0);
        let mut camera = Camera::default();
        controller.apply(&mut camera);
        assert_eq!(camera.target, controller.target);
        assert!(((camera.position - controller.target).length() - 3.0).abs() < 1e-4);
    }
}
