use std::f64::consts::PI;

use nalgebra as na;

const MIN_PHI: f64 = 0.05;
const MAX_PHI: f64 = PI - 0.05;

/// Spherical orbit camera around a target point. Local UI state only.
#[derive(Debug, Clone, PartialEq)]
pub struct OrbitCamera {
    pub target: na::Point3<f64>,
    pub radius: f64,
    /// Azimuth around the z axis.
    pub theta: f64,
    /// Polar angle from the z axis.
    pub phi: f64,
    pub min_radius: f64,
    pub max_radius: f64,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            target: na::Point3::new(0.0, 0.0, 0.2),
            radius: 1.0,
            theta: PI / 4.0,
            phi: PI / 3.0,
            min_radius: 0.1,
            max_radius: 10.0,
        }
    }
}

impl OrbitCamera {
    pub fn orbit(&mut self, d_theta: f64, d_phi: f64) {
        self.theta = (self.theta + d_theta).rem_euclid(2.0 * PI);
        self.phi = (self.phi + d_phi).clamp(MIN_PHI, MAX_PHI);
    }

    /// Scales the distance to the target. `factor < 1.0` zooms in.
    pub fn zoom(&mut self, factor: f64) {
        if factor.is_finite() && factor > 0.0 {
            self.radius = (self.radius * factor).clamp(self.min_radius, self.max_radius);
        }
    }

    pub fn eye(&self) -> na::Point3<f64> {
        self.target
            + na::Vector3::new(
                self.radius * self.phi.sin() * self.theta.cos(),
                self.radius * self.phi.sin() * self.theta.sin(),
                self.radius * self.phi.cos(),
            )
    }

    /// World to camera transform, z up.
    pub fn view(&self) -> na::Isometry3<f64> {
        na::Isometry3::look_at_rh(&self.eye(), &self.target, &na::Vector3::z())
    }
}

#[cfg(test)]
mod tests {
    use assert_approx_eq::assert_approx_eq;

    use super::*;

    #[test]
    fn test_eye_distance() {
        let mut camera = OrbitCamera::default();
        assert_approx_eq!((camera.eye() - camera.target).norm(), camera.radius);
        camera.orbit(1.0, -0.3);
        assert_approx_eq!((camera.eye() - camera.target).norm(), camera.radius);
    }

    #[test]
    fn test_zoom_is_bounded() {
        let mut camera = OrbitCamera::default();
        camera.zoom(0.5);
        assert_approx_eq!(camera.radius, 0.5);
        camera.zoom(1e-6);
        assert_approx_eq!(camera.radius, camera.min_radius);
        camera.zoom(1e6);
        assert_approx_eq!(camera.radius, camera.max_radius);
        camera.zoom(-1.0);
        assert_approx_eq!(camera.radius, camera.max_radius);
    }

    #[test]
    fn test_phi_is_bounded() {
        let mut camera = OrbitCamera::default();
        camera.orbit(0.0, 10.0);
        assert_approx_eq!(camera.phi, MAX_PHI);
        camera.orbit(0.0, -10.0);
        assert_approx_eq!(camera.phi, MIN_PHI);
    }

    #[test]
    fn test_view_looks_at_target() {
        let camera = OrbitCamera::default();
        let target_in_view = camera.view() * camera.target;
        assert_approx_eq!(target_in_view.x, 0.0);
        assert_approx_eq!(target_in_view.y, 0.0);
        assert_approx_eq!(target_in_view.z, -camera.radius);
    }
}
