//! Camera and lights of the AR scene.
//!
//! World axes follow the usual graphics convention: `+Y` is up, the camera looks along its
//! local `-Z`, and north is `-Z` in world space.

use nalgebra::{Perspective3, Point3, UnitQuaternion, Vector3};

/// A perspective camera.
#[derive(Clone, Debug, PartialEq)]
pub struct PerspectiveCamera {
    /// Vertical field of view in degrees.
    pub fov: f64,
    /// Width divided by height of the output.
    pub aspect: f64,
    /// Near clip plane.
    pub near: f64,
    /// Far clip plane.
    pub far: f64,
    /// Position in world space.
    pub position: Point3<f64>,
    /// Orientation in world space.
    pub rotation: UnitQuaternion<f64>,
}

impl PerspectiveCamera {
    /// Creates a camera at the origin looking north.
    pub fn new(fov: f64, aspect: f64, near: f64, far: f64) -> Self {
        Self {
            fov,
            aspect,
            near,
            far,
            position: Point3::origin(),
            rotation: UnitQuaternion::identity(),
        }
    }

    /// Matches the aspect ratio to an output of `width` × `height`.
    pub fn set_viewport(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width as f64 / height as f64;
        }
    }

    /// The direction the camera looks at, in world space.
    pub fn world_direction(&self) -> Vector3<f64> {
        self.rotation * -Vector3::z()
    }

    /// Position of `point` in camera space.
    pub fn to_camera_space(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation.inverse() * (point - self.position.coords)
    }

    /// Projects a camera space point to normalized device coordinates.
    ///
    /// Points behind the near plane have no projection.
    pub fn project_camera_space(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        if -point.z < self.near {
            return None;
        }
        Some(
            Perspective3::new(self.aspect, self.fov.to_radians(), self.near, self.far)
                .project_point(point),
        )
    }

    /// Projects a world space point to normalized device coordinates.
    pub fn project(&self, point: &Point3<f64>) -> Option<Point3<f64>> {
        self.project_camera_space(&self.to_camera_space(point))
    }
}

/// Light reaching every surface equally.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AmbientLight {
    /// Brightness, 1.0 is full white.
    pub intensity: f32,
}

/// Parallel light shining from `position` towards `target`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DirectionalLight {
    /// Where the light comes from.
    pub position: Point3<f64>,
    /// Where the light points at.
    pub target: Point3<f64>,
    /// Brightness, 1.0 is full white.
    pub intensity: f32,
}

impl DirectionalLight {
    /// Unit vector from a lit surface towards the light.
    pub fn to_light(&self) -> Vector3<f64> {
        let v = self.position - self.target;
        if v.norm_squared() > 0.0 {
            v.normalize()
        } else {
            Vector3::y()
        }
    }

    /// Places the light `behind` units behind the camera's view direction and `above` units
    /// above it, so surfaces facing the camera stay lit whatever the heading.
    pub fn follow_camera(&mut self, camera: &PerspectiveCamera, behind: f64, above: f64) {
        self.position =
            camera.position + camera.world_direction() * -behind + Vector3::new(0.0, above, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn default_camera_looks_north() {
        let camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        assert!((camera.world_direction() - Vector3::new(0.0, 0.0, -1.0)).norm() < EPSILON);
    }

    #[test]
    fn point_ahead_projects_to_center() {
        let camera = PerspectiveCamera::new(80.0, 16.0 / 9.0, 0.001, 1000.0);
        let ndc = camera.project(&Point3::new(0.0, 0.0, -10.0)).unwrap();
        assert!(ndc.x.abs() < EPSILON);
        assert!(ndc.y.abs() < EPSILON);
        assert!(ndc.z > -1.0 && ndc.z < 1.0);
    }

    #[test]
    fn point_behind_has_no_projection() {
        let camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        assert!(camera.project(&Point3::new(0.0, 0.0, 10.0)).is_none());
    }

    #[test]
    fn rotated_camera_sees_rotated_point() {
        let mut camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        camera.position = Point3::new(5.0, 0.0, 5.0);
        // A quarter turn to the left makes the camera look west (-X).
        camera.rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);

        let ndc = camera.project(&Point3::new(-5.0, 0.0, 5.0)).unwrap();
        assert!(ndc.x.abs() < EPSILON);
        assert!(ndc.y.abs() < EPSILON);
    }

    #[test]
    fn set_viewport_updates_aspect_only() {
        let mut camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        camera.set_viewport(1920.0, 1080.0);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < EPSILON);

        camera.set_viewport(0.0, 1080.0);
        assert!((camera.aspect - 1920.0 / 1080.0).abs() < EPSILON);
        assert_eq!(camera.fov, 80.0);
    }

    #[test]
    fn light_follows_camera_from_behind_and_above() {
        let mut camera = PerspectiveCamera::new(80.0, 1.0, 0.001, 1000.0);
        camera.position = Point3::new(1.0, 2.0, 3.0);
        let mut sun = DirectionalLight {
            position: Point3::new(0.0, 10.0, -10.0),
            target: Point3::origin(),
            intensity: 2.0,
        };

        sun.follow_camera(&camera, 10.0, 5.0);
        // Looking north (-Z), behind is +Z.
        assert!((sun.position - Point3::new(1.0, 7.0, 13.0)).norm() < EPSILON);

        camera.rotation = UnitQuaternion::from_axis_angle(&Vector3::y_axis(), FRAC_PI_2);
        sun.follow_camera(&camera, 10.0, 5.0);
        // Looking west (-X), behind is +X.
        assert!((sun.position - Point3::new(11.0, 7.0, 3.0)).norm() < EPSILON);
    }
}
