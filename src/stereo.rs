//! Stereo camera pair derived from a single perspective camera
//!
//! Each eye sits half the eye separation to the side of the source camera and
//! uses an asymmetric frustum so both views converge on the focus plane.

use crate::scene::Perspective;
use glam::{Mat4, Vec3};

/// Stereo rig parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoSettings {
    /// Distance between the eyes in world units
    pub eye_separation: f32,
    /// Distance to the zero-parallax plane. Non-positive values converge at
    /// infinity (parallel frusta).
    pub focus: f32,
}

impl Default for StereoSettings {
    fn default() -> Self {
        Self {
            eye_separation: 0.064,
            focus: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Eye {
    Left,
    Right,
}

impl Eye {
    pub const BOTH: [Eye; 2] = [Eye::Left, Eye::Right];

    pub fn index(self) -> usize {
        match self {
            Eye::Left => 0,
            Eye::Right => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Eye::Left => "Left Eye",
            Eye::Right => "Right Eye",
        }
    }
}

/// One eye of a [`StereoCamera`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EyeCamera {
    pub projection: Mat4,
    pub world: Mat4,
}

impl EyeCamera {
    pub fn view(&self) -> Mat4 {
        self.world.inverse()
    }

    pub fn view_projection(&self) -> Mat4 {
        self.projection * self.view()
    }

    pub fn position(&self) -> Vec3 {
        self.world.w_axis.truncate()
    }
}

impl Default for EyeCamera {
    fn default() -> Self {
        Self {
            projection: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct ProjectionKey {
    perspective: Perspective,
    settings: StereoSettings,
}

/// Left/right eye cameras
#[derive(Debug, Clone)]
pub struct StereoCamera {
    pub settings: StereoSettings,
    left: EyeCamera,
    right: EyeCamera,
    cached: Option<ProjectionKey>,
    projection_updates: u64,
}

impl StereoCamera {
    pub fn new(settings: StereoSettings) -> Self {
        Self {
            settings,
            left: EyeCamera::default(),
            right: EyeCamera::default(),
            cached: None,
            projection_updates: 0,
        }
    }

    pub fn left(&self) -> &EyeCamera {
        &self.left
    }

    pub fn right(&self) -> &EyeCamera {
        &self.right
    }

    pub fn eye(&self, eye: Eye) -> &EyeCamera {
        match eye {
            Eye::Left => &self.left,
            Eye::Right => &self.right,
        }
    }

    /// Number of times the eye projections have been rebuilt
    pub fn projection_updates(&self) -> u64 {
        self.projection_updates
    }

    /// Derive both eyes from a source camera's perspective and world matrix
    pub fn update(&mut self, perspective: &Perspective, camera_world: Mat4) {
        let key = ProjectionKey {
            perspective: *perspective,
            settings: self.settings,
        };

        if self.cached != Some(key) {
            let (left, right) = Self::eye_projections(perspective, &self.settings);
            self.left.projection = left;
            self.right.projection = right;
            self.cached = Some(key);
            self.projection_updates += 1;
        }

        let half_separation = self.settings.eye_separation * 0.5;
        self.left.world = camera_world * Mat4::from_translation(Vec3::new(-half_separation, 0.0, 0.0));
        self.right.world = camera_world * Mat4::from_translation(Vec3::new(half_separation, 0.0, 0.0));
    }

    fn eye_projections(perspective: &Perspective, settings: &StereoSettings) -> (Mat4, Mat4) {
        let near = perspective.near;
        let aspect = perspective.aspect;
        let base = perspective.matrix();

        let ymax = near * (perspective.fov_y_radians() * 0.5).tan();
        let shift = if settings.focus > 0.0 && settings.focus.is_finite() {
            settings.eye_separation * 0.5 * near / settings.focus
        } else {
            log::warn!("Stereo focus {} is not positive; using parallel eye frusta", settings.focus);
            0.0
        };

        let off_axis = |shift: f32| {
            let xmin = -ymax * aspect + shift;
            let xmax = ymax * aspect + shift;
            let mut projection = base;
            projection.x_axis.x = 2.0 * near / (xmax - xmin);
            projection.z_axis.x = (xmax + xmin) / (xmax - xmin);
            projection
        };

        (off_axis(shift), off_axis(-shift))
    }
}

impl Default for StereoCamera {
    fn default() -> Self {
        Self::new(StereoSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn demo_perspective() -> Perspective {
        Perspective {
            fov_y_degrees: 60.0,
            aspect: 16.0 / 9.0,
            near: 0.01,
            far: 100.0,
        }
    }

    #[test]
    fn eyes_are_offset_along_camera_right() {
        let mut stereo = StereoCamera::default();
        let rotation = Quat::from_rotation_y(0.7);
        let world = Mat4::from_rotation_translation(rotation, Vec3::new(1.0, 2.0, 3.0));
        stereo.update(&demo_perspective(), world);

        let right_axis = rotation * Vec3::X;
        let delta = stereo.right().position() - stereo.left().position();
        assert!(delta.abs_diff_eq(right_axis * 0.064, 1e-6));

        let center = (stereo.left().position() + stereo.right().position()) * 0.5;
        assert!(center.abs_diff_eq(Vec3::new(1.0, 2.0, 3.0), 1e-6));
    }

    #[test]
    fn projections_differ_only_in_shift() {
        let perspective = demo_perspective();
        let mut stereo = StereoCamera::default();
        stereo.update(&perspective, Mat4::IDENTITY);

        let source = perspective.matrix();
        let left = stereo.left().projection;
        let right = stereo.right().projection;

        assert!(left.z_axis.x > 0.0);
        assert!(right.z_axis.x < 0.0);
        assert!((left.z_axis.x + right.z_axis.x).abs() < 1e-7);

        for projection in [left, right] {
            let mut unshifted = projection;
            unshifted.z_axis.x = 0.0;
            assert!(unshifted.abs_diff_eq(source, 1e-5));
        }
    }

    #[test]
    fn non_positive_focus_gives_parallel_frusta() {
        let perspective = demo_perspective();
        for focus in [0.0, -2.0, f32::NAN] {
            let mut stereo = StereoCamera::new(StereoSettings {
                eye_separation: 0.064,
                focus,
            });
            stereo.update(&perspective, Mat4::IDENTITY);

            for eye in Eye::BOTH {
                let projection = stereo.eye(eye).projection;
                assert!(projection.is_finite(), "focus {focus} gave {projection:?}");
                assert!(projection.abs_diff_eq(perspective.matrix(), 1e-5));
                assert_eq!(projection.z_axis.x, 0.0);
            }
        }
    }

    #[test]
    fn shift_matches_focus_and_separation() {
        let perspective = demo_perspective();
        let mut stereo = StereoCamera::default();
        stereo.update(&perspective, Mat4::IDENTITY);

        let ymax = perspective.near * (perspective.fov_y_radians() * 0.5).tan();
        let e = 0.032 * perspective.near / 10.0;
        let expected = e / (ymax * perspective.aspect);
        assert!((stereo.left().projection.z_axis.x - expected).abs() < 1e-6);
    }

    #[test]
    fn projections_are_cached() {
        let mut perspective = demo_perspective();
        let mut stereo = StereoCamera::default();

        stereo.update(&perspective, Mat4::IDENTITY);
        stereo.update(&perspective, Mat4::from_translation(Vec3::X));
        assert_eq!(stereo.projection_updates(), 1);

        perspective.aspect = 1.0;
        stereo.update(&perspective, Mat4::IDENTITY);
        assert_eq!(stereo.projection_updates(), 2);

        stereo.settings.focus = 5.0;
        stereo.update(&perspective, Mat4::IDENTITY);
        assert_eq!(stereo.projection_updates(), 3);
    }

    #[test]
    fn translating_camera_moves_both_eyes_equally() {
        let perspective = demo_perspective();
        let mut stereo = StereoCamera::default();
        let base = Mat4::from_rotation_translation(Quat::from_rotation_x(0.3), Vec3::new(0.0, 0.0, 3.0));

        stereo.update(&perspective, base);
        let (left_before, right_before) = (stereo.left().position(), stereo.right().position());

        let delta = Vec3::new(0.5, -1.25, 2.0);
        stereo.update(&perspective, Mat4::from_translation(delta) * base);

        assert!((stereo.left().position() - left_before).abs_diff_eq(delta, 1e-5));
        assert!((stereo.right().position() - right_before).abs_diff_eq(delta, 1e-5));
    }
}
