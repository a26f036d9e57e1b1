// src/voxel/camera.rs
//! Camera abstraction for [`crate::voxel::visibility::VisibilityCalculator`]
//! (SPEC_FULL.md §4.2).
//!
//! Grounded on `examples/gugu8intel-i9-Slop-Engine/src/camera.rs` for the struct shape
//! (position/yaw/pitch, view/projection matrix builders), generalized from `f32`/`Mat4`
//! to `f64`/`DMat4` per SPEC_FULL.md's double-precision requirement at `2^32`-scale
//! lattice coordinates, and extended with the frustum side-plane normals that
//! `findVisibleOctreeNodes` needs (`examples/original_source/src/library/rendering.cpp`,
//! the `sideStatus`/`*NORMAL` constants near the start of `processNode`).

use glam::{DMat4, DVec3};

/// Everything the visibility walk needs to know about the viewer.
///
/// Implemented by [`Camera`] itself for the common case; host applications that already
/// track a camera some other way can implement this directly instead of constructing one.
pub trait CameraView {
    /// World-to-view transform.
    fn view_matrix(&self) -> DMat4;
    /// View-to-clip transform.
    fn proj_matrix(&self) -> DMat4;
    /// World-space eye position.
    fn position(&self) -> DVec3;
    /// Outward-pointing normals of the four side planes of the view frustum, in view
    /// space (left, right, bottom, top), used for the frustum cull in `process_node`.
    fn side_plane_normals_view(&self) -> [DVec3; 4];
}

/// A perspective camera tracked by position, yaw and pitch (radians), matching the
/// teacher's `Camera` but carried in `f64` throughout.
#[derive(Clone, Copy, Debug)]
pub struct Camera {
    pub position: DVec3,
    pub yaw: f64,
    pub pitch: f64,
    pub fov_y_radians: f64,
    pub aspect_ratio: f64,
    pub near: f64,
    pub far: f64,
}

impl Camera {
    pub fn new(position: DVec3, yaw: f64, pitch: f64, aspect_ratio: f64) -> Self {
        Self {
            position,
            yaw,
            pitch,
            fov_y_radians: std::f64::consts::FRAC_PI_4,
            aspect_ratio,
            near: 1.0,
            far: 1.0e9,
        }
    }

    /// Forward-facing unit vector derived from yaw/pitch.
    pub fn forward(&self) -> DVec3 {
        DVec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize()
    }

    fn up(&self) -> DVec3 {
        DVec3::Y
    }
}

impl CameraView for Camera {
    fn view_matrix(&self) -> DMat4 {
        DMat4::look_to_rh(self.position, self.forward(), self.up())
    }

    fn proj_matrix(&self) -> DMat4 {
        DMat4::perspective_rh(self.fov_y_radians, self.aspect_ratio, self.near, self.far)
    }

    fn position(&self) -> DVec3 {
        self.position
    }

    fn side_plane_normals_view(&self) -> [DVec3; 4] {
        let half_height = (self.fov_y_radians * 0.5).tan();
        let half_width = half_height * self.aspect_ratio;

        // View space: camera looks down -Z, +X right, +Y up. Each normal points inward
        // (toward the frustum interior) so `dot(normal, point) >= 0` means "inside".
        let left = DVec3::new(1.0, 0.0, -half_width).normalize();
        let right = DVec3::new(-1.0, 0.0, -half_width).normalize();
        let bottom = DVec3::new(0.0, 1.0, -half_height).normalize();
        let top = DVec3::new(0.0, -1.0, -half_height).normalize();
        [left, right, bottom, top]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_is_unit_length() {
        let cam = Camera::new(DVec3::ZERO, 0.3, -0.2, 16.0 / 9.0);
        assert!((cam.forward().length() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn side_plane_normals_are_unit_length() {
        let cam = Camera::new(DVec3::ZERO, 0.0, 0.0, 1.0);
        for n in cam.side_plane_normals_view() {
            assert!((n.length() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn view_matrix_moves_eye_to_origin() {
        let cam = Camera::new(DVec3::new(10.0, 0.0, 0.0), 0.0, 0.0, 1.0);
        let view = cam.view_matrix();
        let transformed = view.transform_point3(cam.position);
        assert!(transformed.length() < 1e-9);
    }
}
