// src/camera.rs
// Free-flight camera: view-pyramid basis for ray generation, jittered
// view/projection matrices for rasterized primaries and TAA reprojection.

use glam::{Mat4, Quat, Vec2, Vec3};

use crate::input::{Input, Key};

const MOVEMENT_SPEED: f32 = 10.0;
const ROTATION_SPEED: f32 = 3.0;

/// Sub-pixel jitter sequence used while TAA is enabled.
const HALTON_X: [f32; 4] = [0.3, 0.7, 0.2, 0.8];
const HALTON_Y: [f32; 4] = [0.2, 0.8, 0.7, 0.3];

pub struct Camera {
    pub position: Vec3,
    pub rotation: Quat,

    pub fov: f32,
    pub near: f32,
    pub far: f32,

    inv_width: f32,
    inv_height: f32,

    // Viewing pyramid in camera space; rotated copies feed ray generation.
    bottom_left_corner: Vec3,
    x_axis: Vec3,
    y_axis: Vec3,

    pub bottom_left_corner_rotated: Vec3,
    pub x_axis_rotated: Vec3,
    pub y_axis_rotated: Vec3,

    projection: Mat4,
    pub view_projection: Mat4,
    pub view_projection_prev: Mat4,

    pub jitter: Vec2,
    jitter_index: usize,

    pub moved: bool,
}

impl Camera {
    pub fn new(fov: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            fov,
            near: 0.1,
            far: 300.0,
            inv_width: 0.0,
            inv_height: 0.0,
            bottom_left_corner: Vec3::ZERO,
            x_axis: Vec3::X,
            y_axis: Vec3::Y,
            bottom_left_corner_rotated: Vec3::ZERO,
            x_axis_rotated: Vec3::X,
            y_axis_rotated: Vec3::Y,
            projection: Mat4::IDENTITY,
            view_projection: Mat4::IDENTITY,
            view_projection_prev: Mat4::IDENTITY,
            jitter: Vec2::ZERO,
            jitter_index: 0,
            moved: false,
        }
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.inv_width = 1.0 / width as f32;
        self.inv_height = 1.0 / height as f32;

        let half_width = 0.5 * width as f32;
        let half_height = 0.5 * height as f32;

        // Distance to the viewing plane
        let d = half_height / (0.5 * self.fov).tan();

        self.bottom_left_corner = Vec3::new(-half_width, -half_height, -d);
        self.x_axis = Vec3::X;
        self.y_axis = Vec3::Y;

        self.projection =
            Mat4::perspective_rh(self.fov, half_width / half_height, self.near, self.far);
    }

    pub fn update(&mut self, delta: f32, apply_jitter: bool, input: &Input) {
        if apply_jitter {
            self.jitter = Vec2::new(
                (HALTON_X[self.jitter_index] * 2.0 - 1.0) * self.inv_width,
                (HALTON_Y[self.jitter_index] * 2.0 - 1.0) * self.inv_height,
            );
        } else {
            self.jitter = Vec2::ZERO;
        }

        self.jitter_index = (self.jitter_index + 1) & 3;

        // Previous view projection uses last frame's pose but the CURRENT
        // jitter, keeping TAA reprojection consistent.
        self.view_projection_prev = self.projection
            * Mat4::from_quat(self.rotation.conjugate())
            * Mat4::from_translation(-self.position);

        self.moved = false;

        let right = self.rotation * Vec3::X;
        let forward = self.rotation * Vec3::NEG_Z;

        if input.is_key_down(Key::W) {
            self.position += forward * MOVEMENT_SPEED * delta;
            self.moved = true;
        }
        if input.is_key_down(Key::A) {
            self.position -= right * MOVEMENT_SPEED * delta;
            self.moved = true;
        }
        if input.is_key_down(Key::S) {
            self.position -= forward * MOVEMENT_SPEED * delta;
            self.moved = true;
        }
        if input.is_key_down(Key::D) {
            self.position += right * MOVEMENT_SPEED * delta;
            self.moved = true;
        }

        if input.is_key_down(Key::LShift) {
            self.position.y -= MOVEMENT_SPEED * delta;
            self.moved = true;
        }
        if input.is_key_down(Key::Space) {
            self.position.y += MOVEMENT_SPEED * delta;
            self.moved = true;
        }

        if input.is_key_down(Key::Up) {
            self.rotation = Quat::from_axis_angle(right, ROTATION_SPEED * delta) * self.rotation;
            self.moved = true;
        }
        if input.is_key_down(Key::Down) {
            self.rotation = Quat::from_axis_angle(right, -ROTATION_SPEED * delta) * self.rotation;
            self.moved = true;
        }
        if input.is_key_down(Key::Left) {
            self.rotation = Quat::from_axis_angle(Vec3::Y, ROTATION_SPEED * delta) * self.rotation;
            self.moved = true;
        }
        if input.is_key_down(Key::Right) {
            self.rotation = Quat::from_axis_angle(Vec3::Y, -ROTATION_SPEED * delta) * self.rotation;
            self.moved = true;
        }

        if input.is_key_pressed(Key::F) {
            println!(
                "camera.position = Vec3::new({:?}, {:?}, {:?});",
                self.position.x, self.position.y, self.position.z
            );
            println!(
                "camera.rotation = Quat::from_xyzw({:?}, {:?}, {:?}, {:?});",
                self.rotation.x, self.rotation.y, self.rotation.z, self.rotation.w
            );
        }

        self.bottom_left_corner_rotated = self.rotation * self.bottom_left_corner;
        self.x_axis_rotated = self.rotation * self.x_axis;
        self.y_axis_rotated = self.rotation * self.y_axis;

        self.view_projection = self.projection
            * Mat4::from_quat(self.rotation.conjugate())
            * Mat4::from_translation(-self.position);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_places_viewing_plane() {
        let mut camera = Camera::new(90.0_f32.to_radians());
        camera.resize(200, 100);

        // d = (h/2) / tan(fov/2); tan(45 deg) == 1
        assert!((camera.bottom_left_corner.z - (-50.0)).abs() < 1e-4);
        assert_eq!(camera.bottom_left_corner.x, -100.0);
        assert_eq!(camera.bottom_left_corner.y, -50.0);
        assert_eq!(camera.x_axis, Vec3::X);
        assert_eq!(camera.y_axis, Vec3::Y);
    }

    #[test]
    fn jitter_cycles_through_halton_sequence() {
        let mut camera = Camera::new(1.0);
        camera.resize(100, 100);
        let input = Input::new();

        let mut xs = Vec::new();
        for _ in 0..5 {
            camera.update(0.016, true, &input);
            xs.push(camera.jitter.x);
        }

        let expect = |h: f32| (2.0 * h - 1.0) / 100.0;
        assert!((xs[0] - expect(0.3)).abs() < 1e-6);
        assert!((xs[1] - expect(0.7)).abs() < 1e-6);
        assert!((xs[2] - expect(0.2)).abs() < 1e-6);
        assert!((xs[3] - expect(0.8)).abs() < 1e-6);
        // Index wraps mod 4
        assert!((xs[4] - xs[0]).abs() < 1e-6);
    }

    #[test]
    fn jitter_disabled_is_zero() {
        let mut camera = Camera::new(1.0);
        camera.resize(64, 64);
        let input = Input::new();
        camera.update(0.016, false, &input);
        assert_eq!(camera.jitter, Vec2::ZERO);
    }

    #[test]
    fn update_without_input_is_stationary_and_deterministic() {
        let mut a = Camera::new(1.2);
        let mut b = Camera::new(1.2);
        a.resize(320, 240);
        b.resize(320, 240);
        let input = Input::new();

        for _ in 0..3 {
            a.update(0.02, true, &input);
            b.update(0.02, true, &input);
        }
        assert!(!a.moved);
        assert_eq!(a.position, b.position);
        assert_eq!(a.view_projection, b.view_projection);
    }

    #[test]
    fn prev_view_projection_lags_by_one_update() {
        let mut camera = Camera::new(1.0);
        camera.resize(100, 100);
        let mut input = Input::new();

        camera.update(0.1, false, &input);
        let vp_frame0 = camera.view_projection;

        input.begin_frame();
        input.set_key(Key::W, true);
        camera.update(0.1, false, &input);

        assert!(camera.moved);
        assert_eq!(camera.view_projection_prev, vp_frame0);
        assert_ne!(camera.view_projection, vp_frame0);
    }
}
