//! Keyboard and mouse camera controls.
//!
//! Movement and mouse look are polled from [`InputState`] every frame. The
//! one-shot commands (report pose, reset) arrive through the [`EventBus`] and
//! are applied on the next [`CameraController::update`].

use std::cell::Cell;
use std::rc::Rc;

use tracing::info;
use vkcraft_platform::{EventBus, InputState, KeyCode, MouseButton, Subscription};

use crate::camera::Camera;

/// Units per second.
pub const DEFAULT_MOVE_SPEED: f32 = 1.0;
/// Radians per pixel of mouse drag.
pub const DEFAULT_LOOK_SENSITIVITY: f32 = 0.003;

pub const REPORT_KEY: KeyCode = KeyCode::Space;
pub const RESET_KEY: KeyCode = KeyCode::KeyR;

#[derive(Debug, Default)]
struct PendingCommands {
    report: Cell<bool>,
    reset: Cell<bool>,
}

/// Drives a [`Camera`] from user input.
#[derive(Debug)]
pub struct CameraController {
    pub move_speed: f32,
    pub look_sensitivity: f32,
    pending: Rc<PendingCommands>,
    subscriptions: Vec<Subscription>,
}

impl Default for CameraController {
    fn default() -> Self {
        Self {
            move_speed: DEFAULT_MOVE_SPEED,
            look_sensitivity: DEFAULT_LOOK_SENSITIVITY,
            pending: Rc::new(PendingCommands::default()),
            subscriptions: Vec::new(),
        }
    }
}

impl CameraController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to the report and reset keys. The subscriptions live as
    /// long as the controller.
    pub fn attach(&mut self, bus: &EventBus) {
        let pending = Rc::clone(&self.pending);
        self.subscriptions.push(bus.subscribe(move |event| {
            if event.is_key_press(REPORT_KEY) {
                pending.report.set(true);
            }
        }));

        let pending = Rc::clone(&self.pending);
        self.subscriptions.push(bus.subscribe(move |event| {
            if event.is_key_press(RESET_KEY) {
                pending.reset.set(true);
            }
        }));
    }

    /// Drops every bus subscription.
    pub fn detach(&mut self) {
        self.subscriptions.clear();
    }

    pub fn is_attached(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Applies one frame of input. `delta_seconds` scales movement; mouse
    /// look is per pixel and independent of frame time.
    pub fn update(&self, camera: &mut Camera, input: &InputState, delta_seconds: f32) {
        if self.pending.reset.replace(false) {
            camera.reset();
            info!(
                position = ?camera.position(),
                direction = ?camera.direction(),
                "Camera reset"
            );
        }

        let step = self.move_speed * delta_seconds;
        let axis = |positive: KeyCode, negative: KeyCode| -> f32 {
            let mut value = 0.0;
            if input.is_key_pressed(positive) {
                value += 1.0;
            }
            if input.is_key_pressed(negative) {
                value -= 1.0;
            }
            value
        };

        let forward = axis(KeyCode::KeyW, KeyCode::KeyS);
        let right = axis(KeyCode::KeyD, KeyCode::KeyA);
        let up = axis(KeyCode::KeyE, KeyCode::KeyQ);
        if forward != 0.0 {
            camera.move_forward(forward * step);
        }
        if right != 0.0 {
            camera.move_right(right * step);
        }
        if up != 0.0 {
            camera.move_up(up * step);
        }

        if input.is_mouse_pressed(MouseButton::Left) {
            let (dx, dy) = input.mouse_delta();
            if dx != 0.0 {
                camera.yaw(-dx * self.look_sensitivity);
            }
            if dy != 0.0 {
                camera.pitch(-dy * self.look_sensitivity);
            }
        }

        if self.pending.report.replace(false) {
            info!(
                position = ?camera.position(),
                direction = ?camera.direction(),
                "Camera pose"
            );
        }
    }
}
