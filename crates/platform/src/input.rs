//! Polled keyboard and mouse state.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

use crate::events::{ButtonState, InputEvent};

/// Mouse button identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// Keyboard and mouse state accumulated from [`InputEvent`]s.
///
/// Held keys persist across frames; the `just_*` sets and the mouse delta are
/// cleared by [`InputState::begin_frame`].
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    just_released_keys: HashSet<KeyCode>,

    pressed_buttons: HashSet<MouseButton>,
    just_pressed_buttons: HashSet<MouseButton>,

    mouse_position: Option<(f32, f32)>,
    mouse_delta: (f32, f32),
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.just_pressed_buttons.clear();
        self.mouse_delta = (0.0, 0.0);
    }

    /// Folds one event into the state.
    pub fn apply(&mut self, event: &InputEvent) {
        match *event {
            InputEvent::Key {
                code,
                state: ButtonState::Pressed,
            } => self.on_key_pressed(code),
            InputEvent::Key {
                code,
                state: ButtonState::Released,
            } => self.on_key_released(code),
            InputEvent::MouseButton {
                button,
                state: ButtonState::Pressed,
            } => self.on_mouse_pressed(button),
            InputEvent::MouseButton {
                button,
                state: ButtonState::Released,
            } => self.on_mouse_released(button),
            InputEvent::CursorMoved { x, y } => self.on_mouse_moved(x, y),
            InputEvent::Resized { .. } => {}
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        if self.pressed_keys.remove(&key) {
            self.just_released_keys.insert(key);
        }
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) {
            self.just_pressed_buttons.insert(button);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        self.pressed_buttons.remove(&button);
    }

    /// Records the cursor position. Several moves within one frame accumulate
    /// into a single delta; the first observed position produces no delta.
    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.mouse_position {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.mouse_position = Some((x, y));
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn is_mouse_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> Option<(f32, f32)> {
        self.mouse_position
    }

    /// Cursor movement in pixels since the last [`InputState::begin_frame`].
    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_press_and_release() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyW);
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_pressed(KeyCode::KeyW));

        input.begin_frame();
        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));

        input.on_key_released(KeyCode::KeyW);
        assert!(!input.is_key_pressed(KeyCode::KeyW));
        assert!(input.is_key_just_released(KeyCode::KeyW));
    }

    #[test]
    fn test_repeated_press_is_not_just_pressed_again() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        input.begin_frame();
        input.on_key_pressed(KeyCode::Space);
        assert!(!input.is_key_just_pressed(KeyCode::Space));
    }

    #[test]
    fn test_mouse_delta_accumulates_within_frame() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 10.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));

        input.on_mouse_moved(15.0, 12.0);
        input.on_mouse_moved(20.0, 8.0);
        assert_eq!(input.mouse_delta(), (10.0, -2.0));

        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
        assert_eq!(input.mouse_position(), Some((20.0, 8.0)));
    }

    #[test]
    fn test_apply_events() {
        let mut input = InputState::new();
        input.apply(&InputEvent::MouseButton {
            button: MouseButton::Left,
            state: ButtonState::Pressed,
        });
        input.apply(&InputEvent::Key {
            code: KeyCode::KeyA,
            state: ButtonState::Pressed,
        });
        assert!(input.is_mouse_pressed(MouseButton::Left));
        assert!(input.is_mouse_just_pressed(MouseButton::Left));
        assert!(input.is_key_pressed(KeyCode::KeyA));

        input.apply(&InputEvent::MouseButton {
            button: MouseButton::Left,
            state: ButtonState::Released,
        });
        assert!(!input.is_mouse_pressed(MouseButton::Left));
    }
}
