//! Keyboard and mouse state accumulated between frames.

use std::collections::HashSet;

use winit::event::{ElementState, MouseScrollDelta, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::keyboard::KeyCode;

/// Pixels of trackpad scroll treated as one wheel line.
const PIXELS_PER_LINE: f32 = 40.0;

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

/// Input collected from window events.
///
/// Call [`InputState::begin_frame`] once per frame after reading the
/// per-frame values (`just_pressed`, deltas).
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    cursor: Option<(f32, f32)>,
    /// Cursor movement summed over the frame.
    mouse_delta: (f32, f32),
    /// Wheel movement in lines, summed over the frame.
    scroll_lines: f32,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears the per-frame state.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.mouse_delta = (0.0, 0.0);
        self.scroll_lines = 0.0;
    }

    /// Feeds a window event. Returns `true` if it was an input event.
    pub fn handle_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.on_key_pressed(key),
                        ElementState::Released => self.on_key_released(key),
                    }
                }
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButton::from(*button);
                match state {
                    ElementState::Pressed => self.pressed_buttons.insert(button),
                    ElementState::Released => self.pressed_buttons.remove(&button),
                };
                true
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.on_cursor_moved(position.x as f32, position.y as f32);
                true
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                true
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.scroll_lines += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / PIXELS_PER_LINE,
                };
                true
            }
            WindowEvent::Focused(false) => {
                self.pressed_keys.clear();
                self.pressed_buttons.clear();
                true
            }
            _ => false,
        }
    }

    pub fn on_key_pressed(&mut self, key: KeyCode) {
        // Key repeat re-sends Pressed; only the first one counts.
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    /// Accumulates movement. The first position after entering the window
    /// produces no delta.
    pub fn on_cursor_moved(&mut self, x: f32, y: f32) {
        if let Some((old_x, old_y)) = self.cursor {
            self.mouse_delta.0 += x - old_x;
            self.mouse_delta.1 += y - old_y;
        }
        self.cursor = Some((x, y));
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_delta(&self) -> (f32, f32) {
        self.mouse_delta
    }

    pub fn scroll_lines(&self) -> f32 {
        self.scroll_lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_repeat_counts_once() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyF);
        input.begin_frame();
        input.on_key_pressed(KeyCode::KeyF);
        assert!(input.is_key_pressed(KeyCode::KeyF));
        assert!(!input.is_key_just_pressed(KeyCode::KeyF));

        input.on_key_released(KeyCode::KeyF);
        input.on_key_pressed(KeyCode::KeyF);
        assert!(input.is_key_just_pressed(KeyCode::KeyF));
    }

    #[test]
    fn test_mouse_delta_accumulates_per_frame() {
        let mut input = InputState::new();
        input.on_cursor_moved(100.0, 100.0);
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
        input.on_cursor_moved(110.0, 95.0);
        input.on_cursor_moved(115.0, 90.0);
        assert_eq!(input.mouse_delta(), (15.0, -10.0));
        input.begin_frame();
        assert_eq!(input.mouse_delta(), (0.0, 0.0));
    }

    #[test]
    fn test_begin_frame_keeps_held_state() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::Space);
        input.pressed_buttons.insert(MouseButton::Left);
        input.scroll_lines = 2.0;
        input.begin_frame();
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_mouse_pressed(MouseButton::Left));
        assert_eq!(input.scroll_lines(), 0.0);
    }
}
