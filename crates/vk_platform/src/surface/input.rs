//! Input event queues filled by the surface thread
//!
//! The surface thread pushes window events as they arrive; the host drains
//! each queue in arrival order with a `consume_*` call.

use std::collections::VecDeque;
use std::sync::Mutex;

use glfw::{Action, WindowEvent};

use crate::foundation::sync::lock;

/// Button or key transition
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputAction {
    /// Released
    Release = 0,
    /// Pressed
    Press = 1,
    /// Held long enough to auto-repeat
    Repeat = 2,
}

impl From<Action> for InputAction {
    fn from(action: Action) -> Self {
        match action {
            Action::Release => Self::Release,
            Action::Press => Self::Press,
            Action::Repeat => Self::Repeat,
        }
    }
}

/// Keyboard input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyboardEvent {
    /// Physical key transition by platform scancode
    Key {
        /// Platform scancode
        scancode: i32,
        /// Transition
        action: InputAction,
    },
    /// Text input
    Char(char),
}

/// Mouse button transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseButtonEvent {
    /// Zero-based button index
    pub button: i32,
    /// Release or press
    pub action: InputAction,
}

/// Cursor moved to a position in window coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CursorEvent {
    /// Horizontal position
    pub x: f64,
    /// Vertical position
    pub y: f64,
}

/// Scroll offset
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollEvent {
    /// Horizontal offset
    pub x: f64,
    /// Vertical offset
    pub y: f64,
}

/// FIFO queues of input events for one surface
#[derive(Debug, Default)]
pub struct SurfaceInputContext {
    keyboard: Mutex<VecDeque<KeyboardEvent>>,
    mouse_buttons: Mutex<VecDeque<MouseButtonEvent>>,
    cursor: Mutex<VecDeque<CursorEvent>>,
    scroll: Mutex<VecDeque<ScrollEvent>>,
}

fn drain<T>(queue: &Mutex<VecDeque<T>>, mut consumer: impl FnMut(T)) -> usize {
    let events = std::mem::take(&mut *lock(queue));
    let count = events.len();
    events.into_iter().for_each(&mut consumer);
    count
}

impl SurfaceInputContext {
    /// Empty queues
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an input event; returns false for non-input window events
    pub fn push_window_event(&self, event: &WindowEvent) -> bool {
        match *event {
            WindowEvent::Key(_, scancode, action, _) => {
                self.push_keyboard(KeyboardEvent::Key {
                    scancode,
                    action: action.into(),
                });
            }
            WindowEvent::Char(c) => self.push_keyboard(KeyboardEvent::Char(c)),
            WindowEvent::MouseButton(button, action, _) => {
                lock(&self.mouse_buttons).push_back(MouseButtonEvent {
                    button: button as i32,
                    action: action.into(),
                });
            }
            WindowEvent::CursorPos(x, y) => lock(&self.cursor).push_back(CursorEvent { x, y }),
            WindowEvent::Scroll(x, y) => lock(&self.scroll).push_back(ScrollEvent { x, y }),
            _ => return false,
        }
        true
    }

    /// Queue a keyboard event
    pub fn push_keyboard(&self, event: KeyboardEvent) {
        lock(&self.keyboard).push_back(event);
    }

    /// Drain keyboard events in arrival order, returning how many were consumed
    pub fn consume_keyboard(&self, consumer: impl FnMut(KeyboardEvent)) -> usize {
        drain(&self.keyboard, consumer)
    }

    /// Drain mouse button events
    pub fn consume_mouse_buttons(&self, consumer: impl FnMut(MouseButtonEvent)) -> usize {
        drain(&self.mouse_buttons, consumer)
    }

    /// Drain cursor movement
    pub fn consume_cursor(&self, consumer: impl FnMut(CursorEvent)) -> usize {
        drain(&self.cursor, consumer)
    }

    /// Drain scroll events
    pub fn consume_scroll(&self, consumer: impl FnMut(ScrollEvent)) -> usize {
        drain(&self.scroll, consumer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glfw::{Key, Modifiers, MouseButton};

    #[test]
    fn test_keyboard_events_in_order() {
        let input = SurfaceInputContext::new();
        assert!(input.push_window_event(&WindowEvent::Key(
            Key::A,
            30,
            Action::Press,
            Modifiers::empty()
        )));
        assert!(input.push_window_event(&WindowEvent::Char('a')));
        assert!(input.push_window_event(&WindowEvent::Key(
            Key::A,
            30,
            Action::Release,
            Modifiers::empty()
        )));

        let mut seen = Vec::new();
        assert_eq!(input.consume_keyboard(|event| seen.push(event)), 3);
        assert_eq!(
            seen,
            vec![
                KeyboardEvent::Key {
                    scancode: 30,
                    action: InputAction::Press
                },
                KeyboardEvent::Char('a'),
                KeyboardEvent::Key {
                    scancode: 30,
                    action: InputAction::Release
                },
            ]
        );
        assert_eq!(input.consume_keyboard(|_| panic!("queue should be empty")), 0);
    }

    #[test]
    fn test_queues_are_independent() {
        let input = SurfaceInputContext::new();
        input.push_window_event(&WindowEvent::MouseButton(
            MouseButton::Button2,
            Action::Press,
            Modifiers::empty(),
        ));
        input.push_window_event(&WindowEvent::CursorPos(10.0, 20.5));
        input.push_window_event(&WindowEvent::Scroll(0.0, -1.0));

        let mut buttons = Vec::new();
        input.consume_mouse_buttons(|event| buttons.push(event));
        assert_eq!(
            buttons,
            vec![MouseButtonEvent {
                button: 1,
                action: InputAction::Press
            }]
        );

        let mut cursor = Vec::new();
        input.consume_cursor(|event| cursor.push(event));
        assert_eq!(cursor, vec![CursorEvent { x: 10.0, y: 20.5 }]);

        let mut scroll = Vec::new();
        input.consume_scroll(|event| scroll.push(event));
        assert_eq!(scroll, vec![ScrollEvent { x: 0.0, y: -1.0 }]);
        assert_eq!(input.consume_keyboard(|_| {}), 0);
    }

    #[test]
    fn test_non_input_events_ignored() {
        let input = SurfaceInputContext::new();
        assert!(!input.push_window_event(&WindowEvent::FramebufferSize(640, 480)));
        assert!(!input.push_window_event(&WindowEvent::Close));
    }
}
