//! Input forwarding
//!
//! Each UI frame the shell snapshots pointer and keyboard state over the
//! browser image into a `PointerFrame`; `InputForwarder` turns it into
//! engine input events. One notification per detected transition, no
//! coalescing.

use crate::engine::BrowserHost;
use bitflags::bitflags;
use tracing::trace;

/// Pixels scrolled per wheel notch.
pub const DEFAULT_WHEEL_MULTIPLIER: f32 = 120.0;

bitflags! {
    /// Modifier and button state attached to every input event
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct EventFlags: u32 {
        const CAPS_LOCK_ON = 1 << 0;
        const SHIFT_DOWN = 1 << 1;
        const CONTROL_DOWN = 1 << 2;
        const ALT_DOWN = 1 << 3;
        const LEFT_MOUSE_BUTTON = 1 << 4;
        const MIDDLE_MOUSE_BUTTON = 1 << 5;
        const RIGHT_MOUSE_BUTTON = 1 << 6;
    }
}

impl EventFlags {
    /// Map keyboard modifier state.
    pub fn from_modifiers(ctrl: bool, shift: bool, alt: bool) -> Self {
        let mut flags = EventFlags::empty();
        flags.set(EventFlags::CONTROL_DOWN, ctrl);
        flags.set(EventFlags::SHIFT_DOWN, shift);
        flags.set(EventFlags::ALT_DOWN, alt);
        flags
    }
}

/// Mouse buttons understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

impl MouseButton {
    /// Flag set while this button is held.
    pub fn flag(self) -> EventFlags {
        match self {
            Self::Left => EventFlags::LEFT_MOUSE_BUTTON,
            Self::Middle => EventFlags::MIDDLE_MOUSE_BUTTON,
            Self::Right => EventFlags::RIGHT_MOUSE_BUTTON,
        }
    }
}

/// Pointer position in frame pixels plus modifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MouseEvent {
    pub x: i32,
    pub y: i32,
    pub modifiers: EventFlags,
}

/// Key event flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyEventKind {
    RawKeyDown,
    KeyDown,
    KeyUp,
    /// Text input; `character` carries the code point
    Char,
}

/// Keyboard event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub kind: KeyEventKind,
    pub character: char,
    pub unmodified_character: char,
    pub modifiers: EventFlags,
}

impl KeyEvent {
    /// A character-class event for typed text.
    pub fn char(character: char, modifiers: EventFlags) -> Self {
        Self {
            kind: KeyEventKind::Char,
            character,
            unmodified_character: character,
            modifiers,
        }
    }
}

/// Press/release transitions of one button during a UI frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ButtonEdges {
    pub pressed: bool,
    pub released: bool,
}

/// Input collected over the browser image during one UI frame
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PointerFrame {
    /// Pointer x relative to the image's top-left corner, in frame pixels
    pub x: f32,
    /// Pointer y relative to the image's top-left corner, in frame pixels
    pub y: f32,
    pub ctrl: bool,
    pub shift: bool,
    pub alt: bool,
    pub left: ButtonEdges,
    pub right: ButtonEdges,
    /// Wheel movement in notches (lines)
    pub wheel_lines: (f32, f32),
    /// Wheel movement already in pixels (touchpads)
    pub wheel_pixels: (f32, f32),
    /// Characters typed this frame, in order
    pub text: Vec<char>,
}

impl PointerFrame {
    /// Pointer at `(x, y)` with nothing else going on.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            ..Default::default()
        }
    }

    /// Engine modifier flags for this frame.
    pub fn modifiers(&self) -> EventFlags {
        EventFlags::from_modifiers(self.ctrl, self.shift, self.alt)
    }
}

/// Translates `PointerFrame`s into engine input events
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputForwarder {
    wheel_multiplier: f32,
}

impl Default for InputForwarder {
    fn default() -> Self {
        Self::new(DEFAULT_WHEEL_MULTIPLIER)
    }
}

impl InputForwarder {
    pub fn new(wheel_multiplier: f32) -> Self {
        Self { wheel_multiplier }
    }

    pub fn wheel_multiplier(&self) -> f32 {
        self.wheel_multiplier
    }

    /// Forward one frame of input to `host`.
    ///
    /// `bounds` is the displayed frame size in pixels; a pointer outside
    /// it forwards nothing. Returns the number of input notifications
    /// sent (move, click, wheel, key); the `set_focus` that accompanies a
    /// left press is not counted.
    pub fn forward(&self, input: &PointerFrame, bounds: (u32, u32), host: &dyn BrowserHost) -> usize {
        if !Self::contains(input, bounds) {
            return 0;
        }

        let event = MouseEvent {
            x: input.x as i32,
            y: input.y as i32,
            modifiers: input.modifiers(),
        };
        let mut sent = 0;

        host.send_mouse_move(&event, false);
        sent += 1;

        if input.left.pressed {
            host.send_mouse_click(&event, MouseButton::Left, false, 1);
            host.set_focus(true);
            sent += 1;
        }
        if input.left.released {
            host.send_mouse_click(&event, MouseButton::Left, true, 1);
            sent += 1;
        }
        if input.right.pressed {
            host.send_mouse_click(&event, MouseButton::Right, false, 1);
            sent += 1;
        }
        if input.right.released {
            host.send_mouse_click(&event, MouseButton::Right, true, 1);
            sent += 1;
        }

        let (dx, dy) = self.wheel_delta(input);
        if dx != 0 || dy != 0 {
            host.send_mouse_wheel(&event, dx, dy);
            sent += 1;
        }

        for &c in &input.text {
            host.send_key_event(&KeyEvent::char(c, event.modifiers));
            sent += 1;
        }

        trace!("Forwarded {} input events to {}", sent, host.id());
        sent
    }

    /// Combined wheel delta in engine pixels.
    pub fn wheel_delta(&self, input: &PointerFrame) -> (i32, i32) {
        let dx = input.wheel_lines.0 * self.wheel_multiplier + input.wheel_pixels.0;
        let dy = input.wheel_lines.1 * self.wheel_multiplier + input.wheel_pixels.1;
        (dx as i32, dy as i32)
    }

    fn contains(input: &PointerFrame, (width, height): (u32, u32)) -> bool {
        input.x >= 0.0 && input.y >= 0.0 && input.x < width as f32 && input.y < height as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{HostCall, RecordingHost};

    #[test]
    fn test_modifier_mapping() {
        assert_eq!(EventFlags::from_modifiers(false, false, false), EventFlags::empty());
        let all = EventFlags::from_modifiers(true, true, true);
        assert!(all.contains(EventFlags::CONTROL_DOWN | EventFlags::SHIFT_DOWN | EventFlags::ALT_DOWN));
        assert_eq!(all.bits(), 0b1110);
    }

    #[test]
    fn test_move_always_forwarded() {
        let host = RecordingHost::new(1);
        let sent = InputForwarder::default().forward(&PointerFrame::at(12.7, 30.2), (100, 100), &host);

        assert_eq!(sent, 1);
        assert_eq!(
            host.calls(),
            vec![HostCall::Move(MouseEvent { x: 12, y: 30, modifiers: EventFlags::empty() })]
        );
    }

    #[test]
    fn test_outside_bounds_forwards_nothing() {
        let host = RecordingHost::new(1);
        let forwarder = InputForwarder::default();

        assert_eq!(forwarder.forward(&PointerFrame::at(-1.0, 5.0), (100, 100), &host), 0);
        assert_eq!(forwarder.forward(&PointerFrame::at(100.0, 5.0), (100, 100), &host), 0);
        assert_eq!(forwarder.forward(&PointerFrame::at(5.0, 100.0), (100, 100), &host), 0);
        assert!(host.calls().is_empty());
    }

    #[test]
    fn test_click_transitions() {
        let host = RecordingHost::new(1);
        let input = PointerFrame {
            left: ButtonEdges { pressed: true, released: false },
            right: ButtonEdges { pressed: false, released: true },
            ctrl: true,
            ..PointerFrame::at(3.0, 4.0)
        };

        let sent = InputForwarder::default().forward(&input, (10, 10), &host);
        assert_eq!(sent, 3);

        let event = MouseEvent { x: 3, y: 4, modifiers: EventFlags::CONTROL_DOWN };
        assert_eq!(
            host.calls(),
            vec![
                HostCall::Move(event),
                HostCall::Click(event, MouseButton::Left, false),
                HostCall::Focus(true),
                HostCall::Click(event, MouseButton::Right, true),
            ]
        );
    }

    #[test]
    fn test_focus_call_not_counted() {
        let host = RecordingHost::new(1);
        let input = PointerFrame {
            left: ButtonEdges { pressed: true, released: false },
            ..PointerFrame::at(1.0, 1.0)
        };

        let sent = InputForwarder::default().forward(&input, (10, 10), &host);
        let calls = host.calls();
        assert_eq!(sent, 2);
        assert_eq!(calls.len(), 3);
        assert_eq!(calls.iter().filter(|c| matches!(c, HostCall::Focus(_))).count(), 1);
    }

    #[test]
    fn test_press_and_release_same_frame() {
        let host = RecordingHost::new(1);
        let input = PointerFrame {
            left: ButtonEdges { pressed: true, released: true },
            ..PointerFrame::at(0.0, 0.0)
        };

        InputForwarder::default().forward(&input, (10, 10), &host);
        let clicks: Vec<_> = host
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Click(_, button, up) => Some((button, up)),
                _ => None,
            })
            .collect();
        assert_eq!(clicks, vec![(MouseButton::Left, false), (MouseButton::Left, true)]);
    }

    #[test]
    fn test_wheel_scaled() {
        let host = RecordingHost::new(1);
        let input = PointerFrame {
            wheel_lines: (0.0, -2.0),
            ..PointerFrame::at(1.0, 1.0)
        };

        InputForwarder::default().forward(&input, (10, 10), &host);
        assert!(host.calls().contains(&HostCall::Wheel(0, -240)));
    }

    #[test]
    fn test_wheel_custom_multiplier_and_pixels() {
        let forwarder = InputForwarder::new(40.0);
        let input = PointerFrame {
            wheel_lines: (1.0, 0.5),
            wheel_pixels: (3.0, 0.0),
            ..Default::default()
        };
        assert_eq!(forwarder.wheel_delta(&input), (43, 20));
    }

    #[test]
    fn test_no_wheel_event_without_delta() {
        let host = RecordingHost::new(1);
        InputForwarder::default().forward(&PointerFrame::at(1.0, 1.0), (10, 10), &host);
        assert!(!host.calls().iter().any(|c| matches!(c, HostCall::Wheel(..))));
    }

    #[test]
    fn test_text_forwarded_as_chars() {
        let host = RecordingHost::new(1);
        let input = PointerFrame {
            text: vec!['h', 'é'],
            shift: true,
            ..PointerFrame::at(1.0, 1.0)
        };

        let sent = InputForwarder::default().forward(&input, (10, 10), &host);
        assert_eq!(sent, 3);

        let keys: Vec<_> = host
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                HostCall::Key(k) => Some(k),
                _ => None,
            })
            .collect();
        assert_eq!(
            keys,
            vec![
                KeyEvent::char('h', EventFlags::SHIFT_DOWN),
                KeyEvent::char('é', EventFlags::SHIFT_DOWN),
            ]
        );
        assert_eq!(keys[0].kind, KeyEventKind::Char);
    }
}
