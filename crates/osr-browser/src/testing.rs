//! Test doubles

use crate::engine::{BrowserHost, BrowserId};
use crate::input::{KeyEvent, MouseButton, MouseEvent};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub enum HostCall {
    Load(String),
    Back,
    Forward,
    Reload,
    Resized,
    Focus(bool),
    Move(MouseEvent),
    Click(MouseEvent, MouseButton, bool),
    Wheel(i32, i32),
    Key(KeyEvent),
    Close,
}

/// Host that records every call
#[derive(Debug)]
pub struct RecordingHost {
    id: BrowserId,
    calls: Mutex<Vec<HostCall>>,
}

impl RecordingHost {
    pub fn new(id: u64) -> Self {
        Self {
            id: BrowserId::new(id),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<HostCall> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: HostCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl BrowserHost for RecordingHost {
    fn id(&self) -> BrowserId {
        self.id
    }

    fn load_url(&self, url: &str) {
        self.record(HostCall::Load(url.to_string()));
    }

    fn go_back(&self) {
        self.record(HostCall::Back);
    }

    fn go_forward(&self) {
        self.record(HostCall::Forward);
    }

    fn reload(&self) {
        self.record(HostCall::Reload);
    }

    fn can_go_back(&self) -> bool {
        false
    }

    fn can_go_forward(&self) -> bool {
        false
    }

    fn was_resized(&self) {
        self.record(HostCall::Resized);
    }

    fn set_focus(&self, focus: bool) {
        self.record(HostCall::Focus(focus));
    }

    fn send_mouse_move(&self, event: &MouseEvent, _mouse_leave: bool) {
        self.record(HostCall::Move(*event));
    }

    fn send_mouse_click(&self, event: &MouseEvent, button: MouseButton, mouse_up: bool, _click_count: u32) {
        self.record(HostCall::Click(*event, button, mouse_up));
    }

    fn send_mouse_wheel(&self, _event: &MouseEvent, delta_x: i32, delta_y: i32) {
        self.record(HostCall::Wheel(delta_x, delta_y));
    }

    fn send_key_event(&self, event: &KeyEvent) {
        self.record(HostCall::Key(*event));
    }

    fn close(&self) {
        self.record(HostCall::Close);
    }
}
