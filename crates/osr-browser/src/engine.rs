//! Engine boundary
//!
//! The engine notifies the UI through two paths only: paints go straight
//! into a `FrameSink` from the engine's render thread, everything else is
//! an `EngineEvent` on a channel drained by the UI thread.

use crate::input::{KeyEvent, MouseButton, MouseEvent};
use crossbeam_channel::Sender;
use osr_frame::FrameSink;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Shared handle to the live browser.
pub type Browser = Arc<dyn BrowserHost>;

/// Unique identifier for a browser instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowserId(pub u64);

impl BrowserId {
    /// Create a new browser ID.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for BrowserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Browser({})", self.0)
    }
}

/// Engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Engine initialization failed: {0}")]
    Initialization(String),

    #[error("Engine is already initialized")]
    AlreadyInitialized,

    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Failed to create browser: {0}")]
    BrowserCreation(String),
}

/// Engine log verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Verbose,
    Info,
    Warning,
    Error,
    Disable,
}

impl Default for LogSeverity {
    fn default() -> Self {
        LogSeverity::Info
    }
}

/// Process-wide engine settings, handed to the engine verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Render into memory instead of native windows
    pub windowless_rendering_enabled: bool,
    /// Run without the engine's sandbox helper
    pub no_sandbox: bool,
    /// Disk cache directory
    pub root_cache_path: PathBuf,
    /// Engine log verbosity
    pub log_severity: LogSeverity,
    /// Engine log file
    pub log_file: PathBuf,
    /// Locale pack directory
    pub locales_dir_path: PathBuf,
    /// Resource pack directory
    pub resources_dir_path: PathBuf,
    /// Extra command-line switches, without leading dashes
    pub command_line_switches: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            windowless_rendering_enabled: true,
            no_sandbox: true,
            root_cache_path: PathBuf::from("./cef_cache"),
            log_severity: LogSeverity::Info,
            log_file: PathBuf::from("./debug.log"),
            locales_dir_path: PathBuf::from("./locales"),
            resources_dir_path: PathBuf::from("."),
            // The engine composites on the CPU; our own device does the GPU work
            command_line_switches: vec![
                "disable-gpu".to_string(),
                "disable-gpu-compositing".to_string(),
                "disable-software-rasterizer".to_string(),
            ],
        }
    }
}

/// Per-browser settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    /// Target paint rate for offscreen rendering
    pub windowless_frame_rate: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            windowless_frame_rate: 60,
        }
    }
}

/// Notifications from the engine, consumed on the UI thread.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Engine context is ready
    ContextInitialized,
    /// A browser was created; its handle is valid from now on
    Created(Browser),
    /// A browser is closing; its handle must be dropped
    Closing(Browser),
    /// Main frame URL changed
    AddressChanged(String),
    /// Page title changed
    TitleChanged(String),
    /// Loading state or history availability changed
    LoadingStateChanged {
        loading: bool,
        can_go_back: bool,
        can_go_forward: bool,
    },
}

/// Operations on one browser instance.
///
/// All methods are fire-and-forget: results come back, if at all, as
/// `EngineEvent`s or paints.
pub trait BrowserHost: Send + Sync + fmt::Debug {
    /// Identity of this browser.
    fn id(&self) -> BrowserId;

    /// Load `url` in the main frame.
    fn load_url(&self, url: &str);

    /// Navigate back in history.
    fn go_back(&self);

    /// Navigate forward in history.
    fn go_forward(&self);

    /// Reload the current page.
    fn reload(&self);

    fn can_go_back(&self) -> bool;

    fn can_go_forward(&self) -> bool;

    /// The viewport size changed; the engine should query it and repaint.
    fn was_resized(&self);

    /// Give or take keyboard focus.
    fn set_focus(&self, focus: bool);

    fn send_mouse_move(&self, event: &MouseEvent, mouse_leave: bool);

    /// Press (`mouse_up == false`) or release of `button`.
    fn send_mouse_click(&self, event: &MouseEvent, button: MouseButton, mouse_up: bool, click_count: u32);

    fn send_mouse_wheel(&self, event: &MouseEvent, delta_x: i32, delta_y: i32);

    fn send_key_event(&self, event: &KeyEvent);

    /// Ask the browser to close. A `Closing` event follows.
    fn close(&self);
}

/// A browser engine driven from the UI thread.
pub trait BrowserEngine {
    /// Start the engine. Paints go to `sink`, notifications to `events`.
    fn initialize(
        &mut self,
        settings: &EngineSettings,
        sink: Arc<dyn FrameSink>,
        events: Sender<EngineEvent>,
    ) -> Result<(), EngineError>;

    /// Request a new browser loading `url`.
    ///
    /// Creation is asynchronous: the handle arrives as `EngineEvent::Created`.
    fn create_browser(&mut self, url: &str, settings: &BrowserSettings) -> Result<(), EngineError>;

    /// Run one slice of engine work. Must be called once per UI frame.
    fn do_message_loop_work(&mut self);

    /// Close every browser and stop the engine.
    fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_settings_default() {
        let settings = EngineSettings::default();
        assert!(settings.windowless_rendering_enabled);
        assert!(settings.no_sandbox);
        assert_eq!(settings.root_cache_path, PathBuf::from("./cef_cache"));
        assert!(settings.command_line_switches.iter().any(|s| s == "disable-gpu"));
    }

    #[test]
    fn test_browser_settings_default() {
        assert_eq!(BrowserSettings::default().windowless_frame_rate, 60);
    }

    #[test]
    fn test_browser_id_display() {
        assert_eq!(BrowserId::new(7).to_string(), "Browser(7)");
    }
}
