//! osr UI - Browser shell
//!
//! Wires the offscreen engine, the frame store, the GPU texture bridge
//! and the egui panel together on a winit event loop:
//! - config: TOML application configuration
//! - context: explicit application state passed to every step
//! - panel: the navigation bar and browser view
//! - shell: window, GPU and the per-frame loop

mod config;
mod context;
mod panel;
mod shell;

pub use config::{AppConfig, BrowserConfig, ConfigError, GpuSection, WindowConfig};
pub use context::{AppContext, PageInfo};
pub use panel::{BrowserView, PanelAction, PanelOutput, PanelState};
pub use shell::{run, BrowserShell};
