//! osr Browser - Offscreen browser engine boundary
//!
//! Everything the UI needs to drive a single offscreen browser:
//! - engine: settings, the engine/host traits and the event channel
//! - lifecycle: the slot holding the live browser handle
//! - input: translation of per-frame UI input into engine events
//! - diagnostic: a built-in engine painting a synthetic page

mod diagnostic;
mod engine;
mod input;
mod lifecycle;

#[cfg(test)]
mod testing;

pub use diagnostic::DiagnosticEngine;
pub use engine::{
    Browser, BrowserEngine, BrowserHost, BrowserId, BrowserSettings, EngineError,
    EngineEvent, EngineSettings, LogSeverity,
};
pub use input::{
    ButtonEdges, EventFlags, InputForwarder, KeyEvent, KeyEventKind, MouseButton,
    MouseEvent, PointerFrame, DEFAULT_WHEEL_MULTIPLIER,
};
pub use lifecycle::BrowserSlot;
