//! osr Frame - Offscreen frame hand-off
//!
//! Holds the latest frame painted by the browser engine and hands it
//! to the UI thread converted to RGBA:
//! - `FrameStore`: mutex-guarded holding cell, written by the engine's
//!   render thread, read by the UI thread
//! - `FrameSink`: the narrow engine-facing side of the store
//! - `convert`: BGRA to RGBA pixel swizzle

mod convert;
mod store;

pub use convert::{bgra_to_rgba, bgra_to_rgba_in_place, BYTES_PER_PIXEL};
pub use store::{ConvertedFrame, FrameError, FrameSink, FrameStore};
