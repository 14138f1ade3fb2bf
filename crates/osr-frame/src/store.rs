//! Frame Store - latest painted frame, shared between threads
//!
//! The engine's render thread writes through `on_frame`; the UI thread
//! checks `is_dirty`, pulls a converted copy, uploads it and then calls
//! `clear_dirty_if` with the number of the frame it copied, so a paint
//! that lands mid-upload stays dirty. One mutex covers both paths and is only held for the
//! copy/convert, never across GPU work.

use crate::convert::{bgra_to_rgba, BYTES_PER_PIXEL};
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, trace};

/// Frame hand-off errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("Pixel buffer too small: got {got} bytes, need {need} for {width}x{height}")]
    BufferTooSmall {
        got: usize,
        need: usize,
        width: u32,
        height: u32,
    },

    #[error("Frame size {width}x{height} overflows addressable memory")]
    Overflow { width: u32, height: u32 },
}

/// Engine-facing side of the store.
///
/// Engines only ever see this trait: they deliver paints and ask for the
/// size they should paint at.
pub trait FrameSink: Send + Sync {
    /// Deliver a full BGRA frame.
    fn on_paint(&self, pixels: &[u8], width: u32, height: u32) -> Result<(), FrameError>;

    /// Size the UI currently wants painted.
    fn viewport_size(&self) -> (u32, u32);
}

/// A frame converted to RGBA, ready for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedFrame {
    /// RGBA pixels, `width * height * 4` bytes
    pub pixels: Vec<u8>,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

#[derive(Debug)]
struct Inner {
    /// Latest frame, BGRA
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    /// Size requested from the engine
    viewport: (u32, u32),
    dirty: bool,
    frames: u64,
}

/// Thread-safe holding cell for the latest frame
#[derive(Debug)]
pub struct FrameStore {
    inner: Mutex<Inner>,
}

/// Byte length of a `width x height` frame.
fn frame_len(width: u32, height: u32) -> Result<usize, FrameError> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|n| n.checked_mul(BYTES_PER_PIXEL))
        .ok_or(FrameError::Overflow { width, height })
}

impl FrameStore {
    /// Create a store whose requested viewport is `width x height`.
    ///
    /// Until the first paint the stored frame is a zeroed buffer of that
    /// size and the dirty flag is clear.
    pub fn new(width: u32, height: u32) -> Self {
        let width = width.max(1);
        let height = height.max(1);
        let len = frame_len(width, height).unwrap_or(0);

        Self {
            inner: Mutex::new(Inner {
                pixels: vec![0; len],
                width,
                height,
                viewport: (width, height),
                dirty: false,
                frames: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panicking holder cannot leave the buffer half-resized: resize
        // happens before the copy and both are plain memory ops.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store a new BGRA frame, replacing the previous one.
    ///
    /// Always copies the complete buffer. Storage is resized to exactly
    /// `width * height * 4` bytes when the dimensions change.
    pub fn on_frame(&self, pixels: &[u8], width: u32, height: u32) -> Result<(), FrameError> {
        let need = frame_len(width, height)?;
        if pixels.len() < need {
            return Err(FrameError::BufferTooSmall {
                got: pixels.len(),
                need,
                width,
                height,
            });
        }

        let mut inner = self.lock();
        if inner.width != width || inner.height != height || inner.pixels.len() != need {
            debug!(
                "Frame size changed: {}x{} -> {}x{}",
                inner.width, inner.height, width, height
            );
            inner.width = width;
            inner.height = height;
            inner.pixels.resize(need, 0);
        }

        inner.pixels.copy_from_slice(&pixels[..need]);
        inner.dirty = true;
        inner.frames += 1;
        trace!("Frame {} stored ({}x{})", inner.frames, width, height);

        Ok(())
    }

    /// Size the engine should paint at.
    pub fn viewport_size(&self) -> (u32, u32) {
        self.lock().viewport
    }

    /// Change the requested viewport.
    ///
    /// The stored frame keeps its dimensions until the engine paints at
    /// the new size.
    pub fn resize(&self, width: u32, height: u32) {
        let mut inner = self.lock();
        let viewport = (width.max(1), height.max(1));
        if inner.viewport != viewport {
            debug!("Viewport resized to {}x{}", viewport.0, viewport.1);
            inner.viewport = viewport;
        }
    }

    /// Has a frame arrived since the last `clear_dirty`?
    pub fn is_dirty(&self) -> bool {
        self.lock().dirty
    }

    /// Mark the current frame as consumed.
    pub fn clear_dirty(&self) {
        self.lock().dirty = false;
    }

    /// Clear the dirty flag only if frame `frame_no` is still the latest.
    ///
    /// A paint that landed after the reader's copy keeps the flag set.
    /// Returns whether the flag was cleared.
    pub fn clear_dirty_if(&self, frame_no: u64) -> bool {
        let mut inner = self.lock();
        if inner.frames != frame_no {
            trace!("Frame {} superseded by {}", frame_no, inner.frames);
            return false;
        }
        inner.dirty = false;
        true
    }

    /// Dimensions of the stored frame.
    pub fn frame_size(&self) -> (u32, u32) {
        let inner = self.lock();
        (inner.width, inner.height)
    }

    /// Number of frames received so far.
    pub fn frame_count(&self) -> u64 {
        self.lock().frames
    }

    /// Copy the stored frame out as RGBA.
    ///
    /// Leaves the dirty flag alone.
    pub fn read_and_convert(&self) -> ConvertedFrame {
        let mut pixels = Vec::new();
        let (width, height) = self.read_and_convert_into(&mut pixels);
        ConvertedFrame {
            pixels,
            width,
            height,
        }
    }

    /// Like `read_and_convert`, reusing `out`'s allocation.
    pub fn read_and_convert_into(&self, out: &mut Vec<u8>) -> (u32, u32) {
        let (width, height, _) = self.read_numbered_into(out);
        (width, height)
    }

    /// Like `read_and_convert_into`, also returning the frame number to
    /// hand back to `clear_dirty_if`.
    pub fn read_numbered_into(&self, out: &mut Vec<u8>) -> (u32, u32, u64) {
        let inner = self.lock();
        bgra_to_rgba(&inner.pixels, out);
        (inner.width, inner.height, inner.frames)
    }
}

impl Default for FrameStore {
    fn default() -> Self {
        Self::new(800, 600)
    }
}

impl FrameSink for FrameStore {
    fn on_paint(&self, pixels: &[u8], width: u32, height: u32) -> Result<(), FrameError> {
        self.on_frame(pixels, width, height)
    }

    fn viewport_size(&self) -> (u32, u32) {
        FrameStore::viewport_size(self)
    }
}
