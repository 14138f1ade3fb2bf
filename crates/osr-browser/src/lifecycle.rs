//! Browser lifecycle - the single live browser handle
//!
//! The handle is only valid between the engine's `Created` and `Closing`
//! notifications. Readers get `None` outside that window and must skip
//! whatever needed the browser.

use crate::engine::{Browser, BrowserId};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Shared slot holding the current browser, if any
#[derive(Debug, Clone, Default)]
pub struct BrowserSlot {
    inner: Arc<RwLock<Option<Browser>>>,
}

impl BrowserSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a freshly created browser.
    pub fn on_created(&self, browser: Browser) {
        info!("{} created", browser.id());
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(old) = slot.replace(browser) {
            warn!("Replacing live {} without a closing notification", old.id());
        }
    }

    /// Drop the stored handle if `browser` is the one being closed.
    pub fn on_closing(&self, browser: &Browser) {
        let mut slot = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref().map(|b| b.id()) {
            Some(id) if id == browser.id() => {
                info!("{} closing", id);
                *slot = None;
            }
            Some(id) => debug!("Ignoring close of {} while {} is live", browser.id(), id),
            None => debug!("Ignoring close of {}: no live browser", browser.id()),
        }
    }

    /// The live browser, or `None` when not ready.
    pub fn current(&self) -> Option<Browser> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Identity of the live browser.
    pub fn current_id(&self) -> Option<BrowserId> {
        self.current().map(|b| b.id())
    }

    pub fn is_ready(&self) -> bool {
        self.current().is_some()
    }
}
