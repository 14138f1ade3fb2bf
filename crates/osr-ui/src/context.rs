//! Application context
//!
//! All state shared by the per-frame steps lives here and is passed
//! explicitly; nothing is global. GPU state is owned by the shell, so a
//! context can be built and driven in tests without a window.

use crate::config::AppConfig;
use crate::panel::{PanelAction, PanelOutput, PanelState};
use crossbeam_channel::{unbounded, Receiver};
use osr_browser::{
    BrowserEngine, BrowserSlot, EngineError, EngineEvent, InputForwarder, PointerFrame,
};
use osr_frame::FrameStore;
use std::sync::Arc;
use tracing::{debug, info};

/// What the engine last told us about the page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageInfo {
    pub address: String,
    pub title: String,
    pub loading: bool,
    pub can_go_back: bool,
    pub can_go_forward: bool,
}

/// Everything the frame loop works on, minus the GPU
pub struct AppContext {
    config: AppConfig,
    engine: Box<dyn BrowserEngine>,
    events: Receiver<EngineEvent>,
    frames: Arc<FrameStore>,
    slot: BrowserSlot,
    forwarder: InputForwarder,
    page: PageInfo,
    panel: PanelState,
    /// Reused RGBA conversion buffer
    upload: Vec<u8>,
    /// Number of the frame held in `upload`
    taken: Option<u64>,
}

impl AppContext {
    /// Start `engine` and request the browser.
    ///
    /// The browser handle arrives later through `pump`.
    pub fn new(config: AppConfig, mut engine: Box<dyn BrowserEngine>) -> Result<Self, EngineError> {
        let frames = Arc::new(FrameStore::new(config.browser.width, config.browser.height));
        let (tx, events) = unbounded();

        engine.initialize(&config.engine, frames.clone(), tx)?;
        engine.create_browser(&config.browser.start_url, &config.browser_settings())?;
        info!("Browser requested for {}", config.browser.start_url);

        Ok(Self {
            forwarder: InputForwarder::new(config.browser.wheel_multiplier),
            panel: PanelState::new(&config.browser.start_url),
            config,
            engine,
            events,
            frames,
            slot: BrowserSlot::new(),
            page: PageInfo::default(),
            upload: Vec::new(),
            taken: None,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn frames(&self) -> &Arc<FrameStore> {
        &self.frames
    }

    pub fn slot(&self) -> &BrowserSlot {
        &self.slot
    }

    pub fn page(&self) -> &PageInfo {
        &self.page
    }

    pub fn panel_mut(&mut self) -> &mut PanelState {
        &mut self.panel
    }

    /// Run engine work and apply its notifications. Once per UI frame.
    pub fn pump(&mut self) {
        self.engine.do_message_loop_work();

        for event in self.events.try_iter() {
            match event {
                EngineEvent::ContextInitialized => info!("Engine context initialized"),
                EngineEvent::Created(browser) => self.slot.on_created(browser),
                EngineEvent::Closing(browser) => self.slot.on_closing(&browser),
                EngineEvent::AddressChanged(url) => {
                    if !self.panel.editing {
                        self.panel.url_input = url.clone();
                    }
                    self.page.address = url;
                }
                EngineEvent::TitleChanged(title) => self.page.title = title,
                EngineEvent::LoadingStateChanged {
                    loading,
                    can_go_back,
                    can_go_forward,
                } => {
                    self.page.loading = loading;
                    self.page.can_go_back = can_go_back;
                    self.page.can_go_forward = can_go_forward;
                }
            }
        }
    }

    /// The latest frame as RGBA, if one arrived since `frame_consumed`.
    pub fn take_frame(&mut self) -> Option<(&[u8], u32, u32)> {
        if !self.frames.is_dirty() {
            return None;
        }
        let (width, height, frame_no) = self.frames.read_numbered_into(&mut self.upload);
        self.taken = Some(frame_no);
        Some((&self.upload, width, height))
    }

    /// The frame from `take_frame` is on the GPU.
    ///
    /// A newer paint that arrived in the meantime stays pending.
    pub fn frame_consumed(&mut self) {
        if let Some(frame_no) = self.taken.take() {
            self.frames.clear_dirty_if(frame_no);
        }
    }

    /// Apply what the panel produced this frame.
    ///
    /// Returns the number of input notifications forwarded.
    pub fn apply_panel(&mut self, output: PanelOutput, frame_size: (u32, u32)) -> usize {
        for action in output.actions {
            self.apply(action);
        }

        if let Some((width, height)) = output.desired_viewport {
            if self.config.browser.follow_panel_size {
                self.request_viewport(width, height);
            }
        }

        match output.pointer {
            Some(pointer) => self.forward_input(&pointer, frame_size),
            None => 0,
        }
    }

    /// Run a navigation action. Skipped while no browser exists.
    pub fn apply(&mut self, action: PanelAction) {
        let Some(browser) = self.slot.current() else {
            debug!("Browser not ready, dropping {:?}", action);
            return;
        };

        match action {
            PanelAction::Navigate(url) => browser.load_url(&url),
            PanelAction::Back => browser.go_back(),
            PanelAction::Forward => browser.go_forward(),
            PanelAction::Reload => browser.reload(),
        }
    }

    /// Ask the engine to paint at a new size.
    pub fn request_viewport(&self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if self.frames.viewport_size() == (width, height) {
            return;
        }

        self.frames.resize(width, height);
        if let Some(browser) = self.slot.current() {
            browser.was_resized();
        }
    }

    /// Forward one frame of input over the image, if a browser exists.
    pub fn forward_input(&self, pointer: &PointerFrame, frame_size: (u32, u32)) -> usize {
        match self.slot.current() {
            Some(browser) => self.forwarder.forward(pointer, frame_size, browser.as_ref()),
            None => 0,
        }
    }

    /// Close the browser and stop the engine.
    pub fn shutdown(&mut self) {
        info!("Shutting down engine");
        self.engine.shutdown();
        self.pump();
    }
}
