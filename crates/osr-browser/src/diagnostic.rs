//! Diagnostic engine - in-process offscreen engine
//!
//! Paints a synthetic page from a dedicated render thread per browser,
//! the same way a native engine delivers offscreen paints: full BGRA
//! frames into the `FrameSink`, at the browser's frame rate, sized from
//! the sink's requested viewport. The page is a gradient seeded from the
//! current URL with a pointer marker on top, so navigation and input are
//! visible end to end.
//!
//! Lifecycle and navigation notifications queue internally and are only
//! delivered by `do_message_loop_work`.

use crate::engine::{
    Browser, BrowserEngine, BrowserHost, BrowserId, BrowserSettings, EngineError,
    EngineEvent, EngineSettings,
};
use crate::input::{EventFlags, KeyEvent, KeyEventKind, MouseButton, MouseEvent};
use crossbeam_channel::{select, tick, unbounded, Receiver, Sender};
use osr_frame::FrameSink;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_FRAME_RATE: u32 = 240;
const MARKER_SIZE: i64 = 9;
const TYPED_BAR_HEIGHT: i64 = 4;

/// Commands to a browser's render thread
#[derive(Debug)]
enum RenderCommand {
    Shutdown,
}

/// Everything the painter needs about the page
#[derive(Debug, Clone)]
struct PageState {
    history: Vec<String>,
    index: usize,
    pointer: Option<(i32, i32)>,
    buttons: EventFlags,
    scroll: (i32, i32),
    typed: String,
    focused: bool,
    /// Bumped on every visible change
    generation: u64,
}

impl PageState {
    fn new(url: &str) -> Self {
        Self {
            history: vec![url.to_string()],
            index: 0,
            pointer: None,
            buttons: EventFlags::empty(),
            scroll: (0, 0),
            typed: String::new(),
            focused: false,
            generation: 0,
        }
    }

    fn url(&self) -> &str {
        &self.history[self.index]
    }

    fn navigate(&mut self, url: &str) {
        self.history.truncate(self.index + 1);
        self.history.push(url.to_string());
        self.index = self.history.len() - 1;
        self.reset_page();
    }

    fn back(&mut self) -> bool {
        if !self.can_go_back() {
            return false;
        }
        self.index -= 1;
        self.reset_page();
        true
    }

    fn forward(&mut self) -> bool {
        if !self.can_go_forward() {
            return false;
        }
        self.index += 1;
        self.reset_page();
        true
    }

    fn can_go_back(&self) -> bool {
        self.index > 0
    }

    fn can_go_forward(&self) -> bool {
        self.index + 1 < self.history.len()
    }

    fn reset_page(&mut self) {
        self.scroll = (0, 0);
        self.typed.clear();
        self.touch();
    }

    fn touch(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }
}

fn url_seed(url: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    hasher.finish()
}

fn fill_rect(out: &mut [u8], width: u32, height: u32, x: i64, y: i64, w: i64, h: i64, bgra: [u8; 4]) {
    let x0 = x.clamp(0, width as i64);
    let y0 = y.clamp(0, height as i64);
    let x1 = (x + w).clamp(0, width as i64);
    let y1 = (y + h).clamp(0, height as i64);

    for row in y0..y1 {
        for col in x0..x1 {
            let i = ((row * width as i64 + col) * 4) as usize;
            out[i..i + 4].copy_from_slice(&bgra);
        }
    }
}

/// Paint the page into `out` as BGRA, `width * height * 4` bytes.
fn paint_page(page: &PageState, width: u32, height: u32, out: &mut Vec<u8>) {
    let len = width as usize * height as usize * 4;
    out.clear();
    out.resize(len, 0);
    if len == 0 {
        return;
    }

    let seed = url_seed(page.url());
    let (red, green, blue) = (seed as u8, (seed >> 8) as u8, (seed >> 16) as u8);
    let scroll_y = page.scroll.1 as i64;

    for y in 0..height as i64 {
        let shade = ((y - scroll_y).rem_euclid(height as i64) * 255 / height as i64) as u8;
        for x in 0..width as i64 {
            let across = (x * 255 / width as i64) as u8;
            let i = ((y * width as i64 + x) * 4) as usize;
            out[i] = blue ^ across;
            out[i + 1] = green ^ shade;
            out[i + 2] = red;
            out[i + 3] = 255;
        }
    }

    let typed = page.typed.chars().count() as i64;
    if typed > 0 {
        fill_rect(out, width, height, 0, 0, typed * 8, TYPED_BAR_HEIGHT, [255, 255, 255, 255]);
    }

    if let Some((px, py)) = page.pointer {
        let color = if page.buttons.contains(EventFlags::LEFT_MOUSE_BUTTON) {
            [0, 0, 255, 255]
        } else if page.buttons.contains(EventFlags::RIGHT_MOUSE_BUTTON) {
            [255, 0, 0, 255]
        } else {
            [255, 255, 255, 255]
        };
        let half = MARKER_SIZE / 2;
        fill_rect(out, width, height, px as i64 - half, py as i64 - half, MARKER_SIZE, MARKER_SIZE, color);
    }
}

fn lock_page(page: &Mutex<PageState>) -> MutexGuard<'_, PageState> {
    page.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Render thread body: paint on every tick where the page or viewport changed.
///
/// Unchanged ticks are skipped, as an offscreen engine only paints
/// invalidated content; the frame rate caps how often a paint can happen.
fn render_loop(
    id: BrowserId,
    page: Arc<Mutex<PageState>>,
    sink: Arc<dyn FrameSink>,
    commands: Receiver<RenderCommand>,
    interval: Duration,
) {
    let ticker = tick(interval);
    let mut buffer = Vec::new();
    let mut painted: Option<(u64, (u32, u32))> = None;

    loop {
        select! {
            recv(commands) -> msg => match msg {
                Ok(RenderCommand::Shutdown) | Err(_) => break,
            },
            recv(ticker) -> _ => {}
        }

        let viewport = sink.viewport_size();
        let state = lock_page(&page).clone();
        if painted == Some((state.generation, viewport)) {
            continue;
        }

        paint_page(&state, viewport.0, viewport.1, &mut buffer);
        match sink.on_paint(&buffer, viewport.0, viewport.1) {
            Ok(()) => painted = Some((state.generation, viewport)),
            Err(e) => warn!("{} paint rejected: {}", id, e),
        }
    }

    debug!("{} render thread exiting", id);
}

/// One browser of the diagnostic engine
#[derive(Debug)]
struct DiagnosticBrowser {
    id: BrowserId,
    me: Weak<DiagnosticBrowser>,
    page: Arc<Mutex<PageState>>,
    notify: Sender<EngineEvent>,
    render_tx: Sender<RenderCommand>,
    render_thread: Mutex<Option<thread::JoinHandle<()>>>,
    closed: AtomicBool,
}

impl DiagnosticBrowser {
    fn queue(&self, event: EngineEvent) {
        if self.notify.send(event).is_err() {
            debug!("{} notification dropped: engine gone", self.id);
        }
    }

    /// Queue the notifications a navigation produces.
    fn announce_navigation(&self) {
        let (url, back, forward) = {
            let page = lock_page(&self.page);
            (page.url().to_string(), page.can_go_back(), page.can_go_forward())
        };

        self.queue(EngineEvent::LoadingStateChanged {
            loading: true,
            can_go_back: back,
            can_go_forward: forward,
        });
        self.queue(EngineEvent::AddressChanged(url.clone()));
        self.queue(EngineEvent::TitleChanged(url));
        self.queue(EngineEvent::LoadingStateChanged {
            loading: false,
            can_go_back: back,
            can_go_forward: forward,
        });
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn update(&self, f: impl FnOnce(&mut PageState)) {
        if self.is_closed() {
            return;
        }
        let mut page = lock_page(&self.page);
        f(&mut page);
        page.touch();
    }
}

impl BrowserHost for DiagnosticBrowser {
    fn id(&self) -> BrowserId {
        self.id
    }

    fn load_url(&self, url: &str) {
        if self.is_closed() {
            return;
        }
        info!("{} loading {}", self.id, url);
        lock_page(&self.page).navigate(url);
        self.announce_navigation();
    }

    fn go_back(&self) {
        if self.is_closed() {
            return;
        }
        if lock_page(&self.page).back() {
            self.announce_navigation();
        }
    }

    fn go_forward(&self) {
        if self.is_closed() {
            return;
        }
        if lock_page(&self.page).forward() {
            self.announce_navigation();
        }
    }

    fn reload(&self) {
        if self.is_closed() {
            return;
        }
        debug!("{} reloading", self.id);
        lock_page(&self.page).reset_page();
        self.announce_navigation();
    }

    fn can_go_back(&self) -> bool {
        lock_page(&self.page).can_go_back()
    }

    fn can_go_forward(&self) -> bool {
        lock_page(&self.page).can_go_forward()
    }

    fn was_resized(&self) {
        // The render thread re-reads the viewport every tick
        debug!("{} resized", self.id);
    }

    fn set_focus(&self, focus: bool) {
        self.update(|page| page.focused = focus);
    }

    fn send_mouse_move(&self, event: &MouseEvent, mouse_leave: bool) {
        self.update(|page| {
            page.pointer = if mouse_leave { None } else { Some((event.x, event.y)) };
        });
    }

    fn send_mouse_click(&self, event: &MouseEvent, button: MouseButton, mouse_up: bool, _click_count: u32) {
        self.update(|page| {
            page.pointer = Some((event.x, event.y));
            page.buttons.set(button.flag(), !mouse_up);
        });
    }

    fn send_mouse_wheel(&self, _event: &MouseEvent, delta_x: i32, delta_y: i32) {
        self.update(|page| {
            page.scroll.0 = page.scroll.0.saturating_add(delta_x);
            page.scroll.1 = page.scroll.1.saturating_add(delta_y);
        });
    }

    fn send_key_event(&self, event: &KeyEvent) {
        if event.kind != KeyEventKind::Char {
            return;
        }
        self.update(|page| page.typed.push(event.character));
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("{} close requested", self.id);

        let _ = self.render_tx.send(RenderCommand::Shutdown);
        let handle = self
            .render_thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("{} render thread panicked", self.id);
            }
        }

        if let Some(me) = self.me.upgrade() {
            let browser: Browser = me;
            self.queue(EngineEvent::Closing(browser));
        }
    }
}

/// Engine state after `initialize`
struct Running {
    sink: Arc<dyn FrameSink>,
    events: Sender<EngineEvent>,
    queue_tx: Sender<EngineEvent>,
    queue_rx: Receiver<EngineEvent>,
    browsers: Vec<Arc<DiagnosticBrowser>>,
}

/// Built-in offscreen engine
#[derive(Default)]
pub struct DiagnosticEngine {
    running: Option<Running>,
    next_id: u64,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of browsers that have not been closed yet.
    pub fn live_browsers(&self) -> usize {
        self.running
            .as_ref()
            .map_or(0, |r| r.browsers.iter().filter(|b| !b.is_closed()).count())
    }
}

impl BrowserEngine for DiagnosticEngine {
    fn initialize(
        &mut self,
        settings: &EngineSettings,
        sink: Arc<dyn FrameSink>,
        events: Sender<EngineEvent>,
    ) -> Result<(), EngineError> {
        if self.running.is_some() {
            return Err(EngineError::AlreadyInitialized);
        }
        if !settings.windowless_rendering_enabled {
            return Err(EngineError::Initialization(
                "windowless rendering must be enabled".to_string(),
            ));
        }

        info!(
            "Diagnostic engine initialized (cache: {}, log: {}, switches: {:?})",
            settings.root_cache_path.display(),
            settings.log_file.display(),
            settings.command_line_switches
        );

        let (queue_tx, queue_rx) = unbounded();
        let _ = queue_tx.send(EngineEvent::ContextInitialized);
        self.running = Some(Running {
            sink,
            events,
            queue_tx,
            queue_rx,
            browsers: Vec::new(),
        });
        Ok(())
    }

    fn create_browser(&mut self, url: &str, settings: &BrowserSettings) -> Result<(), EngineError> {
        let running = self.running.as_mut().ok_or(EngineError::NotInitialized)?;

        self.next_id += 1;
        let id = BrowserId::new(self.next_id);
        let rate = settings.windowless_frame_rate.clamp(1, MAX_FRAME_RATE);
        let interval = Duration::from_secs(1) / rate;

        let page = Arc::new(Mutex::new(PageState::new(url)));
        let (render_tx, render_rx) = unbounded();
        let handle = {
            let page = page.clone();
            let sink = running.sink.clone();
            thread::Builder::new()
                .name(format!("osr-render-{}", id.0))
                .spawn(move || render_loop(id, page, sink, render_rx, interval))
                .map_err(|e| EngineError::BrowserCreation(e.to_string()))?
        };

        let browser = Arc::new_cyclic(|me| DiagnosticBrowser {
            id,
            me: me.clone(),
            page,
            notify: running.queue_tx.clone(),
            render_tx,
            render_thread: Mutex::new(Some(handle)),
            closed: AtomicBool::new(false),
        });
        info!("{} created at {} fps for {}", id, rate, url);

        let host: Browser = browser.clone();
        let _ = running.queue_tx.send(EngineEvent::Created(host));
        browser.announce_navigation();
        running.browsers.push(browser);
        Ok(())
    }

    fn do_message_loop_work(&mut self) {
        let Some(running) = self.running.as_mut() else {
            return;
        };

        for event in running.queue_rx.try_iter() {
            if let EngineEvent::Closing(browser) = &event {
                let id = browser.id();
                running.browsers.retain(|b| b.id != id);
            }
            if running.events.send(event).is_err() {
                debug!("Engine event dropped: receiver gone");
            }
        }
    }

    fn shutdown(&mut self) {
        let Some(running) = self.running.as_ref() else {
            return;
        };

        info!("Diagnostic engine shutting down");
        for browser in running.browsers.clone() {
            browser.close();
        }
        self.do_message_loop_work();
        self.running = None;
    }
}

impl Drop for DiagnosticEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::BrowserSlot;
    use osr_frame::FrameStore;
    use std::time::Instant;

    fn start(store: Arc<FrameStore>) -> (DiagnosticEngine, Receiver<EngineEvent>) {
        let (tx, rx) = unbounded();
        let mut engine = DiagnosticEngine::new();
        engine
            .initialize(&EngineSettings::default(), store, tx)
            .unwrap();
        (engine, rx)
    }

    fn fast() -> BrowserSettings {
        BrowserSettings {
            windowless_frame_rate: 240,
        }
    }

    fn created(rx: &Receiver<EngineEvent>) -> Option<Browser> {
        rx.try_iter().find_map(|e| match e {
            EngineEvent::Created(b) => Some(b),
            _ => None,
        })
    }

    fn wait_dirty(store: &FrameStore) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if store.is_dirty() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_create_requires_initialize() {
        let mut engine = DiagnosticEngine::new();
        let err = engine.create_browser("about:blank", &fast()).unwrap_err();
        assert!(matches!(err, EngineError::NotInitialized));
    }

    #[test]
    fn test_double_initialize_rejected() {
        let store = Arc::new(FrameStore::new(4, 4));
        let (mut engine, _rx) = start(store.clone());
        let (tx, _rx2) = unbounded();
        let err = engine
            .initialize(&EngineSettings::default(), store, tx)
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyInitialized));
    }

    #[test]
    fn test_created_delivered_by_pump() {
        let store = Arc::new(FrameStore::new(4, 4));
        let (mut engine, rx) = start(store);

        engine.create_browser("https://example.com", &fast()).unwrap();
        assert!(rx.try_recv().is_err());

        engine.do_message_loop_work();
        let events: Vec<_> = rx.try_iter().collect();
        assert!(matches!(events[0], EngineEvent::ContextInitialized));
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Created(_))));
        assert!(events
            .iter()
            .any(|e| matches!(e, EngineEvent::AddressChanged(u) if u == "https://example.com")));
    }

    #[test]
    fn test_paints_bgra_at_viewport_size() {
        let store = Arc::new(FrameStore::new(6, 3));
        let (mut engine, _rx) = start(store.clone());
        engine.create_browser("about:blank", &fast()).unwrap();

        assert!(wait_dirty(&store));
        let frame = store.read_and_convert();
        assert_eq!((frame.width, frame.height), (6, 3));
        assert!(frame.pixels.chunks_exact(4).all(|px| px[3] == 255));

        // Red is constant across the page; after conversion it sits at byte 0
        let red = frame.pixels[0];
        assert!(frame.pixels.chunks_exact(4).all(|px| px[0] == red));

        engine.shutdown();
    }

    #[test]
    fn test_repaints_after_resize() {
        let store = Arc::new(FrameStore::new(4, 4));
        let (mut engine, _rx) = start(store.clone());
        engine.create_browser("about:blank", &fast()).unwrap();
        assert!(wait_dirty(&store));
        store.clear_dirty();

        store.resize(8, 2);
        assert!(wait_dirty(&store));
        assert_eq!(store.frame_size(), (8, 2));
        engine.shutdown();
    }

    #[test]
    fn test_idle_page_not_repainted() {
        let store = Arc::new(FrameStore::new(4, 4));
        let (mut engine, _rx) = start(store.clone());
        engine.create_browser("about:blank", &fast()).unwrap();
        assert!(wait_dirty(&store));
        let painted = store.frame_count();

        // A dozen ticks at 240 Hz with nothing changed
        thread::sleep(Duration::from_millis(50));
        assert_eq!(store.frame_count(), painted);

        store.clear_dirty();
        store.resize(5, 5);
        assert!(wait_dirty(&store));
        assert_eq!(store.frame_count(), painted + 1);
        engine.shutdown();
    }

    #[test]
    fn test_history_navigation() {
        let store = Arc::new(FrameStore::new(2, 2));
        let (mut engine, rx) = start(store);
        engine.create_browser("a", &fast()).unwrap();
        engine.do_message_loop_work();
        let browser = created(&rx).unwrap();

        assert!(!browser.can_go_back());
        browser.load_url("b");
        browser.load_url("c");
        browser.go_back();
        browser.go_back();
        assert!(!browser.can_go_back());
        assert!(browser.can_go_forward());

        browser.go_forward();
        browser.load_url("d");
        assert!(!browser.can_go_forward());

        engine.do_message_loop_work();
        let addresses: Vec<_> = rx
            .try_iter()
            .filter_map(|e| match e {
                EngineEvent::AddressChanged(u) => Some(u),
                _ => None,
            })
            .collect();
        assert_eq!(addresses, vec!["a", "b", "c", "b", "a", "b", "d"]);
        engine.shutdown();
    }

    #[test]
    fn test_close_clears_slot() {
        let store = Arc::new(FrameStore::new(2, 2));
        let (mut engine, rx) = start(store);
        let slot = BrowserSlot::new();

        engine.create_browser("a", &fast()).unwrap();
        engine.do_message_loop_work();
        for event in rx.try_iter() {
            if let EngineEvent::Created(b) = event {
                slot.on_created(b);
            }
        }
        assert!(slot.is_ready());
        assert_eq!(engine.live_browsers(), 1);

        slot.current().unwrap().close();
        engine.do_message_loop_work();
        for event in rx.try_iter() {
            if let EngineEvent::Closing(b) = event {
                slot.on_closing(&b);
            }
        }
        assert!(!slot.is_ready());
        assert_eq!(engine.live_browsers(), 0);
    }

    #[test]
    fn test_shutdown_closes_browsers() {
        let store = Arc::new(FrameStore::new(2, 2));
        let (mut engine, rx) = start(store);
        engine.create_browser("a", &fast()).unwrap();
        engine.shutdown();

        let events: Vec<_> = rx.try_iter().collect();
        assert!(events.iter().any(|e| matches!(e, EngineEvent::Closing(_))));
        assert_eq!(engine.live_browsers(), 0);
    }

    #[test]
    fn test_paint_marker_colors() {
        let mut page = PageState::new("x");
        page.pointer = Some((5, 5));
        page.buttons = EventFlags::LEFT_MOUSE_BUTTON;

        let mut out = Vec::new();
        paint_page(&page, 10, 10, &mut out);
        let i = (5 * 10 + 5) * 4;
        assert_eq!(&out[i..i + 4], &[0, 0, 255, 255]);
    }

    #[test]
    fn test_paint_zero_size() {
        let mut out = vec![1, 2, 3];
        paint_page(&PageState::new("x"), 0, 5, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_input_changes_generation() {
        let mut page = PageState::new("x");
        let before = page.generation;
        page.navigate("y");
        assert_ne!(page.generation, before);
        assert_eq!(page.url(), "y");
    }
}
