//! Browser Shell - Main Loop
//!
//! One UI frame, in order:
//! 1. Pump the engine so paints and notifications land
//! 2. Upload a dirty browser frame into the GPU texture
//! 3. Build the egui panel and forward input over the page
//! 4. Paint and present
//!
//! Redraws are paced like a game loop: every `TARGET_FRAME_TIME` while
//! focused, every `IDLE_FRAME_TIME` otherwise.

use crate::config::AppConfig;
use crate::context::AppContext;
use crate::panel::{self, BrowserView};
use anyhow::Context as _;
use osr_browser::BrowserEngine;
use osr_render::{
    GpuContext, GpuError, RenderSurface, SurfaceConfig, SyncOutcome, TextureBridge, UiRenderer,
    WgpuTexture, WgpuTextureBackend,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use winit::application::ApplicationHandler;
use winit::dpi::{LogicalSize, PhysicalSize};
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{Window, WindowAttributes, WindowId};

/// Frame timing configuration
const TARGET_FRAME_TIME: Duration = Duration::from_millis(16); // ~60 FPS max
const IDLE_FRAME_TIME: Duration = Duration::from_millis(100); // 10 FPS when idle

/// Everything that needs a window
struct Graphics {
    window: Arc<Window>,
    gpu: GpuContext,
    surface: RenderSurface,
    ui: UiRenderer,
    egui_state: egui_winit::State,
    bridge: TextureBridge<WgpuTexture>,
}

impl Graphics {
    fn new(event_loop: &ActiveEventLoop, config: &AppConfig, egui: &egui::Context) -> anyhow::Result<Self> {
        let attrs = WindowAttributes::default()
            .with_title(config.window.title.clone())
            .with_inner_size(LogicalSize::new(config.window.width, config.window.height));
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        info!("Window created");

        let gpu = pollster::block_on(GpuContext::new(config.gpu_config()))?;

        let size = window.inner_size();
        let surface = RenderSurface::new(
            &gpu,
            window.clone(),
            SurfaceConfig::new(size.width, size.height).with_vsync(config.window.vsync),
        )?;
        let ui = UiRenderer::new(&gpu.device, surface.format());

        egui.set_visuals(egui::Visuals::dark());
        let egui_state = egui_winit::State::new(
            egui.clone(),
            egui::ViewportId::ROOT,
            &*window,
            Some(window.scale_factor() as f32),
            None,
            Some(gpu.max_texture_dimension() as usize),
        );

        info!("Rendering initialized: {}x{}", size.width, size.height);

        Ok(Self {
            window,
            gpu,
            surface,
            ui,
            egui_state,
            bridge: TextureBridge::new(),
        })
    }

    fn texture_backend(&mut self) -> (&mut TextureBridge<WgpuTexture>, WgpuTextureBackend<'_>) {
        let max = self.gpu.max_texture_dimension();
        let backend = WgpuTextureBackend::new(&self.gpu.device, &self.gpu.queue, self.ui.renderer_mut(), max);
        (&mut self.bridge, backend)
    }
}

/// Browser shell state
pub struct BrowserShell {
    app: AppContext,
    egui: egui::Context,
    graphics: Option<Graphics>,
    /// First fatal error, reported by `run` once the loop exits
    init_error: Option<anyhow::Error>,
    focused: bool,
    last_frame: Instant,
}

impl BrowserShell {
    /// Create a new browser shell
    pub fn new(app: AppContext) -> Self {
        Self {
            app,
            egui: egui::Context::default(),
            graphics: None,
            init_error: None,
            focused: true,
            last_frame: Instant::now()
                .checked_sub(TARGET_FRAME_TIME)
                .unwrap_or_else(Instant::now),
        }
    }

    pub fn app(&self) -> &AppContext {
        &self.app
    }

    fn frame_interval(&self) -> Duration {
        if self.focused {
            TARGET_FRAME_TIME
        } else {
            IDLE_FRAME_TIME
        }
    }

    /// Check if we should render
    fn should_render(&self) -> bool {
        self.last_frame.elapsed() >= self.frame_interval()
    }

    /// Run one UI frame
    fn frame(&mut self) {
        let Self {
            app, egui, graphics, ..
        } = self;
        let Some(gfx) = graphics.as_mut() else {
            return;
        };

        app.pump();

        let synced = match app.take_frame() {
            Some((pixels, width, height)) => {
                let (bridge, mut backend) = gfx.texture_backend();
                Some(bridge.sync(&mut backend, pixels, width, height))
            }
            None => None,
        };
        match synced {
            Some(Ok(outcome)) => {
                if outcome == SyncOutcome::Recreated {
                    debug!("Browser texture rebuilt");
                }
                app.frame_consumed();
            }
            // Dirty flag stays set so the upload is retried next frame
            Some(Err(e)) => warn!("Browser texture upload failed: {}", e),
            None => {}
        }

        let raw_input = gfx.egui_state.take_egui_input(&gfx.window);
        let mut state = app.panel_mut().clone();
        let view = BrowserView {
            page: app.page(),
            ready: app.slot().is_ready(),
            texture: gfx.bridge.texture_id().zip(gfx.bridge.size()),
            viewport: app.frames().viewport_size(),
            frames: app.frames().frame_count(),
            recreations: gfx.bridge.recreations(),
        };
        let mut output = panel::PanelOutput::default();
        let full_output = egui.run(raw_input, |ctx| {
            output = panel::show(ctx, &mut state, &view);
        });
        *app.panel_mut() = state;

        gfx.egui_state
            .handle_platform_output(&gfx.window, full_output.platform_output);

        let frame_size = gfx.bridge.size().unwrap_or(app.frames().viewport_size());
        app.apply_panel(output, frame_size);

        let primitives = egui.tessellate(full_output.shapes, full_output.pixels_per_point);
        gfx.ui
            .update_textures(&gfx.gpu.device, &gfx.gpu.queue, &full_output.textures_delta);

        let (width, height) = gfx.surface.dimensions();
        let screen = egui_wgpu::ScreenDescriptor {
            size_in_pixels: [width, height],
            pixels_per_point: full_output.pixels_per_point,
        };

        match gfx.surface.begin_frame() {
            Ok(mut frame) => {
                gfx.ui
                    .paint(&gfx.gpu.device, &gfx.gpu.queue, &mut frame, &primitives, &screen);
                frame.present();
            }
            Err(GpuError::SurfaceLost) => debug!("Skipping frame, surface reconfigured"),
            Err(e) => warn!("Failed to begin frame: {}", e),
        }

        gfx.ui.free_textures(&full_output.textures_delta.free);
    }
}

impl ApplicationHandler for BrowserShell {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.graphics.is_some() {
            return;
        }

        match Graphics::new(event_loop, self.app.config(), &self.egui) {
            Ok(graphics) => {
                graphics.window.request_redraw();
                self.graphics = Some(graphics);
            }
            Err(e) => {
                error!("Failed to initialize rendering: {:#}", e);
                self.init_error = Some(e);
                event_loop.exit();
            }
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        let Some(gfx) = self.graphics.as_mut() else {
            return;
        };
        let _ = gfx.egui_state.on_window_event(&gfx.window, &event);

        match event {
            WindowEvent::CloseRequested => {
                info!("Window close requested");
                event_loop.exit();
            }

            WindowEvent::Resized(PhysicalSize { width, height }) => {
                if width > 0 && height > 0 {
                    debug!("Window resized: {}x{}", width, height);
                    gfx.surface.resize(width, height);
                }
            }

            WindowEvent::Focused(focused) => {
                self.focused = focused;
                debug!("Window focused: {}", focused);
            }

            WindowEvent::RedrawRequested => {
                self.frame();
                self.last_frame = Instant::now();
            }

            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        let Some(gfx) = &self.graphics else {
            return;
        };

        if self.should_render() {
            gfx.window.request_redraw();
        }

        let next = self.last_frame + self.frame_interval();
        event_loop.set_control_flow(ControlFlow::WaitUntil(next.max(Instant::now())));
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(gfx) = self.graphics.as_mut() {
            let (bridge, mut backend) = gfx.texture_backend();
            bridge.release(&mut backend);
        }

        self.app.shutdown();

        if let Some(gfx) = &self.graphics {
            gfx.gpu.wait_idle();
        }
    }
}

/// Run the browser UI
pub fn run(config: AppConfig, engine: Box<dyn BrowserEngine>) -> anyhow::Result<()> {
    info!("Starting browser shell");

    let app = AppContext::new(config, engine).context("Failed to start browser engine")?;

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut shell = BrowserShell::new(app);
    event_loop.run_app(&mut shell)?;

    match shell.init_error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use osr_browser::DiagnosticEngine;

    fn shell() -> BrowserShell {
        let mut config = AppConfig::default();
        config.browser.start_url = "about:blank".to_string();
        let app = AppContext::new(config, Box::new(DiagnosticEngine::new())).unwrap();
        BrowserShell::new(app)
    }

    #[test]
    fn test_browser_shell_creation() {
        let shell = shell();

        assert!(shell.graphics.is_none());
        assert!(shell.init_error.is_none());
        assert!(shell.focused);
    }

    #[test]
    fn test_frame_timing() {
        let mut shell = shell();

        // Should need initial redraw
        assert!(shell.should_render());

        shell.last_frame = Instant::now();
        assert!(!shell.should_render());

        shell.focused = false;
        assert_eq!(shell.frame_interval(), IDLE_FRAME_TIME);
    }

    #[test]
    fn test_frame_without_window_is_noop() {
        let mut shell = shell();
        shell.frame();
        assert!(!shell.app().slot().is_ready());
    }
}
