//! Browser panel - navigation bar and the live page
//!
//! Immediate-mode: `show` is called once per UI frame, draws everything
//! and reports what the user did as a `PanelOutput`.

use crate::context::PageInfo;
use egui::load::SizedTexture;
use egui::{Event, Key, MouseWheelUnit, PointerButton, Sense, TextureId, Vec2};
use osr_browser::{ButtonEdges, PointerFrame};

/// Width kept free next to the URL box for the Go button
const URL_BUTTON_SPACE: f32 = 120.0;

/// Wheel lines per page step
const LINES_PER_PAGE: f32 = 10.0;

/// Navigation requested from the panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAction {
    Navigate(String),
    Back,
    Forward,
    Reload,
}

/// Result of one `show` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PanelOutput {
    pub actions: Vec<PanelAction>,
    /// Input over the page image, when hovered
    pub pointer: Option<PointerFrame>,
    /// Panel size available for the page, in pixels
    pub desired_viewport: Option<(u32, u32)>,
}

/// Widget state that survives between frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PanelState {
    /// Contents of the URL box
    pub url_input: String,
    /// URL box has focus; engine address updates must not clobber it
    pub editing: bool,
}

impl PanelState {
    pub fn new(url: &str) -> Self {
        Self {
            url_input: url.to_string(),
            editing: false,
        }
    }
}

/// Read-only view data for one frame
#[derive(Debug, Clone, Copy)]
pub struct BrowserView<'a> {
    pub page: &'a PageInfo,
    pub ready: bool,
    /// Browser texture and its size in pixels
    pub texture: Option<(TextureId, (u32, u32))>,
    /// Size requested from the engine
    pub viewport: (u32, u32),
    pub frames: u64,
    pub recreations: u64,
}

/// Draw the panel.
pub fn show(ctx: &egui::Context, state: &mut PanelState, view: &BrowserView<'_>) -> PanelOutput {
    let mut output = PanelOutput::default();
    let ppp = ctx.pixels_per_point();

    egui::TopBottomPanel::top("navigation").show(ctx, |ui| {
        ui.add_space(2.0);
        ui.horizontal(|ui| {
            ui.label("URL:");
            let width = (ui.available_width() - URL_BUTTON_SPACE).max(80.0);
            let response = ui.add(egui::TextEdit::singleline(&mut state.url_input).desired_width(width));
            state.editing = response.has_focus();

            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(Key::Enter));
            let go = ui.add_enabled(view.ready, egui::Button::new("Go")).clicked();
            if (submitted || go) && view.ready {
                let url = state.url_input.trim().to_string();
                if !url.is_empty() {
                    output.actions.push(PanelAction::Navigate(url));
                }
            }
        });

        ui.horizontal(|ui| {
            if ui.add_enabled(view.ready, egui::Button::new("Back")).clicked() {
                output.actions.push(PanelAction::Back);
            }
            if ui.add_enabled(view.ready, egui::Button::new("Forward")).clicked() {
                output.actions.push(PanelAction::Forward);
            }
            if ui.add_enabled(view.ready, egui::Button::new("Reload")).clicked() {
                output.actions.push(PanelAction::Reload);
            }
            if view.page.loading {
                ui.spinner();
            }
            ui.label(view.page.title.as_str());
        });
        ui.add_space(2.0);
    });

    egui::TopBottomPanel::bottom("status").show(ctx, |ui| {
        ui.horizontal(|ui| {
            let (w, h) = view.viewport;
            ui.weak(format!("viewport {w}x{h}"));
            ui.separator();
            ui.weak(format!("{} frames", view.frames));
            ui.separator();
            ui.weak(format!("{} texture rebuilds", view.recreations));
        });
    });

    egui::CentralPanel::default().show(ctx, |ui| {
        let available = ui.available_size() * ppp;
        output.desired_viewport = Some((available.x.floor() as u32, available.y.floor() as u32));

        match view.texture {
            Some((id, (width, height))) => {
                let size = Vec2::new(width as f32, height as f32) / ppp;
                let response = ui.add(egui::Image::from_texture(SizedTexture::new(id, size)).sense(Sense::click()));
                if response.hovered() {
                    let keyboard_free = !ctx.wants_keyboard_input();
                    output.pointer = ui.input(|i| pointer_frame(i, response.rect.min, ppp, keyboard_free));
                }
            }
            None => {
                ui.label("Browser loading...");
                let (w, h) = view.viewport;
                ui.allocate_space(Vec2::new(w as f32, h as f32) / ppp);
            }
        }
    });

    output
}

/// Snapshot pointer and keyboard state relative to `origin`, in pixels.
fn pointer_frame(input: &egui::InputState, origin: egui::Pos2, ppp: f32, keyboard_free: bool) -> Option<PointerFrame> {
    let local = (input.pointer.hover_pos()? - origin) * ppp;

    let mut frame = PointerFrame::at(local.x, local.y);
    frame.ctrl = input.modifiers.ctrl;
    frame.shift = input.modifiers.shift;
    frame.alt = input.modifiers.alt;
    frame.left = ButtonEdges {
        pressed: input.pointer.button_pressed(PointerButton::Primary),
        released: input.pointer.button_released(PointerButton::Primary),
    };
    frame.right = ButtonEdges {
        pressed: input.pointer.button_pressed(PointerButton::Secondary),
        released: input.pointer.button_released(PointerButton::Secondary),
    };

    for event in &input.events {
        match event {
            Event::MouseWheel { unit, delta, .. } => match unit {
                MouseWheelUnit::Line => {
                    frame.wheel_lines.0 += delta.x;
                    frame.wheel_lines.1 += delta.y;
                }
                MouseWheelUnit::Page => {
                    frame.wheel_lines.0 += delta.x * LINES_PER_PAGE;
                    frame.wheel_lines.1 += delta.y * LINES_PER_PAGE;
                }
                MouseWheelUnit::Point => {
                    frame.wheel_pixels.0 += delta.x * ppp;
                    frame.wheel_pixels.1 += delta.y * ppp;
                }
            },
            Event::Text(text) if keyboard_free => frame.text.extend(text.chars()),
            _ => {}
        }
    }

    Some(frame)
}
