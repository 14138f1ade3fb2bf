//! UI Renderer - paints egui output onto a surface frame

use crate::surface::{Frame, CLEAR_COLOR};
use egui::epaint::{ClippedPrimitive, TextureId};
use egui::TexturesDelta;
use egui_wgpu::ScreenDescriptor;
use wgpu::{Device, Queue, TextureFormat};

/// egui painter bound to the window surface format
pub struct UiRenderer {
    renderer: egui_wgpu::Renderer,
}

impl UiRenderer {
    pub fn new(device: &Device, format: TextureFormat) -> Self {
        Self {
            renderer: egui_wgpu::Renderer::new(device, format, None, 1, false),
        }
    }

    /// Underlying painter, for registering native textures.
    pub fn renderer_mut(&mut self) -> &mut egui_wgpu::Renderer {
        &mut self.renderer
    }

    /// Apply egui's texture uploads.
    ///
    /// Must run every UI frame, even when no surface frame could be
    /// acquired, or egui's font atlas goes missing.
    pub fn update_textures(&mut self, device: &Device, queue: &Queue, textures: &TexturesDelta) {
        for (id, delta) in &textures.set {
            self.renderer.update_texture(device, queue, *id, delta);
        }
    }

    /// Record the UI pass into `frame`.
    pub fn paint(
        &mut self,
        device: &Device,
        queue: &Queue,
        frame: &mut Frame,
        primitives: &[ClippedPrimitive],
        screen: &ScreenDescriptor,
    ) {
        let prepared = self
            .renderer
            .update_buffers(device, queue, &mut frame.encoder, primitives, screen);
        frame.extra.extend(prepared);

        let mut pass = frame
            .encoder
            .begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("UI Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &frame.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            })
            .forget_lifetime();
        self.renderer.render(&mut pass, primitives, screen);
    }

    /// Drop textures egui no longer needs, after the frame was presented.
    pub fn free_textures(&mut self, ids: &[TextureId]) {
        for id in ids {
            self.renderer.free_texture(id);
        }
    }
}
