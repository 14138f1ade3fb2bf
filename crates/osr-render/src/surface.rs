//! Render Surface - the window swapchain
//!
//! Owns the wgpu surface for the main window and hands out one `Frame`
//! per UI frame.

use crate::gpu::{GpuContext, GpuError};
use std::sync::Arc;
use tracing::{debug, info, warn};
use wgpu::{
    CommandBuffer, CommandEncoder, Device, Queue, Surface, SurfaceConfiguration,
    SurfaceTexture, TextureFormat, TextureUsages, TextureView,
};
use winit::window::Window;

/// Background behind the UI
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.045,
    g: 0.045,
    b: 0.05,
    a: 1.0,
};

/// Surface configuration
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// VSync enabled
    pub vsync: bool,
}

impl SurfaceConfig {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            vsync: true,
        }
    }

    pub fn with_vsync(mut self, vsync: bool) -> Self {
        self.vsync = vsync;
        self
    }
}

/// Render surface for the main window
pub struct RenderSurface {
    surface: Surface<'static>,
    config: SurfaceConfiguration,
    format: TextureFormat,
    device: Arc<Device>,
    queue: Arc<Queue>,
}

impl RenderSurface {
    /// Create a new render surface for a window
    pub fn new(gpu: &GpuContext, window: Arc<Window>, config: SurfaceConfig) -> Result<Self, GpuError> {
        info!("Creating render surface ({}x{})", config.width, config.height);

        let surface = gpu
            .instance
            .create_surface(window)
            .map_err(|e| GpuError::Surface(e.to_string()))?;

        if !gpu.adapter.is_surface_supported(&surface) {
            return Err(GpuError::Surface("adapter cannot present to this window".to_string()));
        }

        let caps = surface.get_capabilities(&gpu.adapter);
        let format = caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first())
            .copied()
            .ok_or_else(|| GpuError::Surface("no supported surface formats".to_string()))?;
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        debug!("Surface format: {:?}", format);

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format,
            width: config.width.max(1),
            height: config.height.max(1),
            present_mode: if config.vsync {
                wgpu::PresentMode::AutoVsync
            } else {
                wgpu::PresentMode::AutoNoVsync
            },
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };

        surface.configure(&gpu.device, &surface_config);

        Ok(Self {
            surface,
            config: surface_config,
            format,
            device: gpu.device.clone(),
            queue: gpu.queue.clone(),
        })
    }

    /// Resize the surface
    pub fn resize(&mut self, width: u32, height: u32) {
        let (width, height) = (width.max(1), height.max(1));
        if width == self.config.width && height == self.config.height {
            return;
        }

        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        debug!("Surface resized to {}x{}", width, height);
    }

    /// Current dimensions
    pub fn dimensions(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    /// Acquire the next swapchain image.
    ///
    /// A lost or outdated surface is reconfigured and reported as
    /// `GpuError::SurfaceLost`; the caller skips this frame.
    pub fn begin_frame(&self) -> Result<Frame, GpuError> {
        let output = match self.surface.get_current_texture() {
            Ok(output) => output,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                warn!("Surface lost, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return Err(GpuError::SurfaceLost);
            }
            Err(e) => return Err(GpuError::Surface(e.to_string())),
        };

        let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());

        let encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Frame Encoder"),
        });

        Ok(Frame {
            output,
            view,
            encoder,
            extra: Vec::new(),
            queue: self.queue.clone(),
        })
    }
}

/// A frame being rendered
pub struct Frame {
    output: SurfaceTexture,
    /// Swapchain image view
    pub view: TextureView,
    /// Command encoder for this frame
    pub encoder: CommandEncoder,
    /// Command buffers recorded elsewhere, submitted before `encoder`
    pub extra: Vec<CommandBuffer>,
    queue: Arc<Queue>,
}

impl Frame {
    /// Submit the frame and present
    pub fn present(self) {
        self.queue
            .submit(self.extra.into_iter().chain(std::iter::once(self.encoder.finish())));
        self.output.present();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_config() {
        let config = SurfaceConfig::new(800, 600);
        assert_eq!(config.width, 800);
        assert_eq!(config.height, 600);
        assert!(config.vsync);
        assert!(!config.with_vsync(false).vsync);
    }
}
