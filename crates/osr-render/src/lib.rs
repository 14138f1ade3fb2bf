//! osr Render - GPU side of the offscreen browser view
//!
//! A single wgpu device driving one window surface, the egui painter,
//! and the bridge that mirrors browser frames into a GPU texture the
//! UI can display.

mod gpu;
mod surface;
mod texture;
mod ui;

pub use gpu::{GpuConfig, GpuContext, GpuError};
pub use surface::{Frame, RenderSurface, SurfaceConfig};
pub use texture::{
    SyncOutcome, TextureBackend, TextureBridge, WgpuTexture, WgpuTextureBackend,
    BROWSER_TEXTURE_FORMAT,
};
pub use ui::UiRenderer;
