//! Texture Bridge - mirrors browser frames into a GPU texture
//!
//! Same-size frames are written into the existing texture in place.
//! A size change (or the very first frame) recreates the texture and
//! rebinds it to the UI texture id. The old texture is released only
//! after the device is idle, so no in-flight command buffer still reads
//! it.
//!
//! The decision logic lives in `TextureBridge`; the GPU work behind the
//! `TextureBackend` trait, implemented for wgpu + egui by
//! `WgpuTextureBackend`.

use crate::gpu::GpuError;
use egui::TextureId;
use tracing::{debug, info};
use wgpu::{Device, Queue};

/// Format of the browser texture; frames arrive converted to RGBA.
pub const BROWSER_TEXTURE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU operations the bridge needs
pub trait TextureBackend {
    /// GPU-side texture resource
    type Texture;

    /// Largest accepted texture side.
    fn max_dimension(&self) -> u32;

    /// Allocate a `width x height` texture holding `pixels` (RGBA).
    fn create(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Self::Texture, GpuError>;

    /// Overwrite the contents of a same-sized texture.
    fn update(&mut self, texture: &Self::Texture, pixels: &[u8], width: u32, height: u32);

    /// Point a UI texture id at `texture`, reusing `previous` if given.
    fn bind(&mut self, texture: &Self::Texture, previous: Option<TextureId>) -> TextureId;

    /// Forget a UI texture id.
    fn unbind(&mut self, id: TextureId);

    /// Block until the GPU has finished all submitted work.
    fn wait_idle(&mut self);

    /// Free a texture no longer referenced by any pending work.
    fn release(&mut self, texture: Self::Texture);
}

/// What a `sync` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// A new texture was allocated and bound
    Recreated,
    /// The existing texture was overwritten
    Updated,
}

#[derive(Debug)]
struct Bound<T> {
    texture: T,
    id: TextureId,
    width: u32,
    height: u32,
}

/// GPU mirror of the latest browser frame
#[derive(Debug)]
pub struct TextureBridge<T> {
    current: Option<Bound<T>>,
    recreations: u64,
    updates: u64,
}

impl<T> Default for TextureBridge<T> {
    fn default() -> Self {
        Self {
            current: None,
            recreations: 0,
            updates: 0,
        }
    }
}

impl<T> TextureBridge<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Upload a frame, recreating the texture only when its size changed.
    ///
    /// On error the previous texture (if any) stays bound and usable.
    pub fn sync<B>(&mut self, backend: &mut B, pixels: &[u8], width: u32, height: u32) -> Result<SyncOutcome, GpuError>
    where
        B: TextureBackend<Texture = T>,
    {
        if width == 0 || height == 0 {
            return Err(GpuError::InvalidSize { width, height });
        }
        let max = backend.max_dimension();
        if width > max || height > max {
            return Err(GpuError::TextureTooLarge { width, height, max });
        }
        let need = width as usize * height as usize * 4;
        if pixels.len() < need {
            return Err(GpuError::DataSize {
                got: pixels.len(),
                need,
            });
        }
        let pixels = &pixels[..need];

        if let Some(bound) = &self.current {
            if bound.width == width && bound.height == height {
                backend.update(&bound.texture, pixels, width, height);
                self.updates += 1;
                return Ok(SyncOutcome::Updated);
            }
        }

        let texture = backend.create(pixels, width, height)?;
        let id = match self.current.take() {
            Some(old) => {
                debug!(
                    "Browser texture resize {}x{} -> {}x{}",
                    old.width, old.height, width, height
                );
                backend.wait_idle();
                let id = backend.bind(&texture, Some(old.id));
                backend.release(old.texture);
                id
            }
            None => backend.bind(&texture, None),
        };

        self.current = Some(Bound {
            texture,
            id,
            width,
            height,
        });
        self.recreations += 1;
        info!("Browser texture created ({}x{}, {:?})", width, height, id);

        Ok(SyncOutcome::Recreated)
    }

    /// Texture id to hand to the image widget, once a frame has landed.
    pub fn texture_id(&self) -> Option<TextureId> {
        self.current.as_ref().map(|b| b.id)
    }

    /// Size of the live texture.
    pub fn size(&self) -> Option<(u32, u32)> {
        self.current.as_ref().map(|b| (b.width, b.height))
    }

    /// Number of texture (re)creations so far.
    pub fn recreations(&self) -> u64 {
        self.recreations
    }

    /// Number of in-place updates so far.
    pub fn updates(&self) -> u64 {
        self.updates
    }

    /// Drop the texture for good. Waits for the device first.
    pub fn release<B>(&mut self, backend: &mut B)
    where
        B: TextureBackend<Texture = T>,
    {
        if let Some(bound) = self.current.take() {
            backend.wait_idle();
            backend.unbind(bound.id);
            backend.release(bound.texture);
            debug!("Browser texture released");
        }
    }
}

/// A wgpu texture and its view
#[derive(Debug)]
pub struct WgpuTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl WgpuTexture {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }
}

/// `TextureBackend` over a wgpu device and the egui painter
pub struct WgpuTextureBackend<'a> {
    device: &'a Device,
    queue: &'a Queue,
    renderer: &'a mut egui_wgpu::Renderer,
    max_dimension: u32,
}

impl<'a> WgpuTextureBackend<'a> {
    pub fn new(
        device: &'a Device,
        queue: &'a Queue,
        renderer: &'a mut egui_wgpu::Renderer,
        max_dimension: u32,
    ) -> Self {
        Self {
            device,
            queue,
            renderer,
            max_dimension,
        }
    }

    fn write(&self, texture: &wgpu::Texture, pixels: &[u8], width: u32, height: u32) {
        // wgpu stages the data through a host-visible buffer and inserts
        // the transfer/sampling barriers around the copy.
        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            pixels,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(4 * width),
                rows_per_image: Some(height),
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }
}

impl TextureBackend for WgpuTextureBackend<'_> {
    type Texture = WgpuTexture;

    fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    fn create(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<WgpuTexture, GpuError> {
        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Browser Texture"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: BROWSER_TEXTURE_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.write(&texture, pixels, width, height);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let validation = pollster::block_on(self.device.pop_error_scope());
        let out_of_memory = pollster::block_on(self.device.pop_error_scope());
        if let Some(error) = validation.or(out_of_memory) {
            texture.destroy();
            return Err(GpuError::TextureCreation(error.to_string()));
        }

        Ok(WgpuTexture { texture, view })
    }

    fn update(&mut self, texture: &WgpuTexture, pixels: &[u8], width: u32, height: u32) {
        self.write(&texture.texture, pixels, width, height);
    }

    fn bind(&mut self, texture: &WgpuTexture, previous: Option<TextureId>) -> TextureId {
        match previous {
            Some(id) => {
                self.renderer.update_egui_texture_from_wgpu_texture(
                    self.device,
                    &texture.view,
                    wgpu::FilterMode::Linear,
                    id,
                );
                id
            }
            None => self
                .renderer
                .register_native_texture(self.device, &texture.view, wgpu::FilterMode::Linear),
        }
    }

    fn unbind(&mut self, id: TextureId) {
        self.renderer.free_texture(&id);
    }

    fn wait_idle(&mut self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }

    fn release(&mut self, texture: WgpuTexture) {
        texture.texture.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Call {
        Create(u32, u32),
        Update(u32, u32),
        Bind(u32, Option<TextureId>),
        Unbind(TextureId),
        WaitIdle,
        Release(u32),
    }

    /// Backend that records calls; textures are just serial numbers
    #[derive(Default)]
    struct FakeBackend {
        calls: Vec<Call>,
        next: u32,
        fail_create: bool,
    }

    impl TextureBackend for FakeBackend {
        type Texture = u32;

        fn max_dimension(&self) -> u32 {
            4096
        }

        fn create(&mut self, _pixels: &[u8], width: u32, height: u32) -> Result<u32, GpuError> {
            if self.fail_create {
                return Err(GpuError::TextureCreation("out of memory".to_string()));
            }
            self.calls.push(Call::Create(width, height));
            self.next += 1;
            Ok(self.next)
        }

        fn update(&mut self, _texture: &u32, _pixels: &[u8], width: u32, height: u32) {
            self.calls.push(Call::Update(width, height));
        }

        fn bind(&mut self, texture: &u32, previous: Option<TextureId>) -> TextureId {
            self.calls.push(Call::Bind(*texture, previous));
            previous.unwrap_or(TextureId::User(*texture as u64))
        }

        fn unbind(&mut self, id: TextureId) {
            self.calls.push(Call::Unbind(id));
        }

        fn wait_idle(&mut self) {
            self.calls.push(Call::WaitIdle);
        }

        fn release(&mut self, texture: u32) {
            self.calls.push(Call::Release(texture));
        }
    }

    fn pixels(width: u32, height: u32) -> Vec<u8> {
        vec![0x7F; (width * height * 4) as usize]
    }

    #[test]
    fn test_first_sync_creates() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();
        assert!(bridge.texture_id().is_none());

        let outcome = bridge.sync(&mut backend, &pixels(4, 4), 4, 4).unwrap();
        assert_eq!(outcome, SyncOutcome::Recreated);
        assert_eq!(bridge.recreations(), 1);
        assert_eq!(bridge.size(), Some((4, 4)));
        assert_eq!(bridge.texture_id(), Some(TextureId::User(1)));
        assert_eq!(backend.calls, vec![Call::Create(4, 4), Call::Bind(1, None)]);
    }

    #[test]
    fn test_same_size_updates_in_place() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();
        let px = pixels(16, 8);

        bridge.sync(&mut backend, &px, 16, 8).unwrap();
        for _ in 0..5 {
            let outcome = bridge.sync(&mut backend, &px, 16, 8).unwrap();
            assert_eq!(outcome, SyncOutcome::Updated);
        }

        assert_eq!(bridge.recreations(), 1);
        assert_eq!(bridge.updates(), 5);
        assert!(!backend.calls.contains(&Call::WaitIdle));
    }

    #[test]
    fn test_resize_recreates_once() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();

        bridge.sync(&mut backend, &pixels(100, 100), 100, 100).unwrap();
        bridge.sync(&mut backend, &pixels(200, 150), 200, 150).unwrap();

        assert_eq!(bridge.recreations(), 2);
        assert_eq!(bridge.updates(), 0);
        assert_eq!(bridge.size(), Some((200, 150)));
    }

    #[test]
    fn test_resize_waits_before_release_and_keeps_id() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();

        bridge.sync(&mut backend, &pixels(2, 2), 2, 2).unwrap();
        let id = bridge.texture_id();
        backend.calls.clear();

        bridge.sync(&mut backend, &pixels(3, 2), 3, 2).unwrap();
        assert_eq!(
            backend.calls,
            vec![
                Call::Create(3, 2),
                Call::WaitIdle,
                Call::Bind(2, Some(TextureId::User(1))),
                Call::Release(1),
            ]
        );
        assert_eq!(bridge.texture_id(), id);
    }

    #[test]
    fn test_each_dimension_change_counts() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();

        bridge.sync(&mut backend, &pixels(8, 8), 8, 8).unwrap();
        bridge.sync(&mut backend, &pixels(8, 9), 8, 9).unwrap();
        bridge.sync(&mut backend, &pixels(8, 9), 8, 9).unwrap();
        bridge.sync(&mut backend, &pixels(7, 9), 7, 9).unwrap();

        assert_eq!(bridge.recreations(), 3);
        assert_eq!(bridge.updates(), 1);
    }

    #[test]
    fn test_create_failure_keeps_previous() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();
        bridge.sync(&mut backend, &pixels(4, 4), 4, 4).unwrap();

        backend.fail_create = true;
        let err = bridge.sync(&mut backend, &pixels(5, 5), 5, 5).unwrap_err();
        assert!(matches!(err, GpuError::TextureCreation(_)));
        assert_eq!(bridge.size(), Some((4, 4)));
        assert_eq!(bridge.texture_id(), Some(TextureId::User(1)));
        assert_eq!(bridge.recreations(), 1);
        assert!(!backend.calls.iter().any(|c| matches!(c, Call::Release(_))));
    }

    #[test]
    fn test_create_failure_without_previous() {
        let mut backend = FakeBackend {
            fail_create: true,
            ..Default::default()
        };
        let mut bridge = TextureBridge::<u32>::new();

        assert!(bridge.sync(&mut backend, &pixels(4, 4), 4, 4).is_err());
        assert!(bridge.texture_id().is_none());
        assert_eq!(bridge.recreations(), 0);
    }

    #[test]
    fn test_rejects_bad_input() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();

        assert!(matches!(
            bridge.sync(&mut backend, &[], 0, 4),
            Err(GpuError::InvalidSize { .. })
        ));
        assert!(matches!(
            bridge.sync(&mut backend, &[], 5000, 1),
            Err(GpuError::TextureTooLarge { max: 4096, .. })
        ));
        assert!(matches!(
            bridge.sync(&mut backend, &[0; 4], 2, 2),
            Err(GpuError::DataSize { got: 4, need: 16 })
        ));
        assert!(backend.calls.is_empty());
    }

    #[test]
    fn test_release() {
        let mut backend = FakeBackend::default();
        let mut bridge = TextureBridge::new();
        bridge.sync(&mut backend, &pixels(1, 1), 1, 1).unwrap();
        backend.calls.clear();

        bridge.release(&mut backend);
        assert_eq!(
            backend.calls,
            vec![Call::WaitIdle, Call::Unbind(TextureId::User(1)), Call::Release(1)]
        );
        assert!(bridge.texture_id().is_none());

        // Second release is a no-op
        bridge.release(&mut backend);
        assert_eq!(backend.calls.len(), 3);
    }

    #[test]
    #[ignore = "requires GPU"]
    fn test_wgpu_backend_round_trip() {
        let gpu = pollster::block_on(crate::GpuContext::with_defaults()).unwrap();
        let mut renderer = egui_wgpu::Renderer::new(
            &gpu.device,
            wgpu::TextureFormat::Bgra8UnormSrgb,
            None,
            1,
            false,
        );
        let mut bridge = TextureBridge::new();
        let mut backend =
            WgpuTextureBackend::new(&gpu.device, &gpu.queue, &mut renderer, gpu.max_texture_dimension());

        assert_eq!(bridge.sync(&mut backend, &pixels(4, 4), 4, 4).unwrap(), SyncOutcome::Recreated);
        assert_eq!(bridge.sync(&mut backend, &pixels(4, 4), 4, 4).unwrap(), SyncOutcome::Updated);
        assert_eq!(bridge.sync(&mut backend, &pixels(8, 2), 8, 2).unwrap(), SyncOutcome::Recreated);
        bridge.release(&mut backend);
    }
}
