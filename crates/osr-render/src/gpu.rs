//! GPU Context - wgpu initialization and management
//!
//! One instance, adapter, device and queue for the whole application.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use wgpu::{
    Adapter, Device, DeviceDescriptor, Features, Instance, InstanceDescriptor,
    Limits, PowerPreference, Queue, RequestAdapterOptions,
};

/// GPU errors
#[derive(Debug, Error)]
pub enum GpuError {
    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("Failed to create device: {0}")]
    DeviceCreation(String),

    #[error("Surface error: {0}")]
    Surface(String),

    #[error("Surface lost or outdated, reconfigured")]
    SurfaceLost,

    #[error("Invalid texture size {width}x{height}")]
    InvalidSize { width: u32, height: u32 },

    #[error("Texture {width}x{height} exceeds device limit {max}")]
    TextureTooLarge { width: u32, height: u32, max: u32 },

    #[error("Pixel data too small: got {got} bytes, need {need}")]
    DataSize { got: usize, need: usize },

    #[error("Texture creation failed: {0}")]
    TextureCreation(String),
}

/// GPU configuration
#[derive(Debug, Clone)]
pub struct GpuConfig {
    /// Prefer low-power GPU (integrated) over high-performance (discrete)
    pub low_power: bool,
    /// Maximum texture dimension; bounds the browser view size
    pub max_texture_dimension: u32,
}

impl Default for GpuConfig {
    fn default() -> Self {
        Self {
            low_power: true,
            max_texture_dimension: 8192,
        }
    }
}

/// GPU context holding wgpu device and queue
pub struct GpuContext {
    /// wgpu instance
    pub instance: Instance,
    /// Selected adapter
    pub adapter: Adapter,
    /// Logical device
    pub device: Arc<Device>,
    /// Command queue
    pub queue: Arc<Queue>,
    /// Configuration
    pub config: GpuConfig,
}

impl GpuContext {
    /// Create a new GPU context
    pub async fn new(config: GpuConfig) -> Result<Self, GpuError> {
        info!("Initializing GPU context (low_power: {})", config.low_power);

        let instance = Instance::new(&InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let power_preference = if config.low_power {
            PowerPreference::LowPower
        } else {
            PowerPreference::HighPerformance
        };

        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        info!(
            "GPU adapter: {} ({:?})",
            adapter_info.name, adapter_info.backend
        );
        debug!(
            "GPU driver: {} (vendor: {})",
            adapter_info.driver, adapter_info.vendor
        );

        // Never ask for more than the adapter can give
        let max_texture_dimension = config
            .max_texture_dimension
            .min(adapter.limits().max_texture_dimension_2d);
        let limits = Limits {
            max_texture_dimension_2d: max_texture_dimension,
            ..Limits::downlevel_webgl2_defaults()
        };

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("osr-wb GPU Device"),
                    required_features: Features::empty(),
                    required_limits: limits,
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .map_err(|e| GpuError::DeviceCreation(e.to_string()))?;

        device.on_uncaptured_error(Box::new(|error| {
            warn!("wgpu error: {}", error);
        }));

        info!("GPU context initialized (max texture {})", max_texture_dimension);

        Ok(Self {
            instance,
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
            config: GpuConfig {
                max_texture_dimension,
                ..config
            },
        })
    }

    /// Create with default configuration
    pub async fn with_defaults() -> Result<Self, GpuError> {
        Self::new(GpuConfig::default()).await
    }

    /// Largest texture side the device accepts.
    pub fn max_texture_dimension(&self) -> u32 {
        self.config.max_texture_dimension
    }

    /// Block until all submitted GPU work has completed.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}
