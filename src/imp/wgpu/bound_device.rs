// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
use crate::imp::DeviceLimits;
use crate::imp::wgpu::error::Error;
use crate::imp::wgpu::mipmaps::MipmapGenerator;
use std::cell::RefCell;
use wgpu::{Limits, Trace};

/// How to pick and open a device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub label: String,
    pub power_preference: wgpu::PowerPreference,
    pub limits: Limits,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        let mut limits = Limits::downlevel_webgl2_defaults();
        //webGL is quite serious about enforcing these, which
        //by default are rather small
        limits.max_texture_dimension_1d = 4096;
        limits.max_texture_dimension_2d = 4096;
        DeviceConfig {
            label: "frame_director".to_string(),
            power_preference: wgpu::PowerPreference::HighPerformance,
            limits,
        }
    }
}

/// A wgpu device and queue, bound and ready to record.
pub struct WgpuBackend {
    pub(super) device: wgpu::Device,
    pub(super) queue: wgpu::Queue,
    adapter: wgpu::Adapter,
    pub(super) mipmaps: RefCell<MipmapGenerator>,
    pub(super) limits: DeviceLimits,
}

impl WgpuBackend {
    /// Picks an adapter from `instance` and opens a device on it.
    ///
    /// Pass the returned future to [`crate::Director::new`]; the director polls it once per
    /// tick until it resolves.
    pub async fn request(
        instance: wgpu::Instance,
        config: DeviceConfig,
    ) -> Result<Self, crate::Error> {
        Self::request_inner(instance, config)
            .await
            .map_err(crate::Error::from)
    }

    async fn request_inner(instance: wgpu::Instance, config: DeviceConfig) -> Result<Self, Error> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: config.power_preference,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await?;
        let info = adapter.get_info();
        logwise::info_sync!(
            "bound adapter {name} ({backend})",
            name = logwise::privacy::LogIt(&info.name),
            backend = logwise::privacy::LogIt(&info.backend)
        );
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some(&config.label),
                required_features: Default::default(),
                required_limits: config.limits.clone(),
                memory_hints: Default::default(),
                trace: Trace::Off,
            })
            .await?;
        device.on_uncaptured_error(Box::new(|error| {
            logwise::error_sync!(
                "uncaptured device error: {error}",
                error = logwise::privacy::LogIt(&error.to_string())
            );
        }));
        let mipmaps = RefCell::new(MipmapGenerator::new(&device));
        Ok(WgpuBackend {
            limits: DeviceLimits {
                max_texture_dimension_2d: config.limits.max_texture_dimension_2d,
            },
            device,
            queue,
            adapter,
            mipmaps,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }
}

impl std::fmt::Debug for WgpuBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuBackend")
            .field("adapter", &self.adapter.get_info().name)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}
