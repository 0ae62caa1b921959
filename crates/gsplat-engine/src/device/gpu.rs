use anyhow::{Context, Result};

use super::GpuInit;

/// Owns the wgpu core objects used for compute work.
///
/// Unlike a windowed renderer there is no surface; frames are plain command
/// encoders submitted to the queue.
pub struct Gpu {
    /// Selected adapter.
    adapter: wgpu::Adapter,

    /// Logical device.
    device: wgpu::Device,

    /// Command queue.
    queue: wgpu::Queue,
}

impl Gpu {
    /// Creates a device without any surface attached.
    ///
    /// Adapter/device acquisition is asynchronous under wgpu; use
    /// [`Gpu::headless_blocking`] from synchronous code.
    pub async fn headless(init: GpuInit) -> Result<Self> {
        let GpuInit {
            power_preference,
            force_fallback_adapter,
            required_features,
            required_limits,
        } = init;

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference,
                compatible_surface: None,
                force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let required_limits = required_limits.unwrap_or_else(|| adapter.limits());

        let caps = adapter.get_downlevel_capabilities();
        anyhow::ensure!(
            caps.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS),
            "adapter {:?} does not support compute shaders",
            adapter.get_info().name
        );

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("gsplat device"),
                required_features,
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        let info = adapter.get_info();
        log::info!("using adapter {} ({:?})", info.name, info.backend);

        Ok(Self {
            adapter,
            device,
            queue,
        })
    }

    /// Blocking variant of [`Gpu::headless`].
    pub fn headless_blocking(init: GpuInit) -> Result<Self> {
        pollster::block_on(Self::headless(init))
    }

    /// Returns the selected adapter.
    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    /// Returns a reference to the logical device.
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Returns a reference to the command queue.
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }
}
