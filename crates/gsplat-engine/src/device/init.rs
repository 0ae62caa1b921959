/// Initialization parameters for the headless GPU layer.
#[derive(Debug, Clone)]
pub struct GpuInit {
    /// Adapter preference; sorting millions of keys wants the discrete GPU.
    pub power_preference: wgpu::PowerPreference,

    /// Allow falling back to a software adapter (e.g. CI without a GPU).
    pub force_fallback_adapter: bool,

    /// Required wgpu features. The sort kernels need none.
    pub required_features: wgpu::Features,

    /// Limits requested from the device. `None` takes the adapter's own
    /// limits; the wgpu defaults cap a storage binding at 128 MiB (about 11M
    /// positions).
    ///
    /// The kernels use at most 6 storage buffers per stage and 256 invocations
    /// per workgroup.
    pub required_limits: Option<wgpu::Limits>,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: None,
        }
    }
}
