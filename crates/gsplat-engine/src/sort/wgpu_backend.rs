use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use super::backend::{ComputeBackend, Dispatch, Kernel, SortConstants, Slot};

/// WGSL source of the bundled sort kernels.
pub const RADIX_SORT_WGSL: &str = include_str!("shaders/radix_sort.wgsl");

/// Device buffer handle. Clones share the buffer.
pub type WgpuBuffer = Arc<wgpu::Buffer>;

struct KernelPipeline {
    layout: wgpu::BindGroupLayout,
    pipeline: wgpu::ComputePipeline,
}

/// Command encoder plus the constant buffers its dispatches read.
///
/// Constant buffers go back to the backend's free list on submit.
pub struct WgpuStream {
    encoder: wgpu::CommandEncoder,
    uniforms: Vec<wgpu::Buffer>,
}

/// [`ComputeBackend`] on top of a wgpu device.
///
/// Kernels are looked up by entry point name in the WGSL module. A kernel that
/// is missing, or whose workgroup exceeds the device limits, is reported as
/// unsupported rather than failing construction.
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    kernels: HashMap<Kernel, KernelPipeline>,
    max_groups: u32,
    max_binding_words: u64,
    spare_uniforms: RefCell<Vec<wgpu::Buffer>>,
}

impl WgpuBackend {
    /// Builds pipelines for the bundled kernels.
    pub fn with_default_kernels(device: &wgpu::Device, queue: &wgpu::Queue) -> Self {
        Self::new(device, queue, RADIX_SORT_WGSL)
    }

    /// Builds pipelines for every kernel found in `source`.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, source: &str) -> Self {
        let mut kernels = HashMap::new();

        match reflect_kernels(source, &device.limits()) {
            Ok(available) if !available.is_empty() => {
                let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some("gsplat radix sort shader"),
                    source: wgpu::ShaderSource::Wgsl(source.into()),
                });
                for kernel in available {
                    kernels.insert(kernel, build_pipeline(device, &shader, kernel));
                }
            }
            Ok(_) => log::warn!("sort shader exposes none of the required kernels"),
            Err(e) => log::error!("sort shader rejected: {e:#}"),
        }

        for kernel in Kernel::ALL {
            if !kernels.contains_key(&kernel) {
                log::warn!("kernel {} unavailable on this device", kernel.entry_point());
            }
        }

        let limits = device.limits();
        Self {
            device: device.clone(),
            queue: queue.clone(),
            kernels,
            max_groups: limits.max_compute_workgroups_per_dimension,
            max_binding_words: u64::from(limits.max_storage_buffer_binding_size) / 4,
            spare_uniforms: RefCell::new(Vec::new()),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    fn uniform_buffer(&self) -> wgpu::Buffer {
        if let Some(buffer) = self.spare_uniforms.borrow_mut().pop() {
            return buffer;
        }
        self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gsplat sort constants"),
            size: std::mem::size_of::<SortConstants>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }
}

/// Parses and validates `source`, returning the kernels whose entry points
/// exist as compute stages and fit in `limits`.
pub fn reflect_kernels(source: &str, limits: &wgpu::Limits) -> Result<Vec<Kernel>> {
    let module = naga::front::wgsl::parse_str(source)
        .map_err(|e| anyhow::anyhow!(e.emit_to_string(source)))
        .context("failed to parse WGSL")?;

    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::default(),
    )
    .validate(&module)
    .map_err(|e| anyhow::anyhow!("{:?}", e.into_inner()))
    .context("failed to validate WGSL")?;

    let mut found = Vec::new();
    for kernel in Kernel::ALL {
        let Some(ep) = module
            .entry_points
            .iter()
            .find(|ep| ep.name == kernel.entry_point() && ep.stage == naga::ShaderStage::Compute)
        else {
            continue;
        };

        let [x, y, z] = ep.workgroup_size;
        let fits = x <= limits.max_compute_workgroup_size_x
            && y <= limits.max_compute_workgroup_size_y
            && z <= limits.max_compute_workgroup_size_z
            && x * y * z <= limits.max_compute_invocations_per_workgroup;
        if fits {
            found.push(kernel);
        } else {
            log::warn!(
                "kernel {} workgroup {:?} exceeds device limits",
                kernel.entry_point(),
                ep.workgroup_size
            );
        }
    }
    Ok(found)
}

fn build_pipeline(
    device: &wgpu::Device,
    shader: &wgpu::ShaderModule,
    kernel: Kernel,
) -> KernelPipeline {
    let entries: Vec<wgpu::BindGroupLayoutEntry> = kernel
        .slots()
        .iter()
        .map(|&slot| {
            let ty = match slot {
                Slot::Constants => wgpu::BufferBindingType::Uniform,
                Slot::Positions => wgpu::BufferBindingType::Storage { read_only: true },
                _ => wgpu::BufferBindingType::Storage { read_only: false },
            };
            wgpu::BindGroupLayoutEntry {
                binding: slot.binding(),
                visibility: wgpu::ShaderStages::COMPUTE,
                ty: wgpu::BindingType::Buffer {
                    ty,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }
        })
        .collect();

    let label = kernel.entry_point();
    let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some(label),
        entries: &entries,
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some(label),
        bind_group_layouts: &[&layout],
        immediate_size: 0,
    });

    let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
        label: Some(label),
        layout: Some(&pipeline_layout),
        module: shader,
        entry_point: Some(label),
        compilation_options: Default::default(),
        cache: None,
    });

    KernelPipeline { layout, pipeline }
}

impl ComputeBackend for WgpuBackend {
    type Buffer = WgpuBuffer;
    type Stream = WgpuStream;

    fn supports(&self, kernel: Kernel) -> bool {
        self.kernels.contains_key(&kernel)
    }

    fn max_binding_words(&self) -> u64 {
        self.max_binding_words
    }

    fn buffer_words(&self, buffer: &WgpuBuffer) -> u64 {
        buffer.size() / 4
    }

    fn create_buffer(&self, label: &str, words: u32) -> WgpuBuffer {
        // Zero-sized storage bindings are invalid; keep at least one word.
        let size = u64::from(words.max(1)) * 4;
        Arc::new(self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        }))
    }

    fn write_buffer(&self, buffer: &WgpuBuffer, data: &[u32]) {
        if data.is_empty() {
            return;
        }
        self.queue.write_buffer(buffer, 0, bytemuck::cast_slice(data));
    }

    fn release_buffer(&self, buffer: WgpuBuffer) {
        buffer.destroy();
    }

    fn begin_stream(&self, label: &str) -> WgpuStream {
        WgpuStream {
            encoder: self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some(label) }),
            uniforms: Vec::new(),
        }
    }

    fn dispatch(&self, stream: &mut WgpuStream, dispatch: Dispatch<'_, WgpuBuffer>) {
        let kernel = dispatch.kernel;
        let Some(entry) = self.kernels.get(&kernel) else {
            log::warn!("dispatch of unsupported kernel {}", kernel.entry_point());
            return;
        };
        if dispatch.groups == 0 {
            return;
        }
        if dispatch.groups > self.max_groups {
            log::error!(
                "{}: {} workgroups exceeds device limit {}",
                kernel.entry_point(),
                dispatch.groups,
                self.max_groups
            );
            return;
        }
        if let Some((slot, words)) =
            dispatch.oversized_binding(|b| self.buffer_words(b), self.max_binding_words)
        {
            log::error!(
                "{}: {words}-word buffer at {slot:?} exceeds the {}-word binding limit",
                kernel.entry_point(),
                self.max_binding_words
            );
            return;
        }
        if let Some(slot) = kernel
            .slots()
            .iter()
            .find(|&&slot| slot != Slot::Constants && dispatch.bindings.get(slot).is_none())
        {
            log::error!("{}: no buffer bound at {:?}", kernel.entry_point(), slot);
            return;
        }

        let uniform = self.uniform_buffer();
        self.queue.write_buffer(&uniform, 0, bytemuck::bytes_of(&dispatch.constants));

        let bind_group = {
            let entries: Vec<wgpu::BindGroupEntry> = kernel
                .slots()
                .iter()
                .filter_map(|&slot| {
                    let resource = match dispatch.bindings.get(slot) {
                        Some(buffer) => buffer.as_entire_binding(),
                        None if slot == Slot::Constants => uniform.as_entire_binding(),
                        None => return None,
                    };
                    Some(wgpu::BindGroupEntry {
                        binding: slot.binding(),
                        resource,
                    })
                })
                .collect();

            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(kernel.entry_point()),
                layout: &entry.layout,
                entries: &entries,
            })
        };

        {
            let mut pass = stream.encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some(kernel.entry_point()),
                timestamp_writes: None,
            });
            pass.set_pipeline(&entry.pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.dispatch_workgroups(dispatch.groups, 1, 1);
        }
        stream.uniforms.push(uniform);
    }

    fn submit(&self, stream: WgpuStream) {
        let WgpuStream { encoder, uniforms } = stream;
        self.queue.submit(std::iter::once(encoder.finish()));
        // Later writes are queued behind this submission.
        self.spare_uniforms.borrow_mut().extend(uniforms);
    }

    fn read_buffer(&self, buffer: &WgpuBuffer) -> Result<Vec<u32>> {
        let size = buffer.size();
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gsplat readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gsplat readback"),
            });
        encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
        let submission = self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (sender, receiver) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: Some(submission),
                timeout: None,
            })
            .context("device poll failed during readback")?;
        receiver
            .recv()
            .context("readback callback dropped")?
            .context("failed to map readback buffer")?;

        let words = {
            let mapped = slice.get_mapped_range();
            bytemuck::cast_slice::<u8, u32>(&mapped).to_vec()
        };
        staging.unmap();
        Ok(words)
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Mat4;

    use super::*;
    use crate::device::{Gpu, GpuInit};
    use crate::resources::ResourcePool;
    use crate::sort::backend::KernelBindings;
    use crate::sort::{upload_positions, CpuBackend, KeyOrder, RadixSort, SortArgs};

    /// A device, preferring hardware and falling back to a software adapter.
    /// `None` when the machine has neither.
    fn test_gpu(required_limits: Option<wgpu::Limits>) -> Option<Gpu> {
        [false, true].into_iter().find_map(|force_fallback_adapter| {
            Gpu::headless_blocking(GpuInit {
                force_fallback_adapter,
                required_limits: required_limits.clone(),
                ..Default::default()
            })
            .ok()
        })
    }

    /// Integer coordinates keep every view-space depth exact on both backends.
    fn grid_positions(count: usize) -> Vec<[f32; 3]> {
        let mut state = 0x9e37_79b9_u32;
        let mut next = move || {
            state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            ((state >> 16) % 2001) as f32 - 1000.0
        };
        (0..count).map(|_| [next(), next(), next()]).collect()
    }

    /// Column-major view matrix whose products and sums are exact in `f32`.
    fn exact_view() -> Mat4 {
        Mat4::from_cols_array(&[
            1.0, 0.0, 0.5, 0.0, //
            0.0, 1.0, -0.25, 0.0, //
            0.0, 0.0, 1.0, 0.0, //
            0.0, 0.0, -8.0, 1.0,
        ])
    }

    fn sort_on<B: ComputeBackend>(
        backend: Rc<B>,
        positions: &[[f32; 3]],
    ) -> (Vec<u32>, Vec<u32>) {
        let sort = RadixSort::new(backend.clone());
        assert!(sort.is_valid());

        let count = positions.len() as u32;
        let buffer = upload_positions(&*backend, positions);
        let pool = ResourcePool::create(&*backend, count, buffer);

        let mut stream = backend.begin_stream("test");
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count,
                matrix_mv: exact_view(),
                key_order: KeyOrder::Ascending,
            },
        );
        backend.submit(stream);

        let n = count as usize;
        let keys = backend.read_buffer(pool.input_keys().unwrap()).unwrap();
        let order = backend.read_buffer(pool.order().unwrap()).unwrap();
        (keys[..n].to_vec(), order[..n].to_vec())
    }

    #[test]
    fn gpu_sort_matches_cpu_reference() {
        let Some(gpu) = test_gpu(None) else {
            return;
        };
        let backend = Rc::new(WgpuBackend::with_default_kernels(gpu.device(), gpu.queue()));

        for count in [1, 3840, 3841, 7680] {
            let positions = grid_positions(count);
            let expected = sort_on(Rc::new(CpuBackend::new()), &positions);
            let actual = sort_on(backend.clone(), &positions);
            assert_eq!(actual.0, expected.0, "keys differ for {count} splats");
            assert_eq!(actual.1, expected.1, "order differs for {count} splats");
        }
    }

    #[test]
    fn gpu_skips_bindings_above_device_limit() {
        let limits = wgpu::Limits {
            max_storage_buffer_binding_size: 4096,
            ..wgpu::Limits::default()
        };
        let Some(gpu) = test_gpu(Some(limits)) else {
            return;
        };
        let backend = Rc::new(WgpuBackend::with_default_kernels(gpu.device(), gpu.queue()));
        let max = backend.max_binding_words();

        // Whole sort: the position buffer alone is over the limit.
        let count = (max / 3 + 1) as u32;
        let positions = backend.create_buffer("positions", 3 * count);
        let pool = ResourcePool::create(&*backend, count, positions);
        let sort = RadixSort::new(backend.clone());
        let mut stream = backend.begin_stream("test");
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count,
                matrix_mv: Mat4::IDENTITY,
                key_order: KeyOrder::Ascending,
            },
        );

        // Single launches: the oversized one is dropped, the small one runs.
        let large = backend.create_buffer("large", (max + 1) as u32);
        let small = backend.create_buffer("small", 4);
        for payload in [&large, &small] {
            backend.dispatch(
                &mut stream,
                Dispatch {
                    kernel: Kernel::InitPayload,
                    groups: 1,
                    constants: SortConstants {
                        num_keys: 4,
                        ..Default::default()
                    },
                    bindings: KernelBindings {
                        payload: Some(payload),
                        ..Default::default()
                    },
                },
            );
        }
        backend.submit(stream);

        assert_eq!(backend.read_buffer(&small).unwrap(), [0, 1, 2, 3]);
        assert!(backend.read_buffer(&large).unwrap()[..4].iter().all(|&w| w == 0));
    }

    #[test]
    fn bundled_shader_exposes_every_kernel() {
        let kernels = reflect_kernels(RADIX_SORT_WGSL, &wgpu::Limits::default()).unwrap();
        assert_eq!(kernels, Kernel::ALL);
    }

    #[test]
    fn missing_entry_points_are_skipped() {
        let source = r#"
            @group(0) @binding(7) var<storage, read_write> global_hist: array<atomic<u32>>;

            @compute @workgroup_size(256)
            fn InitHistogram(@builtin(local_invocation_id) lid: vec3<u32>) {
                atomicStore(&global_hist[lid.x], 0u);
            }
        "#;
        let kernels = reflect_kernels(source, &wgpu::Limits::default()).unwrap();
        assert_eq!(kernels, [Kernel::InitHistogram]);
    }

    #[test]
    fn oversized_workgroups_are_unsupported() {
        let limits = wgpu::Limits {
            max_compute_invocations_per_workgroup: 128,
            max_compute_workgroup_size_x: 128,
            ..wgpu::Limits::default()
        };
        let kernels = reflect_kernels(RADIX_SORT_WGSL, &limits).unwrap();
        assert!(kernels.is_empty());
    }

    #[test]
    fn malformed_source_is_an_error() {
        assert!(reflect_kernels("fn broken(", &wgpu::Limits::default()).is_err());
    }
}
