use anyhow::Result;
use bytemuck::{Pod, Zeroable};

use super::config::{ELEMENTS_PER_GROUP, RADIX};

/// Compute kernels a backend must expose for the sort to be usable.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Kernel {
    /// `payload[i] = i`.
    InitPayload,
    /// Depth key and identity payload per primitive.
    CalcDistance,
    /// Zeroes the global histogram of all passes.
    InitHistogram,
    /// Per-block digit counts plus global digit offsets.
    Upsweep,
    /// Exclusive prefix sum of each digit row across blocks.
    Scan,
    /// Stable scatter into the alternate buffers.
    Downsweep,
}

impl Kernel {
    pub const ALL: [Kernel; 6] = [
        Kernel::InitPayload,
        Kernel::CalcDistance,
        Kernel::InitHistogram,
        Kernel::Upsweep,
        Kernel::Scan,
        Kernel::Downsweep,
    ];

    /// Entry point name inside the kernel module.
    pub fn entry_point(self) -> &'static str {
        match self {
            Kernel::InitPayload => "InitPayload",
            Kernel::CalcDistance => "CalcDistance",
            Kernel::InitHistogram => "InitHistogram",
            Kernel::Upsweep => "Upsweep",
            Kernel::Scan => "Scan",
            Kernel::Downsweep => "Downsweep",
        }
    }

    /// Buffer slots the kernel reads or writes.
    ///
    /// Backends that derive binding layouts from the shader must bind exactly
    /// these slots.
    pub fn slots(self) -> &'static [Slot] {
        use Slot::*;
        match self {
            Kernel::InitPayload => &[Constants, Payload],
            Kernel::CalcDistance => &[Constants, Positions, Keys, Payload],
            Kernel::InitHistogram => &[GlobalHist],
            Kernel::Upsweep => &[Constants, Keys, PassHist, GlobalHist],
            Kernel::Scan => &[Constants, PassHist],
            Kernel::Downsweep => &[
                Constants, Keys, Payload, AltKeys, AltPayload, PassHist, GlobalHist,
            ],
        }
    }

    /// Groups to dispatch for `count` keys spread over `thread_blocks`
    /// partitions.
    pub fn groups(self, count: u32, thread_blocks: u32) -> u32 {
        match self {
            Kernel::InitPayload | Kernel::CalcDistance => count.div_ceil(ELEMENTS_PER_GROUP),
            Kernel::InitHistogram => 1,
            Kernel::Upsweep | Kernel::Downsweep => thread_blocks,
            Kernel::Scan => RADIX,
        }
    }
}

/// Binding slots shared by all kernels. The discriminant is the WGSL binding
/// index in group 0.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Slot {
    Constants = 0,
    Positions = 1,
    Keys = 2,
    Payload = 3,
    AltKeys = 4,
    AltPayload = 5,
    PassHist = 6,
    GlobalHist = 7,
}

impl Slot {
    #[inline]
    pub fn binding(self) -> u32 {
        self as u32
    }
}

/// Uniform block shared by every kernel. Layout matches `SortConstants` in
/// `radix_sort.wgsl`.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct SortConstants {
    /// Column-major `camera.view * local_to_world`.
    pub matrix_mv: [[f32; 4]; 4],
    pub num_keys: u32,
    pub thread_blocks: u32,
    pub radix_shift: u32,
    /// Non-zero inverts every key bit in `CalcDistance`.
    pub descending: u32,
}

impl Default for SortConstants {
    fn default() -> Self {
        Self::zeroed()
    }
}

/// Buffers bound for one dispatch, by slot.
pub struct KernelBindings<'a, B> {
    pub positions: Option<&'a B>,
    pub keys: Option<&'a B>,
    pub payload: Option<&'a B>,
    pub alt_keys: Option<&'a B>,
    pub alt_payload: Option<&'a B>,
    pub pass_hist: Option<&'a B>,
    pub global_hist: Option<&'a B>,
}

impl<B> Default for KernelBindings<'_, B> {
    fn default() -> Self {
        Self {
            positions: None,
            keys: None,
            payload: None,
            alt_keys: None,
            alt_payload: None,
            pass_hist: None,
            global_hist: None,
        }
    }
}

impl<'a, B> KernelBindings<'a, B> {
    /// Buffer bound at `slot`. The constants slot is owned by the backend and
    /// always returns `None`.
    pub fn get(&self, slot: Slot) -> Option<&'a B> {
        match slot {
            Slot::Constants => None,
            Slot::Positions => self.positions,
            Slot::Keys => self.keys,
            Slot::Payload => self.payload,
            Slot::AltKeys => self.alt_keys,
            Slot::AltPayload => self.alt_payload,
            Slot::PassHist => self.pass_hist,
            Slot::GlobalHist => self.global_hist,
        }
    }
}

/// A single kernel launch.
pub struct Dispatch<'a, B> {
    pub kernel: Kernel,
    pub groups: u32,
    pub constants: SortConstants,
    pub bindings: KernelBindings<'a, B>,
}

impl<B> Dispatch<'_, B> {
    /// First bound slot whose buffer is longer than `max_words`, with that
    /// length.
    pub fn oversized_binding(
        &self,
        words: impl Fn(&B) -> u64,
        max_words: u64,
    ) -> Option<(Slot, u64)> {
        self.kernel.slots().iter().find_map(|&slot| {
            let len = words(self.bindings.get(slot)?);
            (len > max_words).then_some((slot, len))
        })
    }
}

/// GPU compute backend the sort is built against.
///
/// All buffers hold 32-bit words. Commands are recorded into a `Stream` and
/// run in recording order once the stream is submitted.
pub trait ComputeBackend {
    /// Cheap, cloneable handle to a device buffer.
    type Buffer: Clone;
    /// Ordered command stream (command encoder / command buffer).
    type Stream;

    /// Whether `kernel` exists and can run on the current device.
    fn supports(&self, kernel: Kernel) -> bool;

    /// Largest buffer, in words, a single dispatch may bind.
    fn max_binding_words(&self) -> u64 {
        u64::MAX
    }

    /// Length of `buffer` in words.
    fn buffer_words(&self, buffer: &Self::Buffer) -> u64;

    /// Allocates a buffer of `words` 32-bit elements. Contents are undefined.
    fn create_buffer(&self, label: &str, words: u32) -> Self::Buffer;

    /// Uploads `data` at the start of `buffer`.
    fn write_buffer(&self, buffer: &Self::Buffer, data: &[u32]);

    /// Releases device memory behind `buffer`.
    fn release_buffer(&self, buffer: Self::Buffer) {
        drop(buffer);
    }

    /// Starts an empty command stream.
    fn begin_stream(&self, label: &str) -> Self::Stream;

    /// Appends a kernel launch to `stream`. Launches binding a buffer above
    /// [`ComputeBackend::max_binding_words`] are dropped with an error log.
    fn dispatch(&self, stream: &mut Self::Stream, dispatch: Dispatch<'_, Self::Buffer>);

    /// Hands a finished stream to the device.
    fn submit(&self, stream: Self::Stream);

    /// Copies a buffer back to host memory, waiting for outstanding work.
    fn read_buffer(&self, buffer: &Self::Buffer) -> Result<Vec<u32>>;
}

/// Uploads `positions` into a new buffer of `3 * len` words.
pub fn upload_positions<B: ComputeBackend>(backend: &B, positions: &[[f32; 3]]) -> B::Buffer {
    let words: &[u32] = bytemuck::cast_slice(positions);
    let buffer = backend.create_buffer("splat positions", words.len() as u32);
    backend.write_buffer(&buffer, words);
    buffer
}
