//! Reference compute backend.
//!
//! Runs the kernel contracts on the host, one workgroup after another, with the
//! same partitioning and bookkeeping as the WGSL kernels. It exists for tests,
//! headless tooling and devices without compute support; it is not a fast path.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use anyhow::Result;
use glam::{Mat4, Vec3};

use super::backend::{ComputeBackend, Dispatch, Kernel, SortConstants, Slot};
use super::config::{
    ELEMENTS_PER_GROUP, GLOBAL_HISTOGRAM_LEN, PARTITION_SIZE, RADIX, RADIX_BITS,
};
use super::key::{DepthKeyGenerator, KeyOrder};

/// Host-memory buffer handle. Clones share storage.
#[derive(Debug, Clone)]
pub struct CpuBuffer {
    label: Rc<str>,
    words: Rc<RefCell<Vec<u32>>>,
}

impl CpuBuffer {
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.words.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current contents.
    pub fn to_vec(&self) -> Vec<u32> {
        self.words.borrow().clone()
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &CpuBuffer) -> bool {
        Rc::ptr_eq(&self.words, &other.words)
    }
}

#[derive(Debug, Clone)]
struct CpuCommand {
    kernel: Kernel,
    groups: u32,
    constants: SortConstants,
    buffers: [Option<CpuBuffer>; 8],
}

impl CpuCommand {
    fn buffer(&self, slot: Slot) -> Option<&CpuBuffer> {
        self.buffers[slot as usize].as_ref()
    }
}

/// Recorded commands, executed in order by [`CpuBackend::submit`].
#[derive(Debug, Default)]
pub struct CpuStream {
    label: String,
    commands: Vec<CpuCommand>,
}

impl CpuStream {
    /// Number of recorded dispatches.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Kernels in recording order.
    pub fn kernels(&self) -> impl Iterator<Item = Kernel> + '_ {
        self.commands.iter().map(|c| c.kernel)
    }
}

/// Reference backend executing kernels on the calling thread.
#[derive(Debug)]
pub struct CpuBackend {
    supported: Vec<Kernel>,
    max_binding_words: u64,
    live_buffers: Cell<usize>,
}

impl Default for CpuBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuBackend {
    /// Backend exposing every kernel.
    pub fn new() -> Self {
        Self::with_kernels(&Kernel::ALL)
    }

    /// Backend exposing only `kernels`, modelling a device that lacks the rest.
    pub fn with_kernels(kernels: &[Kernel]) -> Self {
        Self {
            supported: kernels.to_vec(),
            max_binding_words: u64::MAX,
            live_buffers: Cell::new(0),
        }
    }

    /// Caps the buffer size a dispatch may bind, modelling a device's storage
    /// binding limit.
    pub fn with_max_binding_words(mut self, words: u64) -> Self {
        self.max_binding_words = words;
        self
    }

    /// Buffers created and not yet released.
    pub fn live_buffers(&self) -> usize {
        self.live_buffers.get()
    }

    fn execute(&self, cmd: &CpuCommand) {
        let complete = cmd
            .kernel
            .slots()
            .iter()
            .all(|&slot| slot == Slot::Constants || cmd.buffer(slot).is_some());
        if !complete {
            log::warn!("cpu backend: {:?} dispatched with missing bindings; skipped", cmd.kernel);
            return;
        }

        match cmd.kernel {
            Kernel::InitPayload => init_payload(cmd),
            Kernel::CalcDistance => calc_distance(cmd),
            Kernel::InitHistogram => init_histogram(cmd),
            Kernel::Upsweep => upsweep(cmd),
            Kernel::Scan => scan(cmd),
            Kernel::Downsweep => downsweep(cmd),
        }
    }
}

impl ComputeBackend for CpuBackend {
    type Buffer = CpuBuffer;
    type Stream = CpuStream;

    fn supports(&self, kernel: Kernel) -> bool {
        self.supported.contains(&kernel)
    }

    fn max_binding_words(&self) -> u64 {
        self.max_binding_words
    }

    fn buffer_words(&self, buffer: &CpuBuffer) -> u64 {
        buffer.len() as u64
    }

    fn create_buffer(&self, label: &str, words: u32) -> CpuBuffer {
        self.live_buffers.set(self.live_buffers.get() + 1);
        CpuBuffer {
            label: label.into(),
            words: Rc::new(RefCell::new(vec![0; words as usize])),
        }
    }

    fn write_buffer(&self, buffer: &CpuBuffer, data: &[u32]) {
        let mut words = buffer.words.borrow_mut();
        let n = data.len().min(words.len());
        if n < data.len() {
            log::warn!(
                "cpu backend: write of {} words truncated to {} for '{}'",
                data.len(),
                n,
                buffer.label
            );
        }
        words[..n].copy_from_slice(&data[..n]);
    }

    fn release_buffer(&self, buffer: CpuBuffer) {
        self.live_buffers.set(self.live_buffers.get().saturating_sub(1));
        drop(buffer);
    }

    fn begin_stream(&self, label: &str) -> CpuStream {
        CpuStream {
            label: label.to_owned(),
            commands: Vec::new(),
        }
    }

    fn dispatch(&self, stream: &mut CpuStream, dispatch: Dispatch<'_, CpuBuffer>) {
        let words = |b: &CpuBuffer| b.len() as u64;
        if let Some((slot, len)) = dispatch.oversized_binding(words, self.max_binding_words) {
            log::error!(
                "cpu backend: {:?} binds {len} words at {slot:?}, limit {}; skipped",
                dispatch.kernel,
                self.max_binding_words
            );
            return;
        }
        let mut buffers: [Option<CpuBuffer>; 8] = Default::default();
        for &slot in dispatch.kernel.slots() {
            buffers[slot as usize] = dispatch.bindings.get(slot).cloned();
        }
        stream.commands.push(CpuCommand {
            kernel: dispatch.kernel,
            groups: dispatch.groups,
            constants: dispatch.constants,
            buffers,
        });
    }

    fn submit(&self, stream: CpuStream) {
        log::trace!("cpu backend: executing '{}' ({} dispatches)", stream.label, stream.len());
        for cmd in &stream.commands {
            self.execute(cmd);
        }
    }

    fn read_buffer(&self, buffer: &CpuBuffer) -> Result<Vec<u32>> {
        Ok(buffer.to_vec())
    }
}

// ── kernels ───────────────────────────────────────────────────────────────
//
// Each function walks `cmd.groups` workgroups. Bindings were checked by
// `CpuBackend::execute`, so a missing buffer here means a bug in `slots()`.

fn bound(cmd: &CpuCommand, slot: Slot) -> &CpuBuffer {
    match cmd.buffer(slot) {
        Some(buffer) => buffer,
        None => unreachable!("{:?} has no {:?} binding", cmd.kernel, slot),
    }
}

fn pass_index(c: &SortConstants) -> usize {
    (c.radix_shift / RADIX_BITS) as usize
}

#[inline]
fn digit(key: u32, shift: u32) -> usize {
    ((key >> shift) & (RADIX - 1)) as usize
}

fn partition(block: u32, num_keys: u32) -> std::ops::Range<usize> {
    let start = block.saturating_mul(PARTITION_SIZE).min(num_keys);
    let end = start.saturating_add(PARTITION_SIZE).min(num_keys);
    start as usize..end as usize
}

fn init_payload(cmd: &CpuCommand) {
    let n = cmd.constants.num_keys as usize;
    let mut payload = bound(cmd, Slot::Payload).words.borrow_mut();
    let end = (cmd.groups as usize * ELEMENTS_PER_GROUP as usize).min(n);
    for (i, slot) in payload.iter_mut().enumerate().take(end) {
        *slot = i as u32;
    }
}

fn calc_distance(cmd: &CpuCommand) {
    let c = &cmd.constants;
    let n = c.num_keys as usize;
    let matrix_mv = Mat4::from_cols_array_2d(&c.matrix_mv);
    let order = if c.descending != 0 {
        KeyOrder::Descending
    } else {
        KeyOrder::Ascending
    };
    let generator = DepthKeyGenerator::new(order);

    let positions = bound(cmd, Slot::Positions).words.borrow();
    let mut keys = bound(cmd, Slot::Keys).words.borrow_mut();
    let mut payload = bound(cmd, Slot::Payload).words.borrow_mut();

    let end = (cmd.groups as usize * ELEMENTS_PER_GROUP as usize).min(n);
    for i in 0..end {
        let p = Vec3::new(
            f32::from_bits(positions[i * 3]),
            f32::from_bits(positions[i * 3 + 1]),
            f32::from_bits(positions[i * 3 + 2]),
        );
        keys[i] = generator.key_for_position(&matrix_mv, p);
        payload[i] = i as u32;
    }
}

fn init_histogram(cmd: &CpuCommand) {
    let mut global = bound(cmd, Slot::GlobalHist).words.borrow_mut();
    let len = global.len().min(GLOBAL_HISTOGRAM_LEN as usize);
    global[..len].fill(0);
}

fn upsweep(cmd: &CpuCommand) {
    let c = &cmd.constants;
    let blocks = c.thread_blocks as usize;
    let row = pass_index(c) * RADIX as usize;

    let keys = bound(cmd, Slot::Keys).words.borrow();
    let mut pass_hist = bound(cmd, Slot::PassHist).words.borrow_mut();
    let mut global = bound(cmd, Slot::GlobalHist).words.borrow_mut();

    for block in 0..cmd.groups {
        let mut hist = [0u32; RADIX as usize];
        for &key in &keys[partition(block, c.num_keys)] {
            hist[digit(key, c.radix_shift)] += 1;
        }

        let mut exclusive = 0u32;
        for (d, &count) in hist.iter().enumerate() {
            pass_hist[d * blocks + block as usize] = count;
            global[row + d] = global[row + d].wrapping_add(exclusive);
            exclusive += count;
        }
    }
}

fn scan(cmd: &CpuCommand) {
    let blocks = cmd.constants.thread_blocks as usize;
    let mut pass_hist = bound(cmd, Slot::PassHist).words.borrow_mut();

    for d in 0..cmd.groups.min(RADIX) as usize {
        let mut carry = 0u32;
        for count in &mut pass_hist[d * blocks..(d + 1) * blocks] {
            let value = *count;
            *count = carry;
            carry += value;
        }
    }
}

fn downsweep(cmd: &CpuCommand) {
    let c = &cmd.constants;
    let blocks = c.thread_blocks as usize;
    let row = pass_index(c) * RADIX as usize;

    let keys = bound(cmd, Slot::Keys).words.borrow();
    let payload = bound(cmd, Slot::Payload).words.borrow();
    let mut alt_keys = bound(cmd, Slot::AltKeys).words.borrow_mut();
    let mut alt_payload = bound(cmd, Slot::AltPayload).words.borrow_mut();
    let pass_hist = bound(cmd, Slot::PassHist).words.borrow();
    let global = bound(cmd, Slot::GlobalHist).words.borrow();

    for block in 0..cmd.groups {
        let mut offsets = [0u32; RADIX as usize];
        for (d, offset) in offsets.iter_mut().enumerate() {
            *offset = global[row + d] + pass_hist[d * blocks + block as usize];
        }

        // In-order walk of the partition keeps the scatter stable.
        for i in partition(block, c.num_keys) {
            let key = keys[i];
            let d = digit(key, c.radix_shift);
            let dst = offsets[d] as usize;
            alt_keys[dst] = key;
            alt_payload[dst] = payload[i];
            offsets[d] += 1;
        }
    }
}
