//! Fixed radix sort parameters.
//!
//! These values are baked into the WGSL kernels as well; keep both in sync.

/// Keys processed by one workgroup during histogramming and scatter.
pub const PARTITION_SIZE: u32 = 3840;

/// Bits consumed per sorting pass.
pub const RADIX_BITS: u32 = 8;

/// Number of digit bins, `1 << RADIX_BITS`.
pub const RADIX: u32 = 1 << RADIX_BITS;

/// Passes needed to cover a 32-bit key.
pub const PASSES: u32 = u32::BITS / RADIX_BITS;

/// Invocations per workgroup for every kernel.
pub const THREADS_PER_GROUP: u32 = 256;

/// Keys each invocation walks inside one partition.
pub const KEYS_PER_THREAD: u32 = PARTITION_SIZE / THREADS_PER_GROUP;

/// Elements covered by one group of the per-element kernels
/// (`InitPayload`, `CalcDistance`).
pub const ELEMENTS_PER_GROUP: u32 = 1024;

const _: () = assert!(KEYS_PER_THREAD * THREADS_PER_GROUP == PARTITION_SIZE);
const _: () = assert!(RADIX == THREADS_PER_GROUP);

#[inline]
pub const fn div_round_up(x: u32, y: u32) -> u32 {
    x.div_ceil(y)
}

/// Number of partitions (thread blocks) needed for `count` keys.
#[inline]
pub const fn thread_blocks(count: u32) -> u32 {
    div_round_up(count, PARTITION_SIZE)
}

/// Length in words of the per-block digit histogram.
#[inline]
pub const fn pass_histogram_len(count: u32) -> u32 {
    thread_blocks(count) * RADIX
}

/// Length in words of the global histogram (one digit row per pass).
pub const GLOBAL_HISTOGRAM_LEN: u32 = RADIX * PASSES;
