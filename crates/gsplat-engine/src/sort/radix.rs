use std::rc::Rc;

use glam::Mat4;

use crate::resources::ResourcePool;

use super::backend::{ComputeBackend, Dispatch, Kernel, KernelBindings, SortConstants};
use super::config::{thread_blocks, PASSES, RADIX_BITS};
use super::key::KeyOrder;

/// Per-drawable input to [`RadixSort::dispatch`].
pub struct SortArgs<'a, B: ComputeBackend> {
    pub pool: &'a ResourcePool<B>,
    /// Leading primitives to sort; at most the pool's count.
    pub count: u32,
    /// `camera.view * local_to_world`.
    pub matrix_mv: Mat4,
    pub key_order: KeyOrder,
}

/// Depth keys plus a 4-pass, 8-bit LSD radix sort over `(key, payload)` pairs.
///
/// The sort is stable and leaves its result in the pool's `input_keys` and
/// `order` buffers (an even number of ping-pong passes). An engine whose
/// backend lacks any kernel is invalid: every call records nothing.
pub struct RadixSort<B: ComputeBackend> {
    backend: Rc<B>,
    valid: bool,
}

impl<B: ComputeBackend> RadixSort<B> {
    pub fn new(backend: Rc<B>) -> Self {
        let missing: Vec<&str> = Kernel::ALL
            .iter()
            .filter(|&&k| !backend.supports(k))
            .map(|k| k.entry_point())
            .collect();
        if !missing.is_empty() {
            log::warn!("radix sort disabled; missing kernels: {}", missing.join(", "));
        }
        Self {
            backend,
            valid: missing.is_empty(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn backend(&self) -> &Rc<B> {
        &self.backend
    }

    /// Seeds `payload[0..count]` with `0..count`.
    pub fn init_payload(&self, stream: &mut B::Stream, payload: &B::Buffer, count: u32) {
        if !self.valid || count == 0 {
            return;
        }
        self.launch(
            stream,
            Kernel::InitPayload,
            SortConstants {
                num_keys: count,
                ..Default::default()
            },
            KernelBindings {
                payload: Some(payload),
                ..Default::default()
            },
        );
    }

    /// Recomputes depth keys for the first `args.count` primitives of
    /// `args.pool` and sorts them.
    pub fn dispatch(&self, stream: &mut B::Stream, args: &SortArgs<'_, B>) {
        let count = args.count;
        if !self.valid || count == 0 {
            return;
        }
        let Some(buffers) = args.pool.buffers() else {
            log::trace!("skipping sort of disposed pool");
            return;
        };
        if count > args.pool.count() {
            log::error!("sort of {count} keys exceeds pool capacity {}", args.pool.count());
            return;
        }
        if !self.within_binding_limit(buffers.iter().chain([args.pool.positions()])) {
            return;
        }

        self.launch(
            stream,
            Kernel::CalcDistance,
            SortConstants {
                matrix_mv: args.matrix_mv.to_cols_array_2d(),
                num_keys: count,
                descending: args.key_order.as_flag(),
                ..Default::default()
            },
            KernelBindings {
                positions: Some(args.pool.positions()),
                keys: Some(&buffers.input_keys),
                payload: Some(&buffers.order),
                ..Default::default()
            },
        );
        self.sort_pairs(stream, args.pool, count);
    }

    /// Sorts the first `count` pre-filled keys of `pool`, carrying the order
    /// buffer along.
    pub fn sort_pairs(&self, stream: &mut B::Stream, pool: &ResourcePool<B>, count: u32) {
        if !self.valid || count == 0 {
            return;
        }
        let Some(buffers) = pool.buffers() else {
            return;
        };
        if count > pool.count() {
            log::error!("sort of {count} keys exceeds pool capacity {}", pool.count());
            return;
        }
        if !self.within_binding_limit(buffers.iter()) {
            return;
        }

        let base = SortConstants {
            num_keys: count,
            thread_blocks: thread_blocks(count),
            ..Default::default()
        };

        self.launch(
            stream,
            Kernel::InitHistogram,
            base,
            KernelBindings {
                global_hist: Some(&buffers.global_hist),
                ..Default::default()
            },
        );

        let mut src = (&buffers.input_keys, &buffers.order);
        let mut dst = (&buffers.alt_keys, &buffers.alt_payload);

        for pass in 0..PASSES {
            let constants = SortConstants {
                radix_shift: pass * RADIX_BITS,
                ..base
            };

            self.launch(
                stream,
                Kernel::Upsweep,
                constants,
                KernelBindings {
                    keys: Some(src.0),
                    pass_hist: Some(&buffers.pass_hist),
                    global_hist: Some(&buffers.global_hist),
                    ..Default::default()
                },
            );
            self.launch(
                stream,
                Kernel::Scan,
                constants,
                KernelBindings {
                    pass_hist: Some(&buffers.pass_hist),
                    ..Default::default()
                },
            );
            self.launch(
                stream,
                Kernel::Downsweep,
                constants,
                KernelBindings {
                    keys: Some(src.0),
                    payload: Some(src.1),
                    alt_keys: Some(dst.0),
                    alt_payload: Some(dst.1),
                    pass_hist: Some(&buffers.pass_hist),
                    global_hist: Some(&buffers.global_hist),
                    ..Default::default()
                },
            );

            std::mem::swap(&mut src, &mut dst);
        }
    }

    /// Whether every buffer can be bound by one dispatch. A pool that cannot
    /// is left unsorted.
    fn within_binding_limit<'b>(&self, buffers: impl IntoIterator<Item = &'b B::Buffer>) -> bool
    where
        B::Buffer: 'b,
    {
        let max = self.backend.max_binding_words();
        let largest = buffers
            .into_iter()
            .map(|b| self.backend.buffer_words(b))
            .max()
            .unwrap_or(0);
        if largest > max {
            log::error!("sort skipped: {largest}-word buffer exceeds the {max}-word binding limit");
            return false;
        }
        true
    }

    fn launch(
        &self,
        stream: &mut B::Stream,
        kernel: Kernel,
        constants: SortConstants,
        bindings: KernelBindings<'_, B::Buffer>,
    ) {
        let groups = kernel.groups(constants.num_keys, constants.thread_blocks);
        self.backend.dispatch(
            stream,
            Dispatch {
                kernel,
                groups,
                constants,
                bindings,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec3;

    use super::*;
    use crate::sort::config::PARTITION_SIZE;
    use crate::sort::key::DepthKeyGenerator;
    use crate::sort::{upload_positions, CpuBackend};

    /// Deterministic pseudo-random words (Numerical Recipes LCG).
    struct Lcg(u32);

    impl Lcg {
        fn next(&mut self) -> u32 {
            self.0 = self.0.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
            self.0
        }
    }

    fn engine() -> RadixSort<CpuBackend> {
        RadixSort::new(Rc::new(CpuBackend::new()))
    }

    fn pool_with_keys(sort: &RadixSort<CpuBackend>, keys: &[u32]) -> ResourcePool<CpuBackend> {
        let backend = sort.backend();
        let count = keys.len() as u32;
        let positions = backend.create_buffer("positions", count * 3);
        let pool = ResourcePool::create(&**backend, count, positions);
        backend.write_buffer(pool.input_keys().unwrap(), keys);
        pool
    }

    /// Seeds the payload, sorts, and returns `(keys, payload)`.
    fn sort_keys(keys: &[u32]) -> (Vec<u32>, Vec<u32>) {
        let sort = engine();
        let pool = pool_with_keys(&sort, keys);
        let backend = sort.backend();

        let mut stream = backend.begin_stream("test");
        sort.init_payload(&mut stream, pool.order().unwrap(), pool.count());
        sort.sort_pairs(&mut stream, &pool, pool.count());
        backend.submit(stream);

        (
            backend.read_buffer(pool.input_keys().unwrap()).unwrap(),
            backend.read_buffer(pool.order().unwrap()).unwrap(),
        )
    }

    fn random_keys(count: usize, seed: u32) -> Vec<u32> {
        let mut rng = Lcg(seed);
        (0..count).map(|_| rng.next()).collect()
    }

    fn assert_sorted_permutation(input: &[u32], keys: &[u32], payload: &[u32]) {
        assert_eq!(keys.len(), input.len());
        for pair in keys.windows(2) {
            assert!(pair[0] <= pair[1]);
        }
        let mut seen = vec![false; input.len()];
        for (slot, &p) in payload.iter().enumerate() {
            assert!(!seen[p as usize], "payload {p} repeated");
            seen[p as usize] = true;
            assert_eq!(input[p as usize], keys[slot], "payload lost its key");
        }
    }

    // ── sizes ───────────────────────────────────────────────────────────────

    #[test]
    fn sorts_random_keys_into_a_permutation() {
        let input = random_keys(5000, 7);
        let (keys, payload) = sort_keys(&input);
        assert_sorted_permutation(&input, &keys, &payload);
    }

    #[test]
    fn single_key() {
        let (keys, payload) = sort_keys(&[42]);
        assert_eq!(keys, [42]);
        assert_eq!(payload, [0]);
    }

    #[test]
    fn exact_partition_multiples() {
        for count in [PARTITION_SIZE, 2 * PARTITION_SIZE] {
            let input = random_keys(count as usize, count);
            let (keys, payload) = sort_keys(&input);
            assert_sorted_permutation(&input, &keys, &payload);
        }
    }

    #[test]
    fn one_partial_block() {
        let input = random_keys(PARTITION_SIZE as usize + 1, 3);
        let (keys, payload) = sort_keys(&input);
        assert_sorted_permutation(&input, &keys, &payload);
    }

    #[test]
    fn zero_keys_records_nothing() {
        let sort = engine();
        let pool = pool_with_keys(&sort, &[]);
        let mut stream = sort.backend().begin_stream("test");
        sort.init_payload(&mut stream, pool.order().unwrap(), 0);
        sort.sort_pairs(&mut stream, &pool, 0);
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count: pool.count(),
                matrix_mv: Mat4::IDENTITY,
                key_order: KeyOrder::Ascending,
            },
        );
        assert!(stream.is_empty());
    }

    // ── ordering ────────────────────────────────────────────────────────────

    #[test]
    fn equal_keys_keep_input_order() {
        let input = [5, 1, 5, 1, 5, 0, 1];
        let (keys, payload) = sort_keys(&input);
        assert_eq!(keys, [0, 1, 1, 1, 5, 5, 5]);
        assert_eq!(payload, [5, 1, 3, 6, 0, 2, 4]);
    }

    #[test]
    fn resorting_sorted_data_is_stable() {
        let input = random_keys(4000, 11);
        let (first, _) = sort_keys(&input);
        let (second, payload) = sort_keys(&first);
        assert_eq!(first, second);
        let identity: Vec<u32> = (0..first.len() as u32).collect();
        assert_eq!(payload, identity);
    }

    #[test]
    fn every_byte_participates() {
        let input = [0xff00_0000, 0x0000_00ff, 0x00ff_0000, 0x0000_ff00, 0];
        let (keys, payload) = sort_keys(&input);
        assert_eq!(keys, [0, 0xff, 0xff00, 0x00ff_0000, 0xff00_0000]);
        assert_eq!(payload, [4, 1, 3, 2, 0]);
    }

    #[test]
    fn dispatch_orders_by_view_depth() {
        let sort = engine();
        let backend = sort.backend();
        let positions: Vec<[f32; 3]> = [3.0, -7.5, 0.0, 12.0, -1.0]
            .iter()
            .map(|&z| [0.0, 1.0, z])
            .collect();
        let buffer = upload_positions(&**backend, &positions);
        let pool = ResourcePool::create(&**backend, positions.len() as u32, buffer);

        let mut stream = backend.begin_stream("test");
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count: pool.count(),
                matrix_mv: Mat4::IDENTITY,
                key_order: KeyOrder::Ascending,
            },
        );
        backend.submit(stream);

        let order = backend.read_buffer(pool.order().unwrap()).unwrap();
        assert_eq!(order, [1, 4, 2, 0, 3]);

        let keys = backend.read_buffer(pool.input_keys().unwrap()).unwrap();
        let generator = DepthKeyGenerator::default();
        assert_eq!(keys[0], generator.key_for_depth(-7.5));
    }

    #[test]
    fn descending_reverses_draw_order() {
        let sort = engine();
        let backend = sort.backend();
        let view = Mat4::look_at_rh(Vec3::new(0.0, 0.0, 10.0), Vec3::ZERO, Vec3::Y);
        let positions = [[0.0, 0.0, 1.0], [0.0, 0.0, -4.0], [0.0, 0.0, 6.0]];
        let buffer = upload_positions(&**backend, &positions);
        let pool = ResourcePool::create(&**backend, 3, buffer);

        let mut stream = backend.begin_stream("test");
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count: pool.count(),
                matrix_mv: view,
                key_order: KeyOrder::Ascending,
            },
        );
        backend.submit(stream);
        // back to front: farthest from the eye first
        assert_eq!(backend.read_buffer(pool.order().unwrap()).unwrap(), [1, 0, 2]);

        let mut stream = backend.begin_stream("test");
        sort.dispatch(
            &mut stream,
            &SortArgs {
                pool: &pool,
                count: pool.count(),
                matrix_mv: view,
                key_order: KeyOrder::Descending,
            },
        );
        backend.submit(stream);
        assert_eq!(backend.read_buffer(pool.order().unwrap()).unwrap(), [2, 0, 1]);
    }

    // ── validity ────────────────────────────────────────────────────────────

    #[test]
    fn dispatch_count_per_sort() {
        let sort = engine();
        let pool = pool_with_keys(&sort, &random_keys(10, 1));
        let mut stream = sort.backend().begin_stream("test");
        sort.sort_pairs(&mut stream, &pool, pool.count());
        // InitHistogram + 3 kernels per pass
        assert_eq!(stream.len(), 1 + 3 * PASSES as usize);
    }

    #[test]
    fn missing_kernel_invalidates_engine() {
        let backend = CpuBackend::with_kernels(&[
            Kernel::InitPayload,
            Kernel::CalcDistance,
            Kernel::InitHistogram,
            Kernel::Upsweep,
            Kernel::Scan,
        ]);
        let sort = RadixSort::new(Rc::new(backend));
        assert!(!sort.is_valid());

        let pool = pool_with_keys(&sort, &[3, 2, 1]);
        let mut stream = sort.backend().begin_stream("test");
        sort.init_payload(&mut stream, pool.order().unwrap(), 3);
        sort.sort_pairs(&mut stream, &pool, 3);
        assert!(stream.is_empty());
    }

    #[test]
    fn pool_above_binding_limit_is_skipped() {
        let count = 400;
        // Keys and histograms fit, the position buffer (3 words per
        // primitive) does not.
        let backend = Rc::new(CpuBackend::new().with_max_binding_words(3 * count as u64 - 1));
        let sort = RadixSort::new(backend.clone());
        let positions = backend.create_buffer("positions", 3 * count);
        let pool = ResourcePool::create(&*backend, count, positions);

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
        assert!(stream.is_empty());

        // Keys alone can still be sorted.
        sort.sort_pairs(&mut stream, &pool, count);
        assert!(!stream.is_empty());
    }

    #[test]
    fn disposed_pool_is_skipped() {
        let sort = engine();
        let mut pool = pool_with_keys(&sort, &[3, 2, 1]);
        pool.dispose(&**sort.backend());
        let mut stream = sort.backend().begin_stream("test");
        sort.sort_pairs(&mut stream, &pool, 3);
        assert!(stream.is_empty());
    }
}
