//! Headless driver: loads (or synthesizes) a splat cloud, sorts it from a few
//! orbiting cameras and checks the resulting order back to front.
//!
//! ```text
//! gsplat-viewer [cloud.ply] [--cpu] [--frames N] [--style graph|custom]
//! ```

use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{bail, Context, Result};
use glam::{Mat4, Vec3};

use gsplat_engine::device::{Gpu, GpuInit};
use gsplat_engine::logging::{init_logging, LoggingConfig};
use gsplat_engine::sort::{view_depth, ComputeBackend, CpuBackend, KeyOrder, WgpuBackend};
use gsplat_engine::splat::{Camera, CameraId, CameraKind, SortTarget, Splat};
use gsplat_engine::system::{
    CustomPassHook, HookStyle, RenderGraphHook, SorterSettings, SplatSorter,
};

const SYNTHETIC_SPLATS: usize = 50_000;

struct Args {
    ply: Option<PathBuf>,
    cpu: bool,
    frames: u32,
    style: HookStyle,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        ply: None,
        cpu: false,
        frames: 4,
        style: HookStyle::CustomPass,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--cpu" => args.cpu = true,
            "--frames" => {
                let n = it.next().context("--frames needs a value")?;
                args.frames = n.parse().with_context(|| format!("bad frame count '{n}'"))?;
            }
            "--style" => match it.next().as_deref() {
                Some("graph") => args.style = HookStyle::RenderGraph,
                Some("custom") => args.style = HookStyle::CustomPass,
                other => bail!("unknown hook style {other:?}"),
            },
            flag if flag.starts_with("--") => bail!("unknown flag '{flag}'"),
            path => args.ply = Some(PathBuf::from(path)),
        }
    }
    Ok(args)
}

fn main() -> Result<()> {
    init_logging(LoggingConfig::default());
    let args = parse_args()?;

    let positions = match &args.ply {
        Some(path) => {
            let asset = gsplat_ply::import_file(path)
                .with_context(|| format!("failed to import {}", path.display()))?;
            asset.positions
        }
        None => synthetic_cloud(SYNTHETIC_SPLATS),
    };
    log::info!("{} splats loaded", positions.len());

    if args.cpu {
        run(Rc::new(CpuBackend::new()), &positions, &args)
    } else {
        let gpu = Gpu::headless_blocking(GpuInit::default())?;
        let backend = WgpuBackend::with_default_kernels(gpu.device(), gpu.queue());
        run(Rc::new(backend), &positions, &args)
    }
}

fn run<B: ComputeBackend>(backend: Rc<B>, positions: &[[f32; 3]], args: &Args) -> Result<()> {
    let settings = SorterSettings {
        hook_style: args.style,
        key_order: KeyOrder::Ascending,
        ..Default::default()
    };
    let mut sorter: SplatSorter<B> = SplatSorter::new(backend.clone(), settings);
    if !sorter.is_valid() {
        bail!("sort kernels unavailable on this backend");
    }

    let splat = Splat::from_positions(&*backend, positions, Mat4::IDENTITY);
    let (center, radius) = match splat.world_bounds() {
        Some(b) => (b.center(), b.extents().length().max(1.0) * 2.5),
        None => (Vec3::ZERO, 5.0),
    };
    let id = sorter.insert(splat);

    let mut graph = RenderGraphHook::default();
    let mut custom = CustomPassHook;

    for frame in 0..args.frames {
        let angle = frame as f32 / args.frames.max(1) as f32 * std::f32::consts::TAU;
        let eye = center + Vec3::new(angle.cos(), 0.3, angle.sin()) * radius;
        let camera = Camera::new(
            CameraId(frame as u64),
            CameraKind::Game,
            Mat4::look_at_rh(eye, center, Vec3::Y),
        );

        let mut stream = backend.begin_stream("frame");
        let recorded = match args.style {
            HookStyle::RenderGraph => {
                graph.on_camera_pre_cull(&mut sorter, &camera)
                    && graph.record(&mut sorter, &camera, &mut stream)
            }
            _ => custom.execute(&mut sorter, &camera, &mut stream),
        };
        backend.submit(stream);
        if !recorded {
            log::warn!("frame {frame}: nothing sorted");
            continue;
        }

        let target = sorter.get(id).context("splat vanished")?;
        let order = target
            .resources()
            .order()
            .context("order buffer released")?;
        let order = backend.read_buffer(order)?;
        let matrix_mv = camera.view * target.local_to_world();
        let misplaced = count_misplaced(&order, positions, &matrix_mv);

        if misplaced == 0 {
            log::info!("frame {frame}: {} splats back to front", order.len());
        } else {
            log::error!("frame {frame}: {misplaced} splats out of order");
        }
    }
    Ok(())
}

/// Neighbors whose view depth decreases along the order.
fn count_misplaced(order: &[u32], positions: &[[f32; 3]], matrix_mv: &Mat4) -> usize {
    let depth = |i: u32| view_depth(matrix_mv, Vec3::from(positions[i as usize]));
    order
        .windows(2)
        .filter(|w| depth(w[0]) > depth(w[1]))
        .count()
}

/// Deterministic pseudo-random cloud in a unit cube.
fn synthetic_cloud(n: usize) -> Vec<[f32; 3]> {
    let mut state = 0x2545_f491_u32;
    let mut next = move || {
        state = state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        (state >> 8) as f32 / (1u32 << 24) as f32 * 2.0 - 1.0
    };
    (0..n).map(|_| [next(), next(), next()]).collect()
}
