//! GPU depth ordering for splat rendering.
//!
//! Every frame, for every camera, the splats of each registered drawable are
//! sorted by view-space depth so an external renderer can blend them back to
//! front. Keys are generated and sorted on the GPU; nothing waits on the
//! result.
//!
//! | Module      | Contents                                                     |
//! |-------------|--------------------------------------------------------------|
//! | `sort`      | depth keys, radix sort, compute backends (wgpu, CPU)         |
//! | `resources` | per-drawable sort buffers                                    |
//! | `splat`     | drawables, cameras, instance quad mesh, bounds               |
//! | `system`    | registry, [`SplatSorter`](system::SplatSorter), host hooks   |
//! | `device`    | headless wgpu device setup                                   |
//! | `logging`   | `env_logger` setup for hosts and tools                       |

pub mod device;
pub mod logging;
pub mod resources;
pub mod sort;
pub mod splat;
pub mod system;
