//! Per-frame orchestration: which drawables get sorted for which camera.
//!
//! | Module     | Contents                                                  |
//! |------------|-----------------------------------------------------------|
//! | `settings` | [`SorterSettings`], [`HookStyle`]                         |
//! | `registry` | live drawable ids, injected cameras, the active list      |
//! | `sorter`   | [`SplatSorter`] owning drawables and the sort engine      |
//! | `hooks`    | [`TransparentsHook`] plus one adapter per host style      |

mod hooks;
mod registry;
mod settings;
mod sorter;

pub use hooks::{CameraCallbackHook, CustomPassHook, RenderGraphHook, TransparentsHook};
pub use registry::Registry;
pub use settings::{HookStyle, SorterSettings};
pub use sorter::{SplatSorter, SORT_PASS_NAME};
