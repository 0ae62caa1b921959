//! Binary PLY importer for splat clouds.
//!
//! Reads the little-endian PLY files written by splat trainers and unpacks
//! each vertex record into the per-splat arrays the renderer uploads.
//!
//! | Module   | Contents                                          |
//! |----------|---------------------------------------------------|
//! | `header` | header parsing: vertex count, property count      |
//! | `asset`  | [`SplatAsset`] and SH band helpers                |
//! | `import` | record decoding, [`import_file`], [`import_reader`] |
//! | `error`  | [`ImportError`]                                   |

mod asset;
mod error;
mod header;
mod import;

pub use asset::{sh_bands_for, sh_coefficient_count, Bounds, SplatAsset, MIN_PROPERTIES};
pub use error::ImportError;
pub use header::{parse_header, PlyHeader};
pub use import::{check_file_len, import_file, import_reader, MAX_FILE_LEN};
