use thiserror::Error;

/// Why a PLY file could not be imported.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not a PLY file (missing 'ply' magic)")]
    MissingMagic,

    #[error("header ends before 'end_header'")]
    UnterminatedHeader,

    #[error("unsupported PLY format '{0}', expected binary_little_endian")]
    UnsupportedFormat(String),

    #[error("invalid vertex count '{0}'")]
    BadCount(String),

    #[error("{0} vertex properties; at least 17 are required")]
    TooFewProperties(usize),

    #[error("unexpected end of file at vertex {vertex}: got {got} of {expected} bytes")]
    Truncated {
        vertex: u32,
        got: usize,
        expected: usize,
    },

    #[error("file is {0} bytes; files of 2 GiB or more are not supported")]
    TooLarge(u64),
}
