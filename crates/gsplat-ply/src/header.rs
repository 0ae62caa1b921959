use std::io::BufRead;

use crate::error::ImportError;

/// The parts of a PLY header the importer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlyHeader {
    pub vertex_count: u32,
    /// `property` lines declared for the vertex element.
    pub property_count: usize,
}

/// Reads header lines up to and including `end_header`, leaving `reader` at
/// the first byte of the body.
pub fn parse_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, ImportError> {
    let mut line = Vec::new();

    if !read_line(reader, &mut line)? || trim(&line) != b"ply" {
        return Err(ImportError::MissingMagic);
    }

    let mut format_seen = false;
    let mut in_vertex = false;
    let mut vertex_count = 0;
    let mut property_count = 0;

    loop {
        if !read_line(reader, &mut line)? {
            return Err(ImportError::UnterminatedHeader);
        }
        let text = String::from_utf8_lossy(trim(&line));
        if text == "end_header" {
            break;
        }

        let tokens: Vec<&str> = text.split_whitespace().collect();
        match tokens.as_slice() {
            ["format", format, _version] => {
                if *format != "binary_little_endian" {
                    return Err(ImportError::UnsupportedFormat((*format).to_owned()));
                }
                format_seen = true;
            }
            ["format", ..] => return Err(ImportError::UnsupportedFormat(text.to_string())),
            ["element", "vertex", count] => {
                vertex_count = count
                    .parse()
                    .map_err(|_| ImportError::BadCount((*count).to_owned()))?;
                in_vertex = true;
            }
            ["element", ..] => in_vertex = false,
            ["property", _ty, _name] if in_vertex => property_count += 1,
            _ => {}
        }
    }

    if !format_seen {
        return Err(ImportError::UnsupportedFormat("<missing>".to_owned()));
    }

    log::debug!("ply header: {vertex_count} vertices, {property_count} properties");
    Ok(PlyHeader {
        vertex_count,
        property_count,
    })
}

/// Reads one `\n`-terminated line into `buf`. Returns `false` at end of input.
fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<bool, ImportError> {
    buf.clear();
    Ok(reader.read_until(b'\n', buf)? > 0)
}

fn trim(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
