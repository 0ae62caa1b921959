use std::fs::File;
use std::io::{BufRead, BufReader, Read, Seek};
use std::path::Path;

use crate::asset::{sh_bands_for, sh_coefficient_count, Bounds, SplatAsset, MIN_PROPERTIES};
use crate::error::ImportError;
use crate::header::{parse_header, PlyHeader};

/// Files at or above this size are rejected.
pub const MAX_FILE_LEN: u64 = 2 * 1024 * 1024 * 1024;

pub fn check_file_len(len: u64) -> Result<(), ImportError> {
    if len >= MAX_FILE_LEN {
        return Err(ImportError::TooLarge(len));
    }
    Ok(())
}

/// Imports the PLY file at `path`.
///
/// A body shorter than the header's vertex count is reported before any
/// splat is decoded.
pub fn import_file(path: impl AsRef<Path>) -> Result<SplatAsset, ImportError> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    check_file_len(file_len)?;

    let mut reader = BufReader::new(file);
    let header = parse_header(&mut reader)?;
    let record_len = record_len(&header)?;

    let body_len = file_len.saturating_sub(reader.stream_position()?);
    let record_len_u64 = record_len as u64;
    if u64::from(header.vertex_count) * record_len_u64 > body_len {
        return Err(ImportError::Truncated {
            vertex: (body_len / record_len_u64) as u32,
            got: (body_len % record_len_u64) as usize,
            expected: record_len,
        });
    }

    let asset = read_body(reader, &header, header.vertex_count as usize)?;
    log::info!(
        "imported {} splats ({} SH bands) from {}",
        asset.splat_count,
        asset.sh_bands,
        path.display()
    );
    Ok(asset)
}

/// Imports a PLY stream: header, then one record of `property_count` floats
/// per vertex.
pub fn import_reader<R: BufRead>(mut reader: R) -> Result<SplatAsset, ImportError> {
    let header = parse_header(&mut reader)?;
    record_len(&header)?;

    // The body length is unknown here; the arrays grow as records arrive.
    let reserve = (header.vertex_count as usize).min(RESERVE_LIMIT);
    read_body(reader, &header, reserve)
}

/// Records reserved up front when the body length is unknown.
const RESERVE_LIMIT: usize = 1 << 16;

/// Bytes per vertex record.
fn record_len(header: &PlyHeader) -> Result<usize, ImportError> {
    if header.property_count < MIN_PROPERTIES {
        return Err(ImportError::TooFewProperties(header.property_count));
    }
    Ok(header.property_count * 4)
}

fn read_body<R: Read>(
    mut reader: R,
    header: &PlyHeader,
    reserve: usize,
) -> Result<SplatAsset, ImportError> {
    let pc = header.property_count;
    let coeffs = sh_coefficient_count(pc);

    let mut asset = SplatAsset {
        splat_count: header.vertex_count,
        sh_bands: sh_bands_for(pc),
        bounds: Bounds::default(),
        positions: Vec::with_capacity(reserve),
        colors: Vec::with_capacity(reserve),
        shs: Vec::with_capacity(reserve * coeffs),
        scales: Vec::with_capacity(reserve),
        rotations: Vec::with_capacity(reserve),
    };

    let record_len = pc * 4;
    let mut bytes = vec![0u8; record_len];
    let mut p = vec![0f32; pc];

    for vertex in 0..header.vertex_count {
        let got = read_full(&mut reader, &mut bytes)?;
        if got != record_len {
            return Err(ImportError::Truncated {
                vertex,
                got,
                expected: record_len,
            });
        }
        for (value, chunk) in p.iter_mut().zip(bytes.chunks_exact(4)) {
            *value = f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }

        let position = [p[0], p[1], p[2]];
        if vertex == 0 {
            asset.bounds = Bounds::point(position);
        } else {
            asset.bounds.encapsulate(position);
        }
        asset.positions.push(position);

        // SH rest terms are stored channel-major: all R, then all G, then all B.
        for j in 0..coeffs {
            asset
                .shs
                .push([p[9 + j], p[9 + coeffs + j], p[9 + 2 * coeffs + j]]);
        }

        let tail = &p[pc - 8..];
        asset.colors.push([p[6], p[7], p[8], sigmoid(tail[0])]);
        asset
            .scales
            .push([tail[1].exp(), tail[2].exp(), tail[3].exp()]);
        asset
            .rotations
            .push(normalize_quat([tail[4], tail[5], tail[6], tail[7]]));
    }

    Ok(asset)
}

/// Fills `buf` unless the stream ends first; returns the bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, ImportError> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(filled)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

fn normalize_quat(q: [f32; 4]) -> [f32; 4] {
    let len = q.iter().map(|c| c * c).sum::<f32>().sqrt();
    if len > 0.0 && len.is_finite() {
        q.map(|c| c / len)
    } else {
        [1.0, 0.0, 0.0, 0.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ply(property_count: usize, vertex_count: &str, records: &[Vec<f32>]) -> Vec<u8> {
        let mut out = format!(
            "ply\nformat binary_little_endian 1.0\nelement vertex {vertex_count}\n"
        );
        for i in 0..property_count {
            out.push_str(&format!("property float p{i}\n"));
        }
        out.push_str("end_header\n");

        let mut bytes = out.into_bytes();
        for record in records {
            for v in record {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        }
        bytes
    }

    fn record(
        position: [f32; 3],
        color: [f32; 3],
        sh: &[f32],
        opacity: f32,
        scale: [f32; 3],
        rot: [f32; 4],
    ) -> Vec<f32> {
        let mut r = Vec::new();
        r.extend_from_slice(&position);
        r.extend_from_slice(&[0.0, 0.0, 1.0]);
        r.extend_from_slice(&color);
        r.extend_from_slice(sh);
        r.push(opacity);
        r.extend_from_slice(&scale);
        r.extend_from_slice(&rot);
        r
    }

    /// Splat at the origin with unit scale and identity rotation.
    fn blank_record(sh: &[f32]) -> Vec<f32> {
        record([0.0; 3], [0.0; 3], sh, 0.0, [0.0; 3], [1.0, 0.0, 0.0, 0.0])
    }

    fn temp_ply(name: &str, bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("gsplat-{}-{name}.ply", std::process::id()));
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn two_vertices_without_sh() {
        let records = [
            record(
                [1.0, 2.0, 3.0],
                [0.1, 0.2, 0.3],
                &[],
                0.0,
                [0.0, 0.0, 0.0],
                [2.0, 0.0, 0.0, 0.0],
            ),
            record(
                [-1.0, 5.0, 0.0],
                [0.4, 0.5, 0.6],
                &[],
                2.0,
                [1.0, -1.0, 0.5],
                [0.0, 3.0, 0.0, 4.0],
            ),
        ];
        let asset = import_reader(&ply(17, "2", &records)[..]).unwrap();

        assert_eq!(asset.splat_count, 2);
        assert_eq!(asset.sh_bands, 0);
        assert!(asset.shs.is_empty());
        assert_eq!(asset.positions, [[1.0, 2.0, 3.0], [-1.0, 5.0, 0.0]]);

        assert_eq!(asset.colors[0][..3], [0.1, 0.2, 0.3]);
        assert!(approx(asset.colors[0][3], 0.5));
        assert!(approx(asset.colors[1][3], 1.0 / (1.0 + (-2.0f32).exp())));

        assert_eq!(asset.scales[0], [1.0, 1.0, 1.0]);
        assert!(approx(asset.scales[1][0], std::f32::consts::E));
        assert!(approx(asset.scales[1][1], 1.0 / std::f32::consts::E));

        assert_eq!(asset.rotations[0], [1.0, 0.0, 0.0, 0.0]);
        assert!(approx(asset.rotations[1][1], 0.6));
        assert!(approx(asset.rotations[1][3], 0.8));

        assert_eq!(asset.bounds.min, [-1.0, 2.0, 0.0]);
        assert_eq!(asset.bounds.max, [1.0, 5.0, 3.0]);
    }

    #[test]
    fn sh_rest_is_deinterleaved() {
        // 15 coefficients per channel: R = 0..15, G = 100..115, B = 200..215
        let sh: Vec<f32> = (0..45)
            .map(|i| (i / 15 * 100 + i % 15) as f32)
            .collect();
        let records = [blank_record(&sh)];
        let asset = import_reader(&ply(62, "1", &records)[..]).unwrap();

        assert_eq!(asset.sh_bands, 3);
        assert_eq!(asset.sh_coefficients(), 15);
        assert_eq!(asset.shs[0], [0.0, 100.0, 200.0]);
        assert_eq!(asset.shs[14], [14.0, 114.0, 214.0]);
    }

    #[test]
    fn truncated_body() {
        let records = [blank_record(&[])];
        let mut bytes = ply(17, "2", &records);
        bytes.extend_from_slice(&[0u8; 10]);

        match import_reader(&bytes[..]) {
            Err(ImportError::Truncated {
                vertex,
                got,
                expected,
            }) => {
                assert_eq!(vertex, 1);
                assert_eq!(got, 10);
                assert_eq!(expected, 68);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn huge_vertex_count_with_short_body() {
        let bytes = ply(17, "4000000000", &[blank_record(&[])]);
        match import_reader(&bytes[..]) {
            Err(ImportError::Truncated { vertex, got, .. }) => {
                assert_eq!(vertex, 1);
                assert_eq!(got, 0);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn file_shorter_than_declared_count_fails_up_front() {
        let path = temp_ply("short", &ply(17, "4000000000", &[blank_record(&[])]));
        let r = import_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            r,
            Err(ImportError::Truncated {
                vertex: 1,
                got: 0,
                expected: 68
            })
        ));
    }

    #[test]
    fn file_import_reads_every_record() {
        let records = [blank_record(&[]), blank_record(&[])];
        let path = temp_ply("full", &ply(17, "2", &records));
        let r = import_file(&path);
        std::fs::remove_file(&path).unwrap();
        assert_eq!(r.unwrap().positions.len(), 2);
    }

    #[test]
    fn too_few_properties() {
        let r = import_reader(&ply(16, "0", &[])[..]);
        assert!(matches!(r, Err(ImportError::TooFewProperties(16))));
    }

    #[test]
    fn bad_vertex_count() {
        let r = import_reader(&ply(17, "-3", &[])[..]);
        assert!(matches!(r, Err(ImportError::BadCount(_))));
    }

    #[test]
    fn empty_cloud() {
        let asset = import_reader(&ply(17, "0", &[])[..]).unwrap();
        assert_eq!(asset.splat_count, 0);
        assert_eq!(asset.sh_coefficients(), 0);
        assert_eq!(asset.bounds, Bounds::default());
    }

    #[test]
    fn file_size_limit() {
        assert!(check_file_len(MAX_FILE_LEN - 1).is_ok());
        assert!(matches!(
            check_file_len(MAX_FILE_LEN),
            Err(ImportError::TooLarge(_))
        ));
    }

    #[test]
    fn missing_file_is_io_error() {
        let r = import_file("/nonexistent/gsplat/cloud.ply");
        assert!(matches!(r, Err(ImportError::Io(_))));
    }
}
