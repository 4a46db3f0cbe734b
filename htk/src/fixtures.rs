//! Builders for synthetic HTK inputs used across the test suites.

use std::path::Path;

use crate::feature::{FeatureHeader, ParmKind};

pub fn float_feature_file(frames: &[Vec<f32>], kind: ParmKind) -> Vec<u8> {
    let veclen = frames.first().map_or(1, |f| f.len());
    let header = FeatureHeader {
        sample_count: frames.len() as u32,
        sample_period: 100_000,
        sample_size: (veclen * 4) as u16,
        parm_kind: kind,
    };
    let mut out = header.encode().to_vec();
    for v in frames.iter().flatten() {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Builds a compressed file; `vectors` is `None` for IREFC data.
pub fn compressed_feature_file(
    frames: &[Vec<i16>],
    vectors: Option<(&[f32], &[f32])>,
    kind: ParmKind,
) -> Vec<u8> {
    let veclen = frames.first().map_or(1, |f| f.len());
    let header = FeatureHeader {
        sample_count: frames.len() as u32,
        sample_period: 100_000,
        sample_size: (veclen * 2) as u16,
        parm_kind: kind,
    };
    let mut out = header.encode().to_vec();
    if let Some((scale, bias)) = vectors {
        for v in scale.iter().chain(bias) {
            out.extend_from_slice(&v.to_be_bytes());
        }
    }
    for v in frames.iter().flatten() {
        out.extend_from_slice(&v.to_be_bytes());
    }
    out
}

/// Writes a float feature file with `count` frames of `veclen` coefficients.
pub fn write_feature_file(path: &Path, count: usize, veclen: usize) {
    let frames: Vec<Vec<f32>> = (0..count)
        .map(|i| (0..veclen).map(|j| i as f32 + j as f32 / 100.0).collect())
        .collect();
    let kind = ParmKind::from_bits(crate::feature::BaseKind::Fbank as u16);
    std::fs::write(path, float_feature_file(&frames, kind)).unwrap();
}

/// Encodes a binary MLF; `records` are `(utt_id, [(phone, count)])`.
pub fn binary_mlf(records: &[(&str, &[(u16, u16)])], big_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32b = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

    let mut out = b"MLF".to_vec();
    out.extend_from_slice(&u16b(1));
    for (id, runs) in records {
        out.extend_from_slice(&u16b(id.len() as u16));
        out.extend_from_slice(id.as_bytes());
        let end: u32 = runs.iter().map(|r| r.1 as u32).sum();
        out.extend_from_slice(&u32b(end));
        out.extend_from_slice(&u16b(runs.len() as u16));
        for (phone, count) in *runs {
            out.extend_from_slice(&u16b(*phone));
            out.extend_from_slice(&u16b(*count));
        }
    }
    out.extend_from_slice(&u16b(0));
    out
}
