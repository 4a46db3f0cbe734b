//! Label payload layouts inside `.label` chunk files.
//!
//! Both layouts follow the record's `local_index` field.
//!
//! Compact-indexed:
//!
//! ```text
//! [4B label_byte_size = 2 x frame_count] [2B run_bytes = 4 x run_count]
//! run_count x ([2B phone] [2B count])
//! ```
//!
//! For labels `10 10 1 2 2 2 2 2 3` this is `18, 16, (10,2) (1,1) (2,5) (3,1)`.
//!
//! Expanded:
//!
//! ```text
//! [4B frame_count] frame_count x [2B phone]
//! ```

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};
use serde::{Deserialize, Serialize};

use crate::endian::ByteOrder;
use crate::error::{Error, Result};
use crate::label::LabelRun;

/// Label payload layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LabelLayout {
    #[default]
    CompactIndexed,
    Expanded,
}

impl LabelLayout {
    /// Appends the payload for `runs` to `buf`.
    pub fn encode<B: BufMut>(
        self,
        runs: &[LabelRun],
        frame_count: u64,
        order: ByteOrder,
        buf: &mut B,
    ) -> Result<()> {
        match self {
            LabelLayout::CompactIndexed => {
                order.put_u32(buf, to_u32("label byte size", frame_count * 2)?);
                order.put_u16(buf, to_u16("run bytes", runs.len() as u64 * 4)?);
                for run in runs {
                    order.put_u16(buf, to_u16("phone index", run.phone as u64)?);
                    order.put_u16(buf, to_u16("repeat count", run.count as u64)?);
                }
            }
            LabelLayout::Expanded => {
                order.put_u32(buf, to_u32("frame count", frame_count)?);
                for run in runs {
                    let phone = to_u16("phone index", run.phone as u64)?;
                    for _ in 0..run.count {
                        order.put_u16(buf, phone);
                    }
                }
            }
        }
        Ok(())
    }

    /// Reads one payload from `buf` and returns the per-frame labels.
    pub fn decode<B: Buf>(self, buf: &mut B, order: ByteOrder) -> Result<Vec<u16>> {
        match self {
            LabelLayout::CompactIndexed => {
                let (frame_count, runs) = decode_compact(buf, order)?;
                let frames = expand(&runs);
                if frames.len() as u64 != frame_count {
                    return Err(Error::InvalidChunk(format!(
                        "label runs cover {} frames, payload declares {frame_count}",
                        frames.len()
                    )));
                }
                Ok(frames)
            }
            LabelLayout::Expanded => {
                let frame_count = order.get_u32(buf).ok_or_else(truncated)? as usize;
                if buf.remaining() < frame_count * 2 {
                    return Err(truncated());
                }
                let mut frames = Vec::with_capacity(frame_count);
                for _ in 0..frame_count {
                    frames.push(order.get_u16(buf).ok_or_else(truncated)?);
                }
                Ok(frames)
            }
        }
    }
}

impl fmt::Display for LabelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelLayout::CompactIndexed => write!(f, "compact-indexed"),
            LabelLayout::Expanded => write!(f, "expanded"),
        }
    }
}

impl FromStr for LabelLayout {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "compact-indexed" | "compact" => Ok(LabelLayout::CompactIndexed),
            "expanded" => Ok(LabelLayout::Expanded),
            other => Err(format!(
                "unknown label layout {other:?} (want compact-indexed or expanded)"
            )),
        }
    }
}

/// Reads a compact-indexed payload, returning the declared frame count and
/// the runs exactly as stored.
pub fn decode_compact<B: Buf>(buf: &mut B, order: ByteOrder) -> Result<(u64, Vec<LabelRun>)> {
    let label_bytes = order.get_u32(buf).ok_or_else(truncated)?;
    if label_bytes % 2 != 0 {
        return Err(Error::InvalidChunk(format!(
            "label byte size {label_bytes} is not a multiple of 2"
        )));
    }
    let run_bytes = order.get_u16(buf).ok_or_else(truncated)? as usize;
    if run_bytes % 4 != 0 {
        return Err(Error::InvalidChunk(format!(
            "run byte size {run_bytes} is not a multiple of 4"
        )));
    }
    if buf.remaining() < run_bytes {
        return Err(truncated());
    }

    let mut runs = Vec::with_capacity(run_bytes / 4);
    for _ in 0..run_bytes / 4 {
        let phone = order.get_u16(buf).ok_or_else(truncated)?;
        let count = order.get_u16(buf).ok_or_else(truncated)?;
        runs.push(LabelRun::new(phone as u32, count as u32));
    }
    Ok((label_bytes as u64 / 2, runs))
}

/// Expands runs into one label per frame.
pub fn expand(runs: &[LabelRun]) -> Vec<u16> {
    runs.iter()
        .flat_map(|r| std::iter::repeat_n(r.phone as u16, r.count as usize))
        .collect()
}

/// Collapses per-frame labels into runs of identical neighbours.
pub fn merge_runs(frames: &[u16]) -> Vec<LabelRun> {
    let mut runs: Vec<LabelRun> = Vec::new();
    for &phone in frames {
        match runs.last_mut() {
            Some(last) if last.phone == phone as u32 => last.count += 1,
            _ => runs.push(LabelRun::new(phone as u32, 1)),
        }
    }
    runs
}

fn truncated() -> Error {
    Error::InvalidChunk("truncated label payload".into())
}

fn to_u16(field: &'static str, value: u64) -> Result<u16> {
    u16::try_from(value).map_err(|_| Error::FieldOverflow { field, value })
}

fn to_u32(field: &'static str, value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::FieldOverflow { field, value })
}
