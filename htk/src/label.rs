//! Master label file (MLF) parsing.
//!
//! Two encodings are supported, selected by [`LabelFormat`]:
//!
//! Text:
//!
//! ```text
//! #!MLF!#
//! "An4/71/71/cen5-fjam-b.lab"
//! 0 100000 sil[2] -0.785971 sil 454.794006 </s>
//! 100000 5500000 sil[3] 465.522034
//! .
//! ```
//!
//! Binary (integers in the caller-selected byte order):
//!
//! ```text
//! [3B magic] [2B version]
//! repeated:
//!   [2B id_len] [id_len bytes id] [4B sequence_end] [2B sequence_size]
//!   sequence_size x ([2B phone] [2B count])
//! [2B id_len = 0]
//! ```

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use bytes::Buf;
use tracing::{debug, error, info, warn};

use crate::endian::ByteOrder;
use crate::error::{Error, Result};
use crate::vocab::PhoneVocabulary;

/// Label time units (100ns ticks) per output frame.
pub const TICKS_PER_FRAME: u64 = 100_000;

/// Length of the binary MLF prologue (magic + version).
pub const BINARY_PROLOGUE: usize = 5;

/// One run of identical labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelRun {
    pub phone: u32,
    pub count: u32,
}

impl LabelRun {
    pub const fn new(phone: u32, count: u32) -> Self {
        Self { phone, count }
    }
}

/// Number of frames covered by `runs`.
pub fn total_frames(runs: &[LabelRun]) -> u64 {
    runs.iter().map(|r| r.count as u64).sum()
}

/// Utterance id to label runs.
pub type LabelMap = HashMap<String, Vec<LabelRun>>;

/// Serialization of a label file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    Text,
    Binary { byte_order: ByteOrder },
}

/// Parses MLF files into a [`LabelMap`].
#[derive(Debug, Clone)]
pub struct LabelParser<'a> {
    vocab: &'a PhoneVocabulary,
    format: LabelFormat,
    skip_malformed_files: bool,
}

impl<'a> LabelParser<'a> {
    pub fn new(vocab: &'a PhoneVocabulary, format: LabelFormat) -> Self {
        Self {
            vocab,
            format,
            skip_malformed_files: false,
        }
    }

    /// Log and skip files with structural errors instead of failing.
    pub fn skip_malformed_files(mut self, skip: bool) -> Self {
        self.skip_malformed_files = skip;
        self
    }

    /// Parses every MLF named (one per line) in `list_path`.
    pub fn parse_list<P: AsRef<Path>>(&self, list_path: P) -> Result<LabelMap> {
        let reader = BufReader::new(File::open(list_path.as_ref())?);
        let mut paths = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim();
            if !line.is_empty() {
                paths.push(PathBuf::from(line));
            }
        }
        self.parse_files(paths)
    }

    /// Parses `paths` in order. Later files overwrite earlier entries.
    pub fn parse_files<I, P>(&self, paths: I) -> Result<LabelMap>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut labels = LabelMap::new();
        let mut files = 0usize;
        for path in paths {
            let path = path.as_ref();
            match self.parse_file(path, &mut labels) {
                Ok(n) => {
                    files += 1;
                    info!(path = %path.display(), utterances = n, "label file parsed");
                }
                Err(e @ Error::MalformedLabelRecord { .. }) if self.skip_malformed_files => {
                    error!(path = %path.display(), error = %e, "skipping malformed label file");
                }
                Err(e) => return Err(e),
            }
        }
        info!(files, utterances = labels.len(), "label map built");
        Ok(labels)
    }

    /// Parses one file and merges it into `labels` only if it parses fully.
    /// Returns the number of utterances in the file.
    pub fn parse_file(&self, path: &Path, labels: &mut LabelMap) -> Result<usize> {
        let parsed = match self.format {
            LabelFormat::Text => {
                let file = File::open(path)?;
                self.parse_text(path, BufReader::new(file))?
            }
            LabelFormat::Binary { byte_order } => {
                let data = fs::read(path)?;
                parse_binary(path, &data, byte_order)?
            }
        };

        let n = parsed.len();
        for (utt_id, runs) in parsed {
            if labels.contains_key(&utt_id) {
                debug!(utt_id = %utt_id, path = %path.display(), "label entry replaced by later file");
            }
            labels.insert(utt_id, runs);
        }
        Ok(n)
    }

    /// Parses a text MLF. `path` is used for error reporting only.
    pub fn parse_text<R: BufRead>(&self, path: &Path, reader: R) -> Result<LabelMap> {
        let mut records = LabelMap::new();
        let mut current: Option<(String, Vec<LabelRun>)> = None;

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            let lineno = n + 1;

            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if line.starts_with('"') {
                finish_record(&mut records, current.take());
                let utt_id = text_utt_id(line).ok_or_else(|| {
                    Error::malformed_label(path, format!("line {lineno}: empty utterance id"))
                })?;
                current = Some((utt_id, Vec::new()));
                continue;
            }
            if line.starts_with('.') {
                finish_record(&mut records, current.take());
                continue;
            }
            if !line.as_bytes()[0].is_ascii_digit() {
                return Err(Error::malformed_label(
                    path,
                    format!("line {lineno}: unexpected structure {line:?}"),
                ));
            }
            let Some((utt_id, runs)) = current.as_mut() else {
                return Err(Error::malformed_label(
                    path,
                    format!("line {lineno}: label entry outside a record"),
                ));
            };

            let mut tokens = line.split_whitespace();
            let (Some(start), Some(end), Some(symbol)) = (tokens.next(), tokens.next(), tokens.next())
            else {
                return Err(Error::malformed_label(
                    path,
                    format!("line {lineno}: want `start end symbol`, got {line:?}"),
                ));
            };
            let start = parse_ticks(path, lineno, start)? / TICKS_PER_FRAME;
            let end = parse_ticks(path, lineno, end)? / TICKS_PER_FRAME;
            if end < start {
                return Err(Error::malformed_label(
                    path,
                    format!("line {lineno}: end before start"),
                ));
            }

            let phone = self.vocab.index_of(symbol)?;
            let duration = end - start;
            if duration == 0 {
                debug!(utt_id = %utt_id, line = lineno, "skipping zero-length label entry");
                continue;
            }
            let count = u32::try_from(duration).map_err(|_| Error::FieldOverflow {
                field: "label duration",
                value: duration,
            })?;
            runs.push(LabelRun::new(phone, count));
        }
        finish_record(&mut records, current.take());
        Ok(records)
    }
}

/// Parses a binary MLF image. `path` is used for error reporting only.
pub fn parse_binary(path: &Path, data: &[u8], order: ByteOrder) -> Result<LabelMap> {
    let truncated = |what: &str| Error::malformed_label(path, format!("truncated {what}"));

    if data.len() < BINARY_PROLOGUE {
        return Err(Error::malformed_label(path, "missing magic/version prologue"));
    }
    let mut buf = &data[BINARY_PROLOGUE..];
    let mut records = LabelMap::new();

    while buf.has_remaining() {
        let id_len = order.get_u16(&mut buf).ok_or_else(|| truncated("id length"))? as usize;
        if id_len == 0 {
            break;
        }
        if buf.remaining() < id_len {
            return Err(truncated("utterance id"));
        }
        let utt_id = std::str::from_utf8(&buf[..id_len])
            .map_err(|e| Error::malformed_label(path, format!("utterance id: {e}")))?
            .to_string();
        buf.advance(id_len);

        let _sequence_end = order.get_u32(&mut buf).ok_or_else(|| truncated("sequence end"))?;
        let size = order.get_u16(&mut buf).ok_or_else(|| truncated("sequence size"))?;
        let mut runs = Vec::with_capacity(size as usize);
        for _ in 0..size {
            let phone = order.get_u16(&mut buf).ok_or_else(|| truncated("label run"))?;
            let count = order.get_u16(&mut buf).ok_or_else(|| truncated("label run"))?;
            if count == 0 {
                debug!(utt_id = %utt_id, "skipping zero-length label run");
                continue;
            }
            runs.push(LabelRun::new(phone as u32, count as u32));
        }
        finish_record(&mut records, Some((utt_id, runs)));
    }
    Ok(records)
}

/// Extracts the utterance id from a `"name.ext"` record header.
fn text_utt_id(line: &str) -> Option<String> {
    let stem = line.split('.').next().unwrap_or_default();
    let stem = stem.strip_prefix('"').unwrap_or(stem);
    let stem = stem.strip_suffix('"').unwrap_or(stem);
    (!stem.is_empty()).then(|| stem.to_string())
}

fn parse_ticks(path: &Path, lineno: usize, token: &str) -> Result<u64> {
    token.parse::<u64>().map_err(|_| {
        Error::malformed_label(path, format!("line {lineno}: invalid time {token:?}"))
    })
}

fn finish_record(records: &mut LabelMap, record: Option<(String, Vec<LabelRun>)>) {
    let Some((utt_id, runs)) = record else {
        return;
    };
    if runs.is_empty() {
        warn!(utt_id = %utt_id, "dropping utterance without label entries");
        return;
    }
    records.insert(utt_id, runs);
}
