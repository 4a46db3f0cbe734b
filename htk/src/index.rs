//! Utterance index: the listing (SCP) file joined with the label map.
//!
//! Listing lines look like:
//!
//! ```text
//! 39DDCBFDBE134C83A47A0DAF1EDD480F_0.mfc=chunk0.feature[0,52]
//! ```
//!
//! i.e. utterance id (extension stripped), source feature file, and an
//! inclusive frame range. `[0,0]` selects the whole file.

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{Error, Result};
use crate::feature::FrameSpan;
use crate::label::{LabelMap, LabelRun};

/// One parsed listing line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub utt_id: String,
    pub source_path: PathBuf,
    pub start_frame: u64,
    pub end_frame: u64,
}

impl ListingEntry {
    /// Parses `utt_id.ext=path[start,end]`. `line` is the 1-based line number.
    pub fn parse(text: &str, line: usize) -> Result<Self> {
        let malformed = || Error::MalformedListingLine {
            line,
            content: text.to_string(),
        };

        let (id, rest) = text.split_once('=').ok_or_else(malformed)?;
        if rest.contains('=') {
            return Err(malformed());
        }
        let utt_id = id.split('.').next().unwrap_or_default().trim();
        if utt_id.is_empty() {
            return Err(malformed());
        }

        let (path, frames) = rest.split_once('[').ok_or_else(malformed)?;
        let frames = frames.strip_suffix(']').ok_or_else(malformed)?;
        let (start, end) = frames.split_once(',').ok_or_else(malformed)?;
        let start_frame = start.trim().parse::<u64>().map_err(|_| malformed())?;
        let end_frame = end.trim().parse::<u64>().map_err(|_| malformed())?;
        if path.is_empty() {
            return Err(malformed());
        }

        Ok(Self {
            utt_id: utt_id.to_string(),
            source_path: PathBuf::from(path),
            start_frame,
            end_frame,
        })
    }
}

/// An utterance selected for conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtteranceDescriptor {
    pub utt_id: String,
    pub source_path: PathBuf,
    pub start_frame: u64,
    pub end_frame: u64,
    pub labels: Vec<LabelRun>,
}

impl UtteranceDescriptor {
    pub fn span(&self) -> FrameSpan {
        FrameSpan::new(self.start_frame, self.end_frame)
    }
}

/// Ordered utterance descriptors, in listing order.
#[derive(Debug, Clone, Default)]
pub struct UtteranceIndex {
    utterances: Vec<UtteranceDescriptor>,
    dropped: usize,
}

impl UtteranceIndex {
    /// Builds the index from a listing file.
    ///
    /// Relative source paths are resolved against `feature_root` when given.
    pub fn build<P: AsRef<Path>>(
        listing: P,
        labels: &LabelMap,
        feature_root: Option<&Path>,
    ) -> Result<Self> {
        let listing = listing.as_ref();
        let reader = BufReader::new(File::open(listing)?);
        let index = Self::from_reader(reader, labels, feature_root)?;
        info!(
            path = %listing.display(),
            utterances = index.len(),
            dropped = index.dropped(),
            "utterance index built"
        );
        Ok(index)
    }

    /// Builds the index from listing lines.
    pub fn from_reader<R: BufRead>(
        reader: R,
        labels: &LabelMap,
        feature_root: Option<&Path>,
    ) -> Result<Self> {
        let mut index = Self::default();
        let mut seen = HashSet::new();

        for (n, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }

            let entry = match ListingEntry::parse(line, n + 1) {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "skipping listing line");
                    index.dropped += 1;
                    continue;
                }
            };

            let Some(runs) = labels.get(&entry.utt_id) else {
                warn!(utt_id = %entry.utt_id, "no labels for utterance, dropping");
                index.dropped += 1;
                continue;
            };

            if !seen.insert(entry.utt_id.clone()) {
                warn!(utt_id = %entry.utt_id, "utterance listed more than once");
            }

            let source_path = match feature_root {
                Some(root) if entry.source_path.is_relative() => root.join(&entry.source_path),
                _ => entry.source_path,
            };
            index.utterances.push(UtteranceDescriptor {
                utt_id: entry.utt_id,
                source_path,
                start_frame: entry.start_frame,
                end_frame: entry.end_frame,
                labels: runs.clone(),
            });
        }
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    /// Listing lines skipped for being malformed or unlabelled.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn get(&self, i: usize) -> Option<&UtteranceDescriptor> {
        self.utterances.get(i)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, UtteranceDescriptor> {
        self.utterances.iter()
    }

    /// Number of chunks of `chunk_size` utterances, `ceil(len / chunk_size)`.
    pub fn chunk_count(&self, chunk_size: usize) -> usize {
        self.utterances.len().div_ceil(chunk_size)
    }

    /// Iterates `(chunk_index, utterances)` pairs.
    ///
    /// # Panics
    ///
    /// Panics if `chunk_size` is zero.
    pub fn chunks(
        &self,
        chunk_size: usize,
    ) -> impl Iterator<Item = (usize, &[UtteranceDescriptor])> + '_ {
        self.utterances.chunks(chunk_size).enumerate()
    }
}

impl FromIterator<UtteranceDescriptor> for UtteranceIndex {
    fn from_iter<I: IntoIterator<Item = UtteranceDescriptor>>(iter: I) -> Self {
        Self {
            utterances: iter.into_iter().collect(),
            dropped: 0,
        }
    }
}

impl<'a> IntoIterator for &'a UtteranceIndex {
    type Item = &'a UtteranceDescriptor;
    type IntoIter = std::slice::Iter<'a, UtteranceDescriptor>;

    fn into_iter(self) -> Self::IntoIter {
        self.utterances.iter()
    }
}
