//! HTK speech corpus conversion.
//!
//! Reads HTK feature files and master label files (MLF) and re-encodes a
//! corpus as fixed-size chunks of binary feature and label records plus a
//! JSON manifest:
//!
//! - [`FeatureReader`]: HTK feature file header, decoding, and raw frame reads
//! - [`LabelParser`]: text and binary MLF parsing into [`LabelRun`] lists
//! - [`PhoneVocabulary`]: symbol to index mapping
//! - [`UtteranceIndex`]: listing (SCP) file joined with the label map
//! - [`ChunkWriter`]: chunk files and manifest
//! - [`ChunkReader`]: reads chunk files back and validates them
//!
//! # Example
//!
//! ```no_run
//! use giztoy_htk::{ConvertConfig, convert};
//!
//! let config = ConvertConfig::load("convert.yaml")?;
//! let summary = convert(&config)?;
//! println!("{} utterances in {} chunks", summary.written, summary.chunks);
//! # Ok::<(), giztoy_htk::Error>(())
//! ```

mod config;
mod convert;
mod endian;
mod error;
pub mod feature;
mod index;
pub mod label;
pub mod layout;
mod manifest;
mod reader;
mod vocab;
mod writer;

pub use config::{ConvertConfig, MlfEncoding};
pub use convert::{ConvertSummary, VerifySummary, convert, verify};
pub use endian::ByteOrder;
pub use error::{Error, Result};
pub use feature::{FeatureHeader, FeatureReader, FrameSpan, ParmKind};
pub use index::{ListingEntry, UtteranceDescriptor, UtteranceIndex};
pub use label::{LabelFormat, LabelMap, LabelParser, LabelRun};
pub use layout::LabelLayout;
pub use manifest::{ChunkInfo, DEFAULT_MANIFEST_NAME, Manifest};
pub use reader::{ChunkFormat, ChunkReader, ChunkUtterance};
pub use vocab::{EOS, PhoneVocabulary, SOS};
pub use writer::{ChunkWriter, FEATURE_TAG, LABEL_TAG, WriteSummary, WriterOptions};

#[cfg(test)]
mod fixtures;
