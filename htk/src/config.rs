//! Converter configuration.
//!
//! Loadable from YAML; every field except the four input/output paths has a
//! default:
//!
//! ```yaml
//! mlf_list: data/mlf.list
//! listing: data/train.scp
//! vocabulary: data/statelist
//! output_dir: out
//! label_format: binary
//! input_byte_order: little
//! output_byte_order: little
//! label_layout: compact-indexed
//! chunk_size: 1000
//! version: 1
//! ```

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::endian::ByteOrder;
use crate::error::{Error, Result};
use crate::label::LabelFormat;
use crate::layout::LabelLayout;
use crate::manifest::DEFAULT_MANIFEST_NAME;
use crate::reader::ChunkFormat;
use crate::writer::{DEFAULT_CHUNK_SIZE, DEFAULT_VERSION, WriterOptions};

/// MLF serialization named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MlfEncoding {
    Text,
    #[default]
    Binary,
}

impl fmt::Display for MlfEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MlfEncoding::Text => write!(f, "text"),
            MlfEncoding::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for MlfEncoding {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "text" => Ok(MlfEncoding::Text),
            "binary" => Ok(MlfEncoding::Binary),
            other => Err(format!("unknown MLF format {other:?} (want text or binary)")),
        }
    }
}

/// Full option set for one conversion run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    /// File listing one MLF path per line.
    pub mlf_list: PathBuf,
    /// Listing (SCP) file.
    pub listing: PathBuf,
    /// Phone/state list.
    pub vocabulary: PathBuf,
    pub output_dir: PathBuf,
    /// Base directory for relative feature paths in the listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_root: Option<PathBuf>,
    pub label_format: MlfEncoding,
    /// Integer byte order of binary MLF files.
    pub input_byte_order: ByteOrder,
    /// Integer byte order of the chunk files.
    pub output_byte_order: ByteOrder,
    pub label_layout: LabelLayout,
    pub chunk_size: usize,
    pub version: u32,
    /// Append `<EOS>` and `<SOS>` to the vocabulary.
    pub add_start_end: bool,
    pub manifest_name: String,
    /// Skip MLF files that fail to parse instead of aborting.
    pub skip_malformed_label_files: bool,
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            mlf_list: PathBuf::new(),
            listing: PathBuf::new(),
            vocabulary: PathBuf::new(),
            output_dir: PathBuf::new(),
            feature_root: None,
            label_format: MlfEncoding::Binary,
            input_byte_order: ByteOrder::Little,
            output_byte_order: ByteOrder::Little,
            label_layout: LabelLayout::CompactIndexed,
            chunk_size: DEFAULT_CHUNK_SIZE,
            version: DEFAULT_VERSION,
            add_start_end: false,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
            skip_malformed_label_files: false,
        }
    }
}

impl ConvertConfig {
    /// Loads a YAML config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_yaml::from_reader(BufReader::new(file))?)
    }

    pub fn from_yaml(s: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(s)?)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, path) in [
            ("mlf_list", &self.mlf_list),
            ("listing", &self.listing),
            ("vocabulary", &self.vocabulary),
            ("output_dir", &self.output_dir),
        ] {
            if path.as_os_str().is_empty() {
                return Err(Error::InvalidConfig(format!("{name} is required")));
            }
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be positive".into()));
        }
        if self.manifest_name.is_empty() {
            return Err(Error::InvalidConfig("manifest_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn label_format(&self) -> LabelFormat {
        match self.label_format {
            MlfEncoding::Text => LabelFormat::Text,
            MlfEncoding::Binary => LabelFormat::Binary {
                byte_order: self.input_byte_order,
            },
        }
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            chunk_size: self.chunk_size,
            byte_order: self.output_byte_order,
            layout: self.label_layout,
            version: self.version,
            manifest_name: self.manifest_name.clone(),
        }
    }

    pub fn chunk_format(&self) -> ChunkFormat {
        ChunkFormat {
            byte_order: self.output_byte_order,
            layout: self.label_layout,
        }
    }
}
