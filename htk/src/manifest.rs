//! Chunk manifest (`fileSet.json`).
//!
//! ```text
//! {"fileType":["feature","label"],"fileInfo":[{"name":"chunk0","count":1000},...]}
//! ```

use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Default manifest filename.
pub const DEFAULT_MANIFEST_NAME: &str = "fileSet.json";
/// File type of the feature half of a chunk.
pub const FEATURE_FILE_TYPE: &str = "feature";
/// File type of the label half of a chunk.
pub const LABEL_FILE_TYPE: &str = "label";

/// One chunk entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkInfo {
    /// Chunk base name, `chunk<i>`.
    pub name: String,
    /// Records in the chunk.
    pub count: u64,
}

/// Chunk manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub file_type: Vec<String>,
    pub file_info: Vec<ChunkInfo>,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            file_type: vec![FEATURE_FILE_TYPE.into(), LABEL_FILE_TYPE.into()],
            file_info: Vec::new(),
        }
    }
}

impl Manifest {
    /// Chunk base name for index `i`.
    pub fn chunk_name(i: usize) -> String {
        format!("chunk{i}")
    }

    /// Path of one file of a chunk, e.g. `dir/chunk0.label`.
    pub fn chunk_path(dir: &Path, chunk: &str, file_type: &str) -> PathBuf {
        dir.join(format!("{chunk}.{file_type}"))
    }

    pub fn push(&mut self, name: impl Into<String>, count: u64) {
        self.file_info.push(ChunkInfo {
            name: name.into(),
            count,
        });
    }

    /// Total records across chunks.
    pub fn total_count(&self) -> u64 {
        self.file_info.iter().map(|c| c.count).sum()
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    /// Writes the manifest to `path` via a sibling temp file and a rename.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
        tmp_name.push(".tmp");
        let tmp = path.with_file_name(tmp_name);

        let data = serde_json::to_vec(self)?;
        {
            let mut file = File::create(&tmp)?;
            file.write_all(&data)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), chunks = self.file_info.len(), "manifest written");
        Ok(())
    }
}
