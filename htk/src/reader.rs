//! Reads chunk files back through their manifest.

use std::fs;
use std::path::{Path, PathBuf};

use bytes::Buf;
use tracing::debug;

use crate::endian::ByteOrder;
use crate::error::{Error, Result};
use crate::label::LabelRun;
use crate::layout::{self, LabelLayout};
use crate::manifest::{ChunkInfo, FEATURE_FILE_TYPE, LABEL_FILE_TYPE, Manifest};
use crate::writer::file_tag;

/// Encoding choices a chunk set was written with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkFormat {
    pub byte_order: ByteOrder,
    pub layout: LabelLayout,
}

/// One utterance read back from a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChunkUtterance {
    /// Raw frame bytes as copied from the source feature file.
    pub feature: Vec<u8>,
    /// One label per frame.
    pub labels: Vec<u16>,
}

impl ChunkUtterance {
    /// Decodes the frame bytes as big-endian floats.
    pub fn feature_values(&self) -> Vec<f32> {
        let mut buf = &self.feature[..];
        let mut out = Vec::with_capacity(buf.len() / 4);
        while buf.remaining() >= 4 {
            out.push(buf.get_f32());
        }
        out
    }

    pub fn label_runs(&self) -> Vec<LabelRun> {
        layout::merge_runs(&self.labels)
    }
}

/// Reader over a written chunk directory.
#[derive(Debug)]
pub struct ChunkReader {
    dir: PathBuf,
    manifest: Manifest,
    format: ChunkFormat,
}

impl ChunkReader {
    /// Loads `dir/manifest_name`.
    pub fn open<P: Into<PathBuf>>(dir: P, manifest_name: &str, format: ChunkFormat) -> Result<Self> {
        let dir = dir.into();
        let manifest = Manifest::load(dir.join(manifest_name))?;
        Ok(Self {
            dir,
            manifest,
            format,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn chunk_count(&self) -> usize {
        self.manifest.file_info.len()
    }

    pub fn chunk_info(&self, i: usize) -> Option<&ChunkInfo> {
        self.manifest.file_info.get(i)
    }

    /// Reads and validates every file of chunk `i`.
    pub fn read_chunk(&self, i: usize) -> Result<Vec<ChunkUtterance>> {
        let info = self
            .chunk_info(i)
            .ok_or_else(|| Error::InvalidChunk(format!("no chunk {i} in manifest")))?;
        let count = info.count as usize;
        let mut utterances = vec![ChunkUtterance::default(); count];

        for file_type in &self.manifest.file_type {
            let tag = file_tag(file_type)
                .ok_or_else(|| Error::InvalidChunk(format!("unknown file type {file_type:?}")))?;
            let path = Manifest::chunk_path(&self.dir, &info.name, file_type);
            let data = fs::read(&path)?;
            let mut buf = &data[..];

            if !buf.starts_with(tag) {
                return Err(Error::InvalidChunk(format!(
                    "{} does not start with {:?}",
                    path.display(),
                    String::from_utf8_lossy(tag)
                )));
            }
            buf.advance(tag.len());
            let version = self.get_u32(&mut buf)?;
            debug!(path = %path.display(), version, "reading chunk file");

            let mut n = 0usize;
            while buf.has_remaining() {
                let local_index = self.get_u32(&mut buf)? as usize;
                if local_index != n {
                    return Err(Error::InvalidChunk(format!(
                        "{}: record {n} has local index {local_index}",
                        path.display()
                    )));
                }
                let Some(utt) = utterances.get_mut(n) else {
                    return Err(Error::InvalidChunk(format!(
                        "{}: more records than the manifest count {count}",
                        path.display()
                    )));
                };
                match file_type.as_str() {
                    FEATURE_FILE_TYPE => utt.feature = self.read_feature(&mut buf)?,
                    LABEL_FILE_TYPE => {
                        utt.labels = self.format.layout.decode(&mut buf, self.format.byte_order)?
                    }
                    _ => unreachable!("file_tag accepts only known types"),
                }
                n += 1;
            }

            if n != count {
                return Err(Error::InvalidChunk(format!(
                    "{}: {n} records, manifest says {count}",
                    path.display()
                )));
            }
        }
        Ok(utterances)
    }

    fn read_feature(&self, buf: &mut &[u8]) -> Result<Vec<u8>> {
        let len = self.get_u32(buf)? as usize;
        if buf.remaining() < len {
            return Err(truncated());
        }
        let bytes = buf[..len].to_vec();
        buf.advance(len);
        Ok(bytes)
    }

    fn get_u32(&self, buf: &mut &[u8]) -> Result<u32> {
        self.format.byte_order.get_u32(buf).ok_or_else(truncated)
    }
}

fn truncated() -> Error {
    Error::InvalidChunk("truncated record".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::write_feature_file;
    use crate::index::{UtteranceDescriptor, UtteranceIndex};
    use crate::manifest::DEFAULT_MANIFEST_NAME;
    use crate::writer::{ChunkWriter, WriterOptions};

    fn write_corpus(dir: &Path, src: &Path, format: ChunkFormat) -> UtteranceIndex {
        let index: UtteranceIndex = [(3usize, vec![(1u32, 2u32), (1, 1)]), (2, vec![(4, 2)])]
            .into_iter()
            .enumerate()
            .map(|(i, (frames, runs))| {
                let path = src.join(format!("u{i}.fbank"));
                write_feature_file(&path, frames, 2);
                UtteranceDescriptor {
                    utt_id: format!("u{i}"),
                    source_path: path,
                    start_frame: 0,
                    end_frame: 0,
                    labels: runs.into_iter().map(|(p, c)| LabelRun::new(p, c)).collect(),
                }
            })
            .collect();

        let options = WriterOptions {
            chunk_size: 1,
            byte_order: format.byte_order,
            layout: format.layout,
            ..Default::default()
        };
        ChunkWriter::new(dir, options).unwrap().write(&index).unwrap();
        index
    }

    #[test]
    fn test_read_back_all_formats() {
        let mut seen = Vec::new();
        for byte_order in [ByteOrder::Big, ByteOrder::Little] {
            for layout in [LabelLayout::CompactIndexed, LabelLayout::Expanded] {
                let src = tempfile::tempdir().unwrap();
                let out = tempfile::tempdir().unwrap();
                let format = ChunkFormat { byte_order, layout };
                write_corpus(out.path(), src.path(), format);

                let reader = ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, format).unwrap();
                assert_eq!(reader.chunk_count(), 2);

                let mut logical = Vec::new();
                for i in 0..reader.chunk_count() {
                    let utts = reader.read_chunk(i).unwrap();
                    assert_eq!(utts.len(), 1);
                    logical.push((utts[0].feature_values(), utts[0].labels.clone()));
                }
                assert_eq!(logical[0].1, vec![1, 1, 1]);
                let want: Vec<f32> = (0..2)
                    .flat_map(|i| (0..2).map(move |j| i as f32 + j as f32 / 100.0))
                    .collect();
                assert_eq!(logical[1].0, want);
                seen.push(logical);
            }
        }
        assert!(seen.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_label_runs_merge() {
        let utt = ChunkUtterance {
            feature: vec![],
            labels: vec![1, 1, 1, 4, 4],
        };
        assert_eq!(
            utt.label_runs(),
            vec![LabelRun::new(1, 3), LabelRun::new(4, 2)]
        );
    }

    #[test]
    fn test_unknown_chunk() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(out.path(), src.path(), ChunkFormat::default());
        let reader =
            ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, ChunkFormat::default()).unwrap();
        assert!(matches!(reader.read_chunk(2), Err(Error::InvalidChunk(_))));
    }

    #[test]
    fn test_bad_tag() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(out.path(), src.path(), ChunkFormat::default());

        let path = out.path().join("chunk0.label");
        let mut data = fs::read(&path).unwrap();
        data[0] = b'l';
        fs::write(&path, data).unwrap();

        let reader =
            ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, ChunkFormat::default()).unwrap();
        assert!(matches!(reader.read_chunk(0), Err(Error::InvalidChunk(_))));
        assert!(reader.read_chunk(1).is_ok());
    }

    #[test]
    fn test_wrong_local_index() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(out.path(), src.path(), ChunkFormat::default());

        let path = out.path().join("chunk0.feature");
        let mut data = fs::read(&path).unwrap();
        data[11] = 1;
        fs::write(&path, data).unwrap();

        let reader =
            ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, ChunkFormat::default()).unwrap();
        let err = reader.read_chunk(0).unwrap_err();
        assert!(err.to_string().contains("local index 1"), "{err}");
    }

    #[test]
    fn test_trailing_bytes() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(out.path(), src.path(), ChunkFormat::default());

        let path = out.path().join("chunk1.feature");
        let mut data = fs::read(&path).unwrap();
        data.extend_from_slice(&[0, 0]);
        fs::write(&path, data).unwrap();

        let reader =
            ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, ChunkFormat::default()).unwrap();
        assert!(matches!(reader.read_chunk(1), Err(Error::InvalidChunk(_))));
    }

    #[test]
    fn test_unknown_file_type() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        write_corpus(out.path(), src.path(), ChunkFormat::default());

        let path = out.path().join(DEFAULT_MANIFEST_NAME);
        let mut manifest = Manifest::load(&path).unwrap();
        manifest.file_type.push("audio".into());
        manifest.save(&path).unwrap();

        let reader =
            ChunkReader::open(out.path(), DEFAULT_MANIFEST_NAME, ChunkFormat::default()).unwrap();
        let err = reader.read_chunk(0).unwrap_err();
        assert!(err.to_string().contains("audio"), "{err}");
    }
}
