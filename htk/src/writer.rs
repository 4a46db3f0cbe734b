//! Chunked binary corpus writer.
//!
//! Each chunk `i` is a pair of files in the output directory:
//!
//! ```text
//! chunk<i>.feature: "Feature" [4B version]
//!                   repeated: [4B local_index] [4B byte_len] [byte_len frame bytes]
//! chunk<i>.label:   "Label" [4B version]
//!                   repeated: [4B local_index] [label payload]
//!
//! label payload, compact-indexed:
//!   [4B label_byte_size = 2 * frames] [2B run_bytes = 4 * runs] runs x ([2B phone] [2B count])
//! label payload, expanded:
//!   [4B frame_count] frame_count x [2B phone]
//! ```
//!
//! The 4-byte field after `local_index` in a label record is a byte size
//! only in the compact-indexed layout. In the expanded layout it is the
//! frame count, so the payload that follows is `2 * frame_count` bytes.
//!
//! Integers use the configured output byte order. Frame bytes are always
//! big-endian f32, `frames * veclen * 4` bytes: float sources are copied
//! unchanged and compressed sources are decoded. The manifest is written
//! after the last chunk.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use bytes::{BufMut, BytesMut};
use tracing::{debug, info, warn};

use crate::endian::ByteOrder;
use crate::error::{Error, Result};
use crate::feature::{FeatureReader, RawFrames};
use crate::index::{UtteranceDescriptor, UtteranceIndex};
use crate::label::total_frames;
use crate::layout::LabelLayout;
use crate::manifest::{DEFAULT_MANIFEST_NAME, FEATURE_FILE_TYPE, LABEL_FILE_TYPE, Manifest};

/// Leading tag of a feature chunk file.
pub const FEATURE_TAG: &[u8] = b"Feature";
/// Leading tag of a label chunk file.
pub const LABEL_TAG: &[u8] = b"Label";

/// Default utterances per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1000;
/// Default format version stamped after each tag.
pub const DEFAULT_VERSION: u32 = 1;

/// Returns the tag for a manifest file type.
pub fn file_tag(file_type: &str) -> Option<&'static [u8]> {
    match file_type {
        FEATURE_FILE_TYPE => Some(FEATURE_TAG),
        LABEL_FILE_TYPE => Some(LABEL_TAG),
        _ => None,
    }
}

/// Chunk writer options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriterOptions {
    pub chunk_size: usize,
    pub byte_order: ByteOrder,
    pub layout: LabelLayout,
    pub version: u32,
    pub manifest_name: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            byte_order: ByteOrder::Little,
            layout: LabelLayout::CompactIndexed,
            version: DEFAULT_VERSION,
            manifest_name: DEFAULT_MANIFEST_NAME.to_string(),
        }
    }
}

/// Result of a completed write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteSummary {
    pub manifest: Manifest,
    /// Records written across all chunks.
    pub written: u64,
    /// Utterances skipped for an invalid or out-of-file frame range.
    pub skipped: usize,
    /// Coefficients per frame of the first record written.
    pub veclen: Option<usize>,
}

/// Writes an [`UtteranceIndex`] as chunk files plus a manifest.
#[derive(Debug)]
pub struct ChunkWriter {
    output_dir: PathBuf,
    options: WriterOptions,
}

impl ChunkWriter {
    /// Creates a writer, creating `output_dir` if needed.
    pub fn new<P: Into<PathBuf>>(output_dir: P, options: WriterOptions) -> Result<Self> {
        if options.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk size must be positive".into()));
        }
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir)?;
        Ok(Self {
            output_dir,
            options,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn options(&self) -> &WriterOptions {
        &self.options
    }

    /// Writes every chunk in index order, then the manifest.
    ///
    /// A fatal error leaves earlier chunks on disk and no manifest.
    pub fn write(&self, index: &UtteranceIndex) -> Result<WriteSummary> {
        let mut manifest = Manifest::default();
        let mut written = 0;
        let mut skipped = 0;
        let mut veclen = None;

        for (i, utterances) in index.chunks(self.options.chunk_size) {
            let name = Manifest::chunk_name(i);
            let (count, chunk_skipped) = self.write_chunk(&name, utterances, &mut veclen)?;
            info!(
                chunk = %name,
                records = count,
                skipped = chunk_skipped,
                "chunk written"
            );
            manifest.push(name, count);
            written += count;
            skipped += chunk_skipped;
        }

        manifest.save(self.output_dir.join(&self.options.manifest_name))?;
        info!(
            dir = %self.output_dir.display(),
            chunks = manifest.file_info.len(),
            written,
            skipped,
            "corpus written"
        );
        Ok(WriteSummary {
            manifest,
            written,
            skipped,
            veclen,
        })
    }

    fn write_chunk(
        &self,
        name: &str,
        utterances: &[UtteranceDescriptor],
        veclen: &mut Option<usize>,
    ) -> Result<(u64, usize)> {
        let mut features = self.create(name, FEATURE_FILE_TYPE, FEATURE_TAG)?;
        let mut labels = self.create(name, LABEL_FILE_TYPE, LABEL_TAG)?;

        let mut local_index: u32 = 0;
        let mut skipped = 0;
        for utt in utterances {
            let Some((feature, label, dim)) = self.encode_utterance(local_index, utt)? else {
                skipped += 1;
                continue;
            };
            match *veclen {
                None => *veclen = Some(dim),
                Some(first) if first != dim => warn!(
                    utt_id = %utt.utt_id,
                    veclen = dim,
                    expected = first,
                    "feature dimension differs from earlier records"
                ),
                Some(_) => {}
            }
            features.write_all(&feature)?;
            features.flush()?;
            labels.write_all(&label)?;
            labels.flush()?;
            local_index += 1;
        }

        features.sync_all()?;
        labels.sync_all()?;
        Ok((local_index as u64, skipped))
    }

    fn create(&self, chunk: &str, file_type: &str, tag: &[u8]) -> Result<File> {
        let path = Manifest::chunk_path(&self.output_dir, chunk, file_type);
        let mut file = File::create(&path)?;
        let mut head = BytesMut::with_capacity(tag.len() + 4);
        head.put_slice(tag);
        self.options.byte_order.put_u32(&mut head, self.options.version);
        file.write_all(&head)?;
        Ok(file)
    }

    /// Builds the feature and label records plus the frame dimension, or
    /// `None` when the utterance is skipped.
    fn encode_utterance(
        &self,
        local_index: u32,
        utt: &UtteranceDescriptor,
    ) -> Result<Option<(BytesMut, BytesMut, usize)>> {
        let order = self.options.byte_order;
        let layout = self.options.layout;

        let (raw, veclen) = match read_frames(utt) {
            Ok(read) => read,
            Err(e) if e.is_utterance_local() => {
                warn!(utt_id = %utt.utt_id, error = %e, "skipping utterance");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let frame_count = raw.frame_count;
        let covered = total_frames(&utt.labels);
        if covered != frame_count {
            return Err(Error::RunLengthMismatch {
                utt_id: utt.utt_id.clone(),
                expected: frame_count,
                actual: covered,
            });
        }

        let mut label = BytesMut::new();
        order.put_u32(&mut label, local_index);
        layout.encode(&utt.labels, frame_count, order, &mut label)?;

        let decoded = layout.decode(&mut &label[4..], order)?;
        if decoded.len() as u64 != frame_count {
            return Err(Error::RunLengthMismatch {
                utt_id: utt.utt_id.clone(),
                expected: frame_count,
                actual: decoded.len() as u64,
            });
        }

        let byte_len = u32::try_from(raw.bytes.len()).map_err(|_| Error::FieldOverflow {
            field: "frame bytes",
            value: raw.bytes.len() as u64,
        })?;
        let mut feature = BytesMut::with_capacity(8 + raw.bytes.len());
        order.put_u32(&mut feature, local_index);
        order.put_u32(&mut feature, byte_len);
        feature.put_slice(&raw.bytes);

        debug!(
            utt_id = %utt.utt_id,
            local_index,
            frames = frame_count,
            bytes = byte_len,
            "utterance encoded"
        );
        Ok(Some((feature, label, veclen)))
    }
}

fn read_frames(utt: &UtteranceDescriptor) -> Result<(RawFrames, usize)> {
    let span = utt.span();
    span.frame_count()?;
    let mut reader = FeatureReader::open(&utt.source_path)?;
    let raw = reader.read_raw_span(span)?;
    Ok((raw, reader.veclen()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{BaseKind, ParmKind};
    use crate::fixtures::{compressed_feature_file, write_feature_file};
    use crate::label::LabelRun;

    fn utt(
        dir: &Path,
        id: &str,
        frames: usize,
        range: (u64, u64),
        labels: Vec<LabelRun>,
    ) -> UtteranceDescriptor {
        let path = dir.join(format!("{id}.fbank"));
        write_feature_file(&path, frames, 2);
        UtteranceDescriptor {
            utt_id: id.to_string(),
            source_path: path,
            start_frame: range.0,
            end_frame: range.1,
            labels,
        }
    }

    fn options(chunk_size: usize, byte_order: ByteOrder) -> WriterOptions {
        WriterOptions {
            chunk_size,
            byte_order,
            ..Default::default()
        }
    }

    #[test]
    fn test_chunk_boundaries() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let index: UtteranceIndex = (0..5)
            .map(|i| utt(src.path(), &format!("u{i}"), 2, (0, 0), vec![LabelRun::new(0, 2)]))
            .collect();

        let writer = ChunkWriter::new(out.path(), options(2, ByteOrder::Little)).unwrap();
        let summary = writer.write(&index).unwrap();

        let counts: Vec<u64> = summary.manifest.file_info.iter().map(|c| c.count).collect();
        assert_eq!(counts, vec![2, 2, 1]);
        assert_eq!(summary.written, 5);
        for i in 0..3 {
            assert!(out.path().join(format!("chunk{i}.feature")).exists());
            assert!(out.path().join(format!("chunk{i}.label")).exists());
        }
        assert!(!out.path().join("chunk3.feature").exists());
        assert_eq!(
            Manifest::load(out.path().join(DEFAULT_MANIFEST_NAME)).unwrap(),
            summary.manifest
        );
    }

    #[test]
    fn test_record_layout() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let u = utt(
            src.path(),
            "a",
            3,
            (0, 0),
            vec![LabelRun::new(1, 2), LabelRun::new(0, 1)],
        );
        let source = fs::read(&u.source_path).unwrap();
        let index: UtteranceIndex = std::iter::once(u).collect();

        ChunkWriter::new(out.path(), options(10, ByteOrder::Little))
            .unwrap()
            .write(&index)
            .unwrap();

        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        let mut want = b"Feature".to_vec();
        want.extend_from_slice(&1u32.to_le_bytes());
        want.extend_from_slice(&0u32.to_le_bytes());
        want.extend_from_slice(&24u32.to_le_bytes());
        want.extend_from_slice(&source[12..]);
        assert_eq!(feature, want);

        let label = fs::read(out.path().join("chunk0.label")).unwrap();
        let mut want = b"Label".to_vec();
        want.extend_from_slice(&1u32.to_le_bytes());
        want.extend_from_slice(&0u32.to_le_bytes());
        want.extend_from_slice(&6u32.to_le_bytes());
        want.extend_from_slice(&8u16.to_le_bytes());
        for v in [1u16, 2, 0, 1] {
            want.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(label, want);
    }

    #[test]
    fn test_big_endian_header() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let index: UtteranceIndex =
            std::iter::once(utt(src.path(), "a", 1, (0, 0), vec![LabelRun::new(0, 1)])).collect();

        let opts = WriterOptions {
            version: 3,
            ..options(4, ByteOrder::Big)
        };
        ChunkWriter::new(out.path(), opts).unwrap().write(&index).unwrap();

        let label = fs::read(out.path().join("chunk0.label")).unwrap();
        assert_eq!(&label[..9], b"Label\0\0\0\x03");
        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        assert_eq!(&feature[7..19], &[0, 0, 0, 3, 0, 0, 0, 0, 0, 0, 0, 8]);
    }

    #[test]
    fn test_range_selection() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let u = utt(src.path(), "a", 6, (2, 4), vec![LabelRun::new(5, 3)]);
        let source = fs::read(&u.source_path).unwrap();
        let index: UtteranceIndex = std::iter::once(u).collect();

        ChunkWriter::new(out.path(), options(4, ByteOrder::Little))
            .unwrap()
            .write(&index)
            .unwrap();

        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        let body = &feature[11 + 8..];
        assert_eq!(body.len(), 3 * 2 * 4);
        assert_eq!(body, &source[12 + 2 * 8..12 + 5 * 8]);
    }

    #[test]
    fn test_invalid_range_skipped() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let index: UtteranceIndex = vec![
            utt(src.path(), "bad", 4, (3, 1), vec![LabelRun::new(0, 4)]),
            utt(src.path(), "good", 2, (0, 0), vec![LabelRun::new(0, 2)]),
        ]
        .into_iter()
        .collect();

        let summary = ChunkWriter::new(out.path(), options(10, ByteOrder::Little))
            .unwrap()
            .write(&index)
            .unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.manifest.file_info[0].count, 1);

        // The surviving record takes local index 0.
        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        assert_eq!(&feature[11..15], &0u32.to_le_bytes());
    }

    #[test]
    fn test_range_past_end_skipped() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let index: UtteranceIndex = vec![
            utt(src.path(), "short", 4, (0, 5), vec![LabelRun::new(0, 6)]),
            utt(src.path(), "huge", 4, (0, u64::MAX), vec![LabelRun::new(0, 4)]),
            utt(
                src.path(),
                "far",
                4,
                (1_000_000_000_000, 1_000_000_000_001),
                vec![LabelRun::new(0, 2)],
            ),
            utt(src.path(), "good", 3, (1, 2), vec![LabelRun::new(0, 2)]),
        ]
        .into_iter()
        .collect();

        let summary = ChunkWriter::new(out.path(), options(10, ByteOrder::Little))
            .unwrap()
            .write(&index)
            .unwrap();
        assert_eq!(summary.written, 1);
        assert_eq!(summary.skipped, 3);
        assert_eq!(summary.veclen, Some(2));

        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        assert_eq!(&feature[15..19], &(2u32 * 2 * 4).to_le_bytes());
        assert_eq!(feature.len(), 11 + 8 + 16);
    }

    #[test]
    fn test_compressed_source_decoded() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let path = src.path().join("a.mfc");
        let raw: Vec<Vec<i16>> = vec![
            vec![3, 6, 9],
            vec![0, -3, 30],
            vec![1, 2, 3],
            vec![4, 5, 6],
        ];
        let scale = vec![3.0f32; 3];
        let bias = vec![0.0f32; 3];
        let kind = ParmKind::from_bits(BaseKind::Mfcc as u16 | ParmKind::COMPRESSED);
        fs::write(
            &path,
            compressed_feature_file(&raw, Some((scale.as_slice(), bias.as_slice())), kind),
        )
        .unwrap();
        let index: UtteranceIndex = std::iter::once(UtteranceDescriptor {
            utt_id: "a".into(),
            source_path: path,
            start_frame: 0,
            end_frame: 0,
            labels: vec![LabelRun::new(0, 4)],
        })
        .collect();

        let summary = ChunkWriter::new(out.path(), options(10, ByteOrder::Big))
            .unwrap()
            .write(&index)
            .unwrap();
        assert_eq!(summary.veclen, Some(3));

        let feature = fs::read(out.path().join("chunk0.feature")).unwrap();
        assert_eq!(&feature[15..19], &48u32.to_be_bytes());
        let body = &feature[19..];
        assert_eq!(body.len(), 4 * 3 * 4);
        assert_eq!(&body[..4], &1.0f32.to_be_bytes());
        assert_eq!(&body[16..20], &(-1.0f32).to_be_bytes());
    }

    #[test]
    fn test_run_length_mismatch() {
        let src = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let index: UtteranceIndex =
            std::iter::once(utt(src.path(), "a", 5, (0, 0), vec![LabelRun::new(0, 4)])).collect();

        let err = ChunkWriter::new(out.path(), options(10, ByteOrder::Little))
            .unwrap()
            .write(&index)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::RunLengthMismatch { expected: 5, actual: 4, .. }
        ));
        assert!(!out.path().join(DEFAULT_MANIFEST_NAME).exists());
    }

    #[test]
    fn test_empty_index() {
        let out = tempfile::tempdir().unwrap();
        let summary = ChunkWriter::new(out.path(), WriterOptions::default())
            .unwrap()
            .write(&UtteranceIndex::default())
            .unwrap();
        assert!(summary.manifest.file_info.is_empty());
        assert!(out.path().join(DEFAULT_MANIFEST_NAME).exists());
        assert!(!out.path().join("chunk0.feature").exists());
    }

    #[test]
    fn test_zero_chunk_size() {
        let out = tempfile::tempdir().unwrap();
        let opts = WriterOptions {
            chunk_size: 0,
            ..Default::default()
        };
        assert!(matches!(
            ChunkWriter::new(out.path(), opts),
            Err(Error::InvalidConfig(_))
        ));
    }
}
