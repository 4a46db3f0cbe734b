//! End-to-end conversion: vocabulary, labels, index, chunks.

use tracing::info;

use crate::config::ConvertConfig;
use crate::error::{Error, Result};
use crate::index::UtteranceIndex;
use crate::label::LabelParser;
use crate::reader::ChunkReader;
use crate::vocab::PhoneVocabulary;
use crate::writer::ChunkWriter;

/// Counts reported by [`convert`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub vocabulary_size: usize,
    /// Utterances with labels across all MLF files.
    pub labelled_utterances: usize,
    /// Listing entries kept in the index.
    pub indexed: usize,
    /// Listing entries dropped as malformed or unlabelled.
    pub dropped: usize,
    pub chunks: usize,
    /// Records written to chunk files.
    pub written: u64,
    /// Indexed utterances skipped at write time.
    pub skipped: usize,
    /// Coefficients per frame, if any record was written.
    pub veclen: Option<usize>,
}

/// Counts reported by [`verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub chunks: usize,
    pub utterances: u64,
    pub frames: u64,
    /// Coefficients per frame shared by every record.
    pub veclen: Option<usize>,
}

/// Runs a full conversion described by `config`.
pub fn convert(config: &ConvertConfig) -> Result<ConvertSummary> {
    config.validate()?;

    let vocab = PhoneVocabulary::load(&config.vocabulary, config.add_start_end)?;
    let labels = LabelParser::new(&vocab, config.label_format())
        .skip_malformed_files(config.skip_malformed_label_files)
        .parse_list(&config.mlf_list)?;
    let index = UtteranceIndex::build(&config.listing, &labels, config.feature_root.as_deref())?;

    let writer = ChunkWriter::new(&config.output_dir, config.writer_options())?;
    let written = writer.write(&index)?;

    Ok(ConvertSummary {
        vocabulary_size: vocab.len(),
        labelled_utterances: labels.len(),
        indexed: index.len(),
        dropped: index.dropped(),
        chunks: written.manifest.file_info.len(),
        written: written.written,
        skipped: written.skipped,
        veclen: written.veclen,
    })
}

/// Reads every chunk written for `config` back and checks that each
/// record holds exactly `labels * veclen * 4` feature bytes.
///
/// `veclen` is the expected frame dimension, usually
/// [`ConvertSummary::veclen`]. When `None`, the first record fixes it and
/// every later record must agree.
pub fn verify(config: &ConvertConfig, veclen: Option<usize>) -> Result<VerifySummary> {
    let reader = ChunkReader::open(
        &config.output_dir,
        &config.manifest_name,
        config.chunk_format(),
    )?;

    let mut summary = VerifySummary {
        chunks: reader.chunk_count(),
        veclen,
        ..Default::default()
    };
    for i in 0..reader.chunk_count() {
        let name = reader.chunk_info(i).map(|c| c.name.clone()).unwrap_or_default();
        for (n, utt) in reader.read_chunk(i)?.iter().enumerate() {
            let frames = utt.labels.len();
            let bytes = utt.feature.len();
            let dim = match summary.veclen {
                Some(dim) => dim,
                None if frames > 0 && bytes > 0 && bytes % (frames * 4) == 0 => {
                    bytes / (frames * 4)
                }
                None => {
                    return Err(Error::InvalidChunk(format!(
                        "{name} record {n}: {bytes} feature bytes do not split into {frames} frames of f32"
                    )));
                }
            };
            if frames == 0 || Some(bytes) != frames.checked_mul(dim * 4) {
                return Err(Error::InvalidChunk(format!(
                    "{name} record {n}: {bytes} feature bytes, want {frames} frames x {dim} x 4"
                )));
            }
            summary.veclen = Some(dim);
            summary.utterances += 1;
            summary.frames += frames as u64;
        }
    }
    info!(
        chunks = summary.chunks,
        utterances = summary.utterances,
        frames = summary.frames,
        veclen = ?summary.veclen,
        "chunks verified"
    );
    Ok(summary)
}
