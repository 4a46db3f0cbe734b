//! Error types for HTK corpus conversion.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for HTK operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for HTK reading, parsing, and chunk writing.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error.
    #[error("htk: io error: {0}")]
    Io(#[from] std::io::Error),

    /// Manifest JSON error.
    #[error("htk: json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Config YAML error.
    #[error("htk: yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A listing line does not match `utt_id=path[start,end]`.
    #[error("htk: malformed listing line {line}: {content:?}")]
    MalformedListingLine { line: usize, content: String },

    /// A label file violates its grammar.
    #[error("htk: malformed label record in {}: {reason}", path.display())]
    MalformedLabelRecord { path: PathBuf, reason: String },

    /// A label references a symbol missing from the vocabulary.
    #[error("htk: unknown symbol {0:?}")]
    UnknownSymbol(String),

    /// The vocabulary lists the same symbol twice.
    #[error("htk: duplicate symbol {0:?} in vocabulary")]
    DuplicateSymbol(String),

    /// A frame range with `end < start` (or too long to count) was requested.
    #[error("htk: invalid frame range [{start}, {end}]")]
    FrameRangeInvalid { start: u64, end: u64 },

    /// A frame range reaches beyond the last frame of the file.
    #[error("htk: frame range [{start}, {end}] runs past the end of the feature data")]
    FrameRangePastEnd { start: u64, end: u64 },

    /// Label run lengths disagree with the utterance frame count.
    #[error("htk: run length mismatch for {utt_id}: labels cover {actual} frames, want {expected}")]
    RunLengthMismatch {
        utt_id: String,
        expected: u64,
        actual: u64,
    },

    /// Feature file header is unusable.
    #[error("htk: invalid feature header: {0}")]
    InvalidHeader(String),

    /// A value does not fit its on-disk field.
    #[error("htk: {field} value {value} overflows its field")]
    FieldOverflow { field: &'static str, value: u64 },

    /// A chunk file or manifest is inconsistent.
    #[error("htk: invalid chunk: {0}")]
    InvalidChunk(String),

    /// Invalid configuration.
    #[error("htk: invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    pub(crate) fn malformed_label(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Error::MalformedLabelRecord {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Returns true for failures that only affect a single utterance.
    pub fn is_utterance_local(&self) -> bool {
        matches!(
            self,
            Error::FrameRangeInvalid { .. } | Error::FrameRangePastEnd { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownSymbol("sil[2]".into());
        assert_eq!(err.to_string(), r#"htk: unknown symbol "sil[2]""#);

        let err = Error::FrameRangeInvalid { start: 9, end: 3 };
        assert_eq!(err.to_string(), "htk: invalid frame range [9, 3]");

        let err = Error::malformed_label("a.mlf", "unexpected line");
        assert_eq!(
            err.to_string(),
            "htk: malformed label record in a.mlf: unexpected line"
        );
    }

    #[test]
    fn test_utterance_local() {
        assert!(Error::FrameRangeInvalid { start: 1, end: 0 }.is_utterance_local());
        assert!(Error::FrameRangePastEnd { start: 0, end: 9 }.is_utterance_local());
        assert!(!Error::UnknownSymbol("x".into()).is_utterance_local());
    }
}
