use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Error type used across the crate
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to {op} {}: {source}", path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Grammar(#[from] GrammarViolation),

    #[error("key of {len} bytes at byte offset {offset} exceeds the {max} byte limit")]
    KeyTooLong { offset: u64, len: usize, max: usize },

    #[error("table capacity of {capacity} slots exceeded")]
    CapacityExceeded { capacity: usize },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Byte offset of the offending record, for record-level errors.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::Grammar(violation) => Some(violation.offset),
            Error::KeyTooLong { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Record-level errors are the ones a skip policy may recover from.
    pub fn is_record_error(&self) -> bool {
        self.offset().is_some()
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    /// No `;` at any of the offsets the value grammar allows.
    MissingSeparator,
    /// A byte where a digit, sign or dot was required.
    BadDigit,
    /// Nothing before the separator.
    EmptyKey,
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ViolationKind::MissingSeparator => "no separator before a well-formed value",
            ViolationKind::BadDigit => "value is not of the form -?d{1,2}.d",
            ViolationKind::EmptyKey => "empty key",
        };
        f.write_str(text)
    }
}

/// A record that does not match `<key>;-?d{1,2}.d`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed record at byte offset {offset}: {kind} (`{record}`)")]
pub struct GrammarViolation {
    pub offset: u64,
    pub kind: ViolationKind,
    /// Lossy rendering of the record, truncated for display.
    pub record: String,
}

const RECORD_PREVIEW: usize = 64;

impl GrammarViolation {
    pub fn new(offset: u64, kind: ViolationKind, record: &[u8]) -> Self {
        let shown = &record[..record.len().min(RECORD_PREVIEW)];
        Self {
            offset,
            kind,
            record: String::from_utf8_lossy(shown).into_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_carries_offset_and_truncates_preview() {
        let long = vec![b'x'; 200];
        let violation = GrammarViolation::new(42, ViolationKind::MissingSeparator, &long);
        assert_eq!(violation.record.len(), RECORD_PREVIEW);
        let error = Error::from(violation);
        assert_eq!(error.offset(), Some(42));
        assert!(error.is_record_error());
        assert!(error.to_string().contains("byte offset 42"));
    }

    #[test]
    fn capacity_is_not_a_record_error() {
        let error = Error::CapacityExceeded { capacity: 16 };
        assert_eq!(error.offset(), None);
        assert!(!error.is_record_error());
    }
}
