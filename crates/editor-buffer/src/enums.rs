/// The three loggable mutations. Every observer notification and
/// every undo-log entry carries one of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogOperation {
    /// In-place overwrite of existing bytes.
    Write,
    /// Insertion of new bytes; the undo of an insert is a delete of
    /// the same range, so no payload is ever logged for it.
    Insert,
    /// Removal of existing bytes.
    Delete,
}

impl LogOperation {
    #[inline]
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            LogOperation::Write => 0,
            LogOperation::Insert => 1,
            LogOperation::Delete => 2,
        }
    }

    #[must_use]
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(LogOperation::Write),
            1 => Some(LogOperation::Insert),
            2 => Some(LogOperation::Delete),
            _ => None,
        }
    }
}

/// Where the next undo starts searching backward from.
///
/// Replaces the original `log_current` integer whose value 0 meant
/// "at the tip" and whose value `n` meant "entry starting at n - 1".
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogCursor {
    /// The next undo target is the most recent entry, found by
    /// stepping backward from the end of the log.
    AtTip,
    /// Mid-history: the next undo target is found by stepping
    /// backward from this entry's start.
    AtEntry(u64),
}

#[derive(Debug, PartialEq)]
pub enum MathError {
    /// Wraps the specific error TryInto generates
    ConversionFailed(std::num::TryFromIntError),
    /// Represents the `None` case from checked math
    Overflow,
    OutOfBounds(u64),
}

impl std::fmt::Display for MathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MathError::ConversionFailed(e) => write!(f, "integer conversion failed: {e}"),
            MathError::Overflow => write!(f, "arithmetic overflow"),
            MathError::OutOfBounds(offset) => write!(f, "offset out of bounds (offset={offset})"),
        }
    }
}

impl std::error::Error for MathError {}

impl From<std::num::TryFromIntError> for MathError {
    fn from(err: std::num::TryFromIntError) -> Self {
        MathError::ConversionFailed(err)
    }
}
