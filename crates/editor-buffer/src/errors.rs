pub type BufferResult<T> = Result<T, BufferError>;

#[derive(Debug)]
pub enum BufferError {
    /// Arithmetic or conversion failure inside the store.
    Math(crate::enums::MathError),
    IoError(std::io::Error),
    /// Page growth or copy-on-write promotion could not allocate.
    /// The store is left in its pre-call state.
    OutOfMemory,
    /// Recoverable, user-visible: the undo log is empty or fully
    /// replayed. The buffer is unchanged.
    NothingToUndo,
    /// The buffer refuses mutation.
    ReadOnly,
    /// The undo log contains bytes that do not decode as an entry.
    CorruptLog,
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Math(e) => write!(f, "{e}"),
            BufferError::IoError(e) => write!(f, "io error: {e}"),
            BufferError::OutOfMemory => write!(f, "out of memory"),
            BufferError::NothingToUndo => write!(f, "no further undo information"),
            BufferError::ReadOnly => write!(f, "buffer is read-only"),
            BufferError::CorruptLog => write!(f, "undo log is corrupt"),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Math(e) => Some(e),
            BufferError::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<crate::enums::MathError> for BufferError {
    fn from(value: crate::enums::MathError) -> Self {
        BufferError::Math(value)
    }
}

impl From<std::num::TryFromIntError> for BufferError {
    fn from(value: std::num::TryFromIntError) -> Self {
        BufferError::Math(crate::enums::MathError::ConversionFailed(value))
    }
}

impl From<std::io::Error> for BufferError {
    fn from(value: std::io::Error) -> Self {
        BufferError::IoError(value)
    }
}

impl From<std::collections::TryReserveError> for BufferError {
    fn from(_: std::collections::TryReserveError) -> Self {
        BufferError::OutOfMemory
    }
}
