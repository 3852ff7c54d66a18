use std::io;
use thiserror::Error;

/// Errors produced while reading or writing EDF/BDF files.
///
/// Every variant maps onto one of the small negative integers that
/// integer-handle callers expect, see [`EdfError::code`].
#[derive(Debug, Error)]
pub enum EdfError {
    #[error("Memory allocation error")]
    MemoryError,

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid file format: {0}")]
    InvalidFormat(String),

    #[error("Too many files opened (max {0})")]
    MaxFilesReached(usize),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File already opened: {0}")]
    FileAlreadyOpened(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Write error: {0}")]
    WriteError(io::Error),

    #[error("Invalid number of signals: {0}")]
    InvalidSignalCount(i64),

    #[error("File is discontinuous")]
    DiscontinuousFile,

    #[error("Invalid annotation read mode: {0}")]
    InvalidReadAnnotsValue(i32),

    #[error("No signals defined")]
    NoSignals,

    #[error("Too many signals: {0}")]
    TooManySignals(usize),

    #[error("Signal {0} has no samples per data record")]
    NoSamplesInRecord(usize),

    #[error("Signal {0}: digital min equals digital max")]
    DigitalMinEqualsMax(usize),

    #[error("Signal {0}: digital max is lower than digital min")]
    DigitalMaxBelowMin(usize),

    #[error("Signal {0}: physical min equals physical max")]
    PhysicalMinEqualsMax(usize),

    #[error("Signal index {0} out of range")]
    InvalidSignalIndex(usize),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Header is locked once the first data record has been written")]
    WritingStarted,

    #[error("Invalid or closed handle: {0}")]
    InvalidHandle(i64),

    #[error("Operation not allowed in this mode: {0}")]
    WrongMode(&'static str),
}

impl EdfError {
    /// The legacy numeric error code for this error.
    pub fn code(&self) -> i32 {
        match self {
            EdfError::MemoryError => -1,
            EdfError::FileNotFound(_) => -2,
            EdfError::InvalidFormat(_) => -3,
            EdfError::MaxFilesReached(_) => -4,
            EdfError::Io(_) => -5,
            EdfError::FileAlreadyOpened(_) => -6,
            EdfError::UnsupportedFileType(_) => -7,
            EdfError::WriteError(_) => -8,
            EdfError::InvalidSignalCount(_) => -9,
            EdfError::DiscontinuousFile => -10,
            EdfError::InvalidReadAnnotsValue(_) => -11,
            EdfError::NoSignals => -20,
            EdfError::TooManySignals(_) => -21,
            EdfError::NoSamplesInRecord(_) => -22,
            EdfError::DigitalMinEqualsMax(_) => -23,
            EdfError::DigitalMaxBelowMin(_) => -24,
            EdfError::PhysicalMinEqualsMax(_) => -25,
            EdfError::InvalidSignalIndex(_)
            | EdfError::InvalidArgument(_)
            | EdfError::WritingStarted
            | EdfError::InvalidHandle(_)
            | EdfError::WrongMode(_) => -1,
        }
    }

    pub(crate) fn format(reason: impl Into<String>) -> Self {
        EdfError::InvalidFormat(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, EdfError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_legacy_values() {
        assert_eq!(EdfError::format("version").code(), -3);
        assert_eq!(EdfError::DiscontinuousFile.code(), -10);
        assert_eq!(EdfError::InvalidReadAnnotsValue(3).code(), -11);
        assert_eq!(EdfError::PhysicalMinEqualsMax(0).code(), -25);
        assert_eq!(EdfError::WritingStarted.code(), -1);
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "eof");
        assert_eq!(EdfError::from(io).code(), -5);
    }
}
