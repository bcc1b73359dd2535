//! Library-wide error, result and status types.

use std::fmt;
use std::io;

use thiserror::Error;

/// Result alias used throughout hakcache.
pub type Result<T> = std::result::Result<T, Error>;

/// All errors the library can produce.
///
/// Error messages are kept intentionally terse; callers that need richer
/// context should wrap `Error` in their own type.
#[derive(Debug, Error)]
pub enum Error {
    /// A magic/signature field did not match the expected value.
    #[error("bad magic value")]
    BadMagic,
    /// The stream ended before all expected bytes could be read.
    #[error("unexpected end of file")]
    UnexpectedEof,
    /// A null-terminated string had no null terminator within the buffer.
    #[error("unterminated string")]
    UnterminatedName,
    /// An offset or size field would read outside the valid region.
    #[error("invalid offset or size")]
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    #[error("parse error: {0}")]
    Parse(&'static str),
    /// A content id was not 32 hex digits.
    #[error("invalid content id: {0}")]
    InvalidContentId(String),
    /// A file or directory that had to exist was missing.
    #[error("not found: {0}")]
    NotFound(String),
    /// A file or directory that had to be new already existed.
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The decryption collaborator refused the archive.
    #[error("decode error: {0}")]
    Decode(String),
    /// Configuration could not be loaded or is inconsistent.
    #[error("config error: {0}")]
    Config(String),
    /// An underlying I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Outcome of parsing a container (NCA, XCI).
///
/// Container views are always constructed; the status says whether the
/// accessors may be trusted. Anything other than [`LoadStatus::Success`]
/// means the header was rejected or a derived view is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadStatus {
    Success,
    /// Header shorter than its fixed size, or a structural field is out of range.
    ErrorBadHeader,
    /// Header magic did not match.
    ErrorBadMagic,
    /// The header declares a content type outside the known set.
    ErrorUnknownContentType,
    /// The decoder could not produce plaintext for the header or a section.
    ErrorDecryption,
    /// A partition (PFS0/HFS0) inside the container is malformed.
    ErrorBadPartition,
    /// Patch (BKTR) section present but no base archive was supplied.
    ErrorMissingBktrBaseRomFs,
    /// A required gamecard partition is absent.
    ErrorMissingPartition,
    /// No usable Program archive was found where one was expected.
    ErrorMissingProgram,
    /// The backing file could not be read.
    ErrorIo,
}

impl LoadStatus {
    pub fn is_success(self) -> bool {
        self == LoadStatus::Success
    }
}

impl From<&Error> for LoadStatus {
    fn from(e: &Error) -> Self {
        match e {
            Error::BadMagic => LoadStatus::ErrorBadMagic,
            Error::Decode(_) => LoadStatus::ErrorDecryption,
            Error::Io(_) => LoadStatus::ErrorIo,
            _ => LoadStatus::ErrorBadHeader,
        }
    }
}

impl fmt::Display for LoadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadStatus::Success => "success",
            LoadStatus::ErrorBadHeader => "bad header",
            LoadStatus::ErrorBadMagic => "bad magic",
            LoadStatus::ErrorUnknownContentType => "unknown content type",
            LoadStatus::ErrorDecryption => "decryption failed",
            LoadStatus::ErrorBadPartition => "bad partition",
            LoadStatus::ErrorMissingBktrBaseRomFs => "missing BKTR base RomFS",
            LoadStatus::ErrorMissingPartition => "missing partition",
            LoadStatus::ErrorMissingProgram => "missing program archive",
            LoadStatus::ErrorIo => "I/O failure",
        };
        f.write_str(s)
    }
}

/// Outcome of an install operation.
///
/// No rollback is performed on failure; after [`InstallResult::ErrorCopyFailed`]
/// the destination file may exist but be incomplete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InstallResult {
    Success,
    ErrorAlreadyExists,
    ErrorCopyFailed,
    ErrorMetaFailed,
}

impl InstallResult {
    pub fn is_success(self) -> bool {
        self == InstallResult::Success
    }
}
