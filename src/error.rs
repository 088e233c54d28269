
//! Error type definitions.
//! Every fallible operation in this crate reports one of the
//! closed set of [`ErrorKind`] values, together with a short message.

use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::num::TryFromIntError;

/// A result that may contain an exr error.
pub type Result<T> = std::result::Result<T, Error>;

/// A result that, if ok, contains nothing, and otherwise contains an exr error.
pub type UnitResult = Result<()>;

/// An input/output error from the standard library.
pub use std::io::Error as IoError;

/// An input/output result from the standard library.
pub use std::io::Result as IoResult;


/// The reason an operation failed.
/// This is a closed set: no new kinds are added outside of semver-breaking releases,
/// so downstream code can match on it exhaustively.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum ErrorKind {

    /// A buffer or table could not be allocated.
    OutOfMemory,

    /// An operation requires a context but was given none.
    MissingContextArg,

    /// An argument was structurally wrong, for example a duplicate
    /// attribute with a conflicting type.
    InvalidArgument,

    /// An argument was out of the valid numeric range.
    ArgumentOutOfRange,

    /// The file could not be opened, created, or renamed.
    FileAccess,

    /// The file does not start with a valid magic number and version word.
    FileBadHeader,

    /// The operation requires a context that was opened for reading.
    NotOpenRead,

    /// The operation requires a context that was opened for writing.
    NotOpenWrite,

    /// Pixel data was requested before the headers have been written.
    HeaderNotWritten,

    /// The backend failed to produce the requested bytes.
    ReadIo,

    /// The backend failed to consume the provided bytes.
    WriteIo,

    /// An attribute or channel name exceeds the allowed length.
    NameTooLong,

    /// A required attribute is missing from a header.
    MissingRequiredAttr,

    /// An attribute value is not valid for its type.
    InvalidAttr,

    /// No attribute with the requested name exists.
    NoAttrByName,

    /// A chunk leader does not match the expected part, locator or size.
    BadChunkLeader,

    /// The chunk payload could not be decoded.
    CorruptChunk,

    /// A deep sample count table is inconsistent.
    InvalidSampleData,

    /// An attribute exists with the same name but a different type.
    AttrTypeMismatch,

    /// An attribute value has an unexpected encoded size.
    AttrSizeMismatch,

    /// A scan line operation was used on a tiled part.
    ScanTileMixedApi,

    /// A tile operation was used on a scan line part.
    TileScanMixedApi,

    /// An update would change the size of already written data.
    ModifySizeChange,

    /// The header was already flushed to the file and can no longer change.
    AlreadyWroteAttrs,

    /// The part index does not exist in this file.
    IncorrectPart,

    /// The chunk locator does not exist in this part.
    IncorrectChunk,

    /// A deep write function was called for a flat scan line part.
    UseScanDeepWrite,

    /// A deep write function was called for a flat tiled part.
    UseTileDeepWrite,

    /// A flat write function was called for a deep scan line part.
    UseScanNonDeepWrite,

    /// A flat write function was called for a deep tiled part.
    UseTileNonDeepWrite,

    /// The compressor failed to produce output.
    CompressionFailed,

    /// The decompressor failed to reconstruct the pixel bytes.
    DecompressionFailed,

    /// An unclassified failure.
    Unknown,

    /// The requested feature is known but not compiled into this library.
    FeatureNotImplemented,
}

impl ErrorKind {

    /// A short constant description of this error kind.
    pub fn describe(self) -> &'static str {
        use self::ErrorKind::*;
        match self {
            OutOfMemory => "unable to allocate memory",
            MissingContextArg => "missing context argument",
            InvalidArgument => "invalid argument",
            ArgumentOutOfRange => "argument out of range",
            FileAccess => "unable to access file",
            FileBadHeader => "file is not an exr file",
            NotOpenRead => "file not opened for reading",
            NotOpenWrite => "file not opened for writing",
            HeaderNotWritten => "header not yet written",
            ReadIo => "error reading from stream",
            WriteIo => "error writing to stream",
            NameTooLong => "name too long",
            MissingRequiredAttr => "missing required attribute",
            InvalidAttr => "invalid attribute",
            NoAttrByName => "no attribute with that name",
            BadChunkLeader => "corrupt chunk leader",
            CorruptChunk => "corrupt chunk data",
            InvalidSampleData => "corrupt deep sample counts",
            AttrTypeMismatch => "attribute type mismatch",
            AttrSizeMismatch => "attribute size mismatch",
            ScanTileMixedApi => "scan line api used on tiled part",
            TileScanMixedApi => "tile api used on scan line part",
            ModifySizeChange => "update would change data size",
            AlreadyWroteAttrs => "attributes already written",
            IncorrectPart => "no such part",
            IncorrectChunk => "no such chunk",
            UseScanDeepWrite => "use the deep scan line write path",
            UseTileDeepWrite => "use the deep tile write path",
            UseScanNonDeepWrite => "use the flat scan line write path",
            UseTileNonDeepWrite => "use the flat tile write path",
            CompressionFailed => "compression failed",
            DecompressionFailed => "decompression failed",
            Unknown => "unknown error",
            FeatureNotImplemented => "feature not implemented",
        }
    }
}


/// An error communicating why an operation could not complete.
/// Contains the machine-readable [`ErrorKind`] and a human-readable message.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Cow<'static, str>,
}

impl Error {

    /// Create an error of the specified kind with a custom message.
    pub fn new(kind: ErrorKind, message: impl Into<Cow<'static, str>>) -> Self {
        Error { kind, message: message.into() }
    }

    /// Create an error of the specified kind, using the kind's constant description.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Error { kind, message: Cow::Borrowed(kind.describe()) }
    }

    /// Create an `InvalidArgument` error describing the invalid content.
    pub fn invalid(message: impl Into<Cow<'static, str>>) -> Self {
        Error::new(ErrorKind::InvalidArgument, message)
    }

    /// Create a `FeatureNotImplemented` error describing the missing feature.
    pub fn unsupported(message: impl Into<Cow<'static, str>>) -> Self {
        Error::new(ErrorKind::FeatureNotImplemented, message)
    }

    /// Create a `ReadIo` error from a standard io error.
    pub fn read_io(error: IoError) -> Self {
        Error::new(ErrorKind::ReadIo, error.to_string())
    }

    /// Create a `WriteIo` error from a standard io error.
    pub fn write_io(error: IoError) -> Self {
        Error::new(ErrorKind::WriteIo, error.to_string())
    }

    /// The machine-readable reason of this error.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The human-readable message of this error.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for Error {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.message)
    }
}

impl std::error::Error for Error {}

/// Enable using the `?` operator on `io::Result`.
/// Reading is by far the most common stream operation in this crate,
/// so a bare io error converts to `ReadIo`. Write paths use [`Error::write_io`].
impl From<IoError> for Error {
    fn from(error: IoError) -> Self {
        Error::read_io(error)
    }
}

impl From<TryFromIntError> for Error {
    fn from(_: TryFromIntError) -> Self {
        Error::new(ErrorKind::ArgumentOutOfRange, "invalid number cast")
    }
}


/// Cast a `usize` to an `i32`, returning an error on overflow.
#[inline]
pub fn usize_to_i32(value: usize) -> i32 {
    i32::try_from(value).expect("(usize as i32) overflowed")
}

/// Cast a `usize` to an `u64`.
#[inline]
pub fn usize_to_u64(value: usize) -> u64 {
    u64::try_from(value).expect("(usize as u64) overflowed")
}

/// Cast a `u64` to a `usize`, panicking on 16-bit machines.
#[inline]
pub fn u64_to_usize(value: u64) -> usize {
    usize::try_from(value).expect("(u64 as usize) overflowed")
}

/// Cast a `u32` to a `usize`, panicking on 16-bit machines.
#[inline]
pub fn u32_to_usize(value: u32) -> usize {
    usize::try_from(value).expect("(u32 as usize) overflowed")
}

/// Cast a `usize` to an `u16`, returning an error on overflow.
#[inline]
pub fn usize_to_u16(value: usize) -> Result<u16> {
    Ok(u16::try_from(value)?)
}

/// Cast an `i32` to a `usize`, returning an error for negative numbers.
#[inline]
pub fn i32_to_usize(value: i32, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}

/// Cast an `i64` to a `usize`, returning an error for negative numbers.
#[inline]
pub fn i64_to_usize(value: i64, error_message: &'static str) -> Result<usize> {
    usize::try_from(value).map_err(|_| Error::invalid(error_message))
}
