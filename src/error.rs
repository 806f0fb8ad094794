//! Crate-wide error taxonomy.
//!
//! Mirrors the error kinds every decoder/encoder in this crate can raise.
//! Modelled by hand (no `std::error::Error`-deriving macro crate) in the
//! manner of `font-kit`'s `src/error.rs`.

use std::fmt;
use std::io;

/// Reasons a codec can fail to decode or encode a font.
#[derive(Debug)]
pub enum Error {
    /// No registered loader's magic or suffix matched the input.
    UnknownFormat,
    /// The format's magic matched but this revision isn't implemented.
    UnsupportedVersion(String),
    /// The file is internally inconsistent: truncated header, an offset
    /// outside the file, disagreeing block sizes, and the like.
    BadStructure(String),
    /// The input uses a feature this codec deliberately does not support
    /// (colour/antialiased glyphs, vector outlines, multi-codepoint glyphs
    /// into a single-codepoint format, ...).
    UnsupportedFeature(String),
    /// An encodable glyph or font property doesn't fit the target format's
    /// constraints (byte-sized field overflow, single font required, ...).
    ConstraintViolated(String),
    /// The underlying stream failed.
    IoError(io::Error),
    /// A charset id could not be mapped to a canonical charmap name. Only
    /// fatal when the caller explicitly asks for a strict mapping; decoders
    /// otherwise keep the raw id around and carry on.
    CharsetUnknown(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownFormat => write!(f, "unknown or unrecognised font format"),
            Error::UnsupportedVersion(msg) => write!(f, "unsupported format version: {msg}"),
            Error::BadStructure(msg) => write!(f, "malformed font file: {msg}"),
            Error::UnsupportedFeature(msg) => write!(f, "unsupported feature: {msg}"),
            Error::ConstraintViolated(msg) => write!(f, "constraint violated: {msg}"),
            Error::IoError(e) => write!(f, "I/O error: {e}"),
            Error::CharsetUnknown(id) => write!(f, "unknown charset identifier: {id}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::IoError(e)
    }
}

impl From<std::str::Utf8Error> for Error {
    fn from(e: std::str::Utf8Error) -> Self {
        Error::BadStructure(format!("invalid utf-8: {e}"))
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Shorthand for building a [`Error::BadStructure`] from a `format!`-style
/// message; used pervasively by the per-format decoders to turn an
/// `Option::None` from a `Stream` read into a proper error.
macro_rules! bad_structure {
    ($($arg:tt)*) => {
        $crate::error::Error::BadStructure(format!($($arg)*))
    };
}
pub(crate) use bad_structure;
