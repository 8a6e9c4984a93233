//! Error types for `TkMerge`
//!
//! SPDX-FileCopyrightText: 2025 `CyberDeco`
//!
//! SPDX-License-Identifier: MIT

use thiserror::Error;

/// The error type for `TkMerge` operations.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum Error {
    // ==================== IO Errors ====================
    /// IO error from file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing to the output failed. Never recovered per file.
    #[error("failed to write output '{path}': {source}")]
    Output {
        /// Relative output path.
        path: String,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// Directory traversal error.
    #[error("directory walk error: {0}")]
    WalkDir(String),

    // ==================== Format Errors ====================
    /// The data does not start with the expected magic.
    #[error("invalid {format} magic: expected {expected:?}, found {found:?}")]
    InvalidMagic {
        /// Format name.
        format: &'static str,
        /// Expected magic bytes.
        expected: &'static [u8],
        /// Bytes found instead.
        found: Vec<u8>,
    },

    /// The format version is not supported.
    #[error("unsupported {format} version: {version}")]
    UnsupportedVersion {
        /// Format name.
        format: &'static str,
        /// Version found in the data.
        version: u32,
    },

    /// An unknown BYML node tag was encountered.
    #[error("invalid BYML node type: 0x{0:02X}")]
    InvalidNodeType(u8),

    /// The tree does not have the shape a handler expects.
    #[error("unexpected structure in {context}: {message}")]
    UnexpectedStructure {
        /// What was being read.
        context: String,
        /// Description of the mismatch.
        message: String,
    },

    /// A string was not valid UTF-8 / UTF-16.
    #[error("invalid string data: {0}")]
    InvalidString(String),

    /// Unexpected end of data.
    #[error("unexpected end of data")]
    UnexpectedEof,

    // ==================== Key / Index Errors ====================
    /// A keyed array used a key field of a type that cannot be hashed.
    #[error("unsupported key type for field '{field}': {found}")]
    UnsupportedKeyType {
        /// Key field name.
        field: String,
        /// Node type found.
        found: &'static str,
    },

    /// An array changelog mixed positional and keyed entries.
    #[error("array changelog mixes keyed and positional entries")]
    MixedArrayChangelog,

    // ==================== Compression Errors ====================
    /// Zstd compression or decompression failed.
    #[error("zstd error: {0}")]
    Zstd(String),

    /// A compressed file references a dictionary that was never registered.
    #[error("zstd dictionary {0} not loaded")]
    MissingDictionary(u32),

    // ==================== Orchestration Errors ====================
    /// A mod path is outside every known root.
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// A changelog entry points at content missing from the mod.
    #[error("changelog content not found: {0}")]
    MissingContent(String),

    /// The run was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration could not be parsed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Shorthand for [`Error::UnexpectedStructure`].
    pub(crate) fn structure(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::UnexpectedStructure {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Whether this error must abort the whole run instead of a single target.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Output { .. } | Self::Cancelled)
    }
}

impl From<walkdir::Error> for Error {
    fn from(err: walkdir::Error) -> Self {
        Error::WalkDir(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::InvalidString(err.to_string())
    }
}

/// A specialized Result type for `TkMerge` operations.
pub type Result<T> = std::result::Result<T, Error>;
