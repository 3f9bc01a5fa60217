//! Typed wire-protocol errors.
//!
//! Everything above the wire layer (CLI entry points, the shell, the
//! coordinator) propagates failures as `anyhow::Result`; this module exists
//! for the errors a caller actually wants to match on — the protocol-level
//! dispositions named in the error handling design (REQERR / NOTFOUND /
//! READERR / WRERR / HASHERR) plus the framing and path-safety failures that
//! precede them.

use std::io;

/// A wire-protocol level failure.
///
/// Server-side handlers turn the in-band variants into the matching
/// protocol reply (`REQERR`, `NOTFOUND`, ...); client-side handlers turn
/// them into a per-request failure without tearing down the connection,
/// except where noted.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A line exceeded the implementation's length limit, or the stream
    /// produced bytes that could not be interpreted as a line. Fatal for
    /// the connection.
    #[error("framing error: {0}")]
    Framing(String),

    /// Malformed request, unknown keyword, or a GET/PUT direction
    /// conflict within the current batch. Recoverable: the server resets
    /// the batch and keeps the connection open.
    #[error("malformed request")]
    Request,

    /// The peer closed the connection (or sent EOF) in the middle of a
    /// message. Fatal for the in-flight transfer.
    #[error("connection closed mid-transfer")]
    UnexpectedEof,

    /// A sanitized or requested name would resolve outside the serving
    /// directory.
    #[error("path escapes serving directory: {0}")]
    PathEscape(String),

    /// The requested file does not exist, or is a directory.
    #[error("not found: {0}")]
    NotFound(String),

    /// The requested file exists but could not be opened or read.
    #[error("read error on {name}: {source}")]
    ReadError { name: String, source: io::Error },

    /// A PUT's destination temp file could not be created or written.
    #[error("write error on {name}: {source}")]
    WriteError { name: String, source: io::Error },

    /// The computed MD5 digest did not match the peer-supplied digest.
    #[error("checksum mismatch on {name}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Underlying I/O failure not covered by a more specific variant.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ProtocolError {
    /// True if the connection must be torn down after this error; false if
    /// the handler can reply in-band and keep serving the connection.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ProtocolError::Framing(_) | ProtocolError::UnexpectedEof | ProtocolError::Io(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
