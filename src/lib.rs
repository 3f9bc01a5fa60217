//! Minimal remote file-store: a line-oriented TCP protocol, an MD5
//! checksum engine, and the server/client halves built on top of them.

pub mod checksum;
pub mod client;
pub mod config;
pub mod error;
pub mod framing;
pub mod path;
pub mod server;
pub mod tempfile_guard;
