//! Client-side protocol implementation: response parsing, the per-connection
//! request pipeline, the transfer coordinator, and the interactive shell.

pub mod coordinator;
pub mod pipeline;
pub mod response;
pub mod shell;

pub use coordinator::{Endpoint, TransferMode};
pub use shell::Shell;
