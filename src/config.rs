//! Command-line surfaces for both binaries.
//!
//! Both structs accept `env` fallbacks even though the distilled wire spec
//! never mentions environment variables — an ambient convenience that
//! falls out of `clap`'s `env` feature already being part of the
//! dependency set, not a new dependency pulled in to support it.

use std::path::PathBuf;

use clap::Parser;

/// Default TCP port for both the server and the client.
pub const DEFAULT_PORT: u16 = 65500;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warn => "warn",
            Self::Info => "info",
            Self::Debug => "debug",
            Self::Trace => "trace",
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "filestore-server", about = "Serves a directory over the file-store protocol")]
pub struct ServerArgs {
    /// TCP port to listen on.
    #[arg(long = "port", env = "FS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Directory to serve. Relative to the process working directory.
    #[arg(long = "dir", env = "FS_DIR", default_value = "files")]
    pub dir: PathBuf,

    /// Raise log verbosity once (debug).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Explicit log level; overrides `-v`/`-vv` if both are given.
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,
}

impl ServerArgs {
    /// Resolves the effective `tracing_subscriber` filter string from
    /// `--log-level`, falling back to the `-v` count, falling back to
    /// `info`.
    pub fn effective_log_filter(&self) -> &'static str {
        resolve_log_filter(self.log_level, self.verbose)
    }
}

#[derive(Debug, Parser)]
#[command(name = "filestore-client", about = "Interactive client for the file-store protocol")]
pub struct ClientArgs {
    /// Server host to connect to.
    #[arg(long = "host", env = "FS_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to connect to.
    #[arg(long = "port", env = "FS_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Connection cap used in `parallel` mode.
    #[arg(long = "climit")]
    pub climit: Option<usize>,

    /// Non-interactive mode: run `getall` in the given mode and exit.
    /// Any value other than `single`/`parallel`/`persistent`/`pipelined`
    /// starts the interactive shell instead.
    #[arg(long = "run")]
    pub run: Option<String>,

    /// Raise log verbosity once (debug).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Explicit log level; overrides `-v`/`-vv` if both are given.
    #[arg(long = "log-level", value_enum)]
    pub log_level: Option<LogLevel>,
}

impl ClientArgs {
    pub fn effective_log_filter(&self) -> &'static str {
        resolve_log_filter(self.log_level, self.verbose)
    }
}

fn resolve_log_filter(log_level: Option<LogLevel>, verbose: u8) -> &'static str {
    if let Some(level) = log_level {
        return level.as_filter();
    }
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}
