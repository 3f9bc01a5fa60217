//! Transfer coordinator: owns the chosen transfer mode, opens the
//! connection(s) it needs, and returns only once every worker has
//! finished all I/O and closed its connection — the task-join completion
//! barrier called for in the concurrency design, replacing a shell-held
//! mutex with `tokio::spawn` + awaiting every handle.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::io::BufReader;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;

use crate::client::pipeline::{self, TransferResult};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Single,
    Parallel,
    Persistent,
    Pipelined,
}

impl TransferMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "single" => Some(Self::Single),
            "parallel" => Some(Self::Parallel),
            "persistent" => Some(Self::Persistent),
            "pipelined" => Some(Self::Pipelined),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Parallel => "parallel",
            Self::Persistent => "persistent",
            Self::Pipelined => "pipelined",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

/// The outcome of one file within a batch, reported back to the shell.
#[derive(Debug, Clone)]
pub struct TransferReport {
    pub name: String,
    pub result: TransferResult,
}

async fn connect(
    endpoint: &Endpoint,
) -> Result<(
    BufReader<tokio::net::tcp::OwnedReadHalf>,
    tokio::net::tcp::OwnedWriteHalf,
)> {
    let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
        .await
        .map_err(ProtocolError::Io)?;
    let (rd, wr) = stream.into_split();
    Ok((BufReader::new(rd), wr))
}

/// Downloads `names` into `dest_dir` under the given mode.
///
/// `max_parallel` bounds concurrently open connections in `parallel` mode;
/// `None` means effectively unbounded, i.e. one connection per file in the
/// batch with no artificial cap beyond that.
pub async fn get_files(
    endpoint: &Endpoint,
    names: Vec<String>,
    dest_dir: PathBuf,
    mode: TransferMode,
    max_parallel: Option<usize>,
) -> Result<Vec<TransferReport>> {
    match mode {
        TransferMode::Single => {
            let mut reports = Vec::with_capacity(names.len());
            for name in names {
                let (mut reader, mut writer) = connect(endpoint).await?;
                let outcome = pipeline::get_batch(
                    &mut reader,
                    &mut writer,
                    std::slice::from_ref(&name),
                    &dest_dir,
                    false,
                )
                .await?;
                pipeline::send_bye(&mut writer).await?;
                reports.extend(to_reports(outcome));
            }
            Ok(reports)
        }
        TransferMode::Persistent => {
            let (mut reader, mut writer) = connect(endpoint).await?;
            let outcome =
                pipeline::get_batch(&mut reader, &mut writer, &names, &dest_dir, false).await?;
            pipeline::send_bye(&mut writer).await?;
            Ok(to_reports(outcome))
        }
        TransferMode::Pipelined => {
            let (mut reader, mut writer) = connect(endpoint).await?;
            let outcome =
                pipeline::get_batch(&mut reader, &mut writer, &names, &dest_dir, true).await?;
            pipeline::send_bye(&mut writer).await?;
            Ok(to_reports(outcome))
        }
        TransferMode::Parallel => {
            let cap = max_parallel.unwrap_or_else(|| names.len().max(1));
            let semaphore = Arc::new(Semaphore::new(cap));
            let mut handles = Vec::with_capacity(names.len());

            for name in names {
                let semaphore = semaphore.clone();
                let endpoint = endpoint.clone();
                let dest_dir = dest_dir.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let (mut reader, mut writer) = connect(&endpoint).await?;
                    let outcome = pipeline::get_batch(
                        &mut reader,
                        &mut writer,
                        std::slice::from_ref(&name),
                        &dest_dir,
                        false,
                    )
                    .await?;
                    pipeline::send_bye(&mut writer).await?;
                    Result::Ok(outcome)
                }));
            }

            let mut reports = Vec::new();
            for handle in handles {
                let outcome = handle.await.expect("get worker task panicked")?;
                reports.extend(to_reports(outcome));
            }
            Ok(reports)
        }
    }
}

/// Uploads `local_paths` under the given mode.
pub async fn put_files(
    endpoint: &Endpoint,
    local_paths: Vec<PathBuf>,
    mode: TransferMode,
    max_parallel: Option<usize>,
) -> Result<Vec<TransferReport>> {
    match mode {
        TransferMode::Single => {
            let mut reports = Vec::with_capacity(local_paths.len());
            for path in local_paths {
                let (mut reader, mut writer) = connect(endpoint).await?;
                let outcome = pipeline::put_batch(
                    &mut reader,
                    &mut writer,
                    std::slice::from_ref(&path),
                    false,
                )
                .await?;
                pipeline::send_bye(&mut writer).await?;
                reports.extend(to_reports(outcome));
            }
            Ok(reports)
        }
        TransferMode::Persistent => {
            let (mut reader, mut writer) = connect(endpoint).await?;
            let outcome =
                pipeline::put_batch(&mut reader, &mut writer, &local_paths, false).await?;
            pipeline::send_bye(&mut writer).await?;
            Ok(to_reports(outcome))
        }
        TransferMode::Pipelined => {
            let (mut reader, mut writer) = connect(endpoint).await?;
            let outcome =
                pipeline::put_batch(&mut reader, &mut writer, &local_paths, true).await?;
            pipeline::send_bye(&mut writer).await?;
            Ok(to_reports(outcome))
        }
        TransferMode::Parallel => {
            let cap = max_parallel.unwrap_or_else(|| local_paths.len().max(1));
            let semaphore = Arc::new(Semaphore::new(cap));
            let mut handles = Vec::with_capacity(local_paths.len());

            for path in local_paths {
                let semaphore = semaphore.clone();
                let endpoint = endpoint.clone();
                handles.push(tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
                    let (mut reader, mut writer) = connect(&endpoint).await?;
                    let outcome = pipeline::put_batch(
                        &mut reader,
                        &mut writer,
                        std::slice::from_ref(&path),
                        false,
                    )
                    .await?;
                    pipeline::send_bye(&mut writer).await?;
                    Result::Ok(outcome)
                }));
            }

            let mut reports = Vec::new();
            for handle in handles {
                let outcome = handle.await.expect("put worker task panicked")?;
                reports.extend(to_reports(outcome));
            }
            Ok(reports)
        }
    }
}

/// Opens a dedicated connection, fetches the generated index, and closes.
pub async fn get_index(endpoint: &Endpoint) -> Result<Vec<String>> {
    let (mut reader, mut writer) = connect(endpoint).await?;
    let names = pipeline::get_index(&mut reader, &mut writer).await?;
    pipeline::send_bye(&mut writer).await?;
    Ok(names)
}

fn to_reports(outcome: Vec<(String, TransferResult)>) -> Vec<TransferReport> {
    outcome
        .into_iter()
        .map(|(name, result)| TransferReport { name, result })
        .collect()
}
