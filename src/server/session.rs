//! Per-connection protocol state machine.
//!
//! One [`run_session`] call owns one accepted TCP connection end to end.
//! The `(state, direction)` pair from the transition table is encoded as
//! a tagged [`ConnState`] enum driven by a single loop, plus a `direction`
//! latch that persists across `Config` turns within the current batch —
//! matching the donor's `leanState`/`state` split but as one sum type
//! instead of two parallel integers.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use crate::checksum::Md5Hasher;
use crate::error::{ProtocolError, Result};
use crate::framing::{expect_blank_line, read_line, split_header, write_blank_line, write_line};
use crate::path::{sanitize_put_name, validate_get_name};
use crate::server::index::{build_index, is_index_name};
use crate::tempfile_guard::TempFileGuard;

/// Chunk size used when streaming file payloads to and from the socket.
const STREAM_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    None,
    Get,
    Put,
}

enum ConnState {
    Config,
    GetMode(Vec<String>),
    PutMode { name: String },
    PutReceive { name: String, expected_len: u64 },
}

/// Runs the protocol state machine for one accepted connection until
/// `BYE`, EOF, or an unrecoverable framing error. Connection-level I/O
/// errors are logged by the caller and otherwise swallowed: the handler's
/// job is simply to stop.
pub async fn run_session(stream: TcpStream, files_dir: PathBuf) -> Result<()> {
    let (rd, mut wr) = stream.into_split();
    let mut reader = BufReader::new(rd);

    let mut state = ConnState::Config;
    let mut direction = Direction::None;
    let mut pending: Vec<String> = Vec::new();

    loop {
        state = match state {
            ConnState::Config => {
                let Some(line) = read_line(&mut reader).await? else {
                    return Ok(());
                };

                if line == "BYE" {
                    return Ok(());
                }

                if line.is_empty() {
                    match direction {
                        Direction::Get => ConnState::GetMode(std::mem::take(&mut pending)),
                        Direction::Put | Direction::None => ConnState::Config,
                    }
                } else {
                    let (keyword, arg) = split_header(&line);
                    match keyword {
                        "GET" => {
                            if direction == Direction::Put {
                                write_line(&mut wr, "REQERR", None).await?;
                                direction = Direction::None;
                                pending.clear();
                            } else {
                                pending.push(arg.unwrap_or("").to_string());
                                direction = Direction::Get;
                            }
                            ConnState::Config
                        }
                        "PUT" => {
                            if direction == Direction::Get {
                                write_line(&mut wr, "REQERR", None).await?;
                                direction = Direction::None;
                                pending.clear();
                                ConnState::Config
                            } else {
                                direction = Direction::Put;
                                let raw_name = arg.unwrap_or("").to_string();
                                ConnState::PutMode {
                                    name: sanitize_put_name(&raw_name),
                                }
                            }
                        }
                        _ => {
                            tracing::debug!(line = %line, "ignoring malformed or unknown request line");
                            direction = Direction::None;
                            pending.clear();
                            ConnState::Config
                        }
                    }
                }
            }

            ConnState::GetMode(names) => {
                run_get_batch(&mut wr, &files_dir, &names).await?;
                direction = Direction::None;
                ConnState::Config
            }

            ConnState::PutMode { name } => {
                let Some(line) = read_line(&mut reader).await? else {
                    return Ok(());
                };
                let (keyword, arg) = split_header(&line);
                if keyword != "LENGTH" {
                    write_line(&mut wr, "REQERR", None).await?;
                    direction = Direction::None;
                    ConnState::Config
                } else {
                    match arg.and_then(|a| a.parse::<u64>().ok()) {
                        Some(expected_len) => {
                            expect_blank_line(&mut reader).await?;
                            ConnState::PutReceive { name, expected_len }
                        }
                        None => {
                            write_line(&mut wr, "REQERR", None).await?;
                            direction = Direction::None;
                            ConnState::Config
                        }
                    }
                }
            }

            ConnState::PutReceive { name, expected_len } => {
                handle_put_receive(&mut reader, &mut wr, &files_dir, &name, expected_len).await?;
                direction = Direction::None;
                ConnState::Config
            }
        };
    }
}

/// Emits one response per pending filename, in request order.
async fn run_get_batch(
    wr: &mut (impl AsyncWriteExt + Unpin),
    files_dir: &Path,
    names: &[String],
) -> Result<()> {
    for name in names {
        if is_index_name(name) {
            match build_index(files_dir).await {
                Ok(listing) => send_bytes_response(wr, name, listing.as_bytes()).await?,
                Err(e) => send_error(wr, "READERR", name, &e).await?,
            }
            continue;
        }

        if !validate_get_name(name) {
            write_line(wr, "NOTFOUND", Some(name)).await?;
            write_blank_line(wr).await?;
            continue;
        }

        let path = files_dir.join(name);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                send_file_response(wr, name, &path, meta.len()).await?;
            }
            Ok(_) => {
                // Exists but isn't a regular file (e.g. a directory).
                write_line(wr, "NOTFOUND", Some(name)).await?;
                write_blank_line(wr).await?;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                write_line(wr, "NOTFOUND", Some(name)).await?;
                write_blank_line(wr).await?;
            }
            Err(e) => send_error(wr, "READERR", name, &ProtocolError::Io(e)).await?,
        }
    }
    Ok(())
}

async fn send_error(
    wr: &mut (impl AsyncWriteExt + Unpin),
    keyword: &str,
    name: &str,
    err: &ProtocolError,
) -> Result<()> {
    tracing::warn!(name = %name, error = %err, "{keyword} for GET");
    write_line(wr, keyword, Some(name)).await?;
    write_blank_line(wr).await
}

/// Sends a complete response for in-memory bytes (used for the index).
async fn send_bytes_response(
    wr: &mut (impl AsyncWriteExt + Unpin),
    name: &str,
    data: &[u8],
) -> Result<()> {
    write_line(wr, "OK", Some(name)).await?;
    write_line(wr, "LENGTH", Some(&data.len().to_string())).await?;
    write_blank_line(wr).await?;
    wr.write_all(data).await.map_err(ProtocolError::Io)?;
    write_blank_line(wr).await?;
    let digest = crate::checksum::digest_hex(data);
    write_line(wr, "CHECKSUM", Some(&digest)).await?;
    write_blank_line(wr).await
}

/// Streams a file's contents as a response, hashing as it goes so large
/// files never need to be buffered whole.
async fn send_file_response(
    wr: &mut (impl AsyncWriteExt + Unpin),
    name: &str,
    path: &Path,
    len: u64,
) -> Result<()> {
    let mut file = match File::open(path).await {
        Ok(f) => f,
        Err(e) => return send_error(wr, "READERR", name, &ProtocolError::Io(e)).await,
    };

    write_line(wr, "OK", Some(name)).await?;
    write_line(wr, "LENGTH", Some(&len.to_string())).await?;
    write_blank_line(wr).await?;

    let mut hasher = Md5Hasher::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK as u64) as usize;
        let n = file
            .read(&mut buf[..want])
            .await
            .map_err(ProtocolError::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
        wr.write_all(&buf[..n]).await.map_err(ProtocolError::Io)?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }

    write_blank_line(wr).await?;
    write_line(wr, "CHECKSUM", Some(&hasher.finalize_hex())).await?;
    write_blank_line(wr).await
}

/// Receives exactly `expected_len` bytes into `<name>-part`, verifies the
/// trailing checksum, and either promotes or discards the temp file. A
/// checksum mismatch removes the part file; a transport failure partway
/// through (premature EOF) leaves it on disk, per the error handling
/// design's distinction between the two.
async fn handle_put_receive(
    reader: &mut BufReader<impl tokio::io::AsyncRead + Unpin>,
    wr: &mut (impl AsyncWriteExt + Unpin),
    files_dir: &Path,
    name: &str,
    expected_len: u64,
) -> Result<()> {
    if name.is_empty() || is_index_name(name) {
        write_line(wr, "WRERR", Some(name)).await?;
        return write_blank_line(wr).await;
    }

    let final_path = files_dir.join(name);
    let part_path = files_dir.join(format!("{name}-part"));

    let mut file = match OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(&part_path)
        .await
    {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(name = %name, error = %e, "failed to create part file");
            write_line(wr, "WRERR", Some(name)).await?;
            return write_blank_line(wr).await;
        }
    };
    let guard = TempFileGuard::new(&part_path);

    let (actual, checksum_line) = match receive_put_body(reader, &mut file, expected_len).await {
        Ok(pair) => pair,
        Err(e) => {
            // Transport failure mid-transfer: the part file survives.
            guard.defuse();
            return Err(e);
        }
    };
    drop(file);

    if checksum_line == actual {
        tokio::fs::rename(&part_path, &final_path)
            .await
            .map_err(ProtocolError::Io)?;
        guard.defuse();
        write_line(wr, "RECV", Some(name)).await
    } else {
        drop(guard);
        tracing::warn!(name = %name, expected = %checksum_line, actual = %actual, "checksum mismatch on PUT");
        write_line(wr, "HASHERR", Some(name)).await?;
        write_blank_line(wr).await
    }
}

/// Streams the PUT payload into `file`, then reads the `CHECKSUM` trailer.
/// Returns `(computed digest, peer-supplied digest)`. Any error here (EOF,
/// framing) is a transport failure, distinct from a successfully-read but
/// mismatched checksum.
async fn receive_put_body(
    reader: &mut BufReader<impl tokio::io::AsyncRead + Unpin>,
    file: &mut File,
    expected_len: u64,
) -> Result<(String, String)> {
    let mut hasher = Md5Hasher::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    let mut remaining = expected_len;
    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .await
            .map_err(ProtocolError::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
        file.write_all(&buf[..n]).await.map_err(ProtocolError::Io)?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    file.flush().await.map_err(ProtocolError::Io)?;

    let checksum_line = loop {
        let Some(line) = read_line(reader).await? else {
            return Err(ProtocolError::UnexpectedEof);
        };
        let (keyword, arg) = split_header(&line);
        if keyword == "CHECKSUM" {
            break arg.unwrap_or("").to_string();
        }
    };
    // The trailing blank line after CHECKSUM.
    expect_blank_line(reader).await?;

    Ok((hasher.finalize_hex(), checksum_line))
}
