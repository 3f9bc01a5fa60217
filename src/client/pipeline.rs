//! Per-connection request pipeline.
//!
//! Writes GET/PUT requests either sequentially (wait for each response
//! before sending the next) or pipelined (write every request back-to-back,
//! then read every response in the same order), and reports one outcome
//! per file. A connection-level error (framing, transport) aborts the
//! whole batch by propagating out of these functions; recoverable
//! per-file outcomes (`NOTFOUND`, `WRERR`, ...) are reported in the
//! returned vector instead.

use std::path::{Path, PathBuf};

use tokio::io::{AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::checksum::Md5Hasher;
use crate::client::response::{
    read_payload_to_file, read_payload_to_vec, read_put_response, read_response_header,
    PutOutcome, ResponseHeader,
};
use crate::error::{ProtocolError, Result};
use crate::framing::{write_blank_line, write_line};

const STREAM_CHUNK: usize = 64 * 1024;

/// Per-file disposition of a GET or PUT within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferResult {
    Downloaded,
    Uploaded,
    NotFound,
    ReadErr,
    WrErr,
    HashErr,
    ReqErr,
}

/// Runs a GET batch over `reader`/`writer`, writing downloaded files into
/// `dest_dir`. Sequential mode writes and waits per file; pipelined mode
/// writes every request first, then reads every response in order.
pub async fn get_batch(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    names: &[String],
    dest_dir: &Path,
    pipelined: bool,
) -> Result<Vec<(String, TransferResult)>> {
    if pipelined {
        for name in names {
            write_line(writer, "GET", Some(name)).await?;
        }
        write_blank_line(writer).await?;
    }

    let mut results = Vec::with_capacity(names.len());
    for name in names {
        if !pipelined {
            write_line(writer, "GET", Some(name)).await?;
            write_blank_line(writer).await?;
        }
        let outcome = receive_get(reader, dest_dir, name).await?;
        results.push((name.clone(), outcome));
    }
    Ok(results)
}

async fn receive_get(
    reader: &mut BufReader<OwnedReadHalf>,
    dest_dir: &Path,
    name: &str,
) -> Result<TransferResult> {
    match read_response_header(reader, name).await? {
        ResponseHeader::ReqErr => Ok(TransferResult::ReqErr),
        ResponseHeader::NotFound => Ok(TransferResult::NotFound),
        ResponseHeader::ReadErr => Ok(TransferResult::ReadErr),
        ResponseHeader::Ok { len } => {
            read_payload_to_file(reader, dest_dir, name, len).await?;
            Ok(TransferResult::Downloaded)
        }
    }
}

/// Issues `GET ` (empty name) on a dedicated connection and returns the
/// parsed, non-empty entries of the generated index.
pub async fn get_index(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
) -> Result<Vec<String>> {
    write_line(writer, "GET", Some("")).await?;
    write_blank_line(writer).await?;

    match read_response_header(reader, "").await? {
        ResponseHeader::Ok { len } => {
            let data = read_payload_to_vec(reader, "", len).await?;
            let text = String::from_utf8(data)
                .map_err(|e| ProtocolError::Framing(format!("index is not UTF-8: {e}")))?;
            Ok(text
                .split('\n')
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect())
        }
        _ => Err(ProtocolError::Framing(
            "server rejected index request".to_string(),
        )),
    }
}

/// Runs a PUT batch, uploading each local path under its file name.
/// Sequential mode waits for `RECV`/`WRERR`/`HASHERR` before sending the
/// next request; pipelined mode writes every request and payload first.
pub async fn put_batch(
    reader: &mut BufReader<OwnedReadHalf>,
    writer: &mut OwnedWriteHalf,
    local_paths: &[PathBuf],
    pipelined: bool,
) -> Result<Vec<(String, TransferResult)>> {
    let mut results = Vec::with_capacity(local_paths.len());

    if pipelined {
        for path in local_paths {
            send_put_request(writer, path).await?;
        }
        for path in local_paths {
            let name = file_name_str(path)?;
            let outcome = receive_put(reader, &name).await?;
            results.push((name, outcome));
        }
    } else {
        for path in local_paths {
            send_put_request(writer, path).await?;
            let name = file_name_str(path)?;
            let outcome = receive_put(reader, &name).await?;
            results.push((name, outcome));
        }
    }

    Ok(results)
}

fn file_name_str(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::Framing(format!("not a valid file name: {}", path.display())))
}

async fn send_put_request(writer: &mut OwnedWriteHalf, path: &Path) -> Result<()> {
    let name = file_name_str(path)?;
    let mut file = tokio::fs::File::open(path).await.map_err(ProtocolError::Io)?;
    let len = file
        .metadata()
        .await
        .map_err(ProtocolError::Io)?
        .len();

    write_line(writer, "PUT", Some(&name)).await?;
    write_line(writer, "LENGTH", Some(&len.to_string())).await?;
    write_blank_line(writer).await?;

    let mut hasher = Md5Hasher::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(STREAM_CHUNK as u64) as usize;
        let n = file.read(&mut buf[..want]).await.map_err(ProtocolError::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
        writer.write_all(&buf[..n]).await.map_err(ProtocolError::Io)?;
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }

    write_blank_line(writer).await?;
    write_line(writer, "CHECKSUM", Some(&hasher.finalize_hex())).await?;
    write_blank_line(writer).await
}

async fn receive_put(reader: &mut BufReader<OwnedReadHalf>, name: &str) -> Result<TransferResult> {
    match read_put_response(reader, name).await? {
        PutOutcome::Recv => Ok(TransferResult::Uploaded),
        PutOutcome::WrErr => Ok(TransferResult::WrErr),
        PutOutcome::HashErr => Ok(TransferResult::HashErr),
        PutOutcome::ReqErr => Ok(TransferResult::ReqErr),
    }
}

/// Writes the session-ending `BYE` line. Callers close the socket
/// themselves by dropping the stream after this returns.
pub async fn send_bye(writer: &mut OwnedWriteHalf) -> Result<()> {
    write_line(writer, "BYE", None).await
}
