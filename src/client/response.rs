//! Per-request response parser.
//!
//! Mirrors the server's OK/LENGTH/payload/CHECKSUM framing from the other
//! end: read the header, then either stream the payload straight to a
//! `<name>-part` file (regular downloads) or accumulate it in memory (the
//! generated index, which the coordinator needs to split into names
//! rather than write to disk).

use std::path::Path;

use tokio::io::{AsyncBufRead, AsyncReadExt, AsyncWriteExt};

use crate::checksum::Md5Hasher;
use crate::error::{ProtocolError, Result};
use crate::framing::{expect_blank_line, read_line, split_header};
use crate::tempfile_guard::TempFileGuard;

const READ_CHUNK: usize = 8 * 1024;

/// The header of a GET response, before any payload has been consumed.
pub enum ResponseHeader {
    Ok { len: u64 },
    NotFound,
    ReadErr,
    ReqErr,
}

/// Reads and classifies the first line(s) of a GET response. For
/// `NotFound`/`ReadErr` the trailing blank line is already consumed; for
/// `Ok` the caller still owns the payload and must call
/// [`read_payload_to_file`] or [`read_payload_to_vec`].
pub async fn read_response_header<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    expected_name: &str,
) -> Result<ResponseHeader> {
    let Some(line) = read_line(reader).await? else {
        return Err(ProtocolError::UnexpectedEof);
    };
    let (keyword, arg) = split_header(&line);

    match keyword {
        "REQERR" => Ok(ResponseHeader::ReqErr),
        "NOTFOUND" => {
            expect_blank_line(reader).await?;
            Ok(ResponseHeader::NotFound)
        }
        "READERR" => {
            expect_blank_line(reader).await?;
            Ok(ResponseHeader::ReadErr)
        }
        "OK" => {
            if arg != Some(expected_name) {
                return Err(ProtocolError::Framing(format!(
                    "OK for unexpected name: {arg:?}, wanted {expected_name:?}"
                )));
            }
            let Some(len_line) = read_line(reader).await? else {
                return Err(ProtocolError::UnexpectedEof);
            };
            let (len_keyword, len_arg) = split_header(&len_line);
            if len_keyword != "LENGTH" {
                return Err(ProtocolError::Framing(format!(
                    "expected LENGTH, got {len_line:?}"
                )));
            }
            let len: u64 = len_arg
                .and_then(|a| a.parse().ok())
                .ok_or_else(|| ProtocolError::Framing(format!("bad LENGTH: {len_line:?}")))?;
            expect_blank_line(reader).await?;
            Ok(ResponseHeader::Ok { len })
        }
        _ => Err(ProtocolError::Framing(format!(
            "unexpected response line: {line:?}"
        ))),
    }
}

async fn read_checksum_trailer<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    name: &str,
    actual: String,
) -> Result<()> {
    let expected = loop {
        let Some(line) = read_line(reader).await? else {
            return Err(ProtocolError::UnexpectedEof);
        };
        let (keyword, arg) = split_header(&line);
        if keyword == "CHECKSUM" {
            break arg.unwrap_or("").to_string();
        }
    };
    expect_blank_line(reader).await?;

    if expected != actual {
        return Err(ProtocolError::ChecksumMismatch {
            name: name.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

/// Streams a GET payload straight to `<dest_dir>/<name>-part`, verifies
/// the checksum, and renames to `<dest_dir>/<name>` on success. A real
/// checksum mismatch removes the part file; a transport failure partway
/// through (premature EOF) leaves it on disk, per the error handling
/// design's distinction between the two.
pub async fn read_payload_to_file<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    dest_dir: &Path,
    name: &str,
    len: u64,
) -> Result<()> {
    let final_path = dest_dir.join(name);
    let part_path = dest_dir.join(format!("{name}-part"));

    let mut file = tokio::fs::File::create(&part_path)
        .await
        .map_err(ProtocolError::Io)?;
    let guard = TempFileGuard::new(&part_path);

    let actual = match stream_payload_to_file(reader, &mut file, len).await {
        Ok(digest) => digest,
        Err(e) => {
            // Transport failure mid-transfer: the part file survives.
            guard.defuse();
            return Err(e);
        }
    };

    match read_checksum_trailer(reader, name, actual).await {
        Ok(()) => {
            tokio::fs::rename(&part_path, &final_path)
                .await
                .map_err(ProtocolError::Io)?;
            guard.defuse();
            Ok(())
        }
        Err(e @ ProtocolError::ChecksumMismatch { .. }) => {
            drop(guard);
            Err(e)
        }
        Err(e) => {
            // Framing/transport failure while reading the trailer: leave the part file.
            guard.defuse();
            Err(e)
        }
    }
}

async fn stream_payload_to_file<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    file: &mut tokio::fs::File,
    len: u64,
) -> Result<String> {
    let mut hasher = Md5Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
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
    expect_blank_line(reader).await?;
    Ok(hasher.finalize_hex())
}

/// Reads the entire payload plus checksum trailer into memory, without
/// touching disk. Used for the generated index, which the coordinator
/// splits into names rather than saving as a file.
pub async fn read_payload_to_vec<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    name: &str,
    len: u64,
) -> Result<Vec<u8>> {
    let mut data = Vec::with_capacity(len as usize);
    let mut hasher = Md5Hasher::new();
    let mut buf = vec![0u8; READ_CHUNK];
    let mut remaining = len;
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = reader
            .read(&mut buf[..want])
            .await
            .map_err(ProtocolError::Io)?;
        if n == 0 {
            return Err(ProtocolError::UnexpectedEof);
        }
        data.extend_from_slice(&buf[..n]);
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    expect_blank_line(reader).await?;

    let actual = hasher.finalize_hex();
    read_checksum_trailer(reader, name, actual).await?;
    Ok(data)
}

/// The outcome of a PUT response.
pub enum PutOutcome {
    Recv,
    WrErr,
    HashErr,
    ReqErr,
}

/// Reads the single-line response to a completed PUT. `RECV` has no
/// trailing blank line on the wire; `WRERR`/`HASHERR` do.
pub async fn read_put_response<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    expected_name: &str,
) -> Result<PutOutcome> {
    let Some(line) = read_line(reader).await? else {
        return Err(ProtocolError::UnexpectedEof);
    };
    let (keyword, arg) = split_header(&line);
    match keyword {
        "RECV" => {
            if arg != Some(expected_name) {
                return Err(ProtocolError::Framing(format!(
                    "RECV for unexpected name: {arg:?}"
                )));
            }
            Ok(PutOutcome::Recv)
        }
        "WRERR" => {
            expect_blank_line(reader).await?;
            Ok(PutOutcome::WrErr)
        }
        "HASHERR" => {
            expect_blank_line(reader).await?;
            Ok(PutOutcome::HashErr)
        }
        "REQERR" => Ok(PutOutcome::ReqErr),
        _ => Err(ProtocolError::Framing(format!(
            "unexpected PUT response line: {line:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    fn ok_response(name: &str, payload: &[u8]) -> Vec<u8> {
        let digest = crate::checksum::digest_hex(payload);
        let mut out = Vec::new();
        out.extend_from_slice(format!("OK {name}\nLENGTH {}\n\n", payload.len()).as_bytes());
        out.extend_from_slice(payload);
        out.extend_from_slice(format!("\nCHECKSUM {digest}\n\n").as_bytes());
        out
    }

    #[tokio::test]
    async fn reads_ok_header_then_payload_to_vec() {
        let wire = ok_response("hello.txt", b"hello\n");
        let mut reader = BufReader::new(Cursor::new(wire));

        let header = read_response_header(&mut reader, "hello.txt").await.unwrap();
        let len = match header {
            ResponseHeader::Ok { len } => len,
            _ => panic!("expected Ok header"),
        };
        let data = read_payload_to_vec(&mut reader, "hello.txt", len).await.unwrap();
        assert_eq!(data, b"hello\n");
    }

    #[tokio::test]
    async fn rejects_ok_with_mismatched_name() {
        let wire = ok_response("hello.txt", b"hello\n");
        let mut reader = BufReader::new(Cursor::new(wire));
        let err = read_response_header(&mut reader, "other.txt").await.unwrap_err();
        assert!(matches!(err, ProtocolError::Framing(_)));
    }

    #[tokio::test]
    async fn detects_checksum_mismatch() {
        let mut wire = ok_response("hello.txt", b"hello\n");
        // Flip the last two hex digits of the checksum (wire ends "...<digest>\n\n").
        let last_digit = wire.len() - 3;
        wire[last_digit] = if wire[last_digit] == b'0' { b'1' } else { b'0' };
        wire[last_digit - 1] = if wire[last_digit - 1] == b'0' { b'1' } else { b'0' };
        let mut reader = BufReader::new(Cursor::new(wire));

        let header = read_response_header(&mut reader, "hello.txt").await.unwrap();
        let len = match header {
            ResponseHeader::Ok { len } => len,
            _ => panic!("expected Ok header"),
        };
        let err = read_payload_to_vec(&mut reader, "hello.txt", len).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
    }

    #[tokio::test]
    async fn not_found_consumes_trailing_blank_line() {
        let mut reader = BufReader::new(Cursor::new(b"NOTFOUND nope\n\nmore".to_vec()));
        let header = read_response_header(&mut reader, "nope").await.unwrap();
        assert!(matches!(header, ResponseHeader::NotFound));
        // Confirms the blank line was consumed: the next read sees "more".
        let rest = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(rest, "more");
    }

    #[tokio::test]
    async fn recv_has_no_trailing_blank_line() {
        let mut reader = BufReader::new(Cursor::new(b"RECV up.txt\nGET next\n\n".to_vec()));
        let outcome = read_put_response(&mut reader, "up.txt").await.unwrap();
        assert!(matches!(outcome, PutOutcome::Recv));
        let rest = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(rest, "GET next");
    }

    #[tokio::test]
    async fn hasherr_consumes_trailing_blank_line() {
        let mut reader = BufReader::new(Cursor::new(b"HASHERR up.txt\n\nmore".to_vec()));
        let outcome = read_put_response(&mut reader, "up.txt").await.unwrap();
        assert!(matches!(outcome, PutOutcome::HashErr));
        let rest = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(rest, "more");
    }

    #[tokio::test]
    async fn checksum_mismatch_removes_part_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut wire = ok_response("hello.txt", b"hello\n");
        let last_digit = wire.len() - 3;
        wire[last_digit] = if wire[last_digit] == b'0' { b'1' } else { b'0' };
        let mut reader = BufReader::new(Cursor::new(wire));

        let header = read_response_header(&mut reader, "hello.txt").await.unwrap();
        let len = match header {
            ResponseHeader::Ok { len } => len,
            _ => panic!("expected Ok header"),
        };
        let err = read_payload_to_file(&mut reader, dir.path(), "hello.txt", len)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::ChecksumMismatch { .. }));
        assert!(!dir.path().join("hello.txt-part").exists());
        assert!(!dir.path().join("hello.txt").exists());
    }

    #[tokio::test]
    async fn premature_eof_leaves_part_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        // Declares a 6-byte payload but the stream ends after 3.
        let wire = b"OK hello.txt\nLENGTH 6\n\nhel".to_vec();
        let mut reader = BufReader::new(Cursor::new(wire));

        let header = read_response_header(&mut reader, "hello.txt").await.unwrap();
        let len = match header {
            ResponseHeader::Ok { len } => len,
            _ => panic!("expected Ok header"),
        };
        let err = read_payload_to_file(&mut reader, dir.path(), "hello.txt", len)
            .await
            .unwrap_err();
        assert!(matches!(err, ProtocolError::UnexpectedEof));
        assert!(dir.path().join("hello.txt-part").exists());
        assert!(!dir.path().join("hello.txt").exists());
    }
}
