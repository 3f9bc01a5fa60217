//! Line-oriented wire framing shared by the server and the client.
//!
//! A line is the bytes up to the next `\n`, with a trailing `\r` stripped.
//! `read_until` naturally buffers across physical read boundaries, so a
//! line spanning several underlying reads is never truncated.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{ProtocolError, Result};

/// Reads one line (without the trailing newline) from a buffered async
/// reader. Returns `Ok(None)` on clean EOF before any bytes were read.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let n = reader
        .read_until(b'\n', &mut buf)
        .await
        .map_err(ProtocolError::Io)?;

    if n == 0 {
        return Ok(None);
    }

    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }

    String::from_utf8(buf)
        .map(Some)
        .map_err(|e| ProtocolError::Framing(format!("non-UTF-8 line: {e}")))
}

/// Reads lines until a non-empty "terminator" line is consumed, i.e. the
/// empty-line end-of-header marker described in the framing spec. Returns
/// the non-empty header lines collected before it.
///
/// Callers that only need the single terminator (no preceding headers
/// expected) should use [`expect_blank_line`] instead.
pub async fn read_header_lines<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<Vec<String>> {
    let mut lines = Vec::new();
    loop {
        match read_line(reader).await? {
            None => return Err(ProtocolError::UnexpectedEof),
            Some(line) if line.is_empty() => return Ok(lines),
            Some(line) => lines.push(line),
        }
    }
}

/// Reads one line and requires it to be empty (the end-of-batch /
/// end-of-header marker).
pub async fn expect_blank_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<()> {
    match read_line(reader).await? {
        None => Err(ProtocolError::UnexpectedEof),
        Some(line) if line.is_empty() => Ok(()),
        Some(line) => Err(ProtocolError::Framing(format!(
            "expected blank line, got {line:?}"
        ))),
    }
}

/// Splits a header line into its uppercase keyword and optional argument.
/// A line with no space is keyword-only (argument is `None`). Only the
/// first space is significant; the spec does not support further spaces
/// inside the argument.
pub fn split_header(line: &str) -> (&str, Option<&str>) {
    match line.split_once(' ') {
        Some((keyword, arg)) => (keyword, Some(arg)),
        None => (line, None),
    }
}

/// Writes a single line (keyword, optionally followed by a space and an
/// argument) terminated by `\n`.
pub async fn write_line<W: AsyncWrite + Unpin>(
    writer: &mut W,
    keyword: &str,
    arg: Option<&str>,
) -> Result<()> {
    let mut line = String::with_capacity(keyword.len() + arg.map_or(0, |a| a.len() + 1) + 1);
    line.push_str(keyword);
    if let Some(arg) = arg {
        line.push(' ');
        line.push_str(arg);
    }
    line.push('\n');
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(ProtocolError::Io)
}

/// Writes the empty-line terminator.
pub async fn write_blank_line<W: AsyncWrite + Unpin>(writer: &mut W) -> Result<()> {
    writer.write_all(b"\n").await.map_err(ProtocolError::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn reads_lines_stripping_crlf() {
        let mut reader = BufReader::new(Cursor::new(b"GET a\r\nGET b\n\n".to_vec()));
        assert_eq!(read_line(&mut reader).await.unwrap().as_deref(), Some("GET a"));
        assert_eq!(read_line(&mut reader).await.unwrap().as_deref(), Some("GET b"));
        assert_eq!(read_line(&mut reader).await.unwrap().as_deref(), Some(""));
        assert_eq!(read_line(&mut reader).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reads_header_lines_until_blank() {
        let mut reader = BufReader::new(Cursor::new(b"GET a\nGET b\n\nrest".to_vec()));
        let lines = read_header_lines(&mut reader).await.unwrap();
        assert_eq!(lines, vec!["GET a".to_string(), "GET b".to_string()]);
    }

    #[test]
    fn splits_keyword_and_argument() {
        assert_eq!(split_header("GET foo.txt"), ("GET", Some("foo.txt")));
        assert_eq!(split_header("BYE"), ("BYE", None));
        assert_eq!(split_header("LENGTH 42"), ("LENGTH", Some("42")));
    }

    #[tokio::test]
    async fn long_line_spanning_reads_is_not_truncated() {
        let long_name = "x".repeat(70_000);
        let input = format!("GET {long_name}\n\n");
        let mut reader = BufReader::with_capacity(16, Cursor::new(input.into_bytes()));
        let line = read_line(&mut reader).await.unwrap().unwrap();
        assert_eq!(line, format!("GET {long_name}"));
    }
}
