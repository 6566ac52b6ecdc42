//! Chunked transfer-coding on the write side.
//!
//! Decoding lives in the parser; this module frames outgoing body chunks
//! as `size-in-hex CRLF data CRLF` and finishes with `0 CRLF CRLF`.

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::BodySource;

/// Size of the pieces a reader-backed body is cut into.
pub const CHUNK_SIZE: usize = 10 * 1024;

const LAST_CHUNK: &[u8] = b"0\r\n\r\n";

/// Append one framed chunk to `out`. Empty input writes nothing.
pub fn encode_chunk(data: &[u8], out: &mut Vec<u8>) {
    if data.is_empty() {
        return;
    }
    out.extend_from_slice(format!("{:x}\r\n", data.len()).as_bytes());
    out.extend_from_slice(data);
    out.extend_from_slice(b"\r\n");
}

/// Append the terminating zero-length chunk.
pub fn encode_last_chunk(out: &mut Vec<u8>) {
    out.extend_from_slice(LAST_CHUNK);
}

/// Drain `source` synchronously into a chunk-encoded buffer.
pub fn encode_all(source: &mut dyn BodySource) -> io::Result<Vec<u8>> {
    let mut out = Vec::new();
    while let Some(chunk) = source.next_chunk()? {
        encode_chunk(&chunk, &mut out);
    }
    encode_last_chunk(&mut out);
    Ok(out)
}

/// Pull chunks from `source` and write them chunk-encoded.
///
/// Returns the number of payload bytes written.
pub async fn write_chunked<W>(writer: &mut W, source: &mut dyn BodySource) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    let mut frame = Vec::with_capacity(CHUNK_SIZE + 16);
    while let Some(chunk) = source.next_chunk()? {
        if chunk.is_empty() {
            continue;
        }
        frame.clear();
        encode_chunk(&chunk, &mut frame);
        writer.write_all(&frame).await?;
        written += chunk.len() as u64;
    }
    writer.write_all(LAST_CHUNK).await?;
    writer.flush().await?;
    Ok(written)
}

/// Write the body of `source` without framing; the peer reads until EOF.
pub async fn write_raw<W>(writer: &mut W, source: &mut dyn BodySource) -> io::Result<u64>
where
    W: AsyncWrite + Unpin,
{
    let mut written = 0u64;
    while let Some(chunk) = source.next_chunk()? {
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    writer.flush().await?;
    Ok(written)
}
