//! Wire framing: a 4-byte big-endian length prefix followed by a UTF-8 JSON
//! payload, read/written over any `AsyncRead`/`AsyncWrite` stream.

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{DbError, DbResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub query: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub success: bool,
    pub message: String,
    pub data: Option<Vec<Json>>,
}

pub async fn read_frame<R: AsyncRead + Unpin>(stream: &mut R) -> DbResult<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = u32::from_be_bytes(len_buf) as usize;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).await?;
    Ok(payload)
}

pub async fn write_frame<W: AsyncWrite + Unpin>(stream: &mut W, payload: &[u8]) -> DbResult<()> {
    let len = u32::try_from(payload.len()).map_err(|_| DbError::Io("frame too large".to_string()))?;
    stream.write_all(&len.to_be_bytes()).await?;
    stream.write_all(payload).await?;
    stream.flush().await?;
    Ok(())
}

pub async fn read_request<R: AsyncRead + Unpin>(stream: &mut R) -> DbResult<Request> {
    let payload = read_frame(stream).await?;
    serde_json::from_slice(&payload).map_err(DbError::from)
}

pub async fn write_response<W: AsyncWrite + Unpin>(stream: &mut W, response: &Response) -> DbResult<()> {
    let payload = serde_json::to_vec(response)?;
    write_frame(stream, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_round_trips_through_the_frame() {
        let request = Request { query: "SELECT 1;".to_string() };
        let mut buf = Vec::new();
        write_frame(&mut buf, &serde_json::to_vec(&request).unwrap()).await.unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let decoded = read_request(&mut cursor).await.unwrap();
        assert_eq!(decoded.query, request.query);
    }
}
