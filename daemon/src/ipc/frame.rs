//! Length-prefixed JSON framing shared by server and client

use anyhow::{bail, Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest accepted message body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Read one frame body; `None` when the peer closed cleanly between frames
pub async fn read_frame<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];

    // Read message length (4-byte little-endian)
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        bail!("message too large ({len} bytes)");
    }

    let mut msg_buf = vec![0u8; len];
    reader
        .read_exact(&mut msg_buf)
        .await
        .context("connection closed mid-message")?;
    Ok(Some(msg_buf))
}

/// Read and decode one message
pub async fn read_message<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let Some(body) = read_frame(reader).await? else {
        return Ok(None);
    };
    let msg = serde_json::from_slice(&body).context("failed to parse message")?;
    Ok(Some(msg))
}

/// Send a length-prefixed JSON message
pub async fn write_message<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let msg_bytes = serde_json::to_vec(msg)?;
    if msg_bytes.len() > MAX_FRAME_LEN {
        bail!("message too large ({} bytes)", msg_bytes.len());
    }
    let msg_len = (msg_bytes.len() as u32).to_le_bytes();

    writer.write_all(&msg_len).await?;
    writer.write_all(&msg_bytes).await?;
    writer.flush().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::{Request, Response};

    fn framed(body: &[u8]) -> Vec<u8> {
        let mut out = (body.len() as u32).to_le_bytes().to_vec();
        out.extend_from_slice(body);
        out
    }

    #[tokio::test]
    async fn test_read_request_frame() {
        let body = br#"{"type":"remove_mapping","key":"f2"}"#;
        let mut mock = tokio_test::io::Builder::new().read(&framed(body)).build();

        let request: Request = read_message(&mut mock).await.unwrap().unwrap();
        assert_eq!(
            request,
            Request::RemoveMapping {
                key: "f2".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_clean_eof_is_none() {
        let mut mock = tokio_test::io::Builder::new().build();
        let frame = read_frame(&mut mock).await.unwrap();
        assert!(frame.is_none());
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let len = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut mock = tokio_test::io::Builder::new().read(&len).build();
        assert!(read_frame(&mut mock).await.is_err());
    }

    #[tokio::test]
    async fn test_truncated_body_is_error() {
        let mut bytes = 10u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"{}");
        let mut mock = tokio_test::io::Builder::new().read(&bytes).build();
        assert!(read_frame(&mut mock).await.is_err());
    }

    #[tokio::test]
    async fn test_write_response_frame() {
        let body = br#"{"type":"pong"}"#;
        let mut mock = tokio_test::io::Builder::new().write(&framed(body)).build();
        write_message(&mut mock, &Response::Pong).await.unwrap();
    }
}
