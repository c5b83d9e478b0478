use super::{Message, StreamReader};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;
use tokio::io::AsyncRead;

/// Four-byte tag following the frame size.
pub const FRAME_TAG: &[u8; 4] = b"warp";

/// Size of the size and tag fields.
pub const FRAME_HEADER_SIZE: usize = 8;

/// Read the frame at the start of a stream.
///
/// Returns `Ok(None)` when the stream ends before any byte was sent.
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut StreamReader<R>,
    max_header_size: usize,
) -> Result<Option<Message>> {
    if reader.done().await? {
        return Ok(None);
    }

    let size = reader.read_u32().await?;
    let len = payload_len(size, max_header_size)?;

    let tag = reader.read_exact(4).await?;
    check_tag(&tag)?;

    let payload = reader.read_exact(len).await?;
    parse_payload(&payload).map(Some)
}

/// Decode the frame at the front of `data`. Trailing bytes are ignored.
pub fn decode_frame(data: &[u8]) -> Result<Message> {
    if data.len() < FRAME_HEADER_SIZE {
        return Err(Error::framing(format!(
            "frame needs {} bytes, got {}",
            FRAME_HEADER_SIZE,
            data.len()
        )));
    }

    let size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let len = payload_len(size, usize::MAX)?;
    check_tag(&data[4..8])?;

    let payload = data
        .get(FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len)
        .ok_or_else(|| {
            Error::framing(format!(
                "frame declares {} bytes, got {}",
                size,
                data.len()
            ))
        })?;

    parse_payload(payload)
}

/// Serialize `msg` as JSON and wrap it in a WARP frame.
pub fn encode_message<T: Serialize + ?Sized>(msg: &T) -> Result<Bytes> {
    let json = serde_json::to_vec(msg)
        .map_err(|e| Error::protocol(format!("failed to encode message: {}", e)))?;

    let size = u32::try_from(json.len() + FRAME_HEADER_SIZE)
        .map_err(|_| Error::protocol(format!("message of {} bytes is too large", json.len())))?;

    let mut buf = BytesMut::with_capacity(size as usize);
    buf.put_u32(size);
    buf.put_slice(FRAME_TAG);
    buf.put_slice(&json);
    Ok(buf.freeze())
}

fn payload_len(size: u32, max_header_size: usize) -> Result<usize> {
    let size = size as usize;
    if size < FRAME_HEADER_SIZE {
        return Err(Error::framing(format!("frame size {} is too small", size)));
    }

    let len = size - FRAME_HEADER_SIZE;
    if len > max_header_size {
        return Err(Error::framing(format!(
            "frame header of {} bytes exceeds limit of {}",
            len, max_header_size
        )));
    }

    Ok(len)
}

fn check_tag(tag: &[u8]) -> Result<()> {
    if tag != FRAME_TAG {
        return Err(Error::framing(format!(
            "unsupported frame tag {:?}",
            String::from_utf8_lossy(tag)
        )));
    }
    Ok(())
}

fn parse_payload(payload: &[u8]) -> Result<Message> {
    serde_json::from_slice(payload)
        .map_err(|e| Error::framing(format!("invalid message header: {}", e)))
}
