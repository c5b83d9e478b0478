use super::encode_message;
use crate::transport::SendStream;
use crate::Result;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Outbound stream for host-originated commands.
///
/// Messages are framed exactly like inbound ones. Concurrent senders are
/// serialized so frames never interleave.
pub struct ControlChannel {
    stream: Mutex<SendStream>,
}

impl ControlChannel {
    pub fn new(stream: SendStream) -> Self {
        Self {
            stream: Mutex::new(stream),
        }
    }

    /// Frame and write one message.
    pub async fn send<T: Serialize + ?Sized>(&self, msg: &T) -> Result<()> {
        let frame = encode_message(msg)?;

        let mut stream = self.stream.lock().await;
        stream.write_all(&frame).await?;
        stream.flush().await?;

        tracing::debug!(bytes = frame.len(), "Sent control message");
        Ok(())
    }

    /// Flush and close the stream.
    pub async fn close(&self) -> Result<()> {
        self.stream.lock().await.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_frame, Command, MessageThrottle};

    #[tokio::test]
    async fn test_send_writes_framed_json() {
        let (client, mut server) = tokio::io::duplex(1024);
        let channel = ControlChannel::new(Box::new(client));

        channel
            .send(&Command::Throttle(MessageThrottle {
                rate: 100,
                buffer: 200,
                loss: 0.0,
            }))
            .await
            .unwrap();
        channel.send(&serde_json::json!({"debug": true})).await.unwrap();
        channel.close().await.unwrap();

        let mut data = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut server, &mut data)
            .await
            .unwrap();

        let first = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
        assert_eq!(&data[4..8], b"warp");
        let json: serde_json::Value = serde_json::from_slice(&data[8..first]).unwrap();
        assert_eq!(json["throttle"]["buffer"], 200);

        let second: serde_json::Value = serde_json::from_slice(&data[first + 8..]).unwrap();
        assert_eq!(second["debug"], true);

        // Arbitrary payloads are not valid inbound messages.
        assert!(decode_frame(&data[first..]).is_err());
    }
}
