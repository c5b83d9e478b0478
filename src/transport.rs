//! Transport boundary.
//!
//! Establishing the session (QUIC, WebTransport) happens outside this crate.
//! The player only needs the enumeration of inbound unidirectional streams and
//! one outbound stream for commands.

use crate::Result;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;

/// An inbound unidirectional stream.
pub type RecvStream = Box<dyn AsyncRead + Send + Unpin>;

/// The outbound control stream.
pub type SendStream = Box<dyn AsyncWrite + Send + Unpin>;

/// Source of inbound streams opened by the sender.
#[async_trait]
pub trait Transport: Send {
    /// Wait for the next inbound stream. `Ok(None)` once the session ended.
    async fn accept_uni(&mut self) -> Result<Option<RecvStream>>;
}

/// Streams pushed into a channel by whatever owns the real session.
#[async_trait]
impl Transport for mpsc::Receiver<RecvStream> {
    async fn accept_uni(&mut self) -> Result<Option<RecvStream>> {
        Ok(self.recv().await)
    }
}
