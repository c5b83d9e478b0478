//! Inbound stream demultiplexing.
//!
//! Every stream the sender opens carries exactly one message. The dispatcher
//! accepts streams from the [`Transport`] and runs one decode task per
//! stream, so a slow or broken stream never holds up the others. Failures
//! are logged with the stream number and stay inside their task.

use crate::config::ProtocolConfig;
use crate::init::InitRegistry;
use crate::protocol::{read_message, Message, MessageInit, MessageSegment, StreamReader};
use crate::sink::TrackKind;
use crate::track::{Segment, SegmentId, TrackBuffer};
use crate::transport::Transport;
use crate::{Error, Result};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Routes inbound streams to init assemblers and track buffers.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<InitRegistry>,
    audio: Arc<TrackBuffer>,
    video: Arc<TrackBuffer>,
    config: ProtocolConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<InitRegistry>,
        audio: Arc<TrackBuffer>,
        video: Arc<TrackBuffer>,
        config: ProtocolConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            audio,
            video,
            config,
            cancel,
        }
    }

    fn track(&self, kind: TrackKind) -> &Arc<TrackBuffer> {
        match kind {
            TrackKind::Audio => &self.audio,
            TrackKind::Video => &self.video,
        }
    }

    /// Accept streams until the transport ends or the session is cancelled.
    ///
    /// After the transport ends, streams already accepted are allowed to
    /// finish. Cancellation aborts them.
    pub async fn run<T: Transport>(&self, mut transport: T) -> Result<()> {
        let mut tasks = JoinSet::new();
        let mut accepted = 0u64;

        tracing::info!("Accepting streams");

        let result = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break Ok(()),
                next = transport.accept_uni() => match next {
                    Ok(Some(stream)) => {
                        accepted += 1;
                        let this = self.clone();
                        let stream_id = accepted;
                        tasks.spawn(async move { this.serve(stream_id, stream).await });
                    }
                    Ok(None) => {
                        tracing::info!(accepted, "Transport closed");
                        break Ok(());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to accept stream");
                        break Err(e);
                    }
                },
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => reap(joined),
            }
        };

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tasks.abort_all();
                    while let Some(joined) = tasks.join_next().await {
                        reap(joined);
                    }
                    break;
                }
                joined = tasks.join_next() => match joined {
                    Some(joined) => reap(joined),
                    None => break,
                },
            }
        }

        tracing::debug!(accepted, "Dispatcher stopped");
        result
    }

    /// Cancel the session: stop accepting and abort every stream task.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    async fn serve<R: AsyncRead + Unpin>(&self, stream_id: u64, stream: R) {
        let result = tokio::select! {
            _ = self.cancel.cancelled() => Err(Error::Cancelled),
            result = self.handle_stream(stream) => result,
        };

        match result {
            Ok(()) => tracing::debug!(stream = stream_id, "Stream complete"),
            Err(Error::Cancelled) => tracing::debug!(stream = stream_id, "Stream cancelled"),
            Err(e) => tracing::warn!(stream = stream_id, error = %e, "Stream failed"),
        }
    }

    /// Decode one stream to completion.
    pub async fn handle_stream<R: AsyncRead + Unpin>(&self, stream: R) -> Result<()> {
        let mut reader = StreamReader::new(stream);

        let Some(message) = read_message(&mut reader, self.config.max_header_size).await? else {
            tracing::debug!("Ignoring empty stream");
            return Ok(());
        };

        match message {
            Message::Init(msg) => self.handle_init(&mut reader, msg).await,
            Message::Segment(msg) => self.handle_segment(&mut reader, msg).await,
        }
    }

    async fn handle_init<R: AsyncRead + Unpin>(
        &self,
        reader: &mut StreamReader<R>,
        msg: MessageInit,
    ) -> Result<()> {
        tracing::debug!(init_id = %msg.id, "Receiving init");
        let assembler = self.registry.get_or_create(msg.id);

        let result = async {
            while let Some(chunk) = reader.read_chunk(self.config.read_chunk_size).await? {
                assembler.push(&chunk)?;
            }

            if assembler.get().is_none() {
                return Err(Error::framing(format!(
                    "init {} stream ended before a complete moov",
                    msg.id
                )));
            }
            Ok(())
        }
        .await;

        // Segments waiting on this init must not wait forever.
        if let Err(e) = &result {
            assembler.fail(e.to_string());
        }
        result
    }

    async fn handle_segment<R: AsyncRead + Unpin>(
        &self,
        reader: &mut StreamReader<R>,
        msg: MessageSegment,
    ) -> Result<()> {
        // Take a place in line now so segments waiting on the same init are
        // queued in the order their headers arrived.
        let turn = self.registry.get_or_create(msg.init).reserve();
        let init = turn.wait().await?;

        let segment = Segment::new(msg.init, init, msg.timestamp);
        let track = self.track(segment.kind());

        tracing::debug!(
            init_id = %msg.init,
            kind = %track.kind(),
            timestamp = msg.timestamp,
            "Receiving segment"
        );

        let id = track.add(segment);
        drop(turn);

        // Finish even after a read error so later segments are not stuck
        // behind this one.
        let read = self.read_atoms(reader, track, id).await;
        let finish = track.finish(id);
        track.flush();

        read.and(finish)
    }

    async fn read_atoms<R: AsyncRead + Unpin>(
        &self,
        reader: &mut StreamReader<R>,
        track: &TrackBuffer,
        id: SegmentId,
    ) -> Result<()> {
        while !reader.done().await? {
            let atom = reader.read_atom(self.config.max_atom_size).await?;

            track.push(id, atom)?;
            track.flush();
        }
        Ok(())
    }
}

fn reap(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        if e.is_panic() {
            tracing::error!(error = %e, "Stream task panicked");
        }
    }
}
