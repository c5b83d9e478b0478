//! Session wiring.
//!
//! [`Player::new`] connects a transport and a media sink: it creates the init
//! registry and both track buffers, then spawns the stream dispatcher and the
//! playback controller. Closing the player cancels both and releases every
//! task still waiting on an init segment.

use crate::config::{validate_config, PlayerConfig};
use crate::controller::Controller;
use crate::dispatcher::Dispatcher;
use crate::init::InitRegistry;
use crate::protocol::{Command, ControlChannel, MessageThrottle};
use crate::sink::{MediaSink, TrackKind};
use crate::track::TrackBuffer;
use crate::transport::{RecvStream, SendStream, Transport};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// One playback session.
pub struct Player {
    registry: Arc<InitRegistry>,
    audio: Arc<TrackBuffer>,
    video: Arc<TrackBuffer>,
    controller: Arc<Controller>,
    control: Option<ControlChannel>,
    waiting: Arc<Notify>,
    cancel: CancellationToken,
    dispatcher_task: Mutex<Option<JoinHandle<()>>>,
    controller_task: Mutex<Option<JoinHandle<()>>>,
}

impl Player {
    /// Start a session. Must be called from within a tokio runtime.
    ///
    /// `control` is the outbound stream for [`Player::send_message`]; without
    /// it, sending fails with a protocol error.
    pub fn new<T>(
        config: PlayerConfig,
        transport: T,
        control: Option<SendStream>,
        sink: Arc<dyn MediaSink>,
    ) -> Result<Self>
    where
        T: Transport + 'static,
    {
        validate_config(&config)?;

        let registry = Arc::new(InitRegistry::new());
        let audio = Arc::new(TrackBuffer::new(TrackKind::Audio, sink.clone()));
        let video = Arc::new(TrackBuffer::new(TrackKind::Video, sink.clone()));
        let controller = Arc::new(Controller::new(sink, audio.clone(), video.clone()));
        let waiting = Arc::new(Notify::new());
        let cancel = CancellationToken::new();

        let dispatcher = Dispatcher::new(
            registry.clone(),
            audio.clone(),
            video.clone(),
            config.protocol.clone(),
            cancel.clone(),
        );

        let dispatcher_task = tokio::spawn(async move {
            if let Err(e) = dispatcher.run(transport).await {
                tracing::warn!(error = %e, "Stream dispatcher ended");
            }
        });

        let controller_task = {
            let controller = controller.clone();
            let waiting = waiting.clone();
            let cancel = cancel.clone();
            let interval = config.playback.tick_interval();
            tokio::spawn(async move { controller.run(interval, waiting, cancel).await })
        };

        tracing::info!(
            tick_interval_ms = config.playback.tick_interval_ms,
            control = control.is_some(),
            "Player session started"
        );

        Ok(Self {
            registry,
            audio,
            video,
            controller,
            control: control.map(ControlChannel::new),
            waiting,
            cancel,
            dispatcher_task: Mutex::new(Some(dispatcher_task)),
            controller_task: Mutex::new(Some(controller_task)),
        })
    }

    /// Channel whose receiver can serve as the session's [`Transport`].
    ///
    /// Whatever owns the real connection pushes accepted streams into the
    /// sender; dropping every sender ends the stream enumeration.
    pub fn channel(config: &PlayerConfig) -> (mpsc::Sender<RecvStream>, mpsc::Receiver<RecvStream>) {
        mpsc::channel(config.session.stream_backlog)
    }

    pub fn registry(&self) -> &Arc<InitRegistry> {
        &self.registry
    }

    pub fn audio(&self) -> &Arc<TrackBuffer> {
        &self.audio
    }

    pub fn video(&self) -> &Arc<TrackBuffer> {
        &self.video
    }

    pub fn controller(&self) -> &Arc<Controller> {
        &self.controller
    }

    /// Jump to the live edge and resume playback.
    pub fn go_live(&self) -> Option<f64> {
        self.controller.go_live()
    }

    /// Host signal that playback stalled; triggers an immediate tick.
    pub fn notify_waiting(&self) {
        self.waiting.notify_one();
    }

    /// Host signal that the sink can accept more data.
    pub fn notify_append_ready(&self) {
        self.controller.drain();
    }

    /// Send a framed JSON message on the control stream.
    pub async fn send_message<T: Serialize + ?Sized>(&self, msg: &T) -> Result<()> {
        let control = self
            .control
            .as_ref()
            .ok_or_else(|| Error::protocol("session has no control stream"))?;
        control.send(msg).await
    }

    /// Ask the sender to shape its output.
    pub async fn throttle(&self, rate: u64, buffer: u64, loss: f64) -> Result<()> {
        self.send_message(&Command::Throttle(MessageThrottle { rate, buffer, loss }))
            .await
    }

    /// Wait until the transport has ended and every accepted stream has been
    /// handled.
    pub async fn finished(&self) {
        let task = self.dispatcher_task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// End the session.
    ///
    /// Stream tasks are aborted, the controller stops, and pending
    /// `ready()` waits resolve to [`Error::Cancelled`].
    pub async fn close(&self) {
        tracing::info!("Closing player session");
        self.cancel.cancel();
        self.registry.close();

        let tasks = [
            self.dispatcher_task.lock().take(),
            self.controller_task.lock().take(),
        ];
        for task in tasks.into_iter().flatten() {
            let _ = task.await;
        }

        if let Some(control) = &self.control {
            if let Err(e) = control.close().await {
                tracing::debug!(error = %e, "Failed to close control stream");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Player {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.registry.close();
    }
}
