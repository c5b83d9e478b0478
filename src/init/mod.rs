//! Initialization segment assembly.
//!
//! An init stream delivers `ftyp` + `moov` bytes in arbitrary chunks. The
//! assembler buffers them until [`InitInfo::parse`] succeeds, then publishes
//! the result once to every task waiting in [`InitAssembler::ready`]. Segment
//! streams may reference an init before its stream has arrived, so waiting
//! is the normal path rather than an edge case.
//!
//! Waiters are released together, so a segment task first takes a [`Turn`].
//! Turns are let through one at a time in the order they were taken, which
//! keeps segments that queued on the same init in arrival order.

mod registry;

pub use crate::protocol::InitId;
pub use registry::InitRegistry;

use crate::{Error, Result};
use bytes::BytesMut;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::watch;
use warp_media::InitInfo;

/// Final value published to waiters.
#[derive(Debug, Clone)]
enum InitOutcome {
    Ready(Arc<InitInfo>),
    Failed(String),
    Cancelled,
}

enum State {
    Pending(BytesMut),
    Done,
}

/// Line of turns handed out by one assembler.
#[derive(Debug, Default)]
struct Turns {
    next: u64,
    head: u64,
    /// Released tickets that are not yet at the head.
    released: BTreeSet<u64>,
}

/// Collects initialization bytes for one [`InitId`].
pub struct InitAssembler {
    id: InitId,
    state: Mutex<State>,
    outcome: watch::Sender<Option<InitOutcome>>,
    turns: watch::Sender<Turns>,
}

impl InitAssembler {
    pub fn new(id: InitId) -> Self {
        let (outcome, _) = watch::channel(None);
        let (turns, _) = watch::channel(Turns::default());
        Self {
            id,
            state: Mutex::new(State::Pending(BytesMut::new())),
            outcome,
            turns,
        }
    }

    pub fn id(&self) -> InitId {
        self.id
    }

    /// Append bytes and try to parse.
    ///
    /// Pushing after the assembler resolved is a protocol error and leaves
    /// the published value untouched. A parse failure resolves every waiter
    /// with the same error.
    pub fn push(&self, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();

        let State::Pending(buffer) = &mut *state else {
            return Err(Error::protocol(format!(
                "init {} received bytes after it was resolved",
                self.id
            )));
        };

        buffer.extend_from_slice(data);

        match InitInfo::parse(buffer) {
            Ok(Some(info)) => {
                let trailing = buffer.len() - info.raw.len();
                if trailing > 0 {
                    tracing::debug!(init_id = %self.id, trailing, "Ignoring bytes after moov");
                }

                tracing::debug!(
                    init_id = %self.id,
                    tracks = info.tracks.len(),
                    codecs = %info.codecs(),
                    "Init segment ready"
                );

                *state = State::Done;
                self.outcome
                    .send_replace(Some(InitOutcome::Ready(Arc::new(info))));
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(e) => {
                let reason = e.to_string();
                *state = State::Done;
                self.outcome
                    .send_replace(Some(InitOutcome::Failed(reason.clone())));
                Err(Error::parse(reason))
            }
        }
    }

    /// Resolve a still-pending assembler as failed, e.g. when its stream
    /// ended before a complete `moov`. No-op once resolved.
    pub fn fail(&self, reason: impl Into<String>) {
        self.resolve(InitOutcome::Failed(reason.into()));
    }

    /// Release waiters with [`Error::Cancelled`]. No-op once resolved.
    pub fn cancel(&self) {
        self.resolve(InitOutcome::Cancelled);
    }

    fn resolve(&self, outcome: InitOutcome) {
        let mut state = self.state.lock();
        if let State::Pending(_) = &*state {
            *state = State::Done;
            self.outcome.send_replace(Some(outcome));
        }
    }

    /// Wait for the parsed initialization.
    ///
    /// Every caller gets the same `Arc`.
    pub async fn ready(&self) -> Result<Arc<InitInfo>> {
        let mut rx = self.outcome.subscribe();
        let outcome = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Cancelled)?;

        match outcome.as_ref() {
            Some(InitOutcome::Ready(info)) => Ok(info.clone()),
            Some(InitOutcome::Failed(reason)) => Err(Error::parse(reason.clone())),
            Some(InitOutcome::Cancelled) | None => Err(Error::Cancelled),
        }
    }

    /// Take the next place in line behind every earlier [`Turn`].
    pub fn reserve(self: &Arc<Self>) -> Turn {
        let mut ticket = 0;
        self.turns.send_if_modified(|turns| {
            ticket = turns.next;
            turns.next += 1;
            false
        });

        Turn {
            assembler: self.clone(),
            ticket,
        }
    }

    /// The parsed initialization, if already available.
    pub fn get(&self) -> Option<Arc<InitInfo>> {
        match self.outcome.borrow().as_ref() {
            Some(InitOutcome::Ready(info)) => Some(info.clone()),
            _ => None,
        }
    }

    /// Whether the assembler has resolved, successfully or not.
    pub fn is_resolved(&self) -> bool {
        self.outcome.borrow().is_some()
    }
}

impl std::fmt::Debug for InitAssembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitAssembler")
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// A place in line among the tasks waiting on one init.
///
/// [`Turn::wait`] returns once the init is ready and every earlier turn has
/// been dropped. Dropping a turn lets the next one through, including when
/// its task failed or was aborted.
pub struct Turn {
    assembler: Arc<InitAssembler>,
    ticket: u64,
}

impl Turn {
    pub async fn wait(&self) -> Result<Arc<InitInfo>> {
        let init = self.assembler.ready().await?;

        let mut rx = self.assembler.turns.subscribe();
        rx.wait_for(|turns| turns.head == self.ticket)
            .await
            .map_err(|_| Error::Cancelled)?;

        Ok(init)
    }
}

impl Drop for Turn {
    fn drop(&mut self) {
        let ticket = self.ticket;
        self.assembler.turns.send_if_modified(|turns| {
            turns.released.insert(ticket);

            let head = turns.head;
            while turns.released.remove(&turns.head) {
                turns.head += 1;
            }
            turns.head != head
        });
    }
}

impl std::fmt::Debug for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Turn")
            .field("init_id", &self.assembler.id)
            .field("ticket", &self.ticket)
            .finish()
    }
}
