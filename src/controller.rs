//! Playback catch-up control loop.
//!
//! Live playback accumulates latency whenever it stalls. Two corrections run
//! on every tick and whenever the host reports that playback is waiting:
//!
//! - seek-ahead: when stalled on a gap, jump to the next buffered range;
//! - skip-ahead: drop queued video that playback has already passed.

use crate::sink::{MediaSink, TimeRange};
use crate::track::TrackBuffer;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub struct Controller {
    sink: Arc<dyn MediaSink>,
    audio: Arc<TrackBuffer>,
    video: Arc<TrackBuffer>,
}

impl Controller {
    pub fn new(sink: Arc<dyn MediaSink>, audio: Arc<TrackBuffer>, video: Arc<TrackBuffer>) -> Self {
        Self { sink, audio, video }
    }

    pub fn tick(&self) {
        self.try_seek();
        self.try_skip();
    }

    /// Jump over a gap when there is not enough data to play.
    ///
    /// Returns the new position if a seek happened.
    pub fn try_seek(&self) -> Option<f64> {
        if self.sink.ready_state().is_sufficient() {
            return None;
        }

        let ranges = sorted(self.sink.buffered());
        let current = self.sink.current_time();

        // Never seek backwards.
        let target = ranges.iter().map(|r| r.start).find(|&start| start > current)?;

        tracing::warn!(from = current, to = target, skipped = target - current, "Seeking forward");
        self.sink.set_current_time(target);
        Some(target)
    }

    /// Drop queued video behind the playhead.
    ///
    /// While playing, only samples before the current position go. When
    /// starved there is no lower bound. Returns the number of dropped samples.
    pub fn try_skip(&self) -> usize {
        let playhead = self
            .sink
            .ready_state()
            .is_sufficient()
            .then(|| self.sink.current_time());

        self.video.advance(playhead)
    }

    /// Jump to the live edge and resume playback.
    pub fn go_live(&self) -> Option<f64> {
        let live = sorted(self.sink.buffered()).last()?.end;

        tracing::info!(from = self.sink.current_time(), to = live, "Going live");
        self.sink.set_current_time(live);
        self.sink.play();
        Some(live)
    }

    /// Retry appends the sink refused earlier.
    pub fn drain(&self) {
        for track in [&self.audio, &self.video] {
            track.flush();
        }
    }

    /// Tick on `interval` and whenever `waiting` is notified, until cancelled.
    pub async fn run(&self, interval: Duration, waiting: Arc<Notify>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = waiting.notified() => tracing::debug!("Playback waiting"),
            }

            self.tick();
            self.drain();
        }

        tracing::debug!("Playback controller stopped");
    }
}

fn sorted(mut ranges: Vec<TimeRange>) -> Vec<TimeRange> {
    ranges.sort_by(|a, b| a.start.total_cmp(&b.start));
    ranges
}
