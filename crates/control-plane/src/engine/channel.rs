//! Per-run event channel.
//!
//! Publication never blocks: live delivery goes through a bounded
//! broadcast buffer that overwrites its oldest entry when a subscriber
//! falls behind, and a bounded history lets late subscribers replay what
//! they missed. Subscribing snapshots the history and joins the live
//! stream under the same lock publishers take, so backlog and live tail
//! meet with no gap and no duplicate.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::Utc;
use futures::Stream;
use tokio::sync::broadcast::{self, error::RecvError};

use super::events::{EventEnvelope, RunEvent, StreamItem};

/// Sizing of a run's channel.
#[derive(Debug, Clone, Copy)]
pub struct ChannelOptions {
    /// Live events buffered per subscriber.
    pub buffer: usize,
    /// Events retained for late subscribers.
    pub history: usize,
    /// Idle window before a keepalive.
    pub keepalive: Duration,
}

impl Default for ChannelOptions {
    fn default() -> Self {
        Self {
            buffer: 256,
            history: 512,
            keepalive: Duration::from_secs(30),
        }
    }
}

struct ChannelState {
    next_seq: u64,
    history: VecDeque<Arc<EventEnvelope>>,
    finished: bool,
}

/// Ordered, multi-subscriber event channel for one run.
pub struct EventChannel {
    run_id: String,
    sender: broadcast::Sender<Arc<EventEnvelope>>,
    state: Mutex<ChannelState>,
    history_limit: usize,
    keepalive: Duration,
}

impl EventChannel {
    pub fn new(run_id: impl Into<String>, options: ChannelOptions) -> Self {
        let (sender, _) = broadcast::channel(options.buffer.max(1));
        Self {
            run_id: run_id.into(),
            sender,
            state: Mutex::new(ChannelState {
                next_seq: 1,
                history: VecDeque::new(),
                finished: false,
            }),
            // The terminal event must stay replayable.
            history_limit: options.history.max(1),
            keepalive: options.keepalive,
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelState> {
        // State stays consistent across a panicking holder: every update is a single push.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish an event and return its sequence number.
    ///
    /// Events after `finished` are dropped and return `None`.
    pub fn publish(&self, event: RunEvent) -> Option<u64> {
        let mut state = self.lock();
        if state.finished {
            tracing::warn!(
                run_id = %self.run_id,
                event = event.kind(),
                "Dropping event published after finished"
            );
            return None;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.finished = event.is_finished();

        let envelope = Arc::new(EventEnvelope {
            seq,
            timestamp: Utc::now(),
            event,
        });

        state.history.push_back(envelope.clone());
        while state.history.len() > self.history_limit {
            state.history.pop_front();
        }

        // No receivers is fine; history still holds the event.
        let _ = self.sender.send(envelope);
        Some(seq)
    }

    pub fn is_finished(&self) -> bool {
        self.lock().finished
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Subscribe to the run's events.
    ///
    /// Yields the retained backlog then live events in publish order, a
    /// keepalive after each idle window, and ends after `finished`.
    pub fn subscribe(&self) -> impl Stream<Item = StreamItem> + Send + 'static {
        let (backlog, mut receiver, finished) = {
            let state = self.lock();
            let backlog: Vec<_> = state.history.iter().cloned().collect();
            (backlog, self.sender.subscribe(), state.finished)
        };
        let keepalive = self.keepalive;
        let run_id = self.run_id.clone();

        async_stream::stream! {
            let mut last_seq = 0;
            for envelope in backlog {
                last_seq = envelope.seq;
                let done = envelope.event.is_finished();
                yield StreamItem::Event(envelope);
                if done {
                    return;
                }
            }
            if finished {
                return;
            }

            loop {
                match tokio::time::timeout(keepalive, receiver.recv()).await {
                    Ok(Ok(envelope)) => {
                        if envelope.seq <= last_seq {
                            continue;
                        }
                        last_seq = envelope.seq;
                        let done = envelope.event.is_finished();
                        yield StreamItem::Event(envelope);
                        if done {
                            break;
                        }
                    }
                    Ok(Err(RecvError::Lagged(skipped))) => {
                        tracing::warn!(run_id = %run_id, skipped, "Subscriber lagged, events dropped");
                    }
                    Ok(Err(RecvError::Closed)) => break,
                    Err(_) => {
                        yield StreamItem::Keepalive { timestamp: Utc::now() };
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for EventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventChannel")
            .field("run_id", &self.run_id)
            .field("subscribers", &self.subscriber_count())
            .finish_non_exhaustive()
    }
}
