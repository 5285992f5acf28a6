use crate::{
    error::{
        LedgerError,
        WatcherError,
    },
    ledger::Ledger,
    records::{
        Notification,
        NotificationId,
        Topic,
    },
};
use futures::StreamExt;
use rand::Rng;
use std::{
    collections::HashSet,
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc::UnboundedSender,
    task::JoinHandle,
};
use tracing::{
    debug,
    info,
    trace,
    warn,
};


/// How a notification reached the watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// Part of the history that existed when the watcher first started.
    Replay,
    /// Observed after the first catch-up, including gaps filled after a
    /// resubscription.
    Live,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WatcherEvent {
    Notification {
        delivery: Delivery,
        notification: Notification,
    },
    CaughtUp {
        topic: Topic,
        head: u64,
    },
    Resubscribing {
        topic: Topic,
        attempt: u32,
        delay: Duration,
        reason: LedgerError,
    },
    Stalled(WatcherError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (1-based): doubling from
    /// `initial_backoff`, capped at `max_backoff`, plus up to 25% jitter.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self
            .initial_backoff
            .saturating_mul(1 << exponent)
            .min(self.max_backoff);
        let jitter_ceiling = base.as_millis() as u64 / 4;
        let jitter = if jitter_ceiling == 0 {
            0
        } else {
            rand::rng().random_range(0..=jitter_ceiling)
        };
        base + Duration::from_millis(jitter)
    }
}

/// Owns a running watcher task; dropping it stops the watcher and releases
/// its subscription.
#[derive(Debug)]
pub struct WatcherHandle {
    topic: Topic,
    task: JoinHandle<()>,
}

impl WatcherHandle {
    pub fn topic(&self) -> Topic {
        self.topic
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for WatcherHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

pub struct EventStreamWatcher<L> {
    ledger: Arc<L>,
    topic: Topic,
    from_block: u64,
    retry: RetryPolicy,
}

struct SinkClosed;

struct Progress {
    seen: HashSet<NotificationId>,
    resume_from: u64,
    /// Head at the first successful pass; anything above it is new.
    replay_ceiling: Option<u64>,
    failures: u32,
}

impl Progress {
    fn delivery_of(&self, id: NotificationId) -> Delivery {
        match self.replay_ceiling {
            Some(ceiling) if id.block > ceiling => Delivery::Live,
            _ => Delivery::Replay,
        }
    }
}

impl<L: Ledger> EventStreamWatcher<L> {
    pub fn new(ledger: Arc<L>, topic: Topic, from_block: u64, retry: RetryPolicy) -> Self {
        Self {
            ledger,
            topic,
            from_block,
            retry,
        }
    }

    pub fn spawn(self, sink: UnboundedSender<WatcherEvent>) -> WatcherHandle {
        let topic = self.topic;
        let task = tokio::spawn(async move { self.run(sink).await });
        WatcherHandle { topic, task }
    }

    async fn run(self, sink: UnboundedSender<WatcherEvent>) {
        let mut progress = Progress {
            seen: HashSet::new(),
            resume_from: self.from_block,
            replay_ceiling: None,
            failures: 0,
        };

        loop {
            let reason = match self.pass(&sink, &mut progress).await {
                Ok(SinkClosed) => {
                    debug!(topic = %self.topic, "sink closed, watcher stopping");
                    return;
                }
                Err(reason) => reason,
            };

            progress.failures += 1;
            if progress.failures >= self.retry.max_attempts {
                let err = WatcherError {
                    topic: self.topic,
                    attempts: progress.failures,
                    source: reason,
                };
                warn!(%err, "giving up on stream");
                let _ = sink.send(WatcherEvent::Stalled(err));
                return;
            }

            let delay = self.retry.backoff(progress.failures);
            info!(
                topic = %self.topic,
                attempt = progress.failures,
                ?delay,
                %reason,
                "resubscribing"
            );
            let event = WatcherEvent::Resubscribing {
                topic: self.topic,
                attempt: progress.failures,
                delay,
                reason,
            };
            if sink.send(event).is_err() {
                return;
            }
            tokio::time::sleep(delay).await;
        }
    }

    /// One subscription lifetime: open live, replay the gap, then drain live
    /// until the subscription fails or the sink goes away.
    async fn pass(
        &self,
        sink: &UnboundedSender<WatcherEvent>,
        progress: &mut Progress,
    ) -> Result<SinkClosed, LedgerError> {
        let head = self.ledger.head().await?;
        let ceiling = *progress.replay_ceiling.get_or_insert(head);
        let mut live = self.ledger.subscribe(self.topic, head).await?;

        if progress.resume_from <= head {
            let mut backlog = self
                .ledger
                .replay(self.topic, progress.resume_from, head)
                .await?;
            backlog.sort_by_key(|n| n.id);
            debug!(
                topic = %self.topic,
                from = progress.resume_from,
                head,
                count = backlog.len(),
                ceiling,
                "replayed"
            );
            for notification in backlog {
                let delivery = progress.delivery_of(notification.id);
                if self.emit(sink, progress, delivery, notification).is_err() {
                    return Ok(SinkClosed);
                }
            }
        }

        progress.failures = 0;
        if sink
            .send(WatcherEvent::CaughtUp {
                topic: self.topic,
                head,
            })
            .is_err()
        {
            return Ok(SinkClosed);
        }

        loop {
            tokio::select! {
                item = live.next() => {
                    let Some(item) = item else {
                        return Err(LedgerError::Unavailable(format!(
                            "{} subscription ended",
                            self.topic
                        )));
                    };
                    if self.emit(sink, progress, Delivery::Live, item?).is_err() {
                        return Ok(SinkClosed);
                    }
                }
                _ = sink.closed() => return Ok(SinkClosed),
            }
        }
    }

    fn emit(
        &self,
        sink: &UnboundedSender<WatcherEvent>,
        progress: &mut Progress,
        delivery: Delivery,
        notification: Notification,
    ) -> Result<(), SinkClosed> {
        if notification.topic() != self.topic {
            return Ok(());
        }
        if !progress.seen.insert(notification.id) {
            trace!(topic = %self.topic, id = %notification.id, "duplicate suppressed");
            return Ok(());
        }
        progress.resume_from = progress.resume_from.max(notification.id.block);
        sink.send(WatcherEvent::Notification {
            delivery,
            notification,
        })
        .map_err(|_| SinkClosed)
    }
}
