//! Chain watcher: observes launchpad contract events and publishes
//! normalized [`DomainEvent`]s into the relay.
//!
//! One logical watcher instance runs per contract per environment. It
//! is a single state machine with an explicit mode:
//!
//! - **push mode** — a WebSocket log subscription, entered when a
//!   push-capable transport is configured;
//! - **poll mode** — a moving block window queried on a fixed interval,
//!   entered at startup without a push transport or after a push
//!   transport failure.
//!
//! Both modes share one persisted cursor (last fully-processed block),
//! so mode switches and restarts cause at-most re-delivery of the
//! current batch, never silent gaps. The cursor advances only after
//! every event in a batch has been forwarded into the relay. Downstream
//! consumers are idempotent on `(tx_hash, log_index)`; a bounded dedup
//! window here additionally absorbs push/poll overlap within one
//! instance.

pub mod decode;
pub mod push;
pub mod rpc;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use tokio::sync::watch;

use crate::domain::{DomainEvent, EventId, EventKind, EventRelay};
use crate::store::SharedStore;

use decode::{DecodeError, decode_log};
use push::LogSubscriber;
use rpc::{ChainRpc, RawLog};

/// Tunables for one watcher instance.
#[derive(Debug, Clone)]
pub struct WatcherConfig {
    /// The launchpad contract address to watch.
    pub contract: String,
    /// Poll-mode tick interval.
    pub poll_interval: Duration,
    /// Poll-mode window cap: never look further back than `head - N`.
    pub max_block_window: u64,
    /// Budget for enrichment and block-metadata reads.
    pub enrich_timeout: Duration,
    /// Capacity of the `(tx_hash, log_index)` dedup window.
    pub dedup_capacity: usize,
}

/// The watcher's current event-sourcing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherMode {
    /// Subscription transport, real-time.
    Push,
    /// Interval queries over a moving block window.
    Poll,
}

/// How a push session ended.
enum PushExit {
    Shutdown,
    TransportFailed,
}

/// Stops a running [`ChainWatcher`].
#[derive(Debug)]
pub struct WatcherHandle {
    shutdown: watch::Sender<bool>,
}

impl WatcherHandle {
    /// Signals the watcher to stop after its current batch.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }
}

/// Bounded set of recently forwarded event identities.
#[derive(Debug)]
struct DedupWindow {
    seen: HashSet<EventId>,
    order: VecDeque<EventId>,
    capacity: usize,
}

impl DedupWindow {
    fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records an identity; returns `false` if it was already present.
    fn insert(&mut self, id: EventId) -> bool {
        if self.seen.contains(&id) {
            return false;
        }
        self.seen.insert(id.clone());
        self.order.push_back(id);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
        true
    }
}

/// The watcher instance. Created once, consumed by [`run`](Self::run).
#[derive(Debug)]
pub struct ChainWatcher {
    config: WatcherConfig,
    store: Arc<dyn SharedStore>,
    relay: EventRelay,
    rpc: Arc<dyn ChainRpc>,
    subscriber: Option<Arc<dyn LogSubscriber>>,
    mode: WatcherMode,
    dedup: DedupWindow,
    shutdown: watch::Receiver<bool>,
}

impl ChainWatcher {
    /// Creates a watcher and its stop handle.
    ///
    /// With a `subscriber` the watcher starts in push mode; without one
    /// it starts (and stays) in poll mode.
    #[must_use]
    pub fn new(
        config: WatcherConfig,
        store: Arc<dyn SharedStore>,
        relay: EventRelay,
        rpc: Arc<dyn ChainRpc>,
        subscriber: Option<Arc<dyn LogSubscriber>>,
    ) -> (Self, WatcherHandle) {
        let (tx, rx) = watch::channel(false);
        let mode = if subscriber.is_some() {
            WatcherMode::Push
        } else {
            WatcherMode::Poll
        };
        let dedup = DedupWindow::new(config.dedup_capacity);
        (
            Self {
                config,
                store,
                relay,
                rpc,
                subscriber,
                mode,
                dedup,
                shutdown: rx,
            },
            WatcherHandle { shutdown: tx },
        )
    }

    /// Runs the watcher until [`WatcherHandle::stop`] is called.
    ///
    /// Push-mode transport failures fall back to poll mode; in-flight
    /// state (cursor, dedup window) carries across the switch.
    pub async fn run(mut self) {
        tracing::info!(
            contract = %self.config.contract,
            mode = ?self.mode,
            "chain watcher starting"
        );
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            match self.mode {
                WatcherMode::Push => match self.run_push().await {
                    PushExit::Shutdown => break,
                    PushExit::TransportFailed => {
                        tracing::warn!("push transport failed, falling back to poll mode");
                        self.mode = WatcherMode::Poll;
                    }
                },
                WatcherMode::Poll => {
                    self.run_poll().await;
                    break;
                }
            }
        }
        tracing::info!(contract = %self.config.contract, "chain watcher stopped");
    }

    async fn run_push(&mut self) -> PushExit {
        let Some(subscriber) = self.subscriber.clone() else {
            return PushExit::TransportFailed;
        };
        let mut logs = match subscriber.subscribe_logs(&self.config.contract).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "log subscription failed");
                return PushExit::TransportFailed;
            }
        };
        tracing::info!("log subscription established");

        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return PushExit::Shutdown;
        }
        loop {
            tokio::select! {
                _ = shutdown.changed() => return PushExit::Shutdown,
                maybe_log = logs.recv() => match maybe_log {
                    Some(log) => {
                        if let Err(e) = self.process_push_log(log).await {
                            tracing::warn!(error = %e, "failed to process pushed log");
                        }
                    }
                    None => return PushExit::TransportFailed,
                },
            }
        }
    }

    async fn process_push_log(&mut self, log: RawLog) -> Result<()> {
        if log.removed {
            return Ok(());
        }
        let block = log.block_number;
        let timestamp = self.block_timestamp_or_now(block).await;
        let Some(event) = self.decode_and_gate(&log, timestamp) else {
            return Ok(());
        };
        let event = self.enrich(event).await;
        self.relay.publish(event.channel(), event);
        // Logs of one block can arrive as separate frames, so the
        // cursor trails the live block by one: a crash mid-block
        // re-delivers that block instead of skipping its tail.
        self.store
            .set_cursor(&self.config.contract, block.saturating_sub(1))
            .await?;
        Ok(())
    }

    async fn run_poll(&mut self) {
        tracing::info!(
            interval_secs = self.config.poll_interval.as_secs(),
            "poll mode active"
        );
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        let mut shutdown = self.shutdown.clone();
        if *shutdown.borrow() {
            return;
        }
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => match self.poll_once().await {
                    Ok(0) => {}
                    Ok(forwarded) => tracing::debug!(forwarded, "poll batch forwarded"),
                    Err(e) => {
                        // Transient RPC/store failures retry on the next
                        // tick; the cursor has not moved.
                        tracing::warn!(error = %e, "poll tick failed");
                    }
                },
            }
        }
    }

    /// Processes one poll window. The cursor advances to the window end
    /// only after every decodable event in it was forwarded.
    async fn poll_once(&mut self) -> Result<usize> {
        let head = self.rpc.head_block().await?;
        let cursor = self.store.cursor(&self.config.contract).await?;
        let floor = head.saturating_sub(self.config.max_block_window);
        let from = cursor.map_or(floor, |c| (c + 1).max(floor));
        if from > head {
            return Ok(0);
        }

        let logs = self.rpc.logs(&self.config.contract, from, head).await?;
        let mut timestamps: HashMap<u64, i64> = HashMap::new();
        let mut forwarded = 0usize;

        for log in logs {
            if log.removed {
                continue;
            }
            let timestamp = match timestamps.get(&log.block_number) {
                Some(t) => *t,
                None => {
                    let t = self.block_timestamp_or_now(log.block_number).await;
                    timestamps.insert(log.block_number, t);
                    t
                }
            };
            if let Some(event) = self.decode_and_gate(&log, timestamp) {
                let event = self.enrich(event).await;
                self.relay.publish(event.channel(), event);
                forwarded += 1;
            }
        }

        self.store.set_cursor(&self.config.contract, head).await?;
        Ok(forwarded)
    }

    /// Decodes a log and gates it through the dedup window. Decode
    /// failures skip the log, never the batch.
    fn decode_and_gate(&mut self, log: &RawLog, timestamp: i64) -> Option<DomainEvent> {
        match decode_log(log, timestamp) {
            Ok(event) => {
                if self.dedup.insert(event.id()) {
                    Some(event)
                } else {
                    tracing::debug!(id = %event.id(), "duplicate event suppressed");
                    None
                }
            }
            Err(DecodeError::UnknownTopic(topic)) => {
                tracing::debug!(%topic, tx = %log.tx_hash, "skipping unwatched event");
                None
            }
            Err(e) => {
                tracing::warn!(tx = %log.tx_hash, error = %e, "skipping undecodable log");
                None
            }
        }
    }

    /// Attaches a current price to trade events, best-effort and
    /// time-bounded. Failure publishes the event without derived fields.
    async fn enrich(&self, mut event: DomainEvent) -> DomainEvent {
        let Some(token) = event.token().map(str::to_string) else {
            return event;
        };
        let EventKind::TokenTraded { price, .. } = &mut event.kind else {
            return event;
        };
        match tokio::time::timeout(
            self.config.enrich_timeout,
            self.rpc.token_snapshot(&token),
        )
        .await
        {
            Ok(Ok(snapshot)) => *price = Some(snapshot.price),
            Ok(Err(e)) => tracing::debug!(error = %e, %token, "enrichment failed"),
            Err(_) => tracing::debug!(%token, "enrichment timed out"),
        }
        event
    }

    async fn block_timestamp_or_now(&self, block: u64) -> i64 {
        match tokio::time::timeout(
            self.config.enrich_timeout,
            self.rpc.block_timestamp(block),
        )
        .await
        {
            Ok(Ok(ts)) => ts,
            _ => {
                tracing::debug!(block, "block timestamp unavailable, stamping receipt time");
                Utc::now().timestamp()
            }
        }
    }
}
