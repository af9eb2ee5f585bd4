//! Broadcast relay decoupling the chain watcher from gateway connections.
//!
//! [`EventRelay`] wraps a [`tokio::sync::broadcast`] channel. The watcher
//! publishes every [`DomainEvent`] through the relay, and gateway
//! connections subscribe — either to one [`Channel`] or to the full
//! stream. There are no consumer groups and no replay: a subscriber that
//! was disconnected at publish time resynchronizes state on demand
//! (snapshot requests), never from the relay.

use tokio::sync::broadcast;

use super::event::{Channel, DomainEvent};

/// A published event paired with the channel it was published on.
#[derive(Debug, Clone)]
pub struct RelayEnvelope {
    /// Channel the event was published on.
    pub channel: Channel,
    /// The event itself.
    pub event: DomainEvent,
}

/// Broadcast relay for [`DomainEvent`]s.
///
/// Backed by a `tokio::broadcast` channel with a configurable capacity.
/// The ring buffer doubles as each subscriber's bounded outbound queue:
/// a receiver that falls more than `capacity` messages behind observes
/// `Lagged` and is expected to drop its connection rather than stall
/// anyone else.
#[derive(Debug, Clone)]
pub struct EventRelay {
    sender: broadcast::Sender<RelayEnvelope>,
}

impl EventRelay {
    /// Creates a new `EventRelay` with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event on a channel to all current subscribers.
    ///
    /// Returns the number of receivers the envelope was delivered to.
    /// With no active receivers the event is silently dropped.
    pub fn publish(&self, channel: Channel, event: DomainEvent) -> usize {
        self.sender
            .send(RelayEnvelope { channel, event })
            .unwrap_or(0)
    }

    /// Subscribes to a single channel.
    ///
    /// Subscribing to [`Channel::Alerts`] yields every published event.
    #[must_use]
    pub fn subscribe(&self, channel: Channel) -> ChannelSubscription {
        ChannelSubscription {
            channel,
            rx: self.sender.subscribe(),
        }
    }

    /// Subscribes to the full envelope stream across all channels.
    ///
    /// This is what gateway connections use: room filtering happens per
    /// connection, after receipt.
    #[must_use]
    pub fn subscribe_all(&self) -> broadcast::Receiver<RelayEnvelope> {
        self.sender.subscribe()
    }

    /// Returns the current number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// A subscription filtered to one channel.
#[derive(Debug)]
pub struct ChannelSubscription {
    channel: Channel,
    rx: broadcast::Receiver<RelayEnvelope>,
}

impl ChannelSubscription {
    /// Receives the next event published on the subscribed channel.
    ///
    /// # Errors
    ///
    /// Returns [`broadcast::error::RecvError::Lagged`] when this
    /// subscriber fell behind the ring buffer, and `Closed` when the
    /// relay is gone.
    pub async fn recv(&mut self) -> Result<DomainEvent, broadcast::error::RecvError> {
        loop {
            let envelope = self.rx.recv().await?;
            if self.channel == Channel::Alerts || envelope.channel == self.channel {
                return Ok(envelope.event);
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::domain::event::EventKind;

    fn staked_event(amount: &str) -> DomainEvent {
        DomainEvent {
            kind: EventKind::Staked {
                staker: "0x00a0000000000000000000000000000000000001".to_string(),
                amount: amount.to_string(),
            },
            block_number: 5,
            block_timestamp: 0,
            tx_hash: format!("0x{amount}"),
            log_index: 0,
        }
    }

    #[test]
    fn publish_without_receivers_returns_zero() {
        let relay = EventRelay::new(16);
        let count = relay.publish(Channel::Staked, staked_event("1"));
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn channel_subscriber_receives_matching_event() {
        let relay = EventRelay::new(16);
        let mut sub = relay.subscribe(Channel::Staked);

        relay.publish(Channel::Staked, staked_event("42"));

        let event = sub.recv().await;
        let Ok(event) = event else {
            panic!("expected event");
        };
        assert_eq!(event.tx_hash, "0x42");
    }

    #[tokio::test]
    async fn channel_subscriber_skips_other_channels() {
        let relay = EventRelay::new(16);
        let mut sub = relay.subscribe(Channel::Unstaked);

        relay.publish(Channel::Staked, staked_event("1"));
        relay.publish(Channel::Unstaked, staked_event("2"));

        let event = sub.recv().await;
        let Ok(event) = event else {
            panic!("expected event");
        };
        // The staked publish was filtered out.
        assert_eq!(event.tx_hash, "0x2");
    }

    #[tokio::test]
    async fn alerts_channel_receives_everything() {
        let relay = EventRelay::new(16);
        let mut sub = relay.subscribe(Channel::Alerts);

        relay.publish(Channel::Staked, staked_event("1"));
        relay.publish(Channel::Unstaked, staked_event("2"));

        let first = sub.recv().await.ok().map(|e| e.tx_hash);
        let second = sub.recv().await.ok().map(|e| e.tx_hash);
        assert_eq!(first.as_deref(), Some("0x1"));
        assert_eq!(second.as_deref(), Some("0x2"));
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let relay = EventRelay::new(64);
        let mut sub = relay.subscribe(Channel::Staked);

        for i in 0..10 {
            relay.publish(Channel::Staked, staked_event(&i.to_string()));
        }
        for i in 0..10 {
            let event = sub.recv().await.ok();
            assert_eq!(event.map(|e| e.tx_hash), Some(format!("0x{i}")));
        }
    }

    #[tokio::test]
    async fn multiple_subscribers_each_receive_the_event() {
        let relay = EventRelay::new(16);
        let mut a = relay.subscribe_all();
        let mut b = relay.subscribe_all();

        let count = relay.publish(Channel::Staked, staked_event("7"));
        assert_eq!(count, 2);

        assert!(a.recv().await.is_ok());
        assert!(b.recv().await.is_ok());
    }

    #[tokio::test]
    async fn lagged_subscriber_observes_lagged_error() {
        let relay = EventRelay::new(2);
        let mut sub = relay.subscribe_all();

        for i in 0..8 {
            relay.publish(Channel::Staked, staked_event(&i.to_string()));
        }

        let result = sub.recv().await;
        assert!(matches!(
            result,
            Err(broadcast::error::RecvError::Lagged(_))
        ));
    }
}
