//! Event system for unsolicited device messages.
//!
//! Everything the device sends that is not a response to one of our
//! commands is turned into an [`Event`] and broadcast to subscribers.

use tokio::sync::broadcast;

use crate::types::{Collision, SensorSample};

/// Event types that can be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// Connection established.
    Connected,
    /// Connection lost or closed.
    Disconnected,
    /// Streamed sensor sample, decoded against the active field lists.
    SensorData(SensorSample),
    /// Collision detected.
    Collision(Collision),
    /// The device will go to sleep soon unless it sees activity.
    WillSleep,
    /// The device went to sleep.
    Sleeping,
    /// An unsolicited message could not be decoded.
    DecodeError { message: String },
}

/// Event discriminants used for filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// [`Event::Connected`].
    Connected,
    /// [`Event::Disconnected`].
    Disconnected,
    /// [`Event::SensorData`].
    SensorData,
    /// [`Event::Collision`].
    Collision,
    /// [`Event::WillSleep`].
    WillSleep,
    /// [`Event::Sleeping`].
    Sleeping,
    /// [`Event::DecodeError`].
    DecodeError,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connected => EventKind::Connected,
            Self::Disconnected => EventKind::Disconnected,
            Self::SensorData(_) => EventKind::SensorData,
            Self::Collision(_) => EventKind::Collision,
            Self::WillSleep => EventKind::WillSleep,
            Self::Sleeping => EventKind::Sleeping,
            Self::DecodeError { .. } => EventKind::DecodeError,
        }
    }
}

/// A subscription to events.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Receives the next event.
    ///
    /// Returns `None` once the dispatcher is gone. Events missed because the
    /// subscriber fell behind are skipped.
    pub async fn recv(&mut self) -> Option<Event> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("subscriber lagged, {skipped} events skipped");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Subscription filter for specific event kinds.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Accepted kinds; `None` accepts everything.
    pub kinds: Option<Vec<EventKind>>,
}

impl EventFilter {
    /// Creates a filter for specific event kinds.
    #[must_use]
    pub const fn kinds(kinds: Vec<EventKind>) -> Self {
        Self { kinds: Some(kinds) }
    }

    /// Checks if an event matches this filter.
    #[must_use]
    pub fn matches(&self, event: &Event) -> bool {
        self.kinds
            .as_ref()
            .is_none_or(|kinds| kinds.contains(&event.kind()))
    }
}

/// Dispatches events to subscribers.
///
/// Clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: broadcast::Sender<Event>,
}

impl EventDispatcher {
    /// Creates a new event dispatcher.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Dispatches an event to all subscribers.
    pub fn dispatch(&self, event: Event) {
        // No receivers is fine.
        let _ = self.sender.send(event);
    }

    /// Subscribes to all events.
    #[must_use]
    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }

    /// Waits for an event matching the filter with timeout.
    ///
    /// Returns `None` if the timeout expires or the channel is closed.
    pub async fn wait_for(
        &self,
        filter: EventFilter,
        timeout: std::time::Duration,
    ) -> Option<Event> {
        let mut subscription = self.subscribe();

        tokio::select! {
            biased;
            result = async {
                loop {
                    if let Some(event) = subscription.recv().await {
                        if filter.matches(&event) {
                            return Some(event);
                        }
                    } else {
                        return None;
                    }
                }
            } => result,
            () = tokio::time::sleep(timeout) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_event_dispatch() {
        let dispatcher = EventDispatcher::new(16);
        let mut sub = dispatcher.subscribe();

        dispatcher.dispatch(Event::Connected);

        let event = tokio::time::timeout(Duration::from_millis(100), sub.recv())
            .await
            .unwrap();

        assert_eq!(event, Some(Event::Connected));
    }

    #[test]
    fn test_event_filter() {
        let filter = EventFilter::kinds(vec![EventKind::WillSleep, EventKind::Sleeping]);

        assert!(filter.matches(&Event::WillSleep));
        assert!(filter.matches(&Event::Sleeping));
        assert!(!filter.matches(&Event::Connected));
        assert!(EventFilter::default().matches(&Event::Disconnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_skips_other_events() {
        let dispatcher = EventDispatcher::new(16);
        let waiter = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                dispatcher
                    .wait_for(
                        EventFilter::kinds(vec![EventKind::Sleeping]),
                        Duration::from_secs(1),
                    )
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        dispatcher.dispatch(Event::WillSleep);
        dispatcher.dispatch(Event::Sleeping);

        assert_eq!(waiter.await.unwrap(), Some(Event::Sleeping));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_times_out() {
        let dispatcher = EventDispatcher::new(16);
        let result = dispatcher
            .wait_for(EventFilter::default(), Duration::from_millis(50))
            .await;
        assert_eq!(result, None);
    }
}
