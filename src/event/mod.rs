//! Event system for async frame and message handling.
//!
//! Each layer owns an [`EventDispatcher`] for the events it produces: the
//! bridge publishes decoded [`Frame`](crate::protocol::Frame)s and the
//! messenger publishes [`InsteonMessage`]s. Consumers either subscribe to the
//! full stream or register a [`PendingMatch`]: a one-shot predicate with a
//! deadline that is resolved by the first matching event and unregistered
//! when it resolves, expires or is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, oneshot};
use tokio::time::Instant;

use crate::error::{Error, Result};
use crate::types::{Address, InsteonMessage};

/// Default broadcast capacity for subscriptions.
pub const DEFAULT_CAPACITY: usize = 256;

type Predicate<T> = Box<dyn Fn(&T) -> bool + Send>;

struct Entry<T> {
    predicate: Predicate<T>,
    reply: oneshot::Sender<T>,
}

struct Registry<T> {
    next_id: u64,
    entries: HashMap<u64, Entry<T>>,
}

struct EventDispatcherInner<T> {
    sender: broadcast::Sender<T>,
    pending: Mutex<Registry<T>>,
}

impl<T> EventDispatcherInner<T> {
    fn registry(&self) -> std::sync::MutexGuard<'_, Registry<T>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Dispatches events to subscribers and pending matches.
pub struct EventDispatcher<T> {
    inner: Arc<EventDispatcherInner<T>>,
}

impl<T> Clone for EventDispatcher<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone + Send + 'static> EventDispatcher<T> {
    /// Creates a dispatcher whose subscriptions buffer up to `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        let inner = Arc::new(EventDispatcherInner {
            sender,
            pending: Mutex::new(Registry {
                next_id: 0,
                entries: HashMap::new(),
            }),
        });
        Self { inner }
    }

    /// Delivers an event to every pending match it satisfies, then to all
    /// subscribers.
    pub fn dispatch(&self, event: T) {
        let matched: Vec<oneshot::Sender<T>> = {
            let mut registry = self.inner.registry();
            let ids: Vec<u64> = registry
                .entries
                .iter()
                .filter(|(_, entry)| (entry.predicate)(&event))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| registry.entries.remove(&id))
                .map(|entry| entry.reply)
                .collect()
        };

        for reply in matched {
            // The waiter may have given up between matching and delivery.
            let _ = reply.send(event.clone());
        }

        // No subscribers is fine
        let _ = self.inner.sender.send(event);
    }

    /// Subscribes to all events published from now on.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<T> {
        Subscription {
            receiver: self.inner.sender.subscribe(),
        }
    }

    /// Registers a one-shot match that must resolve within `timeout`.
    ///
    /// Register before triggering the event you wait for: only events
    /// dispatched after registration are considered.
    pub fn register<F>(&self, predicate: F, timeout: Duration) -> PendingMatch<T>
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        let (reply, receiver) = oneshot::channel();
        let id = {
            let mut registry = self.inner.registry();
            let id = registry.next_id;
            registry.next_id = registry.next_id.wrapping_add(1);
            registry.entries.insert(
                id,
                Entry {
                    predicate: Box::new(predicate),
                    reply,
                },
            );
            id
        };

        PendingMatch {
            id,
            receiver,
            deadline: Instant::now() + timeout,
            timeout,
            inner: Arc::clone(&self.inner),
        }
    }

    /// Waits for the first event matching `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] if nothing matches within `timeout`.
    pub async fn wait_for<F>(&self, predicate: F, timeout: Duration) -> Result<T>
    where
        F: Fn(&T) -> bool + Send + 'static,
    {
        self.register(predicate, timeout).wait().await
    }

    /// Returns the number of registered pending matches.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.registry().entries.len()
    }
}

/// A registered one-shot match.
///
/// Dropping it unregisters the predicate.
pub struct PendingMatch<T> {
    id: u64,
    receiver: oneshot::Receiver<T>,
    deadline: Instant,
    timeout: Duration,
    inner: Arc<EventDispatcherInner<T>>,
}

impl<T> PendingMatch<T> {
    /// Returns the instant at which this match expires.
    #[must_use]
    pub const fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Waits for the matching event.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] once the deadline passes.
    pub async fn wait(mut self) -> Result<T> {
        match tokio::time::timeout_at(self.deadline, &mut self.receiver).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(Error::ChannelClosed),
            Err(_) => Err(Error::timeout(self.timeout)),
        }
    }
}

impl<T> Drop for PendingMatch<T> {
    fn drop(&mut self) {
        self.inner.registry().entries.remove(&self.id);
    }
}

/// A subscription to every published event.
pub struct Subscription<T> {
    receiver: broadcast::Receiver<T>,
}

impl<T: Clone> Subscription<T> {
    /// Receives the next event, or `None` once the publisher is gone.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("subscription lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Structured matcher for inbound messages.
///
/// Every field that is `Some` must equal the corresponding message attribute.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageFilter {
    /// Sending device.
    pub from: Option<Address>,
    /// Destination device.
    pub to: Option<Address>,
    /// Command byte 1.
    pub cmd1: Option<u8>,
    /// Command byte 2.
    pub cmd2: Option<u8>,
    /// Extended flag.
    pub extended: Option<bool>,
    /// Broadcast flag.
    pub broadcast: Option<bool>,
    /// Ack flag.
    pub ack: Option<bool>,
}

impl MessageFilter {
    /// Matches messages sent by `address`.
    #[must_use]
    pub const fn sender(address: Address) -> Self {
        Self {
            from: Some(address),
            to: None,
            cmd1: None,
            cmd2: None,
            extended: None,
            broadcast: None,
            ack: None,
        }
    }

    /// Also require `cmd1`.
    #[must_use]
    pub const fn cmd1(mut self, cmd1: u8) -> Self {
        self.cmd1 = Some(cmd1);
        self
    }

    /// Also require `cmd2`.
    #[must_use]
    pub const fn cmd2(mut self, cmd2: u8) -> Self {
        self.cmd2 = Some(cmd2);
        self
    }

    /// Also require the extended flag to be `extended`.
    #[must_use]
    pub const fn extended(mut self, extended: bool) -> Self {
        self.extended = Some(extended);
        self
    }

    /// Also require the broadcast flag to be `broadcast`.
    #[must_use]
    pub const fn broadcast(mut self, broadcast: bool) -> Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// Checks if a message matches this filter.
    #[must_use]
    pub fn matches(&self, msg: &InsteonMessage) -> bool {
        fn check<V: PartialEq>(want: Option<V>, got: V) -> bool {
            want.is_none_or(|want| want == got)
        }

        check(self.from, msg.from)
            && check(self.to, msg.to)
            && check(self.cmd1, msg.cmd1)
            && check(self.cmd2, msg.cmd2)
            && check(self.extended, msg.flags.extended)
            && check(self.broadcast, msg.flags.broadcast)
            && check(self.ack, msg.flags.ack)
    }
}
