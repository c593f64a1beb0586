//! INSTEON message layer on top of the bridge.
//!
//! The [`Messenger`] republishes every received standard or extended message
//! and sends messages to devices through its own retry queue, correlating
//! each send with the first reply from the destination device.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::bridge::Bridge;
use crate::error::{Error, ErrorKind, Result};
use crate::event::{DEFAULT_CAPACITY, EventDispatcher, MessageFilter, PendingMatch, Subscription};
use crate::protocol::{Command, Frame, Payload};
use crate::queue::{DEFAULT_RETRY_DELAY, RetryPolicy, RetryQueue};
use crate::types::{InsteonMessage, OutboundMessage};

/// Default reply timeout for messages.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default retries after a NAK or unexpected reply.
pub const DEFAULT_RETRIES: u32 = 25;

/// Messenger configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessengerOptions {
    /// Retries after a NAK or unexpected reply.
    pub retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Default reply timeout.
    pub timeout: Duration,
}

impl Default for MessengerOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl MessengerOptions {
    /// Sets the retry count.
    #[must_use]
    pub const fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the delay between retries.
    #[must_use]
    pub const fn retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Sets the default reply timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

struct MessengerInner {
    bridge: Bridge,
    messages: EventDispatcher<InsteonMessage>,
    queue: RetryQueue,
    options: MessengerOptions,
    forward_task: JoinHandle<()>,
}

impl Drop for MessengerInner {
    fn drop(&mut self) {
        self.forward_task.abort();
    }
}

/// Sends and receives INSTEON messages.
#[derive(Clone)]
pub struct Messenger {
    inner: Arc<MessengerInner>,
}

impl Messenger {
    /// Opens the modem on a serial port with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    pub async fn open(path: &str) -> Result<Self> {
        Ok(Self::new(Bridge::open(path).await?, MessengerOptions::default()))
    }

    /// Creates a messenger over an open bridge.
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(bridge: Bridge, options: MessengerOptions) -> Self {
        let messages = EventDispatcher::new(DEFAULT_CAPACITY);

        let mut frames = bridge.subscribe();
        let forward = messages.clone();
        let forward_task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                if let Some(message) = frame.message() {
                    tracing::debug!(?message, "received message");
                    forward.dispatch(message.clone());
                }
            }
        });

        let policy = RetryPolicy::new(
            options.retries,
            &[ErrorKind::MessageNotAcknowledged, ErrorKind::UnexpectedMessage],
        )
        .retry_delay(options.retry_delay);

        Self {
            inner: Arc::new(MessengerInner {
                bridge,
                messages,
                queue: RetryQueue::new(policy),
                options,
                forward_task,
            }),
        }
    }

    /// Returns the underlying bridge.
    #[must_use]
    pub fn bridge(&self) -> &Bridge {
        &self.inner.bridge
    }

    /// Closes the underlying bridge.
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down the stream fails.
    pub async fn close(&self) -> Result<()> {
        self.inner.bridge.close().await
    }

    /// Subscribes to every received message.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<InsteonMessage> {
        self.inner.messages.subscribe()
    }

    /// Registers a wait for the next message matching `filter`.
    ///
    /// Only messages received after this call are considered.
    pub fn match_message(
        &self,
        filter: MessageFilter,
        timeout: Duration,
    ) -> PendingMatch<InsteonMessage> {
        self.inner
            .messages
            .register(move |msg: &InsteonMessage| filter.matches(msg), timeout)
    }

    /// Sends a message with the default timeout and returns the device's ACK.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MessageNotAcknowledged`] or
    /// [`Error::UnexpectedMessage`] once retries are exhausted, or
    /// [`Error::Timeout`] if the device does not answer.
    pub async fn send(&self, message: OutboundMessage) -> Result<InsteonMessage> {
        self.send_with(message, self.inner.options.timeout).await
    }

    /// Sends a message and waits up to `timeout` per attempt for the reply.
    ///
    /// # Errors
    ///
    /// See [`Messenger::send`]. Invalid input fails with
    /// [`Error::Validation`] before anything is written.
    pub async fn send_with(
        &self,
        message: OutboundMessage,
        timeout: Duration,
    ) -> Result<InsteonMessage> {
        if message.cmd1 == 0 {
            return Err(Error::validation("must specify cmd1 in message"));
        }
        if timeout.is_zero() {
            return Err(Error::validation("timeout must be greater than 0"));
        }

        let message = message.normalized();
        let to = message.to;
        tracing::debug!(?message, "queueing message");

        let message = &message;
        self.inner
            .queue
            .run(|attempt| async move {
                tracing::debug!(attempt, %to, cmd1 = message.cmd1, "sending message");

                let reply = self.match_message(MessageFilter::sender(to), timeout);
                self.inner
                    .bridge
                    .send(Frame::new(
                        Command::SendMessage,
                        Payload::SendMessage(message.clone()),
                    ))
                    .await?;
                classify(reply.wait().await?)
            })
            .await
    }
}

/// Checks that a reply is a direct ACK.
fn classify(reply: InsteonMessage) -> Result<InsteonMessage> {
    let flags = reply.flags;
    if flags.ack && flags.direct() {
        tracing::debug!(?reply, "message ACK");
        Ok(reply)
    } else if flags.all_link && !flags.broadcast {
        tracing::debug!(?reply, "unexpected all-link message");
        Err(Error::UnexpectedMessage {
            message: Box::new(reply),
        })
    } else {
        tracing::debug!(?reply, "message NAK");
        Err(Error::MessageNotAcknowledged {
            reply: Box::new(reply),
        })
    }
}
