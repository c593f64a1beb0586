//! Bridge (PowerLinc Modem) frame layer.
//!
//! The [`Bridge`] owns the byte stream to the modem. A background task reads
//! bytes into a [`FrameBuffer`], decodes every complete frame and publishes it
//! to subscribers and pending matches. Outbound frames go through a
//! [`RetryQueue`] so two sends never overlap on the wire; each send waits for
//! the modem's ACK/NAK echo of the same command.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::error::{Error, ErrorKind, Result};
use crate::event::{DEFAULT_CAPACITY, EventDispatcher, PendingMatch, Subscription};
use crate::protocol::{Command, Frame, FrameBuffer, Payload};
use crate::queue::{DEFAULT_RETRY_DELAY, RetryPolicy, RetryQueue};
use crate::transport::{SerialTransport, Transport};
use crate::types::{AllLinkRecord, BridgeConfig, BridgeInfo, LinkingMode};

/// Default frame reply timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default number of retries after a NAK.
pub const DEFAULT_RETRIES: u32 = 25;

/// Factory reset takes a while to erase the link database.
pub const FACTORY_RESET_TIMEOUT: Duration = Duration::from_secs(30);

/// Bridge configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Retries after a NAK.
    pub retries: u32,
    /// Delay between retries.
    pub retry_delay: Duration,
    /// Default reply timeout.
    pub timeout: Duration,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl BridgeOptions {
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

/// Options for a single [`Bridge::send_with`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SendOptions {
    /// Reply timeout; the bridge default when `None`.
    pub timeout: Option<Duration>,
    /// Treat a NAK as a retryable error. When false the NAK reply is returned.
    pub retry: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            retry: true,
        }
    }
}

impl SendOptions {
    /// Sets the reply timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns NAK replies instead of retrying them.
    #[must_use]
    pub const fn no_retry(mut self) -> Self {
        self.retry = false;
        self
    }
}

type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct BridgeInner {
    writer: Mutex<Option<Writer>>,
    frames: EventDispatcher<Frame>,
    queue: RetryQueue,
    options: BridgeOptions,
    open: AtomicBool,
    read_task: StdMutex<Option<JoinHandle<()>>>,
}

impl Drop for BridgeInner {
    fn drop(&mut self) {
        let task = self
            .read_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}

/// Connection to a PowerLinc Modem.
///
/// Cloning is cheap; clones share the link.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Bridge {
    /// Opens the modem on a serial port with default options.
    ///
    /// # Errors
    ///
    /// Returns an error if the port cannot be opened.
    pub async fn open(path: &str) -> Result<Self> {
        Self::connect(SerialTransport::with_port(path), BridgeOptions::default()).await
    }

    /// Opens the modem over any transport.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport fails to open.
    pub async fn connect<T: Transport>(mut transport: T, options: BridgeOptions) -> Result<Self> {
        let stream = transport.open().await?;
        tracing::info!("bridge open on {}", transport.name());
        Ok(Self::from_stream(stream, options))
    }

    /// Runs the bridge over an already-open byte stream.
    ///
    /// Must be called from within a Tokio runtime; the reader task is
    /// spawned immediately.
    pub fn from_stream<S>(stream: S, options: BridgeOptions) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let frames = EventDispatcher::new(DEFAULT_CAPACITY);

        let read_frames = frames.clone();
        let read_task = tokio::spawn(async move {
            if let Err(e) = run_read_loop(reader, read_frames).await {
                tracing::error!("bridge read loop error: {}", e);
            }
        });

        let policy = RetryPolicy::new(options.retries, &[ErrorKind::CommandNotAcknowledged])
            .retry_delay(options.retry_delay);

        Self {
            inner: Arc::new(BridgeInner {
                writer: Mutex::new(Some(Box::new(writer))),
                frames,
                queue: RetryQueue::new(policy),
                options,
                open: AtomicBool::new(true),
                read_task: StdMutex::new(Some(read_task)),
            }),
        }
    }

    /// Returns the bridge options.
    #[must_use]
    pub fn options(&self) -> &BridgeOptions {
        &self.inner.options
    }

    /// True until [`Bridge::close`] is called or the stream ends.
    #[must_use]
    pub fn is_open(&self) -> bool {
        let reading = self
            .inner
            .read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|task| !task.is_finished());
        self.inner.open.load(Ordering::SeqCst) && reading
    }

    /// Closes the link. Closing twice is a no-op.
    ///
    /// Later sends fail with [`Error::NotConnected`].
    ///
    /// # Errors
    ///
    /// Returns an error if shutting down the stream fails.
    pub async fn close(&self) -> Result<()> {
        if !self.inner.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("closing bridge");

        let task = self
            .inner
            .read_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }

        let writer = self.inner.writer.lock().await.take();
        if let Some(mut writer) = writer {
            writer.shutdown().await?;
        }
        Ok(())
    }

    /// Subscribes to every decoded frame.
    #[must_use]
    pub fn subscribe(&self) -> Subscription<Frame> {
        self.inner.frames.subscribe()
    }

    /// Registers a wait for the next frame with `command`.
    ///
    /// Only frames decoded after this call are considered.
    pub fn match_frame(&self, command: Command, timeout: Duration) -> PendingMatch<Frame> {
        let command = command.as_byte();
        self.inner
            .frames
            .register(move |frame: &Frame| frame.command == command, timeout)
    }

    /// Sends a frame with default options and returns the ACK reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandNotAcknowledged`] once NAK retries are
    /// exhausted, or [`Error::Timeout`] if no reply arrives in time.
    pub async fn send(&self, frame: Frame) -> Result<Frame> {
        self.send_with(frame, SendOptions::default()).await
    }

    /// Sends a frame and returns the modem's reply.
    ///
    /// The call as a whole, queueing and retries included, is bounded by the
    /// timeout.
    ///
    /// # Errors
    ///
    /// See [`Bridge::send`]. With `retry` disabled a NAK is returned as a
    /// reply instead of an error.
    pub async fn send_with(&self, frame: Frame, options: SendOptions) -> Result<Frame> {
        let timeout = options.timeout.unwrap_or(self.inner.options.timeout);
        let command = frame.command;
        tracing::debug!(command = format_args!("0x{command:02x}"), "queueing frame");

        let frame = &frame;
        let unit = self.inner.queue.run(|attempt| async move {
            tracing::debug!(attempt, ?frame, "sending frame");

            let reply = self
                .inner
                .frames
                .register(move |f: &Frame| f.command == command, timeout);
            self.write_frame(frame).await?;
            let reply = reply.wait().await?;

            if reply.is_ack() {
                tracing::debug!(?reply, "frame ACK");
                return Ok(reply);
            }

            tracing::debug!(?reply, "frame NAK");
            if options.retry {
                Err(Error::CommandNotAcknowledged { command })
            } else {
                Ok(reply)
            }
        });

        tokio::time::timeout(timeout, unit)
            .await
            .map_err(|_| Error::timeout(timeout))?
    }

    async fn write_frame(&self, frame: &Frame) -> Result<()> {
        let bytes = frame.encode();
        let mut writer = self.inner.writer.lock().await;
        let writer = writer.as_mut().ok_or(Error::NotConnected)?;

        tracing::trace!("writing {}", hex::encode(&bytes));
        writer.write_all(&bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Reads the modem's address, category and firmware version.
    pub async fn get_info(&self) -> Result<BridgeInfo> {
        let reply = self.send(Frame::request(Command::GetInfo)).await?;
        match reply.payload {
            Payload::Info(info) => Ok(info),
            _ => Err(Error::UnexpectedPayload {
                command: reply.command,
            }),
        }
    }

    /// Reads the modem configuration.
    pub async fn get_config(&self) -> Result<BridgeConfig> {
        let reply = self.send(Frame::request(Command::GetConfig)).await?;
        match reply.payload {
            Payload::GetConfig(config) => Ok(config),
            _ => Err(Error::UnexpectedPayload {
                command: reply.command,
            }),
        }
    }

    /// Writes the modem configuration and returns it as re-read from the modem.
    pub async fn set_config(&self, config: BridgeConfig) -> Result<BridgeConfig> {
        self.send(Frame::new(Command::SetConfig, Payload::SetConfig(config)))
            .await?;
        self.get_config().await
    }

    /// Reads the configuration, applies `f`, writes it back and re-reads it.
    pub async fn update_config<F>(&self, f: F) -> Result<BridgeConfig>
    where
        F: FnOnce(&mut BridgeConfig),
    {
        let mut config = self.get_config().await?;
        f(&mut config);
        self.set_config(config).await
    }

    /// Puts the modem into all-linking mode.
    pub async fn start_all_linking(&self, mode: LinkingMode) -> Result<()> {
        self.send(Frame::new(
            Command::StartAllLinking,
            Payload::StartAllLinking(mode),
        ))
        .await?;
        Ok(())
    }

    /// Takes the modem out of all-linking mode.
    pub async fn cancel_all_linking(&self) -> Result<()> {
        self.send(Frame::request(Command::CancelAllLinking)).await?;
        Ok(())
    }

    /// Erases the modem's configuration and link database.
    pub async fn factory_reset(&self) -> Result<()> {
        self.send_with(
            Frame::request(Command::FactoryReset),
            SendOptions::default().timeout(FACTORY_RESET_TIMEOUT),
        )
        .await?;
        Ok(())
    }

    /// Reads the modem's link database.
    ///
    /// The modem NAKs get-first on an empty database and get-next after the
    /// last record.
    pub async fn all_link_database(&self) -> Result<Vec<AllLinkRecord>> {
        let timeout = self.inner.options.timeout;
        let mut records = Vec::new();
        let mut request = Command::GetFirstAllLink;

        loop {
            let record = self.match_frame(Command::AllLinkRecordResponse, timeout);
            let reply = self
                .send_with(Frame::request(request), SendOptions::default().no_retry())
                .await?;
            if !reply.is_ack() {
                break;
            }

            let frame = record.wait().await?;
            match frame.payload {
                Payload::AllLinkRecord(record) => records.push(record),
                _ => {
                    return Err(Error::UnexpectedPayload {
                        command: frame.command,
                    });
                }
            }
            request = Command::GetNextAllLink;
        }

        tracing::debug!("read {} link records", records.len());
        Ok(records)
    }
}

/// Reads from the modem and publishes decoded frames until the stream ends.
async fn run_read_loop<R>(mut reader: R, frames: EventDispatcher<Frame>) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut buffer = FrameBuffer::new();
    let mut buf = [0u8; 256];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => {
                tracing::debug!("bridge stream closed");
                return Err(Error::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "bridge stream closed",
                )));
            }
            Ok(n) => n,
            Err(e) => return Err(Error::Io(e)),
        };

        tracing::trace!("received {}", hex::encode(&buf[..n]));
        buffer.feed(&buf[..n]);

        loop {
            match buffer.decode() {
                Ok(Some(frame)) => {
                    tracing::debug!(?frame, "received frame");
                    frames.dispatch(frame);
                }
                Ok(None) => break,
                Err(e) => {
                    tracing::warn!("malformed frame: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeModem;

    const GET_INFO: &[u8] = &[0x02, 0x60];

    #[tokio::test(start_paused = true)]
    async fn test_get_info() {
        let (bridge, _modem) = FakeModem::new()
            .expect(GET_INFO, &[0x02, 0x60, 0xf1, 0xf2, 0xf3, 0x03, 0x15, 0x9e, 0x06])
            .bridge();

        let info = bridge.get_info().await.unwrap();
        assert_eq!(info.address.to_string(), "f1f2f3");
        assert_eq!(info.category, 0x03);
        assert_eq!(info.subcategory, 0x15);
        assert_eq!(info.firmware_version, 0x9e);
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_is_retried() {
        let (bridge, _modem) = FakeModem::new()
            .nak(&[0x02, 0x65])
            .nak(&[0x02, 0x65])
            .ack(&[0x02, 0x65])
            .bridge();

        bridge.cancel_all_linking().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_exhausts_retries() {
        let (bridge, _modem) = FakeModem::new()
            .nak(&[0x02, 0x65])
            .nak(&[0x02, 0x65])
            .bridge_with(BridgeOptions::default().retries(1));

        let err = bridge.cancel_all_linking().await.unwrap_err();
        assert!(matches!(
            err,
            Error::CommandNotAcknowledged { command: 0x65 }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nak_returned_without_retry() {
        let (bridge, modem) = FakeModem::new().nak(&[0x02, 0x69]).bridge();

        let reply = bridge
            .send_with(
                Frame::request(Command::GetFirstAllLink),
                SendOptions::default().no_retry(),
            )
            .await
            .unwrap();
        assert_eq!(reply.ack, Some(false));

        bridge.close().await.unwrap();
        assert!(modem.await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_times_out_and_unregisters() {
        let (bridge, _modem) = FakeModem::new().expect(GET_INFO, &[]).bridge();

        let err = bridge
            .send_with(
                Frame::request(Command::GetInfo),
                SendOptions::default().timeout(Duration::from_millis(1)),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Timeout { timeout_ms: 1 }));
        assert_eq!(bridge.inner.frames.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_sends_do_not_overlap() {
        let (bridge, _modem) = FakeModem::new()
            .ack(&[0x02, 0x65])
            .ack(&[0x02, 0x67])
            .bridge();

        let first = bridge.cancel_all_linking();
        let second = bridge.factory_reset();
        let (first, second) = tokio::join!(first, second);
        first.unwrap();
        second.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_config_rereads() {
        let (bridge, _modem) = FakeModem::new()
            .expect(&[0x02, 0x73], &[0x02, 0x73, 0x00, 0x00, 0x00, 0x06])
            .ack(&[0x02, 0x6b, 0x20])
            .expect(&[0x02, 0x73], &[0x02, 0x73, 0x20, 0x00, 0x00, 0x06])
            .bridge();

        let config = bridge
            .update_config(|config| config.monitor_mode = true)
            .await
            .unwrap();
        assert!(config.monitor_mode);
        assert!(!config.automatic_linking);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_link_database() {
        let record_a = [0x02, 0x57, 0xe2, 0x01, 0xaa, 0xbb, 0xcc, 0x01, 0x20, 0x41];
        let record_b = [0x02, 0x57, 0xa2, 0x00, 0x11, 0x22, 0x33, 0x02, 0x2a, 0x45];

        let (bridge, _modem) = FakeModem::new()
            .ack(&[0x02, 0x69])
            .push(&record_a)
            .ack(&[0x02, 0x6a])
            .push(&record_b)
            .nak(&[0x02, 0x6a])
            .bridge();

        let records = bridge.all_link_database().await.unwrap();
        assert_eq!(records.len(), 2);
        assert!(records[0].controller);
        assert_eq!(records[0].group, 1);
        assert_eq!(records[0].address.to_string(), "aabbcc");
        assert!(!records[1].controller);
        assert_eq!(records[1].link_data, [0x02, 0x2a, 0x45]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_all_link_database() {
        let (bridge, _modem) = FakeModem::new().nak(&[0x02, 0x69]).bridge();
        assert!(bridge.all_link_database().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reply_with_trailing_bytes() {
        let (bridge, _modem) = FakeModem::new()
            .expect(GET_INFO, &[0x02, 0x60, 0xf1, 0xf2, 0xf3, 0x03, 0x15, 0x9e, 0xaa, 0xbb, 0x06])
            .bridge();

        let info = bridge.get_info().await.unwrap();
        assert_eq!(info.address.to_string(), "f1f2f3");
        assert_eq!(info.firmware_version, 0x9e);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_frame_does_not_stop_reader() {
        let mut malformed = vec![0x02, 0x62, 0xaa, 0xbb, 0xcc, 0x1f, 0x2f, 0x00];
        malformed.extend_from_slice(&[0xee; 15]);

        let (bridge, _modem) = FakeModem::new()
            .push(&malformed)
            .expect(GET_INFO, &[0x02, 0x60, 0x01, 0x02, 0x03, 0x01, 0x02, 0x03, 0x06])
            .bridge();

        let info = bridge.get_info().await.unwrap();
        assert_eq!(info.address.to_string(), "010203");
        assert!(bridge.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_close() {
        let (bridge, _modem) = FakeModem::new().bridge();
        assert!(bridge.is_open());

        bridge.close().await.unwrap();
        bridge.close().await.unwrap();
        assert!(!bridge.is_open());

        let err = bridge.get_info().await.unwrap_err();
        assert!(matches!(err, Error::NotConnected));
    }

    #[tokio::test(start_paused = true)]
    async fn test_subscribe_sees_spontaneous_frames() {
        let (bridge, _modem) = FakeModem::new()
            .push(&[0x02, 0x53, 0x01, 0x01, 0xaa, 0xbb, 0xcc, 0x02, 0x2a, 0x45])
            .bridge();
        let mut frames = bridge.subscribe();
        let completed = bridge.match_frame(Command::AllLinkingCompleted, Duration::from_secs(1));

        let frame = frames.recv().await.unwrap();
        assert_eq!(frame.kind(), Some(Command::AllLinkingCompleted));
        assert_eq!(frame.ack, None);
        assert_eq!(completed.wait().await.unwrap(), frame);
    }
}
