//! PMU link builder and runtime loop.
//!
//! The [`PmuBuilder`] collects link settings and starts the link. The
//! [`Pmu`] handle owns the lifecycle:
//! 1. Split the transport into read and write halves
//! 2. Spawn the writer task
//! 3. Spawn the read loop (reassembly, reply matching, notifications)
//! 4. Serve `execute`/`send` calls from any task
//!
//! # Example
//!
//! ```no_run
//! use pcat_pmu::{Command, Pmu};
//! use pcat_pmu::transport::SerialPort;
//!
//! #[tokio::main]
//! async fn main() -> pcat_pmu::Result<()> {
//!     let port = SerialPort::open("/dev/ttyS4").await?;
//!     let pmu = Pmu::builder().max_retries(3).start(port);
//!
//!     let info = pmu.initialize().await;
//!     println!("PMU firmware {:?}", info.firmware_version);
//!
//!     pmu.send(Command::Heartbeat, Vec::new()).await?;
//!     pmu.closed().await;
//!     Ok(())
//! }
//! ```

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::codec::{PayloadCodec, WatchdogTimeouts};
use crate::config::LinkConfig;
use crate::error::{PmuError, Result};
use crate::handler::{
    Dispatcher, PendingTable, Reply, Subscriber, SubscriberRegistry, SubscriptionId,
};
use crate::protocol::{reply_code, Command, Event, FrameBuffer, Malformed, RecoveryPolicy};
use crate::transport::Transport;
use crate::writer::{spawn_writer_task, OutboundFrame, WriterHandle};

/// Size of the read buffer handed to the transport.
const READ_CHUNK_SIZE: usize = 1024;

/// Buffer size used for version strings during bring-up.
pub const VERSION_BUFFER_SIZE: usize = 64;

/// Builder for configuring and starting a PMU link.
#[derive(Debug, Clone, Default)]
pub struct PmuBuilder {
    config: LinkConfig,
}

impl PmuBuilder {
    /// Create a builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a loaded configuration.
    pub fn with_config(config: LinkConfig) -> Self {
        Self { config }
    }

    /// Set the host address.
    ///
    /// Default: 0x01
    pub fn host_address(mut self, address: u8) -> Self {
        self.config.host_address = address;
        self
    }

    /// Set the PMU address.
    ///
    /// Default: 0x81
    pub fn pmu_address(mut self, address: u8) -> Self {
        self.config.pmu_address = address;
        self
    }

    /// Set how long each attempt waits for its reply.
    ///
    /// Default: 1 second
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.config.reply_timeout_ms = timeout.as_millis().min(u64::MAX as u128) as u64;
        self
    }

    /// Set the number of resends after the first write.
    ///
    /// Default: 3
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    /// Set the reassembly buffer capacity.
    ///
    /// Default: 8 KiB
    pub fn buffer_capacity(mut self, capacity: usize) -> Self {
        self.config.buffer_capacity = capacity;
        self
    }

    /// Set what the reassembly buffer drops after a malformed frame.
    pub fn recovery(mut self, policy: RecoveryPolicy) -> Self {
        self.config.recovery = policy;
        self
    }

    /// Set the writer channel capacity.
    ///
    /// Default: 64
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    /// The configuration collected so far.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Start the link over `transport`.
    ///
    /// Spawns the read loop and the writer task, so this must be called
    /// from within a Tokio runtime.
    pub fn start<T: Transport>(self, transport: T) -> Pmu {
        Pmu::start(self.config, transport)
    }
}

/// A synchronous request: one command, resent until its reply arrives.
#[derive(Debug, Clone)]
pub struct Request {
    command: u16,
    body: Bytes,
    expect: Option<u16>,
    frame_id: Option<u16>,
}

impl Request {
    /// Request `command` with an empty body.
    pub fn new(command: impl Into<u16>) -> Self {
        Self {
            command: command.into(),
            body: Bytes::new(),
            expect: None,
            frame_id: None,
        }
    }

    /// Set the body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Wait for a reply command other than `command + 1`.
    pub fn expect(mut self, command: impl Into<u16>) -> Self {
        self.expect = Some(command.into());
        self
    }

    /// Use a fixed frame id instead of a fresh one. Id 0 means fresh.
    pub fn frame_id(mut self, frame_id: u16) -> Self {
        self.frame_id = Some(frame_id);
        self
    }

    /// Request command code.
    #[inline]
    pub fn command(&self) -> u16 {
        self.command
    }

    /// Reply command this request waits for.
    #[inline]
    pub fn expected_reply(&self) -> u16 {
        self.expect.unwrap_or_else(|| reply_code(self.command))
    }
}

/// Version strings read during [`Pmu::initialize`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PmuInfo {
    /// Hardware version, if the PMU answered.
    pub hardware_version: Option<String>,
    /// Firmware version, if the PMU answered.
    pub firmware_version: Option<String>,
}

/// Wrapping frame id source that never yields 0.
#[derive(Debug, Default)]
struct FrameIds(AtomicU16);

impl FrameIds {
    fn next(&self) -> u16 {
        loop {
            let id = self.0.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
            if id != 0 {
                return id;
            }
        }
    }
}

struct Inner {
    config: LinkConfig,
    writer: WriterHandle,
    pending: PendingTable,
    subscribers: Arc<SubscriberRegistry>,
    /// Serializes whole `execute` calls.
    request_gate: tokio::sync::Mutex<()>,
    frame_ids: FrameIds,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
    read_task: Mutex<Option<JoinHandle<()>>>,
    writer_task: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Inner {
    fn abort_tasks(&self) {
        if let Some(task) = self.read_task.lock().unwrap_or_else(PoisonError::into_inner).take() {
            task.abort();
        }
        if let Some(task) = self
            .writer_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_tasks();
    }
}

/// A running PMU link.
///
/// Cheap to clone; every clone drives the same link. The link stops when
/// the transport reaches end of stream, on [`Pmu::shutdown`], or when the
/// last clone is dropped.
#[derive(Clone)]
pub struct Pmu {
    inner: Arc<Inner>,
}

impl Pmu {
    /// Create a new link builder.
    pub fn builder() -> PmuBuilder {
        PmuBuilder::new()
    }

    fn start<T: Transport>(config: LinkConfig, transport: T) -> Self {
        let (read_half, write_half) = tokio::io::split(transport);
        let (writer, writer_task) = spawn_writer_task(write_half, config.writer_config());

        let pending = PendingTable::new();
        let subscribers = Arc::new(SubscriberRegistry::new());
        let dispatcher = Dispatcher::new(
            config.address_filter(),
            pending.clone(),
            subscribers.clone(),
            writer.clone(),
        );
        let buffer = FrameBuffer::with_policy(config.buffer_capacity, config.recovery);

        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);

        let read_closed = closed_tx.clone();
        let read_pending = pending.clone();
        let read_task = tokio::spawn(async move {
            match read_loop(read_half, buffer, dispatcher).await {
                Ok(()) => tracing::debug!("PMU link reached end of stream"),
                Err(e) => tracing::error!("read loop error: {}", e),
            }
            read_closed.send_replace(true);
            read_pending.cancel();
        });

        Self {
            inner: Arc::new(Inner {
                config,
                writer,
                pending,
                subscribers,
                request_gate: tokio::sync::Mutex::new(()),
                frame_ids: FrameIds::default(),
                closed_tx,
                closed_rx,
                read_task: Mutex::new(Some(read_task)),
                writer_task: Mutex::new(Some(writer_task)),
            }),
        }
    }

    /// Link settings in effect.
    pub fn config(&self) -> &LinkConfig {
        &self.inner.config
    }

    /// Send a frame without waiting for a reply.
    ///
    /// Uses a fresh frame id and `need_ack = false`. Returns once the frame
    /// has been written.
    pub async fn send(&self, command: impl Into<u16>, body: impl Into<Bytes>) -> Result<()> {
        let inner = &self.inner;
        let frame = OutboundFrame::new(
            inner.config.host_address,
            inner.config.pmu_address,
            inner.frame_ids.next(),
            command.into(),
            body.into(),
            false,
        )?;
        tracing::trace!(
            "frame 0x{:04X} send cmd 0x{:02X}",
            frame.frame_id(),
            frame.command()
        );
        inner.writer.write(frame).await
    }

    /// Send a request and wait for its reply, resending on timeout.
    ///
    /// Concurrent calls queue; only one request is outstanding on the link
    /// at a time.
    ///
    /// # Errors
    ///
    /// - [`PmuError::Timeout`] after `1 + max_retries` unanswered writes
    /// - [`PmuError::Transport`] as soon as a write fails
    /// - [`PmuError::ConnectionClosed`] if the link goes down while waiting
    /// - [`PmuError::PayloadTooLarge`] if the body does not fit in a frame
    pub async fn execute(&self, request: Request) -> Result<Reply> {
        let inner = &self.inner;
        let _gate = inner.request_gate.lock().await;

        // Id 0 asks for a fresh one.
        let frame_id = request
            .frame_id
            .filter(|&id| id != 0)
            .unwrap_or_else(|| inner.frame_ids.next());
        let expect = request.expected_reply();
        let command = request.command;
        let frame = OutboundFrame::new(
            inner.config.host_address,
            inner.config.pmu_address,
            frame_id,
            command,
            request.body,
            true,
        )?;

        let (_pending, mut reply_rx) = inner.pending.install(frame_id, command, expect);
        if self.is_closed() {
            return Err(PmuError::ConnectionClosed);
        }

        tracing::debug!("frame 0x{:04X} execute cmd 0x{:02X}", frame_id, command);

        let attempts = inner.config.max_attempts();
        let timeout = inner.config.reply_timeout();
        for attempt in 1..=attempts {
            if let Err(e) = inner.writer.write(frame.clone()).await {
                tracing::error!(
                    "frame 0x{:04X} write 0x{:02X} cmd failed: {}",
                    frame_id,
                    command,
                    e
                );
                return Err(e);
            }

            match tokio::time::timeout(timeout, &mut reply_rx).await {
                Ok(Ok(reply)) => {
                    tracing::debug!(
                        "frame 0x{:04X} got response 0x{:02X}",
                        frame_id,
                        reply.command()
                    );
                    return Ok(reply);
                }
                Ok(Err(_)) => return Err(PmuError::ConnectionClosed),
                Err(_) if attempt < attempts => {
                    tracing::debug!(
                        "frame 0x{:04X} cmd 0x{:02X} no reply, retry {}",
                        frame_id,
                        command,
                        attempt
                    );
                }
                Err(_) => {}
            }
        }

        tracing::warn!("frame 0x{:04X} cmd 0x{:02X} timeout", frame_id, command);
        Err(PmuError::Timeout {
            frame_id,
            command,
            attempts,
        })
    }

    /// Send data and wait for the acknowledgment, discarding its body.
    pub async fn write_data(&self, command: impl Into<u16>, body: impl Into<Bytes>) -> Result<()> {
        self.execute(Request::new(command).body(body)).await.map(|_| ())
    }

    /// Send a single byte and wait for the acknowledgment.
    pub async fn write_u8(&self, command: impl Into<u16>, value: u8) -> Result<()> {
        self.write_data(command, vec![value]).await
    }

    /// Request a string.
    ///
    /// At most `capacity - 1` reply bytes are used and the string ends at
    /// the first NUL byte, as if copied into a C buffer of `capacity` bytes.
    pub async fn read_string(&self, command: impl Into<u16>, capacity: usize) -> Result<String> {
        let reply = self.execute(Request::new(command)).await?;
        let bytes = c_string_bytes(reply.payload(), capacity);
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Request a string into a caller buffer.
    ///
    /// The buffer is zeroed first and always stays NUL-terminated. Returns
    /// the string length in bytes.
    pub async fn read_string_into(&self, command: impl Into<u16>, buf: &mut [u8]) -> Result<usize> {
        buf.fill(0);
        let reply = self.execute(Request::new(command)).await?;
        let payload = reply.payload();
        let n = payload.len().min(buf.len().saturating_sub(1));
        buf[..n].copy_from_slice(&payload[..n]);
        Ok(c_string_bytes(payload, buf.len()).len())
    }

    /// Register a notification subscriber.
    pub fn subscribe<S: Subscriber>(&self, subscriber: S) -> SubscriptionId {
        self.inner.subscribers.subscribe(subscriber)
    }

    /// Register a subscriber that only sees `command` frames.
    pub fn subscribe_command<S: Subscriber>(
        &self,
        command: impl Into<u16>,
        subscriber: S,
    ) -> SubscriptionId {
        self.inner.subscribers.subscribe_command(command.into(), subscriber)
    }

    /// Remove a subscriber. Returns `false` if the handle was unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.subscribers.unsubscribe(id)
    }

    /// Bring the link up the way the PMU expects after boot.
    ///
    /// Disables the running watchdog, then reads the hardware and firmware
    /// version strings. Failed steps are logged and leave their field empty.
    pub async fn initialize(&self) -> PmuInfo {
        let disable = PayloadCodec::encode(&WatchdogTimeouts::disabled());
        if let Err(e) = self.write_data(Command::WatchdogTimeoutSet, disable).await {
            tracing::warn!("failed to disable PMU watchdog: {}", e);
        }

        let hardware_version = self.read_version(Command::HardwareVersionGet, "hardware").await;
        let firmware_version = self.read_version(Command::FirmwareVersionGet, "firmware").await;

        PmuInfo {
            hardware_version,
            firmware_version,
        }
    }

    async fn read_version(&self, command: Command, what: &str) -> Option<String> {
        match self.read_string(command, VERSION_BUFFER_SIZE).await {
            Ok(version) if !version.is_empty() => {
                tracing::debug!("PMU {} version: {}", what, version);
                Some(version)
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("failed to read PMU {} version: {}", what, e);
                None
            }
        }
    }

    /// Whether the read loop has stopped.
    pub fn is_closed(&self) -> bool {
        *self.inner.closed_rx.borrow()
    }

    /// Wait until the read loop stops.
    pub async fn closed(&self) {
        let mut rx = self.inner.closed_rx.clone();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Stop the link. Pending and later calls fail with `ConnectionClosed`.
    pub fn shutdown(&self) {
        self.inner.abort_tasks();
        self.inner.closed_tx.send_replace(true);
        self.inner.pending.cancel();
    }
}

/// The bytes a C caller would see after copying `payload` into a zeroed
/// buffer of `capacity` bytes.
fn c_string_bytes(payload: &[u8], capacity: usize) -> &[u8] {
    let limit = payload.len().min(capacity.saturating_sub(1));
    let bytes = &payload[..limit];
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    &bytes[..end]
}

/// Main read loop - reassembles frames and hands them to the dispatcher.
async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    mut buffer: FrameBuffer,
    dispatcher: Dispatcher,
) -> Result<()> {
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let n = match reader.read(&mut buf).await {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) => return Err(PmuError::Transport(e)),
        };

        let mut chunk = &buf[..n];
        while !chunk.is_empty() {
            let feed = buffer.push(chunk);
            chunk = &chunk[feed.consumed..];

            for event in feed.events {
                match event {
                    Event::Frame(frame) => {
                        dispatcher.dispatch(&frame).await?;
                    }
                    Event::Malformed(reason @ Malformed::CrcMismatch { .. }) => {
                        tracing::warn!("dropping frame: {}", reason);
                    }
                    Event::Malformed(reason) => {
                        tracing::debug!("dropping frame: {}", reason);
                    }
                    Event::Overflow { discarded } => {
                        tracing::warn!(
                            "reassembly buffer full, discarded {} bytes",
                            discarded
                        );
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = PmuBuilder::new();
        assert_eq!(builder.config(), &LinkConfig::default());
    }

    #[test]
    fn test_builder_configuration() {
        let builder = Pmu::builder()
            .host_address(0x02)
            .pmu_address(0x82)
            .reply_timeout(Duration::from_millis(250))
            .max_retries(5)
            .buffer_capacity(1024)
            .recovery(RecoveryPolicy::Resync)
            .channel_capacity(8);

        let config = builder.config();
        assert_eq!(config.host_address, 0x02);
        assert_eq!(config.pmu_address, 0x82);
        assert_eq!(config.reply_timeout_ms, 250);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.buffer_capacity, 1024);
        assert_eq!(config.recovery, RecoveryPolicy::Resync);
        assert_eq!(config.channel_capacity, 8);
    }

    #[test]
    fn test_request_defaults() {
        let request = Request::new(Command::HardwareVersionGet);
        assert_eq!(request.command(), 0x03);
        assert_eq!(request.expected_reply(), 0x04);

        let request = Request::new(0x0Fu16).expect(0x20u16).frame_id(9);
        assert_eq!(request.expected_reply(), 0x20);
        assert_eq!(request.frame_id, Some(9));
    }

    #[test]
    fn test_frame_ids_skip_zero() {
        let ids = FrameIds(AtomicU16::new(u16::MAX - 1));
        assert_eq!(ids.next(), u16::MAX);
        assert_eq!(ids.next(), 1);
        assert_eq!(ids.next(), 2);
    }

    #[test]
    fn test_frame_ids_start_at_one() {
        let ids = FrameIds::default();
        assert_eq!(ids.next(), 1);
    }

    #[test]
    fn test_c_string_bytes() {
        assert_eq!(c_string_bytes(b"v1.2.3", 64), b"v1.2.3");
        assert_eq!(c_string_bytes(b"v1.2.3", 4), b"v1.");
        assert_eq!(c_string_bytes(b"ab\0cd", 64), b"ab");
        assert_eq!(c_string_bytes(b"abc", 1), b"");
        assert_eq!(c_string_bytes(b"abc", 0), b"");
    }
}
