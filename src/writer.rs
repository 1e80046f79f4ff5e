//! Dedicated writer task that owns the transport's write half.
//!
//! Every frame reaches the serial line through one mpsc channel, so a
//! frame's head, body and foot are always written as one unit and never
//! interleaved with another task's frame.
//!
//! # Architecture
//!
//! ```text
//! execute() ─┐
//! send()    ─┼─► mpsc::Sender<Outbound> ─► Writer Task ─► serial port
//! auto-ack  ─┘
//! ```
//!
//! Callers that need the write result (`execute`, `send`) attach a one-shot
//! channel and wait for it; the receive path only enqueues.

use std::io::IoSlice;

use bytes::Bytes;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{PmuError, Result};
use crate::protocol::{checksum, encode_parts, Footer, Header, FOOT_SIZE, HEAD_SIZE, MAX_BODY_SIZE};

/// Default channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum frames to batch in a single write operation.
const MAX_BATCH_SIZE: usize = 16;

/// A frame ready to be written to the serial line.
#[derive(Debug, Clone)]
pub struct OutboundFrame {
    /// Pre-encoded head (9 bytes).
    pub head: [u8; HEAD_SIZE],
    /// Body bytes (empty for heartbeats and acks).
    pub body: Bytes,
    /// Pre-encoded foot (4 bytes).
    pub foot: [u8; FOOT_SIZE],
}

impl OutboundFrame {
    /// Encode a frame.
    ///
    /// # Errors
    ///
    /// Returns [`PmuError::PayloadTooLarge`] if `body` does not fit.
    pub fn new(
        source: u8,
        dest: u8,
        frame_id: u16,
        command: u16,
        body: Bytes,
        need_ack: bool,
    ) -> Result<Self> {
        let (head, foot) = encode_parts(source, dest, frame_id, command, &body, need_ack).ok_or(
            PmuError::PayloadTooLarge {
                size: body.len(),
                max: MAX_BODY_SIZE,
            },
        )?;
        Ok(Self { head, body, foot })
    }

    /// Encode a frame with an empty body.
    pub fn empty(source: u8, dest: u8, frame_id: u16, command: u16, need_ack: bool) -> Self {
        let head = Header::new(source, dest, frame_id, command, 0).encode();
        let foot = Footer {
            need_ack,
            crc16: checksum(&head, &[], need_ack),
        }
        .encode();
        Self {
            head,
            body: Bytes::new(),
            foot,
        }
    }

    /// Total size of this frame on the wire.
    #[inline]
    pub fn size(&self) -> usize {
        HEAD_SIZE + self.body.len() + FOOT_SIZE
    }

    /// Frame id stored in the head.
    #[inline]
    pub fn frame_id(&self) -> u16 {
        u16::from_le_bytes([self.head[3], self.head[4]])
    }

    /// Command stored in the head.
    #[inline]
    pub fn command(&self) -> u16 {
        u16::from_le_bytes([self.head[7], self.head[8]])
    }

    /// Copy the frame into one contiguous buffer.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        buf.extend_from_slice(&self.head);
        buf.extend_from_slice(&self.body);
        buf.extend_from_slice(&self.foot);
        buf
    }
}

/// A queued frame plus the optional completion channel.
struct Outbound {
    frame: OutboundFrame,
    done: Option<oneshot::Sender<Result<()>>>,
}

/// Configuration for the writer task.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Channel capacity for the frame queue.
    pub channel_capacity: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Handle for sending frames to the writer task.
///
/// This is cheaply cloneable and shared by callers and the receive path.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<Outbound>,
}

impl WriterHandle {
    /// Write a frame and wait until it has been flushed to the transport.
    ///
    /// # Errors
    ///
    /// [`PmuError::Transport`] if the write failed, or
    /// [`PmuError::ConnectionClosed`] if the writer task is gone.
    pub async fn write(&self, frame: OutboundFrame) -> Result<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Outbound {
                frame,
                done: Some(done_tx),
            })
            .await
            .map_err(|_| PmuError::ConnectionClosed)?;
        done_rx.await.map_err(|_| PmuError::ConnectionClosed)?
    }

    /// Queue a frame without waiting for the write to happen.
    pub async fn submit(&self, frame: OutboundFrame) -> Result<()> {
        self.tx
            .send(Outbound { frame, done: None })
            .await
            .map_err(|_| PmuError::ConnectionClosed)
    }

    /// Check whether the writer task has stopped.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Spawn the writer task and return a handle for sending frames.
///
/// # Returns
///
/// A tuple of `(WriterHandle, JoinHandle)` where the JoinHandle resolves
/// once every handle is dropped or a write fails.
pub fn spawn_writer_task<W>(
    writer: W,
    config: WriterConfig,
) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
    let task = tokio::spawn(writer_loop(rx, writer));
    (WriterHandle { tx }, task)
}

/// Spawn the writer task with default configuration.
pub fn spawn_writer_task_default<W>(writer: W) -> (WriterHandle, JoinHandle<Result<()>>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    spawn_writer_task(writer, WriterConfig::default())
}

/// Main writer loop - receives frames and writes them out in batches.
async fn writer_loop<W>(mut rx: mpsc::Receiver<Outbound>, mut writer: W) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        let first = match rx.recv().await {
            Some(f) => f,
            None => return Ok(()),
        };

        let mut batch = Vec::with_capacity(MAX_BATCH_SIZE);
        batch.push(first);
        while batch.len() < MAX_BATCH_SIZE {
            match rx.try_recv() {
                Ok(outbound) => batch.push(outbound),
                Err(_) => break,
            }
        }

        let result = {
            let frames: Vec<&OutboundFrame> = batch.iter().map(|o| &o.frame).collect();
            write_batch(&mut writer, &frames).await
        };
        match result {
            Ok(()) => {
                for outbound in batch {
                    if let Some(done) = outbound.done {
                        let _ = done.send(Ok(()));
                    }
                }
            }
            Err(e) => {
                tracing::error!("serial write failed: {}", e);
                let kind = e.kind();
                let message = e.to_string();
                for outbound in batch {
                    if let Some(done) = outbound.done {
                        let _ = done.send(Err(PmuError::Transport(std::io::Error::new(
                            kind,
                            message.clone(),
                        ))));
                    }
                }
                return Err(PmuError::Transport(e));
            }
        }
    }
}

/// Write a batch of frames using scatter/gather I/O.
async fn write_batch<W>(writer: &mut W, batch: &[&OutboundFrame]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let total_size: usize = batch.iter().map(|f| f.size()).sum();
    let mut total_written = 0;

    while total_written < total_size {
        let slices = build_remaining_slices(batch, total_written);
        let written = writer.write_vectored(&slices).await?;
        if written == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "write_vectored returned 0",
            ));
        }
        total_written += written;
    }

    writer.flush().await
}

/// Build IoSlice array for the data left after `skip_bytes` were written.
fn build_remaining_slices<'a>(batch: &[&'a OutboundFrame], skip_bytes: usize) -> Vec<IoSlice<'a>> {
    let mut slices = Vec::with_capacity(batch.len() * 3);
    let mut offset = 0;

    for frame in batch {
        for part in [&frame.head[..], &frame.body[..], &frame.foot[..]] {
            let start = offset;
            let end = offset + part.len();
            offset = end;
            if part.is_empty() || skip_bytes >= end {
                continue;
            }
            slices.push(IoSlice::new(&part[skip_bytes.saturating_sub(start)..]));
        }
    }

    slices
}
