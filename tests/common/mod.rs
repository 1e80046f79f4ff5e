//! Simulated PMU on the far end of an in-memory serial line.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::time::Duration;

use pcat_pmu::protocol::{
    address, encode_frame, reply_code, Event, Frame, FrameBuffer, RecoveryPolicy,
    DEFAULT_BUFFER_CAPACITY,
};
use pcat_pmu::{Pmu, PmuBuilder};
use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};

pub struct FakePmu {
    stream: DuplexStream,
    buffer: FrameBuffer,
    queued: VecDeque<Frame>,
}

impl FakePmu {
    /// Start a link with default settings and return both ends.
    pub fn connect() -> (Pmu, FakePmu) {
        Self::connect_with(Pmu::builder())
    }

    pub fn connect_with(builder: PmuBuilder) -> (Pmu, FakePmu) {
        let (host, device) = duplex(64 * 1024);
        let pmu = builder.start(host);
        let fake = FakePmu {
            stream: device,
            // The host batches writes, so keep whatever follows a frame.
            buffer: FrameBuffer::with_policy(DEFAULT_BUFFER_CAPACITY, RecoveryPolicy::Resync),
            queued: VecDeque::new(),
        };
        (pmu, fake)
    }

    /// Next frame written by the host.
    pub async fn recv(&mut self) -> Frame {
        loop {
            if let Some(frame) = self.queued.pop_front() {
                return frame;
            }
            let mut buf = [0u8; 1024];
            let n = self.stream.read(&mut buf).await.unwrap();
            assert!(n > 0, "host closed the link");
            let mut chunk = &buf[..n];
            while !chunk.is_empty() {
                let feed = self.buffer.push(chunk);
                chunk = &chunk[feed.consumed..];
                for event in feed.events {
                    if let Event::Frame(frame) = event {
                        self.queued.push_back(frame);
                    }
                }
            }
        }
    }

    /// Next frame, or `None` if the host stays quiet for `wait`.
    pub async fn try_recv(&mut self, wait: Duration) -> Option<Frame> {
        tokio::time::timeout(wait, self.recv()).await.ok()
    }

    /// Read exactly `n` raw bytes.
    pub async fn recv_raw(&mut self, n: usize) -> Vec<u8> {
        let mut buf = vec![0u8; n];
        self.stream.read_exact(&mut buf).await.unwrap();
        buf
    }

    /// Send a frame from the PMU to the host.
    pub async fn send(&mut self, frame_id: u16, command: u16, body: &[u8], need_ack: bool) {
        let bytes = encode_frame(address::PMU, address::HOST, frame_id, command, body, need_ack)
            .unwrap();
        self.send_raw(&bytes).await;
    }

    /// Answer `request` with `body` on `command + 1`.
    pub async fn reply(&mut self, request: &Frame, body: &[u8]) {
        self.send(request.frame_id(), reply_code(request.command()), body, false)
            .await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).await.unwrap();
        self.stream.flush().await.unwrap();
    }

    /// Receive the next request and acknowledge it with an empty body.
    pub async fn ack_next(&mut self) -> Frame {
        let frame = self.recv().await;
        self.reply(&frame, &[]).await;
        frame
    }

    /// Drop the PMU end of the line.
    pub fn disconnect(self) {
        drop(self.stream);
    }
}
