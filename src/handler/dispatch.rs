//! Routing of decoded inbound frames.
//!
//! Order for every frame: address filter, pending-request match, then
//! subscribers. A need-ack frame nobody claims is answered with an empty
//! acknowledgment on `command + 1`.

use std::sync::Arc;

use super::pending::{Completion, PendingTable};
use super::registry::SubscriberRegistry;
use crate::error::Result;
use crate::protocol::{address, reply_code, Frame};
use crate::writer::{OutboundFrame, WriterHandle};

/// What happened to a dispatched frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// Not addressed to this host; dropped.
    Filtered,
    /// Completed the pending request.
    Completed,
    /// A subscriber claimed the frame.
    Claimed,
    /// Nobody claimed it and an acknowledgment was queued.
    Acked,
    /// Nobody claimed it and no acknowledgment was requested.
    Unclaimed,
}

/// Which frames the host accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressFilter {
    /// Our own address.
    pub host: u8,
    /// The only source we accept frames from.
    pub pmu: u8,
}

impl AddressFilter {
    /// Whether `frame` comes from the PMU and is meant for this host.
    #[inline]
    pub fn accepts(&self, frame: &Frame) -> bool {
        frame.source() == self.pmu
            && (frame.dest() == self.host
                || frame.dest() == address::HOST_BROADCAST
                || frame.dest() == address::ALL)
    }
}

impl Default for AddressFilter {
    fn default() -> Self {
        Self {
            host: address::HOST,
            pmu: address::PMU,
        }
    }
}

/// Routes frames from the read loop.
#[derive(Clone)]
pub struct Dispatcher {
    filter: AddressFilter,
    pending: PendingTable,
    subscribers: Arc<SubscriberRegistry>,
    writer: WriterHandle,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        filter: AddressFilter,
        pending: PendingTable,
        subscribers: Arc<SubscriberRegistry>,
        writer: WriterHandle,
    ) -> Self {
        Self {
            filter,
            pending,
            subscribers,
            writer,
        }
    }

    /// Route one decoded frame.
    ///
    /// # Errors
    ///
    /// Only fails if an acknowledgment is due and the writer task is gone.
    pub async fn dispatch(&self, frame: &Frame) -> Result<Dispatched> {
        if !self.filter.accepts(frame) {
            tracing::trace!(
                "ignoring frame 0x{:04X} from 0x{:02X} to 0x{:02X}",
                frame.frame_id(),
                frame.source(),
                frame.dest()
            );
            return Ok(Dispatched::Filtered);
        }

        match self.pending.try_complete(frame) {
            Completion::Completed => return Ok(Dispatched::Completed),
            Completion::Duplicate => {
                tracing::debug!(
                    "late or duplicate reply: frame 0x{:04X} command 0x{:02X}",
                    frame.frame_id(),
                    frame.command()
                );
            }
            Completion::NoMatch => {}
        }

        if self.subscribers.notify(frame).is_handled() {
            return Ok(Dispatched::Claimed);
        }

        if !frame.need_ack() {
            return Ok(Dispatched::Unclaimed);
        }

        let ack = OutboundFrame::empty(
            self.filter.host,
            frame.source(),
            frame.frame_id(),
            reply_code(frame.command()),
            false,
        );
        tracing::debug!(
            "auto-ack: frame 0x{:04X} command 0x{:02X}",
            frame.frame_id(),
            ack.command()
        );
        self.writer.submit(ack).await?;
        Ok(Dispatched::Acked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Notify;
    use crate::protocol::{decode_frame, encode_frame, Decoded, FOOT_SIZE, HEAD_SIZE};
    use crate::writer::spawn_writer_task_default;
    use tokio::io::{duplex, AsyncReadExt, DuplexStream};

    fn frame(source: u8, dest: u8, frame_id: u16, command: u16, need_ack: bool) -> Frame {
        let bytes = encode_frame(source, dest, frame_id, command, &[1, 2], need_ack).unwrap();
        match decode_frame(&bytes) {
            Decoded::Frame(f) => f,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn dispatcher() -> (Dispatcher, DuplexStream) {
        let (client, server) = duplex(4096);
        let (writer, _task) = spawn_writer_task_default(client);
        let dispatcher = Dispatcher::new(
            AddressFilter::default(),
            PendingTable::new(),
            Arc::new(SubscriberRegistry::new()),
            writer,
        );
        (dispatcher, server)
    }

    #[test]
    fn test_address_filter() {
        let filter = AddressFilter::default();
        assert!(filter.accepts(&frame(address::PMU, address::HOST, 1, 7, false)));
        assert!(filter.accepts(&frame(address::PMU, address::HOST_BROADCAST, 1, 7, false)));
        assert!(filter.accepts(&frame(address::PMU, address::ALL, 1, 7, false)));
        assert!(!filter.accepts(&frame(address::PMU, 0x02, 1, 7, false)));
        assert!(!filter.accepts(&frame(0x82, address::HOST, 1, 7, false)));
        assert!(!filter.accepts(&frame(address::PMU, address::PMU_BROADCAST, 1, 7, false)));
    }

    #[tokio::test]
    async fn test_foreign_frame_filtered() {
        let (d, _server) = dispatcher();
        let f = frame(0x42, address::HOST, 1, 0x07, true);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Filtered);
    }

    #[tokio::test]
    async fn test_pending_match_wins() {
        let (d, _server) = dispatcher();
        d.subscribers.subscribe(|_: u16, _: &Frame| Notify::Handled);
        let (_guard, rx) = d.pending.install(5, 0x03, 0x04);

        let f = frame(address::PMU, address::HOST, 5, 0x04, false);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Completed);
        assert_eq!(rx.await.unwrap().payload(), &[1, 2]);
    }

    #[tokio::test]
    async fn test_claimed_frame_not_acked() {
        let (d, _server) = dispatcher();
        d.subscribers
            .subscribe_command(0x07, |_: u16, _: &Frame| Notify::Handled);

        let f = frame(address::PMU, address::HOST, 9, 0x07, true);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Claimed);
    }

    #[tokio::test]
    async fn test_unclaimed_need_ack_is_acked() {
        let (d, mut server) = dispatcher();

        let f = frame(address::PMU, address::HOST, 0x0102, 0x0D, true);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Acked);

        let mut buf = [0u8; HEAD_SIZE + FOOT_SIZE];
        server.read_exact(&mut buf).await.unwrap();
        match decode_frame(&buf) {
            Decoded::Frame(ack) => {
                assert_eq!(ack.frame_id(), 0x0102);
                assert_eq!(ack.command(), 0x0E);
                assert_eq!(ack.source(), address::HOST);
                assert_eq!(ack.dest(), address::PMU);
                assert!(ack.payload().is_empty());
                assert!(!ack.need_ack());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unclaimed_without_ack() {
        let (d, _server) = dispatcher();
        let f = frame(address::PMU, address::HOST, 1, 0x07, false);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Unclaimed);
    }

    #[tokio::test]
    async fn test_duplicate_reply_reaches_subscribers() {
        let (d, _server) = dispatcher();
        d.subscribers
            .subscribe_command(0x04, |_: u16, _: &Frame| Notify::Handled);
        let (_guard, _rx) = d.pending.install(5, 0x03, 0x04);

        let f = frame(address::PMU, address::HOST, 5, 0x04, false);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Completed);
        assert_eq!(d.dispatch(&f).await.unwrap(), Dispatched::Claimed);
    }
}
