//! Transport module - the byte stream under the link.
//!
//! The link only needs an ordered, reliable byte stream. Anything that is
//! `AsyncRead + AsyncWrite` works: a tty device, a Unix socket, or
//! `tokio::io::duplex` in tests.

mod serial;

#[cfg(unix)]
pub use serial::connect_socket;
pub use serial::SerialPort;

use tokio::io::{AsyncRead, AsyncWrite};

/// A byte stream a [`Pmu`](crate::Pmu) link can run over.
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}
