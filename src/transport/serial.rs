//! Byte-stream endpoints the link can run over.
//!
//! - [`SerialPort`]: a tty device node such as `/dev/ttyS4`
//! - [`connect_socket`]: a Unix socket, e.g. a PMU simulator or a
//!   `socat`-bridged serial line
//!
//! Line settings (115200 8N1, raw mode, no flow control) are expected to be
//! applied before opening, e.g. with `stty -F /dev/ttyS4 115200 raw -echo`.
//!
//! # Example
//!
//! ```no_run
//! use pcat_pmu::transport::SerialPort;
//!
//! # async fn demo() -> pcat_pmu::Result<()> {
//! let port = SerialPort::open("/dev/ttyS4").await?;
//! let pmu = pcat_pmu::Pmu::builder().start(port);
//! # Ok(())
//! # }
//! ```

use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

use crate::error::Result;

/// A tty device opened for reading and writing.
///
/// The device is opened twice so a read blocked on an idle line never
/// holds up a write.
pub struct SerialPort {
    reader: File,
    writer: File,
    path: PathBuf,
}

impl SerialPort {
    /// Open a device node.
    ///
    /// # Errors
    ///
    /// Returns [`PmuError::Transport`](crate::PmuError::Transport) if either
    /// handle cannot be opened.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = OpenOptions::new().read(true).open(path).await?;
        let writer = OpenOptions::new().write(true).open(path).await?;
        tracing::debug!("opened serial device {}", path.display());
        Ok(Self {
            reader,
            writer,
            path: path.to_path_buf(),
        })
    }

    /// Path of the device node.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AsyncRead for SerialPort {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.reader).poll_read(cx, buf)
    }
}

impl AsyncWrite for SerialPort {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        Pin::new(&mut self.writer).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<std::io::Result<()>> {
        Pin::new(&mut self.writer).poll_shutdown(cx)
    }
}

/// Connect to a Unix socket that speaks the PMU protocol.
#[cfg(unix)]
pub async fn connect_socket(path: impl AsRef<Path>) -> Result<tokio::net::UnixStream> {
    let stream = tokio::net::UnixStream::connect(path.as_ref()).await?;
    tracing::debug!("connected to {}", path.as_ref().display());
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PmuError;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pcat-pmu-{}-{}", std::process::id(), name))
    }

    #[tokio::test]
    async fn test_open_missing_device() {
        let err = SerialPort::open("/nonexistent/ttyPMU").await.err().unwrap();
        assert!(matches!(err, PmuError::Transport(_)));
    }

    #[tokio::test]
    async fn test_open_regular_file() {
        let path = temp_path("serial");
        std::fs::write(&path, [0xA5, 0x5A]).unwrap();

        let mut port = SerialPort::open(&path).await.unwrap();
        assert_eq!(port.path(), path.as_path());

        let mut buf = [0u8; 2];
        port.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf, [0xA5, 0x5A]);

        drop(port);
        let _ = std::fs::remove_file(&path);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_connect_socket() {
        let path = temp_path("sock");
        let _ = std::fs::remove_file(&path);
        let listener = tokio::net::UnixListener::bind(&path).unwrap();

        let client = tokio::spawn({
            let path = path.clone();
            async move {
                let mut stream = connect_socket(&path).await.unwrap();
                stream.write_all(b"ping").await.unwrap();
            }
        });

        let (mut server, _) = listener.accept().await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        client.await.unwrap();
        let _ = std::fs::remove_file(&path);
    }
}
