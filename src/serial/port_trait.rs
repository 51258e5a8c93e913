//! Trait abstraction for the byte transport under the IPB bus to enable testing

use async_trait::async_trait;
use std::io;
use tokio_serial::SerialPort;

/// Trait for transport I/O operations
#[async_trait]
pub trait Transport: Send {
    /// Read up to `buf.len()` bytes, waiting until at least one is available
    ///
    /// Returns `Ok(0)` at end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Discard bytes received but not yet read
    fn reset_input_buffer(&mut self) -> io::Result<()>;
}

/// Wrapper around tokio_serial::SerialStream that implements Transport
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self { port }
    }
}

#[async_trait]
impl Transport for TokioSerialPort {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use tokio::io::AsyncReadExt;
        self.port.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}
