//! # Serial Communication Module
//!
//! Handles the serial link to the appliance's IPB port.
//!
//! This module handles:
//! - Opening the serial port at the configured baud rate (8N1)
//! - Async read/write operations behind the [`Transport`] trait
//! - Flushing stale input when the bus is resynchronized

pub mod port_trait;

use async_trait::async_trait;
use std::io;
use std::time::Duration;
use tokio_serial::SerialPortBuilderExt;
use tracing::{debug, info, warn};

use crate::error::{IpbError, Result};
pub use port_trait::{TokioSerialPort, Transport};

/// Default IPB baud rate
pub const IPB_BAUD_RATE: u32 = 115_200;

/// Default device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyUSB0", // USB-to-serial adapters (most common for IPB taps)
    "/dev/ttyACM0", // USB CDC devices
];

/// IPB Serial Port Handler
///
/// Owns the serial connection to the appliance's inter-processor bus.
pub struct IpbSerial {
    /// Serial port handle
    port: TokioSerialPort,
    /// Device path (e.g., /dev/ttyUSB0)
    device_path: String,
}

impl std::fmt::Debug for IpbSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpbSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl IpbSerial {
    /// Open the first available default device at the IPB baud rate
    ///
    /// # Errors
    ///
    /// Returns error if no device could be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use ipb_bus::serial::IpbSerial;
    ///
    /// fn main() -> anyhow::Result<()> {
    ///     let serial = IpbSerial::open()?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open() -> Result<Self> {
        Self::open_with_paths(DEFAULT_DEVICE_PATHS, IPB_BAUD_RATE)
    }

    /// Open the first of `paths` that succeeds
    ///
    /// # Arguments
    ///
    /// * `paths` - Device paths to try (e.g., &["/dev/ttyUSB0"])
    /// * `baud_rate` - Line speed
    ///
    /// # Returns
    ///
    /// * `Result<IpbSerial>` - Connected serial port or error
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened IPB serial port at {} ({} baud)", path, baud_rate);
                    let mut serial = Self {
                        port: TokioSerialPort::new(port),
                        device_path: path.to_string(),
                    };
                    // Bytes queued before we attached are mid-frame garbage
                    serial.reset_input_buffer()?;
                    return Ok(serial);
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(IpbError::SerialPortNotFound(paths.join(", ")))
    }

    /// Open a specific serial port with IPB line settings
    fn open_port(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(Duration::from_millis(100))
            .open_native_async()
            .map_err(|e| IpbError::Serial(format!("Failed to open {}: {}", path, e)))?;

        Ok(port)
    }

    /// Get the device path of the opened serial port
    pub fn device_path(&self) -> &str {
        &self.device_path
    }
}

#[async_trait]
impl Transport for IpbSerial {
    async fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.port.read(buf).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        self.port.write_all(data).await?;
        debug!("Sent IPB frame ({} bytes)", data.len());
        Ok(())
    }

    async fn flush(&mut self) -> io::Result<()> {
        self.port.flush().await
    }

    fn reset_input_buffer(&mut self) -> io::Result<()> {
        self.port.reset_input_buffer()
    }
}
