//! Serial transport.
//!
//! PowerLinc Modems speak 19200 baud, 8 data bits, no parity, one stop bit
//! and no flow control.

use futures::future::BoxFuture;
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};

use crate::error::{Error, Result};
use crate::transport::Transport;

/// Default baud rate for PowerLinc Modems.
pub const DEFAULT_BAUD_RATE: u32 = 19_200;

/// Configuration for serial transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM3").
    pub port: String,
    /// Baud rate.
    pub baud_rate: u32,
}

impl SerialConfig {
    /// Creates a new serial configuration with default settings.
    #[must_use]
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
        }
    }

    /// Sets the baud rate.
    #[must_use]
    pub const fn baud_rate(mut self, rate: u32) -> Self {
        self.baud_rate = rate;
        self
    }
}

/// Serial port transport.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    config: SerialConfig,
}

impl SerialTransport {
    /// Creates a new serial transport with the given configuration.
    #[must_use]
    pub const fn new(config: SerialConfig) -> Self {
        Self { config }
    }

    /// Creates a new serial transport for the given port with default settings.
    #[must_use]
    pub fn with_port(port: impl Into<String>) -> Self {
        Self::new(SerialConfig::new(port))
    }

    /// Returns the configuration.
    #[must_use]
    pub const fn config(&self) -> &SerialConfig {
        &self.config
    }
}

impl Transport for SerialTransport {
    type Stream = SerialStream;

    fn open(&mut self) -> BoxFuture<'_, Result<SerialStream>> {
        Box::pin(async move {
            tracing::info!("opening serial port: {}", self.config.port);

            let stream = tokio_serial::new(&self.config.port, self.config.baud_rate)
                .data_bits(DataBits::Eight)
                .parity(Parity::None)
                .stop_bits(StopBits::One)
                .flow_control(FlowControl::None)
                .open_native_async()
                .map_err(Error::Serial)?;

            tracing::info!("opened serial port");
            Ok(stream)
        })
    }

    fn name(&self) -> &str {
        &self.config.port
    }
}

/// Lists available serial ports.
///
/// # Errors
///
/// Returns an error if the port list cannot be retrieved.
pub fn list_ports() -> Result<Vec<String>> {
    let ports = tokio_serial::available_ports().map_err(Error::Serial)?;
    Ok(ports.into_iter().map(|p| p.port_name).collect())
}
