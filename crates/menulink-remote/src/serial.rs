//! Serial port connector.

use std::io;

use crate::config::SerialEndpoint;
use crate::error::RemoteError;
use crate::transport::{ChannelConnector, ChannelPair, READ_POLL_INTERVAL};

/// Connects over a serial port at 8N1.
pub struct SerialConnector {
    endpoint: SerialEndpoint,
}

impl SerialConnector {
    /// Create a connector for the given port and baud rate.
    pub fn new(endpoint: SerialEndpoint) -> Self {
        SerialConnector { endpoint }
    }
}

impl ChannelConnector for SerialConnector {
    fn connect(&self) -> Result<ChannelPair, RemoteError> {
        let port = serialport::new(&self.endpoint.port, self.endpoint.baud)
            .timeout(READ_POLL_INTERVAL)
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serialport::Parity::None)
            .open()
            .map_err(|e| RemoteError::Transport(io::Error::new(io::ErrorKind::Other, e)))?;

        let writer = port
            .try_clone()
            .map_err(|e| RemoteError::Transport(io::Error::new(io::ErrorKind::Other, e)))?;

        Ok(ChannelPair {
            reader: Box::new(port),
            writer: Box::new(writer),
        })
    }

    fn description(&self) -> String {
        format!("serial {}@{}", self.endpoint.port, self.endpoint.baud)
    }
}
