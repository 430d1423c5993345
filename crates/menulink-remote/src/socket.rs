//! TCP client socket connector.

use std::net::TcpStream;

use crate::config::SocketEndpoint;
use crate::error::RemoteError;
use crate::transport::{ChannelConnector, ChannelPair, READ_POLL_INTERVAL};

/// Connects to a device listening on a TCP port.
pub struct SocketConnector {
    endpoint: SocketEndpoint,
}

impl SocketConnector {
    /// Create a connector for the given host and port.
    pub fn new(endpoint: SocketEndpoint) -> Self {
        SocketConnector { endpoint }
    }
}

impl ChannelConnector for SocketConnector {
    fn connect(&self) -> Result<ChannelPair, RemoteError> {
        let stream = TcpStream::connect((self.endpoint.host.as_str(), self.endpoint.port))?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(READ_POLL_INTERVAL))?;
        let writer = stream.try_clone()?;

        Ok(ChannelPair {
            reader: Box::new(stream),
            writer: Box::new(writer),
        })
    }

    fn description(&self) -> String {
        format!("tcp {}:{}", self.endpoint.host, self.endpoint.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_description() {
        let connector = SocketConnector::new(SocketEndpoint {
            host: "192.168.0.96".to_string(),
            port: 3333,
        });
        assert_eq!(connector.description(), "tcp 192.168.0.96:3333");
    }

    #[test]
    fn test_connect_to_listener() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let connector = SocketConnector::new(SocketEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        });
        let pair = connector.connect().expect("connect should succeed");
        drop(pair);
        drop(listener);
    }

    #[test]
    fn test_refused_connection_is_transport_error() {
        // bind-then-drop gives a port nothing is listening on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let connector = SocketConnector::new(SocketEndpoint {
            host: addr.ip().to_string(),
            port: addr.port(),
        });
        assert!(matches!(
            connector.connect(),
            Err(RemoteError::Transport(_))
        ));
    }
}
