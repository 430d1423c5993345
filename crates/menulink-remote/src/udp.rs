//! UDP multicast connector.
//!
//! Unlike the stream variants there is no connection to drop at the
//! transport level: liveness is purely heartbeat-based, and datagrams may
//! be lost, duplicated or reordered. Every datagram carries whole frames,
//! so a lost datagram never leaves the frame decoder mid-frame.

use std::io::{self, Read, Write};
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket};

use crate::config::UdpEndpoint;
use crate::error::RemoteError;
use crate::transport::{ChannelConnector, ChannelPair, READ_POLL_INTERVAL};

/// Joins a multicast group and exchanges frames as datagrams.
pub struct UdpConnector {
    endpoint: UdpEndpoint,
}

impl UdpConnector {
    /// Create a connector for the given multicast group.
    pub fn new(endpoint: UdpEndpoint) -> Self {
        UdpConnector { endpoint }
    }
}

struct UdpReader {
    socket: UdpSocket,
}

impl Read for UdpReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        loop {
            let (len, _peer) = self.socket.recv_from(buf)?;
            // skip empty datagrams rather than reporting end-of-stream
            if len > 0 {
                return Ok(len);
            }
        }
    }
}

struct UdpWriter {
    socket: UdpSocket,
    target: SocketAddrV4,
}

impl Write for UdpWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.socket.send_to(buf, self.target)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ChannelConnector for UdpConnector {
    fn connect(&self) -> Result<ChannelPair, RemoteError> {
        let socket = UdpSocket::bind(SocketAddrV4::new(
            Ipv4Addr::UNSPECIFIED,
            self.endpoint.port,
        ))?;
        socket.join_multicast_v4(&self.endpoint.group, &Ipv4Addr::UNSPECIFIED)?;
        socket.set_multicast_ttl_v4(u32::from(self.endpoint.ttl))?;
        socket.set_multicast_loop_v4(self.endpoint.loopback)?;
        socket.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        let reader_socket = socket.try_clone()?;
        Ok(ChannelPair {
            reader: Box::new(UdpReader {
                socket: reader_socket,
            }),
            writer: Box::new(UdpWriter {
                socket,
                target: SocketAddrV4::new(self.endpoint.group, self.endpoint.port),
            }),
        })
    }

    fn description(&self) -> String {
        format!("udp {}:{}", self.endpoint.group, self.endpoint.port)
    }

    fn stream_oriented(&self) -> bool {
        false
    }
}
