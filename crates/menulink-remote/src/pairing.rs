//! One-shot pairing flow.
//!
//! Pairing uses a short-lived connection that exists only to register the
//! local identity with the device's authenticator; it is never reused for
//! operational traffic. Concurrent pairing attempts against the same
//! device are not coordinated here - the caller serializes them.

use std::time::Duration;

use crossbeam_channel::bounded;
use tracing::info;

use menulink_protocol::{ConnectMode, LocalIdentifier};

use crate::config::ConnectorConfig;
use crate::connection::{ConnectionEvent, RemoteConnector};
use crate::error::RemoteError;
use crate::scheduler::TickScheduler;
use crate::transport::ChannelConnector;

/// Result of a pairing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    /// The device accepted and persisted our identity.
    Accepted,
    /// The device refused the request.
    Rejected,
    /// No verdict arrived within the allowed time.
    TimedOut,
}

/// Run the single-shot pairing handshake against a device.
///
/// Opens the channel in pairing mode, sends the pairing request, waits a
/// bounded time for the device's verdict, and always stops the connector
/// before returning.
pub fn pair_remote(
    channel: Box<dyn ChannelConnector>,
    identity: LocalIdentifier,
    scheduler: &TickScheduler,
    timeout: Duration,
) -> Result<PairingOutcome, RemoteError> {
    let config = ConnectorConfig::new(identity).with_mode(ConnectMode::PairingConnection);
    let connector = RemoteConnector::new(channel, config, scheduler)?;

    let (verdict_tx, verdict_rx) = bounded::<bool>(1);
    let subscription = connector.add_connection_listener(move |event| match event {
        ConnectionEvent::PairingAccepted => {
            let _ = verdict_tx.try_send(true);
        }
        ConnectionEvent::PairingRejected | ConnectionEvent::AuthenticationFailed => {
            let _ = verdict_tx.try_send(false);
        }
        _ => {}
    });

    connector.start();
    let outcome = match verdict_rx.recv_timeout(timeout) {
        Ok(true) => PairingOutcome::Accepted,
        Ok(false) => PairingOutcome::Rejected,
        Err(_) => PairingOutcome::TimedOut,
    };

    subscription.unsubscribe();
    connector.stop();
    info!(?outcome, "pairing attempt finished");
    Ok(outcome)
}
