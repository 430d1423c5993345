//! The per-connector connection engine.
//!
//! One [`RemoteConnector`] owns one channel (serial, TCP or UDP) and runs
//! its whole lifecycle on a single background thread: connect with backoff,
//! handshake, then the framed read pump. Writes are accepted from any
//! caller thread and serialize under one lock; the shared [`TickScheduler`]
//! drives heartbeats, silence timeouts and correlation sweeps.
//!
//! State machine:
//!
//! ```text
//! DISCONNECTED --start()--> CONNECTING
//! CONNECTING --channel open--> HANDSHAKING
//! HANDSHAKING --join exchanged & (auth ok | pairing ok)--> JOINED
//! JOINED --heartbeat timeout | I/O error--> DISCONNECTED (reconnects)
//! any state --stop()--> DISCONNECTED (terminal)
//! ```
//!
//! Only JOINED forwards application commands to listeners; commands that
//! arrive in any other state are discarded with a logged warning.

use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::Rng;
use tracing::{debug, info, trace, warn};

use menulink_protocol::{
    AckStatus, ConnectMode, CorrelationId, HeartbeatMode, LocalIdentifier, MenuCommand,
    ProtocolError, ProtocolPipeline, RemoteInformation,
};

use crate::config::{ConnectorConfig, CORRELATION_TIMEOUT_MULTIPLIER, HEARTBEAT_TIMEOUT_MULTIPLIER};
use crate::correlation::CorrelationTracker;
use crate::error::RemoteError;
use crate::scheduler::{TickScheduler, TickTarget};
use crate::transport::ChannelConnector;

/// Delay before the first reconnect attempt; doubles up to the cap.
const INITIAL_RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Upper bound on the reconnect backoff.
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(30);
/// Consecutive decrypt failures that escalate to a disconnect.
const MAX_DECRYPT_FAILURES: u32 = 3;

/// Connector lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No channel open.
    Disconnected,
    /// Opening the channel.
    Connecting,
    /// Channel open, join or pairing exchange in progress.
    Handshaking,
    /// Handshake complete; application commands flow.
    Joined,
}

/// Events delivered to connection listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The lifecycle state changed.
    StateChanged {
        /// State before the transition.
        previous: ConnectionState,
        /// State after the transition.
        current: ConnectionState,
    },
    /// The remote party identified itself.
    RemoteInformation(RemoteInformation),
    /// The remote refused our join credentials. Terminal for this start.
    AuthenticationFailed,
    /// The remote accepted our pairing request.
    PairingAccepted,
    /// The remote refused our pairing request. Terminal for this start.
    PairingRejected,
}

type CommandListener = Arc<dyn Fn(&MenuCommand) + Send + Sync>;
type ConnectionListener = Arc<dyn Fn(&ConnectionEvent) + Send + Sync>;

enum ListenerKind {
    Command,
    Connection,
}

struct Listeners {
    next_id: AtomicU64,
    commands: Mutex<Vec<(u64, CommandListener)>>,
    connection: Mutex<Vec<(u64, ConnectionListener)>>,
}

impl Listeners {
    fn new() -> Self {
        Listeners {
            next_id: AtomicU64::new(1),
            commands: Mutex::new(Vec::new()),
            connection: Mutex::new(Vec::new()),
        }
    }
}

/// Handle returned by listener registration; dropping it keeps the
/// listener, calling [`Subscription::unsubscribe`] removes it.
pub struct Subscription {
    id: u64,
    kind: ListenerKind,
    listeners: Weak<Listeners>,
}

impl Subscription {
    /// Remove the listener this subscription refers to.
    pub fn unsubscribe(self) {
        if let Some(listeners) = self.listeners.upgrade() {
            match self.kind {
                ListenerKind::Command => {
                    listeners.commands.lock().retain(|(id, _)| *id != self.id)
                }
                ListenerKind::Connection => {
                    listeners.connection.lock().retain(|(id, _)| *id != self.id)
                }
            }
        }
    }
}

/// How one session (connect to disconnect) ended.
enum PumpExit {
    /// `stop()` was requested.
    Stopped,
    /// The handshake was rejected; terminal until restarted by the caller.
    Rejected,
    /// The liveness check declared the session dead.
    SessionDead,
    /// The channel failed.
    Io(io::Error),
}

struct ConnectorShared {
    config: ConnectorConfig,
    channel: Box<dyn ChannelConnector>,
    state: Mutex<ConnectionState>,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
    listeners: Arc<Listeners>,
    correlation: CorrelationTracker,
    remote: Mutex<Option<RemoteInformation>>,
    last_rx: Mutex<Instant>,
    last_tx: Mutex<Instant>,
    stopped: AtomicBool,
    session_dead: AtomicBool,
}

impl ConnectorShared {
    fn set_state(&self, new: ConnectionState) {
        let previous = {
            let mut state = self.state.lock();
            if *state == new {
                return;
            }
            let previous = *state;
            *state = new;
            previous
        };
        info!(?previous, current = ?new, endpoint = %self.channel.description(), "connection state changed");
        self.notify_connection(&ConnectionEvent::StateChanged {
            previous,
            current: new,
        });
    }

    fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    fn reset_timers(&self) {
        let now = Instant::now();
        *self.last_rx.lock() = now;
        *self.last_tx.lock() = now;
    }

    fn notify_command(&self, command: &MenuCommand) {
        let snapshot: Vec<CommandListener> = self
            .listeners
            .commands
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(command);
        }
    }

    fn notify_connection(&self, event: &ConnectionEvent) {
        let snapshot: Vec<ConnectionListener> = self
            .listeners
            .connection
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    /// Encode, encrypt, frame and write one command under the write lock.
    fn write_command(&self, command: &MenuCommand) -> Result<(), RemoteError> {
        let mut payload = command.encode()?;
        if let Some(key) = &self.config.encryption {
            payload = key.encrypt(&payload)?;
        }
        let frame = menulink_protocol::encode_frame(&payload)?;

        let mut guard = self.writer.lock();
        let writer = guard.as_mut().ok_or(RemoteError::NotConnected)?;
        let result = writer.write_all(&frame).and_then(|_| writer.flush());
        drop(guard);

        match result {
            Ok(()) => {
                *self.last_tx.lock() = Instant::now();
                Ok(())
            }
            Err(e) => {
                // reads and writes fail together; let the pump tear down
                self.session_dead.store(true, Ordering::Relaxed);
                Err(RemoteError::Transport(e))
            }
        }
    }

    /// The opening message for the configured connect mode.
    fn hello_command(&self) -> MenuCommand {
        match self.config.mode {
            ConnectMode::FullyAuthenticated => {
                MenuCommand::join(self.config.identity.clone())
            }
            ConnectMode::PairingConnection => MenuCommand::PairingRequest {
                identity: self.config.identity.clone(),
            },
        }
    }

    /// Handle one decoded command. Returns the session exit when the
    /// command ends the session.
    fn dispatch(&self, command: &MenuCommand) -> Option<PumpExit> {
        let state = self.state();
        let kind = command.type_code();
        trace!(kind = %String::from_utf8_lossy(&kind), ?state, "command received");

        match command {
            MenuCommand::Heartbeat { mode, .. } => match mode {
                HeartbeatMode::Start => {
                    // the peer asks us to restart the exchange
                    if let Err(e) = self.write_command(&self.hello_command()) {
                        warn!("failed to answer heartbeat start: {}", e);
                    }
                    None
                }
                HeartbeatMode::End => Some(PumpExit::Io(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "remote sent an end-of-session heartbeat",
                ))),
                HeartbeatMode::Normal => None,
            },

            MenuCommand::Join { identity, version, platform } => {
                if identity.uuid() == self.config.identity.uuid() {
                    // our own multicast echo
                    return None;
                }
                let info = RemoteInformation {
                    name: identity.name().to_string(),
                    version: *version,
                    platform: *platform,
                };
                debug!(name = %info.name, version = %info.version_string(), "remote identified itself");
                *self.remote.lock() = Some(info.clone());
                self.notify_connection(&ConnectionEvent::RemoteInformation(info));
                None
            }

            MenuCommand::Acknowledgement { correlation, code } => {
                if state == ConnectionState::Handshaking {
                    if code.is_error() {
                        match self.config.mode {
                            ConnectMode::FullyAuthenticated => {
                                warn!(code = ?code, "join refused by remote");
                                self.notify_connection(&ConnectionEvent::AuthenticationFailed);
                            }
                            ConnectMode::PairingConnection => {
                                warn!(code = ?code, "pairing refused by remote");
                                self.notify_connection(&ConnectionEvent::PairingRejected);
                            }
                        }
                        Some(PumpExit::Rejected)
                    } else {
                        if self.config.mode == ConnectMode::PairingConnection {
                            self.notify_connection(&ConnectionEvent::PairingAccepted);
                        }
                        self.set_state(ConnectionState::Joined);
                        None
                    }
                } else {
                    self.correlation.resolve(AckStatus {
                        correlation: *correlation,
                        code: *code,
                    });
                    if state == ConnectionState::Joined {
                        self.notify_command(command);
                    }
                    None
                }
            }

            MenuCommand::PairingRequest { identity } => {
                warn!(from = %identity, "ignoring pairing request; this side is not an authenticator");
                None
            }

            // bootstrap markers, boot items and value changes
            _ => {
                if state == ConnectionState::Joined {
                    self.notify_command(command);
                } else {
                    warn!(kind = %String::from_utf8_lossy(&kind), ?state,
                        "discarding application command outside the joined state");
                }
                None
            }
        }
    }
}

impl TickTarget for ConnectorShared {
    fn on_tick(&self, now: Instant) {
        let state = self.state();

        // heartbeat when the outbound side has been idle for one interval
        if state == ConnectionState::Joined {
            let idle = now.duration_since(*self.last_tx.lock());
            if idle >= self.config.heartbeat_interval {
                let heartbeat = MenuCommand::heartbeat(
                    self.config.heartbeat_interval.as_millis() as u32,
                    HeartbeatMode::Normal,
                );
                if let Err(e) = self.write_command(&heartbeat) {
                    warn!("heartbeat write failed: {}", e);
                }
            }
        }

        // silence beyond the multiplier declares the connection dead; this
        // only flags and transitions, the pump does the teardown
        if matches!(state, ConnectionState::Joined | ConnectionState::Handshaking) {
            let silent = now.duration_since(*self.last_rx.lock());
            if silent >= self.config.heartbeat_interval * HEARTBEAT_TIMEOUT_MULTIPLIER {
                warn!(
                    silent_ms = silent.as_millis() as u64,
                    endpoint = %self.channel.description(),
                    "no traffic within the heartbeat window, declaring connection dead"
                );
                self.session_dead.store(true, Ordering::Relaxed);
                self.set_state(ConnectionState::Disconnected);
            }
        }

        self.correlation.sweep(now);
    }
}

/// A live command channel to one remote device.
pub struct RemoteConnector {
    shared: Arc<ConnectorShared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl RemoteConnector {
    /// Create a connector over the given channel.
    ///
    /// Fails fast if the configuration is invalid. The connector registers
    /// with the scheduler immediately but opens no channel until
    /// [`RemoteConnector::start`].
    pub fn new(
        channel: Box<dyn ChannelConnector>,
        config: ConnectorConfig,
        scheduler: &TickScheduler,
    ) -> Result<Self, RemoteError> {
        config.validate()?;
        let correlation_timeout = config.heartbeat_interval * CORRELATION_TIMEOUT_MULTIPLIER;
        let now = Instant::now();
        let shared = Arc::new(ConnectorShared {
            config,
            channel,
            state: Mutex::new(ConnectionState::Disconnected),
            writer: Mutex::new(None),
            listeners: Arc::new(Listeners::new()),
            correlation: CorrelationTracker::new(correlation_timeout),
            remote: Mutex::new(None),
            last_rx: Mutex::new(now),
            last_tx: Mutex::new(now),
            stopped: AtomicBool::new(true),
            session_dead: AtomicBool::new(false),
        });
        scheduler.register(Arc::downgrade(&shared) as Weak<dyn TickTarget>);

        Ok(RemoteConnector {
            shared,
            thread: Mutex::new(None),
        })
    }

    /// The local identity this connector presents.
    pub fn identity(&self) -> &LocalIdentifier {
        &self.shared.config.identity
    }

    /// Start the background connection thread. A no-op while running.
    ///
    /// After a handshake rejection or a [`RemoteConnector::stop`] the
    /// connector is terminal; call `stop()` (to reap the finished thread)
    /// followed by `start()` to re-initiate.
    pub fn start(&self) {
        let mut guard = self.thread.lock();
        if guard.is_some() {
            return;
        }
        self.shared.stopped.store(false, Ordering::Relaxed);
        self.shared.session_dead.store(false, Ordering::Relaxed);

        let shared = Arc::clone(&self.shared);
        *guard = Some(thread::spawn(move || run_connection_loop(shared)));
    }

    /// Stop the connector: terminal, idempotent, resolves everything
    /// outstanding with a connection-closed status.
    pub fn stop(&self) {
        self.shared.stopped.store(true, Ordering::Relaxed);

        // orderly goodbye if a session is up; best effort only
        if self.shared.state() == ConnectionState::Joined {
            let goodbye = MenuCommand::heartbeat(
                self.shared.config.heartbeat_interval.as_millis() as u32,
                HeartbeatMode::End,
            );
            if let Err(e) = self.shared.write_command(&goodbye) {
                debug!("end-of-session heartbeat not sent: {}", e);
            }
        }
        self.shared.session_dead.store(true, Ordering::Relaxed);

        let handle = self.thread.lock().take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }

        self.shared.correlation.drain(menulink_protocol::AckCode::ConnectionClosed);
        self.shared.set_state(ConnectionState::Disconnected);
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Block until the connector joins, the handshake is rejected, or the
    /// timeout elapses.
    ///
    /// A convenience for callers that start up synchronously; ongoing
    /// lifecycle changes after the join still arrive via listeners.
    pub fn wait_for_join(&self, timeout: Duration) -> Result<(), RemoteError> {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        let subscription = self.add_connection_listener(move |event| {
            let _ = event_tx.send(event.clone());
        });

        let result = (|| {
            if self.shared.state() == ConnectionState::Joined {
                return Ok(());
            }
            let deadline = Instant::now() + timeout;
            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    return Err(RemoteError::Timeout("join".to_string()));
                }
                match event_rx.recv_timeout(remaining) {
                    Ok(ConnectionEvent::StateChanged {
                        current: ConnectionState::Joined,
                        ..
                    }) => return Ok(()),
                    Ok(ConnectionEvent::AuthenticationFailed) => {
                        return Err(RemoteError::AuthRejected)
                    }
                    Ok(ConnectionEvent::PairingRejected) => {
                        return Err(RemoteError::PairingRejected)
                    }
                    Ok(_) => continue,
                    Err(_) => return Err(RemoteError::Timeout("join".to_string())),
                }
            }
        })();

        subscription.unsubscribe();
        result
    }

    /// What the remote reported about itself, once joined.
    pub fn remote_information(&self) -> Option<RemoteInformation> {
        self.shared.remote.lock().clone()
    }

    /// Send a command on the joined connection.
    ///
    /// If the command carries a non-empty correlation id it is tracked (so
    /// the invariant that every sent id resolves exactly once holds even
    /// without a caller callback) and returned; fire-and-forget commands
    /// return the empty id.
    pub fn send_command(&self, command: &MenuCommand) -> Result<CorrelationId, RemoteError> {
        self.send_command_with_ack(command, |_| {})
    }

    /// Send a command and invoke `on_ack` exactly once with the eventual
    /// acknowledgement: the device's reply, a synthetic timeout, or a
    /// connection-closed status.
    pub fn send_command_with_ack(
        &self,
        command: &MenuCommand,
        on_ack: impl FnOnce(AckStatus) + Send + 'static,
    ) -> Result<CorrelationId, RemoteError> {
        if self.shared.state() != ConnectionState::Joined {
            return Err(RemoteError::NotConnected);
        }
        let correlation = command.correlation().unwrap_or(CorrelationId::EMPTY);

        // register before the write so the reply cannot race past us
        if !correlation.is_empty() {
            self.shared.correlation.track(correlation, on_ack);
        }
        match self.shared.write_command(command) {
            Ok(()) => Ok(correlation),
            Err(e) => {
                if !correlation.is_empty() {
                    self.shared.correlation.cancel(correlation);
                }
                Err(e)
            }
        }
    }

    /// Number of commands still waiting for an acknowledgement.
    pub fn outstanding_correlations(&self) -> usize {
        self.shared.correlation.outstanding()
    }

    /// Register a listener for application commands (boot items, value
    /// changes, bootstrap markers, forwarded acknowledgements).
    ///
    /// Listeners run on the read thread and must not block; hand long
    /// work off to another thread.
    pub fn add_command_listener(
        &self,
        listener: impl Fn(&MenuCommand) + Send + Sync + 'static,
    ) -> Subscription {
        let listeners = &self.shared.listeners;
        let id = listeners.next_id.fetch_add(1, Ordering::Relaxed);
        listeners.commands.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            kind: ListenerKind::Command,
            listeners: Arc::downgrade(listeners),
        }
    }

    /// Register a listener for connection lifecycle events.
    pub fn add_connection_listener(
        &self,
        listener: impl Fn(&ConnectionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let listeners = &self.shared.listeners;
        let id = listeners.next_id.fetch_add(1, Ordering::Relaxed);
        listeners.connection.lock().push((id, Arc::new(listener)));
        Subscription {
            id,
            kind: ListenerKind::Connection,
            listeners: Arc::downgrade(listeners),
        }
    }
}

impl Drop for RemoteConnector {
    fn drop(&mut self) {
        self.shared.stopped.store(true, Ordering::Relaxed);
        self.shared.session_dead.store(true, Ordering::Relaxed);
        // the thread notices within one read poll and exits on its own
    }
}

/// The connector's background thread: connect, handshake, pump, repeat.
fn run_connection_loop(shared: Arc<ConnectorShared>) {
    let mut backoff = INITIAL_RECONNECT_DELAY;

    while !shared.stopped.load(Ordering::Relaxed) {
        shared.session_dead.store(false, Ordering::Relaxed);
        shared.set_state(ConnectionState::Connecting);

        let pair = match shared.channel.connect() {
            Ok(pair) => pair,
            Err(e) => {
                warn!(endpoint = %shared.channel.description(), "connect failed: {}", e);
                shared.set_state(ConnectionState::Disconnected);
                if !sleep_backoff(&shared, &mut backoff) {
                    break;
                }
                continue;
            }
        };

        info!(endpoint = %shared.channel.description(), "channel open");
        *shared.writer.lock() = Some(pair.writer);
        shared.reset_timers();
        shared.set_state(ConnectionState::Handshaking);

        if let Err(e) = shared.write_command(&shared.hello_command()) {
            warn!("handshake send failed: {}", e);
        }

        let exit = run_read_pump(&shared, pair.reader);

        *shared.writer.lock() = None;
        shared.correlation.drain(menulink_protocol::AckCode::ConnectionClosed);
        let was_joined = shared.state() == ConnectionState::Joined;
        shared.set_state(ConnectionState::Disconnected);

        match exit {
            PumpExit::Stopped => break,
            PumpExit::Rejected => {
                // closed, not retried; the caller must re-initiate
                shared.stopped.store(true, Ordering::Relaxed);
                break;
            }
            PumpExit::SessionDead => {
                debug!("session torn down by liveness check or stop request");
            }
            PumpExit::Io(e) => {
                warn!(endpoint = %shared.channel.description(), "session ended: {}", e);
            }
        }

        if was_joined {
            backoff = INITIAL_RECONNECT_DELAY;
        }
        if !sleep_backoff(&shared, &mut backoff) {
            break;
        }
    }

    shared.set_state(ConnectionState::Disconnected);
}

/// Read frames until the session ends, decoding and dispatching each.
fn run_read_pump(shared: &ConnectorShared, mut reader: Box<dyn Read + Send>) -> PumpExit {
    let mut pipeline = ProtocolPipeline::new(shared.config.encryption.clone());
    let mut buf = [0u8; 2048];
    let mut decrypt_failures = 0u32;

    loop {
        if shared.stopped.load(Ordering::Relaxed) {
            return PumpExit::Stopped;
        }
        if shared.session_dead.load(Ordering::Relaxed) {
            return PumpExit::SessionDead;
        }

        match reader.read(&mut buf) {
            Ok(0) if shared.channel.stream_oriented() => {
                return PumpExit::Io(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "peer closed the channel",
                ));
            }
            Ok(0) => continue,
            Ok(n) => {
                *shared.last_rx.lock() = Instant::now();
                pipeline.feed(&buf[..n]);
                loop {
                    match pipeline.try_decode() {
                        Ok(Some(command)) => {
                            decrypt_failures = 0;
                            if let Some(exit) = shared.dispatch(&command) {
                                return exit;
                            }
                        }
                        Ok(None) => break,
                        Err(ProtocolError::Encryption(reason)) => {
                            decrypt_failures += 1;
                            warn!(
                                failures = decrypt_failures,
                                "dropping message that failed to decrypt: {}", reason
                            );
                            if decrypt_failures >= MAX_DECRYPT_FAILURES {
                                return PumpExit::Io(io::Error::new(
                                    io::ErrorKind::InvalidData,
                                    "repeated decrypt failures, likely key mismatch",
                                ));
                            }
                        }
                        Err(e) => {
                            // one bad message; framing of the rest is intact
                            warn!("dropping undecodable message: {}", e);
                        }
                    }
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
                ) =>
            {
                continue;
            }
            Err(e) => return PumpExit::Io(e),
        }
    }
}

/// Sleep the current backoff in small slices, watching the stop flag.
/// Returns false when the connector should exit instead of retrying.
fn sleep_backoff(shared: &ConnectorShared, backoff: &mut Duration) -> bool {
    // jitter keeps a fleet of connectors from hammering a device in sync
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..250));
    let deadline = Instant::now() + *backoff + jitter;
    while Instant::now() < deadline {
        if shared.stopped.load(Ordering::Relaxed) {
            return false;
        }
        thread::sleep(Duration::from_millis(50));
    }
    *backoff = (*backoff * 2).min(MAX_RECONNECT_DELAY);
    true
}
