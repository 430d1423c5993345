//! End-to-end session tests against a loopback TCP device stub.
//!
//! The stub speaks the real wire protocol over a listening socket: it
//! authenticates joins against an injected authenticator, answers value
//! changes with acknowledgements, streams a small bootstrap, and handles
//! pairing requests by writing to the authenticator's store.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::unbounded;
use parking_lot::RwLock;
use uuid::Uuid;

use menulink_protocol::{
    AckCode, ChangeType, CorrelationId, LocalIdentifier, MenuCommand, ProtocolPipeline,
};
use menulink_remote::{
    pair_remote, Authenticator, ConnectionEvent, ConnectionState, ConnectorConfig,
    ControllerEvent, FileAuthenticator, PairingOutcome, PreDefinedAuthenticator,
    RemoteConnector, RemoteMenuController, SocketConnector, SocketEndpoint, TickScheduler,
};
use menulink_tree::{AnalogItem, MenuTree, MenuValue};

const TEST_HEARTBEAT: Duration = Duration::from_millis(300);
const WAIT: Duration = Duration::from_secs(3);

fn send(stream: &mut TcpStream, pipeline: &ProtocolPipeline, command: &MenuCommand) {
    let bytes = pipeline.encode_command(command).expect("stub encode");
    let _ = stream.write_all(&bytes);
}

/// Spawn a single-connection device stub. Returns the address to dial.
fn spawn_device(auth: Arc<dyn Authenticator>) -> SocketAddr {
    spawn_device_with(auth, true)
}

/// Like [`spawn_device`], with control over whether the stub answers
/// heartbeats (a mute stub lets the liveness check trip).
fn spawn_device_with(auth: Arc<dyn Authenticator>, answer_heartbeats: bool) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();

    thread::spawn(move || {
        let (mut stream, _) = match listener.accept() {
            Ok(accepted) => accepted,
            Err(_) => return,
        };
        stream
            .set_read_timeout(Some(Duration::from_millis(100)))
            .unwrap();

        let mut pipeline = ProtocolPipeline::plaintext();
        let device_identity = LocalIdentifier::random("TestDevice");
        let mut buf = [0u8; 2048];
        let started = Instant::now();

        while started.elapsed() < Duration::from_secs(10) {
            let n = match stream.read(&mut buf) {
                Ok(0) => return,
                Ok(n) => n,
                Err(e)
                    if matches!(
                        e.kind(),
                        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                    ) =>
                {
                    continue
                }
                Err(_) => return,
            };
            pipeline.feed(&buf[..n]);

            while let Ok(Some(command)) = pipeline.try_decode() {
                match command {
                    MenuCommand::Join { identity, .. } => {
                        if auth.authenticate(identity.name(), &identity.uuid()) {
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::ack(CorrelationId::EMPTY, AckCode::Success),
                            );
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::join(device_identity.clone()),
                            );
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::Bootstrap {
                                    boot_type: menulink_protocol::BootType::Start,
                                },
                            );
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::AnalogBootItem {
                                    parent_id: 0,
                                    item: AnalogItem {
                                        id: 1,
                                        name: "Volume".to_string(),
                                        read_only: false,
                                        max_value: 255,
                                        offset: 0,
                                        divisor: 1,
                                        unit: "dB".to_string(),
                                    },
                                    current: 22,
                                },
                            );
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::Bootstrap {
                                    boot_type: menulink_protocol::BootType::End,
                                },
                            );
                        } else {
                            send(
                                &mut stream,
                                &pipeline,
                                &MenuCommand::ack(
                                    CorrelationId::EMPTY,
                                    AckCode::InvalidCredentials,
                                ),
                            );
                            return;
                        }
                    }

                    MenuCommand::PairingRequest { identity } => {
                        let stored = auth
                            .add_authentication(identity.name(), &identity.uuid())
                            .unwrap_or(false);
                        let code = if stored {
                            AckCode::Success
                        } else {
                            AckCode::InvalidCredentials
                        };
                        send(
                            &mut stream,
                            &pipeline,
                            &MenuCommand::ack(CorrelationId::EMPTY, code),
                        );
                        return;
                    }

                    MenuCommand::ChangeValue { correlation, .. } => {
                        send(
                            &mut stream,
                            &pipeline,
                            &MenuCommand::ack(correlation, AckCode::Success),
                        );
                    }

                    MenuCommand::Heartbeat { interval_ms, .. } if answer_heartbeats => {
                        send(
                            &mut stream,
                            &pipeline,
                            &MenuCommand::heartbeat(
                                interval_ms,
                                menulink_protocol::HeartbeatMode::Normal,
                            ),
                        );
                    }

                    _ => {}
                }
            }
        }
    });

    addr
}

fn socket_connector(addr: SocketAddr) -> Box<SocketConnector> {
    Box::new(SocketConnector::new(SocketEndpoint {
        host: addr.ip().to_string(),
        port: addr.port(),
    }))
}

fn test_config(uuid: Uuid, name: &str) -> ConnectorConfig {
    ConnectorConfig::new(LocalIdentifier::new(uuid, name))
        .with_heartbeat_interval(TEST_HEARTBEAT)
}

#[test]
fn test_scenario_a_authenticated_join_populates_tree() {
    let uuid = Uuid::new_v4();
    let auth = Arc::new(PreDefinedAuthenticator::new(vec![(
        "Tester".to_string(),
        uuid,
    )]));
    let addr = spawn_device(auth);

    let scheduler = TickScheduler::new();
    let tree = Arc::new(RwLock::new(MenuTree::new()));
    let controller = RemoteMenuController::new(
        socket_connector(addr),
        test_config(uuid, "Tester"),
        Arc::clone(&tree),
        &scheduler,
    )
    .unwrap();

    let (event_tx, event_rx) = unbounded();
    controller.register_listener(move |event| {
        let _ = event_tx.send(event.clone());
    });
    controller.start();

    let mut joined = false;
    let mut remote_name = None;
    let mut populated = false;
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline && !(joined && remote_name.is_some() && populated) {
        match event_rx.recv_timeout(WAIT) {
            Ok(ControllerEvent::ConnectionChange(ConnectionState::Joined)) => joined = true,
            Ok(ControllerEvent::RemoteInfo(info)) => remote_name = Some(info.name),
            Ok(ControllerEvent::TreeFullyPopulated) => populated = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    assert!(joined, "connector never reached the joined state");
    assert_eq!(remote_name.as_deref(), Some("TestDevice"));
    assert!(populated, "bootstrap never completed");
    {
        let tree = tree.read();
        assert_eq!(tree.item(1).map(|i| i.name()), Some("Volume"));
        assert_eq!(tree.value_of(1), Some(&MenuValue::Int(22)));
    }

    controller.stop();
    scheduler.shutdown();
}

#[test]
fn test_scenario_b_unknown_uuid_is_rejected() {
    // the authenticator knows a different uuid for this name
    let auth = Arc::new(PreDefinedAuthenticator::new(vec![(
        "Tester".to_string(),
        Uuid::new_v4(),
    )]));
    let addr = spawn_device(auth);

    let scheduler = TickScheduler::new();
    let connector = RemoteConnector::new(
        socket_connector(addr),
        test_config(Uuid::new_v4(), "Tester"),
        &scheduler,
    )
    .unwrap();

    let (event_tx, event_rx) = unbounded();
    let subscription = connector.add_connection_listener(move |event| {
        let _ = event_tx.send(event.clone());
    });
    connector.start();

    let mut rejected = false;
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline && !rejected {
        match event_rx.recv_timeout(WAIT) {
            Ok(ConnectionEvent::AuthenticationFailed) => rejected = true,
            Ok(ConnectionEvent::StateChanged { current, .. }) => {
                assert_ne!(current, ConnectionState::Joined, "rejected join must not reach joined");
            }
            Ok(_) => {}
            Err(_) => break,
        }
    }
    assert!(rejected, "no authentication failure was reported");
    assert_ne!(connector.state(), ConnectionState::Joined);

    subscription.unsubscribe();
    connector.stop();
    scheduler.shutdown();
}

#[test]
fn test_scenario_c_correlated_update_resolves() {
    let uuid = Uuid::new_v4();
    let auth = Arc::new(PreDefinedAuthenticator::new(vec![(
        "Tester".to_string(),
        uuid,
    )]));
    let addr = spawn_device(auth);

    let scheduler = TickScheduler::new();
    let connector = RemoteConnector::new(
        socket_connector(addr),
        test_config(uuid, "Tester"),
        &scheduler,
    )
    .unwrap();

    connector.start();
    connector.wait_for_join(WAIT).expect("session should join");

    let (ack_tx, ack_rx) = unbounded();
    let command = MenuCommand::ChangeValue {
        correlation: CorrelationId::new_random(),
        item_id: 1,
        change_type: ChangeType::Absolute,
        value: "42".to_string(),
    };
    let correlation = connector
        .send_command_with_ack(&command, move |ack| {
            let _ = ack_tx.send(ack);
        })
        .unwrap();
    assert!(!correlation.is_empty());

    let ack = ack_rx.recv_timeout(WAIT).expect("no acknowledgement arrived");
    assert_eq!(ack.correlation, correlation);
    assert!(!ack.is_error());
    assert_eq!(connector.outstanding_correlations(), 0);

    connector.stop();
    scheduler.shutdown();
}

#[test]
fn test_scenario_d_pairing_persists_one_entry() {
    let mut store = std::env::temp_dir();
    store.push(format!("menulink-pairing-{}.auth", std::process::id()));
    let _ = std::fs::remove_file(&store);

    let auth = Arc::new(FileAuthenticator::load(&store).unwrap());
    let addr = spawn_device(Arc::clone(&auth) as Arc<dyn Authenticator>);

    let scheduler = TickScheduler::new();
    let identity = LocalIdentifier::random("Pairing Tester");
    let outcome = pair_remote(
        socket_connector(addr),
        identity.clone(),
        &scheduler,
        WAIT,
    )
    .unwrap();
    assert_eq!(outcome, PairingOutcome::Accepted);

    // the store gained exactly one entry, visible to a fresh load
    let reloaded = FileAuthenticator::load(&store).unwrap();
    assert_eq!(reloaded.token_count(), 1);
    assert!(reloaded.authenticate(identity.name(), &identity.uuid()));

    scheduler.shutdown();
    let _ = std::fs::remove_file(&store);
}

#[test]
fn test_heartbeat_silence_disconnects() {
    let uuid = Uuid::new_v4();
    let auth = Arc::new(PreDefinedAuthenticator::new(vec![(
        "Tester".to_string(),
        uuid,
    )]));
    let addr = spawn_device_with(auth, false);

    let scheduler = TickScheduler::new();
    let connector = RemoteConnector::new(
        socket_connector(addr),
        test_config(uuid, "Tester"),
        &scheduler,
    )
    .unwrap();

    let (state_tx, state_rx) = unbounded();
    let subscription = connector.add_connection_listener(move |event| {
        if let ConnectionEvent::StateChanged { current, .. } = event {
            let _ = state_tx.send(*current);
        }
    });
    connector.start();

    // the stub answers the handshake but never sends heartbeats, so the
    // liveness check must declare the session dead
    let mut joined = false;
    let mut disconnected_after_join = false;
    let deadline = Instant::now() + Duration::from_secs(6);
    while Instant::now() < deadline && !disconnected_after_join {
        match state_rx.recv_timeout(Duration::from_secs(6)) {
            Ok(ConnectionState::Joined) => joined = true,
            Ok(ConnectionState::Disconnected) if joined => disconnected_after_join = true,
            Ok(_) => {}
            Err(_) => break,
        }
    }

    assert!(joined, "session never joined");
    assert!(
        disconnected_after_join,
        "silent link was not declared dead within the heartbeat window"
    );

    subscription.unsubscribe();
    connector.stop();
    scheduler.shutdown();
}

#[test]
fn test_send_before_join_is_refused() {
    let scheduler = TickScheduler::new();
    // nothing is listening; the connector stays disconnected
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = RemoteConnector::new(
        socket_connector(addr),
        test_config(Uuid::new_v4(), "Tester"),
        &scheduler,
    )
    .unwrap();

    let command = MenuCommand::ChangeValue {
        correlation: CorrelationId::new_random(),
        item_id: 1,
        change_type: ChangeType::Absolute,
        value: "1".to_string(),
    };
    assert!(connector.send_command(&command).is_err());
    assert_eq!(connector.outstanding_correlations(), 0);
    scheduler.shutdown();
}
