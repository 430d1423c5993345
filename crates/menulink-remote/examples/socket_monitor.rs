//! Connect to a device over TCP and print menu updates as they arrive.
//!
//! Usage: socket_monitor <host> <port>

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use menulink_protocol::LocalIdentifier;
use menulink_remote::{
    ConnectorConfig, ControllerEvent, RemoteMenuController, SocketConnector, SocketEndpoint,
    TickScheduler,
};
use menulink_tree::MenuTree;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let host = args.next().unwrap_or_else(|| {
        eprintln!("usage: socket_monitor <host> <port>");
        std::process::exit(2);
    });
    let port: u16 = args
        .next()
        .and_then(|p| p.parse().ok())
        .unwrap_or_else(|| {
            eprintln!("usage: socket_monitor <host> <port>");
            std::process::exit(2);
        });

    let scheduler = TickScheduler::new();
    let tree = Arc::new(RwLock::new(MenuTree::new()));
    let controller = RemoteMenuController::new(
        Box::new(SocketConnector::new(SocketEndpoint { host, port })),
        ConnectorConfig::new(LocalIdentifier::random("socket-monitor")),
        Arc::clone(&tree),
        &scheduler,
    )
    .expect("configuration is valid");

    let event_tree = Arc::clone(&tree);
    controller.register_listener(move |event| match event {
        ControllerEvent::ItemChanged { id, .. } => {
            let tree = event_tree.read();
            if let Some(item) = tree.item(*id) {
                println!(
                    "{:>8} {} = {}",
                    item.kind_name(),
                    item.name(),
                    tree.value_of(*id).map(|v| v.to_string()).unwrap_or_default()
                );
            }
        }
        ControllerEvent::TreeFullyPopulated => println!("-- tree fully populated --"),
        ControllerEvent::ConnectionChange(state) => println!("-- connection: {:?} --", state),
        ControllerEvent::RemoteInfo(info) => {
            println!("-- remote: {} (v{}) --", info.name, info.version_string())
        }
        ControllerEvent::AckReceived(ack) => println!("-- ack {:?} --", ack.code),
    });

    controller.start();
    loop {
        std::thread::sleep(Duration::from_secs(60));
    }
}
