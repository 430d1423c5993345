//! The remote menu controller facade.
//!
//! Wires a [`RemoteConnector`] to an externally owned
//! [`menulink_tree::MenuTree`]: boot items and value changes coming off the
//! wire are applied to the tree (the controller is the tree's single
//! writer), and application-level events are fanned out to registered
//! listeners. Outbound, it mints correlation ids for value updates.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::warn;

use menulink_protocol::{
    AckStatus, BootType, ChangeType, CorrelationId, MenuCommand, RemoteInformation,
};
use menulink_tree::{MenuItem, MenuTree, MenuValue};

use crate::config::ConnectorConfig;
use crate::connection::{ConnectionEvent, ConnectionState, RemoteConnector, Subscription};
use crate::error::RemoteError;
use crate::scheduler::TickScheduler;
use crate::transport::ChannelConnector;

/// Events delivered to controller listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    /// An item definition or value changed.
    ItemChanged {
        /// The item id.
        id: u16,
        /// True when only the value changed, false when the item itself
        /// was added or replaced.
        value_only: bool,
    },
    /// The bootstrap stream completed; the tree now mirrors the device.
    TreeFullyPopulated,
    /// The connection lifecycle state changed.
    ConnectionChange(ConnectionState),
    /// The remote party identified itself.
    RemoteInfo(RemoteInformation),
    /// An acknowledgement arrived for a correlated command.
    AckReceived(AckStatus),
}

type ControllerListener = Arc<dyn Fn(&ControllerEvent) + Send + Sync>;

struct ControllerInner {
    tree: Arc<RwLock<MenuTree>>,
    listeners: Mutex<Vec<(u64, ControllerListener)>>,
    next_id: AtomicU64,
}

impl ControllerInner {
    fn emit(&self, event: &ControllerEvent) {
        let snapshot: Vec<ControllerListener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in snapshot {
            listener(event);
        }
    }

    fn handle_command(&self, command: &MenuCommand) {
        match command {
            MenuCommand::Bootstrap { boot_type } => match boot_type {
                BootType::Start => {
                    // fresh population replaces whatever we knew before
                    self.tree.write().clear();
                }
                BootType::End => self.emit(&ControllerEvent::TreeFullyPopulated),
            },

            MenuCommand::AnalogBootItem {
                parent_id,
                item,
                current,
            } => self.apply_boot_item(
                *parent_id,
                MenuItem::Analog(item.clone()),
                MenuValue::Int(*current),
            ),

            MenuCommand::BooleanBootItem {
                parent_id,
                item,
                current,
            } => self.apply_boot_item(
                *parent_id,
                MenuItem::Boolean(item.clone()),
                MenuValue::Bool(*current),
            ),

            MenuCommand::EnumBootItem {
                parent_id,
                item,
                current,
            } => self.apply_boot_item(
                *parent_id,
                MenuItem::Enumeration(item.clone()),
                MenuValue::Int(i32::from(*current)),
            ),

            MenuCommand::TextBootItem {
                parent_id,
                item,
                current,
            } => self.apply_boot_item(
                *parent_id,
                MenuItem::Text(item.clone()),
                MenuValue::Text(current.clone()),
            ),

            MenuCommand::FloatBootItem {
                parent_id,
                item,
                current,
            } => self.apply_boot_item(
                *parent_id,
                MenuItem::FloatingPoint(item.clone()),
                MenuValue::Float(f64::from(*current)),
            ),

            MenuCommand::SubMenuBootItem { parent_id, item } => {
                let id = item.id;
                let mut tree = self.tree.write();
                match tree.add_or_update(*parent_id, MenuItem::SubMenu(item.clone())) {
                    Ok(()) => {
                        drop(tree);
                        self.emit(&ControllerEvent::ItemChanged {
                            id,
                            value_only: false,
                        });
                    }
                    Err(e) => warn!(id, "dropping submenu boot item: {}", e),
                }
            }

            MenuCommand::ActionBootItem { parent_id, item } => {
                let id = item.id;
                let mut tree = self.tree.write();
                match tree.add_or_update(*parent_id, MenuItem::Action(item.clone())) {
                    Ok(()) => {
                        drop(tree);
                        self.emit(&ControllerEvent::ItemChanged {
                            id,
                            value_only: false,
                        });
                    }
                    Err(e) => warn!(id, "dropping action boot item: {}", e),
                }
            }

            MenuCommand::ChangeValue {
                item_id,
                change_type,
                value,
                ..
            } => self.apply_change(*item_id, *change_type, value),

            MenuCommand::Acknowledgement { correlation, code } => {
                self.emit(&ControllerEvent::AckReceived(AckStatus {
                    correlation: *correlation,
                    code: *code,
                }));
            }

            // join, heartbeat and pairing are consumed by the connector
            _ => {}
        }
    }

    fn apply_boot_item(&self, parent_id: u16, item: MenuItem, value: MenuValue) {
        let id = item.id();
        let mut tree = self.tree.write();
        let applied = tree
            .add_or_update(parent_id, item)
            .and_then(|_| tree.set_value(id, value));
        drop(tree);

        match applied {
            Ok(()) => self.emit(&ControllerEvent::ItemChanged {
                id,
                value_only: false,
            }),
            Err(e) => warn!(id, parent_id, "dropping boot item: {}", e),
        }
    }

    fn apply_change(&self, item_id: u16, change_type: ChangeType, value: &str) {
        let mut tree = self.tree.write();
        let new_value = match (change_type, tree.item(item_id)) {
            (_, None) => {
                warn!(item_id, "value change for unknown item");
                return;
            }
            (ChangeType::Absolute, Some(item)) => match parse_wire_value(item, value) {
                Some(v) => v,
                None => {
                    warn!(item_id, value, "undecodable absolute value change");
                    return;
                }
            },
            (ChangeType::Delta, Some(item)) => {
                let delta: i32 = match value.parse() {
                    Ok(d) => d,
                    Err(_) => {
                        warn!(item_id, value, "undecodable delta value change");
                        return;
                    }
                };
                match (item, tree.value_of(item_id)) {
                    (MenuItem::Analog(_) | MenuItem::Enumeration(_), Some(MenuValue::Int(current))) => {
                        MenuValue::Int(current + delta)
                    }
                    (MenuItem::Analog(_) | MenuItem::Enumeration(_), None) => MenuValue::Int(delta),
                    _ => {
                        warn!(item_id, "delta change on a non-integer item");
                        return;
                    }
                }
            }
        };

        // the item exists, so set_value cannot fail here
        let _ = tree.set_value(item_id, new_value);
        drop(tree);
        self.emit(&ControllerEvent::ItemChanged {
            id: item_id,
            value_only: true,
        });
    }
}

/// Parse an absolute wire value according to the item kind.
fn parse_wire_value(item: &MenuItem, value: &str) -> Option<MenuValue> {
    match item {
        MenuItem::Analog(_) | MenuItem::Enumeration(_) => {
            value.parse::<i32>().ok().map(MenuValue::Int)
        }
        MenuItem::Boolean(_) => match value {
            "0" => Some(MenuValue::Bool(false)),
            "1" => Some(MenuValue::Bool(true)),
            _ => None,
        },
        MenuItem::Text(_) => Some(MenuValue::Text(value.to_string())),
        MenuItem::FloatingPoint(_) => value.parse::<f64>().ok().map(MenuValue::Float),
        MenuItem::SubMenu(_) | MenuItem::Action(_) => None,
    }
}

/// Render a value in its wire form.
fn value_to_wire(value: &MenuValue) -> String {
    match value {
        MenuValue::Int(v) => v.to_string(),
        MenuValue::Bool(v) => if *v { "1" } else { "0" }.to_string(),
        MenuValue::Text(v) => v.clone(),
        MenuValue::Float(v) => v.to_string(),
    }
}

/// Facade over one connector, one tree and the application's listeners.
pub struct RemoteMenuController {
    connector: RemoteConnector,
    inner: Arc<ControllerInner>,
    _subscriptions: Vec<Subscription>,
}

impl RemoteMenuController {
    /// Wire a connector to the caller-owned tree.
    ///
    /// The tree stays owned by the caller; the controller only mutates its
    /// contents and never replaces the reference.
    pub fn new(
        channel: Box<dyn ChannelConnector>,
        config: ConnectorConfig,
        tree: Arc<RwLock<MenuTree>>,
        scheduler: &TickScheduler,
    ) -> Result<Self, RemoteError> {
        let connector = RemoteConnector::new(channel, config, scheduler)?;
        let inner = Arc::new(ControllerInner {
            tree,
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });

        let command_inner = Arc::clone(&inner);
        let command_sub =
            connector.add_command_listener(move |cmd| command_inner.handle_command(cmd));

        let event_inner = Arc::clone(&inner);
        let connection_sub = connector.add_connection_listener(move |event| match event {
            ConnectionEvent::StateChanged { current, .. } => {
                event_inner.emit(&ControllerEvent::ConnectionChange(*current));
            }
            ConnectionEvent::RemoteInformation(info) => {
                event_inner.emit(&ControllerEvent::RemoteInfo(info.clone()));
            }
            _ => {}
        });

        Ok(RemoteMenuController {
            connector,
            inner,
            _subscriptions: vec![command_sub, connection_sub],
        })
    }

    /// Start the underlying connector.
    pub fn start(&self) {
        self.connector.start();
    }

    /// Stop the underlying connector. Terminal and idempotent.
    pub fn stop(&self) {
        self.connector.stop();
    }

    /// The underlying connector, for state queries or raw sends.
    pub fn connector(&self) -> &RemoteConnector {
        &self.connector
    }

    /// The shared tree this controller populates.
    pub fn tree(&self) -> Arc<RwLock<MenuTree>> {
        Arc::clone(&self.inner.tree)
    }

    /// Register a listener for controller events; returns an id for
    /// [`RemoteMenuController::unregister_listener`].
    pub fn register_listener(
        &self,
        listener: impl Fn(&ControllerEvent) + Send + Sync + 'static,
    ) -> u64 {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        id
    }

    /// Remove a previously registered listener.
    pub fn unregister_listener(&self, id: u64) {
        self.inner.listeners.lock().retain(|(lid, _)| *lid != id);
    }

    /// Send an absolute value update for an item.
    ///
    /// Mints a fresh correlation id and returns it; the eventual
    /// acknowledgement is surfaced as [`ControllerEvent::AckReceived`].
    pub fn send_absolute_update(
        &self,
        item_id: u16,
        value: &MenuValue,
    ) -> Result<CorrelationId, RemoteError> {
        let command = MenuCommand::ChangeValue {
            correlation: CorrelationId::new_random(),
            item_id,
            change_type: ChangeType::Absolute,
            value: value_to_wire(value),
        };
        self.connector.send_command(&command)
    }

    /// Send a relative adjustment for an integer item.
    pub fn send_delta_update(
        &self,
        item_id: u16,
        delta: i32,
    ) -> Result<CorrelationId, RemoteError> {
        let command = MenuCommand::ChangeValue {
            correlation: CorrelationId::new_random(),
            item_id,
            change_type: ChangeType::Delta,
            value: delta.to_string(),
        };
        self.connector.send_command(&command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use menulink_tree::{AnalogItem, BooleanItem, BooleanNaming, TextItem};

    fn inner_with_tree() -> (Arc<ControllerInner>, Arc<RwLock<MenuTree>>) {
        let tree = Arc::new(RwLock::new(MenuTree::new()));
        let inner = Arc::new(ControllerInner {
            tree: Arc::clone(&tree),
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        });
        (inner, tree)
    }

    fn analog_boot(id: u16, current: i32) -> MenuCommand {
        MenuCommand::AnalogBootItem {
            parent_id: 0,
            item: AnalogItem {
                id,
                name: format!("item {}", id),
                read_only: false,
                max_value: 255,
                offset: 0,
                divisor: 1,
                unit: String::new(),
            },
            current,
        }
    }

    #[test]
    fn test_boot_items_populate_tree() {
        let (inner, tree) = inner_with_tree();

        inner.handle_command(&MenuCommand::Bootstrap {
            boot_type: BootType::Start,
        });
        inner.handle_command(&analog_boot(1, 40));
        inner.handle_command(&MenuCommand::BooleanBootItem {
            parent_id: 0,
            item: BooleanItem {
                id: 2,
                name: "Mute".to_string(),
                read_only: false,
                naming: BooleanNaming::OnOff,
            },
            current: true,
        });
        inner.handle_command(&MenuCommand::Bootstrap {
            boot_type: BootType::End,
        });

        let tree = tree.read();
        assert_eq!(tree.item_count(), 3);
        assert_eq!(tree.value_of(1), Some(&MenuValue::Int(40)));
        assert_eq!(tree.value_of(2), Some(&MenuValue::Bool(true)));
    }

    #[test]
    fn test_bootstrap_start_clears_previous_population() {
        let (inner, tree) = inner_with_tree();
        inner.handle_command(&analog_boot(9, 1));
        inner.handle_command(&MenuCommand::Bootstrap {
            boot_type: BootType::Start,
        });
        assert_eq!(tree.read().item_count(), 1);
    }

    #[test]
    fn test_absolute_change_updates_value() {
        let (inner, tree) = inner_with_tree();
        inner.handle_command(&analog_boot(1, 10));

        inner.handle_command(&MenuCommand::ChangeValue {
            correlation: CorrelationId::EMPTY,
            item_id: 1,
            change_type: ChangeType::Absolute,
            value: "55".to_string(),
        });
        assert_eq!(tree.read().value_of(1), Some(&MenuValue::Int(55)));
    }

    #[test]
    fn test_delta_change_adjusts_value() {
        let (inner, tree) = inner_with_tree();
        inner.handle_command(&analog_boot(1, 10));

        inner.handle_command(&MenuCommand::ChangeValue {
            correlation: CorrelationId::EMPTY,
            item_id: 1,
            change_type: ChangeType::Delta,
            value: "-3".to_string(),
        });
        assert_eq!(tree.read().value_of(1), Some(&MenuValue::Int(7)));
    }

    #[test]
    fn test_text_change_applies_verbatim() {
        let (inner, tree) = inner_with_tree();
        inner.handle_command(&MenuCommand::TextBootItem {
            parent_id: 0,
            item: TextItem {
                id: 4,
                name: "Station".to_string(),
                read_only: false,
                max_length: 16,
            },
            current: "old".to_string(),
        });

        inner.handle_command(&MenuCommand::ChangeValue {
            correlation: CorrelationId::EMPTY,
            item_id: 4,
            change_type: ChangeType::Absolute,
            value: "new name".to_string(),
        });
        assert_eq!(
            tree.read().value_of(4),
            Some(&MenuValue::Text("new name".to_string()))
        );
    }

    #[test]
    fn test_change_for_unknown_item_is_dropped() {
        let (inner, tree) = inner_with_tree();
        inner.handle_command(&MenuCommand::ChangeValue {
            correlation: CorrelationId::EMPTY,
            item_id: 77,
            change_type: ChangeType::Absolute,
            value: "1".to_string(),
        });
        assert!(tree.read().value_of(77).is_none());
    }

    #[test]
    fn test_events_are_emitted() {
        let (inner, _tree) = inner_with_tree();
        let events: Arc<Mutex<Vec<ControllerEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        inner
            .listeners
            .lock()
            .push((1, Arc::new(move |e: &ControllerEvent| sink.lock().push(e.clone()))));

        inner.handle_command(&analog_boot(1, 5));
        inner.handle_command(&MenuCommand::Bootstrap {
            boot_type: BootType::End,
        });

        let events = events.lock();
        assert_eq!(
            events[0],
            ControllerEvent::ItemChanged {
                id: 1,
                value_only: false
            }
        );
        assert_eq!(events[1], ControllerEvent::TreeFullyPopulated);
    }

    #[test]
    fn test_value_wire_forms() {
        assert_eq!(value_to_wire(&MenuValue::Int(42)), "42");
        assert_eq!(value_to_wire(&MenuValue::Bool(true)), "1");
        assert_eq!(value_to_wire(&MenuValue::Bool(false)), "0");
        assert_eq!(value_to_wire(&MenuValue::Text("abc".to_string())), "abc");
    }
}
