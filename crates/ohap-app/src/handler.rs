//! Dispatch of received OHAP messages onto the item tree
//!
//! [`dispatch`] applies one server message to the tree and the listening
//! coordinator and reports what the engine must do next. It has no I/O, so
//! every case is unit-testable.

use ohap_core::item::{Item, ItemId, ROOT_ID};
use ohap_core::prelude::*;
use ohap_core::tree::CentralUnit;
use ohap_protocol::{Epoch, OhapMessage};

use crate::config::BehaviorSettings;
use crate::listening::{ConnectionAction, ListeningCoordinator};

/// Outcome of dispatching one message
#[derive(Debug, Default, PartialEq)]
pub struct DispatchResult {
    /// Connection work, in order
    pub actions: Vec<ConnectionAction>,
    /// User-visible problem with the message, if any
    pub error: Option<String>,
}

impl DispatchResult {
    pub fn none() -> Self {
        Self::default()
    }

    fn actions(actions: Vec<ConnectionAction>) -> Self {
        Self {
            actions,
            error: None,
        }
    }

    fn error(error: impl Into<String>) -> Self {
        let error = error.into();
        warn!("{}", error);
        Self {
            actions: Vec::new(),
            error: Some(error),
        }
    }
}

/// Apply `message`, received on connection `epoch`, to the tree.
pub fn dispatch(
    tree: &mut CentralUnit,
    listening: &mut ListeningCoordinator,
    behavior: &BehaviorSettings,
    epoch: Epoch,
    message: &OhapMessage,
) -> DispatchResult {
    match message {
        // ─────────────────────────────────────────────────────────
        // Item announcements
        // ─────────────────────────────────────────────────────────
        OhapMessage::DecimalSensor(_)
        | OhapMessage::DecimalActuator(_)
        | OhapMessage::BinarySensor(_)
        | OhapMessage::BinaryActuator(_)
        | OhapMessage::Container(_) => match message.to_item() {
            Some((parent, item)) => handle_announcement(tree, listening, behavior, parent, item),
            None => DispatchResult::none(),
        },

        // ─────────────────────────────────────────────────────────
        // Value changes and removal
        // ─────────────────────────────────────────────────────────
        OhapMessage::DecimalValueChanged { id, value } => {
            value_change_result(*id, tree.set_decimal_value(*id, *value))
        }
        OhapMessage::BinaryValueChanged { id, value } => {
            value_change_result(*id, tree.set_binary_value(*id, *value))
        }
        OhapMessage::ItemRemoved { id } => {
            let removed = tree.remove_item(*id);
            if removed.is_empty() {
                debug!("Server removed unknown item {}", id);
                return DispatchResult::none();
            }
            debug!("Removed item {} and {} descendant(s)", id, removed.len() - 1);
            DispatchResult::actions(listening.on_items_removed(tree))
        }

        // ─────────────────────────────────────────────────────────
        // Session messages
        // ─────────────────────────────────────────────────────────
        OhapMessage::Ping { id } => {
            trace!("Answering server ping {}", id);
            DispatchResult::actions(vec![ConnectionAction::Send {
                epoch,
                message: OhapMessage::Pong { id: *id },
            }])
        }
        OhapMessage::Pong { id } => {
            trace!("Pong {} from server", id);
            DispatchResult::none()
        }
        OhapMessage::Logout { reason } => {
            info!("Server logged out: {}", reason);
            DispatchResult::none()
        }
        OhapMessage::ListeningStart { id } | OhapMessage::ListeningStop { id } => {
            debug!("Server acknowledged {} for {}", message.name(), id);
            DispatchResult::none()
        }
        OhapMessage::Login { .. } => {
            DispatchResult::error("Unexpected login message from the server")
        }
    }
}

fn handle_announcement(
    tree: &mut CentralUnit,
    listening: &mut ListeningCoordinator,
    behavior: &BehaviorSettings,
    parent: ItemId,
    item: Item,
) -> DispatchResult {
    let id = item.id;
    let is_container = item.is_container();

    let applied = if id == ROOT_ID {
        tree.update_item(ROOT_ID, item)
    } else if !tree.contains(parent) {
        return DispatchResult::error(format!(
            "Announced item {id} refers to unknown parent {parent}"
        ));
    } else {
        tree.announce_item(parent, item)
    };

    if let Err(e) = applied {
        return DispatchResult::error(format!("Could not apply announcement of item {id}: {e}"));
    }

    // A kind change may have dropped a listening subtree
    let mut actions = listening.on_items_removed(tree);

    if behavior.listen_all && is_container && !tree.is_listening(id).unwrap_or(true) {
        match listening.start_listening(tree, id) {
            Ok(more) => actions.extend(more),
            Err(e) => warn!("Could not listen to container {}: {}", id, e),
        }
    }
    DispatchResult::actions(actions)
}

fn value_change_result(id: ItemId, result: Result<()>) -> DispatchResult {
    match result {
        Ok(()) => DispatchResult::none(),
        Err(Error::ItemNotFound { .. }) => {
            DispatchResult::error(format!("Value change for unknown item {id}"))
        }
        Err(e) => DispatchResult::error(format!("Could not apply value change: {e}")),
    }
}
