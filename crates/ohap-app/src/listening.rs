//! Reference-counted listening
//!
//! The server only pushes announcements and value changes for containers a
//! client listens to. The containers' `listening` flags live in the tree;
//! their number is the reference count that keeps the connection open.
//!
//! [`ListeningCoordinator`] decides what to send and when to start or stop
//! the connection engine. It never touches the network itself: every call
//! returns the [`ConnectionAction`]s for the engine to carry out in order.

use ohap_core::item::ItemId;
use ohap_core::prelude::*;
use ohap_core::tree::CentralUnit;
use ohap_protocol::{Epoch, OhapMessage};

/// Work the engine must do on the connection after a dispatch step
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionAction {
    /// The first container started listening: start the connection engine.
    StartClient,
    /// The last container stopped listening: stop the connection engine.
    StopClient,
    /// Send on the connection identified by `epoch`.
    Send { epoch: Epoch, message: OhapMessage },
}

/// Online view and pending subscriptions of the dispatch context
#[derive(Debug, Default)]
pub struct ListeningCoordinator {
    /// Epoch of the connection the last `Connected` event announced
    online: Option<Epoch>,
    /// Containers whose `listening-start` waits for the next connection
    pending: Vec<ItemId>,
    client_running: bool,
}

impl ListeningCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Epoch of the current connection, if online
    pub fn online_epoch(&self) -> Option<Epoch> {
        self.online
    }

    pub fn is_online(&self) -> bool {
        self.online.is_some()
    }

    pub fn is_client_running(&self) -> bool {
        self.client_running
    }

    /// Containers waiting for a connection, in request order
    pub fn pending(&self) -> &[ItemId] {
        &self.pending
    }

    /// Number of listening containers
    pub fn listening_count(&self, tree: &CentralUnit) -> usize {
        tree.listening_containers().len()
    }

    /// Start listening to `container`.
    ///
    /// No-op if it already listens. Fails if the id is absent or a device.
    pub fn start_listening(
        &mut self,
        tree: &mut CentralUnit,
        container: ItemId,
    ) -> Result<Vec<ConnectionAction>> {
        if !tree.set_listening(container, true)? {
            return Ok(Vec::new());
        }
        debug!("Listening to container {}", container);

        let mut actions = self.reconcile(tree);
        match self.online {
            Some(epoch) => actions.push(ConnectionAction::Send {
                epoch,
                message: OhapMessage::ListeningStart { id: container },
            }),
            None => self.pending.push(container),
        }
        Ok(actions)
    }

    /// Stop listening to `container`.
    ///
    /// No-op if it does not listen. Stops the engine when it was the last.
    pub fn stop_listening(
        &mut self,
        tree: &mut CentralUnit,
        container: ItemId,
    ) -> Result<Vec<ConnectionAction>> {
        if !tree.set_listening(container, false)? {
            return Ok(Vec::new());
        }
        debug!("Stopped listening to container {}", container);

        self.pending.retain(|id| *id != container);
        let mut actions = Vec::new();
        if let Some(epoch) = self.online {
            actions.push(ConnectionAction::Send {
                epoch,
                message: OhapMessage::ListeningStop { id: container },
            });
        }
        actions.extend(self.reconcile(tree));
        Ok(actions)
    }

    /// A new connection is up: resend `listening-start` for every listening
    /// container, once each.
    pub fn on_connected(&mut self, tree: &CentralUnit, epoch: Epoch) -> Vec<ConnectionAction> {
        self.online = Some(epoch);
        self.pending.clear();
        tree.listening_containers()
            .into_iter()
            .map(|id| ConnectionAction::Send {
                epoch,
                message: OhapMessage::ListeningStart { id },
            })
            .collect()
    }

    /// The connection `epoch` was lost. Listening containers become pending.
    ///
    /// Ignored if a newer connection was already announced.
    pub fn on_disconnected(&mut self, tree: &CentralUnit, epoch: Epoch) {
        if self.online == Some(epoch) {
            self.online = None;
            self.pending = tree.listening_containers();
        }
    }

    /// Items left the tree; listening flags went with them.
    pub fn on_items_removed(&mut self, tree: &CentralUnit) -> Vec<ConnectionAction> {
        self.pending.retain(|id| tree.contains(*id));
        self.reconcile(tree)
    }

    /// The engine stopped the client on its own (e.g. before a URL change).
    pub fn on_client_stopped(&mut self, tree: &CentralUnit) {
        self.client_running = false;
        self.online = None;
        self.pending = tree.listening_containers();
    }

    /// Start or stop the client so that it runs exactly while something listens.
    fn reconcile(&mut self, tree: &CentralUnit) -> Vec<ConnectionAction> {
        let count = self.listening_count(tree);
        if count > 0 && !self.client_running {
            self.client_running = true;
            vec![ConnectionAction::StartClient]
        } else if count == 0 && self.client_running {
            self.client_running = false;
            self.online = None;
            self.pending.clear();
            vec![ConnectionAction::StopClient]
        } else {
            Vec::new()
        }
    }
}
