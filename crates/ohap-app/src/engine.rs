//! Engine - the dispatch context of the OHAP client
//!
//! The Engine owns the central unit tree, the listening coordinator, the
//! connection engine and the observer. It is the only place the tree is
//! mutated: connection events arrive over a channel and are processed one at
//! a time by whoever drives the engine (usually [`Engine::run_until`]).

use std::future::Future;

use tokio::sync::mpsc;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use ohap_core::item::{DeviceValue, ItemId, ROOT_ID};
use ohap_core::prelude::*;
use ohap_core::tree::{CentralUnit, Credentials};
use ohap_protocol::{
    event_channel, ClientConfig, ConnectionEvent, ConnectionState, Epoch, OhapClient, OhapMessage,
};

use crate::command::EngineCommand;
use crate::config::Settings;
use crate::handler;
use crate::listening::{ConnectionAction, ListeningCoordinator};
use crate::message_log::{Direction, MessageLog};
use crate::observer::{ActivityStatus, ConnectionObserver, NullObserver};

/// Capacity of the engine's command queue
const COMMAND_CHANNEL_CAPACITY: usize = 32;

/// Orchestration engine for one central unit.
///
/// Construct it explicitly with [`Engine::new`]; there is no global instance.
pub struct Engine {
    tree: CentralUnit,
    settings: Settings,
    client_config: ClientConfig,
    listening: ListeningCoordinator,

    /// Running connection engine; `Some` while anything listens
    client: Option<OhapClient>,

    /// Both halves of the connection event channel. The sender is cloned
    /// into every client started by this engine.
    event_tx: mpsc::Sender<ConnectionEvent>,
    event_rx: mpsc::Receiver<ConnectionEvent>,

    /// Commands from other tasks, handled by [`Engine::run_until`]
    cmd_tx: mpsc::Sender<EngineCommand>,
    cmd_rx: mpsc::Receiver<EngineCommand>,

    observer: Box<dyn ConnectionObserver>,
    message_log: MessageLog,
    next_ping_id: i32,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("url", &self.tree.url().as_str())
            .field("online_epoch", &self.listening.online_epoch())
            .field("client", &self.client)
            .finish()
    }
}

impl Engine {
    /// Create an engine for the server configured in `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `settings.server.url` is malformed.
    pub fn new(settings: Settings) -> Result<Self> {
        let mut tree = CentralUnit::new(&settings.server.url)?;
        tree.set_credentials(Credentials::new(
            settings.login.username.clone(),
            settings.login.password.clone(),
        ));
        tree.set_auto_connect(settings.server.auto_connect);

        let (event_tx, event_rx) = event_channel();
        let client_config = settings.connection.client_config();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);

        Ok(Self {
            tree,
            settings,
            client_config,
            listening: ListeningCoordinator::new(),
            client: None,
            event_tx,
            event_rx,
            cmd_tx,
            cmd_rx,
            observer: Box::new(NullObserver),
            message_log: MessageLog::default(),
            next_ping_id: 1,
        })
    }

    /// Override the connection timeouts from the settings.
    pub fn with_client_config(mut self, config: ClientConfig) -> Self {
        self.client_config = config;
        self
    }

    // ─────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────

    pub fn central_unit(&self) -> &CentralUnit {
        &self.tree
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn message_log(&self) -> &MessageLog {
        &self.message_log
    }

    /// True once the current connection has been announced to the engine
    pub fn is_online(&self) -> bool {
        self.listening.is_online()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client
            .as_ref()
            .map_or(ConnectionState::Offline, OhapClient::connection_state)
    }

    pub fn listening_count(&self) -> usize {
        self.listening.listening_count(&self.tree)
    }

    /// Sender for commands handled by [`Engine::run_until`]
    pub fn command_sender(&self) -> mpsc::Sender<EngineCommand> {
        self.cmd_tx.clone()
    }

    pub fn set_observer<O: ConnectionObserver + 'static>(&mut self, observer: O) {
        self.observer = Box::new(observer);
    }

    // ─────────────────────────────────────────────────────────
    // Control interface
    // ─────────────────────────────────────────────────────────

    /// Install `observer` and, with `auto_connect`, listen to the root
    /// container, which opens the connection.
    pub async fn start<O: ConnectionObserver + 'static>(&mut self, observer: O) -> Result<()> {
        self.set_observer(observer);
        self.auto_connect().await
    }

    async fn auto_connect(&mut self) -> Result<()> {
        if self.tree.auto_connect() {
            self.start_listening(ROOT_ID).await?;
        }
        Ok(())
    }

    /// Stop listening everywhere and close the connection.
    ///
    /// The server gets `listening-stop` for each container and then `logout`.
    pub async fn stop(&mut self) {
        for id in self.tree.listening_containers() {
            if let Err(e) = self.stop_listening(id).await {
                warn!("Could not stop listening to {}: {}", id, e);
            }
        }
        // Nothing listened but a client was started by hand
        self.stop_client().await;
        self.listening.on_client_stopped(&self.tree);
        info!("Engine stopped");
    }

    /// Stop, then start again with `observer`.
    pub async fn reconnect<O: ConnectionObserver + 'static>(&mut self, observer: O) -> Result<()> {
        self.stop().await;
        self.start(observer).await
    }

    /// Listen to `container`; the first listener opens the connection.
    pub async fn start_listening(&mut self, container: ItemId) -> Result<()> {
        let actions = self.listening.start_listening(&mut self.tree, container)?;
        self.apply(actions).await;
        self.forward_tree_events();
        Ok(())
    }

    /// Stop listening to `container`; the last one closes the connection.
    pub async fn stop_listening(&mut self, container: ItemId) -> Result<()> {
        let actions = self.listening.stop_listening(&mut self.tree, container)?;
        self.apply(actions).await;
        self.forward_tree_events();
        Ok(())
    }

    /// Send a keep-alive `ping`; returns its id.
    pub fn send_ping(&mut self) -> Result<i32> {
        let epoch = self.online_epoch()?;
        let id = self.next_ping_id;
        self.next_ping_id = self.next_ping_id.wrapping_add(1);
        self.send_on(epoch, OhapMessage::Ping { id })?;
        Ok(id)
    }

    /// Change a binary device's value and tell the server.
    ///
    /// # Errors
    ///
    /// - Tree errors if `id` is not a binary device
    /// - [`Error::NotConnected`] if there is no connection
    pub fn send_binary_value_changed(&mut self, id: ItemId, value: bool) -> Result<()> {
        self.tree.item(id)?.binary_value()?;
        self.send_value_changed(id, DeviceValue::Binary(value))
    }

    /// Change a decimal device's value and tell the server.
    pub fn send_decimal_value_changed(&mut self, id: ItemId, value: f64) -> Result<()> {
        let mut decimal = self.tree.item(id)?.decimal()?.clone();
        decimal.value = value;
        self.send_value_changed(id, DeviceValue::Decimal(decimal))
    }

    /// Point the engine at another central unit.
    ///
    /// On error nothing changes. Otherwise the old server's items are
    /// dropped and a running connection is reopened at the new address;
    /// listening containers that survive are replayed on connect.
    pub async fn set_url(&mut self, url: &str) -> Result<()> {
        self.tree.set_url(url)?;
        self.settings.server.url = url.to_string();
        info!("Central unit URL set to {}", self.tree.url());

        let was_running = self.client.is_some();
        if was_running {
            self.stop_client().await;
            self.listening.on_client_stopped(&self.tree);
        }

        for id in self.tree.children(ROOT_ID)?.to_vec() {
            self.tree.remove_item(id);
        }
        let actions = self.listening.on_items_removed(&self.tree);
        self.apply(actions).await;
        self.forward_tree_events();
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Event processing
    // ─────────────────────────────────────────────────────────

    /// Wait for the next connection event.
    pub async fn next_event(&mut self) -> Option<ConnectionEvent> {
        self.event_rx.recv().await
    }

    /// Wait for the next connection event and process it. Returns its label.
    pub async fn process_next_event(&mut self) -> Option<&'static str> {
        let event = self.next_event().await?;
        let label = event.event_type();
        self.process_event(event).await;
        Some(label)
    }

    /// Apply one connection event to the tree and notify the observer.
    pub async fn process_event(&mut self, event: ConnectionEvent) {
        trace!("Processing connection event: {}", event.event_type());
        match event {
            ConnectionEvent::Connected { epoch } => {
                if self.client.is_none() {
                    debug!("Ignoring connect of stopped client (epoch {})", epoch);
                    return;
                }
                let credentials = self.tree.credentials();
                let login = OhapMessage::login(
                    credentials.username.clone(),
                    credentials.password.clone(),
                );
                self.message_log.record(Direction::Sent, &login);

                let actions = self.listening.on_connected(&self.tree, epoch);
                self.observer
                    .handle_activity_response(ActivityStatus::Connected);
                self.apply(actions).await;
            }

            ConnectionEvent::ConnectFailed { attempt, reason } => {
                debug!("Connect attempt {} failed: {}", attempt, reason);
                self.observer
                    .handle_activity_response(ActivityStatus::for_failed_attempt(attempt));
            }

            ConnectionEvent::Disconnected { epoch } => {
                if self.listening.online_epoch() != Some(epoch) {
                    debug!("Ignoring disconnect of stale connection {}", epoch);
                    return;
                }
                self.listening.on_disconnected(&self.tree, epoch);
                self.observer
                    .handle_activity_response(ActivityStatus::ConnectionClosed);
            }

            ConnectionEvent::Message { epoch, message } => {
                if self.listening.online_epoch() != Some(epoch) {
                    debug!(
                        "Dropping {} from stale connection {}",
                        message.name(),
                        epoch
                    );
                    return;
                }
                self.message_log.record(Direction::Received, &message);

                let result = handler::dispatch(
                    &mut self.tree,
                    &mut self.listening,
                    &self.settings.behavior,
                    epoch,
                    &message,
                );
                self.observer.handle_message_response(&message);
                self.forward_tree_events();
                if let Some(error) = result.error {
                    self.observer.handle_protocol_error(&error);
                }
                self.apply(result.actions).await;
                self.forward_tree_events();
            }

            ConnectionEvent::ProtocolError { epoch, error } => {
                if self.listening.online_epoch() == Some(epoch) {
                    self.observer.handle_protocol_error(&error);
                }
            }
        }
    }

    /// Carry out one command. Returns `false` for [`EngineCommand::Quit`].
    pub async fn handle_command(&mut self, command: EngineCommand) -> Result<bool> {
        debug!("Engine command: {:?}", command);
        match command {
            EngineCommand::StartListening(id) => self.start_listening(id).await?,
            EngineCommand::StopListening(id) => self.stop_listening(id).await?,
            EngineCommand::SetBinary { id, value } => self.send_binary_value_changed(id, value)?,
            EngineCommand::SetDecimal { id, value } => self.send_decimal_value_changed(id, value)?,
            EngineCommand::Ping => {
                self.send_ping()?;
            }
            EngineCommand::SetUrl(url) => self.set_url(&url).await?,
            EngineCommand::Reconnect => {
                self.stop().await;
                self.auto_connect().await?;
            }
            EngineCommand::Quit => return Ok(false),
        }
        Ok(true)
    }

    /// Process connection events and commands until `shutdown` completes or
    /// [`EngineCommand::Quit`] arrives, then stop.
    ///
    /// Sends keep-alive pings if `ping_interval_secs` is configured.
    pub async fn run_until<F>(&mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let mut ping = self.settings.connection.ping_interval().map(|every| {
            let mut interval = tokio::time::interval_at(Instant::now() + every, every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                Some(command) = self.cmd_rx.recv() => {
                    match self.handle_command(command).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => warn!("Command failed: {}", e),
                    }
                }
                event = self.event_rx.recv() => {
                    match event {
                        Some(event) => self.process_event(event).await,
                        None => break,
                    }
                }
                _ = next_tick(&mut ping), if ping.is_some() => {
                    if self.is_online() {
                        if let Err(e) = self.send_ping() {
                            warn!("Keep-alive ping failed: {}", e);
                        }
                    }
                }
            }
        }

        self.stop().await;
    }

    // ─────────────────────────────────────────────────────────
    // Internals
    // ─────────────────────────────────────────────────────────

    fn online_epoch(&self) -> Result<Epoch> {
        self.listening.online_epoch().ok_or(Error::NotConnected)
    }

    async fn apply(&mut self, actions: Vec<ConnectionAction>) {
        for action in actions {
            match action {
                ConnectionAction::StartClient => self.start_client(),
                ConnectionAction::StopClient => self.stop_client().await,
                ConnectionAction::Send { epoch, message } => {
                    if let Err(e) = self.send_on(epoch, message) {
                        warn!("Could not queue message: {}", e);
                    }
                }
            }
        }
    }

    /// Queue one value-changed frame, then apply `value` locally.
    fn send_value_changed(&mut self, id: ItemId, value: DeviceValue) -> Result<()> {
        let epoch = self.online_epoch()?;
        self.send_on(epoch, OhapMessage::value_changed(id, &value))?;
        match value {
            DeviceValue::Binary(value) => self.tree.set_binary_value(id, value)?,
            DeviceValue::Decimal(decimal) => self.tree.set_decimal_value(id, decimal.value)?,
        }
        self.forward_tree_events();
        Ok(())
    }

    fn send_on(&mut self, epoch: Epoch, message: OhapMessage) -> Result<()> {
        let client = self.client.as_ref().ok_or(Error::NotConnected)?;
        self.message_log.record(Direction::Sent, &message);
        client.send(epoch, message)
    }

    fn start_client(&mut self) {
        if self.client.is_some() {
            return;
        }
        self.client = Some(OhapClient::start(
            self.tree.address().clone(),
            self.tree.credentials().clone(),
            self.client_config,
            self.event_tx.clone(),
        ));
    }

    /// Stop the client and discard whatever it posted before exiting.
    async fn stop_client(&mut self) {
        let Some(client) = self.client.take() else {
            return;
        };
        client.stop().await;
        while let Ok(event) = self.event_rx.try_recv() {
            debug!("Discarding {} from stopped client", event.event_type());
        }
    }

    fn forward_tree_events(&mut self) {
        for event in self.tree.drain_events() {
            self.observer.handle_tree_event(&event);
        }
    }
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ohap_core::item::{DeviceType, Item};

    fn engine() -> Engine {
        Engine::new(Settings::default()).unwrap()
    }

    #[test]
    fn test_new_rejects_bad_url() {
        let mut settings = Settings::default();
        settings.server.url = "not a url".to_string();
        assert!(matches!(
            Engine::new(settings),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_new_applies_settings() {
        let mut settings = Settings::default();
        settings.login.username = "alice".to_string();
        settings.server.auto_connect = false;
        let engine = Engine::new(settings).unwrap();
        assert_eq!(engine.central_unit().credentials().username, "alice");
        assert!(!engine.central_unit().auto_connect());
        assert_eq!(engine.connection_state(), ConnectionState::Offline);
    }

    #[test]
    fn test_sends_fail_when_offline() {
        let mut engine = engine();
        engine
            .tree
            .add_item(ROOT_ID, Item::binary_device(5, "Lamp", DeviceType::Actuator, false))
            .unwrap();

        assert!(matches!(engine.send_ping(), Err(Error::NotConnected)));
        assert!(matches!(
            engine.send_binary_value_changed(5, true),
            Err(Error::NotConnected)
        ));
        assert!(!engine.tree.item(5).unwrap().binary_value().unwrap());
    }

    #[test]
    fn test_value_change_type_errors_win_over_offline() {
        let mut engine = engine();
        engine
            .tree
            .add_item(ROOT_ID, Item::binary_device(5, "Lamp", DeviceType::Actuator, false))
            .unwrap();

        let err = engine.send_decimal_value_changed(5, 1.0).unwrap_err();
        assert!(err.is_programming_error());
        let err = engine.send_binary_value_changed(99, true).unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { id: 99 }));
    }

    #[tokio::test]
    async fn test_set_url_error_keeps_state() {
        let mut engine = engine();
        assert!(engine.set_url("::::").await.is_err());
        assert_eq!(engine.central_unit().address().port, 18000);
        assert_eq!(engine.settings().server.url, "http://127.0.0.1:18000/");
    }

    #[tokio::test]
    async fn test_start_without_auto_connect_stays_offline() {
        let mut settings = Settings::default();
        settings.server.auto_connect = false;
        let mut engine = Engine::new(settings).unwrap();

        engine.start(NullObserver).await.unwrap();
        assert_eq!(engine.listening_count(), 0);
        assert_eq!(engine.connection_state(), ConnectionState::Offline);
    }

    #[tokio::test]
    async fn test_quit_command_ends_run() {
        let mut settings = Settings::default();
        settings.server.auto_connect = false;
        let mut engine = Engine::new(settings).unwrap();

        engine
            .command_sender()
            .send(EngineCommand::Quit)
            .await
            .unwrap();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            engine.run_until(std::future::pending::<()>()),
        )
        .await
        .expect("run_until should return after quit");
    }

    #[tokio::test]
    async fn test_failed_command_reports_error() {
        let mut engine = engine();
        let err = engine
            .handle_command(EngineCommand::StartListening(42))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { id: 42 }));
        assert!(engine.handle_command(EngineCommand::Quit).await.is_ok_and(|go_on| !go_on));
    }

    #[tokio::test]
    async fn test_pending_listeners_flush_once_online() {
        use ohap_protocol::test_utils::{test_client_config, MockServer, MOCK_WAIT};

        let server = MockServer::bind().await;
        let mut settings = Settings::default();
        settings.server.url = server.url();
        settings.server.auto_connect = false;
        let mut engine = Engine::new(settings)
            .unwrap()
            .with_client_config(test_client_config());
        engine.tree.add_item(ROOT_ID, Item::container(1, "Room 1")).unwrap();
        engine.tree.add_item(ROOT_ID, Item::container(2, "Room 2")).unwrap();

        engine.start_listening(1).await.unwrap();
        engine.start_listening(2).await.unwrap();
        assert!(!engine.is_online());

        let mut conn = server.accept().await;
        tokio::time::timeout(MOCK_WAIT, async {
            while engine.process_next_event().await != Some("connected") {}
        })
        .await
        .unwrap();

        let sent = conn.collect_for(std::time::Duration::from_millis(300)).await;
        assert_eq!(
            sent,
            vec![
                OhapMessage::login("", ""),
                OhapMessage::ListeningStart { id: 1 },
                OhapMessage::ListeningStart { id: 2 },
            ]
        );
        engine.stop().await;
    }
}
