//! TCP connection engine for an OHAP central unit.
//!
//! [`OhapClient`] owns a background task that connects, logs in, reads
//! frames and reconnects after failures until it is stopped.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                          OhapClient                               │
//! │                                                                   │
//! │  send(epoch, msg) ──cmd──▶ ┌───────────────────────────────────┐  │
//! │                            │ Connection task                   │  │
//! │  stop() ──shutdown watch─▶ │  connect → login → read loop      │  │
//! │                            │  retry every `retry_delay`        │  │
//! │  events ◀──ConnectionEvent─┤  decode frames → Message events   │  │
//! │                            └──────────────┬────────────────────┘  │
//! │                                           │ frames (per epoch)    │
//! │                            ┌──────────────▼────────────────────┐  │
//! │                            │ Writer task: FIFO → socket        │  │
//! │                            └───────────────────────────────────┘  │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every successful connection gets a new [`Epoch`]. Commands carry the epoch
//! the caller believed was current and are dropped if it no longer is, so a
//! message queued for one connection never reaches the next one.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use ohap_core::prelude::*;
use ohap_core::tree::{Credentials, ServerAddress};

use crate::codec;
use crate::message::OhapMessage;

/// Default connect, read and write timeout, and delay between attempts.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Capacity of the per-connection write queue.
const WRITE_QUEUE_CAPACITY: usize = 256;

/// Capacity of the event channel created by [`event_channel`].
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

const READ_BUFFER_CAPACITY: usize = 4096;

/// Reason sent in the `logout` message when the client stops.
const LOGOUT_REASON: &str = "Client stopped";

/// Sequence number of a TCP connection, starting at 1 for each client
pub type Epoch = u64;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Timeouts of the connection engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientConfig {
    pub connect_timeout: Duration,
    /// A read that times out is not an error; the loop just polls again.
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub retry_delay: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            write_timeout: DEFAULT_TIMEOUT,
            retry_delay: DEFAULT_TIMEOUT,
        }
    }
}

/// Current state of the connection task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No task running, or the task has exited.
    Offline,
    /// Connecting, or waiting to retry after a failed attempt.
    Connecting,
    /// Connected and logged in.
    Online { epoch: Epoch },
}

/// Events the connection task posts to the dispatch context
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// Connected; `login` is already queued.
    Connected { epoch: Epoch },
    /// A connect attempt failed. `attempt` restarts at 1 after every
    /// successful connection.
    ConnectFailed { attempt: u32, reason: String },
    /// The connection was lost. Reconnection starts right away.
    Disconnected { epoch: Epoch },
    /// A complete frame arrived.
    Message { epoch: Epoch, message: OhapMessage },
    /// A frame could not be decoded. The reader keeps going.
    ProtocolError { epoch: Epoch, error: String },
}

impl ConnectionEvent {
    /// Returns a short string label for this event type (for logging/debugging).
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Connected { .. } => "connected",
            Self::ConnectFailed { .. } => "connect_failed",
            Self::Disconnected { .. } => "disconnected",
            Self::Message { .. } => "message",
            Self::ProtocolError { .. } => "protocol_error",
        }
    }
}

/// Create the channel a client posts its events to
pub fn event_channel() -> (
    mpsc::Sender<ConnectionEvent>,
    mpsc::Receiver<ConnectionEvent>,
) {
    mpsc::channel(EVENT_CHANNEL_CAPACITY)
}

// ---------------------------------------------------------------------------
// Internal command type
// ---------------------------------------------------------------------------

/// Internal messages sent from the public API to the connection task.
#[derive(Debug)]
enum ClientCommand {
    /// Write `message` if connection `epoch` is still the current one.
    Send { epoch: Epoch, message: OhapMessage },
}

/// Why one connection's I/O loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopExit {
    /// Peer closed or the socket failed; reconnect.
    Lost,
    /// `stop()` was called or the client was dropped.
    Shutdown,
}

// ---------------------------------------------------------------------------
// OhapClient
// ---------------------------------------------------------------------------

/// Handle to a running connection task.
///
/// Created with [`OhapClient::start`]; the task runs until [`OhapClient::stop`]
/// is awaited or the handle is dropped.
pub struct OhapClient {
    cmd_tx: mpsc::UnboundedSender<ClientCommand>,
    state: Arc<RwLock<ConnectionState>>,
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for OhapClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OhapClient")
            .field("connection_state", &self.connection_state())
            .finish()
    }
}

impl OhapClient {
    /// Spawn the connection task. Must be called inside a Tokio runtime.
    ///
    /// The task starts in [`ConnectionState::Connecting`] and posts its
    /// events to `event_tx`.
    pub fn start(
        address: ServerAddress,
        credentials: Credentials,
        config: ClientConfig,
        event_tx: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        // Unbounded so a replay burst never loses a frame; the write queue
        // behind it is bounded and awaited.
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientCommand>();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        info!("Starting OHAP connection to {}", address);
        let task = tokio::spawn(run_connection_task(
            ConnectionTask {
                address,
                credentials,
                config,
                event_tx,
                state: Arc::clone(&state),
            },
            cmd_rx,
            shutdown_rx,
        ));

        Self {
            cmd_tx,
            state,
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Queue `message` for the connection identified by `epoch`.
    ///
    /// Returns immediately and never drops a message while the task runs.
    /// The message is dropped by the task if that connection is gone by the
    /// time it is processed.
    pub fn send(&self, epoch: Epoch, message: OhapMessage) -> Result<()> {
        self.cmd_tx
            .send(ClientCommand::Send { epoch, message })
            .map_err(|_| Error::ChannelClosed)
    }

    /// Return the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        *self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Return `true` if the client is currently connected.
    pub fn is_online(&self) -> bool {
        matches!(self.connection_state(), ConnectionState::Online { .. })
    }

    /// Log out, close the socket and wait for the connection task to exit.
    ///
    /// No events are posted after this returns.
    pub async fn stop(mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("OHAP connection task ended abnormally: {}", e);
            }
        }
        debug!("OHAP client stopped");
    }
}

impl Drop for OhapClient {
    fn drop(&mut self) {
        // Detached tasks still see the flag and exit on their own.
        let _ = self.shutdown_tx.send(true);
    }
}

// ---------------------------------------------------------------------------
// Connection task
// ---------------------------------------------------------------------------

/// Everything the task needs besides its channels
struct ConnectionTask {
    address: ServerAddress,
    credentials: Credentials,
    config: ClientConfig,
    event_tx: mpsc::Sender<ConnectionEvent>,
    state: Arc<RwLock<ConnectionState>>,
}

impl ConnectionTask {
    fn set_state(&self, new_state: ConnectionState) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        *guard = new_state;
    }

    /// Post an event, giving up if shutdown is requested while the channel
    /// is full. Returns `false` if the task should exit.
    async fn emit(&self, event: ConnectionEvent, shutdown_rx: &mut watch::Receiver<bool>) -> bool {
        trace!("OHAP event: {}", event.event_type());
        tokio::select! {
            biased;
            result = self.event_tx.send(event) => result.is_ok(),
            _ = shutdown_requested(shutdown_rx) => false,
        }
    }
}

/// Entry point for the background connection task.
///
/// Connects, runs the I/O loop, and reconnects after a fixed delay until
/// shutdown is requested.
async fn run_connection_task(
    task: ConnectionTask,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientCommand>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut epoch: Epoch = 0;
    let mut attempt: u32 = 0;

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        task.set_state(ConnectionState::Connecting);

        let connected = tokio::select! {
            result = connect_tcp(&task.address, task.config.connect_timeout) => result,
            _ = shutdown_requested(&mut shutdown_rx) => break,
        };

        match connected {
            Ok(stream) => {
                attempt = 0;
                epoch += 1;
                info!("Connected to OHAP server {} (epoch {})", task.address, epoch);

                let exit = run_io_loop(stream, epoch, &task, &mut cmd_rx, &mut shutdown_rx).await;
                if exit == LoopExit::Shutdown {
                    break;
                }
                warn!("Connection to {} lost, reconnecting", task.address);
            }
            Err(err) => {
                attempt += 1;
                warn!(
                    "OHAP connect attempt {} to {} failed: {}",
                    attempt, task.address, err
                );
                let event = ConnectionEvent::ConnectFailed {
                    attempt,
                    reason: err.to_string(),
                };
                if !task.emit(event, &mut shutdown_rx).await {
                    break;
                }
                if !wait_before_retry(task.config.retry_delay, &mut cmd_rx, &mut shutdown_rx).await
                {
                    break;
                }
            }
        }
    }

    task.set_state(ConnectionState::Offline);
    debug!("OHAP connection task exiting");
}

/// Run one connection's read/command select loop.
///
/// Queues `login` before reporting the connection, and `logout` before
/// closing on shutdown. Returns after the writer has flushed its queue.
async fn run_io_loop(
    stream: TcpStream,
    epoch: Epoch,
    task: &ConnectionTask,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> LoopExit {
    if let Err(e) = stream.set_nodelay(true) {
        debug!("Could not set TCP_NODELAY: {}", e);
    }
    let (mut reader, writer) = stream.into_split();
    let (write_tx, write_rx) = mpsc::channel::<Bytes>(WRITE_QUEUE_CAPACITY);
    let writer_task = tokio::spawn(run_writer(writer, write_rx, task.config.write_timeout));

    let login = OhapMessage::login(
        task.credentials.username.clone(),
        task.credentials.password.clone(),
    );
    enqueue(&write_tx, &login).await;
    task.set_state(ConnectionState::Online { epoch });

    let mut exit = if task
        .emit(ConnectionEvent::Connected { epoch }, shutdown_rx)
        .await
    {
        None
    } else {
        Some(LoopExit::Shutdown)
    };

    let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);
    while exit.is_none() {
        tokio::select! {
            _ = shutdown_requested(shutdown_rx) => {
                exit = Some(LoopExit::Shutdown);
            }

            // ── Outgoing message from the public API ─────────────────────
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(ClientCommand::Send { epoch: target, message }) if target == epoch => {
                        trace!("OHAP send: {}", message);
                        enqueue(&write_tx, &message).await;
                    }
                    Some(ClientCommand::Send { epoch: target, message }) => {
                        debug!(
                            "Dropping {} queued for stale connection {} (current {})",
                            message.name(), target, epoch
                        );
                    }
                    None => {
                        debug!("OHAP command channel closed, shutting down");
                        exit = Some(LoopExit::Shutdown);
                    }
                }
            }

            // ── Incoming bytes ──────────────────────────────────────────
            read = tokio::time::timeout(task.config.read_timeout, reader.read_buf(&mut buf)) => {
                match read {
                    // Timeout just means the server was quiet
                    Err(_) => {}
                    Ok(Ok(0)) => {
                        debug!("OHAP server closed the connection");
                        exit = Some(LoopExit::Lost);
                    }
                    Ok(Ok(_)) => {
                        if !forward_frames(&mut buf, epoch, task, shutdown_rx).await {
                            exit = Some(LoopExit::Shutdown);
                        }
                    }
                    Ok(Err(e)) => {
                        warn!("OHAP read error: {}", e);
                        exit = Some(LoopExit::Lost);
                    }
                }
            }
        }
    }

    let exit = exit.unwrap_or(LoopExit::Shutdown);
    if exit == LoopExit::Shutdown {
        // Flush what was queued before stop() so it precedes the logout
        while let Ok(ClientCommand::Send {
            epoch: target,
            message,
        }) = cmd_rx.try_recv()
        {
            if target == epoch {
                enqueue(&write_tx, &message).await;
            }
        }
        enqueue(&write_tx, &OhapMessage::logout(LOGOUT_REASON)).await;
    }

    // Closing the queue lets the writer drain it and shut the socket down.
    drop(write_tx);
    if let Err(e) = writer_task.await {
        warn!("OHAP writer task ended abnormally: {}", e);
    }
    drop(reader);

    if exit == LoopExit::Lost {
        task.set_state(ConnectionState::Connecting);
        if !task
            .emit(ConnectionEvent::Disconnected { epoch }, shutdown_rx)
            .await
        {
            return LoopExit::Shutdown;
        }
    }
    exit
}

/// Decode every complete frame in `buf` and post it. Returns `false` if the
/// task should exit.
async fn forward_frames(
    buf: &mut BytesMut,
    epoch: Epoch,
    task: &ConnectionTask,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    for decoded in codec::decode_all(buf) {
        let event = match decoded {
            Ok(message) => {
                trace!("OHAP recv: {}", message);
                ConnectionEvent::Message { epoch, message }
            }
            Err(e) => {
                warn!("OHAP decode error: {}", e);
                ConnectionEvent::ProtocolError {
                    epoch,
                    error: e.to_string(),
                }
            }
        };
        if !task.emit(event, shutdown_rx).await {
            return false;
        }
    }
    true
}

/// Sleep for `delay`, dropping any commands that arrive meanwhile.
///
/// Returns `false` if shutdown was requested.
async fn wait_before_retry(
    delay: Duration,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientCommand>,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            _ = shutdown_requested(shutdown_rx) => return false,
            cmd = cmd_rx.recv() => match cmd {
                Some(ClientCommand::Send { message, .. }) => {
                    debug!("Not connected, dropping {}", message.name());
                }
                None => return false,
            },
        }
    }
}

/// Drain the write queue to the socket.
///
/// Failed writes are logged and the frame is dropped.
async fn run_writer(mut writer: OwnedWriteHalf, mut queue: mpsc::Receiver<Bytes>, timeout: Duration) {
    while let Some(frame) = queue.recv().await {
        match tokio::time::timeout(timeout, writer.write_all(&frame)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("OHAP write failed, dropping {} bytes: {}", frame.len(), e),
            Err(_) => warn!(
                "OHAP write timed out after {:?}, dropping {} bytes",
                timeout,
                frame.len()
            ),
        }
    }
    if let Err(e) = writer.shutdown().await {
        debug!("OHAP socket shutdown: {}", e);
    }
}

/// Resolves once shutdown has been requested or the client handle is gone.
///
/// Discards the `watch::Ref` so a `select!` arm holds no borrow of the
/// receiver once it completes.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    let _ = shutdown_rx.wait_for(|stop| *stop).await;
}

/// Encode `message` onto the write queue, waiting for room if it is full.
///
/// The frame is dropped only if it cannot be encoded or the writer is gone.
async fn enqueue(write_tx: &mpsc::Sender<Bytes>, message: &OhapMessage) {
    let frame = match codec::encode_to_bytes(message) {
        Ok(frame) => frame,
        Err(e) => {
            warn!("Could not encode {}: {}", message.name(), e);
            return;
        }
    };
    if write_tx.send(frame).await.is_err() {
        warn!("OHAP writer is gone, dropping {}", message.name());
    }
}

/// Open a TCP connection to `address` within `timeout`.
async fn connect_tcp(address: &ServerAddress, timeout: Duration) -> Result<TcpStream> {
    let connect = TcpStream::connect((address.host.as_str(), address.port));
    match tokio::time::timeout(timeout, connect).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(Error::connection(format!(
            "failed to connect to {address}: {e}"
        ))),
        Err(_) => Err(Error::timeout(
            format!("connecting to {address}"),
            millis(timeout),
        )),
    }
}

/// `duration` in whole milliseconds, saturating at `u64::MAX`.
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_client_config, MockServer};
    use pretty_assertions::assert_eq;

    const EVENT_WAIT: Duration = Duration::from_secs(5);

    async fn next_event(rx: &mut mpsc::Receiver<ConnectionEvent>) -> ConnectionEvent {
        tokio::time::timeout(EVENT_WAIT, rx.recv())
            .await
            .expect("timed out waiting for a connection event")
            .expect("event channel closed")
    }

    fn start_client(server: &MockServer) -> (OhapClient, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = event_channel();
        let client = OhapClient::start(
            server.address(),
            Credentials::new("alice", "secret"),
            test_client_config(),
            event_tx,
        );
        (client, event_rx)
    }

    #[test]
    fn test_client_config_defaults_to_five_seconds() {
        let config = ClientConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_millis(5000));
        assert_eq!(config.read_timeout, Duration::from_millis(5000));
        assert_eq!(config.retry_delay, Duration::from_millis(5000));
    }

    #[test]
    fn test_connection_event_labels() {
        assert_eq!(
            ConnectionEvent::Connected { epoch: 1 }.event_type(),
            "connected"
        );
        assert_eq!(
            ConnectionEvent::ConnectFailed {
                attempt: 1,
                reason: String::new()
            }
            .event_type(),
            "connect_failed"
        );
    }

    #[test]
    fn test_client_is_debug() {
        fn assert_debug<T: std::fmt::Debug>() {}
        assert_debug::<OhapClient>();
    }

    #[tokio::test]
    async fn test_connect_sends_login_first() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);

        let mut conn = server.accept().await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected { epoch: 1 });
        assert_eq!(conn.expect_message().await, OhapMessage::login("alice", "secret"));
        assert_eq!(client.connection_state(), ConnectionState::Online { epoch: 1 });

        client.stop().await;
    }

    #[tokio::test]
    async fn test_send_for_current_epoch_is_written() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        client
            .send(1, OhapMessage::BinaryValueChanged { id: 5, value: true })
            .unwrap();
        assert_eq!(
            conn.expect_message().await,
            OhapMessage::BinaryValueChanged { id: 5, value: true }
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn test_burst_larger_than_write_queue_is_written_in_order() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        let count = WRITE_QUEUE_CAPACITY as i32 + 44;
        for id in 0..count {
            client.send(1, OhapMessage::ListeningStart { id }).unwrap();
        }

        for id in 0..count {
            assert_eq!(conn.expect_message().await, OhapMessage::ListeningStart { id });
        }

        client.stop().await;
    }

    #[tokio::test]
    async fn test_burst_queued_before_stop_is_flushed_before_logout() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        for id in 0..40 {
            client.send(1, OhapMessage::ListeningStop { id }).unwrap();
        }
        client.stop().await;

        for id in 0..40 {
            assert_eq!(conn.expect_message().await, OhapMessage::ListeningStop { id });
        }
        assert!(matches!(
            conn.expect_message().await,
            OhapMessage::Logout { .. }
        ));
    }

    #[test]
    fn test_millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }

    #[tokio::test]
    async fn test_send_for_stale_epoch_is_dropped() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        client.send(7, OhapMessage::Ping { id: 1 }).unwrap();
        client.send(1, OhapMessage::Ping { id: 2 }).unwrap();
        assert_eq!(conn.expect_message().await, OhapMessage::Ping { id: 2 });

        client.stop().await;
    }

    #[tokio::test]
    async fn test_stop_sends_logout_and_closes() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        client.stop().await;

        assert!(matches!(
            conn.expect_message().await,
            OhapMessage::Logout { .. }
        ));
        assert_eq!(conn.recv().await, None);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_messages_queued_before_stop_precede_logout() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;
        conn.expect_message().await;

        client
            .send(1, OhapMessage::ListeningStop { id: 0 })
            .unwrap();
        client.stop().await;

        assert_eq!(
            conn.expect_message().await,
            OhapMessage::ListeningStop { id: 0 }
        );
        assert!(matches!(
            conn.expect_message().await,
            OhapMessage::Logout { .. }
        ));
    }

    #[tokio::test]
    async fn test_incoming_frames_are_forwarded() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;

        conn.send(&OhapMessage::Ping { id: 42 }).await;
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Message {
                epoch: 1,
                message: OhapMessage::Ping { id: 42 }
            }
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_tag_reports_error_and_continues() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);
        let mut conn = server.accept().await;
        next_event(&mut events).await;

        conn.send_raw(&[0x42]).await;
        conn.send(&OhapMessage::ItemRemoved { id: 3 }).await;

        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::ProtocolError { epoch: 1, .. }
        ));
        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Message {
                epoch: 1,
                message: OhapMessage::ItemRemoved { id: 3 }
            }
        );

        client.stop().await;
    }

    #[tokio::test]
    async fn test_reconnects_with_new_epoch_after_eof() {
        let server = MockServer::bind().await;
        let (client, mut events) = start_client(&server);

        let mut first = server.accept().await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected { epoch: 1 });
        first.expect_message().await;
        first.close().await;

        assert_eq!(
            next_event(&mut events).await,
            ConnectionEvent::Disconnected { epoch: 1 }
        );
        let mut second = server.accept().await;
        assert_eq!(next_event(&mut events).await, ConnectionEvent::Connected { epoch: 2 });
        assert!(matches!(
            second.expect_message().await,
            OhapMessage::Login { .. }
        ));

        client.stop().await;
    }

    #[tokio::test]
    async fn test_connect_failures_count_attempts() {
        let address = MockServer::unused_address().await;
        let (event_tx, mut events) = event_channel();
        let client = OhapClient::start(
            address,
            Credentials::default(),
            test_client_config(),
            event_tx,
        );

        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::ConnectFailed { attempt: 1, .. }
        ));
        assert!(matches!(
            next_event(&mut events).await,
            ConnectionEvent::ConnectFailed { attempt: 2, .. }
        ));
        assert!(!client.is_online());

        client.stop().await;
    }

    #[tokio::test]
    async fn test_send_after_stop_fails() {
        let server = MockServer::bind().await;
        let (client, _events) = start_client(&server);
        let cmd_tx = client.cmd_tx.clone();
        client.stop().await;

        let result = cmd_tx.send(ClientCommand::Send {
            epoch: 1,
            message: OhapMessage::Ping { id: 1 },
        });
        assert!(result.is_err());
    }
}
