//! Test utilities for the OHAP connection engine
//!
//! Provides a loopback [`MockServer`] that speaks the OHAP wire format, and
//! short timeouts so reconnect tests finish quickly.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use ohap_core::tree::ServerAddress;

use crate::client::ClientConfig;
use crate::codec;
use crate::message::OhapMessage;

/// How long helpers wait for the peer before failing the test.
pub const MOCK_WAIT: Duration = Duration::from_secs(5);

/// Client timeouts scaled down for tests.
pub fn test_client_config() -> ClientConfig {
    ClientConfig {
        connect_timeout: Duration::from_millis(500),
        read_timeout: Duration::from_millis(100),
        write_timeout: Duration::from_millis(500),
        retry_delay: Duration::from_millis(50),
    }
}

/// A central unit stand-in listening on `127.0.0.1` with an ephemeral port.
pub struct MockServer {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl MockServer {
    /// Bind to a free loopback port.
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock OHAP server");
        let local_addr = listener.local_addr().expect("mock server address");
        Self {
            listener,
            local_addr,
        }
    }

    /// URL clients use to reach this server
    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}/", self.local_addr.port())
    }

    pub fn address(&self) -> ServerAddress {
        ServerAddress {
            host: "127.0.0.1".to_string(),
            port: self.local_addr.port(),
        }
    }

    /// An address nothing listens on, for connect-failure tests.
    pub async fn unused_address() -> ServerAddress {
        let server = Self::bind().await;
        let address = server.address();
        drop(server);
        address
    }

    /// Wait for the next client connection.
    pub async fn accept(&self) -> MockConnection {
        let (stream, _) = tokio::time::timeout(MOCK_WAIT, self.listener.accept())
            .await
            .expect("timed out waiting for a client to connect")
            .expect("accept client connection");
        MockConnection {
            stream,
            buf: BytesMut::with_capacity(1024),
        }
    }
}

/// Server side of one accepted client connection.
pub struct MockConnection {
    stream: TcpStream,
    buf: BytesMut,
}

impl MockConnection {
    /// Next message from the client, or `None` once it closed the connection.
    ///
    /// Panics on timeout or on a frame that does not decode.
    pub async fn recv(&mut self) -> Option<OhapMessage> {
        loop {
            if let Some(message) = codec::decode(&mut self.buf).expect("client sent a bad frame") {
                return Some(message);
            }
            let read = tokio::time::timeout(MOCK_WAIT, self.stream.read_buf(&mut self.buf))
                .await
                .expect("timed out waiting for a client message")
                .expect("read from client");
            if read == 0 {
                return None;
            }
        }
    }

    /// Next message from the client; panics if the connection closed.
    pub async fn expect_message(&mut self) -> OhapMessage {
        self.recv().await.expect("client closed the connection")
    }

    /// Read messages until one matches `predicate`, returning it.
    pub async fn expect_matching<F>(&mut self, predicate: F) -> OhapMessage
    where
        F: Fn(&OhapMessage) -> bool,
    {
        loop {
            let message = self.expect_message().await;
            if predicate(&message) {
                return message;
            }
        }
    }

    /// Collect everything the client sends within `window`.
    pub async fn collect_for(&mut self, window: Duration) -> Vec<OhapMessage> {
        let mut out = Vec::new();
        let deadline = tokio::time::Instant::now() + window;
        loop {
            while let Some(message) = codec::decode(&mut self.buf).expect("client sent a bad frame") {
                out.push(message);
            }
            match tokio::time::timeout_at(deadline, self.stream.read_buf(&mut self.buf)).await {
                Ok(Ok(0)) | Err(_) => break,
                Ok(Ok(_)) => {}
                Ok(Err(e)) => panic!("read from client: {e}"),
            }
        }
        out
    }

    pub async fn send(&mut self, message: &OhapMessage) {
        let frame = codec::encode_to_bytes(message).expect("encode mock server message");
        self.send_raw(&frame).await;
    }

    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.stream
            .write_all(bytes)
            .await
            .expect("write to client");
    }

    /// Close the connection from the server side.
    pub async fn close(mut self) {
        let _ = self.stream.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_server_url_matches_address() {
        let server = MockServer::bind().await;
        let address = server.address();
        assert_eq!(
            server.url(),
            format!("http://{}:{}/", address.host, address.port)
        );
    }

    #[tokio::test]
    async fn test_mock_connection_exchanges_frames() {
        let server = MockServer::bind().await;
        let mut client = TcpStream::connect(server.local_addr).await.unwrap();
        let mut conn = server.accept().await;

        let frame = codec::encode_to_bytes(&OhapMessage::Ping { id: 3 }).unwrap();
        client.write_all(&frame).await.unwrap();
        assert_eq!(conn.expect_message().await, OhapMessage::Ping { id: 3 });

        conn.send(&OhapMessage::Pong { id: 3 }).await;
        let mut buf = BytesMut::new();
        client.read_buf(&mut buf).await.unwrap();
        assert_eq!(
            codec::decode(&mut buf).unwrap(),
            Some(OhapMessage::Pong { id: 3 })
        );
    }
}
