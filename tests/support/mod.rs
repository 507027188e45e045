//! A loopback RESP fake server for integration tests. Each test drives one
//! connection through a fixed script of expected-bytes/reply-bytes steps
//! instead of talking to a real `redis-server`.

use std::net::SocketAddr;

use redis_proto::{Client, Config, Encoding, Notification, NotificationSink};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex as AsyncMutex;

pub struct Step {
    expect: Vec<u8>,
    reply: Vec<u8>,
}

/// A step that asserts the client wrote `expect` and then writes `reply`
/// back (use an empty `reply` for a request with no immediate response).
pub fn step(expect: impl Into<Vec<u8>>, reply: impl Into<Vec<u8>>) -> Step {
    Step {
        expect: expect.into(),
        reply: reply.into(),
    }
}

/// A step with nothing to read: the server proactively pushes `reply`, as
/// with an unsolicited pub/sub `message`/`pmessage` frame.
pub fn push(reply: impl Into<Vec<u8>>) -> Step {
    Step {
        expect: Vec::new(),
        reply: reply.into(),
    }
}

/// Binds a loopback listener, then runs `steps` against the first inbound
/// connection on a background task. Returns the bound address.
pub async fn spawn_fake_server(steps: Vec<Step>) -> SocketAddr {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await.expect("bind loopback listener");
    let addr = listener.local_addr().expect("local addr");

    tokio::spawn(async move {
        let (mut socket, _) = match listener.accept().await {
            Ok(pair) => pair,
            Err(_) => return,
        };
        for step in steps {
            if !step.expect.is_empty() {
                let mut buf = vec![0u8; step.expect.len()];
                if socket.read_exact(&mut buf).await.is_err() {
                    return;
                }
                assert_eq!(
                    buf, step.expect,
                    "client wrote unexpected bytes: got {:?}, want {:?}",
                    String::from_utf8_lossy(&buf),
                    String::from_utf8_lossy(&step.expect)
                );
            }
            if !step.reply.is_empty() {
                if socket.write_all(&step.reply).await.is_err() {
                    return;
                }
            }
        }
        // Give in-flight client reads a moment to land before the socket
        // drops and the test harness tears the task down.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    });

    addr
}

pub fn client_for(addr: SocketAddr, sink: std::sync::Arc<dyn NotificationSink>) -> Client {
    let config = Config::new()
        .with_host(addr.ip().to_string())
        .with_port(addr.port())
        .with_encoding(Encoding::Utf8);
    Client::new(config, sink)
}

pub struct NoopSink;

impl NotificationSink for NoopSink {
    fn notify(&self, _address: &str, _notification: Notification) {}
}

pub struct RecordingSink(pub AsyncMutex<Vec<(String, Notification)>>);

impl RecordingSink {
    pub fn new() -> Self {
        RecordingSink(AsyncMutex::new(Vec::new()))
    }
}

impl NotificationSink for RecordingSink {
    fn notify(&self, address: &str, notification: Notification) {
        // `notify` runs synchronously on a spawned task (see
        // subscription.rs); `try_lock` is safe here because nothing else
        // holds this mutex across an await point.
        if let Ok(mut guard) = self.0.try_lock() {
            guard.push((address.to_owned(), notification));
        }
    }
}
