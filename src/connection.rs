//! Connection lifecycle, framing, and reply dispatch.
//!
//! The pending FIFO and the subscription registry are only ever touched from
//! one place: the actor task spawned by [`Connection::connect`]. That task
//! owns the socket, writes outbound commands, and demultiplexes inbound
//! replies between pub/sub pushes and the pending FIFO — no locks are needed
//! because nothing outside the task ever touches either structure.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};

use crate::command::Command;
use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::parser::RespCodec;
use crate::reply::{Encoding, Reply};
use crate::subscription::SubscriptionRegistry;

const ACTOR_CHANNEL_CAPACITY: usize = 256;

enum ActorMessage {
    Send(Command),
    Disconnect,
}

/// Owns one TCP socket plus the pending FIFO. Cheap to clone;
/// clones share the same underlying actor task and socket.
#[derive(Clone, Debug)]
pub struct Connection {
    sender: mpsc::Sender<ActorMessage>,
}

impl Connection {
    /// Establishes the socket and starts the actor task. Returns the `Connection` handle plus a one-shot that
    /// resolves with the error that eventually tore the connection down
    /// (peer close, I/O error, or a fatal protocol error) — the Client uses
    /// this to drive the `Connected → Disconnected` transition and invoke
    /// its on-close notification.
    pub async fn connect(
        host: &str,
        port: u16,
        registry: Arc<Mutex<SubscriptionRegistry>>,
        address: String,
        encoding: Encoding,
    ) -> RedisResult<(Self, oneshot::Receiver<RedisError>)> {
        let stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| RedisError::new(ErrorKind::ConnectError, e.to_string()))?;
        let (read_half, write_half) = stream.into_split();
        let writer = BufWriter::new(write_half);
        let frames = FramedRead::new(read_half, RespCodec);

        let (tx, rx) = mpsc::channel(ACTOR_CHANNEL_CAPACITY);
        let (closed_tx, closed_rx) = oneshot::channel();

        tokio::spawn(run(frames, writer, rx, registry, address, encoding, closed_tx));

        Ok((Connection { sender: tx }, closed_rx))
    }

    /// Serializes `command` to RESP and writes it to the socket. The command is appended to the pending FIFO by the actor
    /// task before the write completes, so any reply the server sends back
    /// always finds its owner already enqueued.
    pub async fn send(&self, command: Command) -> RedisResult<()> {
        self.sender
            .send(ActorMessage::Send(command))
            .await
            .map_err(|_| RedisError::new(ErrorKind::ConnectionClosed, "connection is shutting down"))
    }

    /// Closes the socket gracefully. Any pending
    /// commands are completed with a `ConnectionClosed` error by the actor
    /// task as it tears down.
    pub async fn disconnect(&self) {
        let _ = self.sender.send(ActorMessage::Disconnect).await;
    }
}

fn connection_closed(message: impl Into<String>) -> RedisError {
    RedisError::new(ErrorKind::ConnectionClosed, message)
}

fn drain_pending(pending: &mut VecDeque<Command>, err: &RedisError) {
    while let Some(mut command) = pending.pop_front() {
        command.finish(Err(err.clone()));
    }
}

/// Routes one decoded reply: a pub/sub push goes to the registry, anything
/// else goes to the head of the pending FIFO.
fn dispatch_reply(
    reply: Reply,
    pending: &mut VecDeque<Command>,
    registry: &Arc<Mutex<SubscriptionRegistry>>,
    address: &str,
    encoding: Encoding,
) {
    if let Reply::Array(Some(ref items)) = reply {
        if let Some(Ok(Some(tag))) = items.first().map(|item| item.to_text(encoding)) {
            if tag.eq_ignore_ascii_case("message") && items.len() == 3 {
                let channel = text_or_empty(&items[1], encoding);
                let message = text_or_empty(&items[2], encoding);
                let matched = registry
                    .lock()
                    .unwrap()
                    .dispatch_channel(address, &channel, message);
                if !matched {
                    debug!(channel = %channel, "discarding message push with no registered handler");
                }
                return;
            }
            if tag.eq_ignore_ascii_case("pmessage") && items.len() == 4 {
                let pattern = text_or_empty(&items[1], encoding);
                let channel = text_or_empty(&items[2], encoding);
                let message = text_or_empty(&items[3], encoding);
                let matched = registry
                    .lock()
                    .unwrap()
                    .dispatch_pattern(address, &pattern, &channel, message);
                if !matched {
                    debug!(pattern = %pattern, "discarding pmessage push with no registered handler");
                }
                return;
            }
        }
    }

    match pending.front_mut() {
        Some(front) => {
            if front.accumulate(reply) {
                pending.pop_front();
            }
        }
        None => {
            warn!("received a reply with no pending command to deliver it to");
        }
    }
}

fn text_or_empty(reply: &Reply, encoding: Encoding) -> String {
    reply.to_text(encoding).ok().flatten().unwrap_or_default()
}

async fn run(
    mut frames: FramedRead<tokio::net::tcp::OwnedReadHalf, RespCodec>,
    mut writer: BufWriter<OwnedWriteHalf>,
    mut rx: mpsc::Receiver<ActorMessage>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    address: String,
    encoding: Encoding,
    closed: oneshot::Sender<RedisError>,
) {
    let mut pending: VecDeque<Command> = VecDeque::new();

    loop {
        tokio::select! {
            biased;

            maybe_msg = rx.recv() => {
                match maybe_msg {
                    Some(ActorMessage::Send(command)) => {
                        let encoded = command.encode();
                        pending.push_back(command);
                        let write_result: std::io::Result<()> = async {
                            writer.write_all(&encoded).await?;
                            writer.flush().await
                        }
                        .await;
                        if let Err(e) = write_result {
                            let err = RedisError::from(e);
                            drain_pending(&mut pending, &err);
                            let _ = closed.send(err);
                            return;
                        }
                    }
                    Some(ActorMessage::Disconnect) | None => {
                        let _ = writer.shutdown().await;
                        let err = connection_closed("connection closed locally");
                        drain_pending(&mut pending, &err);
                        debug!("connection disconnected");
                        return;
                    }
                }
            }

            frame = frames.next() => {
                match frame {
                    Some(Ok(reply)) => {
                        dispatch_reply(reply, &mut pending, &registry, &address, encoding);
                    }
                    Some(Err(parse_err)) => {
                        warn!(error = %parse_err, "fatal protocol error, closing connection");
                        drain_pending(&mut pending, &parse_err);
                        let _ = closed.send(parse_err);
                        return;
                    }
                    None => {
                        debug!("peer closed the connection");
                        let err = connection_closed("connection closed by peer");
                        drain_pending(&mut pending, &err);
                        let _ = closed.send(err);
                        return;
                    }
                }
            }
        }
    }
}
