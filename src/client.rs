//! Public façade: typed `send_*` entry points, subscribe/
//! unsubscribe pre-processing, response-shape transforms, and pre-connect
//! buffering.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::{oneshot, Notify};
use tracing::{debug, warn};

use crate::command::{Arg, Command, ReturnKind};
use crate::config::Config;
use crate::connection::Connection;
use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::reply::{Encoding, Reply};
use crate::subscription::{NotificationSink, SubscriptionRegistry};

/// Which response-shape transform applies to a verb, matched
/// case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResponseTransform {
    None,
    HgetAll,
    Info,
}

impl ResponseTransform {
    fn from_verb(verb_upper: &str) -> Self {
        match verb_upper {
            "HGETALL" => ResponseTransform::HgetAll,
            "INFO" => ResponseTransform::Info,
            _ => ResponseTransform::None,
        }
    }
}

/// A two-level `{section → {key → value}}` map plus top-level orphans,
/// produced by the `INFO` transform.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InfoMap {
    pub sections: HashMap<String, HashMap<String, String>>,
    pub top_level: HashMap<String, String>,
}

/// The shape `send_map` resolves to: either a flat field map (`HGETALL`) or
/// the sectioned form (`INFO`).
#[derive(Debug, Clone, PartialEq)]
pub enum MapOutcome {
    Flat(HashMap<String, Option<String>>),
    Info(InfoMap),
}

/// The typed result of a single `send`, before a `send_*` wrapper narrows it
/// to its own shape.
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    Text(Option<String>),
    Integer(i64),
    Void,
    List(Option<Vec<Option<String>>>),
    Map(MapOutcome),
}

fn outcome_mismatch(expected: &str, got: &SendOutcome) -> RedisError {
    RedisError::new(
        ErrorKind::ProjectionError,
        format!("expected a {expected} outcome but the command resolved to {got:?}"),
    )
}

fn parse_info(text: &str) -> InfoMap {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut top_level: HashMap<String, String> = HashMap::new();
    let mut current: Option<String> = None;

    for raw_line in text.split('\n').map(|l| l.trim_end_matches('\r')) {
        if raw_line.is_empty() {
            current = None;
            continue;
        }
        if let Some(name) = raw_line.strip_prefix('#') {
            let section_name = name.trim().to_lowercase();
            sections.entry(section_name.clone()).or_default();
            current = Some(section_name);
            continue;
        }
        if let Some(idx) = raw_line.find(':') {
            let key = raw_line[..idx].to_owned();
            let value = raw_line[idx + 1..].to_owned();
            match &current {
                Some(section) => {
                    sections.entry(section.clone()).or_default().insert(key, value);
                }
                None => {
                    top_level.insert(key, value);
                }
            }
        }
    }

    InfoMap { sections, top_level }
}

fn apply_response_transform(
    transform: ResponseTransform,
    reply: &Reply,
    encoding: Encoding,
) -> RedisResult<Option<SendOutcome>> {
    match transform {
        ResponseTransform::None => Ok(None),
        ResponseTransform::HgetAll => {
            let map = reply.to_map(encoding)?.unwrap_or_default();
            Ok(Some(SendOutcome::Map(MapOutcome::Flat(map))))
        }
        ResponseTransform::Info => {
            let text = reply.to_text(encoding)?.unwrap_or_default();
            Ok(Some(SendOutcome::Map(MapOutcome::Info(parse_info(&text)))))
        }
    }
}

fn project_by_return_kind(
    reply: Reply,
    return_kind: ReturnKind,
    encoding: Encoding,
) -> RedisResult<SendOutcome> {
    match return_kind {
        ReturnKind::Text => Ok(SendOutcome::Text(reply.to_text(encoding)?)),
        ReturnKind::Integer => Ok(SendOutcome::Integer(reply.to_integer()?)),
        ReturnKind::Void => match reply.into_server_error() {
            Some(err) => Err(err),
            None => Ok(SendOutcome::Void),
        },
        ReturnKind::List => Ok(SendOutcome::List(reply.to_list(encoding)?)),
        ReturnKind::Map => Ok(SendOutcome::Map(MapOutcome::Flat(
            reply.to_map(encoding)?.unwrap_or_default(),
        ))),
    }
}

fn arg_to_text(arg: &Arg, encoding: Encoding) -> RedisResult<String> {
    match arg {
        Arg::Text(s) => Ok(s.clone()),
        Arg::Bytes(b) => encoding.decode(b),
        Arg::Integer(n) => Ok(n.to_string()),
    }
}

enum ClientState {
    Disconnected,
    Connecting,
    Connected(Connection),
}

struct Shared {
    state: ClientState,
    pending_buffer: VecDeque<Command>,
}

struct ClientInner {
    config: Config,
    notification_sink: Arc<dyn NotificationSink>,
    registry: Arc<Mutex<SubscriptionRegistry>>,
    shared: Mutex<Shared>,
    notify: Notify,
}

/// Public façade over the wire-protocol engine. Cheap to clone;
/// clones share the same connection, pending state, and subscription
/// registry.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    pub fn new(config: Config, notification_sink: Arc<dyn NotificationSink>) -> Self {
        if config.binary {
            warn!("the `binary` configuration flag is deprecated and has no effect");
        }
        Client {
            inner: Arc::new(ClientInner {
                config,
                notification_sink,
                registry: Arc::new(Mutex::new(SubscriptionRegistry::new())),
                shared: Mutex::new(Shared {
                    state: ClientState::Disconnected,
                    pending_buffer: VecDeque::new(),
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Eagerly connects.
    pub async fn start(&self) -> RedisResult<()> {
        loop {
            let should_connect = {
                let mut shared = self.inner.shared.lock().unwrap();
                match shared.state {
                    ClientState::Connected(_) => return Ok(()),
                    ClientState::Connecting => false,
                    ClientState::Disconnected => {
                        shared.state = ClientState::Connecting;
                        true
                    }
                }
            };
            if should_connect {
                return self.connect_and_drain().await;
            }
            self.inner.notify.notified().await;
        }
    }

    /// Disconnects. Pending commands are completed with
    /// a connection-closed error by the actor task.
    pub async fn stop(&self) {
        let conn = {
            let mut shared = self.inner.shared.lock().unwrap();
            let conn = match &shared.state {
                ClientState::Connected(conn) => Some(conn.clone()),
                _ => None,
            };
            shared.state = ClientState::Disconnected;
            conn
        };
        if let Some(conn) = conn {
            conn.disconnect().await;
        }
    }

    /// Entry point used by every per-command wrapper.
    pub async fn send(
        &self,
        verb: &str,
        args: Vec<Arg>,
        return_kind: ReturnKind,
    ) -> RedisResult<SendOutcome> {
        let verb_upper = verb.to_ascii_uppercase();
        let transform = ResponseTransform::from_verb(&verb_upper);
        let encoding = self.inner.config.encoding;

        let (mut command, rx) = Command::new(
            verb,
            args,
            encoding,
            return_kind,
            tokio::runtime::Handle::current(),
        );

        self.preprocess_subscription(&verb_upper, &mut command)?;
        self.dispatch(command).await;

        let reply = rx
            .await
            .map_err(|_| {
                RedisError::new(
                    ErrorKind::ConnectionClosed,
                    "connection dropped before a reply arrived",
                )
            })??;

        if let Some(outcome) = apply_response_transform(transform, &reply, encoding)? {
            return Ok(outcome);
        }
        project_by_return_kind(reply, return_kind, encoding)
    }

    pub async fn send_text(&self, verb: &str, args: Vec<Arg>) -> RedisResult<Option<String>> {
        match self.send(verb, args, ReturnKind::Text).await? {
            SendOutcome::Text(v) => Ok(v),
            other => Err(outcome_mismatch("text", &other)),
        }
    }

    pub async fn send_integer(&self, verb: &str, args: Vec<Arg>) -> RedisResult<i64> {
        match self.send(verb, args, ReturnKind::Integer).await? {
            SendOutcome::Integer(v) => Ok(v),
            other => Err(outcome_mismatch("integer", &other)),
        }
    }

    pub async fn send_void(&self, verb: &str, args: Vec<Arg>) -> RedisResult<()> {
        match self.send(verb, args, ReturnKind::Void).await? {
            SendOutcome::Void => Ok(()),
            other => Err(outcome_mismatch("void", &other)),
        }
    }

    pub async fn send_list(
        &self,
        verb: &str,
        args: Vec<Arg>,
    ) -> RedisResult<Option<Vec<Option<String>>>> {
        match self.send(verb, args, ReturnKind::List).await? {
            SendOutcome::List(v) => Ok(v),
            other => Err(outcome_mismatch("list", &other)),
        }
    }

    pub async fn send_map(&self, verb: &str, args: Vec<Arg>) -> RedisResult<MapOutcome> {
        match self.send(verb, args, ReturnKind::Map).await? {
            SendOutcome::Map(v) => Ok(v),
            other => Err(outcome_mismatch("map", &other)),
        }
    }

    /// Subscribe/unsubscribe pre-processing: registers or
    /// removes handlers and sets `expected_replies`, before the command
    /// reaches the socket.
    fn preprocess_subscription(&self, verb_upper: &str, command: &mut Command) -> RedisResult<()> {
        let encoding = self.inner.config.encoding;
        match verb_upper {
            "SUBSCRIBE" | "PSUBSCRIBE" => {
                if command.args.is_empty() {
                    return Err(RedisError::new(
                        ErrorKind::UsageError,
                        format!("{verb_upper} requires at least one channel or pattern"),
                    ));
                }
                command.set_expected_replies(command.args.len() as u32);
                let handle = tokio::runtime::Handle::current();
                let mut registry = self.inner.registry.lock().unwrap();
                for arg in &command.args {
                    let name = arg_to_text(arg, encoding)?;
                    if verb_upper == "SUBSCRIBE" {
                        registry.register_channel(name, self.inner.notification_sink.clone(), handle.clone());
                    } else {
                        registry.register_pattern(name, self.inner.notification_sink.clone(), handle.clone());
                    }
                }
                Ok(())
            }
            "UNSUBSCRIBE" | "PUNSUBSCRIBE" => {
                let mut registry = self.inner.registry.lock().unwrap();
                let is_channel = verb_upper == "UNSUBSCRIBE";
                let expected = if !command.args.is_empty() {
                    command.args.len() as u32
                } else if is_channel {
                    registry.channel_size() as u32
                } else {
                    registry.pattern_size() as u32
                };
                // At least one reply is always expected on the wire, even
                // when the registry is already empty (see DESIGN.md).
                command.set_expected_replies(expected.max(1));

                if command.args.is_empty() {
                    if is_channel {
                        registry.unregister_all_channels();
                    } else {
                        registry.unregister_all_patterns();
                    }
                } else {
                    for arg in &command.args {
                        let name = arg_to_text(arg, encoding)?;
                        if is_channel {
                            registry.unregister_channel(&name);
                        } else {
                            registry.unregister_pattern(&name);
                        }
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Hands `command` to the active connection, or buffers it until one is
    /// established.
    async fn dispatch(&self, command: Command) {
        let mut shared = self.inner.shared.lock().unwrap();

        let connected = match &shared.state {
            ClientState::Connected(conn) => Some(conn.clone()),
            _ => None,
        };
        if let Some(conn) = connected {
            drop(shared);
            let _ = conn.send(command).await;
            return;
        }

        let should_connect = matches!(shared.state, ClientState::Disconnected);
        if should_connect {
            shared.state = ClientState::Connecting;
        }
        shared.pending_buffer.push_back(command);
        drop(shared);

        if should_connect {
            let _ = self.connect_and_drain().await;
        }
    }

    /// Connects, then drains the pre-connect buffer in order.
    /// On failure, every buffered sink (including this call's own command,
    /// if it triggered the connect) is completed with the connect error.
    async fn connect_and_drain(&self) -> RedisResult<()> {
        let cfg = &self.inner.config;
        let result = Connection::connect(
            &cfg.host,
            cfg.port,
            self.inner.registry.clone(),
            cfg.address.clone(),
            cfg.encoding,
        )
        .await;

        match result {
            Ok((conn, closed_rx)) => {
                self.spawn_close_watcher(closed_rx);
                loop {
                    let batch = {
                        let mut shared = self.inner.shared.lock().unwrap();
                        if shared.pending_buffer.is_empty() {
                            shared.state = ClientState::Connected(conn.clone());
                            self.inner.notify.notify_waiters();
                            break;
                        }
                        std::mem::take(&mut shared.pending_buffer)
                    };
                    for command in batch {
                        let _ = conn.send(command).await;
                    }
                }
                Ok(())
            }
            Err(err) => {
                loop {
                    let batch = {
                        let mut shared = self.inner.shared.lock().unwrap();
                        if shared.pending_buffer.is_empty() {
                            shared.state = ClientState::Disconnected;
                            self.inner.notify.notify_waiters();
                            break;
                        }
                        std::mem::take(&mut shared.pending_buffer)
                    };
                    for mut command in batch {
                        command.finish(Err(err.clone()));
                    }
                }
                Err(err)
            }
        }
    }

    fn spawn_close_watcher(&self, closed_rx: oneshot::Receiver<RedisError>) {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            if let Ok(err) = closed_rx.await {
                let mut shared = inner.shared.lock().unwrap();
                shared.state = ClientState::Disconnected;
                drop(shared);
                inner.notify.notify_waiters();
                debug!(error = %err, "connection closed; future sends will reconnect lazily");
            }
        });
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn info_transform_groups_sections_and_keeps_top_level_orphans() {
        let text = "orphan:1\r\n# Server\r\nredis_version:7.0.0\r\n\r\n# Stats\r\ntotal_connections_received:42\r\n";
        let parsed = parse_info(text);
        assert_eq!(parsed.top_level.get("orphan").map(String::as_str), Some("1"));
        assert_eq!(
            parsed.sections.get("server").and_then(|s| s.get("redis_version")).map(String::as_str),
            Some("7.0.0")
        );
        assert_eq!(
            parsed
                .sections
                .get("stats")
                .and_then(|s| s.get("total_connections_received"))
                .map(String::as_str),
            Some("42")
        );
    }

    #[test]
    fn info_transform_handles_plain_lf() {
        let text = "# Clients\nconnected_clients:1\n";
        let parsed = parse_info(text);
        assert_eq!(
            parsed.sections.get("clients").and_then(|s| s.get("connected_clients")).map(String::as_str),
            Some("1")
        );
    }
}
