//! Pub/sub channel & pattern registry and the notification
//! sink contract pub/sub pushes are delivered through.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc;

/// A pub/sub push, ready to hand to an external notification sink.
///
/// A channel push carries `{channel, message}`; a pattern push carries
/// `{pattern, channel, message}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Channel { channel: String, message: String },
    Pattern {
        pattern: String,
        channel: String,
        message: String,
    },
}

/// The external collaborator pub/sub messages are delivered to. One
/// implementation might push onto an event bus address, another onto an
/// `mpsc` channel — the registry only needs `notify` to exist.
pub trait NotificationSink: Send + Sync {
    /// `address` is `base_address + "." + channel_or_pattern`.
    fn notify(&self, address: &str, notification: Notification);
}

/// A registered subscription handler. Delivery to `sink` happens on a single
/// dedicated task spawned once at registration time, fed through an ordered
/// queue — so two pushes for the same handler always reach `notify` in the
/// order they were dispatched, regardless of how the executor schedules
/// tasks. A per-message `spawn` would not give that guarantee: two
/// independent fire-and-forget tasks racing on a multi-thread runtime can be
/// polled in either order.
#[derive(Clone)]
struct Handler {
    queue: mpsc::UnboundedSender<(String, Notification)>,
}

impl Handler {
    fn new(sink: Arc<dyn NotificationSink>, context: tokio::runtime::Handle) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Notification)>();
        context.spawn(async move {
            while let Some((address, notification)) = rx.recv().await {
                sink.notify(&address, notification);
            }
        });
        Handler { queue: tx }
    }

    /// Enqueues a delivery. The handler's drain task may have already exited
    /// (e.g. the owning connection's runtime shut down); a closed queue is
    /// not an error here, it just means nothing is listening anymore.
    fn deliver(&self, address: String, notification: Notification) {
        let _ = self.queue.send((address, notification));
    }
}

/// Maps channel names and glob patterns to notification handlers.
#[derive(Default)]
pub struct SubscriptionRegistry {
    channels: HashMap<String, Vec<Handler>>,
    patterns: HashMap<String, Vec<Handler>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        SubscriptionRegistry {
            channels: HashMap::new(),
            patterns: HashMap::new(),
        }
    }

    pub fn register_channel(
        &mut self,
        channel: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
        context: tokio::runtime::Handle,
    ) {
        self.channels
            .entry(channel.into())
            .or_default()
            .push(Handler::new(sink, context));
    }

    pub fn register_pattern(
        &mut self,
        pattern: impl Into<String>,
        sink: Arc<dyn NotificationSink>,
        context: tokio::runtime::Handle,
    ) {
        self.patterns
            .entry(pattern.into())
            .or_default()
            .push(Handler::new(sink, context));
    }

    pub fn unregister_channel(&mut self, channel: &str) {
        self.channels.remove(channel);
    }

    pub fn unregister_all_channels(&mut self) {
        self.channels.clear();
    }

    pub fn unregister_pattern(&mut self, pattern: &str) {
        self.patterns.remove(pattern);
    }

    pub fn unregister_all_patterns(&mut self) {
        self.patterns.clear();
    }

    pub fn channel_size(&self) -> usize {
        self.channels.len()
    }

    pub fn pattern_size(&self) -> usize {
        self.patterns.len()
    }

    /// Forwards a channel `message` push to every handler registered under
    /// `channel`. Returns `false` if no handler matched (the caller logs and
    /// discards the push).
    pub fn dispatch_channel(&self, address: &str, channel: &str, message: String) -> bool {
        match self.channels.get(channel) {
            Some(handlers) if !handlers.is_empty() => {
                let full_address = format!("{address}.{channel}");
                for handler in handlers {
                    let notification = Notification::Channel {
                        channel: channel.to_owned(),
                        message: message.clone(),
                    };
                    handler.deliver(full_address.clone(), notification);
                }
                true
            }
            _ => false,
        }
    }

    /// Forwards a `pmessage` push to every handler registered under
    /// `pattern`. Returns `false` if no handler matched.
    pub fn dispatch_pattern(
        &self,
        address: &str,
        pattern: &str,
        channel: &str,
        message: String,
    ) -> bool {
        match self.patterns.get(pattern) {
            Some(handlers) if !handlers.is_empty() => {
                let full_address = format!("{address}.{pattern}");
                for handler in handlers {
                    let notification = Notification::Pattern {
                        pattern: pattern.to_owned(),
                        channel: channel.to_owned(),
                        message: message.clone(),
                    };
                    handler.deliver(full_address.clone(), notification);
                }
                true
            }
            _ => false,
        }
    }
}
