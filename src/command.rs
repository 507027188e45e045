//! Outbound requests and their RESP serialization.

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::oneshot;

use crate::error::RedisResult;
use crate::reply::{Encoding, Reply};

/// The return shape a caller asked for — forwarded into `send` by each of the
/// five typed dispatch entry points (`send_text`, `send_integer`, `send_void`,
/// `send_list`, `send_map`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Text,
    Integer,
    Void,
    List,
    Map,
}

/// A single command argument. Non-byte-string arguments are rendered through
/// `encoding`; numeric arguments render base-10.
#[derive(Debug, Clone)]
pub enum Arg {
    Bytes(Bytes),
    Text(String),
    Integer(i64),
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Text(s.to_owned())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Text(s)
    }
}

impl From<i64> for Arg {
    fn from(n: i64) -> Self {
        Arg::Integer(n)
    }
}

impl From<Bytes> for Arg {
    fn from(b: Bytes) -> Self {
        Arg::Bytes(b)
    }
}

impl Arg {
    fn render(&self, encoding: Encoding) -> Bytes {
        match self {
            Arg::Bytes(b) => b.clone(),
            Arg::Integer(n) => Bytes::from(n.to_string().into_bytes()),
            Arg::Text(s) => match encoding {
                Encoding::Utf8 => Bytes::from(s.clone().into_bytes()),
                Encoding::Latin1 => Bytes::from(s.chars().map(|c| c as u8).collect::<Vec<u8>>()),
            },
        }
    }
}

/// An outbound request.
///
/// Each `send` owns a single `oneshot` sender that resolves the `Future` the
/// caller is awaiting (`reply_sink`); `context` is the executor handle any
/// pub/sub side effects registered alongside this command (subscribe and
/// unsubscribe) run their notification delivery on.
pub struct Command {
    pub verb: String,
    pub args: Vec<Arg>,
    pub encoding: Encoding,
    pub expected_replies: u32,
    pub return_kind: ReturnKind,
    pub context: tokio::runtime::Handle,
    remaining: u32,
    reply_sink: Option<oneshot::Sender<RedisResult<Reply>>>,
}

impl Command {
    pub fn new(
        verb: impl Into<String>,
        args: Vec<Arg>,
        encoding: Encoding,
        return_kind: ReturnKind,
        context: tokio::runtime::Handle,
    ) -> (Self, oneshot::Receiver<RedisResult<Reply>>) {
        let (tx, rx) = oneshot::channel();
        let cmd = Command {
            verb: verb.into(),
            args,
            encoding,
            expected_replies: 1,
            return_kind,
            context,
            remaining: 1,
            reply_sink: Some(tx),
        };
        (cmd, rx)
    }

    /// Overrides the default single-reply expectation; used for the
    /// subscribe/unsubscribe family.
    pub fn set_expected_replies(&mut self, n: u32) {
        self.expected_replies = n.max(1);
        self.remaining = self.expected_replies;
    }

    /// Serializes this command as RESP: an Array of `k+1` Bulk strings (verb
    /// plus each argument).
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_slice(format!("*{}\r\n", self.args.len() + 1).as_bytes());
        write_bulk(&mut buf, self.verb.as_bytes());
        for arg in &self.args {
            write_bulk(&mut buf, &arg.render(self.encoding));
        }
        buf.freeze()
    }

    /// Feeds one inbound reply into this command's accumulator. Returns
    /// `true` once `expected_replies` have all arrived, at which point the
    /// command is finished and should be popped from the pending FIFO.
    pub fn accumulate(&mut self, reply: Reply) -> bool {
        self.remaining = self.remaining.saturating_sub(1);
        let done = self.remaining == 0;
        if done {
            self.finish(Ok(reply));
        } else {
            // Subscribe/unsubscribe confirmations prior to the last one are
            // dropped; the sink fires once with the final confirmation,
            // matching the existing user-facing contract.
        }
        done
    }

    /// Completes this command's sink with `result`. Idempotent: a second
    /// call (e.g. from connection teardown racing a late reply) is a no-op.
    pub fn finish(&mut self, result: RedisResult<Reply>) {
        if let Some(sink) = self.reply_sink.take() {
            let _ = sink.send(result);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.reply_sink.is_none()
    }
}

fn write_bulk(buf: &mut BytesMut, data: &[u8]) {
    buf.put_slice(format!("${}\r\n", data.len()).as_bytes());
    buf.put_slice(data);
    buf.put_slice(b"\r\n");
}
