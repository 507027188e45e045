//! The decoded server reply type and its typed projections.

use std::collections::HashMap;

use bytes::Bytes;

use crate::error::{ErrorKind, RedisError, RedisResult};

/// Text encoding used to decode bulk/simple strings into Rust `String`s.
///
/// Only the two encodings a Redis-style server realistically sends back are
/// supported; exotic multi-byte encodings are not worth the dependency for a
/// wire-protocol engine whose payloads are, in practice, UTF-8 or raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1: every byte maps 1:1 onto the Unicode scalar value of the
    /// same ordinal, so this never fails to decode.
    Latin1,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Utf8
    }
}

impl Encoding {
    pub(crate) fn decode(&self, bytes: &[u8]) -> RedisResult<String> {
        match self {
            Encoding::Utf8 => std::str::from_utf8(bytes).map(str::to_owned).map_err(|_| {
                RedisError::new(ErrorKind::ProjectionError, "bulk payload is not valid UTF-8")
            }),
            Encoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }
}

/// A decoded server reply: a tagged union over the five RESP types.
///
/// `Bulk` and `Array` distinguish a null reply from an empty one, matching
/// the wire's `$-1\r\n` / `*-1\r\n` frames.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    SimpleString(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Bytes>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    pub fn is_nil(&self) -> bool {
        matches!(self, Reply::Bulk(None) | Reply::Array(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// If this reply is a RESP error, turn it into a [`RedisError`].
    pub fn into_server_error(self) -> Option<RedisError> {
        match self {
            Reply::Error(msg) => Some(RedisError::new(ErrorKind::ServerError, msg)),
            _ => None,
        }
    }

    /// Project this reply as text: `SimpleString`/`Bulk` decode using
    /// `encoding`, `Integer` renders base-10, a null bulk projects to `None`.
    pub fn to_text(&self, encoding: Encoding) -> RedisResult<Option<String>> {
        match self {
            Reply::SimpleString(s) => Ok(Some(s.clone())),
            Reply::Bulk(Some(bytes)) => Ok(Some(encoding.decode(bytes)?)),
            Reply::Bulk(None) => Ok(None),
            Reply::Integer(i) => Ok(Some(i.to_string())),
            Reply::Error(msg) => Err(RedisError::new(ErrorKind::ServerError, msg.clone())),
            Reply::Array(_) => Err(RedisError::new(
                ErrorKind::ProjectionError,
                "cannot project an array reply to text",
            )),
        }
    }

    /// Project this reply as an integer.
    pub fn to_integer(&self) -> RedisResult<i64> {
        match self {
            Reply::Integer(i) => Ok(*i),
            Reply::SimpleString(s) => parse_base10(s),
            Reply::Bulk(Some(bytes)) => {
                let text = std::str::from_utf8(bytes).map_err(|_| projection_err())?;
                parse_base10(text)
            }
            Reply::Error(msg) => Err(RedisError::new(ErrorKind::ServerError, msg.clone())),
            Reply::Bulk(None) | Reply::Array(_) => Err(projection_err()),
        }
    }

    /// Project this reply as a list: each array element is text-projected,
    /// preserving nulls; a non-array reply is an error.
    pub fn to_list(&self, encoding: Encoding) -> RedisResult<Option<Vec<Option<String>>>> {
        match self {
            Reply::Array(Some(items)) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    out.push(item.to_text(encoding)?);
                }
                Ok(Some(out))
            }
            Reply::Array(None) => Ok(None),
            Reply::Error(msg) => Err(RedisError::new(ErrorKind::ServerError, msg.clone())),
            _ => Err(projection_err()),
        }
    }

    /// Project this reply as a map: an even-length array is interpreted as
    /// alternating key/value pairs, both text-projected; odd length is an
    /// error.
    pub fn to_map(&self, encoding: Encoding) -> RedisResult<Option<HashMap<String, Option<String>>>> {
        match self {
            Reply::Array(Some(items)) => {
                if items.len() % 2 != 0 {
                    return Err(RedisError::new(
                        ErrorKind::ProjectionError,
                        "array reply has odd length; cannot project to a map",
                    ));
                }
                let mut map = HashMap::with_capacity(items.len() / 2);
                let mut iter = items.iter();
                while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                    let key = key.to_text(encoding)?.ok_or_else(|| {
                        RedisError::new(ErrorKind::ProjectionError, "map key projected to nil")
                    })?;
                    map.insert(key, value.to_text(encoding)?);
                }
                Ok(Some(map))
            }
            Reply::Array(None) => Ok(None),
            Reply::Error(msg) => Err(RedisError::new(ErrorKind::ServerError, msg.clone())),
            _ => Err(projection_err()),
        }
    }
}

fn projection_err() -> RedisError {
    RedisError::new(
        ErrorKind::ProjectionError,
        "reply type is incompatible with the requested return kind",
    )
}

fn parse_base10(text: &str) -> RedisResult<i64> {
    text.trim().parse::<i64>().map_err(|_| projection_err())
}
