//! Incremental RESP decoder.
//!
//! [`RespCodec`] implements [`tokio_util::codec::Decoder`], so
//! [`crate::connection::Connection`] can drive it directly with
//! `tokio_util::codec::FramedRead`. [`Parser`] wraps the codec with its own
//! `BytesMut` buffer and exposes a plain `feed` method for callers (and
//! tests) that want to push raw bytes without standing up a `Framed` stream.

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::{ErrorKind, RedisError, RedisResult};
use crate::reply::Reply;

/// A `Decoder` over RESP frames. Restartable: if `decode` is called with a
/// buffer that ends mid-frame it returns `Ok(None)` without consuming
/// anything, and the next call (with more bytes appended) resumes.
#[derive(Debug, Default)]
pub struct RespCodec;

impl Decoder for RespCodec {
    type Item = Reply;
    type Error = RedisError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Reply>, RedisError> {
        let buf: &[u8] = &src[..];
        match parse_frame(buf)? {
            Some((reply, consumed)) => {
                src.advance(consumed);
                Ok(Some(reply))
            }
            None => Ok(None),
        }
    }
}

/// A standalone incremental decoder exposing a plain `feed(bytes) →
/// Vec<Reply>` method.
#[derive(Debug, Default)]
pub struct Parser {
    codec: RespCodec,
    buffer: BytesMut,
}

impl Parser {
    pub fn new() -> Self {
        Parser {
            codec: RespCodec,
            buffer: BytesMut::new(),
        }
    }

    /// Feed newly-arrived bytes; returns every whole `Reply` that can now be
    /// decoded. Partial trailing bytes are retained for the next call.
    pub fn feed(&mut self, bytes: &[u8]) -> RedisResult<Vec<Reply>> {
        self.buffer.extend_from_slice(bytes);
        let mut replies = Vec::new();
        while let Some(reply) = self.codec.decode(&mut self.buffer)? {
            replies.push(reply);
        }
        Ok(replies)
    }
}

fn protocol_err(message: impl Into<String>) -> RedisError {
    RedisError::new(ErrorKind::ProtocolError, message)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

fn parse_integer(line: &[u8]) -> RedisResult<i64> {
    let text = std::str::from_utf8(line)
        .map_err(|_| protocol_err("non-ASCII digits in a length/integer field"))?;
    text.parse::<i64>()
        .map_err(|_| protocol_err(format!("malformed integer field: {text:?}")))
}

/// Parses at most one complete top-level frame from the front of `buf`.
///
/// Returns `Ok(None)` if `buf` does not yet contain a whole frame. On
/// success, returns the decoded `Reply` and the number of bytes it occupied,
/// so the caller (and recursive array elements) can advance past it.
fn parse_frame(buf: &[u8]) -> RedisResult<Option<(Reply, usize)>> {
    if buf.is_empty() {
        return Ok(None);
    }

    let tag = buf[0];
    let rest = &buf[1..];
    let crlf_pos = match find_crlf(rest) {
        Some(p) => p,
        None => return Ok(None),
    };
    let line = &rest[..crlf_pos];
    let header_len = 1 + crlf_pos + 2;

    match tag {
        b'+' => {
            let text = std::str::from_utf8(line)
                .map_err(|_| protocol_err("invalid UTF-8 in simple string reply"))?
                .to_owned();
            Ok(Some((Reply::SimpleString(text), header_len)))
        }
        b'-' => {
            let text = std::str::from_utf8(line)
                .map_err(|_| protocol_err("invalid UTF-8 in error reply"))?
                .to_owned();
            Ok(Some((Reply::Error(text), header_len)))
        }
        b':' => {
            let n = parse_integer(line)?;
            Ok(Some((Reply::Integer(n), header_len)))
        }
        b'$' => {
            let n = parse_integer(line)?;
            if n == -1 {
                return Ok(Some((Reply::Bulk(None), header_len)));
            }
            if n < 0 {
                return Err(protocol_err("malformed bulk length"));
            }
            let n = n as usize;
            let data_end = header_len + n;
            let total = data_end + 2;
            if buf.len() < total {
                return Ok(None);
            }
            if &buf[data_end..total] != b"\r\n" {
                return Err(protocol_err("missing CRLF terminator after bulk payload"));
            }
            let data = Bytes::copy_from_slice(&buf[header_len..data_end]);
            Ok(Some((Reply::Bulk(Some(data)), total)))
        }
        b'*' => {
            let n = parse_integer(line)?;
            if n == -1 {
                return Ok(Some((Reply::Array(None), header_len)));
            }
            if n < 0 {
                return Err(protocol_err("malformed array length"));
            }
            let mut items = Vec::with_capacity(n as usize);
            let mut pos = header_len;
            for _ in 0..n {
                match parse_frame(&buf[pos..])? {
                    Some((reply, consumed)) => {
                        items.push(reply);
                        pos += consumed;
                    }
                    None => return Ok(None),
                }
            }
            Ok(Some((Reply::Array(Some(items)), pos)))
        }
        other => Err(protocol_err(format!(
            "unrecognized RESP type tag: {:?}",
            other as char
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_string() {
        let mut p = Parser::new();
        let replies = p.feed(b"+OK\r\n").unwrap();
        assert_eq!(replies, vec![Reply::SimpleString("OK".into())]);
    }

    #[test]
    fn parses_error() {
        let mut p = Parser::new();
        let replies = p.feed(b"-ERR wrong type\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Error("ERR wrong type".into())]);
    }

    #[test]
    fn parses_integer() {
        let mut p = Parser::new();
        let replies = p.feed(b":1000\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Integer(1000)]);
    }

    #[test]
    fn parses_negative_integer() {
        let mut p = Parser::new();
        let replies = p.feed(b":-5\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Integer(-5)]);
    }

    #[test]
    fn parses_bulk_string() {
        let mut p = Parser::new();
        let replies = p.feed(b"$5\r\nhello\r\n").unwrap();
        assert_eq!(
            replies,
            vec![Reply::Bulk(Some(Bytes::from_static(b"hello")))]
        );
    }

    #[test]
    fn parses_null_bulk() {
        let mut p = Parser::new();
        let replies = p.feed(b"$-1\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Bulk(None)]);
    }

    #[test]
    fn parses_null_array() {
        let mut p = Parser::new();
        let replies = p.feed(b"*-1\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Array(None)]);
    }

    #[test]
    fn parses_empty_array() {
        let mut p = Parser::new();
        let replies = p.feed(b"*0\r\n").unwrap();
        assert_eq!(replies, vec![Reply::Array(Some(vec![]))]);
    }

    #[test]
    fn parses_nested_array() {
        let mut p = Parser::new();
        let replies = p
            .feed(b"*2\r\n$3\r\nfoo\r\n*1\r\n:1\r\n")
            .unwrap();
        assert_eq!(
            replies,
            vec![Reply::Array(Some(vec![
                Reply::Bulk(Some(Bytes::from_static(b"foo"))),
                Reply::Array(Some(vec![Reply::Integer(1)])),
            ]))]
        );
    }

    #[test]
    fn resumes_across_partial_reads() {
        let mut p = Parser::new();
        assert_eq!(p.feed(b"$5\r\nhel").unwrap(), vec![]);
        let replies = p.feed(b"lo\r\n").unwrap();
        assert_eq!(
            replies,
            vec![Reply::Bulk(Some(Bytes::from_static(b"hello")))]
        );
    }

    #[test]
    fn feeding_byte_by_byte_matches_feeding_whole_buffer() {
        let whole = b"*3\r\n:1\r\n:2\r\n:3\r\n";

        let mut whole_parser = Parser::new();
        let whole_result = whole_parser.feed(whole).unwrap();

        let mut incremental_parser = Parser::new();
        let mut incremental_result = Vec::new();
        for byte in whole {
            incremental_result.extend(incremental_parser.feed(&[*byte]).unwrap());
        }

        assert_eq!(whole_result, incremental_result);
    }

    #[test]
    fn multiple_replies_in_one_feed_are_all_returned() {
        let mut p = Parser::new();
        let replies = p.feed(b"+OK\r\n:1\r\n$-1\r\n").unwrap();
        assert_eq!(
            replies,
            vec![
                Reply::SimpleString("OK".into()),
                Reply::Integer(1),
                Reply::Bulk(None),
            ]
        );
    }

    #[test]
    fn malformed_length_is_a_protocol_error() {
        let mut p = Parser::new();
        let err = p.feed(b"$abc\r\nhello\r\n").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }

    #[test]
    fn missing_terminator_after_bulk_is_a_protocol_error() {
        let mut p = Parser::new();
        let err = p.feed(b"$5\r\nhelloXX").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ProtocolError);
    }
}
