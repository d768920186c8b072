//! Minimal RESP2 codec, just enough for GET / SET PX / DEL / PING /
//! AUTH / SELECT.
//!
//! # Wire format
//!
//! ```text
//! Client → Server (array of bulk strings):
//!   *3\r\n$3\r\nGET\r\n...
//!
//! Server → Client:
//!   +OK\r\n            simple string
//!   -ERR msg\r\n       error
//!   :1\r\n             integer
//!   $5\r\nhello\r\n    bulk string ($-1 = nil)
//!   *2\r\n...          array (*-1 = nil)
//! ```

use std::io::BufRead;

use crate::error::{StoreError, StoreResult};

/// Largest bulk payload accepted from the server.
const MAX_BULK_LEN: i64 = 16 * 1024 * 1024;

/// Nesting limit for arrays in a reply.
const MAX_DEPTH: usize = 8;

/// A decoded server reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Simple(String),
    Error(String),
    Integer(i64),
    Bulk(Option<Vec<u8>>),
    Array(Option<Vec<Reply>>),
}

impl Reply {
    /// Turn `-ERR` replies into [`StoreError::Server`].
    pub fn into_result(self) -> StoreResult<Reply> {
        match self {
            Reply::Error(msg) => Err(StoreError::Server(msg)),
            other => Ok(other),
        }
    }
}

/// Encode a command as a RESP array of bulk strings.
pub fn encode_command(args: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::with_capacity(16 + args.iter().map(|a| a.len() + 16).sum::<usize>());
    out.extend_from_slice(format!("*{}\r\n", args.len()).as_bytes());
    for arg in args {
        out.extend_from_slice(format!("${}\r\n", arg.len()).as_bytes());
        out.extend_from_slice(arg);
        out.extend_from_slice(b"\r\n");
    }
    out
}

/// Read one complete reply.
pub fn read_reply<R: BufRead>(reader: &mut R) -> StoreResult<Reply> {
    read_reply_at(reader, 0)
}

fn read_reply_at<R: BufRead>(reader: &mut R, depth: usize) -> StoreResult<Reply> {
    if depth > MAX_DEPTH {
        return Err(StoreError::Protocol("reply nested too deeply".to_string()));
    }

    let line = read_line(reader)?;
    let (tag, rest) = line
        .split_first()
        .ok_or_else(|| StoreError::Protocol("empty reply line".to_string()))?;
    let text = || String::from_utf8_lossy(rest).into_owned();

    match tag {
        b'+' => Ok(Reply::Simple(text())),
        b'-' => Ok(Reply::Error(text())),
        b':' => Ok(Reply::Integer(parse_int(rest)?)),
        b'$' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Bulk(None));
            }
            if len > MAX_BULK_LEN {
                return Err(StoreError::Protocol(format!("bulk length {len} too large")));
            }
            let mut buf = vec![0u8; len as usize + 2];
            reader
                .read_exact(&mut buf)
                .map_err(|e| StoreError::from_io("read bulk", e))?;
            if !buf.ends_with(b"\r\n") {
                return Err(StoreError::Protocol("bulk string not terminated".to_string()));
            }
            buf.truncate(len as usize);
            Ok(Reply::Bulk(Some(buf)))
        }
        b'*' => {
            let len = parse_int(rest)?;
            if len < 0 {
                return Ok(Reply::Array(None));
            }
            let mut items = Vec::with_capacity(len.min(64) as usize);
            for _ in 0..len {
                items.push(read_reply_at(reader, depth + 1)?);
            }
            Ok(Reply::Array(Some(items)))
        }
        other => Err(StoreError::Protocol(format!(
            "unexpected reply type byte 0x{other:02x}"
        ))),
    }
}

/// Read a CRLF-terminated line, returning it without the terminator.
fn read_line<R: BufRead>(reader: &mut R) -> StoreResult<Vec<u8>> {
    let mut line = Vec::new();
    let n = reader
        .read_until(b'\n', &mut line)
        .map_err(|e| StoreError::from_io("read reply", e))?;
    if n == 0 {
        return Err(StoreError::Protocol("connection closed by server".to_string()));
    }
    if !line.ends_with(b"\r\n") {
        return Err(StoreError::Protocol("reply line not terminated".to_string()));
    }
    line.truncate(line.len() - 2);
    Ok(line)
}

fn parse_int(raw: &[u8]) -> StoreResult<i64> {
    std::str::from_utf8(raw)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .ok_or_else(|| {
            StoreError::Protocol(format!("invalid integer {:?}", String::from_utf8_lossy(raw)))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode(bytes: &[u8]) -> StoreResult<Reply> {
        read_reply(&mut Cursor::new(bytes.to_vec()))
    }

    #[test]
    fn encodes_set_with_expiry() {
        let cmd = encode_command(&[b"SET", b"lease-holder", b"v", b"PX", b"90000"]);
        assert_eq!(
            cmd,
            b"*5\r\n$3\r\nSET\r\n$12\r\nlease-holder\r\n$1\r\nv\r\n$2\r\nPX\r\n$5\r\n90000\r\n"
                .to_vec()
        );
    }

    #[test]
    fn decodes_scalar_replies() {
        assert_eq!(decode(b"+OK\r\n").unwrap(), Reply::Simple("OK".to_string()));
        assert_eq!(decode(b":1\r\n").unwrap(), Reply::Integer(1));
        assert_eq!(decode(b"$-1\r\n").unwrap(), Reply::Bulk(None));
        assert_eq!(
            decode(b"$5\r\nhello\r\n").unwrap(),
            Reply::Bulk(Some(b"hello".to_vec()))
        );
    }

    #[test]
    fn bulk_may_contain_crlf() {
        assert_eq!(
            decode(b"$4\r\na\r\nb\r\n").unwrap(),
            Reply::Bulk(Some(b"a\r\nb".to_vec()))
        );
    }

    #[test]
    fn decodes_arrays() {
        let reply = decode(b"*2\r\n$1\r\na\r\n:7\r\n").unwrap();
        assert_eq!(
            reply,
            Reply::Array(Some(vec![Reply::Bulk(Some(b"a".to_vec())), Reply::Integer(7)]))
        );
        assert_eq!(decode(b"*-1\r\n").unwrap(), Reply::Array(None));
    }

    #[test]
    fn server_errors_become_store_errors() {
        let reply = decode(b"-NOAUTH Authentication required.\r\n").unwrap();
        match reply.into_result() {
            Err(StoreError::Server(msg)) => assert!(msg.starts_with("NOAUTH")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(matches!(decode(b""), Err(StoreError::Protocol(_))));
        assert!(matches!(decode(b"+OK\n"), Err(StoreError::Protocol(_))));
        assert!(matches!(decode(b"?what\r\n"), Err(StoreError::Protocol(_))));
        assert!(matches!(decode(b":abc\r\n"), Err(StoreError::Protocol(_))));
        assert!(decode(b"$5\r\nhi\r\n").is_err());
    }
}
