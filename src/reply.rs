//! Reply payloads.
//!
//! The engine never looks inside a reply. Protocol adapters ask the matched
//! mock for the variant they can serve and get a typed
//! [`ReplyError`](crate::error::ReplyError) when the mock was registered
//! with a reply for another protocol.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Protocol family of a [`Reply`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyKind {
    Http,
    Unary,
    Stream,
}

impl fmt::Display for ReplyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyKind::Http => f.write_str("http"),
            ReplyKind::Unary => f.write_str("unary"),
            ReplyKind::Stream => f.write_str("stream"),
        }
    }
}

/// Reply served by a matched mock.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Http(HttpReply),
    Unary(UnaryReply),
    Stream(StreamReply),
}

impl Reply {
    pub fn kind(&self) -> ReplyKind {
        match self {
            Reply::Http(_) => ReplyKind::Http,
            Reply::Unary(_) => ReplyKind::Unary,
            Reply::Stream(_) => ReplyKind::Stream,
        }
    }

    pub fn as_http(&self) -> Option<&HttpReply> {
        match self {
            Reply::Http(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn as_unary(&self) -> Option<&UnaryReply> {
        match self {
            Reply::Unary(reply) => Some(reply),
            _ => None,
        }
    }

    pub fn as_stream(&self) -> Option<&StreamReply> {
        match self {
            Reply::Stream(reply) => Some(reply),
            _ => None,
        }
    }
}

impl From<HttpReply> for Reply {
    fn from(reply: HttpReply) -> Self {
        Reply::Http(reply)
    }
}

impl From<UnaryReply> for Reply {
    fn from(reply: UnaryReply) -> Self {
        Reply::Unary(reply)
    }
}

impl From<StreamReply> for Reply {
    fn from(reply: StreamReply) -> Self {
        Reply::Stream(reply)
    }
}

/// Canned HTTP response.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpReply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpReply {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Serialize `value` as the body and set a JSON content type unless one
    /// is already present.
    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.body = Bytes::from(serde_json::to_vec(value)?);
        if self.content_type().is_none() {
            self = self.header("Content-Type", "application/json");
        }
        Ok(self)
    }

    /// Case-insensitive header lookup.
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.get_header("content-type")
    }
}

/// Status attached to an RPC reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStatus {
    pub code: i32,
    pub message: String,
}

/// Canned unary RPC response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UnaryReply {
    pub message: serde_json::Value,
    pub header: Vec<(String, String)>,
    pub trailer: Vec<(String, String)>,
    /// When set, the call fails with this status instead of returning `message`.
    pub status: Option<RpcStatus>,
}

impl UnaryReply {
    pub fn new(message: serde_json::Value) -> Self {
        Self {
            message,
            ..Default::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.push((name.into(), value.into()));
        self
    }

    pub fn trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailer.push((name.into(), value.into()));
        self
    }

    pub fn status(mut self, code: i32, message: impl Into<String>) -> Self {
        self.status = Some(RpcStatus {
            code,
            message: message.into(),
        });
        self
    }
}

/// Canned server-streaming RPC response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamReply {
    pub messages: Vec<serde_json::Value>,
    pub header: Vec<(String, String)>,
    pub trailer: Vec<(String, String)>,
}

impl StreamReply {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn send(mut self, message: serde_json::Value) -> Self {
        self.messages.push(message);
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.header.push((name.into(), value.into()));
        self
    }

    pub fn trailer(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.trailer.push((name.into(), value.into()));
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body_sets_content_type() {
        let reply = HttpReply::ok().json(&json!({"message": "hi"})).unwrap();
        assert_eq!(reply.content_type(), Some("application/json"));
        assert_eq!(&reply.body[..], br#"{"message":"hi"}"#);
    }

    #[test]
    fn test_json_body_keeps_explicit_content_type() {
        let reply = HttpReply::new(201)
            .header("content-type", "application/vnd.api+json")
            .json(&json!([1, 2]))
            .unwrap();
        assert_eq!(reply.content_type(), Some("application/vnd.api+json"));
        assert_eq!(reply.headers.len(), 1);
    }

    #[test]
    fn test_variant_accessors() {
        let reply: Reply = UnaryReply::new(json!({"id": 1})).status(5, "not found").into();
        assert_eq!(reply.kind(), ReplyKind::Unary);
        assert!(reply.as_http().is_none());
        assert!(reply.as_stream().is_none());
        assert_eq!(reply.as_unary().unwrap().status.as_ref().unwrap().code, 5);

        let reply: Reply = StreamReply::new().send(json!(1)).send(json!(2)).into();
        assert_eq!(reply.as_stream().unwrap().messages.len(), 2);
        assert_eq!(ReplyKind::Stream.to_string(), "stream");
    }
}
