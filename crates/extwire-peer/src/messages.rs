//! Payload messages carried in the envelope `content` of the built-in
//! commands.
//!
//! Field numbers follow the host's proto2 schema, so presence-required
//! fields are declared `required` and always written.

use bytes::Bytes;

/// Severity of a `MESSAGE` sent to the host's message bus.
///
/// Values are bit flags on the host side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum MessageType {
    Debug = 1,
    Info = 2,
    Error = 4,
    Alert = 8,
    Fatal = 16,
}

impl MessageType {
    /// Lower-case name, as used on the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Error => "error",
            Self::Alert => "alert",
            Self::Fatal => "fatal",
        }
    }
}

/// `PING` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Ping {}

/// `PONG` payload, echoing the sequence number of the ping it answers.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Pong {
    #[prost(uint64, required, tag = "1")]
    pub ping_seqno: u64,
}

/// `SHUTDOWN` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Shutdown {
    #[prost(string, optional, tag = "1")]
    pub reason: Option<String>,
}

/// `MESSAGE` payload, also embedded in datasource reports.
#[derive(Clone, PartialEq, prost::Message)]
pub struct MsgbusMessage {
    #[prost(string, required, tag = "1")]
    pub msgtext: String,
    #[prost(enumeration = "MessageType", required, tag = "2")]
    pub msgtype: i32,
}

impl MsgbusMessage {
    pub fn new(text: impl Into<String>, kind: MessageType) -> Self {
        Self {
            msgtext: text.into(),
            msgtype: kind as i32,
        }
    }

    /// Severity, or `None` if the host sent a value outside [`MessageType`].
    pub fn kind(&self) -> Option<MessageType> {
        MessageType::try_from(self.msgtype).ok()
    }
}

/// `HTTPREGISTERURI` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpRegisterUri {
    #[prost(string, required, tag = "1")]
    pub method: String,
    #[prost(string, required, tag = "2")]
    pub uri: String,
    #[prost(bool, required, tag = "3")]
    pub auth_required: bool,
}

/// Name/value pair of a proxied request's form or query variables.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpVariable {
    #[prost(string, required, tag = "1")]
    pub field: String,
    #[prost(string, required, tag = "2")]
    pub content: String,
}

/// `HTTPREQUEST` payload: an HTTP request the host proxies to the helper.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpRequest {
    #[prost(uint32, required, tag = "1")]
    pub req_id: u32,
    #[prost(string, required, tag = "2")]
    pub uri: String,
    #[prost(string, required, tag = "3")]
    pub method: String,
    #[prost(message, repeated, tag = "4")]
    pub variable_data: Vec<HttpVariable>,
}

impl HttpRequest {
    /// Value of the first variable named `field`.
    pub fn variable(&self, field: &str) -> Option<&str> {
        self.variable_data
            .iter()
            .find(|v| v.field == field)
            .map(|v| v.content.as_str())
    }
}

/// Response header sent back with an `HTTPRESPONSE`.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpHeader {
    #[prost(string, required, tag = "1")]
    pub header: String,
    #[prost(string, required, tag = "2")]
    pub content: String,
}

/// `HTTPRESPONSE` payload: one chunk of a response, or its closing frame.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpResponse {
    #[prost(uint32, required, tag = "1")]
    pub req_id: u32,
    #[prost(message, repeated, tag = "2")]
    pub header_content: Vec<HttpHeader>,
    #[prost(bytes = "bytes", optional, tag = "3")]
    pub content: Option<Bytes>,
    #[prost(uint32, optional, tag = "4")]
    pub resultcode: Option<u32>,
    #[prost(bool, optional, tag = "5")]
    pub close_response: Option<bool>,
}

impl HttpResponse {
    /// Whether this frame completes the response.
    pub fn is_closing(&self) -> bool {
        self.close_response.unwrap_or(false)
    }
}

/// `HTTPAUTHREQ` payload.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpAuthTokenRequest {}

/// `HTTPAUTH` payload carrying the session token granted by the host.
#[derive(Clone, PartialEq, prost::Message)]
pub struct HttpAuthToken {
    #[prost(string, required, tag = "1")]
    pub token: String,
}

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn pong_layout() {
        let pong = Pong { ping_seqno: 300 };
        assert_eq!(pong.encode_to_vec(), vec![0x08, 0xAC, 0x02]);
    }

    #[test]
    fn empty_messages_encode_to_nothing() {
        assert!(Ping {}.encode_to_vec().is_empty());
        assert!(HttpAuthTokenRequest {}.encode_to_vec().is_empty());
        assert!(Shutdown::default().encode_to_vec().is_empty());
    }

    #[test]
    fn message_type_roundtrip() {
        let msg = MsgbusMessage::new("source opened", MessageType::Alert);
        let decoded = MsgbusMessage::decode(msg.encode_to_vec().as_slice()).unwrap();

        assert_eq!(decoded.msgtext, "source opened");
        assert_eq!(decoded.kind(), Some(MessageType::Alert));
        assert_eq!(MessageType::Alert.as_str(), "alert");
    }

    #[test]
    fn unknown_message_type_is_preserved_raw() {
        let msg = MsgbusMessage {
            msgtext: "x".into(),
            msgtype: 3,
        };
        assert_eq!(msg.kind(), None);
    }

    #[test]
    fn request_variables_lookup() {
        let req = HttpRequest {
            req_id: 9,
            uri: "/status.json".into(),
            method: "POST".into(),
            variable_data: vec![
                HttpVariable {
                    field: "json".into(),
                    content: "{}".into(),
                },
                HttpVariable {
                    field: "json".into(),
                    content: "ignored".into(),
                },
            ],
        };
        let decoded = HttpRequest::decode(req.encode_to_vec().as_slice()).unwrap();

        assert_eq!(decoded.variable("json"), Some("{}"));
        assert_eq!(decoded.variable("missing"), None);
    }

    #[test]
    fn closing_response_fields_present() {
        let resp = HttpResponse {
            req_id: 1,
            content: Some(Bytes::new()),
            resultcode: Some(404),
            close_response: Some(true),
            ..Default::default()
        };
        let decoded = HttpResponse::decode(resp.encode_to_vec().as_slice()).unwrap();

        assert!(decoded.is_closing());
        assert_eq!(decoded.content.as_deref(), Some(&b""[..]));
        assert_eq!(decoded.resultcode, Some(404));
    }
}
