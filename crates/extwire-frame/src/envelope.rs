use bytes::Bytes;

/// The command envelope carried inside every packet.
///
/// `content` is an opaque serialized sub-message whose schema is selected by
/// `command`; the transport never looks inside it. All three fields are
/// `required` so they are always written, even at their default values.
#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    /// Command name, case-sensitive (`PING`, `HTTPREQUEST`, ...).
    #[prost(string, required, tag = "1")]
    pub command: String,
    /// Sender-assigned sequence number.
    #[prost(uint64, required, tag = "2")]
    pub seqno: u64,
    /// Serialized command payload.
    #[prost(bytes = "bytes", required, tag = "3")]
    pub content: Bytes,
}

impl Envelope {
    /// Create a new envelope.
    pub fn new(command: impl Into<String>, seqno: u64, content: impl Into<Bytes>) -> Self {
        Self {
            command: command.into(),
            seqno,
            content: content.into(),
        }
    }
}
