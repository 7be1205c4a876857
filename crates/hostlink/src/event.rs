//! # Event payloads
//!
//! Owned data carried by inbound events (engine to host) and outbound
//! messages (host to engine). Every delivery hands the receiver its own copy;
//! nothing here borrows from the engine's buffers.

/// Fields shared by every inbound message variant.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Inbound {
    pub message_id: Vec<u8>,
    pub nickname: String,
    pub partner_key: Vec<u8>,
    pub sender_key: Vec<u8>,
    pub dm_token: i32,
    pub codeset: i32,
    pub timestamp: i64,
    pub round_id: i64,
    pub status: i64,
}

/// A message whose payload the engine did not interpret.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    pub inbound: Inbound,
    pub payload: Vec<u8>,
    pub message_type: i64,
}

/// A plain text message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TextMessage {
    pub inbound: Inbound,
    pub text: String,
}

/// A text message replying to an earlier message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReplyMessage {
    pub inbound: Inbound,
    /// Id of the message being replied to.
    pub reply_to: Vec<u8>,
    pub text: String,
}

/// A reaction (usually a single emoji) to an earlier message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReactionMessage {
    pub inbound: Inbound,
    /// Id of the message being reacted to.
    pub reaction_to: Vec<u8>,
    pub reaction: String,
}

/// Progress report for a message this client sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SentStatus {
    /// Row id the host returned when the message was first stored.
    pub uuid: i64,
    pub message_id: Vec<u8>,
    pub timestamp: i64,
    pub round_id: i64,
    pub status: i64,
}

/// Body of an outbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Body {
    Raw { message_type: i64, payload: Vec<u8> },
    Text(String),
    Reply { text: String, reply_to: Vec<u8> },
    Reaction { reaction: String, react_to: Vec<u8> },
}

impl Body {
    /// Short name for logging.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Raw { .. } => "raw",
            Self::Text(_) => "text",
            Self::Reply { .. } => "reply",
            Self::Reaction { .. } => "reaction",
        }
    }
}

/// A message to hand to the engine for delivery.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub partner_key: Vec<u8>,
    pub dm_token: i32,
    pub body: Body,
    pub lease_ms: i64,
    /// Engine send parameters, passed through untouched.
    pub params_json: Vec<u8>,
}

impl OutgoingMessage {
    pub fn new(partner_key: impl Into<Vec<u8>>, dm_token: i32, body: Body) -> Self {
        Self {
            partner_key: partner_key.into(),
            dm_token,
            body,
            lease_ms: 0,
            params_json: Vec::new(),
        }
    }

    pub fn lease_ms(mut self, lease_ms: i64) -> Self {
        self.lease_ms = lease_ms;
        self
    }

    pub fn params_json(mut self, params_json: impl Into<Vec<u8>>) -> Self {
        self.params_json = params_json.into();
        self
    }
}
