//! Ollabot IPC
//!
//! Event bus between the chat transport and the dispatcher

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

static NEXT_TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_trace_id() -> String {
    let ts = now_unix_secs();
    let n = NEXT_TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{}-{}", ts, n)
}

fn default_schema_version() -> u16 {
    1
}

fn default_trace_id() -> String {
    generate_trace_id()
}

/// One inbound event from a chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default = "default_schema_version")]
    pub schema_version: u16,
    #[serde(default = "default_trace_id")]
    pub trace_id: String,
    pub channel: String,
    pub kind: MessageKind,
    pub chat_id: Option<i64>,
    pub message_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MessageKind {
    #[serde(rename = "message")]
    Message { from: String, text: String },

    #[serde(rename = "command")]
    Command { name: String, args: Vec<String> },

    #[serde(rename = "photo")]
    Photo {
        file_id: String,
        caption: Option<String>,
    },

    #[serde(rename = "document")]
    Document {
        file_id: String,
        mime_type: Option<String>,
        file_name: Option<String>,
        caption: Option<String>,
    },

    #[serde(rename = "callback")]
    Callback { query_id: String, data: String },
}

impl MessageKind {
    pub fn label(&self) -> &'static str {
        match self {
            MessageKind::Message { .. } => "message",
            MessageKind::Command { .. } => "command",
            MessageKind::Photo { .. } => "photo",
            MessageKind::Document { .. } => "document",
            MessageKind::Callback { .. } => "callback",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineButton {
    pub text: String,
    pub callback_data: String,
}

pub type InlineKeyboard = Vec<Vec<InlineButton>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundAction {
    Text {
        text: String,
        markdown: bool,
        reply_to: Option<i64>,
        keyboard: Option<InlineKeyboard>,
    },
    Edit {
        message_id: i64,
        text: String,
        markdown: bool,
        keyboard: Option<InlineKeyboard>,
    },
    /// Re-sends an uploaded file by id, used to acknowledge an image upload.
    EchoMedia {
        kind: MediaKind,
        file_id: String,
        caption: Option<String>,
    },
    AnswerCallback {
        query_id: String,
        text: Option<String>,
    },
    ChatAction {
        action: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub channel: String,
    pub chat_id: i64,
    pub action: OutboundAction,
}

impl OutboundMessage {
    pub fn text(channel: &str, chat_id: i64, text: impl Into<String>) -> Self {
        Self {
            channel: channel.to_string(),
            chat_id,
            action: OutboundAction::Text {
                text: text.into(),
                markdown: false,
                reply_to: None,
                keyboard: None,
            },
        }
    }

    pub fn with_keyboard(mut self, keyboard: InlineKeyboard) -> Self {
        match &mut self.action {
            OutboundAction::Text { keyboard: slot, .. }
            | OutboundAction::Edit { keyboard: slot, .. } => *slot = Some(keyboard),
            _ => {}
        }
        self
    }

    pub fn with_markdown(mut self) -> Self {
        match &mut self.action {
            OutboundAction::Text { markdown, .. } | OutboundAction::Edit { markdown, .. } => {
                *markdown = true
            }
            _ => {}
        }
        self
    }

    pub fn reply_to(mut self, message_id: Option<i64>) -> Self {
        if let OutboundAction::Text { reply_to, .. } = &mut self.action {
            *reply_to = message_id;
        }
        self
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.action {
            OutboundAction::Text { text, .. } | OutboundAction::Edit { text, .. } => Some(text),
            _ => None,
        }
    }

    pub fn keyboard(&self) -> Option<&InlineKeyboard> {
        match &self.action {
            OutboundAction::Text { keyboard, .. } | OutboundAction::Edit { keyboard, .. } => {
                keyboard.as_ref()
            }
            _ => None,
        }
    }
}

impl Envelope {
    pub fn new(channel: &str, kind: MessageKind) -> Self {
        Self {
            schema_version: default_schema_version(),
            trace_id: generate_trace_id(),
            channel: channel.to_string(),
            kind,
            chat_id: None,
            message_id: None,
        }
    }

    pub fn with_chat_id(mut self, chat_id: i64) -> Self {
        self.chat_id = Some(chat_id);
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }
}

pub const EVENT_BUS_CAPACITY: usize = 256;
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbound: broadcast::Sender<Envelope>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Self {
            inbound: inbound_tx,
            outbound: outbound_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Envelope> {
        self.inbound.subscribe()
    }

    pub fn publish(&self, envelope: Envelope) -> anyhow::Result<()> {
        self.inbound.send(envelope)?;
        Ok(())
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    pub fn outbound_subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_kind() -> MessageKind {
        MessageKind::Message {
            from: "user".to_string(),
            text: "hello".to_string(),
        }
    }

    #[test]
    fn trace_id_different_for_each_envelope() {
        let env1 = Envelope::new("telegram", text_kind());
        let env2 = Envelope::new("telegram", text_kind());
        assert!(env1.trace_id.starts_with("trace-"));
        assert_ne!(env1.trace_id, env2.trace_id);
    }

    #[test]
    fn message_kind_is_tagged_by_type() {
        let env = Envelope::new(
            "telegram",
            MessageKind::Callback {
                query_id: "q1".to_string(),
                data: "MODEL|gemma3:4b".to_string(),
            },
        )
        .with_chat_id(42);
        let value = serde_json::to_value(&env).expect("serialize");
        assert_eq!(value["kind"]["type"], "callback");
        assert_eq!(value["kind"]["data"], "MODEL|gemma3:4b");
        assert_eq!(value["chat_id"], 42);
    }

    #[test]
    fn legacy_json_without_trace_gets_defaults() {
        let json = r#"{"channel":"telegram","kind":{"type":"command","name":"help","args":[]},"chat_id":1,"message_id":2}"#;
        let env: Envelope = serde_json::from_str(json).expect("deserialize");
        assert_eq!(env.schema_version, 1);
        assert!(!env.trace_id.is_empty());
        assert_eq!(env.kind.label(), "command");
    }

    #[test]
    fn builders_only_touch_text_like_actions() {
        let keyboard = vec![vec![InlineButton {
            text: "a".to_string(),
            callback_data: "MODEL|a".to_string(),
        }]];
        let msg = OutboundMessage::text("telegram", 1, "hi")
            .with_keyboard(keyboard.clone())
            .with_markdown()
            .reply_to(Some(7));
        assert_eq!(msg.text_content(), Some("hi"));
        assert_eq!(msg.keyboard(), Some(&keyboard));
        assert!(matches!(
            msg.action,
            OutboundAction::Text {
                markdown: true,
                reply_to: Some(7),
                ..
            }
        ));

        let ack = OutboundMessage {
            channel: "telegram".to_string(),
            chat_id: 1,
            action: OutboundAction::AnswerCallback {
                query_id: "q".to_string(),
                text: None,
            },
        }
        .with_keyboard(keyboard);
        assert!(ack.keyboard().is_none());
        assert!(ack.text_content().is_none());
    }

    #[tokio::test]
    async fn publish_reaches_subscriber() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.publish(Envelope::new("telegram", text_kind()).with_chat_id(5))
            .expect("publish");
        let got = rx.recv().await.expect("recv");
        assert_eq!(got.chat_id, Some(5));
    }
}
