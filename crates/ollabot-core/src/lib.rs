//! Ollabot Core
//!
//! Conversation state, dispatch and the runtime that wires Telegram to the
//! inference backend

pub mod dispatcher;
pub mod postprocess;
pub mod registry;
pub mod runtime;
pub mod state;

use anyhow::{anyhow, Result};
use ollabot_ipc::OutboundMessage;
use ollabot_providers::ImageBlob;
use ollabot_telegram::TelegramFiles;
use tokio::sync::broadcast;

pub use dispatcher::Dispatcher;
pub use postprocess::Pipeline;
pub use registry::{ModelRegistry, ModelSource, ThinkingPolicy};
pub use runtime::BotRuntime;
pub use state::{ChatState, ChatStore};

/// Outbound side of the chat transport.
pub trait Notifier: Send + Sync {
    fn deliver(&self, message: OutboundMessage) -> Result<()>;
}

/// Fetches uploaded image bytes by transport file reference.
#[async_trait::async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch(&self, file_id: &str, mime_hint: Option<&str>) -> Result<ImageBlob>;
}

pub struct BusNotifier {
    sender: broadcast::Sender<OutboundMessage>,
}

impl BusNotifier {
    pub fn new(sender: broadcast::Sender<OutboundMessage>) -> Self {
        Self { sender }
    }
}

impl Notifier for BusNotifier {
    fn deliver(&self, message: OutboundMessage) -> Result<()> {
        self.sender
            .send(message)
            .map(|_| ())
            .map_err(|e| anyhow!("outbound bus has no receivers: {}", e))
    }
}

#[async_trait::async_trait]
impl MediaFetcher for TelegramFiles {
    async fn fetch(&self, file_id: &str, mime_hint: Option<&str>) -> Result<ImageBlob> {
        let file = self.download(file_id).await?;
        if file.bytes.is_empty() {
            anyhow::bail!("downloaded file is empty");
        }
        let mime_type = mime_hint.map(str::to_string).or(file.mime_type);
        Ok(ImageBlob::new(file.bytes, mime_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollabot_ipc::EventBus;

    #[test]
    fn bus_notifier_publishes_to_subscribers() {
        let bus = EventBus::new();
        let mut rx = bus.outbound_subscribe();
        let notifier = BusNotifier::new(bus.outbound_sender());

        notifier
            .deliver(OutboundMessage::text("telegram", 9, "hi"))
            .unwrap();
        let received = rx.try_recv().unwrap();
        assert_eq!(received.chat_id, 9);
        assert_eq!(received.text_content(), Some("hi"));
    }

    #[test]
    fn bus_notifier_without_receivers_errors() {
        let bus = EventBus::new();
        let notifier = BusNotifier::new(bus.outbound_sender());
        assert!(notifier
            .deliver(OutboundMessage::text("telegram", 9, "lost"))
            .is_err());
    }
}
