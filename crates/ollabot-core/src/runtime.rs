//! Runtime wiring and per-chat serialized processing

use crate::dispatcher::Dispatcher;
use crate::postprocess::Pipeline;
use crate::registry::{ModelRegistry, ThinkingPolicy};
use crate::BusNotifier;
use anyhow::{Context, Result};
use ollabot_config::Config;
use ollabot_ipc::{Envelope, EventBus};
use ollabot_providers::{Backend, OllamaProvider};
use ollabot_telegram::menu::Language;
use ollabot_telegram::{TelegramAdapter, TelegramFiles};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// Routes each chat to its own worker so a chat's events run one at a time
/// in arrival order while different chats proceed concurrently.
pub struct ChatRouter {
    dispatcher: Arc<Dispatcher>,
    workers: HashMap<i64, mpsc::UnboundedSender<Envelope>>,
}

impl ChatRouter {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            workers: HashMap::new(),
        }
    }

    pub fn route(&mut self, envelope: Envelope) {
        let Some(chat_id) = envelope.chat_id else {
            let dispatcher = Arc::clone(&self.dispatcher);
            tokio::spawn(async move {
                let trace_id = envelope.trace_id.clone();
                if let Err(e) = dispatcher.dispatch(envelope).await {
                    error!(trace_id = %trace_id, "Error processing inbound event: {}", e);
                }
            });
            return;
        };

        let dispatcher = &self.dispatcher;
        let sender = self
            .workers
            .entry(chat_id)
            .or_insert_with(|| Self::spawn_worker(Arc::clone(dispatcher), chat_id));

        if let Err(mpsc::error::SendError(envelope)) = sender.send(envelope) {
            warn!(chat_id, "Chat worker stopped, restarting");
            let fresh = Self::spawn_worker(Arc::clone(&self.dispatcher), chat_id);
            if fresh.send(envelope).is_err() {
                error!(chat_id, "Restarted chat worker refused event");
            }
            self.workers.insert(chat_id, fresh);
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    fn spawn_worker(dispatcher: Arc<Dispatcher>, chat_id: i64) -> mpsc::UnboundedSender<Envelope> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();
        tokio::spawn(async move {
            debug!(chat_id, "Chat worker started");
            while let Some(envelope) = rx.recv().await {
                let trace_id = envelope.trace_id.clone();
                if let Err(e) = dispatcher.dispatch(envelope).await {
                    error!(
                        chat_id,
                        trace_id = %trace_id,
                        "Error processing inbound event: {}", e
                    );
                }
            }
        });
        tx
    }
}

pub struct BotRuntime {
    config: Config,
    event_bus: EventBus,
    backend: Arc<dyn Backend>,
    dispatcher: Arc<Dispatcher>,
}

impl BotRuntime {
    pub fn new(config: Config) -> Result<Self> {
        let timeout = config.backend.request_timeout_secs.map(Duration::from_secs);
        let backend: Arc<dyn Backend> = Arc::new(
            OllamaProvider::new(&config.backend.host, timeout)
                .context("failed to create backend client")?,
        );

        let event_bus = EventBus::new();
        let language: Language = config.telegram.language.parse().unwrap_or_default();
        let media = Arc::new(TelegramFiles::new(&config.telegram.bot_token)?);
        let registry = ModelRegistry::from_config(&config.models, Arc::clone(&backend));
        let notifier = Arc::new(BusNotifier::new(event_bus.outbound_sender()));

        let dispatcher = Dispatcher::new(Arc::clone(&backend), registry, notifier, media)
            .with_pipeline(Pipeline::from_config(&config.postprocess))
            .with_thinking_policy(ThinkingPolicy::from_config(
                config.models.thinking_allow_list.as_deref(),
            ))
            .with_language(language);

        Ok(Self {
            config,
            event_bus,
            backend,
            dispatcher: Arc::new(dispatcher),
        })
    }

    pub async fn run(&self) -> Result<()> {
        info!(
            backend = self.backend.name(),
            host = %self.config.backend.host,
            "Ollabot runtime starting..."
        );

        match self.backend.health_check().await {
            Ok(true) => info!("Backend reachable"),
            Ok(false) => warn!("Backend not reachable yet; requests will fail until it is up"),
            Err(e) => warn!("Backend health check error: {}", e),
        }

        // Subscribe before the adapter starts so no update is missed.
        let mut inbound_rx = self.event_bus.subscribe();
        let outbound_rx = self.event_bus.outbound_subscribe();

        let adapter = Arc::new(
            TelegramAdapter::new(&self.config.telegram, self.config.data_dir())?
                .with_event_bus(self.event_bus.clone()),
        );

        let outbound_adapter = Arc::clone(&adapter);
        tokio::spawn(async move {
            outbound_adapter.run_outbound_handler(outbound_rx).await;
        });

        tokio::spawn(async move {
            if let Err(e) = adapter.poll().await {
                error!("Telegram adapter failed: {}", e);
            }
        });

        let mut router = ChatRouter::new(Arc::clone(&self.dispatcher));
        loop {
            match inbound_rx.recv().await {
                Ok(envelope) => router.route(envelope),
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Event bus closed, stopping message processor");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Event bus lagged by {} messages", n);
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ModelSource;
    use crate::state::ChatState;
    use crate::{MediaFetcher, Notifier};
    use async_trait::async_trait;
    use ollabot_ipc::{MessageKind, OutboundMessage};
    use ollabot_providers::{BackendError, ChatMessage, ChatResponse, ImageBlob};

    /// Replies with the last user message; `slow` takes a while, `hang` never returns.
    struct EchoBackend;

    #[async_trait]
    impl Backend for EchoBackend {
        fn name(&self) -> &str {
            "echo"
        }

        async fn chat(
            &self,
            model: &str,
            messages: &[ChatMessage],
        ) -> Result<ChatResponse, BackendError> {
            let last = messages
                .last()
                .map(|m| m.content.clone())
                .unwrap_or_default();
            match last.as_str() {
                "slow" => tokio::time::sleep(Duration::from_millis(100)).await,
                "hang" => std::future::pending::<()>().await,
                _ => {}
            }
            Ok(ChatResponse {
                content: format!("echo {}", last),
                model: model.to_string(),
                done_reason: None,
                usage: None,
            })
        }

        async fn list_models(&self) -> Result<Vec<String>, BackendError> {
            Ok(vec!["qwen3:4b".to_string()])
        }

        async fn health_check(&self) -> Result<bool, BackendError> {
            Ok(true)
        }
    }

    struct DiscardNotifier;

    impl Notifier for DiscardNotifier {
        fn deliver(&self, _message: OutboundMessage) -> Result<()> {
            Ok(())
        }
    }

    struct NoMedia;

    #[async_trait]
    impl MediaFetcher for NoMedia {
        async fn fetch(&self, _file_id: &str, _mime_hint: Option<&str>) -> Result<ImageBlob> {
            anyhow::bail!("no media in tests")
        }
    }

    fn dispatcher() -> Arc<Dispatcher> {
        let backend: Arc<dyn Backend> = Arc::new(EchoBackend);
        let registry = ModelRegistry::new(ModelSource::Catalog, Vec::new(), Arc::clone(&backend));
        Arc::new(Dispatcher::new(
            backend,
            registry,
            Arc::new(DiscardNotifier),
            Arc::new(NoMedia),
        ))
    }

    fn text(chat_id: i64, body: &str) -> Envelope {
        Envelope::new(
            "telegram",
            MessageKind::Message {
                from: "tester".to_string(),
                text: body.to_string(),
            },
        )
        .with_chat_id(chat_id)
    }

    async fn wait_for_history(dispatcher: &Dispatcher, chat_id: i64, len: usize) -> ChatState {
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                let state = dispatcher.store().get_or_create(chat_id).await;
                if state.history.len() >= len {
                    return state;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("history did not grow in time")
    }

    #[tokio::test]
    async fn same_chat_events_are_processed_in_arrival_order() {
        let dispatcher = dispatcher();
        dispatcher.store().set_model(1, "qwen3:4b").await;
        let mut router = ChatRouter::new(Arc::clone(&dispatcher));

        router.route(text(1, "slow"));
        router.route(text(1, "fast"));

        let state = wait_for_history(&dispatcher, 1, 4).await;
        let contents: Vec<&str> = state.history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["slow", "echo slow", "fast", "echo fast"]);
        assert_eq!(router.worker_count(), 1);
    }

    #[tokio::test]
    async fn hung_chat_does_not_block_other_chats() {
        let dispatcher = dispatcher();
        dispatcher.store().set_model(1, "qwen3:4b").await;
        dispatcher.store().set_model(2, "qwen3:4b").await;
        let mut router = ChatRouter::new(Arc::clone(&dispatcher));

        router.route(text(1, "hang"));
        router.route(text(2, "hello"));

        let other = wait_for_history(&dispatcher, 2, 2).await;
        assert_eq!(other.history[1].content, "echo hello");
        assert!(dispatcher.store().get_or_create(1).await.history.is_empty());
        assert_eq!(router.worker_count(), 2);
    }
}
