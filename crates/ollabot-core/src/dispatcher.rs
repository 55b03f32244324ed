//! Maps inbound events onto chat state, backend calls and replies

use crate::postprocess::Pipeline;
use crate::registry::{ModelRegistry, ThinkingPolicy};
use crate::state::{ChatState, ChatStore};
use crate::{MediaFetcher, Notifier};
use anyhow::Result;
use ollabot_ipc::{Envelope, MediaKind, MessageKind, OutboundAction, OutboundMessage};
use ollabot_providers::{Backend, ChatMessage};
use ollabot_telegram::menu::{self, Language};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const TYPING_REFRESH: Duration = Duration::from_secs(4);

/// Keeps "typing" visible until dropped.
struct TypingHeartbeat {
    task: JoinHandle<()>,
}

impl Drop for TypingHeartbeat {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct ReplyTarget {
    channel: String,
    chat_id: i64,
    message_id: Option<i64>,
}

struct ImageUpload {
    kind: MediaKind,
    file_id: String,
    mime_type: Option<String>,
    caption: Option<String>,
}

pub struct Dispatcher {
    store: ChatStore,
    backend: Arc<dyn Backend>,
    registry: ModelRegistry,
    pipeline: Pipeline,
    thinking: ThinkingPolicy,
    notifier: Arc<dyn Notifier>,
    media: Arc<dyn MediaFetcher>,
    language: Language,
}

impl Dispatcher {
    pub fn new(
        backend: Arc<dyn Backend>,
        registry: ModelRegistry,
        notifier: Arc<dyn Notifier>,
        media: Arc<dyn MediaFetcher>,
    ) -> Self {
        Self {
            store: ChatStore::new(),
            backend,
            registry,
            pipeline: Pipeline::default(),
            thinking: ThinkingPolicy::Unconditional,
            notifier,
            media,
            language: Language::default(),
        }
    }

    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_thinking_policy(mut self, thinking: ThinkingPolicy) -> Self {
        self.thinking = thinking;
        self
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn store(&self) -> &ChatStore {
        &self.store
    }

    /// Handles one event. Errors only come from the outbound side; user
    /// facing failures are turned into replies.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<()> {
        let Some(chat_id) = envelope.chat_id else {
            debug!(trace_id = %envelope.trace_id, "Dropping event without chat id");
            return Ok(());
        };

        debug!(
            chat_id,
            kind = envelope.kind.label(),
            trace_id = %envelope.trace_id,
            "Dispatching event"
        );

        let target = ReplyTarget {
            channel: envelope.channel,
            chat_id,
            message_id: envelope.message_id,
        };

        match envelope.kind {
            MessageKind::Command { name, args } => {
                self.handle_command(&target, &name, &args).await
            }
            MessageKind::Message { text, .. } => self.handle_text(&target, text).await,
            MessageKind::Photo { file_id, caption } => {
                let upload = ImageUpload {
                    kind: MediaKind::Photo,
                    file_id,
                    mime_type: None,
                    caption,
                };
                self.handle_image(&target, upload).await
            }
            MessageKind::Document {
                file_id,
                mime_type,
                caption,
                ..
            } => {
                let upload = ImageUpload {
                    kind: MediaKind::Document,
                    file_id,
                    mime_type,
                    caption,
                };
                self.handle_image(&target, upload).await
            }
            MessageKind::Callback { query_id, data } => {
                self.handle_callback(&target, &query_id, &data).await
            }
        }
    }

    fn send(&self, message: OutboundMessage) -> Result<()> {
        self.notifier.deliver(message)
    }

    fn reply(&self, target: &ReplyTarget, text: impl Into<String>) -> Result<()> {
        self.send(OutboundMessage::text(&target.channel, target.chat_id, text))
    }

    async fn handle_command(&self, target: &ReplyTarget, name: &str, args: &[String]) -> Result<()> {
        let lang = self.language;
        let chat_id = target.chat_id;

        match name {
            "start" => self.cmd_start(target).await,
            "m" => {
                self.send_model_menu(target, menu::switch_model_prompt(lang))
                    .await
            }
            "model" => self.cmd_model(target, args).await,
            "clear" => {
                self.store.clear_history(chat_id).await;
                self.reply(target, menu::history_cleared_text(lang))
            }
            "reset" => {
                self.store.reset_all(chat_id).await;
                self.reply(target, menu::reset_text(lang))
            }
            "ctx" => self.cmd_ctx(target, args).await,
            "thinking" => self.cmd_thinking(target, args).await,
            "help" => self.reply(target, menu::help_text(lang)),
            other => {
                debug!(chat_id, command = other, "Unknown command");
                self.reply(target, menu::unknown_command_text(lang))
            }
        }
    }

    async fn cmd_start(&self, target: &ReplyTarget) -> Result<()> {
        let lang = self.language;
        let chat_id = target.chat_id;
        let state = self.store.get_or_create(chat_id).await;

        let models = match self.registry.list_models().await {
            Ok(models) => models,
            Err(err) => {
                warn!(chat_id, error = %err, "Model catalog unavailable on /start");
                self.reply(target, menu::start_text(lang))?;
                return self.reply(target, menu::models_unavailable_text(lang, &err.summary()));
            }
        };

        if state.model.is_none() {
            if let Some(first) = models.first() {
                self.store.set_model(chat_id, first.clone()).await;
                info!(chat_id, model = %first, "Model auto-selected");
            }
        }

        let greeting = OutboundMessage::text(&target.channel, chat_id, menu::start_text(lang));
        if models.is_empty() {
            self.send(greeting)?;
            return self.reply(target, menu::no_models_text(lang));
        }
        self.send(greeting.with_keyboard(menu::model_keyboard(&models)))
    }

    async fn send_model_menu(&self, target: &ReplyTarget, prompt: &str) -> Result<()> {
        let lang = self.language;
        match self.registry.list_models().await {
            Ok(models) if models.is_empty() => self.reply(target, menu::no_models_text(lang)),
            Ok(models) => self.send(
                OutboundMessage::text(&target.channel, target.chat_id, prompt)
                    .with_keyboard(menu::model_keyboard(&models)),
            ),
            Err(err) => {
                warn!(chat_id = target.chat_id, error = %err, "Model catalog unavailable");
                self.reply(target, menu::models_unavailable_text(lang, &err.summary()))
            }
        }
    }

    async fn cmd_model(&self, target: &ReplyTarget, args: &[String]) -> Result<()> {
        let lang = self.language;
        let Some(model) = args.first() else {
            return self.reply(target, menu::model_usage_text(lang));
        };

        if !self.registry.is_selectable(model) {
            let available = self.registry.list_models().await.unwrap_or_default();
            return self.reply(target, menu::unknown_model_text(lang, model, &available));
        }

        self.store.set_model(target.chat_id, model.clone()).await;
        info!(chat_id = target.chat_id, model = %model, "Model set by command");
        self.send(
            OutboundMessage::text(
                &target.channel,
                target.chat_id,
                menu::model_switched_text(lang, model),
            )
            .with_markdown(),
        )
    }

    /// `/ctx add <text>` appends, any other first argument clears.
    async fn cmd_ctx(&self, target: &ReplyTarget, args: &[String]) -> Result<()> {
        let lang = self.language;
        match args.split_first() {
            None => self.reply(target, menu::ctx_usage_text(lang)),
            Some((sub, rest)) if sub.as_str() == "add" => {
                let text = rest.join(" ");
                if text.trim().is_empty() {
                    return self.reply(target, menu::ctx_usage_text(lang));
                }
                self.store.add_system_context(target.chat_id, text).await;
                self.reply(target, menu::ctx_added_text(lang))
            }
            Some(_) => {
                self.store.clear_context(target.chat_id).await;
                self.reply(target, menu::ctx_removed_text(lang))
            }
        }
    }

    async fn cmd_thinking(&self, target: &ReplyTarget, args: &[String]) -> Result<()> {
        let lang = self.language;
        let visible = match args.first().map(String::as_str) {
            Some("on") => true,
            Some("off") => false,
            _ => return self.reply(target, menu::thinking_usage_text(lang)),
        };
        self.store
            .set_thinking_visible(target.chat_id, visible)
            .await;
        self.reply(target, menu::thinking_set_text(lang, visible))
    }

    async fn handle_text(&self, target: &ReplyTarget, text: String) -> Result<()> {
        let state = self.store.get_or_create(target.chat_id).await;
        let Some(model) = state.model.clone() else {
            return self
                .send_model_menu(target, menu::choose_model_prompt(self.language))
                .await;
        };
        self.run_turn(target, &state, &model, ChatMessage::user(text))
            .await
    }

    async fn handle_image(&self, target: &ReplyTarget, upload: ImageUpload) -> Result<()> {
        let lang = self.language;
        let chat_id = target.chat_id;
        let state = self.store.get_or_create(chat_id).await;

        let Some(model) = state.model.clone() else {
            return self
                .send_model_menu(target, menu::choose_model_prompt(lang))
                .await;
        };

        if !self.registry.supports_vision(&model) {
            debug!(chat_id, model = %model, "Image sent to a text-only model");
            return self.reply(target, menu::vision_unsupported_text(lang));
        }

        let is_image = match upload.kind {
            MediaKind::Photo => true,
            MediaKind::Document => upload
                .mime_type
                .as_deref()
                .map(|mime| mime.starts_with("image/"))
                .unwrap_or(false),
        };
        if !is_image {
            return self.reply(target, menu::send_image_text(lang));
        }

        self.send(OutboundMessage {
            channel: target.channel.clone(),
            chat_id,
            action: OutboundAction::EchoMedia {
                kind: upload.kind,
                file_id: upload.file_id.clone(),
                caption: Some(menu::processing_image_text(lang).to_string()),
            },
        })?;

        let blob = match self
            .media
            .fetch(&upload.file_id, upload.mime_type.as_deref())
            .await
        {
            Ok(blob) => blob,
            Err(err) => {
                warn!(chat_id, error = %err, "Image download failed");
                return self.reply(target, menu::image_error_text(lang));
            }
        };

        let prompt = upload
            .caption
            .unwrap_or_else(|| menu::default_image_prompt(lang).to_string());
        let user = ChatMessage::user_with_images(prompt, vec![blob]);
        self.run_turn(target, &state, &model, user).await
    }

    async fn handle_callback(&self, target: &ReplyTarget, query_id: &str, data: &str) -> Result<()> {
        let chat_id = target.chat_id;
        let answer = OutboundMessage {
            channel: target.channel.clone(),
            chat_id,
            action: OutboundAction::AnswerCallback {
                query_id: query_id.to_string(),
                text: None,
            },
        };

        let Some(model) = menu::parse_model_callback(data) else {
            debug!(chat_id, data, "Ignoring unknown callback data");
            return self.send(answer);
        };

        self.store.set_model(chat_id, model).await;
        info!(chat_id, model, "Model selected from keyboard");
        self.send(answer)?;

        let text = menu::model_switched_text(self.language, model);
        let confirmation = match target.message_id {
            Some(message_id) => OutboundMessage {
                channel: target.channel.clone(),
                chat_id,
                action: OutboundAction::Edit {
                    message_id,
                    text,
                    markdown: true,
                    keyboard: None,
                },
            },
            None => OutboundMessage::text(&target.channel, chat_id, text).with_markdown(),
        };
        self.send(confirmation)
    }

    async fn run_turn(
        &self,
        target: &ReplyTarget,
        state: &ChatState,
        model: &str,
        user: ChatMessage,
    ) -> Result<()> {
        let lang = self.language;
        let chat_id = target.chat_id;
        let request = state.request_with(&user);

        let result = {
            let _typing = self.start_typing(target);
            self.backend.chat(model, &request).await
        };

        let response = match result {
            Ok(response) => response,
            Err(err) => {
                warn!(chat_id, model, error = %err, "Backend call failed");
                return self.reply(target, menu::backend_error_text(lang, &err.summary()));
            }
        };

        if let Some(usage) = response.usage {
            debug!(
                chat_id,
                model,
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Backend usage"
            );
        }

        let thinking_visible = state.thinking_visible || !self.thinking.applies_to(model);
        let answer = self.pipeline.process(&response.content, thinking_visible);
        self.store
            .append_turn(chat_id, user, ChatMessage::assistant(answer.clone()))
            .await;

        let text = if answer.trim().is_empty() {
            menu::empty_response_text(lang).to_string()
        } else {
            answer
        };
        self.send(OutboundMessage::text(&target.channel, chat_id, text).reply_to(target.message_id))
    }

    fn start_typing(&self, target: &ReplyTarget) -> TypingHeartbeat {
        let notifier = Arc::clone(&self.notifier);
        let channel = target.channel.clone();
        let chat_id = target.chat_id;

        let task = tokio::spawn(async move {
            loop {
                let _ = notifier.deliver(OutboundMessage {
                    channel: channel.clone(),
                    chat_id,
                    action: OutboundAction::ChatAction {
                        action: "typing".to_string(),
                    },
                });
                tokio::time::sleep(TYPING_REFRESH).await;
            }
        });

        TypingHeartbeat { task }
    }
}
