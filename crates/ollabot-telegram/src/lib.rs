//! Ollabot Telegram Adapter
//!
//! Telegram Bot API long-polling with offset persistence, client recreation,
//! inline keyboards, callback queries, media echo and message chunking

pub mod files;
pub mod menu;

use anyhow::{anyhow, Result};
use menu::Language;
use ollabot_config::TelegramConfig;
use ollabot_ipc::{
    Envelope, EventBus, InlineKeyboard, MediaKind, MessageKind, OutboundAction, OutboundMessage,
};
use reqwest::{Client, ClientBuilder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub use files::{DownloadedFile, TelegramFiles};

pub const CHANNEL: &str = "telegram";
const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;
const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUpdate {
    pub update_id: i64,
    pub message: Option<TelegramMessage>,
    #[serde(default)]
    pub callback_query: Option<TelegramCallbackQuery>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramMessage {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default)]
    pub photo: Option<Vec<TelegramPhotoSize>>,
    #[serde(default)]
    pub document: Option<TelegramDocument>,
    pub chat: TelegramChat,
    #[serde(default)]
    pub from: Option<TelegramUser>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramPhotoSize {
    pub file_id: String,
    pub width: i64,
    pub height: i64,
    #[serde(default)]
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramDocument {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub file_size: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramChat {
    pub id: i64,
    #[serde(rename = "type")]
    pub chat_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub is_bot: Option<bool>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramCallbackQuery {
    pub id: String,
    pub from: TelegramUser,
    pub message: Option<TelegramMessage>,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub(crate) ok: bool,
    pub(crate) result: Option<T>,
    #[serde(default)]
    pub(crate) description: Option<String>,
}

/// Splits `/cmd@bot a b` into `("cmd", ["a", "b"])`. Bare `/` is not a command.
pub fn parse_command(text: &str) -> Option<(String, Vec<String>)> {
    let rest = text.trim_start().strip_prefix('/')?;
    let mut tokens = rest.split_whitespace();
    let head = tokens.next()?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    if name.is_empty() {
        return None;
    }
    let args = tokens.map(str::to_string).collect();
    Some((name, args))
}

fn keyboard_json(keyboard: &InlineKeyboard) -> serde_json::Value {
    serde_json::json!({
        "inline_keyboard": keyboard.iter().map(|row| {
            row.iter().map(|btn| serde_json::json!({
                "text": btn.text,
                "callback_data": btn.callback_data
            })).collect::<Vec<_>>()
        }).collect::<Vec<_>>()
    })
}

pub struct TelegramAdapter {
    client: Client,
    bot_id: String,
    api_url: String,
    data_dir: PathBuf,
    poll_timeout_secs: u64,
    client_recreate_interval_secs: u64,
    language: Language,
    event_bus: Option<EventBus>,
}

impl TelegramAdapter {
    pub fn new(config: &TelegramConfig, data_dir: PathBuf) -> Result<Self> {
        let api_url = format!("{}/bot{}", TELEGRAM_API_BASE, config.bot_token);
        let language: Language = config.language.parse().unwrap_or_default();

        Ok(Self {
            client: Self::build_client()?,
            bot_id: config.bot_id().to_string(),
            api_url,
            data_dir,
            poll_timeout_secs: config.poll_timeout_secs.unwrap_or(60),
            client_recreate_interval_secs: config.client_recreate_interval_secs.unwrap_or(60),
            language,
            event_bus: None,
        })
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    fn build_client() -> Result<Client> {
        ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(600))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(180))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| anyhow!("failed to build HTTP client: {}", e))
    }

    fn offset_path(&self) -> PathBuf {
        self.data_dir
            .join("runtime")
            .join(format!("telegram.{}.offset", self.bot_id))
    }

    async fn read_offset(&self) -> Option<i64> {
        let p = self.offset_path();
        match fs::read_to_string(&p).await {
            Ok(content) => content.trim().parse().ok(),
            Err(_) => None,
        }
    }

    async fn write_offset(&self, offset: i64) {
        let p = self.offset_path();
        if let Some(parent) = p.parent() {
            let _ = fs::create_dir_all(parent).await;
        }
        if let Err(e) = fs::write(&p, format!("{}\n", offset)).await {
            debug!("Failed to persist Telegram offset: {}", e);
        }
    }

    pub async fn get_updates(
        &self,
        client: &Client,
        offset: Option<i64>,
    ) -> Result<Vec<TelegramUpdate>> {
        let url = format!("{}/getUpdates", self.api_url);

        let mut payload = serde_json::json!({
            "timeout": self.poll_timeout_secs,
            "allowed_updates": ["message", "callback_query"],
        });

        if let Some(offset) = offset {
            payload["offset"] = serde_json::json!(offset);
        }

        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram getUpdates request failed: {}", e.without_url()))?
            .error_for_status()
            .map_err(|e| anyhow!("telegram getUpdates HTTP error: {}", e.without_url()))?;

        let parsed: ApiResponse<Vec<TelegramUpdate>> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram getUpdates decode failed: {}", e.without_url()))?;

        if !parsed.ok {
            return Err(anyhow!(
                "telegram getUpdates returned ok=false: {}",
                parsed.description.unwrap_or_default()
            ));
        }

        Ok(parsed.result.unwrap_or_default())
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        markdown: bool,
        reply_to: Option<i64>,
        inline_keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        let chunks = Self::chunk_message(text);
        let url = format!("{}/sendMessage", self.api_url);

        for (i, chunk) in chunks.iter().enumerate() {
            let mut payload = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
            });

            if markdown {
                payload["parse_mode"] = serde_json::json!("Markdown");
            }

            if let Some(reply_to_message_id) = reply_to {
                if i == 0 {
                    payload["reply_to_message_id"] = serde_json::json!(reply_to_message_id);
                }
            }

            if i == chunks.len() - 1 {
                if let Some(keyboard) = inline_keyboard {
                    payload["reply_markup"] = keyboard_json(keyboard);
                }
            }

            self.send_with_fallback(&url, payload).await?;
        }

        Ok(())
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        markdown: bool,
        inline_keyboard: Option<&InlineKeyboard>,
    ) -> Result<()> {
        // editMessageText cannot be split into chunks: fallback to a new message if too long.
        if text.chars().count() > TELEGRAM_MAX_MESSAGE_LEN {
            return self
                .send_message(chat_id, text, markdown, None, inline_keyboard)
                .await;
        }

        let url = format!("{}/editMessageText", self.api_url);

        let mut payload = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
        });

        if markdown {
            payload["parse_mode"] = serde_json::json!("Markdown");
        }

        if let Some(keyboard) = inline_keyboard {
            payload["reply_markup"] = keyboard_json(keyboard);
        }

        self.send_with_fallback(&url, payload).await
    }

    /// Re-sends an already uploaded photo or document by file id.
    pub async fn send_media_echo(
        &self,
        chat_id: i64,
        kind: MediaKind,
        file_id: &str,
        caption: Option<&str>,
    ) -> Result<()> {
        let (method, field) = match kind {
            MediaKind::Photo => ("sendPhoto", "photo"),
            MediaKind::Document => ("sendDocument", "document"),
        };
        let url = format!("{}/{}", self.api_url, method);

        let mut payload = serde_json::json!({ "chat_id": chat_id });
        payload[field] = serde_json::json!(file_id);
        if let Some(caption) = caption {
            payload["caption"] = serde_json::json!(caption);
        }

        self.send_with_fallback(&url, payload).await
    }

    pub async fn answer_callback_query(
        &self,
        callback_query_id: &str,
        text: Option<&str>,
    ) -> Result<()> {
        let url = format!("{}/answerCallbackQuery", self.api_url);

        let mut payload = serde_json::json!({
            "callback_query_id": callback_query_id,
        });

        if let Some(t) = text {
            payload["text"] = serde_json::json!(t);
        }

        let _ = self.client.post(&url).json(&payload).send().await;
        Ok(())
    }

    pub async fn send_chat_action(&self, chat_id: i64, action: &str) -> Result<()> {
        let url = format!("{}/sendChatAction", self.api_url);
        let payload = serde_json::json!({
            "chat_id": chat_id,
            "action": action,
        });
        let _ = self.client.post(&url).json(&payload).send().await;
        Ok(())
    }

    async fn post_api(&self, url: &str, payload: &serde_json::Value) -> Result<(), String> {
        let resp = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e.without_url()))?;

        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(format!("HTTP {}: {}", status, body));
        }

        let parsed: ApiResponse<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| format!("decode failed: {}", e))?;
        if !parsed.ok {
            return Err(format!(
                "ok=false: {}",
                parsed.description.unwrap_or_default()
            ));
        }
        Ok(())
    }

    /// Posts once; on failure retries without Markdown and without a missing
    /// reply target when either applies.
    async fn send_with_fallback(&self, url: &str, mut payload: serde_json::Value) -> Result<()> {
        let endpoint = url.rsplit('/').next().unwrap_or("telegram");

        let first_err = match self.post_api(url, &payload).await {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };

        let mut adjusted = false;
        if Self::remove_parse_mode(&mut payload) {
            warn!(
                "telegram {} rejected Markdown payload, retrying without parse_mode: {}",
                endpoint, first_err
            );
            adjusted = true;
        }
        if Self::is_reply_target_missing(&first_err) && Self::remove_reply_to_message_id(&mut payload)
        {
            warn!(
                "telegram {} failed due to missing reply target; retrying without reply_to_message_id",
                endpoint
            );
            adjusted = true;
        }

        if !adjusted {
            return Err(anyhow!("telegram {} {}", endpoint, first_err));
        }

        self.post_api(url, &payload)
            .await
            .map_err(|err| anyhow!("telegram {} fallback {}", endpoint, err))
    }

    fn remove_parse_mode(payload: &mut serde_json::Value) -> bool {
        payload
            .as_object_mut()
            .map(|obj| obj.remove("parse_mode").is_some())
            .unwrap_or(false)
    }

    fn remove_reply_to_message_id(payload: &mut serde_json::Value) -> bool {
        payload
            .as_object_mut()
            .map(|obj| obj.remove("reply_to_message_id").is_some())
            .unwrap_or(false)
    }

    fn is_reply_target_missing(body: &str) -> bool {
        body.to_ascii_lowercase()
            .contains("message to be replied not found")
    }

    fn chunk_message(text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= TELEGRAM_MAX_MESSAGE_LEN {
            return vec![text.to_string()];
        }

        let mut chunks = Vec::new();
        let mut start = 0usize;

        while start < chars.len() {
            let mut end = (start + TELEGRAM_MAX_MESSAGE_LEN).min(chars.len());

            if end < chars.len() {
                let mut split = end;
                for i in (start..end).rev() {
                    let c = chars[i];
                    if c == '\n' || c == ' ' || c == '.' || c == '!' || c == '?' {
                        split = i + 1;
                        break;
                    }
                }
                if split > start {
                    end = split;
                }
            }

            chunks.push(chars[start..end].iter().collect::<String>());
            start = end;
        }

        chunks
    }

    /// Maps one Bot API update onto the bus event the dispatcher understands.
    pub fn update_to_envelope(update: &TelegramUpdate) -> Option<Envelope> {
        if let Some(message) = &update.message {
            return Self::message_to_envelope(message);
        }

        let callback = update.callback_query.as_ref()?;
        let message = callback.message.as_ref()?;
        let envelope = Envelope::new(
            CHANNEL,
            MessageKind::Callback {
                query_id: callback.id.clone(),
                data: callback.data.clone().unwrap_or_default(),
            },
        )
        .with_chat_id(message.chat.id)
        .with_message_id(message.message_id);
        Some(envelope)
    }

    fn message_to_envelope(message: &TelegramMessage) -> Option<Envelope> {
        let caption = message
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(|value| value.to_string());

        let kind = if let Some(text) = &message.text {
            match parse_command(text) {
                Some((name, args)) => MessageKind::Command { name, args },
                None => MessageKind::Message {
                    from: message
                        .from
                        .as_ref()
                        .map(|u| u.username.clone().unwrap_or_else(|| u.id.to_string()))
                        .unwrap_or_else(|| "unknown".to_string()),
                    text: text.clone(),
                },
            }
        } else if let Some(best) = message.photo.as_ref().and_then(|sizes| {
            sizes
                .iter()
                .max_by_key(|item| item.width.saturating_mul(item.height))
        }) {
            MessageKind::Photo {
                file_id: best.file_id.clone(),
                caption,
            }
        } else if let Some(document) = &message.document {
            MessageKind::Document {
                file_id: document.file_id.clone(),
                mime_type: document.mime_type.clone(),
                file_name: document.file_name.clone(),
                caption,
            }
        } else {
            return None;
        };

        Some(
            Envelope::new(CHANNEL, kind)
                .with_chat_id(message.chat.id)
                .with_message_id(message.message_id),
        )
    }

    pub async fn poll(&self) -> Result<()> {
        let mut offset: Option<i64> = self.read_offset().await;

        info!(offset = ?offset, "Telegram polling started");

        let mut client = self.client.clone();
        let mut client_recreate_at =
            Instant::now() + Duration::from_secs(self.client_recreate_interval_secs);

        if let Err(err) = self.sync_bot_commands(&client).await {
            warn!("Failed to sync Telegram bot commands: {}", err);
        } else {
            info!("Telegram bot commands synced");
        }

        loop {
            if Instant::now() >= client_recreate_at {
                debug!("Recreating HTTP client to prevent stale connections");
                match Self::build_client() {
                    Ok(fresh) => client = fresh,
                    Err(err) => warn!("Keeping previous HTTP client: {}", err),
                }
                client_recreate_at =
                    Instant::now() + Duration::from_secs(self.client_recreate_interval_secs);
            }

            let updates = match self.get_updates(&client, offset).await {
                Ok(v) => v,
                Err(err) => {
                    warn!("Telegram polling error: {}", err);
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    continue;
                }
            };

            for update in updates {
                offset = Some(update.update_id + 1);
                self.write_offset(update.update_id + 1).await;

                let Some(envelope) = Self::update_to_envelope(&update) else {
                    debug!(update_id = update.update_id, "Ignoring unsupported update");
                    continue;
                };

                info!(
                    chat_id = ?envelope.chat_id,
                    kind = envelope.kind.label(),
                    trace_id = %envelope.trace_id,
                    "Received Telegram update"
                );

                match &self.event_bus {
                    Some(event_bus) => {
                        if let Err(e) = event_bus.publish(envelope) {
                            warn!("Failed to publish update to event bus: {}", e);
                        }
                    }
                    None => info!("No event bus configured, update not forwarded"),
                }
            }
        }
    }

    async fn sync_bot_commands(&self, client: &Client) -> Result<()> {
        let url = format!("{}/setMyCommands", self.api_url);
        let commands = menu::bot_commands(self.language)
            .into_iter()
            .map(|(command, description)| {
                serde_json::json!({ "command": command, "description": description })
            })
            .collect::<Vec<_>>();

        let payload = serde_json::json!({ "commands": commands });
        let resp = client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("telegram setMyCommands request failed: {}", e.without_url()))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(anyhow!("telegram setMyCommands HTTP {}: {}", status, body));
        }

        let parsed: ApiResponse<serde_json::Value> = resp
            .json()
            .await
            .map_err(|e| anyhow!("telegram setMyCommands decode failed: {}", e.without_url()))?;

        if !parsed.ok {
            return Err(anyhow!("telegram setMyCommands returned ok=false"));
        }

        Ok(())
    }

    async fn deliver(&self, msg: &OutboundMessage) -> Result<()> {
        match &msg.action {
            OutboundAction::Text {
                text,
                markdown,
                reply_to,
                keyboard,
            } => {
                self.send_message(msg.chat_id, text, *markdown, *reply_to, keyboard.as_ref())
                    .await
            }
            OutboundAction::Edit {
                message_id,
                text,
                markdown,
                keyboard,
            } => {
                self.edit_message_text(msg.chat_id, *message_id, text, *markdown, keyboard.as_ref())
                    .await
            }
            OutboundAction::EchoMedia {
                kind,
                file_id,
                caption,
            } => {
                self.send_media_echo(msg.chat_id, *kind, file_id, caption.as_deref())
                    .await
            }
            OutboundAction::AnswerCallback { query_id, text } => {
                self.answer_callback_query(query_id, text.as_deref()).await
            }
            OutboundAction::ChatAction { action } => {
                self.send_chat_action(msg.chat_id, action).await
            }
        }
    }

    pub async fn run_outbound_handler(&self, mut receiver: broadcast::Receiver<OutboundMessage>) {
        info!("Telegram outbound handler started");

        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    if msg.channel != CHANNEL {
                        continue;
                    }
                    if let Err(e) = self.deliver(&msg).await {
                        warn!(chat_id = msg.chat_id, "Failed to send outbound message: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Telegram outbound handler stopped: channel closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Telegram outbound handler lagged; skipped {} messages",
                        skipped
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update_from(json: serde_json::Value) -> TelegramUpdate {
        serde_json::from_value(json).expect("valid update")
    }

    #[test]
    fn chunk_message_preserves_content_for_unicode_text() {
        let text = format!("{} {}", "😀".repeat(5000), "fine");
        let chunks = TelegramAdapter::chunk_message(&text);
        assert!(chunks.len() > 1);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn chunk_message_respects_telegram_limit_by_characters() {
        let text = "abc😀".repeat(1500);
        let chunks = TelegramAdapter::chunk_message(&text);
        assert!(chunks.iter().all(|chunk| chunk.chars().count() <= 4096));
    }

    #[test]
    fn parse_command_strips_bot_suffix_and_splits_args() {
        assert_eq!(
            parse_command("/ctx@my_bot add be   terse"),
            Some((
                "ctx".to_string(),
                vec!["add".to_string(), "be".to_string(), "terse".to_string()]
            ))
        );
        assert_eq!(parse_command("/Start"), Some(("start".to_string(), vec![])));
        assert_eq!(parse_command("/"), None);
        assert_eq!(parse_command("hello /start"), None);
    }

    #[test]
    fn text_update_becomes_message_or_command() {
        let plain = update_from(serde_json::json!({
            "update_id": 1,
            "message": {
                "message_id": 10,
                "text": "hi there",
                "chat": { "id": 42, "type": "private" },
                "from": { "id": 7, "username": "alice" }
            }
        }));
        let env = TelegramAdapter::update_to_envelope(&plain).expect("envelope");
        assert_eq!(env.chat_id, Some(42));
        assert_eq!(env.message_id, Some(10));
        assert_eq!(
            env.kind,
            MessageKind::Message {
                from: "alice".to_string(),
                text: "hi there".to_string()
            }
        );

        let command = update_from(serde_json::json!({
            "update_id": 2,
            "message": {
                "message_id": 11,
                "text": "/thinking off",
                "chat": { "id": 42, "type": "private" }
            }
        }));
        let env = TelegramAdapter::update_to_envelope(&command).expect("envelope");
        assert_eq!(
            env.kind,
            MessageKind::Command {
                name: "thinking".to_string(),
                args: vec!["off".to_string()]
            }
        );
    }

    #[test]
    fn photo_update_picks_largest_size() {
        let update = update_from(serde_json::json!({
            "update_id": 3,
            "message": {
                "message_id": 12,
                "caption": "  what is this? ",
                "photo": [
                    { "file_id": "small", "width": 90, "height": 90 },
                    { "file_id": "large", "width": 1280, "height": 960 },
                    { "file_id": "medium", "width": 320, "height": 240 }
                ],
                "chat": { "id": 5, "type": "private" }
            }
        }));
        let env = TelegramAdapter::update_to_envelope(&update).expect("envelope");
        assert_eq!(
            env.kind,
            MessageKind::Photo {
                file_id: "large".to_string(),
                caption: Some("what is this?".to_string())
            }
        );
    }

    #[test]
    fn callback_update_carries_message_id_for_edits() {
        let update = update_from(serde_json::json!({
            "update_id": 4,
            "callback_query": {
                "id": "cb-1",
                "from": { "id": 7 },
                "data": "MODEL|qwen3:4b",
                "message": {
                    "message_id": 99,
                    "chat": { "id": 5, "type": "private" }
                }
            }
        }));
        let env = TelegramAdapter::update_to_envelope(&update).expect("envelope");
        assert_eq!(env.chat_id, Some(5));
        assert_eq!(env.message_id, Some(99));
        assert_eq!(
            env.kind,
            MessageKind::Callback {
                query_id: "cb-1".to_string(),
                data: "MODEL|qwen3:4b".to_string()
            }
        );
    }

    #[test]
    fn sticker_only_update_is_ignored() {
        let update = update_from(serde_json::json!({
            "update_id": 5,
            "message": {
                "message_id": 13,
                "chat": { "id": 5, "type": "private" }
            }
        }));
        assert!(TelegramAdapter::update_to_envelope(&update).is_none());
    }

    #[test]
    fn fallback_helpers_strip_optional_fields() {
        let mut payload = serde_json::json!({
            "chat_id": 123,
            "text": "hello",
            "parse_mode": "Markdown",
            "reply_to_message_id": 42
        });
        assert!(TelegramAdapter::remove_parse_mode(&mut payload));
        assert!(TelegramAdapter::remove_reply_to_message_id(&mut payload));
        assert!(!TelegramAdapter::remove_parse_mode(&mut payload));
        assert_eq!(payload, serde_json::json!({ "chat_id": 123, "text": "hello" }));
    }

    #[test]
    fn detect_missing_reply_target_error() {
        let body = r#"HTTP 400: {"ok":false,"error_code":400,"description":"Bad Request: message to be replied not found"}"#;
        assert!(TelegramAdapter::is_reply_target_missing(body));
    }

    #[test]
    fn keyboard_json_matches_bot_api_shape() {
        let keyboard = menu::model_keyboard(&["gemma3:4b".to_string()]);
        let value = keyboard_json(&keyboard);
        assert_eq!(value["inline_keyboard"][0][0]["text"], "gemma3:4b");
        assert_eq!(
            value["inline_keyboard"][0][0]["callback_data"],
            "MODEL|gemma3:4b"
        );
    }
}
