//! Ollabot Telegram texts and keyboards with i18n
//!
//! Every user-visible string the bot sends lives here.

use ollabot_ipc::{InlineButton, InlineKeyboard};

pub const MODEL_CALLBACK_PREFIX: &str = "MODEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    English,
    Russian,
}

impl std::str::FromStr for Language {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "en" | "english" => Ok(Language::English),
            "ru" | "russian" => Ok(Language::Russian),
            _ => Err(format!("Unknown language: {}", s)),
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Language::English => write!(f, "en"),
            Language::Russian => write!(f, "ru"),
        }
    }
}

/// Commands registered with `setMyCommands`.
pub fn bot_commands(lang: Language) -> Vec<(&'static str, &'static str)> {
    match lang {
        Language::English => vec![
            ("start", "Greeting and model choice"),
            ("m", "Choose a model"),
            ("model", "Set a model by name"),
            ("help", "Show commands"),
            ("clear", "Clear history"),
            ("reset", "Clear history and context"),
            ("ctx", "Add or remove system context"),
            ("thinking", "Show or hide <think> blocks"),
        ],
        Language::Russian => vec![
            ("start", "Приветствие и выбор модели"),
            ("m", "Выбрать модель"),
            ("model", "Задать модель по имени"),
            ("help", "Список команд"),
            ("clear", "Очистить историю"),
            ("reset", "История и контекст = Ø"),
            ("ctx", "Системный промпт"),
            ("thinking", "Скрывать <think>"),
        ],
    }
}

fn command_block(lang: Language) -> &'static str {
    match lang {
        Language::English => "Commands:\n• /help – list commands\n• /m – choose a model\n• /model <name> – set a model by name\n• /clear – clear history\n• /reset – history + context = Ø\n• /ctx add <txt> /ctx del – system prompt\n• /thinking on|off – hide <think>\n• image + caption – vision request",
        Language::Russian => "Команды:\n• /help – вызов списка команд\n• /m – выбрать модель\n• /model <имя> – задать модель\n• /clear – очистить историю\n• /reset – история+контекст=Ø\n• /ctx add <txt> /ctx del – системный промпт\n• /thinking on|off – скрывать <think>\n• изображение + подпись – vision-запрос",
    }
}

pub fn start_text(lang: Language) -> String {
    match lang {
        Language::English => format!(
            "👋 I am a local LLM bot.\n{}\n\nPick a model below or use /m.",
            command_block(lang)
        ),
        Language::Russian => format!(
            "👋 Я локальный LLM-бот.\n{}\n\nНиже выберите модель или используйте /m.",
            command_block(lang)
        ),
    }
}

pub fn help_text(lang: Language) -> String {
    match lang {
        Language::English => format!("👋 I am a local LLM bot.\n{}", command_block(lang)),
        Language::Russian => format!("👋 Я локальный LLM-бот.\n{}", command_block(lang)),
    }
}

pub fn choose_model_prompt(lang: Language) -> &'static str {
    match lang {
        Language::English => "Please choose a model first:",
        Language::Russian => "Пожалуйста, выберите модель сначала:",
    }
}

pub fn switch_model_prompt(lang: Language) -> &'static str {
    match lang {
        Language::English => "Switch model:",
        Language::Russian => "Сменить модель:",
    }
}

pub fn model_switched_text(lang: Language, model: &str) -> String {
    match lang {
        Language::English => format!("✅ Model switched to *{}*", model),
        Language::Russian => format!("✅ Модель переключена на *{}*", model),
    }
}

pub fn model_usage_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Use /model <name>",
        Language::Russian => "Используйте /model <имя>",
    }
}

pub fn unknown_model_text(lang: Language, model: &str, available: &[String]) -> String {
    match lang {
        Language::English => format!(
            "❌ Unknown model '{}'. Available: {}",
            model,
            available.join(", ")
        ),
        Language::Russian => format!(
            "❌ Неизвестная модель '{}'. Доступны: {}",
            model,
            available.join(", ")
        ),
    }
}

pub fn no_models_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "⚠️ The backend reports no installed models.",
        Language::Russian => "⚠️ На сервере нет установленных моделей.",
    }
}

pub fn models_unavailable_text(lang: Language, reason: &str) -> String {
    match lang {
        Language::English => format!("❌ Could not fetch the model list: {}", reason),
        Language::Russian => format!("❌ Не удалось получить список моделей: {}", reason),
    }
}

pub fn history_cleared_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "🗑️ History cleared.",
        Language::Russian => "🗑️ История очищена.",
    }
}

pub fn reset_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "🔄 History and context removed.",
        Language::Russian => "🔄 История и контекст удалены.",
    }
}

pub fn ctx_usage_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Use /ctx add <txt> or /ctx del",
        Language::Russian => "Используйте /ctx add <txt> или /ctx del",
    }
}

pub fn ctx_added_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "➕ Context added.",
        Language::Russian => "➕ Контекст добавлен.",
    }
}

pub fn ctx_removed_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "➖ Context removed.",
        Language::Russian => "➖ Контекст удалён.",
    }
}

pub fn thinking_usage_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Use /thinking on|off",
        Language::Russian => "Используйте /thinking on|off",
    }
}

pub fn thinking_set_text(lang: Language, visible: bool) -> String {
    let state = if visible { "on" } else { "off" };
    match lang {
        Language::English => format!("🧠 Thinking mode: {}", state),
        Language::Russian => format!("🧠 Режим размышлений: {}", state),
    }
}

pub fn vision_unsupported_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "⚠️ The current model does not support images.",
        Language::Russian => "⚠️ Текущая модель не поддерживает обработку изображений.",
    }
}

pub fn processing_image_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Processing image...",
        Language::Russian => "Обрабатываю изображение...",
    }
}

pub fn default_image_prompt(lang: Language) -> &'static str {
    match lang {
        Language::English => "Describe the image.",
        Language::Russian => "Опиши изображение.",
    }
}

pub fn send_image_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Please send an image (jpg/png/gif/…)",
        Language::Russian => "Пожалуйста, отправьте изображение (jpg/png/gif/…)",
    }
}

pub fn image_error_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "❌ Could not download the image.",
        Language::Russian => "❌ Не удалось загрузить изображение.",
    }
}

/// `reason` is a short category, never a raw error.
pub fn backend_error_text(lang: Language, reason: &str) -> String {
    match lang {
        Language::English => format!("❌ The model backend failed: {}", reason),
        Language::Russian => format!("❌ Ошибка сервера модели: {}", reason),
    }
}

pub fn empty_response_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "(empty response)",
        Language::Russian => "(пустой ответ)",
    }
}

pub fn unknown_command_text(lang: Language) -> &'static str {
    match lang {
        Language::English => "Unknown command. See /help.",
        Language::Russian => "Неизвестная команда. См. /help.",
    }
}

/// One button per row, callback data `MODEL|<id>`.
pub fn model_keyboard(models: &[String]) -> InlineKeyboard {
    models
        .iter()
        .map(|model| {
            vec![InlineButton {
                text: model.clone(),
                callback_data: format!("{}|{}", MODEL_CALLBACK_PREFIX, model),
            }]
        })
        .collect()
}

/// Extracts the model id from `MODEL|<id>`. Only the first `|` separates.
pub fn parse_model_callback(data: &str) -> Option<&str> {
    let (prefix, model) = data.split_once('|')?;
    if prefix != MODEL_CALLBACK_PREFIX || model.is_empty() {
        return None;
    }
    Some(model)
}
