//! Dotenv file support for the bot token and friends.

use std::collections::HashMap;
use std::path::Path;

/// Parse a dotenv-format string into a key-value map.
///
/// Supports `KEY=value`, `export KEY=value`, quoted values, comments and
/// blank lines.
pub fn parse_dotenv(content: &str) -> HashMap<String, String> {
    let mut map = HashMap::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let key = key.strip_prefix("export ").map(str::trim).unwrap_or(key);
        if key.is_empty() {
            continue;
        }
        map.insert(key.to_string(), unquote_env_value(value.trim()));
    }
    map
}

fn unquote_env_value(s: &str) -> String {
    if s.len() >= 2
        && ((s.starts_with('"') && s.ends_with('"')) || (s.starts_with('\'') && s.ends_with('\'')))
    {
        return s[1..s.len() - 1].to_string();
    }
    s.to_string()
}

/// Reads a dotenv file. A missing file yields an empty map.
pub fn load_dotenv(path: &Path) -> anyhow::Result<HashMap<String, String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(parse_dotenv(&content)),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
        Err(err) => Err(anyhow::anyhow!(
            "Failed to read env file {}: {}",
            path.display(),
            err
        )),
    }
}

/// Environment lookup where the process environment shadows dotenv values.
pub fn layered_lookup(dotenv: HashMap<String, String>) -> impl Fn(&str) -> Option<String> {
    move |key: &str| std::env::var(key).ok().or_else(|| dotenv.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_dotenv_basic() {
        let content = "BOT_TOKEN=123:abc\nOLLAMA_HOST=http://box:11434\n# comment\n\nDEFAULT_MODEL=\"qwen3:4b\"";
        let map = parse_dotenv(content);
        assert_eq!(map.get("BOT_TOKEN").unwrap(), "123:abc");
        assert_eq!(map.get("OLLAMA_HOST").unwrap(), "http://box:11434");
        assert_eq!(map.get("DEFAULT_MODEL").unwrap(), "qwen3:4b");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn parse_dotenv_export_prefix_and_single_quotes() {
        let map = parse_dotenv("export BOT_TOKEN='1:x'");
        assert_eq!(map.get("BOT_TOKEN").unwrap(), "1:x");
    }

    #[test]
    fn missing_env_file_is_empty() {
        let path = std::env::temp_dir().join("ollabot-definitely-missing.env");
        let map = load_dotenv(&path).expect("missing file is fine");
        assert!(map.is_empty());
    }

    #[test]
    fn layered_lookup_falls_back_to_dotenv() {
        let mut dotenv = HashMap::new();
        dotenv.insert(
            "OLLABOT_TEST_ONLY_IN_DOTENV".to_string(),
            "from-file".to_string(),
        );
        let lookup = layered_lookup(dotenv);
        assert_eq!(
            lookup("OLLABOT_TEST_ONLY_IN_DOTENV").as_deref(),
            Some("from-file")
        );
        assert!(lookup("OLLABOT_TEST_NOWHERE").is_none());
    }
}
