//! Text transforms applied to model output before delivery

use ollabot_config::PostprocessConfig;
use std::ops::RangeInclusive;

#[derive(Debug, Clone)]
pub struct Pipeline {
    think_open: String,
    think_close: String,
    strip_ranges: Vec<RangeInclusive<char>>,
}

impl Pipeline {
    pub fn new(
        think_open: impl Into<String>,
        think_close: impl Into<String>,
        strip_ranges: Vec<RangeInclusive<char>>,
    ) -> Self {
        Self {
            think_open: think_open.into(),
            think_close: think_close.into(),
            strip_ranges,
        }
    }

    pub fn from_config(config: &PostprocessConfig) -> Self {
        let ranges = config
            .strip_ranges
            .iter()
            .filter_map(|range| range.to_range())
            .collect();
        Self::new(config.think_open.clone(), config.think_close.clone(), ranges)
    }

    /// Character filter first, then reasoning removal when `thinking_visible`
    /// is false. Applying it twice yields the same text.
    pub fn process(&self, raw: &str, thinking_visible: bool) -> String {
        let filtered = self.strip_char_ranges(raw);
        if thinking_visible {
            filtered
        } else {
            self.strip_reasoning(&filtered)
        }
    }

    /// Removes `open ... close` blocks (shortest match) until none remain.
    /// An open marker without a close after it leaves the rest untouched.
    pub fn strip_reasoning(&self, text: &str) -> String {
        if self.think_open.is_empty() || self.think_close.is_empty() {
            return text.to_string();
        }

        let mut current = text.to_string();
        loop {
            let (next, removed) = self.strip_reasoning_pass(&current);
            if !removed {
                return next;
            }
            current = next;
        }
    }

    fn strip_reasoning_pass(&self, text: &str) -> (String, bool) {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        let mut removed = false;

        while let Some(start) = rest.find(&self.think_open) {
            let after_open = start + self.think_open.len();
            let Some(close_rel) = rest[after_open..].find(&self.think_close) else {
                break;
            };
            out.push_str(&rest[..start]);
            rest = &rest[after_open + close_rel + self.think_close.len()..];
            removed = true;
        }
        out.push_str(rest);

        (out, removed)
    }

    pub fn strip_char_ranges(&self, text: &str) -> String {
        if self.strip_ranges.is_empty() {
            return text.to_string();
        }
        text.chars()
            .filter(|c| !self.strip_ranges.iter().any(|range| range.contains(c)))
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::from_config(&PostprocessConfig::default())
    }
}
