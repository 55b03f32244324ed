//! File and stderr logging
//!
//! The file side is a daily rolling appender writing `ollabot.log.YYYY-MM-DD`
//! (UTC dates) under the data dir. Rolled files older than a week are removed
//! at startup.

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

const LOG_FILE_NAME: &str = "ollabot.log";
const LOG_RETENTION_DAYS: i64 = 7;

/// Date stamped by the rolling appender, if `file_name` is one of ours.
fn rolled_date(file_name: &str) -> Option<NaiveDate> {
    let stamp = file_name.strip_prefix(LOG_FILE_NAME)?.strip_prefix('.')?;
    NaiveDate::parse_from_str(stamp, "%Y-%m-%d").ok()
}

/// Rolled log files, newest first.
pub fn rolled_logs(log_dir: &Path) -> Result<Vec<(NaiveDate, PathBuf)>> {
    let mut logs = Vec::new();
    let entries = fs::read_dir(log_dir)
        .with_context(|| format!("Failed to read log dir {}", log_dir.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let date = path
            .file_name()
            .and_then(|name| name.to_str())
            .and_then(rolled_date);
        if let Some(date) = date {
            logs.push((date, path));
        }
    }
    logs.sort_by(|a, b| b.0.cmp(&a.0));
    Ok(logs)
}

/// Deletes rolled files stamped more than the retention window before `today`.
pub fn remove_expired_logs(log_dir: &Path, today: NaiveDate) -> Result<usize> {
    let mut removed = 0;
    for (date, path) in rolled_logs(log_dir)? {
        if (today - date).num_days() <= LOG_RETENTION_DAYS {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => eprintln!("Failed to delete old log {}: {}", path.display(), e),
        }
    }
    Ok(removed)
}

pub fn total_log_size(log_dir: &Path) -> Result<u64> {
    Ok(rolled_logs(log_dir)?
        .iter()
        .filter_map(|(_, path)| fs::metadata(path).ok())
        .map(|meta| meta.len())
        .sum())
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

pub struct LoggingGuard {
    _guard: WorkerGuard,
}

pub fn init_logging(log_dir: &Path, log_level: &str) -> Result<LoggingGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("Failed to create log dir {}", log_dir.display()))?;
    let removed = remove_expired_logs(log_dir, Utc::now().date_naive())?;

    let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
        })
    };

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_filter(filter());

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_filter(filter());

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .try_init()?;

    if removed > 0 {
        tracing::info!("Cleaned up {} old log file(s)", removed);
    }
    Ok(LoggingGuard { _guard: guard })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn temp_log_dir(name: &str) -> PathBuf {
        let ts = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("ollabot-logs-{}-{}", name, ts));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn rolled_date_matches_appender_names_only() {
        assert_eq!(rolled_date("ollabot.log.2026-10-15"), Some(day("2026-10-15")));
        assert_eq!(rolled_date("ollabot.log"), None);
        assert_eq!(rolled_date("ollabot.log.bak"), None);
        assert_eq!(rolled_date("ollabot.2026-10-15.log"), None);
        assert_eq!(rolled_date("other.log.2026-10-15"), None);
    }

    #[test]
    fn cleanup_removes_rolled_files_past_retention() {
        let dir = temp_log_dir("cleanup");
        fs::write(dir.join("ollabot.log.2026-10-01"), "old").unwrap();
        fs::write(dir.join("ollabot.log.2026-10-08"), "edge").unwrap();
        fs::write(dir.join("ollabot.log.2026-10-15"), "today").unwrap();
        fs::write(dir.join("notes.txt"), "keep").unwrap();

        let removed = remove_expired_logs(&dir, day("2026-10-15")).unwrap();
        assert_eq!(removed, 1);
        assert!(!dir.join("ollabot.log.2026-10-01").exists());
        assert!(dir.join("ollabot.log.2026-10-08").exists());
        assert!(dir.join("notes.txt").exists());

        let dates: Vec<NaiveDate> = rolled_logs(&dir)
            .unwrap()
            .into_iter()
            .map(|(date, _)| date)
            .collect();
        assert_eq!(dates, vec![day("2026-10-15"), day("2026-10-08")]);
        assert_eq!(total_log_size(&dir).unwrap(), 9);

        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn format_size_picks_unit() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.00 KB");
        assert_eq!(format_size(3 * 1024 * 1024), "3.00 MB");
    }
}
