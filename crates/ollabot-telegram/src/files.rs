//! Media download through `getFile` and the file endpoint

use crate::{ApiResponse, TELEGRAM_API_BASE};
use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct TelegramFile {
    file_path: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

#[derive(Clone)]
pub struct TelegramFiles {
    client: Client,
    bot_token: String,
    api_base: String,
}

impl TelegramFiles {
    pub fn new(bot_token: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .build()
            .map_err(|e| anyhow!("failed to build media HTTP client: {}", e))?;
        Ok(Self {
            client,
            bot_token: bot_token.to_string(),
            api_base: TELEGRAM_API_BASE.to_string(),
        })
    }

    fn get_file_url(&self) -> String {
        format!("{}/bot{}/getFile", self.api_base, self.bot_token)
    }

    fn download_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_base, self.bot_token, file_path)
    }

    pub async fn download(&self, file_id: &str) -> Result<DownloadedFile> {
        let resp = self
            .client
            .post(self.get_file_url())
            .json(&serde_json::json!({ "file_id": file_id }))
            .send()
            .await
            .map_err(|e| anyhow!("telegram getFile request failed: {}", e.without_url()))?;
        let status = resp.status();
        let body = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("telegram getFile failed with HTTP {}", status.as_u16());
        }

        let parsed: ApiResponse<TelegramFile> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("telegram getFile decode failed: {}", e))?;
        if !parsed.ok {
            let description = parsed
                .description
                .unwrap_or_else(|| "unknown getFile error".to_string());
            anyhow::bail!("telegram getFile returned ok=false: {}", description);
        }
        let file_path = parsed
            .result
            .ok_or_else(|| anyhow!("telegram getFile missing result"))?
            .file_path;

        let download = self
            .client
            .get(self.download_url(&file_path))
            .send()
            .await
            .map_err(|e| anyhow!("telegram media download failed: {}", e.without_url()))?;
        let download_status = download.status();
        if !download_status.is_success() {
            anyhow::bail!(
                "telegram media download failed with HTTP {}",
                download_status.as_u16()
            );
        }
        let mime_type = download
            .headers()
            .get("content-type")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.split(';').next().unwrap_or(value).trim().to_string());
        let bytes = download
            .bytes()
            .await
            .map_err(|e| anyhow!("telegram media read failed: {}", e.without_url()))?
            .to_vec();

        Ok(DownloadedFile { bytes, mime_type })
    }
}
