//! Posts reports to a Telegram chat through the bot API.
use crate::config::Credentials;
use crate::error::Error;
use async_trait::async_trait;
use std::time::Duration;

/// Hard limit of the bot API for one message.
pub const TELEGRAM_MAX_CHARS: usize = 4096;

/// Where finished reports go.
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Delivers `text`, possibly as several messages. Returns how many were sent.
    async fn deliver(&self, text: &str) -> Result<usize, Error>;
}

#[derive(serde::Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(serde::Deserialize)]
struct ApiError {
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramClient {
    http: reqwest::Client,
    endpoint: url::Url,
    chat_id: String,
    max_chars: usize,
}

impl TelegramClient {
    pub fn new(
        api_base: &str,
        credentials: &Credentials,
        timeout: Duration,
        max_chars: usize,
    ) -> Result<Self, String> {
        let mut endpoint = url::Url::parse(api_base)
            .map_err(|err| format!("Invalid telegram api base {}: {}", api_base, err))?;
        endpoint
            .path_segments_mut()
            .map_err(|_| format!("Telegram api base {} cannot carry a path", api_base))?
            .pop_if_empty()
            .push(&format!("bot{}", credentials.bot_token))
            .push("sendMessage");

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| format!("Failed to build telegram http client: {}", err))?;

        Ok(TelegramClient {
            http,
            endpoint,
            chat_id: credentials.chat_id.clone(),
            max_chars: max_chars.clamp(1, TELEGRAM_MAX_CHARS),
        })
    }

    async fn send_chunk(&self, text: &str, delivered: usize) -> Result<(), Error> {
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let resp = self
            .http
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::network("telegram", e))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        let description = serde_json::from_str::<ApiError>(&body)
            .ok()
            .and_then(|e| e.description)
            .unwrap_or_else(|| body.chars().take(200).collect());

        Err(Error::Delivery {
            status,
            description,
            delivered,
        })
    }
}

#[async_trait]
impl ReportSink for TelegramClient {
    /// Sends each chunk as its own request, in order. A failure stops the
    /// sequence; chunks already posted stay posted.
    async fn deliver(&self, text: &str) -> Result<usize, Error> {
        let mut delivered = 0;
        for chunk in split_message(text, self.max_chars) {
            if chunk.trim().is_empty() {
                continue;
            }
            self.send_chunk(&chunk, delivered).await?;
            delivered += 1;
            tracing::debug!(chunk = delivered, chars = chunk.chars().count(), "message chunk delivered");
        }
        Ok(delivered)
    }
}

/// Splits `text` into pieces of at most `max_chars` characters, cutting only
/// between lines. Joining the pieces with `\n` gives back `text`.
///
/// A single line longer than `max_chars` cannot satisfy both rules; it is cut
/// at character boundaries and that is the only case where the join does not
/// reproduce the input.
pub fn split_message(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    let mut open = false;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if line_len > max_chars {
            if open {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
                open = false;
            }
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(max_chars).map(|piece| piece.iter().collect::<String>()));
            continue;
        }

        if open && current_len + 1 + line_len > max_chars {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
            open = false;
        }
        if open {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
        open = true;
    }

    if open {
        chunks.push(current);
    }
    chunks
}
