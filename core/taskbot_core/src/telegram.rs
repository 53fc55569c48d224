//! Telegram Bot API: `sendMessage` for output, long-polled `getUpdates` for input.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::app::AppState;
use crate::command::InboundCommand;
use crate::error::DeliveryError;
use crate::handlers::handle_command;
use crate::transport::{OutboundMessage, Transport, MAX_MESSAGE_LEN};

pub const DEFAULT_API_BASE_URL: &str = "https://api.telegram.org";
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub from: Option<User>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct User {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

pub struct TelegramClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
    poll_timeout_seconds: u64,
}

impl TelegramClient {
    pub fn new(base_url: &str, token: &str, poll_timeout_seconds: u64) -> anyhow::Result<Self> {
        if token.trim().is_empty() {
            anyhow::bail!("bot token is empty");
        }
        // The HTTP timeout must outlast the server-side long poll.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(poll_timeout_seconds + 10))
            .build()?;
        Ok(TelegramClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.trim().to_string(),
            poll_timeout_seconds,
        })
    }

    fn api_url(&self, method: &str) -> String {
        format!("{}/bot{}/{method}", self.base_url, self.token)
    }

    /// Fetches updates with `update_id >= offset`, waiting up to the poll timeout.
    pub async fn get_updates(&self, offset: i64) -> Result<Vec<Update>, DeliveryError> {
        let params = [
            ("offset", offset.to_string()),
            ("timeout", self.poll_timeout_seconds.to_string()),
            ("allowed_updates", r#"["message"]"#.to_string()),
        ];
        let resp = self
            .client
            .get(self.api_url("getUpdates"))
            .query(&params)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body: ApiResponse<Vec<Update>> = resp.json().await?;
        if !body.ok {
            return Err(DeliveryError::Api {
                status,
                description: body.description.unwrap_or_else(|| "unknown error".into()),
            });
        }
        Ok(body.result.unwrap_or_default())
    }
}

/// JSON body for `sendMessage`.
pub fn send_payload(chat_id: i64, message: &OutboundMessage) -> Value {
    let mut payload = json!({
        "chat_id": chat_id,
        "text": message.text,
        "disable_web_page_preview": true,
    });
    if message.markdown {
        payload["parse_mode"] = json!("Markdown");
    }
    // Telegram accepts one reply_markup; inline links win over the keyboard.
    if !message.links.is_empty() {
        let rows: Vec<Value> = message
            .links
            .iter()
            .map(|l| json!([{ "text": l.label, "url": l.url }]))
            .collect();
        payload["reply_markup"] = json!({ "inline_keyboard": rows });
    } else if !message.quick_replies.is_empty() {
        let rows: Vec<Vec<Value>> = message
            .quick_replies
            .iter()
            .map(|row| row.iter().map(|label| json!({ "text": label })).collect())
            .collect();
        payload["reply_markup"] = json!({ "keyboard": rows, "resize_keyboard": true });
    }
    payload
}

/// Extracts commands from a batch and returns the offset for the next poll.
///
/// Updates without text, or whose text is not a command, are skipped but still
/// acknowledged.
pub fn parse_updates(updates: Vec<Update>, offset: i64) -> (Vec<InboundCommand>, i64) {
    let mut next = offset;
    let mut commands = Vec::new();
    for update in updates {
        next = next.max(update.update_id + 1);
        let Some(msg) = update.message else {
            continue;
        };
        let Some(text) = msg.text.as_deref() else {
            continue;
        };
        let sender = msg
            .from
            .and_then(|u| u.first_name.or(u.username));
        if let Some(cmd) = InboundCommand::parse(msg.chat.id, sender, text) {
            commands.push(cmd);
        } else {
            debug!(chat_id = msg.chat.id, "ignoring non-command message");
        }
    }
    (commands, next)
}

#[async_trait]
impl Transport for TelegramClient {
    /// Long texts go out as several messages, in order; the first failure stops the rest.
    async fn send(&self, chat_id: i64, message: &OutboundMessage) -> Result<(), DeliveryError> {
        for part in message.chunks(MAX_MESSAGE_LEN) {
            let resp = self
                .client
                .post(self.api_url("sendMessage"))
                .json(&send_payload(chat_id, &part))
                .send()
                .await?;
            let status = resp.status().as_u16();
            let body: ApiResponse<Value> = resp.json().await?;
            if !body.ok {
                return Err(DeliveryError::Api {
                    status,
                    description: body.description.unwrap_or_else(|| "unknown error".into()),
                });
            }
        }
        Ok(())
    }
}

/// Long-polls for commands and answers each one in order, until shutdown.
pub async fn run_poller(
    state: AppState,
    client: Arc<TelegramClient>,
    mut shutdown_rx: broadcast::Receiver<()>,
) {
    info!("chat poller started");
    let mut offset = 0_i64;
    loop {
        let updates = tokio::select! {
            _ = shutdown_rx.recv() => break,
            res = client.get_updates(offset) => res,
        };
        let updates = match updates {
            Ok(updates) => updates,
            Err(err) => {
                warn!("getUpdates failed: {err}; retrying in {}s", RETRY_DELAY.as_secs());
                tokio::select! {
                    _ = shutdown_rx.recv() => break,
                    _ = tokio::time::sleep(RETRY_DELAY) => continue,
                }
            }
        };

        let (commands, next) = parse_updates(updates, offset);
        offset = next;
        for cmd in commands {
            for reply in handle_command(&state, &cmd).await {
                if let Err(err) = state.transport.send(cmd.chat_id, &reply).await {
                    error!(chat_id = cmd.chat_id, command = %cmd.keyword, "reply delivery failed: {err}");
                }
            }
        }
    }
    info!("chat poller shutting down");
}
