//! Telegram Bot API client (sendMessage / getUpdates)

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use super::ChatSender;
use crate::config::TelegramConfig;
use crate::error::{Error, Result};
use crate::store::ChatRecipient;

/// Envelope every Bot API method returns
#[derive(Debug, Deserialize)]
struct BotResponse {
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    description: Option<String>,
}

pub struct TelegramBot {
    client: reqwest::Client,
    api_base: String,
    token: String,
}

impl TelegramBot {
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            return Err(Error::Config("telegram.bot_token is not set".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    async fn call(&self, request: reqwest::RequestBuilder, method: &str) -> Result<Value> {
        let response: BotResponse = request
            .send()
            .await
            .map_err(|e| Error::Notification(format!("{}: {}", method, e.without_url())))?
            .json()
            .await
            .map_err(|e| Error::Notification(format!("{}: {}", method, e.without_url())))?;

        if !response.ok {
            return Err(Error::Notification(format!(
                "{} rejected: {}",
                method,
                response.description.unwrap_or_default()
            )));
        }
        Ok(response.result)
    }

    /// Chats that have messaged the bot recently
    pub async fn get_updates(&self) -> Result<Vec<ChatRecipient>> {
        let result = self
            .call(self.client.get(self.method_url("getUpdates")), "getUpdates")
            .await?;
        Ok(parse_updates(&result))
    }
}

#[async_trait]
impl ChatSender for TelegramBot {
    async fn send_message(&self, chat_id: i64, text: &str) -> Result<()> {
        let body = json!({ "chat_id": chat_id, "text": text });
        self.call(
            self.client.post(self.method_url("sendMessage")).json(&body),
            "sendMessage",
        )
        .await?;
        debug!("Delivered message to chat {}", chat_id);
        Ok(())
    }
}

/// Extract the chat of every update that carries a message
pub fn parse_updates(result: &Value) -> Vec<ChatRecipient> {
    let Some(updates) = result.as_array() else {
        return Vec::new();
    };

    updates
        .iter()
        .filter_map(|update| update.get("message")?.get("chat"))
        .filter_map(|chat| {
            let id = chat.get("id")?.as_i64()?;
            Some(ChatRecipient {
                id,
                first_name: chat
                    .get("first_name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                username: chat
                    .get("username")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            })
        })
        .collect()
}
