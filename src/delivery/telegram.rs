use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{Ack, Channel, Delivery};
use crate::types::{AppError, AppResult};

pub struct TelegramDelivery {
    client: Client,
    api_base: String,
    bot_token: String,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct TelegramResponse {
    ok: bool,
    #[serde(default)]
    result: Option<TelegramMessage>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize)]
struct TelegramMessage {
    message_id: i64,
}

impl TelegramDelivery {
    pub fn new(api_base: &str, bot_token: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            bot_token: bot_token.to_string(),
        }
    }

    fn url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }
}

#[async_trait]
impl Delivery for TelegramDelivery {
    fn channel(&self) -> Channel {
        Channel::Telegram
    }

    async fn deliver(&self, recipient: &str, message: &str) -> AppResult<Ack> {
        let response = self
            .client
            .post(self.url("sendMessage"))
            .json(&SendMessageRequest {
                chat_id: recipient,
                text: message,
            })
            .send()
            .await
            .map_err(|e| AppError::Internal(format!("Telegram request failed: {}", e)))?;

        let status = response.status();
        let body: TelegramResponse = response
            .json()
            .await
            .map_err(|e| AppError::Internal(format!("Telegram returned {} with unreadable body: {}", status, e)))?;

        if !status.is_success() || !body.ok {
            return Err(AppError::Internal(format!(
                "Telegram sendMessage failed ({}): {}",
                status,
                body.description.unwrap_or_default()
            )));
        }

        Ok(Ack {
            channel: Channel::Telegram,
            recipient: recipient.to_string(),
            message_id: body.result.map(|m| m.message_id.to_string()),
            attempts: 1,
        })
    }
}
