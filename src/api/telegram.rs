use crate::alerts::{Alert, Notifier};
use crate::bot::{BotHandle, Command};
use crate::error::NotifyError;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    result: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
}

/// Sends alerts to one chat via the Bot API
#[derive(Clone)]
pub struct TelegramNotifier {
    client: Client,
    base_url: String,
    token: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(token: &str, chat_id: &str) -> Self {
        Self::with_base_url(TELEGRAM_API_BASE, token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: &str, chat_id: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id: chat_id.to_string(),
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, alert: &Alert) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.token);
        let body = json!({
            "chat_id": self.chat_id,
            "text": alert.render(),
            "parse_mode": "HTML",
        });

        let response: ApiResponse<serde_json::Value> = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        if !response.ok {
            return Err(NotifyError::Rejected(
                response.description.unwrap_or_else(|| "unknown error".to_string()),
            ));
        }

        tracing::debug!("Telegram {} alert sent", alert.kind());
        Ok(())
    }
}

/// Long-polls `getUpdates` and turns chat commands into bot commands
pub struct TelegramCommandPoller {
    client: Client,
    base_url: String,
    token: String,
    chat_id: i64,
    offset: i64,
}

impl TelegramCommandPoller {
    pub fn new(token: &str, chat_id: i64) -> Self {
        Self::with_base_url(TELEGRAM_API_BASE, token, chat_id)
    }

    pub fn with_base_url(base_url: &str, token: &str, chat_id: i64) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            chat_id,
            offset: 0,
        }
    }

    /// Fetch pending updates. Messages from other chats and unknown commands
    /// are dropped.
    pub async fn poll(&mut self, timeout_secs: u64) -> Result<Vec<Command>, NotifyError> {
        let url = format!(
            "{}/bot{}/getUpdates?offset={}&timeout={}",
            self.base_url, self.token, self.offset, timeout_secs
        );

        let response: ApiResponse<Vec<Update>> = self.client.get(&url).send().await?.json().await?;
        if !response.ok {
            return Err(NotifyError::Rejected(
                response.description.unwrap_or_else(|| "getUpdates failed".to_string()),
            ));
        }

        let mut commands = Vec::new();
        for update in response.result.unwrap_or_default() {
            self.offset = self.offset.max(update.update_id + 1);

            let Some(message) = update.message else {
                continue;
            };
            if message.chat.id != self.chat_id {
                tracing::warn!("Ignoring command from unauthorised chat {}", message.chat.id);
                continue;
            }
            let Some(text) = message.text else {
                continue;
            };
            match text.parse::<Command>() {
                Ok(command) => commands.push(command),
                Err(e) => tracing::debug!("Ignoring message: {}", e),
            }
        }

        Ok(commands)
    }

    /// Run until the receiving side is dropped
    pub async fn run(mut self, handle: BotHandle) {
        tracing::info!("📨 Telegram command poller started");
        loop {
            match self.poll(30).await {
                Ok(batch) => {
                    for command in batch {
                        if !handle.send(command).await {
                            return;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Telegram poll failed: {}", e);
                    tokio::time::sleep(std::time::Duration::from_secs(5)).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Profile;

    #[tokio::test]
    async fn test_send_posts_html_message() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(mockito::Matcher::PartialJson(json!({
                "chat_id": "42",
                "parse_mode": "HTML",
            })))
            .with_status(200)
            .with_body(r#"{"ok": true, "result": {}}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url(&server.url(), "TOKEN", "42");
        notifier.send(&Alert::Info("started".into())).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_send_surfaces_api_rejection() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(200)
            .with_body(r#"{"ok": false, "description": "chat not found"}"#)
            .create_async()
            .await;

        let notifier = TelegramNotifier::with_base_url(&server.url(), "TOKEN", "42");
        let err = notifier.send(&Alert::Info("x".into())).await.unwrap_err();
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_poll_filters_chat_and_advances_offset() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/botTOKEN/getUpdates")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(
                r#"{"ok": true, "result": [
                    {"update_id": 7, "message": {"chat": {"id": 42}, "text": "/pause"}},
                    {"update_id": 8, "message": {"chat": {"id": 99}, "text": "/kill"}},
                    {"update_id": 9, "message": {"chat": {"id": 42}, "text": "/profile ltf_15m"}},
                    {"update_id": 10, "message": {"chat": {"id": 42}, "text": "hello"}}
                ]}"#,
            )
            .create_async()
            .await;

        let mut poller = TelegramCommandPoller::with_base_url(&server.url(), "TOKEN", 42);
        let commands = poller.poll(0).await.unwrap();

        assert_eq!(
            commands,
            vec![Command::Pause, Command::SwitchProfile(Profile::Ltf15m)]
        );
        assert_eq!(poller.offset, 11);
    }
}
