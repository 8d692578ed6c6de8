use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::types::{Inbound, MenuOption};

const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram API error {code}: {description}")]
    Api { code: i64, description: String },
    #[error("telegram API returned ok without a result")]
    EmptyResult,
}

/// Outbound side of the operator chat.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;

    /// Send `text` with one inline button per option, one option per row.
    async fn send_menu(&self, chat_id: i64, text: &str, options: &[MenuOption]) -> Result<()>;

    /// Answer a button press so the client stops its loading indicator.
    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()>;

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub from: Option<User>,
    pub chat: Chat,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub message: Option<Message>,
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
}

impl Update {
    /// Typed operator input, or `None` for updates the bot does not act on.
    pub fn into_inbound(self) -> Option<Inbound> {
        if let Some(query) = self.callback_query {
            return Some(Inbound::Callback {
                sender: query.from.id,
                callback_id: query.id,
                chat_id: query.message.as_ref().map(|m| m.chat.id),
                message_id: query.message.as_ref().map(|m| m.message_id),
                data: query.data.unwrap_or_default(),
            });
        }
        let message = self.message?;
        let sender = message.from?.id;
        Some(Inbound::Message {
            sender,
            chat_id: message.chat.id,
            text: message.text?,
        })
    }
}

#[derive(Debug, Serialize)]
struct InlineKeyboardButton<'a> {
    text: &'a str,
    callback_data: &'a str,
}

#[derive(Debug, Serialize)]
struct InlineKeyboardMarkup<'a> {
    inline_keyboard: Vec<Vec<InlineKeyboardButton<'a>>>,
}

#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<InlineKeyboardMarkup<'a>>,
}

#[derive(Debug, Serialize)]
struct GetUpdates<'a> {
    offset: i64,
    timeout: u64,
    allowed_updates: &'a [&'a str],
}

#[derive(Debug, Serialize)]
struct AnswerCallbackQuery<'a> {
    callback_query_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct EditMessageText<'a> {
    chat_id: i64,
    message_id: i64,
    text: &'a str,
}

/// Minimal Telegram Bot API client over HTTPS.
#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base_url: String,
    request_timeout: Duration,
}

impl TelegramClient {
    pub fn new(api_url: &str, token: &str, request_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;
        Ok(Self {
            http,
            base_url: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            request_timeout,
        })
    }

    async fn call<P, R>(&self, method: &str, params: &P, timeout: Duration) -> Result<R, TelegramError>
    where
        P: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let res: ApiResponse<R> = self
            .http
            .post(format!("{}/{}", self.base_url, method))
            .timeout(timeout)
            .json(params)
            .send()
            .await?
            .json()
            .await?;
        if !res.ok {
            return Err(TelegramError::Api {
                code: res.error_code.unwrap_or_default(),
                description: res.description.unwrap_or_else(|| "unknown error".to_string()),
            });
        }
        res.result.ok_or(TelegramError::EmptyResult)
    }

    /// Verifies the token; used as the startup readiness check.
    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.call("getMe", &serde_json::json!({}), self.request_timeout).await
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let params = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: &["message", "callback_query"],
        };
        // long poll: give the server its full timeout before we give up
        let http_timeout = Duration::from_secs(timeout_secs) + self.request_timeout;
        self.call("getUpdates", &params, http_timeout).await
    }

    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        options: Option<&[MenuOption]>,
    ) -> Result<Message, TelegramError> {
        let reply_markup = options.map(|options| InlineKeyboardMarkup {
            inline_keyboard: options
                .iter()
                .map(|o| {
                    vec![InlineKeyboardButton {
                        text: &o.label,
                        callback_data: &o.payload,
                    }]
                })
                .collect(),
        });
        let params = SendMessage {
            chat_id,
            text,
            reply_markup,
        };
        self.call("sendMessage", &params, self.request_timeout).await
    }

    pub async fn answer_callback_query(&self, callback_id: &str, text: Option<&str>) -> Result<bool, TelegramError> {
        let params = AnswerCallbackQuery {
            callback_query_id: callback_id,
            text,
        };
        self.call("answerCallbackQuery", &params, self.request_timeout).await
    }

    pub async fn edit_message_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<(), TelegramError> {
        let params = EditMessageText {
            chat_id,
            message_id,
            text,
        };
        // result is the edited Message, or `true` for inline messages
        let _: serde_json::Value = self.call("editMessageText", &params, self.request_timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        self.send_message(chat_id, text, None).await?;
        Ok(())
    }

    async fn send_menu(&self, chat_id: i64, text: &str, options: &[MenuOption]) -> Result<()> {
        self.send_message(chat_id, text, Some(options)).await?;
        Ok(())
    }

    async fn acknowledge(&self, callback_id: &str, text: Option<&str>) -> Result<()> {
        self.answer_callback_query(callback_id, text).await?;
        Ok(())
    }

    async fn edit_text(&self, chat_id: i64, message_id: i64, text: &str) -> Result<()> {
        self.edit_message_text(chat_id, message_id, text).await?;
        Ok(())
    }
}

/// Long-poll `getUpdates` and forward decoded operator input until shutdown.
pub async fn poll_updates(
    client: TelegramClient,
    timeout_secs: u64,
    tx: mpsc::Sender<Inbound>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut offset: i64 = 0;
    info!("telegram polling started");
    loop {
        let updates = tokio::select! {
            _ = shutdown.changed() => break,
            res = client.get_updates(offset, timeout_secs) => res,
        };
        match updates {
            Ok(updates) => {
                for update in updates {
                    offset = offset.max(update.update_id + 1);
                    let update_id = update.update_id;
                    match update.into_inbound() {
                        Some(inbound) => {
                            if tx.send(inbound).await.is_err() {
                                info!("command loop gone, stopping telegram polling");
                                return;
                            }
                        }
                        None => debug!("ignoring update {}", update_id),
                    }
                }
            }
            Err(e) => {
                error!("getUpdates failed: {}", e);
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = tokio::time::sleep(POLL_RETRY_DELAY) => {}
                }
            }
        }
    }
    warn!("telegram polling stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn client_for(server: &mockito::ServerGuard) -> TelegramClient {
        TelegramClient::new(&server.url(), "TOKEN", Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_send_menu_renders_one_button_per_row() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/botTOKEN/sendMessage")
            .match_body(Matcher::PartialJson(json!({
                "chat_id": 42,
                "text": "Select namespace:",
                "reply_markup": {"inline_keyboard": [
                    [{"text": "billing", "callback_data": "pause:billing"}],
                    [{"text": "web", "callback_data": "pause:web"}]
                ]}
            })))
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"message_id":7,"chat":{"id":42},"text":"Select namespace:"}}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let options = vec![
            MenuOption { label: "billing".into(), payload: "pause:billing".into() },
            MenuOption { label: "web".into(), payload: "pause:web".into() },
        ];
        client.send_menu(42, "Select namespace:", &options).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/sendMessage")
            .with_status(400)
            .with_body(r#"{"ok":false,"error_code":400,"description":"Bad Request: chat not found"}"#)
            .create_async()
            .await;

        let client = client_for(&server);
        let err = client.send_message(1, "hi", None).await.unwrap_err();
        match err {
            TelegramError::Api { code, description } => {
                assert_eq!(code, 400);
                assert!(description.contains("chat not found"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_get_updates_decodes_messages_and_callbacks() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/getUpdates")
            .match_body(Matcher::PartialJson(json!({"offset": 10, "timeout": 0})))
            .with_status(200)
            .with_body(
                json!({"ok": true, "result": [
                    {"update_id": 10, "message": {
                        "message_id": 1, "from": {"id": 42, "is_bot": false},
                        "chat": {"id": 42}, "text": "/pause"}},
                    {"update_id": 11, "callback_query": {
                        "id": "cb-1", "from": {"id": 42},
                        "message": {"message_id": 2, "chat": {"id": 42}},
                        "data": "pause:billing"}},
                    {"update_id": 12, "message": {
                        "message_id": 3, "chat": {"id": -5}}}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let client = client_for(&server);
        let updates = client.get_updates(10, 0).await.unwrap();
        assert_eq!(updates.len(), 3);

        let inbound: Vec<Option<Inbound>> = updates.into_iter().map(Update::into_inbound).collect();
        assert_eq!(
            inbound[0],
            Some(Inbound::Message { sender: 42, chat_id: 42, text: "/pause".into() })
        );
        assert_eq!(
            inbound[1],
            Some(Inbound::Callback {
                sender: 42,
                callback_id: "cb-1".into(),
                chat_id: Some(42),
                message_id: Some(2),
                data: "pause:billing".into(),
            })
        );
        // no sender, no text
        assert_eq!(inbound[2], None);
    }

    #[tokio::test]
    async fn test_get_me() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/botTOKEN/getMe")
            .with_status(200)
            .with_body(r#"{"ok":true,"result":{"id":99,"is_bot":true,"username":"alert_bot"}}"#)
            .create_async()
            .await;

        let me = client_for(&server).get_me().await.unwrap();
        assert_eq!(me.id, 99);
        assert!(me.is_bot);
        assert_eq!(me.username.as_deref(), Some("alert_bot"));
    }
}
