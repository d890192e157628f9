//! Telegram Bot API channel.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::TelegramConfig;
use crate::error::ChannelError;
use crate::notifier::ChatChannel;

/// Envelope every Bot API method responds with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self) -> Result<Option<T>, ChannelError> {
        if self.ok {
            Ok(self.result)
        } else {
            Err(ChannelError::Rejected {
                code: self.error_code.unwrap_or_default(),
                description: self
                    .description
                    .unwrap_or_else(|| "no description".to_string()),
            })
        }
    }
}

#[derive(Debug, Deserialize)]
struct BotUser {
    id: i64,
    username: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Update {
    message: Option<UpdateMessage>,
    edited_message: Option<UpdateMessage>,
    channel_post: Option<UpdateMessage>,
    my_chat_member: Option<UpdateMessage>,
}

impl Update {
    fn chat(self) -> Option<Chat> {
        self.message
            .or(self.edited_message)
            .or(self.channel_post)
            .or(self.my_chat_member)
            .map(|m| m.chat)
    }
}

#[derive(Debug, Deserialize)]
struct UpdateMessage {
    chat: Chat,
}

#[derive(Debug, Deserialize)]
struct Chat {
    id: i64,
    #[serde(rename = "type")]
    kind: String,
    title: Option<String>,
    username: Option<String>,
    first_name: Option<String>,
}

/// A chat the bot has seen recently, as listed by the `chats` command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatSummary {
    pub id: i64,
    pub name: String,
    pub kind: String,
}

impl Chat {
    fn summary(self) -> ChatSummary {
        let name = self
            .title
            .or(self.username.map(|u| format!("@{}", u)))
            .or(self.first_name)
            .unwrap_or_else(|| "(untitled)".to_string());
        ChatSummary {
            id: self.id,
            name,
            kind: self.kind,
        }
    }
}

pub struct TelegramChannel {
    api_base: String,
    bot_token: String,
    session_name: String,
    timeout: Duration,
    client: Option<Client>,
}

impl TelegramChannel {
    pub fn new(config: &TelegramConfig, session_name: &str, timeout: Duration) -> Self {
        Self {
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
            session_name: session_name.to_string(),
            timeout,
            client: None,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.bot_token, method)
    }

    /// Distinct chats found in the bot's pending updates, first seen first.
    ///
    /// The bot only sees a group after it was added to it and a message was
    /// posted there.
    pub async fn recent_chats(&mut self) -> Result<Vec<ChatSummary>, ChannelError> {
        if !self.is_connected() {
            self.connect().await?;
        }
        let client = self.client.as_ref().ok_or(ChannelError::NotConnected)?;

        let response: ApiResponse<Vec<Update>> = client
            .get(self.method_url("getUpdates"))
            .send()
            .await?
            .json()
            .await?;

        let mut chats: Vec<ChatSummary> = Vec::new();
        for chat in response
            .into_result()?
            .unwrap_or_default()
            .into_iter()
            .filter_map(Update::chat)
        {
            if !chats.iter().any(|c| c.id == chat.id) {
                chats.push(chat.summary());
            }
        }
        Ok(chats)
    }
}

impl ChatChannel for TelegramChannel {
    async fn connect(&mut self) -> Result<(), ChannelError> {
        let client = Client::builder()
            .timeout(self.timeout)
            .user_agent(format!("{}/{}", self.session_name, env!("CARGO_PKG_VERSION")))
            .build()?;

        let response: ApiResponse<BotUser> = client
            .get(self.method_url("getMe"))
            .send()
            .await?
            .json()
            .await?;

        match response.into_result()? {
            Some(bot) => tracing::info!(
                "Connected to Telegram as {} (id: {})",
                bot.username.as_deref().unwrap_or("<unnamed bot>"),
                bot.id
            ),
            None => tracing::info!("Connected to Telegram"),
        }

        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if self.client.take().is_some() {
            tracing::debug!("Disconnected from Telegram");
        }
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn deliver(&mut self, target: &str, text: &str) -> Result<(), ChannelError> {
        let client = self.client.as_ref().ok_or(ChannelError::NotConnected)?;

        // numeric chat ids go out as integers, "@channel" names as strings
        let chat_id = match target.parse::<i64>() {
            Ok(id) => json!(id),
            Err(_) => json!(target),
        };
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });

        let response: ApiResponse<Value> = client
            .post(self.method_url("sendMessage"))
            .json(&body)
            .send()
            .await?
            .json()
            .await?;

        response.into_result().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifier::Notifier;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN: &str = "123456:test-token";

    fn channel(server: &MockServer) -> TelegramChannel {
        let config = TelegramConfig {
            bot_token: TOKEN.to_string(),
            chat_id: -100123,
            api_base: server.uri(),
        };
        TelegramChannel::new(&config, "room_notifier", Duration::from_secs(5))
    }

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": result }))
    }

    async fn mount_get_me(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getMe", TOKEN)))
            .respond_with(ok(json!({ "id": 42, "is_bot": true, "username": "room_bot" })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_deliver_before_connect_fails() {
        let server = MockServer::start().await;
        let mut channel = channel(&server);

        let result = channel.deliver("-100123", "hello").await;
        assert!(matches!(result, Err(ChannelError::NotConnected)));
    }

    #[tokio::test]
    async fn test_connect_and_deliver() {
        let server = MockServer::start().await;
        mount_get_me(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .and(body_partial_json(json!({ "chat_id": -100123, "text": "hello" })))
            .respond_with(ok(json!({ "message_id": 7 })))
            .expect(1)
            .mount(&server)
            .await;

        let mut channel = channel(&server);
        channel.connect().await.expect("getMe should succeed");
        assert!(channel.is_connected());
        channel.deliver("-100123", "hello").await.expect("sendMessage should succeed");

        channel.disconnect().await;
        assert!(!channel.is_connected());
    }

    #[tokio::test]
    async fn test_channel_name_sent_as_string() {
        let server = MockServer::start().await;
        mount_get_me(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .and(body_partial_json(json!({ "chat_id": "@room_bookings" })))
            .respond_with(ok(json!({ "message_id": 8 })))
            .expect(1)
            .mount(&server)
            .await;

        let mut channel = channel(&server);
        channel.connect().await.unwrap();
        channel.deliver("@room_bookings", "hello").await.unwrap();
    }

    #[tokio::test]
    async fn test_rejected_message_reports_api_error() {
        let server = MockServer::start().await;
        mount_get_me(&server).await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false,
                "error_code": 400,
                "description": "Bad Request: chat not found",
            })))
            .mount(&server)
            .await;

        let mut channel = channel(&server);
        channel.connect().await.unwrap();
        let result = channel.deliver("-100123", "hello").await;

        match result {
            Err(ChannelError::Rejected { code, description }) => {
                assert_eq!(code, 400);
                assert_eq!(description, "Bad Request: chat not found");
            }
            other => panic!("expected Rejected, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_errors_hide_the_token() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getMe", TOKEN)))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
            .mount(&server)
            .await;

        let mut notifier = Notifier::new(channel(&server), "-100123", Duration::from_secs(5));
        let err = notifier.send("hello").await.unwrap_err();

        assert!(matches!(err, ChannelError::Transport(_)));
        assert!(!err.to_string().contains(TOKEN));
        assert!(!format!("{:?}", err).contains(TOKEN));
    }

    #[tokio::test]
    async fn test_unreachable_api_hides_the_token() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = TelegramConfig {
            bot_token: TOKEN.to_string(),
            chat_id: -100123,
            api_base: format!("http://{}", addr),
        };
        let mut channel = TelegramChannel::new(&config, "room_notifier", Duration::from_secs(5));
        let err = channel.connect().await.unwrap_err();

        assert!(matches!(err, ChannelError::Transport(_)));
        assert!(!err.to_string().contains(TOKEN));
    }

    #[tokio::test]
    async fn test_recent_chats_lists_distinct_chats() {
        let server = MockServer::start().await;
        mount_get_me(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getUpdates", TOKEN)))
            .respond_with(ok(json!([
                {
                    "update_id": 1,
                    "message": {
                        "message_id": 10,
                        "chat": { "id": -100555, "type": "supergroup", "title": "Office" }
                    }
                },
                {
                    "update_id": 2,
                    "message": {
                        "message_id": 11,
                        "chat": { "id": -100555, "type": "supergroup", "title": "Office" }
                    }
                },
                {
                    "update_id": 3,
                    "channel_post": {
                        "message_id": 3,
                        "chat": { "id": -100777, "type": "channel", "username": "rooms" }
                    }
                },
                {
                    "update_id": 4,
                    "message": {
                        "message_id": 12,
                        "chat": { "id": 4242, "type": "private", "first_name": "Alex" }
                    }
                },
                { "update_id": 5, "poll": { "id": "x" } }
            ])))
            .mount(&server)
            .await;

        let mut channel = channel(&server);
        let chats = channel.recent_chats().await.expect("getUpdates should succeed");

        assert_eq!(
            chats,
            vec![
                ChatSummary {
                    id: -100555,
                    name: "Office".to_string(),
                    kind: "supergroup".to_string(),
                },
                ChatSummary {
                    id: -100777,
                    name: "@rooms".to_string(),
                    kind: "channel".to_string(),
                },
                ChatSummary {
                    id: 4242,
                    name: "Alex".to_string(),
                    kind: "private".to_string(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_recent_chats_empty_when_no_updates() {
        let server = MockServer::start().await;
        mount_get_me(&server).await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getUpdates", TOKEN)))
            .respond_with(ok(json!([])))
            .mount(&server)
            .await;

        let mut channel = channel(&server);
        assert!(channel.recent_chats().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_notifier_reconnects_after_failed_send() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/bot{}/getMe", TOKEN)))
            .respond_with(ok(json!({ "id": 42, "is_bot": true })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .respond_with(ResponseTemplate::new(502).set_body_json(json!({
                "ok": false,
                "error_code": 502,
                "description": "Bad Gateway",
            })))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(format!("/bot{}/sendMessage", TOKEN)))
            .respond_with(ok(json!({ "message_id": 9 })))
            .expect(1)
            .mount(&server)
            .await;

        let mut notifier = Notifier::new(channel(&server), "-100123", Duration::from_secs(5));
        notifier.send("hello").await.expect("resend should succeed");
    }
}
