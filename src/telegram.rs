//! Telegram Bot API transport via teloxide
//!
//! Updates are fetched with manual long polling so the dispatch loop can
//! handle them strictly one at a time, in delivery order.

use async_trait::async_trait;
use std::time::Duration;
use teloxide::payloads::{DeleteWebhookSetters, GetUpdatesSetters, SendMessageSetters};
use teloxide::prelude::*;
use teloxide::types::{
    ChatId, InputFile, KeyboardButton, KeyboardMarkup, KeyboardRemove, ReplyMarkup, UpdateKind,
};
use teloxide::{ApiError, RequestError};

use crate::error::{Error, Result};
use crate::model::UserId;
use crate::transport::{
    ChatTransport, Document, InboundMessage, Keyboard, OutboundMessage, TransportError,
};

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    /// Take over the bot session, retrying while another poller holds it.
    ///
    /// Pending updates are dropped. Gives up with [`Error::Conflict`] after
    /// `attempts` tries spaced `backoff` apart.
    pub async fn connect(&self, attempts: u32, backoff: Duration) -> Result<()> {
        let attempts = attempts.max(1);
        for attempt in 1..=attempts {
            match self.claim_session().await {
                Ok(()) => {
                    tracing::info!("Connected to Telegram (attempt {})", attempt);
                    return Ok(());
                }
                Err(Error::Conflict) if attempt < attempts => {
                    tracing::warn!(
                        "Bot session held by another process, retry {}/{} in {:?}",
                        attempt,
                        attempts,
                        backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
        Err(Error::Conflict)
    }

    async fn claim_session(&self) -> Result<()> {
        self.bot
            .delete_webhook()
            .drop_pending_updates(true)
            .await
            .map_err(request_error)?;
        // A zero-timeout poll fails fast when another getUpdates is active
        self.bot
            .get_updates()
            .timeout(0)
            .limit(1)
            .await
            .map_err(request_error)?;
        Ok(())
    }

    /// Long-poll once and advance `offset` past every update received.
    ///
    /// Updates that are not text messages from a user are acknowledged and
    /// skipped.
    pub async fn poll(&self, offset: &mut i32, timeout_secs: u32) -> Result<Vec<InboundMessage>> {
        let updates = self
            .bot
            .get_updates()
            .offset(*offset)
            .timeout(timeout_secs)
            .await
            .map_err(request_error)?;

        let mut inbound = Vec::with_capacity(updates.len());
        for update in updates {
            let Some(next) = i32::try_from(update.id.0)
                .ok()
                .and_then(|id| id.checked_add(1))
            else {
                tracing::warn!("Skipping update {} with out-of-range id", update.id.0);
                continue;
            };
            *offset = next;
            let UpdateKind::Message(message) = update.kind else {
                continue;
            };
            let (Some(user), Some(text)) = (message.from.as_ref(), message.text()) else {
                continue;
            };
            inbound.push(InboundMessage {
                user_id: user.id.0 as UserId,
                text: text.to_string(),
            });
        }
        Ok(inbound)
    }
}

fn request_error(e: RequestError) -> Error {
    match e {
        RequestError::Api(ApiError::TerminatedByOtherGetUpdates) => Error::Conflict,
        other => Error::Telegram(other.to_string()),
    }
}

fn delivery_error(e: RequestError) -> TransportError {
    match e {
        RequestError::Api(ApiError::BotBlocked) => TransportError::Blocked,
        other => TransportError::Delivery(other.to_string()),
    }
}

fn reply_markup(keyboard: Keyboard) -> Option<ReplyMarkup> {
    match keyboard {
        Keyboard::Keep => None,
        Keyboard::Remove => Some(ReplyMarkup::KeyboardRemove(KeyboardRemove::new())),
        other => other.rows().map(|rows| {
            let buttons = rows
                .into_iter()
                .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>());
            ReplyMarkup::Keyboard(KeyboardMarkup::new(buttons).resize_keyboard())
        }),
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send(
        &self,
        user_id: UserId,
        message: OutboundMessage,
    ) -> std::result::Result<(), TransportError> {
        let request = self.bot.send_message(ChatId(user_id), message.text);
        let result = match reply_markup(message.keyboard) {
            Some(markup) => request.reply_markup(markup).await,
            None => request.await,
        };
        result.map(|_| ()).map_err(delivery_error)
    }

    async fn send_document(
        &self,
        user_id: UserId,
        document: Document,
    ) -> std::result::Result<(), TransportError> {
        let file = InputFile::memory(document.bytes).file_name(document.file_name);
        self.bot
            .send_document(ChatId(user_id), file)
            .await
            .map(|_| ())
            .map_err(delivery_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path_regex};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const CONFLICT: &str = "Conflict: terminated by other getUpdates request; \
                            make sure that only one bot instance is running";

    fn transport_for(server: &MockServer) -> TelegramTransport {
        let url = reqwest::Url::parse(&server.uri()).unwrap();
        TelegramTransport {
            bot: Bot::new("123:abc").set_api_url(url),
        }
    }

    async fn mount_delete_webhook(server: &MockServer) {
        Mock::given(method("POST"))
            .and(path_regex("/DeleteWebhook$"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": true
            })))
            .mount(server)
            .await;
    }

    fn conflict_response() -> ResponseTemplate {
        ResponseTemplate::new(409).set_body_json(json!({
            "ok": false,
            "error_code": 409,
            "description": CONFLICT
        }))
    }

    fn updates_response(updates: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "ok": true, "result": updates }))
    }

    fn text_update(update_id: u32, user_id: i64, text: &str) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": update_id,
                "from": {"id": user_id, "is_bot": false, "first_name": "Anna"},
                "chat": {"id": user_id, "first_name": "Anna", "type": "private"},
                "date": 1_714_550_400,
                "text": text
            }
        })
    }

    #[tokio::test]
    async fn test_connect_gives_up_after_conflicts() {
        let server = MockServer::start().await;
        mount_delete_webhook(&server).await;
        Mock::given(method("POST"))
            .and(path_regex("/GetUpdates$"))
            .respond_with(conflict_response())
            .expect(3)
            .mount(&server)
            .await;

        let result = transport_for(&server)
            .connect(3, Duration::from_millis(1))
            .await;
        assert!(matches!(result, Err(Error::Conflict)));
    }

    #[tokio::test]
    async fn test_connect_succeeds_after_conflict() {
        let server = MockServer::start().await;
        mount_delete_webhook(&server).await;
        Mock::given(method("POST"))
            .and(path_regex("/GetUpdates$"))
            .respond_with(conflict_response())
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path_regex("/GetUpdates$"))
            .respond_with(updates_response(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        transport_for(&server)
            .connect(5, Duration::from_millis(1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_poll_keeps_text_and_advances_offset() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("/GetUpdates$"))
            .respond_with(updates_response(json!([
                text_update(10, 42, "120/80"),
                {"update_id": 11, "some_future_kind": {"x": 1}},
                {
                    "update_id": 12,
                    "message": {
                        "message_id": 12,
                        "chat": {"id": -100, "title": "Group", "type": "group"},
                        "date": 1_714_550_400,
                        "text": "no sender"
                    }
                },
                text_update(13, 43, "/start")
            ])))
            .mount(&server)
            .await;

        let mut offset = 0;
        let inbound = transport_for(&server).poll(&mut offset, 0).await.unwrap();

        assert_eq!(
            inbound,
            vec![
                InboundMessage {
                    user_id: 42,
                    text: "120/80".to_string()
                },
                InboundMessage {
                    user_id: 43,
                    text: "/start".to_string()
                },
            ]
        );
        assert_eq!(offset, 14);
    }

    #[tokio::test]
    async fn test_poll_conflict_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path_regex("/GetUpdates$"))
            .respond_with(conflict_response())
            .mount(&server)
            .await;

        let mut offset = 5;
        let result = transport_for(&server).poll(&mut offset, 0).await;
        assert!(matches!(result, Err(Error::Conflict)));
        assert_eq!(offset, 5);
    }

    #[test]
    fn test_conflict_classified() {
        let err = request_error(RequestError::Api(ApiError::TerminatedByOtherGetUpdates));
        assert!(matches!(err, Error::Conflict));
    }

    #[test]
    fn test_blocked_classified() {
        let err = delivery_error(RequestError::Api(ApiError::BotBlocked));
        assert!(matches!(err, TransportError::Blocked));

        let err = delivery_error(RequestError::Api(ApiError::ChatNotFound));
        assert!(matches!(err, TransportError::Delivery(_)));
    }

    #[test]
    fn test_reply_markup_variants() {
        assert!(reply_markup(Keyboard::Keep).is_none());
        assert!(matches!(
            reply_markup(Keyboard::Remove),
            Some(ReplyMarkup::KeyboardRemove(_))
        ));
        match reply_markup(Keyboard::GenderPicker) {
            Some(ReplyMarkup::Keyboard(markup)) => {
                assert_eq!(markup.keyboard.len(), 3);
                assert_eq!(markup.keyboard[0][0].text, "Male");
            }
            other => panic!("Expected keyboard markup, got {:?}", other),
        }
    }
}
