//! Telegram adapter (teloxide).
//!
//! Implements the core `MessagingPort` over the Telegram Bot API and hosts
//! the update router. Spans map 1:1 onto message entities; both address text
//! in UTF-16 code units.

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{MessageEntity, MessageEntityKind},
};

use tokio::time::sleep;
use tracing::debug;

pub mod handlers;
pub mod router;

use peb_core::{
    domain::{ChannelId, MessageId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    spans::{FormatSpan, SpanKind},
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChannelId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::Telegram(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_message(
        &self,
        chat_id: ChannelId,
        text: &str,
        spans: &[FormatSpan],
    ) -> Result<MessageRef> {
        let entities = spans_to_entities(spans);
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
                    .entities(entities.clone())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_message(&self, msg: MessageRef, text: &str, spans: &[FormatSpan]) -> Result<()> {
        let entities = spans_to_entities(spans);
        self.with_retry(|| {
            self.bot
                .edit_message_text(
                    Self::tg_chat(msg.chat_id),
                    Self::tg_msg_id(msg.message_id),
                    text.to_string(),
                )
                .entities(entities.clone())
        })
        .await?;
        Ok(())
    }

    async fn edit_caption(
        &self,
        msg: MessageRef,
        caption: &str,
        spans: &[FormatSpan],
    ) -> Result<()> {
        let entities = spans_to_entities(spans);
        self.with_retry(|| {
            self.bot
                .edit_message_caption(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
                .caption(caption.to_string())
                .caption_entities(entities.clone())
        })
        .await?;
        Ok(())
    }

    async fn copy_media(
        &self,
        source: MessageRef,
        target: ChannelId,
        caption: &str,
        spans: &[FormatSpan],
    ) -> Result<MessageRef> {
        let entities = spans_to_entities(spans);
        let copied = self
            .with_retry(|| {
                let mut req = self.bot.copy_message(
                    Self::tg_chat(target),
                    Self::tg_chat(source.chat_id),
                    Self::tg_msg_id(source.message_id),
                );
                if !caption.is_empty() {
                    req = req.caption(caption.to_string()).caption_entities(entities.clone());
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: target,
            message_id: MessageId(copied.0),
        })
    }
}

/// Core spans to Telegram entities. Spans that cannot be represented (an
/// unparseable link URL) are dropped with a debug log.
pub fn spans_to_entities(spans: &[FormatSpan]) -> Vec<MessageEntity> {
    spans.iter().filter_map(span_to_entity).collect()
}

fn span_to_entity(span: &FormatSpan) -> Option<MessageEntity> {
    let kind = match &span.kind {
        SpanKind::Bold => MessageEntityKind::Bold,
        SpanKind::Italic => MessageEntityKind::Italic,
        SpanKind::Underline => MessageEntityKind::Underline,
        SpanKind::Strikethrough => MessageEntityKind::Strikethrough,
        SpanKind::Spoiler => MessageEntityKind::Spoiler,
        SpanKind::Code => MessageEntityKind::Code,
        SpanKind::Pre { language } => MessageEntityKind::Pre {
            language: language.clone(),
        },
        SpanKind::Link { url } => match reqwest::Url::parse(url) {
            Ok(url) => MessageEntityKind::TextLink { url },
            Err(e) => {
                debug!(url = %url, error = %e, "dropping span with unparseable url");
                return None;
            }
        },
        SpanKind::CustomEmoji { emoji_id } => MessageEntityKind::CustomEmoji {
            custom_emoji_id: emoji_id.to_string(),
        },
    };
    Some(MessageEntity {
        kind,
        offset: span.offset as usize,
        length: span.length as usize,
    })
}

/// Telegram entities to core spans. Entity kinds that carry no formatting to
/// preserve (mentions, hashtags, bot commands, ...) are skipped.
pub fn entities_to_spans(entities: &[MessageEntity]) -> Vec<FormatSpan> {
    entities.iter().filter_map(entity_to_span).collect()
}

fn entity_to_span(entity: &MessageEntity) -> Option<FormatSpan> {
    let kind = match &entity.kind {
        MessageEntityKind::Bold => SpanKind::Bold,
        MessageEntityKind::Italic => SpanKind::Italic,
        MessageEntityKind::Underline => SpanKind::Underline,
        MessageEntityKind::Strikethrough => SpanKind::Strikethrough,
        MessageEntityKind::Spoiler => SpanKind::Spoiler,
        MessageEntityKind::Code => SpanKind::Code,
        MessageEntityKind::Pre { language } => SpanKind::Pre {
            language: language.clone(),
        },
        MessageEntityKind::TextLink { url } => SpanKind::Link {
            url: url.to_string(),
        },
        MessageEntityKind::CustomEmoji { custom_emoji_id } => SpanKind::CustomEmoji {
            emoji_id: custom_emoji_id.parse().ok()?,
        },
        _ => return None,
    };
    Some(FormatSpan {
        offset: entity.offset as u32,
        length: entity.length as u32,
        kind,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn custom_emoji_round_trips() {
        let span = FormatSpan {
            offset: 6,
            length: 2,
            kind: SpanKind::CustomEmoji { emoji_id: 1001 },
        };
        let entities = spans_to_entities(std::slice::from_ref(&span));
        assert_eq!(entities.len(), 1);
        assert_eq!(
            entities[0].kind,
            MessageEntityKind::CustomEmoji {
                custom_emoji_id: "1001".to_string()
            }
        );

        let back = entities_to_spans(&entities);
        assert_eq!(back, vec![span]);
    }

    #[test]
    fn formatting_kinds_round_trip() {
        let spans = vec![
            FormatSpan {
                offset: 0,
                length: 2,
                kind: SpanKind::Bold,
            },
            FormatSpan {
                offset: 3,
                length: 4,
                kind: SpanKind::Link {
                    url: "https://example.com/".to_string(),
                },
            },
        ];
        let back = entities_to_spans(&spans_to_entities(&spans));
        assert_eq!(back, spans);
    }

    #[test]
    fn non_formatting_entities_are_skipped() {
        let entity = MessageEntity {
            kind: MessageEntityKind::Hashtag,
            offset: 0,
            length: 4,
        };
        assert!(entities_to_spans(&[entity]).is_empty());
    }

    #[test]
    fn unparseable_link_is_dropped_on_send() {
        let span = FormatSpan {
            offset: 0,
            length: 1,
            kind: SpanKind::Link {
                url: "not a url".to_string(),
            },
        };
        assert!(spans_to_entities(&[span]).is_empty());
    }
}
