use async_trait::async_trait;

use crate::domain::{ChannelId, MessageRef};
use crate::spans::FormatSpan;
use crate::Result;

/// Messaging platform port.
///
/// Telegram is the first implementation. Errors map into
/// [`crate::Error::Telegram`]; callers log and swallow them per message, with
/// no retry at this layer.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send a text message with formatting spans.
    async fn send_message(
        &self,
        chat_id: ChannelId,
        text: &str,
        spans: &[FormatSpan],
    ) -> Result<MessageRef>;

    /// Replace a message's text and spans in place.
    async fn edit_message(&self, msg: MessageRef, text: &str, spans: &[FormatSpan]) -> Result<()>;

    /// Replace a media message's caption and caption spans in place.
    async fn edit_caption(&self, msg: MessageRef, caption: &str, spans: &[FormatSpan])
        -> Result<()>;

    /// Re-publish a media message to another chat, overriding its caption.
    async fn copy_media(
        &self,
        source: MessageRef,
        target: ChannelId,
        caption: &str,
        spans: &[FormatSpan],
    ) -> Result<MessageRef>;
}

/// Recording [`MessagingPort`] double for core tests.
#[cfg(test)]
pub mod testing {
    use parking_lot::Mutex;

    use super::*;
    use crate::domain::MessageId;
    use crate::Error;

    #[derive(Clone, Debug, PartialEq, Eq)]
    pub enum SentKind {
        Text,
        Media,
        Edit,
    }

    #[derive(Clone, Debug)]
    pub struct SentMessage {
        pub kind: SentKind,
        pub chat_id: ChannelId,
        pub text: String,
        pub spans: Vec<FormatSpan>,
    }

    #[derive(Default)]
    pub struct RecordingMessenger {
        pub sent: Mutex<Vec<SentMessage>>,
        pub fail: Mutex<bool>,
    }

    impl RecordingMessenger {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn sent_to(&self, chat_id: ChannelId) -> Vec<SentMessage> {
            self.sent
                .lock()
                .iter()
                .filter(|m| m.chat_id == chat_id)
                .cloned()
                .collect()
        }

        pub fn count(&self) -> usize {
            self.sent.lock().len()
        }

        fn record(
            &self,
            kind: SentKind,
            chat_id: ChannelId,
            text: &str,
            spans: &[FormatSpan],
        ) -> Result<MessageRef> {
            if *self.fail.lock() {
                return Err(Error::Telegram("simulated send failure".to_string()));
            }
            let mut sent = self.sent.lock();
            let message_id = MessageId(sent.len() as i32 + 1);
            sent.push(SentMessage {
                kind,
                chat_id,
                text: text.to_string(),
                spans: spans.to_vec(),
            });
            Ok(MessageRef {
                chat_id,
                message_id,
            })
        }
    }

    #[async_trait]
    impl MessagingPort for RecordingMessenger {
        async fn send_message(
            &self,
            chat_id: ChannelId,
            text: &str,
            spans: &[FormatSpan],
        ) -> Result<MessageRef> {
            self.record(SentKind::Text, chat_id, text, spans)
        }

        async fn edit_message(
            &self,
            msg: MessageRef,
            text: &str,
            spans: &[FormatSpan],
        ) -> Result<()> {
            self.record(SentKind::Edit, msg.chat_id, text, spans)?;
            Ok(())
        }

        async fn edit_caption(
            &self,
            msg: MessageRef,
            caption: &str,
            spans: &[FormatSpan],
        ) -> Result<()> {
            self.record(SentKind::Edit, msg.chat_id, caption, spans)?;
            Ok(())
        }

        async fn copy_media(
            &self,
            _source: MessageRef,
            target: ChannelId,
            caption: &str,
            spans: &[FormatSpan],
        ) -> Result<MessageRef> {
            self.record(SentKind::Media, target, caption, spans)
        }
    }
}
