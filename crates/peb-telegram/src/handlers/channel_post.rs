use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::{debug, warn};

use peb_core::{
    domain::{ChannelId, MessageId, MessageRef},
    messaging::port::MessagingPort,
    messaging::types::{ChannelMessage, MediaKind},
    rewrite,
};

use crate::entities_to_spans;
use crate::router::AppState;

/// New post in a monitored channel: rewrite in place, then fan out to the
/// forwarding tasks with the rewritten content.
pub async fn handle_new(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChannelId(msg.chat.id.0);
    if !state.rules.is_monitored(chat_id) {
        return Ok(());
    }

    let mut message = incoming_message(&msg);
    if state.rules.replacement_enabled(chat_id) {
        rewrite_in_place(&state, &mut message).await;
    }
    state.forwarder.on_message(&message).await;

    Ok(())
}

/// Edited post: rewrite only. Forwarding fires once, on the original post.
pub async fn handle_edited(_bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = ChannelId(msg.chat.id.0);
    if !state.rules.is_monitored(chat_id) || !state.rules.replacement_enabled(chat_id) {
        return Ok(());
    }

    let mut message = incoming_message(&msg);
    rewrite_in_place(&state, &mut message).await;

    Ok(())
}

fn incoming_message(msg: &Message) -> ChannelMessage {
    let media = if msg.photo().is_some() {
        Some(MediaKind::Photo)
    } else if msg.video().is_some() {
        Some(MediaKind::Video)
    } else if msg.animation().is_some() {
        Some(MediaKind::Animation)
    } else if msg.document().is_some() {
        Some(MediaKind::Document)
    } else {
        None
    };

    let text = msg
        .text()
        .or_else(|| msg.caption())
        .unwrap_or_default()
        .to_string();
    let entities = msg
        .entities()
        .or_else(|| msg.caption_entities())
        .unwrap_or_default();

    ChannelMessage {
        origin: MessageRef {
            chat_id: ChannelId(msg.chat.id.0),
            message_id: MessageId(msg.id.0),
        },
        text,
        spans: entities_to_spans(entities),
        media,
    }
}

/// Apply the rewrite and, on change, edit the message in place. The local
/// view is updated only after the edit succeeds, so forwarding copies what
/// the channel actually shows.
async fn rewrite_in_place(state: &AppState, message: &mut ChannelMessage) {
    if message.text.is_empty() {
        return;
    }

    let chat_id = message.origin.chat_id;
    let outcome = match rewrite::rewrite(&state.rules, chat_id, &message.text, &message.spans) {
        Ok(outcome) => outcome,
        Err(e) => {
            // Abort this message's rewrite only; no partial edit is applied.
            warn!(channel = chat_id.0, error = %e, "rewrite aborted");
            return;
        }
    };
    if !outcome.changed {
        return;
    }

    let edit = if message.media.is_some() {
        state
            .messenger
            .edit_caption(message.origin, &outcome.text, &outcome.spans)
            .await
    } else {
        state
            .messenger
            .edit_message(message.origin, &outcome.text, &outcome.spans)
            .await
    };

    match edit {
        Ok(()) => {
            debug!(
                channel = chat_id.0,
                spans = outcome.spans.len(),
                "message rewritten"
            );
            message.text = outcome.text;
            message.spans = outcome.spans;
        }
        Err(e) => warn!(channel = chat_id.0, error = %e, "failed to edit message"),
    }
}
