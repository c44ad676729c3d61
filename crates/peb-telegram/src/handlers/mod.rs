//! Telegram update handlers.
//!
//! Channel posts run through the rewrite + forward pipeline; private
//! messages from admins feed the live command path.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use crate::router::AppState;

mod channel_post;
mod commands;

pub async fn handle_channel_post(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    channel_post::handle_new(bot, msg, state).await
}

pub async fn handle_edited_channel_post(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    channel_post::handle_edited(bot, msg, state).await
}

pub async fn handle_private_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    commands::handle_private_message(bot, msg, state).await
}
