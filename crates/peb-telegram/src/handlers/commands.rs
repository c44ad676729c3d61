use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use peb_core::{commands::AdminCommand, domain::UserId, Error};

use crate::router::AppState;

/// Live command path: admins can type the same `name args` wire commands the
/// queue carries, directly into a private chat with the bot.
pub async fn handle_private_message(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    if !msg.chat.is_private() {
        return Ok(());
    }
    let Some(user) = msg.from() else {
        return Ok(());
    };
    if !state.rules.is_admin(UserId(user.id.0 as i64)) {
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    let (name, args) = split_command(text);
    let command = match AdminCommand::parse(&name, &args) {
        Ok(command) => command,
        // Unrecognized input stays silent so the command surface is not
        // discoverable by probing. Malformed arguments of a known command are
        // reported, matching the queue path.
        Err(Error::UnknownCommand(other)) => {
            debug!(user = user.id.0, command = %other, "ignoring unrecognized chat input");
            return Ok(());
        }
        Err(e) => {
            let _ = bot.send_message(msg.chat.id, format!("error: {e}")).await;
            return Ok(());
        }
    };

    let reply = match state.executor.execute(command).await {
        Ok(outcome) => outcome,
        Err(e) => format!("error: {e}"),
    };
    let _ = bot.send_message(msg.chat.id, reply).await;

    Ok(())
}

fn split_command(text: &str) -> (String, String) {
    // Accept `cmd args` and `/cmd@botname args`.
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let name = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (name, rest)
}
