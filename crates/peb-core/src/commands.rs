//! Administrative command parsing and dispatch.
//!
//! Commands arrive either as persisted queue rows inserted by an external
//! producer process or as text typed into an admin's private chat; both paths
//! share the same `name args` wire format. Dispatch is an explicit enum plus
//! a static `match`: unknown names are rejected up front, never resolved
//! dynamically.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::{ChannelId, MonitoredChannel, RuleScope, SubstitutionRule, UserId};
use crate::forward::ForwardScheduler;
use crate::rules::RuleStore;
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq)]
pub enum AdminCommand {
    AddRule {
        scope: RuleScope,
        symbol: String,
        target_id: i64,
        description: Option<String>,
    },
    DeleteRule {
        scope: RuleScope,
        symbol: String,
    },
    ListRules {
        scope: RuleScope,
    },
    DeleteAllRules {
        scope: RuleScope,
    },
    CopyChannelRules {
        from: ChannelId,
        to: ChannelId,
    },
    SetReplacement {
        channel: ChannelId,
        enabled: bool,
    },
    ReplacementStatus {
        channel: ChannelId,
    },
    AddChannel {
        id: ChannelId,
        username: Option<String>,
        title: String,
    },
    RemoveChannel {
        id: ChannelId,
    },
    ListChannels,
    AddForward {
        source: ChannelId,
        target: ChannelId,
        delay_seconds: u32,
        description: Option<String>,
    },
    DeleteForward {
        id: i64,
    },
    SetForwardActive {
        id: i64,
        active: bool,
    },
    SetForwardDelay {
        id: i64,
        delay_seconds: u32,
    },
    ListForwards,
    AddAdmin {
        user: UserId,
    },
    RemoveAdmin {
        user: UserId,
    },
    ListAdmins,
}

impl AdminCommand {
    /// Parse a wire command. Unknown names yield [`Error::UnknownCommand`];
    /// malformed arguments of known names yield [`Error::Validation`].
    pub fn parse(name: &str, args: &str) -> Result<Self> {
        let args = args.trim();
        match name.trim() {
            "add_emoji_replacement" => {
                let (symbol, rest) = required_arg(args, "symbol")?;
                let (target, description) = required_arg(rest, "target emoji id")?;
                Ok(AdminCommand::AddRule {
                    scope: RuleScope::Global,
                    symbol: symbol.to_string(),
                    target_id: parse_i64(target, "target emoji id")?,
                    description: optional_text(description),
                })
            }
            "delete_emoji_replacement" => {
                let (symbol, _) = required_arg(args, "symbol")?;
                Ok(AdminCommand::DeleteRule {
                    scope: RuleScope::Global,
                    symbol: symbol.to_string(),
                })
            }
            "list_emoji_replacements" => Ok(AdminCommand::ListRules {
                scope: RuleScope::Global,
            }),
            "delete_all_emoji_replacements" => Ok(AdminCommand::DeleteAllRules {
                scope: RuleScope::Global,
            }),
            "add_channel_emoji_replacement" => {
                let (channel, rest) = required_arg(args, "channel id")?;
                let (symbol, rest) = required_arg(rest, "symbol")?;
                let (target, description) = required_arg(rest, "target emoji id")?;
                Ok(AdminCommand::AddRule {
                    scope: RuleScope::Channel(parse_channel(channel)?),
                    symbol: symbol.to_string(),
                    target_id: parse_i64(target, "target emoji id")?,
                    description: optional_text(description),
                })
            }
            "delete_channel_emoji_replacement" => {
                let (channel, rest) = required_arg(args, "channel id")?;
                let (symbol, _) = required_arg(rest, "symbol")?;
                Ok(AdminCommand::DeleteRule {
                    scope: RuleScope::Channel(parse_channel(channel)?),
                    symbol: symbol.to_string(),
                })
            }
            "list_channel_emoji_replacements" => {
                let (channel, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::ListRules {
                    scope: RuleScope::Channel(parse_channel(channel)?),
                })
            }
            "delete_all_channel_emoji_replacements" => {
                let (channel, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::DeleteAllRules {
                    scope: RuleScope::Channel(parse_channel(channel)?),
                })
            }
            "copy_channel_emoji_replacements" => {
                let (from, rest) = required_arg(args, "source channel id")?;
                let (to, _) = required_arg(rest, "target channel id")?;
                Ok(AdminCommand::CopyChannelRules {
                    from: parse_channel(from)?,
                    to: parse_channel(to)?,
                })
            }
            "activate_channel_replacement" => {
                let (channel, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::SetReplacement {
                    channel: parse_channel(channel)?,
                    enabled: true,
                })
            }
            "deactivate_channel_replacement" => {
                let (channel, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::SetReplacement {
                    channel: parse_channel(channel)?,
                    enabled: false,
                })
            }
            "check_channel_replacement_status" => {
                let (channel, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::ReplacementStatus {
                    channel: parse_channel(channel)?,
                })
            }
            "add_channel" => {
                let (id, rest) = required_arg(args, "channel id")?;
                let id = parse_channel(id)?;
                let (username, title) = if rest.starts_with('@') {
                    let (username, title) = required_arg(rest, "username")?;
                    (Some(username.trim_start_matches('@').to_string()), title)
                } else {
                    (None, rest)
                };
                let title = if title.is_empty() {
                    format!("channel {}", id.0)
                } else {
                    title.trim().to_string()
                };
                Ok(AdminCommand::AddChannel {
                    id,
                    username,
                    title,
                })
            }
            "remove_channel" => {
                let (id, _) = required_arg(args, "channel id")?;
                Ok(AdminCommand::RemoveChannel {
                    id: parse_channel(id)?,
                })
            }
            "list_channels" => Ok(AdminCommand::ListChannels),
            "add_forwarding_task" => {
                let (source, rest) = required_arg(args, "source channel id")?;
                let (target, rest) = required_arg(rest, "target channel id")?;
                let (delay_seconds, description) = if rest.is_empty() {
                    (0, None)
                } else {
                    let (delay, after) = required_arg(rest, "delay seconds")?;
                    (parse_u32(delay, "delay seconds")?, optional_text(after))
                };
                Ok(AdminCommand::AddForward {
                    source: parse_channel(source)?,
                    target: parse_channel(target)?,
                    delay_seconds,
                    description,
                })
            }
            "delete_forwarding_task" => {
                let (id, _) = required_arg(args, "task id")?;
                Ok(AdminCommand::DeleteForward {
                    id: parse_i64(id, "task id")?,
                })
            }
            "activate_forwarding_task" => {
                let (id, _) = required_arg(args, "task id")?;
                Ok(AdminCommand::SetForwardActive {
                    id: parse_i64(id, "task id")?,
                    active: true,
                })
            }
            "deactivate_forwarding_task" => {
                let (id, _) = required_arg(args, "task id")?;
                Ok(AdminCommand::SetForwardActive {
                    id: parse_i64(id, "task id")?,
                    active: false,
                })
            }
            "update_forwarding_delay" => {
                let (id, rest) = required_arg(args, "task id")?;
                let (delay, _) = required_arg(rest, "delay seconds")?;
                Ok(AdminCommand::SetForwardDelay {
                    id: parse_i64(id, "task id")?,
                    delay_seconds: parse_u32(delay, "delay seconds")?,
                })
            }
            "list_forwarding_tasks" => Ok(AdminCommand::ListForwards),
            "add_admin" => {
                let (id, _) = required_arg(args, "user id")?;
                Ok(AdminCommand::AddAdmin {
                    user: UserId(parse_i64(id, "user id")?),
                })
            }
            "remove_admin" => {
                let (id, _) = required_arg(args, "user id")?;
                Ok(AdminCommand::RemoveAdmin {
                    user: UserId(parse_i64(id, "user id")?),
                })
            }
            "list_admins" => Ok(AdminCommand::ListAdmins),
            other => Err(Error::UnknownCommand(other.to_string())),
        }
    }
}

fn required_arg<'a>(args: &'a str, what: &str) -> Result<(&'a str, &'a str)> {
    let args = args.trim_start();
    let mut parts = args.splitn(2, char::is_whitespace);
    match parts.next().filter(|s| !s.is_empty()) {
        Some(first) => Ok((first, parts.next().unwrap_or("").trim_start())),
        None => Err(Error::Validation(format!("missing {what}"))),
    }
}

fn optional_text(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn parse_i64(s: &str, what: &str) -> Result<i64> {
    s.parse::<i64>()
        .map_err(|_| Error::Validation(format!("{what} must be a number, got {s:?}")))
}

fn parse_u32(s: &str, what: &str) -> Result<u32> {
    s.parse::<u32>()
        .map_err(|_| Error::Validation(format!("{what} must be a non-negative number, got {s:?}")))
}

fn parse_channel(s: &str) -> Result<ChannelId> {
    Ok(ChannelId(parse_i64(s, "channel id")?))
}

/// Executes parsed commands against the rule store and forward scheduler,
/// returning the human-readable outcome.
#[derive(Clone)]
pub struct CommandExecutor {
    rules: Arc<RuleStore>,
    forwarder: ForwardScheduler,
    max_forward_delay: Duration,
}

impl CommandExecutor {
    pub fn new(
        rules: Arc<RuleStore>,
        forwarder: ForwardScheduler,
        max_forward_delay: Duration,
    ) -> Self {
        Self {
            rules,
            forwarder,
            max_forward_delay,
        }
    }

    fn check_delay(&self, delay_seconds: u32) -> Result<()> {
        if u64::from(delay_seconds) > self.max_forward_delay.as_secs() {
            return Err(Error::Validation(format!(
                "delay {delay_seconds}s is out of range (0..={}s)",
                self.max_forward_delay.as_secs()
            )));
        }
        Ok(())
    }

    pub async fn execute(&self, command: AdminCommand) -> Result<String> {
        match command {
            AdminCommand::AddRule {
                scope,
                symbol,
                target_id,
                description,
            } => {
                self.rules
                    .upsert_rule(SubstitutionRule {
                        scope,
                        symbol: symbol.clone(),
                        target_id,
                        description,
                    })
                    .await?;
                Ok(format!("rule saved ({scope}): {symbol} -> {target_id}"))
            }
            AdminCommand::DeleteRule { scope, symbol } => {
                if self.rules.delete_rule(scope, &symbol).await? {
                    Ok(format!("rule deleted ({scope}): {symbol}"))
                } else {
                    Ok(format!("no rule for {symbol} ({scope})"))
                }
            }
            AdminCommand::ListRules { scope } => {
                let rules = self.rules.rules_in_scope(scope);
                if rules.is_empty() {
                    return Ok(format!("no rules ({scope})"));
                }
                let mut lines = vec![format!("{} rule(s) ({scope}):", rules.len())];
                for rule in rules {
                    let description = rule
                        .description
                        .map(|d| format!(" ({d})"))
                        .unwrap_or_default();
                    lines.push(format!("{} -> {}{description}", rule.symbol, rule.target_id));
                }
                Ok(lines.join("\n"))
            }
            AdminCommand::DeleteAllRules { scope } => {
                let removed = self.rules.delete_rules_in_scope(scope).await?;
                Ok(format!("deleted {removed} rule(s) ({scope})"))
            }
            AdminCommand::CopyChannelRules { from, to } => {
                let copied = self.rules.copy_channel_rules(from, to).await?;
                Ok(format!(
                    "copied {copied} rule(s) from channel {} to channel {}",
                    from.0, to.0
                ))
            }
            AdminCommand::SetReplacement { channel, enabled } => {
                if self.rules.set_replacement_enabled(channel, enabled).await? {
                    let state = if enabled { "enabled" } else { "disabled" };
                    Ok(format!("replacement {state} for channel {}", channel.0))
                } else {
                    Ok(format!("channel {} is not monitored", channel.0))
                }
            }
            AdminCommand::ReplacementStatus { channel } => match self.rules.channel(channel) {
                Some(ch) => {
                    let state = if ch.replacement_enabled {
                        "enabled"
                    } else {
                        "disabled"
                    };
                    Ok(format!("replacement {state} for channel {}", channel.0))
                }
                None => Ok(format!("channel {} is not monitored", channel.0)),
            },
            AdminCommand::AddChannel {
                id,
                username,
                title,
            } => {
                self.rules
                    .add_channel(MonitoredChannel {
                        id,
                        username,
                        title: title.clone(),
                        replacement_enabled: true,
                    })
                    .await?;
                Ok(format!("channel added: {title} ({})", id.0))
            }
            AdminCommand::RemoveChannel { id } => {
                if self.rules.remove_channel(id).await? {
                    Ok(format!(
                        "channel {} removed; its channel rules were deleted",
                        id.0
                    ))
                } else {
                    Ok(format!("channel {} is not monitored", id.0))
                }
            }
            AdminCommand::ListChannels => {
                let channels = self.rules.channels();
                if channels.is_empty() {
                    return Ok("no monitored channels".to_string());
                }
                let mut lines = vec![format!("{} channel(s):", channels.len())];
                for ch in channels {
                    let username = ch
                        .username
                        .map(|u| format!(" @{u}"))
                        .unwrap_or_default();
                    let state = if ch.replacement_enabled { "on" } else { "off" };
                    lines.push(format!(
                        "{} ({}{username}): replacement {state}",
                        ch.title, ch.id.0
                    ));
                }
                Ok(lines.join("\n"))
            }
            AdminCommand::AddForward {
                source,
                target,
                delay_seconds,
                description,
            } => {
                self.check_delay(delay_seconds)?;
                let task = self
                    .rules
                    .add_task(source, target, delay_seconds, description.as_deref())
                    .await?;
                Ok(format!(
                    "forwarding task {} saved: {} -> {} (delay {}s)",
                    task.id, source.0, target.0, delay_seconds
                ))
            }
            AdminCommand::DeleteForward { id } => {
                if self.rules.delete_task(id).await? {
                    self.forwarder.cancel_task(id);
                    Ok(format!("forwarding task {id} deleted"))
                } else {
                    Ok(format!("no forwarding task {id}"))
                }
            }
            AdminCommand::SetForwardActive { id, active } => {
                if self.rules.set_task_active(id, active).await? {
                    if !active {
                        self.forwarder.cancel_task(id);
                    }
                    let state = if active { "activated" } else { "deactivated" };
                    Ok(format!("forwarding task {id} {state}"))
                } else {
                    Ok(format!("no forwarding task {id}"))
                }
            }
            AdminCommand::SetForwardDelay { id, delay_seconds } => {
                self.check_delay(delay_seconds)?;
                if self.rules.set_task_delay(id, delay_seconds).await? {
                    Ok(format!("forwarding task {id} delay set to {delay_seconds}s"))
                } else {
                    Ok(format!("no forwarding task {id}"))
                }
            }
            AdminCommand::ListForwards => {
                let tasks = self.rules.tasks();
                if tasks.is_empty() {
                    return Ok("no forwarding tasks".to_string());
                }
                let mut lines = vec![format!("{} task(s):", tasks.len())];
                for task in tasks {
                    let state = if task.active { "active" } else { "inactive" };
                    lines.push(format!(
                        "#{}: {} -> {} (delay {}s, {state})",
                        task.id, task.source.0, task.target.0, task.delay_seconds
                    ));
                }
                Ok(lines.join("\n"))
            }
            AdminCommand::AddAdmin { user } => {
                if self.rules.add_admin(user).await? {
                    Ok(format!("admin {} added", user.0))
                } else {
                    Ok(format!("{} is already an admin", user.0))
                }
            }
            AdminCommand::RemoveAdmin { user } => {
                if self.rules.remove_admin(user).await? {
                    Ok(format!("admin {} removed", user.0))
                } else {
                    Ok(format!("{} is not an admin", user.0))
                }
            }
            AdminCommand::ListAdmins => {
                let admins = self.rules.admins();
                let ids: Vec<String> = admins.iter().map(|u| u.0.to_string()).collect();
                Ok(format!("{} admin(s): {}", ids.len(), ids.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::port::testing::RecordingMessenger;
    use crate::storage::memory::MemoryStore;

    fn executor() -> CommandExecutor {
        let rules = Arc::new(RuleStore::new(Arc::new(MemoryStore::new()), &[7]));
        let messenger = Arc::new(RecordingMessenger::new());
        let forwarder = ForwardScheduler::new(rules.clone(), messenger);
        CommandExecutor::new(rules, forwarder, Duration::from_secs(3600))
    }

    #[test]
    fn parses_global_rule_with_description() {
        let cmd = AdminCommand::parse("add_emoji_replacement", "😀 1001 happy face").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::AddRule {
                scope: RuleScope::Global,
                symbol: "😀".to_string(),
                target_id: 1001,
                description: Some("happy face".to_string()),
            }
        );
    }

    #[test]
    fn parses_channel_rule() {
        let cmd =
            AdminCommand::parse("add_channel_emoji_replacement", "-1001 😀 1001").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::AddRule {
                scope: RuleScope::Channel(ChannelId(-1001)),
                symbol: "😀".to_string(),
                target_id: 1001,
                description: None,
            }
        );
    }

    #[test]
    fn parses_forward_task_with_default_delay() {
        let cmd = AdminCommand::parse("add_forwarding_task", "10 20").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::AddForward {
                source: ChannelId(10),
                target: ChannelId(20),
                delay_seconds: 0,
                description: None,
            }
        );
    }

    #[test]
    fn parses_channel_with_username_and_title() {
        let cmd = AdminCommand::parse("add_channel", "-1001 @news Daily News").unwrap();
        assert_eq!(
            cmd,
            AdminCommand::AddChannel {
                id: ChannelId(-1001),
                username: Some("news".to_string()),
                title: "Daily News".to_string(),
            }
        );
    }

    #[test]
    fn rejects_unknown_command() {
        let err = AdminCommand::parse("frobnicate", "").unwrap_err();
        assert!(matches!(err, Error::UnknownCommand(name) if name == "frobnicate"));
    }

    #[test]
    fn rejects_malformed_arguments() {
        assert!(matches!(
            AdminCommand::parse("add_emoji_replacement", "😀"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AdminCommand::parse("add_emoji_replacement", "😀 not-a-number"),
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            AdminCommand::parse("remove_channel", ""),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn executes_add_then_list() {
        let exec = executor();
        exec.execute(AdminCommand::parse("add_emoji_replacement", "😀 1001").unwrap())
            .await
            .unwrap();

        let out = exec
            .execute(AdminCommand::parse("list_emoji_replacements", "").unwrap())
            .await
            .unwrap();
        assert!(out.contains("😀 -> 1001"));
    }

    #[tokio::test]
    async fn rejects_out_of_range_delay() {
        let exec = executor();
        let err = exec
            .execute(AdminCommand::parse("add_forwarding_task", "10 20 9999").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_self_forward() {
        let exec = executor();
        let err = exec
            .execute(AdminCommand::parse("add_forwarding_task", "10 10").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }
}
