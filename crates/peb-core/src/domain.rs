/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram channel/chat id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChannelId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChannelId,
    pub message_id: MessageId,
}

/// Scope of a substitution rule: one channel, or every channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleScope {
    Global,
    Channel(ChannelId),
}

impl RuleScope {
    pub fn channel_id(&self) -> Option<ChannelId> {
        match self {
            RuleScope::Global => None,
            RuleScope::Channel(id) => Some(*id),
        }
    }
}

impl std::fmt::Display for RuleScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleScope::Global => write!(f, "global"),
            RuleScope::Channel(id) => write!(f, "channel {}", id.0),
        }
    }
}

/// A symbol-to-premium-emoji substitution rule.
///
/// Unique per `(scope, symbol)`; a channel-scoped rule shadows a global rule
/// for the same symbol inside that channel.
#[derive(Clone, Debug, PartialEq)]
pub struct SubstitutionRule {
    pub scope: RuleScope,
    pub symbol: String,
    pub target_id: i64,
    pub description: Option<String>,
}

/// A channel the bot watches for posts.
#[derive(Clone, Debug, PartialEq)]
pub struct MonitoredChannel {
    pub id: ChannelId,
    pub username: Option<String>,
    pub title: String,
    pub replacement_enabled: bool,
}

/// A source-to-target copy task, optionally delayed.
///
/// Unique per `(source, target)`. Both endpoints must be currently monitored
/// for the task to fire, even while `active`.
#[derive(Clone, Debug, PartialEq)]
pub struct ForwardingTask {
    pub id: i64,
    pub source: ChannelId,
    pub target: ChannelId,
    pub delay_seconds: u32,
    pub active: bool,
    pub description: Option<String>,
}

/// Lifecycle of a queued command. Transitions only move forward:
/// pending -> processing -> completed | failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl CommandStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandStatus::Pending => "pending",
            CommandStatus::Processing => "processing",
            CommandStatus::Completed => "completed",
            CommandStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(CommandStatus::Pending),
            "processing" => Some(CommandStatus::Processing),
            "completed" => Some(CommandStatus::Completed),
            "failed" => Some(CommandStatus::Failed),
            _ => None,
        }
    }
}

/// One administrative command request, persisted in the queue table.
#[derive(Clone, Debug)]
pub struct QueuedCommand {
    pub id: i64,
    pub command: String,
    pub args: String,
    pub requested_by: UserId,
    pub status: CommandStatus,
    pub result: Option<String>,
    pub created_at: i64,
    pub processed_at: Option<i64>,
}
