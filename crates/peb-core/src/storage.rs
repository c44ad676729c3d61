//! Persistence port.
//!
//! The persisted rows are the source of truth; the in-memory caches in
//! [`crate::rules::RuleStore`] are read-mostly mirrors. The storage adapter
//! crate implements this trait over SQLite.

use async_trait::async_trait;

use crate::domain::{
    ChannelId, ForwardingTask, MonitoredChannel, QueuedCommand, RuleScope, SubstitutionRule,
    UserId,
};
use crate::Result;

#[async_trait]
pub trait StoragePort: Send + Sync {
    // === Substitution rules ===

    async fn load_rules(&self) -> Result<Vec<SubstitutionRule>>;

    /// Insert or update the rule for `(scope, symbol)`; last write wins on
    /// target id and description.
    async fn upsert_rule(&self, rule: &SubstitutionRule) -> Result<()>;

    /// Returns false when no such rule existed.
    async fn delete_rule(&self, scope: RuleScope, symbol: &str) -> Result<bool>;

    /// Delete every rule in `scope`; returns the number removed.
    async fn delete_rules_in_scope(&self, scope: RuleScope) -> Result<u64>;

    // === Monitored channels ===

    /// Active channels only; soft-deleted rows stay out of the mirror.
    async fn load_channels(&self) -> Result<Vec<MonitoredChannel>>;

    /// Insert or update; re-adding a soft-deleted channel reactivates it.
    async fn upsert_channel(&self, channel: &MonitoredChannel) -> Result<()>;

    /// Soft delete (flag inactive). Returns false when the channel was not
    /// active.
    async fn deactivate_channel(&self, id: ChannelId) -> Result<bool>;

    async fn set_replacement_enabled(&self, id: ChannelId, enabled: bool) -> Result<bool>;

    // === Forwarding tasks ===

    /// All tasks, active or not; the mirror needs inactive rows so they can
    /// be re-activated by id.
    async fn load_tasks(&self) -> Result<Vec<ForwardingTask>>;

    /// Insert or update the task for the `(source, target)` pair; an update
    /// refreshes delay/description and re-activates.
    async fn upsert_task(
        &self,
        source: ChannelId,
        target: ChannelId,
        delay_seconds: u32,
        description: Option<&str>,
    ) -> Result<ForwardingTask>;

    async fn delete_task(&self, id: i64) -> Result<bool>;
    async fn set_task_active(&self, id: i64, active: bool) -> Result<bool>;
    async fn set_task_delay(&self, id: i64, delay_seconds: u32) -> Result<bool>;

    // === Admins ===

    async fn load_admins(&self) -> Result<Vec<UserId>>;
    async fn add_admin(&self, user: UserId) -> Result<bool>;
    async fn remove_admin(&self, user: UserId) -> Result<bool>;

    // === Command queue ===
    //
    // Wire contract: external producers only ever insert pending rows; this
    // core is the single consumer and only ever moves rows forward
    // (pending -> processing -> completed | failed). Rows are never deleted.

    async fn enqueue_command(&self, command: &str, args: &str, requested_by: UserId)
        -> Result<i64>;

    /// Oldest pending rows first, at most `limit`.
    async fn pending_commands(&self, limit: usize) -> Result<Vec<QueuedCommand>>;

    /// Claim a pending row. Errors when the row is not pending.
    async fn mark_processing(&self, id: i64) -> Result<()>;

    /// Finish a processing row. Errors when the row is not processing.
    async fn mark_completed(&self, id: i64, result: &str) -> Result<()>;
    async fn mark_failed(&self, id: i64, result: &str) -> Result<()>;
}

/// In-memory [`StoragePort`] for core tests.
#[cfg(test)]
pub mod memory {
    use std::collections::HashMap;

    use parking_lot::Mutex;

    use super::*;
    use crate::domain::CommandStatus;
    use crate::Error;

    #[derive(Default)]
    pub struct MemoryStore {
        state: Mutex<State>,
    }

    #[derive(Default)]
    struct State {
        rules: Vec<SubstitutionRule>,
        channels: HashMap<i64, (MonitoredChannel, bool)>, // (row, is_active)
        tasks: Vec<ForwardingTask>,
        admins: Vec<UserId>,
        queue: Vec<QueuedCommand>,
        next_task_id: i64,
        next_command_id: i64,
    }

    impl MemoryStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn queued(&self, id: i64) -> Option<QueuedCommand> {
            self.state.lock().queue.iter().find(|c| c.id == id).cloned()
        }
    }

    #[async_trait]
    impl StoragePort for MemoryStore {
        async fn load_rules(&self) -> Result<Vec<SubstitutionRule>> {
            Ok(self.state.lock().rules.clone())
        }

        async fn upsert_rule(&self, rule: &SubstitutionRule) -> Result<()> {
            let mut st = self.state.lock();
            if let Some(existing) = st
                .rules
                .iter_mut()
                .find(|r| r.scope == rule.scope && r.symbol == rule.symbol)
            {
                existing.target_id = rule.target_id;
                existing.description = rule.description.clone();
            } else {
                st.rules.push(rule.clone());
            }
            Ok(())
        }

        async fn delete_rule(&self, scope: RuleScope, symbol: &str) -> Result<bool> {
            let mut st = self.state.lock();
            let before = st.rules.len();
            st.rules.retain(|r| !(r.scope == scope && r.symbol == symbol));
            Ok(st.rules.len() != before)
        }

        async fn delete_rules_in_scope(&self, scope: RuleScope) -> Result<u64> {
            let mut st = self.state.lock();
            let before = st.rules.len();
            st.rules.retain(|r| r.scope != scope);
            Ok((before - st.rules.len()) as u64)
        }

        async fn load_channels(&self) -> Result<Vec<MonitoredChannel>> {
            Ok(self
                .state
                .lock()
                .channels
                .values()
                .filter(|(_, active)| *active)
                .map(|(ch, _)| ch.clone())
                .collect())
        }

        async fn upsert_channel(&self, channel: &MonitoredChannel) -> Result<()> {
            self.state
                .lock()
                .channels
                .insert(channel.id.0, (channel.clone(), true));
            Ok(())
        }

        async fn deactivate_channel(&self, id: ChannelId) -> Result<bool> {
            let mut st = self.state.lock();
            match st.channels.get_mut(&id.0) {
                Some(entry) if entry.1 => {
                    entry.1 = false;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn set_replacement_enabled(&self, id: ChannelId, enabled: bool) -> Result<bool> {
            let mut st = self.state.lock();
            match st.channels.get_mut(&id.0) {
                Some(entry) if entry.1 => {
                    entry.0.replacement_enabled = enabled;
                    Ok(true)
                }
                _ => Ok(false),
            }
        }

        async fn load_tasks(&self) -> Result<Vec<ForwardingTask>> {
            Ok(self.state.lock().tasks.clone())
        }

        async fn upsert_task(
            &self,
            source: ChannelId,
            target: ChannelId,
            delay_seconds: u32,
            description: Option<&str>,
        ) -> Result<ForwardingTask> {
            let mut st = self.state.lock();
            if let Some(existing) = st
                .tasks
                .iter_mut()
                .find(|t| t.source == source && t.target == target)
            {
                existing.delay_seconds = delay_seconds;
                existing.description = description.map(String::from);
                existing.active = true;
                return Ok(existing.clone());
            }
            st.next_task_id += 1;
            let task = ForwardingTask {
                id: st.next_task_id,
                source,
                target,
                delay_seconds,
                active: true,
                description: description.map(String::from),
            };
            st.tasks.push(task.clone());
            Ok(task)
        }

        async fn delete_task(&self, id: i64) -> Result<bool> {
            let mut st = self.state.lock();
            let before = st.tasks.len();
            st.tasks.retain(|t| t.id != id);
            Ok(st.tasks.len() != before)
        }

        async fn set_task_active(&self, id: i64, active: bool) -> Result<bool> {
            let mut st = self.state.lock();
            match st.tasks.iter_mut().find(|t| t.id == id) {
                Some(task) => {
                    task.active = active;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn set_task_delay(&self, id: i64, delay_seconds: u32) -> Result<bool> {
            let mut st = self.state.lock();
            match st.tasks.iter_mut().find(|t| t.id == id) {
                Some(task) => {
                    task.delay_seconds = delay_seconds;
                    Ok(true)
                }
                None => Ok(false),
            }
        }

        async fn load_admins(&self) -> Result<Vec<UserId>> {
            Ok(self.state.lock().admins.clone())
        }

        async fn add_admin(&self, user: UserId) -> Result<bool> {
            let mut st = self.state.lock();
            if st.admins.contains(&user) {
                return Ok(false);
            }
            st.admins.push(user);
            Ok(true)
        }

        async fn remove_admin(&self, user: UserId) -> Result<bool> {
            let mut st = self.state.lock();
            let before = st.admins.len();
            st.admins.retain(|u| *u != user);
            Ok(st.admins.len() != before)
        }

        async fn enqueue_command(
            &self,
            command: &str,
            args: &str,
            requested_by: UserId,
        ) -> Result<i64> {
            let mut st = self.state.lock();
            st.next_command_id += 1;
            let id = st.next_command_id;
            st.queue.push(QueuedCommand {
                id,
                command: command.to_string(),
                args: args.to_string(),
                requested_by,
                status: CommandStatus::Pending,
                result: None,
                created_at: id, // creation order stands in for wall-clock time
                processed_at: None,
            });
            Ok(id)
        }

        async fn pending_commands(&self, limit: usize) -> Result<Vec<QueuedCommand>> {
            let st = self.state.lock();
            let mut pending: Vec<QueuedCommand> = st
                .queue
                .iter()
                .filter(|c| c.status == CommandStatus::Pending)
                .cloned()
                .collect();
            pending.sort_by_key(|c| (c.created_at, c.id));
            pending.truncate(limit);
            Ok(pending)
        }

        async fn mark_processing(&self, id: i64) -> Result<()> {
            let mut st = self.state.lock();
            let Some(row) = st.queue.iter_mut().find(|c| c.id == id) else {
                return Err(Error::Storage(format!("command {id} not found")));
            };
            if row.status != CommandStatus::Pending {
                return Err(Error::Storage(format!("command {id} is not pending")));
            }
            row.status = CommandStatus::Processing;
            Ok(())
        }

        async fn mark_completed(&self, id: i64, result: &str) -> Result<()> {
            self.finish(id, CommandStatus::Completed, result)
        }

        async fn mark_failed(&self, id: i64, result: &str) -> Result<()> {
            self.finish(id, CommandStatus::Failed, result)
        }
    }

    impl MemoryStore {
        fn finish(&self, id: i64, status: CommandStatus, result: &str) -> Result<()> {
            let mut st = self.state.lock();
            let Some(row) = st.queue.iter_mut().find(|c| c.id == id) else {
                return Err(Error::Storage(format!("command {id} not found")));
            };
            if row.status != CommandStatus::Processing {
                return Err(Error::Storage(format!("command {id} is not processing")));
            }
            row.status = status;
            row.result = Some(result.to_string());
            row.processed_at = Some(row.created_at);
            Ok(())
        }
    }
}
