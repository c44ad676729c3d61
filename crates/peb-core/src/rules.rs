//! In-memory mirror of persisted rules, channels, tasks and admins, plus
//! rule resolution.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::domain::{
    ChannelId, ForwardingTask, MonitoredChannel, RuleScope, SubstitutionRule, UserId,
};
use crate::storage::StoragePort;
use crate::{Error, Result};

/// Read-mostly mirror of the persisted state.
///
/// Persisted rows are the source of truth. The mirror is rebuilt fully by
/// [`RuleStore::load_all`] at startup and kept in sync incrementally by every
/// mutating operation (storage write first, then cache update). A crash
/// between the two leaves the cache stale until the next full reload; that
/// window is accepted rather than corrected proactively.
pub struct RuleStore {
    store: Arc<dyn StoragePort>,
    seed_admins: Vec<UserId>,
    state: RwLock<Mirror>,
}

#[derive(Default)]
struct Mirror {
    global_rules: HashMap<String, SubstitutionRule>,
    channel_rules: HashMap<ChannelId, HashMap<String, SubstitutionRule>>,
    channels: HashMap<ChannelId, MonitoredChannel>,
    tasks: HashMap<i64, ForwardingTask>,
    admins: HashSet<UserId>,
}

impl RuleStore {
    pub fn new(store: Arc<dyn StoragePort>, seed_admin_ids: &[i64]) -> Self {
        let seed_admins: Vec<UserId> = seed_admin_ids.iter().map(|id| UserId(*id)).collect();
        let mut state = Mirror::default();
        state.admins.extend(seed_admins.iter().copied());
        Self {
            store,
            seed_admins,
            state: RwLock::new(state),
        }
    }

    /// Rebuild the whole mirror from storage.
    pub async fn load_all(&self) -> Result<()> {
        let rules = self.store.load_rules().await?;
        let channels = self.store.load_channels().await?;
        let tasks = self.store.load_tasks().await?;
        let admins = self.store.load_admins().await?;

        let mut fresh = Mirror::default();
        for rule in rules {
            match rule.scope {
                RuleScope::Global => {
                    fresh.global_rules.insert(rule.symbol.clone(), rule);
                }
                RuleScope::Channel(id) => {
                    fresh
                        .channel_rules
                        .entry(id)
                        .or_default()
                        .insert(rule.symbol.clone(), rule);
                }
            }
        }
        for channel in channels {
            fresh.channels.insert(channel.id, channel);
        }
        for task in tasks {
            fresh.tasks.insert(task.id, task);
        }
        fresh.admins.extend(self.seed_admins.iter().copied());
        fresh.admins.extend(admins);

        let mut st = self.state.write();
        *st = fresh;
        info!(
            global_rules = st.global_rules.len(),
            channel_rules = st.channel_rules.values().map(|m| m.len()).sum::<usize>(),
            channels = st.channels.len(),
            tasks = st.tasks.len(),
            admins = st.admins.len(),
            "caches loaded from storage"
        );
        Ok(())
    }

    // === Resolution (synchronous, no I/O) ===

    /// Channel-scoped rule first, global rule second, none otherwise.
    pub fn resolve(&self, channel: ChannelId, symbol: &str) -> Option<i64> {
        let st = self.state.read();
        if let Some(rule) = st.channel_rules.get(&channel).and_then(|m| m.get(symbol)) {
            return Some(rule.target_id);
        }
        st.global_rules.get(symbol).map(|r| r.target_id)
    }

    pub fn is_monitored(&self, channel: ChannelId) -> bool {
        self.state.read().channels.contains_key(&channel)
    }

    pub fn replacement_enabled(&self, channel: ChannelId) -> bool {
        self.state
            .read()
            .channels
            .get(&channel)
            .map(|c| c.replacement_enabled)
            .unwrap_or(false)
    }

    pub fn is_admin(&self, user: UserId) -> bool {
        self.state.read().admins.contains(&user)
    }

    pub fn channel(&self, id: ChannelId) -> Option<MonitoredChannel> {
        self.state.read().channels.get(&id).cloned()
    }

    pub fn channels(&self) -> Vec<MonitoredChannel> {
        let mut out: Vec<MonitoredChannel> = self.state.read().channels.values().cloned().collect();
        out.sort_by_key(|c| c.id.0);
        out
    }

    pub fn rules_in_scope(&self, scope: RuleScope) -> Vec<SubstitutionRule> {
        let st = self.state.read();
        let mut out: Vec<SubstitutionRule> = match scope {
            RuleScope::Global => st.global_rules.values().cloned().collect(),
            RuleScope::Channel(id) => st
                .channel_rules
                .get(&id)
                .map(|m| m.values().cloned().collect())
                .unwrap_or_default(),
        };
        out.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        out
    }

    pub fn task(&self, id: i64) -> Option<ForwardingTask> {
        self.state.read().tasks.get(&id).cloned()
    }

    pub fn tasks(&self) -> Vec<ForwardingTask> {
        let mut out: Vec<ForwardingTask> = self.state.read().tasks.values().cloned().collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Active tasks for `source` whose endpoints are both monitored.
    pub fn tasks_for_source(&self, source: ChannelId) -> Vec<ForwardingTask> {
        let st = self.state.read();
        let mut out: Vec<ForwardingTask> = st
            .tasks
            .values()
            .filter(|t| {
                t.active
                    && t.source == source
                    && st.channels.contains_key(&t.source)
                    && st.channels.contains_key(&t.target)
            })
            .cloned()
            .collect();
        out.sort_by_key(|t| t.id);
        out
    }

    /// Delivery-time re-check for a delayed copy: the task must still exist,
    /// be active, and keep both endpoints monitored.
    pub fn task_is_deliverable(&self, task_id: i64) -> bool {
        let st = self.state.read();
        let Some(task) = st.tasks.get(&task_id) else {
            return false;
        };
        task.active
            && st.channels.contains_key(&task.source)
            && st.channels.contains_key(&task.target)
    }

    pub fn admins(&self) -> Vec<UserId> {
        let mut out: Vec<UserId> = self.state.read().admins.iter().copied().collect();
        out.sort_by_key(|u| u.0);
        out
    }

    // === Mutations (storage write first, then mirror update) ===

    pub async fn upsert_rule(&self, rule: SubstitutionRule) -> Result<()> {
        self.store.upsert_rule(&rule).await?;
        let mut st = self.state.write();
        match rule.scope {
            RuleScope::Global => {
                st.global_rules.insert(rule.symbol.clone(), rule);
            }
            RuleScope::Channel(id) => {
                st.channel_rules
                    .entry(id)
                    .or_default()
                    .insert(rule.symbol.clone(), rule);
            }
        }
        Ok(())
    }

    pub async fn delete_rule(&self, scope: RuleScope, symbol: &str) -> Result<bool> {
        let removed = self.store.delete_rule(scope, symbol).await?;
        if removed {
            let mut st = self.state.write();
            match scope {
                RuleScope::Global => {
                    st.global_rules.remove(symbol);
                }
                RuleScope::Channel(id) => {
                    if let Some(map) = st.channel_rules.get_mut(&id) {
                        map.remove(symbol);
                        if map.is_empty() {
                            st.channel_rules.remove(&id);
                        }
                    }
                }
            }
        }
        Ok(removed)
    }

    pub async fn delete_rules_in_scope(&self, scope: RuleScope) -> Result<u64> {
        let removed = self.store.delete_rules_in_scope(scope).await?;
        let mut st = self.state.write();
        match scope {
            RuleScope::Global => st.global_rules.clear(),
            RuleScope::Channel(id) => {
                st.channel_rules.remove(&id);
            }
        }
        Ok(removed)
    }

    /// Copy every rule of `from`'s scope into `to`'s scope (upsert each).
    pub async fn copy_channel_rules(&self, from: ChannelId, to: ChannelId) -> Result<u64> {
        if from == to {
            return Err(Error::Validation(
                "source and target channel must differ".to_string(),
            ));
        }
        let rules = self.rules_in_scope(RuleScope::Channel(from));
        let mut copied = 0u64;
        for rule in rules {
            self.upsert_rule(SubstitutionRule {
                scope: RuleScope::Channel(to),
                ..rule
            })
            .await?;
            copied += 1;
        }
        Ok(copied)
    }

    pub async fn add_channel(&self, channel: MonitoredChannel) -> Result<()> {
        self.store.upsert_channel(&channel).await?;
        self.state.write().channels.insert(channel.id, channel);
        Ok(())
    }

    /// Soft-delete the channel and cascade a hard delete of its
    /// channel-scoped rules. Global rules are untouched.
    pub async fn remove_channel(&self, id: ChannelId) -> Result<bool> {
        let removed = self.store.deactivate_channel(id).await?;
        if !removed {
            return Ok(false);
        }
        self.store
            .delete_rules_in_scope(RuleScope::Channel(id))
            .await?;
        let mut st = self.state.write();
        st.channels.remove(&id);
        st.channel_rules.remove(&id);
        Ok(true)
    }

    pub async fn set_replacement_enabled(&self, id: ChannelId, enabled: bool) -> Result<bool> {
        let updated = self.store.set_replacement_enabled(id, enabled).await?;
        if updated {
            if let Some(channel) = self.state.write().channels.get_mut(&id) {
                channel.replacement_enabled = enabled;
            }
        }
        Ok(updated)
    }

    pub async fn add_task(
        &self,
        source: ChannelId,
        target: ChannelId,
        delay_seconds: u32,
        description: Option<&str>,
    ) -> Result<ForwardingTask> {
        if source == target {
            return Err(Error::Validation(
                "source and target channel must differ".to_string(),
            ));
        }
        let task = self
            .store
            .upsert_task(source, target, delay_seconds, description)
            .await?;
        self.state.write().tasks.insert(task.id, task.clone());
        Ok(task)
    }

    pub async fn delete_task(&self, id: i64) -> Result<bool> {
        let removed = self.store.delete_task(id).await?;
        if removed {
            self.state.write().tasks.remove(&id);
        }
        Ok(removed)
    }

    pub async fn set_task_active(&self, id: i64, active: bool) -> Result<bool> {
        let updated = self.store.set_task_active(id, active).await?;
        if updated {
            if let Some(task) = self.state.write().tasks.get_mut(&id) {
                task.active = active;
            }
        }
        Ok(updated)
    }

    pub async fn set_task_delay(&self, id: i64, delay_seconds: u32) -> Result<bool> {
        let updated = self.store.set_task_delay(id, delay_seconds).await?;
        if updated {
            if let Some(task) = self.state.write().tasks.get_mut(&id) {
                task.delay_seconds = delay_seconds;
            }
        }
        Ok(updated)
    }

    pub async fn add_admin(&self, user: UserId) -> Result<bool> {
        let added = self.store.add_admin(user).await?;
        self.state.write().admins.insert(user);
        Ok(added)
    }

    pub async fn remove_admin(&self, user: UserId) -> Result<bool> {
        // Seed admins from config cannot be removed; they are re-unioned on
        // every reload anyway.
        if self.seed_admins.contains(&user) {
            return Err(Error::Validation(format!(
                "user {} is a configured admin and cannot be removed",
                user.0
            )));
        }
        let removed = self.store.remove_admin(user).await?;
        if removed {
            self.state.write().admins.remove(&user);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn channel(id: i64) -> MonitoredChannel {
        MonitoredChannel {
            id: ChannelId(id),
            username: None,
            title: format!("channel {id}"),
            replacement_enabled: true,
        }
    }

    fn rule(scope: RuleScope, symbol: &str, target_id: i64) -> SubstitutionRule {
        SubstitutionRule {
            scope,
            symbol: symbol.to_string(),
            target_id,
            description: None,
        }
    }

    async fn store() -> RuleStore {
        RuleStore::new(Arc::new(MemoryStore::new()), &[7])
    }

    #[tokio::test]
    async fn channel_rule_shadows_global() {
        let rules = store().await;
        rules
            .upsert_rule(rule(RuleScope::Global, "😀", 2002))
            .await
            .unwrap();
        rules
            .upsert_rule(rule(RuleScope::Channel(ChannelId(42)), "😀", 1001))
            .await
            .unwrap();

        assert_eq!(rules.resolve(ChannelId(42), "😀"), Some(1001));
        assert_eq!(rules.resolve(ChannelId(99), "😀"), Some(2002));
        assert_eq!(rules.resolve(ChannelId(42), "✅"), None);
    }

    #[tokio::test]
    async fn upsert_updates_instead_of_duplicating() {
        let rules = store().await;
        rules
            .upsert_rule(rule(RuleScope::Global, "😀", 1))
            .await
            .unwrap();
        rules
            .upsert_rule(rule(RuleScope::Global, "😀", 2))
            .await
            .unwrap();

        let listed = rules.rules_in_scope(RuleScope::Global);
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].target_id, 2);
    }

    #[tokio::test]
    async fn removing_channel_cascades_only_its_rules() {
        let rules = store().await;
        rules.add_channel(channel(42)).await.unwrap();
        rules
            .upsert_rule(rule(RuleScope::Channel(ChannelId(42)), "😀", 1))
            .await
            .unwrap();
        rules
            .upsert_rule(rule(RuleScope::Channel(ChannelId(42)), "✅", 2))
            .await
            .unwrap();
        rules
            .upsert_rule(rule(RuleScope::Global, "😀", 3))
            .await
            .unwrap();

        assert!(rules.remove_channel(ChannelId(42)).await.unwrap());
        assert!(!rules.is_monitored(ChannelId(42)));
        assert!(rules
            .rules_in_scope(RuleScope::Channel(ChannelId(42)))
            .is_empty());
        assert_eq!(rules.rules_in_scope(RuleScope::Global).len(), 1);

        // The persisted rows are gone too, not just the mirror.
        rules.load_all().await.unwrap();
        assert!(rules
            .rules_in_scope(RuleScope::Channel(ChannelId(42)))
            .is_empty());
        assert_eq!(rules.rules_in_scope(RuleScope::Global).len(), 1);
    }

    #[tokio::test]
    async fn copy_channel_rules_upserts_into_target_scope() {
        let rules = store().await;
        rules
            .upsert_rule(rule(RuleScope::Channel(ChannelId(1)), "😀", 10))
            .await
            .unwrap();
        rules
            .upsert_rule(rule(RuleScope::Channel(ChannelId(1)), "✅", 11))
            .await
            .unwrap();

        let copied = rules
            .copy_channel_rules(ChannelId(1), ChannelId(2))
            .await
            .unwrap();
        assert_eq!(copied, 2);
        assert_eq!(rules.resolve(ChannelId(2), "😀"), Some(10));
        assert!(rules.copy_channel_rules(ChannelId(1), ChannelId(1)).await.is_err());
    }

    #[tokio::test]
    async fn tasks_fire_only_with_both_endpoints_monitored() {
        let rules = store().await;
        rules.add_channel(channel(10)).await.unwrap();
        let task = rules
            .add_task(ChannelId(10), ChannelId(20), 0, None)
            .await
            .unwrap();

        // Target not monitored yet.
        assert!(rules.tasks_for_source(ChannelId(10)).is_empty());
        assert!(!rules.task_is_deliverable(task.id));

        rules.add_channel(channel(20)).await.unwrap();
        assert_eq!(rules.tasks_for_source(ChannelId(10)).len(), 1);
        assert!(rules.task_is_deliverable(task.id));

        rules.set_task_active(task.id, false).await.unwrap();
        assert!(rules.tasks_for_source(ChannelId(10)).is_empty());
        assert!(!rules.task_is_deliverable(task.id));
    }

    #[tokio::test]
    async fn task_pair_is_unique() {
        let rules = store().await;
        let first = rules
            .add_task(ChannelId(10), ChannelId(20), 0, None)
            .await
            .unwrap();
        let second = rules
            .add_task(ChannelId(10), ChannelId(20), 30, None)
            .await
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(rules.tasks().len(), 1);
        assert_eq!(rules.tasks()[0].delay_seconds, 30);

        assert!(rules
            .add_task(ChannelId(10), ChannelId(10), 0, None)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn seed_admins_survive_reload_and_cannot_be_removed() {
        let rules = store().await;
        assert!(rules.is_admin(UserId(7)));
        rules.add_admin(UserId(8)).await.unwrap();
        rules.load_all().await.unwrap();
        assert!(rules.is_admin(UserId(7)));
        assert!(rules.is_admin(UserId(8)));

        assert!(rules.remove_admin(UserId(7)).await.is_err());
        assert!(rules.remove_admin(UserId(8)).await.unwrap());
        assert!(!rules.is_admin(UserId(8)));
    }
}
