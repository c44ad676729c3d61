//! SQLite persistence for the bot.
//!
//! Implements the core [`StoragePort`] over sqlx with embedded migrations.
//! The database is the source of truth; the core keeps read-mostly mirrors.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use peb_core::domain::{
    ChannelId, CommandStatus, ForwardingTask, MonitoredChannel, QueuedCommand, RuleScope,
    SubstitutionRule, UserId,
};
use peb_core::storage::StoragePort;
use peb_core::{Error, Result};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Database handle with connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout, so a busy pool fails fast instead of
    /// stalling a whole tick.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Open (or create) the database at `path` and run migrations.
    ///
    /// `":memory:"` opens a private in-memory database (used by tests).
    pub async fn connect(path: &str) -> Result<Self> {
        let pool = if path == ":memory:" {
            // Uniquely named shared-cache memory database per call; a plain
            // `:memory:` filename would give every pooled connection its own
            // empty database.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let uri = format!(
                "file:peb-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );
            let options = SqliteConnectOptions::new()
                .filename(&uri)
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await
                .map_err(map_err)?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .connect_with(options)
                .await
                .map_err(map_err)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| Error::Storage(format!("migration failed: {e}")))?;

        // WAL keeps reads open while the queue processor writes.
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&pool)
            .await
            .map_err(map_err)?;

        info!(path, "database ready");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_err(e: sqlx::Error) -> Error {
    Error::Storage(e.to_string())
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

fn scope_bind(scope: RuleScope) -> Option<i64> {
    scope.channel_id().map(|c| c.0)
}

fn scope_from_row(channel_id: Option<i64>) -> RuleScope {
    match channel_id {
        None => RuleScope::Global,
        Some(id) => RuleScope::Channel(ChannelId(id)),
    }
}

fn status_from_row(id: i64, status: &str) -> Result<CommandStatus> {
    CommandStatus::parse(status)
        .ok_or_else(|| Error::Storage(format!("command {id} has unknown status {status:?}")))
}

#[async_trait]
impl StoragePort for SqliteStore {
    async fn load_rules(&self) -> Result<Vec<SubstitutionRule>> {
        let rows = sqlx::query_as::<_, (Option<i64>, String, i64, Option<String>)>(
            "SELECT scope_channel_id, source_symbol, target_id, description FROM rules",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows
            .into_iter()
            .map(|(scope, symbol, target_id, description)| SubstitutionRule {
                scope: scope_from_row(scope),
                symbol,
                target_id,
                description,
            })
            .collect())
    }

    async fn upsert_rule(&self, rule: &SubstitutionRule) -> Result<()> {
        let ts = now();
        // `IS ?` compares NULL scope values as equal, which `= ?` would not.
        let updated = sqlx::query(
            "UPDATE rules SET target_id = ?, description = ?, updated_at = ? \
             WHERE scope_channel_id IS ? AND source_symbol = ?",
        )
        .bind(rule.target_id)
        .bind(&rule.description)
        .bind(ts)
        .bind(scope_bind(rule.scope))
        .bind(&rule.symbol)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if updated.rows_affected() > 0 {
            return Ok(());
        }

        sqlx::query(
            "INSERT INTO rules (scope_channel_id, source_symbol, target_id, description, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(scope_bind(rule.scope))
        .bind(&rule.symbol)
        .bind(rule.target_id)
        .bind(&rule.description)
        .bind(ts)
        .bind(ts)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }

    async fn delete_rule(&self, scope: RuleScope, symbol: &str) -> Result<bool> {
        let res = sqlx::query(
            "DELETE FROM rules WHERE scope_channel_id IS ? AND source_symbol = ?",
        )
        .bind(scope_bind(scope))
        .bind(symbol)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete_rules_in_scope(&self, scope: RuleScope) -> Result<u64> {
        let res = sqlx::query("DELETE FROM rules WHERE scope_channel_id IS ?")
            .bind(scope_bind(scope))
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected())
    }

    async fn load_channels(&self) -> Result<Vec<MonitoredChannel>> {
        let rows = sqlx::query_as::<_, (i64, Option<String>, String, bool)>(
            "SELECT channel_id, username, title, replacement_enabled \
             FROM monitored_channels WHERE is_active = TRUE",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows
            .into_iter()
            .map(|(id, username, title, replacement_enabled)| MonitoredChannel {
                id: ChannelId(id),
                username,
                title,
                replacement_enabled,
            })
            .collect())
    }

    async fn upsert_channel(&self, channel: &MonitoredChannel) -> Result<()> {
        sqlx::query(
            "INSERT INTO monitored_channels (channel_id, username, title, replacement_enabled, is_active, added_at) \
             VALUES (?, ?, ?, ?, TRUE, ?) \
             ON CONFLICT(channel_id) DO UPDATE SET \
               username = excluded.username, \
               title = excluded.title, \
               replacement_enabled = excluded.replacement_enabled, \
               is_active = TRUE",
        )
        .bind(channel.id.0)
        .bind(&channel.username)
        .bind(&channel.title)
        .bind(channel.replacement_enabled)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn deactivate_channel(&self, id: ChannelId) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE monitored_channels SET is_active = FALSE \
             WHERE channel_id = ? AND is_active = TRUE",
        )
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_replacement_enabled(&self, id: ChannelId, enabled: bool) -> Result<bool> {
        let res = sqlx::query(
            "UPDATE monitored_channels SET replacement_enabled = ? \
             WHERE channel_id = ? AND is_active = TRUE",
        )
        .bind(enabled)
        .bind(id.0)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn load_tasks(&self) -> Result<Vec<ForwardingTask>> {
        let rows = sqlx::query_as::<_, (i64, i64, i64, i64, bool, Option<String>)>(
            "SELECT id, source_channel_id, target_channel_id, delay_seconds, active, description \
             FROM forwarding_tasks",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(rows
            .into_iter()
            .map(
                |(id, source, target, delay, active, description)| ForwardingTask {
                    id,
                    source: ChannelId(source),
                    target: ChannelId(target),
                    delay_seconds: delay.max(0) as u32,
                    active,
                    description,
                },
            )
            .collect())
    }

    async fn upsert_task(
        &self,
        source: ChannelId,
        target: ChannelId,
        delay_seconds: u32,
        description: Option<&str>,
    ) -> Result<ForwardingTask> {
        let row = sqlx::query_as::<_, (i64, i64, i64, i64, bool, Option<String>)>(
            "INSERT INTO forwarding_tasks (source_channel_id, target_channel_id, delay_seconds, active, description, created_at) \
             VALUES (?, ?, ?, TRUE, ?, ?) \
             ON CONFLICT(source_channel_id, target_channel_id) DO UPDATE SET \
               delay_seconds = excluded.delay_seconds, \
               description = excluded.description, \
               active = TRUE \
             RETURNING id, source_channel_id, target_channel_id, delay_seconds, active, description",
        )
        .bind(source.0)
        .bind(target.0)
        .bind(i64::from(delay_seconds))
        .bind(description)
        .bind(now())
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;

        let (id, source, target, delay, active, description) = row;
        Ok(ForwardingTask {
            id,
            source: ChannelId(source),
            target: ChannelId(target),
            delay_seconds: delay.max(0) as u32,
            active,
            description,
        })
    }

    async fn delete_task(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM forwarding_tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_task_active(&self, id: i64, active: bool) -> Result<bool> {
        let res = sqlx::query("UPDATE forwarding_tasks SET active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn set_task_delay(&self, id: i64, delay_seconds: u32) -> Result<bool> {
        let res = sqlx::query("UPDATE forwarding_tasks SET delay_seconds = ? WHERE id = ?")
            .bind(i64::from(delay_seconds))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn load_admins(&self) -> Result<Vec<UserId>> {
        let rows = sqlx::query_as::<_, (i64,)>("SELECT user_id FROM bot_admins")
            .fetch_all(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(rows.into_iter().map(|(id,)| UserId(id)).collect())
    }

    async fn add_admin(&self, user: UserId) -> Result<bool> {
        let res = sqlx::query("INSERT OR IGNORE INTO bot_admins (user_id, added_at) VALUES (?, ?)")
            .bind(user.0)
            .bind(now())
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_admin(&self, user: UserId) -> Result<bool> {
        let res = sqlx::query("DELETE FROM bot_admins WHERE user_id = ?")
            .bind(user.0)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(res.rows_affected() > 0)
    }

    async fn enqueue_command(
        &self,
        command: &str,
        args: &str,
        requested_by: UserId,
    ) -> Result<i64> {
        let res = sqlx::query(
            "INSERT INTO command_queue (command, args, requested_by, status, created_at) \
             VALUES (?, ?, ?, 'pending', ?)",
        )
        .bind(command)
        .bind(args)
        .bind(requested_by.0)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(res.last_insert_rowid())
    }

    async fn pending_commands(&self, limit: usize) -> Result<Vec<QueuedCommand>> {
        let rows = sqlx::query_as::<
            _,
            (i64, String, String, i64, String, Option<String>, i64, Option<i64>),
        >(
            "SELECT id, command, args, requested_by, status, result, created_at, processed_at \
             FROM command_queue WHERE status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, command, args, requested_by, status, result, created_at, processed_at) in rows {
            out.push(QueuedCommand {
                id,
                command,
                args,
                requested_by: UserId(requested_by),
                status: status_from_row(id, &status)?,
                result,
                created_at,
                processed_at,
            });
        }
        Ok(out)
    }

    async fn mark_processing(&self, id: i64) -> Result<()> {
        let res = sqlx::query(
            "UPDATE command_queue SET status = 'processing' \
             WHERE id = ? AND status = 'pending'",
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::Storage(format!("command {id} is not pending")));
        }
        Ok(())
    }

    async fn mark_completed(&self, id: i64, result: &str) -> Result<()> {
        self.finish(id, CommandStatus::Completed, result).await
    }

    async fn mark_failed(&self, id: i64, result: &str) -> Result<()> {
        self.finish(id, CommandStatus::Failed, result).await
    }
}

impl SqliteStore {
    async fn finish(&self, id: i64, status: CommandStatus, result: &str) -> Result<()> {
        let res = sqlx::query(
            "UPDATE command_queue SET status = ?, result = ?, processed_at = ? \
             WHERE id = ? AND status = 'processing'",
        )
        .bind(status.as_str())
        .bind(result)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        if res.rows_affected() == 0 {
            return Err(Error::Storage(format!("command {id} is not processing")));
        }
        Ok(())
    }
}
