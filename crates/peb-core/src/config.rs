use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{errors::Error, Result};

/// Typed configuration, loaded from the environment (`.env` supported).
#[derive(Clone, Debug)]
pub struct Config {
    // Core
    pub telegram_bot_token: String,
    pub admin_user_ids: Vec<i64>,
    pub database_path: PathBuf,

    // Command queue
    pub queue_poll_interval: Duration,
    pub queue_error_backoff: Duration,
    pub queue_batch_size: usize,
    pub result_max_len: usize,

    // Forwarding
    pub max_forward_delay: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        // Required env vars
        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }

        let admin_user_ids = parse_csv_i64(env_str("ADMIN_USER_IDS"));
        if admin_user_ids.is_empty() {
            return Err(Error::Config(
                "ADMIN_USER_IDS environment variable is required".to_string(),
            ));
        }

        let database_path = env_path("DATABASE_PATH").unwrap_or_else(|| PathBuf::from("peb.db"));

        // Queue constants
        let queue_poll_interval = Duration::from_secs(env_u64("QUEUE_POLL_SECS").unwrap_or(5));
        let queue_error_backoff =
            Duration::from_secs(env_u64("QUEUE_ERROR_BACKOFF_SECS").unwrap_or(10));
        let queue_batch_size = env_usize("QUEUE_BATCH_SIZE").unwrap_or(10);
        let result_max_len = env_usize("RESULT_MAX_LEN").unwrap_or(2900);

        // Forwarding
        let max_forward_delay =
            Duration::from_secs(env_u64("MAX_FORWARD_DELAY_SECS").unwrap_or(3600));

        Ok(Self {
            telegram_bot_token,
            admin_user_ids,
            database_path,
            queue_poll_interval,
            queue_error_backoff,
            queue_batch_size,
            result_max_len,
            max_forward_delay,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        env::set_var(key, val);
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_csv_ids() {
        let ids = parse_csv_i64(Some(" 1, 2,,x, -1001234 ".to_string()));
        assert_eq!(ids, vec![1, 2, -1001234]);
    }

    #[test]
    fn missing_csv_is_empty() {
        assert!(parse_csv_i64(None).is_empty());
    }
}
