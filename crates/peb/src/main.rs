use std::sync::Arc;

use peb_core::{config::Config, rules::RuleStore, storage::StoragePort};
use peb_storage::SqliteStore;

#[tokio::main]
async fn main() -> Result<(), peb_core::Error> {
    peb_core::logging::init("peb")?;

    let cfg = Arc::new(Config::load()?);

    let store: Arc<dyn StoragePort> = Arc::new(
        SqliteStore::connect(&cfg.database_path.to_string_lossy()).await?,
    );

    let rules = Arc::new(RuleStore::new(store.clone(), &cfg.admin_user_ids));
    rules.load_all().await?;

    peb_telegram::router::run_polling(cfg, rules, store)
        .await
        .map_err(|e| peb_core::Error::Telegram(format!("bot failed: {e}")))?;

    Ok(())
}
