use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::{info, warn};

use peb_core::{
    commands::CommandExecutor, config::Config, forward::ForwardScheduler,
    messaging::port::MessagingPort, queue::CommandQueueProcessor, rules::RuleStore,
    storage::StoragePort,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub rules: Arc<RuleStore>,
    pub forwarder: ForwardScheduler,
    pub messenger: Arc<dyn MessagingPort>,
    pub executor: CommandExecutor,
}

/// Wire everything up and long-poll until shutdown.
pub async fn run_polling(
    cfg: Arc<Config>,
    rules: Arc<RuleStore>,
    store: Arc<dyn StoragePort>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = me.username(), "bot started"),
        Err(e) => warn!(error = %e, "get_me failed at startup"),
    }
    info!(
        admins = cfg.admin_user_ids.len(),
        database = %cfg.database_path.display(),
        "configuration loaded"
    );

    let messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let forwarder = ForwardScheduler::new(rules.clone(), messenger.clone());
    let executor = CommandExecutor::new(rules.clone(), forwarder.clone(), cfg.max_forward_delay);

    let processor = Arc::new(CommandQueueProcessor::new(store, executor.clone(), &cfg));
    let (queue_cancel, queue_handle) = processor.spawn();

    let state = Arc::new(AppState {
        cfg,
        rules,
        forwarder,
        messenger,
        executor,
    });

    let handler = dptree::entry()
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_edited_channel_post))
        .branch(Update::filter_message().endpoint(handlers::handle_private_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    queue_cancel.cancel();
    let _ = queue_handle.await;

    Ok(())
}
