use std::sync::Arc;
use teloxide::{dptree::deps, prelude::*};

use crate::{commands::Command, config::Config, database::Database, handlers};

/// # Panics
///
/// Panics if there's no bot token or the database can't be opened.
pub async fn entry() {
    log::info!("ASYNC WOOOO");
    let config = Config::load().expect("Could not load the config!");

    let bot = Bot::new(config.bot_token);

    bot.set_my_commands(Command::generate_bot_commands())
        .await
        .expect("Failed to set bot commands!");

    let database = Arc::new(
        Database::new(&config.database_path)
            .await
            .expect("Failed to open the database!"),
    );

    log::info!("Creating the handler...");

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_callback_query().endpoint(handlers::handle_callback_query));

    log::info!("Dispatching the dispatcher!");

    Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .dependencies(deps![database])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("it appears we have been bonked.");
}
