use std::sync::Arc;

use arch_bot_commons::BotReplies;
use chrono::Utc;
use teloxide::{
    prelude::*,
    types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, Me, MessageId},
    RequestError,
};

use crate::{
    commands::{parse_command, Caller, Command, CommandParams, Reply, COMMANDS},
    database::Database,
};

/// Keyboard with a button for each command that has a menu label.
/// Pressing one sends its command name as callback data.
fn menu_keyboard() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(COMMANDS.iter().filter_map(|command| {
        let label = command.menu_label?;
        Some(vec![InlineKeyboardButton::callback(label, command.name())])
    }))
}

pub async fn handle_message(
    bot: Bot,
    me: Me,
    message: Message,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    // Channel posts and such don't have anyone to charge points to.
    let Some(user) = message.from.as_ref() else {
        return Ok(());
    };
    // Bot ignores messages made by itself.
    if user.id == me.id {
        return Ok(());
    }
    let Some(text) = message.text() else {
        return Ok(());
    };
    let Some((command, args)) = parse_command(text, me.username()) else {
        return Ok(());
    };

    let caller = Caller::from_user(user);
    run_and_reply(
        &bot,
        &database,
        command,
        &caller,
        args,
        message.chat.id,
        Some(message.id),
    )
    .await
}

/// Handles presses on the `/start` menu buttons.
pub async fn handle_callback_query(
    bot: Bot,
    query: CallbackQuery,
    database: Arc<Database>,
) -> Result<(), RequestError> {
    // Answer right away so the button stops spinning.
    bot.answer_callback_query(query.id.clone()).await?;

    let Some(command) = query.data.as_deref().and_then(Command::find) else {
        log::warn!("Unknown callback data: {:?}", query.data);
        return Ok(());
    };
    let Some(chat) = query.message.as_ref().map(|message| message.chat().id) else {
        // May happen if the menu message is too old.
        return Ok(());
    };

    let caller = Caller::from_user(&query.from);
    run_and_reply(&bot, &database, command, &caller, "", chat, None).await
}

async fn run_and_reply(
    bot: &Bot,
    database: &Database,
    command: &Command,
    caller: &Caller,
    args: &str,
    chat: ChatId,
    reply_to: Option<MessageId>,
) -> Result<(), RequestError> {
    log::debug!(
        "{:?} from {} (userid {})",
        command.kind,
        caller.display_name(),
        caller.id
    );

    let params = CommandParams {
        database,
        caller,
        args,
        now: Utc::now(),
    };

    let (text, keyboard) = match command.run(params).await {
        Ok(Ok(Reply::Text(text))) => (text, None),
        Ok(Ok(Reply::Menu(text))) => (text, Some(menu_keyboard())),
        Ok(Err(e)) => (e.to_string(), None),
        Err(e) => {
            log::error!(
                "Database error while running {:?} for userid {}: {}",
                command.kind,
                caller.id,
                e
            );
            (
                String::from("Something broke on our end. Please try again later."),
                None,
            )
        }
    };

    bot.reply_html(chat, &text, reply_to, keyboard).await?;
    Ok(())
}
