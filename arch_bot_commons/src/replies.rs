use std::{future::Future, time::Duration};

use teloxide::{
    payloads::SendMessageSetters,
    requests::Requester,
    sugar::request::RequestReplyExt,
    types::{ChatId, InlineKeyboardMarkup, Message, MessageId, ParseMode},
    Bot, RequestError,
};

/// Telegram refuses messages longer than this.
pub const MESSAGE_LENGTH_LIMIT: usize = 4096;

/// How many times to try sending a single chunk before giving up.
const SEND_ATTEMPTS: u8 = 3;

pub trait BotReplies {
    /// Opinionated method to reply with an HTML-formatted message.
    ///
    /// Splits the text into several messages on line boundaries if it's
    /// longer than [`MESSAGE_LENGTH_LIMIT`], and retries each one if Telegram
    /// tells us to wait. The `keyboard`, if any, is attached to the last one.
    fn reply_html(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> impl Future<Output = Result<Vec<Message>, RequestError>> + Send;
}

impl BotReplies for Bot {
    async fn reply_html(
        &self,
        chat: ChatId,
        text: &str,
        reply_to: Option<MessageId>,
        keyboard: Option<InlineKeyboardMarkup>,
    ) -> Result<Vec<Message>, RequestError> {
        let chunks = split_into_chunks(text, MESSAGE_LENGTH_LIMIT);
        let last = chunks.len().saturating_sub(1);
        let mut sent = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.into_iter().enumerate() {
            let mut attempt: u8 = 0;
            let message = loop {
                attempt += 1;

                let mut request = self.send_message(chat, chunk).parse_mode(ParseMode::Html);
                if let Some(reply_to) = reply_to {
                    request = request.reply_to(reply_to);
                }
                if i == last {
                    if let Some(keyboard) = &keyboard {
                        request = request.reply_markup(keyboard.clone());
                    }
                }

                match request.await {
                    Ok(message) => break message,
                    Err(RequestError::RetryAfter(wait)) if attempt < SEND_ATTEMPTS => {
                        log::warn!("Flood wait for {:?} while replying to {}", wait, chat);
                        tokio::time::sleep(wait.duration()).await;
                    }
                    Err(RequestError::Network(e)) if attempt < SEND_ATTEMPTS => {
                        log::warn!("Network error while replying to {}: {}", chat, e);
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                    Err(e) => return Err(e),
                }
            };
            sent.push(message);
        }

        Ok(sent)
    }
}

/// Splits `text` into pieces no longer than `limit` bytes.
///
/// Prefers cutting on newlines, then on spaces, and only then mid-word.
/// Never cuts inside a UTF-8 character or an HTML entity like `&amp;`.
/// Empty text yields a single empty chunk.
#[must_use]
pub fn split_into_chunks(text: &str, limit: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;

    while rest.len() > limit {
        let cut = find_cut(rest, limit);
        let (chunk, tail) = rest.split_at(cut);
        let chunk = chunk.trim_end();
        if !chunk.is_empty() {
            chunks.push(chunk);
        }
        rest = tail.trim_start_matches(['\n', ' ']);
    }

    if !rest.is_empty() || chunks.is_empty() {
        chunks.push(rest);
    }

    chunks
}

/// Finds where to cut `text` so that the first part fits in `limit` bytes.
fn find_cut(text: &str, limit: usize) -> usize {
    let mut hard = limit;
    while !text.is_char_boundary(hard) {
        hard -= 1;
    }
    let window = &text[..hard];

    // Keep the cut from landing at the very start, or we'd never progress.
    if let Some(newline) = window.rfind('\n').filter(|&i| i > 0) {
        return newline;
    }
    if let Some(space) = window.rfind(' ').filter(|&i| i > 0) {
        return space;
    }

    // Mid-word. Back off if that would split an entity.
    if let Some(amp) = window.rfind('&') {
        if amp > 0 && !window[amp..].contains(';') {
            return amp;
        }
    }

    // A single character wider than the limit. Take it whole anyway.
    if hard == 0 {
        return text.chars().next().map_or(text.len(), char::len_utf8);
    }

    hard
}
