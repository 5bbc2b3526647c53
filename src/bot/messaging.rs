//! Common messaging utilities for the Telegram bot.
//!
//! Replies are sent as plain text; anything over the length cap is split
//! into fixed-size parts sent in order.

use crate::utils;
use anyhow::Result;
use teloxide::prelude::*;
use teloxide::types::ChatId;

/// Maximum message length before a reply is split.
/// Telegram's official limit is 4096; 4000 leaves a safety margin.
pub const TELEGRAM_MESSAGE_LIMIT: usize = 4000;

/// Sends a reply, splitting it into multiple parts when too long.
///
/// Parts go out in their original order; a failed part aborts the
/// remainder.
///
/// # Errors
///
/// Returns an error if any part fails to send.
pub async fn send_long_message(bot: &Bot, chat_id: ChatId, text: &str) -> Result<()> {
    for part in utils::split_message(text, TELEGRAM_MESSAGE_LIMIT) {
        bot.send_message(chat_id, part).await?;
    }
    Ok(())
}
