//! Transport-free view of an incoming message
//!
//! Extracted once per update so eligibility, routing and reply-chain rules
//! stay pure functions over plain data.

use crate::storage::{ChatRecord, UserKey};
use teloxide::types::Message;

/// The message fields the handlers operate on
#[derive(Debug, Clone)]
pub struct InboundMessage {
    /// Sender id
    pub sender_id: i64,
    /// Sender display name, username when set, else first name
    pub sender_name: String,
    /// True when the sender is a bot account
    pub sender_is_bot: bool,
    /// Chat id
    pub chat_id: i64,
    /// Group title when the chat has one
    pub chat_title: Option<String>,
    /// True for one-on-one chats
    pub is_private: bool,
    /// Message text
    pub text: Option<String>,
    /// Photo caption
    pub caption: Option<String>,
    /// True when a photo is attached
    pub has_photo: bool,
    /// True when a voice note is attached
    pub has_voice: bool,
    /// Replied-to message, when present
    pub reply: Option<Box<InboundMessage>>,
}

impl InboundMessage {
    /// Extract the handler view from a Telegram message
    ///
    /// Returns `None` when the sender identity is missing.
    #[must_use]
    pub fn from_message(msg: &Message) -> Option<Self> {
        let from = msg.from.as_ref()?;
        let reply = msg
            .reply_to_message()
            .and_then(Self::from_message)
            .map(Box::new);

        Some(Self {
            sender_id: from.id.0.cast_signed(),
            sender_name: from
                .username
                .clone()
                .unwrap_or_else(|| from.first_name.clone()),
            sender_is_bot: from.is_bot,
            chat_id: msg.chat.id.0,
            chat_title: msg.chat.title().map(ToString::to_string),
            is_private: msg.chat.is_private(),
            text: msg.text().map(ToString::to_string),
            caption: msg.caption().map(ToString::to_string),
            has_photo: msg.photo().is_some_and(|p| !p.is_empty()),
            has_voice: msg.voice().is_some(),
            reply,
        })
    }

    /// True when the message carries content the bot can handle
    #[must_use]
    pub const fn is_processable(&self) -> bool {
        self.text.is_some() || (self.has_photo && self.caption.is_some()) || self.has_voice
    }

    /// Storage key identity of the sender
    #[must_use]
    pub fn user_key(&self) -> UserKey {
        UserKey::new(self.sender_id, &self.sender_name)
    }

    /// Lower-cased message text, ignoring captions
    #[must_use]
    pub fn normalized_text(&self) -> Option<String> {
        self.text.as_deref().map(str::to_lowercase)
    }

    /// Lower-cased photo caption
    #[must_use]
    pub fn normalized_caption(&self) -> Option<String> {
        self.caption.as_deref().map(str::to_lowercase)
    }

    /// True when this replies to a message sent by a bot account
    #[must_use]
    pub fn replies_to_bot(&self) -> bool {
        self.reply.as_deref().is_some_and(|r| r.sender_is_bot)
    }

    /// One context record derived from the replied-to message
    ///
    /// The parent's text becomes an assistant record when the parent was
    /// sent by a bot, else a user record. `None` when there is no reply or
    /// the parent has no text.
    #[must_use]
    pub fn reply_seed(&self) -> Option<ChatRecord> {
        let parent = self.reply.as_deref()?;
        let content = parent.text.as_deref().or(parent.caption.as_deref())?;
        Some(if parent.sender_is_bot {
            ChatRecord::assistant(content)
        } else {
            ChatRecord::user(content)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Role;
    use crate::testing::inbound_text;

    #[test]
    fn test_processable_content_kinds() {
        let text = inbound_text(Some("привет"));
        assert!(text.is_processable());

        let mut photo_no_caption = inbound_text(None);
        photo_no_caption.has_photo = true;
        assert!(!photo_no_caption.is_processable());

        let mut photo_with_caption = inbound_text(None);
        photo_with_caption.has_photo = true;
        photo_with_caption.caption = Some("измени фон".to_string());
        assert!(photo_with_caption.is_processable());

        let mut voice = inbound_text(None);
        voice.has_voice = true;
        assert!(voice.is_processable());

        assert!(!inbound_text(None).is_processable());
    }

    #[test]
    fn test_normalized_text_lowercases() {
        let msg = inbound_text(Some("БОТ, Нарисуй Кота"));
        assert_eq!(msg.normalized_text().as_deref(), Some("бот, нарисуй кота"));
        assert_eq!(msg.normalized_caption(), None);
    }

    #[test]
    fn test_reply_seed_role_follows_parent_sender() {
        let mut parent = inbound_text(Some("ответ бота"));
        parent.sender_is_bot = true;
        let mut msg = inbound_text(Some("продолжи"));
        msg.reply = Some(Box::new(parent));

        let seed = msg.reply_seed().expect("seed");
        assert_eq!(seed.role, Role::Assistant);
        assert_eq!(seed.content, "ответ бота");
        assert!(msg.replies_to_bot());

        let parent = inbound_text(Some("вопрос человека"));
        let mut msg = inbound_text(Some("а ты что думаешь?"));
        msg.reply = Some(Box::new(parent));

        let seed = msg.reply_seed().expect("seed");
        assert_eq!(seed.role, Role::User);
        assert!(!msg.replies_to_bot());
    }

    #[test]
    fn test_reply_seed_requires_parent_content() {
        let mut parent = inbound_text(None);
        parent.has_photo = true;
        let mut msg = inbound_text(Some("что это?"));
        msg.reply = Some(Box::new(parent));
        assert!(msg.reply_seed().is_none());
    }

    #[test]
    fn test_user_key_uses_sender_identity() {
        let msg = inbound_text(Some("hi"));
        assert_eq!(msg.user_key().storage_key(), "tester_100");
    }
}
