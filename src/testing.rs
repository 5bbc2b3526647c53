//! Shared test fixtures.

use crate::bot::inbound::InboundMessage;
use crate::config::Settings;

/// Settings filled with the documented defaults and dummy credentials
#[must_use]
pub fn test_settings() -> Settings {
    Settings {
        telegram_token: "123456789:TEST".to_string(),
        openai_api_key: "sk-test".to_string(),
        openai_api_base: None,
        chat_model_name: "gpt-4o-mini".to_string(),
        max_tokens: 4096,
        temperature: 0.7,
        image_size: "512x512".to_string(),
        tokens_per_message: 3,
        chat_trigger_regex: "бот,".to_string(),
        image_trigger_regex: "нарисуй".to_string(),
        image_edit_trigger_regex: "измени".to_string(),
        image_vision_trigger_regex: "что на".to_string(),
        group_whitelist: Vec::new(),
        group_blacklist: Vec::new(),
        user_whitelist: Vec::new(),
        user_blacklist: Vec::new(),
        history_dir: "./history".to_string(),
    }
}

/// Private-chat inbound message fixture; fields are adjusted per test
#[must_use]
pub fn inbound_text(text: Option<&str>) -> InboundMessage {
    InboundMessage {
        sender_id: 100,
        sender_name: "tester".to_string(),
        sender_is_bot: false,
        chat_id: 100,
        chat_title: None,
        is_private: true,
        text: text.map(ToString::to_string),
        caption: None,
        has_photo: false,
        has_voice: false,
        reply: None,
    }
}
