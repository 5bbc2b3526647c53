//! Trigger tables for message routing
//!
//! Ordered pattern tables classify group text and photo captions; the
//! first pattern matching at the start of the lower-cased text wins.
//! Text triggers put image generation before plain chat, photo triggers
//! go vision, then edit, then generation.

use crate::config::Settings;
use regex::Regex;

/// Action dispatched by a matched trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerAction {
    /// Forward to the chat completion flow
    Chat,
    /// Generate a new image from the remaining text
    ImageCreate,
    /// Edit the attached photo under the remaining caption
    ImageEdit,
    /// The caption asks about the attached photo
    ImageVision,
}

/// Compiled trigger tables
pub struct TriggerRouter {
    chat: Regex,
    image_create: Regex,
    image_edit: Regex,
    image_vision: Regex,
}

impl TriggerRouter {
    /// Compile the tables from the configured patterns
    ///
    /// # Errors
    ///
    /// Returns an error if any configured pattern is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self, regex::Error> {
        Ok(Self {
            chat: Regex::new(&settings.chat_trigger_regex)?,
            image_create: Regex::new(&settings.image_trigger_regex)?,
            image_edit: Regex::new(&settings.image_edit_trigger_regex)?,
            image_vision: Regex::new(&settings.image_vision_trigger_regex)?,
        })
    }

    /// Classify lower-cased group text
    #[must_use]
    pub fn classify_text(&self, normalized: &str) -> Option<TriggerAction> {
        let bindings = [
            (&self.image_create, TriggerAction::ImageCreate),
            (&self.chat, TriggerAction::Chat),
        ];
        classify(&bindings, normalized)
    }

    /// Classify a lower-cased photo caption
    #[must_use]
    pub fn classify_caption(&self, normalized: &str) -> Option<TriggerAction> {
        let bindings = [
            (&self.image_vision, TriggerAction::ImageVision),
            (&self.image_edit, TriggerAction::ImageEdit),
            (&self.image_create, TriggerAction::ImageCreate),
        ];
        classify(&bindings, normalized)
    }

    /// Strip the action's pattern from the text, yielding the prompt
    #[must_use]
    pub fn strip_trigger(&self, action: TriggerAction, normalized: &str) -> String {
        self.pattern_for(action)
            .replace(normalized, "")
            .trim()
            .to_string()
    }

    const fn pattern_for(&self, action: TriggerAction) -> &Regex {
        match action {
            TriggerAction::Chat => &self.chat,
            TriggerAction::ImageCreate => &self.image_create,
            TriggerAction::ImageEdit => &self.image_edit,
            TriggerAction::ImageVision => &self.image_vision,
        }
    }
}

fn classify(bindings: &[(&Regex, TriggerAction)], text: &str) -> Option<TriggerAction> {
    bindings
        .iter()
        .find(|(pattern, _)| matches_at_start(pattern, text))
        .map(|(_, action)| *action)
}

/// A trigger counts only when its first match starts the text
fn matches_at_start(pattern: &Regex, text: &str) -> bool {
    pattern.find(text).is_some_and(|m| m.start() == 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_settings;

    fn router_with(chat: &str, create: &str, edit: &str, vision: &str) -> TriggerRouter {
        let mut settings = test_settings();
        settings.chat_trigger_regex = chat.to_string();
        settings.image_trigger_regex = create.to_string();
        settings.image_edit_trigger_regex = edit.to_string();
        settings.image_vision_trigger_regex = vision.to_string();
        TriggerRouter::from_settings(&settings).expect("valid patterns")
    }

    #[test]
    fn test_prefix_match_not_whole_word() {
        let router = router_with("chat", "draw", "fix", "what is on");
        assert_eq!(router.classify_text("draw a cat"), Some(TriggerAction::ImageCreate));
        // The trigger word is a prefix of a longer token; it still matches.
        assert_eq!(router.classify_text("chatter box"), Some(TriggerAction::Chat));
    }

    #[test]
    fn test_match_must_start_the_text() {
        let router = router_with("chat", "draw", "fix", "what is on");
        assert_eq!(router.classify_text("please draw a cat"), None);
        assert_eq!(router.classify_text("i want to chat"), None);
    }

    #[test]
    fn test_image_generation_wins_over_chat() {
        let router = router_with("бот", "бот, нарисуй", "измени", "что на");
        // Both patterns match at the start; the image table entry is first.
        assert_eq!(
            router.classify_text("бот, нарисуй кота"),
            Some(TriggerAction::ImageCreate)
        );
        assert_eq!(
            router.classify_text("бот, как дела?"),
            Some(TriggerAction::Chat)
        );
    }

    #[test]
    fn test_caption_priority_vision_edit_create() {
        let router = router_with("бот", "нарисуй", "нарисуй заново", "нарисуй заново и опиши");
        // All three caption patterns match at the start; table order decides.
        assert_eq!(
            router.classify_caption("нарисуй заново и опиши сад"),
            Some(TriggerAction::ImageVision)
        );

        let router = router_with("бот", "создай", "измени", "что на");
        assert_eq!(
            router.classify_caption("что на картинке?"),
            Some(TriggerAction::ImageVision)
        );
        assert_eq!(
            router.classify_caption("измени фон"),
            Some(TriggerAction::ImageEdit)
        );
        assert_eq!(
            router.classify_caption("создай похожую"),
            Some(TriggerAction::ImageCreate)
        );
        assert_eq!(router.classify_caption("просто фото"), None);
    }

    #[test]
    fn test_strip_trigger_removes_prefix() {
        let router = router_with("бот,", "нарисуй", "измени", "что на");
        assert_eq!(
            router.strip_trigger(TriggerAction::ImageCreate, "нарисуй кота в сапогах"),
            "кота в сапогах"
        );
        assert_eq!(router.strip_trigger(TriggerAction::Chat, "бот, привет"), "привет");
    }
}
