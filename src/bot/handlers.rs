//! Command and message handlers
//!
//! The per-message pipeline: eligibility, access control, trigger
//! dispatch, the private chat flow with history and summarization, the
//! group flows and the image and voice sub-flows.
//!
//! Group conversations are never persisted; only private chats read and
//! write the per-user history.

use crate::bot::access::AccessPolicy;
use crate::bot::inbound::InboundMessage;
use crate::bot::media;
use crate::bot::messaging::send_long_message;
use crate::bot::triggers::{TriggerAction, TriggerRouter};
use crate::config::Settings;
use crate::llm::AiBackend;
use crate::storage::{ChatRecord, HistoryStore, UserKey};
use anyhow::Result;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, ChatId, InputFile, PhotoSize};
use teloxide::utils::command::BotCommands;
use tracing::{debug, info, warn};

/// Fixed instruction for the summarization request
const SUMMARIZE_INSTRUCTION: &str =
    "Обобщи этот разговор не более чем в 700 символах или меньше.";
const LIMIT_REACHED_NOTICE: &str = "Достигнут лимит токенов. Диалог обобщен.";
const RESET_NOTICE: &str = "Диалог сброшен.";
const EMPTY_CONTEXT_NOTICE: &str = "Нет сообщений в контексте.";
const ACCESS_DENIED_NOTICE: &str = "Вам не разрешено использовать этого бота.";
const IMAGE_PROMPT_HINT: &str =
    "Добавьте описание картинки после команды, например: /image кот в сапогах.";

/// Supported bot commands
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Поддерживаемые команды:")]
pub enum Command {
    /// Show the command list
    #[command(description = "Показать справку.")]
    Help,
    /// Show the stored message and token counts
    #[command(description = "Показать количество сообщений и токенов.")]
    Info,
    /// Summarize the conversation now
    #[command(description = "Обобщить диалог.")]
    Summ,
    /// Clear the stored conversation
    #[command(description = "Сбросить диалог.")]
    Reset,
    /// Generate an image from the given description
    #[command(description = "Создать картинку по описанию.")]
    Image(String),
}

/// Outcome of the backend exchange for one private turn
#[derive(Debug)]
enum TurnReply {
    /// Assistant reply to chunk and send
    Answer(String),
    /// User-visible error text; history was left untouched
    Failure(String),
}

/// Dispatch one parsed command
///
/// `/image` works in any chat; the rest are private-chat only and are
/// silently ignored elsewhere.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent or the history store fails.
pub async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    access: Arc<AccessPolicy>,
) -> Result<()> {
    let Some(inbound) = InboundMessage::from_message(&msg) else {
        return Ok(());
    };

    if let Command::Image(prompt) = &cmd {
        return image_command(&bot, msg.chat.id, &inbound, &access, &*ai, prompt).await;
    }

    if !inbound.is_private {
        return Ok(());
    }
    if !access.user_allowed(inbound.sender_id, &inbound.sender_name) {
        warn!(
            "Access denied for user {} ({})",
            inbound.sender_id, inbound.sender_name
        );
        bot.send_message(msg.chat.id, ACCESS_DENIED_NOTICE).await?;
        return Ok(());
    }

    let user = inbound.user_key();
    match cmd {
        Command::Help => {
            bot.send_message(msg.chat.id, Command::descriptions().to_string())
                .await?;
        }
        Command::Info => {
            let history = store.load(&user).await?;
            let tokens = ai.count_tokens(&history);
            bot.send_message(
                msg.chat.id,
                format!(
                    "Количество сообщений: {}\nКоличество токенов: {}",
                    history.len(),
                    tokens
                ),
            )
            .await?;
        }
        Command::Summ => {
            let history = store.load(&user).await?;
            if history.is_empty() {
                bot.send_message(msg.chat.id, EMPTY_CONTEXT_NOTICE).await?;
            } else {
                let notice = summarize_and_notice(&*store, &*ai, &user, &history).await;
                bot.send_message(msg.chat.id, notice).await?;
            }
        }
        Command::Reset => {
            store.clear(&user).await?;
            info!("History cleared for user {}", user.id);
            bot.send_message(msg.chat.id, RESET_NOTICE).await?;
        }
        Command::Image(_) => {}
    }
    Ok(())
}

/// Private text and photo handler
///
/// # Errors
///
/// Returns an error if a reply cannot be sent or the history store fails.
pub async fn handle_private_message(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    triggers: Arc<TriggerRouter>,
    access: Arc<AccessPolicy>,
) -> Result<()> {
    let Some(inbound) = InboundMessage::from_message(&msg) else {
        return Ok(());
    };
    if !inbound.is_processable() {
        return Ok(());
    }
    if !access.user_allowed(inbound.sender_id, &inbound.sender_name) {
        warn!(
            "Access denied for user {} ({})",
            inbound.sender_id, inbound.sender_name
        );
        bot.send_message(msg.chat.id, ACCESS_DENIED_NOTICE).await?;
        return Ok(());
    }

    if inbound.has_photo {
        if let Some(caption) = inbound.normalized_caption() {
            if let Some(action) = triggers.classify_caption(&caption) {
                let prompt = triggers.strip_trigger(action, &caption);
                let photos = msg.photo().unwrap_or_default();
                return dispatch_photo_action(
                    &bot,
                    msg.chat.id,
                    &settings,
                    &*ai,
                    action,
                    photos,
                    &prompt,
                )
                .await;
            }
            debug!("Photo caption without trigger ignored");
        }
        return Ok(());
    }

    let Some(text) = inbound.text.clone() else {
        return Ok(());
    };
    private_chat_flow(&bot, msg.chat.id, &inbound, &*store, &*ai, &text).await
}

/// Group and supergroup message handler
///
/// Only plain text participates: a matching trigger dispatches it, an
/// untriggered reply to the bot continues that exchange, everything else
/// is ignored. Nothing here touches the history store.
///
/// # Errors
///
/// Returns an error if a reply cannot be sent.
pub async fn handle_group_message(
    bot: Bot,
    msg: Message,
    settings: Arc<Settings>,
    ai: Arc<dyn AiBackend>,
    triggers: Arc<TriggerRouter>,
    access: Arc<AccessPolicy>,
) -> Result<()> {
    let Some(inbound) = InboundMessage::from_message(&msg) else {
        return Ok(());
    };
    let Some(text) = inbound.normalized_text() else {
        return Ok(());
    };
    if !access.group_allowed(inbound.chat_id, inbound.chat_title.as_deref()) {
        warn!(
            "Access denied for group {} ({:?})",
            inbound.chat_id, inbound.chat_title
        );
        bot.send_message(msg.chat.id, ACCESS_DENIED_NOTICE).await?;
        return Ok(());
    }

    if let Some(action) = triggers.classify_text(&text) {
        return match action {
            TriggerAction::ImageCreate => {
                let prompt = triggers.strip_trigger(action, &text);
                image_create_flow(&bot, msg.chat.id, &*ai, &prompt).await
            }
            _ => group_chat_flow(&bot, msg.chat.id, &inbound, &*ai, &text).await,
        };
    }

    // Untriggered messages only continue an exchange the bot is part of.
    if inbound.replies_to_bot() {
        let parent_photos = msg.reply_to_message().and_then(Message::photo);
        if let Some(photos) = parent_photos {
            return image_edit_flow(&bot, msg.chat.id, &settings, &*ai, photos, &text).await;
        }
        return group_chat_flow(&bot, msg.chat.id, &inbound, &*ai, &text).await;
    }

    debug!("Untriggered group message ignored in chat {}", inbound.chat_id);
    Ok(())
}

/// Private voice message handler
///
/// # Errors
///
/// Returns an error if a reply cannot be sent or the history store fails.
pub async fn handle_private_voice(
    bot: Bot,
    msg: Message,
    store: Arc<dyn HistoryStore>,
    ai: Arc<dyn AiBackend>,
    access: Arc<AccessPolicy>,
) -> Result<()> {
    let Some(inbound) = InboundMessage::from_message(&msg) else {
        return Ok(());
    };
    if !access.user_allowed(inbound.sender_id, &inbound.sender_name) {
        warn!(
            "Access denied for user {} ({})",
            inbound.sender_id, inbound.sender_name
        );
        bot.send_message(msg.chat.id, ACCESS_DENIED_NOTICE).await?;
        return Ok(());
    }
    let Some(voice) = msg.voice() else {
        return Ok(());
    };

    send_action(&bot, msg.chat.id, ChatAction::Typing).await;

    let tag = format!("{}_{}", msg.chat.id.0, msg.id.0);
    match media::transcribe_voice(&bot, &*ai, voice, &tag).await {
        Ok(transcript) => {
            debug!(
                "Voice message transcribed for user {}: {} chars",
                inbound.sender_id,
                transcript.chars().count()
            );
            private_chat_flow(&bot, msg.chat.id, &inbound, &*store, &*ai, &transcript).await
        }
        Err(e) => {
            warn!("Voice pipeline failed for user {}: {}", inbound.sender_id, e);
            bot.send_message(
                msg.chat.id,
                format!("Ошибка при обработке голосового сообщения: {e}"),
            )
            .await?;
            Ok(())
        }
    }
}

/// Private chat flow: summary check, completion, append, chunked reply
async fn private_chat_flow(
    bot: &Bot,
    chat_id: ChatId,
    inbound: &InboundMessage,
    store: &dyn HistoryStore,
    ai: &dyn AiBackend,
    text: &str,
) -> Result<()> {
    send_action(bot, chat_id, ChatAction::Typing).await;

    let user = inbound.user_key();
    let (notice, reply) = run_private_turn(store, ai, &user, text).await?;

    if let Some(notice) = notice {
        bot.send_message(chat_id, notice).await?;
    }
    match reply {
        TurnReply::Answer(response) => send_long_message(bot, chat_id, &response).await?,
        TurnReply::Failure(error_text) => {
            bot.send_message(chat_id, error_text).await?;
        }
    }
    Ok(())
}

/// One private chat turn without transport concerns.
///
/// Returns the summary notice to deliver first, if any, and the reply.
/// History records are appended only after a successful completion, the
/// user record first, then the assistant record.
async fn run_private_turn(
    store: &dyn HistoryStore,
    ai: &dyn AiBackend,
    user: &UserKey,
    text: &str,
) -> Result<(Option<String>, TurnReply)> {
    let (history, notice) = load_with_budget_check(store, ai, user).await?;

    let mut context = Vec::with_capacity(history.len() + 1);
    context.extend(history);
    context.push(ChatRecord::user(text));

    match ai.chat_completion(&context, user.id).await {
        Ok(response) => {
            store.append(user, ChatRecord::user(text)).await?;
            store.append(user, ChatRecord::assistant(&response)).await?;
            Ok((notice, TurnReply::Answer(response)))
        }
        Err(e) => {
            warn!("Chat completion failed for user {}: {}", user.id, e);
            Ok((
                notice,
                TurnReply::Failure(format!("Ошибка при отправке сообщения: {e}")),
            ))
        }
    }
}

/// Load the history, summarizing first when it is over the token budget.
///
/// Returns the history to build context from and the notice to show the
/// user when a summarization ran. A failed summarization keeps the
/// original records and reports the error text instead.
async fn load_with_budget_check(
    store: &dyn HistoryStore,
    ai: &dyn AiBackend,
    user: &UserKey,
) -> Result<(Vec<ChatRecord>, Option<String>)> {
    let history = store.load(user).await?;
    if history.is_empty() {
        return Ok((history, None));
    }

    let tokens = ai.count_tokens(&history);
    if !ai.needs_summarization(tokens) {
        return Ok((history, None));
    }

    debug!("Token budget reached for user {} ({} tokens)", user.id, tokens);
    let notice = summarize_and_notice(store, ai, user, &history).await;
    let refreshed = store.load(user).await?;
    Ok((refreshed, Some(notice)))
}

/// Run a summarization and produce the user-facing notice for it
async fn summarize_and_notice(
    store: &dyn HistoryStore,
    ai: &dyn AiBackend,
    user: &UserKey,
    history: &[ChatRecord],
) -> String {
    match run_summarization(store, ai, user, history).await {
        Ok(notice) => notice,
        Err(e) => {
            warn!("Summarization failed for user {}: {}", user.id, e);
            format!("Ошибка при обобщении диалога: {e}")
        }
    }
}

/// Request a summary and atomically replace the stored history with it
async fn run_summarization(
    store: &dyn HistoryStore,
    ai: &dyn AiBackend,
    user: &UserKey,
    history: &[ChatRecord],
) -> Result<String> {
    let request = summary_request(history);
    let summary = ai.chat_completion(&request, user.id).await?;
    store.summarize(user, &summary).await?;
    info!("History summarized for user {}", user.id);
    Ok(LIMIT_REACHED_NOTICE.to_string())
}

/// Build the fixed two-record summarization request
fn summary_request(history: &[ChatRecord]) -> Vec<ChatRecord> {
    let dump = serde_json::to_string(history).unwrap_or_default();
    vec![
        ChatRecord::assistant(SUMMARIZE_INSTRUCTION),
        ChatRecord::user(&dump),
    ]
}

/// Group chat flow: reply-seeded context, completion, chunked reply
async fn group_chat_flow(
    bot: &Bot,
    chat_id: ChatId,
    inbound: &InboundMessage,
    ai: &dyn AiBackend,
    text: &str,
) -> Result<()> {
    send_action(bot, chat_id, ChatAction::Typing).await;

    let mut context = Vec::with_capacity(2);
    if let Some(seed) = inbound.reply_seed() {
        context.push(seed);
    }
    context.push(ChatRecord::user(text));

    match ai.chat_completion(&context, inbound.sender_id).await {
        Ok(response) => send_long_message(bot, chat_id, &response).await,
        Err(e) => {
            warn!("Group completion failed in chat {}: {}", inbound.chat_id, e);
            bot.send_message(chat_id, format!("Ошибка при отправке сообщения: {e}"))
                .await?;
            Ok(())
        }
    }
}

/// The `/image` command flow, allowed in both private and group chats
async fn image_command(
    bot: &Bot,
    chat_id: ChatId,
    inbound: &InboundMessage,
    access: &AccessPolicy,
    ai: &dyn AiBackend,
    prompt: &str,
) -> Result<()> {
    let allowed = if inbound.is_private {
        access.user_allowed(inbound.sender_id, &inbound.sender_name)
    } else {
        access.group_allowed(inbound.chat_id, inbound.chat_title.as_deref())
    };
    if !allowed {
        bot.send_message(chat_id, ACCESS_DENIED_NOTICE).await?;
        return Ok(());
    }

    let prompt = prompt.trim();
    if prompt.is_empty() {
        bot.send_message(chat_id, IMAGE_PROMPT_HINT).await?;
        return Ok(());
    }
    image_create_flow(bot, chat_id, ai, prompt).await
}

/// Route a matched photo caption to its image sub-flow
async fn dispatch_photo_action(
    bot: &Bot,
    chat_id: ChatId,
    settings: &Settings,
    ai: &dyn AiBackend,
    action: TriggerAction,
    photos: &[PhotoSize],
    prompt: &str,
) -> Result<()> {
    match action {
        TriggerAction::ImageEdit => {
            image_edit_flow(bot, chat_id, settings, ai, photos, prompt).await
        }
        // The backend offers no separate vision call; those captions are
        // dispatched as generation.
        TriggerAction::ImageVision | TriggerAction::ImageCreate => {
            image_create_flow(bot, chat_id, ai, prompt).await
        }
        TriggerAction::Chat => Ok(()),
    }
}

/// Image generation flow shared by triggers and the `/image` command
async fn image_create_flow(
    bot: &Bot,
    chat_id: ChatId,
    ai: &dyn AiBackend,
    prompt: &str,
) -> Result<()> {
    send_action(bot, chat_id, ChatAction::UploadPhoto).await;

    match ai.create_image(prompt).await {
        Ok(result) => reply_image_result(bot, chat_id, &result).await,
        Err(e) => {
            warn!("Image generation failed: {}", e);
            bot.send_message(chat_id, format!("Ошибка при создании картинки: {e}"))
                .await?;
            Ok(())
        }
    }
}

/// Image edit flow over the best-fitting photo variant
async fn image_edit_flow(
    bot: &Bot,
    chat_id: ChatId,
    settings: &Settings,
    ai: &dyn AiBackend,
    photos: &[PhotoSize],
    prompt: &str,
) -> Result<()> {
    send_action(bot, chat_id, ChatAction::UploadPhoto).await;

    match run_image_edit(bot, settings, ai, photos, prompt).await {
        Ok(result) => reply_image_result(bot, chat_id, &result).await,
        Err(e) => {
            warn!("Image edit failed: {}", e);
            bot.send_message(chat_id, format!("Ошибка при изменении картинки: {e}"))
                .await?;
            Ok(())
        }
    }
}

async fn run_image_edit(
    bot: &Bot,
    settings: &Settings,
    ai: &dyn AiBackend,
    photos: &[PhotoSize],
    prompt: &str,
) -> Result<String> {
    let target = settings.image_dimensions().map_err(anyhow::Error::from)?;
    let dims: Vec<(u32, u32)> = photos.iter().map(|p| (p.width, p.height)).collect();
    let Some(index) = media::pick_edit_variant(&dims, target) else {
        return Err(anyhow::anyhow!("no photo variant to edit"));
    };

    let bytes = media::download_file(bot, &photos[index].file).await?;
    let payload = media::prepare_edit_payload(&bytes, target)?;
    Ok(ai.edit_image(payload.image_png, payload.mask_png, prompt).await?)
}

/// Reply with a photo when the backend returned an URL, else relay as text
async fn reply_image_result(bot: &Bot, chat_id: ChatId, result: &str) -> Result<()> {
    if result.starts_with("http") {
        if let Ok(url) = result.parse::<reqwest::Url>() {
            bot.send_photo(chat_id, InputFile::url(url)).await?;
            return Ok(());
        }
    }
    bot.send_message(chat_id, result).await?;
    Ok(())
}

/// Chat action send, failures only logged
async fn send_action(bot: &Bot, chat_id: ChatId, action: ChatAction) {
    if let Err(e) = bot.send_chat_action(chat_id, action).await {
        debug!("Failed to send chat action: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{AiError, MockAiBackend};
    use crate::storage::{FileHistory, Role};
    use tempfile::TempDir;

    async fn temp_store(dir: &TempDir) -> FileHistory {
        FileHistory::new(dir.path()).await.expect("store")
    }

    #[test]
    fn test_summary_request_shape() {
        let history = vec![ChatRecord::user("вопрос"), ChatRecord::assistant("ответ")];
        let request = summary_request(&history);
        assert_eq!(request.len(), 2);
        assert_eq!(request[0].role, Role::Assistant);
        assert_eq!(request[0].content, SUMMARIZE_INSTRUCTION);
        assert_eq!(request[1].role, Role::User);
        assert!(request[1].content.contains("вопрос"));
        assert!(request[1].content.contains("ответ"));
    }

    #[tokio::test]
    async fn test_private_turn_appends_user_then_assistant() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(1, "alice");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|_| 10);
        ai.expect_needs_summarization().returning(|_| false);
        ai.expect_chat_completion()
            .withf(|records, _| records.len() == 1 && records[0].content == "hello")
            .returning(|_, _| Ok("hi there".to_string()));

        let (notice, reply) = run_private_turn(&store, &ai, &user, "hello")
            .await
            .expect("turn");
        assert!(notice.is_none());
        assert!(matches!(reply, TurnReply::Answer(ref r) if r == "hi there"));

        let history = store.load(&user).await.expect("load");
        assert_eq!(
            history,
            vec![ChatRecord::user("hello"), ChatRecord::assistant("hi there")]
        );
    }

    #[tokio::test]
    async fn test_backend_error_leaves_history_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(2, "bob");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|_| 10);
        ai.expect_needs_summarization().returning(|_| false);
        ai.expect_chat_completion()
            .returning(|_, _| Err(AiError::ApiError("boom".to_string())));

        let (_, reply) = run_private_turn(&store, &ai, &user, "hello")
            .await
            .expect("turn");
        assert!(matches!(reply, TurnReply::Failure(ref t) if t.contains("boom")));
        assert!(store.load(&user).await.expect("load").is_empty());
    }

    #[tokio::test]
    async fn test_context_includes_history_before_new_message() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(3, "carol");
        store
            .append(&user, ChatRecord::user("первый"))
            .await
            .expect("append");
        store
            .append(&user, ChatRecord::assistant("ответ"))
            .await
            .expect("append");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|_| 10);
        ai.expect_needs_summarization().returning(|_| false);
        ai.expect_chat_completion()
            .withf(|records, _| {
                records.len() == 3
                    && records[0].content == "первый"
                    && records[2].content == "второй"
            })
            .returning(|_, _| Ok("ещё ответ".to_string()));

        run_private_turn(&store, &ai, &user, "второй")
            .await
            .expect("turn");
        assert_eq!(store.load(&user).await.expect("load").len(), 4);
    }

    #[tokio::test]
    async fn test_over_budget_history_is_summarized_before_the_turn() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(4, "dave");
        store
            .append(&user, ChatRecord::user("очень длинная беседа"))
            .await
            .expect("append");
        store
            .append(&user, ChatRecord::assistant("длинный ответ"))
            .await
            .expect("append");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|records| records.len() * 3000);
        ai.expect_needs_summarization().returning(|count| count >= 4096);
        ai.expect_chat_completion()
            .withf(|records, _| records.first().is_some_and(|r| r.content == SUMMARIZE_INSTRUCTION))
            .returning(|_, _| Ok("краткий итог".to_string()));

        let (history, notice) = load_with_budget_check(&store, &ai, &user)
            .await
            .expect("check");
        assert_eq!(notice.as_deref(), Some(LIMIT_REACHED_NOTICE));
        assert_eq!(history, vec![ChatRecord::system("краткий итог")]);

        let stored = store.load(&user).await.expect("load");
        assert_eq!(stored, vec![ChatRecord::system("краткий итог")]);
    }

    #[tokio::test]
    async fn test_budget_crossed_mid_turn_summarizes_on_the_next_turn() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(7, "grace");
        store
            .append(&user, ChatRecord::user("старт"))
            .await
            .expect("append");

        let mut ai = MockAiBackend::new();
        // One stored record fits the budget, three do not.
        ai.expect_count_tokens().returning(|records| records.len() * 2000);
        ai.expect_needs_summarization().returning(|count| count >= 4096);
        ai.expect_chat_completion().returning(|records, _| {
            if records.first().is_some_and(|r| r.content == SUMMARIZE_INSTRUCTION) {
                Ok("итог".to_string())
            } else {
                Ok("ответ".to_string())
            }
        });

        // The turn that crosses the budget replies normally and appends.
        let (notice, _) = run_private_turn(&store, &ai, &user, "вопрос")
            .await
            .expect("turn");
        assert!(notice.is_none());
        let stored = store.load(&user).await.expect("load");
        assert_eq!(stored.len(), 3);
        assert_eq!(stored[0], ChatRecord::user("старт"));

        // The next turn summarizes the over-budget history before replying.
        let (notice, _) = run_private_turn(&store, &ai, &user, "ещё")
            .await
            .expect("turn");
        assert_eq!(notice.as_deref(), Some(LIMIT_REACHED_NOTICE));
        let stored = store.load(&user).await.expect("load");
        assert_eq!(stored[0], ChatRecord::system("итог"));
        assert_eq!(stored.len(), 3);
    }

    #[tokio::test]
    async fn test_under_budget_history_is_left_alone() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(5, "erin");
        store
            .append(&user, ChatRecord::user("привет"))
            .await
            .expect("append");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|_| 50);
        ai.expect_needs_summarization().returning(|_| false);

        let (history, notice) = load_with_budget_check(&store, &ai, &user)
            .await
            .expect("check");
        assert!(notice.is_none());
        assert_eq!(history, vec![ChatRecord::user("привет")]);
    }

    #[tokio::test]
    async fn test_failed_summarization_keeps_history() {
        let dir = TempDir::new().expect("tempdir");
        let store = temp_store(&dir).await;
        let user = UserKey::new(6, "frank");
        store
            .append(&user, ChatRecord::user("беседа"))
            .await
            .expect("append");

        let mut ai = MockAiBackend::new();
        ai.expect_count_tokens().returning(|_| 9000);
        ai.expect_needs_summarization().returning(|_| true);
        ai.expect_chat_completion()
            .returning(|_, _| Err(AiError::NetworkError("offline".to_string())));

        let (history, notice) = load_with_budget_check(&store, &ai, &user)
            .await
            .expect("check");
        assert!(notice.is_some_and(|n| n.contains("Ошибка при обобщении диалога")));
        assert_eq!(history, vec![ChatRecord::user("беседа")]);
    }
}
