//! AI backend client
//!
//! Chat completions go through the async-openai client. The image and
//! transcription endpoints are called over raw REST because they need
//! explicit size parameters and multipart bodies.

mod http_utils;
mod tokens;

pub use tokens::TokenCounter;

use crate::config::Settings;
use crate::storage::{ChatRecord, Role};
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs,
};
use async_openai::Client;
use async_trait::async_trait;
use http_utils::{
    create_http_client, extract_text_content, send_json_request, send_multipart_request,
};
use reqwest::multipart::{Form, Part};
use serde_json::json;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Default API base for the REST endpoints
const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
/// Model used for voice transcription
const TRANSCRIPTION_MODEL: &str = "whisper-1";
/// Prompt hinting the transcription language
const TRANSCRIPTION_PROMPT: &str = "Необходимо распознать речь";

/// Errors that can occur during backend operations
#[derive(Error, Debug)]
pub enum AiError {
    /// Error returned by the backend API
    #[error("API error: {0}")]
    ApiError(String),
    /// Error during network communication
    #[error("Network error: {0}")]
    NetworkError(String),
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    JsonError(String),
    /// Any other unexpected error
    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Interface to the generative backend
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AiBackend: Send + Sync {
    /// Generate a chat completion over the accumulated context
    async fn chat_completion(
        &self,
        records: &[ChatRecord],
        user_id: i64,
    ) -> Result<String, AiError>;

    /// Generate an image, returning the URL (or raw text) from the API
    async fn create_image(&self, prompt: &str) -> Result<String, AiError>;

    /// Edit an image under a full-canvas mask, returning the URL or text
    async fn edit_image(
        &self,
        image_png: Vec<u8>,
        mask_png: Vec<u8>,
        prompt: &str,
    ) -> Result<String, AiError>;

    /// Transcribe an audio file
    async fn transcribe(&self, audio: &Path) -> Result<String, AiError>;

    /// Count tokens for the given records
    fn count_tokens(&self, records: &[ChatRecord]) -> usize;

    /// True when a history of this size must be summarized
    fn needs_summarization(&self, token_count: usize) -> bool;
}

/// OpenAI-backed implementation of [`AiBackend`]
pub struct OpenAiClient {
    chat: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_base: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
    image_size: String,
    counter: TokenCounter,
}

impl OpenAiClient {
    /// Build the client from settings
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the configured image size is invalid.
    pub fn from_settings(settings: &Settings) -> Result<Self, config::ConfigError> {
        settings.image_dimensions()?;

        let mut chat_config = OpenAIConfig::new().with_api_key(settings.openai_api_key.clone());
        if let Some(base) = &settings.openai_api_base {
            chat_config = chat_config.with_api_base(base.clone());
        }
        let api_base = settings
            .openai_api_base
            .clone()
            .unwrap_or_else(|| OPENAI_API_BASE.to_string());

        Ok(Self {
            chat: Client::with_config(chat_config),
            http: create_http_client(),
            api_base,
            api_key: settings.openai_api_key.clone(),
            model: settings.chat_model_name.clone(),
            max_tokens: settings.max_tokens,
            temperature: settings.temperature,
            image_size: settings.image_size.clone(),
            counter: TokenCounter::new(settings.max_tokens as usize, settings.tokens_per_message),
        })
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.api_key)
    }

    fn png_part(bytes: Vec<u8>, file_name: &str) -> Result<Part, AiError> {
        Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("image/png")
            .map_err(|e| AiError::Unknown(e.to_string()))
    }
}

/// Map conversation records onto the wire message types
fn build_messages(records: &[ChatRecord]) -> Result<Vec<ChatCompletionRequestMessage>, AiError> {
    let mut messages = Vec::with_capacity(records.len());
    for record in records {
        let message = match record.role {
            Role::System => ChatCompletionRequestSystemMessageArgs::default()
                .content(record.content.clone())
                .build()
                .map_err(|e| AiError::Unknown(e.to_string()))?
                .into(),
            Role::User => ChatCompletionRequestUserMessageArgs::default()
                .content(record.content.clone())
                .build()
                .map_err(|e| AiError::Unknown(e.to_string()))?
                .into(),
            Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                .content(record.content.clone())
                .build()
                .map_err(|e| AiError::Unknown(e.to_string()))?
                .into(),
        };
        messages.push(message);
    }
    Ok(messages)
}

#[async_trait]
impl AiBackend for OpenAiClient {
    async fn chat_completion(
        &self,
        records: &[ChatRecord],
        user_id: i64,
    ) -> Result<String, AiError> {
        let messages = build_messages(records)?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(self.model.as_str())
            .messages(messages)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature)
            .user(user_id.to_string())
            .build()
            .map_err(|e| AiError::Unknown(e.to_string()))?;

        debug!(
            model = %self.model,
            records = records.len(),
            "Sending chat completion request"
        );

        let response = self
            .chat
            .chat()
            .create(request)
            .await
            .map_err(|e| AiError::ApiError(e.to_string()))?;

        response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| AiError::ApiError("Empty response".to_string()))
    }

    async fn create_image(&self, prompt: &str) -> Result<String, AiError> {
        let url = format!("{}/images/generations", self.api_base);
        let body = json!({
            "prompt": prompt,
            "n": 1,
            "size": self.image_size,
            "quality": "standard",
        });

        debug!(size = %self.image_size, "Sending image generation request");

        let response = send_json_request(&self.http, &url, &body, &self.auth_header()).await?;
        extract_text_content(&response, &["data", "0", "url"])
    }

    async fn edit_image(
        &self,
        image_png: Vec<u8>,
        mask_png: Vec<u8>,
        prompt: &str,
    ) -> Result<String, AiError> {
        let url = format!("{}/images/edits", self.api_base);
        let form = Form::new()
            .part("image", Self::png_part(image_png, "image.png")?)
            .part("mask", Self::png_part(mask_png, "mask.png")?)
            .text("prompt", prompt.to_string())
            .text("n", "1")
            .text("size", self.image_size.clone());

        debug!(size = %self.image_size, "Sending image edit request");

        let response = send_multipart_request(&self.http, &url, form, &self.auth_header()).await?;
        extract_text_content(&response, &["data", "0", "url"])
    }

    async fn transcribe(&self, audio: &Path) -> Result<String, AiError> {
        let bytes = tokio::fs::read(audio)
            .await
            .map_err(|e| AiError::Unknown(e.to_string()))?;
        let file_name = audio
            .file_name()
            .map_or_else(|| "voice.mp3".to_string(), |n| n.to_string_lossy().into_owned());

        let url = format!("{}/audio/transcriptions", self.api_base);
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/mpeg")
            .map_err(|e| AiError::Unknown(e.to_string()))?;
        let form = Form::new()
            .part("file", part)
            .text("model", TRANSCRIPTION_MODEL)
            .text("prompt", TRANSCRIPTION_PROMPT);

        let response = send_multipart_request(&self.http, &url, form, &self.auth_header()).await?;
        extract_text_content(&response, &["text"])
    }

    fn count_tokens(&self, records: &[ChatRecord]) -> usize {
        self.counter.count(records)
    }

    fn needs_summarization(&self, token_count: usize) -> bool {
        self.counter.over_budget(token_count)
    }
}
