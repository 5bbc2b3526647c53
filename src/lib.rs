#![deny(missing_docs)]
//! Telegram chat relay backed by an OpenAI-compatible API.
//!
//! Routes incoming messages through trigger tables to chat completion,
//! image generation, image editing and voice transcription flows, keeps
//! a per-user conversation history on disk and summarizes it when the
//! token budget is reached.

/// Telegram bot: access control, routing and handlers.
pub mod bot;
/// Configuration and settings management.
pub mod config;
/// AI backend client and token accounting.
pub mod llm;
/// Conversation history persistence.
pub mod storage;
/// Utility functions.
pub mod utils;

#[cfg(test)]
pub mod testing;
