//! Conversation history persistence
//!
//! One JSON file per user under the configured history directory. Every
//! mutation rewrites the file through a temp-file-and-rename cycle, so a
//! reader never observes partial state. Callers serialize writes per user;
//! concurrent writers for the same user are not supported.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

/// Errors that can occur during history storage operations
#[derive(Error, Debug)]
pub enum StorageError {
    /// Error during JSON serialization or deserialization
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    /// Standard I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Author of a conversation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The chatting user
    User,
    /// The model
    Assistant,
    /// Synthetic records such as summaries
    System,
}

impl Role {
    /// Role name as sent on the wire
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// A role-tagged record in a conversation history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRecord {
    /// Author of the record
    pub role: Role,
    /// Text content
    pub content: String,
}

impl ChatRecord {
    /// Create a user record
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self {
            role: Role::User,
            content: content.to_string(),
        }
    }

    /// Create an assistant record
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self {
            role: Role::Assistant,
            content: content.to_string(),
        }
    }

    /// Create a system record
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self {
            role: Role::System,
            content: content.to_string(),
        }
    }
}

/// Identity of one conversation owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserKey {
    /// Telegram user id
    pub id: i64,
    /// Display name used in the storage key
    pub name: String,
}

impl UserKey {
    /// Create a key from an id and a display name
    #[must_use]
    pub fn new(id: i64, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }

    /// File stem for this user's history, `{name}_{id}`
    ///
    /// Name characters outside `[A-Za-z0-9_-]` are replaced so the key is
    /// always a single path component.
    #[must_use]
    pub fn storage_key(&self) -> String {
        let safe: String = self
            .name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}_{}", safe, self.id)
    }
}

/// Interface for conversation history stores
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the stored history for a user, empty when none exists
    async fn load(&self, user: &UserKey) -> Result<Vec<ChatRecord>, StorageError>;

    /// Append one record, durably persisted before returning
    async fn append(&self, user: &UserKey, record: ChatRecord) -> Result<(), StorageError>;

    /// Remove the stored history; absence is not an error
    async fn clear(&self, user: &UserKey) -> Result<(), StorageError>;

    /// Atomically replace the history with a single system record
    async fn summarize(&self, user: &UserKey, summary: &str) -> Result<(), StorageError>;
}

/// File-backed history store, one JSON file per user
pub struct FileHistory {
    dir: PathBuf,
}

impl FileHistory {
    /// Create the store, creating the history directory if needed
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub async fn new(dir: &Path) -> Result<Self, StorageError> {
        tokio::fs::create_dir_all(dir).await?;
        info!("History directory ready: {}", dir.display());
        Ok(Self {
            dir: dir.to_path_buf(),
        })
    }

    fn user_file(&self, user: &UserKey) -> PathBuf {
        self.dir.join(format!("{}.json", user.storage_key()))
    }

    async fn save(&self, user: &UserKey, records: &[ChatRecord]) -> Result<(), StorageError> {
        let path = self.user_file(user);
        let tmp = path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(records)?;
        tokio::fs::write(&tmp, body).await?;
        // Rename keeps the previous history visible until the new one lands.
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistory {
    async fn load(&self, user: &UserKey) -> Result<Vec<ChatRecord>, StorageError> {
        match tokio::fs::read(self.user_file(user)).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, user: &UserKey, record: ChatRecord) -> Result<(), StorageError> {
        let mut records = self.load(user).await?;
        records.push(record);
        self.save(user, &records).await
    }

    async fn clear(&self, user: &UserKey) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.user_file(user)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn summarize(&self, user: &UserKey, summary: &str) -> Result<(), StorageError> {
        self.save(user, &[ChatRecord::system(summary)]).await
    }
}
