// src/observer/session.rs
//! What the observer needs from a live content session (rendered page, HTTP page, fixture).

use tokio::sync::{mpsc, watch};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("content session is disconnected")]
    Disconnected,
    #[error("insertion hook unavailable: {0}")]
    HookUnavailable(String),
    #[error("content query failed: {0}")]
    Query(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait::async_trait]
pub trait ContentSession: Send + Sync + 'static {
    /// Register for inserted content. Each message is the text of one insertion.
    async fn subscribe_insertions(&self) -> Result<mpsc::Receiver<String>, SessionError>;

    /// Full visible text of the current content.
    async fn body_text(&self) -> Result<String, SessionError>;

    /// Texts of interactive elements (buttons, links, `role="button"`).
    async fn interactive_texts(&self) -> Result<Vec<String>, SessionError>;

    /// Location of the current content, attached to every detection.
    fn current_url(&self) -> String;

    /// `true` while connected. A flip to `false` is terminal.
    fn connection(&self) -> watch::Receiver<bool>;

    async fn close(&self) -> Result<(), SessionError>;
}
