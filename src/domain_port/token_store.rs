use crate::domain_model::*;

#[derive(Debug, thiserror::Error)]
pub enum TokenStoreError {
    #[error("network error: {0}")]
    Network(String),
    #[error("provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("refresh token is no longer valid")]
    InvalidRefreshToken,
    #[error("no session to refresh")]
    NoSession,
    #[error("unexpected provider response: {0}")]
    Decode(String),
}

impl TokenStoreError {
    /// Whether a retry has a realistic chance of succeeding.
    ///
    /// Only used for log levels; the lifecycle core backs off on every failure.
    pub fn is_transient(&self) -> bool {
        match self {
            TokenStoreError::Network(_) => true,
            TokenStoreError::Rejected { status, .. } => *status == 429 || *status >= 500,
            TokenStoreError::InvalidRefreshToken
            | TokenStoreError::NoSession
            | TokenStoreError::Decode(_) => false,
        }
    }
}

/// Access to the authentication provider's session state.
///
/// The provider state is shared with code outside the lifecycle core, so
/// implementations must not assume the core is their only caller.
#[async_trait::async_trait]
pub trait TokenStore: Send + Sync {
    /// Current session, `None` when nobody is signed in.
    async fn get_current_session(&self) -> Result<Option<Session>, TokenStoreError>;
    /// Exchange the current refresh token for a new session and make it current.
    async fn refresh_session(&self) -> Result<Session, TokenStoreError>;
}
