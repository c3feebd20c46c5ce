use std::{error::Error as StdError, time::Duration};

/// Crate-wide result type for sink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared by the sink core and chat-service backends.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote service rejected the credential.
    #[error("credential rejected by chat service")]
    CredentialInvalid,

    /// The channel name is absent from the credential's directory.
    #[error("unknown channel: {name}")]
    ChannelNotFound { name: String },

    /// The service asked us to back off. Recoverable; the sink converts this
    /// into a cooldown extension rather than surfacing it to log emitters.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    /// Any other list/post failure.
    #[error("transport failure: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<Box<dyn StdError + Send + Sync>>,
    },

    /// Sink or factory settings are unusable.
    #[error("invalid sink config: {message}")]
    InvalidConfig { message: String },

    /// Reading a credential source from disk failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    #[must_use]
    pub fn channel_not_found(name: impl Into<String>) -> Self {
        Self::ChannelNotFound { name: name.into() }
    }

    #[must_use]
    pub fn rate_limited(retry_after: Duration) -> Self {
        Self::RateLimited { retry_after }
    }

    #[must_use]
    pub fn transport(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(Box::new(source)),
        }
    }

    #[must_use]
    pub fn transport_message(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    #[must_use]
    pub fn invalid_config(message: impl std::fmt::Display) -> Self {
        Self::InvalidConfig {
            message: message.to_string(),
        }
    }
}

/// Extract the server-requested wait from a rate-limit error.
pub(crate) fn retry_after(error: &Error) -> Option<Duration> {
    match error {
        Error::RateLimited { retry_after } => Some(*retry_after),
        _ => None,
    }
}
