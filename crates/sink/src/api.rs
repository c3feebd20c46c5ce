use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    secrecy::{ExposeSecret, Secret},
};

use crate::error::Result;

/// Authentication token for one account on the chat service.
///
/// Wraps the raw token so it never appears in `Debug` output or logs. Sinks
/// sharing a credential share one channel directory (see
/// [`DirectoryRegistry`](crate::registry::DirectoryRegistry)).
#[derive(Clone)]
pub struct Credential {
    token: Secret<String>,
}

impl Credential {
    #[must_use]
    pub fn from_token(token: impl Into<String>) -> Self {
        Self {
            token: Secret::new(token.into()),
        }
    }

    /// Load a credential from a token file, trimming surrounding whitespace.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(Self::from_token(contents.trim()))
    }

    #[must_use]
    pub fn token(&self) -> &Secret<String> {
        &self.token
    }

    /// Cache key for registry lookups. Stays inside the process.
    pub(crate) fn cache_key(&self) -> &str {
        self.token.expose_secret()
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// One channel as reported by the service's channel listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    pub id: String,
    pub name: String,
}

/// Chat-service API surface the sink depends on. Each backend (Slack, a test
/// double) implements this.
#[async_trait]
pub trait ChatApi: Send + Sync {
    /// Fetch the full channel listing visible to `credential`.
    async fn list_channels(&self, credential: &Credential) -> Result<Vec<ChannelInfo>>;

    /// Post `text` to a channel. `timeout` bounds the request when set.
    async fn post_message(
        &self,
        credential: &Credential,
        channel_id: &str,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<()>;
}
