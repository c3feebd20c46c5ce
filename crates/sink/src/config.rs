use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    api::Credential,
    error::{Error, Result},
    registry::DirectoryRegistry,
    sink::ChannelSink,
};

/// Pacing configuration for a single sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkConfig {
    /// Minimum seconds between two send attempts. Must be at least 1.
    pub update_interval_secs: u64,

    /// Optional timeout in seconds for each post call.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            update_interval_secs: 60,
            timeout_secs: None,
        }
    }
}

impl SinkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.update_interval_secs < 1 {
            return Err(Error::invalid_config(
                "update_interval_secs must be at least 1",
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// Settings-file description of one sink, for hosts that build sinks from
/// structured config rather than code.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Channel name to post to.
    pub channel: String,

    /// Literal token. Takes precedence over `token_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,

    /// Path to a file holding the token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_file: Option<PathBuf>,

    /// Defer directory lookup to the first flush that posts.
    pub lazy: bool,

    #[serde(flatten)]
    pub sink: SinkConfig,
}

impl SinkSettings {
    /// Resolve the credential source. A literal token wins over a file.
    pub fn credential(&self) -> Result<Credential> {
        if let Some(token) = &self.token {
            return Ok(Credential::from_token(token.clone()));
        }
        if let Some(path) = &self.token_file {
            return Credential::from_file(path);
        }
        Err(Error::invalid_config("either token or token_file is required"))
    }

    /// Build a sink from these settings: connected up front, or deferred when
    /// `lazy` is set.
    pub async fn build(&self, registry: Arc<DirectoryRegistry>) -> Result<ChannelSink> {
        if self.channel.is_empty() {
            return Err(Error::invalid_config("channel is required"));
        }
        let credential = self.credential()?;
        if self.lazy {
            ChannelSink::deferred(registry, credential, self.channel.clone(), self.sink.clone())
        } else {
            ChannelSink::connect(registry, credential, self.channel.clone(), self.sink.clone())
                .await
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let cfg = SinkConfig::default();
        assert_eq!(cfg.update_interval_secs, 60);
        assert_eq!(cfg.timeout_secs, None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_interval_rejected() {
        let cfg = SinkConfig {
            update_interval_secs: 0,
            timeout_secs: None,
        };
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn deserialize_from_json() {
        let json = r#"{
            "channel": "logging",
            "token": "xoxb-123",
            "lazy": true,
            "update_interval_secs": 5,
            "timeout_secs": 10
        }"#;
        let settings: SinkSettings = serde_json::from_str(json).unwrap();
        assert_eq!(settings.channel, "logging");
        assert!(settings.lazy);
        assert_eq!(settings.sink.update_interval_secs, 5);
        assert_eq!(settings.sink.timeout(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn defaults_for_unspecified_fields() {
        let settings: SinkSettings =
            serde_json::from_str(r#"{"channel": "ops", "token": "t"}"#).unwrap();
        assert!(!settings.lazy);
        assert_eq!(settings.sink.update_interval_secs, 60);
        assert_eq!(settings.sink.timeout_secs, None);
    }

    #[test]
    fn literal_token_wins_over_file() {
        let settings = SinkSettings {
            channel: "ops".into(),
            token: Some("xoxb-literal".into()),
            token_file: Some("/nonexistent/token.dat".into()),
            ..Default::default()
        };
        let credential = settings.credential().expect("credential");
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("REDACTED"));
    }

    #[test]
    fn token_file_source() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("token.dat");
        std::fs::write(&path, "  xoxb-disk  \n").expect("write token");

        let settings = SinkSettings {
            channel: "ops".into(),
            token_file: Some(path),
            ..Default::default()
        };
        assert!(settings.credential().is_ok());
    }

    #[test]
    fn missing_credential_source_rejected() {
        let settings = SinkSettings {
            channel: "ops".into(),
            ..Default::default()
        };
        assert!(matches!(
            settings.credential(),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
