use std::collections::HashMap;

use crate::{
    api::ChannelInfo,
    error::{Error, Result},
};

/// Resolved channel name → id mapping for one credential.
///
/// Immutable after construction; lookups are read-only and safe to share
/// across sinks.
pub struct ChannelDirectory {
    channels: HashMap<String, String>,
}

impl ChannelDirectory {
    #[must_use]
    pub fn from_channels(channels: Vec<ChannelInfo>) -> Self {
        Self {
            channels: channels.into_iter().map(|c| (c.name, c.id)).collect(),
        }
    }

    /// Look up the id for a channel name.
    pub fn resolve(&self, name: &str) -> Result<&str> {
        self.channels
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::channel_not_found(name))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}
