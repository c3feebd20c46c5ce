use std::{collections::HashMap, sync::Arc};

use {tokio::sync::Mutex, tracing::debug};

use crate::{
    api::{ChatApi, Credential},
    directory::ChannelDirectory,
    error::Result,
};

/// Process-wide cache of channel directories, keyed by credential.
///
/// Several sinks on the same credential share one directory, so the channel
/// listing is fetched at most once per credential for the life of the
/// process. The map lock is held across the fetch: concurrent first-time
/// lookups for a credential serialize behind it and exactly one list call
/// goes out. Failed builds are not cached; the next lookup retries.
pub struct DirectoryRegistry {
    api: Arc<dyn ChatApi>,
    directories: Mutex<HashMap<String, Arc<ChannelDirectory>>>,
}

impl DirectoryRegistry {
    #[must_use]
    pub fn new(api: Arc<dyn ChatApi>) -> Self {
        Self {
            api,
            directories: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn api(&self) -> &Arc<dyn ChatApi> {
        &self.api
    }

    /// Return the directory for `credential`, building it on first use.
    pub async fn directory_for(&self, credential: &Credential) -> Result<Arc<ChannelDirectory>> {
        let mut directories = self.directories.lock().await;
        if let Some(directory) = directories.get(credential.cache_key()) {
            return Ok(Arc::clone(directory));
        }

        let channels = self.api.list_channels(credential).await?;
        debug!(channel_count = channels.len(), "channel directory built");
        let directory = Arc::new(ChannelDirectory::from_channels(channels));
        directories.insert(credential.cache_key().to_owned(), Arc::clone(&directory));
        Ok(directory)
    }
}
