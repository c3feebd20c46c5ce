use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use {
    tokio::{
        sync::{Mutex as AsyncMutex, OnceCell},
        time::{Instant, sleep},
    },
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{
    api::Credential,
    buffer::MessageBuffer,
    config::SinkConfig,
    cooldown::CooldownState,
    error::{Result, retry_after},
    registry::DirectoryRegistry,
};

/// Outcome of one send attempt.
enum FlushOutcome {
    Sent,
    RateLimited(Duration),
}

/// Buffers log lines for one channel and posts them as a single batched
/// message, no more often than the configured interval and never before a
/// server-requested backoff expires.
///
/// Built either connected ([`ChannelSink::connect`] resolves the channel id
/// up front and fails fast on a bad credential or unknown channel) or
/// deferred ([`ChannelSink::deferred`] touches the network only when the
/// first non-empty flush actually posts). After that first resolution the
/// channel id is memoized for the sink's lifetime.
pub struct ChannelSink {
    registry: Arc<DirectoryRegistry>,
    credential: Credential,
    channel_name: String,
    channel_id: OnceCell<String>,
    config: SinkConfig,
    /// Pending lines. Sync lock, never held across `.await`, so appenders
    /// are not blocked behind an in-flight post.
    buffer: Mutex<MessageBuffer>,
    /// Serializes send attempts and owns the cooldown clock.
    gate: AsyncMutex<CooldownState>,
}

impl ChannelSink {
    /// Build a sink and resolve its channel id immediately.
    pub async fn connect(
        registry: Arc<DirectoryRegistry>,
        credential: Credential,
        channel_name: String,
        config: SinkConfig,
    ) -> Result<Self> {
        config.validate()?;
        let directory = registry.directory_for(&credential).await?;
        let channel_id = directory.resolve(&channel_name)?.to_owned();
        info!(channel = %channel_name, "channel sink connected");
        Ok(Self {
            registry,
            credential,
            channel_name,
            channel_id: OnceCell::new_with(Some(channel_id)),
            config,
            buffer: Mutex::new(MessageBuffer::new()),
            gate: AsyncMutex::new(CooldownState::new()),
        })
    }

    /// Build a sink that performs no network activity until the first flush
    /// with pending text. For processes that rarely emit.
    pub fn deferred(
        registry: Arc<DirectoryRegistry>,
        credential: Credential,
        channel_name: String,
        config: SinkConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            registry,
            credential,
            channel_name,
            channel_id: OnceCell::new(),
            config,
            buffer: Mutex::new(MessageBuffer::new()),
            gate: AsyncMutex::new(CooldownState::new()),
        })
    }

    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    #[must_use]
    pub fn config(&self) -> &SinkConfig {
        &self.config
    }

    #[must_use]
    pub fn has_pending(&self) -> bool {
        !self
            .buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_empty()
    }

    /// Queue one line for the next batched post. Never sends on its own.
    pub fn append(&self, text: &str) {
        self.buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .append_line(text);
    }

    /// Attempt a send if the cooldown has elapsed; otherwise do nothing.
    ///
    /// A deferred attempt is not queued for later — the next call retries.
    /// A rate-limit response is not an error here: it only extends the
    /// cooldown, with the buffer kept intact.
    pub async fn maybe_flush(&self) -> Result<()> {
        // An attempt already in flight also counts as "too soon".
        let Ok(mut gate) = self.gate.try_lock() else {
            return Ok(());
        };
        if !gate.is_ready() {
            return Ok(());
        }

        let started = Instant::now();
        let result = self.attempt().await;
        let wait = match &result {
            Ok(FlushOutcome::RateLimited(wait)) => *wait,
            _ => Duration::ZERO,
        };
        // Armed on every attempt, success or not: even a broken transport
        // must not be hammered at per-record frequency.
        gate.arm_at(started, self.config.update_interval(), wait);
        result.map(|_| ())
    }

    /// Post everything pending, sleeping through rate-limit waits.
    ///
    /// Ignores the cooldown; intended for process shutdown, where the usual
    /// silent deferral would drop the final batch. The retry loop is
    /// deliberately unbounded — it assumes the server's retry-after values
    /// eventually shrink — and returns only when a send succeeds or a
    /// non-rate-limit error occurs. See [`ChannelSink::drain_with_cancel`]
    /// for a bounded variant.
    pub async fn drain(&self) -> Result<()> {
        let mut gate = self.gate.lock().await;
        loop {
            let started = Instant::now();
            match self.attempt().await {
                Ok(FlushOutcome::Sent) => {
                    gate.arm_at(started, self.config.update_interval(), Duration::ZERO);
                    return Ok(());
                },
                Ok(FlushOutcome::RateLimited(wait)) => {
                    gate.arm_at(started, self.config.update_interval(), wait);
                    info!(
                        channel = %self.channel_name,
                        wait_secs = wait.as_secs(),
                        "drain waiting out rate limit"
                    );
                    sleep(wait).await;
                },
                Err(err) => {
                    gate.arm_at(started, self.config.update_interval(), Duration::ZERO);
                    return Err(err);
                },
            }
        }
    }

    /// Like [`ChannelSink::drain`], but rate-limit waits race `cancel`.
    ///
    /// Returns `Ok(true)` when the buffer was fully posted and `Ok(false)`
    /// when cancellation won, with pending text retained. An in-flight post
    /// is never aborted; cancellation is observed between attempts.
    pub async fn drain_with_cancel(&self, cancel: &CancellationToken) -> Result<bool> {
        let mut gate = self.gate.lock().await;
        loop {
            if cancel.is_cancelled() {
                return Ok(false);
            }
            let started = Instant::now();
            match self.attempt().await {
                Ok(FlushOutcome::Sent) => {
                    gate.arm_at(started, self.config.update_interval(), Duration::ZERO);
                    return Ok(true);
                },
                Ok(FlushOutcome::RateLimited(wait)) => {
                    gate.arm_at(started, self.config.update_interval(), wait);
                    tokio::select! {
                        () = sleep(wait) => {},
                        () = cancel.cancelled() => return Ok(false),
                    }
                },
                Err(err) => {
                    gate.arm_at(started, self.config.update_interval(), Duration::ZERO);
                    return Err(err);
                },
            }
        }
    }

    /// One send attempt: take the buffer, post it, classify the response.
    ///
    /// On anything other than success the taken text is restored ahead of
    /// lines appended mid-flight, so nothing is lost and a later attempt
    /// resends it. Callers hold the gate.
    async fn attempt(&self) -> Result<FlushOutcome> {
        let text = self
            .buffer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if text.is_empty() {
            return Ok(FlushOutcome::Sent);
        }

        match self.post(&text).await {
            Ok(()) => {
                debug!(
                    channel = %self.channel_name,
                    bytes = text.len(),
                    "buffered lines posted"
                );
                Ok(FlushOutcome::Sent)
            },
            Err(err) => {
                self.buffer
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .restore(text);
                match retry_after(&err) {
                    Some(wait) => {
                        warn!(
                            channel = %self.channel_name,
                            retry_after_secs = wait.as_secs(),
                            "chat service rate limited, deferring batch"
                        );
                        Ok(FlushOutcome::RateLimited(wait))
                    },
                    None => Err(err),
                }
            },
        }
    }

    async fn post(&self, text: &str) -> Result<()> {
        let channel_id = self
            .channel_id
            .get_or_try_init(|| async {
                let directory = self.registry.directory_for(&self.credential).await?;
                directory.resolve(&self.channel_name).map(str::to_owned)
            })
            .await?;
        self.registry
            .api()
            .post_message(&self.credential, channel_id, text, self.config.timeout())
            .await
    }
}
