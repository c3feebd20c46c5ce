//! Batched log forwarding to chat-service channels.
//!
//! Chat services penalize high-frequency posting, so per-record posts are
//! unsafe. [`ChannelSink`] coalesces emitted lines into one buffer and posts
//! them as a single message no more often than a configured interval,
//! honoring server-requested backoff. Channel name → id resolution is cached
//! per credential in a shared [`DirectoryRegistry`], and a shutdown drain
//! retries through rate limits until the last batch is delivered.
//!
//! The wire protocol lives behind the [`ChatApi`] trait; `loghorn-slack`
//! provides the Slack implementation.

pub mod api;
pub mod buffer;
pub mod config;
pub mod cooldown;
pub mod directory;
pub mod error;
pub mod layer;
pub mod registry;
pub mod sink;

pub use {
    api::{ChannelInfo, ChatApi, Credential},
    config::{SinkConfig, SinkSettings},
    directory::ChannelDirectory,
    error::{Error, Result},
    layer::{LayerHandle, SinkLayer, forwarding_layer},
    registry::DirectoryRegistry,
    sink::ChannelSink,
};
