//! Slack backend for loghorn.
//!
//! Implements the sink crate's `ChatApi` over the Slack Web API with a plain
//! `reqwest` client: `conversations.list` for the channel directory and
//! `chat.postMessage` for batched posts, with HTTP 429 `Retry-After`
//! responses surfaced as rate-limit signals.

pub mod client;

pub use client::SlackApi;
