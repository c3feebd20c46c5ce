//! `tracing` integration: a [`Layer`] that renders events to text lines and
//! feeds them through a [`ChannelSink`].
//!
//! Rendering happens on the emitting thread; the append → flush cycle runs
//! on a dedicated worker task fed by an unbounded queue, so log call sites
//! never wait on the network. [`LayerHandle::shutdown`] stops the worker and
//! drains the sink, which is how the final batch survives process exit.

use std::sync::Arc;

use {
    tokio::{sync::mpsc, task::JoinHandle},
    tokio_util::sync::CancellationToken,
    tracing::{
        field::{Field, Visit},
        warn,
    },
    tracing_subscriber::{Layer, layer::Context},
};

use crate::{error::Result, sink::ChannelSink};

/// Events from this workspace's own crates are never forwarded; the sink's
/// diagnostics must not feed back into the sink.
const OWN_TARGET_PREFIX: &str = "loghorn_";

/// Build a forwarding layer for `sink` plus the handle that owns its worker.
///
/// Compose the layer into a subscriber as usual (level filtering is the
/// subscriber's job, e.g. via `with_filter`); keep the handle and call
/// [`LayerHandle::shutdown`] before exit. Spawns the worker, so this must be
/// called from within a Tokio runtime.
#[must_use]
pub fn forwarding_layer(sink: Arc<ChannelSink>) -> (SinkLayer, LayerHandle) {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let cancel = CancellationToken::new();

    let worker_sink = Arc::clone(&sink);
    let worker_cancel = cancel.clone();
    let worker = tokio::spawn(async move {
        loop {
            tokio::select! {
                maybe_line = rx.recv() => match maybe_line {
                    Some(line) => {
                        worker_sink.append(&line);
                        if let Err(err) = worker_sink.maybe_flush().await {
                            warn!(error = %err, "log forwarding flush failed");
                        }
                    },
                    None => break,
                },
                () = worker_cancel.cancelled() => {
                    // Move anything still queued into the buffer so the
                    // shutdown drain sends it.
                    while let Ok(line) = rx.try_recv() {
                        worker_sink.append(&line);
                    }
                    break;
                },
            }
        }
    });

    (SinkLayer { tx }, LayerHandle {
        sink,
        worker,
        cancel,
    })
}

/// `tracing_subscriber::Layer` that queues rendered events for forwarding.
pub struct SinkLayer {
    tx: mpsc::UnboundedSender<String>,
}

impl<S: tracing::Subscriber> Layer<S> for SinkLayer {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET_PREFIX) {
            return;
        }
        // Best effort: once the worker is gone, events are dropped.
        let _ = self.tx.send(render_event(event));
    }
}

/// Owner of the forwarding worker and the sink's shutdown drain.
pub struct LayerHandle {
    sink: Arc<ChannelSink>,
    worker: JoinHandle<()>,
    cancel: CancellationToken,
}

impl LayerHandle {
    #[must_use]
    pub fn sink(&self) -> &Arc<ChannelSink> {
        &self.sink
    }

    /// Stop the worker, move queued lines into the buffer, and drain the
    /// sink. Blocks through rate-limit waits like [`ChannelSink::drain`].
    pub async fn shutdown(self) -> Result<()> {
        self.cancel.cancel();
        let _ = self.worker.await;
        self.sink.drain().await
    }
}

fn render_event(event: &tracing::Event<'_>) -> String {
    let meta = event.metadata();
    let mut visitor = LineVisitor::default();
    event.record(&mut visitor);

    let mut line = format!("{} {}: {}", meta.level(), meta.target(), visitor.message);
    for (name, value) in &visitor.fields {
        line.push(' ');
        line.push_str(name);
        line.push('=');
        line.push_str(value);
    }
    line
}

/// Extracts the `message` field and renders the rest as `key=value` pairs.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: Vec<(String, String)>,
}

impl Visit for LineVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.fields
                .push((field.name().to_owned(), format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_owned();
        } else {
            self.fields.push((field.name().to_owned(), value.to_owned()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.push((field.name().to_owned(), value.to_string()));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.push((field.name().to_owned(), value.to_string()));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.push((field.name().to_owned(), value.to_string()));
    }
}
