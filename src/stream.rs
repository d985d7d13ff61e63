use std::io::Write;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::result::CommitMatch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub is_limit_hit: bool,
}

impl Stats {
    pub fn update(&mut self, other: &Stats) {
        self.is_limit_hit |= other.is_limit_hit;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SearchEvent {
    pub results: Vec<CommitMatch>,
    pub stats: Stats,
}

/// Receives results as they are produced. Called concurrently from every
/// repository being searched.
pub trait Sender: Send + Sync {
    fn send(&self, event: SearchEvent);
}

/// Forwards events to an in-process consumer.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<SearchEvent>,
}

impl ChannelSender {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SearchEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Sender for ChannelSender {
    fn send(&self, event: SearchEvent) {
        if self.tx.send(event).is_err() {
            warn!(stage = "stream", event = "stream.send", result = "fail", "receiver dropped, discarding event");
        }
    }
}

/// Writes each event as one line of JSON on stdout.
#[derive(Debug, Default)]
pub struct JsonLinesSender;

impl Sender for JsonLinesSender {
    fn send(&self, event: SearchEvent) {
        let line = match serde_json::to_string(&event) {
            Ok(line) => line,
            Err(err) => {
                warn!(stage = "stream", event = "stream.encode", result = "fail", error = %err, "failed to encode event");
                return;
            }
        };
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = writeln!(stdout, "{line}") {
            warn!(stage = "stream", event = "stream.write", result = "fail", error = %err, "failed to write event");
        }
    }
}
