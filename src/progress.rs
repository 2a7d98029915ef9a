//! Progress reporting for long-running index operations. Deliberately bare:
//! a phase, a count, and an optional message, pushed over a channel. Callers
//! decide how (or whether) to render it — no UI assumptions baked in here.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Scanning,
    Chunking,
    Embedding,
    Storing,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: u64,
    pub total: u64,
    pub message: Option<String>,
}

impl ProgressEvent {
    pub fn percentage(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.current as f32 / self.total as f32 * 100.0).min(100.0)
    }
}

/// A sender half handed to orchestrator code. Cloneable, non-blocking: a
/// full or closed channel just drops the event rather than stalling
/// indexing on whether anyone is listening.
#[derive(Clone)]
pub struct ProgressReporter {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn new(sender: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { sender: Some(sender) }
    }

    /// A reporter that discards every event, for callers that don't need
    /// progress feedback (e.g. tests).
    pub fn noop() -> Self {
        Self { sender: None }
    }

    pub fn report(&self, phase: Phase, current: u64, total: u64, message: impl Into<Option<String>>) {
        if let Some(sender) = &self.sender {
            let _ = sender.send(ProgressEvent { phase, current, total, message: message.into() });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percentage_clamps_and_handles_zero_total() {
        let event = ProgressEvent { phase: Phase::Chunking, current: 5, total: 0, message: None };
        assert_eq!(event.percentage(), 0.0);

        let event = ProgressEvent { phase: Phase::Chunking, current: 10, total: 10, message: None };
        assert_eq!(event.percentage(), 100.0);
    }

    #[test]
    fn noop_reporter_does_not_panic() {
        let reporter = ProgressReporter::noop();
        reporter.report(Phase::Scanning, 1, 10, "scanning".to_string());
    }

    #[tokio::test]
    async fn reporter_delivers_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let reporter = ProgressReporter::new(tx);
        reporter.report(Phase::Embedding, 2, 4, None);
        let event = rx.recv().await.unwrap();
        assert_eq!(event.phase, Phase::Embedding);
        assert_eq!(event.percentage(), 50.0);
    }
}
