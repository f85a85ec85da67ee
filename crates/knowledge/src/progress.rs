//! Structured progress reporting for rebuilds.
//!
//! A rebuild walks through fixed phases; each emits [`ProgressEvent`]s so
//! the CLI (or any other caller) can show what is happening.

use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

/// Rebuild phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discover,
    Chunk,
    Embed,
    Index,
    Publish,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discover => "discover",
            Phase::Chunk => "chunk",
            Phase::Embed => "embed",
            Phase::Index => "index",
            Phase::Publish => "publish",
        };
        f.write_str(name)
    }
}

/// Progress event emitted during a rebuild.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,

    /// Work done so far in this phase (documents, chunks, ...)
    pub current: u64,

    /// Total expected work, if known
    pub total: Option<u64>,

    pub message: String,

    /// Seconds since the rebuild started
    pub elapsed_secs: Option<f64>,
}

impl ProgressEvent {
    pub fn new(phase: Phase, current: u64, total: Option<u64>, message: impl Into<String>) -> Self {
        Self {
            phase,
            current,
            total,
            message: message.into(),
            elapsed_secs: None,
        }
    }

    /// Percentage complete (0.0 - 100.0), when the total is known.
    pub fn percentage(&self) -> Option<f64> {
        self.total.map(|t| {
            if t > 0 {
                (self.current as f64 / t as f64) * 100.0
            } else {
                100.0
            }
        })
    }

    /// Format as a simple user-facing line.
    pub fn format_simple(&self) -> String {
        let progress = match self.total {
            Some(total) => format!("{}/{}", self.current, total),
            None => self.current.to_string(),
        };

        let pct = self
            .percentage()
            .map(|p| format!(" ({:.0}%)", p))
            .unwrap_or_default();

        format!("[{}] {}{} - {}", self.phase, progress, pct, self.message)
    }
}

/// Callback for progress events.
pub type ProgressCallback = Arc<dyn Fn(ProgressEvent) + Send + Sync>;

/// Emits progress events through an optional callback.
#[derive(Clone)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
    start_time: Instant,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
            start_time: Instant::now(),
        }
    }

    /// Reporter that only logs.
    pub fn noop() -> Self {
        Self {
            callback: None,
            start_time: Instant::now(),
        }
    }

    pub fn emit(&self, phase: Phase, current: u64, total: Option<u64>, message: impl Into<String>) {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let mut event = ProgressEvent::new(phase, current, total, message);
        event.elapsed_secs = Some(elapsed);

        tracing::debug!(
            phase = %event.phase,
            current = event.current,
            total = ?event.total,
            elapsed_secs = elapsed,
            "{}",
            event.message
        );

        if let Some(callback) = &self.callback {
            callback(event);
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::noop()
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_progress_event_format() {
        let event = ProgressEvent::new(Phase::Embed, 5, Some(10), "model=trigram-v1");
        let formatted = event.format_simple();
        assert_eq!(formatted, "[embed] 5/10 (50%) - model=trigram-v1");
    }

    #[test]
    fn test_unknown_total_has_no_percentage() {
        let event = ProgressEvent::new(Phase::Discover, 3, None, "scanning docs");
        assert_eq!(event.percentage(), None);
        assert_eq!(event.format_simple(), "[discover] 3 - scanning docs");
    }

    #[test]
    fn test_progress_reporter_emit() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();

        let reporter = ProgressReporter::new(Arc::new(move |event: ProgressEvent| {
            sink.lock().unwrap().push(event);
        }));

        reporter.emit(Phase::Chunk, 2, Some(4), "guide.md");

        let captured = events.lock().unwrap();
        assert_eq!(captured.len(), 1);
        assert_eq!(captured[0].phase, Phase::Chunk);
        assert_eq!(captured[0].current, 2);
        assert!(captured[0].elapsed_secs.is_some());
    }

    #[test]
    fn test_noop_reporter() {
        ProgressReporter::noop().emit(Phase::Publish, 1, Some(1), "done");
    }

    #[test]
    fn test_phase_serializes_snake_case() {
        assert_eq!(serde_json::to_value(Phase::Publish).unwrap(), "publish");
    }
}
