//! Progress reporting for sync passes.
//!
//! The engine pushes percentages into a [`ProgressSink`] from whatever
//! thread it runs on; sinks must not block.

use tokio::sync::mpsc::UnboundedSender;

/// Receives progress percentages in `[0, 100]` from a running sync
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: f64);
}

impl<F> ProgressSink for F
where
    F: Fn(f64) + Send + Sync,
{
    fn report(&self, percent: f64) {
        self(percent)
    }
}

/// Sink that discards every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _percent: f64) {}
}

/// Forwards updates to an async consumer without blocking the sync thread.
#[derive(Debug, Clone)]
pub struct ChannelSink(UnboundedSender<f64>);

impl ChannelSink {
    pub fn new(tx: UnboundedSender<f64>) -> Self {
        Self(tx)
    }
}

impl ProgressSink for ChannelSink {
    fn report(&self, percent: f64) {
        // receiver gone means nobody is listening any more
        let _ = self.0.send(percent);
    }
}

/// Turns "entries applied so far" into percentages of a fixed total.
pub(crate) struct ProgressCounter<'a> {
    sink: &'a dyn ProgressSink,
    total: usize,
    applied: usize,
}

impl<'a> ProgressCounter<'a> {
    pub(crate) fn new(sink: &'a dyn ProgressSink, total: usize) -> Self {
        Self {
            sink,
            total,
            applied: 0,
        }
    }

    /// Record one applied entry and emit the new percentage.
    pub(crate) fn advance(&mut self) {
        self.applied = (self.applied + 1).min(self.total);
        let percent = if self.total == 0 {
            100.0
        } else {
            self.applied as f64 / self.total as f64 * 100.0
        };
        self.sink.report(percent);
    }

    pub(crate) fn complete(&self) {
        self.sink.report(100.0);
    }
}
