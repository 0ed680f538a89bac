//! Progress reporting seam.
//!
//! Batch pipelines report human-readable status lines; the UI layer decides
//! how to surface them. Core code never blocks on a sink.

use tokio::sync::mpsc;
use tracing::debug;

pub trait ProgressSink: Send + Sync {
    fn report(&self, status: &str);

    /// Two-part status for operations with a stable headline and a moving
    /// counter ("Synchronizing orphan files", "3 of 17").
    fn report_detail(&self, main: &str, detail: &str) {
        self.report(&format!("{main}: {detail}"));
    }
}

/// Discards all reports.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullProgress;

impl ProgressSink for NullProgress {
    fn report(&self, _status: &str) {}
}

/// Forwards reports onto an unbounded channel; a closed receiver is not an
/// error, the batch keeps running.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn report(&self, status: &str) {
        if self.tx.send(status.to_string()).is_err() {
            debug!("progress receiver dropped: {}", status);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_progress_forwards_and_survives_closed_receiver() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let progress = ChannelProgress::new(tx);

        progress.report_detail("Uploading files", "1 of 3");
        assert_eq!(rx.recv().await.unwrap(), "Uploading files: 1 of 3");

        drop(rx);
        progress.report("still fine");
    }
}
