/*!
 * Progress reporting for running translation requests.
 */

use log::debug;
use serde::Serialize;
use tokio::sync::broadcast;

use crate::database::models::TranslationRequest;

/// Progress update for one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressEvent {
    pub request_id: i64,
    pub title: String,
    /// Percentage, 0 to 100
    pub progress: u8,
    /// True once the request reached 100%
    pub completed: bool,
    pub success: bool,
}

/// Sink for progress updates; delivery problems are never the caller's concern
pub trait ProgressEmitter: Send + Sync {
    fn emit(&self, request: &TranslationRequest, percent: u8, success: bool);
}

/// Publishes progress on a broadcast channel
#[derive(Debug, Clone)]
pub struct BroadcastProgress {
    sender: broadcast::Sender<ProgressEvent>,
}

impl BroadcastProgress {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.sender.subscribe()
    }
}

impl Default for BroadcastProgress {
    fn default() -> Self {
        Self::new(256)
    }
}

impl ProgressEmitter for BroadcastProgress {
    fn emit(&self, request: &TranslationRequest, percent: u8, success: bool) {
        let progress = percent.min(100);
        let event = ProgressEvent {
            request_id: request.id,
            title: request.title.clone(),
            progress,
            completed: progress == 100,
            success,
        };
        // No subscribers is fine
        if self.sender.send(event).is_err() {
            debug!("No progress observers for request {}", request.id);
        }
    }
}
