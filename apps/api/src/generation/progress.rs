//! Progress Channel — broadcast of generation events from orchestrator runs to
//! streaming clients.
//!
//! One channel is created at startup and handed to both the orchestrator and the
//! status-stream handler through `AppState`. Delivery is fire-and-forget: no
//! buffering or replay, a subscriber only sees events published after it subscribed.
//! Dropping a `ProjectSubscription` unsubscribes it.

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::models::project::SectionFailure;

/// Per-subscriber backlog before a slow subscriber starts missing events.
const CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPayload {
    pub project_id: Uuid,
    pub current_section: String,
    pub completed_sections: usize,
    pub total_sections: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionCompletePayload {
    pub project_id: Uuid,
    pub section_id: String,
    pub section_title: String,
    pub preview: String,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub project_id: Uuid,
    /// Absent for run-level failures.
    pub section: Option<String>,
    pub error: String,
    pub recoverable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletePayload {
    pub project_id: Uuid,
    pub draft_id: Uuid,
    pub sections_generated: usize,
    pub completed_sections: usize,
    pub errors: Vec<SectionFailure>,
}

/// Events emitted during a generation run. Serialises as the bare payload;
/// the kind travels separately as the SSE event name.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum GenerationEvent {
    Progress(ProgressPayload),
    SectionComplete(SectionCompletePayload),
    Error(ErrorPayload),
    Complete(CompletePayload),
}

impl GenerationEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            GenerationEvent::Progress(_) => "progress",
            GenerationEvent::SectionComplete(_) => "section-complete",
            GenerationEvent::Error(_) => "error",
            GenerationEvent::Complete(_) => "complete",
        }
    }

    pub fn project_id(&self) -> Uuid {
        match self {
            GenerationEvent::Progress(p) => p.project_id,
            GenerationEvent::SectionComplete(p) => p.project_id,
            GenerationEvent::Error(p) => p.project_id,
            GenerationEvent::Complete(p) => p.project_id,
        }
    }

    /// No further events follow for this run.
    pub fn is_terminal(&self) -> bool {
        match self {
            GenerationEvent::Complete(_) => true,
            GenerationEvent::Error(p) => !p.recoverable,
            _ => false,
        }
    }
}

#[derive(Clone)]
pub struct ProgressChannel {
    sender: broadcast::Sender<GenerationEvent>,
}

impl Default for ProgressChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressChannel {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    /// Broadcasts to every current subscriber. With nobody listening the event is dropped.
    pub fn publish(&self, event: GenerationEvent) {
        // Err only means there are no receivers right now.
        let _ = self.sender.send(event);
    }

    /// Subscribes to events for one project.
    pub fn subscribe(&self, project_id: Uuid) -> ProjectSubscription {
        ProjectSubscription {
            project_id,
            receiver: self.sender.subscribe(),
        }
    }

    #[cfg(test)]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub struct ProjectSubscription {
    project_id: Uuid,
    receiver: broadcast::Receiver<GenerationEvent>,
}

impl ProjectSubscription {
    /// Next event for this subscription's project. `None` once the channel is closed.
    pub async fn recv(&mut self) -> Option<GenerationEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) if event.project_id() == self.project_id => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Progress subscriber for project {} lagged, {} events skipped",
                        self.project_id, skipped
                    );
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
