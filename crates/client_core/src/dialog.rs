//! Single-slot asynchronous confirm/prompt dialogs. At most one request is
//! presented at a time; the rest wait in FIFO order, each resolved exactly
//! once through its own channel.

use std::collections::VecDeque;

use tokio::sync::{broadcast, oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::events::SessionEvent;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModalRequest {
    pub icon: String,
    pub title: String,
    pub body: String,
    pub confirm_label: String,
    pub cancel_label: String,
    pub danger: bool,
    pub input_seed: Option<String>,
}

impl ModalRequest {
    pub fn confirm(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            icon: "bi-question-circle".into(),
            title: title.into(),
            body: body.into(),
            confirm_label: "OK".into(),
            cancel_label: "Cancel".into(),
            danger: false,
            input_seed: None,
        }
    }

    pub fn prompt(
        title: impl Into<String>,
        body: impl Into<String>,
        seed: impl Into<String>,
    ) -> Self {
        let mut request = Self::confirm(title, body);
        request.input_seed = Some(seed.into());
        request
    }

    pub fn danger(mut self) -> Self {
        self.danger = true;
        self
    }

    pub fn with_icon(mut self, icon: impl Into<String>) -> Self {
        self.icon = icon.into();
        self
    }

    pub fn with_labels(
        mut self,
        confirm_label: impl Into<String>,
        cancel_label: impl Into<String>,
    ) -> Self {
        self.confirm_label = confirm_label.into();
        self.cancel_label = cancel_label.into();
        self
    }

    pub fn is_prompt(&self) -> bool {
        self.input_seed.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogOutcome {
    Confirmed,
    Cancelled,
    Input(String),
}

impl DialogOutcome {
    /// Trimmed non-empty text resolves to `Input`; empty text is a plain
    /// confirmation without payload.
    pub fn from_input(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Confirmed
        } else {
            Self::Input(trimmed.to_string())
        }
    }

    pub fn accepted(&self) -> bool {
        !matches!(self, Self::Cancelled)
    }

    pub fn input(&self) -> Option<&str> {
        match self {
            Self::Input(text) => Some(text),
            _ => None,
        }
    }
}

struct PendingDialog {
    id: Uuid,
    request: ModalRequest,
    resolve: oneshot::Sender<DialogOutcome>,
}

#[derive(Default)]
struct DialogQueue {
    presented: Option<PendingDialog>,
    waiting: VecDeque<PendingDialog>,
}

pub struct DialogService {
    queue: Mutex<DialogQueue>,
    events: broadcast::Sender<SessionEvent>,
}

impl DialogService {
    pub fn new(events: broadcast::Sender<SessionEvent>) -> Self {
        Self {
            queue: Mutex::new(DialogQueue::default()),
            events,
        }
    }

    /// Present the request (or queue it behind the outstanding one) and wait
    /// for its single resolution. A dropped service resolves to `Cancelled`.
    pub async fn request(&self, request: ModalRequest) -> DialogOutcome {
        let (tx, rx) = oneshot::channel();
        let pending = PendingDialog {
            id: Uuid::new_v4(),
            request,
            resolve: tx,
        };
        {
            let mut queue = self.queue.lock().await;
            if queue.presented.is_some() {
                debug!(id = %pending.id, waiting = queue.waiting.len() + 1, "dialog: slot busy, queueing");
                queue.waiting.push_back(pending);
            } else {
                self.present(&mut queue, pending);
            }
        }
        rx.await.unwrap_or(DialogOutcome::Cancelled)
    }

    /// Resolve the presented dialog and move the next queued one into the
    /// slot. Called by the presentation layer.
    pub async fn resolve(&self, outcome: DialogOutcome) {
        let mut queue = self.queue.lock().await;
        let Some(pending) = queue.presented.take() else {
            warn!("dialog: resolve without a presented dialog");
            return;
        };
        debug!(id = %pending.id, ?outcome, "dialog: resolved");
        if pending.resolve.send(outcome).is_err() {
            debug!(id = %pending.id, "dialog: requester no longer waiting");
        }
        if let Some(next) = queue.waiting.pop_front() {
            self.present(&mut queue, next);
        }
    }

    /// Resolve a prompt dialog with the raw text typed by the user.
    pub async fn resolve_input(&self, raw: &str) {
        self.resolve(DialogOutcome::from_input(raw)).await;
    }

    pub async fn cancel(&self) {
        self.resolve(DialogOutcome::Cancelled).await;
    }

    pub async fn presented(&self) -> Option<ModalRequest> {
        let queue = self.queue.lock().await;
        queue.presented.as_ref().map(|p| p.request.clone())
    }

    fn present(&self, queue: &mut DialogQueue, pending: PendingDialog) {
        let _ = self.events.send(SessionEvent::DialogPresented {
            id: pending.id,
            request: pending.request.clone(),
        });
        queue.presented = Some(pending);
    }
}

#[cfg(test)]
#[path = "tests/dialog_tests.rs"]
mod tests;
