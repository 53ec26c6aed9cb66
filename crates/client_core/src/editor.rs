use std::collections::HashSet;
use std::sync::Arc;

use shared::domain::{FilePath, LibraryFile};
use shared::protocol::{DeleteFileResponse, RenameFileRequest, SaveFileRequest};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::dialog::{DialogOutcome, DialogService, ModalRequest};
use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::gateway::BackendGateway;
use crate::SessionContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorPhase {
    Closed,
    Loading,
    Clean,
    Dirty,
}

/// Lifecycle of the single open file. `Closed` and both `Open` substates are
/// reachable as documented in the session design; at most one file is ever
/// open.
#[derive(Debug, Clone, Default)]
pub enum EditorState {
    #[default]
    Closed,
    Loading {
        file: LibraryFile,
    },
    Open {
        file: LibraryFile,
        content: String,
        dirty: bool,
    },
}

impl EditorState {
    pub fn phase(&self) -> EditorPhase {
        match self {
            Self::Closed => EditorPhase::Closed,
            Self::Loading { .. } => EditorPhase::Loading,
            Self::Open { dirty: false, .. } => EditorPhase::Clean,
            Self::Open { dirty: true, .. } => EditorPhase::Dirty,
        }
    }

    pub fn file(&self) -> Option<&LibraryFile> {
        match self {
            Self::Closed => None,
            Self::Loading { file } | Self::Open { file, .. } => Some(file),
        }
    }

    pub fn is_dirty(&self) -> bool {
        matches!(self, Self::Open { dirty: true, .. })
    }

    pub fn content(&self) -> Option<&str> {
        match self {
            Self::Open { content, .. } => Some(content),
            _ => None,
        }
    }
}

#[derive(Default)]
struct EditorInner {
    state: EditorState,
    /// Paths with an outstanding gateway operation. A second operation for
    /// the same path fails fast instead of overlapping.
    in_flight: HashSet<FilePath>,
}

pub struct EditorSession {
    context: Arc<SessionContext>,
    gateway: Arc<dyn BackendGateway>,
    dialogs: Arc<DialogService>,
    inner: Mutex<EditorInner>,
}

impl EditorSession {
    pub fn new(
        context: Arc<SessionContext>,
        gateway: Arc<dyn BackendGateway>,
        dialogs: Arc<DialogService>,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            gateway,
            dialogs,
            inner: Mutex::new(EditorInner::default()),
        })
    }

    pub async fn state(&self) -> EditorState {
        self.inner.lock().await.state.clone()
    }

    /// Open a file for viewing/editing. Unsaved changes in the current
    /// session must be explicitly discarded first; a declined confirmation
    /// aborts the open. The fetched content is applied only if the session
    /// still targets the requested path when the response arrives.
    pub async fn open(&self, file: LibraryFile) -> Result<(), SessionError> {
        if self.inner.lock().await.state.is_dirty() {
            let outcome = self.dialogs.request(discard_changes_request()).await;
            if !outcome.accepted() {
                debug!(path = %file.path, "editor: open aborted, unsaved changes kept");
                return Err(SessionError::Declined);
            }
        }
        self.begin_op(&file.path).await?;
        self.transition(EditorState::Loading { file: file.clone() })
            .await;
        info!(path = %file.path, "editor: loading file");

        let result = self.gateway.read_file_content(&file.path).await;
        let outcome = match result {
            Err(err) => {
                warn!(path = %file.path, "editor: loading failed: {err:#}");
                self.context.emit(SessionEvent::TransientError(format!(
                    "opening {} failed: {err}",
                    file.name
                )));
                if self.still_targets(&file.path).await {
                    self.transition(EditorState::Closed).await;
                }
                Err(SessionError::network(err))
            }
            Ok(response) => {
                if let Some(error) = response.error {
                    self.context
                        .emit(SessionEvent::TransientError(error.clone()));
                    if self.still_targets(&file.path).await {
                        self.transition(EditorState::Closed).await;
                    }
                    Err(SessionError::Backend(error))
                } else if self.still_targets(&file.path).await {
                    self.transition(EditorState::Open {
                        file: file.clone(),
                        content: response.content,
                        dirty: false,
                    })
                    .await;
                    Ok(())
                } else {
                    debug!(path = %file.path, "editor: dropping superseded load response");
                    Ok(())
                }
            }
        };
        self.end_op(&file.path).await;
        outcome
    }

    /// The edit signal: store the buffer and flag unsaved changes.
    pub async fn update_content(&self, content: String) -> Result<(), SessionError> {
        let became_dirty = {
            let mut inner = self.inner.lock().await;
            let EditorState::Open {
                file,
                content: existing,
                dirty,
            } = &mut inner.state
            else {
                return Err(SessionError::NoOpenFile);
            };
            *existing = content;
            if *dirty {
                None
            } else {
                *dirty = true;
                Some(file.clone())
            }
        };
        if let Some(file) = became_dirty {
            self.context.emit(SessionEvent::EditorStateChanged {
                phase: EditorPhase::Dirty,
                file: Some(file),
            });
        }
        Ok(())
    }

    /// Persist the edited buffer. On failure the buffer and dirty flag stay
    /// untouched so the user can retry.
    pub async fn save(&self) -> Result<(), SessionError> {
        let (path, content) = {
            let inner = self.inner.lock().await;
            match &inner.state {
                EditorState::Open {
                    file, dirty: false, ..
                } => {
                    debug!(path = %file.path, "editor: save skipped, no changes");
                    return Ok(());
                }
                EditorState::Open {
                    file,
                    content,
                    dirty: true,
                } => (file.path.clone(), content.clone()),
                _ => return Err(SessionError::NoOpenFile),
            }
        };
        self.begin_op(&path).await?;

        let request = SaveFileRequest {
            path: path.clone(),
            content,
        };
        let result = self.gateway.save_file_content(request).await;
        let outcome = match result {
            Err(err) => {
                self.context.emit(SessionEvent::TransientError(format!(
                    "saving failed: {err}"
                )));
                Err(SessionError::network(err))
            }
            Ok(response) if !response.ok => {
                let message = response
                    .error
                    .unwrap_or_else(|| "the backend rejected the save".to_string());
                self.context
                    .emit(SessionEvent::TransientError(message.clone()));
                Err(SessionError::Backend(message))
            }
            Ok(_) => {
                let applied = {
                    let mut inner = self.inner.lock().await;
                    match &mut inner.state {
                        EditorState::Open { file, dirty, .. } if file.path == path => {
                            *dirty = false;
                            Some(file.clone())
                        }
                        _ => None,
                    }
                };
                match applied {
                    Some(file) => {
                        info!(path = %path, "editor: file saved");
                        self.context
                            .emit(SessionEvent::Notice(format!("Saved: {}", file.name)));
                        self.context.emit(SessionEvent::EditorStateChanged {
                            phase: EditorPhase::Clean,
                            file: Some(file),
                        });
                    }
                    None => debug!(path = %path, "editor: dropping save response, session moved on"),
                }
                Ok(())
            }
        };
        self.end_op(&path).await;
        outcome
    }

    /// Replace the buffer with the stored content. Returns whether unsaved
    /// changes were actually thrown away.
    pub async fn discard(&self) -> Result<bool, SessionError> {
        let (file, was_dirty) = {
            let inner = self.inner.lock().await;
            match &inner.state {
                EditorState::Open { file, dirty, .. } => (file.clone(), *dirty),
                _ => return Err(SessionError::NoOpenFile),
            }
        };
        self.begin_op(&file.path).await?;

        let result = self.gateway.read_file_content(&file.path).await;
        let outcome = match result {
            Err(err) => {
                self.context.emit(SessionEvent::TransientError(format!(
                    "reloading {} failed: {err}",
                    file.name
                )));
                Err(SessionError::network(err))
            }
            Ok(response) => {
                if self.still_targets(&file.path).await {
                    self.transition(EditorState::Open {
                        file: file.clone(),
                        content: response.content,
                        dirty: false,
                    })
                    .await;
                }
                let notice = if was_dirty {
                    "Changes discarded."
                } else {
                    "No changes to discard."
                };
                self.context
                    .emit(SessionEvent::Notice(notice.to_string()));
                Ok(was_dirty)
            }
        };
        self.end_op(&file.path).await;
        outcome
    }

    /// Rename the open file. Only the file identity changes; content and the
    /// dirty flag are untouched.
    pub async fn rename(&self, new_name: &str) -> Result<String, SessionError> {
        let file = {
            let inner = self.inner.lock().await;
            match &inner.state {
                EditorState::Open { file, .. } => file.clone(),
                _ => return Err(SessionError::NoOpenFile),
            }
        };
        let trimmed = new_name.trim();
        if trimmed.is_empty() {
            return Err(SessionError::Validation {
                missing: vec!["file name".to_string()],
            });
        }
        self.begin_op(&file.path).await?;

        let request = RenameFileRequest {
            path: file.path.clone(),
            new_name: trimmed.to_string(),
        };
        let result = self.gateway.rename_file(request).await;
        let outcome = match result {
            Err(err) => {
                self.context.emit(SessionEvent::TransientError(format!(
                    "renaming {} failed: {err}",
                    file.name
                )));
                Err(SessionError::network(err))
            }
            Ok(response) if !response.ok => {
                let message = response
                    .error
                    .unwrap_or_else(|| "the backend rejected the rename".to_string());
                self.context
                    .emit(SessionEvent::TransientError(message.clone()));
                Err(SessionError::Backend(message))
            }
            Ok(response) => {
                let new_path = response
                    .new_path
                    .unwrap_or_else(|| file.path.clone());
                let updated = {
                    let mut inner = self.inner.lock().await;
                    let renamed = match &mut inner.state {
                        EditorState::Open { file: open, .. } if open.path == file.path => {
                            open.path = new_path.clone();
                            open.name = response.new_name.clone();
                            true
                        }
                        _ => false,
                    };
                    renamed.then(|| (inner.state.phase(), inner.state.file().cloned()))
                };
                info!(from = %file.path, to = %new_path, "editor: file renamed");
                self.context.emit(SessionEvent::Notice(format!(
                    "Renamed to: {}",
                    response.new_name
                )));
                if let Some((phase, file)) = updated {
                    self.context
                        .emit(SessionEvent::EditorStateChanged { phase, file });
                }
                Ok(response.new_name)
            }
        };
        self.end_op(&file.path).await;
        outcome
    }

    /// Ask for a new name through the dialog slot, then rename. Cancelling
    /// or confirming without a name aborts silently.
    pub async fn prompt_rename(&self) -> Result<Option<String>, SessionError> {
        let file = {
            let inner = self.inner.lock().await;
            match &inner.state {
                EditorState::Open { file, .. } => file.clone(),
                _ => return Err(SessionError::NoOpenFile),
            }
        };
        let seed = file
            .name
            .strip_suffix(".bib")
            .unwrap_or(&file.name)
            .to_string();
        let outcome = self.dialogs.request(rename_prompt_request(&file.name, seed)).await;
        match outcome {
            DialogOutcome::Input(name) => self.rename(&name).await.map(Some),
            _ => {
                debug!(path = %file.path, "editor: rename aborted");
                Ok(None)
            }
        }
    }

    /// Delete a library file after confirmation. Deleting the currently open
    /// file force-closes the session, unsaved changes included.
    pub async fn delete(&self, file: &LibraryFile) -> Result<DeleteFileResponse, SessionError> {
        let outcome = self.dialogs.request(confirm_delete_request(&file.name)).await;
        if !outcome.accepted() {
            debug!(path = %file.path, "editor: delete declined");
            return Err(SessionError::Declined);
        }
        self.begin_op(&file.path).await?;

        let result = self.gateway.delete_file(&file.path).await;
        let outcome = match result {
            Err(err) => {
                self.context.emit(SessionEvent::TransientError(format!(
                    "deleting {} failed: {err}",
                    file.name
                )));
                Err(SessionError::network(err))
            }
            Ok(response) if !response.ok => {
                let message = response
                    .error
                    .unwrap_or_else(|| "the backend rejected the delete".to_string());
                self.context
                    .emit(SessionEvent::TransientError(message.clone()));
                Err(SessionError::Backend(message))
            }
            Ok(response) => {
                let was_open = {
                    let mut inner = self.inner.lock().await;
                    let matches_open = inner
                        .state
                        .file()
                        .is_some_and(|open| open.path == file.path);
                    if matches_open {
                        inner.state = EditorState::Closed;
                    }
                    matches_open
                };
                if was_open {
                    info!(path = %file.path, "editor: open file deleted, session closed");
                    self.context.emit(SessionEvent::EditorStateChanged {
                        phase: EditorPhase::Closed,
                        file: None,
                    });
                }
                self.context
                    .emit(SessionEvent::Notice(format!("Deleted {}.", file.name)));
                if response.companion_removed {
                    self.context.emit(SessionEvent::Notice(
                        "Companion document entry removed.".to_string(),
                    ));
                }
                if let Some(warning) = &response.companion_warning {
                    self.context
                        .emit(SessionEvent::CompanionWarning(warning.clone()));
                }
                Ok(response)
            }
        };
        self.end_op(&file.path).await;
        outcome
    }

    /// Close the session. Unsaved changes require an explicit discard
    /// confirmation; declining keeps the session open and dirty.
    pub async fn close(&self) -> Result<(), SessionError> {
        let dirty = {
            let inner = self.inner.lock().await;
            match &inner.state {
                EditorState::Closed => return Ok(()),
                state => state.is_dirty(),
            }
        };
        if dirty {
            let outcome = self.dialogs.request(discard_changes_request()).await;
            if !outcome.accepted() {
                debug!("editor: close declined, keeping unsaved changes");
                return Err(SessionError::Declined);
            }
        }
        info!("editor: session closed");
        self.transition(EditorState::Closed).await;
        Ok(())
    }

    async fn transition(&self, state: EditorState) {
        let phase = state.phase();
        let file = state.file().cloned();
        self.inner.lock().await.state = state;
        self.context
            .emit(SessionEvent::EditorStateChanged { phase, file });
    }

    /// Whether a response for `path` may still be applied. Superseded and
    /// closed sessions drop their late responses here.
    async fn still_targets(&self, path: &FilePath) -> bool {
        let inner = self.inner.lock().await;
        inner.state.file().is_some_and(|file| file.path == *path)
    }

    async fn begin_op(&self, path: &FilePath) -> Result<(), SessionError> {
        let mut inner = self.inner.lock().await;
        if !inner.in_flight.insert(path.clone()) {
            return Err(SessionError::OperationInFlight { path: path.clone() });
        }
        Ok(())
    }

    async fn end_op(&self, path: &FilePath) {
        self.inner.lock().await.in_flight.remove(path);
    }
}

fn discard_changes_request() -> ModalRequest {
    ModalRequest::confirm("Discard changes", "Discard unsaved changes?")
        .with_icon("bi-exclamation-triangle")
        .with_labels("Discard", "Keep editing")
        .danger()
}

fn confirm_delete_request(name: &str) -> ModalRequest {
    ModalRequest::confirm(
        "Delete file",
        format!("Delete {name} permanently? This cannot be undone."),
    )
    .with_icon("bi-trash")
    .with_labels("Delete", "Cancel")
    .danger()
}

fn rename_prompt_request(name: &str, seed: String) -> ModalRequest {
    ModalRequest::prompt("Rename file", format!("New name for {name}:"), seed)
        .with_icon("bi-pencil")
        .with_labels("Rename", "Cancel")
}

#[cfg(test)]
#[path = "tests/editor_tests.rs"]
mod tests;
