use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use shared::domain::{FieldKey, SectionId, TypeKey};
use shared::protocol::{
    DeriveIdentifierRequest, RenderPreviewRequest, SaveEntryRequest, SettingsPatch,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::gateway::BackendGateway;
use crate::preview::PreviewDocument;
use crate::SessionContext;

/// Identifier fields the user can override by hand. Overrides survive
/// unrelated edits until an explicit regenerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierField {
    CiteKey,
    Filename,
}

/// Edits to these keys re-derive the identifier.
const IDENTIFIER_SOURCE_KEYS: [&str; 3] = ["title", "author", "date"];

#[derive(Debug, Clone)]
pub struct CompositionState {
    pub selected_type: Option<TypeKey>,
    pub field_values: BTreeMap<FieldKey, String>,
    pub cite_key: String,
    pub filename: String,
    pub manual_edits: HashSet<IdentifierField>,
    pub auto_preview: bool,
    pub section_id: Option<SectionId>,
    pub preview: Option<PreviewDocument>,
}

impl Default for CompositionState {
    fn default() -> Self {
        Self {
            selected_type: None,
            field_values: BTreeMap::new(),
            cite_key: String::new(),
            filename: String::new(),
            manual_edits: HashSet::new(),
            auto_preview: true,
            section_id: None,
            preview: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SaveOutcome {
    pub filename: String,
    pub companion_updated: bool,
    pub companion_warning: Option<String>,
}

pub struct CompositionController {
    context: Arc<SessionContext>,
    gateway: Arc<dyn BackendGateway>,
    inner: Mutex<CompositionState>,
    derive_issued: AtomicU64,
    derive_applied: AtomicU64,
    preview_issued: AtomicU64,
    preview_applied: AtomicU64,
    preview_timer: Mutex<Option<JoinHandle<()>>>,
    debounce: Duration,
}

impl CompositionController {
    pub fn new(
        context: Arc<SessionContext>,
        gateway: Arc<dyn BackendGateway>,
        debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            context,
            gateway,
            inner: Mutex::new(CompositionState::default()),
            derive_issued: AtomicU64::new(0),
            derive_applied: AtomicU64::new(0),
            preview_issued: AtomicU64::new(0),
            preview_applied: AtomicU64::new(0),
            preview_timer: Mutex::new(None),
            debounce,
        })
    }

    pub async fn state(&self) -> CompositionState {
        self.inner.lock().await.clone()
    }

    /// Select the active entry type. Clears captured values and manual
    /// overrides, persists the key as the preferred default and re-derives
    /// the identifier for the empty form.
    pub async fn select_type(&self, key: TypeKey) -> Result<(), SessionError> {
        if self.context.schema(&key).await.is_none() {
            return Err(SessionError::UnknownEntryType(key));
        }
        let default_section = {
            let settings = self.context.settings().await;
            (!settings.default_section_id.is_empty())
                .then(|| SectionId::new(settings.default_section_id))
        };
        {
            let mut state = self.inner.lock().await;
            state.selected_type = Some(key.clone());
            state.field_values.clear();
            state.manual_edits.clear();
            state.cite_key.clear();
            state.filename.clear();
            state.preview = None;
            state.section_id = default_section;
        }
        info!(entry_type = %key, "composition: entry type selected");
        self.context
            .emit(SessionEvent::SchemaSelected { key: key.clone() });

        match self
            .gateway
            .write_settings(SettingsPatch::last_entry_type(&key))
            .await
        {
            Ok(settings) => self.context.store_settings(settings).await,
            Err(err) => {
                warn!("composition: failed to persist preferred entry type: {err:#}");
                self.context.emit(SessionEvent::TransientError(format!(
                    "saving the preferred entry type failed: {err}"
                )));
            }
        }

        self.derive_identifier().await;
        Ok(())
    }

    /// Store one captured field value. Identifier source keys re-derive the
    /// identifier; with auto-preview on, the preview debounce restarts.
    pub async fn on_field_change(self: &Arc<Self>, key: FieldKey, value: String) {
        let auto_preview = {
            let mut state = self.inner.lock().await;
            if state.selected_type.is_none() {
                debug!(field = %key, "composition: field edit without a selected type ignored");
                return;
            }
            state.field_values.insert(key.clone(), value);
            state.auto_preview
        };
        if IDENTIFIER_SOURCE_KEYS.contains(&key.as_str()) {
            self.derive_identifier().await;
        }
        if auto_preview {
            self.schedule_preview_refresh().await;
        }
    }

    /// Direct edit of the cite key input. Marks the field user-overridden.
    pub async fn set_cite_key(&self, value: String) {
        let mut state = self.inner.lock().await;
        state.cite_key = value;
        state.manual_edits.insert(IdentifierField::CiteKey);
    }

    /// Direct edit of the filename input. Marks the field user-overridden.
    pub async fn set_filename(&self, value: String) {
        let mut state = self.inner.lock().await;
        state.filename = value;
        state.manual_edits.insert(IdentifierField::Filename);
    }

    /// Drop both manual overrides and force a fresh derivation.
    pub async fn regenerate_identifier(&self) {
        self.inner.lock().await.manual_edits.clear();
        self.derive_identifier().await;
    }

    /// Ask the backend for a cite key and filename derived from the current
    /// title, author and date. Responses are sequence-guarded; a response
    /// older than the last applied one is dropped.
    pub async fn derive_identifier(&self) {
        let request = {
            let state = self.inner.lock().await;
            if state.selected_type.is_none() {
                return;
            }
            DeriveIdentifierRequest {
                title: state.field_value("title"),
                author: state.field_value("author"),
                date: state.field_value("date"),
            }
        };
        let seq = self.derive_issued.fetch_add(1, Ordering::SeqCst) + 1;
        match self.gateway.derive_identifier(request).await {
            Ok(derived) => {
                if !apply_sequence(&self.derive_applied, seq) {
                    debug!(seq, "composition: dropping stale identifier response");
                    return;
                }
                let (cite_key, filename) = {
                    let mut state = self.inner.lock().await;
                    let derived_filename = strip_entry_suffix(&derived.filename);
                    if !state.manual_edits.contains(&IdentifierField::CiteKey) {
                        state.cite_key = derived.cite_key;
                    }
                    if !state.manual_edits.contains(&IdentifierField::Filename) {
                        state.filename = derived_filename;
                    }
                    (state.cite_key.clone(), state.filename.clone())
                };
                self.context
                    .emit(SessionEvent::IdentifierDerived { cite_key, filename });
            }
            Err(err) => {
                warn!("composition: identifier derivation failed: {err:#}");
                self.context.emit(SessionEvent::TransientError(format!(
                    "identifier derivation failed: {err}"
                )));
            }
        }
    }

    /// Restart the trailing-edge preview debounce. Only the timer surviving
    /// the quiet window issues a refresh.
    pub async fn schedule_preview_refresh(self: &Arc<Self>) {
        let controller = Arc::clone(self);
        let task = tokio::spawn(async move {
            tokio::time::sleep(controller.debounce).await;
            controller.refresh_preview().await;
        });
        let mut timer = self.preview_timer.lock().await;
        if let Some(previous) = timer.replace(task) {
            previous.abort();
        }
    }

    /// Render the serialized form of the composed entry. No-op without a
    /// selected type; sequence-guarded like derivation.
    pub async fn refresh_preview(&self) {
        let request = {
            let state = self.inner.lock().await;
            let Some(entry_type) = state.selected_type.clone() else {
                return;
            };
            RenderPreviewRequest {
                entry_type,
                fields: state.field_values.clone(),
                cite_key: state.cite_key.clone(),
            }
        };
        let seq = self.preview_issued.fetch_add(1, Ordering::SeqCst) + 1;
        match self.gateway.render_preview(request).await {
            Ok(response) => {
                if !apply_sequence(&self.preview_applied, seq) {
                    debug!(seq, "composition: dropping stale preview response");
                    return;
                }
                let document = PreviewDocument::parse(&response.serialized_text);
                self.inner.lock().await.preview = Some(document.clone());
                self.context
                    .emit(SessionEvent::PreviewRendered { preview: document });
            }
            Err(err) => {
                warn!("composition: preview refresh failed: {err:#}");
                self.context.emit(SessionEvent::TransientError(format!(
                    "preview refresh failed: {err}"
                )));
            }
        }
    }

    /// Toggle automatic preview refreshes; persisted as a user setting.
    /// Enabling triggers an immediate refresh.
    pub async fn set_auto_preview(&self, enabled: bool) {
        self.inner.lock().await.auto_preview = enabled;
        match self
            .gateway
            .write_settings(SettingsPatch::auto_update_preview(enabled))
            .await
        {
            Ok(settings) => self.context.store_settings(settings).await,
            Err(err) => {
                warn!("composition: failed to persist preview setting: {err:#}");
                self.context.emit(SessionEvent::TransientError(format!(
                    "saving the preview setting failed: {err}"
                )));
            }
        }
        if enabled {
            self.refresh_preview().await;
        }
    }

    pub async fn set_section(&self, section_id: Option<SectionId>) {
        self.inner.lock().await.section_id = section_id;
    }

    /// Clear the captured form but keep the selected type.
    pub async fn reset(&self) {
        {
            let mut state = self.inner.lock().await;
            state.field_values.clear();
            state.manual_edits.clear();
            state.cite_key.clear();
            state.filename.clear();
            state.preview = None;
        }
        self.context.emit(SessionEvent::CompositionReset);
    }

    /// Validate and persist the composed entry. Missing required fields
    /// abort before any network call; companion-document warnings surface on
    /// their own channel and never imply failure.
    pub async fn save(&self) -> Result<SaveOutcome, SessionError> {
        let request = {
            let state = self.inner.lock().await;
            let Some(key) = state.selected_type.clone() else {
                return Err(SessionError::NoTypeSelected);
            };
            let schema = self
                .context
                .schema(&key)
                .await
                .ok_or_else(|| SessionError::UnknownEntryType(key.clone()))?;
            let missing: Vec<String> = schema
                .fields
                .iter()
                .filter(|field| field.required)
                .filter(|field| {
                    state
                        .field_values
                        .get(&field.key)
                        .map(|value| value.trim().is_empty())
                        .unwrap_or(true)
                })
                .map(|field| field.label.clone())
                .collect();
            if !missing.is_empty() {
                return Err(SessionError::Validation { missing });
            }
            if state.cite_key.trim().is_empty() {
                return Err(SessionError::Validation {
                    missing: vec!["cite key".to_string()],
                });
            }
            SaveEntryRequest {
                entry_type: key,
                fields: state.field_values.clone(),
                cite_key: state.cite_key.trim().to_string(),
                filename: strip_entry_suffix(state.filename.trim()),
                section_id: state.section_id.clone(),
            }
        };

        let response = self.gateway.save_entry(request).await.map_err(|err| {
            self.context.emit(SessionEvent::TransientError(format!(
                "saving the entry failed: {err}"
            )));
            SessionError::network(err)
        })?;
        if !response.ok {
            let message = response
                .error
                .unwrap_or_else(|| "the backend rejected the entry".to_string());
            return Err(SessionError::Backend(message));
        }

        info!(
            filename = %response.filename,
            companion_updated = response.companion_updated,
            "composition: entry saved"
        );
        self.context.emit(SessionEvent::EntrySaved {
            filename: response.filename.clone(),
            companion_updated: response.companion_updated,
        });
        if let Some(warning) = &response.companion_warning {
            self.context
                .emit(SessionEvent::CompanionWarning(warning.clone()));
        }
        Ok(SaveOutcome {
            filename: response.filename,
            companion_updated: response.companion_updated,
            companion_warning: response.companion_warning,
        })
    }

    /// Seed local state from the settings bag without writing it back.
    pub(crate) async fn apply_settings(&self, auto_preview: bool, default_section_id: &str) {
        let mut state = self.inner.lock().await;
        state.auto_preview = auto_preview;
        if state.section_id.is_none() && !default_section_id.is_empty() {
            state.section_id = Some(SectionId::new(default_section_id));
        }
    }
}

impl CompositionState {
    fn field_value(&self, key: &str) -> String {
        self.field_values
            .get(&FieldKey::from(key))
            .cloned()
            .unwrap_or_default()
    }
}

fn strip_entry_suffix(filename: &str) -> String {
    filename
        .strip_suffix(".bib")
        .unwrap_or(filename)
        .to_string()
}

/// Record `seq` as applied unless a newer response already was.
fn apply_sequence(applied: &AtomicU64, seq: u64) -> bool {
    let mut current = applied.load(Ordering::SeqCst);
    loop {
        if seq < current {
            return false;
        }
        match applied.compare_exchange(current, seq, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return true,
            Err(actual) => current = actual,
        }
    }
}

#[cfg(test)]
#[path = "tests/composition_tests.rs"]
mod tests;
