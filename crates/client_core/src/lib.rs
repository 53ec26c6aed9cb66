//! Client-side session core of the bibliographic entry manager: entry
//! composition, library browsing, the single-file editor lifecycle and the
//! dialog slot that gates destructive operations. The backend service doing
//! the actual parsing, generation and companion-file editing stays external
//! behind [`BackendGateway`].

use std::sync::Arc;
use std::time::Duration;

use shared::domain::{EntryTypeCatalog, EntryTypeSpec, TypeKey};
use shared::protocol::Settings;
use tokio::sync::{broadcast, RwLock};
use tracing::info;

pub mod composition;
pub mod config;
pub mod dialog;
pub mod editor;
pub mod error;
pub mod events;
pub mod gateway;
pub mod library;
pub mod preview;

pub use composition::{CompositionController, CompositionState, IdentifierField, SaveOutcome};
pub use config::{load_config, SessionConfig};
pub use dialog::{DialogOutcome, DialogService, ModalRequest};
pub use editor::{EditorPhase, EditorSession, EditorState};
pub use error::SessionError;
pub use events::SessionEvent;
pub use gateway::{BackendGateway, HttpBackendGateway, MissingBackendGateway};
pub use library::{
    CoverSource, LibraryController, LibraryFacets, LibraryFilter, SortMode,
};
pub use preview::{PreviewDocument, PreviewSpan, SpanKind};

/// Shared in-memory context of one session: the immutable entry-type catalog,
/// the settings bag and the notification channel. Controllers own their own
/// state and reach shared data only through this context.
pub struct SessionContext {
    catalog: RwLock<EntryTypeCatalog>,
    settings: RwLock<Settings>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionContext {
    pub fn new(event_capacity: usize) -> Arc<Self> {
        let (events, _) = broadcast::channel(event_capacity);
        Arc::new(Self {
            catalog: RwLock::new(EntryTypeCatalog::new()),
            settings: RwLock::new(Settings::default()),
            events,
        })
    }

    pub async fn catalog(&self) -> EntryTypeCatalog {
        self.catalog.read().await.clone()
    }

    pub async fn schema(&self, key: &TypeKey) -> Option<EntryTypeSpec> {
        self.catalog.read().await.get(key).cloned()
    }

    pub async fn settings(&self) -> Settings {
        self.settings.read().await.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn event_sender(&self) -> broadcast::Sender<SessionEvent> {
        self.events.clone()
    }

    pub(crate) fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) async fn store_catalog(&self, catalog: EntryTypeCatalog) {
        *self.catalog.write().await = catalog;
    }

    pub(crate) async fn store_settings(&self, settings: Settings) {
        *self.settings.write().await = settings;
    }
}

/// One wired session: the four controllers around a shared context and a
/// single gateway.
pub struct Session {
    pub context: Arc<SessionContext>,
    pub dialogs: Arc<DialogService>,
    pub composition: Arc<CompositionController>,
    pub library: Arc<LibraryController>,
    pub editor: Arc<EditorSession>,
    gateway: Arc<dyn BackendGateway>,
}

impl Session {
    pub fn new(gateway: Arc<dyn BackendGateway>, config: &SessionConfig) -> Arc<Self> {
        let context = SessionContext::new(config.event_capacity);
        let dialogs = Arc::new(DialogService::new(context.event_sender()));
        let composition = CompositionController::new(
            Arc::clone(&context),
            Arc::clone(&gateway),
            Duration::from_millis(config.preview_debounce_ms),
        );
        let library = LibraryController::new(Arc::clone(&context), Arc::clone(&gateway));
        let editor = EditorSession::new(
            Arc::clone(&context),
            Arc::clone(&gateway),
            Arc::clone(&dialogs),
        );
        Arc::new(Self {
            context,
            dialogs,
            composition,
            library,
            editor,
            gateway,
        })
    }

    /// Session against the configured HTTP backend.
    pub fn connect(config: &SessionConfig) -> Arc<Self> {
        Self::new(Arc::new(HttpBackendGateway::new(&config.backend_url)), config)
    }

    /// Load the entry-type catalog and the settings bag, then restore the
    /// preferred entry type from the previous session when it still exists.
    pub async fn initialize(&self) -> Result<(), SessionError> {
        let catalog = self
            .gateway
            .entry_type_catalog()
            .await
            .map_err(SessionError::network)?;
        let settings = self
            .gateway
            .read_settings()
            .await
            .map_err(SessionError::network)?;
        info!(
            entry_types = catalog.len(),
            "session: catalog and settings loaded"
        );
        self.context.store_catalog(catalog.clone()).await;
        self.context.store_settings(settings.clone()).await;
        self.composition
            .apply_settings(settings.auto_update_preview, &settings.default_section_id)
            .await;

        let preferred = TypeKey::new(settings.last_entry_type);
        if !preferred.is_empty() && catalog.contains_key(&preferred) {
            self.composition.select_type(preferred).await?;
        }
        Ok(())
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<SessionEvent> {
        self.context.subscribe()
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
pub(crate) mod test_support;

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
