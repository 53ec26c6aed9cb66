//! Test doubles shared by the controller test modules.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::domain::{
    EntryTypeCatalog, EntryTypeSpec, Field, FieldKey, FieldKind, FilePath, LibraryFile, TypeKey,
};
use shared::protocol::{
    CompanionSectionsResponse, DeleteFileResponse, DeriveIdentifierRequest, DerivedIdentifier,
    FileContentResponse, LibraryListing, RenameFileRequest, RenameFileResponse,
    RenderPreviewRequest, RenderPreviewResponse, SaveEntryRequest, SaveEntryResponse,
    SaveFileRequest, SaveFileResponse, Settings, SettingsPatch,
};
use tokio::sync::{broadcast, Mutex};

use crate::dialog::{DialogOutcome, DialogService};
use crate::events::SessionEvent;
use crate::gateway::BackendGateway;
use crate::SessionContext;

fn field(key: &str, label: &str, kind: FieldKind, required: bool) -> Field {
    Field {
        key: FieldKey::from(key),
        label: label.to_string(),
        kind,
        required,
        placeholder: String::new(),
    }
}

pub(crate) fn sample_catalog() -> EntryTypeCatalog {
    let mut catalog = EntryTypeCatalog::new();
    catalog.insert(
        TypeKey::from("book"),
        EntryTypeSpec {
            label: "Book".to_string(),
            icon: "bi-book".to_string(),
            fields: vec![
                field("author", "Author", FieldKind::Text, true),
                field("title", "Title", FieldKind::Text, true),
                field("publisher", "Publisher", FieldKind::Text, true),
                field("date", "Year", FieldKind::Year, true),
                field("isbn", "ISBN", FieldKind::Text, false),
            ],
        },
    );
    catalog.insert(
        TypeKey::from("misc"),
        EntryTypeSpec {
            label: "Miscellaneous".to_string(),
            icon: "bi-three-dots".to_string(),
            fields: vec![
                field("title", "Title", FieldKind::Text, true),
                field("author", "Author", FieldKind::Text, false),
                field("date", "Year", FieldKind::Year, false),
            ],
        },
    );
    catalog.insert(
        TypeKey::from("online"),
        EntryTypeSpec {
            label: "Website".to_string(),
            icon: "bi-globe".to_string(),
            fields: vec![
                field("author", "Author", FieldKind::Text, true),
                field("title", "Title", FieldKind::Text, true),
                field("url", "URL", FieldKind::Text, true),
                field("urldate", "Access date", FieldKind::Date, true),
            ],
        },
    );
    catalog
}

pub(crate) async fn context_with_catalog() -> Arc<SessionContext> {
    let context = SessionContext::new(64);
    context.store_catalog(sample_catalog()).await;
    context
}

pub(crate) fn library_file(path: &str, name: &str) -> LibraryFile {
    LibraryFile {
        path: FilePath::from(path),
        name: name.to_string(),
        key: String::new(),
        entry_type: String::new(),
        title: String::new(),
        author: String::new(),
        year: String::new(),
        publisher: String::new(),
        journal: String::new(),
        url: String::new(),
        isbn: String::new(),
        modified: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        size: 0,
    }
}

/// Resolves every presented dialog with the given outcome.
pub(crate) fn auto_respond_dialogs(
    dialogs: Arc<DialogService>,
    mut events: broadcast::Receiver<SessionEvent>,
    outcome: DialogOutcome,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if matches!(event, SessionEvent::DialogPresented { .. }) {
                dialogs.resolve(outcome.clone()).await;
            }
        }
    })
}

/// In-memory gateway with scriptable responses, optional per-call delays and
/// full request recording.
pub(crate) struct TestBackendGateway {
    pub fail_with: Mutex<Option<String>>,
    pub catalog: EntryTypeCatalog,
    pub settings: Mutex<Settings>,
    pub library: Mutex<Vec<LibraryFile>>,
    pub file_contents: Mutex<BTreeMap<String, String>>,
    pub save_entry_response: Mutex<SaveEntryResponse>,
    pub save_file_response: Mutex<SaveFileResponse>,
    pub delete_response: Mutex<DeleteFileResponse>,
    pub rename_response: Mutex<Option<RenameFileResponse>>,
    pub preview_delays: Mutex<VecDeque<Duration>>,
    pub read_delays: Mutex<VecDeque<Duration>>,
    pub calls: Mutex<Vec<&'static str>>,
    pub derive_requests: Mutex<Vec<DeriveIdentifierRequest>>,
    pub preview_requests: Mutex<Vec<RenderPreviewRequest>>,
    pub save_entry_requests: Mutex<Vec<SaveEntryRequest>>,
    pub settings_patches: Mutex<Vec<SettingsPatch>>,
    pub save_file_requests: Mutex<Vec<SaveFileRequest>>,
    pub deleted_paths: Mutex<Vec<FilePath>>,
    pub rename_requests: Mutex<Vec<RenameFileRequest>>,
}

impl TestBackendGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_with: Mutex::new(None),
            catalog: sample_catalog(),
            settings: Mutex::new(Settings::default()),
            library: Mutex::new(Vec::new()),
            file_contents: Mutex::new(BTreeMap::new()),
            save_entry_response: Mutex::new(SaveEntryResponse {
                ok: true,
                filename: String::new(),
                companion_updated: false,
                companion_warning: None,
                error: None,
            }),
            save_file_response: Mutex::new(SaveFileResponse {
                ok: true,
                error: None,
            }),
            delete_response: Mutex::new(DeleteFileResponse {
                ok: true,
                companion_removed: false,
                companion_warning: None,
                error: None,
            }),
            rename_response: Mutex::new(None),
            preview_delays: Mutex::new(VecDeque::new()),
            read_delays: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            derive_requests: Mutex::new(Vec::new()),
            preview_requests: Mutex::new(Vec::new()),
            save_entry_requests: Mutex::new(Vec::new()),
            settings_patches: Mutex::new(Vec::new()),
            save_file_requests: Mutex::new(Vec::new()),
            deleted_paths: Mutex::new(Vec::new()),
            rename_requests: Mutex::new(Vec::new()),
        })
    }

    pub fn failing(err: impl Into<String>) -> Arc<Self> {
        let gateway = Self::new();
        *gateway.fail_with.try_lock().expect("unused lock") = Some(err.into());
        gateway
    }

    pub async fn set_fail_with(&self, err: Option<String>) {
        *self.fail_with.lock().await = err;
    }

    pub async fn recorded_calls(&self) -> Vec<&'static str> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, op: &'static str) -> Result<()> {
        self.calls.lock().await.push(op);
        if let Some(err) = self.fail_with.lock().await.clone() {
            return Err(anyhow!(err));
        }
        Ok(())
    }

    async fn next_delay(delays: &Mutex<VecDeque<Duration>>) {
        let delay = delays.lock().await.pop_front();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

fn derived_for(request: &DeriveIdentifierRequest) -> DerivedIdentifier {
    let base = if request.title.is_empty() {
        &request.author
    } else {
        &request.title
    };
    let mut key = String::new();
    for c in base.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            key.push(c);
        } else if !key.ends_with('_') {
            key.push('_');
        }
    }
    let key = key.trim_matches('_').to_string();
    let year: String = request
        .date
        .chars()
        .filter(|c| c.is_ascii_digit())
        .take(4)
        .collect();
    let cite_key = if year.is_empty() {
        key
    } else if key.is_empty() {
        year
    } else {
        format!("{key}_{year}")
    };
    DerivedIdentifier {
        filename: format!("{cite_key}.bib"),
        cite_key,
    }
}

#[async_trait]
impl BackendGateway for TestBackendGateway {
    async fn entry_type_catalog(&self) -> Result<EntryTypeCatalog> {
        self.record("entry_type_catalog").await?;
        Ok(self.catalog.clone())
    }

    async fn read_settings(&self) -> Result<Settings> {
        self.record("read_settings").await?;
        Ok(self.settings.lock().await.clone())
    }

    async fn write_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        self.record("write_settings").await?;
        let mut settings = self.settings.lock().await;
        if let Some(v) = &patch.last_entry_type {
            settings.last_entry_type = v.clone();
        }
        if let Some(v) = patch.auto_update_preview {
            settings.auto_update_preview = v;
        }
        if let Some(v) = &patch.default_section_id {
            settings.default_section_id = v.clone();
        }
        self.settings_patches.lock().await.push(patch);
        Ok(settings.clone())
    }

    async fn derive_identifier(
        &self,
        request: DeriveIdentifierRequest,
    ) -> Result<DerivedIdentifier> {
        self.record("derive_identifier").await?;
        let derived = derived_for(&request);
        self.derive_requests.lock().await.push(request);
        Ok(derived)
    }

    async fn render_preview(
        &self,
        request: RenderPreviewRequest,
    ) -> Result<RenderPreviewResponse> {
        self.record("render_preview").await?;
        Self::next_delay(&self.preview_delays).await;
        let title = request
            .fields
            .get(&FieldKey::from("title"))
            .cloned()
            .unwrap_or_default();
        let serialized_text = format!(
            "@{}{{{},\n  title = {{{}}},\n}}",
            request.entry_type, request.cite_key, title
        );
        let cite_key = request.cite_key.clone();
        self.preview_requests.lock().await.push(request);
        Ok(RenderPreviewResponse {
            serialized_text,
            cite_key,
        })
    }

    async fn save_entry(&self, request: SaveEntryRequest) -> Result<SaveEntryResponse> {
        self.record("save_entry").await?;
        let mut response = self.save_entry_response.lock().await.clone();
        if response.ok && response.filename.is_empty() {
            response.filename = format!("{}.bib", request.filename);
        }
        self.save_entry_requests.lock().await.push(request);
        Ok(response)
    }

    async fn list_library(&self) -> Result<LibraryListing> {
        self.record("list_library").await?;
        Ok(LibraryListing {
            files: self.library.lock().await.clone(),
        })
    }

    async fn read_file_content(&self, path: &FilePath) -> Result<FileContentResponse> {
        self.record("read_file_content").await?;
        Self::next_delay(&self.read_delays).await;
        let content = self
            .file_contents
            .lock()
            .await
            .get(path.as_str())
            .cloned()
            .unwrap_or_else(|| format!("stored content of {path}"));
        Ok(FileContentResponse {
            content,
            error: None,
        })
    }

    async fn save_file_content(&self, request: SaveFileRequest) -> Result<SaveFileResponse> {
        self.record("save_file_content").await?;
        let response = self.save_file_response.lock().await.clone();
        if response.ok {
            self.file_contents
                .lock()
                .await
                .insert(request.path.as_str().to_string(), request.content.clone());
        }
        self.save_file_requests.lock().await.push(request);
        Ok(response)
    }

    async fn delete_file(&self, path: &FilePath) -> Result<DeleteFileResponse> {
        self.record("delete_file").await?;
        self.deleted_paths.lock().await.push(path.clone());
        Ok(self.delete_response.lock().await.clone())
    }

    async fn rename_file(&self, request: RenameFileRequest) -> Result<RenameFileResponse> {
        self.record("rename_file").await?;
        let configured = self.rename_response.lock().await.clone();
        let response = configured.unwrap_or_else(|| {
            let new_name = if request.new_name.ends_with(".bib") {
                request.new_name.clone()
            } else {
                format!("{}.bib", request.new_name)
            };
            RenameFileResponse {
                ok: true,
                new_path: Some(FilePath::new(format!("/bib/{new_name}"))),
                new_name,
                error: None,
            }
        });
        self.rename_requests.lock().await.push(request);
        Ok(response)
    }

    async fn locate_companion_sections(&self) -> Result<CompanionSectionsResponse> {
        self.record("locate_companion_sections").await?;
        Ok(CompanionSectionsResponse::default())
    }
}
