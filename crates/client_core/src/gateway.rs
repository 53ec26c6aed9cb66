//! Contract to the external backend service that parses and generates the
//! stored serialization format and edits the companion LaTeX file.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared::domain::{EntryTypeCatalog, FilePath};
use shared::protocol::{
    CompanionSectionsResponse, DeleteFileRequest, DeleteFileResponse, DeriveIdentifierRequest,
    DerivedIdentifier, FileContentRequest, FileContentResponse, LibraryListing,
    RenameFileRequest, RenameFileResponse, RenderPreviewRequest, RenderPreviewResponse,
    SaveEntryRequest, SaveEntryResponse, SaveFileRequest, SaveFileResponse, Settings,
    SettingsPatch,
};

#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn entry_type_catalog(&self) -> Result<EntryTypeCatalog>;
    async fn read_settings(&self) -> Result<Settings>;
    async fn write_settings(&self, patch: SettingsPatch) -> Result<Settings>;
    async fn derive_identifier(
        &self,
        request: DeriveIdentifierRequest,
    ) -> Result<DerivedIdentifier>;
    async fn render_preview(&self, request: RenderPreviewRequest)
        -> Result<RenderPreviewResponse>;
    async fn save_entry(&self, request: SaveEntryRequest) -> Result<SaveEntryResponse>;
    async fn list_library(&self) -> Result<LibraryListing>;
    async fn read_file_content(&self, path: &FilePath) -> Result<FileContentResponse>;
    async fn save_file_content(&self, request: SaveFileRequest) -> Result<SaveFileResponse>;
    async fn delete_file(&self, path: &FilePath) -> Result<DeleteFileResponse>;
    async fn rename_file(&self, request: RenameFileRequest) -> Result<RenameFileResponse>;
    async fn locate_companion_sections(&self) -> Result<CompanionSectionsResponse>;
}

/// JSON-over-HTTP gateway to the local backend service.
pub struct HttpBackendGateway {
    http: Client,
    base_url: String,
}

impl HttpBackendGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn get_json<R>(&self, path: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = self
            .http
            .get(self.url(path))
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {path}"))?
            .error_for_status()?;
        response
            .json()
            .await
            .with_context(|| format!("invalid backend response from {path}"))
    }

    async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .with_context(|| format!("failed to reach backend at {path}"))?
            .error_for_status()?;
        response
            .json()
            .await
            .with_context(|| format!("invalid backend response from {path}"))
    }
}

#[async_trait]
impl BackendGateway for HttpBackendGateway {
    async fn entry_type_catalog(&self) -> Result<EntryTypeCatalog> {
        self.get_json("/api/entry-types").await
    }

    async fn read_settings(&self) -> Result<Settings> {
        self.get_json("/api/settings").await
    }

    async fn write_settings(&self, patch: SettingsPatch) -> Result<Settings> {
        self.post_json("/api/settings", &patch).await
    }

    async fn derive_identifier(
        &self,
        request: DeriveIdentifierRequest,
    ) -> Result<DerivedIdentifier> {
        self.post_json("/api/cite-key", &request).await
    }

    async fn render_preview(
        &self,
        request: RenderPreviewRequest,
    ) -> Result<RenderPreviewResponse> {
        self.post_json("/api/preview", &request).await
    }

    async fn save_entry(&self, request: SaveEntryRequest) -> Result<SaveEntryResponse> {
        self.post_json("/api/save", &request).await
    }

    async fn list_library(&self) -> Result<LibraryListing> {
        self.get_json("/api/library").await
    }

    async fn read_file_content(&self, path: &FilePath) -> Result<FileContentResponse> {
        let request = FileContentRequest { path: path.clone() };
        self.post_json("/api/file-content", &request).await
    }

    async fn save_file_content(&self, request: SaveFileRequest) -> Result<SaveFileResponse> {
        self.post_json("/api/bib/save-edit", &request).await
    }

    async fn delete_file(&self, path: &FilePath) -> Result<DeleteFileResponse> {
        let request = DeleteFileRequest { path: path.clone() };
        self.post_json("/api/bib/delete", &request).await
    }

    async fn rename_file(&self, request: RenameFileRequest) -> Result<RenameFileResponse> {
        self.post_json("/api/bib/rename", &request).await
    }

    async fn locate_companion_sections(&self) -> Result<CompanionSectionsResponse> {
        self.post_json("/api/check-latex-sections", &serde_json::json!({}))
            .await
    }
}

/// Placeholder gateway for sessions wired before a backend is available.
pub struct MissingBackendGateway;

macro_rules! unavailable {
    () => {
        Err(anyhow!("backend gateway is unavailable"))
    };
}

#[async_trait]
impl BackendGateway for MissingBackendGateway {
    async fn entry_type_catalog(&self) -> Result<EntryTypeCatalog> {
        unavailable!()
    }

    async fn read_settings(&self) -> Result<Settings> {
        unavailable!()
    }

    async fn write_settings(&self, _patch: SettingsPatch) -> Result<Settings> {
        unavailable!()
    }

    async fn derive_identifier(
        &self,
        _request: DeriveIdentifierRequest,
    ) -> Result<DerivedIdentifier> {
        unavailable!()
    }

    async fn render_preview(
        &self,
        _request: RenderPreviewRequest,
    ) -> Result<RenderPreviewResponse> {
        unavailable!()
    }

    async fn save_entry(&self, _request: SaveEntryRequest) -> Result<SaveEntryResponse> {
        unavailable!()
    }

    async fn list_library(&self) -> Result<LibraryListing> {
        unavailable!()
    }

    async fn read_file_content(&self, _path: &FilePath) -> Result<FileContentResponse> {
        unavailable!()
    }

    async fn save_file_content(&self, _request: SaveFileRequest) -> Result<SaveFileResponse> {
        unavailable!()
    }

    async fn delete_file(&self, _path: &FilePath) -> Result<DeleteFileResponse> {
        unavailable!()
    }

    async fn rename_file(&self, _request: RenameFileRequest) -> Result<RenameFileResponse> {
        unavailable!()
    }

    async fn locate_companion_sections(&self) -> Result<CompanionSectionsResponse> {
        unavailable!()
    }
}

#[cfg(test)]
#[path = "tests/gateway_tests.rs"]
mod tests;
