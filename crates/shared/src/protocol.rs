use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{FieldKey, FilePath, LibraryFile, SectionId, TypeKey};

fn default_true() -> bool {
    true
}

/// One named insertion point in the companion LaTeX document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementSection {
    pub id: SectionId,
    pub label: String,
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub active: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompanionPlacement {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub search_text: String,
    #[serde(default = "default_true")]
    pub after_last_existing: bool,
}

impl Default for CompanionPlacement {
    fn default() -> Self {
        Self {
            enabled: false,
            search_text: String::new(),
            after_last_existing: true,
        }
    }
}

/// Full settings bag as owned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub target_directory: String,
    #[serde(default)]
    pub latex_main_path: String,
    #[serde(default)]
    pub last_entry_type: String,
    #[serde(default = "default_true")]
    pub add_date_comment: bool,
    #[serde(default = "default_true")]
    pub auto_update_preview: bool,
    #[serde(default)]
    pub placement_sections: Vec<PlacementSection>,
    #[serde(default)]
    pub default_section_id: String,
    #[serde(default)]
    pub companion_placement: CompanionPlacement,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_directory: String::new(),
            latex_main_path: String::new(),
            last_entry_type: String::new(),
            add_date_comment: true,
            auto_update_preview: true,
            placement_sections: Vec::new(),
            default_section_id: String::new(),
            companion_placement: CompanionPlacement::default(),
        }
    }
}

/// Partial settings write; only the populated fields are transmitted and the
/// backend replies with the resulting full bag.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_directory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latex_main_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_entry_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_date_comment: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_update_preview: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement_sections: Option<Vec<PlacementSection>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_section_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_placement: Option<CompanionPlacement>,
}

impl SettingsPatch {
    pub fn last_entry_type(key: &TypeKey) -> Self {
        Self {
            last_entry_type: Some(key.as_str().to_string()),
            ..Self::default()
        }
    }

    pub fn auto_update_preview(enabled: bool) -> Self {
        Self {
            auto_update_preview: Some(enabled),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeriveIdentifierRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedIdentifier {
    pub cite_key: String,
    pub filename: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPreviewRequest {
    pub entry_type: TypeKey,
    pub fields: BTreeMap<FieldKey, String>,
    pub cite_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPreviewResponse {
    pub serialized_text: String,
    #[serde(default)]
    pub cite_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEntryRequest {
    pub entry_type: TypeKey,
    pub fields: BTreeMap<FieldKey, String>,
    pub cite_key: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_id: Option<SectionId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveEntryResponse {
    pub ok: bool,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub companion_updated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LibraryListing {
    #[serde(default)]
    pub files: Vec<LibraryFile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentRequest {
    pub path: FilePath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileContentResponse {
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFileRequest {
    pub path: FilePath,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaveFileResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileRequest {
    pub path: FilePath,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteFileResponse {
    pub ok: bool,
    #[serde(default)]
    pub companion_removed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub companion_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameFileRequest {
    pub path: FilePath,
    pub new_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameFileResponse {
    pub ok: bool,
    #[serde(default)]
    pub new_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_path: Option<FilePath>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompanionSectionsResponse {
    #[serde(default)]
    pub sections: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
