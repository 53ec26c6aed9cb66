//! State-change notifications emitted by the session controllers. The
//! presentation layer subscribes to these; no controller holds a reference
//! back into presentation code.

use shared::domain::{LibraryFile, TypeKey};
use uuid::Uuid;

use crate::dialog::ModalRequest;
use crate::editor::EditorPhase;
use crate::preview::PreviewDocument;

#[derive(Debug, Clone)]
pub enum SessionEvent {
    SchemaSelected {
        key: TypeKey,
    },
    CompositionReset,
    IdentifierDerived {
        cite_key: String,
        filename: String,
    },
    PreviewRendered {
        preview: PreviewDocument,
    },
    EntrySaved {
        filename: String,
        companion_updated: bool,
    },
    /// Non-fatal companion-document issue. Independent of save success.
    CompanionWarning(String),
    LibraryLoaded {
        total: usize,
    },
    EditorStateChanged {
        phase: EditorPhase,
        file: Option<LibraryFile>,
    },
    DialogPresented {
        id: Uuid,
        request: ModalRequest,
    },
    Notice(String),
    TransientError(String),
}
