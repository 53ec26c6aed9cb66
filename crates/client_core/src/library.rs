use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use shared::domain::{EntryTypeCatalog, FilePath, LibraryFile, TypeKey};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::error::SessionError;
use crate::events::SessionEvent;
use crate::gateway::BackendGateway;
use crate::SessionContext;

const ISBN_COVER_URL: &str = "https://covers.openlibrary.org/b/isbn";
const FAVICON_LOOKUP_URL: &str = "https://www.google.com/s2/favicons";
const FALLBACK_TYPE_ICON: &str = "bi-file-earmark-text";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortMode {
    Title,
    Author,
    YearDesc,
    YearAsc,
    /// Backend pre-sorts the listing by recency; no client-side reordering.
    #[default]
    Modified,
}

/// AND-combination of three optional predicates. Blank predicates pass
/// everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryFilter {
    pub query: String,
    pub entry_type: Option<TypeKey>,
    pub year: Option<String>,
}

impl LibraryFilter {
    pub fn matches(&self, file: &LibraryFile) -> bool {
        let query = self.query.trim().to_lowercase();
        if !query.is_empty() {
            let haystacks = [
                &file.title,
                &file.author,
                &file.key,
                &file.publisher,
                &file.name,
            ];
            if !haystacks
                .iter()
                .any(|value| value.to_lowercase().contains(&query))
            {
                return false;
            }
        }
        if let Some(entry_type) = self.entry_type.as_ref().filter(|key| !key.is_empty()) {
            if file.entry_type != entry_type.as_str() {
                return false;
            }
        }
        if let Some(year) = self.year.as_deref().filter(|year| !year.is_empty()) {
            if file.year != year {
                return false;
            }
        }
        true
    }
}

/// Filter facets derived from one collection snapshot. Always recomputed in
/// the same critical section that replaces the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LibraryFacets {
    pub total: usize,
    /// Every catalog type in catalog order, zero counts included.
    pub type_counts: Vec<(TypeKey, usize)>,
    /// Distinct non-blank years, newest first.
    pub years: Vec<String>,
}

pub fn compute_facets(files: &[LibraryFile], catalog: &EntryTypeCatalog) -> LibraryFacets {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for file in files {
        if !file.entry_type.is_empty() {
            *counts.entry(file.entry_type.as_str()).or_default() += 1;
        }
    }
    let type_counts = catalog
        .keys()
        .map(|key| (key.clone(), counts.get(key.as_str()).copied().unwrap_or(0)))
        .collect();
    let years: BTreeSet<&str> = files
        .iter()
        .map(|file| file.year.as_str())
        .filter(|year| !year.is_empty())
        .collect();
    LibraryFacets {
        total: files.len(),
        type_counts,
        years: years.into_iter().rev().map(str::to_string).collect(),
    }
}

/// Display cover for one entry, resolved through the fallback chain
/// ISBN lookup, favicon by URL host, placeholder glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverSource {
    Isbn { url: String },
    Favicon { url: String, host: String },
    Placeholder { icon: String },
}

pub fn resolve_cover(file: &LibraryFile, catalog: &EntryTypeCatalog) -> CoverSource {
    let isbn: String = file
        .isbn
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();
    if isbn.len() >= 10 {
        return CoverSource::Isbn {
            url: format!("{ISBN_COVER_URL}/{isbn}-M.jpg"),
        };
    }
    let trimmed = file.url.trim();
    if !trimmed.is_empty() {
        if let Ok(parsed) = Url::parse(trimmed) {
            if let Some(host) = parsed.host_str() {
                return CoverSource::Favicon {
                    url: format!("{FAVICON_LOOKUP_URL}?domain={host}&sz=128"),
                    host: host.to_string(),
                };
            }
        }
    }
    placeholder_cover(file, catalog)
}

fn placeholder_cover(file: &LibraryFile, catalog: &EntryTypeCatalog) -> CoverSource {
    let icon = catalog
        .get(&TypeKey::new(file.entry_type.clone()))
        .map(|spec| spec.icon.clone())
        .unwrap_or_else(|| FALLBACK_TYPE_ICON.to_string());
    CoverSource::Placeholder { icon }
}

#[derive(Default)]
struct LibraryViewState {
    files: Vec<LibraryFile>,
    facets: LibraryFacets,
    filter: LibraryFilter,
    sort: SortMode,
    failed_covers: HashSet<FilePath>,
}

pub struct LibraryController {
    context: Arc<SessionContext>,
    gateway: Arc<dyn BackendGateway>,
    inner: Mutex<LibraryViewState>,
}

impl LibraryController {
    pub fn new(context: Arc<SessionContext>, gateway: Arc<dyn BackendGateway>) -> Arc<Self> {
        Arc::new(Self {
            context,
            gateway,
            inner: Mutex::new(LibraryViewState::default()),
        })
    }

    /// Fetch the full collection and replace the cached snapshot. Facets are
    /// recomputed under the same lock so they can never lag the snapshot.
    pub async fn load(&self) -> Result<usize, SessionError> {
        let listing = self.gateway.list_library().await.map_err(|err| {
            self.context
                .emit(SessionEvent::TransientError(format!(
                    "loading the library failed: {err}"
                )));
            SessionError::network(err)
        })?;
        let catalog = self.context.catalog().await;
        let total = {
            let mut view = self.inner.lock().await;
            view.files = listing.files;
            view.facets = compute_facets(&view.files, &catalog);
            view.failed_covers.clear();
            view.files.len()
        };
        info!(total, "library: collection loaded");
        self.context.emit(SessionEvent::LibraryLoaded { total });
        Ok(total)
    }

    pub async fn set_filter(&self, filter: LibraryFilter) {
        self.inner.lock().await.filter = filter;
    }

    pub async fn set_sort(&self, sort: SortMode) {
        self.inner.lock().await.sort = sort;
    }

    pub async fn facets(&self) -> LibraryFacets {
        self.inner.lock().await.facets.clone()
    }

    /// The filtered, sorted snapshot the presentation layer renders.
    pub async fn visible(&self) -> Vec<LibraryFile> {
        let view = self.inner.lock().await;
        let mut files: Vec<LibraryFile> = view
            .files
            .iter()
            .filter(|file| view.filter.matches(file))
            .cloned()
            .collect();
        sort_files(&mut files, view.sort);
        files
    }

    pub async fn cover_for(&self, file: &LibraryFile) -> CoverSource {
        let catalog = self.context.catalog().await;
        let view = self.inner.lock().await;
        if view.failed_covers.contains(&file.path) {
            return placeholder_cover(file, &catalog);
        }
        resolve_cover(file, &catalog)
    }

    /// Record a render-time image failure; the entry degrades to its
    /// placeholder from now on instead of staying broken.
    pub async fn mark_cover_failed(&self, file: &LibraryFile) -> CoverSource {
        debug!(path = %file.path, "library: cover failed to load, using placeholder");
        let catalog = self.context.catalog().await;
        let mut view = self.inner.lock().await;
        view.failed_covers.insert(file.path.clone());
        placeholder_cover(file, &catalog)
    }
}

fn sort_files(files: &mut [LibraryFile], sort: SortMode) {
    match sort {
        SortMode::Title => files.sort_by(|a, b| lexical(&a.title, &b.title)),
        SortMode::Author => files.sort_by(|a, b| lexical(&a.author, &b.author)),
        SortMode::YearDesc => files.sort_by(|a, b| year_key(b).cmp(year_key(a))),
        SortMode::YearAsc => files.sort_by(|a, b| year_key(a).cmp(year_key(b))),
        SortMode::Modified => {}
    }
}

fn lexical(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase())
}

fn year_key(file: &LibraryFile) -> &str {
    if file.year.is_empty() {
        "0"
    } else {
        &file.year
    }
}

#[cfg(test)]
#[path = "tests/library_tests.rs"]
mod tests;
