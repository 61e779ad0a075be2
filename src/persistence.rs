//! Persistence of indexes and emitted documents.
//!
//! Indexes are stored as JSON (human-readable) or bincode (compact), chosen
//! by file extension. Every write goes to a sibling temp file first and is
//! renamed over the target, so readers never see a partial index.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::chapters::chapter_text;
use crate::error::{BookIndexError, Result};
use crate::markdown::EmittedDocument;
use crate::tree::Index;

/// Default filename for the section index.
pub const DEFAULT_INDEX_FILENAME: &str = "section_index.json";

/// Filename of the full emitted markdown.
pub const FULL_MARKDOWN_FILENAME: &str = "full.md";

/// Save format for indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveFormat {
    Json,
    Bincode,
}

impl SaveFormat {
    /// Determine format from file extension; anything unknown is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some("bin") | Some("bincode") => SaveFormat::Bincode,
            _ => SaveFormat::Json,
        }
    }
}

/// Write `data` to `path` through a temp file and a rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| BookIndexError::io(parent, e))?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, data).map_err(|e| BookIndexError::io(&tmp, e))?;
    fs::rename(&tmp, path).map_err(|e| BookIndexError::io(path, e))
}

/// Save an index, format chosen by extension.
pub fn save_index(index: &Index, path: &Path) -> Result<()> {
    let data = match SaveFormat::from_path(path) {
        SaveFormat::Json => serde_json::to_string_pretty(index)
            .map_err(|e| BookIndexError::Serialization(e.to_string()))?
            .into_bytes(),
        SaveFormat::Bincode => bincode::encode_to_vec(index, bincode::config::standard())
            .map_err(|e| BookIndexError::Serialization(e.to_string()))?,
    };
    write_atomic(path, &data)
}

/// Load an index, whatever its version.
pub fn load_index(path: &Path) -> Result<Index> {
    if !path.exists() {
        return Err(BookIndexError::IndexNotFound(path.to_path_buf()));
    }
    let data = fs::read(path).map_err(|e| BookIndexError::io(path, e))?;

    match SaveFormat::from_path(path) {
        SaveFormat::Json => {
            serde_json::from_slice(&data).map_err(|e| BookIndexError::Serialization(e.to_string()))
        }
        SaveFormat::Bincode => {
            let (index, _): (Index, usize) = bincode::decode_from_slice(&data, bincode::config::standard())
                .map_err(|e| BookIndexError::Serialization(e.to_string()))?;
            Ok(index)
        }
    }
}

pub fn index_exists(path: &Path) -> bool {
    path.is_file()
}

pub fn index_size(path: &Path) -> Result<u64> {
    let metadata = fs::metadata(path).map_err(|e| BookIndexError::io(path, e))?;
    Ok(metadata.len())
}

/// One stored index with a build lock.
///
/// Callers racing on a missing or stale index wait on the lock; the first
/// one builds and saves, the rest find the fresh copy.
pub struct IndexStore {
    path: PathBuf,
    cached: Mutex<Option<Arc<Index>>>,
}

impl IndexStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cached: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The current index, built with `build` if the stored one is missing,
    /// unreadable or of an older version.
    pub async fn load_or_build<F, Fut>(&self, build: F) -> Result<Arc<Index>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Index>>,
    {
        let mut cached = self.cached.lock().await;
        if let Some(index) = cached.as_ref().filter(|i| i.is_current()) {
            return Ok(Arc::clone(index));
        }

        match load_index(&self.path) {
            Ok(index) if index.is_current() => {
                let index = Arc::new(index);
                *cached = Some(Arc::clone(&index));
                return Ok(index);
            }
            Ok(stale) => log::info!("index at {} has version {}, rebuilding", self.path.display(), stale.version),
            Err(BookIndexError::IndexNotFound(_)) => log::info!("no index at {}, building", self.path.display()),
            Err(e) => log::warn!("unreadable index at {} ({}), rebuilding", self.path.display(), e),
        }

        self.store(&mut cached, build().await?)
    }

    /// Build unconditionally and replace whatever is stored.
    pub async fn rebuild<F, Fut>(&self, build: F) -> Result<Arc<Index>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Index>>,
    {
        let mut cached = self.cached.lock().await;
        self.store(&mut cached, build().await?)
    }

    fn store(&self, cached: &mut Option<Arc<Index>>, index: Index) -> Result<Arc<Index>> {
        save_index(&index, &self.path)?;
        log::info!("saved index with {} sections to {}", index.node_count(), self.path.display());
        let index = Arc::new(index);
        *cached = Some(Arc::clone(&index));
        Ok(index)
    }
}

/// Write `full.md`, one markdown file per chapter under `chapters/` and
/// `chapters.json` into `dir`. Returns the path of `full.md`.
pub fn write_emitted(doc: &EmittedDocument, dir: &Path) -> Result<PathBuf> {
    let full = dir.join(FULL_MARKDOWN_FILENAME);
    write_atomic(&full, doc.text.as_bytes())?;

    let chapter_dir = dir.join("chapters");
    for chapter in &doc.chapters {
        let path = chapter_dir.join(format!("{}.md", chapter.id));
        write_atomic(&path, chapter_text(&doc.text, chapter).as_bytes())?;
    }

    let listing =
        serde_json::to_string_pretty(&doc.chapters).map_err(|e| BookIndexError::Serialization(e.to_string()))?;
    write_atomic(&dir.join("chapters.json"), listing.as_bytes())?;

    log::info!("wrote {} and {} chapter files", full.display(), doc.chapters.len());
    Ok(full)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chapters::Chapter;
    use crate::tree::{IndexNode, ResolvedBy, INDEX_VERSION};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn create_test_index() -> Index {
        let mut index = Index::empty("Test Document", 20, 400);
        index.roots = vec![IndexNode {
            id: "sec_1".into(),
            title: "1 Introduction".into(),
            depth: 1,
            page_start: 1,
            page_end: 20,
            line_start: 5,
            line_end: 401,
            section_number: Some("1".into()),
            printed_page: None,
            expected_page: None,
            page_source: None,
            resolved_by: ResolvedBy::HeadingScan,
            children: Vec::new(),
        }];
        index
    }

    #[test]
    fn test_save_and_load_json() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");

        let original = create_test_index();
        save_index(&original, &path).unwrap();
        assert!(index_exists(&path));
        assert!(!dir.path().join("index.json.tmp").exists());

        let loaded = load_index(&path).unwrap();
        assert_eq!(loaded, original);
        assert!(fs::read_to_string(&path).unwrap().contains("1 Introduction"));
        assert!(index_size(&path).unwrap() > 0);
    }

    #[test]
    fn test_save_and_load_bincode() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/index.bin");

        let original = create_test_index();
        save_index(&original, &path).unwrap();
        assert_eq!(load_index(&path).unwrap(), original);
    }

    #[test]
    fn test_format_detection() {
        assert_eq!(SaveFormat::from_path(Path::new("test.json")), SaveFormat::Json);
        assert_eq!(SaveFormat::from_path(Path::new("test.bin")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("test.bincode")), SaveFormat::Bincode);
        assert_eq!(SaveFormat::from_path(Path::new("test")), SaveFormat::Json);
    }

    #[test]
    fn test_load_nonexistent() {
        let result = load_index(Path::new("/nonexistent/index.json"));
        assert!(matches!(result, Err(BookIndexError::IndexNotFound(_))));
    }

    #[tokio::test]
    async fn test_stale_version_is_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        let mut stale = create_test_index();
        stale.version = INDEX_VERSION - 1;
        stale.name = "old".into();
        save_index(&stale, &path).unwrap();

        let store = IndexStore::new(&path);
        let index = store.load_or_build(|| async { Ok(create_test_index()) }).await.unwrap();
        assert_eq!(index.name, "Test Document");
        assert_eq!(load_index(&path).unwrap().version, INDEX_VERSION);
    }

    #[tokio::test]
    async fn test_current_index_is_not_rebuilt() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("index.json");
        save_index(&create_test_index(), &path).unwrap();

        let store = IndexStore::new(&path);
        let index = store
            .load_or_build(|| async { Err(BookIndexError::InvalidInput("must not build".into())) })
            .await
            .unwrap();
        assert_eq!(index.node_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_callers_share_one_build() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(IndexStore::new(dir.path().join("index.json")));
        let builds = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = Arc::clone(&store);
            let builds = Arc::clone(&builds);
            handles.push(tokio::spawn(async move {
                store
                    .load_or_build(|| async move {
                        builds.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok(create_test_index())
                    })
                    .await
                    .unwrap()
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        assert_eq!(builds.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| Arc::ptr_eq(r, &results[0])));
    }

    #[test]
    fn test_write_emitted() {
        let dir = TempDir::new().unwrap();
        let doc = EmittedDocument {
            name: "book".into(),
            text: "<!-- page 1 -->\n\nfront\n\n<!-- page 2 -->\n\n# 1. Start\n\nbody".into(),
            page_count: 2,
            chapters: vec![
                Chapter {
                    id: "front".into(),
                    title: "Front matter".into(),
                    start_page: 1,
                    end_page: 1,
                },
                Chapter {
                    id: "ch01".into(),
                    title: "1. Start".into(),
                    start_page: 2,
                    end_page: 2,
                },
            ],
            diagnostics: Vec::new(),
        };

        let full = write_emitted(&doc, dir.path()).unwrap();
        assert_eq!(fs::read_to_string(full).unwrap(), doc.text);
        let ch01 = fs::read_to_string(dir.path().join("chapters/ch01.md")).unwrap();
        assert!(ch01.starts_with("<!-- page 2 -->") && ch01.contains("# 1. Start"));
        let listing: Vec<Chapter> =
            serde_json::from_str(&fs::read_to_string(dir.path().join("chapters.json")).unwrap()).unwrap();
        assert_eq!(listing, doc.chapters);
    }
}
