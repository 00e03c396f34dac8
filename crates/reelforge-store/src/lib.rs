//! Content-addressed blob storage (§4.9).
//!
//! Two backends share one logical layout rooted at a movie scope:
//! `{base}/{movieId}/blobs/{hash[0:2]}/{hash}[.ext]`. The [`LocalBackend`]
//! persists to a real filesystem; the [`MemoryBackend`] keeps the same paths
//! in process memory and backs planning dry-runs that must not touch disk.

use std::collections::BTreeMap;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use reelforge_hash::sha256_hex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error at '{path}': {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("path '{0}' does not exist")]
    NotFound(Utf8PathBuf),
    #[error("path '{0}' is not valid utf-8")]
    NonUtf8(String),
}

/// A content-addressed reference to a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRef {
    pub hash: String,
    pub size: u64,
    pub mime_type: String,
}

/// A blob handed to a producer or returned from one: raw bytes plus the MIME
/// type that governed its storage extension.
#[derive(Debug, Clone)]
pub struct BlobInput {
    pub data: Vec<u8>,
    pub mime_type: String,
}

const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// The closed `mimeType -> extension` table (§4.9). Unknown types yield no
/// extension, matching the spec's "closed table" requirement exactly.
fn mime_type_to_ext(mime_type: &str) -> Option<&'static str> {
    match mime_type {
        "audio/mpeg" | "audio/mp3" => Some("mp3"),
        "audio/wav" | "audio/x-wav" => Some("wav"),
        "audio/webm" => Some("webm"),
        "audio/ogg" => Some("ogg"),
        "audio/flac" | "audio/x-flac" => Some("flac"),
        "audio/aac" => Some("aac"),
        "video/mp4" => Some("mp4"),
        "video/webm" => Some("webm"),
        "video/quicktime" => Some("mov"),
        "video/x-matroska" => Some("mkv"),
        "image/png" => Some("png"),
        "image/jpeg" => Some("jpg"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "text/plain" => Some("txt"),
        "application/json" => Some("json"),
        _ => None,
    }
}

/// `resolve(movieId, ...segments)` — the canonical path builder underlying
/// every backend operation so the two implementations never drift.
pub fn resolve_path(base: &Utf8Path, movie_id: &str, segments: &[&str]) -> Utf8PathBuf {
    let mut path = base.join(movie_id);
    for segment in segments {
        path.push(segment);
    }
    path
}

/// Blob storage path for content with the given hash and mime type.
pub fn blob_path(base: &Utf8Path, movie_id: &str, hash: &str, mime_type: &str) -> Utf8PathBuf {
    let (a, b) = hash.split_at(2.min(hash.len()));
    let file_name = match mime_type_to_ext(mime_type) {
        Some(ext) => format!("{b}.{ext}"),
        None => b.to_string(),
    };
    resolve_path(base, movie_id, &["blobs", a, &file_name])
}

/// One entry yielded by a streamed [`StorageBackend::list`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListEntry {
    pub path: Utf8PathBuf,
    pub is_dir: bool,
}

/// The storage backend interface (§4.9). Implementations must be safe to
/// call from multiple concurrently-running jobs without external locking —
/// writes are content-addressed and therefore naturally idempotent.
#[async_trait::async_trait]
pub trait StorageBackend: Send + Sync {
    async fn read_string(&self, path: &Utf8Path) -> Result<String, StoreError>;
    async fn read_bytes(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError>;
    async fn write(&self, path: &Utf8Path, data: &[u8]) -> Result<(), StoreError>;
    async fn file_exists(&self, path: &Utf8Path) -> Result<bool, StoreError>;
    async fn directory_exists(&self, path: &Utf8Path) -> Result<bool, StoreError>;
    async fn create_directory(&self, path: &Utf8Path) -> Result<(), StoreError>;
    /// Streamed directory listing. `deep` recurses into subdirectories.
    async fn list(&self, path: &Utf8Path, deep: bool) -> Result<Vec<ListEntry>, StoreError>;
}

/// Storage rooted at `{root}/{basePath}` on the real filesystem.
pub struct LocalBackend {
    root: Utf8PathBuf,
}

impl LocalBackend {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn to_fs(&self, path: &Utf8Path) -> Utf8PathBuf {
        self.root.join(path)
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalBackend {
    async fn read_string(&self, path: &Utf8Path) -> Result<String, StoreError> {
        let fs_path = self.to_fs(path);
        tokio::fs::read_to_string(&fs_path)
            .await
            .map_err(|source| StoreError::Io { path: fs_path, source })
    }

    async fn read_bytes(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        let fs_path = self.to_fs(path);
        tokio::fs::read(&fs_path)
            .await
            .map_err(|source| StoreError::Io { path: fs_path, source })
    }

    async fn write(&self, path: &Utf8Path, data: &[u8]) -> Result<(), StoreError> {
        let fs_path = self.to_fs(path);
        if let Some(parent) = fs_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| StoreError::Io { path: parent.to_path_buf(), source })?;
        }
        tokio::fs::write(&fs_path, data)
            .await
            .map_err(|source| StoreError::Io { path: fs_path, source })
    }

    async fn file_exists(&self, path: &Utf8Path) -> Result<bool, StoreError> {
        let fs_path = self.to_fs(path);
        match tokio::fs::metadata(&fs_path).await {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path: fs_path, source }),
        }
    }

    async fn directory_exists(&self, path: &Utf8Path) -> Result<bool, StoreError> {
        let fs_path = self.to_fs(path);
        match tokio::fs::metadata(&fs_path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(StoreError::Io { path: fs_path, source }),
        }
    }

    async fn create_directory(&self, path: &Utf8Path) -> Result<(), StoreError> {
        let fs_path = self.to_fs(path);
        tokio::fs::create_dir_all(&fs_path)
            .await
            .map_err(|source| StoreError::Io { path: fs_path, source })
    }

    async fn list(&self, path: &Utf8Path, deep: bool) -> Result<Vec<ListEntry>, StoreError> {
        let fs_path = self.to_fs(path);
        let mut out = Vec::new();
        list_recursive(&fs_path, &self.root, deep, &mut out).await?;
        Ok(out)
    }
}

fn list_recursive<'a>(
    dir: &'a Utf8Path,
    root: &'a Utf8Path,
    deep: bool,
    out: &'a mut Vec<ListEntry>,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<(), StoreError>> + Send + 'a>> {
    Box::pin(async move {
        let mut rd = match tokio::fs::read_dir(dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(source) => return Err(StoreError::Io { path: dir.to_path_buf(), source }),
        };
        while let Some(entry) = rd
            .next_entry()
            .await
            .map_err(|source| StoreError::Io { path: dir.to_path_buf(), source })?
        {
            let entry_path = Utf8PathBuf::from_path_buf(entry.path())
                .map_err(|p| StoreError::NonUtf8(p.to_string_lossy().into_owned()))?;
            let relative = entry_path
                .strip_prefix(root)
                .unwrap_or(&entry_path)
                .to_path_buf();
            let is_dir = entry
                .file_type()
                .await
                .map_err(|source| StoreError::Io { path: entry_path.clone(), source })?
                .is_dir();
            out.push(ListEntry { path: relative, is_dir });
            if deep && is_dir {
                list_recursive(&entry_path, root, deep, out).await?;
            }
        }
        Ok(())
    })
}

/// In-memory backend used for planning dry-runs: same logical paths as
/// [`LocalBackend`], kept in a process-local map instead of on disk.
#[derive(Default)]
pub struct MemoryBackend {
    files: Mutex<BTreeMap<Utf8PathBuf, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl StorageBackend for MemoryBackend {
    async fn read_string(&self, path: &Utf8Path) -> Result<String, StoreError> {
        let bytes = self.read_bytes(path).await?;
        String::from_utf8(bytes).map_err(|_| StoreError::NonUtf8(path.to_string()))
    }

    async fn read_bytes(&self, path: &Utf8Path) -> Result<Vec<u8>, StoreError> {
        self.files
            .lock()
            .expect("memory backend mutex poisoned")
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    async fn write(&self, path: &Utf8Path, data: &[u8]) -> Result<(), StoreError> {
        self.files
            .lock()
            .expect("memory backend mutex poisoned")
            .insert(path.to_path_buf(), data.to_vec());
        Ok(())
    }

    async fn file_exists(&self, path: &Utf8Path) -> Result<bool, StoreError> {
        Ok(self
            .files
            .lock()
            .expect("memory backend mutex poisoned")
            .contains_key(path))
    }

    async fn directory_exists(&self, path: &Utf8Path) -> Result<bool, StoreError> {
        let prefix = format!("{path}/");
        Ok(self
            .files
            .lock()
            .expect("memory backend mutex poisoned")
            .keys()
            .any(|p| p.as_str().starts_with(&prefix)))
    }

    async fn create_directory(&self, _path: &Utf8Path) -> Result<(), StoreError> {
        Ok(())
    }

    async fn list(&self, path: &Utf8Path, deep: bool) -> Result<Vec<ListEntry>, StoreError> {
        let prefix = format!("{path}/");
        let files = self.files.lock().expect("memory backend mutex poisoned");
        let mut seen_dirs = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for key in files.keys() {
            let Some(rest) = key.as_str().strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                None => out.push(ListEntry { path: key.clone(), is_dir: false }),
                Some((dir, _)) => {
                    let dir_path = Utf8PathBuf::from(format!("{path}/{dir}"));
                    if deep {
                        out.push(ListEntry { path: key.clone(), is_dir: false });
                    } else if seen_dirs.insert(dir_path.clone()) {
                        out.push(ListEntry { path: dir_path, is_dir: true });
                    }
                }
            }
        }
        Ok(out)
    }
}

/// `{root}/{basePath}` scoping plus the movie id, threaded through every
/// storage operation so core code never constructs a raw path by hand.
pub struct StorageContext<B: StorageBackend> {
    pub backend: B,
    pub base_path: Utf8PathBuf,
    pub movie_id: String,
}

impl<B: StorageBackend> StorageContext<B> {
    pub fn new(backend: B, base_path: impl Into<Utf8PathBuf>, movie_id: impl Into<String>) -> Self {
        Self {
            backend,
            base_path: base_path.into(),
            movie_id: movie_id.into(),
        }
    }

    pub fn resolve(&self, segments: &[&str]) -> Utf8PathBuf {
        resolve_path(&self.base_path, &self.movie_id, segments)
    }

    pub fn blob_path(&self, hash: &str, mime_type: &str) -> Utf8PathBuf {
        blob_path(&self.base_path, &self.movie_id, hash, mime_type)
    }
}

/// `persistBlobToStorage` (§4.9): hash the bytes, derive the content-addressed
/// path, write once if absent, and return the resulting [`BlobRef`].
///
/// Idempotent: a second call with identical bytes resolves to the same path
/// and returns a `BlobRef` with an equal hash and size (§8 property 6).
#[tracing::instrument(skip(ctx, data), fields(movie_id = %ctx.movie_id, size = data.len()))]
pub async fn persist_blob_to_storage<B: StorageBackend>(
    ctx: &StorageContext<B>,
    data: &[u8],
    mime_type: Option<&str>,
) -> Result<BlobRef, StoreError> {
    let mime_type = mime_type.unwrap_or(DEFAULT_MIME_TYPE).to_string();
    let hash = sha256_hex(data);
    let size = data.len() as u64;
    let path = ctx.blob_path(&hash, &mime_type);

    if !ctx.backend.file_exists(&path).await? {
        ctx.backend.write(&path, data).await?;
        tracing::debug!(hash = %hash, path = %path, "persisted new blob");
    } else {
        tracing::debug!(hash = %hash, path = %path, "blob already present, skipping write");
    }

    Ok(BlobRef { hash, size, mime_type })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_backend_persists_and_reads_back() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let blob = persist_blob_to_storage(&ctx, b"hello world", Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(blob.size, 11);
        let path = ctx.blob_path(&blob.hash, &blob.mime_type);
        let read_back = ctx.backend.read_bytes(&path).await.unwrap();
        assert_eq!(read_back, b"hello world");
    }

    #[tokio::test]
    async fn persist_is_idempotent_on_identical_bytes() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let a = persist_blob_to_storage(&ctx, b"same bytes", Some("text/plain"))
            .await
            .unwrap();
        let b = persist_blob_to_storage(&ctx, b"same bytes", Some("text/plain"))
            .await
            .unwrap();
        assert_eq!(a.hash, b.hash);
        assert_eq!(a.size, b.size);
    }

    #[tokio::test]
    async fn unknown_mime_type_yields_no_extension() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        let blob = persist_blob_to_storage(&ctx, b"data", Some("application/x-unknown"))
            .await
            .unwrap();
        let path = ctx.blob_path(&blob.hash, &blob.mime_type);
        assert!(!path.as_str().contains('.'));
    }

    #[tokio::test]
    async fn local_backend_roundtrips_through_tempdir() {
        let dir = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).unwrap();
        let ctx = StorageContext::new(LocalBackend::new(root), "storage", "movie-1");
        let blob = persist_blob_to_storage(&ctx, b"disk bytes", Some("audio/wav"))
            .await
            .unwrap();
        let path = ctx.blob_path(&blob.hash, &blob.mime_type);
        assert!(path.as_str().ends_with(".wav"));
        let content = ctx.backend.read_bytes(&path).await.unwrap();
        assert_eq!(content, b"disk bytes");
    }

    #[tokio::test]
    async fn list_reports_shallow_entries_by_default() {
        let ctx = StorageContext::new(MemoryBackend::new(), "storage", "movie-1");
        ctx.backend
            .write(Utf8Path::new("storage/movie-1/blobs/ab/deadbeef"), b"x")
            .await
            .unwrap();
        let entries = ctx
            .backend
            .list(Utf8Path::new("storage/movie-1/blobs"), false)
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_dir);
    }
}
