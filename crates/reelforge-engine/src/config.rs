//! Engine configuration (§4.9, "Configuration").
//!
//! There is no file-format loader here — a caller constructs
//! [`EngineConfig`] directly, the way a caller of `xchecker-config` builds a
//! layered config programmatically rather than the crate reading a format
//! for them. [`reelforge_producer::ProducerCatalog`] already has its own
//! fallible `builder()` for the one piece that can fail to assemble (a
//! duplicate producer alias).

use camino::Utf8PathBuf;
use reelforge_producer::ProducerCatalog;

/// Everything an [`crate::Engine`] needs to resolve storage paths and
/// producer aliases for one movie.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Filesystem root a [`reelforge_store::LocalBackend`] resolves paths
    /// against. Unused by [`crate::Engine::in_memory`].
    pub storage_root: Utf8PathBuf,
    /// The logical base path segment under which every movie is scoped
    /// (`{storage_root}/{storage_base_path}/{movie_id}/...`).
    pub storage_base_path: Utf8PathBuf,
    pub movie_id: String,
    pub catalog: ProducerCatalog,
}

impl EngineConfig {
    pub fn new(
        storage_root: impl Into<Utf8PathBuf>,
        storage_base_path: impl Into<Utf8PathBuf>,
        movie_id: impl Into<String>,
        catalog: ProducerCatalog,
    ) -> Self {
        Self {
            storage_root: storage_root.into(),
            storage_base_path: storage_base_path.into(),
            movie_id: movie_id.into(),
            catalog,
        }
    }
}
