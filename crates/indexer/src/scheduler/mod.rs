//! Grammar scheduling: serialized per-language passes over one shared parser,
//! crash isolation, scheduled-chunk consumption and batch deferral.

mod crash;
mod deferral;
mod grammar;
mod lookup;
mod passes;

pub use crash::{
    crash_signature, persist_crash_bundle, CrashBundle, CrashEvent, CrashTracker,
    CRASH_BUNDLE_FILE, CRASH_BUNDLE_SCHEMA_VERSION,
};
pub use deferral::{DeferralTracker, FileEntry, FileReadiness};
pub use grammar::{BuiltinGrammarLoader, GrammarEngine, GrammarLoader, GrammarTable};
pub use lookup::{chunk_with_scheduler, ScheduledChunkIndex, ScheduledChunkSource};
pub use passes::{
    chunk_with_language_passes, resolve_required_languages, segment_tree_sitter_language,
    segment_virtual_path, PassRequest,
};

use crate::cache::{CacheMetrics, ChunkCacheStore};
use crate::config::TreeSitterConfig;
use crate::Result;
use context_code_chunker::Chunk;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Process-wide scheduler state, constructed once per batch and shared by reference.
///
/// The engine mutex is the single serialization point for grammar passes;
/// paths that never touch the shared parser do not take it.
pub struct SchedulerState {
    engine: tokio::sync::Mutex<GrammarEngine>,
    loader: Arc<dyn GrammarLoader>,
    cache: Mutex<ChunkCacheStore>,
    crashes: Mutex<CrashTracker>,
    warned: Mutex<HashSet<String>>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self::new()
    }
}

impl SchedulerState {
    pub fn new() -> Self {
        Self::with_loader(Arc::new(BuiltinGrammarLoader))
    }

    pub fn with_loader(loader: Arc<dyn GrammarLoader>) -> Self {
        Self {
            engine: tokio::sync::Mutex::new(GrammarEngine::new()),
            loader,
            cache: Mutex::new(ChunkCacheStore::default()),
            crashes: Mutex::new(CrashTracker::new()),
            warned: Mutex::new(HashSet::new()),
        }
    }

    #[must_use]
    pub fn with_cache(self, cache: ChunkCacheStore) -> Self {
        Self {
            cache: Mutex::new(cache),
            ..self
        }
    }

    /// Align the chunk cache with a configuration
    pub fn configure_cache(&self, config: &TreeSitterConfig) {
        lock(&self.cache).configure(config);
    }

    #[must_use]
    pub fn cache_metrics(&self) -> CacheMetrics {
        lock(&self.cache).metrics()
    }

    pub(crate) fn cache_load(&self, key: &str) -> Option<Vec<Chunk>> {
        lock(&self.cache).load(key)
    }

    pub(crate) fn cache_store(&self, key: &str, chunks: &[Chunk]) {
        lock(&self.cache).store(key, chunks);
    }

    #[must_use]
    pub fn is_degraded(&self, virtual_path: &str) -> bool {
        lock(&self.crashes).is_degraded(virtual_path)
    }

    /// Record a parser crash and degrade the virtual path
    pub fn record_crash(&self, language_id: &str, virtual_path: &str, message: &str) -> String {
        lock(&self.crashes).record(language_id, virtual_path, message)
    }

    #[must_use]
    pub fn crash_bundle(&self) -> CrashBundle {
        lock(&self.crashes).bundle()
    }

    /// Persist crash forensics when any crash was recorded
    pub async fn persist_crash_forensics(&self, dir: &Path) -> Result<Option<PathBuf>> {
        let bundle = {
            let crashes = lock(&self.crashes);
            if crashes.is_empty() {
                return Ok(None);
            }
            crashes.bundle()
        };
        persist_crash_bundle(dir, &bundle).await.map(Some)
    }

    /// True the first time a key is seen
    pub fn warn_once(&self, key: &str) -> bool {
        lock(&self.warned).insert(key.to_string())
    }

    pub async fn loaded_languages(&self) -> Vec<String> {
        self.engine.lock().await.table().loaded_languages()
    }

    pub(crate) async fn lock_engine(&self) -> tokio::sync::MutexGuard<'_, GrammarEngine> {
        self.engine.lock().await
    }

    pub(crate) fn loader(&self) -> &dyn GrammarLoader {
        self.loader.as_ref()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
