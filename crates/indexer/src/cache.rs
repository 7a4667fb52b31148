//! Two-tier chunk cache: a bounded LRU in memory backed by optional
//! one-file-per-key JSON storage.

use crate::config::TreeSitterConfig;
use context_code_chunker::Chunk;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

pub const CHUNK_CACHE_NAMESPACE: &str = "tree-sitter-chunk";
pub const CHUNK_CACHE_SCHEMA_VERSION: &str = "1.0.0";
pub const DEFAULT_CHUNK_CACHE_MAX_ENTRIES: usize = 64;

/// Adaptive-scaling part of a cache signature
#[derive(Debug, Clone, PartialEq)]
pub enum AdaptiveSignature {
    Unset,
    Disabled,
    Thresholds {
        dense_threshold: Option<f64>,
        denser_threshold: Option<f64>,
        dense_scale: Option<f64>,
        denser_scale: Option<f64>,
    },
}

/// Effective chunking controls for one language; any change invalidates cached chunks
#[derive(Debug, Clone, PartialEq)]
pub struct CacheSignature {
    pub use_queries: Option<bool>,
    pub max_bytes: Option<usize>,
    pub max_lines: Option<usize>,
    pub max_parse_ms: Option<u64>,
    pub max_ast_nodes: Option<usize>,
    pub max_ast_stack: Option<usize>,
    pub max_chunk_nodes: Option<usize>,
    pub adaptive: AdaptiveSignature,
    pub config_chunking: bool,
}

impl CacheSignature {
    /// Per-language overrides win over global values
    #[must_use]
    pub fn resolve(config: &TreeSitterConfig, language_id: &str) -> Self {
        let local = config.language_options(language_id);
        let adaptive = match &config.adaptive {
            None => AdaptiveSignature::Unset,
            Some(adaptive) if !adaptive.enabled => AdaptiveSignature::Disabled,
            Some(adaptive) => AdaptiveSignature::Thresholds {
                dense_threshold: adaptive.dense_threshold,
                denser_threshold: adaptive.denser_threshold,
                dense_scale: adaptive.dense_scale,
                denser_scale: adaptive.denser_scale,
            },
        };
        Self {
            use_queries: config.use_queries,
            max_bytes: local.max_bytes.or(config.max_bytes),
            max_lines: local.max_lines.or(config.max_lines),
            max_parse_ms: local.max_parse_ms.or(config.max_parse_ms),
            max_ast_nodes: local.max_ast_nodes.or(config.max_ast_nodes),
            max_ast_stack: local.max_ast_stack.or(config.max_ast_stack),
            max_chunk_nodes: local.max_chunk_nodes.or(config.max_chunk_nodes),
            adaptive,
            config_chunking: config.config_chunking,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        let adaptive = match &self.adaptive {
            AdaptiveSignature::Unset => serde_json::Value::Null,
            AdaptiveSignature::Disabled => json!(false),
            AdaptiveSignature::Thresholds {
                dense_threshold,
                denser_threshold,
                dense_scale,
                denser_scale,
            } => json!({
                "denseThreshold": dense_threshold,
                "denserThreshold": denser_threshold,
                "denseScale": dense_scale,
                "denserScale": denser_scale,
            }),
        };
        json!({
            "useQueries": self.use_queries,
            "maxBytes": self.max_bytes,
            "maxLines": self.max_lines,
            "maxParseMs": self.max_parse_ms,
            "maxAstNodes": self.max_ast_nodes,
            "maxAstStack": self.max_ast_stack,
            "maxChunkNodes": self.max_chunk_nodes,
            "adaptive": adaptive,
            "configChunking": self.config_chunking,
        })
    }
}

/// Everything a cache key is derived from
#[derive(Debug, Clone, Copy)]
pub struct ChunkCacheKeyInput<'a> {
    /// Caller-supplied base key, usually the content hash
    pub base_key: &'a str,
    pub language_id: &'a str,
    pub start: usize,
    pub end: usize,
    pub signature: &'a CacheSignature,
}

/// Deterministic hex key for one cache entry
#[must_use]
pub fn build_chunk_cache_key(input: &ChunkCacheKeyInput<'_>) -> String {
    // Objects serialize with sorted keys, so the payload is canonical.
    let payload = json!({
        "namespace": CHUNK_CACHE_NAMESPACE,
        "payload": {
            "key": input.base_key,
            "languageId": input.language_id,
            "start": input.start,
            "end": input.end,
            "signature": input.signature.to_json(),
        },
    });
    let mut hasher = Sha256::new();
    hasher.update(payload.to_string().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Cache key for a segment, or `None` when caching is off or no base key exists
#[must_use]
pub fn resolve_chunk_cache_key(
    config: &TreeSitterConfig,
    language_id: &str,
    base_key: Option<&str>,
    start: usize,
    end: usize,
) -> Option<String> {
    if !config.chunk_cache {
        return None;
    }
    let base_key = config
        .cache_key
        .as_deref()
        .or(base_key)
        .filter(|key| !key.is_empty())?;
    let signature = CacheSignature::resolve(config, language_id);
    Some(build_chunk_cache_key(&ChunkCacheKeyInput {
        base_key,
        language_id,
        start,
        end,
        signature: &signature,
    }))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub evictions: u64,
    pub persistent_hits: u64,
    pub persistent_misses: u64,
    pub persistent_writes: u64,
    pub persistent_errors: u64,
}

/// Bounded in-memory tier
pub struct MemoryChunkCache {
    entries: LruCache<String, Vec<Chunk>>,
}

impl MemoryChunkCache {
    /// Capacity is clamped to at least one entry
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: LruCache::new(capacity(max_entries)),
        }
    }

    #[must_use]
    pub fn max_entries(&self) -> usize {
        self.entries.cap().get()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Changing the capacity drops every entry
    pub fn resize(&mut self, max_entries: usize) {
        let cap = capacity(max_entries);
        if cap != self.entries.cap() {
            self.entries.clear();
            self.entries.resize(cap);
        }
    }

    /// Returns an owned copy and marks the entry most recently used
    pub fn get(&mut self, key: &str, metrics: &mut CacheMetrics) -> Option<Vec<Chunk>> {
        match self.entries.get(key) {
            Some(chunks) => {
                metrics.hits += 1;
                Some(chunks.clone())
            }
            None => {
                metrics.misses += 1;
                None
            }
        }
    }

    /// Empty lists are never stored
    pub fn set(&mut self, key: &str, chunks: &[Chunk], metrics: &mut CacheMetrics) {
        if chunks.is_empty() {
            return;
        }
        metrics.sets += 1;
        if let Some((evicted, _)) = self.entries.push(key.to_string(), chunks.to_vec()) {
            if evicted != key {
                metrics.evictions += 1;
            }
        }
    }
}

fn capacity(max_entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedChunks {
    schema_version: String,
    cache_key: String,
    chunks: Vec<Chunk>,
}

/// One JSON file per key, sharded by the first two characters of the key
pub struct PersistentChunkCache {
    root: PathBuf,
    memo: HashMap<String, Vec<Chunk>>,
    misses: HashSet<String>,
}

impl PersistentChunkCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            memo: HashMap::new(),
            misses: HashSet::new(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe = safe_key(key);
        let shard: String = safe.chars().take(2).collect();
        let shard = if shard.is_empty() { "00".to_string() } else { shard };
        self.root.join(shard).join(format!("{safe}.json"))
    }

    /// Missing, corrupt or mismatched files are misses and are remembered as such
    pub fn read(&mut self, key: &str, metrics: &mut CacheMetrics) -> Option<Vec<Chunk>> {
        if let Some(chunks) = self.memo.get(key) {
            metrics.persistent_hits += 1;
            return Some(chunks.clone());
        }
        if self.misses.contains(key) {
            metrics.persistent_misses += 1;
            return None;
        }

        let path = self.path_for(key);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(_) => {
                self.misses.insert(key.to_string());
                metrics.persistent_misses += 1;
                return None;
            }
        };
        let persisted: PersistedChunks = match serde_json::from_slice(&bytes) {
            Ok(persisted) => persisted,
            Err(e) => {
                log::debug!("Unreadable chunk cache entry {}: {e}", path.display());
                self.misses.insert(key.to_string());
                metrics.persistent_errors += 1;
                return None;
            }
        };
        if persisted.schema_version != CHUNK_CACHE_SCHEMA_VERSION
            || persisted.cache_key != key
            || persisted.chunks.is_empty()
        {
            self.misses.insert(key.to_string());
            metrics.persistent_misses += 1;
            return None;
        }

        metrics.persistent_hits += 1;
        self.memo.insert(key.to_string(), persisted.chunks.clone());
        Some(persisted.chunks)
    }

    /// Write through a temp file and rename; failures are counted, never raised
    pub fn write(&mut self, key: &str, chunks: &[Chunk], metrics: &mut CacheMetrics) {
        if chunks.is_empty() {
            return;
        }
        let path = self.path_for(key);
        let persisted = PersistedChunks {
            schema_version: CHUNK_CACHE_SCHEMA_VERSION.to_string(),
            cache_key: key.to_string(),
            chunks: chunks.to_vec(),
        };
        match write_atomic(&path, &persisted) {
            Ok(()) => {
                self.misses.remove(key);
                self.memo.insert(key.to_string(), persisted.chunks);
                metrics.persistent_writes += 1;
            }
            Err(e) => {
                log::warn!("Failed to write chunk cache entry {}: {e}", path.display());
                metrics.persistent_errors += 1;
            }
        }
    }
}

fn write_atomic(path: &Path, persisted: &PersistedChunks) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let bytes = serde_json::to_vec(persisted)?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, bytes)?;
    std::fs::rename(&tmp, path)
}

fn safe_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Read-through composition of both tiers
pub struct ChunkCacheStore {
    memory: MemoryChunkCache,
    persistent: Option<PersistentChunkCache>,
    metrics: CacheMetrics,
}

impl Default for ChunkCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_CACHE_MAX_ENTRIES)
    }
}

impl ChunkCacheStore {
    pub fn new(max_entries: usize) -> Self {
        Self {
            memory: MemoryChunkCache::new(max_entries),
            persistent: None,
            metrics: CacheMetrics::default(),
        }
    }

    #[must_use]
    pub fn with_persistent(mut self, root: impl Into<PathBuf>) -> Self {
        self.persistent = Some(PersistentChunkCache::new(root));
        self
    }

    /// Align capacity and persistent root with a configuration.
    ///
    /// A new persistent root starts with empty hit/miss memos.
    pub fn configure(&mut self, config: &TreeSitterConfig) {
        self.memory.resize(config.resolved_cache_entries());
        match config.persistent_cache_dir() {
            Some(dir) => {
                let same_root = self
                    .persistent
                    .as_ref()
                    .is_some_and(|cache| cache.root() == dir.as_path());
                if !same_root {
                    self.persistent = Some(PersistentChunkCache::new(dir.clone()));
                }
            }
            None => self.persistent = None,
        }
    }

    pub fn load(&mut self, key: &str) -> Option<Vec<Chunk>> {
        if let Some(chunks) = self.memory.get(key, &mut self.metrics) {
            return Some(chunks);
        }
        let chunks = self
            .persistent
            .as_mut()?
            .read(key, &mut self.metrics)?;
        self.memory.set(key, &chunks, &mut self.metrics);
        Some(chunks)
    }

    pub fn store(&mut self, key: &str, chunks: &[Chunk]) {
        self.memory.set(key, chunks, &mut self.metrics);
        if let Some(persistent) = self.persistent.as_mut() {
            persistent.write(key, chunks, &mut self.metrics);
        }
    }

    #[must_use]
    pub const fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    #[must_use]
    pub fn memory_len(&self) -> usize {
        self.memory.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn chunk(start: usize, end: usize) -> Chunk {
        Chunk {
            start,
            end,
            name: Some(format!("c{start}")),
            kind: Some("function".to_string()),
            meta: Default::default(),
            segment: None,
        }
    }

    fn key(base: &str, end: usize) -> String {
        let signature = CacheSignature::resolve(&TreeSitterConfig::default(), "rust");
        build_chunk_cache_key(&ChunkCacheKeyInput {
            base_key: base,
            language_id: "rust",
            start: 0,
            end,
            signature: &signature,
        })
    }

    #[test]
    fn keys_are_deterministic() {
        assert_eq!(key("abc", 42), key("abc", 42));
        assert_ne!(key("abc", 42), key("abc", 43));
        assert_ne!(key("abc", 42), key("abd", 42));
        assert_eq!(key("abc", 42).len(), 64);
    }

    #[test]
    fn signature_changes_key() {
        let mut config = TreeSitterConfig::default();
        let before = resolve_chunk_cache_key(&config, "rust", Some("abc"), 0, 10);
        config.max_lines = Some(10);
        let after = resolve_chunk_cache_key(&config, "rust", Some("abc"), 0, 10);
        assert!(before.is_some());
        assert_ne!(before, after);
    }

    #[test]
    fn no_key_without_base_or_when_disabled() {
        let config = TreeSitterConfig::default();
        assert_eq!(resolve_chunk_cache_key(&config, "rust", None, 0, 1), None);
        assert_eq!(resolve_chunk_cache_key(&config, "rust", Some(""), 0, 1), None);
        let off = TreeSitterConfig {
            chunk_cache: false,
            ..Default::default()
        };
        assert_eq!(resolve_chunk_cache_key(&off, "rust", Some("abc"), 0, 1), None);
    }

    #[test]
    fn lru_evicts_least_recently_used() {
        let mut metrics = CacheMetrics::default();
        let mut cache = MemoryChunkCache::new(2);
        cache.set("k1", &[chunk(0, 1)], &mut metrics);
        cache.set("k2", &[chunk(1, 2)], &mut metrics);
        assert!(cache.get("k1", &mut metrics).is_some());
        cache.set("k3", &[chunk(2, 3)], &mut metrics);

        assert!(cache.get("k2", &mut metrics).is_none());
        assert!(cache.get("k1", &mut metrics).is_some());
        assert!(cache.get("k3", &mut metrics).is_some());
        assert_eq!(metrics.evictions, 1);
        assert_eq!(metrics.sets, 3);
    }

    #[test]
    fn returned_chunks_are_copies() {
        let mut metrics = CacheMetrics::default();
        let mut cache = MemoryChunkCache::new(4);
        cache.set("k", &[chunk(0, 10)], &mut metrics);
        let mut first = cache.get("k", &mut metrics).unwrap();
        first[0].end = 5;
        assert_eq!(cache.get("k", &mut metrics).unwrap()[0].end, 10);
    }

    #[test]
    fn empty_lists_and_zero_capacity() {
        let mut metrics = CacheMetrics::default();
        let mut cache = MemoryChunkCache::new(0);
        assert_eq!(cache.max_entries(), 1);
        cache.set("k", &[], &mut metrics);
        assert!(cache.is_empty());
        assert_eq!(metrics.sets, 0);
    }

    #[test]
    fn resize_clears_entries() {
        let mut metrics = CacheMetrics::default();
        let mut cache = MemoryChunkCache::new(2);
        cache.set("k", &[chunk(0, 1)], &mut metrics);
        cache.resize(2);
        assert_eq!(cache.len(), 1);
        cache.resize(8);
        assert!(cache.is_empty());
        assert_eq!(cache.max_entries(), 8);
    }

    #[test]
    fn persistent_round_trip_and_sharding() {
        let dir = TempDir::new().unwrap();
        let mut metrics = CacheMetrics::default();
        let key = key("abc", 42);

        let mut writer = PersistentChunkCache::new(dir.path());
        writer.write(&key, &[chunk(0, 42)], &mut metrics);
        let path = writer.path_for(&key);
        assert!(path.exists());
        assert_eq!(
            path.parent().unwrap().file_name().unwrap().to_str().unwrap(),
            &key[..2]
        );

        let mut reader = PersistentChunkCache::new(dir.path());
        assert_eq!(reader.read(&key, &mut metrics), Some(vec![chunk(0, 42)]));
        assert_eq!(metrics.persistent_writes, 1);
        assert_eq!(metrics.persistent_hits, 1);
    }

    #[test]
    fn persistent_schema_mismatch_is_a_memoized_miss() {
        let dir = TempDir::new().unwrap();
        let mut metrics = CacheMetrics::default();
        let mut cache = PersistentChunkCache::new(dir.path());
        let path = cache.path_for("k1");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(
            &path,
            r#"{"schemaVersion":"0.9.0","cacheKey":"k1","chunks":[{"start":0,"end":1,"name":null,"kind":null}]}"#,
        )
        .unwrap();

        assert_eq!(cache.read("k1", &mut metrics), None);
        assert_eq!(metrics.persistent_misses, 1);

        // The miss is remembered even after the file is fixed.
        std::fs::write(
            &path,
            r#"{"schemaVersion":"1.0.0","cacheKey":"k1","chunks":[{"start":0,"end":1,"name":null,"kind":null}]}"#,
        )
        .unwrap();
        assert_eq!(cache.read("k1", &mut metrics), None);
        assert_eq!(metrics.persistent_misses, 2);
    }

    #[test]
    fn persistent_corrupt_and_foreign_keys() {
        let dir = TempDir::new().unwrap();
        let mut metrics = CacheMetrics::default();
        let mut cache = PersistentChunkCache::new(dir.path());

        let corrupt = cache.path_for("bad");
        std::fs::create_dir_all(corrupt.parent().unwrap()).unwrap();
        std::fs::write(&corrupt, "{not json").unwrap();
        assert_eq!(cache.read("bad", &mut metrics), None);
        assert_eq!(metrics.persistent_errors, 1);

        let foreign = cache.path_for("mine");
        std::fs::create_dir_all(foreign.parent().unwrap()).unwrap();
        std::fs::write(
            &foreign,
            r#"{"schemaVersion":"1.0.0","cacheKey":"theirs","chunks":[{"start":0,"end":1,"name":null,"kind":null}]}"#,
        )
        .unwrap();
        assert_eq!(cache.read("mine", &mut metrics), None);
    }

    #[test]
    fn safe_key_and_empty_shard() {
        assert_eq!(safe_key("a/b:c.d-e_f"), "a_b_c.d-e_f");
        let cache = PersistentChunkCache::new("/tmp/root");
        assert_eq!(cache.path_for(""), PathBuf::from("/tmp/root/00/.json"));
    }

    #[test]
    fn store_reads_through_and_promotes() {
        let dir = TempDir::new().unwrap();
        let mut first = ChunkCacheStore::new(4).with_persistent(dir.path());
        first.store("k", &[chunk(0, 3)]);

        let mut second = ChunkCacheStore::new(4).with_persistent(dir.path());
        assert_eq!(second.memory_len(), 0);
        assert_eq!(second.load("k"), Some(vec![chunk(0, 3)]));
        assert_eq!(second.memory_len(), 1);
        assert_eq!(second.load("k"), Some(vec![chunk(0, 3)]));

        let metrics = second.metrics();
        assert_eq!(metrics.persistent_hits, 1);
        assert_eq!(metrics.hits, 1);
        assert_eq!(metrics.misses, 1);
        assert_eq!(second.load("missing"), None);
    }

    #[test]
    fn configure_follows_config() {
        let dir = TempDir::new().unwrap();
        let mut store = ChunkCacheStore::default();
        store.store("k", &[chunk(0, 1)]);
        let config = TreeSitterConfig {
            chunk_cache_max_entries: 8,
            cache_persistent: true,
            cache_persistent_dir: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        store.configure(&config);
        assert_eq!(store.memory_len(), 0);
        store.store("k", &[chunk(0, 1)]);
        assert_eq!(store.metrics().persistent_writes, 1);
    }
}
