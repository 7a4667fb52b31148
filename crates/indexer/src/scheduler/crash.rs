use crate::Result;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub const CRASH_BUNDLE_SCHEMA_VERSION: &str = "1.0.0";
pub const CRASH_BUNDLE_FILE: &str = "crash-forensics.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashEvent {
    pub signature: String,
    pub language_id: String,
    pub virtual_path: String,
    pub message: String,
    pub count: u64,
    pub first_seen_unix_ms: u64,
}

/// Forensics snapshot written once a batch is done
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashBundle {
    pub schema_version: String,
    pub generated_at_unix_ms: u64,
    pub failed_languages: Vec<String>,
    pub degraded_virtual_paths: Vec<String>,
    pub events: Vec<CrashEvent>,
}

/// `tscrash:` followed by 20 hex chars of a SHA-256 over the crash dimensions
#[must_use]
pub fn crash_signature(language_id: &str, virtual_path: &str, message: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update([language_id, virtual_path, message].join("|").as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    format!("tscrash:{}", &digest[..20])
}

/// Parser crashes seen in this batch.
///
/// Degradation is one-way: once a virtual path crashed it stays on the
/// heuristic chunker until the tracker is dropped.
#[derive(Debug, Default)]
pub struct CrashTracker {
    events: BTreeMap<String, CrashEvent>,
    degraded: BTreeSet<String>,
    failed_languages: BTreeSet<String>,
}

impl CrashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a crash and degrade its virtual path; returns the signature
    pub fn record(&mut self, language_id: &str, virtual_path: &str, message: &str) -> String {
        let signature = crash_signature(language_id, virtual_path, message);
        self.events
            .entry(signature.clone())
            .and_modify(|event| event.count += 1)
            .or_insert_with(|| CrashEvent {
                signature: signature.clone(),
                language_id: language_id.to_string(),
                virtual_path: virtual_path.to_string(),
                message: message.to_string(),
                count: 1,
                first_seen_unix_ms: unix_now_ms(),
            });
        self.failed_languages.insert(language_id.to_string());
        if self.degraded.insert(virtual_path.to_string()) {
            log::warn!("Parser crash {signature} for {virtual_path} ({language_id}); degrading to heuristic chunking");
        }
        signature
    }

    /// A degraded container also degrades every segment inside it
    #[must_use]
    pub fn is_degraded(&self, virtual_path: &str) -> bool {
        self.degraded.contains(virtual_path)
            || virtual_path
                .split_once("#seg:")
                .is_some_and(|(container, _)| self.degraded.contains(container))
    }

    #[must_use]
    pub fn degraded_paths(&self) -> Vec<String> {
        self.degraded.iter().cloned().collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn bundle(&self) -> CrashBundle {
        CrashBundle {
            schema_version: CRASH_BUNDLE_SCHEMA_VERSION.to_string(),
            generated_at_unix_ms: unix_now_ms(),
            failed_languages: self.failed_languages.iter().cloned().collect(),
            degraded_virtual_paths: self.degraded_paths(),
            events: self.events.values().cloned().collect(),
        }
    }
}

/// Write `crash-forensics.json` under `dir` via temp file and rename
pub async fn persist_crash_bundle(dir: &Path, bundle: &CrashBundle) -> Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;
    let path = dir.join(CRASH_BUNDLE_FILE);
    let bytes = serde_json::to_vec_pretty(bundle)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

fn unix_now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
