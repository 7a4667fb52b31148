use std::collections::{BTreeSet, HashMap};

/// Where a file stands with respect to the grammars it needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileReadiness {
    /// Not attempted yet
    Pending,
    /// Deferred until the listed grammars are loaded for the batch
    AwaitingGrammars { missing: Vec<String>, attempts: usize },
    /// Processed, or every missing grammar is now loaded
    Ready,
    /// Deferral budget spent; processed without waiting, falling back where needed
    Abandoned { missing: Vec<String>, attempts: usize },
}

/// Snapshot the file processor consults for the deferral pre-check
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileEntry {
    /// Times this file has been deferred so far
    pub deferrals: usize,
    /// Grammars the batch has preloaded
    pub batch_languages: BTreeSet<String>,
    /// Grammar engine switched off for this file
    pub tree_sitter_disabled: bool,
    /// Grammar subset for this file
    pub allowed_languages: Option<Vec<String>>,
}

/// Batch-owned deferral state machine.
///
/// `Pending -> AwaitingGrammars -> Ready | Abandoned`; the file processor
/// only reads [`FileEntry`] snapshots and never mutates counters itself.
#[derive(Debug, Clone, Default)]
pub struct DeferralTracker {
    max_deferrals: usize,
    batch_languages: BTreeSet<String>,
    files: HashMap<String, FileReadiness>,
}

impl DeferralTracker {
    pub fn new(max_deferrals: usize) -> Self {
        Self {
            max_deferrals,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn batch_languages(&self) -> &BTreeSet<String> {
        &self.batch_languages
    }

    /// Grammars became available; files waiting only on loaded grammars turn ready
    pub fn mark_loaded<I, S>(&mut self, languages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.batch_languages
            .extend(languages.into_iter().map(Into::into));
        let loaded = &self.batch_languages;
        for state in self.files.values_mut() {
            if let FileReadiness::AwaitingGrammars { missing, .. } = state {
                if missing.iter().all(|lang| loaded.contains(lang)) {
                    *state = FileReadiness::Ready;
                }
            }
        }
    }

    #[must_use]
    pub fn readiness(&self, rel_path: &str) -> FileReadiness {
        self.files
            .get(rel_path)
            .cloned()
            .unwrap_or(FileReadiness::Pending)
    }

    /// False only while a file still waits on grammars
    #[must_use]
    pub fn is_ready(&self, rel_path: &str) -> bool {
        !matches!(
            self.files.get(rel_path),
            Some(FileReadiness::AwaitingGrammars { .. })
        )
    }

    /// Snapshot for the file processor; abandoned files are chunked without grammars
    #[must_use]
    pub fn entry(&self, rel_path: &str) -> FileEntry {
        let (deferrals, tree_sitter_disabled) = match self.files.get(rel_path) {
            Some(FileReadiness::AwaitingGrammars { attempts, .. }) => (*attempts, false),
            Some(FileReadiness::Abandoned { attempts, .. }) => (*attempts, true),
            _ => (0, false),
        };
        FileEntry {
            deferrals,
            batch_languages: self.batch_languages.clone(),
            tree_sitter_disabled,
            ..Default::default()
        }
    }

    /// Record a defer signal for a file
    pub fn record_deferral(&mut self, rel_path: &str, missing: Vec<String>) -> FileReadiness {
        let attempts = match self.files.get(rel_path) {
            Some(
                FileReadiness::AwaitingGrammars { attempts, .. }
                | FileReadiness::Abandoned { attempts, .. },
            ) => attempts + 1,
            _ => 1,
        };
        let state = if attempts >= self.max_deferrals {
            log::debug!("{rel_path}: deferral budget spent, missing {missing:?}");
            FileReadiness::Abandoned { missing, attempts }
        } else {
            FileReadiness::AwaitingGrammars { missing, attempts }
        };
        self.files.insert(rel_path.to_string(), state.clone());
        state
    }

    pub fn mark_processed(&mut self, rel_path: &str) {
        self.files.insert(rel_path.to_string(), FileReadiness::Ready);
    }

    /// Grammars the batch should preload before retrying deferred files
    #[must_use]
    pub fn pending_languages(&self) -> BTreeSet<String> {
        self.files
            .values()
            .filter_map(|state| match state {
                FileReadiness::AwaitingGrammars { missing, .. } => Some(missing),
                _ => None,
            })
            .flatten()
            .filter(|lang| !self.batch_languages.contains(*lang))
            .cloned()
            .collect()
    }
}
