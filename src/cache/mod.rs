// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Identity-keyed cache of node results with an append-only provenance log.
//!
//! # Layout
//!
//! ```text
//! <cache dir>/
//!   entries/<identity>.json   current entry, replaced atomically
//!   provenance.jsonl          one event per line, never rewritten
//! ```
//!
//! # Concurrency
//!
//! [`CacheStore::lock`] hands out one guard per identity for the whole
//! process. The engine holds it across `get`, the tool run and `put`, so two
//! subjects that need the same result run the tool once: the second waits on
//! the guard and then finds the entry. Unrelated identities never contend.
//! A lock is dropped from the table once no task holds or awaits it.
//!
//! An entry whose outputs have disappeared is reported as a miss and recorded
//! as `stale_detected`; the node re-executes and its `put` replaces the entry.
//! Entries are only removed by [`CacheStore::invalidate`].

mod identity;

pub use identity::{compute_identity, fingerprint_file, IdentityHash};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::errors::CacheError;
use crate::observability::messages::cache::{
    CacheEntryInvalidated, CacheEntryStale, CacheEntryStored,
};
use crate::observability::messages::StructuredLog;

const ENTRIES_DIR: &str = "entries";
const PROVENANCE_FILE: &str = "provenance.jsonl";

/// Declared output name -> file.
pub type OutputSet = BTreeMap<String, PathBuf>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub identity: IdentityHash,
    pub tool: String,
    pub tool_version: String,
    pub node_id: String,
    pub subject: String,
    pub params: BTreeMap<String, Value>,
    pub outputs: OutputSet,
    pub created_at: DateTime<Utc>,
}

/// Who produced an entry. Stored alongside the outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub tool: String,
    pub tool_version: String,
    pub node_id: String,
    pub subject: String,
    pub params: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProvenanceEvent {
    Stored {
        entry: CacheEntry,
    },
    StaleDetected {
        identity: IdentityHash,
        node_id: String,
        reason: String,
    },
    Invalidated {
        identity: IdentityHash,
        tool: String,
        tool_version: String,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: ProvenanceEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Invalidation {
    Identity(IdentityHash),
    /// Every entry of `tool` recorded under a version other than `current_version`
    OutdatedTool {
        tool: String,
        current_version: String,
    },
}

type LockTable = Arc<StdMutex<HashMap<IdentityHash, Arc<Mutex<()>>>>>;

fn lock_table(table: &LockTable) -> std::sync::MutexGuard<'_, HashMap<IdentityHash, Arc<Mutex<()>>>> {
    match table.lock() {
        Ok(locks) => locks,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Exclusive right to execute and store one identity.
pub struct IdentityGuard {
    identity: IdentityHash,
    guard: Option<OwnedMutexGuard<()>>,
    table: LockTable,
}

impl IdentityGuard {
    pub fn identity(&self) -> IdentityHash {
        self.identity
    }
}

impl Drop for IdentityGuard {
    fn drop(&mut self) {
        let mut locks = lock_table(&self.table);
        drop(self.guard.take());
        // Waiters hold their own clone, so a count of one means only the table is left.
        if locks
            .get(&self.identity)
            .is_some_and(|mutex| Arc::strong_count(mutex) == 1)
        {
            locks.remove(&self.identity);
        }
    }
}

pub struct CacheStore {
    root: PathBuf,
    locks: LockTable,
    provenance: Mutex<()>,
}

impl std::fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStore").field("root", &self.root).finish()
    }
}

impl CacheStore {
    /// Opens (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let root = root.into();
        let entries = root.join(ENTRIES_DIR);
        std::fs::create_dir_all(&entries).map_err(|e| CacheError::io(&entries, e))?;
        Ok(Self {
            root,
            locks: Arc::new(StdMutex::new(HashMap::new())),
            provenance: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn provenance_path(&self) -> PathBuf {
        self.root.join(PROVENANCE_FILE)
    }

    fn entry_path(&self, identity: &IdentityHash) -> PathBuf {
        self.root.join(ENTRIES_DIR).join(format!("{}.json", identity))
    }

    /// Waits until no other task holds `identity`.
    pub async fn lock(&self, identity: IdentityHash) -> IdentityGuard {
        let mutex = lock_table(&self.locks).entry(identity).or_default().clone();
        IdentityGuard {
            identity,
            guard: Some(mutex.lock_owned().await),
            table: self.locks.clone(),
        }
    }

    /// Identities with a lock currently held or awaited.
    pub fn active_locks(&self) -> usize {
        lock_table(&self.locks).len()
    }

    /// Returns the entry when every referenced output still exists and is non-empty.
    pub async fn get(&self, identity: &IdentityHash) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(identity);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        let entry: CacheEntry = serde_json::from_slice(&bytes)?;

        if let Some(reason) = missing_output(&entry.outputs).await {
            CacheEntryStale {
                identity: &identity.short(),
                node_id: &entry.node_id,
                reason: &reason,
            }
            .log();
            self.append(ProvenanceEvent::StaleDetected {
                identity: *identity,
                node_id: entry.node_id.clone(),
                reason,
            })
            .await?;
            return Ok(None);
        }
        Ok(Some(entry))
    }

    /// Records a result. The guard proves the caller owns the identity.
    pub async fn put(
        &self,
        guard: &IdentityGuard,
        outputs: OutputSet,
        metadata: EntryMetadata,
    ) -> Result<CacheEntry, CacheError> {
        let entry = CacheEntry {
            identity: guard.identity(),
            tool: metadata.tool,
            tool_version: metadata.tool_version,
            node_id: metadata.node_id,
            subject: metadata.subject,
            params: metadata.params,
            outputs,
            created_at: Utc::now(),
        };

        let path = self.entry_path(&entry.identity);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(&entry)?;
        tokio::fs::write(&tmp, bytes)
            .await
            .map_err(|e| CacheError::io(&tmp, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;

        CacheEntryStored {
            identity: &entry.identity.short(),
            node_id: &entry.node_id,
            tool: &entry.tool,
        }
        .log();
        self.append(ProvenanceEvent::Stored {
            entry: entry.clone(),
        })
        .await?;
        Ok(entry)
    }

    /// Removes entries. Returns how many were removed.
    pub async fn invalidate(&self, invalidation: Invalidation) -> Result<usize, CacheError> {
        let (targets, reason) = match &invalidation {
            Invalidation::Identity(identity) => {
                let target = self.read_entry(identity).await?;
                (target.into_iter().collect::<Vec<_>>(), "explicit invalidation".to_string())
            }
            Invalidation::OutdatedTool {
                tool,
                current_version,
            } => {
                let targets = self
                    .entries()
                    .await?
                    .into_iter()
                    .filter(|e| &e.tool == tool && &e.tool_version != current_version)
                    .collect();
                (
                    targets,
                    format!("tool '{}' is now at version {}", tool, current_version),
                )
            }
        };

        let mut removed = 0;
        for entry in targets {
            let _guard = self.lock(entry.identity).await;
            let path = self.entry_path(&entry.identity);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(CacheError::io(&path, e)),
            }
            CacheEntryInvalidated {
                identity: &entry.identity.short(),
                tool: &entry.tool,
                reason: &reason,
            }
            .log();
            self.append(ProvenanceEvent::Invalidated {
                identity: entry.identity,
                tool: entry.tool,
                tool_version: entry.tool_version,
                reason: reason.clone(),
            })
            .await?;
            removed += 1;
        }
        Ok(removed)
    }

    /// Every stored entry, sorted by identity. Unreadable files are skipped.
    pub async fn entries(&self) -> Result<Vec<CacheEntry>, CacheError> {
        let dir = self.root.join(ENTRIES_DIR);
        let mut reader = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| CacheError::io(&dir, e))?;
        let mut entries = Vec::new();
        while let Some(item) = reader
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(bytes) = tokio::fs::read(&path).await {
                if let Ok(entry) = serde_json::from_slice::<CacheEntry>(&bytes) {
                    entries.push(entry);
                }
            }
        }
        entries.sort_by(|a, b| a.identity.cmp(&b.identity));
        Ok(entries)
    }

    /// The provenance log, oldest first.
    pub async fn provenance(&self) -> Result<Vec<ProvenanceRecord>, CacheError> {
        let path = self.provenance_path();
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(CacheError::io(&path, e)),
        };
        text.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(CacheError::from))
            .collect()
    }

    async fn read_entry(&self, identity: &IdentityHash) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.entry_path(identity);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(CacheError::io(&path, e)),
        }
    }

    async fn append(&self, event: ProvenanceEvent) -> Result<(), CacheError> {
        let record = ProvenanceRecord {
            at: Utc::now(),
            event,
        };
        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let path = self.provenance_path();
        let _serialized = self.provenance.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        file.write_all(&line)
            .await
            .map_err(|e| CacheError::io(&path, e))?;
        file.flush().await.map_err(|e| CacheError::io(&path, e))
    }
}

async fn missing_output(outputs: &OutputSet) -> Option<String> {
    for (name, path) in outputs {
        match tokio::fs::metadata(path).await {
            Ok(meta) if meta.len() > 0 => {}
            Ok(_) => return Some(format!("output '{}' is empty at {}", name, path.display())),
            Err(_) => return Some(format!("output '{}' is missing at {}", name, path.display())),
        }
    }
    None
}
