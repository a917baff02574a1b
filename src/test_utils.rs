//! Test utilities shared across the codebase

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::config::WatchConfig;
use crate::error::{IndexError, IndexResult};
use crate::source::SourceProvider;

/// Pauses reads of one source until released
#[derive(Clone, Default)]
pub struct ReadGate {
    /// Notified once the read has started
    pub started: Arc<Notify>,
    /// Notify to let the read finish
    pub release: Arc<Notify>,
}

/// In-memory source provider; enumeration order is lexical
#[derive(Default)]
pub struct MemorySourceProvider {
    files: Mutex<BTreeMap<String, String>>,
    gates: Mutex<HashMap<String, ReadGate>>,
    listing_fails: AtomicBool,
}

impl MemorySourceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let provider = Self::new();
        for (source, content) in files {
            provider.set(source, content);
        }
        provider
    }

    pub fn set(&self, source: &str, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(source.to_string(), content.to_string());
    }

    pub fn remove(&self, source: &str) {
        self.files.lock().unwrap().remove(source);
    }

    /// Make every listing fail until reset
    pub fn fail_listing(&self, fails: bool) {
        self.listing_fails.store(fails, Ordering::SeqCst);
    }

    /// Make the next read of `source` wait until the gate is released
    pub fn hold(&self, source: &str) -> ReadGate {
        let gate = ReadGate::default();
        self.gates
            .lock()
            .unwrap()
            .insert(source.to_string(), gate.clone());
        gate
    }
}

#[tower_lsp::async_trait]
impl SourceProvider for MemorySourceProvider {
    async fn list_watched_sources(&self, config: &WatchConfig) -> IndexResult<Vec<String>> {
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(IndexError::Io {
                message: "Failed to list workspace root".to_string(),
                source: std::io::Error::other("listing disabled"),
            });
        }
        Ok(self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter(|source| config.is_watched(source))
            .cloned()
            .collect())
    }

    async fn read_source(&self, source: &str) -> IndexResult<String> {
        let gate = self.gates.lock().unwrap().remove(source);
        if let Some(gate) = gate {
            gate.started.notify_one();
            gate.release.notified().await;
        }

        self.files
            .lock()
            .unwrap()
            .get(source)
            .cloned()
            .ok_or_else(|| IndexError::SourceNotFound {
                source_id: source.to_string(),
            })
    }
}
