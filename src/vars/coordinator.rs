//! Invalidation coordinator
//!
//! Owns the variable index and keeps it consistent with the watched sources.
//!
//! - `Created` / `Changed` re-extract one source and replace its contribution.
//! - `Deleted` removes the source and then rebuilds everything, since a deletion can
//!   change what else is discoverable.
//! - A directory that appears, or disappears while it holds indexed sources, also
//!   rebuilds everything.
//! - `WatchSetChanged` and `Refresh` rebuild everything.
//!
//! Index mutations run one at a time behind a FIFO async mutex, but reading sources
//! suspends, so an operation can be overtaken while it waits. Two counters catch that:
//! the rebuild generation is bumped as soon as a rebuild is requested, and every event
//! for a source bumps that source's epoch. A per-source update that sees either counter
//! move between its request and its write throws its result away, which also covers a
//! file deleted while its content was still being read.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard};
use std::time::Instant;

use crate::config::{normalize_source, WatchConfig};
use crate::source::{SourceKind, SourceProvider};
use crate::vars::definition::SourceContribution;
use crate::vars::events::{DispatchOutcome, SourceEvent};
use crate::vars::extractor::extract_for_kind;
use crate::vars::index::VariableIndex;
use crate::vars::theme_mapper::extract_theme_mappings;

/// Index handle shared with readers
pub type SharedIndex = Arc<RwLock<VariableIndex>>;

/// Drives extraction output into the variable index in response to source events
pub struct InvalidationCoordinator<P: SourceProvider> {
    provider: Arc<P>,
    config: RwLock<WatchConfig>,
    index: SharedIndex,
    mutation_lock: tokio::sync::Mutex<()>,
    rebuild_generation: AtomicU64,
    next_epoch: AtomicU64,
    source_epochs: Mutex<HashMap<String, u64>>,
    open: AtomicBool,
}

impl<P: SourceProvider> InvalidationCoordinator<P> {
    /// Create a closed coordinator with an empty index
    pub fn new(provider: Arc<P>, config: WatchConfig) -> Self {
        Self {
            provider,
            config: RwLock::new(config),
            index: Arc::new(RwLock::new(VariableIndex::new())),
            mutation_lock: tokio::sync::Mutex::new(()),
            rebuild_generation: AtomicU64::new(0),
            next_epoch: AtomicU64::new(0),
            source_epochs: Mutex::new(HashMap::new()),
            open: AtomicBool::new(false),
        }
    }

    /// Start accepting events and build the index from scratch
    pub async fn open(&self) -> DispatchOutcome {
        self.open.store(true, Ordering::SeqCst);
        self.rebuild_all().await
    }

    /// Stop accepting events, cancel in-flight work and drop the index contents
    pub async fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
        self.rebuild_generation.fetch_add(1, Ordering::SeqCst);
        let _guard = self.mutation_lock.lock().await;
        if let Ok(mut index) = self.index.write() {
            index.clear();
        }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    /// Handle one source event
    pub async fn dispatch(&self, event: SourceEvent) -> DispatchOutcome {
        if !self.is_open() {
            log::debug!("[dispatch] Coordinator closed, ignoring {:?}", event);
            return DispatchOutcome::Ignored;
        }

        match event {
            SourceEvent::Created(source) => {
                let source = normalize_source(&source);
                if self.is_new_directory(&source) {
                    log::debug!("[dispatch] Directory {} appeared, rebuilding", source);
                    self.rebuild_all().await
                } else {
                    self.update_source(&source).await
                }
            }
            SourceEvent::Changed(source) => self.update_source(&normalize_source(&source)).await,
            SourceEvent::Deleted(source) => self.delete_source(&normalize_source(&source)).await,
            SourceEvent::WatchSetChanged(files) => {
                if let Ok(mut config) = self.config.write() {
                    config.set_watched_files(files);
                }
                self.rebuild_all().await
            }
            SourceEvent::Refresh => self.rebuild_all().await,
        }
    }

    /// Register a source and rebuild; returns `Ignored` if it was already registered
    pub async fn register_source(&self, source: &str) -> DispatchOutcome {
        let files = match self.config.write() {
            Ok(mut config) => {
                if !config.register_source(source) {
                    return DispatchOutcome::Ignored;
                }
                config.watched_files().to_vec()
            }
            Err(_) => return DispatchOutcome::Ignored,
        };
        self.dispatch(SourceEvent::WatchSetChanged(files)).await
    }

    /// Unregister a source and rebuild; returns `Ignored` if it was not registered
    pub async fn unregister_source(&self, source: &str) -> DispatchOutcome {
        let files = match self.config.write() {
            Ok(mut config) => {
                if !config.unregister_source(source) {
                    return DispatchOutcome::Ignored;
                }
                config.watched_files().to_vec()
            }
            Err(_) => return DispatchOutcome::Ignored,
        };
        self.dispatch(SourceEvent::WatchSetChanged(files)).await
    }

    /// Snapshot of the current watch configuration
    pub fn config(&self) -> WatchConfig {
        match self.config.read() {
            Ok(config) => config.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_watched(&self, source: &str) -> bool {
        self.config
            .read()
            .map(|config| config.is_watched(source))
            .unwrap_or(false)
    }

    /// Handle to the index for readers
    pub fn index(&self) -> SharedIndex {
        Arc::clone(&self.index)
    }

    /// Read access to a consistent view of the index
    pub fn read_index(&self) -> Option<RwLockReadGuard<'_, VariableIndex>> {
        self.index.read().ok()
    }

    /// Clear the index and re-extract every watched source
    pub async fn rebuild_all(&self) -> DispatchOutcome {
        let generation = self.rebuild_generation.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = self.mutation_lock.lock().await;
        if self.rebuild_superseded(generation) {
            log::debug!("[rebuild_all] Generation {} superseded before start", generation);
            return DispatchOutcome::Discarded;
        }

        let started = Instant::now();
        let config = self.config();
        let sources = match self.provider.list_watched_sources(&config).await {
            Ok(sources) => sources,
            Err(e) => {
                log::warn!("[rebuild_all] Failed to enumerate sources, keeping current index: {}", e);
                return DispatchOutcome::Discarded;
            }
        };

        let mut contributions = Vec::with_capacity(sources.len());
        for source in sources {
            let contribution = self.load_contribution(&source, &config).await;
            if self.rebuild_superseded(generation) {
                log::debug!("[rebuild_all] Generation {} superseded while reading", generation);
                return DispatchOutcome::Discarded;
            }
            contributions.push((source, contribution));
        }

        let source_count = contributions.len();
        let mut fresh = VariableIndex::new();
        fresh.rebuild_all(contributions);

        match self.index.write() {
            Ok(mut index) => {
                log::info!(
                    "[rebuild_all] Indexed {} source(s): {} variable(s), {} class(es) in {:?}",
                    source_count,
                    fresh.variable_count(),
                    fresh.class_count(),
                    started.elapsed()
                );
                *index = fresh;
                DispatchOutcome::Rebuilt
            }
            Err(_) => {
                log::error!("[rebuild_all] Index lock poisoned");
                DispatchOutcome::Discarded
            }
        }
    }

    async fn update_source(&self, source: &str) -> DispatchOutcome {
        if !self.is_watched(source) {
            return DispatchOutcome::Ignored;
        }

        let generation = self.rebuild_generation.load(Ordering::SeqCst);
        let epoch = self.bump_epoch(source);
        let _guard = self.mutation_lock.lock().await;
        if self.update_stale(generation, source, epoch) {
            log::debug!("[update_source] Update of {} superseded before start", source);
            return DispatchOutcome::Discarded;
        }

        let config = self.config();
        let contribution = self.load_contribution(source, &config).await;
        if self.update_stale(generation, source, epoch) {
            log::debug!("[update_source] Update of {} superseded while reading", source);
            return DispatchOutcome::Discarded;
        }

        match self.index.write() {
            Ok(mut index) => {
                log::debug!(
                    "[update_source] {}: {} definition(s), {} class mapping(s)",
                    source,
                    contribution.variables.len(),
                    contribution.class_mappings.len()
                );
                index.apply_contribution(source, contribution);
                DispatchOutcome::Updated
            }
            Err(_) => {
                log::error!("[update_source] Index lock poisoned");
                DispatchOutcome::Discarded
            }
        }
    }

    async fn delete_source(&self, source: &str) -> DispatchOutcome {
        if !self.is_watched(source) {
            // a removed or moved-out directory is reported as one path
            if self.indexes_sources_under(source) {
                log::debug!("[delete_source] Directory {} removed, rebuilding", source);
                return self.rebuild_all().await;
            }
            return DispatchOutcome::Ignored;
        }

        // cancels any read of this source that is still in flight
        self.bump_epoch(source);
        {
            let _guard = self.mutation_lock.lock().await;
            if let Ok(mut index) = self.index.write() {
                index.remove_source(source);
            }
        }
        self.rebuild_all().await
    }

    /// Whether a created path looks like a directory that may hold watched sources.
    ///
    /// Paths without an extension count as directories; a moved-in directory is
    /// reported as one path, not as its files.
    fn is_new_directory(&self, source: &str) -> bool {
        let config = self.config();
        if config.is_watched(source) || config.is_ignored(source) {
            return false;
        }
        let name = source.rsplit('/').next().unwrap_or(source);
        !config.is_ignored_directory(name) && Path::new(name).extension().is_none()
    }

    fn indexes_sources_under(&self, directory: &str) -> bool {
        self.index
            .read()
            .map(|index| index.has_sources_under(directory))
            .unwrap_or(false)
    }

    /// Read and extract one source; read failures contribute nothing
    async fn load_contribution(&self, source: &str, config: &WatchConfig) -> SourceContribution {
        match self.provider.read_source(source).await {
            Ok(text) => build_contribution(&text, source, SourceKind::classify(source, config)),
            Err(e) => {
                log::warn!("[load_contribution] Skipping {}: {}", source, e);
                SourceContribution::default()
            }
        }
    }

    fn bump_epoch(&self, source: &str) -> u64 {
        let epoch = self.next_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut epochs) = self.source_epochs.lock() {
            epochs.insert(source.to_string(), epoch);
        }
        epoch
    }

    fn current_epoch(&self, source: &str) -> Option<u64> {
        self.source_epochs
            .lock()
            .ok()
            .and_then(|epochs| epochs.get(source).copied())
    }

    fn rebuild_superseded(&self, generation: u64) -> bool {
        !self.is_open() || self.rebuild_generation.load(Ordering::SeqCst) != generation
    }

    fn update_stale(&self, generation: u64, source: &str, epoch: u64) -> bool {
        !self.is_open()
            || self.rebuild_generation.load(Ordering::SeqCst) != generation
            || self.current_epoch(source) != Some(epoch)
    }
}

/// Everything a source's text contributes to the index
pub fn build_contribution(text: &str, source: &str, kind: SourceKind) -> SourceContribution {
    let variables = extract_for_kind(text, source, kind);
    let class_mappings = match kind {
        SourceKind::ThemeConfig => extract_theme_mappings(text, source),
        _ => Vec::new(),
    };
    SourceContribution {
        variables,
        class_mappings,
    }
}
