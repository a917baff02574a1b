use notify::event::{ModifyKind, RenameMode};
use notify::{Event as NotifyEvent, EventKind, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

use crate::error::IndexResult;
use crate::source::relative_source;
use crate::vars::events::SourceEvent;

/// Watches the workspace recursively and turns file system events into
/// [`SourceEvent`]s.
///
/// Events are only filtered by ignored directory names here; whether a file is
/// actually watched is decided by the coordinator, whose configuration can change
/// at runtime.
pub struct WorkspaceWatcher {
    /// File watcher instance (kept alive to continue monitoring)
    _watcher: notify::RecommendedWatcher,
}

impl WorkspaceWatcher {
    /// Start watching `root`, sending events to `sender`
    ///
    /// # Arguments
    ///
    /// * `root` - Workspace root; event paths are made relative to it
    /// * `ignored_directories` - Directory names whose contents never produce events
    /// * `sender` - Channel the converted events are forwarded to
    pub fn new(
        root: &Path,
        ignored_directories: Vec<String>,
        sender: mpsc::UnboundedSender<SourceEvent>,
    ) -> IndexResult<Self> {
        let root_for_events = root.to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: Result<NotifyEvent, notify::Error>| {
            match res {
                Ok(event) => {
                    for source_event in convert_event(&root_for_events, &ignored_directories, &event) {
                        // receiver gone means the server is shutting down
                        let _ = sender.send(source_event);
                    }
                }
                Err(e) => {
                    log::warn!("File watcher error: {}", e);
                }
            }
        })?;

        watcher.watch(root, RecursiveMode::Recursive)?;
        log::info!("Watching workspace: {}", root.display());

        Ok(Self { _watcher: watcher })
    }
}

/// Convert one notify event into source events
pub fn convert_event(root: &Path, ignored_directories: &[String], event: &NotifyEvent) -> Vec<SourceEvent> {
    let sources = |paths: &[PathBuf]| -> Vec<String> {
        paths
            .iter()
            .filter_map(|path| relative_source(root, path).ok())
            .filter(|source| !is_in_ignored_directory(source, ignored_directories))
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => sources(&event.paths)
            .into_iter()
            .map(SourceEvent::Created)
            .collect(),
        EventKind::Remove(_) => sources(&event.paths)
            .into_iter()
            .map(SourceEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => sources(&event.paths)
            .into_iter()
            .map(SourceEvent::Deleted)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => sources(&event.paths)
            .into_iter()
            .map(SourceEvent::Created)
            .collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            // paths are [from, to]
            let mut events = Vec::new();
            if let Some(from) = event.paths.first() {
                events.extend(sources(std::slice::from_ref(from)).into_iter().map(SourceEvent::Deleted));
            }
            if let Some(to) = event.paths.get(1) {
                events.extend(sources(std::slice::from_ref(to)).into_iter().map(SourceEvent::Created));
            }
            events
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(_) => sources(&event.paths)
            .into_iter()
            .map(SourceEvent::Changed)
            .collect(),
        _ => Vec::new(),
    }
}

fn is_in_ignored_directory(source: &str, ignored_directories: &[String]) -> bool {
    source
        .split('/')
        .any(|component| ignored_directories.iter().any(|dir| dir == component))
}
