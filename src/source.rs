//! Source enumeration and content access
//!
//! The coordinator never touches the file system directly. It goes through a
//! [`SourceProvider`], which lists the watched sources and reads their content.
//! Source identifiers are forward-slash paths relative to the workspace root.

use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::{normalize_source, WatchConfig};
use crate::error::{IndexError, IndexResult, IoContext};

/// How a source's text is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// Plain style sheet, scanned in full
    StyleSheet,
    /// Component file, only its `<style>` regions are scanned
    Component,
    /// Theme configuration, scanned in full and mapped to utility classes
    ThemeConfig,
    /// Any other registered file, scanned in full
    Registered,
}

impl SourceKind {
    pub fn classify(source: &str, config: &WatchConfig) -> Self {
        if config.is_theme_config(source) {
            SourceKind::ThemeConfig
        } else if config.is_style_sheet(source) {
            SourceKind::StyleSheet
        } else if config.is_component(source) {
            SourceKind::Component
        } else {
            SourceKind::Registered
        }
    }
}

/// Access to the sources the index is built from
#[tower_lsp::async_trait]
pub trait SourceProvider: Send + Sync {
    /// Every currently watched source, in a stable enumeration order
    async fn list_watched_sources(&self, config: &WatchConfig) -> IndexResult<Vec<String>>;

    /// Current content of a source
    async fn read_source(&self, source: &str) -> IndexResult<String>;
}

/// Source provider backed by the workspace directory
#[derive(Debug, Clone)]
pub struct FsSourceProvider {
    root: PathBuf,
}

impl FsSourceProvider {
    pub fn new(root: PathBuf) -> Self {
        // notify reports canonical paths, keep the root comparable with them
        let root = std::fs::canonicalize(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Workspace-relative identifier for an absolute path
    pub fn relative_source(&self, path: &Path) -> IndexResult<String> {
        relative_source(&self.root, path)
    }

    /// Absolute path for a source identifier
    pub fn absolute_path(&self, source: &str) -> PathBuf {
        self.root.join(normalize_source(source))
    }

    /// Walk the workspace, skipping ignored directories
    async fn walk(&self, config: &WatchConfig) -> IndexResult<Vec<String>> {
        let mut sources = Vec::new();
        let mut pending = vec![self.root.clone()];

        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir == self.root => {
                    return Err(e).with_io_context("Failed to read workspace root");
                }
                Err(e) => {
                    log::warn!("Skipping unreadable directory {}: {}", dir.display(), e);
                    continue;
                }
            };

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) if dir == self.root => {
                        return Err(e).with_io_context("Failed to list workspace root");
                    }
                    Err(e) => {
                        log::warn!("Stopped listing {}: {}", dir.display(), e);
                        break;
                    }
                };
                let path = entry.path();
                let file_type = match entry.file_type().await {
                    Ok(file_type) => file_type,
                    Err(e) => {
                        log::debug!("Cannot stat {}: {}", path.display(), e);
                        continue;
                    }
                };

                if file_type.is_dir() {
                    let ignored = path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .map(|name| config.is_ignored_directory(name))
                        .unwrap_or(false);
                    if !ignored {
                        pending.push(path);
                    }
                } else if file_type.is_file() {
                    if let Ok(source) = self.relative_source(&path) {
                        if config.is_watched(&source) {
                            sources.push(source);
                        }
                    }
                }
            }
        }

        Ok(sources)
    }
}

#[tower_lsp::async_trait]
impl SourceProvider for FsSourceProvider {
    async fn list_watched_sources(&self, config: &WatchConfig) -> IndexResult<Vec<String>> {
        let mut sources = self.walk(config).await?;

        // registration wins over the ignored-directory rule
        for registered in config.watched_files() {
            if sources.contains(registered) {
                continue;
            }
            if fs::try_exists(self.absolute_path(registered)).await.unwrap_or(false) {
                sources.push(registered.clone());
            }
        }

        sources.sort();
        Ok(sources)
    }

    async fn read_source(&self, source: &str) -> IndexResult<String> {
        let path = self.absolute_path(source);
        match fs::read_to_string(&path).await {
            Ok(content) => Ok(content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(IndexError::SourceNotFound {
                source_id: source.to_string(),
            }),
            Err(e) => Err(IndexError::Io {
                message: format!("Failed to read {}", source),
                source: e,
            }),
        }
    }
}

/// Workspace-relative identifier for an absolute path under `root`
pub fn relative_source(root: &Path, path: &Path) -> IndexResult<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| IndexError::OutsideWorkspace {
            path: path.to_path_buf(),
        })?;
    Ok(normalize_source(&relative.to_string_lossy()))
}
