//! Watched-source configuration
//!
//! Decides which workspace files are authoritative for variable definitions: every
//! style sheet by extension, every theme configuration file by name, and any file the
//! user registered explicitly. Registered files are read from the workspace settings
//! file (`.vscode/settings.json`, key `cssVarHover.watchedFiles`) at startup and can be
//! changed at runtime through the language server.

use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{IndexResult, IoContext, JsonContext};

/// Settings key holding the explicitly registered files
pub const WATCHED_FILES_SETTING: &str = "cssVarHover.watchedFiles";

/// Workspace-relative source identifier of the settings file
pub const SETTINGS_SOURCE: &str = ".vscode/settings.json";

const DEFAULT_STYLE_EXTENSIONS: &[&str] = &["css", "scss"];
const DEFAULT_COMPONENT_EXTENSIONS: &[&str] = &["vue", "svelte"];
const DEFAULT_THEME_FILE_PATTERN: &str = r"(^|/)tailwind\.config\.(js|ts|cjs|mjs)$";
const DEFAULT_IGNORED_DIRECTORIES: &[&str] = &["node_modules", ".git", "vendor", "bower_components"];

/// Subset of the workspace settings file we care about
#[derive(Debug, Default, Deserialize)]
struct WorkspaceSettings {
    #[serde(rename = "cssVarHover.watchedFiles", default)]
    watched_files: Vec<String>,
}

/// The watched-source set and the rules that derive it
#[derive(Debug, Clone)]
pub struct WatchConfig {
    style_extensions: Vec<String>,
    component_extensions: Vec<String>,
    theme_file_pattern: Regex,
    ignored_directories: Vec<String>,
    watched_files: Vec<String>,
}

impl WatchConfig {
    /// Create a configuration with the default rules and the given registered files
    pub fn with_watched_files(files: impl IntoIterator<Item = String>) -> Self {
        let mut config = Self::default();
        config.set_watched_files(files);
        config
    }

    /// Load registered files from the workspace settings file.
    ///
    /// A missing or malformed settings file yields the defaults.
    pub async fn load_from_settings(workspace_root: &Path) -> Self {
        match read_watched_files(&settings_path(workspace_root)).await {
            Ok(files) => {
                log::info!("Loaded {} registered source(s) from workspace settings", files.len());
                Self::with_watched_files(files)
            }
            Err(e) => {
                log::info!("Using default watch configuration: {}", e);
                Self::default()
            }
        }
    }

    /// Whether the source is authoritative for definitions
    pub fn is_watched(&self, source: &str) -> bool {
        let source = normalize_source(source);
        if self.is_registered(&source) {
            return true;
        }
        if self.is_ignored(&source) {
            return false;
        }
        self.is_style_sheet(&source) || self.is_theme_config(&source)
    }

    /// Whether the source was registered explicitly
    pub fn is_registered(&self, source: &str) -> bool {
        let source = normalize_source(source);
        self.watched_files.iter().any(|file| *file == source)
    }

    /// Whether the file name matches the theme configuration pattern
    pub fn is_theme_config(&self, source: &str) -> bool {
        self.theme_file_pattern.is_match(&normalize_source(source))
    }

    pub fn is_style_sheet(&self, source: &str) -> bool {
        has_extension(source, &self.style_extensions)
    }

    pub fn is_component(&self, source: &str) -> bool {
        has_extension(source, &self.component_extensions)
    }

    /// Whether any directory on the path is excluded from discovery
    pub fn is_ignored(&self, source: &str) -> bool {
        let source = normalize_source(source);
        let mut components: Vec<&str> = source.split('/').collect();
        // the last component is the file itself
        components.pop();
        components
            .iter()
            .any(|component| self.is_ignored_directory(component))
    }

    pub fn is_ignored_directory(&self, name: &str) -> bool {
        self.ignored_directories.iter().any(|dir| dir == name)
    }

    /// Add a source to the registered set, returns `true` if it was not registered yet
    pub fn register_source(&mut self, source: &str) -> bool {
        let source = normalize_source(source);
        if self.watched_files.contains(&source) {
            return false;
        }
        self.watched_files.push(source);
        true
    }

    /// Remove a source from the registered set, returns `true` if it was registered
    pub fn unregister_source(&mut self, source: &str) -> bool {
        let source = normalize_source(source);
        let before = self.watched_files.len();
        self.watched_files.retain(|file| *file != source);
        self.watched_files.len() != before
    }

    /// Replace the registered set
    pub fn set_watched_files(&mut self, files: impl IntoIterator<Item = String>) {
        self.watched_files.clear();
        for file in files {
            self.register_source(&file);
        }
    }

    /// Explicitly registered files, in registration order
    pub fn watched_files(&self) -> &[String] {
        &self.watched_files
    }

    pub fn ignored_directories(&self) -> &[String] {
        &self.ignored_directories
    }
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            style_extensions: to_strings(DEFAULT_STYLE_EXTENSIONS),
            component_extensions: to_strings(DEFAULT_COMPONENT_EXTENSIONS),
            theme_file_pattern: Regex::new(DEFAULT_THEME_FILE_PATTERN)
                .expect("theme file pattern is valid"),
            ignored_directories: to_strings(DEFAULT_IGNORED_DIRECTORIES),
            watched_files: Vec::new(),
        }
    }
}

/// Path of the workspace settings file
pub fn settings_path(workspace_root: &Path) -> PathBuf {
    workspace_root.join(".vscode").join("settings.json")
}

/// Write the registered files back to the workspace settings file.
///
/// Other settings in the file are preserved. A missing file (or one that is not a
/// JSON object) is replaced by a file holding only the registered files.
pub async fn save_watched_files(workspace_root: &Path, files: &[String]) -> IndexResult<()> {
    let path = settings_path(workspace_root);

    let mut settings = match fs::read_to_string(&path).await {
        Ok(content) => match serde_json::from_str::<serde_json::Value>(&content) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => {
                log::warn!("Replacing unreadable workspace settings at {}", path.display());
                serde_json::Map::new()
            }
        },
        Err(_) => serde_json::Map::new(),
    };
    settings.insert(WATCHED_FILES_SETTING.to_string(), serde_json::json!(files));

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .await
            .with_io_context("Failed to create settings directory")?;
    }
    let content = serde_json::to_string_pretty(&serde_json::Value::Object(settings))
        .with_json_context("Failed to serialize workspace settings")?;
    fs::write(&path, content)
        .await
        .with_io_context("Failed to write workspace settings")?;
    Ok(())
}

/// Parse registered files out of a settings JSON value.
///
/// Accepts both the flat form (`"cssVarHover.watchedFiles": [...]`) used in settings
/// files and the nested form (`"cssVarHover": { "watchedFiles": [...] }`) clients send
/// with `workspace/didChangeConfiguration`.
pub fn watched_files_from_settings(settings: &serde_json::Value) -> Option<Vec<String>> {
    let list = settings
        .get(WATCHED_FILES_SETTING)
        .or_else(|| settings.get("cssVarHover").and_then(|section| section.get("watchedFiles")))?;
    let files = list
        .as_array()?
        .iter()
        .filter_map(|item| item.as_str())
        .map(|item| normalize_source(item))
        .collect();
    Some(files)
}

/// Normalise a source identifier to a forward-slash workspace-relative path
pub fn normalize_source(source: &str) -> String {
    let source = source.replace('\\', "/");
    source.strip_prefix("./").unwrap_or(&source).to_string()
}

async fn read_watched_files(path: &Path) -> IndexResult<Vec<String>> {
    let content = fs::read_to_string(path)
        .await
        .with_io_context("Failed to read workspace settings")?;
    let settings: WorkspaceSettings =
        serde_json::from_str(&content).with_json_context("Failed to parse workspace settings")?;
    Ok(settings.watched_files)
}

fn has_extension(source: &str, extensions: &[String]) -> bool {
    Path::new(source)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|candidate| candidate.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_style_sheets_and_theme_files_are_watched() {
        let config = WatchConfig::default();
        assert!(config.is_watched("src/styles/main.css"));
        assert!(config.is_watched("theme.scss"));
        assert!(config.is_watched("tailwind.config.js"));
        assert!(config.is_watched("apps/web/tailwind.config.ts"));
        assert!(!config.is_watched("src/App.vue"));
        assert!(!config.is_watched("src/main.ts"));
    }

    #[test]
    fn test_dependency_directories_are_not_watched() {
        let config = WatchConfig::default();
        assert!(!config.is_watched("node_modules/lib/dist/lib.css"));
        assert!(!config.is_watched("packages/a/node_modules/x.css"));
        assert!(config.is_watched("src/node_modules.css"));
    }

    #[test]
    fn test_register_and_unregister() {
        let mut config = WatchConfig::default();
        assert!(config.register_source("src\\App.vue"));
        assert!(!config.register_source("./src/App.vue"));
        assert!(config.is_watched("src/App.vue"));
        assert_eq!(config.watched_files(), &["src/App.vue".to_string()]);

        assert!(config.unregister_source("src/App.vue"));
        assert!(!config.unregister_source("src/App.vue"));
        assert!(!config.is_watched("src/App.vue"));
    }

    #[test]
    fn test_watched_files_from_settings_forms() {
        let flat = serde_json::json!({ "cssVarHover.watchedFiles": ["a.vue", "./b.html"] });
        assert_eq!(
            watched_files_from_settings(&flat),
            Some(vec!["a.vue".to_string(), "b.html".to_string()])
        );

        let nested = serde_json::json!({ "cssVarHover": { "watchedFiles": ["c.vue"] } });
        assert_eq!(watched_files_from_settings(&nested), Some(vec!["c.vue".to_string()]));

        let unrelated = serde_json::json!({ "editor.tabSize": 2 });
        assert_eq!(watched_files_from_settings(&unrelated), None);
    }

    #[tokio::test]
    async fn test_load_from_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let vscode_dir = temp_dir.path().join(".vscode");
        std::fs::create_dir_all(&vscode_dir).unwrap();
        std::fs::write(
            vscode_dir.join("settings.json"),
            r#"{ "cssVarHover.watchedFiles": ["src/App.vue"], "editor.tabSize": 2 }"#,
        )
        .unwrap();

        let config = WatchConfig::load_from_settings(temp_dir.path()).await;
        assert!(config.is_watched("src/App.vue"));
    }

    #[tokio::test]
    async fn test_load_from_missing_or_malformed_settings() {
        let temp_dir = TempDir::new().unwrap();
        let config = WatchConfig::load_from_settings(temp_dir.path()).await;
        assert!(config.watched_files().is_empty());

        let vscode_dir = temp_dir.path().join(".vscode");
        std::fs::create_dir_all(&vscode_dir).unwrap();
        std::fs::write(vscode_dir.join("settings.json"), "{ not json").unwrap();
        let config = WatchConfig::load_from_settings(temp_dir.path()).await;
        assert!(config.watched_files().is_empty());
    }

    #[tokio::test]
    async fn test_save_watched_files_preserves_other_settings() {
        let temp_dir = TempDir::new().unwrap();
        let files = vec!["src/App.vue".to_string()];

        save_watched_files(temp_dir.path(), &files).await.unwrap();
        let config = WatchConfig::load_from_settings(temp_dir.path()).await;
        assert_eq!(config.watched_files(), files.as_slice());

        let path = settings_path(temp_dir.path());
        std::fs::write(&path, r#"{ "editor.tabSize": 2, "cssVarHover.watchedFiles": [] }"#).unwrap();
        save_watched_files(temp_dir.path(), &files).await.unwrap();

        let saved: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["editor.tabSize"], 2);
        assert_eq!(watched_files_from_settings(&saved), Some(files));
    }
}
