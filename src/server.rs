//! CSS Variable Language Server
//!
//! Thin tower-lsp shell over the variable index: tracks open documents, answers hover
//! requests and feeds file system and configuration changes to the coordinator.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tower_lsp::jsonrpc::Result;
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer, LspService, Server};
use url::Url;

use crate::config::{self, SETTINGS_SOURCE, WatchConfig, normalize_source};
use crate::source::{FsSourceProvider, SourceProvider};
use crate::vars::coordinator::InvalidationCoordinator;
use crate::vars::events::{DispatchOutcome, SourceEvent};
use crate::vars::extractor::has_variable_definitions;
use crate::vars::lookup::{MatchKind, Resolution, resolve_at};
use crate::workspace_watcher::WorkspaceWatcher;

pub const REFRESH_COMMAND: &str = "cssVarHover.refresh";
pub const WATCH_FILE_COMMAND: &str = "cssVarHover.watchFile";
pub const UNWATCH_FILE_COMMAND: &str = "cssVarHover.unwatchFile";

const WATCH_ACTION: &str = "Watch";
const IGNORE_ACTION: &str = "Ignore";

/// Text of a document the client has open
#[derive(Debug, Clone)]
struct OpenDocument {
    text: String,
    language_id: String,
    version: i32,
}

/// CSS Variable Language Server
pub struct CssVarLanguageServer {
    client: Client,
    provider: Arc<FsSourceProvider>,
    coordinator: Arc<InvalidationCoordinator<FsSourceProvider>>,
    documents: Arc<Mutex<HashMap<Url, OpenDocument>>>,
    /// Sources the user was already asked about this session
    prompted: Arc<Mutex<HashSet<String>>>,
    watcher: Mutex<Option<WorkspaceWatcher>>,
}

impl CssVarLanguageServer {
    pub fn new(client: Client, provider: Arc<FsSourceProvider>, config: WatchConfig) -> Self {
        Self {
            client,
            coordinator: Arc::new(InvalidationCoordinator::new(provider.clone(), config)),
            provider,
            documents: Arc::new(Mutex::new(HashMap::new())),
            prompted: Arc::new(Mutex::new(HashSet::new())),
            watcher: Mutex::new(None),
        }
    }

    fn workspace_root(&self) -> &Path {
        self.provider.root()
    }

    /// Workspace-relative source identifier of a document URI
    fn source_for(&self, uri: &Url) -> Option<String> {
        let path = uri.to_file_path().ok()?;
        self.provider.relative_source(&path).ok()
    }

    fn document(&self, uri: &Url) -> Option<OpenDocument> {
        self.documents.lock().ok()?.get(uri).cloned()
    }

    /// Start the file system watcher and the task that feeds its events to the coordinator
    fn start_watcher(&self) {
        let (sender, mut receiver) = mpsc::unbounded_channel();
        let ignored = self.coordinator.config().ignored_directories().to_vec();

        match WorkspaceWatcher::new(self.workspace_root(), ignored, sender) {
            Ok(watcher) => {
                if let Ok(mut slot) = self.watcher.lock() {
                    *slot = Some(watcher);
                }
            }
            Err(e) => {
                log::error!("Failed to start workspace watcher: {}", e);
                return;
            }
        }

        let coordinator = self.coordinator.clone();
        let root = self.workspace_root().to_path_buf();
        tokio::spawn(async move {
            while let Some(event) = receiver.recv().await {
                log::debug!("Workspace event: {:?}", event);
                let outcome = dispatch_event(&coordinator, &root, event).await;
                log::debug!("Workspace event handled: {:?}", outcome);
            }
            log::info!("Workspace watcher stopped");
        });
    }

    /// Ask once per session whether an unwatched document that defines variables
    /// should be watched
    fn offer_registration(&self, source: String, text: &str) {
        if self.coordinator.is_watched(&source) || !has_variable_definitions(text) {
            return;
        }
        let first_time = self
            .prompted
            .lock()
            .map(|mut prompted| prompted.insert(source.clone()))
            .unwrap_or(false);
        if !first_time {
            return;
        }

        let client = self.client.clone();
        let coordinator = self.coordinator.clone();
        let root = self.workspace_root().to_path_buf();
        tokio::spawn(async move {
            let message = format!("{} defines CSS variables. Watch it for hover information?", source);
            let actions = vec![message_action(WATCH_ACTION), message_action(IGNORE_ACTION)];

            match client.show_message_request(MessageType::INFO, message, Some(actions)).await {
                Ok(Some(action)) if action.title == WATCH_ACTION => {
                    let outcome = watch_source(&coordinator, &root, &source).await;
                    log::info!("Registered {}: {:?}", source, outcome);
                }
                Ok(_) => log::debug!("Registration of {} declined", source),
                Err(e) => log::warn!("Registration prompt for {} failed: {}", source, e),
            }
        });
    }

    /// Source identifier from a command argument: a file URI or a workspace-relative path
    fn source_from_argument(&self, argument: &serde_json::Value) -> Option<String> {
        let text = argument.as_str()?;
        match Url::parse(text) {
            Ok(uri) if uri.scheme() == "file" => self.source_for(&uri),
            _ => Some(normalize_source(text)),
        }
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for CssVarLanguageServer {
    async fn initialize(&self, _: InitializeParams) -> Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Kind(TextDocumentSyncKind::FULL)),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                execute_command_provider: Some(ExecuteCommandOptions {
                    commands: vec![
                        REFRESH_COMMAND.to_string(),
                        WATCH_FILE_COMMAND.to_string(),
                        UNWATCH_FILE_COMMAND.to_string(),
                    ],
                    work_done_progress_options: WorkDoneProgressOptions::default(),
                }),
                ..Default::default()
            },
            ..Default::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let outcome = self.coordinator.open().await;
        log::info!("Initial index build: {:?}", outcome);
        self.start_watcher();

        self.client
            .log_message(MessageType::INFO, "CSS Variable Language Server initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        if let Ok(mut watcher) = self.watcher.lock() {
            watcher.take();
        }
        self.coordinator.close().await;
        log::info!("CSS Variable Language Server shut down");
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        log::debug!("Opened {} ({})", document.uri, document.language_id);

        if let Ok(mut documents) = self.documents.lock() {
            documents.insert(
                document.uri,
                OpenDocument {
                    text: document.text,
                    language_id: document.language_id,
                    version: document.version,
                },
            );
        }
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        // full sync: the last change holds the whole text
        let Some(change) = params.content_changes.into_iter().last() else {
            return;
        };

        if let Ok(mut documents) = self.documents.lock() {
            if let Some(document) = documents.get_mut(&uri) {
                if version >= document.version {
                    document.text = change.text;
                    document.version = version;
                }
            } else {
                log::warn!("[did_change] Document not open: {}", uri);
            }
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        if let Ok(mut documents) = self.documents.lock() {
            documents.remove(&params.text_document.uri);
        }
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let Some(document) = self.document(&uri) else {
            return Ok(None);
        };

        let resolution = self.coordinator.read_index().and_then(|index| {
            resolve_at(
                &document.text,
                &document.language_id,
                position.line,
                position.character,
                &index,
            )
        });

        if let Some(source) = self.source_for(&uri) {
            self.offer_registration(source, &document.text);
        }

        Ok(resolution.map(|resolution| render_hover(&resolution)))
    }

    async fn execute_command(&self, params: ExecuteCommandParams) -> Result<Option<serde_json::Value>> {
        let root = self.workspace_root().to_path_buf();
        let argument = params.arguments.first();

        let outcome = match params.command.as_str() {
            REFRESH_COMMAND => self.coordinator.dispatch(SourceEvent::Refresh).await,
            WATCH_FILE_COMMAND | UNWATCH_FILE_COMMAND => {
                let Some(source) = argument.and_then(|argument| self.source_from_argument(argument)) else {
                    log::warn!("{} needs a file argument", params.command);
                    return Ok(None);
                };
                if params.command == WATCH_FILE_COMMAND {
                    watch_source(&self.coordinator, &root, &source).await
                } else {
                    unwatch_source(&self.coordinator, &root, &source).await
                }
            }
            other => {
                log::warn!("Unknown command: {}", other);
                return Ok(None);
            }
        };

        log::info!("{} finished: {:?}", params.command, outcome);
        Ok(None)
    }

    async fn did_change_watched_files(&self, params: DidChangeWatchedFilesParams) {
        let root = self.workspace_root().to_path_buf();
        for change in params.changes {
            let Some(source) = self.source_for(&change.uri) else {
                continue;
            };
            let event = if change.typ == FileChangeType::CREATED {
                SourceEvent::Created(source)
            } else if change.typ == FileChangeType::DELETED {
                SourceEvent::Deleted(source)
            } else {
                SourceEvent::Changed(source)
            };
            dispatch_event(&self.coordinator, &root, event).await;
        }
    }

    async fn did_change_configuration(&self, params: DidChangeConfigurationParams) {
        let Some(files) = config::watched_files_from_settings(&params.settings) else {
            return;
        };
        if files.as_slice() == self.coordinator.config().watched_files() {
            return;
        }
        let outcome = self.coordinator.dispatch(SourceEvent::WatchSetChanged(files)).await;
        log::info!("Configuration change applied: {:?}", outcome);
    }
}

/// Dispatch a workspace event, reloading the registered files when the settings
/// file itself changed
pub async fn dispatch_event<P: SourceProvider>(
    coordinator: &InvalidationCoordinator<P>,
    workspace_root: &Path,
    event: SourceEvent,
) -> DispatchOutcome {
    if let SourceEvent::Created(source) | SourceEvent::Changed(source) | SourceEvent::Deleted(source) = &event {
        if source == SETTINGS_SOURCE {
            return reload_settings(coordinator, workspace_root).await;
        }
    }
    coordinator.dispatch(event).await
}

async fn reload_settings<P: SourceProvider>(
    coordinator: &InvalidationCoordinator<P>,
    workspace_root: &Path,
) -> DispatchOutcome {
    let loaded = WatchConfig::load_from_settings(workspace_root).await;
    if loaded.watched_files() == coordinator.config().watched_files() {
        return DispatchOutcome::Ignored;
    }
    coordinator
        .dispatch(SourceEvent::WatchSetChanged(loaded.watched_files().to_vec()))
        .await
}

/// Register a source and persist the registration to the workspace settings
pub async fn watch_source<P: SourceProvider>(
    coordinator: &InvalidationCoordinator<P>,
    workspace_root: &Path,
    source: &str,
) -> DispatchOutcome {
    let outcome = coordinator.register_source(source).await;
    if outcome != DispatchOutcome::Ignored {
        persist_watched_files(coordinator, workspace_root).await;
    }
    outcome
}

/// Deregister a source and persist the change to the workspace settings
pub async fn unwatch_source<P: SourceProvider>(
    coordinator: &InvalidationCoordinator<P>,
    workspace_root: &Path,
    source: &str,
) -> DispatchOutcome {
    let outcome = coordinator.unregister_source(source).await;
    if outcome != DispatchOutcome::Ignored {
        persist_watched_files(coordinator, workspace_root).await;
    }
    outcome
}

async fn persist_watched_files<P: SourceProvider>(coordinator: &InvalidationCoordinator<P>, workspace_root: &Path) {
    let files = coordinator.config().watched_files().to_vec();
    if let Err(e) = config::save_watched_files(workspace_root, &files).await {
        log::warn!("Failed to persist registered sources: {}", e);
    }
}

/// Render a resolution as markdown: the class mapping first (for theme classes),
/// then one css block per source
pub fn render_hover(resolution: &Resolution) -> Hover {
    let variable = &resolution.matched.variable;
    let mut blocks = Vec::new();

    if let MatchKind::ThemeClass { class_name } = &resolution.matched.kind {
        blocks.push(css_block(&format!("{} → var({})", class_name, variable)));
    }

    for group in &resolution.groups {
        let definitions = group
            .definitions
            .iter()
            .map(|definition| match &definition.scope {
                Some(scope) => format!("@media {} {{\n  {}: {};\n}}", scope, variable, definition.value),
                None => format!("{}: {};", variable, definition.value),
            })
            .collect::<Vec<_>>()
            .join("\n");
        blocks.push(css_block(&format!("/* {} */\n{}", group.source, definitions)));
    }

    Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            value: blocks.join("\n"),
        }),
        range: None,
    }
}

fn css_block(content: &str) -> String {
    format!("```css\n{}\n```", content)
}

fn message_action(title: &str) -> MessageActionItem {
    MessageActionItem {
        title: title.to_string(),
        properties: HashMap::new(),
    }
}

/// Create and start the CSS variable language server on stdio
pub async fn start_language_server(workspace_root: PathBuf) {
    let provider = Arc::new(FsSourceProvider::new(workspace_root));
    let config = WatchConfig::load_from_settings(provider.root()).await;
    log::info!("Serving workspace: {}", provider.root().display());

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| CssVarLanguageServer::new(client, provider, config));
    Server::new(stdin, stdout, socket).serve(service).await;
}
