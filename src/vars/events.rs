//! Events consumed by the invalidation coordinator

/// Something happened that may make the index stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// A file appeared in the workspace
    Created(String),
    /// A file's content changed
    Changed(String),
    /// A file was removed from the workspace
    Deleted(String),
    /// The explicitly registered file list was replaced
    WatchSetChanged(Vec<String>),
    /// The user asked for a full re-index
    Refresh,
}

/// What the coordinator did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// One source was re-extracted and replaced in the index
    Updated,
    /// The whole index was rebuilt
    Rebuilt,
    /// The work was superseded by a newer event and thrown away
    Discarded,
    /// The event did not concern a watched source, or the coordinator is closed
    Ignored,
}
