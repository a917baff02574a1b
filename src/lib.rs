//! CSS Variable Native Library
//!
//! Indexes CSS custom property definitions across a workspace (style sheets,
//! component style blocks and theme configuration) and resolves the variable under
//! a cursor to its definitions.

pub mod config;
pub mod error;
pub mod server;
pub mod source;
pub mod vars;
pub mod workspace_watcher;
#[cfg(test)]
pub mod test_utils;
