//! CSS custom property index
//!
//! Keeps a live index of custom property (`--name`) definitions across the workspace
//! and answers "what does the variable under the cursor resolve to":
//! - extractor / theme_mapper turn source text into definitions and class mappings
//! - index stores them per variable name and per derived class name
//! - coordinator keeps the index in step with file events
//! - lookup finds the variable under the cursor and reads its definitions

pub mod coordinator;
pub mod definition;
pub mod events;
pub mod extractor;
pub mod index;
pub mod lookup;
pub mod theme_mapper;

#[cfg(test)]
mod coordinator_tests;
