//! Variable index
//!
//! Maps variable names to every definition currently known for them, and derived
//! utility class names to the theme mapping they came from. All updates are per
//! source: a source's previous contribution is always removed before its new one is
//! inserted, so re-indexing unchanged content leaves the index unchanged.

use std::collections::HashMap;

use crate::vars::definition::{ClassMapping, Definition, ExtractedVariable, SourceContribution};

/// Definitions of one variable that came from the same source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceGroup {
    pub source: String,
    pub definitions: Vec<Definition>,
}

/// Variable definitions and class mappings for the whole workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariableIndex {
    /// Variable name -> definitions; a list is never empty
    variables: HashMap<String, Vec<Definition>>,
    /// Class name -> mappings, at most one per source, earliest processed first
    classes: HashMap<String, Vec<ClassMapping>>,
}

impl VariableIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every definition attributed to `source` with `variables`
    pub fn replace_source(&mut self, source: &str, variables: Vec<ExtractedVariable>) {
        self.remove_definitions(source);
        for variable in variables {
            self.variables
                .entry(variable.name)
                .or_default()
                .push(variable.definition);
        }
    }

    /// Replace every class mapping attributed to `source` with `mappings`
    pub fn replace_class_mappings(&mut self, source: &str, mappings: Vec<ClassMapping>) {
        self.remove_class_mappings(source);
        for mapping in mappings {
            let entries = self.classes.entry(mapping.class_name()).or_default();
            entries.retain(|existing| existing.source != mapping.source);
            entries.push(mapping);
        }
    }

    /// Replace both the definitions and the class mappings of a source
    pub fn apply_contribution(&mut self, source: &str, contribution: SourceContribution) {
        self.replace_source(source, contribution.variables);
        self.replace_class_mappings(source, contribution.class_mappings);
    }

    /// Remove everything attributed to `source`
    pub fn remove_source(&mut self, source: &str) {
        self.remove_definitions(source);
        self.remove_class_mappings(source);
    }

    /// Clear the index and re-apply every contribution in order
    pub fn rebuild_all<I>(&mut self, contributions: I)
    where
        I: IntoIterator<Item = (String, SourceContribution)>,
    {
        self.clear();
        for (source, contribution) in contributions {
            self.apply_contribution(&source, contribution);
        }
    }

    pub fn clear(&mut self) {
        self.variables.clear();
        self.classes.clear();
    }

    /// Definitions of a variable, in insertion order
    pub fn lookup(&self, name: &str) -> Option<&[Definition]> {
        self.variables.get(name).map(|definitions| definitions.as_slice())
    }

    /// Mapping for a derived class name
    pub fn lookup_class(&self, class_name: &str) -> Option<&ClassMapping> {
        self.classes.get(class_name).and_then(|mappings| mappings.first())
    }

    /// Every variable name with at least one definition
    pub fn variable_names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|name| name.as_str())
    }

    /// Whether anything in the index came from a source below `directory`
    pub fn has_sources_under(&self, directory: &str) -> bool {
        let prefix = format!("{}/", directory.trim_end_matches('/'));
        self.variables
            .values()
            .flatten()
            .any(|definition| definition.source.starts_with(&prefix))
            || self
                .classes
                .values()
                .flatten()
                .any(|mapping| mapping.source.starts_with(&prefix))
    }

    pub fn variable_count(&self) -> usize {
        self.variables.len()
    }

    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.classes.is_empty()
    }

    fn remove_definitions(&mut self, source: &str) {
        self.variables.retain(|_, definitions| {
            definitions.retain(|definition| definition.source != source);
            !definitions.is_empty()
        });
    }

    fn remove_class_mappings(&mut self, source: &str) {
        self.classes.retain(|_, mappings| {
            mappings.retain(|mapping| mapping.source != source);
            !mappings.is_empty()
        });
    }
}

/// Group definitions by source, keeping the order in which sources first appear and
/// each definition's position within its source
pub fn group_by_source(definitions: &[Definition]) -> Vec<SourceGroup> {
    let mut groups: Vec<SourceGroup> = Vec::new();
    for definition in definitions {
        match groups.iter_mut().find(|group| group.source == definition.source) {
            Some(group) => group.definitions.push(definition.clone()),
            None => groups.push(SourceGroup {
                source: definition.source.clone(),
                definitions: vec![definition.clone()],
            }),
        }
    }
    groups
}
