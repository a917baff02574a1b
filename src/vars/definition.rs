//! Data types shared by the extractor, theme mapper, index and lookup engine.

use serde::Serialize;

/// Prefix every custom property name starts with
pub const VARIABLE_SIGIL: &str = "--";

/// One concrete assignment of a value to a variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Definition {
    /// Raw assigned value, trimmed, without the terminating `;`
    pub value: String,
    /// Workspace-relative path of the file the definition came from
    pub source: String,
    /// Raw condition text (e.g. `(min-width: 600px)`) for definitions inside
    /// a conditional block, `None` for unconditional ones
    pub scope: Option<String>,
}

impl Definition {
    pub fn new(value: impl Into<String>, source: impl Into<String>, scope: Option<String>) -> Self {
        Self {
            value: value.into(),
            source: source.into(),
            scope,
        }
    }
}

/// A definition together with the variable name it assigns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedVariable {
    /// Full variable name including the sigil (e.g. `--brand-color`)
    pub name: String,
    pub definition: Definition,
}

/// A utility class derived from a theme configuration entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassMapping {
    /// Class prefix for the theme section (`bg`, `text`, or empty)
    pub prefix: String,
    /// Entry key inside the section (e.g. `primary`, `4`)
    pub base_name: String,
    /// Variable the class resolves to
    pub variable: String,
    /// Workspace-relative path of the configuration file
    pub source: String,
}

impl ClassMapping {
    /// Derived class name: `prefix-baseName`, or `baseName` when the prefix is empty
    pub fn class_name(&self) -> String {
        if self.prefix.is_empty() {
            self.base_name.clone()
        } else {
            format!("{}-{}", self.prefix, self.base_name)
        }
    }
}

/// Everything one source contributes to the index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceContribution {
    pub variables: Vec<ExtractedVariable>,
    pub class_mappings: Vec<ClassMapping>,
}

impl SourceContribution {
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty() && self.class_mappings.is_empty()
    }
}

/// Strip the sigil from a variable name (`--brand-color` -> `brand-color`)
pub fn base_name(variable: &str) -> &str {
    variable.strip_prefix(VARIABLE_SIGIL).unwrap_or(variable)
}
