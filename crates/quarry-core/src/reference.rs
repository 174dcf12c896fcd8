//! Reference declarations.
//!
//! A reference describes a to-one relation: a local source field whose value
//! identifies a row in another model. The target model is resolved through
//! the source field's `refers_to` path on first access, never at definition
//! time, so model declarations may freely forward-reference each other.

/// A to-one relation declared on a model schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    name: String,
    source: String,
}

impl Reference {
    /// Declares a reference resolved through the given local field.
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
        }
    }

    /// Returns the reference name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the local field whose value identifies the remote row.
    pub fn source(&self) -> &str {
        &self.source
    }
}
