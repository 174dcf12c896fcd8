//! Collector declarations.
//!
//! A collector describes a to-many relation. A reverse lookup follows a
//! foreign key declared on the target model back to this one; a through
//! collector walks a join model for many-to-many relations. Both are
//! late-bound by model name and resolved through the registry on first use.

/// The shape of a to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorKind {
    /// One-to-many: `model.field` on the far side points back at this model.
    ReverseLookup {
        /// Target model name.
        model: String,
        /// Foreign-key field on the target model.
        field: String,
    },
    /// Many-to-many through a join model.
    Through {
        /// Join model name.
        model: String,
        /// Field on the join model pointing back at this model.
        source_field: String,
        /// Field on the join model pointing at the far side.
        target_field: String,
    },
}

/// A to-many relation declared on a model schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collector {
    name: String,
    kind: CollectorKind,
}

impl Collector {
    /// Declares a one-to-many reverse lookup from a `"Model.field"` path.
    pub fn reverse_lookup(name: impl Into<String>, path: &str) -> Self {
        let (model, field) = path.split_once('.').unwrap_or((path, ""));
        Self {
            name: name.into(),
            kind: CollectorKind::ReverseLookup {
                model: model.to_string(),
                field: field.to_string(),
            },
        }
    }

    /// Declares a many-to-many relation through a join model.
    pub fn through(
        name: impl Into<String>,
        model: impl Into<String>,
        source_field: impl Into<String>,
        target_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind: CollectorKind::Through {
                model: model.into(),
                source_field: source_field.into(),
                target_field: target_field.into(),
            },
        }
    }

    /// Returns the collector name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the relation shape.
    pub fn kind(&self) -> &CollectorKind {
        &self.kind
    }

    /// Returns the late-bound name of the model this collector queries.
    pub fn target_model(&self) -> &str {
        match &self.kind {
            CollectorKind::ReverseLookup { model, .. } | CollectorKind::Through { model, .. } => {
                model
            }
        }
    }

    /// Returns the field on the queried model that points back at the source.
    pub fn source_field(&self) -> &str {
        match &self.kind {
            CollectorKind::ReverseLookup { field, .. } => field,
            CollectorKind::Through { source_field, .. } => source_field,
        }
    }
}
