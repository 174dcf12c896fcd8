//! Schema aggregation.
//!
//! A [`Schema`] owns the fields, indexes, collectors, and references a model
//! declares locally, plus a list of inherited parent schemas. Parents are
//! held by pointer and merged on demand — inherited members are shared by
//! identity across the whole inheritance chain, never copied, so a label or
//! code override on an ancestor field is visible from every descendant.
//! Local declarations shadow inherited members of the same name.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::collector::Collector;
use crate::field::{Field, FieldFlags};
use crate::index::{Index, IndexFlags};
use crate::inflect::tableize;
use crate::ordering::Ordering;
use crate::reference::Reference;
use crate::value::Value;

/// Any named member of a schema.
#[derive(Debug, Clone)]
pub enum SchemaMember {
    /// A scalar field.
    Field(Arc<Field>),
    /// A composite index.
    Index(Arc<Index>),
    /// A to-many relation.
    Collector(Arc<Collector>),
    /// A to-one relation.
    Reference(Arc<Reference>),
}

/// Compiled metadata for one model.
#[derive(Debug)]
pub struct Schema {
    name: String,
    namespace: Option<String>,
    resource_name: Option<String>,
    i18n_name: Option<String>,
    inherits: Vec<Arc<Schema>>,
    local_fields: BTreeMap<String, Arc<Field>>,
    local_indexes: BTreeMap<String, Arc<Index>>,
    local_collectors: BTreeMap<String, Arc<Collector>>,
    local_references: BTreeMap<String, Arc<Reference>>,
}

impl Schema {
    /// Starts building a schema for the named model.
    pub fn build(name: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder {
            schema: Self {
                name: name.into(),
                namespace: None,
                resource_name: None,
                i18n_name: None,
                inherits: Vec::new(),
                local_fields: BTreeMap::new(),
                local_indexes: BTreeMap::new(),
                local_collectors: BTreeMap::new(),
                local_references: BTreeMap::new(),
            },
        }
    }

    /// Returns the model name this schema describes.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the schema-declared namespace, if any.
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Returns the inherited parent schemas, in declaration order.
    pub fn inherits(&self) -> &[Arc<Schema>] {
        &self.inherits
    }

    /// Returns the locally declared fields.
    pub fn local_fields(&self) -> &BTreeMap<String, Arc<Field>> {
        &self.local_fields
    }

    /// Returns the effective fields: inherited first, local shadowing.
    pub fn fields(&self) -> BTreeMap<String, Arc<Field>> {
        let mut out = BTreeMap::new();
        for parent in &self.inherits {
            out.extend(parent.fields());
        }
        out.extend(
            self.local_fields
                .iter()
                .map(|(name, field)| (name.clone(), Arc::clone(field))),
        );
        out
    }

    /// Returns the effective indexes.
    pub fn indexes(&self) -> BTreeMap<String, Arc<Index>> {
        let mut out = BTreeMap::new();
        for parent in &self.inherits {
            out.extend(parent.indexes());
        }
        out.extend(
            self.local_indexes
                .iter()
                .map(|(name, index)| (name.clone(), Arc::clone(index))),
        );
        out
    }

    /// Returns the effective collectors.
    pub fn collectors(&self) -> BTreeMap<String, Arc<Collector>> {
        let mut out = BTreeMap::new();
        for parent in &self.inherits {
            out.extend(parent.collectors());
        }
        out.extend(
            self.local_collectors
                .iter()
                .map(|(name, collector)| (name.clone(), Arc::clone(collector))),
        );
        out
    }

    /// Returns the effective references.
    pub fn references(&self) -> BTreeMap<String, Arc<Reference>> {
        let mut out = BTreeMap::new();
        for parent in &self.inherits {
            out.extend(parent.references());
        }
        out.extend(
            self.local_references
                .iter()
                .map(|(name, reference)| (name.clone(), Arc::clone(reference))),
        );
        out
    }

    /// Looks up any member by name across the effective namespace.
    pub fn member(&self, name: &str) -> Option<SchemaMember> {
        if let Some(field) = self.field(name) {
            return Some(SchemaMember::Field(field));
        }
        if let Some(reference) = self.references().get(name) {
            return Some(SchemaMember::Reference(Arc::clone(reference)));
        }
        if let Some(collector) = self.collectors().get(name) {
            return Some(SchemaMember::Collector(Arc::clone(collector)));
        }
        if let Some(index) = self.indexes().get(name) {
            return Some(SchemaMember::Index(Arc::clone(index)));
        }
        None
    }

    /// Looks up one effective field by name.
    pub fn field(&self, name: &str) -> Option<Arc<Field>> {
        if let Some(field) = self.local_fields.get(name) {
            return Some(Arc::clone(field));
        }
        // Later parents shadow earlier ones, so scan in reverse.
        self.inherits
            .iter()
            .rev()
            .find_map(|parent| parent.field(name))
    }

    /// Returns the identity fields: fields flagged `Key`, else the fields of
    /// the first index flagged `Key`, in name order.
    pub fn key_fields(&self) -> Vec<Arc<Field>> {
        let fields = self.fields();
        let keyed: Vec<Arc<Field>> = fields
            .values()
            .filter(|field| field.test_flag(FieldFlags::KEY))
            .map(Arc::clone)
            .collect();
        if !keyed.is_empty() {
            return keyed;
        }
        for index in self.indexes().values() {
            if index.test_flag(IndexFlags::KEY) {
                return index
                    .fields()
                    .iter()
                    .filter_map(|name| fields.get(name).map(Arc::clone))
                    .collect();
            }
        }
        Vec::new()
    }

    /// Returns the fields flagged `Translatable`, in name order.
    pub fn translatable_fields(&self) -> Vec<Arc<Field>> {
        self.fields()
            .values()
            .filter(|field| field.test_flag(FieldFlags::TRANSLATABLE))
            .map(Arc::clone)
            .collect()
    }

    /// Returns true when any effective field is translatable.
    pub fn has_translations(&self) -> bool {
        self.fields()
            .values()
            .any(|field| field.test_flag(FieldFlags::TRANSLATABLE))
    }

    /// Returns the default ordering: key fields with their declared
    /// ordering direction.
    pub fn default_order(&self) -> Vec<(String, Ordering)> {
        self.key_fields()
            .iter()
            .map(|field| (field.name().to_string(), field.default_ordering()))
            .collect()
    }

    /// Returns default values for every stored (non-virtual) field.
    pub fn default_values(&self) -> HashMap<String, Value> {
        self.fields()
            .values()
            .filter(|field| !field.test_flag(FieldFlags::VIRTUAL))
            .map(|field| (field.name().to_string(), field.default_value()))
            .collect()
    }

    /// Returns the backend table name: the override when set, else the
    /// pluralized snake-case model name.
    pub fn resource_name(&self) -> String {
        self.resource_name
            .clone()
            .unwrap_or_else(|| tableize(&self.name))
    }

    /// Returns the translation table name: the override when set, else the
    /// resource name with an `_i18n` suffix.
    pub fn i18n_name(&self) -> String {
        self.i18n_name
            .clone()
            .unwrap_or_else(|| format!("{}_i18n", self.resource_name()))
    }
}

/// Builder assembling a [`Schema`] at model-registration time.
pub struct SchemaBuilder {
    schema: Schema,
}

impl SchemaBuilder {
    /// Declares a new local field.
    #[must_use]
    pub fn field(self, field: Field) -> Self {
        self.shared_field(Arc::new(field))
    }

    /// Declares a local field shared by identity with another schema, the
    /// way mixin-contributed fields are.
    #[must_use]
    pub fn shared_field(mut self, field: Arc<Field>) -> Self {
        self.schema
            .local_fields
            .insert(field.name().to_string(), field);
        self
    }

    /// Declares a local index.
    #[must_use]
    pub fn index(self, index: Index) -> Self {
        self.shared_index(Arc::new(index))
    }

    /// Declares a local index shared by identity with another schema.
    #[must_use]
    pub fn shared_index(mut self, index: Arc<Index>) -> Self {
        self.schema
            .local_indexes
            .insert(index.name().to_string(), index);
        self
    }

    /// Declares a local collector.
    #[must_use]
    pub fn collector(self, collector: Collector) -> Self {
        self.shared_collector(Arc::new(collector))
    }

    /// Declares a local collector shared by identity with another schema.
    #[must_use]
    pub fn shared_collector(mut self, collector: Arc<Collector>) -> Self {
        self.schema
            .local_collectors
            .insert(collector.name().to_string(), collector);
        self
    }

    /// Declares a local reference.
    #[must_use]
    pub fn reference(self, reference: Reference) -> Self {
        self.shared_reference(Arc::new(reference))
    }

    /// Declares a local reference shared by identity with another schema.
    #[must_use]
    pub fn shared_reference(mut self, reference: Arc<Reference>) -> Self {
        self.schema
            .local_references
            .insert(reference.name().to_string(), reference);
        self
    }

    /// Points the schema at a concrete parent; the parent is referenced,
    /// never flattened.
    #[must_use]
    pub fn inherits(mut self, parent: &Arc<Schema>) -> Self {
        self.schema.inherits.push(Arc::clone(parent));
        self
    }

    /// Sets the backend namespace.
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.schema.namespace = Some(namespace.into());
        self
    }

    /// Overrides the backend table name.
    #[must_use]
    pub fn resource_name(mut self, name: impl Into<String>) -> Self {
        self.schema.resource_name = Some(name.into());
        self
    }

    /// Overrides the translation table name.
    #[must_use]
    pub fn i18n_name(mut self, name: impl Into<String>) -> Self {
        self.schema.i18n_name = Some(name.into());
        self
    }

    /// Finalizes the schema.
    pub fn finish(self) -> Arc<Schema> {
        Arc::new(self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_schema() -> Arc<Schema> {
        Schema::build("User")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .field(Field::new("username"))
            .finish()
    }

    #[test]
    fn test_resource_names() {
        let schema = user_schema();
        assert_eq!(schema.resource_name(), "users");
        assert_eq!(schema.i18n_name(), "users_i18n");

        let schema = Schema::build("Person").resource_name("people").finish();
        assert_eq!(schema.resource_name(), "people");
        assert_eq!(schema.i18n_name(), "people_i18n");
    }

    #[test]
    fn test_inherited_fields_share_identity() {
        let user = user_schema();
        let employee = Schema::build("Employee")
            .inherits(&user)
            .field(Field::new("badge"))
            .finish();

        let inherited = employee.field("id").unwrap();
        let original = user.field("id").unwrap();
        assert!(Arc::ptr_eq(&inherited, &original));
        assert!(employee.field("badge").is_some());
        assert!(user.field("badge").is_none());
    }

    #[test]
    fn test_ancestor_mutation_propagates() {
        let user = user_schema();
        let employee = Schema::build("Employee").inherits(&user).finish();

        user.field("username").unwrap().set_label("Login");
        assert_eq!(employee.field("username").unwrap().label(), "Login");
    }

    #[test]
    fn test_local_shadowing() {
        let user = user_schema();
        let employee = Schema::build("Employee")
            .inherits(&user)
            .field(Field::new("username").with_flags(FieldFlags::UNIQUE))
            .finish();

        let shadowed = employee.field("username").unwrap();
        assert!(shadowed.test_flag(FieldFlags::UNIQUE));
        // The parent declaration is untouched.
        assert!(!user.field("username").unwrap().test_flag(FieldFlags::UNIQUE));
    }

    #[test]
    fn test_key_fields_from_flag() {
        let schema = user_schema();
        let keys = schema.key_fields();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].name(), "id");
    }

    #[test]
    fn test_key_fields_from_index() {
        let schema = Schema::build("GroupUser")
            .field(Field::new("group_id"))
            .field(Field::new("user_id"))
            .index(Index::new("by_group_and_user", ["group_id", "user_id"]).with_flags(IndexFlags::KEY))
            .finish();

        let keys = schema.key_fields();
        let names: Vec<&str> = keys.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["group_id", "user_id"]);
    }

    #[test]
    fn test_translatable_fields() {
        let schema = Schema::build("Page")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .field(Field::new("title").with_flags(FieldFlags::TRANSLATABLE))
            .field(Field::new("content").with_flags(FieldFlags::TRANSLATABLE))
            .finish();

        assert!(schema.has_translations());
        let fields = schema.translatable_fields();
        let names: Vec<&str> = fields.iter().map(|f| f.name()).collect();
        assert_eq!(names, ["content", "title"]);
    }

    #[test]
    fn test_default_values_skip_virtual() {
        let schema = Schema::build("User")
            .field(Field::new("id").with_flags(FieldFlags::KEY))
            .field(Field::new("status").with_default("new"))
            .field(
                Field::new("display")
                    .with_flags(FieldFlags::VIRTUAL)
                    .with_getter(|_| Value::Null),
            )
            .finish();

        let defaults = schema.default_values();
        assert_eq!(defaults.get("status"), Some(&Value::Text(String::from("new"))));
        assert!(defaults.contains_key("id"));
        assert!(!defaults.contains_key("display"));
    }

    #[test]
    fn test_default_order_uses_key_ordering() {
        let schema = Schema::build("Event")
            .field(
                Field::new("id")
                    .with_flags(FieldFlags::KEY)
                    .with_ordering(Ordering::Desc),
            )
            .finish();

        assert_eq!(
            schema.default_order(),
            vec![(String::from("id"), Ordering::Desc)]
        );
    }
}
