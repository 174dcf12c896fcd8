//! Model descriptors and the model registry.
//!
//! A [`Model`] couples a name with an immutable [`Schema`] plus the
//! runtime concerns the schema does not carry: which store the model
//! persists through by default, and whether it is a read-only view.
//! Registered models are discoverable by name, which is how relations
//! declared as `"Model.field"` strings resolve late.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use quarry_core::{
    Collector, Field, FieldFlags, Filter, Index, Query, Reference, Schema, SchemaBuilder, Value,
};

use crate::collection::Collection;
use crate::context::{Context, ContextBuilder, ReturnType, StoreRef};
use crate::error::{OrmError, Result};
use crate::record::Record;
use crate::store::Row;

/// A registered model descriptor.
#[derive(Debug)]
pub struct Model {
    name: String,
    schema: Arc<Schema>,
    store_name: Option<String>,
    view: bool,
}

fn registry() -> MutexGuard<'static, HashMap<String, Arc<Model>>> {
    static REGISTRY: OnceLock<Mutex<HashMap<String, Arc<Model>>>> = OnceLock::new();
    match REGISTRY.get_or_init(Mutex::default).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Looks up a registered model by name.
#[must_use]
pub fn find_model(name: &str) -> Option<Arc<Model>> {
    registry().get(name).cloned()
}

/// The accepted shapes of a fetch key.
#[derive(Debug, Clone)]
pub enum FetchKey {
    /// A single scalar, matched against the key field and any keyable
    /// fields.
    Value(Value),
    /// One value per key field, in key-field order.
    Composite(Vec<Value>),
    /// Explicit field/value pairs, all of which must match.
    Map(Vec<(String, Value)>),
}

impl FetchKey {
    #[must_use]
    pub fn value(value: impl quarry_core::ToValue) -> Self {
        Self::Value(value.to_value())
    }

    #[must_use]
    pub fn composite(values: Vec<Value>) -> Self {
        Self::Composite(values)
    }

    #[must_use]
    pub fn map(pairs: Vec<(String, Value)>) -> Self {
        Self::Map(pairs)
    }
}

impl Model {
    /// Starts declaring a new model.
    #[must_use]
    pub fn define(name: impl Into<String>) -> ModelBuilder {
        let name = name.into();
        ModelBuilder {
            schema: Schema::build(&name),
            name,
            store_name: None,
            view: false,
        }
    }

    /// Looks up a registered model by name.
    #[must_use]
    pub fn find(name: &str) -> Option<Arc<Model>> {
        find_model(name)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// The name of the store this model persists through by default.
    #[must_use]
    pub fn store_name(&self) -> Option<&str> {
        self.store_name.as_deref()
    }

    /// Views can be read but never saved or deleted.
    #[must_use]
    pub fn is_view(&self) -> bool {
        self.view
    }

    fn apply_defaults(&self, options: ContextBuilder) -> ContextBuilder {
        match &self.store_name {
            Some(name) => options.default_store(StoreRef::Named(name.clone())),
            None => options,
        }
    }

    /// A lazy collection over every record matched by the options.
    #[must_use]
    pub fn select(self: &Arc<Self>, options: ContextBuilder) -> Collection {
        let context = self.apply_defaults(options).finish();
        Collection::new(self, context)
    }

    /// Builds the lookup filter a fetch key implies.
    fn key_filter(&self, key: FetchKey) -> Result<Filter> {
        let key_fields = self.schema.key_fields();
        match key {
            FetchKey::Value(value) => {
                let mut filter = Filter::Null;
                if let [field] = key_fields.as_slice() {
                    filter = filter | Query::new(field.name()).is(value.clone());
                }
                for field in self.schema.fields().values() {
                    if field.test_flag(FieldFlags::KEYABLE) {
                        filter = filter | Query::new(field.name()).is(value.clone());
                    }
                }
                if filter.is_null() {
                    return Err(OrmError::InvalidKey(format!(
                        "{} has no scalar key",
                        self.name
                    )));
                }
                Ok(filter)
            }
            FetchKey::Composite(values) => {
                if values.len() != key_fields.len() {
                    return Err(OrmError::InvalidKey(format!(
                        "expected {} key values, got {}",
                        key_fields.len(),
                        values.len()
                    )));
                }
                let mut filter = Filter::Null;
                for (field, value) in key_fields.iter().zip(values) {
                    filter = filter & Query::new(field.name()).is(value);
                }
                Ok(filter)
            }
            FetchKey::Map(pairs) => {
                let mut filter = Filter::Null;
                for (name, value) in pairs {
                    filter = filter & Query::new(name).is(value);
                }
                Ok(filter)
            }
        }
    }

    /// Fetches the single record identified by the key, or `None`.
    pub async fn fetch(
        self: &Arc<Self>,
        key: FetchKey,
        options: ContextBuilder,
    ) -> Result<Option<Record>> {
        let filter = self.key_filter(key)?;
        let mut context = self.apply_defaults(options).filter(filter).finish();
        // Key lookups are point reads; inherited pagination is discarded.
        context.set_start(None);
        context.set_limit(Some(1));
        let store = context.store()?;
        let mut rows = store.get_records(self, &context).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(Record::from_state(self, rows.remove(0), context)))
    }

    /// Like [`Model::fetch`], but returns the raw row.
    pub async fn fetch_data(
        self: &Arc<Self>,
        key: FetchKey,
        options: ContextBuilder,
    ) -> Result<Option<Row>> {
        let filter = self.key_filter(key)?;
        let mut context = self
            .apply_defaults(options)
            .filter(filter)
            .returning(ReturnType::Data)
            .finish();
        context.set_start(None);
        context.set_limit(Some(1));
        let store = context.store()?;
        let mut rows = store.get_records(self, &context).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(rows.remove(0)))
    }

    /// Creates a record with the given values and saves it immediately.
    pub async fn create(
        self: &Arc<Self>,
        values: Vec<(String, Value)>,
        options: ContextBuilder,
    ) -> Result<Record> {
        let mut record = Record::new(self, self.apply_defaults(options));
        record.update(values).await?;
        record.save(Context::build()).await?;
        Ok(record)
    }

    /// Resolves the model and field a relation string points at.
    pub fn resolve_relation(refers_to: &str) -> Result<(Arc<Model>, Arc<Field>)> {
        let (model_name, field_name) = refers_to
            .split_once('.')
            .ok_or_else(|| OrmError::InvalidField(refers_to.to_string()))?;
        let model =
            find_model(model_name).ok_or_else(|| OrmError::InvalidField(refers_to.to_string()))?;
        let field = model
            .schema
            .field(field_name)
            .ok_or_else(|| OrmError::InvalidField(refers_to.to_string()))?;
        Ok((model, field))
    }
}

/// A reusable bundle of schema members shared across models.
#[derive(Default)]
pub struct Mixin {
    fields: Vec<Arc<Field>>,
    indexes: Vec<Arc<Index>>,
    collectors: Vec<Arc<Collector>>,
    references: Vec<Arc<Reference>>,
}

impl Mixin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(Arc::new(field));
        self
    }

    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.indexes.push(Arc::new(index));
        self
    }

    #[must_use]
    pub fn collector(mut self, collector: Collector) -> Self {
        self.collectors.push(Arc::new(collector));
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: Reference) -> Self {
        self.references.push(Arc::new(reference));
        self
    }
}

/// Declares a model and registers it.
pub struct ModelBuilder {
    name: String,
    schema: SchemaBuilder,
    store_name: Option<String>,
    view: bool,
}

impl ModelBuilder {
    #[must_use]
    pub fn field(mut self, field: Field) -> Self {
        self.schema = self.schema.field(field);
        self
    }

    /// Adds a field shared with other schemas; mutations to the shared
    /// definition are visible everywhere it is used.
    #[must_use]
    pub fn shared_field(mut self, field: Arc<Field>) -> Self {
        self.schema = self.schema.shared_field(field);
        self
    }

    #[must_use]
    pub fn index(mut self, index: Index) -> Self {
        self.schema = self.schema.index(index);
        self
    }

    #[must_use]
    pub fn collector(mut self, collector: Collector) -> Self {
        self.schema = self.schema.collector(collector);
        self
    }

    #[must_use]
    pub fn reference(mut self, reference: Reference) -> Self {
        self.schema = self.schema.reference(reference);
        self
    }

    /// Inherits every schema member of the parent model.
    #[must_use]
    pub fn inherits(mut self, parent: &Arc<Model>) -> Self {
        self.schema = self.schema.inherits(parent.schema());
        self
    }

    /// Copies a mixin's shared members into this model's schema.
    #[must_use]
    pub fn mixin(mut self, mixin: &Mixin) -> Self {
        for field in &mixin.fields {
            self.schema = self.schema.shared_field(Arc::clone(field));
        }
        for index in &mixin.indexes {
            self.schema = self.schema.shared_index(Arc::clone(index));
        }
        for collector in &mixin.collectors {
            self.schema = self.schema.shared_collector(Arc::clone(collector));
        }
        for reference in &mixin.references {
            self.schema = self.schema.shared_reference(Arc::clone(reference));
        }
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.schema = self.schema.namespace(namespace);
        self
    }

    #[must_use]
    pub fn resource_name(mut self, resource_name: impl Into<String>) -> Self {
        self.schema = self.schema.resource_name(resource_name);
        self
    }

    #[must_use]
    pub fn i18n_name(mut self, i18n_name: impl Into<String>) -> Self {
        self.schema = self.schema.i18n_name(i18n_name);
        self
    }

    /// Names the store the model persists through by default.
    #[must_use]
    pub fn store(mut self, name: impl Into<String>) -> Self {
        self.store_name = Some(name.into());
        self
    }

    /// Marks the model as a read-only view.
    #[must_use]
    pub fn view(mut self, view: bool) -> Self {
        self.view = view;
        self
    }

    /// Finalizes the schema and registers the model.  Registering a
    /// second model under the same name replaces the first.
    #[must_use]
    pub fn register(self) -> Arc<Model> {
        let model = Arc::new(Model {
            name: self.name.clone(),
            schema: self.schema.finish(),
            store_name: self.store_name,
            view: self.view,
        });
        registry().insert(self.name, Arc::clone(&model));
        model
    }
}
