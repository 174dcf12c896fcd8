//! Records: a single row and its staged edits.
//!
//! A [`Record`] carries two value layers.  `state` holds what the store
//! last reported; `changes` holds edits staged since.  Setting a field
//! back to its stored value reverts the staged change, so an untouched
//! record never produces a write.  Dotted key paths traverse references
//! and collections lazily, loading each hop on first access.

use std::collections::{BTreeMap, HashMap};

use std::sync::Arc;

use futures::future::BoxFuture;
use quarry_core::{CollectorKind, Field, Reference, SchemaMember, Value, ValueMap};
use tracing::debug;

use crate::collection::Collection;
use crate::context::{Context, ContextBuilder};
use crate::error::{OrmError, Result};
use crate::model::{FetchKey, Model};
use crate::store::Row;

fn split_head(key: &str) -> (&str, Option<&str>) {
    match key.split_once('.') {
        Some((head, rest)) => (head, Some(rest)),
        None => (key, None),
    }
}

/// A single model instance.
#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<Model>,
    context: Context,
    state: HashMap<String, Value>,
    changes: HashMap<String, Value>,
    references: HashMap<String, Option<Box<Record>>>,
    collections: HashMap<String, Collection>,
}

impl Record {
    /// A fresh, unsaved record seeded with the schema's defaults.
    #[must_use]
    pub fn new(model: &Arc<Model>, options: ContextBuilder) -> Self {
        Self {
            model: Arc::clone(model),
            context: options.finish(),
            state: model.schema().default_values(),
            changes: HashMap::new(),
            references: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    /// A record hydrated from a stored row.  The row is merged over the
    /// schema defaults so partially selected rows still expose every
    /// field.
    #[must_use]
    pub fn from_state(model: &Arc<Model>, row: Row, context: Context) -> Self {
        let mut state = model.schema().default_values();
        state.extend(row);
        Self {
            model: Arc::clone(model),
            context,
            state,
            changes: HashMap::new(),
            references: HashMap::new(),
            collections: HashMap::new(),
        }
    }

    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    /// Whether the record has never been stored: true while any key
    /// field is still unset.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.model.schema().key_fields().iter().any(|field| {
            self.state
                .get(field.name())
                .is_none_or(quarry_core::Value::is_null)
        })
    }

    /// Staged edits as `field -> (stored, staged)` pairs, in field-name
    /// order.
    #[must_use]
    pub fn local_changes(&self) -> BTreeMap<String, (Value, Value)> {
        self.changes
            .iter()
            .map(|(name, staged)| {
                let stored = self.state.get(name).cloned().unwrap_or_default();
                (name.clone(), (stored, staged.clone()))
            })
            .collect()
    }

    /// True when no edits are staged.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.changes.is_empty()
    }

    /// Folds staged changes into the stored state, marking the record
    /// as loaded.  Called after a successful save.
    pub fn mark_loaded(&mut self) {
        let changes = std::mem::take(&mut self.changes);
        self.state.extend(changes);
    }

    /// Discards staged edits and cached relations.
    pub fn reset(&mut self) {
        self.changes.clear();
        self.references.clear();
        self.collections.clear();
    }

    /// Reads a field's current value without touching relations.
    /// Staged edits win over stored state; a getter strategy, when
    /// declared, wins over both.
    pub fn peek(&self, name: &str) -> Result<Value> {
        let field = self
            .model
            .schema()
            .field(name)
            .ok_or_else(|| OrmError::InvalidField(name.to_string()))?;
        Ok(self.peek_field(&field))
    }

    fn peek_field(&self, field: &Arc<Field>) -> Value {
        if let Some(getter) = field.getter() {
            let mut merged: ValueMap = self.state.clone();
            merged.extend(self.changes.clone());
            return getter(&merged);
        }
        self.changes
            .get(field.name())
            .or_else(|| self.state.get(field.name()))
            .cloned()
            .unwrap_or_default()
    }

    /// Resolves a dotted key path to a value.
    ///
    /// The first segment must name a schema member: fields answer
    /// directly, references load the remote record and recurse, and
    /// collections answer through their own key lookup.  A bare
    /// reference yields the remote record's key value.
    pub fn get<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let (head, rest) = split_head(key);
            let member = self
                .model
                .schema()
                .member(head)
                .ok_or_else(|| OrmError::InvalidField(key.to_string()))?;
            match member {
                SchemaMember::Field(field) => {
                    if rest.is_some() {
                        return Err(OrmError::InvalidField(key.to_string()));
                    }
                    Ok(self.peek_field(&field))
                }
                SchemaMember::Reference(reference) => {
                    self.ensure_reference(&reference).await?;
                    match self.references.get_mut(reference.name()) {
                        Some(Some(record)) => match rest {
                            Some(rest) => record.get(rest).await,
                            None => record.key_value(),
                        },
                        _ => Ok(Value::Null),
                    }
                }
                SchemaMember::Collector(collector) => {
                    self.ensure_collection(collector.name()).await?;
                    let collection = self
                        .collections
                        .get_mut(collector.name())
                        .ok_or_else(|| OrmError::InvalidField(key.to_string()))?;
                    match rest {
                        Some(rest) => collection.get(rest).await,
                        None => collection.key_values().await,
                    }
                }
                SchemaMember::Index(_) => Err(OrmError::InvalidField(key.to_string())),
            }
        })
    }

    /// Resolves several key paths, preserving the requested order.
    pub async fn gather(&mut self, keys: &[&str]) -> Result<Vec<Value>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Stages a value on a dotted key path.  Setting a field to its
    /// stored value reverts any staged edit; a setter strategy, when
    /// declared, takes over entirely.
    pub fn set<'a>(&'a mut self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (head, rest) = split_head(key);
            if let Some(rest) = rest {
                let member = self
                    .model
                    .schema()
                    .member(head)
                    .ok_or_else(|| OrmError::InvalidField(key.to_string()))?;
                return match member {
                    SchemaMember::Reference(reference) => {
                        self.ensure_reference(&reference).await?;
                        match self.references.get_mut(reference.name()) {
                            Some(Some(record)) => record.set(rest, value).await,
                            _ => Err(OrmError::InvalidField(key.to_string())),
                        }
                    }
                    SchemaMember::Collector(collector) => {
                        self.ensure_collection(collector.name()).await?;
                        match self.collections.get_mut(collector.name()) {
                            Some(collection) => collection.set(rest, value).await,
                            None => Err(OrmError::InvalidField(key.to_string())),
                        }
                    }
                    _ => Err(OrmError::InvalidField(key.to_string())),
                };
            }

            let field = match self.model.schema().member(head) {
                Some(SchemaMember::Field(field)) => field,
                Some(_) | None => return Err(OrmError::InvalidField(key.to_string())),
            };
            if let Some(setter) = field.setter() {
                setter(&mut self.changes, value);
                return Ok(());
            }
            let stored = self.state.get(field.name());
            let reverts = match stored {
                Some(current) => *current == value,
                None => value.is_null(),
            };
            if reverts {
                self.changes.remove(field.name());
            } else {
                self.changes.insert(field.name().to_string(), value);
            }
            Ok(())
        })
    }

    /// Stages several values in order.
    pub async fn update(&mut self, values: Vec<(String, Value)>) -> Result<()> {
        for (key, value) in values {
            self.set(&key, value).await?;
        }
        Ok(())
    }

    /// The record's key: the single key field's value, or a list across
    /// a composite key.
    pub fn key_value(&self) -> Result<Value> {
        let key_fields = self.model.schema().key_fields();
        if key_fields.is_empty() {
            return Err(OrmError::InvalidKey(format!(
                "{} has no key fields",
                self.model.name()
            )));
        }
        let mut values: Vec<Value> = key_fields
            .iter()
            .map(|field| self.peek_field(field))
            .collect();
        if values.len() == 1 {
            return Ok(values.remove(0));
        }
        Ok(Value::List(values))
    }

    /// Key fields and their values, in field-name order.  With
    /// `by_code` the pairs use backend column codes instead of field
    /// names.
    pub fn key_dict(&self, by_code: bool) -> Result<Vec<(String, Value)>> {
        let key_fields = self.model.schema().key_fields();
        if key_fields.is_empty() {
            return Err(OrmError::InvalidKey(format!(
                "{} has no key fields",
                self.model.name()
            )));
        }
        Ok(key_fields
            .iter()
            .map(|field| {
                let label = if by_code {
                    field.code()
                } else {
                    field.name().to_string()
                };
                (label, self.peek_field(field))
            })
            .collect())
    }

    /// The loaded record behind a reference, fetching it on first
    /// access.
    pub async fn reference(&mut self, name: &str) -> Result<Option<&mut Record>> {
        let reference = match self.model.schema().member(name) {
            Some(SchemaMember::Reference(reference)) => reference,
            Some(_) | None => return Err(OrmError::InvalidField(name.to_string())),
        };
        self.ensure_reference(&reference).await?;
        Ok(self
            .references
            .get_mut(name)
            .and_then(|slot| slot.as_deref_mut()))
    }

    /// Replaces a reference slot with an explicit record (or clears
    /// it), and stages the source field to match the new target's key.
    pub async fn set_reference(&mut self, name: &str, record: Option<Record>) -> Result<()> {
        let reference = match self.model.schema().member(name) {
            Some(SchemaMember::Reference(reference)) => reference,
            Some(_) | None => return Err(OrmError::InvalidField(name.to_string())),
        };
        let source = reference.source().to_string();
        let staged = match &record {
            Some(target) => target.key_value()?,
            None => Value::Null,
        };
        self.set(&source, staged).await?;
        self.references
            .insert(name.to_string(), record.map(Box::new));
        Ok(())
    }

    /// The lazy collection behind a collector, built on first access.
    pub async fn collection(&mut self, name: &str) -> Result<&mut Collection> {
        self.ensure_collection(name).await?;
        self.collections
            .get_mut(name)
            .ok_or_else(|| OrmError::InvalidField(name.to_string()))
    }

    /// Replaces a collection slot wholesale.
    pub fn set_collection(&mut self, name: &str, collection: Collection) -> Result<()> {
        match self.model.schema().member(name) {
            Some(SchemaMember::Collector(_)) => {}
            Some(_) | None => return Err(OrmError::InvalidField(name.to_string())),
        }
        self.collections.insert(name.to_string(), collection);
        Ok(())
    }

    async fn ensure_reference(&mut self, reference: &Arc<Reference>) -> Result<()> {
        if self.references.contains_key(reference.name()) {
            return Ok(());
        }
        let source = self
            .model
            .schema()
            .field(reference.source())
            .ok_or_else(|| OrmError::InvalidField(reference.source().to_string()))?;
        let refers_to = source
            .refers_to()
            .ok_or_else(|| OrmError::InvalidField(source.name().to_string()))?;
        let (target_model, target_field) = Model::resolve_relation(refers_to)?;
        let value = self.peek_field(&source);
        let loaded = if value.is_null() {
            None
        } else {
            target_model
                .fetch(
                    FetchKey::map(vec![(target_field.name().to_string(), value)]),
                    Context::build().context(&self.context.subcontext()),
                )
                .await?
                .map(Box::new)
        };
        self.references.insert(reference.name().to_string(), loaded);
        Ok(())
    }

    async fn ensure_collection(&mut self, name: &str) -> Result<()> {
        if self.collections.contains_key(name) {
            return Ok(());
        }
        let collector = match self.model.schema().member(name) {
            Some(SchemaMember::Collector(collector)) => collector,
            Some(_) | None => return Err(OrmError::InvalidField(name.to_string())),
        };
        let key = self.key_value()?;
        let collection = match collector.kind() {
            CollectorKind::ReverseLookup { .. } => {
                let target = Model::find(collector.target_model()).ok_or_else(|| {
                    OrmError::InvalidField(collector.target_model().to_string())
                })?;
                target
                    .select(Context::build().context(&self.context.subcontext()))
                    .refine(Context::build().filter(
                        quarry_core::Query::new(collector.source_field()).is(key),
                    ))
            }
            CollectorKind::Through {
                model,
                source_field,
                target_field,
            } => {
                // Two hops: collect the far-side keys from the join
                // model, then select the far model by those keys.
                let join = Model::find(model)
                    .ok_or_else(|| OrmError::InvalidField(model.clone()))?;
                let mut links = join
                    .select(Context::build().context(&self.context.subcontext()))
                    .refine(Context::build().filter(
                        quarry_core::Query::new(source_field.as_str()).is(key),
                    ));
                let keys = links.get_values(target_field).await?;
                let link_field = join
                    .schema()
                    .field(target_field)
                    .ok_or_else(|| OrmError::InvalidField(target_field.clone()))?;
                let refers_to = link_field
                    .refers_to()
                    .ok_or_else(|| OrmError::InvalidField(target_field.clone()))?;
                let (target, remote_field) = Model::resolve_relation(refers_to)?;
                target
                    .select(Context::build().context(&self.context.subcontext()))
                    .refine(Context::build().filter(
                        quarry_core::Query::new(remote_field.name()).is_in(keys),
                    ))
            }
        };
        self.collections
            .insert(name.to_string(), collection.with_collector(collector));
        Ok(())
    }

    /// Persists staged changes through the context's store.
    ///
    /// Returns `false` when there was nothing to save.  On success the
    /// row the store reports back is folded into the record's state, so
    /// store-assigned values such as sequence keys become visible.
    pub async fn save(&mut self, options: ContextBuilder) -> Result<bool> {
        if self.model.is_view() {
            return Err(OrmError::ReadOnly(self.model.name().to_string()));
        }
        if self.changes.is_empty() {
            return Ok(false);
        }
        let context = options.context(&self.context).finish();
        let store = context.store()?;
        debug!(model = self.model.name(), "saving record");
        let row = store.save_record(self, &context).await?;
        self.changes.extend(row);
        self.mark_loaded();
        Ok(true)
    }

    /// Deletes the record through the context's store, returning the
    /// number of rows removed.
    pub async fn delete(&mut self, options: ContextBuilder) -> Result<u64> {
        if self.model.is_view() {
            return Err(OrmError::ReadOnly(self.model.name().to_string()));
        }
        let context = options.context(&self.context).finish();
        let store = context.store()?;
        debug!(model = self.model.name(), "deleting record");
        store.delete_record(self, &context).await
    }
}
