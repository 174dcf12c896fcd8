//! Lazy record collections.
//!
//! A [`Collection`] is a deferred query: it remembers its model and
//! context but touches the store only when counted, iterated, or asked
//! for a record.  Results are cached per slot, and any refinement
//! returns a new collection with the caches dropped.

use std::sync::Arc;

use futures::future::{try_join_all, BoxFuture};
use quarry_core::{Collector, Value};
use tracing::debug;

use crate::context::{Context, ContextBuilder, ReturnType};
use crate::error::{OrmError, Result};
use crate::model::Model;
use crate::record::Record;
use crate::store::Row;

/// Key segments answered by the collection itself rather than
/// broadcast to its records.
pub const RESERVED_WORDS: [&str; 3] = ["count", "first", "last"];

/// A deferred, cacheable query over a model.
#[derive(Debug, Clone, Default)]
pub struct Collection {
    model: Option<Arc<Model>>,
    context: Context,
    collector: Option<Arc<Collector>>,
    records: Option<Vec<Record>>,
    count_cache: Option<u64>,
    first_cache: Option<Option<Box<Record>>>,
    last_cache: Option<Option<Box<Record>>>,
}

impl Collection {
    /// A lazy collection over every record the context matches.
    #[must_use]
    pub fn new(model: &Arc<Model>, context: Context) -> Self {
        Self {
            model: Some(Arc::clone(model)),
            context,
            ..Self::default()
        }
    }

    /// A pre-materialized collection that never queries a store.
    #[must_use]
    pub fn from_records(records: Vec<Record>) -> Self {
        Self {
            model: records.first().map(|record| Arc::clone(record.model())),
            records: Some(records),
            ..Self::default()
        }
    }

    /// Tags the collection with the collector that produced it.
    #[must_use]
    pub fn with_collector(mut self, collector: Arc<Collector>) -> Self {
        self.collector = Some(collector);
        self
    }

    #[must_use]
    pub fn model(&self) -> Option<&Arc<Model>> {
        self.model.as_ref()
    }

    #[must_use]
    pub fn context(&self) -> &Context {
        &self.context
    }

    #[must_use]
    pub fn collector(&self) -> Option<&Arc<Collector>> {
        self.collector.as_ref()
    }

    /// Whether records have already been pulled from the store.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.records.is_some()
    }

    /// The materialized records, if any.
    #[must_use]
    pub fn loaded_records(&self) -> Option<&[Record]> {
        self.records.as_deref()
    }

    fn require_model(&self) -> Result<&Arc<Model>> {
        self.model
            .as_ref()
            .ok_or_else(|| OrmError::database("collection is not bound to a model"))
    }

    /// A new collection with extra options merged over this one's
    /// context.  All caches start empty on the refined collection.
    #[must_use]
    pub fn refine(&self, options: ContextBuilder) -> Self {
        Self {
            model: self.model.clone(),
            context: options.context(&self.context).finish(),
            collector: self.collector.clone(),
            ..Self::default()
        }
    }

    /// A sub-range of the collection.  A materialized collection is
    /// sliced in memory; a lazy one folds the range into its
    /// pagination.
    #[must_use]
    pub fn slice(&self, from: u64, to: u64) -> Self {
        if let Some(records) = &self.records {
            let from = usize::try_from(from).unwrap_or(usize::MAX).min(records.len());
            let to = usize::try_from(to).unwrap_or(usize::MAX).min(records.len());
            let mut sliced = self.clone();
            sliced.records = Some(records[from..from.max(to)].to_vec());
            sliced.count_cache = None;
            sliced.first_cache = None;
            sliced.last_cache = None;
            return sliced;
        }
        let base = self.context.start().unwrap_or(0);
        self.refine(
            Context::build()
                .start(base + from)
                .limit(to.saturating_sub(from)),
        )
    }

    /// The number of matching records, counted at the store unless the
    /// collection is already materialized.
    pub async fn get_count(&mut self) -> Result<u64> {
        if let Some(records) = &self.records {
            return Ok(records.len() as u64);
        }
        if let Some(count) = self.count_cache {
            return Ok(count);
        }
        let model = Arc::clone(self.require_model()?);
        let context = Context::build()
            .returning(ReturnType::Count)
            .context(&self.context)
            .finish();
        let store = context.store()?;
        let count = store.get_count(&model, &context).await?;
        self.count_cache = Some(count);
        Ok(count)
    }

    /// Pulls and caches the matching records.
    pub async fn get_records(&mut self) -> Result<&mut [Record]> {
        if self.records.is_none() {
            let model = Arc::clone(self.require_model()?);
            let store = self.context.store()?;
            debug!(model = model.name(), "materializing collection");
            let rows = store.get_records(&model, &self.context).await?;
            let records = rows
                .into_iter()
                .map(|row| Record::from_state(&model, row, self.context.clone()))
                .collect();
            self.records = Some(records);
        }
        match self.records.as_deref_mut() {
            Some(records) => Ok(records),
            None => Ok(&mut []),
        }
    }

    async fn edge_record(&mut self, last: bool) -> Result<Option<Record>> {
        if let Some(records) = &self.records {
            let edge = if last { records.last() } else { records.first() };
            return Ok(edge.cloned());
        }
        let cache = if last {
            &self.last_cache
        } else {
            &self.first_cache
        };
        if let Some(cached) = cache {
            return Ok(cached.as_deref().cloned());
        }
        let model = Arc::clone(self.require_model()?);
        let mut order = self
            .context
            .order
            .clone()
            .unwrap_or_else(|| model.schema().default_order());
        if last {
            for (_, direction) in &mut order {
                *direction = direction.reversed();
            }
        }
        let mut context = Context::build()
            .order(order)
            .context(&self.context)
            .finish();
        // Edge lookups read one row regardless of how the base is paged.
        context.set_start(None);
        context.set_limit(Some(1));
        let store = context.store()?;
        let mut rows = store.get_records(&model, &context).await?;
        let record = if rows.is_empty() {
            None
        } else {
            Some(Record::from_state(&model, rows.remove(0), self.context.clone()))
        };
        let boxed = record.clone().map(Box::new);
        if last {
            self.last_cache = Some(boxed);
        } else {
            self.first_cache = Some(boxed);
        }
        Ok(record)
    }

    /// The first matching record under the collection's ordering, or
    /// the schema's default ordering when none is set.
    pub async fn get_first(&mut self) -> Result<Option<Record>> {
        self.edge_record(false).await
    }

    /// The last matching record: the first under the reversed ordering.
    pub async fn get_last(&mut self) -> Result<Option<Record>> {
        self.edge_record(true).await
    }

    /// Each record's key value, materializing the collection.
    pub async fn key_values(&mut self) -> Result<Value> {
        let records = self.get_records().await?;
        let values = records
            .iter()
            .map(Record::key_value)
            .collect::<Result<Vec<Value>>>()?;
        Ok(Value::List(values))
    }

    /// Resolves a key path against every record concurrently, keeping
    /// record order.
    pub async fn get_values(&mut self, key: &str) -> Result<Value> {
        let records = self.get_records().await?;
        let values = try_join_all(records.iter_mut().map(|record| record.get(key))).await?;
        Ok(Value::List(values))
    }

    /// Resolves a key path.  The reserved heads `count`, `first`, and
    /// `last` are answered by the collection; anything else broadcasts
    /// to the records and lists the results.
    pub fn get<'a>(&'a mut self, key: &'a str) -> BoxFuture<'a, Result<Value>> {
        Box::pin(async move {
            let (head, rest) = match key.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (key, None),
            };
            match head {
                "count" => match rest {
                    Some(_) => Err(OrmError::InvalidField(key.to_string())),
                    None => {
                        let count = self.get_count().await?;
                        Ok(Value::Int(i64::try_from(count).unwrap_or(i64::MAX)))
                    }
                },
                "first" | "last" => {
                    let record = if head == "first" {
                        self.get_first().await?
                    } else {
                        self.get_last().await?
                    };
                    match (record, rest) {
                        (None, _) => Ok(Value::Null),
                        (Some(mut record), Some(rest)) => record.get(rest).await,
                        (Some(record), None) => record.key_value(),
                    }
                }
                _ => self.get_values(key).await,
            }
        })
    }

    /// Stages a value through a key path.  Reserved heads are read-only
    /// targets for bare writes, but `first.<path>`/`last.<path>` write
    /// through to the edge record.  Any other path broadcasts: a list
    /// value is distributed record by record, anything else is staged
    /// on every record.
    pub fn set<'a>(&'a mut self, key: &'a str, value: Value) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let (head, rest) = match key.split_once('.') {
                Some((head, rest)) => (head, Some(rest)),
                None => (key, None),
            };
            if RESERVED_WORDS.contains(&head) {
                let Some(rest) = rest else {
                    return Err(OrmError::ReadOnly(key.to_string()));
                };
                if head == "count" {
                    return Err(OrmError::ReadOnly(key.to_string()));
                }
                if let Some(records) = &mut self.records {
                    let edge = if head == "first" {
                        records.first_mut()
                    } else {
                        records.last_mut()
                    };
                    return match edge {
                        Some(record) => record.set(rest, value).await,
                        None => Err(OrmError::InvalidField(key.to_string())),
                    };
                }
                let record = if head == "first" {
                    self.get_first().await?
                } else {
                    self.get_last().await?
                };
                return match record {
                    Some(mut record) => {
                        record.set(rest, value).await?;
                        let cache = if head == "first" {
                            &mut self.first_cache
                        } else {
                            &mut self.last_cache
                        };
                        *cache = Some(Some(Box::new(record)));
                        Ok(())
                    }
                    None => Err(OrmError::InvalidField(key.to_string())),
                };
            }

            let records = self.get_records().await?;
            if let Value::List(values) = value {
                if values.len() != records.len() {
                    return Err(OrmError::InvalidField(format!(
                        "{key}: {} values for {} records",
                        values.len(),
                        records.len()
                    )));
                }
                try_join_all(
                    records
                        .iter_mut()
                        .zip(values)
                        .map(|(record, value)| record.set(key, value)),
                )
                .await?;
            } else {
                try_join_all(
                    records
                        .iter_mut()
                        .map(|record| record.set(key, value.clone())),
                )
                .await?;
            }
            Ok(())
        })
    }

    /// Saves every materialized record's staged changes, folding the
    /// stored rows back into them.
    pub async fn save(&mut self, options: ContextBuilder) -> Result<Vec<Row>> {
        let model = Arc::clone(self.require_model()?);
        if model.is_view() {
            return Err(OrmError::ReadOnly(model.name().to_string()));
        }
        let context = options.context(&self.context).finish();
        let store = context.store()?;
        self.get_records().await?;
        let rows = store.save_collection(self, &context).await?;
        if let Some(records) = &mut self.records {
            for record in records.iter_mut() {
                record.mark_loaded();
            }
        }
        Ok(rows)
    }

    /// Deletes every record the context matches, returning the number
    /// of rows removed.
    pub async fn delete(&mut self, options: ContextBuilder) -> Result<u64> {
        let model = Arc::clone(self.require_model()?);
        if model.is_view() {
            return Err(OrmError::ReadOnly(model.name().to_string()));
        }
        let context = options.context(&self.context).finish();
        let store = context.store()?;
        debug!(model = model.name(), "deleting collection");
        let removed = store.delete_collection(self, &context).await?;
        self.records = None;
        self.count_cache = None;
        self.first_cache = None;
        self.last_cache = None;
        Ok(removed)
    }
}
