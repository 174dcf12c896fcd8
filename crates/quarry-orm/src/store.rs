//! Stores and the ambient store stack.
//!
//! A [`Store`] pairs a name with a pluggable [`StoreBackend`] that does
//! the actual persistence work.  Stores are activated by pushing them
//! onto a process-wide stack; operations that do not name a store use
//! the top of the stack, and named lookups scan from the top down so
//! the most recently pushed store with a given name wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use async_trait::async_trait;
use tracing::warn;

use quarry_core::Value;

use crate::collection::Collection;
use crate::context::Context;
use crate::error::{OrmError, Result};
use crate::model::Model;
use crate::record::Record;

/// A raw column/value row as returned by a backend.
pub type Row = HashMap<String, Value>;

/// The persistence interface a store delegates to.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Fetches rows for the model under the given context.
    async fn get_records(&self, model: &Arc<Model>, context: &Context) -> Result<Vec<Row>>;

    /// Counts rows for the model under the given context.
    async fn get_count(&self, model: &Arc<Model>, context: &Context) -> Result<u64>;

    /// Persists a record's staged changes, returning the stored row.
    async fn save_record(&self, record: &Record, context: &Context) -> Result<Row>;

    /// Persists every materialized record in the collection.
    async fn save_collection(
        &self,
        collection: &Collection,
        context: &Context,
    ) -> Result<Vec<Row>>;

    /// Deletes the record, returning the number of rows removed.
    async fn delete_record(&self, record: &Record, context: &Context) -> Result<u64>;

    /// Deletes every record matched by the collection's context.
    async fn delete_collection(&self, collection: &Collection, context: &Context) -> Result<u64>;
}

/// A named persistence target.
pub struct Store {
    name: String,
    namespace: Option<String>,
    backend: Option<Box<dyn StoreBackend>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("name", &self.name)
            .field("namespace", &self.namespace)
            .field("backend", &self.backend.is_some())
            .finish()
    }
}

impl Store {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: None,
            backend: None,
        }
    }

    #[must_use]
    pub fn with_backend(mut self, backend: impl StoreBackend + 'static) -> Self {
        self.backend = Some(Box::new(backend));
        self
    }

    #[must_use]
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    fn backend(&self) -> Result<&dyn StoreBackend> {
        self.backend.as_deref().ok_or(OrmError::NoBackend)
    }

    pub async fn get_records(&self, model: &Arc<Model>, context: &Context) -> Result<Vec<Row>> {
        self.backend()?.get_records(model, context).await
    }

    pub async fn get_count(&self, model: &Arc<Model>, context: &Context) -> Result<u64> {
        self.backend()?.get_count(model, context).await
    }

    pub async fn save_record(&self, record: &Record, context: &Context) -> Result<Row> {
        self.backend()?.save_record(record, context).await
    }

    pub async fn save_collection(
        &self,
        collection: &Collection,
        context: &Context,
    ) -> Result<Vec<Row>> {
        self.backend()?.save_collection(collection, context).await
    }

    pub async fn delete_record(&self, record: &Record, context: &Context) -> Result<u64> {
        self.backend()?.delete_record(record, context).await
    }

    pub async fn delete_collection(&self, collection: &Collection, context: &Context) -> Result<u64> {
        self.backend()?.delete_collection(collection, context).await
    }
}

fn stack() -> MutexGuard<'static, Vec<Arc<Store>>> {
    static STACK: OnceLock<Mutex<Vec<Arc<Store>>>> = OnceLock::new();
    match STACK.get_or_init(Mutex::default).lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Pushes a store onto the active stack and returns it.
pub fn push_store(store: Arc<Store>) -> Arc<Store> {
    stack().push(Arc::clone(&store));
    store
}

/// Pops the top store off the stack.
pub fn pop_store() -> Option<Arc<Store>> {
    stack().pop()
}

/// Removes a specific store from the stack, wherever it sits.
pub fn remove_store(store: &Arc<Store>) -> Option<Arc<Store>> {
    let mut stack = stack();
    let position = stack.iter().rposition(|entry| Arc::ptr_eq(entry, store))?;
    Some(stack.remove(position))
}

/// Resolves the active store: the top of the stack, or the topmost
/// store with the given name.
pub fn current_store(name: Option<&str>) -> Option<Arc<Store>> {
    let stack = stack();
    match name {
        None => stack.last().cloned(),
        Some(name) => stack
            .iter()
            .rev()
            .find(|entry| entry.name() == name)
            .cloned(),
    }
}

/// Activates a store for the lifetime of the returned guard.
#[must_use]
pub fn activate(store: &Arc<Store>) -> StoreGuard {
    push_store(Arc::clone(store));
    StoreGuard {
        store: Arc::clone(store),
    }
}

/// Keeps a store on the stack until dropped.  Guards are expected to be
/// released in reverse activation order.
pub struct StoreGuard {
    store: Arc<Store>,
}

impl Drop for StoreGuard {
    fn drop(&mut self) {
        let mut stack = stack();
        match stack.last() {
            Some(top) if Arc::ptr_eq(top, &self.store) => {
                stack.pop();
            }
            _ => {
                warn!(store = self.store.name(), "store released out of order");
                if let Some(position) =
                    stack.iter().rposition(|entry| Arc::ptr_eq(entry, &self.store))
                {
                    stack.remove(position);
                }
            }
        }
    }
}
