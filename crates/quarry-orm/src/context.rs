//! Query context: the options bag carried alongside every operation.
//!
//! A [`Context`] bundles the filter, ordering, pagination, locale, and
//! store selection for a single lookup or mutation.  Contexts are built
//! through [`ContextBuilder`], which distinguishes "not provided" from
//! "explicitly cleared" so that merging onto a base context keeps the
//! base's settings unless the caller overrode them.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use quarry_core::{Filter, Ordering, ToValue, Value};

use crate::error::{OrmError, Result};
use crate::store::{self, Store};

/// Locale applied when no context in the chain names one.
pub const DEFAULT_LOCALE: &str = "en_US";

/// What shape a read operation should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    /// Materialized records.
    #[default]
    Records,
    /// Raw column/value rows.
    Data,
    /// A single aggregate count.
    Count,
}

/// How a context points at its store: by name, resolved against the
/// active stack at use time, or bound directly to an instance.
#[derive(Clone)]
pub enum StoreRef {
    Named(String),
    Bound(Arc<Store>),
}

impl fmt::Debug for StoreRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Bound(store) => f.debug_tuple("Bound").field(&store.name()).finish(),
        }
    }
}

impl From<&str> for StoreRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for StoreRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<Store>> for StoreRef {
    fn from(store: Arc<Store>) -> Self {
        Self::Bound(store)
    }
}

/// Options for a single ORM operation.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub distinct: Option<Vec<String>>,
    pub fields: Option<Vec<String>>,
    pub namespace: Option<String>,
    /// When set, `namespace` wins even over the schema's own namespace.
    pub force_namespace: bool,
    pub order: Option<Vec<(String, Ordering)>>,
    pub filter: Filter,
    pub returning: ReturnType,
    pub scope: HashMap<String, Value>,
    pub timezone: Option<String>,
    pub store: Option<StoreRef>,
    locale: Option<String>,
    limit: Option<u64>,
    page: Option<u64>,
    page_size: Option<u64>,
    start: Option<u64>,
}

impl Context {
    /// An empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a builder for a new context.
    #[must_use]
    pub fn build() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The locale for translated columns, falling back to
    /// [`DEFAULT_LOCALE`].
    #[must_use]
    pub fn locale(&self) -> &str {
        self.locale.as_deref().unwrap_or(DEFAULT_LOCALE)
    }

    /// Maximum number of records to return.  A page size takes
    /// precedence over a raw limit.
    #[must_use]
    pub fn limit(&self) -> Option<u64> {
        self.page_size.or(self.limit)
    }

    /// Offset of the first record.  When a page is set the offset is
    /// derived from the page number and the effective limit.
    #[must_use]
    pub fn start(&self) -> Option<u64> {
        match self.page {
            Some(page) => Some(page.saturating_sub(1) * self.limit().unwrap_or(0)),
            None => self.start,
        }
    }

    #[must_use]
    pub fn page(&self) -> Option<u64> {
        self.page
    }

    #[must_use]
    pub fn page_size(&self) -> Option<u64> {
        self.page_size
    }

    /// Overrides the record offset directly, detaching the context from
    /// any page-derived value.
    pub fn set_start(&mut self, start: Option<u64>) {
        self.start = start;
        self.page = None;
    }

    /// Overrides the record limit directly, detaching the context from
    /// any page-size-derived value.
    pub fn set_limit(&mut self, limit: Option<u64>) {
        self.limit = limit;
        self.page_size = None;
    }

    /// The ambient slice of this context: store, locale, namespace,
    /// scope, and timezone, without the query-shaping options.
    /// Relation traversals seed their own contexts from this, so a
    /// record's own filter never leaks into its relations.
    #[must_use]
    pub fn subcontext(&self) -> Context {
        Context {
            namespace: self.namespace.clone(),
            force_namespace: self.force_namespace,
            scope: self.scope.clone(),
            timezone: self.timezone.clone(),
            store: self.store.clone(),
            locale: self.locale.clone(),
            ..Context::default()
        }
    }

    /// Resolves the store this context should operate through.
    ///
    /// A bound store is returned as-is; a named store is looked up on
    /// the active stack (last pushed wins); with no reference at all
    /// the top of the stack is used.
    pub fn store(&self) -> Result<Arc<Store>> {
        match &self.store {
            Some(StoreRef::Bound(found)) => Ok(Arc::clone(found)),
            Some(StoreRef::Named(name)) => store::current_store(Some(name))
                .ok_or_else(|| OrmError::StoreNotFound(Some(name.clone()))),
            None => store::current_store(None).ok_or(OrmError::StoreNotFound(None)),
        }
    }
}

/// Accumulates options and merges them over a base context.
///
/// Each slot tracks whether the caller touched it, so `finish` can tell
/// an untouched option (inherit from the base) apart from an explicit
/// clear (override the base with nothing).
#[derive(Default)]
pub struct ContextBuilder {
    distinct: Option<Option<Vec<String>>>,
    fields: Option<Option<Vec<String>>>,
    namespace: Option<Option<String>>,
    force_namespace: Option<bool>,
    order: Option<Option<Vec<(String, Ordering)>>>,
    filter: Filter,
    returning: Option<ReturnType>,
    scope: HashMap<String, Value>,
    timezone: Option<Option<String>>,
    store: Option<Option<StoreRef>>,
    locale: Option<Option<String>>,
    limit: Option<Option<u64>>,
    page: Option<Option<u64>>,
    page_size: Option<Option<u64>>,
    start: Option<Option<u64>>,
    base: Option<Context>,
}

impl ContextBuilder {
    #[must_use]
    pub fn distinct<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.distinct = Some(Some(fields.into_iter().map(Into::into).collect()));
        self
    }

    /// Restricts the operation to the named fields.  Base fields not
    /// already listed are appended during the merge.
    #[must_use]
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = Some(Some(fields.into_iter().map(Into::into).collect()));
        self
    }

    #[must_use]
    pub fn locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(Some(locale.into()));
        self
    }

    #[must_use]
    pub fn clear_locale(mut self) -> Self {
        self.locale = Some(None);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(Some(limit));
        self
    }

    #[must_use]
    pub fn clear_limit(mut self) -> Self {
        self.limit = Some(None);
        self
    }

    #[must_use]
    pub fn start(mut self, start: u64) -> Self {
        self.start = Some(Some(start));
        self
    }

    #[must_use]
    pub fn page(mut self, page: u64) -> Self {
        self.page = Some(Some(page));
        self
    }

    #[must_use]
    pub fn page_size(mut self, page_size: u64) -> Self {
        self.page_size = Some(Some(page_size));
        self
    }

    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(Some(namespace.into()));
        self
    }

    #[must_use]
    pub fn force_namespace(mut self, force: bool) -> Self {
        self.force_namespace = Some(force);
        self
    }

    /// Replaces the ordering wholesale.
    #[must_use]
    pub fn order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = (S, Ordering)>,
        S: Into<String>,
    {
        self.order = Some(Some(
            order.into_iter().map(|(name, dir)| (name.into(), dir)).collect(),
        ));
        self
    }

    /// Parses an ordering from its string form, e.g. `"+name,-created"`.
    #[must_use]
    pub fn order_str(mut self, order: &str) -> Self {
        let parsed = order
            .split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(|part| {
                if let Some(name) = part.strip_prefix('-') {
                    (name.to_string(), Ordering::Desc)
                } else if let Some(name) = part.strip_prefix('+') {
                    (name.to_string(), Ordering::Asc)
                } else {
                    (part.to_string(), Ordering::Asc)
                }
            })
            .collect();
        self.order = Some(Some(parsed));
        self
    }

    /// Restricts the operation with a filter.  Repeated calls AND the
    /// filters together, as does merging onto a base with its own
    /// filter (the builder's side binds first).
    #[must_use]
    pub fn filter(mut self, filter: impl Into<Filter>) -> Self {
        self.filter = self.filter & filter.into();
        self
    }

    #[must_use]
    pub fn returning(mut self, returning: ReturnType) -> Self {
        self.returning = Some(returning);
        self
    }

    /// Adds an entry to the custom scope.  Scopes merge shallowly, with
    /// the builder's entries winning over the base's.
    #[must_use]
    pub fn scope(mut self, key: impl Into<String>, value: impl ToValue) -> Self {
        self.scope.insert(key.into(), value.to_value());
        self
    }

    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(Some(timezone.into()));
        self
    }

    #[must_use]
    pub fn store(mut self, store: impl Into<StoreRef>) -> Self {
        self.store = Some(Some(store.into()));
        self
    }

    #[must_use]
    pub fn clear_store(mut self) -> Self {
        self.store = Some(None);
        self
    }

    /// Sets the store reference only when the caller has not already
    /// chosen one.  Models use this to apply their default store.
    #[must_use]
    pub fn default_store(mut self, store: impl Into<StoreRef>) -> Self {
        if self.store.is_none() {
            self.store = Some(Some(store.into()));
        }
        self
    }

    /// Supplies the base context the builder's options merge onto.
    #[must_use]
    pub fn context(mut self, base: &Context) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Resolves the builder into a context, merging over the base when
    /// one was supplied.
    #[must_use]
    pub fn finish(self) -> Context {
        let base = self.base.unwrap_or_default();

        let fields = match self.fields {
            Some(Some(mut ours)) => {
                if let Some(inherited) = base.fields {
                    for name in inherited {
                        if !ours.contains(&name) {
                            ours.push(name);
                        }
                    }
                }
                Some(ours)
            }
            Some(None) => None,
            None => base.fields,
        };

        let filter = self.filter & base.filter;

        let scope = if self.scope.is_empty() {
            base.scope
        } else {
            let mut merged = base.scope;
            merged.extend(self.scope);
            merged
        };

        Context {
            distinct: self.distinct.unwrap_or(base.distinct),
            fields,
            namespace: self.namespace.unwrap_or(base.namespace),
            force_namespace: self.force_namespace.unwrap_or(base.force_namespace),
            order: self.order.unwrap_or(base.order),
            filter,
            returning: self.returning.unwrap_or(base.returning),
            scope,
            timezone: self.timezone.unwrap_or(base.timezone),
            store: self.store.unwrap_or(base.store),
            locale: self.locale.unwrap_or(base.locale),
            limit: self.limit.unwrap_or(base.limit),
            page: self.page.unwrap_or(base.page),
            page_size: self.page_size.unwrap_or(base.page_size),
            start: self.start.unwrap_or(base.start),
        }
    }
}
