//! Tests for record and collection behavior against a stub backend.
//!
//! Every context binds its store directly, so these tests never touch
//! the process-wide store stack.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_core::{Collector, Field, FieldFlags, Filter, Query, Reference, Value};
use quarry_orm::{
    Collection, Context, FetchKey, Model, OrmError, Record, Result, Row, Store, StoreBackend,
};

/// Serves canned rows and records what it was asked.
#[derive(Default)]
struct StubBackend {
    rows: Mutex<Vec<Row>>,
    script: Mutex<VecDeque<Vec<Row>>>,
    last_context: Mutex<Option<Context>>,
    fetches: AtomicUsize,
    next_key: AtomicI64,
}

impl StubBackend {
    fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows: Mutex::new(rows),
            next_key: AtomicI64::new(1),
            ..Self::default()
        }
    }

    /// Answers successive reads with successive row sets.
    fn with_script(responses: Vec<Vec<Row>>) -> Self {
        Self {
            script: Mutex::new(responses.into()),
            next_key: AtomicI64::new(1),
            ..Self::default()
        }
    }

    fn last_context(&self) -> Context {
        self.last_context
            .lock()
            .unwrap()
            .clone()
            .expect("backend was never queried")
    }
}

#[async_trait]
impl StoreBackend for StubBackend {
    async fn get_records(&self, _model: &Arc<Model>, context: &Context) -> Result<Vec<Row>> {
        self.fetches.fetch_add(1, AtomicOrdering::SeqCst);
        *self.last_context.lock().unwrap() = Some(context.clone());
        match self.script.lock().unwrap().pop_front() {
            Some(rows) => Ok(rows),
            None => Ok(self.rows.lock().unwrap().clone()),
        }
    }

    async fn get_count(&self, _model: &Arc<Model>, context: &Context) -> Result<u64> {
        *self.last_context.lock().unwrap() = Some(context.clone());
        Ok(self.rows.lock().unwrap().len() as u64)
    }

    async fn save_record(&self, _record: &Record, _context: &Context) -> Result<Row> {
        let key = self.next_key.fetch_add(1, AtomicOrdering::SeqCst);
        let mut row = Row::new();
        row.insert("id".to_string(), Value::Int(key.max(1)));
        Ok(row)
    }

    async fn save_collection(
        &self,
        _collection: &Collection,
        _context: &Context,
    ) -> Result<Vec<Row>> {
        Ok(Vec::new())
    }

    async fn delete_record(&self, _record: &Record, _context: &Context) -> Result<u64> {
        Ok(1)
    }

    async fn delete_collection(&self, _collection: &Collection, _context: &Context) -> Result<u64> {
        Ok(self.rows.lock().unwrap().len() as u64)
    }
}

fn make_store(backend: StubBackend) -> Arc<Store> {
    Arc::new(Store::new("stub").with_backend(backend))
}

fn bound_context(store: &Arc<Store>) -> Context {
    Context::build().store(Arc::clone(store)).finish()
}

fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect::<HashMap<_, _>>()
}

#[tokio::test]
async fn staging_and_reverting_changes() {
    let model = Model::define("DraftNote")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("body"))
        .register();
    let mut record = Record::new(&model, Context::build());

    assert!(record.is_new());
    assert!(record.is_clean());

    record.set("body", Value::Text("hello".into())).await.unwrap();
    assert_eq!(record.local_changes().len(), 1);
    assert_eq!(record.peek("body").unwrap(), Value::Text("hello".into()));

    // Setting a field back to its stored value reverts the change.
    record.set("body", Value::Null).await.unwrap();
    assert!(record.is_clean());

    match record.set("missing", Value::Int(1)).await {
        Err(OrmError::InvalidField(name)) => assert_eq!(name, "missing"),
        other => panic!("expected InvalidField, got {other:?}"),
    }
}

#[tokio::test]
async fn save_round_trip_folds_returned_row() {
    let model = Model::define("SaveUser")
        .field(Field::new("id").with_flags(FieldFlags::KEY | FieldFlags::AUTO_ASSIGN))
        .field(Field::new("username"))
        .register();
    let store = make_store(StubBackend::default());
    let mut record = Record::new(&model, Context::build().store(Arc::clone(&store)));

    record
        .set("username", Value::Text("bob".into()))
        .await
        .unwrap();
    assert!(record.is_new());

    let saved = record.save(Context::build()).await.unwrap();
    assert!(saved);
    assert_eq!(record.peek("id").unwrap(), Value::Int(1));
    assert_eq!(record.peek("username").unwrap(), Value::Text("bob".into()));
    assert!(record.is_clean());
    assert!(!record.is_new());

    // A clean record saves as a no-op.
    let saved = record.save(Context::build()).await.unwrap();
    assert!(!saved);
}

#[tokio::test]
async fn views_refuse_writes() {
    let model = Model::define("ActiveUserView")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .view(true)
        .register();
    let store = make_store(StubBackend::default());
    let mut record = Record::new(&model, Context::build().store(Arc::clone(&store)));
    record.set("id", Value::Int(1)).await.unwrap();

    match record.save(Context::build()).await {
        Err(OrmError::ReadOnly(name)) => assert_eq!(name, "ActiveUserView"),
        other => panic!("expected ReadOnly, got {other:?}"),
    }
    match record.delete(Context::build()).await {
        Err(OrmError::ReadOnly(_)) => {}
        other => panic!("expected ReadOnly, got {other:?}"),
    }
}

#[tokio::test]
async fn create_saves_immediately() {
    let model = Model::define("CreatedUser")
        .field(Field::new("id").with_flags(FieldFlags::KEY | FieldFlags::AUTO_ASSIGN))
        .field(Field::new("username"))
        .register();
    let store = make_store(StubBackend::default());

    let record = model
        .create(
            vec![("username".to_string(), Value::Text("sally".into()))],
            Context::build().store(Arc::clone(&store)),
        )
        .await
        .unwrap();
    assert_eq!(record.peek("id").unwrap(), Value::Int(1));
    assert_eq!(record.peek("username").unwrap(), Value::Text("sally".into()));
    assert!(record.is_clean());
}

#[tokio::test]
async fn fetch_builds_key_filter() {
    let model = Model::define("FetchAccount")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("email").with_flags(FieldFlags::KEYABLE))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![row(&[
        ("id", Value::Int(1)),
        ("email", Value::Text("bob@x.com".into())),
    ])]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let found = model
        .fetch(FetchKey::value(1_i64), Context::build().store(Arc::clone(&store)))
        .await
        .unwrap();
    assert!(found.is_some());

    let context = backend.last_context();
    assert_eq!(context.limit(), Some(1));
    // Scalar keys match the key field or any keyable field.
    match &context.filter {
        Filter::Group(group) => assert_eq!(group.queries.len(), 2),
        other => panic!("expected a group filter, got {other:?}"),
    }

    match model
        .fetch(
            FetchKey::composite(vec![Value::Int(1), Value::Int(2)]),
            Context::build().store(Arc::clone(&store)),
        )
        .await
    {
        Err(OrmError::InvalidKey(_)) => {}
        other => panic!("expected InvalidKey, got {other:?}"),
    }
}

/// Lets one stub instance back several stores.
struct SharedBackend(Arc<StubBackend>);

#[async_trait]
impl StoreBackend for SharedBackend {
    async fn get_records(&self, model: &Arc<Model>, context: &Context) -> Result<Vec<Row>> {
        self.0.get_records(model, context).await
    }
    async fn get_count(&self, model: &Arc<Model>, context: &Context) -> Result<u64> {
        self.0.get_count(model, context).await
    }
    async fn save_record(&self, record: &Record, context: &Context) -> Result<Row> {
        self.0.save_record(record, context).await
    }
    async fn save_collection(
        &self,
        collection: &Collection,
        context: &Context,
    ) -> Result<Vec<Row>> {
        self.0.save_collection(collection, context).await
    }
    async fn delete_record(&self, record: &Record, context: &Context) -> Result<u64> {
        self.0.delete_record(record, context).await
    }
    async fn delete_collection(&self, collection: &Collection, context: &Context) -> Result<u64> {
        self.0.delete_collection(collection, context).await
    }
}

#[tokio::test]
async fn reference_traversal_loads_once() {
    let model = Model::define("CrewMember")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("username"))
        .field(Field::new("manager_id").with_refers_to("CrewMember.id"))
        .reference(Reference::new("manager", "manager_id"))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![row(&[
        ("id", Value::Int(1)),
        ("username", Value::Text("alice".into())),
    ])]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let mut record = Record::from_state(
        &model,
        row(&[
            ("id", Value::Int(2)),
            ("username", Value::Text("bob".into())),
            ("manager_id", Value::Int(1)),
        ]),
        bound_context(&store),
    );

    let manager = record.get("manager.username").await.unwrap();
    assert_eq!(manager, Value::Text("alice".into()));
    assert_eq!(backend.fetches.load(AtomicOrdering::SeqCst), 1);

    // Second traversal reuses the loaded record.
    let manager = record.get("manager.username").await.unwrap();
    assert_eq!(manager, Value::Text("alice".into()));
    assert_eq!(backend.fetches.load(AtomicOrdering::SeqCst), 1);

    // A bare reference answers with the remote key.
    assert_eq!(record.get("manager").await.unwrap(), Value::Int(1));

    // A null source never queries.
    let mut orphan = Record::from_state(
        &model,
        row(&[("id", Value::Int(3)), ("manager_id", Value::Null)]),
        bound_context(&store),
    );
    assert_eq!(orphan.get("manager").await.unwrap(), Value::Null);
    assert_eq!(backend.fetches.load(AtomicOrdering::SeqCst), 1);
}

#[tokio::test]
async fn collector_builds_filtered_collection() {
    let _target = Model::define("TaskItem")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("owner_id"))
        .field(Field::new("title"))
        .register();
    let model = Model::define("TaskOwner")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .collector(Collector::reverse_lookup("tasks", "TaskItem.owner_id"))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![
        row(&[("id", Value::Int(10)), ("title", Value::Text("one".into()))]),
        row(&[("id", Value::Int(11)), ("title", Value::Text("two".into()))]),
    ]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let mut record = Record::from_state(&model, row(&[("id", Value::Int(1))]), bound_context(&store));

    let titles = record.get("tasks.title").await.unwrap();
    assert_eq!(
        titles,
        Value::List(vec![Value::Text("one".into()), Value::Text("two".into())])
    );

    // The collection context filters on the reverse-lookup field.
    let context = backend.last_context();
    match &context.filter {
        Filter::Leaf(query) => {
            assert_eq!(query.name, "owner_id");
            assert_eq!(query.value, Value::Int(1));
        }
        other => panic!("expected a leaf filter, got {other:?}"),
    }
}

#[tokio::test]
async fn edge_lookups_ignore_pagination() {
    let model = Model::define("PagedTicket")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![row(&[("id", Value::Int(1))])]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    // A paged collection still resolves its first record with a
    // one-row read from the start of the matched set.
    let mut collection = model.select(
        Context::build()
            .store(Arc::clone(&store))
            .page(3)
            .page_size(50),
    );
    collection.get_first().await.unwrap().unwrap();
    let seen = backend.last_context();
    assert_eq!(seen.limit(), Some(1));
    assert_eq!(seen.start(), None);

    // Key lookups discard pagination the same way.
    let found = model
        .fetch(
            FetchKey::value(1_i64),
            Context::build()
                .store(Arc::clone(&store))
                .page(2)
                .page_size(25),
        )
        .await
        .unwrap();
    assert!(found.is_some());
    let seen = backend.last_context();
    assert_eq!(seen.limit(), Some(1));
    assert_eq!(seen.start(), None);
}

#[tokio::test]
async fn through_collector_reaches_the_far_side() {
    let _far = Model::define("ClubGroup")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("name"))
        .register();
    let _join = Model::define("ClubMembership")
        .field(Field::new("user_id"))
        .field(Field::new("group_id").with_refers_to("ClubGroup.id"))
        .register();
    let model = Model::define("ClubUser")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .collector(Collector::through(
            "groups",
            "ClubMembership",
            "user_id",
            "group_id",
        ))
        .register();
    let backend = Arc::new(StubBackend::with_script(vec![
        vec![
            row(&[("user_id", Value::Int(1)), ("group_id", Value::Int(10))]),
            row(&[("user_id", Value::Int(1)), ("group_id", Value::Int(11))]),
        ],
        vec![
            row(&[("id", Value::Int(10)), ("name", Value::Text("reds".into()))]),
            row(&[("id", Value::Int(11)), ("name", Value::Text("blues".into()))]),
        ],
    ]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let mut record =
        Record::from_state(&model, row(&[("id", Value::Int(1))]), bound_context(&store));

    let names = record.get("groups.name").await.unwrap();
    assert_eq!(
        names,
        Value::List(vec![Value::Text("reds".into()), Value::Text("blues".into())])
    );
    assert_eq!(backend.fetches.load(AtomicOrdering::SeqCst), 2);

    // The far-side read filters on the keys gathered from the join rows.
    let context = backend.last_context();
    match &context.filter {
        Filter::Leaf(query) => {
            assert_eq!(query.name, "id");
            assert_eq!(query.value, Value::List(vec![Value::Int(10), Value::Int(11)]));
        }
        other => panic!("expected a leaf filter, got {other:?}"),
    }
}

#[tokio::test]
async fn collections_answer_reserved_words() {
    let model = Model::define("QueueEntry")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("label"))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![
        row(&[("id", Value::Int(1)), ("label", Value::Text("a".into()))]),
        row(&[("id", Value::Int(2)), ("label", Value::Text("b".into()))]),
    ]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let mut collection = model.select(Context::build().store(Arc::clone(&store)));
    assert_eq!(collection.get("count").await.unwrap(), Value::Int(2));
    assert_eq!(collection.get("first.label").await.unwrap(), Value::Text("a".into()));
    assert_eq!(collection.get("first").await.unwrap(), Value::Int(1));

    match collection.set("count", Value::Int(5)).await {
        Err(OrmError::ReadOnly(name)) => assert_eq!(name, "count"),
        other => panic!("expected ReadOnly, got {other:?}"),
    }
    match collection.set("first", Value::Int(5)).await {
        Err(OrmError::ReadOnly(_)) => {}
        other => panic!("expected ReadOnly, got {other:?}"),
    }
}

#[tokio::test]
async fn collections_broadcast_and_distribute_sets() {
    let model = Model::define("BatchRow")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("status"))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![
        row(&[("id", Value::Int(1))]),
        row(&[("id", Value::Int(2))]),
    ]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let mut collection = model.select(Context::build().store(Arc::clone(&store)));
    collection
        .set("status", Value::Text("done".into()))
        .await
        .unwrap();
    let statuses = collection.get("status").await.unwrap();
    assert_eq!(
        statuses,
        Value::List(vec![Value::Text("done".into()), Value::Text("done".into())])
    );

    // A list value is distributed one element per record.
    collection
        .set(
            "status",
            Value::List(vec![Value::Text("a".into()), Value::Text("b".into())]),
        )
        .await
        .unwrap();
    let statuses = collection.get("status").await.unwrap();
    assert_eq!(
        statuses,
        Value::List(vec![Value::Text("a".into()), Value::Text("b".into())])
    );

    // Mismatched lengths are refused.
    match collection.set("status", Value::List(vec![Value::Int(1)])).await {
        Err(OrmError::InvalidField(_)) => {}
        other => panic!("expected InvalidField, got {other:?}"),
    }
}

#[tokio::test]
async fn gather_preserves_request_order() {
    let model = Model::define("ProfileCard")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("first_name"))
        .field(Field::new("last_name"))
        .register();
    let store = make_store(StubBackend::default());
    let mut record = Record::from_state(
        &model,
        row(&[
            ("id", Value::Int(1)),
            ("first_name", Value::Text("Bob".into())),
            ("last_name", Value::Text("Dole".into())),
        ]),
        bound_context(&store),
    );

    let values = record.gather(&["last_name", "first_name"]).await.unwrap();
    assert_eq!(
        values,
        vec![Value::Text("Dole".into()), Value::Text("Bob".into())]
    );
}

#[tokio::test]
async fn refine_narrows_without_touching_parent() {
    let model = Model::define("AuditLine")
        .field(Field::new("id").with_flags(FieldFlags::KEY))
        .field(Field::new("actor"))
        .register();
    let backend = Arc::new(StubBackend::with_rows(vec![row(&[("id", Value::Int(1))])]));
    let store = Arc::new(Store::new("stub").with_backend(SharedBackend(Arc::clone(&backend))));

    let collection = model.select(
        Context::build()
            .store(Arc::clone(&store))
            .filter(Query::new("actor").is("bob")),
    );
    let mut narrowed = collection.refine(Context::build().filter(Query::new("id").gt(5_i64)));

    narrowed.get_records().await.unwrap();
    let context = backend.last_context();
    match &context.filter {
        Filter::Group(group) => assert_eq!(group.queries.len(), 2),
        other => panic!("expected a group filter, got {other:?}"),
    }
    assert!(!collection.is_loaded());
    assert!(narrowed.is_loaded());
}
