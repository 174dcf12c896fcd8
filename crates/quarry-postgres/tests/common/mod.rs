#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use quarry_core::Value;
use quarry_orm::{Context, Result, Row, Store};
use quarry_postgres::{Postgres, SqlClient};

/// Records every statement and hands back queued rows.
#[derive(Default)]
pub struct MockClient {
    pub calls: Mutex<Vec<(String, Vec<Value>)>>,
    pub results: Mutex<VecDeque<Vec<Row>>>,
    pub affected: Mutex<u64>,
}

impl MockClient {
    pub fn queue_rows(&self, rows: Vec<Row>) {
        self.results.lock().unwrap().push_back(rows);
    }

    pub fn set_affected(&self, affected: u64) {
        *self.affected.lock().unwrap() = affected;
    }

    pub fn last_call(&self) -> (String, Vec<Value>) {
        self.calls
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no statement was executed")
    }
}

#[async_trait]
impl SqlClient for MockClient {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(*self.affected.lock().unwrap())
    }

    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        self.calls
            .lock()
            .unwrap()
            .push((sql.to_string(), params.to_vec()));
        Ok(self.results.lock().unwrap().pop_front().unwrap_or_default())
    }
}

/// A store wired to a recording client.
pub fn mock_store() -> (Arc<Store>, Arc<MockClient>) {
    let client = Arc::new(MockClient::default());
    let backend = Postgres::new(Arc::clone(&client) as Arc<dyn SqlClient>);
    let store = Arc::new(Store::new("mock").with_backend(backend));
    (store, client)
}

/// A context bound straight to the store, bypassing the global stack.
pub fn bound(store: &Arc<Store>) -> Context {
    Context::build().store(Arc::clone(store)).finish()
}

pub fn row(pairs: &[(&str, Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}
