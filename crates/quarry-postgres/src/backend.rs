//! The PostgreSQL store backend.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use quarry_orm::{
    Collection, Context, ContextBuilder, Model, OrmError, Record, Result, ReturnType, Row,
    StoreBackend,
};

use crate::client::SqlClient;
use crate::sql;

/// A [`StoreBackend`] that compiles contexts to PostgreSQL statements.
pub struct Postgres {
    client: Arc<dyn SqlClient>,
    default_namespace: String,
}

impl Postgres {
    #[must_use]
    pub fn new(client: Arc<dyn SqlClient>) -> Self {
        Self {
            client,
            default_namespace: "public".to_string(),
        }
    }

    #[must_use]
    pub fn with_default_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.default_namespace = namespace.into();
        self
    }

    fn namespace(&self, model: &Model, context: &Context) -> String {
        let store_namespace = context
            .store()
            .ok()
            .and_then(|store| store.namespace().map(str::to_string));
        sql::resolve_namespace(
            model.schema(),
            context,
            store_namespace.as_deref(),
            &self.default_namespace,
        )
    }
}

#[async_trait]
impl StoreBackend for Postgres {
    async fn get_records(&self, model: &Arc<Model>, context: &Context) -> Result<Vec<Row>> {
        let namespace = self.namespace(model, context);
        let (statement, params) = sql::select_sql(model.schema(), context, &namespace)?;
        debug!(model = model.name(), statement = %statement, "fetching records");
        self.client.fetch(&statement, &params).await
    }

    async fn get_count(&self, model: &Arc<Model>, context: &Context) -> Result<u64> {
        let context = ContextBuilder::default()
            .returning(ReturnType::Count)
            .context(context)
            .finish();
        let rows = self.get_records(model, &context).await?;
        let count = rows
            .first()
            .and_then(|row| row.get("count"))
            .and_then(quarry_core::Value::as_int)
            .ok_or_else(|| OrmError::database("count query returned no count column"))?;
        u64::try_from(count).map_err(OrmError::database)
    }

    async fn save_record(&self, record: &Record, context: &Context) -> Result<Row> {
        let model = record.model();
        let namespace = self.namespace(model, context);
        let changes = record.local_changes();
        let (statement, params) = if record.is_new() {
            sql::insert_sql(model.schema(), &changes, &namespace, context.locale())?
        } else {
            let key_pairs = record.key_dict(true)?;
            sql::update_sql(
                model.schema(),
                &changes,
                &key_pairs,
                &namespace,
                context.locale(),
            )?
        };
        debug!(model = model.name(), statement = %statement, "saving record");
        let mut rows = self.client.fetch(&statement, &params).await?;
        if rows.is_empty() {
            return Ok(Row::new());
        }
        Ok(rows.remove(0))
    }

    async fn save_collection(
        &self,
        collection: &Collection,
        context: &Context,
    ) -> Result<Vec<Row>> {
        let records = collection.loaded_records().unwrap_or_default();
        let mut rows = Vec::new();
        for record in records {
            if record.is_clean() {
                continue;
            }
            rows.push(self.save_record(record, context).await?);
        }
        Ok(rows)
    }

    async fn delete_record(&self, record: &Record, context: &Context) -> Result<u64> {
        let model = record.model();
        let namespace = self.namespace(model, context);
        let key_pairs = record.key_dict(true)?;
        let (statement, params) = sql::delete_record_sql(model.schema(), &key_pairs, &namespace);
        debug!(model = model.name(), statement = %statement, "deleting record");
        self.client.execute(&statement, &params).await
    }

    async fn delete_collection(&self, collection: &Collection, context: &Context) -> Result<u64> {
        let model = collection
            .model()
            .ok_or_else(|| OrmError::database("collection is not bound to a model"))?
            .clone();
        let namespace = self.namespace(&model, context);
        let (statement, params) =
            sql::delete_collection_sql(model.schema(), &context.filter, &namespace)?;
        debug!(model = model.name(), statement = %statement, "deleting collection");
        self.client.execute(&statement, &params).await
    }
}
