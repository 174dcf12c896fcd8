//! The low-level SQL client seam.
//!
//! [`SqlClient`] is what the backend actually talks to: a statement
//! plus positional parameters in, rows or an affected count out.  The
//! production implementation wraps a `sqlx` connection pool; tests
//! substitute a recording client.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as _, TypeInfo};

use quarry_core::Value;
use quarry_orm::{OrmError, Result, Row};

/// Executes parameterized SQL against a PostgreSQL database.
#[async_trait]
pub trait SqlClient: Send + Sync {
    /// Runs a statement, returning the number of rows affected.
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Runs a query, returning the result rows.
    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;
}

/// A [`SqlClient`] backed by a `sqlx` connection pool.
pub struct PgClient {
    pool: PgPool,
}

impl PgClient {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, sqlx::postgres::PgArguments>;

// Postgres' extended protocol accepts one command per prepared
// statement, so compound units run piecewise.  Each statement gets its
// placeholders renumbered from $1 against the shared parameter list.
fn split_unit(sql: &str, params: &[Value]) -> Result<Vec<(String, Vec<Value>)>> {
    sql.split(";\n")
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let part = part.trim_end();
            let statement = if part.ends_with(';') {
                part.to_string()
            } else {
                format!("{part};")
            };
            renumber(&statement, params)
        })
        .collect()
}

fn renumber(statement: &str, params: &[Value]) -> Result<(String, Vec<Value>)> {
    let mut text = String::with_capacity(statement.len());
    let mut order: Vec<usize> = Vec::new();
    let mut rest = statement;
    while let Some(found) = rest.find('$') {
        text.push_str(&rest[..found]);
        rest = &rest[found + 1..];
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(rest.len());
        if digits == 0 {
            text.push('$');
            continue;
        }
        let number: usize = rest[..digits].parse().map_err(OrmError::database)?;
        rest = &rest[digits..];
        let position = match order.iter().position(|seen| *seen == number) {
            Some(position) => position,
            None => {
                order.push(number);
                order.len() - 1
            }
        };
        text.push_str(&format!("${}", position + 1));
    }
    text.push_str(rest);
    let values = order
        .iter()
        .map(|number| {
            number
                .checked_sub(1)
                .and_then(|index| params.get(index))
                .cloned()
                .ok_or_else(|| OrmError::database(format!("parameter ${number} has no value")))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok((text, values))
}

fn bind_value<'q>(query: PgQuery<'q>, value: &Value) -> Result<PgQuery<'q>> {
    Ok(match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(value) => query.bind(*value),
        Value::Int(value) => query.bind(*value),
        Value::Float(value) => query.bind(*value),
        Value::Text(value) => query.bind(value.clone()),
        Value::Blob(value) => query.bind(value.clone()),
        Value::List(values) => bind_list(query, values)?,
    })
}

// Lists must be homogeneous to map onto a typed Postgres array.
fn bind_list<'q>(query: PgQuery<'q>, values: &[Value]) -> Result<PgQuery<'q>> {
    if values.iter().all(|value| matches!(value, Value::Int(_))) {
        let items: Vec<i64> = values.iter().filter_map(Value::as_int).collect();
        return Ok(query.bind(items));
    }
    if values.iter().all(|value| matches!(value, Value::Text(_))) {
        let items: Vec<String> = values
            .iter()
            .filter_map(|value| value.as_text().map(str::to_string))
            .collect();
        return Ok(query.bind(items));
    }
    Err(OrmError::database(
        "list parameters must be homogeneous integers or text",
    ))
}

fn decode_row(row: &PgRow) -> Result<Row> {
    let mut decoded = HashMap::new();
    for (index, column) in row.columns().iter().enumerate() {
        let value = match column.type_info().name() {
            "BOOL" => row
                .try_get::<Option<bool>, _>(index)
                .map(|value| value.map_or(Value::Null, Value::Bool)),
            "INT2" => row
                .try_get::<Option<i16>, _>(index)
                .map(|value| value.map_or(Value::Null, |n| Value::Int(i64::from(n)))),
            "INT4" => row
                .try_get::<Option<i32>, _>(index)
                .map(|value| value.map_or(Value::Null, |n| Value::Int(i64::from(n)))),
            "INT8" => row
                .try_get::<Option<i64>, _>(index)
                .map(|value| value.map_or(Value::Null, Value::Int)),
            "FLOAT4" => row
                .try_get::<Option<f32>, _>(index)
                .map(|value| value.map_or(Value::Null, |n| Value::Float(f64::from(n)))),
            "FLOAT8" => row
                .try_get::<Option<f64>, _>(index)
                .map(|value| value.map_or(Value::Null, Value::Float)),
            "BYTEA" => row
                .try_get::<Option<Vec<u8>>, _>(index)
                .map(|value| value.map_or(Value::Null, Value::Blob)),
            _ => row
                .try_get::<Option<String>, _>(index)
                .map(|value| value.map_or(Value::Null, Value::Text)),
        };
        let value = value.map_err(OrmError::database)?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

#[async_trait]
impl SqlClient for PgClient {
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64> {
        let mut affected = 0;
        for (statement, values) in split_unit(sql, params)? {
            let mut query = sqlx::query(&statement);
            for param in &values {
                query = bind_value(query, param)?;
            }
            let result = query
                .execute(&self.pool)
                .await
                .map_err(OrmError::database)?;
            // The base-table statement comes last in compound units, so
            // its count is the unit's count.
            affected = result.rows_affected();
        }
        Ok(affected)
    }

    async fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>> {
        let mut decoded = Vec::new();
        for (statement, values) in split_unit(sql, params)? {
            let mut query = sqlx::query(&statement);
            for param in &values {
                query = bind_value(query, param)?;
            }
            let rows = query
                .fetch_all(&self.pool)
                .await
                .map_err(OrmError::database)?;
            for row in &rows {
                decoded.push(decode_row(row)?);
            }
        }
        Ok(decoded)
    }
}
