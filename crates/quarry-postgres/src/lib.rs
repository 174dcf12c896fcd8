//! PostgreSQL store backend for the quarry ORM.
//!
//! [`Postgres`] compiles operation contexts into parameterized
//! statements and runs them through a [`SqlClient`].  Wire it into a
//! store and push that store onto the active stack:
//!
//! ```no_run
//! use std::sync::Arc;
//! use quarry_orm::Store;
//! use quarry_postgres::{PgClient, Postgres};
//!
//! # async fn connect() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = sqlx::PgPool::connect("postgres://localhost/app").await?;
//! let backend = Postgres::new(Arc::new(PgClient::new(pool)));
//! let store = Arc::new(Store::new("primary").with_backend(backend));
//! let _active = quarry_orm::activate(&store);
//! # Ok(())
//! # }
//! ```

pub mod backend;
pub mod client;
pub mod sql;

pub use backend::Postgres;
pub use client::{PgClient, SqlClient};
