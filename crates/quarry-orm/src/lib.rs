//! Asynchronous object-relational mapping over pluggable stores.
//!
//! Models are declared once and registered globally; records and
//! collections resolve against whichever [`Store`] is active when an
//! operation runs, so the same model definitions serve production,
//! tests, and background jobs by stacking different stores.
//!
//! ```
//! use quarry_core::{Field, FieldFlags};
//! use quarry_orm::Model;
//!
//! let user = Model::define("User")
//!     .field(Field::new("id").with_flags(FieldFlags::KEY | FieldFlags::AUTO_ASSIGN))
//!     .field(Field::new("username").with_flags(FieldFlags::UNIQUE))
//!     .store("primary")
//!     .register();
//! assert_eq!(user.schema().key_fields()[0].name(), "id");
//! ```

pub mod collection;
pub mod context;
pub mod error;
pub mod model;
pub mod record;
pub mod store;

pub use collection::{Collection, RESERVED_WORDS};
pub use context::{Context, ContextBuilder, ReturnType, StoreRef, DEFAULT_LOCALE};
pub use error::{OrmError, Result};
pub use model::{find_model, FetchKey, Mixin, Model, ModelBuilder};
pub use record::Record;
pub use store::{
    activate, current_store, pop_store, push_store, remove_store, Row, Store, StoreBackend,
    StoreGuard,
};
