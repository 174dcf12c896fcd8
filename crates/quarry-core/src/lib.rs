//! # quarry-core
//!
//! Building blocks for the quarry ORM: dynamic values, the query predicate
//! algebra, and the declarative schema model (fields, indexes, collectors,
//! references) with inheritance-aware aggregation.
//!
//! Nothing in this crate talks to a database. The ORM layer lives in
//! `quarry-orm`; SQL compilation and execution live in `quarry-postgres`.
//!
//! ## Query algebra
//!
//! ```rust
//! use quarry_core::{Filter, GroupOp, Query, QueryGroup};
//!
//! let a = Query::new("status").is("active");
//! let b = Query::new("age").gt(18);
//! let c = Query::new("verified").is(true);
//!
//! // Chained AND composition stays flat.
//! let filter = a.clone() & b & c;
//! match filter {
//!     Filter::Group(group) => {
//!         assert_eq!(group.op, GroupOp::And);
//!         assert_eq!(group.queries.len(), 3);
//!     }
//!     _ => unreachable!(),
//! }
//!
//! // A null operand is absorbed.
//! let same = a.clone() & Query::null();
//! assert_eq!(same, Filter::Leaf(a));
//! ```
//!
//! ## Schema declaration
//!
//! ```rust
//! use quarry_core::{Field, FieldFlags, Schema};
//!
//! let user = Schema::build("User")
//!     .field(Field::new("id").with_flags(FieldFlags::KEY))
//!     .field(Field::new("username"))
//!     .finish();
//!
//! assert_eq!(user.resource_name(), "users");
//! assert_eq!(user.key_fields()[0].name(), "id");
//! ```

pub mod collector;
pub mod field;
pub mod index;
pub mod inflect;
pub mod ordering;
pub mod query;
pub mod reference;
pub mod schema;
pub mod value;

pub use collector::{Collector, CollectorKind};
pub use field::{Field, FieldDefault, FieldFlags, GetterFn, SetterFn, ValueMap};
pub use index::{Index, IndexFlags};
pub use ordering::Ordering;
pub use query::{make_query_group, Filter, GroupOp, Query, QueryGroup, QueryOp};
pub use reference::Reference;
pub use schema::{Schema, SchemaBuilder, SchemaMember};
pub use value::{ToValue, Value};
