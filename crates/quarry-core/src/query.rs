//! Query predicates and boolean composition.
//!
//! A [`Query`] is a leaf predicate naming a model field, an operator, and an
//! operand value. Queries compose into [`QueryGroup`]s with `&` and `|`;
//! composition never mutates its operands and flattens nested groups that
//! share the same boolean operator, so repeated chaining produces a single
//! flat group with predictable left-to-right ordering.

use std::ops::{BitAnd, BitOr};

use crate::value::{ToValue, Value};

/// Comparison operators available on leaf predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOp {
    /// Equality (`=`).
    Is,
    /// Inequality (`!=`).
    IsNot,
    /// Membership (`IN`).
    IsIn,
    /// Non-membership (`NOT IN`).
    IsNotIn,
    /// Strictly greater (`>`).
    GreaterThan,
    /// Greater or equal (`>=`).
    GreaterThanOrEqual,
    /// Strictly less (`<`).
    LessThan,
    /// Less or equal (`<=`).
    LessThanOrEqual,
    /// Case-sensitive substring match (`LIKE`).
    Contains,
    /// Case-insensitive substring match (`ILIKE`).
    ContainsInsensitive,
    /// Regular expression match (`~`).
    Matches,
    /// Temporal "earlier than" (`<`).
    Before,
    /// Temporal "later than" (`>`).
    After,
    /// Inclusive range check.
    Between,
    /// Prefix match.
    Startswith,
    /// Suffix match.
    Endswith,
    /// Negated prefix match.
    DoesNotStartwith,
    /// Negated suffix match.
    DoesNotEndwith,
}

/// Boolean operator joining the members of a [`QueryGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    /// All members must match.
    And,
    /// Any member may match.
    Or,
}

/// A leaf predicate: model-qualified field name, operator, operand.
///
/// Construction is immutable — the comparison builders clone the query and
/// override the operator and value on the copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    /// Model the field belongs to, when qualified.
    pub model: Option<String>,
    /// Field name the predicate applies to.
    pub name: String,
    /// Comparison operator.
    pub op: QueryOp,
    /// Operand value.
    pub value: Value,
}

impl Query {
    /// Creates a predicate against an unqualified field name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            model: None,
            name: name.into(),
            op: QueryOp::Is,
            value: Value::Null,
        }
    }

    /// Creates a predicate qualified by a model name.
    pub fn on(model: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            model: Some(model.into()),
            ..Self::new(name)
        }
    }

    /// Creates the null predicate, absorbed by any composition.
    pub fn null() -> Self {
        Self::new("")
    }

    /// Returns true when neither a model nor a field name is set.
    pub fn is_null(&self) -> bool {
        self.model.is_none() && self.name.is_empty()
    }

    fn with(&self, op: QueryOp, value: Value) -> Self {
        Self {
            op,
            value,
            ..self.clone()
        }
    }

    /// Equality predicate.
    pub fn is(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Is, value.to_value())
    }

    /// Inequality predicate.
    pub fn is_not(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::IsNot, value.to_value())
    }

    /// Membership predicate.
    pub fn is_in(&self, values: impl ToValue) -> Self {
        self.with(QueryOp::IsIn, values.to_value())
    }

    /// Non-membership predicate.
    pub fn is_not_in(&self, values: impl ToValue) -> Self {
        self.with(QueryOp::IsNotIn, values.to_value())
    }

    /// Greater-than predicate.
    pub fn gt(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::GreaterThan, value.to_value())
    }

    /// Greater-than-or-equal predicate.
    pub fn gte(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::GreaterThanOrEqual, value.to_value())
    }

    /// Less-than predicate.
    pub fn lt(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::LessThan, value.to_value())
    }

    /// Less-than-or-equal predicate.
    pub fn lte(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::LessThanOrEqual, value.to_value())
    }

    /// Substring predicate.
    pub fn contains(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Contains, value.to_value())
    }

    /// Case-insensitive substring predicate.
    pub fn contains_insensitive(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::ContainsInsensitive, value.to_value())
    }

    /// Regular-expression predicate.
    pub fn matches(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Matches, value.to_value())
    }

    /// Temporal "earlier than" predicate.
    pub fn before(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Before, value.to_value())
    }

    /// Temporal "later than" predicate.
    pub fn after(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::After, value.to_value())
    }

    /// Inclusive range predicate.
    pub fn between(&self, low: impl ToValue, high: impl ToValue) -> Self {
        self.with(
            QueryOp::Between,
            Value::List(vec![low.to_value(), high.to_value()]),
        )
    }

    /// Prefix predicate.
    pub fn startswith(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Startswith, value.to_value())
    }

    /// Suffix predicate.
    pub fn endswith(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::Endswith, value.to_value())
    }

    /// Negated prefix predicate.
    pub fn does_not_startwith(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::DoesNotStartwith, value.to_value())
    }

    /// Negated suffix predicate.
    pub fn does_not_endwith(&self, value: impl ToValue) -> Self {
        self.with(QueryOp::DoesNotEndwith, value.to_value())
    }
}

impl Default for Query {
    fn default() -> Self {
        Self::null()
    }
}

/// A boolean composition of predicates, kept flat per operator.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryGroup {
    /// Boolean operator joining the members.
    pub op: GroupOp,
    /// Ordered member predicates.
    pub queries: Vec<Filter>,
}

impl QueryGroup {
    /// Creates a group from an operator and its members.
    pub fn new(op: GroupOp, queries: Vec<Filter>) -> Self {
        Self { op, queries }
    }

    /// Returns true when the group has no members.
    pub fn is_null(&self) -> bool {
        self.queries.is_empty()
    }
}

/// Either a leaf predicate, a group, or nothing at all.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// No predicate; absorbed by composition.
    Null,
    /// A single leaf predicate.
    Leaf(Query),
    /// A boolean group of predicates.
    Group(QueryGroup),
}

impl Filter {
    /// Returns true when the filter carries no predicate.
    pub fn is_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Leaf(query) => query.is_null(),
            Self::Group(group) => group.is_null(),
        }
    }
}

impl Default for Filter {
    fn default() -> Self {
        Self::Null
    }
}

impl From<Query> for Filter {
    fn from(query: Query) -> Self {
        Self::Leaf(query)
    }
}

impl From<QueryGroup> for Filter {
    fn from(group: QueryGroup) -> Self {
        Self::Group(group)
    }
}

impl From<Option<Filter>> for Filter {
    fn from(filter: Option<Filter>) -> Self {
        filter.unwrap_or(Self::Null)
    }
}

/// Combines two filters under the given boolean operator.
///
/// A null operand is absorbed: the other side is returned unchanged. Groups
/// already joined by `op` are flattened rather than nested, so chained
/// composition keeps a single flat member list in left-to-right order.
pub fn make_query_group(op: GroupOp, left: Filter, right: Filter) -> Filter {
    if left.is_null() {
        return right;
    }
    if right.is_null() {
        return left;
    }
    match (left, right) {
        (Filter::Group(a), Filter::Group(b)) if a.op == op && b.op == op => {
            let mut queries = a.queries;
            queries.extend(b.queries);
            Filter::Group(QueryGroup::new(op, queries))
        }
        (Filter::Group(mut a), right) if a.op == op => {
            a.queries.push(right);
            Filter::Group(a)
        }
        (left, Filter::Group(b)) if b.op == op => {
            let mut queries = Vec::with_capacity(b.queries.len() + 1);
            queries.push(left);
            queries.extend(b.queries);
            Filter::Group(QueryGroup::new(op, queries))
        }
        (left, right) => Filter::Group(QueryGroup::new(op, vec![left, right])),
    }
}

impl<R: Into<Filter>> BitAnd<R> for Filter {
    type Output = Filter;

    fn bitand(self, rhs: R) -> Filter {
        make_query_group(GroupOp::And, self, rhs.into())
    }
}

impl<R: Into<Filter>> BitOr<R> for Filter {
    type Output = Filter;

    fn bitor(self, rhs: R) -> Filter {
        make_query_group(GroupOp::Or, self, rhs.into())
    }
}

impl<R: Into<Filter>> BitAnd<R> for Query {
    type Output = Filter;

    fn bitand(self, rhs: R) -> Filter {
        make_query_group(GroupOp::And, self.into(), rhs.into())
    }
}

impl<R: Into<Filter>> BitOr<R> for Query {
    type Output = Filter;

    fn bitor(self, rhs: R) -> Filter {
        make_query_group(GroupOp::Or, self.into(), rhs.into())
    }
}

impl<R: Into<Filter>> BitAnd<R> for QueryGroup {
    type Output = Filter;

    fn bitand(self, rhs: R) -> Filter {
        make_query_group(GroupOp::And, self.into(), rhs.into())
    }
}

impl<R: Into<Filter>> BitOr<R> for QueryGroup {
    type Output = Filter;

    fn bitor(self, rhs: R) -> Filter {
        make_query_group(GroupOp::Or, self.into(), rhs.into())
    }
}
