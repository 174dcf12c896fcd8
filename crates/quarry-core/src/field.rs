//! Field declarations.
//!
//! A [`Field`] is declared once when its model is defined and shared by
//! identity (behind an `Arc`) across every schema that inherits it. Only the
//! label and backend code may be overridden after construction, through the
//! explicit setters.

use std::collections::HashMap;
use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};
use std::sync::{Arc, RwLock};

use crate::inflect::titleize;
use crate::ordering::Ordering;
use crate::query::{Filter, Query};
use crate::value::{ToValue, Value};

/// Bitset of field behavior flags.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldFlags(u32);

impl FieldFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// Value is assigned by the backend on insert.
    pub const AUTO_ASSIGN: Self = Self(1);
    /// Included in lookups without being requested.
    pub const AUTO_INCLUDE: Self = Self(1 << 1);
    /// Text comparisons are case sensitive.
    pub const CASE_SENSITIVE: Self = Self(1 << 2);
    /// Stored encrypted at rest.
    pub const ENCRYPTED: Self = Self(1 << 3);
    /// Part of the record's identity.
    pub const KEY: Self = Self(1 << 4);
    /// Usable as a lookup key even though it is not the key.
    pub const KEYABLE: Self = Self(1 << 5);
    /// Points at more than one possible model.
    pub const POLYMORPH: Self = Self(1 << 6);
    /// Hidden from serialized output.
    pub const PROTECTED: Self = Self(1 << 7);
    /// Never exposed outside the process.
    pub const PRIVATE: Self = Self(1 << 8);
    /// Must carry a value before save.
    pub const REQUIRED: Self = Self(1 << 9);
    /// Only loaded when explicitly requested.
    pub const REQUIRES_INCLUDE: Self = Self(1 << 10);
    /// Rejected by `set` after load.
    pub const READ_ONLY: Self = Self(1 << 11);
    /// Participates in text search.
    pub const SEARCHABLE: Self = Self(1 << 12);
    /// Shared across all records of the model.
    pub const STATIC: Self = Self(1 << 13);
    /// Localized through the i18n table.
    pub const TRANSLATABLE: Self = Self(1 << 14);
    /// Value must be unique across records.
    pub const UNIQUE: Self = Self(1 << 15);
    /// Computed, never stored in the backend.
    pub const VIRTUAL: Self = Self(1 << 16);

    const NAMES: [(&'static str, Self); 17] = [
        ("AutoAssign", Self::AUTO_ASSIGN),
        ("AutoInclude", Self::AUTO_INCLUDE),
        ("CaseSensitive", Self::CASE_SENSITIVE),
        ("Encrypted", Self::ENCRYPTED),
        ("Key", Self::KEY),
        ("Keyable", Self::KEYABLE),
        ("Polymorph", Self::POLYMORPH),
        ("Protected", Self::PROTECTED),
        ("Private", Self::PRIVATE),
        ("Required", Self::REQUIRED),
        ("RequiresInclude", Self::REQUIRES_INCLUDE),
        ("ReadOnly", Self::READ_ONLY),
        ("Searchable", Self::SEARCHABLE),
        ("Static", Self::STATIC),
        ("Translatable", Self::TRANSLATABLE),
        ("Unique", Self::UNIQUE),
        ("Virtual", Self::VIRTUAL),
    ];

    /// Builds a flag set from a raw bitmask.
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Returns the raw bitmask.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Looks up a single flag by its symbolic name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }

    /// Builds a flag set from symbolic names; `None` when a name is unknown.
    pub fn from_names<'a, I>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Self::NONE;
        for name in names {
            out |= Self::from_name(name)?;
        }
        Some(out)
    }

    /// Returns true when all flags in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Returns true when no flags are set.
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for FieldFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for FieldFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for FieldFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for FieldFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "FieldFlags({})", names.join("|"))
    }
}

/// A snapshot of a record's field values, handed to accessor hooks.
pub type ValueMap = HashMap<String, Value>;

/// Getter strategy invoked instead of the stored value.
pub type GetterFn = Arc<dyn Fn(&ValueMap) -> Value + Send + Sync>;

/// Setter strategy invoked instead of the default staging path. The first
/// argument is the record's staged-changes map.
pub type SetterFn = Arc<dyn Fn(&mut ValueMap, Value) + Send + Sync>;

/// Query strategy rewriting a predicate on this field into real predicates.
pub type QueryFn = Arc<dyn Fn(&Query) -> Filter + Send + Sync>;

/// Default value source for a field.
#[derive(Clone)]
pub enum FieldDefault {
    /// No default; new records start with NULL.
    None,
    /// A fixed value.
    Static(Value),
    /// A value computed at record construction time.
    Computed(Arc<dyn Fn() -> Value + Send + Sync>),
}

impl FieldDefault {
    /// Resolves the default into a concrete value.
    pub fn resolve(&self) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Static(value) => value.clone(),
            Self::Computed(func) => func(),
        }
    }
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Static(value) => write!(f, "Static({value:?})"),
            Self::Computed(_) => write!(f, "Computed(..)"),
        }
    }
}

/// A scalar attribute declared on a model schema.
pub struct Field {
    name: String,
    code: RwLock<Option<String>>,
    label: RwLock<Option<String>>,
    default: FieldDefault,
    default_ordering: Ordering,
    flags: FieldFlags,
    refers_to: Option<String>,
    getter: Option<GetterFn>,
    setter: Option<SetterFn>,
    query: Option<QueryFn>,
}

impl Field {
    /// Creates a field with the given name and no flags.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: RwLock::new(None),
            label: RwLock::new(None),
            default: FieldDefault::None,
            default_ordering: Ordering::Asc,
            flags: FieldFlags::NONE,
            refers_to: None,
            getter: None,
            setter: None,
            query: None,
        }
    }

    /// Sets the behavior flags.
    #[must_use]
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Sets an explicit backend column code.
    #[must_use]
    pub fn with_code(self, code: impl Into<String>) -> Self {
        *self.code.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(code.into());
        self
    }

    /// Sets an explicit display label.
    #[must_use]
    pub fn with_label(self, label: impl Into<String>) -> Self {
        *self.label.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(label.into());
        self
    }

    /// Sets a fixed default value.
    #[must_use]
    pub fn with_default(mut self, value: impl ToValue) -> Self {
        self.default = FieldDefault::Static(value.to_value());
        self
    }

    /// Sets a computed default value.
    #[must_use]
    pub fn with_computed_default<F>(mut self, func: F) -> Self
    where
        F: Fn() -> Value + Send + Sync + 'static,
    {
        self.default = FieldDefault::Computed(Arc::new(func));
        self
    }

    /// Sets the default ordering direction.
    #[must_use]
    pub fn with_ordering(mut self, ordering: Ordering) -> Self {
        self.default_ordering = ordering;
        self
    }

    /// Declares a foreign-key pointer as a `"Model.field"` path.
    #[must_use]
    pub fn with_refers_to(mut self, path: impl Into<String>) -> Self {
        self.refers_to = Some(path.into());
        self
    }

    /// Attaches a getter strategy.
    #[must_use]
    pub fn with_getter<F>(mut self, func: F) -> Self
    where
        F: Fn(&ValueMap) -> Value + Send + Sync + 'static,
    {
        self.getter = Some(Arc::new(func));
        self
    }

    /// Attaches a setter strategy.
    #[must_use]
    pub fn with_setter<F>(mut self, func: F) -> Self
    where
        F: Fn(&mut ValueMap, Value) + Send + Sync + 'static,
    {
        self.setter = Some(Arc::new(func));
        self
    }

    /// Attaches a query-rewrite strategy.
    #[must_use]
    pub fn with_query<F>(mut self, func: F) -> Self
    where
        F: Fn(&Query) -> Filter + Send + Sync + 'static,
    {
        self.query = Some(Arc::new(func));
        self
    }

    /// Returns the field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the backend column code; falls back to the name.
    pub fn code(&self) -> String {
        self.code
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }

    /// Overrides the backend column code after construction.
    pub fn set_code(&self, code: impl Into<String>) {
        *self.code.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(code.into());
    }

    /// Returns the display label; falls back to a title-cased name.
    pub fn label(&self) -> String {
        self.label
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
            .unwrap_or_else(|| titleize(&self.name))
    }

    /// Overrides the display label after construction.
    pub fn set_label(&self, label: impl Into<String>) {
        *self.label.write().unwrap_or_else(std::sync::PoisonError::into_inner) = Some(label.into());
    }

    /// Resolves the field's default value.
    pub fn default_value(&self) -> Value {
        self.default.resolve()
    }

    /// Returns the default ordering direction.
    pub fn default_ordering(&self) -> Ordering {
        self.default_ordering
    }

    /// Returns the behavior flags.
    pub fn flags(&self) -> FieldFlags {
        self.flags
    }

    /// Tests whether the given flag is set.
    pub fn test_flag(&self, flag: FieldFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Returns the raw `"Model.field"` foreign-key path, if declared.
    pub fn refers_to(&self) -> Option<&str> {
        self.refers_to.as_deref()
    }

    /// Returns the model half of the foreign-key path.
    pub fn refers_to_model_name(&self) -> Option<&str> {
        self.refers_to
            .as_deref()
            .and_then(|path| path.split_once('.'))
            .map(|(model, _)| model)
    }

    /// Returns the field half of the foreign-key path.
    pub fn refers_to_field_name(&self) -> Option<&str> {
        self.refers_to
            .as_deref()
            .and_then(|path| path.split_once('.'))
            .map(|(_, field)| field)
    }

    /// Returns the getter strategy, if attached.
    pub fn getter(&self) -> Option<&GetterFn> {
        self.getter.as_ref()
    }

    /// Returns the setter strategy, if attached.
    pub fn setter(&self) -> Option<&SetterFn> {
        self.setter.as_ref()
    }

    /// Returns the query-rewrite strategy, if attached.
    pub fn query(&self) -> Option<&QueryFn> {
        self.query.as_ref()
    }
}

impl fmt::Debug for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("code", &self.code())
            .field("flags", &self.flags)
            .field("refers_to", &self.refers_to)
            .finish_non_exhaustive()
    }
}
