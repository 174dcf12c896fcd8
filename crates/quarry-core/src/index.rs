//! Index declarations.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

/// Bitset of index behavior flags.
#[derive(Clone, Copy, PartialEq, Eq, Default)]
pub struct IndexFlags(u32);

impl IndexFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// The index defines the record's composite identity.
    pub const KEY: Self = Self(1);
    /// The indexed tuple must be unique.
    pub const UNIQUE: Self = Self(1 << 1);
    /// The index is computed, not declared in the backend.
    pub const VIRTUAL: Self = Self(1 << 2);

    const NAMES: [(&'static str, Self); 3] = [
        ("Key", Self::KEY),
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

    /// Builds a flag set from symbolic names; `None` when a name is unknown.
    pub fn from_names<'a, I>(names: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = Self::NONE;
        for name in names {
            let flag = Self::NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, flag)| *flag)?;
            out |= flag;
        }
        Some(out)
    }

    /// Returns true when all flags in `other` are set.
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for IndexFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for IndexFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for IndexFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Debug for IndexFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(_, flag)| self.contains(*flag))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "IndexFlags({})", names.join("|"))
    }
}

/// A named, ordered lookup over one or more fields.
///
/// When no single field carries the `Key` flag, the first index flagged
/// `Key` defines the record's composite identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Index {
    name: String,
    fields: Vec<String>,
    flags: IndexFlags,
}

impl Index {
    /// Creates an index over the given field names.
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            flags: IndexFlags::NONE,
        }
    }

    /// Sets the behavior flags.
    #[must_use]
    pub fn with_flags(mut self, flags: IndexFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Returns the index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the indexed field names, in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Returns the behavior flags.
    pub fn flags(&self) -> IndexFlags {
        self.flags
    }

    /// Tests whether the given flag is set.
    pub fn test_flag(&self, flag: IndexFlags) -> bool {
        self.flags.contains(flag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_fields_keep_order() {
        let index = Index::new("by_group_and_user", ["group_id", "user_id"])
            .with_flags(IndexFlags::KEY);
        assert_eq!(index.fields(), ["group_id", "user_id"]);
        assert!(index.test_flag(IndexFlags::KEY));
        assert!(!index.test_flag(IndexFlags::UNIQUE));
    }

    #[test]
    fn test_index_flags_from_names() {
        let flags = IndexFlags::from_names(["Key", "Unique"]).unwrap();
        assert!(flags.contains(IndexFlags::KEY | IndexFlags::UNIQUE));
        assert!(IndexFlags::from_names(["Nope"]).is_none());
    }
}
