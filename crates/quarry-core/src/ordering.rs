//! Sort direction for orderings.

use serde::{Deserialize, Serialize};

/// Direction applied to a single column in an ORDER BY clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ordering {
    /// Ascending order (ASC).
    Asc,
    /// Descending order (DESC).
    Desc,
}

impl Ordering {
    /// Returns the opposite direction.
    pub fn reversed(self) -> Self {
        match self {
            Self::Asc => Self::Desc,
            Self::Desc => Self::Asc,
        }
    }
}

impl Default for Ordering {
    fn default() -> Self {
        Self::Asc
    }
}
