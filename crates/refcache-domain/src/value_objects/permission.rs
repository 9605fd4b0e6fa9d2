//! Permission flags.
//!
//! A bit-packed, commutative set of {READ, WRITE, UPDATE, DELETE, EXECUTE}.
//! EXECUTE is independent of READ: holding EXECUTE alone permits server-side
//! use of a value but never its disclosure to a caller.

use std::fmt;
use std::ops::{BitAnd, BitOr};

use serde::{Deserialize, Serialize};

/// A commutative bitset of permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct PermissionSet(u8);

impl PermissionSet {
    /// Permission to read/disclose a value.
    pub const READ: Self = Self(1 << 0);
    /// Permission to create a new entry.
    pub const WRITE: Self = Self(1 << 1);
    /// Permission to replace an existing entry's value.
    pub const UPDATE: Self = Self(1 << 2);
    /// Permission to remove an entry.
    pub const DELETE: Self = Self(1 << 3);
    /// Permission to use a value in server-side computation without disclosing it.
    pub const EXECUTE: Self = Self(1 << 4);
    /// No permissions at all.
    pub const NONE: Self = Self(0);
    /// `READ | WRITE | UPDATE | DELETE`.
    pub const CRUD: Self = Self(Self::READ.0 | Self::WRITE.0 | Self::UPDATE.0 | Self::DELETE.0);
    /// `CRUD | EXECUTE`.
    pub const FULL: Self = Self(Self::CRUD.0 | Self::EXECUTE.0);

    /// The empty permission set.
    #[must_use]
    pub const fn empty() -> Self {
        Self::NONE
    }

    /// Union of two permission sets.
    #[must_use]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Intersection of two permission sets.
    #[must_use]
    pub const fn intersect(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// True iff `self` holds every permission in `required`.
    #[must_use]
    pub const fn contains(self, required: Self) -> bool {
        self.0 & required.0 == required.0
    }

    /// True iff this set holds no permissions.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for PermissionSet {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitAnd for PermissionSet {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        self.intersect(rhs)
    }
}

impl fmt::Display for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return write!(f, "NONE");
        }
        let flags: &[(&str, PermissionSet)] = &[
            ("READ", Self::READ),
            ("WRITE", Self::WRITE),
            ("UPDATE", Self::UPDATE),
            ("DELETE", Self::DELETE),
            ("EXECUTE", Self::EXECUTE),
        ];
        let names: Vec<&str> = flags
            .iter()
            .filter(|(_, bit)| self.contains(*bit))
            .map(|(name, _)| *name)
            .collect();
        write!(f, "{}", names.join("|"))
    }
}
