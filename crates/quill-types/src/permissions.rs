use std::fmt;
use std::ops::{BitAnd, BitAndAssign, BitOr, BitOrAssign, Not};

use serde::{Deserialize, Serialize};

/// A set of capability bits. Stored in the roles table as a plain integer,
/// combined with bitwise ops. Bits outside the named set carry no meaning
/// and are masked off when decoding from storage.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(i64);

impl Permission {
    pub const NONE: Permission = Permission(0);

    /// Follow other users.
    pub const FOLLOW: Permission = Permission(1);
    /// Comment on posts.
    pub const COMMENT: Permission = Permission(1 << 1);
    /// Write posts.
    pub const WRITE: Permission = Permission(1 << 2);
    /// Moderate comments by other users.
    pub const MODERATE: Permission = Permission(1 << 3);
    /// Full administrative access.
    pub const ADMIN: Permission = Permission(1 << 4);

    /// Every defined capability bit.
    pub const ALL: Permission = Permission(0b1_1111);

    /// Raw integer value, for storage.
    pub const fn bits(self) -> i64 {
        self.0
    }

    /// Rebuild from a stored integer, dropping any undefined bits.
    pub const fn from_bits(bits: i64) -> Permission {
        Permission(bits & Self::ALL.0)
    }

    /// True if every bit in `other` is present in `self`.
    pub const fn contains(self, other: Permission) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Permission {
    type Output = Permission;

    fn bitor(self, rhs: Permission) -> Permission {
        Permission(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permission {
    fn bitor_assign(&mut self, rhs: Permission) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Permission {
    type Output = Permission;

    fn bitand(self, rhs: Permission) -> Permission {
        Permission(self.0 & rhs.0)
    }
}

impl BitAndAssign for Permission {
    fn bitand_assign(&mut self, rhs: Permission) {
        self.0 &= rhs.0;
    }
}

impl Not for Permission {
    type Output = Permission;

    /// Complement within the defined bits only, so the set stays closed.
    fn not(self) -> Permission {
        Permission(!self.0 & Self::ALL.0)
    }
}

impl fmt::Debug for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(Permission, &str); 5] = [
            (Permission::FOLLOW, "FOLLOW"),
            (Permission::COMMENT, "COMMENT"),
            (Permission::WRITE, "WRITE"),
            (Permission::MODERATE, "MODERATE"),
            (Permission::ADMIN, "ADMIN"),
        ];

        if self.is_empty() {
            return write!(f, "Permission(NONE)");
        }

        write!(f, "Permission(")?;
        let mut first = true;
        for (bit, name) in NAMES {
            if self.contains(bit) {
                if !first {
                    write!(f, " | ")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_are_disjoint_powers_of_two() {
        let bits = [
            Permission::FOLLOW,
            Permission::COMMENT,
            Permission::WRITE,
            Permission::MODERATE,
            Permission::ADMIN,
        ];
        for (i, a) in bits.iter().enumerate() {
            assert_eq!(a.bits().count_ones(), 1);
            for b in &bits[i + 1..] {
                assert!((*a & *b).is_empty());
            }
        }
        assert_eq!(Permission::FOLLOW.bits(), 1);
        assert_eq!(Permission::COMMENT.bits(), 2);
        assert_eq!(Permission::WRITE.bits(), 4);
        assert_eq!(Permission::MODERATE.bits(), 8);
        assert_eq!(Permission::ADMIN.bits(), 16);
    }

    #[test]
    fn contains_checks_all_requested_bits() {
        let combined = Permission::FOLLOW | Permission::WRITE;
        assert!(combined.contains(Permission::FOLLOW));
        assert!(combined.contains(Permission::WRITE));
        assert!(!combined.contains(Permission::COMMENT));
        assert!(!combined.contains(Permission::FOLLOW | Permission::COMMENT));
        // The empty set is a subset of anything.
        assert!(combined.contains(Permission::NONE));
    }

    #[test]
    fn from_bits_masks_undefined_bits() {
        assert_eq!(Permission::from_bits(0b11_1111), Permission::ALL);
        assert_eq!(Permission::from_bits(1 << 40), Permission::NONE);
        assert_eq!(Permission::from_bits(7), Permission::FOLLOW | Permission::COMMENT | Permission::WRITE);
    }

    #[test]
    fn not_stays_within_defined_bits() {
        let p = !Permission::ADMIN;
        assert_eq!(p.bits(), 0b0_1111);
        assert_eq!(!Permission::NONE, Permission::ALL);
        assert_eq!(!Permission::ALL, Permission::NONE);
    }
}
