//! The VM verifier's abstract-type lattice, consumed as ground truth by the
//! symbolic interpreter (§4.1) and reproduced here only so the core can
//! compute LUBs for merge nodes (§4.2) without depending on a concrete
//! verifier implementation.
//!
//! `Top` is the lattice top (incompatible / unknown after a join of two
//! unrelated references); `Uninitialized` is a distinct bottom-adjacent
//! state for `new`-but-not-yet-`<init>`-ed references. Reference identity
//! is tracked only down to a class name — no exact heap-object identity.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VerificationType {
    IntLike,
    Long,
    Float,
    Double,
    Reference(String),
    Null,
    Uninitialized,
    Top,
}

impl VerificationType {
    /// Category-2 values (long, double) occupy one symbolic stack slot but
    /// two verifier slots (§8 boundary behaviors).
    pub fn category(&self) -> u8 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }

    pub fn is_reference_like(&self) -> bool {
        matches!(
            self,
            VerificationType::Reference(_)
                | VerificationType::Null
                | VerificationType::Uninitialized
        )
    }

    /// Least-upper-bound on the verification lattice. `Null` joins with any
    /// reference to that reference type; two distinct reference types join
    /// to `Top` since this core keeps no class hierarchy.
    pub fn lub(&self, other: &VerificationType) -> VerificationType {
        use VerificationType::*;
        if self == other {
            return self.clone();
        }
        match (self, other) {
            (Null, Reference(c)) | (Reference(c), Null) => Reference(c.clone()),
            (Null, Null) => Null,
            _ if self.is_reference_like() && other.is_reference_like() => Top,
            _ => Top,
        }
    }
}

impl std::fmt::Display for VerificationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerificationType::IntLike => write!(f, "int"),
            VerificationType::Long => write!(f, "long"),
            VerificationType::Float => write!(f, "float"),
            VerificationType::Double => write!(f, "double"),
            VerificationType::Reference(c) => write!(f, "ref({c})"),
            VerificationType::Null => write!(f, "null"),
            VerificationType::Uninitialized => write!(f, "uninitialized"),
            VerificationType::Top => write!(f, "top"),
        }
    }
}
