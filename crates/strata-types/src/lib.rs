//! # Formal Types (`strata-types`)
//!
//! Source-level types as seen by the reabstraction core, together with the declarations they refer to
//! and the [`AbstractionPattern`] descriptor that records which positions of an original signature were
//! type variables.
//!
//! Formal types are *not* physical representations. Lowering a formal type under a pattern is the job of
//! `strata-layout`; this crate only describes shape, substitution and conformance.

pub mod conformance;
pub mod decl;
pub mod generics;
pub mod pattern;
pub mod ty;

use std::fmt;

pub use conformance::{ConformanceLookup, NominalConformances};
pub use decl::{
    ArchetypeDecl, ClassDecl, MethodAttrs, MethodDecl, MethodKind, ProtocolConformance, ProtocolDecl,
    ProtocolRequirement, StructDecl,
};
pub use generics::{GenericEnvironment, SubstitutionMap};
pub use pattern::AbstractionPattern;
pub use ty::{FunctionRepr, FunctionTy, GenericParam, OptionalKind, PrimTy, Ty};

/// An interned-by-value name used for declarations, functions and modules.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(name: impl Into<String>) -> Self {
        Symbol(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Symbol(name.to_string())
    }
}

impl From<String> for Symbol {
    fn from(name: String) -> Self {
        Symbol(name)
    }
}
