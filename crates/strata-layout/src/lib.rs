//! # Type Lowering (`strata-layout`)
//!
//! Computes the physical representation of formal types. A formal type is lowered *under* an
//! [`AbstractionPattern`](strata_types::AbstractionPattern): the same `(Int, Int) -> Bool` lowers to a
//! function taking two direct `Int`s when used concretely, and to one taking two `@in Int` buffers when
//! used where `(T, T) -> U` was declared.
//!
//! * [`RepTy`] / [`IrType`]: lowered types, as object values or addresses.
//! * [`FnRep`]: lowered function signatures with parameter and result conventions.
//! * [`TypeConverter`]: the lowering query, with its caches.

mod convention;
mod lowering;
mod rep;

pub use convention::{FnRep, ParamConvention, ParamInfo, ResultConvention, ResultInfo};
pub use lowering::{AbiDifference, FnLoweringAttrs, TypeConverter, TypeLowering, ValueKind};
pub use rep::{IrType, MetatypeRepr, RepTy};

use miette::Diagnostic;
use strata_types::Symbol;
use thiserror::Error;

/// Errors raised while lowering a formal type.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Formal types must be substituted before they are lowered.
    #[error("cannot lower unbound generic parameter `{0}`")]
    #[diagnostic(code(strata_layout::unbound_generic_param))]
    UnboundGenericParam(Symbol),

    #[error("abstraction pattern `{pattern}` does not match type `{ty}`")]
    #[diagnostic(code(strata_layout::pattern_mismatch))]
    PatternMismatch { pattern: String, ty: String },

    #[error("abstraction pattern `{0}` is not a function pattern")]
    #[diagnostic(code(strata_layout::not_a_function))]
    NotAFunction(String),
}
