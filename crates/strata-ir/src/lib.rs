//! # Mid-level IR (`strata-ir`)
//!
//! A small SSA instruction set over lowered types, close in spirit to the ownership-explicit IR the
//! reabstraction core emits into.
//!
//! ## Key Components
//!
//! *   [`IrModule`]: every function emitted in a session, plus the class vtables and the dynamic
//!     replacement table consulted by `class_method` / `dynamic_method`.
//! *   [`IrFunction`]: a lowered signature, its parameters and a structured body. Control flow is
//!     limited to nested [`Region`]s under [`InstKind::If`].
//! *   [`FunctionBuilder`]: incremental construction with a region stack.
//! *   [`Interpreter`]: a reference interpreter with a reference-counted heap and stack slots. It
//!     rejects double releases, uses after free, reads of uninitialized memory, overwrites of
//!     initialized memory and deallocation of initialized stack slots, so emitted code can be
//!     checked for ownership balance by running it.
//!
//! Values are untyped at runtime; every [`ValueId`] has a static [`IrType`](strata_layout::IrType)
//! recorded by the builder and shown by the printer.

mod builder;
mod interp;
mod ir;
mod print;

pub use builder::FunctionBuilder;
pub use interp::{Address, InterpError, Interpreter, ObjId, PathElem, Value};
pub use ir::{BuiltinOp, Inst, InstKind, IrFunction, IrModule, Literal, Region, ValueId};

use miette::Diagnostic;
use strata_types::Symbol;
use thiserror::Error;

/// Errors raised while building or assembling IR.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum IrError {
    #[error("region stack is unbalanced in `{function}`")]
    #[diagnostic(code(strata_ir::unbalanced_region))]
    UnbalancedRegion { function: Symbol },

    #[error("function `{0}` is already defined")]
    #[diagnostic(code(strata_ir::duplicate_function))]
    DuplicateFunction(Symbol),

    #[error("function `{0}` has no terminating return")]
    #[diagnostic(code(strata_ir::missing_return))]
    MissingReturn(Symbol),
}
