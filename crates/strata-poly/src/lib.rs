//! # Reabstraction (`strata-poly`)
//!
//! Converts values between the physical representations that different abstraction patterns
//! impose on the same formal type, and synthesizes the thunks that make those conversions possible
//! for function values.
//!
//! ## Key Components
//!
//! *   **Value transformer** ([`emit_orig_to_subst_value`], [`emit_subst_to_orig_value`]):
//!     optionals, tuples, functions, metatypes, class upcasts and existential erasure.
//! *   **Argument translator** ([`translate_arguments`]): reconciles exploded and aggregate views
//!     of tuple parameters while converting each leaf.
//! *   **Thunk synthesizer**: builds and caches reabstraction thunks per session.
//! *   **Witness and override thunks** ([`emit_protocol_witness`], [`emit_override_thunk`]).
//!
//! Everything is emitted through a [`FunctionEmitter`] borrowing a [`PolySession`], which owns
//! the IR module, the type converter, the thunk cache and the diagnostics.

mod cleanup;
mod config;
mod diagnostics;
mod emitter;
mod error;
mod existential;
mod managed;
mod session;
mod thunk;
mod transform;
mod translate;
mod witness;

pub use cleanup::{CleanupAction, CleanupHandle, CleanupStack, CleanupState};
pub use config::PolyConfig;
pub use diagnostics::{DiagnosticSink, PolyDiagnostic};
pub use emitter::FunctionEmitter;
pub use error::{PolyError, PolyResult};
pub use managed::{ManagedValue, TemporaryInit};
pub use session::PolySession;
pub use thunk::{ThunkCache, ThunkKey};
pub use transform::TranslationKind;
pub use translate::translate_arguments;
pub use witness::{emit_override_thunk, emit_protocol_witness, witness_dispatch, WitnessDispatch};

use strata_types::{AbstractionPattern, Ty};
use transform::{OrigToSubst, SubstToOrig, Transform};

/// Converts `value`, represented as `input` under `pattern`, to the fully substituted
/// representation of `output`.
pub fn emit_orig_to_subst_value(
    em: &mut FunctionEmitter<'_>,
    value: ManagedValue,
    pattern: &AbstractionPattern,
    input: &Ty,
    output: &Ty,
) -> PolyResult<ManagedValue> {
    OrigToSubst.transform(em, value, pattern, input, output)
}

/// Converts `value`, substituted representation of `input`, to the representation `output` has
/// under `pattern`.
pub fn emit_subst_to_orig_value(
    em: &mut FunctionEmitter<'_>,
    value: ManagedValue,
    pattern: &AbstractionPattern,
    input: &Ty,
    output: &Ty,
) -> PolyResult<ManagedValue> {
    SubstToOrig.transform(em, value, pattern, input, output)
}
