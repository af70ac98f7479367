use miette::{Diagnostic, SourceSpan};
use strata_ir::IrError;
use strata_layout::LayoutError;
use thiserror::Error;

/// Errors that abort emission of the function being built.
///
/// Nothing is installed into the module when emission fails: thunks are only added once their body
/// has been completed.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum PolyError {
    #[error("internal invariant violated: {message}")]
    #[diagnostic(code(strata_poly::invariant_violation))]
    InvariantViolation { message: String },

    #[error("no conversion from `{from}` to `{to}`")]
    #[diagnostic(code(strata_poly::unhandled_transform))]
    UnhandledTransform { from: String, to: String },

    #[error("cannot reabstract inout parameter of type `{ty}`")]
    #[diagnostic(
        code(strata_poly::inout_reabstraction),
        help("inout arguments must already have the representation the callee expects")
    )]
    InoutReabstraction {
        ty: String,
        #[label("this argument needs write-back")]
        span: SourceSpan,
    },

    #[error("`{ty}` does not conform to `{protocol}`")]
    #[diagnostic(code(strata_poly::missing_conformance))]
    MissingConformance { ty: String, protocol: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Ir(#[from] IrError),

    #[error("invalid configuration: {0}")]
    #[diagnostic(code(strata_poly::config))]
    Config(String),
}

impl PolyError {
    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        PolyError::InvariantViolation { message: message.into() }
    }
}

impl From<toml::de::Error> for PolyError {
    fn from(err: toml::de::Error) -> Self {
        PolyError::Config(err.to_string())
    }
}

pub type PolyResult<T> = Result<T, PolyError>;
