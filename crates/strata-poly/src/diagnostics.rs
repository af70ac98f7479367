use miette::{Diagnostic, SourceSpan};
use thiserror::Error;

/// Problems reported while emission continues in a degraded mode.
#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum PolyDiagnostic {
    #[error("not implemented: {feature}")]
    #[diagnostic(code(strata_poly::not_implemented), severity(Warning))]
    NotImplemented {
        feature: String,
        #[label("required here")]
        span: SourceSpan,
    },
}

/// Collects the diagnostics of one session.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    reports: Vec<PolyDiagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&mut self, diagnostic: PolyDiagnostic) {
        log::warn!("{}", diagnostic);
        self.reports.push(diagnostic);
    }

    pub fn reports(&self) -> &[PolyDiagnostic] {
        &self.reports
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Removes and returns everything reported so far.
    pub fn take(&mut self) -> Vec<PolyDiagnostic> {
        std::mem::take(&mut self.reports)
    }
}
