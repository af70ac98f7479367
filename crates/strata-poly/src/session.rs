use std::sync::Arc;

use miette::{SourceOffset, SourceSpan};
use strata_ir::{IrFunction, IrModule};
use strata_layout::TypeConverter;
use strata_types::{
    ArchetypeDecl, ConformanceLookup, NominalConformances, ProtocolConformance, ProtocolDecl, Symbol, Ty,
};

use crate::config::PolyConfig;
use crate::diagnostics::DiagnosticSink;
use crate::error::{PolyError, PolyResult};
use crate::thunk::ThunkCache;

/// Ids of opened archetypes start here so they never collide with archetypes of a generic
/// environment.
const OPENED_ARCHETYPE_BASE: u32 = 1 << 20;

/// Everything one code-generation session owns: the module being built and the caches and sinks
/// shared by every function emitted into it.
pub struct PolySession {
    pub config: PolyConfig,
    pub types: TypeConverter,
    pub module: IrModule,
    pub diagnostics: DiagnosticSink,
    pub(crate) thunks: ThunkCache,
    conformances: Box<dyn ConformanceLookup>,
    next_opened: u32,
    location: SourceSpan,
}

impl PolySession {
    pub fn new(config: PolyConfig, conformances: impl ConformanceLookup + 'static) -> Self {
        PolySession {
            config,
            types: TypeConverter::new(),
            module: IrModule::new(),
            diagnostics: DiagnosticSink::new(),
            thunks: ThunkCache::default(),
            conformances: Box::new(conformances),
            next_opened: 0,
            location: SourceSpan::new(SourceOffset::from(0), 0),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PolyConfig::default(), NominalConformances::new())
    }

    /// The source location diagnostics of subsequently emitted functions point at.
    pub fn set_location(&mut self, span: SourceSpan) {
        self.location = span;
    }

    pub fn location(&self) -> SourceSpan {
        self.location
    }

    pub fn lookup_conformance(&self, ty: &Ty, protocol: &Arc<ProtocolDecl>) -> Option<ProtocolConformance> {
        self.conformances.lookup_conformance(ty, protocol)
    }

    /// Binds a fresh archetype standing for the dynamic type inside an existential.
    ///
    /// Existential metatypes open to the metatype of the archetype.
    pub fn open_existential_type(&mut self, existential: &Ty) -> PolyResult<Ty> {
        match existential {
            Ty::ExistentialMetatype(instance) => Ok(Ty::metatype(self.open_existential_type(instance)?)),
            Ty::Existential(protocols) => Ok(Ty::Archetype(self.fresh_opened(protocols.clone(), false))),
            Ty::AnyObject => Ok(Ty::Archetype(self.fresh_opened(Vec::new(), true))),
            other => Err(PolyError::invariant(format!("cannot open non-existential `{}`", other))),
        }
    }

    fn fresh_opened(&mut self, protocols: Vec<Arc<ProtocolDecl>>, class_bound: bool) -> Arc<ArchetypeDecl> {
        let n = self.next_opened;
        self.next_opened += 1;
        let mut archetype = ArchetypeDecl::new(OPENED_ARCHETYPE_BASE + n, format!("@opened({})", n));
        archetype.protocols = protocols;
        archetype.class_bound = class_bound;
        Arc::new(archetype)
    }

    /// Adds a finished function to the module.
    pub fn install(&mut self, function: IrFunction) -> PolyResult<Symbol> {
        if self.config.dump_functions {
            log::trace!("{}", function);
        }
        let name = function.name.clone();
        self.module.add_function(function)?;
        Ok(name)
    }

    /// Number of distinct reabstraction thunks synthesized so far.
    pub fn thunk_count(&self) -> usize {
        self.thunks.len()
    }

    pub fn into_module(self) -> IrModule {
        self.module
    }
}
