// Shared helpers for reabstraction integration tests
#![allow(dead_code)]

use std::sync::Arc;

use miette::{SourceOffset, SourceSpan};
use strata_ir::{IrFunction, ValueId};
use strata_layout::{FnRep, ParamConvention, ParamInfo, RepTy, ResultConvention, ResultInfo};
use strata_poly::{FunctionEmitter, ManagedValue, PolyConfig, PolyResult, PolySession};
use strata_types::{FunctionRepr, GenericEnvironment, NominalConformances, PrimTy, Symbol};

pub fn dummy_span() -> SourceSpan {
    SourceSpan::new(SourceOffset::from(0), 0)
}

pub fn session() -> PolySession {
    session_with(NominalConformances::new())
}

pub fn session_with(conformances: NominalConformances) -> PolySession {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = PolySession::new(PolyConfig::default(), conformances);
    session.set_location(dummy_span());
    session
}

pub fn int() -> RepTy {
    RepTy::Prim(PrimTy::Int)
}

pub fn string() -> RepTy {
    RepTy::Prim(PrimTy::String)
}

pub fn bool() -> RepTy {
    RepTy::Prim(PrimTy::Bool)
}

pub fn param(ty: RepTy, convention: ParamConvention) -> ParamInfo {
    ParamInfo::new(ty, convention)
}

/// A thin signature returning `result` owned, or through a buffer when `indirect` is set.
pub fn thin_fn(params: Vec<ParamInfo>, result: RepTy, indirect: bool) -> Arc<FnRep> {
    let (result, indirect_result) = if indirect {
        (ResultInfo { ty: RepTy::unit(), convention: ResultConvention::Unowned }, Some(result))
    } else {
        (ResultInfo { ty: result, convention: ResultConvention::Owned }, None)
    };
    Arc::new(FnRep {
        repr: FunctionRepr::Thin,
        callee: ParamConvention::DirectUnowned,
        params,
        result,
        indirect_result,
    })
}

pub fn thin(ty: &FnRep) -> Arc<FnRep> {
    Arc::new(ty.with_representation(FunctionRepr::Thin, ParamConvention::DirectUnowned))
}

/// Emits a function whose body is produced by `body`, given the indirect result buffer (if any)
/// and the owned parameters. The returned value must already be forwarded.
pub fn define(
    session: &mut PolySession,
    name: &str,
    ty: Arc<FnRep>,
    body: impl FnOnce(&mut FunctionEmitter<'_>, Option<ValueId>, Vec<ManagedValue>) -> PolyResult<ValueId>,
) -> PolyResult<Symbol> {
    define_in(session, name, ty, None, body)
}

pub fn define_in(
    session: &mut PolySession,
    name: &str,
    ty: Arc<FnRep>,
    generic_env: Option<GenericEnvironment>,
    body: impl FnOnce(&mut FunctionEmitter<'_>, Option<ValueId>, Vec<ManagedValue>) -> PolyResult<ValueId>,
) -> PolyResult<Symbol> {
    let mut em = FunctionEmitter::new(session, name, ty, generic_env);
    em.push_scope();
    let out = em.indirect_result_param();
    let params = em.collect_params(false)?;
    let result = body(&mut em, out, params)?;
    em.pop_scope()?;
    em.b.ret(result);
    em.install()
}

pub fn function<'s>(session: &'s PolySession, name: &str) -> &'s IrFunction {
    session.module.function(&Symbol::from(name)).expect("function should be installed")
}
