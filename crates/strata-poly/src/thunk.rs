//! Reabstraction thunks.
//!
//! When a function value must change representation in a way no cast can express, a thin thunk
//! is synthesized that takes the expected parameters plus the original function, translates the
//! arguments, calls through and translates the result back. The thunk is then partially applied
//! to the function value, producing a thick function of the expected type.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_ir::{InstKind, ValueId};
use strata_layout::{AbiDifference, FnRep, IrType, ParamConvention, ParamInfo, RepTy, ResultConvention, TypeLowering};
use strata_types::{AbstractionPattern, FunctionRepr, FunctionTy, GenericEnvironment, Symbol, Ty};

use crate::emitter::FunctionEmitter;
use crate::error::{PolyError, PolyResult};
use crate::managed::ManagedValue;
use crate::transform::{translate_primitive, TranslationKind};
use crate::translate::translate_arguments;

/// Identifies a thunk by the conversion it performs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThunkKey {
    pub source: Arc<FnRep>,
    pub expected: Arc<FnRep>,
    pub generic_env: Option<GenericEnvironment>,
}

/// Thunks already synthesized in a session.
#[derive(Debug, Default)]
pub struct ThunkCache {
    entries: FxHashMap<ThunkKey, Symbol>,
    next_id: usize,
}

impl ThunkCache {
    pub fn get(&self, key: &ThunkKey) -> Option<&Symbol> {
        self.entries.get(key)
    }

    pub fn insert(&mut self, key: ThunkKey, symbol: Symbol) {
        self.entries.insert(key, symbol);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn fresh_name(&mut self, prefix: &str) -> Symbol {
        let id = self.next_id;
        self.next_id += 1;
        Symbol::from(format!("{}{}", prefix, id))
    }
}

fn function_rep(ty: &IrType) -> PolyResult<Arc<FnRep>> {
    ty.function()
        .cloned()
        .ok_or_else(|| PolyError::invariant(format!("expected a function value, found {}", ty)))
}

/// Converts a function value to the `expected` lowering, with a cast when the two signatures are
/// ABI compatible and with a thunk otherwise.
pub(crate) fn emit_transformed_function_value(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    value: ManagedValue,
    pattern: &AbstractionPattern,
    input: &FunctionTy,
    output: &FunctionTy,
    expected: &TypeLowering,
) -> PolyResult<ManagedValue> {
    let source = function_rep(&em.value_type(value.value()))?;
    let target = function_rep(&expected.lowered)?;
    if source == target {
        return Ok(value);
    }

    if em.session.types.function_abi_difference(&source, &target) == AbiDifference::NeedsThunk {
        return create_thunk(em, kind, value, pattern, input, output, &source, &target);
    }

    let mut current = value;
    if source.repr != target.repr {
        if source.is_thick() {
            return Err(PolyError::invariant(format!("cannot drop the context of {}", source)));
        }
        let thick = source.with_representation(target.repr, target.callee);
        let raw = current.forward(em)?;
        let thick_ty = IrType::object(RepTy::Function(Arc::new(thick)));
        let converted = em.b.emit(thick_ty, InstKind::ThinToThick { value: raw });
        current = em.manage_rvalue(converted)?;
    }
    if em.value_type(current.value()) != expected.lowered {
        let cast = em.b.emit(expected.lowered.clone(), InstKind::ConvertFunction { value: current.value() });
        current = current.with_value(cast);
    }
    Ok(current)
}

/// The thin signature of a thunk: the expected parameters followed by the function it wraps.
pub(crate) fn build_thunk_type(source: &Arc<FnRep>, expected: &FnRep) -> Arc<FnRep> {
    let callee_convention =
        if source.is_thick() { ParamConvention::DirectOwned } else { ParamConvention::DirectUnowned };
    let mut params = expected.params.clone();
    params.push(ParamInfo::new(RepTy::Function(source.clone()), callee_convention));
    Arc::new(FnRep {
        repr: FunctionRepr::Thin,
        callee: ParamConvention::DirectUnowned,
        params,
        result: expected.result.clone(),
        indirect_result: expected.indirect_result.clone(),
    })
}

#[allow(clippy::too_many_arguments)]
fn create_thunk(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    value: ManagedValue,
    pattern: &AbstractionPattern,
    input: &FunctionTy,
    output: &FunctionTy,
    source: &Arc<FnRep>,
    expected: &Arc<FnRep>,
) -> PolyResult<ManagedValue> {
    if !expected.is_thick() {
        return Err(PolyError::invariant(format!("cannot capture a function into thin {}", expected)));
    }
    let thunk_ty = build_thunk_type(source, expected);
    let generic_env = em.b.generic_env().cloned();
    let key = ThunkKey { source: source.clone(), expected: expected.clone(), generic_env: generic_env.clone() };

    let symbol = match em.session.thunks.get(&key) {
        Some(symbol) => {
            log::debug!("reusing thunk `{}` for {} -> {}", symbol, source, expected);
            symbol.clone()
        }
        None => {
            let prefix = em.session.config.thunk_prefix.clone();
            let symbol = em.session.thunks.fresh_name(&prefix);
            log::debug!("synthesizing thunk `{}`: {} -> {}", symbol, source, expected);
            let mut thunk = FunctionEmitter::new(&mut *em.session, symbol.clone(), thunk_ty.clone(), generic_env);
            build_thunk_body(&mut thunk, kind, pattern, input, output)?;
            thunk.install()?;
            em.session.thunks.insert(key, symbol.clone());
            symbol
        }
    };

    let thunk_ref = em.b.emit(IrType::object(RepTy::Function(thunk_ty)), InstKind::FunctionRef { symbol });
    let raw = value.forward(em)?;
    let closure = em.b.emit(
        IrType::object(RepTy::Function(expected.clone())),
        InstKind::PartialApply { callee: thunk_ref, args: vec![raw] },
    );
    em.manage_rvalue(closure)
}

fn build_thunk_body(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    pattern: &AbstractionPattern,
    input: &FunctionTy,
    output: &FunctionTy,
) -> PolyResult<()> {
    let input_pattern = pattern
        .function_input()
        .ok_or_else(|| PolyError::invariant(format!("pattern `{}` is not a function", pattern)))?;
    let result_pattern = pattern
        .function_result()
        .ok_or_else(|| PolyError::invariant(format!("pattern `{}` is not a function", pattern)))?;

    em.push_scope();
    let outer_addr = em.indirect_result_param();
    let mut params = em.collect_params(false)?;
    let callee = params.pop().ok_or_else(|| PolyError::invariant("thunk without a function parameter"))?;
    let callee_ty = function_rep(&em.value_type(callee.value()))?;

    // Arguments arrive in the thunk's representation and leave in the callee's.
    let args = translate_arguments(
        em,
        kind.inverse(),
        params,
        &callee_ty.params,
        &input_pattern,
        &output.input,
        &input.input,
    )?;
    let inner_addr = thunk_inner_result_addr(em, &callee_ty, outer_addr);
    let mut raw_args: Vec<ValueId> = inner_addr.into_iter().collect();
    raw_args.extend(forward_function_arguments(em, &callee_ty, args)?);

    let callee = callee.forward(em)?;
    let inner_value = em.b.emit(callee_ty.direct_result_type(), InstKind::Apply { callee, args: raw_args });
    let result = thunk_result(
        em,
        kind,
        &callee_ty,
        &result_pattern,
        &input.result,
        &output.result,
        inner_value,
        inner_addr,
        outer_addr,
    )?;
    em.pop_scope()?;
    em.b.ret(result);
    Ok(())
}

/// Where the callee writes its indirect result: the thunk's own result buffer when the types
/// agree, a fresh temporary otherwise.
pub(crate) fn thunk_inner_result_addr(
    em: &mut FunctionEmitter<'_>,
    callee: &FnRep,
    outer_addr: Option<ValueId>,
) -> Option<ValueId> {
    let inner = callee.indirect_result.as_ref()?;
    if let Some(outer) = outer_addr {
        if em.value_type(outer).rep == *inner {
            return Some(outer);
        }
    }
    Some(em.alloc_stack(&IrType::address(inner.clone())))
}

/// Hands arguments over to a callee, giving up ownership of those it consumes.
pub(crate) fn forward_function_arguments(
    em: &mut FunctionEmitter<'_>,
    callee: &FnRep,
    args: Vec<ManagedValue>,
) -> PolyResult<Vec<ValueId>> {
    if args.len() != callee.params.len() {
        return Err(PolyError::invariant(format!(
            "{} arguments for a callee taking {} parameters",
            args.len(),
            callee.params.len()
        )));
    }
    args.into_iter()
        .zip(&callee.params)
        .map(|(arg, param)| if param.convention.is_consumed() { arg.forward(em) } else { Ok(arg.value()) })
        .collect()
}

/// Takes ownership of what the callee produced, converts it and stores or returns it in the
/// representation the enclosing function returns.
///
/// Returns the value the enclosing function should `return`.
#[allow(clippy::too_many_arguments)]
pub(crate) fn thunk_result(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    callee: &FnRep,
    pattern: &AbstractionPattern,
    input: &Ty,
    output: &Ty,
    inner_value: ValueId,
    inner_addr: Option<ValueId>,
    outer_addr: Option<ValueId>,
) -> PolyResult<ValueId> {
    if inner_addr.is_none() {
        match callee.result.convention {
            ResultConvention::Owned => {}
            ResultConvention::Autoreleased => em.b.push(InstKind::RetainAutoreleased { value: inner_value }),
            ResultConvention::UnownedInnerPointer => {
                em.diagnose_not_implemented("reabstraction of returns_inner_pointer function");
                em.retain_if_needed(inner_value)?;
            }
            ResultConvention::Unowned => em.retain_if_needed(inner_value)?,
        }
    }

    let managed = match inner_addr {
        Some(addr) => em.manage_buffer(addr)?,
        None => em.manage_rvalue(inner_value)?,
    };

    match outer_addr {
        Some(outer) => {
            if inner_addr == Some(outer) {
                managed.forward_cleanup(em)?;
            } else {
                let converted = translate_primitive(em, kind, pattern, input, output, managed)?;
                converted.forward_into(em, outer)?;
            }
            Ok(if inner_addr.is_some() { inner_value } else { em.b.unit() })
        }
        None => {
            let converted = translate_primitive(em, kind, pattern, input, output, managed)?;
            converted.forward(em)
        }
    }
}
