//! Protocol witness and vtable override thunks.
//!
//! Both bridge a caller that sees a method through an abstracted signature (a protocol requirement
//! or a base class method) to the concrete implementation.

use std::sync::Arc;

use strata_ir::{InstKind, ValueId};
use strata_layout::{FnLoweringAttrs, FnRep, IrType, ParamConvention, RepTy, ResultConvention};
use strata_types::{
    AbstractionPattern, FunctionRepr, FunctionTy, MethodDecl, MethodKind, ProtocolConformance, ProtocolRequirement,
    SubstitutionMap, Symbol, Ty,
};

use crate::emitter::FunctionEmitter;
use crate::error::{PolyError, PolyResult};
use crate::managed::ManagedValue;
use crate::session::PolySession;
use crate::thunk::{forward_function_arguments, thunk_inner_result_addr, thunk_result};
use crate::transform::TranslationKind;
use crate::translate::translate_arguments;

/// How a witness thunk reaches the implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WitnessDispatch {
    /// A direct reference to the implementation's symbol.
    Static,
    /// Through the dynamic replacement table.
    Dynamic,
    /// Through the receiver's vtable.
    Virtual,
}

/// Picks the dispatch of a witness thunk.
pub fn witness_dispatch(conformance: &ProtocolConformance, witness: &MethodDecl, is_free: bool) -> WitnessDispatch {
    if is_free {
        return WitnessDispatch::Static;
    }
    let Some(class) = conformance.ty.class_decl() else {
        return WitnessDispatch::Static;
    };
    let attrs = &witness.attrs;
    if attrs.is_dynamic {
        return WitnessDispatch::Dynamic;
    }
    if class.is_final
        || attrs.is_final
        || attrs.forced_static_dispatch
        || attrs.in_extension
        || attrs.foreign_to_native_thunk
        || (attrs.has_foreign_decl && witness.kind == MethodKind::Allocator)
    {
        return WitnessDispatch::Static;
    }
    WitnessDispatch::Virtual
}

fn thin(ty: &Arc<FnRep>) -> Arc<FnRep> {
    Arc::new(ty.with_representation(FunctionRepr::Thin, ParamConvention::DirectUnowned))
}

fn function_patterns(ty: &FunctionTy) -> PolyResult<(AbstractionPattern, AbstractionPattern, AbstractionPattern)> {
    let pattern = AbstractionPattern::new(&Ty::Function(Box::new(ty.clone())));
    let input = pattern
        .function_input()
        .ok_or_else(|| PolyError::invariant(format!("`{}` has no input pattern", pattern)))?;
    let result = pattern
        .function_result()
        .ok_or_else(|| PolyError::invariant(format!("`{}` has no result pattern", pattern)))?;
    Ok((pattern, input, result))
}

fn last_element(ty: &Ty) -> Option<&Ty> {
    match ty {
        Ty::Tuple(elements) => elements.last(),
        other => Some(other),
    }
}

/// Emits the thunk that satisfies `requirement` for `conformance` by calling `witness`.
///
/// `substitutions` binds the witness's own generic parameters, if it has any. A free-function
/// witness takes no receiver; the requirement's receiver is dropped.
pub fn emit_protocol_witness(
    session: &mut PolySession,
    conformance: &ProtocolConformance,
    requirement: &ProtocolRequirement,
    witness: &MethodDecl,
    substitutions: &SubstitutionMap,
    is_free: bool,
) -> PolyResult<Symbol> {
    let (reqt_pattern, mut reqt_input_pattern, reqt_result_pattern) = function_patterns(&requirement.formal_type)?;
    let reqt_subst = requirement.formal_type.subst(&conformance.self_substitution());
    let thunk_ty =
        thin(&session.types.lower_function_type(&reqt_pattern, &reqt_subst, FnLoweringAttrs::default())?);

    let symbol = Symbol::from(format!(
        "{}{}_{}_{}",
        session.config.witness_prefix, conformance.ty, conformance.protocol.name, requirement.name
    ));
    let dispatch = witness_dispatch(conformance, witness, is_free);
    log::info!(
        "emitting witness `{}` for {}.{} via `{}` ({:?})",
        symbol,
        conformance.protocol.name,
        requirement.name,
        witness.symbol,
        dispatch
    );

    let attrs = FnLoweringAttrs::from(&witness.attrs);
    let witness_subst = witness.formal_type.subst(substitutions);
    let witness_subst_ty = thin(&session.types.lower_subst_function(&witness_subst, attrs)?);
    let (witness_pattern, witness_input_pattern, witness_result_pattern) = function_patterns(&witness.formal_type)?;
    let witness_ty = thin(&session.types.lower_function_type(&witness_pattern, &witness_subst, attrs)?);

    let mut em = FunctionEmitter::new(session, symbol, thunk_ty, None);
    em.push_scope();
    let outer_addr = em.indirect_result_param();
    let mut params = em.collect_params(false)?;

    let mut reqt_input = reqt_subst.input.clone();
    if is_free {
        params.pop();
        // A lone receiver leaves an empty argument list behind.
        if reqt_input.is_tuple() {
            reqt_input = reqt_input.drop_last_tuple_element();
            reqt_input_pattern = reqt_input_pattern.drop_last_tuple_element();
        } else {
            reqt_input = Ty::unit();
            reqt_input_pattern = AbstractionPattern::Tuple(Vec::new());
        }
    } else {
        let reqt_self_inout = matches!(last_element(&reqt_subst.input), Some(Ty::InOut(_)));
        let witness_self_inout = matches!(last_element(&witness_subst.input), Some(Ty::InOut(_)));
        if reqt_self_inout && !witness_self_inout {
            let receiver = params.pop().ok_or_else(|| PolyError::invariant("witness thunk without a receiver"))?;
            let copied = emit_copy_receiver(&mut em, receiver)?;
            params.push(copied);
        }
    }

    let mut args = translate_arguments(
        &mut em,
        TranslationKind::OrigToSubst,
        params,
        &witness_subst_ty.params,
        &reqt_input_pattern,
        &reqt_input,
        &witness_subst.input,
    )?;

    let is_generic = witness_ty != witness_subst_ty;
    if is_generic {
        args = translate_arguments(
            &mut em,
            TranslationKind::SubstToOrig,
            args,
            &witness_ty.params,
            &witness_input_pattern,
            &witness_subst.input,
            &witness_subst.input,
        )?;
    }

    let concrete_addr = thunk_inner_result_addr(&mut em, &witness_subst_ty, outer_addr);
    let call_addr =
        if is_generic { thunk_inner_result_addr(&mut em, &witness_ty, concrete_addr) } else { concrete_addr };
    let mut raw_args: Vec<ValueId> = call_addr.into_iter().collect();
    raw_args.extend(forward_function_arguments(&mut em, &witness_ty, args)?);

    let callee = match dispatch {
        WitnessDispatch::Static => em.b.emit(
            IrType::object(RepTy::Function(witness_ty.clone())),
            InstKind::FunctionRef { symbol: witness.symbol.clone() },
        ),
        WitnessDispatch::Dynamic => em.b.emit(
            IrType::object(RepTy::Function(witness_ty.clone())),
            InstKind::DynamicMethod { method: witness.symbol.clone() },
        ),
        WitnessDispatch::Virtual => {
            let receiver = *raw_args.last().ok_or_else(|| PolyError::invariant("virtual witness without a receiver"))?;
            em.b.emit(
                IrType::object(RepTy::Function(witness_ty.clone())),
                InstKind::ClassMethod { receiver, method: witness.name.clone() },
            )
        }
    };
    let mut result = em.b.emit(witness_ty.direct_result_type(), InstKind::Apply { callee, args: raw_args });

    let mut concrete_ty = witness_subst_ty.clone();
    if is_generic {
        result = thunk_result(
            &mut em,
            TranslationKind::OrigToSubst,
            &witness_ty,
            &witness_result_pattern,
            &witness_subst.result,
            &witness_subst.result,
            result,
            call_addr,
            concrete_addr,
        )?;
        // The first conversion already produced an owned value.
        let mut owned = (*witness_subst_ty).clone();
        owned.result.convention = ResultConvention::Owned;
        concrete_ty = Arc::new(owned);
    }
    let result = thunk_result(
        &mut em,
        TranslationKind::SubstToOrig,
        &concrete_ty,
        &reqt_result_pattern,
        &witness_subst.result,
        &reqt_subst.result,
        result,
        concrete_addr,
        outer_addr,
    )?;
    em.pop_scope()?;
    em.b.ret(result);
    em.install()
}

/// Copies an inout receiver so a by-value witness can consume it.
fn emit_copy_receiver(em: &mut FunctionEmitter<'_>, receiver: ManagedValue) -> PolyResult<ManagedValue> {
    let ty = em.value_type(receiver.value());
    if em.lowering_of(&ty)?.is_loadable() {
        return em.load_copy(receiver.value());
    }
    let copy = em.emit_temporary(&ty)?;
    em.b.push(InstKind::CopyAddr { src: receiver.value(), dest: copy.addr, take: false });
    copy.finish_initialization(em)?;
    Ok(copy.managed_address())
}

/// Emits the thunk a vtable slot of a base method uses to call the overriding `derived` method.
///
/// `pattern` is the base method's original type; `input` is the base signature as seen from the
/// derived class, `output` the derived method's own signature.
pub fn emit_override_thunk(
    session: &mut PolySession,
    derived: &MethodDecl,
    pattern: &AbstractionPattern,
    input: &FunctionTy,
    output: &FunctionTy,
) -> PolyResult<Symbol> {
    let attrs = FnLoweringAttrs::from(&derived.attrs);
    let impl_ty = thin(&session.types.lower_subst_function(&derived.formal_type, attrs)?);
    let thunk_attrs = FnLoweringAttrs { guaranteed_self: attrs.guaranteed_self, ..FnLoweringAttrs::default() };
    let thunk_ty = thin(&session.types.lower_function_type(pattern, input, thunk_attrs)?);
    let input_pattern = pattern
        .function_input()
        .ok_or_else(|| PolyError::invariant(format!("pattern `{}` is not a function", pattern)))?;
    let result_pattern = pattern
        .function_result()
        .ok_or_else(|| PolyError::invariant(format!("pattern `{}` is not a function", pattern)))?;

    let symbol = Symbol::from(format!("{}{}", session.config.override_prefix, derived.symbol));
    log::info!("emitting override thunk `{}`: {} -> {}", symbol, thunk_ty, impl_ty);

    let mut em = FunctionEmitter::new(session, symbol, thunk_ty, None);
    em.push_scope();
    let outer_addr = em.indirect_result_param();
    let params = em.collect_params(true)?;
    let args = translate_arguments(
        &mut em,
        TranslationKind::OrigToSubst,
        params,
        &impl_ty.params,
        &input_pattern,
        &input.input,
        &output.input,
    )?;

    let inner_addr = thunk_inner_result_addr(&mut em, &impl_ty, outer_addr);
    let mut raw_args: Vec<ValueId> = inner_addr.into_iter().collect();
    raw_args.extend(forward_function_arguments(&mut em, &impl_ty, args)?);
    let callee = em.b.emit(
        IrType::object(RepTy::Function(impl_ty.clone())),
        InstKind::FunctionRef { symbol: derived.symbol.clone() },
    );
    let inner_value = em.b.emit(impl_ty.direct_result_type(), InstKind::Apply { callee, args: raw_args });
    let result = thunk_result(
        &mut em,
        TranslationKind::SubstToOrig,
        &impl_ty,
        &result_pattern,
        &output.result,
        &input.result,
        inner_value,
        inner_addr,
        outer_addr,
    )?;
    em.pop_scope()?;
    em.b.ret(result);
    em.install()
}
