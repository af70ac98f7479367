//! The value transformer.
//!
//! A value whose physical representation follows `(pattern, input)` is converted into the
//! representation `(pattern, output)` needs. The two directions differ only in which side is the
//! original (abstracted) one; the shared dispatch lives in the default methods of [`Transform`]
//! and the direction specific pieces in its two implementations.

use strata_ir::InstKind;
use strata_layout::{AbiDifference, IrType, RepTy, TypeLowering};
use strata_types::{AbstractionPattern, FunctionTy, OptionalKind, PrimTy, Ty};

use crate::emitter::FunctionEmitter;
use crate::error::{PolyError, PolyResult};
use crate::existential::emit_transform_existential;
use crate::managed::ManagedValue;
use crate::thunk::emit_transformed_function_value;

/// Which side of a conversion carries the original, abstracted representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TranslationKind {
    /// From the pattern's representation to the substituted one.
    OrigToSubst,
    /// From the substituted representation to the pattern's one.
    SubstToOrig,
}

impl TranslationKind {
    pub fn inverse(self) -> Self {
        match self {
            TranslationKind::OrigToSubst => TranslationKind::SubstToOrig,
            TranslationKind::SubstToOrig => TranslationKind::OrigToSubst,
        }
    }

    pub fn is_output_substituted(self) -> bool {
        self == TranslationKind::OrigToSubst
    }
}

/// Unwrapping a nil implicitly unwrapped optional traps with this message.
pub(crate) const FORCE_UNWRAP_MESSAGE: &str = "unexpectedly found nil while unwrapping an Optional value";

pub(crate) trait Transform {
    fn kind(&self) -> TranslationKind;

    /// The lowering of `output` the converted value must have.
    fn expected_lowering(
        &self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        output: &Ty,
    ) -> PolyResult<TypeLowering>;

    fn transform_function(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input: &FunctionTy,
        output: &FunctionTy,
        expected: &TypeLowering,
    ) -> PolyResult<ManagedValue> {
        emit_transformed_function_value(em, self.kind(), value, pattern, input, output, expected)
    }

    fn transform_metatype(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input_instance: &Ty,
        output_instance: &Ty,
    ) -> PolyResult<ManagedValue>;

    fn transform(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input: &Ty,
        output: &Ty,
    ) -> PolyResult<ManagedValue> {
        let mut input = input.rvalue();
        let output = output.rvalue();
        let expected = self.expected_lowering(em, pattern, output)?;
        if em.value_type(value.value()) == expected.lowered {
            return Ok(value);
        }
        log::debug!("{:?}: `{}` to `{}` under `{}`", self.kind(), input, output, pattern);

        let mut value = value;
        let mut input_optional = input.optional_object();
        let output_optional = output.optional_object();

        if output_optional.is_some() && input_optional.is_none() {
            return emit_inject_optional(em, value, input, output, &expected);
        }

        if let (Some((OptionalKind::ImplicitlyUnwrapped, object)), None) = (input_optional, output_optional) {
            value = emit_checked_unwrap(em, value)?;
            if em.value_type(value.value()) == expected.lowered {
                return Ok(value);
            }
            input = object;
            input_optional = None;
        }

        if let (Some((input_kind, input_object)), Some((output_kind, output_object))) =
            (input_optional, output_optional)
        {
            if input_kind != output_kind || input_object != output_object {
                let from = em.value_type(value.value());
                if em.session.types.abi_difference(&from.rep, &expected.lowered.rep) == AbiDifference::Trivial {
                    let kind = if from.is_address {
                        InstKind::UncheckedAddrCast { addr: value.value() }
                    } else {
                        InstKind::UncheckedBitCast { value: value.value() }
                    };
                    let cast = em.b.emit(expected.lowered.clone(), kind);
                    return Ok(value.with_value(cast));
                }
                return emit_optional_to_optional(em, value, &expected, |em, payload| {
                    self.transform(em, payload, &AbstractionPattern::Opaque, input_object, output_object)
                });
            }
        }

        match output {
            Ty::Function(output_fn) => {
                let input_fn = input.as_function().ok_or_else(|| unhandled(input, output))?;
                return self.transform_function(em, value, pattern, input_fn, output_fn, &expected);
            }
            Ty::Tuple(output_elements) => {
                let input_elements = input.tuple_elements().ok_or_else(|| unhandled(input, output))?;
                return self.transform_tuple(em, value, pattern, input_elements, output_elements, output);
            }
            Ty::Metatype(output_instance) => {
                if let Ty::Metatype(input_instance) = input {
                    return self.transform_metatype(em, value, pattern, input_instance, output_instance);
                }
                return Err(unhandled(input, output));
            }
            _ => {}
        }

        if let (Some(to), Some(from)) = (output.class_decl(), input.class_decl()) {
            let kind = if from.is_foreign != to.is_foreign {
                InstKind::UncheckedRefCast { value: value.value() }
            } else {
                InstKind::Upcast { value: value.value() }
            };
            let cast = em.b.emit(expected.lowered.clone(), kind);
            return Ok(value.with_value(cast));
        }

        if output.class_decl().is_some() {
            if let Ty::Archetype(archetype) = input {
                if archetype.superclass.is_some() {
                    let cast = em.b.emit(expected.lowered.clone(), InstKind::Upcast { value: value.value() });
                    return Ok(value.with_value(cast));
                }
            }
        }

        if output.is_protocol_class() && matches!(input, Ty::Metatype(_)) {
            let object = em
                .b
                .emit(expected.lowered.clone(), InstKind::ProtocolMetatypeToObject { value: value.value() });
            return Ok(ManagedValue::unmanaged(object));
        }

        if output.is_any_object() {
            let kind = match input {
                Ty::Metatype(_) => Some(InstKind::ClassMetatypeToObject { value: value.value() }),
                Ty::ExistentialMetatype(_) => Some(InstKind::ExistentialMetatypeToObject { value: value.value() }),
                _ => None,
            };
            if let Some(kind) = kind {
                let object = em.b.emit(expected.lowered.clone(), kind);
                return Ok(ManagedValue::unmanaged(object));
            }
        }

        if output.is_any_existential() {
            let payload = SubstToOrig.transform(em, value, &AbstractionPattern::Opaque, input, input)?;
            return emit_transform_existential(em, payload, input, output);
        }

        Err(unhandled(input, output))
    }

    /// Converts a tuple element by element.
    fn transform_tuple(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
        output_ty: &Ty,
    ) -> PolyResult<ManagedValue> {
        let output_lowering = self.expected_lowering(em, pattern, output_ty)?;
        if em.value_type(value.value()) == output_lowering.lowered {
            return Ok(value);
        }
        if !pattern.matches_tuple(output_ty) || input.len() != output.len() {
            return Err(PolyError::invariant(format!(
                "tuple `{}` does not match pattern `{}`",
                output_ty, pattern
            )));
        }

        let dest = if output_lowering.address_only {
            Some(em.emit_temporary(&output_lowering.lowered)?)
        } else {
            None
        };

        let elements = em.explode_tuple(value)?;
        let mut collected = Vec::with_capacity(elements.len());
        let mut element_cleanups = Vec::new();
        for (index, (element, element_lowering)) in elements.into_iter().enumerate() {
            let element = if em.value_type(element.value()).is_address && !element_lowering.address_only {
                em.load_take(element)?
            } else {
                element
            };
            let element_pattern = pattern
                .tuple_element(index)
                .ok_or_else(|| PolyError::invariant(format!("pattern `{}` has no element {}", pattern, index)))?;

            match &dest {
                Some(dest) => {
                    let slot_ty = output_lowering
                        .lowered
                        .tuple_element(index)
                        .ok_or_else(|| PolyError::invariant("destination tuple is too short"))?;
                    let slot = em.b.emit(slot_ty, InstKind::TupleElementAddr { addr: dest.addr, index });
                    let init = em.uninitialized_at(slot)?;
                    let converted = self.transform(em, element, &element_pattern, &input[index], &output[index])?;
                    converted.forward_into(em, slot)?;
                    init.finish_initialization(em)?;
                    element_cleanups.extend(init.cleanup);
                }
                None => {
                    collected.push(self.transform(em, element, &element_pattern, &input[index], &output[index])?);
                }
            }
        }

        match dest {
            Some(dest) => {
                em.cleanups.commit_batch(&element_cleanups, dest.cleanup)?;
                Ok(dest.managed_address())
            }
            None => {
                let elements = collected.into_iter().map(|e| e.forward(em)).collect::<PolyResult<Vec<_>>>()?;
                let tuple = em.b.emit(output_lowering.lowered, InstKind::Tuple { elements });
                em.manage_rvalue(tuple)
            }
        }
    }
}

fn unhandled(input: &Ty, output: &Ty) -> PolyError {
    PolyError::UnhandledTransform { from: input.to_string(), to: output.to_string() }
}

pub(crate) struct OrigToSubst;

pub(crate) struct SubstToOrig;

impl Transform for OrigToSubst {
    fn kind(&self) -> TranslationKind {
        TranslationKind::OrigToSubst
    }

    fn expected_lowering(
        &self,
        em: &mut FunctionEmitter<'_>,
        _pattern: &AbstractionPattern,
        output: &Ty,
    ) -> PolyResult<TypeLowering> {
        em.lower_subst(output)
    }

    fn transform_metatype(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input_instance: &Ty,
        output_instance: &Ty,
    ) -> PolyResult<ManagedValue> {
        let output = Ty::metatype(output_instance.clone());
        let mut meta = value;
        if input_instance != output_instance {
            let upcast_ty = em.lower(pattern, &output)?.lowered;
            let upcast = em.b.emit(upcast_ty, InstKind::Upcast { value: meta.value() });
            meta = ManagedValue::unmanaged(upcast);
        }
        let target = em.lower_subst(&output)?.lowered;
        emit_reabstract_metatype(em, meta, &target)
    }
}

impl Transform for SubstToOrig {
    fn kind(&self) -> TranslationKind {
        TranslationKind::SubstToOrig
    }

    fn expected_lowering(
        &self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        output: &Ty,
    ) -> PolyResult<TypeLowering> {
        em.lower(pattern, output)
    }

    fn transform_metatype(
        &self,
        em: &mut FunctionEmitter<'_>,
        value: ManagedValue,
        pattern: &AbstractionPattern,
        input_instance: &Ty,
        output_instance: &Ty,
    ) -> PolyResult<ManagedValue> {
        let target = em.lower(pattern, &Ty::metatype(input_instance.clone()))?.lowered;
        let meta = emit_reabstract_metatype(em, value, &target)?;
        if input_instance == output_instance {
            return Ok(meta);
        }
        let upcast_ty = em.lower_subst(&Ty::metatype(output_instance.clone()))?.lowered;
        let upcast = em.b.emit(upcast_ty, InstKind::Upcast { value: meta.value() });
        Ok(ManagedValue::unmanaged(upcast))
    }
}

/// Switches a metatype between its thin and thick representations.
fn emit_reabstract_metatype(
    em: &mut FunctionEmitter<'_>,
    meta: ManagedValue,
    expected: &IrType,
) -> PolyResult<ManagedValue> {
    let current = em.value_type(meta.value());
    match (current.rep.metatype_repr(), &expected.rep) {
        (Some(from), RepTy::Metatype { instance, repr }) if from != *repr => {
            let converted = em.b.emit(expected.clone(), InstKind::Metatype { ty: instance.clone() });
            Ok(ManagedValue::unmanaged(converted))
        }
        (Some(_), RepTy::Metatype { .. }) => Ok(meta),
        _ => Err(PolyError::invariant(format!("cannot reabstract {} as metatype {}", current, expected))),
    }
}

/// Wraps a value into a present optional, reabstracting it to the payload representation first.
fn emit_inject_optional(
    em: &mut FunctionEmitter<'_>,
    value: ManagedValue,
    input: &Ty,
    output: &Ty,
    expected: &TypeLowering,
) -> PolyResult<ManagedValue> {
    let (_, object) = output
        .optional_object()
        .ok_or_else(|| PolyError::invariant(format!("`{}` is not optional", output)))?;
    let payload = SubstToOrig.transform(em, value, &AbstractionPattern::Opaque, input, object)?;

    if expected.address_only {
        let buffer = em.emit_temporary(&expected.lowered)?;
        let payload_ty = expected
            .lowered
            .as_address()
            .optional_payload()
            .ok_or_else(|| PolyError::invariant("optional lowering without payload"))?;
        let payload_addr = em.b.emit(payload_ty, InstKind::InitEnumDataAddr { addr: buffer.addr });
        payload.forward_into(em, payload_addr)?;
        em.b.push(InstKind::InjectEnumAddr { addr: buffer.addr, some: true });
        buffer.finish_initialization(em)?;
        return Ok(buffer.managed_address());
    }

    let raw = payload.forward(em)?;
    let wrapped = em.b.emit(expected.lowered.clone(), InstKind::EnumSome { value: raw });
    em.manage_rvalue(wrapped)
}

/// Extracts the payload of an optional, trapping at runtime when it is empty.
pub(crate) fn emit_checked_unwrap(em: &mut FunctionEmitter<'_>, value: ManagedValue) -> PolyResult<ManagedValue> {
    let ty = em.value_type(value.value());
    let payload_ty = ty
        .optional_payload()
        .ok_or_else(|| PolyError::invariant(format!("cannot unwrap non-optional {}", ty)))?;
    let bool_ty = IrType::object(RepTy::Prim(PrimTy::Bool));
    let message = FORCE_UNWRAP_MESSAGE.to_string();

    if ty.is_address {
        let is_none = em.b.emit(bool_ty, InstKind::IsNoneAddr { addr: value.value() });
        em.b.push(InstKind::CondFail { cond: is_none, message });
        let addr = value.forward(em)?;
        let payload = em.b.emit(payload_ty, InstKind::UncheckedTakeEnumDataAddr { addr });
        em.manage_buffer(payload)
    } else {
        let is_none = em.b.emit(bool_ty, InstKind::IsNone { value: value.value() });
        em.b.push(InstKind::CondFail { cond: is_none, message });
        let raw = value.forward(em)?;
        let payload = em.b.emit(payload_ty, InstKind::UncheckedEnumData { value: raw });
        em.manage_rvalue(payload)
    }
}

/// Maps `transform_payload` over an optional, keeping an empty optional empty.
///
/// The source may be a value or a buffer; the result is a buffer exactly when the expected
/// lowering is address-only.
pub(crate) fn emit_optional_to_optional<'s>(
    em: &mut FunctionEmitter<'s>,
    value: ManagedValue,
    expected: &TypeLowering,
    transform_payload: impl FnOnce(&mut FunctionEmitter<'s>, ManagedValue) -> PolyResult<ManagedValue>,
) -> PolyResult<ManagedValue> {
    let source_ty = em.value_type(value.value());
    let payload_ty = source_ty
        .optional_payload()
        .ok_or_else(|| PolyError::invariant(format!("cannot map non-optional {}", source_ty)))?;
    let source = value.forward(em)?;
    let dest = if expected.address_only { Some(em.emit_temporary(&expected.lowered)?) } else { None };

    let bool_ty = IrType::object(RepTy::Prim(PrimTy::Bool));
    let is_none = if source_ty.is_address {
        em.b.emit(bool_ty, InstKind::IsNoneAddr { addr: source })
    } else {
        em.b.emit(bool_ty, InstKind::IsNone { value: source })
    };

    em.b.begin_region();
    if source_ty.is_address {
        em.b.push(InstKind::DestroyAddr { addr: source });
    }
    let none_result = match &dest {
        Some(dest) => {
            em.b.push(InstKind::InjectEnumAddr { addr: dest.addr, some: false });
            None
        }
        None => Some(em.b.emit(expected.lowered.clone(), InstKind::EnumNone)),
    };
    let then_region = em.b.end_region(none_result)?;

    em.b.begin_region();
    em.push_scope();
    let payload = if source_ty.is_address {
        let addr = em.b.emit(payload_ty, InstKind::UncheckedTakeEnumDataAddr { addr: source });
        em.manage_buffer(addr)?
    } else {
        let raw = em.b.emit(payload_ty, InstKind::UncheckedEnumData { value: source });
        em.manage_rvalue(raw)?
    };
    let converted = transform_payload(em, payload)?;
    let some_result = match &dest {
        Some(dest) => {
            let slot_ty = expected
                .lowered
                .as_address()
                .optional_payload()
                .ok_or_else(|| PolyError::invariant("optional lowering without payload"))?;
            let slot = em.b.emit(slot_ty, InstKind::InitEnumDataAddr { addr: dest.addr });
            converted.forward_into(em, slot)?;
            em.b.push(InstKind::InjectEnumAddr { addr: dest.addr, some: true });
            None
        }
        None => {
            let raw = converted.forward(em)?;
            Some(em.b.emit(expected.lowered.clone(), InstKind::EnumSome { value: raw }))
        }
    };
    em.pop_scope()?;
    let else_region = em.b.end_region(some_result)?;

    match dest {
        Some(dest) => {
            em.b.push(InstKind::If { cond: is_none, then_region, else_region });
            dest.finish_initialization(em)?;
            Ok(dest.managed_address())
        }
        None => {
            let result =
                em.b.emit(expected.lowered.clone(), InstKind::If { cond: is_none, then_region, else_region });
            em.manage_rvalue(result)
        }
    }
}

/// Converts one scalar in the given direction, loading it first when a loadable value sits in
/// memory.
pub(crate) fn translate_primitive(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    pattern: &AbstractionPattern,
    input: &Ty,
    output: &Ty,
    value: ManagedValue,
) -> PolyResult<ManagedValue> {
    let ty = em.value_type(value.value());
    let value = if ty.is_address && !em.lowering_of(&ty)?.address_only {
        em.load_take(value)?
    } else {
        value
    };
    match kind {
        TranslationKind::OrigToSubst => OrigToSubst.transform(em, value, pattern, input, output),
        TranslationKind::SubstToOrig => SubstToOrig.transform(em, value, pattern, input, output),
    }
}
