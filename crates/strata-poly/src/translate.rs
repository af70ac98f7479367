//! Argument translation.
//!
//! Walks the formal input types of two signatures in parallel, along an abstraction pattern,
//! claiming lowered input values and destination parameter slots as the walk reaches scalar
//! leaves. One side may see a tuple as one aggregate value while the other sees its elements
//! exploded into separate parameters; the four tuple cases below reconcile the two views.

use std::collections::VecDeque;

use strata_ir::InstKind;
use strata_layout::{IrType, ParamConvention, ParamInfo, RepTy};
use strata_types::{AbstractionPattern, Ty};

use crate::emitter::FunctionEmitter;
use crate::error::{PolyError, PolyResult};
use crate::managed::{ManagedValue, TemporaryInit};
use crate::transform::{translate_primitive, SubstToOrig, Transform, TranslationKind};

/// A queue consumed front to back.
#[derive(Debug)]
pub(crate) struct ArgQueue<T> {
    items: VecDeque<T>,
    what: &'static str,
}

impl<T> ArgQueue<T> {
    pub(crate) fn new(items: impl IntoIterator<Item = T>, what: &'static str) -> Self {
        ArgQueue { items: items.into_iter().collect(), what }
    }

    pub(crate) fn claim_next(&mut self) -> PolyResult<T> {
        self.items
            .pop_front()
            .ok_or_else(|| PolyError::invariant(format!("ran out of {} while translating arguments", self.what)))
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

pub(crate) struct ArgumentTranslator {
    kind: TranslationKind,
    inputs: ArgQueue<ManagedValue>,
    output_types: ArgQueue<ParamInfo>,
    outputs: Vec<ManagedValue>,
}

impl ArgumentTranslator {
    pub(crate) fn new(kind: TranslationKind, inputs: Vec<ManagedValue>, output_types: &[ParamInfo]) -> Self {
        ArgumentTranslator {
            kind,
            inputs: ArgQueue::new(inputs, "input values"),
            output_types: ArgQueue::new(output_types.iter().cloned(), "output parameters"),
            outputs: Vec::new(),
        }
    }

    /// Every input must have been consumed and every destination filled.
    pub(crate) fn finish(self) -> PolyResult<Vec<ManagedValue>> {
        if self.inputs.len() != 0 || self.output_types.len() != 0 {
            return Err(PolyError::invariant(format!(
                "argument translation left {} inputs and {} parameters unclaimed",
                self.inputs.len(),
                self.output_types.len()
            )));
        }
        Ok(self.outputs)
    }

    pub(crate) fn translate(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &Ty,
        output: &Ty,
    ) -> PolyResult<()> {
        if pattern.is_tuple() {
            let input_elements = tuple_elements(input)?;
            if let Some((_, object)) = output.optional_object() {
                let output_elements = tuple_elements(object)?;
                return self.translate_and_implode_into_optional(em, pattern, input_elements, output_elements, object);
            }
            let output_elements = tuple_elements(output)?;
            return self.translate_parallel_exploded(em, pattern, input_elements, output_elements);
        }

        if let Ty::Tuple(output_elements) = output {
            if let Ty::Tuple(input_elements) = input {
                if !pattern.is_opaque() {
                    return match (input_elements.as_slice(), output_elements.as_slice()) {
                        ([input], [output]) => self.translate(em, pattern, input, output),
                        _ => Err(PolyError::invariant(format!(
                            "pattern `{}` cannot decompose `{}`",
                            pattern, output
                        ))),
                    };
                }
                if !output.is_materializable() {
                    return self.translate_parallel_exploded(em, pattern, input_elements, output_elements);
                }
                return self.translate_exploded_indirect(em, pattern, input_elements, output_elements);
            }
            return match output_elements.as_slice() {
                [single] => self.translate(em, pattern, input, single),
                _ => Err(PolyError::invariant(format!("cannot translate `{}` into `{}`", input, output))),
            };
        }

        let value = self.inputs.claim_next()?;
        let param = self.output_types.claim_next()?;
        self.translate_single(em, pattern, input, output, value, &param)
    }

    fn translate_parallel_exploded(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
    ) -> PolyResult<()> {
        if input.len() != output.len() || pattern.tuple_arity().map_or(false, |n| n != output.len()) {
            return Err(PolyError::invariant(format!(
                "tuple arity mismatch under pattern `{}`: {} inputs, {} outputs",
                pattern,
                input.len(),
                output.len()
            )));
        }
        for (index, (input, output)) in input.iter().zip(output).enumerate() {
            self.translate(em, &element_pattern(pattern, index)?, input, output)?;
        }
        Ok(())
    }

    /// One side holds the tuple as a single aggregate, the other as separate elements.
    fn translate_exploded_indirect(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
    ) -> PolyResult<()> {
        if self.kind.is_output_substituted() {
            let aggregate = self.inputs.claim_next()?;
            return self.explode_out_of(em, pattern, input, output, aggregate);
        }
        let param = self.output_types.claim_next()?;
        let temporary = em.emit_temporary(&param.ir_type())?;
        self.implode_into(em, pattern, input, output, temporary)?;
        self.outputs.push(temporary.managed_address());
        Ok(())
    }

    fn explode_out_of(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
        aggregate: ManagedValue,
    ) -> PolyResult<()> {
        let elements = em.explode_tuple(aggregate)?;
        if elements.len() != output.len() || input.len() != output.len() {
            return Err(PolyError::invariant("exploded tuple has the wrong arity"));
        }
        for (index, (element, _)) in elements.into_iter().enumerate() {
            let element_pattern = element_pattern(pattern, index)?;
            match (&input[index], &output[index]) {
                (Ty::Tuple(input_elements), Ty::Tuple(output_elements)) => {
                    self.explode_out_of(em, &element_pattern, input_elements, output_elements, element)?;
                }
                (input_ty, output_ty) => {
                    let param = self.output_types.claim_next()?;
                    self.translate_single(em, &element_pattern, input_ty, output_ty, element, &param)?;
                }
            }
        }
        Ok(())
    }

    fn implode_into(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
        temporary: TemporaryInit,
    ) -> PolyResult<()> {
        let tuple_ty = em.value_type(temporary.addr);
        let mut element_cleanups = Vec::with_capacity(output.len());
        for (index, output_ty) in output.iter().enumerate() {
            let input_ty = input.get(index).ok_or_else(|| PolyError::invariant("input tuple is too short"))?;
            let slot_ty = tuple_ty
                .tuple_element(index)
                .ok_or_else(|| PolyError::invariant(format!("{} has no element {}", tuple_ty, index)))?;
            let slot = em.b.emit(slot_ty, InstKind::TupleElementAddr { addr: temporary.addr, index });
            let slot = em.uninitialized_at(slot)?;
            let element_pattern = element_pattern(pattern, index)?;
            match (input_ty, output_ty) {
                (Ty::Tuple(input_elements), Ty::Tuple(output_elements)) => {
                    self.implode_into(em, &element_pattern, input_elements, output_elements, slot)?;
                }
                _ => {
                    let value = self.inputs.claim_next()?;
                    self.translate_single_into(em, &element_pattern, input_ty, output_ty, value, slot)?;
                }
            }
            element_cleanups.extend(slot.cleanup);
        }
        em.cleanups.commit_batch(&element_cleanups, temporary.cleanup)
    }

    /// Gathers exploded leaves into one present optional of a tuple.
    fn translate_and_implode_into_optional(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &[Ty],
        output: &[Ty],
        output_tuple: &Ty,
    ) -> PolyResult<()> {
        if self.kind != TranslationKind::OrigToSubst {
            return Err(PolyError::invariant("only substituted optionals can be imploded into"));
        }
        if !pattern.matches_tuple(output_tuple) {
            return Err(PolyError::invariant(format!(
                "pattern `{}` does not match `{}`",
                pattern, output_tuple
            )));
        }
        let lowering = em.lower(&AbstractionPattern::Opaque, output_tuple)?;
        let lowered_elements = lowering
            .rep()
            .tuple_elements()
            .map(<[RepTy]>::to_vec)
            .ok_or_else(|| PolyError::invariant("tuple lowered to a non-tuple"))?;
        let param = self.output_types.claim_next()?;
        let optional_ty = param.ir_type();

        if lowering.is_loadable() {
            let payload = self.implode_into_value(em, &lowered_elements, input, output)?;
            let raw = payload.forward(em)?;
            let optional = em.b.emit(optional_ty.as_object(), InstKind::EnumSome { value: raw });
            let optional = em.manage_rvalue(optional)?;
            self.outputs.push(optional);
            return Ok(());
        }

        let buffer = em.emit_temporary(&optional_ty)?;
        let payload_ty = IrType::address(lowering.rep().clone());
        let payload_addr = em.b.emit(payload_ty, InstKind::InitEnumDataAddr { addr: buffer.addr });
        let payload = em.uninitialized_at(payload_addr)?;
        self.implode_into_buffer(em, &lowered_elements, input, output, payload)?;
        em.b.push(InstKind::InjectEnumAddr { addr: buffer.addr, some: true });
        em.cleanups.commit_batch(&payload.cleanup.into_iter().collect::<Vec<_>>(), buffer.cleanup)?;
        self.outputs.push(buffer.managed_address());
        Ok(())
    }

    /// Claims the next leaf and brings it to the opaque representation `lowered`.
    fn claim_opaque_leaf(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        lowered: &RepTy,
        input: &Ty,
        output: &Ty,
    ) -> PolyResult<ManagedValue> {
        let mut value = self.inputs.claim_next()?;
        let ty = em.value_type(value.value());
        if ty.is_address && em.lowering_of(&ty)?.is_loadable() {
            value = em.load_take(value)?;
        }
        if em.value_type(value.value()).rep != *lowered {
            value = SubstToOrig.transform(em, value, &AbstractionPattern::Opaque, input, output)?;
        }
        Ok(value)
    }

    fn implode_into_value(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        lowered: &[RepTy],
        input: &[Ty],
        output: &[Ty],
    ) -> PolyResult<ManagedValue> {
        let mut elements = Vec::with_capacity(output.len());
        for (index, output_ty) in output.iter().enumerate() {
            let input_ty = input.get(index).ok_or_else(|| PolyError::invariant("input tuple is too short"))?;
            let lowered_ty = lowered.get(index).ok_or_else(|| PolyError::invariant("lowered tuple is too short"))?;
            let element = match (input_ty, output_ty, lowered_ty) {
                (Ty::Tuple(input_elements), Ty::Tuple(output_elements), RepTy::Tuple(lowered_elements)) => {
                    self.implode_into_value(em, lowered_elements, input_elements, output_elements)?
                }
                _ => self.claim_opaque_leaf(em, lowered_ty, input_ty, output_ty)?,
            };
            elements.push(element);
        }
        let elements = elements.into_iter().map(|e| e.forward(em)).collect::<PolyResult<Vec<_>>>()?;
        let tuple = em.b.emit(IrType::object(RepTy::Tuple(lowered.to_vec())), InstKind::Tuple { elements });
        em.manage_rvalue(tuple)
    }

    fn implode_into_buffer(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        lowered: &[RepTy],
        input: &[Ty],
        output: &[Ty],
        buffer: TemporaryInit,
    ) -> PolyResult<()> {
        let mut element_cleanups = Vec::with_capacity(output.len());
        for (index, output_ty) in output.iter().enumerate() {
            let input_ty = input.get(index).ok_or_else(|| PolyError::invariant("input tuple is too short"))?;
            let lowered_ty = lowered.get(index).ok_or_else(|| PolyError::invariant("lowered tuple is too short"))?;
            let slot_ty = IrType::address(lowered_ty.clone());
            let slot = em.b.emit(slot_ty, InstKind::TupleElementAddr { addr: buffer.addr, index });
            let slot = em.uninitialized_at(slot)?;
            match (input_ty, output_ty, lowered_ty) {
                (Ty::Tuple(input_elements), Ty::Tuple(output_elements), RepTy::Tuple(lowered_elements)) => {
                    self.implode_into_buffer(em, lowered_elements, input_elements, output_elements, slot)?;
                }
                _ => {
                    let value = self.claim_opaque_leaf(em, lowered_ty, input_ty, output_ty)?;
                    value.forward_into(em, slot.addr)?;
                    slot.finish_initialization(em)?;
                }
            }
            element_cleanups.extend(slot.cleanup);
        }
        em.cleanups.commit_batch(&element_cleanups, buffer.cleanup)
    }

    fn translate_single(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &Ty,
        output: &Ty,
        value: ManagedValue,
        param: &ParamInfo,
    ) -> PolyResult<()> {
        let param_ty = param.ir_type();
        if em.value_type(value.value()) == param_ty {
            self.outputs.push(value);
            return Ok(());
        }
        match param.convention {
            ParamConvention::DirectOwned
            | ParamConvention::DirectGuaranteed
            | ParamConvention::DirectUnowned
            | ParamConvention::DirectDeallocating => {
                let converted = translate_primitive(em, self.kind, pattern, input, output, value)?;
                let converted_ty = em.value_type(converted.value());
                if converted_ty != param_ty {
                    return Err(PolyError::invariant(format!(
                        "translated argument has type {}, parameter expects {}",
                        converted_ty, param_ty
                    )));
                }
                self.outputs.push(converted);
                Ok(())
            }
            ParamConvention::IndirectOut => Err(PolyError::invariant("an indirect result is not an argument")),
            ParamConvention::IndirectInout => {
                em.diagnose_not_implemented("inout writeback in abstraction difference thunk");
                Err(PolyError::InoutReabstraction { ty: output.to_string(), span: em.span })
            }
            ParamConvention::IndirectIn | ParamConvention::IndirectInGuaranteed => {
                let temporary = em.emit_temporary(&param_ty)?;
                self.translate_single_into(em, pattern, input, output, value, temporary)?;
                self.outputs.push(temporary.managed_address());
                Ok(())
            }
        }
    }

    fn translate_single_into(
        &mut self,
        em: &mut FunctionEmitter<'_>,
        pattern: &AbstractionPattern,
        input: &Ty,
        output: &Ty,
        value: ManagedValue,
        temporary: TemporaryInit,
    ) -> PolyResult<()> {
        let converted = translate_primitive(em, self.kind, pattern, input, output, value)?;
        converted.forward_into(em, temporary.addr)?;
        temporary.finish_initialization(em)
    }
}

fn tuple_elements(ty: &Ty) -> PolyResult<&[Ty]> {
    ty.tuple_elements()
        .ok_or_else(|| PolyError::invariant(format!("expected a tuple type, found `{}`", ty)))
}

fn element_pattern(pattern: &AbstractionPattern, index: usize) -> PolyResult<AbstractionPattern> {
    pattern
        .tuple_element(index)
        .ok_or_else(|| PolyError::invariant(format!("pattern `{}` has no element {}", pattern, index)))
}

/// Translates lowered `inputs` shaped like `input` into arguments for `output_params` shaped like
/// `output`, reabstracting along `pattern` in the direction `kind`.
pub fn translate_arguments(
    em: &mut FunctionEmitter<'_>,
    kind: TranslationKind,
    inputs: Vec<ManagedValue>,
    output_params: &[ParamInfo],
    pattern: &AbstractionPattern,
    input: &Ty,
    output: &Ty,
) -> PolyResult<Vec<ManagedValue>> {
    let mut translator = ArgumentTranslator::new(kind, inputs, output_params);
    translator.translate(em, pattern, input, output)?;
    translator.finish()
}
