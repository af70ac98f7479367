//! Erasure into existentials.

use strata_ir::{InstKind, ValueId};
use strata_layout::{IrType, RepTy, TypeLowering};
use strata_types::{AbstractionPattern, ProtocolConformance, Ty};

use crate::cleanup::{CleanupAction, CleanupHandle, CleanupState};
use crate::emitter::FunctionEmitter;
use crate::error::{PolyError, PolyResult};
use crate::managed::ManagedValue;

/// An existential container whose payload was moved out and which must be freed afterwards.
struct OpenedContainer {
    container: ValueId,
    cleanup: CleanupHandle,
}

impl OpenedContainer {
    fn release(self, em: &mut FunctionEmitter<'_>) -> PolyResult<()> {
        em.cleanups.forward(self.cleanup)?;
        em.b.push(InstKind::DeinitExistentialAddr { addr: self.container });
        Ok(())
    }
}

/// Boxes `value`, already in the opaque representation of `input`, into an `output` existential.
pub(crate) fn emit_transform_existential(
    em: &mut FunctionEmitter<'_>,
    value: ManagedValue,
    input: &Ty,
    output: &Ty,
) -> PolyResult<ManagedValue> {
    let mut concrete = input.clone();
    let mut payload = value;
    let mut opened = None;
    if input.is_any_existential() {
        concrete = em.session.open_existential_type(input)?;
        let (opened_payload, container) = emit_open_existential(em, value, &concrete)?;
        payload = opened_payload;
        opened = container;
    }

    let mut from = &concrete;
    let mut to = output;
    while let (Ty::Metatype(f) | Ty::ExistentialMetatype(f), Ty::ExistentialMetatype(t)) = (from, to) {
        from = &**f;
        to = &**t;
    }
    let conformances = collect_conformances(em, from, to)?;
    log::debug!("erasing `{}` into `{}` with {} conformances", concrete, output, conformances.len());

    let concrete_lowering = em.lower(&AbstractionPattern::Opaque, &concrete)?;
    let expected = em.lower_subst(output)?;
    let result = emit_existential_erasure(em, &concrete, &concrete_lowering, &expected, conformances, payload)?;
    if let Some(container) = opened {
        container.release(em)?;
    }
    Ok(result)
}

fn collect_conformances(
    em: &FunctionEmitter<'_>,
    concrete: &Ty,
    existential: &Ty,
) -> PolyResult<Vec<ProtocolConformance>> {
    existential
        .existential_protocols()
        .iter()
        .map(|protocol| {
            em.session.lookup_conformance(concrete, protocol).ok_or_else(|| PolyError::MissingConformance {
                ty: concrete.to_string(),
                protocol: protocol.name.to_string(),
            })
        })
        .collect()
}

/// Projects the payload out of an existential, typed as the opened archetype.
fn emit_open_existential(
    em: &mut FunctionEmitter<'_>,
    value: ManagedValue,
    opened: &Ty,
) -> PolyResult<(ManagedValue, Option<OpenedContainer>)> {
    let ty = em.value_type(value.value());
    let opened_rep = em.lower(&AbstractionPattern::Opaque, opened)?.lowered.rep;
    match &ty.rep {
        RepTy::ExistentialMetatype(_) => {
            let meta =
                em.b.emit(IrType::object(opened_rep), InstKind::OpenExistentialMetatype { value: value.value() });
            Ok((ManagedValue::unmanaged(meta), None))
        }
        _ if ty.is_address => {
            let container = value.forward(em)?;
            let cleanup = em.cleanups.push(CleanupAction::DeinitExistential(container), CleanupState::Active);
            let payload = em.b.emit(IrType::address(opened_rep), InstKind::OpenExistentialAddr { addr: container });
            let payload = em.manage_buffer(payload)?;
            Ok((payload, Some(OpenedContainer { container, cleanup })))
        }
        _ => {
            let raw = value.forward(em)?;
            let payload = em.b.emit(IrType::object(opened_rep), InstKind::OpenExistentialRef { value: raw });
            Ok((em.manage_rvalue(payload)?, None))
        }
    }
}

fn emit_existential_erasure(
    em: &mut FunctionEmitter<'_>,
    concrete: &Ty,
    concrete_lowering: &TypeLowering,
    expected: &TypeLowering,
    conformances: Vec<ProtocolConformance>,
    payload: ManagedValue,
) -> PolyResult<ManagedValue> {
    match &expected.lowered.rep {
        RepTy::ExistentialMetatype(_) => {
            let raw = payload.forward(em)?;
            let boxed =
                em.b.emit(expected.lowered.clone(), InstKind::InitExistentialMetatype { value: raw, conformances });
            Ok(ManagedValue::unmanaged(boxed))
        }
        _ if !expected.address_only => {
            let payload = if em.value_type(payload.value()).is_address { em.load_take(payload)? } else { payload };
            let raw = payload.forward(em)?;
            let boxed = em.b.emit(
                expected.lowered.clone(),
                InstKind::InitExistentialRef { value: raw, concrete: concrete.clone(), conformances },
            );
            em.manage_rvalue(boxed)
        }
        _ => {
            let buffer = em.emit_temporary(&expected.lowered)?;
            let payload_addr = em.b.emit(
                IrType::address(concrete_lowering.lowered.rep.clone()),
                InstKind::InitExistentialAddr { addr: buffer.addr, concrete: concrete.clone(), conformances },
            );
            payload.forward_into(em, payload_addr)?;
            buffer.finish_initialization(em)?;
            Ok(buffer.managed_address())
        }
    }
}
