//! The per-function emission context.

use std::sync::Arc;

use miette::SourceSpan;
use strata_ir::{FunctionBuilder, InstKind, IrFunction, ValueId};
use strata_layout::{FnRep, IrType, ParamConvention, ParamInfo, TypeLowering};
use strata_types::{AbstractionPattern, GenericEnvironment, Symbol, Ty};

use crate::cleanup::{CleanupAction, CleanupStack, CleanupState};
use crate::diagnostics::PolyDiagnostic;
use crate::error::{PolyError, PolyResult};
use crate::managed::{ManagedValue, TemporaryInit};
use crate::session::PolySession;

/// Emits the body of one function into a [`PolySession`].
///
/// Thunks needed while emitting are built by nested emitters borrowing the same session; they are
/// installed before the function that references them.
pub struct FunctionEmitter<'s> {
    pub(crate) session: &'s mut PolySession,
    pub b: FunctionBuilder,
    pub(crate) cleanups: CleanupStack,
    pub span: SourceSpan,
}

impl<'s> FunctionEmitter<'s> {
    pub fn new(
        session: &'s mut PolySession,
        name: impl Into<Symbol>,
        ty: Arc<FnRep>,
        generic_env: Option<GenericEnvironment>,
    ) -> Self {
        let span = session.location();
        FunctionEmitter { session, b: FunctionBuilder::new(name, ty, generic_env), cleanups: CleanupStack::new(), span }
    }

    pub fn session(&mut self) -> &mut PolySession {
        self.session
    }

    pub fn fn_ty(&self) -> Arc<FnRep> {
        self.b.fn_ty().clone()
    }

    pub fn value_type(&self, value: ValueId) -> IrType {
        self.b.value_type(value).clone()
    }

    pub fn lower(&mut self, pattern: &AbstractionPattern, ty: &Ty) -> PolyResult<TypeLowering> {
        Ok(self.session.types.lower(pattern, ty)?)
    }

    pub fn lower_subst(&mut self, ty: &Ty) -> PolyResult<TypeLowering> {
        Ok(self.session.types.lower_subst(ty)?)
    }

    pub fn lowering_of(&mut self, ty: &IrType) -> PolyResult<TypeLowering> {
        Ok(self.session.types.lowering_of(ty)?)
    }

    pub fn diagnose_not_implemented(&mut self, feature: &str) {
        self.session
            .diagnostics
            .report(PolyDiagnostic::NotImplemented { feature: feature.to_string(), span: self.span });
    }

    pub fn push_scope(&mut self) {
        self.cleanups.push_scope();
    }

    /// Emits the active cleanups of the innermost scope.
    pub fn pop_scope(&mut self) -> PolyResult<()> {
        for action in self.cleanups.pop_scope()? {
            let kind = match action {
                CleanupAction::Release(value) => InstKind::ReleaseValue { value },
                CleanupAction::DestroyAddr(addr) => InstKind::DestroyAddr { addr },
                CleanupAction::DeallocStack(addr) => InstKind::DeallocStack { addr },
                CleanupAction::DeinitExistential(addr) => InstKind::DeinitExistentialAddr { addr },
            };
            self.b.push(kind);
        }
        Ok(())
    }

    /// Takes ownership of a +1 object value.
    pub fn manage_rvalue(&mut self, value: ValueId) -> PolyResult<ManagedValue> {
        let ty = self.value_type(value);
        if self.lowering_of(&ty)?.is_trivial() {
            return Ok(ManagedValue::unmanaged(value));
        }
        let cleanup = self.cleanups.push(CleanupAction::Release(value), CleanupState::Active);
        Ok(ManagedValue::new(value, Some(cleanup)))
    }

    /// Takes ownership of the initialized contents of `addr`.
    pub fn manage_buffer(&mut self, addr: ValueId) -> PolyResult<ManagedValue> {
        let ty = self.value_type(addr);
        if self.lowering_of(&ty)?.is_trivial() {
            return Ok(ManagedValue::unmanaged(addr));
        }
        let cleanup = self.cleanups.push(CleanupAction::DestroyAddr(addr), CleanupState::Active);
        Ok(ManagedValue::new(addr, Some(cleanup)))
    }

    /// Allocates a stack slot that is deallocated when the current scope ends.
    pub fn alloc_stack(&mut self, ty: &IrType) -> ValueId {
        let addr = self.b.emit(ty.as_address(), InstKind::AllocStack);
        self.cleanups.push(CleanupAction::DeallocStack(addr), CleanupState::Active);
        addr
    }

    /// Guards memory at `addr` that is about to be initialized.
    pub fn uninitialized_at(&mut self, addr: ValueId) -> PolyResult<TemporaryInit> {
        let ty = self.value_type(addr);
        let cleanup = if self.lowering_of(&ty)?.is_trivial() {
            None
        } else {
            Some(self.cleanups.push(CleanupAction::DestroyAddr(addr), CleanupState::Dormant))
        };
        Ok(TemporaryInit { addr, cleanup })
    }

    /// A fresh stack temporary to be initialized.
    pub fn emit_temporary(&mut self, ty: &IrType) -> PolyResult<TemporaryInit> {
        let addr = self.alloc_stack(ty);
        self.uninitialized_at(addr)
    }

    pub fn retain_if_needed(&mut self, value: ValueId) -> PolyResult<()> {
        let ty = self.value_type(value);
        if !self.lowering_of(&ty)?.is_trivial() {
            self.b.push(InstKind::RetainValue { value });
        }
        Ok(())
    }

    /// Moves a loadable value out of memory.
    pub fn load_take(&mut self, mv: ManagedValue) -> PolyResult<ManagedValue> {
        let ty = self.value_type(mv.value()).as_object();
        let addr = mv.forward(self)?;
        let value = self.b.emit(ty, InstKind::Load { addr, take: true });
        self.manage_rvalue(value)
    }

    /// Copies a loadable value out of memory the emitter does not own.
    pub fn load_copy(&mut self, addr: ValueId) -> PolyResult<ManagedValue> {
        let ty = self.value_type(addr).as_object();
        let value = self.b.emit(ty, InstKind::Load { addr, take: false });
        self.manage_rvalue(value)
    }

    /// Splits a tuple into independently owned elements.
    pub fn explode_tuple(&mut self, tuple: ManagedValue) -> PolyResult<Vec<(ManagedValue, TypeLowering)>> {
        let ty = self.value_type(tuple.value());
        let arity = ty
            .rep
            .tuple_elements()
            .map(<[_]>::len)
            .ok_or_else(|| PolyError::invariant(format!("cannot explode non-tuple {}", ty)))?;
        let raw = tuple.forward(self)?;
        let mut elements = Vec::with_capacity(arity);
        for index in 0..arity {
            let element_ty = ty
                .tuple_element(index)
                .ok_or_else(|| PolyError::invariant(format!("tuple {} has no element {}", ty, index)))?;
            let lowering = self.lowering_of(&element_ty)?;
            let element = if ty.is_address {
                let addr = self.b.emit(element_ty, InstKind::TupleElementAddr { addr: raw, index });
                self.manage_buffer(addr)?
            } else {
                let value = self.b.emit(element_ty, InstKind::TupleExtract { tuple: raw, index });
                self.manage_rvalue(value)?
            };
            elements.push((element, lowering));
        }
        Ok(elements)
    }

    /// Takes ownership of an incoming parameter according to its convention.
    ///
    /// With `allow_plus_zero`, borrowed parameters stay borrowed; otherwise they are copied so the
    /// body owns every parameter.
    pub fn manage_param(
        &mut self,
        value: ValueId,
        param: &ParamInfo,
        allow_plus_zero: bool,
    ) -> PolyResult<ManagedValue> {
        match param.convention {
            ParamConvention::DirectDeallocating => Ok(ManagedValue::unmanaged(value)),
            ParamConvention::DirectGuaranteed if allow_plus_zero => Ok(ManagedValue::unmanaged(value)),
            ParamConvention::DirectGuaranteed | ParamConvention::DirectUnowned => {
                self.retain_if_needed(value)?;
                self.manage_rvalue(value)
            }
            ParamConvention::DirectOwned => self.manage_rvalue(value),
            ParamConvention::IndirectInGuaranteed if allow_plus_zero => Ok(ManagedValue::unmanaged(value)),
            ParamConvention::IndirectInGuaranteed => {
                let ty = self.value_type(value);
                let copy = self.emit_temporary(&ty)?;
                self.b.push(InstKind::CopyAddr { src: value, dest: copy.addr, take: false });
                copy.finish_initialization(self)?;
                Ok(copy.managed_address())
            }
            ParamConvention::IndirectInout => Ok(ManagedValue::unmanaged(value)),
            ParamConvention::IndirectIn => self.manage_buffer(value),
            ParamConvention::IndirectOut => {
                Err(PolyError::invariant("an indirect result is not a parameter"))
            }
        }
    }

    /// Declares the function's parameters, after any indirect result, and manages each one.
    pub fn collect_params(&mut self, allow_plus_zero: bool) -> PolyResult<Vec<ManagedValue>> {
        let ty = self.fn_ty();
        let mut params = Vec::with_capacity(ty.params.len());
        for param in &ty.params {
            let value = self.b.add_param(param.ir_type());
            params.push(self.manage_param(value, param, allow_plus_zero)?);
        }
        Ok(params)
    }

    /// Declares the indirect result parameter if the signature has one.
    pub fn indirect_result_param(&mut self) -> Option<ValueId> {
        let ty = self.fn_ty();
        ty.indirect_result.as_ref().map(|result| self.b.add_param(IrType::address(result.clone())))
    }

    pub fn finish(self) -> PolyResult<IrFunction> {
        if self.cleanups.depth() != 0 {
            return Err(PolyError::invariant(format!(
                "`{}` finished with {} open cleanup scopes",
                self.b.name(),
                self.cleanups.depth()
            )));
        }
        Ok(self.b.finish()?)
    }

    /// Finishes the function and adds it to the session's module.
    pub fn install(self) -> PolyResult<Symbol> {
        let FunctionEmitter { session, b, cleanups, span } = self;
        let function = FunctionEmitter { session: &mut *session, b, cleanups, span }.finish()?;
        session.install(function)
    }
}
