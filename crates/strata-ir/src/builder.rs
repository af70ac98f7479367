use std::sync::Arc;

use strata_layout::{FnRep, IrType};
use strata_types::{GenericEnvironment, Symbol};

use crate::ir::{Inst, InstKind, IrFunction, Region, ValueId};
use crate::IrError;

/// Builds one [`IrFunction`].
///
/// Instructions are appended to the innermost open region; the function body is the outermost one.
#[derive(Debug)]
pub struct FunctionBuilder {
    name: Symbol,
    ty: Arc<FnRep>,
    generic_env: Option<GenericEnvironment>,
    params: Vec<ValueId>,
    values: Vec<IrType>,
    regions: Vec<Vec<Inst>>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<Symbol>, ty: Arc<FnRep>, generic_env: Option<GenericEnvironment>) -> Self {
        FunctionBuilder {
            name: name.into(),
            ty,
            generic_env,
            params: Vec::new(),
            values: Vec::new(),
            regions: vec![Vec::new()],
        }
    }

    pub fn name(&self) -> &Symbol {
        &self.name
    }

    pub fn fn_ty(&self) -> &Arc<FnRep> {
        &self.ty
    }

    pub fn generic_env(&self) -> Option<&GenericEnvironment> {
        self.generic_env.as_ref()
    }

    fn fresh(&mut self, ty: IrType) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(ty);
        id
    }

    pub fn add_param(&mut self, ty: IrType) -> ValueId {
        let id = self.fresh(ty);
        self.params.push(id);
        id
    }

    pub fn params(&self) -> &[ValueId] {
        &self.params
    }

    pub fn value_type(&self, id: ValueId) -> &IrType {
        &self.values[id.index()]
    }

    /// Appends a value-producing instruction.
    pub fn emit(&mut self, ty: IrType, kind: InstKind) -> ValueId {
        let dest = self.fresh(ty);
        self.append(Inst { dest: Some(dest), kind });
        dest
    }

    /// Appends an instruction without a result.
    pub fn push(&mut self, kind: InstKind) {
        self.append(Inst { dest: None, kind });
    }

    fn append(&mut self, inst: Inst) {
        if let Some(region) = self.regions.last_mut() {
            region.push(inst);
        }
    }

    pub fn begin_region(&mut self) {
        self.regions.push(Vec::new());
    }

    pub fn end_region(&mut self, result: Option<ValueId>) -> Result<Region, IrError> {
        if self.regions.len() < 2 {
            return Err(IrError::UnbalancedRegion { function: self.name.clone() });
        }
        let insts = self.regions.pop().unwrap_or_default();
        Ok(Region { insts, result })
    }

    pub fn ret(&mut self, value: ValueId) {
        self.push(InstKind::Return { value });
    }

    /// The empty tuple.
    pub fn unit(&mut self) -> ValueId {
        self.emit(IrType::unit(), InstKind::Tuple { elements: Vec::new() })
    }

    pub fn finish(mut self) -> Result<IrFunction, IrError> {
        if self.regions.len() != 1 {
            return Err(IrError::UnbalancedRegion { function: self.name });
        }
        let body = self.regions.pop().unwrap_or_default();
        if !matches!(body.last(), Some(Inst { kind: InstKind::Return { .. }, .. })) {
            return Err(IrError::MissingReturn(self.name));
        }
        Ok(IrFunction {
            name: self.name,
            ty: self.ty,
            params: self.params,
            values: self.values,
            body,
            generic_env: self.generic_env,
        })
    }
}
