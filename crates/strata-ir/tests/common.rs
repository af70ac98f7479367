// Shared helpers for IR integration tests

use std::sync::Arc;

use strata_ir::{FunctionBuilder, InstKind, IrModule, Literal, ValueId};
use strata_layout::{FnRep, IrType, ParamConvention, ParamInfo, RepTy, ResultConvention, ResultInfo};
use strata_types::{FunctionRepr, PrimTy};

pub fn int() -> RepTy {
    RepTy::Prim(PrimTy::Int)
}

pub fn string() -> RepTy {
    RepTy::Prim(PrimTy::String)
}

pub fn thin_fn(params: Vec<(RepTy, ParamConvention)>, result: RepTy) -> Arc<FnRep> {
    Arc::new(FnRep {
        repr: FunctionRepr::Thin,
        callee: ParamConvention::DirectUnowned,
        params: params.into_iter().map(|(ty, convention)| ParamInfo::new(ty, convention)).collect(),
        result: ResultInfo { ty: result, convention: ResultConvention::Owned },
        indirect_result: None,
    })
}

pub fn int_literal(b: &mut FunctionBuilder, v: i64) -> ValueId {
    b.emit(IrType::object(int()), InstKind::Literal(Literal::Int(v)))
}

pub fn install(module: &mut IrModule, b: FunctionBuilder) {
    let function = b.finish().expect("function should be well formed");
    module.add_function(function).expect("function names should be unique");
}
