use std::sync::Arc;

use expect_test::expect;
use strata_ir::{BuiltinOp, FunctionBuilder, InstKind, InterpError, Interpreter, IrError, IrModule, Value};
use strata_layout::{IrType, ParamConvention, RepTy};
use strata_types::{ClassDecl, ProtocolConformance, ProtocolDecl, Symbol, Ty};

mod common;
use common::{install, int, int_literal, string, thin_fn};

#[test]
fn test_add_and_print() -> Result<(), InterpError> {
    let ty = thin_fn(
        vec![(int(), ParamConvention::DirectUnowned), (int(), ParamConvention::DirectUnowned)],
        int(),
    );
    let mut b = FunctionBuilder::new("add", ty, None);
    let x = b.add_param(IrType::object(int()));
    let y = b.add_param(IrType::object(int()));
    let sum = b.emit(IrType::object(int()), InstKind::Builtin { op: BuiltinOp::IntAdd, args: vec![x, y] });
    b.ret(sum);

    let mut module = IrModule::new();
    install(&mut module, b);
    expect![[r#"
        sil @add : $@convention(thin) (Int, Int) -> @owned Int {
        bb0(%0 : $Int, %1 : $Int):
          %2 = builtin "add"(%0, %1) : $Int
          return %2
        }
    "#]]
    .assert_eq(&module.to_string());

    let mut interp = Interpreter::new(&module);
    let result = interp.call(&Symbol::from("add"), vec![Value::Int(2), Value::Int(3)])?;
    assert_eq!(result, Value::Int(5));
    Ok(())
}

#[test]
fn test_closure_context_is_consumed_by_apply() -> Result<(), InterpError> {
    let mut module = IrModule::new();

    let keep_ty =
        thin_fn(vec![(int(), ParamConvention::DirectUnowned), (string(), ParamConvention::DirectOwned)], int());
    let mut b = FunctionBuilder::new("keep_first", keep_ty.clone(), None);
    let x = b.add_param(IrType::object(int()));
    let s = b.add_param(IrType::object(string()));
    b.push(InstKind::ReleaseValue { value: s });
    b.ret(x);
    install(&mut module, b);

    let closure_ty = RepTy::Function(Arc::new(keep_ty.with_representation(
        strata_types::FunctionRepr::Thick,
        ParamConvention::DirectOwned,
    )));
    let make_ty = thin_fn(vec![(string(), ParamConvention::DirectOwned)], closure_ty.clone());
    let mut b = FunctionBuilder::new("make", make_ty, None);
    let s = b.add_param(IrType::object(string()));
    let f =
        b.emit(IrType::object(RepTy::Function(keep_ty)), InstKind::FunctionRef { symbol: Symbol::from("keep_first") });
    let closure = b.emit(IrType::object(closure_ty), InstKind::PartialApply { callee: f, args: vec![s] });
    b.ret(closure);
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    let captured = interp.string("captured");
    let closure = interp.call(&Symbol::from("make"), vec![captured])?;
    assert_eq!(interp.live_objects(), 2);
    let result = interp.call_value(&closure, vec![Value::Int(7)])?;
    assert_eq!(result, Value::Int(7));
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_double_release_is_detected() {
    let ty = thin_fn(vec![(string(), ParamConvention::DirectOwned)], RepTy::unit());
    let mut b = FunctionBuilder::new("drop_twice", ty, None);
    let s = b.add_param(IrType::object(string()));
    b.push(InstKind::ReleaseValue { value: s });
    b.push(InstKind::ReleaseValue { value: s });
    let unit = b.unit();
    b.ret(unit);
    let mut module = IrModule::new();
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    let s = interp.string("once");
    let err = interp.call(&Symbol::from("drop_twice"), vec![s]).unwrap_err();
    assert!(matches!(err, InterpError::DoubleRelease(_)), "{err:?}");
}

#[test]
fn test_memory_errors() {
    let mut module = IrModule::new();

    let mut b = FunctionBuilder::new("leak", thin_fn(vec![], RepTy::unit()), None);
    let slot = b.emit(IrType::address(string()), InstKind::AllocStack);
    let text = b.emit(IrType::object(string()), InstKind::Literal(strata_ir::Literal::Str("leaked".to_string())));
    b.push(InstKind::Store { value: text, addr: slot });
    b.push(InstKind::DeallocStack { addr: slot });
    let unit = b.unit();
    b.ret(unit);
    install(&mut module, b);

    let mut b = FunctionBuilder::new("take_twice", thin_fn(vec![(int(), ParamConvention::IndirectIn)], int()), None);
    let addr = b.add_param(IrType::address(int()));
    b.emit(IrType::object(int()), InstKind::Load { addr, take: true });
    let again = b.emit(IrType::object(int()), InstKind::Load { addr, take: true });
    b.ret(again);
    install(&mut module, b);

    let ty = thin_fn(vec![(string(), ParamConvention::IndirectIn)], RepTy::unit());
    let mut b = FunctionBuilder::new("overwrite", ty, None);
    let addr = b.add_param(IrType::address(string()));
    let text = b.emit(IrType::object(string()), InstKind::Literal(strata_ir::Literal::Str("second".to_string())));
    b.push(InstKind::Store { value: text, addr });
    let unit = b.unit();
    b.ret(unit);
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    let err = interp.call(&Symbol::from("leak"), vec![]).unwrap_err();
    assert!(matches!(err, InterpError::StackSlotNotEmpty { .. }), "{err:?}");

    let slot = interp.stack_slot(Value::Int(1));
    let err = interp.call(&Symbol::from("take_twice"), vec![slot]).unwrap_err();
    assert!(matches!(err, InterpError::UninitializedRead { .. }), "{err:?}");

    let first = interp.string("first");
    let slot = interp.stack_slot(first);
    let err = interp.call(&Symbol::from("overwrite"), vec![slot]).unwrap_err();
    assert!(matches!(err, InterpError::OverwriteInitialized { .. }), "{err:?}");
}

#[test]
fn test_cond_fail_traps() {
    let bool_ty = RepTy::Prim(strata_types::PrimTy::Bool);
    let ty = thin_fn(vec![(bool_ty.clone(), ParamConvention::DirectUnowned)], RepTy::unit());
    let mut b = FunctionBuilder::new("check", ty, None);
    let cond = b.add_param(IrType::object(bool_ty));
    b.push(InstKind::CondFail { cond, message: "unexpectedly found nil".to_string() });
    let unit = b.unit();
    b.ret(unit);
    let mut module = IrModule::new();
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    assert!(interp.call(&Symbol::from("check"), vec![Value::Bool(false)]).is_ok());
    let err = interp.call(&Symbol::from("check"), vec![Value::Bool(true)]).unwrap_err();
    assert_eq!(err, InterpError::Trap("unexpectedly found nil".to_string()));
}

#[test]
fn test_existential_buffer_round_trip() -> Result<(), InterpError> {
    let proto = Arc::new(ProtocolDecl::new("Describable"));
    let existential = RepTy::Existential(vec![proto.clone()]);
    let mut b = FunctionBuilder::new("rebox", thin_fn(vec![(string(), ParamConvention::DirectOwned)], string()), None);
    let s = b.add_param(IrType::object(string()));
    let buffer = b.emit(IrType::address(existential), InstKind::AllocStack);
    let payload = b.emit(
        IrType::address(string()),
        InstKind::InitExistentialAddr {
            addr: buffer,
            concrete: Ty::string(),
            conformances: vec![ProtocolConformance::new(Ty::string(), proto)],
        },
    );
    b.push(InstKind::Store { value: s, addr: payload });
    let opened = b.emit(IrType::address(string()), InstKind::OpenExistentialAddr { addr: buffer });
    let out = b.emit(IrType::object(string()), InstKind::Load { addr: opened, take: true });
    b.push(InstKind::DeinitExistentialAddr { addr: buffer });
    b.push(InstKind::DeallocStack { addr: buffer });
    b.ret(out);
    let mut module = IrModule::new();
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    let s = interp.string("boxed");
    let out = interp.call(&Symbol::from("rebox"), vec![s])?;
    assert_eq!(interp.read_string(&out)?, "boxed");
    interp.release(out)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_structured_if_over_optional_buffer() -> Result<(), IrError> {
    let optional = RepTy::Optional(strata_types::OptionalKind::Optional, Box::new(int()));
    let ty = thin_fn(vec![(optional.clone(), ParamConvention::IndirectIn)], int());
    let mut b = FunctionBuilder::new("unwrap_or_zero", ty, None);
    let addr = b.add_param(IrType::address(optional));
    let is_none = b.emit(IrType::object(RepTy::Prim(strata_types::PrimTy::Bool)), InstKind::IsNoneAddr { addr });
    b.begin_region();
    let zero = int_literal(&mut b, 0);
    let then_region = b.end_region(Some(zero))?;
    b.begin_region();
    let payload = b.emit(IrType::address(int()), InstKind::UncheckedTakeEnumDataAddr { addr });
    let value = b.emit(IrType::object(int()), InstKind::Load { addr: payload, take: true });
    let else_region = b.end_region(Some(value))?;
    let result = b.emit(IrType::object(int()), InstKind::If { cond: is_none, then_region, else_region });
    b.ret(result);
    let mut module = IrModule::new();
    module.add_function(b.finish()?)?;

    let mut interp = Interpreter::new(&module);
    let some = interp.stack_slot(Value::Optional(Some(Box::new(Value::Int(5)))));
    assert_eq!(interp.call(&Symbol::from("unwrap_or_zero"), vec![some]), Ok(Value::Int(5)));
    let none = interp.stack_slot(Value::Optional(None));
    assert_eq!(interp.call(&Symbol::from("unwrap_or_zero"), vec![none]), Ok(Value::Int(0)));
    Ok(())
}

#[test]
fn test_class_method_uses_vtable_of_dynamic_class() -> Result<(), InterpError> {
    let base = Arc::new(ClassDecl::new("Base"));
    let receiver = RepTy::Class(base);
    let mut module = IrModule::new();
    for (name, answer) in [("Base.describe", 1), ("Sub.describe", 2)] {
        let ty = thin_fn(vec![(receiver.clone(), ParamConvention::DirectGuaranteed)], int());
        let mut b = FunctionBuilder::new(name, ty, None);
        b.add_param(IrType::object(receiver.clone()));
        let v = int_literal(&mut b, answer);
        b.ret(v);
        install(&mut module, b);
    }
    module.set_vtable_entry("Base", "describe", "Base.describe");
    module.set_vtable_entry("Sub", "describe", "Sub.describe");

    let method_ty = thin_fn(vec![(receiver.clone(), ParamConvention::DirectGuaranteed)], int());
    let mut b = FunctionBuilder::new("call_describe", method_ty.clone(), None);
    let this = b.add_param(IrType::object(receiver));
    let method = b.emit(
        IrType::object(RepTy::Function(method_ty)),
        InstKind::ClassMethod { receiver: this, method: Symbol::from("describe") },
    );
    let result = b.emit(IrType::object(int()), InstKind::Apply { callee: method, args: vec![this] });
    b.ret(result);
    install(&mut module, b);

    let mut interp = Interpreter::new(&module);
    let sub = interp.instance("Sub");
    assert_eq!(interp.call(&Symbol::from("call_describe"), vec![sub.clone()])?, Value::Int(2));
    let base = interp.instance("Base");
    assert_eq!(interp.call(&Symbol::from("call_describe"), vec![base.clone()])?, Value::Int(1));
    interp.release(sub)?;
    interp.release(base)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}
