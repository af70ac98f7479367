use std::sync::Arc;

use expect_test::expect;
use strata_ir::{BuiltinOp, InstKind, Interpreter, Literal, Value, ValueId};
use strata_layout::{FnLoweringAttrs, IrType};
use strata_poly::{emit_override_thunk, emit_protocol_witness, FunctionEmitter, ManagedValue, PolyError, PolySession};
use strata_types::{
    AbstractionPattern, ClassDecl, FunctionTy, GenericParam, MethodAttrs, MethodDecl, ProtocolConformance,
    ProtocolDecl, ProtocolRequirement, StructDecl, SubstitutionMap, Symbol, Ty,
};

mod common;
use common::{define, function, int, session, string, thin};

fn protocol_self() -> Ty {
    Ty::GenericParam(GenericParam::protocol_self())
}

/// Emits the implementation of `method` with the signature its attributes call for.
fn define_method(
    s: &mut PolySession,
    method: &MethodDecl,
    body: impl FnOnce(&mut FunctionEmitter<'_>, Option<ValueId>, Vec<ManagedValue>) -> Result<ValueId, PolyError>,
) -> Result<(), PolyError> {
    let ty = s.types.lower_subst_function(&method.formal_type, FnLoweringAttrs::from(&method.attrs))?;
    define(s, method.symbol.as_str(), thin(&ty), body)?;
    Ok(())
}

fn describable_widget() -> (Arc<ClassDecl>, ProtocolConformance, ProtocolRequirement) {
    let describable = Arc::new(ProtocolDecl::new("Describable"));
    let widget = Arc::new(ClassDecl::new("Widget").conforming_to(describable.clone()));
    let conformance = ProtocolConformance::new(Ty::Class(widget.clone()), describable.clone());
    let requirement = ProtocolRequirement::new(describable, "describe", FunctionTy::new(protocol_self(), Ty::string()));
    (widget, conformance, requirement)
}

fn define_description(
    s: &mut PolySession,
    symbol: &str,
    widget: &Arc<ClassDecl>,
    text: &'static str,
) -> Result<(), PolyError> {
    let method = MethodDecl::new("describe", symbol, FunctionTy::new(Ty::Class(widget.clone()), Ty::string()));
    define_method(s, &method, |em, _, _| {
        Ok(em.b.emit(IrType::object(string()), InstKind::Literal(Literal::Str(text.to_string()))))
    })
}

#[test]
fn test_inner_pointer_witness_is_diagnosed_and_retained() -> miette::Result<()> {
    let mut s = session();
    let labeled = Arc::new(ProtocolDecl::new("Labeled"));
    let label = Ty::Struct(Arc::new(StructDecl::new("Label", vec![Ty::string()]).conforming_to(labeled.clone())));
    let conformance = ProtocolConformance::new(label.clone(), labeled.clone());
    let requirement = ProtocolRequirement::new(labeled, "text", FunctionTy::new(protocol_self(), Ty::string()));
    let attrs = MethodAttrs { returns_inner_pointer: true, guaranteed_self: true, ..Default::default() };
    let witness = MethodDecl::new("text", "Label.text", FunctionTy::new(label, Ty::string())).with_attrs(attrs);

    // The implementation hands out its field at +0.
    let impl_ty = s.types.lower_subst_function(&witness.formal_type, FnLoweringAttrs::from(&witness.attrs))?;
    expect!["@callee_owned (@guaranteed Label) -> @unowned_inner_pointer String"].assert_eq(&impl_ty.to_string());
    let mut em = FunctionEmitter::new(&mut s, "Label.text", thin(&impl_ty), None);
    em.push_scope();
    let params = em.collect_params(true)?;
    let text = em.b.emit(IrType::object(string()), InstKind::StructExtract { value: params[0].value(), index: 0 });
    em.pop_scope()?;
    em.b.ret(text);
    em.install()?;

    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), false)?;
    assert_eq!(symbol, Symbol::from("protocol_witness_Label_Labeled_text"));
    expect!["@convention(thin) (@in Label) -> @owned String"].assert_eq(&function(&s, symbol.as_str()).ty.to_string());
    assert_eq!(s.diagnostics.len(), 1);
    assert_eq!(function(&s, symbol.as_str()).count(|k| matches!(k, InstKind::RetainValue { .. })), 1);

    let mut interp = Interpreter::new(&s.module);
    let text = interp.string("caption");
    let receiver = interp.stack_slot(Value::Struct(vec![text]));
    let result = interp.call(&symbol, vec![receiver])?;
    assert_eq!(interp.read_string(&result)?, "caption");
    assert_eq!(interp.refcount(&result), Some(1));
    interp.release(result)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_autoreleased_witness_result_is_retained() -> miette::Result<()> {
    let mut s = session();
    let headlined = Arc::new(ProtocolDecl::new("Headlined"));
    let decl = StructDecl::new("Headline", vec![Ty::string()]).conforming_to(headlined.clone());
    let headline = Ty::Struct(Arc::new(decl));
    let conformance = ProtocolConformance::new(headline.clone(), headlined.clone());
    let requirement = ProtocolRequirement::new(headlined, "title", FunctionTy::new(protocol_self(), Ty::string()));
    let attrs = MethodAttrs { autoreleased_result: true, guaranteed_self: true, ..Default::default() };
    let witness = MethodDecl::new("title", "Headline.title", FunctionTy::new(headline, Ty::string())).with_attrs(attrs);

    let impl_ty = s.types.lower_subst_function(&witness.formal_type, FnLoweringAttrs::from(&witness.attrs))?;
    expect!["@callee_owned (@guaranteed Headline) -> @autoreleased String"].assert_eq(&impl_ty.to_string());
    let mut em = FunctionEmitter::new(&mut s, "Headline.title", thin(&impl_ty), None);
    em.push_scope();
    let params = em.collect_params(true)?;
    let text = em.b.emit(IrType::object(string()), InstKind::StructExtract { value: params[0].value(), index: 0 });
    em.pop_scope()?;
    em.b.ret(text);
    em.install()?;

    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), false)?;
    assert_eq!(symbol, Symbol::from("protocol_witness_Headline_Headlined_title"));
    let thunk = function(&s, symbol.as_str());
    assert_eq!(thunk.count(|k| matches!(k, InstKind::RetainAutoreleased { .. })), 1);
    assert_eq!(thunk.count(|k| matches!(k, InstKind::RetainValue { .. })), 0);
    assert!(s.diagnostics.is_empty());

    let mut interp = Interpreter::new(&s.module);
    let text = interp.string("news");
    let receiver = interp.stack_slot(Value::Struct(vec![text]));
    let result = interp.call(&symbol, vec![receiver])?;
    assert_eq!(interp.read_string(&result)?, "news");
    assert_eq!(interp.refcount(&result), Some(1));
    interp.release(result)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_open_class_witness_dispatches_through_vtable() -> miette::Result<()> {
    let mut s = session();
    let (widget, conformance, requirement) = describable_widget();
    define_description(&mut s, "SubWidget.describe", &widget, "sub")?;
    s.module.set_vtable_entry("SubWidget", "describe", "SubWidget.describe");

    let witness = MethodDecl::new("describe", "Widget.describe", FunctionTy::new(Ty::Class(widget), Ty::string()));
    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), false)?;
    let thunk = function(&s, symbol.as_str());
    assert_eq!(thunk.count(|k| matches!(k, InstKind::ClassMethod { .. })), 1);
    assert_eq!(thunk.count(|k| matches!(k, InstKind::FunctionRef { .. })), 0);

    let mut interp = Interpreter::new(&s.module);
    let receiver = interp.instance("SubWidget");
    let receiver = interp.stack_slot(receiver);
    let result = interp.call(&symbol, vec![receiver])?;
    assert_eq!(interp.read_string(&result)?, "sub");
    interp.release(result)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_dynamic_witness_uses_replacement() -> miette::Result<()> {
    let mut s = session();
    let (widget, conformance, requirement) = describable_widget();
    define_description(&mut s, "Widget.describe", &widget, "original")?;
    define_description(&mut s, "Widget.describe_replacement", &widget, "replaced")?;
    s.module.set_dynamic_replacement("Widget.describe", "Widget.describe_replacement");

    let attrs = MethodAttrs { is_dynamic: true, ..Default::default() };
    let witness = MethodDecl::new("describe", "Widget.describe", FunctionTy::new(Ty::Class(widget), Ty::string()))
        .with_attrs(attrs);
    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), false)?;
    assert_eq!(function(&s, symbol.as_str()).count(|k| matches!(k, InstKind::DynamicMethod { .. })), 1);

    let mut interp = Interpreter::new(&s.module);
    let receiver = interp.instance("Widget");
    let receiver = interp.stack_slot(receiver);
    let result = interp.call(&symbol, vec![receiver])?;
    assert_eq!(interp.read_string(&result)?, "replaced");
    interp.release(result)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}

#[test]
fn test_free_function_witness_drops_receiver() -> miette::Result<()> {
    let mut s = session();
    let zeroable = Arc::new(ProtocolDecl::new("Zeroable"));
    let conformance = ProtocolConformance::new(Ty::int(), zeroable.clone());
    let requirement =
        ProtocolRequirement::new(zeroable, "zero", FunctionTy::new(Ty::metatype(protocol_self()), protocol_self()));
    let witness = MethodDecl::new("zero", "Int.zero", FunctionTy::new(Ty::unit(), Ty::int()));
    define_method(&mut s, &witness, |em, _, _| {
        Ok(em.b.emit(IrType::object(int()), InstKind::Literal(Literal::Int(0))))
    })?;

    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), true)?;
    let thunk = function(&s, symbol.as_str());
    expect!["@convention(thin) (@thick Int.Type) -> @out Int"].assert_eq(&thunk.ty.to_string());
    assert_eq!(thunk.count(|k| matches!(k, InstKind::FunctionRef { .. })), 1);

    let mut interp = Interpreter::new(&s.module);
    let out = interp.stack_slot(Value::Uninit);
    interp.call(&symbol, vec![out.clone(), Value::Metatype("Int".to_string())])?;
    assert_eq!(interp.take_slot(&out)?, Value::Int(0));
    Ok(())
}

#[test]
fn test_generic_witness_round_trips_through_its_own_pattern() -> miette::Result<()> {
    let mut s = session();
    let picker = Arc::new(ProtocolDecl::new("Picker"));
    let tray = Ty::Struct(Arc::new(StructDecl::new("Tray", vec![]).conforming_to(picker.clone())));
    let conformance = ProtocolConformance::new(tray.clone(), picker.clone());
    let requirement = ProtocolRequirement::new(
        picker,
        "pick",
        FunctionTy::new(Ty::tuple(vec![Ty::int(), protocol_self()]), Ty::int()),
    );
    let t = GenericParam::new(1, 0, "T");
    let witness = MethodDecl::new(
        "pick",
        "Tray.pick",
        FunctionTy::new(Ty::tuple(vec![Ty::GenericParam(t.clone()), tray]), Ty::GenericParam(t.clone())),
    );
    let substitutions = SubstitutionMap::new().with(t, Ty::int());

    // The implementation is compiled against its generic signature.
    let generic_pattern = AbstractionPattern::new(&Ty::Function(Box::new(witness.formal_type.clone())));
    let generic_ty = s.types.lower_function_type(
        &generic_pattern,
        &witness.formal_type.subst(&substitutions),
        FnLoweringAttrs::default(),
    )?;
    expect!["@callee_owned (@in Int, Tray) -> @out Int"].assert_eq(&generic_ty.to_string());
    define(&mut s, "Tray.pick", thin(&generic_ty), |em, out, params| {
        let out = out.expect("indirect result");
        params[0].forward_into(em, out)?;
        Ok(em.b.unit())
    })?;

    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &substitutions, false)?;
    let thunk = function(&s, symbol.as_str());
    expect!["@convention(thin) (Int, @in Tray) -> Int"].assert_eq(&thunk.ty.to_string());
    assert_eq!(thunk.count(|k| matches!(k, InstKind::AllocStack)), 2);

    let mut interp = Interpreter::new(&s.module);
    let tray = interp.stack_slot(Value::Struct(vec![]));
    let result = interp.call(&symbol, vec![Value::Int(5), tray])?;
    assert_eq!(result, Value::Int(5));
    Ok(())
}

#[test]
fn test_inout_receiver_is_copied_for_by_value_witness() -> miette::Result<()> {
    let mut s = session();
    let counting = Arc::new(ProtocolDecl::new("Counting"));
    let counter = Ty::Struct(Arc::new(StructDecl::new("Counter", vec![Ty::int()]).conforming_to(counting.clone())));
    let conformance = ProtocolConformance::new(counter.clone(), counting.clone());
    let requirement =
        ProtocolRequirement::new(counting, "count", FunctionTy::new(Ty::inout(protocol_self()), Ty::int()));
    let witness = MethodDecl::new("count", "Counter.count", FunctionTy::new(counter, Ty::int()));
    define_method(&mut s, &witness, |em, _, params| {
        Ok(em.b.emit(IrType::object(int()), InstKind::StructExtract { value: params[0].value(), index: 0 }))
    })?;

    let symbol = emit_protocol_witness(&mut s, &conformance, &requirement, &witness, &SubstitutionMap::new(), false)?;
    let thunk = function(&s, symbol.as_str());
    expect!["@convention(thin) (@inout Counter) -> Int"].assert_eq(&thunk.ty.to_string());
    assert_eq!(thunk.count(|k| matches!(k, InstKind::Load { take: false, .. })), 1);

    let mut interp = Interpreter::new(&s.module);
    let receiver = interp.stack_slot(Value::Struct(vec![Value::Int(7)]));
    let result = interp.call(&symbol, vec![receiver.clone()])?;
    assert_eq!(result, Value::Int(7));
    assert_eq!(interp.take_slot(&receiver)?, Value::Struct(vec![Value::Int(7)]));
    Ok(())
}

#[test]
fn test_override_thunk_bridges_base_abstraction() -> miette::Result<()> {
    let mut s = session();
    let base = Arc::new(ClassDecl::new("Base"));
    let derived = Ty::Class(Arc::new(ClassDecl::new("Derived").with_superclass(base.clone())));
    let t = Ty::param(0, 0, "T");
    let pattern = AbstractionPattern::new(&Ty::function(Ty::tuple(vec![t.clone(), Ty::Class(base)]), t));
    let signature = FunctionTy::new(Ty::tuple(vec![Ty::int(), derived]), Ty::int());

    let attrs = MethodAttrs { guaranteed_self: true, ..Default::default() };
    let method = MethodDecl::new("twice", "Derived.twice", signature.clone()).with_attrs(attrs);
    define_method(&mut s, &method, |em, _, params| {
        let args = vec![params[0].value(), params[0].value()];
        Ok(em.b.emit(IrType::object(int()), InstKind::Builtin { op: BuiltinOp::IntAdd, args }))
    })?;

    let symbol = emit_override_thunk(&mut s, &method, &pattern, &signature, &signature)?;
    assert_eq!(symbol, Symbol::from("vtable_thunk_Derived.twice"));
    expect!["@convention(thin) (@in Int, @guaranteed Derived) -> @out Int"]
        .assert_eq(&function(&s, symbol.as_str()).ty.to_string());

    let mut interp = Interpreter::new(&s.module);
    let out = interp.stack_slot(Value::Uninit);
    let number = interp.stack_slot(Value::Int(21));
    let receiver = interp.instance("Derived");
    interp.call(&symbol, vec![out.clone(), number, receiver.clone()])?;
    assert_eq!(interp.take_slot(&out)?, Value::Int(42));
    assert_eq!(interp.refcount(&receiver), Some(1));
    interp.release(receiver)?;
    assert_eq!(interp.live_objects(), 0);
    Ok(())
}
