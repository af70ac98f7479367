//! Textual rendering of IR, used by logging and snapshot tests.

use std::fmt::{self, Write};

use crate::ir::{BuiltinOp, Inst, InstKind, IrFunction, IrModule, Literal, Region, ValueId};

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

fn list(ids: &[ValueId]) -> String {
    ids.iter().map(ValueId::to_string).collect::<Vec<_>>().join(", ")
}

struct Printer<'f> {
    function: &'f IrFunction,
    out: String,
}

impl<'f> Printer<'f> {
    fn ty(&self, id: ValueId) -> String {
        self.function.value_type(id).map_or_else(|| "$<?>".to_string(), |t| t.to_string())
    }

    fn region(&mut self, region: &Region, depth: usize) -> fmt::Result {
        for inst in &region.insts {
            self.inst(inst, depth)?;
        }
        if let Some(result) = region.result {
            writeln!(self.out, "{:width$}yield {}", "", result, width = depth * 2)?;
        }
        Ok(())
    }

    fn inst(&mut self, inst: &Inst, depth: usize) -> fmt::Result {
        let pad = depth * 2;
        write!(self.out, "{:pad$}", "")?;
        if let Some(dest) = inst.dest {
            write!(self.out, "{} = ", dest)?;
        }
        let text = match &inst.kind {
            InstKind::FunctionRef { symbol } => format!("function_ref @{}", symbol),
            InstKind::PartialApply { callee, args } => format!("partial_apply {}({})", callee, list(args)),
            InstKind::ThinToThick { value } => format!("thin_to_thick_function {}", value),
            InstKind::ConvertFunction { value } => format!("convert_function {}", value),
            InstKind::Apply { callee, args } => format!("apply {}({})", callee, list(args)),
            InstKind::ClassMethod { receiver, method } => format!("class_method {}, #{}", receiver, method),
            InstKind::DynamicMethod { method } => format!("dynamic_function_ref #{}", method),
            InstKind::Literal(Literal::Int(v)) => format!("integer_literal {}", v),
            InstKind::Literal(Literal::Float(v)) => format!("float_literal {}", v),
            InstKind::Literal(Literal::Bool(v)) => format!("integer_literal {}", *v as u8),
            InstKind::Literal(Literal::Str(s)) => format!("string_literal {:?}", s),
            InstKind::Builtin { op, args } => {
                let name = match op {
                    BuiltinOp::IntAdd => "add",
                    BuiltinOp::IntLessThan => "cmp_slt",
                    BuiltinOp::IntEqual => "cmp_eq",
                };
                format!("builtin \"{}\"({})", name, list(args))
            }
            InstKind::AllocRef { class } => format!("alloc_ref ${}", class),
            InstKind::Load { addr, take } => {
                format!("load {}{}", if *take { "[take] " } else { "[copy] " }, addr)
            }
            InstKind::Store { value, addr } => format!("store {} to [init] {}", value, addr),
            InstKind::CopyAddr { src, dest, take } => format!(
                "copy_addr {}{} to [initialization] {}",
                if *take { "[take] " } else { "" },
                src,
                dest
            ),
            InstKind::RetainValue { value } => format!("retain_value {}", value),
            InstKind::RetainAutoreleased { value } => format!("strong_retain_autoreleased {}", value),
            InstKind::ReleaseValue { value } => format!("release_value {}", value),
            InstKind::DestroyAddr { addr } => format!("destroy_addr {}", addr),
            InstKind::AllocStack => "alloc_stack".to_string(),
            InstKind::DeallocStack { addr } => format!("dealloc_stack {}", addr),
            InstKind::Tuple { elements } => format!("tuple ({})", list(elements)),
            InstKind::TupleExtract { tuple, index } => format!("tuple_extract {}, {}", tuple, index),
            InstKind::TupleElementAddr { addr, index } => format!("tuple_element_addr {}, {}", addr, index),
            InstKind::Struct { decl, fields } => format!("struct ${} ({})", decl, list(fields)),
            InstKind::StructExtract { value, index } => format!("struct_extract {}, {}", value, index),
            InstKind::EnumSome { value } => format!("enum #Optional.some, {}", value),
            InstKind::EnumNone => "enum #Optional.none".to_string(),
            InstKind::UncheckedEnumData { value } => format!("unchecked_enum_data {}", value),
            InstKind::InitEnumDataAddr { addr } => format!("init_enum_data_addr {}", addr),
            InstKind::UncheckedTakeEnumDataAddr { addr } => format!("unchecked_take_enum_data_addr {}", addr),
            InstKind::InjectEnumAddr { addr, some } => {
                format!("inject_enum_addr {}, #Optional.{}", addr, if *some { "some" } else { "none" })
            }
            InstKind::IsNone { value } => format!("is_none {}", value),
            InstKind::IsNoneAddr { addr } => format!("is_none_addr {}", addr),
            InstKind::CondFail { cond, message } => format!("cond_fail {}, {:?}", cond, message),
            InstKind::If { cond, then_region, else_region } => {
                writeln!(self.out, "if {} {{", cond)?;
                self.region(then_region, depth + 1)?;
                writeln!(self.out, "{:pad$}}} else {{", "")?;
                self.region(else_region, depth + 1)?;
                writeln!(self.out, "{:pad$}}}", "")?;
                return Ok(());
            }
            InstKind::Upcast { value } => format!("upcast {}", value),
            InstKind::UncheckedRefCast { value } => format!("unchecked_ref_cast {}", value),
            InstKind::UncheckedBitCast { value } => format!("unchecked_bitwise_cast {}", value),
            InstKind::UncheckedAddrCast { addr } => format!("unchecked_addr_cast {}", addr),
            InstKind::Metatype { ty } => format!("metatype {}.Type", ty),
            InstKind::ClassMetatypeToObject { value } => format!("thick_to_objc_metatype {}", value),
            InstKind::ExistentialMetatypeToObject { value } => format!("existential_metatype_to_object {}", value),
            InstKind::ProtocolMetatypeToObject { value } => format!("objc_protocol {}", value),
            InstKind::InitExistentialAddr { addr, concrete, conformances } => format!(
                "init_existential_addr {}, ${} [{}]",
                addr,
                concrete,
                conformances.iter().map(|c| c.protocol.name.to_string()).collect::<Vec<_>>().join(", ")
            ),
            InstKind::InitExistentialRef { value, concrete, conformances } => format!(
                "init_existential_ref {}, ${} [{}]",
                value,
                concrete,
                conformances.iter().map(|c| c.protocol.name.to_string()).collect::<Vec<_>>().join(", ")
            ),
            InstKind::InitExistentialMetatype { value, conformances } => format!(
                "init_existential_metatype {} [{}]",
                value,
                conformances.iter().map(|c| c.protocol.name.to_string()).collect::<Vec<_>>().join(", ")
            ),
            InstKind::OpenExistentialAddr { addr } => format!("open_existential_addr {}", addr),
            InstKind::OpenExistentialRef { value } => format!("open_existential_ref {}", value),
            InstKind::OpenExistentialMetatype { value } => format!("open_existential_metatype {}", value),
            InstKind::DeinitExistentialAddr { addr } => format!("deinit_existential_addr {}", addr),
            InstKind::Return { value } => format!("return {}", value),
        };
        match inst.dest {
            Some(dest) => writeln!(self.out, "{} : {}", text, self.ty(dest)),
            None => writeln!(self.out, "{}", text),
        }
    }
}

impl fmt::Display for IrFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "sil @{} : ${} {{", self.name, self.ty)?;
        let params = self
            .params
            .iter()
            .map(|p| format!("{} : {}", p, self.value_type(*p).map_or_else(String::new, |t| t.to_string())))
            .collect::<Vec<_>>()
            .join(", ");
        writeln!(f, "bb0({}):", params)?;
        let mut printer = Printer { function: self, out: String::new() };
        printer.region(&Region { insts: self.body.clone(), result: None }, 1)?;
        write!(f, "{}", printer.out)?;
        writeln!(f, "}}")
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, function) in self.functions.values().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", function)?;
        }
        Ok(())
    }
}
