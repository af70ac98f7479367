use std::sync::Arc;

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use strata_layout::{FnRep, IrType};
use strata_types::{GenericEnvironment, ProtocolConformance, Symbol, Ty};

use crate::IrError;

/// An SSA value local to one [`IrFunction`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueId(pub u32);

impl ValueId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(i64),
    Float(f64),
    Bool(bool),
    /// Allocates a fresh string at +1.
    Str(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinOp {
    IntAdd,
    IntLessThan,
    IntEqual,
}

/// A structured block. `result` names the value the region yields to its enclosing `if`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Region {
    pub insts: Vec<Inst>,
    pub result: Option<ValueId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Inst {
    pub dest: Option<ValueId>,
    pub kind: InstKind,
}

/// The instruction set.
///
/// Ownership is explicit: SSA uses never copy. `load` without `take`, `copy_addr` without `take`,
/// `retain_value` and `retain_autoreleased` are the only instructions that add a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum InstKind {
    FunctionRef { symbol: Symbol },
    /// Captures `args` (consumed) into a fresh context for the thin `callee`.
    PartialApply { callee: ValueId, args: Vec<ValueId> },
    ThinToThick { value: ValueId },
    /// Reinterprets a function value under an ABI-compatible signature.
    ConvertFunction { value: ValueId },
    /// Calls `callee`. A thick callee's context is consumed by the call.
    Apply { callee: ValueId, args: Vec<ValueId> },
    ClassMethod { receiver: ValueId, method: Symbol },
    DynamicMethod { method: Symbol },
    Literal(Literal),
    Builtin { op: BuiltinOp, args: Vec<ValueId> },
    AllocRef { class: Symbol },

    Load { addr: ValueId, take: bool },
    /// Initializes uninitialized memory, consuming `value`.
    Store { value: ValueId, addr: ValueId },
    CopyAddr { src: ValueId, dest: ValueId, take: bool },
    RetainValue { value: ValueId },
    RetainAutoreleased { value: ValueId },
    ReleaseValue { value: ValueId },
    DestroyAddr { addr: ValueId },
    AllocStack,
    DeallocStack { addr: ValueId },

    Tuple { elements: Vec<ValueId> },
    TupleExtract { tuple: ValueId, index: usize },
    TupleElementAddr { addr: ValueId, index: usize },
    Struct { decl: Symbol, fields: Vec<ValueId> },
    StructExtract { value: ValueId, index: usize },

    EnumSome { value: ValueId },
    EnumNone,
    UncheckedEnumData { value: ValueId },
    InitEnumDataAddr { addr: ValueId },
    UncheckedTakeEnumDataAddr { addr: ValueId },
    InjectEnumAddr { addr: ValueId, some: bool },
    IsNone { value: ValueId },
    IsNoneAddr { addr: ValueId },

    /// Traps when `cond` is true.
    CondFail { cond: ValueId, message: String },
    If { cond: ValueId, then_region: Region, else_region: Region },

    Upcast { value: ValueId },
    UncheckedRefCast { value: ValueId },
    UncheckedBitCast { value: ValueId },
    UncheckedAddrCast { addr: ValueId },

    Metatype { ty: Ty },
    ClassMetatypeToObject { value: ValueId },
    ExistentialMetatypeToObject { value: ValueId },
    ProtocolMetatypeToObject { value: ValueId },

    /// Prepares an existential buffer for `concrete` and yields the payload address.
    InitExistentialAddr { addr: ValueId, concrete: Ty, conformances: Vec<ProtocolConformance> },
    InitExistentialRef { value: ValueId, concrete: Ty, conformances: Vec<ProtocolConformance> },
    InitExistentialMetatype { value: ValueId, conformances: Vec<ProtocolConformance> },
    OpenExistentialAddr { addr: ValueId },
    OpenExistentialRef { value: ValueId },
    OpenExistentialMetatype { value: ValueId },
    /// Releases the existential container once its payload has been moved out.
    DeinitExistentialAddr { addr: ValueId },

    Return { value: ValueId },
}

/// A function definition.
///
/// When the signature returns indirectly, the first parameter is the result buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct IrFunction {
    pub name: Symbol,
    pub ty: Arc<FnRep>,
    pub params: Vec<ValueId>,
    pub values: Vec<IrType>,
    pub body: Vec<Inst>,
    pub generic_env: Option<GenericEnvironment>,
}

impl IrFunction {
    pub fn value_type(&self, id: ValueId) -> Option<&IrType> {
        self.values.get(id.index())
    }

    /// Every instruction, regions included, in program order.
    pub fn instructions(&self) -> Vec<&Inst> {
        fn walk<'a>(insts: &'a [Inst], out: &mut Vec<&'a Inst>) {
            for inst in insts {
                out.push(inst);
                if let InstKind::If { then_region, else_region, .. } = &inst.kind {
                    walk(&then_region.insts, out);
                    walk(&else_region.insts, out);
                }
            }
        }
        let mut out = Vec::new();
        walk(&self.body, &mut out);
        out
    }

    pub fn count(&self, pred: impl Fn(&InstKind) -> bool) -> usize {
        self.instructions().into_iter().filter(|inst| pred(&inst.kind)).count()
    }
}

/// The functions and dispatch tables produced in one session.
#[derive(Debug, Clone, Default)]
pub struct IrModule {
    pub functions: IndexMap<Symbol, IrFunction>,
    /// Class name to method name to implementation.
    pub vtables: FxHashMap<Symbol, FxHashMap<Symbol, Symbol>>,
    /// Replacement implementations for dynamically replaceable methods.
    pub dynamic_replacements: FxHashMap<Symbol, Symbol>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_function(&mut self, function: IrFunction) -> Result<(), IrError> {
        if self.functions.contains_key(&function.name) {
            return Err(IrError::DuplicateFunction(function.name));
        }
        log::trace!("installing `{}`", function.name);
        self.functions.insert(function.name.clone(), function);
        Ok(())
    }

    pub fn function(&self, name: &Symbol) -> Option<&IrFunction> {
        self.functions.get(name)
    }

    pub fn contains(&self, name: &Symbol) -> bool {
        self.functions.contains_key(name)
    }

    pub fn set_vtable_entry(
        &mut self,
        class: impl Into<Symbol>,
        method: impl Into<Symbol>,
        implementation: impl Into<Symbol>,
    ) {
        self.vtables.entry(class.into()).or_default().insert(method.into(), implementation.into());
    }

    pub fn set_dynamic_replacement(&mut self, method: impl Into<Symbol>, replacement: impl Into<Symbol>) {
        self.dynamic_replacements.insert(method.into(), replacement.into());
    }
}
