//! Reference interpreter.
//!
//! Executes [`IrFunction`]s against a reference-counted heap and a stack-slot memory. It exists to
//! check emitted code: every ownership mistake an emitter can make (a missing retain, a release too
//! many, reading a buffer that was moved from, leaking an initialized stack slot) is reported as an
//! [`InterpError`] instead of silently succeeding.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use strata_types::Symbol;
use thiserror::Error;

use crate::ir::{BuiltinOp, Inst, InstKind, IrFunction, IrModule, Literal, Region, ValueId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathElem {
    Field(usize),
    Payload,
    ExistentialPayload,
}

/// A location inside a stack slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub slot: usize,
    pub path: Vec<PathElem>,
}

impl Address {
    fn project(&self, elem: PathElem) -> Address {
        let mut path = self.path.clone();
        path.push(elem);
        Address { slot: self.slot, path }
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Uninit,
    Int(i64),
    Float(f64),
    Bool(bool),
    Object(ObjId),
    Tuple(Vec<Value>),
    Struct(Vec<Value>),
    Optional(Option<Box<Value>>),
    Function { symbol: Symbol, context: Option<ObjId> },
    Metatype(String),
    Existential { payload: Box<Value>, dynamic_type: String, conformances: Vec<String> },
    Address(Address),
}

impl Value {
    /// True when the value owns nothing: uninitialized memory, or trivial data that needs no destroy.
    fn is_vacant(&self) -> bool {
        match self {
            Value::Uninit
            | Value::Int(_)
            | Value::Float(_)
            | Value::Bool(_)
            | Value::Metatype(_)
            | Value::Address(_)
            | Value::Optional(None)
            | Value::Function { context: None, .. } => true,
            Value::Tuple(elements) | Value::Struct(elements) => elements.iter().all(Value::is_vacant),
            Value::Optional(Some(payload)) => payload.is_vacant(),
            Value::Object(_) | Value::Function { context: Some(_), .. } | Value::Existential { .. } => false,
        }
    }

    fn is_initialized(&self) -> bool {
        match self {
            Value::Uninit => false,
            Value::Tuple(elements) | Value::Struct(elements) => elements.iter().all(Value::is_initialized),
            Value::Optional(Some(payload)) => payload.is_initialized(),
            Value::Existential { payload, .. } => payload.is_initialized(),
            _ => true,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<&Address> {
        match self {
            Value::Address(addr) => Some(addr),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Diagnostic, Clone, PartialEq, Eq)]
pub enum InterpError {
    #[error("object {0:?} released after it was freed")]
    #[diagnostic(code(strata_ir::double_release))]
    DoubleRelease(ObjId),

    #[error("object {0:?} used after it was freed")]
    #[diagnostic(code(strata_ir::use_after_free))]
    UseAfterFree(ObjId),

    #[error("read of uninitialized memory in `{function}`")]
    #[diagnostic(code(strata_ir::uninitialized_read))]
    UninitializedRead { function: Symbol },

    #[error("initializing store overwrites live memory in `{function}`")]
    #[diagnostic(code(strata_ir::overwrite_initialized))]
    OverwriteInitialized { function: Symbol },

    #[error("stack slot deallocated while still initialized in `{function}`")]
    #[diagnostic(code(strata_ir::stack_slot_not_empty))]
    StackSlotNotEmpty { function: Symbol },

    #[error("trap: {0}")]
    #[diagnostic(code(strata_ir::trap))]
    Trap(String),

    #[error("unknown function `{0}`")]
    #[diagnostic(code(strata_ir::unknown_function))]
    UnknownFunction(Symbol),

    #[error("malformed IR in `{function}`: {message}")]
    #[diagnostic(code(strata_ir::malformed))]
    Malformed { function: Symbol, message: String },
}

#[derive(Debug)]
enum ObjPayload {
    Str(String),
    Instance { class: Symbol },
    Context { captures: Vec<Value> },
}

#[derive(Debug)]
struct HeapObject {
    refcount: u32,
    payload: ObjPayload,
}

struct Frame<'f> {
    function: &'f IrFunction,
    values: FxHashMap<ValueId, Value>,
}

impl<'f> Frame<'f> {
    fn malformed(&self, message: impl Into<String>) -> InterpError {
        InterpError::Malformed { function: self.function.name.clone(), message: message.into() }
    }

    fn get(&self, id: ValueId) -> Result<Value, InterpError> {
        self.values.get(&id).cloned().ok_or_else(|| self.malformed(format!("{} is not defined", id)))
    }

    fn addr(&self, id: ValueId) -> Result<Address, InterpError> {
        match self.get(id)? {
            Value::Address(addr) => Ok(addr),
            other => Err(self.malformed(format!("{} is not an address: {:?}", id, other))),
        }
    }
}

enum Flow {
    Continue,
    Return(Value),
}

/// Runs functions of one [`IrModule`].
pub struct Interpreter<'m> {
    module: &'m IrModule,
    heap: Vec<Option<HeapObject>>,
    slots: Vec<Value>,
}

impl<'m> Interpreter<'m> {
    pub fn new(module: &'m IrModule) -> Self {
        Interpreter { module, heap: Vec::new(), slots: Vec::new() }
    }

    fn allocate(&mut self, payload: ObjPayload) -> ObjId {
        let id = ObjId(self.heap.len() as u32);
        self.heap.push(Some(HeapObject { refcount: 1, payload }));
        id
    }

    /// A fresh string at +1.
    pub fn string(&mut self, s: &str) -> Value {
        Value::Object(self.allocate(ObjPayload::Str(s.to_string())))
    }

    /// A fresh class instance at +1.
    pub fn instance(&mut self, class: impl Into<Symbol>) -> Value {
        Value::Object(self.allocate(ObjPayload::Instance { class: class.into() }))
    }

    /// A stack slot initialized with `value`, for passing indirect arguments.
    pub fn stack_slot(&mut self, value: Value) -> Value {
        self.slots.push(value);
        Value::Address(Address { slot: self.slots.len() - 1, path: Vec::new() })
    }

    /// Moves the value out of a slot created by [`Interpreter::stack_slot`].
    pub fn take_slot(&mut self, addr: &Value) -> Result<Value, InterpError> {
        let addr = addr.as_address().cloned().ok_or_else(|| InterpError::Malformed {
            function: Symbol::from("<host>"),
            message: "take_slot of a non-address".to_string(),
        })?;
        self.take(&addr, &Symbol::from("<host>"))
    }

    pub fn live_objects(&self) -> usize {
        self.heap.iter().filter(|o| o.is_some()).count()
    }

    pub fn refcount(&self, value: &Value) -> Option<u32> {
        match value {
            Value::Object(id) => self.heap.get(id.0 as usize)?.as_ref().map(|o| o.refcount),
            _ => None,
        }
    }

    pub fn read_string(&self, value: &Value) -> Result<String, InterpError> {
        match value {
            Value::Object(id) => match self.heap.get(id.0 as usize).and_then(Option::as_ref) {
                Some(HeapObject { payload: ObjPayload::Str(s), .. }) => Ok(s.clone()),
                Some(_) => Err(InterpError::Trap(format!("object {:?} is not a string", id))),
                None => Err(InterpError::UseAfterFree(*id)),
            },
            other => Err(InterpError::Trap(format!("{:?} is not a string", other))),
        }
    }

    pub fn class_of(&self, value: &Value) -> Result<Symbol, InterpError> {
        match value {
            Value::Object(id) => match self.heap.get(id.0 as usize).and_then(Option::as_ref) {
                Some(HeapObject { payload: ObjPayload::Instance { class }, .. }) => Ok(class.clone()),
                Some(_) => Err(InterpError::Trap(format!("object {:?} is not a class instance", id))),
                None => Err(InterpError::UseAfterFree(*id)),
            },
            other => Err(InterpError::Trap(format!("{:?} is not a class instance", other))),
        }
    }

    fn retain_object(&mut self, id: ObjId) -> Result<(), InterpError> {
        match self.heap.get_mut(id.0 as usize).and_then(Option::as_mut) {
            Some(object) => {
                object.refcount += 1;
                Ok(())
            }
            None => Err(InterpError::UseAfterFree(id)),
        }
    }

    fn release_object(&mut self, id: ObjId) -> Result<(), InterpError> {
        let slot = self.heap.get_mut(id.0 as usize).ok_or(InterpError::DoubleRelease(id))?;
        let object = slot.as_mut().ok_or(InterpError::DoubleRelease(id))?;
        object.refcount -= 1;
        if object.refcount == 0 {
            if let Some(HeapObject { payload: ObjPayload::Context { captures }, .. }) = slot.take() {
                for capture in captures {
                    self.release(capture)?;
                }
            }
        }
        Ok(())
    }

    /// Adds one reference to every object `value` holds.
    pub fn retain(&mut self, value: &Value) -> Result<(), InterpError> {
        match value {
            Value::Object(id) => self.retain_object(*id),
            Value::Function { context: Some(id), .. } => self.retain_object(*id),
            Value::Tuple(elements) | Value::Struct(elements) => {
                elements.iter().try_for_each(|element| self.retain(element))
            }
            Value::Optional(Some(payload)) => self.retain(payload),
            Value::Existential { payload, .. } => self.retain(payload),
            _ => Ok(()),
        }
    }

    /// Drops one reference to every object `value` holds.
    pub fn release(&mut self, value: Value) -> Result<(), InterpError> {
        match value {
            Value::Object(id) => self.release_object(id),
            Value::Function { context: Some(id), .. } => self.release_object(id),
            Value::Tuple(elements) | Value::Struct(elements) => {
                elements.into_iter().try_for_each(|element| self.release(element))
            }
            Value::Optional(Some(payload)) => self.release(*payload),
            Value::Existential { payload, .. } => self.release(*payload),
            _ => Ok(()),
        }
    }

    fn place(&mut self, addr: &Address, create: bool, function: &Symbol) -> Result<&mut Value, InterpError> {
        let uninit = || InterpError::UninitializedRead { function: function.clone() };
        let mut place = self.slots.get_mut(addr.slot).ok_or_else(uninit)?;
        for elem in &addr.path {
            place = match (elem, place) {
                (PathElem::Field(i), place @ Value::Uninit) if create => {
                    *place = Value::Tuple(vec![Value::Uninit; i + 1]);
                    match place {
                        Value::Tuple(elements) => &mut elements[*i],
                        _ => return Err(uninit()),
                    }
                }
                (PathElem::Field(i), Value::Tuple(elements) | Value::Struct(elements)) => {
                    if *i >= elements.len() {
                        if !create {
                            return Err(uninit());
                        }
                        elements.resize(i + 1, Value::Uninit);
                    }
                    &mut elements[*i]
                }
                (PathElem::Payload, place @ Value::Uninit) if create => {
                    *place = Value::Optional(Some(Box::new(Value::Uninit)));
                    match place {
                        Value::Optional(Some(payload)) => payload.as_mut(),
                        _ => return Err(uninit()),
                    }
                }
                (PathElem::Payload, Value::Optional(Some(payload))) => payload.as_mut(),
                (PathElem::Payload, Value::Optional(None)) => {
                    return Err(InterpError::Trap("projected the payload of an empty optional".to_string()))
                }
                (PathElem::ExistentialPayload, Value::Existential { payload, .. }) => payload.as_mut(),
                _ => return Err(uninit()),
            };
        }
        Ok(place)
    }

    fn read(&mut self, addr: &Address, function: &Symbol) -> Result<Value, InterpError> {
        let place = self.place(addr, false, function)?;
        if !place.is_initialized() {
            return Err(InterpError::UninitializedRead { function: function.clone() });
        }
        Ok(place.clone())
    }

    fn take(&mut self, addr: &Address, function: &Symbol) -> Result<Value, InterpError> {
        let place = self.place(addr, false, function)?;
        if !place.is_initialized() {
            return Err(InterpError::UninitializedRead { function: function.clone() });
        }
        Ok(std::mem::replace(place, Value::Uninit))
    }

    fn init(&mut self, addr: &Address, value: Value, function: &Symbol) -> Result<(), InterpError> {
        let place = self.place(addr, true, function)?;
        if !place.is_vacant() {
            return Err(InterpError::OverwriteInitialized { function: function.clone() });
        }
        *place = value;
        Ok(())
    }

    /// Calls a function by name.
    pub fn call(&mut self, name: &Symbol, args: Vec<Value>) -> Result<Value, InterpError> {
        let module = self.module;
        let function = module.function(name).ok_or_else(|| InterpError::UnknownFunction(name.clone()))?;
        self.run(function, args)
    }

    /// Calls a function value, consuming its context.
    pub fn call_value(&mut self, callee: &Value, mut args: Vec<Value>) -> Result<Value, InterpError> {
        match callee {
            Value::Function { symbol, context } => {
                if let Some(context) = context {
                    let captures = match self.heap.get(context.0 as usize).and_then(Option::as_ref) {
                        Some(HeapObject { payload: ObjPayload::Context { captures }, .. }) => captures.clone(),
                        Some(_) => return Err(InterpError::Trap("callee context is not a closure".to_string())),
                        None => return Err(InterpError::UseAfterFree(*context)),
                    };
                    for capture in &captures {
                        self.retain(capture)?;
                    }
                    self.release_object(*context)?;
                    args.extend(captures);
                }
                self.call(symbol, args)
            }
            other => Err(InterpError::Trap(format!("called a non-function value {:?}", other))),
        }
    }

    fn run(&mut self, function: &IrFunction, args: Vec<Value>) -> Result<Value, InterpError> {
        if args.len() != function.params.len() {
            return Err(InterpError::Malformed {
                function: function.name.clone(),
                message: format!("expected {} arguments, got {}", function.params.len(), args.len()),
            });
        }
        log::trace!("interp: entering `{}`", function.name);
        let mut frame = Frame { function, values: function.params.iter().copied().zip(args).collect() };
        match self.exec_block(&mut frame, &function.body)? {
            Flow::Return(value) => Ok(value),
            Flow::Continue => Err(frame.malformed("fell off the end of the function")),
        }
    }

    fn exec_block(&mut self, frame: &mut Frame<'_>, insts: &[Inst]) -> Result<Flow, InterpError> {
        for inst in insts {
            if let Flow::Return(value) = self.exec(frame, inst)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Continue)
    }

    fn exec_region(&mut self, frame: &mut Frame<'_>, region: &Region) -> Result<Option<Value>, InterpError> {
        if let Flow::Return(_) = self.exec_block(frame, &region.insts)? {
            return Err(frame.malformed("return inside a region"));
        }
        region.result.map(|result| frame.get(result)).transpose()
    }

    fn exec(&mut self, frame: &mut Frame<'_>, inst: &Inst) -> Result<Flow, InterpError> {
        let name = frame.function.name.clone();
        let result = match &inst.kind {
            InstKind::FunctionRef { symbol } => Value::Function { symbol: symbol.clone(), context: None },
            InstKind::PartialApply { callee, args } => {
                let symbol = match frame.get(*callee)? {
                    Value::Function { symbol, context: None } => symbol,
                    other => return Err(frame.malformed(format!("partial_apply of {:?}", other))),
                };
                let captures = args.iter().map(|a| frame.get(*a)).collect::<Result<Vec<_>, _>>()?;
                let context = self.allocate(ObjPayload::Context { captures });
                Value::Function { symbol, context: Some(context) }
            }
            InstKind::ThinToThick { value }
            | InstKind::ConvertFunction { value }
            | InstKind::Upcast { value }
            | InstKind::UncheckedRefCast { value }
            | InstKind::UncheckedBitCast { value }
            | InstKind::ClassMetatypeToObject { value }
            | InstKind::ExistentialMetatypeToObject { value }
            | InstKind::ProtocolMetatypeToObject { value } => frame.get(*value)?,
            InstKind::UncheckedAddrCast { addr } => Value::Address(frame.addr(*addr)?),
            InstKind::Apply { callee, args } => {
                let callee = frame.get(*callee)?;
                let args = args.iter().map(|a| frame.get(*a)).collect::<Result<Vec<_>, _>>()?;
                self.call_value(&callee, args)?
            }
            InstKind::ClassMethod { receiver, method } => {
                let receiver = frame.get(*receiver)?;
                let class = self.class_of(&receiver)?;
                let symbol = self
                    .module
                    .vtables
                    .get(&class)
                    .and_then(|table| table.get(method))
                    .cloned()
                    .ok_or_else(|| InterpError::Trap(format!("no vtable entry for {}.{}", class, method)))?;
                Value::Function { symbol, context: None }
            }
            InstKind::DynamicMethod { method } => {
                let symbol = self.module.dynamic_replacements.get(method).cloned().unwrap_or_else(|| method.clone());
                Value::Function { symbol, context: None }
            }
            InstKind::Literal(literal) => match literal {
                Literal::Int(v) => Value::Int(*v),
                Literal::Float(v) => Value::Float(*v),
                Literal::Bool(v) => Value::Bool(*v),
                Literal::Str(s) => self.string(s),
            },
            InstKind::Builtin { op, args } => {
                let ints = args
                    .iter()
                    .map(|a| frame.get(*a)?.as_int().ok_or_else(|| frame.malformed("builtin operand is not an Int")))
                    .collect::<Result<Vec<_>, _>>()?;
                match (op, ints.as_slice()) {
                    (BuiltinOp::IntAdd, [a, b]) => Value::Int(a.wrapping_add(*b)),
                    (BuiltinOp::IntLessThan, [a, b]) => Value::Bool(a < b),
                    (BuiltinOp::IntEqual, [a, b]) => Value::Bool(a == b),
                    _ => return Err(frame.malformed("builtin arity")),
                }
            }
            InstKind::AllocRef { class } => self.instance(class.clone()),
            InstKind::Load { addr, take } => {
                let addr = frame.addr(*addr)?;
                if *take {
                    self.take(&addr, &name)?
                } else {
                    let value = self.read(&addr, &name)?;
                    self.retain(&value)?;
                    value
                }
            }
            InstKind::Store { value, addr } => {
                let value = frame.get(*value)?;
                let addr = frame.addr(*addr)?;
                self.init(&addr, value, &name)?;
                return Ok(Flow::Continue);
            }
            InstKind::CopyAddr { src, dest, take } => {
                let src = frame.addr(*src)?;
                let dest = frame.addr(*dest)?;
                let value = if *take {
                    self.take(&src, &name)?
                } else {
                    let value = self.read(&src, &name)?;
                    self.retain(&value)?;
                    value
                };
                self.init(&dest, value, &name)?;
                return Ok(Flow::Continue);
            }
            InstKind::RetainValue { value } | InstKind::RetainAutoreleased { value } => {
                let value = frame.get(*value)?;
                self.retain(&value)?;
                return Ok(Flow::Continue);
            }
            InstKind::ReleaseValue { value } => {
                let value = frame.get(*value)?;
                self.release(value)?;
                return Ok(Flow::Continue);
            }
            InstKind::DestroyAddr { addr } => {
                let addr = frame.addr(*addr)?;
                let value = self.take(&addr, &name)?;
                self.release(value)?;
                return Ok(Flow::Continue);
            }
            InstKind::AllocStack => {
                self.slots.push(Value::Uninit);
                Value::Address(Address { slot: self.slots.len() - 1, path: Vec::new() })
            }
            InstKind::DeallocStack { addr } => {
                let addr = frame.addr(*addr)?;
                let vacant = self.slots.get(addr.slot).map_or(false, Value::is_vacant);
                if !vacant {
                    return Err(InterpError::StackSlotNotEmpty { function: name });
                }
                return Ok(Flow::Continue);
            }
            InstKind::Tuple { elements } => {
                Value::Tuple(elements.iter().map(|e| frame.get(*e)).collect::<Result<_, _>>()?)
            }
            InstKind::Struct { fields, .. } => {
                Value::Struct(fields.iter().map(|e| frame.get(*e)).collect::<Result<_, _>>()?)
            }
            InstKind::TupleExtract { tuple: aggregate, index }
            | InstKind::StructExtract { value: aggregate, index } => {
                match frame.get(*aggregate)? {
                    Value::Tuple(mut elements) | Value::Struct(mut elements) if *index < elements.len() => {
                        elements.swap_remove(*index)
                    }
                    other => return Err(frame.malformed(format!("extract {} from {:?}", index, other))),
                }
            }
            InstKind::TupleElementAddr { addr, index } => {
                Value::Address(frame.addr(*addr)?.project(PathElem::Field(*index)))
            }
            InstKind::EnumSome { value } => Value::Optional(Some(Box::new(frame.get(*value)?))),
            InstKind::EnumNone => Value::Optional(None),
            InstKind::UncheckedEnumData { value } => match frame.get(*value)? {
                Value::Optional(Some(payload)) => *payload,
                _ => return Err(InterpError::Trap("unchecked_enum_data of an empty optional".to_string())),
            },
            InstKind::InitEnumDataAddr { addr } | InstKind::UncheckedTakeEnumDataAddr { addr } => {
                Value::Address(frame.addr(*addr)?.project(PathElem::Payload))
            }
            InstKind::InjectEnumAddr { addr, some } => {
                let addr = frame.addr(*addr)?;
                if *some {
                    let place = self.place(&addr, false, &name)?;
                    if !matches!(place, Value::Optional(Some(_))) || !place.is_initialized() {
                        return Err(InterpError::UninitializedRead { function: name });
                    }
                } else {
                    self.init(&addr, Value::Optional(None), &name)?;
                }
                return Ok(Flow::Continue);
            }
            InstKind::IsNone { value } => match frame.get(*value)? {
                Value::Optional(payload) => Value::Bool(payload.is_none()),
                other => return Err(frame.malformed(format!("is_none of {:?}", other))),
            },
            InstKind::IsNoneAddr { addr } => {
                let addr = frame.addr(*addr)?;
                match self.place(&addr, false, &name)? {
                    Value::Optional(payload) => Value::Bool(payload.is_none()),
                    _ => return Err(InterpError::UninitializedRead { function: name }),
                }
            }
            InstKind::CondFail { cond, message } => {
                if frame.get(*cond)?.as_bool() == Some(true) {
                    return Err(InterpError::Trap(message.clone()));
                }
                return Ok(Flow::Continue);
            }
            InstKind::If { cond, then_region, else_region } => {
                let cond = frame.get(*cond)?.as_bool().ok_or_else(|| frame.malformed("if on a non-Bool"))?;
                let region = if cond { then_region } else { else_region };
                match self.exec_region(frame, region)? {
                    Some(value) => value,
                    None => return Ok(Flow::Continue),
                }
            }
            InstKind::Metatype { ty } => Value::Metatype(ty.to_string()),
            InstKind::InitExistentialAddr { addr, concrete, conformances } => {
                let addr = frame.addr(*addr)?;
                let container = Value::Existential {
                    payload: Box::new(Value::Uninit),
                    dynamic_type: concrete.to_string(),
                    conformances: conformances.iter().map(|c| c.protocol.name.to_string()).collect(),
                };
                self.init(&addr, container, &name)?;
                Value::Address(addr.project(PathElem::ExistentialPayload))
            }
            InstKind::InitExistentialRef { value, concrete, conformances } => Value::Existential {
                payload: Box::new(frame.get(*value)?),
                dynamic_type: concrete.to_string(),
                conformances: conformances.iter().map(|c| c.protocol.name.to_string()).collect(),
            },
            InstKind::InitExistentialMetatype { value, conformances } => {
                let payload = frame.get(*value)?;
                let dynamic_type = match &payload {
                    Value::Metatype(name) => name.clone(),
                    _ => String::new(),
                };
                Value::Existential {
                    payload: Box::new(payload),
                    dynamic_type,
                    conformances: conformances.iter().map(|c| c.protocol.name.to_string()).collect(),
                }
            }
            InstKind::OpenExistentialAddr { addr } => {
                Value::Address(frame.addr(*addr)?.project(PathElem::ExistentialPayload))
            }
            InstKind::OpenExistentialRef { value } | InstKind::OpenExistentialMetatype { value } => {
                match frame.get(*value)? {
                    Value::Existential { payload, .. } => *payload,
                    other => return Err(frame.malformed(format!("open of non-existential {:?}", other))),
                }
            }
            InstKind::DeinitExistentialAddr { addr } => {
                let addr = frame.addr(*addr)?;
                let place = self.place(&addr, false, &name)?;
                if !matches!(place, Value::Existential { payload, .. } if payload.is_vacant()) {
                    return Err(InterpError::OverwriteInitialized { function: name });
                }
                *place = Value::Uninit;
                return Ok(Flow::Continue);
            }
            InstKind::Return { value } => return Ok(Flow::Return(frame.get(*value)?)),
        };
        match inst.dest {
            Some(dest) => {
                frame.values.insert(dest, result);
                Ok(Flow::Continue)
            }
            None => Err(frame.malformed("value-producing instruction without a destination")),
        }
    }
}
