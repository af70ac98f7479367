//! Nominal declarations referenced by formal types.

use std::sync::Arc;

use crate::ty::{FunctionTy, Ty};
use crate::Symbol;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StructDecl {
    pub name: Symbol,
    pub fields: Vec<Ty>,
    pub conformances: Vec<Arc<ProtocolDecl>>,
}

impl StructDecl {
    pub fn new(name: impl Into<Symbol>, fields: Vec<Ty>) -> Self {
        StructDecl { name: name.into(), fields, conformances: Vec::new() }
    }

    pub fn conforming_to(mut self, protocol: Arc<ProtocolDecl>) -> Self {
        self.conformances.push(protocol);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassDecl {
    pub name: Symbol,
    pub module: Symbol,
    pub superclass: Option<Arc<ClassDecl>>,
    /// Declared by a foreign (non-native) object model.
    pub is_foreign: bool,
    pub is_final: bool,
    pub conformances: Vec<Arc<ProtocolDecl>>,
}

impl ClassDecl {
    pub fn new(name: impl Into<Symbol>) -> Self {
        ClassDecl {
            name: name.into(),
            module: Symbol::from("main"),
            superclass: None,
            is_foreign: false,
            is_final: false,
            conformances: Vec::new(),
        }
    }

    pub fn with_superclass(mut self, superclass: Arc<ClassDecl>) -> Self {
        self.superclass = Some(superclass);
        self
    }

    pub fn in_module(mut self, module: impl Into<Symbol>) -> Self {
        self.module = module.into();
        self
    }

    pub fn foreign(mut self) -> Self {
        self.is_foreign = true;
        self
    }

    pub fn final_class(mut self) -> Self {
        self.is_final = true;
        self
    }

    pub fn conforming_to(mut self, protocol: Arc<ProtocolDecl>) -> Self {
        self.conformances.push(protocol);
        self
    }

    pub fn is_protocol_class(&self) -> bool {
        self.name.as_str() == "Protocol" && self.module.as_str() == "ObjectiveC"
    }

    /// True if `self` is `other` or inherits from it.
    pub fn is_subclass_of(&self, other: &ClassDecl) -> bool {
        if self == other {
            return true;
        }
        self.superclass.as_ref().map_or(false, |s| s.is_subclass_of(other))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolDecl {
    pub name: Symbol,
    pub class_bound: bool,
    pub inherits: Vec<Arc<ProtocolDecl>>,
}

impl ProtocolDecl {
    pub fn new(name: impl Into<Symbol>) -> Self {
        ProtocolDecl { name: name.into(), class_bound: false, inherits: Vec::new() }
    }

    pub fn class_bound(mut self) -> Self {
        self.class_bound = true;
        self
    }

    pub fn inheriting(mut self, parent: Arc<ProtocolDecl>) -> Self {
        self.inherits.push(parent);
        self
    }

    pub fn is_class_bound(&self) -> bool {
        self.class_bound || self.inherits.iter().any(|p| p.is_class_bound())
    }

    /// True if conforming to `self` implies conforming to `other`.
    pub fn implies(&self, other: &ProtocolDecl) -> bool {
        self == other || self.inherits.iter().any(|p| p.implies(other))
    }
}

/// A type variable bound in a generic environment, or the opened type of an existential.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchetypeDecl {
    pub id: u32,
    pub name: Symbol,
    pub protocols: Vec<Arc<ProtocolDecl>>,
    pub superclass: Option<Arc<ClassDecl>>,
    pub class_bound: bool,
}

impl ArchetypeDecl {
    pub fn new(id: u32, name: impl Into<Symbol>) -> Self {
        ArchetypeDecl { id, name: name.into(), protocols: Vec::new(), superclass: None, class_bound: false }
    }

    pub fn is_class_bound(&self) -> bool {
        self.class_bound || self.superclass.is_some() || self.protocols.iter().any(|p| p.is_class_bound())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Func,
    /// An allocating initializer.
    Allocator,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct MethodAttrs {
    pub is_final: bool,
    pub forced_static_dispatch: bool,
    pub in_extension: bool,
    /// Dynamically replaceable; always dispatched through the runtime.
    pub is_dynamic: bool,
    pub foreign_to_native_thunk: bool,
    pub has_foreign_decl: bool,
    pub returns_inner_pointer: bool,
    pub autoreleased_result: bool,
    /// The receiver is borrowed for the call rather than consumed.
    pub guaranteed_self: bool,
}

/// A concrete method implementation.
///
/// `formal_type` is uncurried: the receiver is the last element of the input tuple. Generic witnesses
/// use [`Ty::GenericParam`]s in their formal type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDecl {
    pub name: Symbol,
    pub symbol: Symbol,
    pub formal_type: FunctionTy,
    pub kind: MethodKind,
    pub attrs: MethodAttrs,
}

impl MethodDecl {
    pub fn new(name: impl Into<Symbol>, symbol: impl Into<Symbol>, formal_type: FunctionTy) -> Self {
        MethodDecl {
            name: name.into(),
            symbol: symbol.into(),
            formal_type,
            kind: MethodKind::Func,
            attrs: MethodAttrs::default(),
        }
    }

    pub fn with_attrs(mut self, attrs: MethodAttrs) -> Self {
        self.attrs = attrs;
        self
    }

    pub fn with_kind(mut self, kind: MethodKind) -> Self {
        self.kind = kind;
        self
    }
}

/// A protocol requirement. Its formal type refers to the conforming type as
/// [`GenericParam::protocol_self`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolRequirement {
    pub protocol: Arc<ProtocolDecl>,
    pub name: Symbol,
    pub formal_type: FunctionTy,
}

impl ProtocolRequirement {
    pub fn new(protocol: Arc<ProtocolDecl>, name: impl Into<Symbol>, formal_type: FunctionTy) -> Self {
        ProtocolRequirement { protocol, name: name.into(), formal_type }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProtocolConformance {
    pub ty: Ty,
    pub protocol: Arc<ProtocolDecl>,
}

impl ProtocolConformance {
    pub fn new(ty: Ty, protocol: Arc<ProtocolDecl>) -> Self {
        ProtocolConformance { ty, protocol }
    }

    /// The type a conformance's requirements see as `Self`.
    pub fn self_substitution(&self) -> crate::SubstitutionMap {
        let mut subs = crate::SubstitutionMap::new();
        subs.insert(crate::GenericParam::protocol_self(), self.ty.clone());
        subs
    }
}
