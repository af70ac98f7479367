use std::fmt;
use std::sync::Arc;

use strata_types::{ArchetypeDecl, ClassDecl, OptionalKind, PrimTy, ProtocolDecl, StructDecl, Ty};

use crate::convention::FnRep;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetatypeRepr {
    /// No runtime value; the type is statically known.
    Thin,
    /// A pointer to runtime type metadata.
    Thick,
}

/// A lowered type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RepTy {
    Prim(PrimTy),
    Tuple(Vec<RepTy>),
    Function(Arc<FnRep>),
    Optional(OptionalKind, Box<RepTy>),
    Struct(Arc<StructDecl>),
    Class(Arc<ClassDecl>),
    Archetype(Arc<ArchetypeDecl>),
    Existential(Vec<Arc<ProtocolDecl>>),
    AnyObject,
    Metatype { instance: Ty, repr: MetatypeRepr },
    ExistentialMetatype(Ty),
}

impl RepTy {
    pub fn unit() -> RepTy {
        RepTy::Tuple(Vec::new())
    }

    pub fn tuple_elements(&self) -> Option<&[RepTy]> {
        match self {
            RepTy::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn function(&self) -> Option<&Arc<FnRep>> {
        match self {
            RepTy::Function(f) => Some(f),
            _ => None,
        }
    }

    pub fn optional_payload(&self) -> Option<&RepTy> {
        match self {
            RepTy::Optional(_, payload) => Some(payload),
            _ => None,
        }
    }

    pub fn metatype_repr(&self) -> Option<MetatypeRepr> {
        match self {
            RepTy::Metatype { repr, .. } => Some(*repr),
            RepTy::ExistentialMetatype(_) => Some(MetatypeRepr::Thick),
            _ => None,
        }
    }
}

impl fmt::Display for RepTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepTy::Prim(p) => write!(f, "{}", p),
            RepTy::Tuple(elements) => {
                write!(f, "(")?;
                for (i, e) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, ")")
            }
            RepTy::Function(fn_rep) => write!(f, "{}", fn_rep),
            RepTy::Optional(OptionalKind::Optional, payload) => write!(f, "Optional<{}>", payload),
            RepTy::Optional(OptionalKind::ImplicitlyUnwrapped, payload) => {
                write!(f, "ImplicitlyUnwrappedOptional<{}>", payload)
            }
            RepTy::Struct(decl) => write!(f, "{}", decl.name),
            RepTy::Class(decl) => write!(f, "{}", decl.name),
            RepTy::Archetype(archetype) => write!(f, "{}", archetype.name),
            RepTy::Existential(protocols) => write!(f, "{}", Ty::Existential(protocols.clone())),
            RepTy::AnyObject => write!(f, "AnyObject"),
            RepTy::Metatype { instance, repr } => {
                let repr = match repr {
                    MetatypeRepr::Thin => "@thin",
                    MetatypeRepr::Thick => "@thick",
                };
                write!(f, "{} {}", repr, Ty::metatype(instance.clone()))
            }
            RepTy::ExistentialMetatype(instance) => write!(f, "@thick {}.Type", instance),
        }
    }
}

/// A lowered type together with its value category: an object held in a register or the address of
/// one held in memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IrType {
    pub rep: RepTy,
    pub is_address: bool,
}

impl IrType {
    pub fn new(rep: RepTy, is_address: bool) -> Self {
        IrType { rep, is_address }
    }

    pub fn object(rep: RepTy) -> Self {
        IrType { rep, is_address: false }
    }

    pub fn address(rep: RepTy) -> Self {
        IrType { rep, is_address: true }
    }

    pub fn unit() -> Self {
        IrType::object(RepTy::unit())
    }

    pub fn as_object(&self) -> IrType {
        IrType::object(self.rep.clone())
    }

    pub fn as_address(&self) -> IrType {
        IrType::address(self.rep.clone())
    }

    /// The type of element `index`, keeping the value category.
    pub fn tuple_element(&self, index: usize) -> Option<IrType> {
        let element = self.rep.tuple_elements()?.get(index)?;
        Some(IrType::new(element.clone(), self.is_address))
    }

    pub fn optional_payload(&self) -> Option<IrType> {
        Some(IrType::new(self.rep.optional_payload()?.clone(), self.is_address))
    }

    pub fn function(&self) -> Option<&Arc<FnRep>> {
        self.rep.function()
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_address {
            write!(f, "$*{}", self.rep)
        } else {
            write!(f, "${}", self.rep)
        }
    }
}
