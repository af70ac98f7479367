use std::fmt;
use std::sync::Arc;

use crate::decl::{ArchetypeDecl, ClassDecl, ProtocolDecl, StructDecl};
use crate::generics::SubstitutionMap;
use crate::Symbol;

/// Built-in scalar types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimTy {
    Int,
    Float,
    Bool,
    /// Heap-backed and reference counted; the only non-trivial primitive.
    String,
}

impl PrimTy {
    pub fn is_trivial(self) -> bool {
        !matches!(self, PrimTy::String)
    }
}

impl fmt::Display for PrimTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimTy::Int => write!(f, "Int"),
            PrimTy::Float => write!(f, "Float"),
            PrimTy::Bool => write!(f, "Bool"),
            PrimTy::String => write!(f, "String"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OptionalKind {
    Optional,
    /// Converts to its payload implicitly, trapping when empty.
    ImplicitlyUnwrapped,
}

/// Whether a function value carries a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionRepr {
    Thick,
    Thin,
}

/// A formal function type. The input is the whole parameter tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FunctionTy {
    pub input: Ty,
    pub result: Ty,
    pub repr: FunctionRepr,
}

impl FunctionTy {
    pub fn new(input: Ty, result: Ty) -> Self {
        FunctionTy { input, result, repr: FunctionRepr::Thick }
    }

    pub fn thin(input: Ty, result: Ty) -> Self {
        FunctionTy { input, result, repr: FunctionRepr::Thin }
    }

    pub fn subst(&self, subs: &SubstitutionMap) -> FunctionTy {
        FunctionTy {
            input: self.input.subst(subs),
            result: self.result.subst(subs),
            repr: self.repr,
        }
    }

    /// The same function with the receiver (last input element) removed.
    pub fn drop_self(&self) -> FunctionTy {
        FunctionTy {
            input: self.input.drop_last_tuple_element(),
            result: self.result.clone(),
            repr: self.repr,
        }
    }
}

/// A type parameter of a generic signature, identified by position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GenericParam {
    pub depth: u32,
    pub index: u32,
    pub name: Symbol,
}

impl GenericParam {
    pub fn new(depth: u32, index: u32, name: impl Into<Symbol>) -> Self {
        GenericParam { depth, index, name: name.into() }
    }

    /// The implicit `Self` parameter of a protocol requirement.
    pub fn protocol_self() -> Self {
        GenericParam::new(0, 0, "Self")
    }
}

/// A formal (source-level) type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Ty {
    Prim(PrimTy),
    Tuple(Vec<Ty>),
    Function(Box<FunctionTy>),
    Optional(OptionalKind, Box<Ty>),
    Struct(Arc<StructDecl>),
    Class(Arc<ClassDecl>),
    /// An unsubstituted type variable; only meaningful inside abstraction patterns and generic signatures.
    GenericParam(GenericParam),
    /// A type variable bound in a generic environment, or an opened existential.
    Archetype(Arc<ArchetypeDecl>),
    /// A protocol composition; the empty composition is `Any`.
    Existential(Vec<Arc<ProtocolDecl>>),
    AnyObject,
    Metatype(Box<Ty>),
    ExistentialMetatype(Box<Ty>),
    InOut(Box<Ty>),
}

impl Ty {
    pub fn int() -> Ty {
        Ty::Prim(PrimTy::Int)
    }

    pub fn float() -> Ty {
        Ty::Prim(PrimTy::Float)
    }

    pub fn bool() -> Ty {
        Ty::Prim(PrimTy::Bool)
    }

    pub fn string() -> Ty {
        Ty::Prim(PrimTy::String)
    }

    pub fn unit() -> Ty {
        Ty::Tuple(Vec::new())
    }

    pub fn tuple(elements: Vec<Ty>) -> Ty {
        Ty::Tuple(elements)
    }

    pub fn function(input: Ty, result: Ty) -> Ty {
        Ty::Function(Box::new(FunctionTy::new(input, result)))
    }

    pub fn thin_function(input: Ty, result: Ty) -> Ty {
        Ty::Function(Box::new(FunctionTy::thin(input, result)))
    }

    pub fn optional(object: Ty) -> Ty {
        Ty::Optional(OptionalKind::Optional, Box::new(object))
    }

    pub fn implicitly_unwrapped(object: Ty) -> Ty {
        Ty::Optional(OptionalKind::ImplicitlyUnwrapped, Box::new(object))
    }

    pub fn metatype(instance: Ty) -> Ty {
        Ty::Metatype(Box::new(instance))
    }

    pub fn existential_metatype(instance: Ty) -> Ty {
        Ty::ExistentialMetatype(Box::new(instance))
    }

    pub fn inout(object: Ty) -> Ty {
        Ty::InOut(Box::new(object))
    }

    pub fn param(depth: u32, index: u32, name: impl Into<Symbol>) -> Ty {
        Ty::GenericParam(GenericParam::new(depth, index, name))
    }

    pub fn existential(protocols: Vec<Arc<ProtocolDecl>>) -> Ty {
        Ty::Existential(protocols)
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Ty::Tuple(_))
    }

    pub fn tuple_elements(&self) -> Option<&[Ty]> {
        match self {
            Ty::Tuple(elements) => Some(elements),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionTy> {
        match self {
            Ty::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Splits an optional into its kind and payload.
    pub fn optional_object(&self) -> Option<(OptionalKind, &Ty)> {
        match self {
            Ty::Optional(kind, object) => Some((*kind, object)),
            _ => None,
        }
    }

    /// Looks through `inout`.
    pub fn rvalue(&self) -> &Ty {
        match self {
            Ty::InOut(object) => object,
            other => other,
        }
    }

    pub fn class_decl(&self) -> Option<&Arc<ClassDecl>> {
        match self {
            Ty::Class(decl) => Some(decl),
            _ => None,
        }
    }

    pub fn is_any_object(&self) -> bool {
        matches!(self, Ty::AnyObject)
    }

    /// Existentials, `AnyObject` and existential metatypes.
    pub fn is_any_existential(&self) -> bool {
        matches!(self, Ty::Existential(_) | Ty::AnyObject | Ty::ExistentialMetatype(_))
    }

    /// Protocols an existential (or existential metatype) requires of its payload.
    pub fn existential_protocols(&self) -> Vec<Arc<ProtocolDecl>> {
        match self {
            Ty::Existential(protocols) => protocols.clone(),
            Ty::ExistentialMetatype(instance) => instance.existential_protocols(),
            _ => Vec::new(),
        }
    }

    /// Class-bound existentials are stored as a single reference.
    pub fn is_class_existential(&self) -> bool {
        match self {
            Ty::AnyObject => true,
            Ty::Existential(protocols) => protocols.iter().any(|p| p.is_class_bound()),
            _ => false,
        }
    }

    /// The `Protocol` class of the `ObjectiveC` module, which protocol metatypes convert to.
    pub fn is_protocol_class(&self) -> bool {
        self.class_decl().map_or(false, |c| c.is_protocol_class())
    }

    /// A tuple is materializable unless some element is `inout`.
    pub fn is_materializable(&self) -> bool {
        match self {
            Ty::InOut(_) => false,
            Ty::Tuple(elements) => elements.iter().all(Ty::is_materializable),
            _ => true,
        }
    }

    pub fn has_generic_params(&self) -> bool {
        match self {
            Ty::GenericParam(_) => true,
            Ty::Tuple(elements) => elements.iter().any(Ty::has_generic_params),
            Ty::Function(f) => f.input.has_generic_params() || f.result.has_generic_params(),
            Ty::Optional(_, object)
            | Ty::Metatype(object)
            | Ty::ExistentialMetatype(object)
            | Ty::InOut(object) => object.has_generic_params(),
            _ => false,
        }
    }

    /// Removes the last element of a tuple type; non-tuples are returned unchanged.
    pub fn drop_last_tuple_element(&self) -> Ty {
        match self {
            Ty::Tuple(elements) if !elements.is_empty() => {
                Ty::Tuple(elements[..elements.len() - 1].to_vec())
            }
            other => other.clone(),
        }
    }

    /// Replaces generic parameters bound by `subs`. Unbound parameters are left in place.
    pub fn subst(&self, subs: &SubstitutionMap) -> Ty {
        match self {
            Ty::GenericParam(param) => subs.lookup(param).cloned().unwrap_or_else(|| self.clone()),
            Ty::Tuple(elements) => Ty::Tuple(elements.iter().map(|e| e.subst(subs)).collect()),
            Ty::Function(f) => Ty::Function(Box::new(f.subst(subs))),
            Ty::Optional(kind, object) => Ty::Optional(*kind, Box::new(object.subst(subs))),
            Ty::Metatype(instance) => Ty::Metatype(Box::new(instance.subst(subs))),
            Ty::ExistentialMetatype(instance) => Ty::ExistentialMetatype(Box::new(instance.subst(subs))),
            Ty::InOut(object) => Ty::InOut(Box::new(object.subst(subs))),
            Ty::Prim(_)
            | Ty::Struct(_)
            | Ty::Class(_)
            | Ty::Archetype(_)
            | Ty::Existential(_)
            | Ty::AnyObject => self.clone(),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Ty]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for FunctionTy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.repr == FunctionRepr::Thin {
            write!(f, "@convention(thin) ")?;
        }
        match &self.input {
            Ty::Tuple(_) => write!(f, "{}", self.input)?,
            other => write!(f, "({})", other)?,
        }
        write!(f, " -> {}", self.result)
    }
}

impl fmt::Display for Ty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ty::Prim(p) => write!(f, "{}", p),
            Ty::Tuple(elements) => {
                write!(f, "(")?;
                write_list(f, elements)?;
                write!(f, ")")
            }
            Ty::Function(func) => write!(f, "{}", func),
            Ty::Optional(kind, object) => {
                let suffix = match kind {
                    OptionalKind::Optional => "?",
                    OptionalKind::ImplicitlyUnwrapped => "!",
                };
                match object.as_ref() {
                    Ty::Function(_) => write!(f, "({}){}", object, suffix),
                    _ => write!(f, "{}{}", object, suffix),
                }
            }
            Ty::Struct(decl) => write!(f, "{}", decl.name),
            Ty::Class(decl) => write!(f, "{}", decl.name),
            Ty::GenericParam(param) => write!(f, "{}", param.name),
            Ty::Archetype(archetype) => write!(f, "{}", archetype.name),
            Ty::Existential(protocols) => match protocols.as_slice() {
                [single] => write!(f, "{}", single.name),
                _ => {
                    write!(f, "protocol<")?;
                    for (i, p) in protocols.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", p.name)?;
                    }
                    write!(f, ">")
                }
            },
            Ty::AnyObject => write!(f, "AnyObject"),
            Ty::Metatype(instance) => {
                if instance.is_any_existential() {
                    write!(f, "{}.Protocol", instance)
                } else {
                    write!(f, "{}.Type", instance)
                }
            }
            Ty::ExistentialMetatype(instance) => write!(f, "{}.Type", instance),
            Ty::InOut(object) => write!(f, "inout {}", object),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn test_display_function_types() {
        let generic = Ty::function(
            Ty::tuple(vec![Ty::param(0, 0, "T"), Ty::param(0, 0, "T")]),
            Ty::param(0, 1, "U"),
        );
        expect!["(T, T) -> U"].assert_eq(&generic.to_string());

        let thin = Ty::thin_function(Ty::int(), Ty::optional(Ty::string()));
        expect!["@convention(thin) (Int) -> String?"].assert_eq(&thin.to_string());

        let iuo_fn = Ty::implicitly_unwrapped(Ty::function(Ty::unit(), Ty::bool()));
        expect!["(() -> Bool)!"].assert_eq(&iuo_fn.to_string());
    }

    #[test]
    fn test_subst_replaces_bound_params_only() {
        let t = GenericParam::new(0, 0, "T");
        let u = GenericParam::new(0, 1, "U");
        let mut subs = SubstitutionMap::new();
        subs.insert(t.clone(), Ty::int());

        let ty = Ty::function(
            Ty::tuple(vec![Ty::GenericParam(t), Ty::GenericParam(u.clone())]),
            Ty::metatype(Ty::GenericParam(u.clone())),
        );
        let substituted = ty.subst(&subs);
        assert_eq!(substituted.to_string(), "(Int, U) -> U.Type");
        assert!(substituted.has_generic_params());
    }

    #[test]
    fn test_materializable_and_drop_last() {
        let with_inout = Ty::tuple(vec![Ty::int(), Ty::inout(Ty::string())]);
        assert!(!with_inout.is_materializable());
        assert_eq!(with_inout.drop_last_tuple_element(), Ty::tuple(vec![Ty::int()]));
        assert!(Ty::tuple(vec![Ty::int(), Ty::bool()]).is_materializable());
        assert_eq!(Ty::int().drop_last_tuple_element(), Ty::int());
    }
}
