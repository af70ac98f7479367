//! Abstraction patterns.
//!
//! An [`AbstractionPattern`] mirrors the shape of an *original* (possibly generic) type and records, at each
//! position, whether that position was a type variable. The representation of a value is decided by the
//! opaque positions of the pattern it is used under, never by the concrete type substituted there: two
//! substitutions of the same pattern agree on representation at every opaque position.

use std::fmt;

use crate::ty::{FunctionRepr, Ty};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AbstractionPattern {
    /// A type variable in the original signature; forces the maximally general representation.
    Opaque,
    Tuple(Vec<AbstractionPattern>),
    Function {
        input: Box<AbstractionPattern>,
        result: Box<AbstractionPattern>,
        repr: FunctionRepr,
    },
    /// A structurally known leaf (nominal, optional, metatype, existential...).
    Type(Ty),
}

impl AbstractionPattern {
    /// Builds the pattern of an original type. Generic parameters become opaque positions; tuples and
    /// functions are decomposed structurally.
    pub fn new(original: &Ty) -> Self {
        match original {
            Ty::GenericParam(_) => AbstractionPattern::Opaque,
            Ty::Tuple(elements) => {
                AbstractionPattern::Tuple(elements.iter().map(AbstractionPattern::new).collect())
            }
            Ty::Function(f) => AbstractionPattern::Function {
                input: Box::new(AbstractionPattern::new(&f.input)),
                result: Box::new(AbstractionPattern::new(&f.result)),
                repr: f.repr,
            },
            Ty::InOut(object) => AbstractionPattern::new(object),
            other => AbstractionPattern::Type(other.clone()),
        }
    }

    pub fn opaque() -> Self {
        AbstractionPattern::Opaque
    }

    pub fn is_opaque(&self) -> bool {
        matches!(self, AbstractionPattern::Opaque)
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, AbstractionPattern::Tuple(_))
    }

    pub fn tuple_arity(&self) -> Option<usize> {
        match self {
            AbstractionPattern::Tuple(elements) => Some(elements.len()),
            _ => None,
        }
    }

    /// The pattern of element `index`. Every element of an opaque position is itself opaque.
    pub fn tuple_element(&self, index: usize) -> Option<AbstractionPattern> {
        match self {
            AbstractionPattern::Opaque => Some(AbstractionPattern::Opaque),
            AbstractionPattern::Tuple(elements) => elements.get(index).cloned(),
            _ => None,
        }
    }

    /// Whether a tuple type can be decomposed along this pattern.
    pub fn matches_tuple(&self, ty: &Ty) -> bool {
        match (self, ty) {
            (AbstractionPattern::Opaque, Ty::Tuple(_)) => true,
            (AbstractionPattern::Tuple(patterns), Ty::Tuple(elements)) => patterns.len() == elements.len(),
            _ => false,
        }
    }

    pub fn function_input(&self) -> Option<AbstractionPattern> {
        match self {
            AbstractionPattern::Opaque => Some(AbstractionPattern::Opaque),
            AbstractionPattern::Function { input, .. } => Some(input.as_ref().clone()),
            _ => None,
        }
    }

    pub fn function_result(&self) -> Option<AbstractionPattern> {
        match self {
            AbstractionPattern::Opaque => Some(AbstractionPattern::Opaque),
            AbstractionPattern::Function { result, .. } => Some(result.as_ref().clone()),
            _ => None,
        }
    }

    /// Functions stored at opaque positions always carry a context.
    pub fn function_repr(&self) -> Option<FunctionRepr> {
        match self {
            AbstractionPattern::Opaque => Some(FunctionRepr::Thick),
            AbstractionPattern::Function { repr, .. } => Some(*repr),
            _ => None,
        }
    }

    /// Whether a metatype at this position must use the thick representation regardless of its
    /// instance type.
    pub fn is_opaque_metatype(&self) -> bool {
        match self {
            AbstractionPattern::Opaque => true,
            AbstractionPattern::Type(Ty::Metatype(instance)) => instance.has_generic_params(),
            _ => false,
        }
    }

    pub fn drop_last_tuple_element(&self) -> AbstractionPattern {
        match self {
            AbstractionPattern::Tuple(elements) if !elements.is_empty() => {
                AbstractionPattern::Tuple(elements[..elements.len() - 1].to_vec())
            }
            other => other.clone(),
        }
    }
}

impl fmt::Display for AbstractionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AbstractionPattern::Opaque => write!(f, "_"),
            AbstractionPattern::Tuple(elements) => {
                write!(f, "(")?;
                for (i, element) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", element)?;
                }
                write!(f, ")")
            }
            AbstractionPattern::Function { input, result, repr } => {
                if *repr == FunctionRepr::Thin {
                    write!(f, "@convention(thin) ")?;
                }
                match input.as_ref() {
                    AbstractionPattern::Tuple(_) => write!(f, "{} -> {}", input, result),
                    other => write!(f, "({}) -> {}", other, result),
                }
            }
            AbstractionPattern::Type(ty) => write!(f, "{}", ty),
        }
    }
}
