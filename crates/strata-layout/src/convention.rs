//! Calling conventions of lowered function types.

use std::fmt;

use strata_types::FunctionRepr;

use crate::rep::{IrType, RepTy};

/// Ownership transfer of one parameter at a call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamConvention {
    DirectOwned,
    /// Borrowed for the duration of the call; retain to hold longer.
    DirectGuaranteed,
    /// Valid only at the instant of the call; the callee retains what it keeps.
    DirectUnowned,
    DirectDeallocating,
    /// Owned value behind a pointer; the callee destroys it.
    IndirectIn,
    IndirectInGuaranteed,
    /// Mutable aliased storage that needs write-back.
    IndirectInout,
    /// The destination of an indirect result.
    IndirectOut,
}

impl ParamConvention {
    pub fn is_indirect(self) -> bool {
        matches!(
            self,
            ParamConvention::IndirectIn
                | ParamConvention::IndirectInGuaranteed
                | ParamConvention::IndirectInout
                | ParamConvention::IndirectOut
        )
    }

    /// Whether passing an argument transfers its ownership to the callee.
    pub fn is_consumed(self) -> bool {
        matches!(self, ParamConvention::DirectOwned | ParamConvention::IndirectIn)
    }

    fn attribute(self) -> &'static str {
        match self {
            ParamConvention::DirectOwned => "@owned ",
            ParamConvention::DirectGuaranteed => "@guaranteed ",
            ParamConvention::DirectUnowned => "",
            ParamConvention::DirectDeallocating => "@deallocating ",
            ParamConvention::IndirectIn => "@in ",
            ParamConvention::IndirectInGuaranteed => "@in_guaranteed ",
            ParamConvention::IndirectInout => "@inout ",
            ParamConvention::IndirectOut => "@out ",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultConvention {
    Owned,
    /// The caller retains the result if it keeps it.
    Unowned,
    Autoreleased,
    /// Borrows its lifetime from the receiver.
    UnownedInnerPointer,
}

impl ResultConvention {
    fn attribute(self) -> &'static str {
        match self {
            ResultConvention::Owned => "@owned ",
            ResultConvention::Unowned => "",
            ResultConvention::Autoreleased => "@autoreleased ",
            ResultConvention::UnownedInnerPointer => "@unowned_inner_pointer ",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamInfo {
    pub ty: RepTy,
    pub convention: ParamConvention,
}

impl ParamInfo {
    pub fn new(ty: RepTy, convention: ParamConvention) -> Self {
        ParamInfo { ty, convention }
    }

    /// The type an argument for this parameter has inside the callee.
    pub fn ir_type(&self) -> IrType {
        IrType::new(self.ty.clone(), self.convention.is_indirect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResultInfo {
    pub ty: RepTy,
    pub convention: ResultConvention,
}

/// A lowered function type.
///
/// A function returning indirectly takes its result buffer as an extra leading argument; `params`
/// excludes that buffer and `result` is then the empty tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FnRep {
    pub repr: FunctionRepr,
    pub callee: ParamConvention,
    pub params: Vec<ParamInfo>,
    pub result: ResultInfo,
    pub indirect_result: Option<RepTy>,
}

impl FnRep {
    pub fn is_thick(&self) -> bool {
        self.repr == FunctionRepr::Thick
    }

    pub fn has_indirect_result(&self) -> bool {
        self.indirect_result.is_some()
    }

    /// The type of the value the function produces: the indirect result buffer or the direct result.
    pub fn semantic_result_type(&self) -> IrType {
        match &self.indirect_result {
            Some(ty) => IrType::address(ty.clone()),
            None => IrType::object(self.result.ty.clone()),
        }
    }

    /// The type an `apply` of this function evaluates to.
    pub fn direct_result_type(&self) -> IrType {
        IrType::object(self.result.ty.clone())
    }

    pub fn with_representation(&self, repr: FunctionRepr, callee: ParamConvention) -> FnRep {
        FnRep { repr, callee, ..self.clone() }
    }
}

impl fmt::Display for FnRep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            FunctionRepr::Thin => write!(f, "@convention(thin) ")?,
            FunctionRepr::Thick => match self.callee {
                ParamConvention::DirectGuaranteed => write!(f, "@callee_guaranteed ")?,
                ParamConvention::DirectUnowned => write!(f, "@callee_unowned ")?,
                _ => write!(f, "@callee_owned ")?,
            },
        }
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}{}", param.convention.attribute(), param.ty)?;
        }
        write!(f, ") -> ")?;
        match &self.indirect_result {
            Some(ty) => write!(f, "@out {}", ty),
            None => write!(f, "{}{}", self.result.convention.attribute(), self.result.ty),
        }
    }
}
