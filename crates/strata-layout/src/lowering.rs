use std::sync::Arc;

use rustc_hash::FxHashMap;
use strata_types::{AbstractionPattern, FunctionRepr, FunctionTy, MethodAttrs, Ty};

use crate::convention::{FnRep, ParamConvention, ParamInfo, ResultConvention, ResultInfo};
use crate::rep::{IrType, MetatypeRepr, RepTy};
use crate::LayoutError;

/// Copy/destroy semantics of a lowered value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// Bitwise copyable, nothing to destroy.
    Trivial,
    /// A single reference-counted pointer.
    Reference,
    /// An aggregate or value needing non-trivial copy and destroy.
    NonTrivial,
}

/// The answer of the type lowering query.
///
/// `lowered` is the type values of this lowering are manipulated as: an address for address-only
/// types, an object otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeLowering {
    pub lowered: IrType,
    pub kind: ValueKind,
    pub address_only: bool,
}

impl TypeLowering {
    fn new(rep: RepTy, kind: ValueKind, address_only: bool) -> Self {
        TypeLowering { lowered: IrType::new(rep, address_only), kind, address_only }
    }

    pub fn is_trivial(&self) -> bool {
        self.kind == ValueKind::Trivial
    }

    pub fn is_loadable(&self) -> bool {
        !self.address_only
    }

    pub fn rep(&self) -> &RepTy {
        &self.lowered.rep
    }
}

/// Declaration attributes that change how a function signature lowers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct FnLoweringAttrs {
    pub returns_inner_pointer: bool,
    pub autoreleased_result: bool,
    pub guaranteed_self: bool,
}

impl From<&MethodAttrs> for FnLoweringAttrs {
    fn from(attrs: &MethodAttrs) -> Self {
        FnLoweringAttrs {
            returns_inner_pointer: attrs.returns_inner_pointer,
            autoreleased_result: attrs.autoreleased_result,
            guaranteed_self: attrs.guaranteed_self,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbiDifference {
    /// The two types can be converted by a representation-preserving cast.
    Trivial,
    NeedsThunk,
}

fn aggregate_kind(kinds: impl IntoIterator<Item = ValueKind>) -> ValueKind {
    if kinds.into_iter().all(|k| k == ValueKind::Trivial) {
        ValueKind::Trivial
    } else {
        ValueKind::NonTrivial
    }
}

/// Lowers formal types under abstraction patterns, caching every answer.
#[derive(Debug, Default)]
pub struct TypeConverter {
    lowerings: FxHashMap<(AbstractionPattern, Ty), TypeLowering>,
    functions: FxHashMap<(AbstractionPattern, FunctionTy, FnLoweringAttrs), Arc<FnRep>>,
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lowers `ty` as used under `pattern`.
    pub fn lower(&mut self, pattern: &AbstractionPattern, ty: &Ty) -> Result<TypeLowering, LayoutError> {
        let key = (pattern.clone(), ty.clone());
        if let Some(cached) = self.lowerings.get(&key) {
            return Ok(cached.clone());
        }
        let lowering = self.compute_lowering(pattern, ty)?;
        self.lowerings.insert(key, lowering.clone());
        Ok(lowering)
    }

    /// Lowers `ty` under its own, fully concrete pattern.
    pub fn lower_subst(&mut self, ty: &Ty) -> Result<TypeLowering, LayoutError> {
        self.lower(&AbstractionPattern::new(ty), ty)
    }

    fn compute_lowering(&mut self, pattern: &AbstractionPattern, ty: &Ty) -> Result<TypeLowering, LayoutError> {
        let lowering = match ty {
            Ty::InOut(object) => {
                let mut lowering = self.lower(pattern, object)?;
                lowering.lowered.is_address = true;
                lowering
            }
            Ty::Prim(p) => {
                let kind = if p.is_trivial() { ValueKind::Trivial } else { ValueKind::NonTrivial };
                TypeLowering::new(RepTy::Prim(*p), kind, false)
            }
            Ty::Tuple(elements) => {
                if !pattern.matches_tuple(ty) {
                    return Err(LayoutError::PatternMismatch {
                        pattern: pattern.to_string(),
                        ty: ty.to_string(),
                    });
                }
                let mut reps = Vec::with_capacity(elements.len());
                let mut kinds = Vec::with_capacity(elements.len());
                let mut address_only = false;
                for (index, element) in elements.iter().enumerate() {
                    let element_pattern = pattern.tuple_element(index).ok_or_else(|| {
                        LayoutError::PatternMismatch { pattern: pattern.to_string(), ty: ty.to_string() }
                    })?;
                    let lowering = self.lower(&element_pattern, element)?;
                    address_only |= lowering.address_only;
                    kinds.push(lowering.kind);
                    reps.push(lowering.lowered.rep);
                }
                TypeLowering::new(RepTy::Tuple(reps), aggregate_kind(kinds), address_only)
            }
            Ty::Function(f) => {
                let fn_rep = self.lower_function_type(pattern, f, FnLoweringAttrs::default())?;
                let kind = if fn_rep.is_thick() { ValueKind::Reference } else { ValueKind::Trivial };
                TypeLowering::new(RepTy::Function(fn_rep), kind, false)
            }
            Ty::Optional(optional_kind, object) => {
                // Payloads are always maximally abstracted.
                let payload = self.lower(&AbstractionPattern::Opaque, object)?;
                TypeLowering::new(
                    RepTy::Optional(*optional_kind, Box::new(payload.lowered.rep)),
                    payload.kind,
                    payload.address_only,
                )
            }
            Ty::Struct(decl) => {
                let mut kinds = Vec::with_capacity(decl.fields.len());
                let mut address_only = false;
                for field in &decl.fields {
                    let lowering = self.lower_subst(field)?;
                    address_only |= lowering.address_only;
                    kinds.push(lowering.kind);
                }
                TypeLowering::new(RepTy::Struct(decl.clone()), aggregate_kind(kinds), address_only)
            }
            Ty::Class(decl) => TypeLowering::new(RepTy::Class(decl.clone()), ValueKind::Reference, false),
            Ty::GenericParam(param) => return Err(LayoutError::UnboundGenericParam(param.name.clone())),
            Ty::Archetype(archetype) => {
                if archetype.is_class_bound() {
                    TypeLowering::new(RepTy::Archetype(archetype.clone()), ValueKind::Reference, false)
                } else {
                    TypeLowering::new(RepTy::Archetype(archetype.clone()), ValueKind::NonTrivial, true)
                }
            }
            Ty::Existential(protocols) => {
                if ty.is_class_existential() {
                    TypeLowering::new(RepTy::Existential(protocols.clone()), ValueKind::Reference, false)
                } else {
                    TypeLowering::new(RepTy::Existential(protocols.clone()), ValueKind::NonTrivial, true)
                }
            }
            Ty::AnyObject => TypeLowering::new(RepTy::AnyObject, ValueKind::Reference, false),
            Ty::Metatype(instance) => {
                let needs_thick = matches!(
                    instance.as_ref(),
                    Ty::Class(_) | Ty::Archetype(_) | Ty::Existential(_) | Ty::AnyObject | Ty::GenericParam(_)
                );
                let repr = if pattern.is_opaque_metatype() || needs_thick {
                    MetatypeRepr::Thick
                } else {
                    MetatypeRepr::Thin
                };
                TypeLowering::new(
                    RepTy::Metatype { instance: instance.as_ref().clone(), repr },
                    ValueKind::Trivial,
                    false,
                )
            }
            Ty::ExistentialMetatype(instance) => TypeLowering::new(
                RepTy::ExistentialMetatype(instance.as_ref().clone()),
                ValueKind::Trivial,
                false,
            ),
        };
        log::trace!("lowered `{}` under `{}` as {}", ty, pattern, lowering.lowered);
        Ok(lowering)
    }

    /// Recovers the lowering of an already-lowered type.
    pub fn lowering_of(&mut self, ty: &IrType) -> Result<TypeLowering, LayoutError> {
        let (kind, address_only) = self.classify(&ty.rep)?;
        Ok(TypeLowering::new(ty.rep.clone(), kind, address_only))
    }

    fn classify(&mut self, rep: &RepTy) -> Result<(ValueKind, bool), LayoutError> {
        Ok(match rep {
            RepTy::Prim(p) => {
                (if p.is_trivial() { ValueKind::Trivial } else { ValueKind::NonTrivial }, false)
            }
            RepTy::Tuple(elements) => {
                let mut kinds = Vec::with_capacity(elements.len());
                let mut address_only = false;
                for element in elements {
                    let (kind, element_address_only) = self.classify(element)?;
                    kinds.push(kind);
                    address_only |= element_address_only;
                }
                (aggregate_kind(kinds), address_only)
            }
            RepTy::Function(f) => {
                (if f.is_thick() { ValueKind::Reference } else { ValueKind::Trivial }, false)
            }
            RepTy::Optional(_, payload) => self.classify(payload)?,
            RepTy::Struct(decl) => {
                let lowering = self.lower_subst(&Ty::Struct(decl.clone()))?;
                (lowering.kind, lowering.address_only)
            }
            RepTy::Class(_) | RepTy::AnyObject => (ValueKind::Reference, false),
            RepTy::Archetype(archetype) => {
                if archetype.is_class_bound() {
                    (ValueKind::Reference, false)
                } else {
                    (ValueKind::NonTrivial, true)
                }
            }
            RepTy::Existential(protocols) => {
                if Ty::Existential(protocols.clone()).is_class_existential() {
                    (ValueKind::Reference, false)
                } else {
                    (ValueKind::NonTrivial, true)
                }
            }
            RepTy::Metatype { .. } | RepTy::ExistentialMetatype(_) => (ValueKind::Trivial, false),
        })
    }

    /// Lowers a function type under a function (or opaque) pattern.
    pub fn lower_function_type(
        &mut self,
        pattern: &AbstractionPattern,
        f: &FunctionTy,
        attrs: FnLoweringAttrs,
    ) -> Result<Arc<FnRep>, LayoutError> {
        let key = (pattern.clone(), f.clone(), attrs);
        if let Some(cached) = self.functions.get(&key) {
            return Ok(cached.clone());
        }

        let (input_pattern, result_pattern, repr) = match pattern {
            AbstractionPattern::Opaque => (AbstractionPattern::Opaque, AbstractionPattern::Opaque, FunctionRepr::Thick),
            AbstractionPattern::Function { input, result, .. } => {
                (input.as_ref().clone(), result.as_ref().clone(), f.repr)
            }
            other => return Err(LayoutError::NotAFunction(other.to_string())),
        };

        let mut params = Vec::new();
        self.explode_params(&input_pattern, &f.input, &mut params)?;
        if attrs.guaranteed_self {
            if let Some(receiver) = params.last_mut() {
                receiver.convention = match receiver.convention {
                    ParamConvention::DirectOwned | ParamConvention::DirectUnowned => {
                        ParamConvention::DirectGuaranteed
                    }
                    ParamConvention::IndirectIn => ParamConvention::IndirectInGuaranteed,
                    other => other,
                };
            }
        }

        let result_lowering = self.lower(&result_pattern, &f.result)?;
        let (result, indirect_result) = if result_pattern.is_opaque() || result_lowering.address_only {
            (
                ResultInfo { ty: RepTy::unit(), convention: ResultConvention::Unowned },
                Some(result_lowering.lowered.rep),
            )
        } else {
            let convention = if attrs.returns_inner_pointer {
                ResultConvention::UnownedInnerPointer
            } else if attrs.autoreleased_result {
                ResultConvention::Autoreleased
            } else if result_lowering.is_trivial() {
                ResultConvention::Unowned
            } else {
                ResultConvention::Owned
            };
            (ResultInfo { ty: result_lowering.lowered.rep, convention }, None)
        };

        let callee = match repr {
            FunctionRepr::Thick => ParamConvention::DirectOwned,
            FunctionRepr::Thin => ParamConvention::DirectUnowned,
        };
        let fn_rep = Arc::new(FnRep { repr, callee, params, result, indirect_result });
        log::trace!("lowered function `{}` under `{}` as {}", f, pattern, fn_rep);
        self.functions.insert(key, fn_rep.clone());
        Ok(fn_rep)
    }

    /// Lowers a function type under its own concrete pattern.
    pub fn lower_subst_function(&mut self, f: &FunctionTy, attrs: FnLoweringAttrs) -> Result<Arc<FnRep>, LayoutError> {
        let pattern = AbstractionPattern::new(&Ty::Function(Box::new(f.clone())));
        self.lower_function_type(&pattern, f, attrs)
    }

    fn explode_params(
        &mut self,
        pattern: &AbstractionPattern,
        ty: &Ty,
        out: &mut Vec<ParamInfo>,
    ) -> Result<(), LayoutError> {
        match ty {
            Ty::InOut(object) => {
                let lowering = self.lower(pattern, object)?;
                out.push(ParamInfo::new(lowering.lowered.rep, ParamConvention::IndirectInout));
            }
            Ty::Tuple(elements) if pattern.is_tuple() || (pattern.is_opaque() && !ty.is_materializable()) => {
                if !pattern.matches_tuple(ty) {
                    return Err(LayoutError::PatternMismatch { pattern: pattern.to_string(), ty: ty.to_string() });
                }
                for (index, element) in elements.iter().enumerate() {
                    let element_pattern = pattern.tuple_element(index).ok_or_else(|| {
                        LayoutError::PatternMismatch { pattern: pattern.to_string(), ty: ty.to_string() }
                    })?;
                    self.explode_params(&element_pattern, element, out)?;
                }
            }
            _ => {
                let lowering = self.lower(pattern, ty)?;
                let convention = if pattern.is_opaque() || lowering.address_only {
                    ParamConvention::IndirectIn
                } else if lowering.is_trivial() {
                    ParamConvention::DirectUnowned
                } else {
                    ParamConvention::DirectOwned
                };
                out.push(ParamInfo::new(lowering.lowered.rep, convention));
            }
        }
        Ok(())
    }

    /// Whether two lowered types differ only in ways a cast can bridge.
    pub fn abi_difference(&self, a: &RepTy, b: &RepTy) -> AbiDifference {
        if a == b {
            return AbiDifference::Trivial;
        }
        match (a, b) {
            (RepTy::Class(_), RepTy::Class(_)) => AbiDifference::Trivial,
            (RepTy::Optional(_, x), RepTy::Optional(_, y)) => self.abi_difference(x, y),
            (RepTy::Function(f), RepTy::Function(g)) => self.function_abi_difference(f, g),
            (RepTy::Metatype { repr: r1, .. }, RepTy::Metatype { repr: r2, .. }) if r1 == r2 => AbiDifference::Trivial,
            (RepTy::Tuple(xs), RepTy::Tuple(ys)) if xs.len() == ys.len() => {
                if xs.iter().zip(ys).all(|(x, y)| self.abi_difference(x, y) == AbiDifference::Trivial) {
                    AbiDifference::Trivial
                } else {
                    AbiDifference::NeedsThunk
                }
            }
            _ => AbiDifference::NeedsThunk,
        }
    }

    /// Representation and callee convention are ignored: thin-to-thick is a conversion, not a thunk.
    pub fn function_abi_difference(&self, f: &FnRep, g: &FnRep) -> AbiDifference {
        let trivial = |x: &RepTy, y: &RepTy| self.abi_difference(x, y) == AbiDifference::Trivial;
        let params_match = f.params.len() == g.params.len()
            && f.params
                .iter()
                .zip(&g.params)
                .all(|(p, q)| p.convention == q.convention && trivial(&p.ty, &q.ty));
        let indirect_match = match (&f.indirect_result, &g.indirect_result) {
            (None, None) => true,
            (Some(x), Some(y)) => trivial(x, y),
            _ => false,
        };
        let result_match = f.result.convention == g.result.convention && trivial(&f.result.ty, &g.result.ty);
        if params_match && indirect_match && result_match {
            AbiDifference::Trivial
        } else {
            AbiDifference::NeedsThunk
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;
    use strata_types::{ArchetypeDecl, ClassDecl, ProtocolDecl, StructDecl};

    fn generic_predicate() -> Ty {
        Ty::function(
            Ty::tuple(vec![Ty::param(0, 0, "T"), Ty::param(0, 0, "T")]),
            Ty::param(0, 1, "U"),
        )
    }

    fn int_predicate() -> FunctionTy {
        FunctionTy::new(Ty::tuple(vec![Ty::int(), Ty::int()]), Ty::bool())
    }

    #[test]
    fn test_same_type_lowers_differently_under_patterns() {
        let mut tc = TypeConverter::new();
        let concrete = tc.lower_subst_function(&int_predicate(), FnLoweringAttrs::default()).unwrap();
        expect!["@callee_owned (Int, Int) -> Bool"].assert_eq(&concrete.to_string());

        let pattern = AbstractionPattern::new(&generic_predicate());
        let abstracted = tc.lower_function_type(&pattern, &int_predicate(), FnLoweringAttrs::default()).unwrap();
        expect!["@callee_owned (@in Int, @in Int) -> @out Bool"].assert_eq(&abstracted.to_string());

        assert_eq!(tc.function_abi_difference(&concrete, &abstracted), AbiDifference::NeedsThunk);
    }

    #[test]
    fn test_opaque_tuple_parameter_is_one_buffer() {
        let mut tc = TypeConverter::new();
        let f = FunctionTy::new(Ty::tuple(vec![Ty::int(), Ty::string()]), Ty::unit());
        let lowered = tc.lower_function_type(&AbstractionPattern::Opaque, &f, FnLoweringAttrs::default()).unwrap();
        expect!["@callee_owned (@in (Int, String)) -> @out ()"].assert_eq(&lowered.to_string());

        let with_inout = FunctionTy::new(Ty::tuple(vec![Ty::inout(Ty::int()), Ty::string()]), Ty::unit());
        let lowered = tc
            .lower_function_type(&AbstractionPattern::Opaque, &with_inout, FnLoweringAttrs::default())
            .unwrap();
        expect!["@callee_owned (@inout Int, @in String) -> @out ()"].assert_eq(&lowered.to_string());
    }

    #[test]
    fn test_value_kinds_and_address_only() {
        let mut tc = TypeConverter::new();
        let proto = Arc::new(ProtocolDecl::new("Drawable"));
        let class_proto = Arc::new(ProtocolDecl::new("Delegate").class_bound());

        assert!(tc.lower_subst(&Ty::int()).unwrap().is_trivial());
        assert_eq!(tc.lower_subst(&Ty::string()).unwrap().kind, ValueKind::NonTrivial);

        let existential = tc.lower_subst(&Ty::existential(vec![proto.clone()])).unwrap();
        assert!(existential.address_only);
        assert!(existential.lowered.is_address);

        let class_existential = tc.lower_subst(&Ty::existential(vec![class_proto])).unwrap();
        assert_eq!(class_existential.kind, ValueKind::Reference);
        assert!(!class_existential.address_only);

        let boxed = Arc::new(StructDecl::new("Boxed", vec![Ty::int(), Ty::existential(vec![proto])]));
        assert!(tc.lower_subst(&Ty::Struct(boxed)).unwrap().address_only);

        let mut archetype = ArchetypeDecl::new(0, "T");
        assert!(tc.lower_subst(&Ty::Archetype(Arc::new(archetype.clone()))).unwrap().address_only);
        archetype.superclass = Some(Arc::new(ClassDecl::new("Base")));
        assert!(!tc.lower_subst(&Ty::Archetype(Arc::new(archetype))).unwrap().address_only);

        assert!(matches!(
            tc.lower_subst(&Ty::param(0, 0, "T")),
            Err(LayoutError::UnboundGenericParam(_))
        ));
    }

    #[test]
    fn test_optional_payload_is_maximally_abstracted() {
        let mut tc = TypeConverter::new();
        let optional_fn = Ty::optional(Ty::function(Ty::int(), Ty::int()));
        let lowered = tc.lower_subst(&optional_fn).unwrap();
        expect!["$Optional<@callee_owned (@in Int) -> @out Int>"].assert_eq(&lowered.lowered.to_string());
    }

    #[test]
    fn test_metatype_representation() {
        let mut tc = TypeConverter::new();
        let thin = tc.lower_subst(&Ty::metatype(Ty::int())).unwrap();
        assert_eq!(thin.rep().metatype_repr(), Some(MetatypeRepr::Thin));
        let opaque = tc.lower(&AbstractionPattern::Opaque, &Ty::metatype(Ty::int())).unwrap();
        assert_eq!(opaque.rep().metatype_repr(), Some(MetatypeRepr::Thick));
        let class = tc.lower_subst(&Ty::metatype(Ty::Class(Arc::new(ClassDecl::new("C"))))).unwrap();
        expect!["$@thick C.Type"].assert_eq(&class.lowered.to_string());
    }

    #[test]
    fn test_abi_difference_of_class_and_optional() {
        let tc = TypeConverter::new();
        let base = Arc::new(ClassDecl::new("Base"));
        let derived = Arc::new(ClassDecl::new("Derived").with_superclass(base.clone()));
        let a = RepTy::Optional(strata_types::OptionalKind::Optional, Box::new(RepTy::Class(derived)));
        let b = RepTy::Optional(strata_types::OptionalKind::ImplicitlyUnwrapped, Box::new(RepTy::Class(base)));
        assert_eq!(tc.abi_difference(&a, &b), AbiDifference::Trivial);
        assert_eq!(
            tc.abi_difference(&RepTy::Prim(strata_types::PrimTy::Int), &RepTy::Prim(strata_types::PrimTy::Bool)),
            AbiDifference::NeedsThunk
        );
    }

    #[test]
    fn test_guaranteed_self_and_inner_pointer_attrs() {
        let mut tc = TypeConverter::new();
        let label = Ty::Struct(Arc::new(StructDecl::new("Label", vec![Ty::string()])));
        let method = FunctionTy::new(Ty::tuple(vec![label]), Ty::string());
        let attrs = FnLoweringAttrs { returns_inner_pointer: true, guaranteed_self: true, ..Default::default() };
        let lowered = tc.lower_subst_function(&method, attrs).unwrap();
        expect!["@callee_owned (@guaranteed Label) -> @unowned_inner_pointer String"]
            .assert_eq(&lowered.to_string());
    }
}
