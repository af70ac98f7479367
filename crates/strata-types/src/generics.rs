use std::sync::Arc;

use crate::decl::ArchetypeDecl;
use crate::ty::{GenericParam, Ty};

/// Bindings from generic parameters to replacement types.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SubstitutionMap {
    entries: Vec<(GenericParam, Ty)>,
}

impl SubstitutionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, param: GenericParam, replacement: Ty) {
        match self.entries.iter_mut().find(|(p, _)| *p == param) {
            Some(entry) => entry.1 = replacement,
            None => self.entries.push((param, replacement)),
        }
    }

    pub fn with(mut self, param: GenericParam, replacement: Ty) -> Self {
        self.insert(param, replacement);
        self
    }

    pub fn lookup(&self, param: &GenericParam) -> Option<&Ty> {
        self.entries.iter().find(|(p, _)| p == param).map(|(_, t)| t)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(GenericParam, Ty)> {
        self.entries.iter()
    }
}

/// The archetypes in scope while emitting a function. Thunks emitted from a generic context borrow
/// the context's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GenericEnvironment {
    params: Vec<(GenericParam, Arc<ArchetypeDecl>)>,
}

impl GenericEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, param: GenericParam, archetype: Arc<ArchetypeDecl>) -> Self {
        self.params.push((param, archetype));
        self
    }

    pub fn archetypes(&self) -> impl Iterator<Item = &Arc<ArchetypeDecl>> {
        self.params.iter().map(|(_, a)| a)
    }

    /// Maps every parameter to its own archetype.
    pub fn forwarding_substitutions(&self) -> SubstitutionMap {
        self.params.iter().fold(SubstitutionMap::new(), |subs, (param, archetype)| {
            subs.with(param.clone(), Ty::Archetype(archetype.clone()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}
