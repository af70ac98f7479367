use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::decl::{ClassDecl, ProtocolConformance, ProtocolDecl};
use crate::ty::Ty;

/// Answers whether a concrete type conforms to a protocol.
pub trait ConformanceLookup {
    fn lookup_conformance(&self, ty: &Ty, protocol: &Arc<ProtocolDecl>) -> Option<ProtocolConformance>;
}

/// Conformance lookup driven by the declarations themselves, plus explicit registrations for types
/// that cannot declare conformances (primitives, tuples, functions).
#[derive(Debug, Default, Clone)]
pub struct NominalConformances {
    registered: FxHashMap<Ty, Vec<Arc<ProtocolDecl>>>,
}

impl NominalConformances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, ty: Ty, protocol: Arc<ProtocolDecl>) {
        self.registered.entry(ty).or_default().push(protocol);
    }

    fn class_protocols(class: &ClassDecl, out: &mut Vec<Arc<ProtocolDecl>>) {
        out.extend(class.conformances.iter().cloned());
        if let Some(superclass) = &class.superclass {
            Self::class_protocols(superclass, out);
        }
    }

    fn declared_protocols(&self, ty: &Ty) -> Vec<Arc<ProtocolDecl>> {
        let mut protocols = Vec::new();
        match ty {
            Ty::Struct(decl) => protocols.extend(decl.conformances.iter().cloned()),
            Ty::Class(decl) => Self::class_protocols(decl, &mut protocols),
            Ty::Archetype(archetype) => {
                protocols.extend(archetype.protocols.iter().cloned());
                if let Some(superclass) = &archetype.superclass {
                    Self::class_protocols(superclass, &mut protocols);
                }
            }
            _ => {}
        }
        if let Some(extra) = self.registered.get(ty) {
            protocols.extend(extra.iter().cloned());
        }
        protocols
    }
}

impl ConformanceLookup for NominalConformances {
    fn lookup_conformance(&self, ty: &Ty, protocol: &Arc<ProtocolDecl>) -> Option<ProtocolConformance> {
        self.declared_protocols(ty)
            .iter()
            .any(|declared| declared.implies(protocol))
            .then(|| ProtocolConformance::new(ty.clone(), protocol.clone()))
    }
}
