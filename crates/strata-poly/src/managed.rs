use strata_ir::{InstKind, ValueId};

use crate::cleanup::CleanupHandle;
use crate::emitter::FunctionEmitter;
use crate::error::PolyResult;

/// A value together with the cleanup that owns it, if any.
///
/// Values without a cleanup are trivial, borrowed (+0) or lvalues. Forwarding a managed value
/// disables its cleanup and hands the raw value to whoever consumes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManagedValue {
    value: ValueId,
    cleanup: Option<CleanupHandle>,
}

impl ManagedValue {
    pub fn new(value: ValueId, cleanup: Option<CleanupHandle>) -> Self {
        ManagedValue { value, cleanup }
    }

    pub fn unmanaged(value: ValueId) -> Self {
        ManagedValue { value, cleanup: None }
    }

    pub fn value(&self) -> ValueId {
        self.value
    }

    pub fn cleanup(&self) -> Option<CleanupHandle> {
        self.cleanup
    }

    pub fn has_cleanup(&self) -> bool {
        self.cleanup.is_some()
    }

    /// The same ownership attached to a reinterpretation of the value (a cast).
    pub fn with_value(self, value: ValueId) -> Self {
        ManagedValue { value, cleanup: self.cleanup }
    }

    pub fn forward_cleanup(&self, em: &mut FunctionEmitter<'_>) -> PolyResult<()> {
        if let Some(handle) = self.cleanup {
            em.cleanups.forward(handle)?;
        }
        Ok(())
    }

    pub fn forward(self, em: &mut FunctionEmitter<'_>) -> PolyResult<ValueId> {
        self.forward_cleanup(em)?;
        Ok(self.value)
    }

    /// Moves the value into uninitialized memory at `dest`.
    pub fn forward_into(self, em: &mut FunctionEmitter<'_>, dest: ValueId) -> PolyResult<()> {
        let is_address = em.value_type(self.value).is_address;
        let src = self.forward(em)?;
        if is_address {
            em.b.push(InstKind::CopyAddr { src, dest, take: true });
        } else {
            em.b.push(InstKind::Store { value: src, addr: dest });
        }
        Ok(())
    }
}

/// Memory being initialized, guarded by a dormant destroy cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemporaryInit {
    pub addr: ValueId,
    pub cleanup: Option<CleanupHandle>,
}

impl TemporaryInit {
    pub fn finish_initialization(&self, em: &mut FunctionEmitter<'_>) -> PolyResult<()> {
        if let Some(handle) = self.cleanup {
            em.cleanups.activate(handle)?;
        }
        Ok(())
    }

    pub fn managed_address(&self) -> ManagedValue {
        ManagedValue::new(self.addr, self.cleanup)
    }
}
