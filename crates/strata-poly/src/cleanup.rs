//! Scoped cleanup obligations.
//!
//! Every owned value or temporary buffer an emitter creates registers a cleanup. Cleanups are
//! emitted in reverse registration order when their scope is popped, unless they were forwarded
//! first (ownership moved elsewhere).
//!
//! A cleanup starts either [`CleanupState::Active`] or [`CleanupState::Dormant`]. Dormant cleanups
//! guard memory that is about to be initialized: they are activated once initialization finished
//! and never emitted before that, so a partially initialized aggregate is never destroyed twice.

use strata_ir::ValueId;

use crate::error::{PolyError, PolyResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CleanupHandle(usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupState {
    Dormant,
    Active,
    Dead,
}

/// What a cleanup emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupAction {
    Release(ValueId),
    DestroyAddr(ValueId),
    DeallocStack(ValueId),
    /// Frees an existential container whose payload was moved out.
    DeinitExistential(ValueId),
}

#[derive(Debug, Clone)]
struct Entry {
    action: CleanupAction,
    state: CleanupState,
}

/// Entries are never removed, so a handle stays valid after its scope is popped.
#[derive(Debug, Clone, Default)]
pub struct CleanupStack {
    entries: Vec<Entry>,
    scopes: Vec<usize>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, action: CleanupAction, state: CleanupState) -> CleanupHandle {
        self.entries.push(Entry { action, state });
        CleanupHandle(self.entries.len() - 1)
    }

    pub fn state(&self, handle: CleanupHandle) -> Option<CleanupState> {
        self.entries.get(handle.0).map(|e| e.state)
    }

    fn entry(&mut self, handle: CleanupHandle) -> PolyResult<&mut Entry> {
        self.entries
            .get_mut(handle.0)
            .ok_or_else(|| PolyError::invariant(format!("unknown cleanup {:?}", handle)))
    }

    /// Disables a cleanup because ownership moved elsewhere.
    pub fn forward(&mut self, handle: CleanupHandle) -> PolyResult<()> {
        let entry = self.entry(handle)?;
        if entry.state == CleanupState::Dead {
            return Err(PolyError::invariant(format!("cleanup {:?} forwarded twice", entry.action)));
        }
        entry.state = CleanupState::Dead;
        Ok(())
    }

    pub fn activate(&mut self, handle: CleanupHandle) -> PolyResult<()> {
        let entry = self.entry(handle)?;
        if entry.state != CleanupState::Dormant {
            return Err(PolyError::invariant(format!(
                "cleanup {:?} activated from {:?}",
                entry.action, entry.state
            )));
        }
        entry.state = CleanupState::Active;
        Ok(())
    }

    /// Hands the ownership of `elements` over to `aggregate`.
    ///
    /// Either every element is deactivated and the aggregate activated, or, when any handle is in
    /// the wrong state, nothing changes.
    pub fn commit_batch(&mut self, elements: &[CleanupHandle], aggregate: Option<CleanupHandle>) -> PolyResult<()> {
        for handle in elements {
            match self.state(*handle) {
                Some(CleanupState::Active | CleanupState::Dormant) => {}
                other => {
                    return Err(PolyError::invariant(format!(
                        "cannot commit element cleanup {:?} in state {:?}",
                        handle, other
                    )))
                }
            }
        }
        if let Some(handle) = aggregate {
            if self.state(handle) != Some(CleanupState::Dormant) {
                return Err(PolyError::invariant(format!("aggregate cleanup {:?} is not dormant", handle)));
            }
        }
        for handle in elements {
            self.entries[handle.0].state = CleanupState::Dead;
        }
        if let Some(handle) = aggregate {
            self.entries[handle.0].state = CleanupState::Active;
        }
        Ok(())
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(self.entries.len());
    }

    /// Closes the innermost scope and returns the actions to emit, innermost first.
    pub fn pop_scope(&mut self) -> PolyResult<Vec<CleanupAction>> {
        let start = self.scopes.pop().ok_or_else(|| PolyError::invariant("cleanup scope stack is empty"))?;
        let mut actions = Vec::new();
        for entry in self.entries[start..].iter_mut().rev() {
            if entry.state == CleanupState::Active {
                actions.push(entry.action);
            }
            entry.state = CleanupState::Dead;
        }
        Ok(actions)
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }
}
