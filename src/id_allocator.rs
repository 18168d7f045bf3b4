/*
 * Mints control ids. Owned by the application root (the main window) and
 * handed to whatever creates child controls, so id assignment is explicit and
 * restarts from the same base in every test.
 */
use std::cell::Cell;

use crate::error::{PlatformError, Result as PlatformResult};
use crate::types::ControlId;

/// Arbitrary, taken from the Visual Studio resource editor.
pub const DEFAULT_BASE_ID: u16 = 1000;

#[derive(Debug)]
pub struct IdAllocator {
    last: Cell<u16>,
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_ID)
    }
}

impl IdAllocator {
    /// Ids handed out start at `base + 1`.
    pub fn new(base: u16) -> Self {
        Self {
            last: Cell::new(base),
        }
    }

    pub fn next_id(&self) -> PlatformResult<ControlId> {
        let last = self.last.get();
        let next = last
            .checked_add(1)
            .ok_or(PlatformError::IdSpaceExhausted(last))?;
        self.last.set(next);
        Ok(ControlId(next))
    }

    pub fn last_issued(&self) -> u16 {
        self.last.get()
    }
}

/// A control's id: fixed by the caller, or drawn from an allocator on first use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ControlIdGuard {
    id: Option<ControlId>,
}

impl ControlIdGuard {
    pub fn auto() -> Self {
        Self { id: None }
    }

    pub fn fixed(id: ControlId) -> Self {
        Self { id: Some(id) }
    }

    pub fn resolve(&mut self, ids: &IdAllocator) -> PlatformResult<ControlId> {
        match self.id {
            Some(id) => Ok(id),
            None => {
                let id = ids.next_id()?;
                self.id = Some(id);
                Ok(id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_sequential_after_base() {
        let ids = IdAllocator::default();
        assert_eq!(ids.next_id().ok(), Some(ControlId(1001)));
        assert_eq!(ids.next_id().ok(), Some(ControlId(1002)));
        assert_eq!(ids.last_issued(), 1002);
    }

    #[test]
    fn separate_allocators_are_independent() {
        let a = IdAllocator::default();
        let b = IdAllocator::default();
        let _ = a.next_id();
        assert_eq!(b.next_id().ok(), Some(ControlId(1001)));
    }

    #[test]
    fn exhaustion_is_an_error() {
        let ids = IdAllocator::new(u16::MAX - 1);
        assert_eq!(ids.next_id().ok(), Some(ControlId(u16::MAX)));
        assert!(matches!(
            ids.next_id(),
            Err(PlatformError::IdSpaceExhausted(u16::MAX))
        ));
    }

    #[test]
    fn guard_draws_once_and_fixed_ids_never_draw() {
        let ids = IdAllocator::default();
        let mut auto = ControlIdGuard::auto();
        let first = auto.resolve(&ids).expect("id");
        assert_eq!(auto.resolve(&ids).expect("id"), first);

        let mut fixed = ControlIdGuard::fixed(ControlId(40));
        assert_eq!(fixed.resolve(&ids).expect("id"), ControlId(40));
        assert_eq!(ids.last_issued(), 1001);
    }
}
