/*
 * Window lifecycle state machine:
 *
 *   Unconfigured -> Configured -> Created -> Running -> Destroyed
 *                                    \__________________/
 *
 * A window that fails to be created stays `Configured` and may be retried.
 * `Destroyed` is terminal and reaching it twice is a no-op.
 */

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WindowState {
    #[default]
    Unconfigured,
    Configured,
    Created,
    Running,
    Destroyed,
}

impl WindowState {
    pub fn can_advance_to(self, next: WindowState) -> bool {
        use WindowState::*;
        matches!(
            (self, next),
            (Unconfigured, Configured)
                | (Configured, Created)
                | (Created, Running)
                | (Created, Destroyed)
                | (Running, Destroyed)
        )
    }

    pub fn is_alive(self) -> bool {
        matches!(self, WindowState::Created | WindowState::Running)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    state: WindowState,
    history: Vec<WindowState>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: WindowState::Unconfigured,
            history: vec![WindowState::Unconfigured],
        }
    }

    /// Options accepted: the state every window starts its native life from.
    pub(crate) fn configured() -> Self {
        let mut lc = Self::new();
        lc.state = WindowState::Configured;
        lc.history.push(WindowState::Configured);
        lc
    }

    pub(crate) fn state(&self) -> WindowState {
        self.state
    }

    /// Every state visited, in order.
    pub(crate) fn history(&self) -> &[WindowState] {
        &self.history
    }

    pub(crate) fn advance(
        &mut self,
        next: WindowState,
    ) -> Result<(), crate::error::PlatformError> {
        if !self.state.can_advance_to(next) {
            return Err(crate::error::PlatformError::InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        log::debug!("Lifecycle: {:?} -> {next:?}", self.state);
        self.state = next;
        self.history.push(next);
        Ok(())
    }

    /// Moves to `Destroyed` if alive. Returns `true` only for the call that did it.
    pub(crate) fn mark_destroyed(&mut self) -> bool {
        if self.state.is_alive() {
            // Created/Running -> Destroyed is always a legal edge.
            self.state = WindowState::Destroyed;
            self.history.push(WindowState::Destroyed);
            log::debug!("Lifecycle: -> Destroyed");
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PlatformError;

    #[test]
    fn full_sequence_is_accepted() {
        let mut lc = Lifecycle::new();
        lc.advance(WindowState::Configured).expect("configure");
        lc.advance(WindowState::Created).expect("create");
        lc.advance(WindowState::Running).expect("run");
        assert!(lc.mark_destroyed());
        assert_eq!(
            lc.history(),
            &[
                WindowState::Unconfigured,
                WindowState::Configured,
                WindowState::Created,
                WindowState::Running,
                WindowState::Destroyed,
            ]
        );
    }

    #[test]
    fn skipping_a_state_is_rejected() {
        let mut lc = Lifecycle::new();
        lc.advance(WindowState::Configured).expect("configure");
        match lc.advance(WindowState::Running) {
            Err(PlatformError::InvalidTransition { from, to }) => {
                assert_eq!(from, WindowState::Configured);
                assert_eq!(to, WindowState::Running);
            }
            other => panic!("expected invalid transition, got {other:?}"),
        }
        assert_eq!(lc.state(), WindowState::Configured);
    }

    #[test]
    fn destruction_happens_once() {
        let mut lc = Lifecycle::new();
        lc.advance(WindowState::Configured).expect("configure");
        assert!(!lc.mark_destroyed());
        lc.advance(WindowState::Created).expect("create");
        assert!(lc.mark_destroyed());
        assert!(!lc.mark_destroyed());
        assert_eq!(
            lc.history()
                .iter()
                .filter(|s| **s == WindowState::Destroyed)
                .count(),
            1
        );
    }

    #[test]
    fn destroyed_is_terminal() {
        for next in [
            WindowState::Unconfigured,
            WindowState::Configured,
            WindowState::Created,
            WindowState::Running,
            WindowState::Destroyed,
        ] {
            assert!(!WindowState::Destroyed.can_advance_to(next));
        }
    }
}
