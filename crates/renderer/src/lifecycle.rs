//! Renderer lifecycle state machine.

use std::fmt;

use tracing::trace;

use triangle_rhi::{RhiError, RhiResult};

/// Where the renderer is in its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RendererState {
    Uninitialized,
    Ready,
    Drawing,
    Recreating,
    ShuttingDown,
    Destroyed,
}

impl RendererState {
    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: RendererState) -> bool {
        use RendererState::*;
        matches!(
            (self, to),
            (Uninitialized, Ready)
                | (Ready, Drawing)
                | (Drawing, Ready)
                | (Drawing, Recreating)
                | (Ready, Recreating)
                | (Recreating, Ready)
                | (Ready | Drawing | Recreating, ShuttingDown)
                | (ShuttingDown, Destroyed)
        )
    }
}

impl fmt::Display for RendererState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RendererState::Uninitialized => "Uninitialized",
            RendererState::Ready => "Ready",
            RendererState::Drawing => "Drawing",
            RendererState::Recreating => "Recreating",
            RendererState::ShuttingDown => "ShuttingDown",
            RendererState::Destroyed => "Destroyed",
        };
        f.write_str(name)
    }
}

/// Current state plus the transition check.
#[derive(Debug)]
pub struct Lifecycle {
    state: RendererState,
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: RendererState::Uninitialized,
        }
    }

    #[inline]
    pub fn state(&self) -> RendererState {
        self.state
    }

    /// Moves to `to`, or fails with [`RhiError::InvalidState`] and leaves the state unchanged.
    pub fn transition(&mut self, to: RendererState) -> RhiResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(RhiError::InvalidState {
                from: self.state.to_string(),
                to: to.to_string(),
            });
        }
        trace!("Renderer state {} -> {}", self.state, to);
        self.state = to;
        Ok(())
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_uninitialized() {
        assert_eq!(Lifecycle::new().state(), RendererState::Uninitialized);
    }

    #[test]
    fn test_frame_and_recreate_cycle() {
        let mut lifecycle = Lifecycle::new();
        lifecycle.transition(RendererState::Ready).unwrap();
        lifecycle.transition(RendererState::Drawing).unwrap();
        lifecycle.transition(RendererState::Recreating).unwrap();
        lifecycle.transition(RendererState::Ready).unwrap();
        lifecycle.transition(RendererState::Drawing).unwrap();
        lifecycle.transition(RendererState::Ready).unwrap();
        lifecycle.transition(RendererState::Recreating).unwrap();
        lifecycle.transition(RendererState::ShuttingDown).unwrap();
        lifecycle.transition(RendererState::Destroyed).unwrap();
        assert_eq!(lifecycle.state(), RendererState::Destroyed);
    }

    #[test]
    fn test_cannot_draw_before_init() {
        let mut lifecycle = Lifecycle::new();
        let err = lifecycle.transition(RendererState::Drawing).unwrap_err();
        match err {
            RhiError::InvalidState { from, to } => {
                assert_eq!(from, "Uninitialized");
                assert_eq!(to, "Drawing");
            }
            other => panic!("expected InvalidState, got {other:?}"),
        }
        assert_eq!(lifecycle.state(), RendererState::Uninitialized);
    }

    #[test]
    fn test_destroyed_is_terminal() {
        use RendererState::*;
        for to in [Uninitialized, Ready, Drawing, Recreating, ShuttingDown, Destroyed] {
            assert!(!Destroyed.can_transition_to(to));
        }
    }

    #[test]
    fn test_shutdown_only_to_destroyed() {
        use RendererState::*;
        assert!(ShuttingDown.can_transition_to(Destroyed));
        assert!(!ShuttingDown.can_transition_to(Ready));
        assert!(!Uninitialized.can_transition_to(ShuttingDown));
        assert!(!Recreating.can_transition_to(Drawing));
    }
}
