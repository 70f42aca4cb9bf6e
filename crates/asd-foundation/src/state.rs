use crate::error::AsdError;
use crossbeam_channel::{Receiver, Sender};
use parking_lot::RwLock;
use std::sync::Arc;

/// Lifecycle of the `AsdEngine` driver, independent of any single track or
/// speaker's own state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    Initializing,
    Running,
    Recovering { from_error: String },
    Stopping,
    Stopped,
}

pub struct StateManager {
    state: Arc<RwLock<EngineState>>,
    state_tx: Sender<EngineState>,
    state_rx: Receiver<EngineState>,
}

impl Default for StateManager {
    fn default() -> Self {
        Self::new()
    }
}

impl StateManager {
    pub fn new() -> Self {
        let (state_tx, state_rx) = crossbeam_channel::unbounded();
        Self {
            state: Arc::new(RwLock::new(EngineState::Initializing)),
            state_tx,
            state_rx,
        }
    }

    pub fn transition(&self, new_state: EngineState) -> Result<(), AsdError> {
        let mut current = self.state.write();

        let valid = matches!(
            (&*current, &new_state),
            (EngineState::Initializing, EngineState::Running)
                | (EngineState::Running, EngineState::Recovering { .. })
                | (EngineState::Running, EngineState::Stopping)
                | (EngineState::Recovering { .. }, EngineState::Running)
                | (EngineState::Recovering { .. }, EngineState::Stopping)
                | (EngineState::Stopping, EngineState::Stopped)
        );

        if !valid {
            return Err(AsdError::Fatal(format!(
                "invalid engine state transition: {:?} -> {:?}",
                *current, new_state
            )));
        }

        tracing::info!("engine state transition: {:?} -> {:?}", *current, new_state);
        *current = new_state.clone();
        let _ = self.state_tx.send(new_state);
        Ok(())
    }

    pub fn current(&self) -> EngineState {
        self.state.read().clone()
    }

    pub fn subscribe(&self) -> Receiver<EngineState> {
        self.state_rx.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_transitions_succeed() {
        let sm = StateManager::new();
        assert_eq!(sm.current(), EngineState::Initializing);
        sm.transition(EngineState::Running).unwrap();
        sm.transition(EngineState::Stopping).unwrap();
        sm.transition(EngineState::Stopped).unwrap();
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let sm = StateManager::new();
        assert!(sm.transition(EngineState::Stopped).is_err());
    }
}
