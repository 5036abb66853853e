//! Finite State Machine for deployment status

use crate::errors::DeployError;
use crate::models::deployment::DeploymentStatus;

/// Deployment event
#[derive(Debug, Clone)]
pub enum DeploymentEvent {
    /// First stage is about to run
    Start,

    /// Final stage completed
    Succeed,

    /// A stage or precondition failed
    Fail(String),
}

/// Deployment FSM
#[derive(Debug, Clone)]
pub struct DeploymentFsm {
    state: DeploymentStatus,
    error: Option<String>,
}

impl DeploymentFsm {
    /// Create a new FSM in pending state
    pub fn new() -> Self {
        Self::from_status(DeploymentStatus::Pending)
    }

    /// Resume an FSM from a persisted status
    pub fn from_status(state: DeploymentStatus) -> Self {
        Self { state, error: None }
    }

    /// Get current state
    pub fn state(&self) -> DeploymentStatus {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeploymentEvent) -> Result<DeploymentStatus, DeployError> {
        let new_state = match (self.state, &event) {
            (DeploymentStatus::Pending, DeploymentEvent::Start) => DeploymentStatus::Processing,

            // A pending deployment may fail before any stage runs
            (DeploymentStatus::Pending, DeploymentEvent::Fail(err))
            | (DeploymentStatus::Processing, DeploymentEvent::Fail(err)) => {
                self.error = Some(err.clone());
                DeploymentStatus::Failed
            }

            (DeploymentStatus::Processing, DeploymentEvent::Succeed) => DeploymentStatus::Success,

            // Terminal states are absorbing
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(new_state)
    }
}

impl Default for DeploymentFsm {
    fn default() -> Self {
        Self::new()
    }
}
