//! Session state management

use std::time::Instant;

use super::types::TimeUnit;

/// Session state machine
///
/// Represents the lifecycle of the topology currently owned by a session.
/// State transitions are validated so that a drained or failed session never
/// silently resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No topology has been started
    Idle,

    /// A topology is live and pulling samples
    Running {
        /// When the first topology of this run started
        started_at: Instant,
    },

    /// The live topology is draining up to `drain_time`
    Draining {
        /// Presentation time the topology drains to
        drain_time: TimeUnit,
    },

    /// The topology drained and was torn down; a new one may be started
    Stopped,

    /// A fatal error terminated the topology
    Failed,
}

impl PipelineState {
    /// Check if this state transition is valid
    pub fn can_transition_to(&self, target: &PipelineState) -> bool {
        use PipelineState::*;

        match (self, target) {
            (Idle, Running { .. }) => true,
            (Stopped, Running { .. }) => true,

            // Seamless topology switch keeps the session running
            (Running { .. }, Running { .. }) => true,
            (Running { .. }, Draining { .. }) => true,

            (Draining { .. }, Stopped) => true,

            (Failed, _) => false,
            (_, Failed) => true,

            _ => false,
        }
    }

    /// Get a human-readable description of this state
    pub fn description(&self) -> &'static str {
        match self {
            PipelineState::Idle => "Idle",
            PipelineState::Running { .. } => "Running",
            PipelineState::Draining { .. } => "Draining",
            PipelineState::Stopped => "Stopped",
            PipelineState::Failed => "Failed",
        }
    }

    /// Check if a topology is live (running or draining)
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            PipelineState::Running { .. } | PipelineState::Draining { .. }
        )
    }

    pub fn is_running(&self) -> bool {
        matches!(self, PipelineState::Running { .. })
    }

    pub fn is_draining(&self) -> bool {
        matches!(self, PipelineState::Draining { .. })
    }

    /// Get the duration since the session started (if running)
    pub fn running_duration(&self) -> Option<std::time::Duration> {
        if let PipelineState::Running { started_at } = self {
            Some(started_at.elapsed())
        } else {
            None
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.description())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_transitions() {
        let idle = PipelineState::Idle;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let draining = PipelineState::Draining { drain_time: 100 };
        let stopped = PipelineState::Stopped;

        assert!(idle.can_transition_to(&running));
        assert!(running.can_transition_to(&running));
        assert!(running.can_transition_to(&draining));
        assert!(draining.can_transition_to(&stopped));
        assert!(stopped.can_transition_to(&running));
        assert!(running.can_transition_to(&PipelineState::Failed));
    }

    #[test]
    fn test_invalid_transitions() {
        let idle = PipelineState::Idle;
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let draining = PipelineState::Draining { drain_time: 100 };

        assert!(!idle.can_transition_to(&draining));
        assert!(!idle.can_transition_to(&PipelineState::Stopped));
        assert!(!draining.can_transition_to(&running));
        assert!(!PipelineState::Failed.can_transition_to(&running));
    }

    #[test]
    fn test_state_checks() {
        let running = PipelineState::Running {
            started_at: Instant::now(),
        };
        let draining = PipelineState::Draining { drain_time: 0 };

        assert!(running.is_active());
        assert!(running.is_running());
        assert!(running.running_duration().is_some());

        assert!(draining.is_active());
        assert!(draining.is_draining());
        assert!(!draining.is_running());

        assert!(!PipelineState::Stopped.is_active());
        assert!(!PipelineState::Failed.is_active());
    }
}
