//! Service availability state machine.

use tidesync_core::types::ServiceState;

use crate::error::{RemoteError, SyncError};

/// A state change worth broadcasting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: ServiceState,
    pub to: ServiceState,
    pub description: String,
}

/// Tracks [`ServiceState`] and gates remote I/O.
///
/// Every mutator returns `Some(Transition)` only when the state value
/// actually changed.
#[derive(Debug)]
pub struct ServiceStateMachine {
    state: ServiceState,
}

impl ServiceStateMachine {
    pub fn new(enabled: bool) -> Self {
        Self {
            state: if enabled {
                ServiceState::Ok
            } else {
                ServiceState::Disabled
            },
        }
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn is_disabled(&self) -> bool {
        self.state == ServiceState::Disabled
    }

    /// Gate for operations that need the remote.
    ///
    /// `Ok(true)`: go ahead. `Ok(false)`: disabled, defer silently.
    /// `Err`: terminal auth/permission state.
    pub fn check_remote_io(&self) -> Result<bool, SyncError> {
        match self.state {
            ServiceState::Ok | ServiceState::TemporaryUnavailable => Ok(true),
            ServiceState::Disabled => Ok(false),
            state => Err(SyncError::ServiceUnavailable(state)),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) -> Option<Transition> {
        match (enabled, self.state) {
            (false, ServiceState::Disabled) => None,
            (false, _) => self.move_to(ServiceState::Disabled, "sync disabled"),
            (true, ServiceState::Disabled) => self.move_to(ServiceState::Ok, "sync enabled"),
            (true, _) => None,
        }
    }

    /// A remote call succeeded: clears a temporary outage.
    pub fn on_remote_success(&mut self) -> Option<Transition> {
        if self.state == ServiceState::TemporaryUnavailable {
            self.move_to(ServiceState::Ok, "remote service reachable")
        } else {
            None
        }
    }

    /// A remote call failed. Disabled is never overridden, and an auth or
    /// permission state only yields to the other terminal state.
    pub fn on_remote_error(&mut self, err: &RemoteError) -> Option<Transition> {
        if self.is_disabled() {
            return None;
        }
        let target = err.service_state()?;
        let target_terminal = matches!(
            target,
            ServiceState::AuthenticationRequired | ServiceState::AccessForbidden
        );
        if self.is_terminal() && !target_terminal {
            return None;
        }
        self.move_to(target, &err.to_string())
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            ServiceState::AuthenticationRequired | ServiceState::AccessForbidden
        )
    }

    pub fn on_reauthenticated(&mut self) -> Option<Transition> {
        if self.is_terminal() {
            self.move_to(ServiceState::Ok, "credentials refreshed")
        } else {
            None
        }
    }

    fn move_to(&mut self, to: ServiceState, description: &str) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        tracing::info!("service state: {from} -> {to} ({description})");
        Some(Transition {
            from,
            to,
            description: description.to_string(),
        })
    }
}
