//! Subsystem contract and lifecycle state.
//!
//! ```text
//! NotStarted → Starting → Running → Stopping → Stopped
//!                  │                               │
//!                  └──── (start failed) ───────────┘
//! ```
//! A stopped subsystem may be started again.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::engine::services::ServiceGroup;

pub const MSG_STARTING: &str = "starting...";
pub const MSG_STARTED: &str = "started.";
pub const MSG_SHUTTING_DOWN: &str = "shutting down...";
pub const MSG_SHUTDOWN: &str = "shutdown.";

#[derive(Debug, Error)]
pub enum SubsystemError {
    #[error("subsystem already started")]
    AlreadyStarted,

    #[error("subsystem not started")]
    NotStarted,

    #[error("subsystem not setup")]
    NotSetUp,

    /// Benign: the database is switched off in config.
    #[error("database support disabled")]
    DatabaseSupportDisabled,

    #[error("{name} failed to start: {reason}")]
    Start { name: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SubsystemState {
    NotStarted = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
}

impl SubsystemState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::NotStarted,
        }
    }
}

/// Atomic lifecycle state with guarded transitions.
#[derive(Debug, Default)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new() -> Self {
        Self(AtomicU8::new(SubsystemState::NotStarted as u8))
    }

    pub fn get(&self) -> SubsystemState {
        SubsystemState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.get() == SubsystemState::Running
    }

    fn transition(&self, from: SubsystemState, to: SubsystemState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    /// NotStarted or Stopped → Starting.
    pub fn begin_start(&self) -> Result<(), SubsystemError> {
        if self.transition(SubsystemState::NotStarted, SubsystemState::Starting)
            || self.transition(SubsystemState::Stopped, SubsystemState::Starting)
        {
            Ok(())
        } else {
            Err(SubsystemError::AlreadyStarted)
        }
    }

    pub fn finish_start(&self) {
        self.0.store(SubsystemState::Running as u8, Ordering::SeqCst);
    }

    /// Running → Stopping.
    pub fn begin_stop(&self) -> Result<(), SubsystemError> {
        if self.transition(SubsystemState::Running, SubsystemState::Stopping) {
            Ok(())
        } else {
            Err(SubsystemError::NotStarted)
        }
    }

    /// Marks the subsystem stopped from any state.
    pub fn finish_stop(&self) {
        self.0.store(SubsystemState::Stopped as u8, Ordering::SeqCst);
    }
}

/// A service the engine can start and stop.
#[async_trait]
pub trait Subsystem: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_running(&self) -> bool;

    /// Starts the subsystem; long-running work is spawned into `services`.
    async fn start(&self, services: &ServiceGroup) -> Result<(), SubsystemError>;

    async fn stop(&self) -> Result<(), SubsystemError>;
}

#[async_trait]
impl<T: Subsystem + ?Sized> Subsystem for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn is_running(&self) -> bool {
        (**self).is_running()
    }

    async fn start(&self, services: &ServiceGroup) -> Result<(), SubsystemError> {
        (**self).start(services).await
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        (**self).stop().await
    }
}

/// An unconfigured subsystem: never running, every lifecycle call fails
/// with [`SubsystemError::NotSetUp`].
#[async_trait]
impl<T: Subsystem> Subsystem for Option<T> {
    fn name(&self) -> &'static str {
        self.as_ref().map_or("unconfigured", |inner| inner.name())
    }

    fn is_running(&self) -> bool {
        self.as_ref().is_some_and(|inner| inner.is_running())
    }

    async fn start(&self, services: &ServiceGroup) -> Result<(), SubsystemError> {
        match self {
            Some(inner) => inner.start(services).await,
            None => Err(SubsystemError::NotSetUp),
        }
    }

    async fn stop(&self) -> Result<(), SubsystemError> {
        match self {
            Some(inner) => inner.stop().await,
            None => Err(SubsystemError::NotSetUp),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Idle {
        state: StateCell,
    }

    #[async_trait]
    impl Subsystem for Idle {
        fn name(&self) -> &'static str {
            "idle"
        }

        fn is_running(&self) -> bool {
            self.state.is_running()
        }

        async fn start(&self, _services: &ServiceGroup) -> Result<(), SubsystemError> {
            self.state.begin_start()?;
            self.state.finish_start();
            Ok(())
        }

        async fn stop(&self) -> Result<(), SubsystemError> {
            self.state.begin_stop()?;
            self.state.finish_stop();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_lifecycle_errors() {
        let services = ServiceGroup::new();
        let idle = Idle {
            state: StateCell::new(),
        };

        assert!(matches!(idle.stop().await, Err(SubsystemError::NotStarted)));
        idle.start(&services).await.unwrap();
        assert!(idle.is_running());
        assert!(matches!(
            idle.start(&services).await,
            Err(SubsystemError::AlreadyStarted)
        ));

        idle.stop().await.unwrap();
        assert_eq!(idle.state.get(), SubsystemState::Stopped);
        idle.start(&services).await.unwrap();
    }

    #[tokio::test]
    async fn test_unconfigured_subsystem() {
        let services = ServiceGroup::new();
        let missing: Option<Idle> = None;

        assert!(!missing.is_running());
        assert_eq!(
            missing.start(&services).await.unwrap_err().to_string(),
            "subsystem not setup"
        );
        assert_eq!(missing.stop().await.unwrap_err().to_string(), "subsystem not setup");
    }
}
