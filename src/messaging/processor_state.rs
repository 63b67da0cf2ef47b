//! Per-destination gate for background delivery tasks
//!
//! At most one delivery task exists per destination. A request arriving
//! while the task runs is folded into one more pass by that same task.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use strum_macros::Display;

use crate::core::sync::handle_mutex_poison;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::Identifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum ProcessorState {
    Idle,
    Scheduled,
    Running,
}

#[derive(Debug, Default)]
pub struct ProcessorStateManager {
    states: Mutex<HashMap<Identifier, ProcessorState>>,
}

impl ProcessorStateManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MessagingResult<MutexGuard<'_, HashMap<Identifier, ProcessorState>>> {
        handle_mutex_poison(self.states.lock(), |message| MessagingError::Runtime {
            message,
        })
    }

    pub fn state(&self, destination: &Identifier) -> MessagingResult<ProcessorState> {
        Ok(self
            .lock()?
            .get(destination)
            .copied()
            .unwrap_or(ProcessorState::Idle))
    }

    /// Ask for a delivery pass
    ///
    /// Returns true only on Idle -> Scheduled, in which case the caller must
    /// start the task. A request while Running marks the destination
    /// Scheduled so the running task makes another pass.
    pub fn try_schedule(&self, destination: &Identifier) -> MessagingResult<bool> {
        let mut states = self.lock()?;
        let state = states
            .entry(destination.clone())
            .or_insert(ProcessorState::Idle);
        match *state {
            ProcessorState::Idle => {
                *state = ProcessorState::Scheduled;
                Ok(true)
            }
            ProcessorState::Running => {
                *state = ProcessorState::Scheduled;
                Ok(false)
            }
            ProcessorState::Scheduled => Ok(false),
        }
    }

    /// Scheduled -> Running; false if there is nothing scheduled
    pub fn start_running(&self, destination: &Identifier) -> MessagingResult<bool> {
        let mut states = self.lock()?;
        match states.get_mut(destination) {
            Some(state) if *state == ProcessorState::Scheduled => {
                *state = ProcessorState::Running;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// End a pass; true when another pass was requested meanwhile
    pub fn finish(&self, destination: &Identifier) -> MessagingResult<bool> {
        let mut states = self.lock()?;
        match states.get(destination).copied() {
            Some(ProcessorState::Scheduled) => Ok(true),
            Some(ProcessorState::Running) => {
                states.remove(destination);
                Ok(false)
            }
            _ => Ok(false),
        }
    }

    pub fn remove(&self, destination: &Identifier) -> MessagingResult<()> {
        self.lock()?.remove(destination);
        Ok(())
    }
}
