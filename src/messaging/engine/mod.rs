//! Per-destination message engines
//!
//! Each destination that has seen a message gets an engine: a tokio task
//! fed by a channel. Triggers are coalesced, so however many events arrive
//! while a run is queued, the engine performs one run for them. Each run
//! snapshots the destination's pending-exposure tracker and exposes it.

pub(crate) mod delivery;
pub(crate) mod exposure;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use strum_macros::Display;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

use crate::core::sync::handle_mutex_poison;
use crate::messaging::context::MessagingContext;
use crate::messaging::error::{MessagingError, MessagingResult};
use crate::messaging::identifier::Identifier;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Display)]
pub enum EngineState {
    Idle,
    Running,
}

#[derive(Debug)]
enum EngineEvent {
    Run,
}

/// Coalescing run loop for one destination
pub struct MessageEngine {
    destination: Identifier,
    sender: UnboundedSender<EngineEvent>,
    pending: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl MessageEngine {
    fn start(destination: Identifier, context: Weak<MessagingContext>, runtime: &Handle) -> Self {
        let (sender, receiver) = unbounded_channel();
        let pending = Arc::new(AtomicBool::new(false));
        let running = Arc::new(AtomicBool::new(false));

        let task = runtime.spawn(run_loop(
            destination.clone(),
            context,
            receiver,
            Arc::clone(&pending),
            Arc::clone(&running),
        ));
        log::debug!("Started message engine for {}", destination);

        Self {
            destination,
            sender,
            pending,
            running,
            task,
        }
    }

    pub fn destination(&self) -> &Identifier {
        &self.destination
    }

    /// Queue a run unless one is already queued; returns false when absorbed
    pub fn submit(&self) -> bool {
        if self.pending.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.sender.send(EngineEvent::Run).is_err() {
            self.pending.store(false, Ordering::Release);
            return false;
        }
        true
    }

    pub fn state(&self) -> EngineState {
        if self.running.load(Ordering::Acquire) {
            EngineState::Running
        } else {
            EngineState::Idle
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

async fn run_loop(
    destination: Identifier,
    context: Weak<MessagingContext>,
    mut receiver: UnboundedReceiver<EngineEvent>,
    pending: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
) {
    while let Some(EngineEvent::Run) = receiver.recv().await {
        pending.store(false, Ordering::Release);
        let Some(context) = context.upgrade() else {
            break;
        };

        running.store(true, Ordering::Release);
        if let Err(e) = exposure::run_exposure(&context, &destination) {
            log::warn!("Exposure run for {} failed: {}", destination, e);
        }
        running.store(false, Ordering::Release);
    }
    log::debug!("Message engine for {} stopped", destination);
}

/// Engines by destination; created on first trigger, disposed with the destination
pub struct EngineRegistry {
    engines: Mutex<HashMap<Identifier, MessageEngine>>,
    context: Weak<MessagingContext>,
    runtime: Handle,
}

impl EngineRegistry {
    pub(crate) fn new(context: Weak<MessagingContext>, runtime: Handle) -> Self {
        Self {
            engines: Mutex::new(HashMap::new()),
            context,
            runtime,
        }
    }

    fn lock(&self) -> MessagingResult<MutexGuard<'_, HashMap<Identifier, MessageEngine>>> {
        handle_mutex_poison(self.engines.lock(), |message| MessagingError::Runtime {
            message,
        })
    }

    /// Trigger a run for `destination`, starting its engine if needed
    pub fn submit(&self, destination: &Identifier) -> MessagingResult<bool> {
        let mut engines = self.lock()?;
        let engine = engines.entry(destination.clone()).or_insert_with(|| {
            MessageEngine::start(destination.clone(), self.context.clone(), &self.runtime)
        });
        Ok(engine.submit())
    }

    /// Stop and forget the engine; its task ends once the channel drains
    pub fn dispose(&self, destination: &Identifier) -> MessagingResult<bool> {
        let disposed = self.lock()?.remove(destination);
        if disposed.is_some() {
            log::debug!("Disposed message engine for {}", destination);
        }
        Ok(disposed.is_some())
    }

    pub fn dispose_all(&self) -> MessagingResult<usize> {
        let mut engines = self.lock()?;
        let count = engines.len();
        engines.clear();
        Ok(count)
    }

    pub fn state(&self, destination: &Identifier) -> Option<EngineState> {
        self.lock()
            .ok()?
            .get(destination)
            .map(|engine| engine.state())
    }

    pub fn contains(&self, destination: &Identifier) -> bool {
        self.lock()
            .map(|engines| engines.contains_key(destination))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.lock().map(|engines| engines.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
