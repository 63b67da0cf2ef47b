//! Leases and the lease coordinator
//!
//! A lease is plain data stored alongside the state it guards. The
//! coordinator only decides *when* a lease has run out and notifies the
//! registered listener; what expiry means is up to the listener.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::core::sync::handle_mutex_poison;
use crate::core::time::{duration_millis, EpochMillis};
use crate::grid::error::{GridError, GridResult};

/// Time-bounded liveness claim
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lease {
    expiry_ms: EpochMillis,
    duration_ms: EpochMillis,
    suspended: bool,
}

impl Lease {
    pub fn new(duration: Duration, now: EpochMillis) -> Self {
        let duration_ms = duration_millis(duration);
        Self {
            expiry_ms: now.saturating_add(duration_ms),
            duration_ms,
            suspended: false,
        }
    }

    pub fn expiry(&self) -> EpochMillis {
        self.expiry_ms
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms.max(0) as u64)
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    /// Push the expiry out by one full duration from `now`
    pub fn extend(&mut self, now: EpochMillis) {
        self.expiry_ms = now.saturating_add(self.duration_ms);
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
    }

    /// Resume a suspended lease, granting a fresh duration
    pub fn resume(&mut self, now: EpochMillis) {
        self.suspended = false;
        self.extend(now);
    }

    /// Suspended leases never expire
    pub fn is_expired(&self, now: EpochMillis) -> bool {
        !self.suspended && now >= self.expiry_ms
    }
}

/// Callbacks for lease state changes
pub trait LeaseListener<Id>: Send + Sync {
    fn on_lease_expiry(&self, id: &Id, lease: &Lease);
    fn on_lease_canceled(&self, id: &Id, lease: &Lease);
    fn on_lease_suspended(&self, id: &Id, lease: &Lease);
}

/// Registration interface consumed by the messaging layer
pub trait LeaseCoordinator<Id>: Send + Sync {
    /// Register or replace the lease for `id`
    fn register_lease(
        &self,
        id: Id,
        lease: Lease,
        listener: Arc<dyn LeaseListener<Id>>,
    ) -> GridResult<()>;

    /// Forget `id` without notifying its listener
    fn deregister_lease(&self, id: &Id) -> GridResult<Option<Lease>>;
}

struct Registration<Id> {
    lease: Lease,
    listener: Arc<dyn LeaseListener<Id>>,
}

/// Lease coordinator for a single member, driven by an external clock
///
/// Nothing expires on its own: a sweeper (or a test) calls
/// [`LocalLeaseCoordinator::expire_due`] with the current time.
pub struct LocalLeaseCoordinator<Id> {
    registrations: Mutex<HashMap<Id, Registration<Id>>>,
}

impl<Id> Default for LocalLeaseCoordinator<Id> {
    fn default() -> Self {
        Self {
            registrations: Mutex::new(HashMap::new()),
        }
    }
}

impl<Id> LocalLeaseCoordinator<Id>
where
    Id: Eq + Hash + Clone + Debug + Send + Sync,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lease(&self, id: &Id) -> GridResult<Option<Lease>> {
        let registrations = self.lock()?;
        Ok(registrations.get(id).map(|r| r.lease.clone()))
    }

    pub fn len(&self) -> GridResult<usize> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> GridResult<bool> {
        Ok(self.len()? == 0)
    }

    fn lock(&self) -> GridResult<std::sync::MutexGuard<'_, HashMap<Id, Registration<Id>>>> {
        handle_mutex_poison(self.registrations.lock(), |message| GridError::Poisoned {
            message,
        })
    }

    /// Remove every lease that has expired by `now` and notify its listener
    pub fn expire_due(&self, now: EpochMillis) -> GridResult<Vec<Id>> {
        let expired: Vec<(Id, Registration<Id>)> = {
            let mut registrations = self.lock()?;
            let due: Vec<Id> = registrations
                .iter()
                .filter(|(_, r)| r.lease.is_expired(now))
                .map(|(id, _)| id.clone())
                .collect();
            due.into_iter()
                .filter_map(|id| registrations.remove(&id).map(|r| (id, r)))
                .collect()
        };

        for (id, registration) in &expired {
            log::debug!("Lease for {:?} expired at {}", id, registration.lease.expiry());
            registration.listener.on_lease_expiry(id, &registration.lease);
        }
        Ok(expired.into_iter().map(|(id, _)| id).collect())
    }

    /// Cancel a lease immediately, notifying its listener
    pub fn cancel(&self, id: &Id) -> GridResult<bool> {
        let registration = self.lock()?.remove(id);
        match registration {
            Some(registration) => {
                registration.listener.on_lease_canceled(id, &registration.lease);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Suspend a lease (it stops expiring), notifying its listener
    pub fn suspend(&self, id: &Id) -> GridResult<bool> {
        let notify = {
            let mut registrations = self.lock()?;
            registrations.get_mut(id).map(|registration| {
                registration.lease.suspend();
                (registration.lease.clone(), Arc::clone(&registration.listener))
            })
        };
        match notify {
            Some((lease, listener)) => {
                listener.on_lease_suspended(id, &lease);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl<Id> LeaseCoordinator<Id> for LocalLeaseCoordinator<Id>
where
    Id: Eq + Hash + Clone + Debug + Send + Sync,
{
    fn register_lease(
        &self,
        id: Id,
        lease: Lease,
        listener: Arc<dyn LeaseListener<Id>>,
    ) -> GridResult<()> {
        self.lock()?.insert(id, Registration { lease, listener });
        Ok(())
    }

    fn deregister_lease(&self, id: &Id) -> GridResult<Option<Lease>> {
        Ok(self.lock()?.remove(id).map(|r| r.lease))
    }
}
