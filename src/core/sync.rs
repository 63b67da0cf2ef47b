//! Lock helpers shared by the grid and messaging layers
//!
//! Every registry in this crate is guarded by a `std::sync` lock. A panic while
//! holding one of them poisons the lock; these helpers turn that poison into a
//! typed error of the caller's choosing instead of propagating the panic.

use std::sync::{LockResult, MutexGuard, RwLockReadGuard, RwLockWriteGuard};

/// Convert a poisoned `Mutex::lock()` result into an application error
///
/// # Examples
/// ```
/// use std::sync::Mutex;
/// use gridmq::core::sync::handle_mutex_poison;
///
/// let counter = Mutex::new(7_i64);
/// let guard = handle_mutex_poison(counter.lock(), |msg| msg).unwrap();
/// assert_eq!(*guard, 7);
/// ```
pub fn handle_mutex_poison<'a, T, E>(
    result: LockResult<MutexGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<MutexGuard<'a, T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "mutex poisoned: a panic occurred while the lock was held ({poison_err})"
        ))
    })
}

/// Convert a poisoned `RwLock::read()` result into an application error
pub fn handle_rwlock_read<'a, T, E>(
    result: LockResult<RwLockReadGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockReadGuard<'a, T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "rwlock poisoned on read: a writer panicked while holding the lock ({poison_err})"
        ))
    })
}

/// Convert a poisoned `RwLock::write()` result into an application error
pub fn handle_rwlock_write<'a, T, E>(
    result: LockResult<RwLockWriteGuard<'a, T>>,
    error_constructor: impl FnOnce(String) -> E,
) -> Result<RwLockWriteGuard<'a, T>, E> {
    result.map_err(|poison_err| {
        error_constructor(format!(
            "rwlock poisoned on write: a panic occurred while the lock was held ({poison_err})"
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex, RwLock};
    use std::thread;

    #[derive(Debug, PartialEq)]
    struct RegistryError {
        message: String,
    }

    #[test]
    fn test_handle_mutex_poison_success() {
        let mutex = Mutex::new(42);
        let guard = handle_mutex_poison(mutex.lock(), |message| RegistryError { message });

        assert_eq!(*guard.unwrap(), 42);
    }

    #[test]
    fn test_handle_mutex_poison_with_poisoned_mutex() {
        let mutex = Arc::new(Mutex::new(42));
        let mutex_clone = Arc::clone(&mutex);

        let _ = thread::spawn(move || {
            let _guard = mutex_clone.lock().unwrap();
            panic!("poison the registry lock");
        })
        .join();

        let result = handle_mutex_poison(mutex.lock(), |message| RegistryError { message });
        let error = result.unwrap_err();
        assert!(error.message.contains("mutex poisoned"));
    }

    #[test]
    fn test_handle_rwlock_read_and_write() {
        let rwlock = RwLock::new(1);

        {
            let mut guard =
                handle_rwlock_write(rwlock.write(), |message| RegistryError { message }).unwrap();
            *guard = 100;
        }

        let guard = handle_rwlock_read(rwlock.read(), |message| RegistryError { message }).unwrap();
        assert_eq!(*guard, 100);
    }

    #[test]
    fn test_handle_rwlock_write_poisoned() {
        let rwlock = Arc::new(RwLock::new(0));
        let clone = Arc::clone(&rwlock);

        let _ = thread::spawn(move || {
            let _guard = clone.write().unwrap();
            panic!("poison the partition lock");
        })
        .join();

        let result = handle_rwlock_write(rwlock.write(), |message| RegistryError { message });
        assert!(result.unwrap_err().message.contains("poisoned on write"));
    }
}
