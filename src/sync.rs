use std::sync::{Mutex, MutexGuard};

use tracing::warn;

/// Locks a mutex, recovering the guard if another thread panicked while holding it
pub(crate) fn lock<'a, T>(mutex: &'a Mutex<T>, target: &'static str) -> MutexGuard<'a, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                target_module = target,
                result = "poisoned_recovered",
                "Recovered from poisoned lock"
            );
            poisoned.into_inner()
        }
    }
}
