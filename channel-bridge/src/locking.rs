use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a short, non-async critical section.
///
/// A panic while holding one of these locks cannot leave the guarded data
/// half-updated, so poisoning is ignored.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
