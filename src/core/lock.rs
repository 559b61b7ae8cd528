//! # Poison-tolerant lock helpers.
//!
//! Registry, subscription and activity tables live behind `std::sync` locks so that
//! application threads can call into the engine without an async runtime.
//!
//! A panic inside a critical section poisons the lock. The engine never leaves a table
//! half-updated across a panic point (every mutation is computed first and committed in
//! one step), so the helpers recover the guard instead of propagating the poison.
//!
//! ## Rules
//! - Never hold one of these guards across an `.await`.
//! - Lock order: registry map → widget cell → descriptor; subscription viewer entry →
//!   widget cell; change queue is always innermost.

use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[inline]
pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_recovers_poisoned_mutex() {
        let m = Arc::new(Mutex::new(1));
        let m2 = Arc::clone(&m);
        let _ = std::thread::spawn(move || {
            let _g = m2.lock().unwrap();
            panic!("poison");
        })
        .join();

        assert!(m.is_poisoned());
        *lock(&m) += 1;
        assert_eq!(*lock(&m), 2);
    }

    #[test]
    fn test_recovers_poisoned_rwlock() {
        let l = Arc::new(RwLock::new(vec![1]));
        let l2 = Arc::clone(&l);
        let _ = std::thread::spawn(move || {
            let _g = l2.write().unwrap();
            panic!("poison");
        })
        .join();

        write(&l).push(2);
        assert_eq!(*read(&l), vec![1, 2]);
    }
}
