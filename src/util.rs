use std::io;
use std::io::ErrorKind::UnexpectedEof;
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Turns a zero-length read into an [`UnexpectedEof`] error, for readers that must make
/// progress on every call.
pub trait Eof {
    type Value;

    fn eof_as_error(self) -> io::Result<Self::Value>;
}

impl Eof for io::Result<usize> {
    type Value = usize;

    fn eof_as_error(self) -> io::Result<Self::Value> {
        match self {
            Ok(0) => Err(io::Error::new(UnexpectedEof, "socket closed")),
            Ok(n) => Ok(n),
            Err(err) => Err(err),
        }
    }
}

/// Locks the mutex even if a previous holder panicked, the guarded state is kept consistent by
/// every critical section.
#[inline]
pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Non-blocking [`lock`], returns `None` while another thread holds the mutex.
#[inline]
pub fn try_lock<T>(mutex: &Mutex<T>) -> Option<MutexGuard<'_, T>> {
    match mutex.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

#[inline]
pub fn current_time_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_map_zero_read_to_eof() {
        let empty: io::Result<usize> = Ok(0);
        let err = empty.eof_as_error().expect_err("expected eof");
        assert_eq!(UnexpectedEof, err.kind());

        let partial: io::Result<usize> = Ok(5);
        assert_eq!(5, partial.eof_as_error().unwrap());
    }

    #[test]
    fn should_recover_poisoned_lock() {
        let mutex = Mutex::new(1);
        let _ = std::panic::catch_unwind::<_, ()>(|| {
            let _guard = mutex.lock().unwrap();
            panic!("poison");
        });
        assert!(mutex.is_poisoned());
        assert_eq!(1, *lock(&mutex));
        assert_eq!(Some(1), try_lock(&mutex).map(|guard| *guard));
    }

    #[test]
    fn should_not_block_on_held_lock() {
        let mutex = Mutex::new(1);
        let guard = lock(&mutex);
        assert!(try_lock(&mutex).is_none());
        drop(guard);
        assert!(try_lock(&mutex).is_some());
    }
}
