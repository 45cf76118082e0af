use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How often a cancellable waiter re-checks its token.
const CANCEL_POLL: Duration = Duration::from_millis(5);

/// Shared flag that aborts a pending [`BusLock::acquire_cancellable`].
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// The wait for the bus was cancelled before the lock was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cancelled;

/// Exclusive access to the bus and the state that is only touched during an
/// exchange.
///
/// The drain path waits unconditionally; command writers may give up while
/// waiting, in which case nothing guarded has been touched.
#[derive(Debug)]
pub struct BusLock<T> {
    held: Mutex<bool>,
    released: Condvar,
    inner: Mutex<T>,
}

impl<T> BusLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            held: Mutex::new(false),
            released: Condvar::new(),
            inner: Mutex::new(value),
        }
    }

    /// Block until the bus is free.
    pub fn acquire(&self) -> BusGuard<'_, T> {
        let mut held = self
            .released
            .wait_while(self.held(), |held| *held)
            .unwrap_or_else(PoisonError::into_inner);
        *held = true;
        drop(held);
        self.guard()
    }

    /// Block until the bus is free or `token` is cancelled.
    pub fn acquire_cancellable(&self, token: &CancelToken) -> Result<BusGuard<'_, T>, Cancelled> {
        let mut held = self.held();
        loop {
            if token.is_cancelled() {
                return Err(Cancelled);
            }
            if !*held {
                break;
            }
            held = self
                .released
                .wait_timeout(held, CANCEL_POLL)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        *held = true;
        drop(held);
        Ok(self.guard())
    }

    /// Access the guarded state without locking.
    pub fn get_mut(&mut self) -> &mut T {
        self.inner.get_mut().unwrap_or_else(PoisonError::into_inner)
    }

    fn held(&self) -> MutexGuard<'_, bool> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn guard(&self) -> BusGuard<'_, T> {
        BusGuard {
            lock: self,
            inner: self.inner.lock().unwrap_or_else(PoisonError::into_inner),
        }
    }

    /// Wakes every waiter. A cancelled writer leaves without passing a
    /// wakeup on, so waking only one could strand the drain path.
    fn release(&self) {
        *self.held() = false;
        self.released.notify_all();
    }
}

/// Held bus. Dropping it releases the bus and wakes the waiters.
pub struct BusGuard<'a, T> {
    lock: &'a BusLock<T>,
    inner: MutexGuard<'a, T>,
}

impl<T> Deref for BusGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> DerefMut for BusGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

impl<T> Drop for BusGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn guard_gives_exclusive_access() {
        let lock = BusLock::new(0u32);
        {
            let mut guard = lock.acquire();
            *guard += 1;
        }
        let token = CancelToken::new();
        let guard = lock.acquire_cancellable(&token).unwrap();
        assert_eq!(*guard, 1);
    }

    #[test]
    fn cancelled_waiter_gives_up_without_touching_state() {
        let lock = Arc::new(BusLock::new(Vec::<u8>::new()));
        let guard = lock.acquire();

        let token = CancelToken::new();
        let (tx, rx) = mpsc::channel();
        let waiter = {
            let lock = Arc::clone(&lock);
            let token = token.clone();
            thread::spawn(move || {
                tx.send(()).unwrap();
                lock.acquire_cancellable(&token).map(|mut state| state.push(1)).is_err()
            })
        };

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        token.cancel();
        assert!(waiter.join().unwrap());

        drop(guard);
        assert!(lock.acquire().is_empty());
    }

    #[test]
    fn pre_cancelled_token_fails_even_when_free() {
        let lock = BusLock::new(());
        let token = CancelToken::new();
        token.cancel();
        assert!(lock.acquire_cancellable(&token).is_err());
        drop(lock.acquire());
    }

    #[test]
    fn cancelled_writer_does_not_strand_blocking_waiter() {
        for _ in 0..20 {
            let lock = Arc::new(BusLock::new(0u32));
            let guard = lock.acquire();

            let token = CancelToken::new();
            let writer = {
                let lock = Arc::clone(&lock);
                let token = token.clone();
                thread::spawn(move || lock.acquire_cancellable(&token).is_err())
            };
            thread::sleep(Duration::from_millis(1));

            let (tx, rx) = mpsc::channel();
            let drainer = {
                let lock = Arc::clone(&lock);
                thread::spawn(move || {
                    *lock.acquire() += 1;
                    tx.send(()).unwrap();
                })
            };
            thread::sleep(Duration::from_millis(2));

            token.cancel();
            drop(guard);

            rx.recv_timeout(Duration::from_millis(500))
                .expect("blocking waiter should get the free bus");
            drainer.join().unwrap();
            writer.join().unwrap();
            assert_eq!(*lock.acquire(), 1);
        }
    }

    #[test]
    fn waiter_proceeds_after_release() {
        let lock = Arc::new(BusLock::new(0u32));
        let guard = lock.acquire();
        let start = Instant::now();

        let waiter = {
            let lock = Arc::clone(&lock);
            thread::spawn(move || {
                let mut state = lock.acquire_cancellable(&CancelToken::new()).unwrap();
                *state += 1;
            })
        };

        thread::sleep(Duration::from_millis(20));
        drop(guard);
        waiter.join().unwrap();
        assert!(start.elapsed() >= Duration::from_millis(20));
        assert_eq!(*lock.acquire(), 1);
    }
}
