use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tracing::{trace, warn};

use crate::error::{Result, SessionError};

/// The queue was full; the new reply was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplyFifoFull;

/// Bounded queue of complete reply payloads.
///
/// Filled by the drain path while it holds the bus; emptied by any number of
/// blocking readers. When full, the newest reply is dropped so the ones
/// already queued keep their order.
#[derive(Debug)]
pub struct ReplyFifo {
    queue: Mutex<VecDeque<Bytes>>,
    ready: Condvar,
    capacity: usize,
}

impl ReplyFifo {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            ready: Condvar::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queue a reply, waking one reader.
    pub fn push(&self, reply: Bytes) -> std::result::Result<(), ReplyFifoFull> {
        let mut queue = self.lock();
        if queue.len() >= self.capacity {
            warn!(size = reply.len(), capacity = self.capacity, "reply queue full, dropping reply");
            return Err(ReplyFifoFull);
        }
        trace!(size = reply.len(), queued = queue.len() + 1, "reply queued");
        queue.push_back(reply);
        drop(queue);
        self.ready.notify_one();
        Ok(())
    }

    /// Remove the oldest reply, waiting up to `timeout` for one to arrive.
    pub fn pop_timeout(&self, timeout: Duration) -> Option<Bytes> {
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(self.lock(), timeout, |queue| queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        queue.pop_front()
    }

    /// Copy the oldest reply into `buf`, waiting up to `timeout`.
    ///
    /// A reply that does not fit stays queued.
    pub fn read_into(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let (mut queue, _) = self
            .ready
            .wait_timeout_while(self.lock(), timeout, |queue| queue.is_empty())
            .unwrap_or_else(PoisonError::into_inner);
        let needed = match queue.front() {
            Some(reply) => reply.len(),
            None => return Err(SessionError::Timeout(timeout)),
        };
        if needed > buf.len() {
            return Err(SessionError::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let Some(reply) = queue.pop_front() else {
            return Err(SessionError::Timeout(timeout));
        };
        buf[..needed].copy_from_slice(&reply);
        Ok(needed)
    }

    /// Drop every queued reply.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Bytes>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Reading end of a session's reply queue.
///
/// Holds its own reference to the queue, so it keeps working (and timing
/// out) after the session is gone.
#[derive(Debug, Clone)]
pub struct ReplyReader {
    fifo: Arc<ReplyFifo>,
    timeout: Duration,
}

impl ReplyReader {
    pub fn new(fifo: Arc<ReplyFifo>, timeout: Duration) -> Self {
        Self { fifo, timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Read the oldest reply into `buf`.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        self.fifo.read_into(buf, self.timeout)
    }

    /// Take the oldest reply.
    pub fn recv(&self) -> Result<Bytes> {
        self.fifo
            .pop_timeout(self.timeout)
            .ok_or(SessionError::Timeout(self.timeout))
    }

    /// Number of replies waiting.
    pub fn pending(&self) -> usize {
        self.fifo.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::thread;
    use std::time::Instant;

    use super::*;

    #[test]
    fn replies_come_out_in_order() {
        let fifo = ReplyFifo::new(4);
        fifo.push(Bytes::from_static(b"one")).unwrap();
        fifo.push(Bytes::from_static(b"two")).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(fifo.read_into(&mut buf, Duration::ZERO).unwrap(), 3);
        assert_eq!(&buf[..3], b"one");
        assert_eq!(fifo.pop_timeout(Duration::ZERO).unwrap().as_ref(), b"two");
    }

    #[test]
    fn full_queue_drops_newest() {
        let fifo = ReplyFifo::new(2);
        fifo.push(Bytes::from_static(b"a")).unwrap();
        fifo.push(Bytes::from_static(b"b")).unwrap();
        assert_eq!(fifo.push(Bytes::from_static(b"c")), Err(ReplyFifoFull));
        assert_eq!(fifo.len(), 2);
        assert_eq!(fifo.pop_timeout(Duration::ZERO).unwrap().as_ref(), b"a");
        assert_eq!(fifo.pop_timeout(Duration::ZERO).unwrap().as_ref(), b"b");
    }

    #[test]
    fn empty_read_times_out() {
        let fifo = ReplyFifo::new(2);
        let mut buf = [0u8; 4];
        let start = Instant::now();
        let err = fifo.read_into(&mut buf, Duration::from_millis(30)).unwrap_err();
        assert!(matches!(err, SessionError::Timeout(_)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn small_buffer_leaves_reply_queued() {
        let fifo = ReplyFifo::new(2);
        fifo.push(Bytes::from_static(b"too long")).unwrap();
        let mut buf = [0u8; 3];
        assert!(matches!(
            fifo.read_into(&mut buf, Duration::ZERO),
            Err(SessionError::BufferTooSmall { needed: 8, available: 3 })
        ));
        assert_eq!(fifo.len(), 1);
    }

    #[test]
    fn blocked_reader_wakes_on_push() {
        let fifo = Arc::new(ReplyFifo::new(4));
        let reader = ReplyReader::new(Arc::clone(&fifo), Duration::from_secs(5));
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            tx.send(()).unwrap();
            reader.recv()
        });

        rx.recv().unwrap();
        thread::sleep(Duration::from_millis(20));
        fifo.push(Bytes::from_static(b"late")).unwrap();

        assert_eq!(handle.join().unwrap().unwrap().as_ref(), b"late");
    }

    #[test]
    fn reader_outlives_its_producer() {
        let fifo = Arc::new(ReplyFifo::new(1));
        let reader = ReplyReader::new(Arc::clone(&fifo), Duration::from_millis(5));
        drop(fifo);
        assert!(matches!(reader.recv(), Err(SessionError::Timeout(_))));
        assert_eq!(reader.pending(), 0);
    }
}
