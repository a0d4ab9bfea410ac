//! Bounded inter-stage queues (spec §4.6.4): every stage hands its output to
//! the next stage through a fixed-capacity FIFO. Default policy is
//! non-blocking drop-on-full so a slow downstream stage never stalls an
//! upstream one (spec §9 "Back-pressure... Non-blocking put; on failure,
//! record a drop and move on"); the Output stage additionally supports a
//! blocking-with-timeout put so a final result is never silently discarded
//! just because the UI momentarily isn't draining it (spec §4.6.4 "the
//! Output queue may block the Output worker briefly rather than drop").
//! Grounded in `orchestrator_parallel.py`'s `queue.Queue(maxsize=...)` usage.

use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};

/// Why a `try_put` failed to enqueue an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutError {
    QueueFull,
    Disconnected,
}

/// A bounded single-producer/multi-consumer-capable queue between two
/// pipeline stages, named for monitoring and log messages.
pub struct BoundedQueue<T> {
    name: &'static str,
    capacity: usize,
    sender: Sender<T>,
    receiver: Receiver<T>,
}

impl<T> BoundedQueue<T> {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let (sender, receiver) = channel::bounded(capacity);
        Self {
            name,
            capacity,
            sender,
            receiver,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn depth(&self) -> usize {
        self.sender.len()
    }

    pub fn sender(&self) -> Sender<T> {
        self.sender.clone()
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.receiver.clone()
    }

    /// Non-blocking enqueue (the default policy, spec §4.6.4). Returns
    /// `PutError::QueueFull` immediately rather than waiting for room.
    pub fn try_put(&self, item: T) -> Result<(), PutError> {
        match self.sender.try_send(item) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(PutError::QueueFull),
            Err(TrySendError::Disconnected(_)) => Err(PutError::Disconnected),
        }
    }

    /// Blocks up to `timeout` for room, used only by the Output stage (spec
    /// §4.6.4). Still returns `QueueFull` rather than blocking forever, so a
    /// permanently stuck consumer cannot wedge the worker thread.
    pub fn put_blocking_with_timeout(&self, item: T, timeout: Duration) -> Result<(), PutError> {
        // crossbeam's bounded Sender has no send-with-timeout directly; a
        // short spin-wait on try_send matches the blocking-send-then-drop
        // semantics described in spec §4.6.4 without depending on select!.
        let deadline = std::time::Instant::now() + timeout;
        let mut pending = item;
        loop {
            match self.sender.try_send(pending) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Disconnected(_)) => return Err(PutError::Disconnected),
                Err(TrySendError::Full(returned)) => {
                    if std::time::Instant::now() >= deadline {
                        return Err(PutError::QueueFull);
                    }
                    std::thread::sleep(Duration::from_millis(5));
                    pending = returned;
                }
            }
        }
    }

    /// Blocks up to `timeout` waiting for an item, so worker loops can poll
    /// a shared stop flag between receives instead of blocking forever
    /// (spec §4.6.7 "workers re-check the stop flag at every queue
    /// timeout boundary").
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn try_put_succeeds_under_capacity() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("test_queue", 2);
        assert_eq!(queue.try_put(1), Ok(()));
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn try_put_reports_full_without_blocking() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("test_queue", 1);
        queue.try_put(1).unwrap();
        assert_eq!(queue.try_put(2), Err(PutError::QueueFull));
    }

    #[test]
    fn recv_timeout_returns_items_in_fifo_order() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("test_queue", 4);
        queue.try_put(1).unwrap();
        queue.try_put(2).unwrap();
        assert_eq!(queue.recv_timeout(Duration::from_millis(10)), Ok(1));
        assert_eq!(queue.recv_timeout(Duration::from_millis(10)), Ok(2));
    }

    #[test]
    fn recv_timeout_on_empty_queue_times_out() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("test_queue", 4);
        assert_eq!(
            queue.recv_timeout(Duration::from_millis(5)),
            Err(RecvTimeoutError::Timeout)
        );
    }

    #[test]
    fn blocking_put_succeeds_once_room_frees_up() {
        let queue: BoundedQueue<u32> = BoundedQueue::new("test_queue", 1);
        queue.try_put(1).unwrap();
        let receiver = queue.receiver();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            let _ = receiver.recv();
        });
        assert_eq!(
            queue.put_blocking_with_timeout(2, Duration::from_millis(200)),
            Ok(())
        );
    }
}
