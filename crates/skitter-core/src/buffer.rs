//! Bounded FIFO buffer with non-blocking put/get and a one-shot closed state.

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use crate::error::IllegalParameterError;

/// Errors surfaced by buffers and buffer pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    ClosedBuffer,
    ClosedBufferPool,
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BufferError::ClosedBuffer => write!(f, "closed buffer"),
            BufferError::ClosedBufferPool => write!(f, "closed buffer pool"),
        }
    }
}

impl Error for BufferError {}

struct Inner<T> {
    queue: VecDeque<T>,
    closed: bool,
}

/// A bounded FIFO. `put` and `get` never block; `close` is idempotent.
///
/// Put and close are serialized on the same lock as the queue, so a put
/// racing a close observes `ClosedBuffer` rather than silently landing in a
/// dead buffer; gets drain whatever was stored before the close and only
/// then report `ClosedBuffer`.
pub struct Buffer<T> {
    cap: usize,
    inner: Mutex<Inner<T>>,
    // Mirror of Inner.closed for lock-free Closed() checks.
    closed: AtomicBool,
}

impl<T> Buffer<T> {
    pub fn new(cap: u32) -> Result<Self, IllegalParameterError> {
        if cap == 0 {
            return Err(IllegalParameterError::new(format!(
                "illegal size for buffer: {}",
                cap
            )));
        }
        Ok(Buffer {
            cap: cap as usize,
            inner: Mutex::new(Inner {
                queue: VecDeque::with_capacity(cap as usize),
                closed: false,
            }),
            closed: AtomicBool::new(false),
        })
    }

    pub fn cap(&self) -> u32 {
        self.cap as u32
    }

    pub fn len(&self) -> u32 {
        self.inner.lock().unwrap().queue.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-blocking put. `Ok(None)` means stored; `Ok(Some(datum))` hands the
    /// datum back because the buffer is full.
    pub fn put(&self, datum: T) -> Result<Option<T>, BufferError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return Err(BufferError::ClosedBuffer);
        }
        if inner.queue.len() >= self.cap {
            return Ok(Some(datum));
        }
        inner.queue.push_back(datum);
        Ok(None)
    }

    /// Non-blocking get. `Ok(None)` means currently empty. A closed buffer
    /// keeps yielding its remaining datums before reporting `ClosedBuffer`.
    pub fn get(&self) -> Result<Option<T>, BufferError> {
        let mut inner = self.inner.lock().unwrap();
        match inner.queue.pop_front() {
            Some(datum) => Ok(Some(datum)),
            None if inner.closed => Err(BufferError::ClosedBuffer),
            None => Ok(None),
        }
    }

    /// Closes the buffer. Returns true for the first caller only.
    pub fn close(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.closed {
            return false;
        }
        inner.closed = true;
        self.closed.store(true, Ordering::SeqCst);
        true
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_zero_capacity() {
        assert!(Buffer::<u32>::new(0).is_err());
    }

    #[test]
    fn put_get_preserves_fifo_order() {
        let buf = Buffer::new(8).unwrap();
        for i in 0..8 {
            assert_eq!(buf.put(i).unwrap(), None);
        }
        assert_eq!(buf.len(), 8);
        for i in 0..8 {
            assert_eq!(buf.get().unwrap(), Some(i));
        }
        assert_eq!(buf.get().unwrap(), None);
    }

    #[test]
    fn full_buffer_hands_the_datum_back() {
        let buf = Buffer::new(1).unwrap();
        assert_eq!(buf.put("a").unwrap(), None);
        assert_eq!(buf.put("b").unwrap(), Some("b"));
        assert_eq!(buf.cap(), 1);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn close_is_idempotent_and_drains_before_erroring() {
        let buf = Buffer::new(4).unwrap();
        buf.put(1).unwrap();
        buf.put(2).unwrap();
        assert!(buf.close());
        assert!(!buf.close());
        assert!(buf.closed());
        assert_eq!(buf.put(3), Err(BufferError::ClosedBuffer));
        assert_eq!(buf.get().unwrap(), Some(1));
        assert_eq!(buf.get().unwrap(), Some(2));
        assert_eq!(buf.get(), Err(BufferError::ClosedBuffer));
    }
}
