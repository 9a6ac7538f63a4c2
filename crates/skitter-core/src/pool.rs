//! Elastic pool of bounded buffers behind a single put/get surface.
//!
//! Buffers rotate through a meta-queue: each operation checks one buffer out,
//! attempts it, and checks the buffer back in, so no caller ever holds a
//! buffer across foreign code. Sustained full rotations grow the pool up to
//! `max_buffer_number`; sustained empty rotations shrink it back down to one
//! buffer.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, RwLock};
use std::time::Duration;

use crate::buffer::{Buffer, BufferError};
use crate::error::IllegalParameterError;

// How long a blocked put/get naps between rotations over a saturated or
// drained pool before re-checking for closure.
const ROTATION_NAP: Duration = Duration::from_millis(1);

struct BufQueue<T> {
    queue: VecDeque<Arc<Buffer<T>>>,
    closed: bool,
}

pub struct BufferPool<T> {
    buffer_cap: u32,
    max_buffer_number: u32,
    buffer_number: AtomicU32,
    total: AtomicU64,
    bufs: Mutex<BufQueue<T>>,
    // Signaled when a buffer is checked back in.
    available: Condvar,
    // Signaled when a datum is stored or space is freed.
    activity: Condvar,
    closed: AtomicBool,
    // Writers: close and growth. Readers: the brief check-in phase.
    resize_lock: RwLock<()>,
}

impl<T> BufferPool<T> {
    pub fn new(buffer_cap: u32, max_buffer_number: u32) -> Result<Self, IllegalParameterError> {
        if buffer_cap == 0 {
            return Err(IllegalParameterError::new(format!(
                "illegal buffer cap for buffer pool: {}",
                buffer_cap
            )));
        }
        if max_buffer_number == 0 {
            return Err(IllegalParameterError::new(format!(
                "illegal max buffer number for buffer pool: {}",
                max_buffer_number
            )));
        }
        let first = Arc::new(Buffer::new(buffer_cap)?);
        let mut queue = VecDeque::with_capacity(max_buffer_number as usize);
        queue.push_back(first);
        Ok(BufferPool {
            buffer_cap,
            max_buffer_number,
            buffer_number: AtomicU32::new(1),
            total: AtomicU64::new(0),
            bufs: Mutex::new(BufQueue {
                queue,
                closed: false,
            }),
            available: Condvar::new(),
            activity: Condvar::new(),
            closed: AtomicBool::new(false),
            resize_lock: RwLock::new(()),
        })
    }

    pub fn buffer_cap(&self) -> u32 {
        self.buffer_cap
    }

    pub fn max_buffer_number(&self) -> u32 {
        self.max_buffer_number
    }

    pub fn buffer_number(&self) -> u32 {
        self.buffer_number.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> u64 {
        self.total.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stores a datum, blocking until it lands in some buffer or the pool is
    /// closed.
    pub fn put(&self, datum: T) -> Result<(), BufferError> {
        self.put_inner(datum, true).map(|_| ())
    }

    /// Non-blocking variant: `Ok(false)` when every buffer is full and the
    /// pool cannot grow any further.
    pub fn try_put(&self, datum: T) -> Result<bool, BufferError> {
        self.put_inner(datum, false)
    }

    fn put_inner(&self, datum: T, block: bool) -> Result<bool, BufferError> {
        if self.closed() {
            return Err(BufferError::ClosedBufferPool);
        }
        let mut datum = datum;
        let mut count: u32 = 0;
        loop {
            let buf = self.checkout()?;
            datum = match buf.put(datum) {
                Ok(None) => {
                    self.total.fetch_add(1, Ordering::SeqCst);
                    let res = self.checkin(buf);
                    self.activity.notify_all();
                    return res.map(|_| true);
                }
                Ok(Some(back)) => back,
                Err(_) => {
                    // Buffer closed under us: the pool is shutting down.
                    let _ = self.checkin(buf);
                    return Err(BufferError::ClosedBufferPool);
                }
            };
            count += 1;
            let max_count = self.buffer_number().saturating_mul(5);
            if count >= max_count && self.buffer_number() < self.max_buffer_number {
                match self.grow(datum) {
                    Ok(()) => {
                        let res = self.checkin(buf);
                        self.activity.notify_all();
                        return res.map(|_| true);
                    }
                    Err(back) => datum = back,
                }
                count = 0;
            }
            self.checkin(buf)?;
            let saturated =
                self.buffer_number() == self.max_buffer_number && count >= self.buffer_number();
            if saturated {
                if !block {
                    return Ok(false);
                }
                self.nap();
            }
        }
    }

    // Allocates one more buffer seeded with `datum`. Hands the datum back
    // when the pool was closed or already at capacity once the write lock
    // was held.
    fn grow(&self, datum: T) -> Result<(), T> {
        let _w = self.resize_lock.write().unwrap();
        if self.closed() || self.buffer_number() >= self.max_buffer_number {
            return Err(datum);
        }
        let new_buf = match Buffer::new(self.buffer_cap) {
            Ok(buf) => Arc::new(buf),
            Err(_) => return Err(datum),
        };
        // Fresh buffer with cap >= 1: the put cannot fail or overflow.
        let _ = new_buf.put(datum);
        {
            let mut q = self.bufs.lock().unwrap();
            q.queue.push_back(new_buf);
        }
        self.available.notify_one();
        self.buffer_number.fetch_add(1, Ordering::SeqCst);
        self.total.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Takes a datum, blocking until one arrives or the pool is closed.
    pub fn get(&self) -> Result<T, BufferError> {
        match self.get_inner(true)? {
            Some(datum) => Ok(datum),
            // Unreachable: the blocking variant only returns through a datum
            // or an error, but keep the closed answer for belt and braces.
            None => Err(BufferError::ClosedBufferPool),
        }
    }

    /// Non-blocking variant: `Ok(None)` when the pool is currently drained.
    pub fn try_get(&self) -> Result<Option<T>, BufferError> {
        self.get_inner(false)
    }

    fn get_inner(&self, block: bool) -> Result<Option<T>, BufferError> {
        if self.closed() {
            return Err(BufferError::ClosedBufferPool);
        }
        let mut count: u32 = 0;
        loop {
            let max_count = self.buffer_number().saturating_mul(10);
            let buf = self.checkout()?;
            match buf.get() {
                Ok(Some(datum)) => {
                    self.total.fetch_sub(1, Ordering::SeqCst);
                    // Datum delivery wins over a close that raced the
                    // check-in; closure surfaces on the next call.
                    let _ = self.checkin(buf);
                    self.activity.notify_all();
                    return Ok(Some(datum));
                }
                Ok(None) => {
                    count += 1;
                    if count >= max_count && buf.is_empty() && self.try_shrink() {
                        buf.close();
                        count = 0;
                        continue;
                    }
                    self.checkin(buf)?;
                    if count >= self.buffer_number() && self.total() == 0 {
                        if !block {
                            return Ok(None);
                        }
                        self.nap();
                    }
                }
                Err(_) => {
                    let _ = self.checkin(buf);
                    return Err(BufferError::ClosedBufferPool);
                }
            }
        }
    }

    // Claims the right to drop one buffer; never goes below one live buffer.
    fn try_shrink(&self) -> bool {
        self.buffer_number
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n > 1 {
                    Some(n - 1)
                } else {
                    None
                }
            })
            .is_ok()
    }

    fn checkout(&self) -> Result<Arc<Buffer<T>>, BufferError> {
        let mut q = self.bufs.lock().unwrap();
        loop {
            if q.closed {
                return Err(BufferError::ClosedBufferPool);
            }
            if let Some(buf) = q.queue.pop_front() {
                return Ok(buf);
            }
            q = self.available.wait(q).unwrap();
        }
    }

    fn checkin(&self, buf: Arc<Buffer<T>>) -> Result<(), BufferError> {
        let _r = self.resize_lock.read().unwrap();
        let mut q = self.bufs.lock().unwrap();
        if q.closed {
            // The pool closed while this buffer was checked out; retire it
            // instead of resurrecting it.
            buf.close();
            let _ = self
                .buffer_number
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
            return Err(BufferError::ClosedBufferPool);
        }
        q.queue.push_back(buf);
        drop(q);
        self.available.notify_one();
        Ok(())
    }

    fn nap(&self) {
        let q = self.bufs.lock().unwrap();
        if q.closed {
            return;
        }
        let _ = self.activity.wait_timeout(q, ROTATION_NAP).unwrap();
    }

    /// Closes the pool and every buffer on it, dropping whatever they still
    /// hold. Returns true for the first caller only.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        let _w = self.resize_lock.write().unwrap();
        let mut q = self.bufs.lock().unwrap();
        q.closed = true;
        for buf in q.queue.drain(..) {
            buf.close();
        }
        self.total.store(0, Ordering::SeqCst);
        drop(q);
        self.available.notify_all();
        self.activity.notify_all();
        true
    }
}
