//! Per-bucket read/write locks.
//!
//! One [`BucketLockRegistry`] belongs to each engine. Locks are created the
//! first time a bucket name is seen and kept for the life of the registry.
//! Guards release on drop on every exit path, panics included.
//!
//! Locks are reentrant per thread. Each lock records the thread holding it
//! exclusively with a hold count, plus a hold count per reading thread, so
//! an operation that calls back into the engine for the same bucket nests
//! instead of deadlocking. The lock is released when the outermost guard
//! drops.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

// ---------------------------------------------------------------------------
// Lock state
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct LockState {
    /// Exclusive owner and its hold count.
    writer: Option<(ThreadId, usize)>,
    /// Hold count of every thread holding the shared lock.
    readers: HashMap<ThreadId, usize>,
    /// Threads blocked in [`BucketLock::acquire_write`].
    waiting_writers: usize,
}

impl LockState {
    fn can_read(&self, me: ThreadId) -> bool {
        match self.writer {
            Some((owner, _)) => owner == me,
            // Queued writers hold back new readers, but not threads already reading.
            None => self.waiting_writers == 0 || self.readers.contains_key(&me),
        }
    }

    fn can_write(&self, me: ThreadId) -> bool {
        match self.writer {
            Some((owner, _)) => owner == me,
            None => self.readers.keys().all(|reader| *reader == me),
        }
    }
}

/// A reentrant read/write lock for one bucket.
///
/// The exclusive holder may take the lock again in either mode. A thread
/// that holds only the shared lock may take the exclusive lock once no other
/// thread reads.
#[derive(Default)]
pub struct BucketLock {
    state: Mutex<LockState>,
    changed: Condvar,
}

impl fmt::Debug for BucketLock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BucketLock")
            .field("writer", &state.writer)
            .field("reader_count", &state.readers.len())
            .field("waiting_writers", &state.waiting_writers)
            .finish()
    }
}

impl BucketLock {
    fn acquire_read(&self, me: ThreadId) {
        let mut state = self.state.lock();
        while !state.can_read(me) {
            self.changed.wait(&mut state);
        }
        *state.readers.entry(me).or_insert(0) += 1;
    }

    fn release_read(&self, me: ThreadId) {
        let mut state = self.state.lock();
        if let Some(count) = state.readers.get_mut(&me) {
            *count -= 1;
            if *count == 0 {
                state.readers.remove(&me);
            }
        }
        drop(state);
        self.changed.notify_all();
    }

    fn acquire_write(&self, me: ThreadId) {
        let mut state = self.state.lock();
        if let Some((owner, depth)) = state.writer.as_mut() {
            if *owner == me {
                *depth += 1;
                return;
            }
        }
        state.waiting_writers += 1;
        while !state.can_write(me) {
            self.changed.wait(&mut state);
        }
        state.waiting_writers -= 1;
        state.writer = Some((me, 1));
    }

    fn release_write(&self) {
        let mut state = self.state.lock();
        state.writer = state
            .writer
            .and_then(|(owner, depth)| (depth > 1).then_some((owner, depth - 1)));
        drop(state);
        self.changed.notify_all();
    }

    /// Whether any thread holds the lock in either mode.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        let state = self.state.lock();
        state.writer.is_some() || !state.readers.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Guards
// ---------------------------------------------------------------------------

/// Shared hold on one bucket, released on drop.
///
/// Guards stay on the thread that acquired them.
pub struct BucketReadGuard {
    lock: Arc<BucketLock>,
    thread: ThreadId,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for BucketReadGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketReadGuard")
            .field("thread", &self.thread)
            .finish_non_exhaustive()
    }
}

impl Drop for BucketReadGuard {
    fn drop(&mut self) {
        self.lock.release_read(self.thread);
    }
}

/// Exclusive hold on one bucket, released on drop.
///
/// Guards stay on the thread that acquired them.
pub struct BucketWriteGuard {
    lock: Arc<BucketLock>,
    _not_send: PhantomData<*const ()>,
}

impl fmt::Debug for BucketWriteGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketWriteGuard").finish_non_exhaustive()
    }
}

impl Drop for BucketWriteGuard {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Lazily populated map from bucket name to its lock.
///
/// Two threads that both hold a bucket's shared lock and both ask for its
/// exclusive lock deadlock; nested calls on one thread never do.
#[derive(Default)]
pub struct BucketLockRegistry {
    locks: DashMap<String, Arc<BucketLock>>,
}

impl fmt::Debug for BucketLockRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BucketLockRegistry")
            .field("lock_count", &self.locks.len())
            .finish()
    }
}

impl BucketLockRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, bucket: &str) -> Arc<BucketLock> {
        if let Some(lock) = self.locks.get(bucket) {
            return Arc::clone(lock.value());
        }
        let lock = self
            .locks
            .entry(bucket.to_owned())
            .or_insert_with(|| {
                trace!(bucket, "created bucket lock");
                Arc::new(BucketLock::default())
            });
        Arc::clone(lock.value())
    }

    /// Block until the bucket's shared lock is held.
    #[must_use]
    pub fn read(&self, bucket: &str) -> BucketReadGuard {
        let lock = self.lock_for(bucket);
        let thread = thread::current().id();
        lock.acquire_read(thread);
        BucketReadGuard {
            lock,
            thread,
            _not_send: PhantomData,
        }
    }

    /// Block until the bucket's exclusive lock is held.
    #[must_use]
    pub fn write(&self, bucket: &str) -> BucketWriteGuard {
        let lock = self.lock_for(bucket);
        lock.acquire_write(thread::current().id());
        BucketWriteGuard {
            lock,
            _not_send: PhantomData,
        }
    }

    /// Whether any thread holds `bucket`'s lock.
    #[must_use]
    pub fn is_locked(&self, bucket: &str) -> bool {
        self.locks
            .get(bucket)
            .is_some_and(|lock| lock.value().is_locked())
    }

    /// Number of buckets a lock has been created for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Whether no lock has been created yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}
