/*!
 * Read-Write Lock
 *
 * Many concurrent readers or one writer, optionally recursive.
 *
 * # State word
 *
 * - bit 0: locked for write
 * - bits 1..: number of reading threads
 *
 * Waiting writers are counted separately. While any writer waits, new
 * readers do not acquire, so a steady stream of readers cannot starve a
 * writer. Uncontended read and write locking is a single CAS.
 *
 * # Recursion
 *
 * A lock built with [`ReadWriteLock::recursive`] lets a thread take the
 * same kind of lock again; it is released after as many `unlock` calls.
 * Re-entry bypasses the state word, so a reader re-entering while a writer
 * waits does not deadlock. Switching kind (read while holding the write
 * lock, or the reverse) panics.
 */

use super::mutex::Guarded;
use super::traits::{ParkOutcome, Parker};
use super::ActiveParker;
use crate::core::types::{Deadline, ThreadId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::warn;

const WRITER: usize = 1;
const ONE_READER: usize = 2;

/// Per-thread depths of a recursive lock
#[derive(Debug, Default)]
struct Recursion {
    readers: HashMap<ThreadId, usize>,
    writer: Option<ThreadId>,
    write_depth: usize,
}

/// Raw read-write lock guarding no data of its own
#[derive(Debug, Default)]
pub struct ReadWriteLock {
    state: AtomicUsize,
    writers_waiting: AtomicUsize,
    recursion: Option<Guarded<Recursion>>,
}

impl ReadWriteLock {
    /// Non-recursive lock
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
            writers_waiting: AtomicUsize::new(0),
            recursion: None,
        }
    }

    /// Lock the owning thread may take again for the same kind of access
    pub fn recursive() -> Self {
        Self {
            recursion: Some(Guarded::new(Recursion::default())),
            ..Self::new()
        }
    }

    pub fn is_recursive(&self) -> bool {
        self.recursion.is_some()
    }

    /// Block until shared access is granted
    pub fn lock_for_read(&self) {
        self.acquire_read(|| {
            if !self.raw_try_read() {
                self.read_contended(Deadline::Forever);
            }
            true
        });
    }

    /// Shared access without blocking
    pub fn try_lock_for_read(&self) -> bool {
        self.acquire_read(|| self.raw_try_read())
    }

    /// Shared access before `deadline` passes
    pub fn try_lock_for_read_until(&self, deadline: Deadline) -> bool {
        self.acquire_read(|| {
            self.raw_try_read() || (!deadline.has_expired() && self.read_contended(deadline))
        })
    }

    /// Block until exclusive access is granted
    pub fn lock_for_write(&self) {
        self.acquire_write(|| {
            if !self.raw_try_write() {
                self.write_contended(Deadline::Forever);
            }
            true
        });
    }

    /// Exclusive access without blocking
    pub fn try_lock_for_write(&self) -> bool {
        self.acquire_write(|| self.raw_try_write())
    }

    /// Exclusive access before `deadline` passes
    pub fn try_lock_for_write_until(&self, deadline: Deadline) -> bool {
        self.acquire_write(|| {
            self.raw_try_write() || (!deadline.has_expired() && self.write_contended(deadline))
        })
    }

    /// Release one read lock or the write lock
    ///
    /// On a recursive lock, releases one level held by the calling thread;
    /// a thread holding nothing gets a warning and no effect.
    ///
    /// # Panics
    ///
    /// Panics if a non-recursive lock is not held.
    pub fn unlock(&self) {
        if let Some(recursion) = &self.recursion {
            let me = ThreadId::current();
            let mut rec = recursion.lock();
            if rec.writer == Some(me) {
                rec.write_depth -= 1;
                if rec.write_depth > 0 {
                    return;
                }
                rec.writer = None;
            } else {
                let Some(depth) = rec.readers.get_mut(&me) else {
                    warn!("ReadWriteLock::unlock: unlocking from a thread that did not lock");
                    return;
                };
                *depth -= 1;
                if *depth > 0 {
                    return;
                }
                rec.readers.remove(&me);
            }
        }
        self.raw_unlock();
    }

    /// Depth of the calling thread's hold on a recursive lock (0 if none)
    pub fn held_depth(&self) -> usize {
        let Some(recursion) = &self.recursion else {
            return 0;
        };
        let me = ThreadId::current();
        let rec = recursion.lock();
        if rec.writer == Some(me) {
            rec.write_depth
        } else {
            rec.readers.get(&me).copied().unwrap_or(0)
        }
    }

    /// Number of threads currently holding a read lock
    pub fn reader_count(&self) -> usize {
        self.state.load(Ordering::Relaxed) / ONE_READER
    }

    pub fn is_locked_for_write(&self) -> bool {
        self.state.load(Ordering::Relaxed) & WRITER != 0
    }

    fn acquire_read(&self, raw: impl FnOnce() -> bool) -> bool {
        let Some(recursion) = &self.recursion else {
            return raw();
        };
        let me = ThreadId::current();
        {
            let mut rec = recursion.lock();
            assert!(
                rec.writer != Some(me),
                "ReadWriteLock: cannot lock for read while holding the write lock"
            );
            if let Some(depth) = rec.readers.get_mut(&me) {
                *depth += 1;
                return true;
            }
        }
        if !raw() {
            return false;
        }
        recursion.lock().readers.insert(me, 1);
        true
    }

    fn acquire_write(&self, raw: impl FnOnce() -> bool) -> bool {
        let Some(recursion) = &self.recursion else {
            return raw();
        };
        let me = ThreadId::current();
        {
            let mut rec = recursion.lock();
            if rec.writer == Some(me) {
                rec.write_depth += 1;
                return true;
            }
            assert!(
                !rec.readers.contains_key(&me),
                "ReadWriteLock: cannot lock for write while holding a read lock"
            );
        }
        if !raw() {
            return false;
        }
        let mut rec = recursion.lock();
        rec.writer = Some(me);
        rec.write_depth = 1;
        true
    }

    fn raw_try_read(&self) -> bool {
        let mut state = self.state.load(Ordering::Relaxed);
        loop {
            if state & WRITER != 0 || self.writers_waiting.load(Ordering::Relaxed) != 0 {
                return false;
            }
            let next = state
                .checked_add(ONE_READER)
                .expect("ReadWriteLock: reader count overflow");
            match self.state.compare_exchange_weak(
                state,
                next,
                Ordering::Acquire,
                Ordering::Relaxed,
            ) {
                Ok(_) => return true,
                Err(actual) => state = actual,
            }
        }
    }

    fn raw_try_write(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    fn raw_unlock(&self) {
        let state = self.state.load(Ordering::Relaxed);
        assert!(state != 0, "ReadWriteLock::unlock: lock is not held");

        let remaining = if state & WRITER != 0 {
            self.state.fetch_and(!WRITER, Ordering::Release) & !WRITER
        } else {
            self.state.fetch_sub(ONE_READER, Ordering::Release) - ONE_READER
        };

        if remaining == 0 {
            self.wake_after_release();
        }
    }

    fn wake_after_release(&self) {
        if self.writers_waiting.load(Ordering::Acquire) != 0 {
            // Writers go first; readers wake when no writer is left waiting
            ActiveParker::unpark_one(self.writer_key());
        } else {
            ActiveParker::unpark_all(self.reader_key());
        }
    }

    #[cold]
    fn read_contended(&self, deadline: Deadline) -> bool {
        loop {
            if self.raw_try_read() {
                return true;
            }
            let outcome = ActiveParker::park(
                self.reader_key(),
                &|| {
                    self.state.load(Ordering::Relaxed) & WRITER != 0
                        || self.writers_waiting.load(Ordering::Relaxed) != 0
                },
                deadline,
            );
            if outcome == ParkOutcome::TimedOut && deadline.has_expired() {
                return false;
            }
        }
    }

    #[cold]
    fn write_contended(&self, deadline: Deadline) -> bool {
        self.writers_waiting.fetch_add(1, Ordering::AcqRel);
        loop {
            if self.raw_try_write() {
                self.writers_waiting.fetch_sub(1, Ordering::AcqRel);
                return true;
            }
            let outcome = ActiveParker::park(
                self.writer_key(),
                &|| self.state.load(Ordering::Relaxed) != 0,
                deadline,
            );
            if outcome == ParkOutcome::TimedOut && deadline.has_expired() {
                let left = self.writers_waiting.fetch_sub(1, Ordering::AcqRel) - 1;
                if left == 0 && self.state.load(Ordering::Relaxed) & WRITER == 0 {
                    // Readers held back by this writer may proceed
                    ActiveParker::unpark_all(self.reader_key());
                } else if self.state.load(Ordering::Relaxed) == 0 {
                    // Pass on a release this writer may have consumed
                    ActiveParker::unpark_one(self.writer_key());
                }
                return false;
            }
        }
    }

    #[inline]
    fn reader_key(&self) -> usize {
        &self.state as *const AtomicUsize as usize
    }

    #[inline]
    fn writer_key(&self) -> usize {
        &self.writers_waiting as *const AtomicUsize as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_multiple_readers() {
        let lock = ReadWriteLock::new();
        assert!(lock.try_lock_for_read());
        assert!(lock.try_lock_for_read());
        assert_eq!(lock.reader_count(), 2);
        assert!(!lock.try_lock_for_write());

        lock.unlock();
        lock.unlock();
        assert!(lock.try_lock_for_write());
        assert!(lock.is_locked_for_write());
        lock.unlock();
    }

    #[test]
    fn test_writer_excludes_readers() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.lock_for_write();

        let lock_clone = lock.clone();
        let got_read = thread::spawn(move || {
            lock_clone.try_lock_for_read_until(Deadline::after(Duration::from_millis(50)))
        })
        .join()
        .unwrap();
        assert!(!got_read);

        lock.unlock();
        assert!(lock.try_lock_for_read());
        lock.unlock();
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.lock_for_read();

        let writer_done = Arc::new(AtomicBool::new(false));
        let lock_clone = lock.clone();
        let done_clone = writer_done.clone();
        let writer = thread::spawn(move || {
            lock_clone.lock_for_write();
            done_clone.store(true, Ordering::SeqCst);
            lock_clone.unlock();
        });

        // Wait for the writer to register
        while lock.writers_waiting.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }
        assert!(!lock.try_lock_for_read());

        lock.unlock();
        writer.join().unwrap();
        assert!(writer_done.load(Ordering::SeqCst));
        assert!(lock.try_lock_for_read());
        lock.unlock();
    }

    #[test]
    fn test_writer_timeout_releases_readers() {
        let lock = Arc::new(ReadWriteLock::new());
        lock.lock_for_read();

        let lock_clone = lock.clone();
        let acquired = thread::spawn(move || {
            lock_clone.try_lock_for_write_until(Deadline::after(Duration::from_millis(50)))
        })
        .join()
        .unwrap();

        assert!(!acquired);
        assert!(lock.try_lock_for_read());
        lock.unlock();
        lock.unlock();
    }

    #[test]
    fn test_recursive_read_reentry() {
        let lock = ReadWriteLock::recursive();
        lock.lock_for_read();
        assert!(lock.try_lock_for_read());
        lock.lock_for_read();
        assert_eq!(lock.held_depth(), 3);
        assert_eq!(lock.reader_count(), 1);

        lock.unlock();
        lock.unlock();
        assert_eq!(lock.reader_count(), 1);
        lock.unlock();
        assert_eq!(lock.reader_count(), 0);
        assert!(lock.try_lock_for_write());
        lock.unlock();
    }

    #[test]
    fn test_recursive_write_reentry() {
        let lock = Arc::new(ReadWriteLock::recursive());
        lock.lock_for_write();
        assert!(lock.try_lock_for_write());
        assert!(lock.try_lock_for_write_until(Deadline::expired()));
        assert_eq!(lock.held_depth(), 3);

        lock.unlock();
        lock.unlock();
        assert!(lock.is_locked_for_write());

        let contender = lock.clone();
        let blocked = thread::spawn(move || contender.try_lock_for_read())
            .join()
            .unwrap();
        assert!(!blocked);

        lock.unlock();
        assert!(!lock.is_locked_for_write());
        assert_eq!(lock.held_depth(), 0);
    }

    #[test]
    fn test_recursive_reader_reenters_past_waiting_writer() {
        let lock = Arc::new(ReadWriteLock::recursive());
        lock.lock_for_read();

        let writer = {
            let lock = lock.clone();
            thread::spawn(move || {
                lock.lock_for_write();
                lock.unlock();
            })
        };
        while lock.writers_waiting.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }

        assert!(lock.try_lock_for_read());
        lock.unlock();
        lock.unlock();
        writer.join().unwrap();
    }

    #[test]
    fn test_unlock_from_stranger_is_ignored() {
        let lock = Arc::new(ReadWriteLock::recursive());
        lock.lock_for_write();
        let stranger = lock.clone();
        thread::spawn(move || stranger.unlock()).join().unwrap();
        assert!(lock.is_locked_for_write());
        lock.unlock();
        assert!(!lock.is_locked_for_write());
    }

    #[test]
    #[should_panic(expected = "holding the write lock")]
    fn test_recursive_read_under_write_panics() {
        let lock = ReadWriteLock::recursive();
        lock.lock_for_write();
        lock.lock_for_read();
    }

    #[test]
    fn test_non_recursive_has_no_depth() {
        let lock = ReadWriteLock::new();
        assert!(!lock.is_recursive());
        lock.lock_for_read();
        assert_eq!(lock.held_depth(), 0);
        lock.unlock();
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_k_locks_need_k_unlocks(k in 1usize..16, write in any::<bool>()) {
            let lock = Arc::new(ReadWriteLock::recursive());
            for _ in 0..k {
                if write { lock.lock_for_write() } else { lock.lock_for_read() }
            }
            prop_assert_eq!(lock.held_depth(), k);

            for _ in 0..k - 1 {
                lock.unlock();
            }
            let contender = lock.clone();
            let got_write = thread::spawn(move || {
                let got = contender.try_lock_for_write();
                if got {
                    contender.unlock();
                }
                got
            })
            .join()
            .unwrap();
            prop_assert!(!got_write);

            lock.unlock();
            prop_assert_eq!(lock.held_depth(), 0);
            prop_assert!(lock.try_lock_for_write());
            lock.unlock();
        }
    }

    #[test]
    #[should_panic(expected = "not held")]
    fn test_unlock_unheld_panics() {
        ReadWriteLock::new().unlock();
    }
}
