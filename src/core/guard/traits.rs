/*!
 * Guard Traits
 *
 * Uniform inspection and release of lock guards
 */

use super::GuardResult;

/// Common surface of every lock guard
pub trait Guard {
    /// Short label used in logs, reflecting whether the lock is held
    fn resource_type(&self) -> &'static str;

    /// Whether the guard currently holds its lock
    fn is_active(&self) -> bool;

    /// Release the lock before the guard goes out of scope
    ///
    /// Fails if nothing is held.
    fn release(&mut self) -> GuardResult<()>;
}

/// Cleanup run by a guard's `Drop`
pub trait GuardDrop: Guard {
    /// Must not panic: it runs during unwinding too
    fn on_drop(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::guard::{GuardError, ScopedLock};
    use crate::core::sync::RecursiveMutex;

    fn release_all(guards: &mut [&mut dyn Guard]) -> usize {
        guards
            .iter_mut()
            .map(|g| g.release())
            .filter(Result::is_ok)
            .count()
    }

    #[test]
    fn test_release_through_trait_object() {
        let mutex = RecursiveMutex::new();
        let mut outer = ScopedLock::locked(&mutex);
        let mut inner = ScopedLock::locked(&mutex);
        assert_eq!(mutex.count(), 2);

        assert_eq!(release_all(&mut [&mut outer, &mut inner]), 2);
        assert!(!mutex.is_locked());
        assert_eq!(outer.release(), Err(GuardError::AlreadyReleased));
        assert_eq!(outer.resource_type(), "scoped_lock_unlocked");
        assert!(!inner.is_active());
    }
}
