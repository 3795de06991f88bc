use std::sync::atomic::{AtomicBool, Ordering};

/// In-progress flag for one kind of pass.
///
/// Acquiring fails while another pass of the same kind holds the flag, so
/// overlapping passes are skipped rather than queued. The flag clears on drop.
pub struct PassGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    pub fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_skipped_until_drop() {
        let flag = AtomicBool::new(false);

        let guard = PassGuard::try_acquire(&flag);
        assert!(guard.is_some());
        assert!(PassGuard::try_acquire(&flag).is_none());

        drop(guard);
        assert!(PassGuard::try_acquire(&flag).is_some());
    }
}
