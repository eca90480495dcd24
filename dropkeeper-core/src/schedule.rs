//! Guard that keeps a periodic task from overlapping with itself.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

/// Held for the duration of one run; releases the guard when dropped.
#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` while a previous run still holds its permit.
    pub fn try_begin(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: Arc::clone(&self.running),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_run_skipped_until_permit_dropped() {
        let guard = RunGuard::new();
        let permit = guard.try_begin().unwrap();
        assert!(guard.is_running());
        assert!(guard.try_begin().is_none());

        drop(permit);
        assert!(!guard.is_running());
        assert!(guard.try_begin().is_some());
    }

    #[tokio::test]
    async fn test_permit_moves_into_task() {
        let guard = RunGuard::new();
        let permit = guard.try_begin().unwrap();
        let clone = guard.clone();

        let handle = tokio::spawn(async move {
            let _permit = permit;
            clone.is_running()
        });
        assert!(handle.await.unwrap());
        assert!(!guard.is_running());
    }
}
