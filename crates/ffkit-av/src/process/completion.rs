//! Completion bookkeeping for a running process.

use parking_lot::Mutex;

use crate::error::ProcessFailure;

/// Counts the completion signals still outstanding.
///
/// A run is finished once the process has exited and every output pipe it
/// waits on has closed, in whatever order those happen.
#[derive(Debug)]
pub(crate) struct Barrier {
    pending: usize,
}

impl Barrier {
    pub(crate) fn new(pending: usize) -> Self {
        Self { pending }
    }

    /// Record one signal. Returns true once nothing is pending.
    pub(crate) fn signal(&mut self) -> bool {
        self.pending = self.pending.saturating_sub(1);
        self.is_complete()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.pending == 0
    }
}

/// Holds the first failure reported during a run. Later ones are dropped.
#[derive(Debug, Default)]
pub(crate) struct Latch {
    failure: Mutex<Option<ProcessFailure>>,
}

impl Latch {
    /// Record a failure. Returns false if one was already recorded.
    pub(crate) fn fire(&self, failure: ProcessFailure) -> bool {
        let mut slot = self.failure.lock();
        if slot.is_some() {
            tracing::debug!("ignoring failure after terminal outcome: {failure}");
            return false;
        }
        *slot = Some(failure);
        true
    }

    pub(crate) fn take(&self) -> Option<ProcessFailure> {
        self.failure.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn barrier_completes_after_all_signals() {
        let mut barrier = Barrier::new(3);
        assert!(!barrier.signal());
        assert!(!barrier.signal());
        assert!(barrier.signal());
        assert!(barrier.is_complete());
        // Extra signals do not wrap around.
        assert!(barrier.signal());
    }

    #[test]
    fn latch_fires_once() {
        let latch = Latch::default();
        assert!(latch.take().is_none());
        assert!(latch.fire(ProcessFailure::Timeout(Duration::from_secs(1))));
        assert!(!latch.fire(ProcessFailure::OutputStream(std::io::Error::other("late"))));
        assert!(matches!(latch.take(), Some(ProcessFailure::Timeout(_))));
        assert!(latch.take().is_none());
    }
}
