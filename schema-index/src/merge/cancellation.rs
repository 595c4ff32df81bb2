use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative cancellation, polled before each unit of merge work.
pub trait Cancellation: Send + Sync {
    fn cancelled(&self) -> bool;
}

/// Never cancels.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancelled;

impl Cancellation for NeverCancelled {
    fn cancelled(&self) -> bool {
        false
    }
}

/// Cancelled once [`cancel`](Self::cancel) is called, typically on close.
#[derive(Debug, Default)]
pub struct CloseCancellation {
    closed: AtomicBool,
}

impl CloseCancellation {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Cancellation for CloseCancellation {
    fn cancelled(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_cancellation() {
        let cancellation = CloseCancellation::new();
        assert!(!cancellation.cancelled());
        cancellation.cancel();
        assert!(cancellation.cancelled());
        assert!(!NeverCancelled.cancelled());
    }
}
