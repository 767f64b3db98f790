use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Cooperative stop request shared between a controller and its worker.
///
/// The controller sets it once; the worker polls it between frames.
#[derive(Debug, Clone, Default)]
pub struct StopFlag {
    // Shared state between clones
    requested: Arc<AtomicBool>,
}

impl StopFlag {
    pub fn new() -> StopFlag {
        StopFlag::default()
    }

    pub fn cancel(&self) {
        self.requested.store(true, Ordering::Release);
    }

    pub fn cancelled(&self) -> bool {
        self.requested.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_visible_to_clones() {
        let flag = StopFlag::new();
        let worker = flag.clone();
        assert!(!worker.cancelled());

        std::thread::spawn(move || flag.cancel()).join().unwrap();
        assert!(worker.cancelled());
    }
}
