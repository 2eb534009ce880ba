//! One-shot registration flag.

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be claimed exactly once per process.
///
/// Competing claims resolve through a single compare-and-set: one caller
/// wins, every other caller is told it lost. The flag is never reset.
#[derive(Debug, Default)]
pub struct RegistrationGuard {
    claimed: AtomicBool,
}

impl RegistrationGuard {
    pub const fn new() -> Self {
        Self {
            claimed: AtomicBool::new(false),
        }
    }

    /// Returns `true` for the first caller only.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}
