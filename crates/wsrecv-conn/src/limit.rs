/// Per-message byte budget.
///
/// The budget is one byte larger than the configured ceiling so a message of
/// exactly `ceiling` bytes can be read to its end: only a pull made with the
/// budget already spent is a violation.
#[derive(Debug, Clone)]
pub(crate) struct LimitGuard {
    ceiling: u64,
    remaining: u64,
}

impl LimitGuard {
    pub(crate) fn new(ceiling: u64) -> Self {
        Self {
            ceiling,
            remaining: ceiling.saturating_add(1),
        }
    }

    /// Start a new message with the given ceiling.
    pub(crate) fn reset(&mut self, ceiling: u64) {
        *self = Self::new(ceiling);
    }

    pub(crate) fn ceiling(&self) -> u64 {
        self.ceiling
    }

    /// How many of `want` bytes may be pulled, or `None` if the budget is spent.
    pub(crate) fn allowance(&self, want: usize) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        Some(want.min(usize::try_from(self.remaining).unwrap_or(usize::MAX)))
    }

    pub(crate) fn consume(&mut self, n: usize) {
        self.remaining = self.remaining.saturating_sub(n as u64);
    }
}
