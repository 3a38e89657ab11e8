//! Controller tuning.

/// Status checks allowed per transfer before it is declared timed out.
pub const POLL_BUDGET: u32 = 1_000_000;

/// Wait between two status checks, in microseconds.
pub const POLL_INTERVAL_US: u32 = 1;

/// What the controller does when a transfer cannot be started or does not
/// finish within its poll budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FailurePolicy {
    /// Halt the service loop on the first failure and leave recovery to
    /// whoever supervises the system.
    FailStop,
    /// Reset the channel and try again. Halts once more than
    /// `max_consecutive_failures` attempts in a row have failed, or when
    /// the reset itself fails.
    ResetAndRetry { max_consecutive_failures: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ControllerConfig {
    pub poll_budget: u32,
    pub poll_interval_us: u32,
    pub policy: FailurePolicy,
}

impl ControllerConfig {
    pub const fn new() -> Self {
        Self {
            poll_budget: POLL_BUDGET,
            poll_interval_us: POLL_INTERVAL_US,
            policy: FailurePolicy::FailStop,
        }
    }

    pub const fn with_poll_budget(mut self, polls: u32) -> Self {
        self.poll_budget = polls;
        self
    }

    pub const fn with_poll_interval_us(mut self, us: u32) -> Self {
        self.poll_interval_us = us;
        self
    }

    pub const fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self::new()
    }
}
