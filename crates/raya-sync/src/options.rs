//! Lock configuration

/// Environment variable that turns on fair hand-off (`1`, `true` or `yes`)
pub const ENV_FAIR: &str = "RAYA_SYNC_FAIR";

/// Environment variable holding the spin limit before parking
pub const ENV_SPIN: &str = "RAYA_SYNC_SPIN";

/// Who gets the lock when it is released while contexts are queued
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Fairness {
    /// The longest queued waiter is woken and must contend again; a context
    /// arriving in the meantime may take the lock first
    #[default]
    Barging,
    /// Ownership is handed directly to the longest queued waiter, and new
    /// arrivals queue behind existing waiters
    Fair,
}

/// Options for constructing a lock
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LockOptions {
    /// Hand-off policy
    pub fairness: Fairness,
    /// Number of non-blocking retries before a contended acquire parks.
    /// Ignored by fair locks, which always queue.
    pub spin_limit: u32,
}

impl LockOptions {
    /// Default options: barging, no spinning
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for a fair lock
    pub fn fair() -> Self {
        Self::new().fairness(Fairness::Fair)
    }

    /// Set the hand-off policy
    pub fn fairness(mut self, fairness: Fairness) -> Self {
        self.fairness = fairness;
        self
    }

    /// Set the spin limit
    pub fn spin_limit(mut self, spins: u32) -> Self {
        self.spin_limit = spins;
        self
    }

    /// Default options with overrides from `RAYA_SYNC_FAIR` and
    /// `RAYA_SYNC_SPIN`. Unparseable values are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::new();
        if let Some(value) = lookup(ENV_FAIR) {
            match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => options.fairness = Fairness::Fair,
                "0" | "false" | "no" => options.fairness = Fairness::Barging,
                other => tracing::warn!(key = ENV_FAIR, value = other, "ignoring invalid value"),
            }
        }
        if let Some(value) = lookup(ENV_SPIN) {
            match value.trim().parse() {
                Ok(spins) => options.spin_limit = spins,
                Err(_) => tracing::warn!(key = ENV_SPIN, value = %value, "ignoring invalid value"),
            }
        }
        options
    }

    /// Whether the options describe a fair lock
    pub fn is_fair(&self) -> bool {
        self.fairness == Fairness::Fair
    }
}
