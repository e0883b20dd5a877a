//! Registry configuration.

/// What happens when a reader's listener panics during a notification pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FanoutPolicy {
    /// Catch the panic, log it and keep notifying the remaining readers.
    #[default]
    Isolate,
    /// Let the panic unwind out of the write, skipping the remaining readers.
    ///
    /// The new value is stored before any listener runs, so it stays in
    /// place.
    Propagate,
}

/// Configuration for a [`StateRepo`](crate::StateRepo).
///
/// Fixed at construction and copied into every state the registry creates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepoConfig {
    /// Listener panic handling
    pub fanout: FanoutPolicy,

    /// Deliver the current value to a reader created by `StateRepo::reader`
    pub replay_on_subscribe: bool,

    /// Deliver the current value when a reader re-registers
    pub replay_on_register: bool,
}

impl Default for RepoConfig {
    fn default() -> Self {
        Self {
            fanout: FanoutPolicy::Isolate,
            replay_on_subscribe: true,
            replay_on_register: false,
        }
    }
}

impl RepoConfig {
    /// Set the listener panic policy
    pub fn fanout(mut self, policy: FanoutPolicy) -> Self {
        self.fanout = policy;
        self
    }

    /// Enable or disable replay of the last value for new readers
    pub fn replay_on_subscribe(mut self, enabled: bool) -> Self {
        self.replay_on_subscribe = enabled;
        self
    }

    /// Enable or disable replay of the last value on `Reader::register`
    pub fn replay_on_register(mut self, enabled: bool) -> Self {
        self.replay_on_register = enabled;
        self
    }
}
