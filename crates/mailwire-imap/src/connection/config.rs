//! Engine configuration.
//!
//! One value per engine instance, read-only once built. Connections copy
//! what they need at open time.

use std::time::Duration;

/// What to do when a UID lookahead returns UIDs that go backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UidAnomalyPolicy {
    /// Treat it as loss of UID validity: forget every cached UID and keep
    /// only what the server just sent.
    #[default]
    Invalidate,
    /// Store whatever the server sent and carry on.
    TrustServer,
}

/// Engine configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Login attempts before giving up.
    pub max_login_trials: u32,
    /// Port for plaintext and STARTTLS connections.
    pub default_port: u16,
    /// Port for implicit TLS.
    pub tls_port: u16,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// How many following messages a UID lookup also fetches.
    pub uid_lookahead: u32,
    /// How many uncached following envelopes a structure fetch also pulls.
    pub envelope_lookahead: u32,
    /// Longest sequence set sent in one command before splitting.
    pub max_sequence_len: usize,
    /// Keyword slots in the user-flag table.
    pub user_flag_slots: usize,
    /// Keep only one envelope/body pair in memory.
    pub short_cache: bool,
    /// Deliver every protocol line to `Notifier::debug_line`.
    pub debug: bool,
    /// Reaction to non-monotonic UIDs.
    pub uid_anomaly: UidAnomalyPolicy,
    /// First character of command tags.
    pub tag_prefix: char,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_login_trials: 3,
            default_port: 143,
            tls_port: 993,
            connect_timeout: Duration::from_secs(30),
            uid_lookahead: 1000,
            envelope_lookahead: 20,
            max_sequence_len: 1000,
            user_flag_slots: 30,
            short_cache: false,
            debug: false,
            uid_anomaly: UidAnomalyPolicy::Invalidate,
            tag_prefix: 'A',
        }
    }
}

impl Config {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for [`Config`].
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Sets the login attempt limit.
    #[must_use]
    pub const fn max_login_trials(mut self, trials: u32) -> Self {
        self.config.max_login_trials = trials;
        self
    }

    /// Sets the plaintext port.
    #[must_use]
    pub const fn default_port(mut self, port: u16) -> Self {
        self.config.default_port = port;
        self
    }

    /// Sets the implicit-TLS port.
    #[must_use]
    pub const fn tls_port(mut self, port: u16) -> Self {
        self.config.tls_port = port;
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Sets the UID lookahead.
    #[must_use]
    pub const fn uid_lookahead(mut self, n: u32) -> Self {
        self.config.uid_lookahead = n;
        self
    }

    /// Sets the envelope lookahead.
    #[must_use]
    pub const fn envelope_lookahead(mut self, n: u32) -> Self {
        self.config.envelope_lookahead = n;
        self
    }

    /// Sets the sequence-set length budget.
    #[must_use]
    pub const fn max_sequence_len(mut self, len: usize) -> Self {
        self.config.max_sequence_len = len;
        self
    }

    /// Sets the number of keyword slots.
    #[must_use]
    pub const fn user_flag_slots(mut self, slots: usize) -> Self {
        self.config.user_flag_slots = slots;
        self
    }

    /// Enables short-cache mode.
    #[must_use]
    pub const fn short_cache(mut self, on: bool) -> Self {
        self.config.short_cache = on;
        self
    }

    /// Enables protocol telemetry.
    #[must_use]
    pub const fn debug(mut self, on: bool) -> Self {
        self.config.debug = on;
        self
    }

    /// Sets the UID anomaly policy.
    #[must_use]
    pub const fn uid_anomaly(mut self, policy: UidAnomalyPolicy) -> Self {
        self.config.uid_anomaly = policy;
        self
    }

    /// Sets the tag prefix.
    #[must_use]
    pub const fn tag_prefix(mut self, prefix: char) -> Self {
        self.config.tag_prefix = prefix;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::redundant_clone,
    clippy::manual_string_new,
    clippy::needless_collect,
    clippy::unreadable_literal,
    clippy::used_underscore_items,
    clippy::similar_names
)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_login_trials, 3);
        assert_eq!(config.default_port, 143);
        assert_eq!(config.tls_port, 993);
        assert_eq!(config.uid_lookahead, 1000);
        assert_eq!(config.envelope_lookahead, 20);
        assert_eq!(config.max_sequence_len, 1000);
        assert_eq!(config.user_flag_slots, 30);
        assert!(!config.short_cache);
        assert_eq!(config.uid_anomaly, UidAnomalyPolicy::Invalidate);
    }

    #[test]
    fn test_config_builder() {
        let config = Config::builder()
            .max_login_trials(5)
            .connect_timeout(Duration::from_secs(10))
            .short_cache(true)
            .uid_anomaly(UidAnomalyPolicy::TrustServer)
            .tag_prefix('T')
            .build();

        assert_eq!(config.max_login_trials, 5);
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert!(config.short_cache);
        assert_eq!(config.uid_anomaly, UidAnomalyPolicy::TrustServer);
        assert_eq!(config.tag_prefix, 'T');
        assert_eq!(config.default_port, 143);
    }
}
