//! Config for the evaluation loop.
//!
//! Configuration can be created programmatically using [`Configuration::new()`] or by reading
//! environment variables using [`Configuration::from_env()`].
//!
//! # Environment Variables
//!
//! All values are optional; unset or unparsable values keep the default.
//!
//! - `SMB_CONNECT_TIMEOUT_MS`: connect deadline (default: `10000`)
//! - `SMB_SEND_TIMEOUT_MS`: send deadline (default: `60000`)
//! - `SMB_RECEIVE_TIMEOUT_MS`: receive deadline (default: `10000`)
//! - `SMB_MAX_STEPS`: step ceiling per episode (default: `100000000`)
//! - `SMB_STAGNATION_LIMIT`: steps without progress before giving up (default: `70`)
//! - `SMB_DEAD_STATE`: player-state code meaning "dead" (default: `11`)
//! - `SMB_DEGENERATE_TILE_SUM`: tile sum that also means "dead" (default: `3`)
//! - `SMB_SPEED`: `normal`, `maximum` or `turbo` (default: `maximum`)
//! - `SMB_DIVISOR`: frame divisor sent at reset (default: `2`)
//! - `SMB_LOG`: set to `"true"` to log into a file (default: `false`)

use std::time::Duration;

use anyhow::bail;

use crate::game::Speed;
use crate::transport::Client;

/// Configuration of one evaluation episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    pub(crate) connect_timeout: Duration,
    pub(crate) send_timeout: Duration,
    pub(crate) receive_timeout: Duration,
    pub(crate) max_steps: u64,
    pub(crate) stagnation_limit: u32,
    pub(crate) dead_state: i32,
    pub(crate) degenerate_tile_sum: i64,
    pub(crate) speed: Speed,
    pub(crate) divisor: i32,
    pub(crate) log: bool,
}

impl Configuration {
    /// Create a new configuration with default parameters.
    ///
    /// By default:
    /// - Connect and receive give up after 10 s, send after 60 s.
    /// - An episode runs at most 10^8 steps and stops after 70 steps without progress.
    /// - Player state `11` or a tile sum of `3` means Mario died.
    /// - The emulator runs at maximum speed with a frame divisor of 2.
    /// - Logging to file is disabled.
    pub fn new() -> Self {
        Self {
            connect_timeout: Client::CONNECT_TIMEOUT,
            send_timeout: Client::SEND_TIMEOUT,
            receive_timeout: Client::RECEIVE_TIMEOUT,
            max_steps: 100_000_000,
            stagnation_limit: 70,
            dead_state: 11,
            degenerate_tile_sum: 3,
            speed: Speed::Maximum,
            divisor: 2,
            log: false,
        }
    }

    /// Create configuration from environment variables.
    ///
    /// See the module documentation for the recognized variables.
    pub fn from_env() -> Self {
        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            std::env::var(var).ok()?.trim().parse().ok()
        }

        fn parse_millis(var: &str) -> Option<Duration> {
            parse::<u64>(var).map(Duration::from_millis)
        }

        let default = Self::new();
        Self {
            connect_timeout: parse_millis("SMB_CONNECT_TIMEOUT_MS")
                .unwrap_or(default.connect_timeout),
            send_timeout: parse_millis("SMB_SEND_TIMEOUT_MS").unwrap_or(default.send_timeout),
            receive_timeout: parse_millis("SMB_RECEIVE_TIMEOUT_MS")
                .unwrap_or(default.receive_timeout),
            max_steps: parse("SMB_MAX_STEPS").unwrap_or(default.max_steps),
            stagnation_limit: parse("SMB_STAGNATION_LIMIT").unwrap_or(default.stagnation_limit),
            dead_state: parse("SMB_DEAD_STATE").unwrap_or(default.dead_state),
            degenerate_tile_sum: parse("SMB_DEGENERATE_TILE_SUM")
                .unwrap_or(default.degenerate_tile_sum),
            speed: parse("SMB_SPEED").unwrap_or(default.speed),
            divisor: parse("SMB_DIVISOR").unwrap_or(default.divisor),
            log: std::env::var("SMB_LOG")
                .map(|val| val.eq_ignore_ascii_case("true"))
                .unwrap_or(default.log),
        }
    }

    /// Check that the loop can make progress with these values.
    ///
    /// # Errors
    /// A zero timeout, a zero stagnation limit or step ceiling, or a non-positive divisor.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.connect_timeout.is_zero()
            || self.send_timeout.is_zero()
            || self.receive_timeout.is_zero()
        {
            bail!("timeouts must be greater than zero");
        }
        if self.stagnation_limit == 0 {
            bail!("stagnation limit must be at least one step");
        }
        if self.max_steps == 0 {
            bail!("step ceiling must be at least one step");
        }
        if self.divisor <= 0 {
            bail!("divisor must be positive, got {}", self.divisor);
        }
        Ok(())
    }

    /// Deadline for connecting to master and worker.
    pub fn with_connect_timeout(mut self, value: Duration) -> Self {
        self.connect_timeout = value;
        self
    }

    /// Deadline for a single send.
    pub fn with_send_timeout(mut self, value: Duration) -> Self {
        self.send_timeout = value;
        self
    }

    /// Deadline for a single reply.
    pub fn with_receive_timeout(mut self, value: Duration) -> Self {
        self.receive_timeout = value;
        self
    }

    /// Upper bound on steps per episode.
    pub fn with_max_steps(mut self, value: u64) -> Self {
        self.max_steps = value;
        self
    }

    /// Steps without forward progress before the episode stops.
    pub fn with_stagnation_limit(mut self, value: u32) -> Self {
        self.stagnation_limit = value;
        self
    }

    /// Player-state code reported when Mario dies.
    pub fn with_dead_state(mut self, value: i32) -> Self {
        self.dead_state = value;
        self
    }

    /// Tile sum the server reports for a dead or blank screen.
    pub fn with_degenerate_tile_sum(mut self, value: i64) -> Self {
        self.degenerate_tile_sum = value;
        self
    }

    /// Emulation speed set at reset.
    pub fn with_speed(mut self, value: Speed) -> Self {
        self.speed = value;
        self
    }

    /// Frame divisor set at reset.
    pub fn with_divisor(mut self, value: i32) -> Self {
        self.divisor = value;
        self
    }

    /// Enable or disable logging to file.
    pub fn with_log(mut self, value: bool) -> Self {
        self.log = value;
        self
    }

    /// Whether logs go to a file.
    pub fn log(&self) -> bool {
        self.log
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Configuration::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.stagnation_limit, 70);
        assert_eq!(config.receive_timeout, Duration::from_secs(10));
    }

    #[test]
    fn builder_overrides_fields() {
        let config = Configuration::new()
            .with_stagnation_limit(5)
            .with_speed(Speed::Turbo)
            .with_receive_timeout(Duration::from_millis(250));
        assert_eq!(config.stagnation_limit, 5);
        assert_eq!(config.speed, Speed::Turbo);
        assert_eq!(config.receive_timeout, Duration::from_millis(250));
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Configuration::new()
            .with_receive_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(Configuration::new()
            .with_stagnation_limit(0)
            .validate()
            .is_err());
        assert!(Configuration::new().with_divisor(0).validate().is_err());
    }
}
