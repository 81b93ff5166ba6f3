use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::error::GuardError;

/// Reference idle timeout of the dashboard, in minutes.
pub const DEFAULT_TIMEOUT_MINUTES: u64 = 5;
/// The prompt is shown for the final 30 seconds of the idle window.
pub const DEFAULT_WARNING_LEAD: Duration = Duration::from_secs(30);
/// Longest idle timeout a guard accepts.
pub const MAX_IDLE_TIMEOUT: Duration = Duration::from_secs(7 * 24 * 60 * 60);
/// Bursts of pointer-move/scroll signals inside this window re-arm the warn timer once.
pub const DEFAULT_COALESCE_WINDOW: Duration = Duration::from_millis(1_000);

/// Timing parameters of a mounted guard.
///
/// Immutable for the lifetime of the guard that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardConfig {
    idle_timeout: Duration,
    warning_lead: Duration,
    coalesce_window: Duration,
}

impl GuardConfig {
    /// Creates a `GuardConfig`.
    ///
    /// # Arguments
    ///
    /// * `idle_timeout` - Total idle time before the session is ended.
    /// * `warning_lead` - Portion of `idle_timeout` during which the prompt is shown.
    ///
    /// # Returns
    ///
    /// `GuardError::InvalidConfig` unless `0 <= warning_lead < idle_timeout`
    /// and `0 < idle_timeout <= MAX_IDLE_TIMEOUT`.
    pub fn new(idle_timeout: Duration, warning_lead: Duration) -> Result<Self, GuardError> {
        if idle_timeout.is_zero() {
            return Err(GuardError::InvalidConfig(
                "idle timeout must be greater than zero".to_string(),
            ));
        }

        if idle_timeout > MAX_IDLE_TIMEOUT {
            return Err(GuardError::InvalidConfig(format!(
                "idle timeout ({}s) exceeds the {}s maximum",
                idle_timeout.as_secs(),
                MAX_IDLE_TIMEOUT.as_secs()
            )));
        }

        if warning_lead >= idle_timeout {
            return Err(GuardError::InvalidConfig(format!(
                "warning lead ({}ms) must be shorter than the idle timeout ({}ms)",
                warning_lead.as_millis(),
                idle_timeout.as_millis()
            )));
        }

        Ok(Self {
            idle_timeout,
            warning_lead,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
        })
    }

    /// Builds the configuration a caller gets from `{ timeoutMinutes }`:
    /// the warning covers the last 30 seconds of the window.
    pub fn from_minutes(timeout_minutes: u64) -> Result<Self, GuardError> {
        Self::new(
            Duration::from_secs(timeout_minutes.saturating_mul(60)),
            DEFAULT_WARNING_LEAD,
        )
    }

    /// Overrides the coalescing window for high-frequency activity.
    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = window;
        self
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn warning_lead(&self) -> Duration {
        self.warning_lead
    }

    pub fn coalesce_window(&self) -> Duration {
        self.coalesce_window
    }

    /// Idle time after which the guard enters `Warning`.
    pub fn warn_delay(&self) -> Duration {
        self.idle_timeout - self.warning_lead
    }
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(DEFAULT_TIMEOUT_MINUTES * 60),
            warning_lead: DEFAULT_WARNING_LEAD,
            coalesce_window: DEFAULT_COALESCE_WINDOW,
        }
    }
}

/// The host's configuration.
#[derive(Clone, Debug)]
pub struct Config {
    /// The guard timings applied to every protected session.
    pub guard: GuardConfig,
    /// Where unauthenticated sessions are sent.
    pub public_entry_path: String,
    /// The socket the HTTP host binds to.
    pub bind_addr: SocketAddr,
    /// Lifetime of the host session cookie in hours.
    pub session_duration_hours: i64,
}

impl Config {
    /// Creates a new `Config` from environment variables.
    ///
    /// # Returns
    ///
    /// A `Result` containing the `Config`.
    pub fn from_env() -> Result<Self> {
        let timeout_minutes: u64 = env::var("IDLE_TIMEOUT_MINUTES")
            .unwrap_or_else(|_| DEFAULT_TIMEOUT_MINUTES.to_string())
            .parse()
            .context("Invalid IDLE_TIMEOUT_MINUTES")?;

        let warning_lead_secs: u64 = env::var("WARNING_LEAD_SECONDS")
            .unwrap_or_else(|_| DEFAULT_WARNING_LEAD.as_secs().to_string())
            .parse()
            .context("Invalid WARNING_LEAD_SECONDS")?;

        let coalesce_ms: u64 = env::var("ACTIVITY_COALESCE_MS")
            .unwrap_or_else(|_| DEFAULT_COALESCE_WINDOW.as_millis().to_string())
            .parse()
            .context("Invalid ACTIVITY_COALESCE_MS")?;

        let guard = GuardConfig::new(
            Duration::from_secs(timeout_minutes.saturating_mul(60)),
            Duration::from_secs(warning_lead_secs),
        )
        .context("Invalid guard timings")?
        .with_coalesce_window(Duration::from_millis(coalesce_ms));

        let public_entry_path =
            env::var("PUBLIC_ENTRY_PATH").unwrap_or_else(|_| "/login".to_string());
        if !public_entry_path.starts_with('/') {
            anyhow::bail!("PUBLIC_ENTRY_PATH must be an absolute path");
        }

        Ok(Self {
            guard,
            public_entry_path,
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "127.0.0.1:3000".to_string())
                .parse()
                .context("Invalid BIND_ADDR")?,
            session_duration_hours: env::var("SESSION_DURATION_HOURS")
                .unwrap_or_else(|_| "8".to_string())
                .parse()
                .context("Invalid SESSION_DURATION_HOURS")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_config_warns_thirty_seconds_before_expiry() {
        let config = GuardConfig::from_minutes(5).unwrap();
        assert_eq!(config.idle_timeout(), Duration::from_millis(300_000));
        assert_eq!(config.warning_lead(), Duration::from_millis(30_000));
        assert_eq!(config.warn_delay(), Duration::from_millis(270_000));
        assert_eq!(config, GuardConfig::default());
    }

    #[test]
    fn rejects_lead_not_shorter_than_timeout() {
        let err = GuardConfig::new(Duration::from_secs(30), Duration::from_secs(30)).unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfig(_)));
        assert!(GuardConfig::from_minutes(0).is_err());
    }

    #[test]
    fn rejects_oversized_timeouts() {
        let err = GuardConfig::from_minutes(u64::MAX).unwrap_err();
        assert!(matches!(err, GuardError::InvalidConfig(_)));
        assert!(GuardConfig::new(MAX_IDLE_TIMEOUT + Duration::from_secs(1), DEFAULT_WARNING_LEAD).is_err());

        let longest = GuardConfig::new(MAX_IDLE_TIMEOUT, DEFAULT_WARNING_LEAD).unwrap();
        assert_eq!(longest.idle_timeout(), MAX_IDLE_TIMEOUT);
    }

    #[test]
    fn zero_lead_is_allowed() {
        let config = GuardConfig::new(Duration::from_secs(10), Duration::ZERO).unwrap();
        assert_eq!(config.warn_delay(), Duration::from_secs(10));
    }
}
