use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub delta: DeltaConfig,
    pub retry: RetryConfig,
    pub execution: ExecutionConfig,
    pub monitor: MonitorConfig,
    pub strikes: StrikeConfig,
}

/// Venue connection settings. Credentials are read from the named
/// environment variables, never from config files.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    pub base_url: String,
    pub api_key_env: String,
    pub api_secret_env: String,
    pub requests_per_minute: u32,
    pub timeout_secs: u64,
    pub user_agent: String,
    /// Settlement asset used for the margin check.
    pub settlement_asset: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    /// First backoff delay; doubled on every further attempt.
    pub base_delay_ms: u64,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    pub fill_timeout_secs: u64,
    pub fill_poll_interval_secs: u64,
    /// Required available balance as a multiple of position cost.
    pub margin_buffer: Decimal,
    /// How much worse than entry the move-to-cost limit sits, in percent.
    pub move_to_cost_limit_offset_pct: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub poll_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrikeConfig {
    /// Strike spacing per underlying.
    pub increments: HashMap<String, Decimal>,
    pub default_increment: Decimal,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.india.delta.exchange".to_string(),
            api_key_env: "DELTA_API_KEY".to_string(),
            api_secret_env: "DELTA_API_SECRET".to_string(),
            requests_per_minute: 120,
            timeout_secs: 30,
            user_agent: "straddle-engine/0.1".to_string(),
            settlement_asset: "USD".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay_ms: 1000,
            request_timeout_secs: 30,
        }
    }
}

impl RetryConfig {
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Backoff before retry number `attempt` (0-based): `base * 2^attempt`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << attempt.min(16)))
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            fill_timeout_secs: 60,
            fill_poll_interval_secs: 2,
            margin_buffer: Decimal::new(12, 1),
            move_to_cost_limit_offset_pct: Decimal::from(2),
        }
    }
}

impl ExecutionConfig {
    #[must_use]
    pub fn fill_timeout(&self) -> Duration {
        Duration::from_secs(self.fill_timeout_secs)
    }

    #[must_use]
    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fill_poll_interval_secs)
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 30,
        }
    }
}

impl MonitorConfig {
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for StrikeConfig {
    fn default() -> Self {
        let mut increments = HashMap::new();
        increments.insert("BTC".to_string(), Decimal::from(1000));
        increments.insert("ETH".to_string(), Decimal::from(50));
        Self {
            increments,
            default_increment: Decimal::from(100),
        }
    }
}

impl StrikeConfig {
    /// Strike spacing for an underlying, falling back to the default.
    #[must_use]
    pub fn increment_for(&self, underlying: &str) -> Decimal {
        // env-sourced keys arrive lowercased
        self.increments
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(underlying))
            .map_or(self.default_increment, |(_, inc)| *inc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_venue_conventions() {
        let config = AppConfig::default();
        assert_eq!(config.delta.base_url, "https://api.india.delta.exchange");
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.execution.fill_timeout(), Duration::from_secs(60));
        assert_eq!(config.execution.margin_buffer, dec!(1.2));
        assert_eq!(config.monitor.poll_interval(), Duration::from_secs(30));
    }

    #[test]
    fn backoff_doubles() {
        let retry = RetryConfig {
            base_delay_ms: 100,
            ..Default::default()
        };
        assert_eq!(retry.backoff(0), Duration::from_millis(100));
        assert_eq!(retry.backoff(1), Duration::from_millis(200));
        assert_eq!(retry.backoff(3), Duration::from_millis(800));
    }

    #[test]
    fn increment_lookup_is_case_insensitive_with_fallback() {
        let strikes = StrikeConfig::default();
        assert_eq!(strikes.increment_for("btc"), dec!(1000));
        assert_eq!(strikes.increment_for("ETH"), dec!(50));
        assert_eq!(strikes.increment_for("SOL"), dec!(100));
    }
}
