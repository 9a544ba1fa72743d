//! Startup configuration for the resilience layer.
//!
//! Read once from `ADVAL_*` environment variables; absence of a value
//! falls back to the documented default. Credentials live on the builder
//! (`OrchestratorBuilder`), not here: a missing credential disables one
//! provider, never the whole layer.

use std::env;
use std::time::Duration;

use crate::circuit_breaker::CircuitBreakerConfig;
use crate::{ConfigError, ProviderId};

/// How the orchestrator dispatches over the provider order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// Sequential fallback: one provider at a time, stop at the first
    /// definitive answer.
    #[default]
    Waterfall,
    /// Concurrent racing with staggered starts; first definitive answer
    /// wins, losers are left to finish in the background.
    Hedged,
}

impl DispatchMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Waterfall => "waterfall",
            Self::Hedged => "hedged",
        }
    }
}

impl std::str::FromStr for DispatchMode {
    type Err = crate::InputError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "waterfall" => Ok(Self::Waterfall),
            "hedged" => Ok(Self::Hedged),
            other => Err(crate::InputError::InvalidDispatchMode {
                value: other.to_owned(),
            }),
        }
    }
}

/// Tunables owned by one orchestrator instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    /// Default provider priority order.
    pub provider_order: Vec<ProviderId>,
    pub dispatch_mode: DispatchMode,
    /// Upper bound on any single guarded provider call.
    pub provider_timeout: Duration,
    /// Hedged-mode start delay multiplied by provider position.
    pub hedge_stagger: Duration,
    /// Lifetime of cached valid results.
    pub positive_ttl: Duration,
    /// Lifetime of cached invalid/rejected results.
    pub negative_ttl: Duration,
    pub cache_capacity: usize,
    pub breaker: CircuitBreakerConfig,
    /// Interval of the background expiry sweep.
    pub sweep_interval: Duration,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            provider_order: vec![ProviderId::Usps, ProviderId::Smarty, ProviderId::Google],
            dispatch_mode: DispatchMode::Waterfall,
            provider_timeout: Duration::from_secs(5),
            hedge_stagger: Duration::from_millis(250),
            positive_ttl: Duration::from_secs(7 * 24 * 60 * 60),
            negative_ttl: Duration::from_secs(60 * 60),
            cache_capacity: 10_000,
            breaker: CircuitBreakerConfig::default(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl OrchestratorConfig {
    /// Read configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Read configuration through an injectable lookup, so tests never
    /// mutate process-global environment state.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup("ADVAL_PROVIDER_ORDER") {
            config.provider_order = parse_provider_order(&raw)?;
        }
        if let Some(raw) = lookup("ADVAL_DISPATCH_MODE") {
            config.dispatch_mode = raw
                .parse()
                .map_err(|error| invalid("ADVAL_DISPATCH_MODE", &raw, error))?;
        }
        if let Some(raw) = lookup("ADVAL_PROVIDER_TIMEOUT_MS") {
            config.provider_timeout = Duration::from_millis(parse_u64("ADVAL_PROVIDER_TIMEOUT_MS", &raw)?);
        }
        if let Some(raw) = lookup("ADVAL_HEDGE_STAGGER_MS") {
            config.hedge_stagger = Duration::from_millis(parse_u64("ADVAL_HEDGE_STAGGER_MS", &raw)?);
        }
        if let Some(raw) = lookup("ADVAL_POSITIVE_TTL_SECS") {
            config.positive_ttl = Duration::from_secs(parse_u64("ADVAL_POSITIVE_TTL_SECS", &raw)?);
        }
        if let Some(raw) = lookup("ADVAL_NEGATIVE_TTL_SECS") {
            config.negative_ttl = Duration::from_secs(parse_u64("ADVAL_NEGATIVE_TTL_SECS", &raw)?);
        }
        if let Some(raw) = lookup("ADVAL_CACHE_CAPACITY") {
            config.cache_capacity = parse_u64("ADVAL_CACHE_CAPACITY", &raw)? as usize;
        }
        if let Some(raw) = lookup("ADVAL_BREAKER_THRESHOLD") {
            config.breaker.failure_threshold = parse_u64("ADVAL_BREAKER_THRESHOLD", &raw)? as u32;
        }
        if let Some(raw) = lookup("ADVAL_BREAKER_RESET_SECS") {
            config.breaker.reset_timeout = Duration::from_secs(parse_u64("ADVAL_BREAKER_RESET_SECS", &raw)?);
        }
        if let Some(raw) = lookup("ADVAL_SWEEP_INTERVAL_SECS") {
            config.sweep_interval = Duration::from_secs(parse_u64("ADVAL_SWEEP_INTERVAL_SECS", &raw)?);
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider_order.is_empty() {
            return Err(ConfigError::EmptyProviderOrder);
        }
        for (index, provider) in self.provider_order.iter().enumerate() {
            if self.provider_order[..index].contains(provider) {
                return Err(ConfigError::DuplicateProvider {
                    provider: *provider,
                });
            }
        }
        if self.cache_capacity == 0 {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        Ok(())
    }
}

fn parse_provider_order(raw: &str) -> Result<Vec<ProviderId>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.parse()
                .map_err(|error| invalid("ADVAL_PROVIDER_ORDER", raw, error))
        })
        .collect()
}

fn parse_u64(variable: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|error: std::num::ParseIntError| invalid(variable, raw, error))
}

fn invalid(variable: &str, value: &str, reason: impl std::fmt::Display) -> ConfigError {
    ConfigError::InvalidVariable {
        variable: variable.to_owned(),
        value: value.to_owned(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from<'a>(pairs: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        move |name| map.get(name).map(|value| (*value).to_owned())
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let config = OrchestratorConfig::from_lookup(|_| None).expect("defaults are valid");
        assert_eq!(config, OrchestratorConfig::default());
        assert_eq!(config.dispatch_mode, DispatchMode::Waterfall);
    }

    #[test]
    fn parses_provider_order_and_mode() {
        let config = OrchestratorConfig::from_lookup(lookup_from(&[
            ("ADVAL_PROVIDER_ORDER", "google, usps"),
            ("ADVAL_DISPATCH_MODE", "hedged"),
            ("ADVAL_PROVIDER_TIMEOUT_MS", "1500"),
        ]))
        .expect("valid configuration");

        assert_eq!(
            config.provider_order,
            vec![ProviderId::Google, ProviderId::Usps]
        );
        assert_eq!(config.dispatch_mode, DispatchMode::Hedged);
        assert_eq!(config.provider_timeout, Duration::from_millis(1500));
    }

    #[test]
    fn rejects_unknown_dispatch_mode() {
        let error = OrchestratorConfig::from_lookup(lookup_from(&[(
            "ADVAL_DISPATCH_MODE",
            "parallel",
        )]))
        .expect_err("unknown mode must fail");
        assert!(matches!(error, ConfigError::InvalidVariable { .. }));
    }

    #[test]
    fn rejects_duplicate_provider_order() {
        let error = OrchestratorConfig::from_lookup(lookup_from(&[(
            "ADVAL_PROVIDER_ORDER",
            "usps,usps",
        )]))
        .expect_err("duplicate order must fail");
        assert!(matches!(error, ConfigError::DuplicateProvider { .. }));
    }

    #[test]
    fn rejects_zero_cache_capacity() {
        let error = OrchestratorConfig::from_lookup(lookup_from(&[("ADVAL_CACHE_CAPACITY", "0")]))
            .expect_err("zero capacity must fail");
        assert!(matches!(error, ConfigError::ZeroCacheCapacity));
    }
}
