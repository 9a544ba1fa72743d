//! Orchestrator: composes the cache, per-provider circuit breakers, and
//! the provider adapters into one dependable validate operation.
//!
//! Owns all mutable state explicitly (one instance per process, one
//! isolated instance per test); nothing here is a global singleton.

use std::collections::HashMap;
use std::env;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::adapters::{
    GoogleAdapter, SmartyAdapter, SmartyCredentials, UspsAdapter, UspsCredentials,
};
use crate::cache::{CacheStats, ValidationCache};
use crate::circuit_breaker::{BreakerSnapshot, CircuitBreaker};
use crate::config::{DispatchMode, OrchestratorConfig};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::validator::AddressValidator;
use crate::{ConfigError, NormalizedResult, ProviderId, ValidationInput};

/// Per-call overrides for the public validate operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidateOptions {
    /// Moved to the front of the configured order when present.
    pub preferred_provider: Option<ProviderId>,
    /// Overrides the configured dispatch mode.
    pub mode: Option<DispatchMode>,
}

/// One provider's entry in the health report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ProviderHealth {
    pub provider: ProviderId,
    pub enabled: bool,
    pub circuit: BreakerSnapshot,
}

/// Read-only, side-effect-free snapshot of the layer's state.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub providers: Vec<ProviderHealth>,
    pub cache: CacheStats,
}

/// An adapter paired with its breaker and the per-call timeout.
#[derive(Clone)]
struct GuardedProvider {
    provider: ProviderId,
    adapter: Arc<dyn AddressValidator>,
    breaker: Arc<CircuitBreaker>,
    timeout: Duration,
}

impl GuardedProvider {
    /// Invoke the adapter through its breaker with the per-provider
    /// timeout. A timeout counts as a failure for breaker purposes and
    /// reads as service-unavailable to the dispatch policies.
    async fn call(&self, input: &ValidationInput) -> NormalizedResult {
        if !self.breaker.allow_request() {
            debug!(provider = %self.provider, "circuit breaker is open; skipping call");
            return NormalizedResult::unavailable(
                self.provider,
                format!("circuit breaker is open for {}", self.provider),
            );
        }

        match tokio::time::timeout(self.timeout, self.adapter.validate(input)).await {
            Ok(result) => {
                if result.service_unavailable {
                    self.breaker.record_failure();
                } else {
                    self.breaker.record_success();
                }
                result
            }
            Err(_) => {
                self.breaker.record_failure();
                NormalizedResult::unavailable(
                    self.provider,
                    format!(
                        "{} timed out after {}ms",
                        self.provider,
                        self.timeout.as_millis()
                    ),
                )
            }
        }
    }
}

/// Entry point for the surrounding application.
pub struct Orchestrator {
    registry: HashMap<ProviderId, GuardedProvider>,
    cache: ValidationCache,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    /// Validate one address, consulting the cache first.
    ///
    /// Resolves under all provider-side failure conditions; only
    /// programmer errors (invalid construction-time configuration) ever
    /// surface as faults, and those are caught in [`OrchestratorBuilder`].
    pub async fn validate_address(
        &self,
        input: &ValidationInput,
        options: ValidateOptions,
    ) -> NormalizedResult {
        let mode = options.mode.unwrap_or(self.config.dispatch_mode);
        let order = self.plan_order(options.preferred_provider);
        let stagger = self.config.hedge_stagger;
        let owned_input = input.clone();

        let executor = async move {
            Ok(match mode {
                DispatchMode::Waterfall => run_waterfall(order, owned_input).await,
                DispatchMode::Hedged => run_hedged(order, owned_input, stagger).await,
            })
        };

        match self
            .cache
            .get_or_execute(
                input,
                executor,
                self.config.positive_ttl,
                self.config.negative_ttl,
            )
            .await
        {
            Ok(result) => result,
            // The dispatch executor is infallible; this arm only guards a
            // future executor that can fail.
            Err(error) => NormalizedResult::exhausted(vec![error.to_string()]),
        }
    }

    /// Read-only health/statistics snapshot.
    pub fn health(&self) -> HealthReport {
        let providers = ProviderId::ALL
            .iter()
            .filter_map(|provider| self.registry.get(provider))
            .map(|guarded| ProviderHealth {
                provider: guarded.provider,
                enabled: guarded.adapter.is_enabled(),
                circuit: guarded.breaker.snapshot(),
            })
            .collect();

        HealthReport {
            providers,
            cache: self.cache.stats(),
        }
    }

    /// Start the periodic cache expiry sweep on the current runtime.
    pub fn spawn_cache_sweeper(&self) -> tokio::task::JoinHandle<()> {
        self.cache.spawn_sweeper(self.config.sweep_interval)
    }

    /// Configured order with the preferred provider, if any, moved to the
    /// front; the rest keep their configured relative order.
    fn plan_order(&self, preferred: Option<ProviderId>) -> Vec<GuardedProvider> {
        let mut order: Vec<ProviderId> = self.config.provider_order.clone();
        if let Some(preferred) = preferred {
            order.retain(|provider| *provider != preferred);
            if self.registry.contains_key(&preferred) {
                order.insert(0, preferred);
            }
        }

        order
            .into_iter()
            .filter_map(|provider| self.registry.get(&provider).cloned())
            .collect()
    }
}

/// Sequential fallback: strictly one provider at a time, stopping at the
/// first definitive answer. Disabled providers are skipped silently and
/// never counted as tried.
async fn run_waterfall(order: Vec<GuardedProvider>, input: ValidationInput) -> NormalizedResult {
    let started = Instant::now();
    let mut attempt_errors = Vec::new();
    let mut tried = 0usize;

    for guarded in order {
        if !guarded.adapter.is_enabled() {
            continue;
        }
        tried += 1;

        let result = guarded.call(&input).await;
        if result.is_valid {
            let mut result = result;
            result.did_fallback = tried > 1;
            return result;
        }
        if result.is_definitive() {
            // Confident rejection: never retried against other providers.
            return result;
        }

        debug!(provider = %guarded.provider, "provider unavailable; falling back");
        attempt_errors.push(format!(
            "{}: {}",
            guarded.provider,
            result.errors.join("; ")
        ));
    }

    if tried == 0 {
        return NormalizedResult::exhausted(vec![String::from(
            "no enabled providers are configured",
        )]);
    }

    warn!(tried, "all providers exhausted without a definitive answer");
    NormalizedResult::exhausted(attempt_errors).with_latency(elapsed_ms(started))
}

/// Concurrent racing: start every enabled provider, staggered by position,
/// and take the first definitive answer. Losing calls are not cancelled;
/// they finish in the background and their outcomes still update the
/// breakers.
async fn run_hedged(
    order: Vec<GuardedProvider>,
    input: ValidationInput,
    stagger: Duration,
) -> NormalizedResult {
    let started = Instant::now();
    let enabled: Vec<GuardedProvider> = order
        .into_iter()
        .filter(|guarded| guarded.adapter.is_enabled())
        .collect();

    if enabled.is_empty() {
        return NormalizedResult::exhausted(vec![String::from(
            "no enabled providers are configured",
        )]);
    }

    let (tx, mut rx) = mpsc::channel(enabled.len());
    for (position, guarded) in enabled.iter().enumerate() {
        let delay = stagger * position as u32;
        let tx = tx.clone();
        let guarded = guarded.clone();
        let input = input.clone();
        tokio::spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let result = guarded.call(&input).await;
            // The receiver is gone once the race has a winner.
            let _ = tx.send((position, result)).await;
        });
    }
    drop(tx);

    let mut attempt_errors = Vec::new();
    while let Some((position, result)) = rx.recv().await {
        if result.is_definitive() {
            let mut result = result;
            result.did_fallback = position > 0;
            return result;
        }
        attempt_errors.push(format!(
            "{}: {}",
            enabled[position].provider,
            result.errors.join("; ")
        ));
    }

    warn!("all hedged providers failed without a definitive answer");
    NormalizedResult::exhausted(attempt_errors).with_latency(elapsed_ms(started))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64
}

/// Builder for an [`Orchestrator`] with real adapters.
///
/// Credentials are read from environment variables; a provider whose
/// credentials are absent stays registered but disabled, so the layer as
/// a whole keeps working with whatever remains.
///
/// | Provider | Variables |
/// |----------|-----------|
/// | USPS | `ADVAL_USPS_CLIENT_ID` / `ADVAL_USPS_CLIENT_SECRET` (fallback `USPS_CLIENT_ID` / `USPS_CLIENT_SECRET`) |
/// | Smarty | `ADVAL_SMARTY_AUTH_ID` / `ADVAL_SMARTY_AUTH_TOKEN` (fallback `SMARTY_AUTH_ID` / `SMARTY_AUTH_TOKEN`) |
/// | Google | `ADVAL_GOOGLE_API_KEY` (fallback `GOOGLE_API_KEY`) |
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<OrchestratorConfig>,
    http_client: Option<Arc<dyn HttpClient>>,
    usps_credentials: Option<UspsCredentials>,
    smarty_credentials: Option<SmartyCredentials>,
    google_api_key: Option<String>,
    validators: Option<Vec<Arc<dyn AddressValidator>>>,
}

impl OrchestratorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read configuration and credentials from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = OrchestratorConfig::from_env()?;

        let usps_credentials = match (
            env_either("ADVAL_USPS_CLIENT_ID", "USPS_CLIENT_ID"),
            env_either("ADVAL_USPS_CLIENT_SECRET", "USPS_CLIENT_SECRET"),
        ) {
            (Some(client_id), Some(client_secret)) => Some(UspsCredentials {
                client_id,
                client_secret,
            }),
            _ => None,
        };
        let smarty_credentials = match (
            env_either("ADVAL_SMARTY_AUTH_ID", "SMARTY_AUTH_ID"),
            env_either("ADVAL_SMARTY_AUTH_TOKEN", "SMARTY_AUTH_TOKEN"),
        ) {
            (Some(auth_id), Some(auth_token)) => Some(SmartyCredentials {
                auth_id,
                auth_token,
            }),
            _ => None,
        };
        let google_api_key = env_either("ADVAL_GOOGLE_API_KEY", "GOOGLE_API_KEY");

        Ok(Self {
            config: Some(config),
            http_client: None,
            usps_credentials,
            smarty_credentials,
            google_api_key,
            validators: None,
        })
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn with_http_client(mut self, http_client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(http_client);
        self
    }

    pub fn with_usps_credentials(mut self, credentials: UspsCredentials) -> Self {
        self.usps_credentials = Some(credentials);
        self
    }

    pub fn with_smarty_credentials(mut self, credentials: SmartyCredentials) -> Self {
        self.smarty_credentials = Some(credentials);
        self
    }

    pub fn with_google_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.google_api_key = Some(api_key.into());
        self
    }

    /// Replace the adapter set entirely; used by tests to inject scripted
    /// validators.
    pub fn with_validators(mut self, validators: Vec<Arc<dyn AddressValidator>>) -> Self {
        self.validators = Some(validators);
        self
    }

    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let validators = match self.validators {
            Some(validators) => validators,
            None => {
                let http_client: Arc<dyn HttpClient> = self
                    .http_client
                    .unwrap_or_else(|| Arc::new(ReqwestHttpClient::new()));
                vec![
                    Arc::new(UspsAdapter::new(
                        Arc::clone(&http_client),
                        self.usps_credentials,
                    )) as Arc<dyn AddressValidator>,
                    Arc::new(SmartyAdapter::new(
                        Arc::clone(&http_client),
                        self.smarty_credentials,
                    )),
                    Arc::new(GoogleAdapter::new(http_client, self.google_api_key)),
                ]
            }
        };

        let registry = validators
            .into_iter()
            .map(|adapter| {
                let provider = adapter.id();
                (
                    provider,
                    GuardedProvider {
                        provider,
                        adapter,
                        breaker: Arc::new(CircuitBreaker::new(config.breaker)),
                        timeout: config.provider_timeout,
                    },
                )
            })
            .collect();

        Ok(Orchestrator {
            registry,
            cache: ValidationCache::new(config.cache_capacity),
            config,
        })
    }
}

fn env_either(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary).or_else(|_| env::var(fallback)).ok()
}
