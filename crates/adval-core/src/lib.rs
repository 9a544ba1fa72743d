//! # adval-core
//!
//! Address-validation resilience layer: turns unreliable, rate-limited,
//! differently-shaped third-party address-verification services into one
//! dependable, low-latency, idempotent operation.
//!
//! ## Overview
//!
//! - **Provider adapters** (USPS, Smarty, Google) that normalize
//!   proprietary responses into one [`NormalizedResult`] shape and never
//!   raise for provider-side failures
//! - **Circuit breaker** per provider, so a failing upstream is not
//!   hammered while it recovers
//! - **Validation cache** with canonical keys, distinct positive/negative
//!   TTLs, insertion-order eviction, and in-flight deduplication
//! - **Orchestrator** composing all of the above behind two dispatch
//!   policies: waterfall (sequential fallback) and hedged (staggered
//!   concurrent racing)
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | Provider adapters (USPS, Smarty, Google) |
//! | [`address`] | Request/result value types |
//! | [`cache`] | Validation cache and in-flight deduplication |
//! | [`circuit_breaker`] | Per-provider failure state machine |
//! | [`config`] | Startup configuration (`ADVAL_*` variables) |
//! | [`error`] | Programmer-error-class error types |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`orchestrator`] | Dispatch policies and health introspection |
//! | [`provider`] | Provider identifiers |
//! | [`validator`] | Adapter contract |
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use adval_core::{Orchestrator, OrchestratorBuilder, ValidateOptions, ValidationInput};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = OrchestratorBuilder::from_env()?.build()?;
//!
//!     let input = ValidationInput::new("1 Infinite Loop", "CA")?
//!         .with_city("Cupertino")
//!         .with_postal_code("95014");
//!
//!     let result = orchestrator
//!         .validate_address(&input, ValidateOptions::default())
//!         .await;
//!     println!("valid: {} (provider: {:?})", result.is_valid, result.provider);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error handling
//!
//! The public validate operation resolves under all provider-side failure
//! conditions; `service_unavailable` on the result distinguishes "could
//! not ask anyone" from "the address is invalid". Only programmer errors
//! ([`InputError`], [`ConfigError`]) surface as `Err`.
//!
//! ## Security
//!
//! Credentials are read from environment variables only and are never
//! logged; all upstream calls go through TLS via reqwest.

pub mod adapters;
pub mod address;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod error;
pub mod http_client;
pub mod orchestrator;
pub mod provider;
pub mod validator;

pub use adapters::{GoogleAdapter, SmartyAdapter, SmartyCredentials, UspsAdapter, UspsCredentials};
pub use address::{NormalizedResult, StandardizedAddress, ValidationInput};
pub use cache::{canonical_key, CacheStats, ExecutionError, ValidationCache};
pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::{DispatchMode, OrchestratorConfig};
pub use error::{ConfigError, InputError};
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient,
};
pub use orchestrator::{
    HealthReport, Orchestrator, OrchestratorBuilder, ProviderHealth, ValidateOptions,
};
pub use provider::ProviderId;
pub use validator::{AddressValidator, ValidateFuture};
