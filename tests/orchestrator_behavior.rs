//! Behavior-driven tests for the orchestrator: dispatch policies,
//! fallback, breaker composition, caching, and health introspection.

use std::sync::Arc;
use std::time::Duration;

use adval_core::validator::AddressValidator;
use adval_core::{
    CircuitBreakerConfig, CircuitState, DispatchMode, NormalizedResult, Orchestrator,
    OrchestratorBuilder, OrchestratorConfig, ProviderId, ValidateOptions, ValidationInput,
};

use adval_tests::{cupertino_input, valid_result, ScriptedValidator};

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        provider_timeout: Duration::from_millis(100),
        hedge_stagger: Duration::from_millis(10),
        positive_ttl: Duration::from_secs(60),
        negative_ttl: Duration::from_secs(60),
        cache_capacity: 64,
        breaker: CircuitBreakerConfig {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        },
        ..OrchestratorConfig::default()
    }
}

fn orchestrator_with(
    config: OrchestratorConfig,
    validators: Vec<Arc<dyn AddressValidator>>,
) -> Orchestrator {
    OrchestratorBuilder::new()
        .with_config(config)
        .with_validators(validators)
        .build()
        .expect("valid configuration")
}

fn unavailable(provider: ProviderId) -> NormalizedResult {
    NormalizedResult::unavailable(provider, format!("{provider} is down"))
}

fn rejection(provider: ProviderId) -> NormalizedResult {
    NormalizedResult::rejected(provider, vec![String::from("address does not exist")])
}

fn input(street: &str) -> ValidationInput {
    ValidationInput::new(street, "CA")
        .expect("valid input")
        .with_city("Cupertino")
        .with_postal_code("95014")
}

// =============================================================================
// Waterfall dispatch
// =============================================================================

#[tokio::test]
async fn waterfall_confident_rejection_stops_the_chain() {
    // Given: provider A rejects confidently, B and C would succeed
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![rejection(ProviderId::Usps)],
    ));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let google = Arc::new(ScriptedValidator::new(
        ProviderId::Google,
        vec![valid_result(ProviderId::Google)],
    ));
    let orchestrator = orchestrator_with(
        fast_config(),
        vec![usps.clone(), smarty.clone(), google.clone()],
    );

    // When: the address is validated
    let result = orchestrator
        .validate_address(&input("404 Nowhere Ln"), ValidateOptions::default())
        .await;

    // Then: the rejection is surfaced as-is and nothing else is called
    assert!(!result.is_valid);
    assert!(!result.service_unavailable);
    assert_eq!(result.provider, Some(ProviderId::Usps));
    assert_eq!(smarty.calls(), 0, "confident rejection must not fall back");
    assert_eq!(google.calls(), 0);
}

#[tokio::test]
async fn waterfall_falls_back_past_an_unavailable_provider() {
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![unavailable(ProviderId::Usps)],
    ));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps.clone(), smarty.clone()]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(result.is_valid);
    assert_eq!(result.provider, Some(ProviderId::Smarty));
    assert!(result.did_fallback, "second provider answered");
    assert_eq!(usps.calls(), 1);
    assert_eq!(smarty.calls(), 1);
}

#[tokio::test]
async fn disabled_provider_is_skipped_and_not_counted_as_tried() {
    // The Cupertino scenario: A disabled, B valid with ZIP+4 2084.
    let usps = Arc::new(ScriptedValidator::disabled(ProviderId::Usps));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps.clone(), smarty.clone()]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(result.is_valid);
    assert_eq!(result.provider, Some(ProviderId::Smarty));
    assert!(
        !result.did_fallback,
        "a disabled provider never counts as tried"
    );
    let standardized = result.standardized.expect("standardized address present");
    assert_eq!(standardized.zip4.as_deref(), Some("2084"));
    assert_eq!(usps.calls(), 0, "disabled adapter must never be invoked");
}

#[tokio::test]
async fn exhaustion_aggregates_errors_naming_every_provider() {
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![unavailable(ProviderId::Usps)],
    ));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![unavailable(ProviderId::Smarty)],
    ));
    let google = Arc::new(ScriptedValidator::new(
        ProviderId::Google,
        vec![unavailable(ProviderId::Google)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps, smarty, google]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(!result.is_valid);
    assert!(result.service_unavailable);
    assert!(result.did_fallback);
    assert_eq!(result.provider, None);
    let all_errors = result.errors.join("\n");
    for provider in ["usps", "smarty", "google"] {
        assert!(
            all_errors.contains(provider),
            "aggregated errors must mention '{provider}': {all_errors}"
        );
    }
}

#[tokio::test]
async fn preferred_provider_moves_to_the_front() {
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![valid_result(ProviderId::Usps)],
    ));
    let google = Arc::new(ScriptedValidator::new(
        ProviderId::Google,
        vec![valid_result(ProviderId::Google)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps.clone(), google.clone()]);

    let result = orchestrator
        .validate_address(
            &cupertino_input(),
            ValidateOptions {
                preferred_provider: Some(ProviderId::Google),
                mode: None,
            },
        )
        .await;

    assert_eq!(result.provider, Some(ProviderId::Google));
    assert!(!result.did_fallback);
    assert_eq!(usps.calls(), 0);
}

#[tokio::test]
async fn timeout_is_treated_as_unavailability_and_falls_back() {
    let config = fast_config();
    let usps = Arc::new(
        ScriptedValidator::new(ProviderId::Usps, vec![valid_result(ProviderId::Usps)])
            .with_delay(Duration::from_millis(400)),
    );
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(config, vec![usps, smarty]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(result.is_valid);
    assert_eq!(result.provider, Some(ProviderId::Smarty));
    assert!(result.did_fallback);

    // The timed-out call was recorded as a breaker failure.
    let health = orchestrator.health();
    let usps_health = health
        .providers
        .iter()
        .find(|entry| entry.provider == ProviderId::Usps)
        .expect("usps is registered");
    assert_eq!(usps_health.circuit.consecutive_failures, 1);
}

#[tokio::test]
async fn open_breaker_short_circuits_without_invoking_the_adapter() {
    let config = OrchestratorConfig {
        breaker: CircuitBreakerConfig {
            failure_threshold: 2,
            reset_timeout: Duration::from_secs(60),
        },
        ..fast_config()
    };
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![unavailable(ProviderId::Usps)],
    ));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(config, vec![usps.clone(), smarty.clone()]);

    // Two failures open the breaker (distinct addresses bypass the cache).
    orchestrator
        .validate_address(&input("1 First St"), ValidateOptions::default())
        .await;
    orchestrator
        .validate_address(&input("2 Second St"), ValidateOptions::default())
        .await;
    assert_eq!(usps.calls(), 2);

    let result = orchestrator
        .validate_address(&input("3 Third St"), ValidateOptions::default())
        .await;

    assert!(result.is_valid);
    assert_eq!(result.provider, Some(ProviderId::Smarty));
    assert_eq!(usps.calls(), 2, "open breaker must fail fast");

    let health = orchestrator.health();
    let usps_health = health
        .providers
        .iter()
        .find(|entry| entry.provider == ProviderId::Usps)
        .expect("usps is registered");
    assert_eq!(usps_health.circuit.state, CircuitState::Open);
}

// =============================================================================
// Hedged dispatch
// =============================================================================

#[tokio::test]
async fn hedged_first_definitive_answer_wins() {
    let config = OrchestratorConfig {
        dispatch_mode: DispatchMode::Hedged,
        provider_timeout: Duration::from_millis(500),
        ..fast_config()
    };
    let usps = Arc::new(
        ScriptedValidator::new(ProviderId::Usps, vec![valid_result(ProviderId::Usps)])
            .with_delay(Duration::from_millis(200)),
    );
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![valid_result(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(config, vec![usps, smarty]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    // Smarty starts second (staggered) but answers first.
    assert!(result.is_valid);
    assert_eq!(result.provider, Some(ProviderId::Smarty));
    assert!(result.did_fallback, "winner was not the first in order");
}

#[tokio::test]
async fn hedged_with_no_enabled_providers_returns_synthetic_unavailability() {
    let config = OrchestratorConfig {
        dispatch_mode: DispatchMode::Hedged,
        ..fast_config()
    };
    let usps = Arc::new(ScriptedValidator::disabled(ProviderId::Usps));
    let smarty = Arc::new(ScriptedValidator::disabled(ProviderId::Smarty));
    let orchestrator = orchestrator_with(config, vec![usps.clone(), smarty.clone()]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(!result.is_valid);
    assert!(result.service_unavailable);
    assert_eq!(usps.calls() + smarty.calls(), 0, "nothing must be started");
}

#[tokio::test]
async fn hedged_all_failures_aggregate_into_one_result() {
    let config = OrchestratorConfig {
        dispatch_mode: DispatchMode::Hedged,
        ..fast_config()
    };
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![unavailable(ProviderId::Usps)],
    ));
    let smarty = Arc::new(ScriptedValidator::new(
        ProviderId::Smarty,
        vec![unavailable(ProviderId::Smarty)],
    ));
    let orchestrator = orchestrator_with(config, vec![usps, smarty]);

    let result = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(!result.is_valid);
    assert!(result.service_unavailable);
    let all_errors = result.errors.join("\n");
    assert!(all_errors.contains("usps"));
    assert!(all_errors.contains("smarty"));
}

// =============================================================================
// Caching through the orchestrator
// =============================================================================

#[tokio::test]
async fn repeated_requests_are_served_from_cache_with_zero_latency() {
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![valid_result(ProviderId::Usps)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps.clone()]);

    let first = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;
    assert!(first.latency_ms > 0 || first.is_valid);

    let second = orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;

    assert!(second.is_valid);
    assert_eq!(second.latency_ms, 0, "cached answers report no network time");
    assert_eq!(usps.calls(), 1, "cache hit must not invoke any provider");
}

#[tokio::test]
async fn equivalent_inputs_share_one_cache_entry() {
    let usps = Arc::new(ScriptedValidator::new(
        ProviderId::Usps,
        vec![valid_result(ProviderId::Usps)],
    ));
    let orchestrator = orchestrator_with(fast_config(), vec![usps.clone()]);

    let shouting = ValidationInput::new("1   INFINITE   LOOP", "ca")
        .expect("valid input")
        .with_city("CUPERTINO")
        .with_postal_code(" 95014 ");

    orchestrator
        .validate_address(&cupertino_input(), ValidateOptions::default())
        .await;
    let result = orchestrator
        .validate_address(&shouting, ValidateOptions::default())
        .await;

    assert_eq!(result.latency_ms, 0);
    assert_eq!(usps.calls(), 1);
}

#[tokio::test]
async fn concurrent_identical_requests_share_one_execution() {
    let usps = Arc::new(
        ScriptedValidator::new(ProviderId::Usps, vec![valid_result(ProviderId::Usps)])
            .with_delay(Duration::from_millis(50)),
    );
    let orchestrator = Arc::new(orchestrator_with(fast_config(), vec![usps.clone()]));

    let left = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .validate_address(&cupertino_input(), ValidateOptions::default())
                .await
        })
    };
    let right = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            orchestrator
                .validate_address(&cupertino_input(), ValidateOptions::default())
                .await
        })
    };

    let (left, right) = (
        left.await.expect("task completes"),
        right.await.expect("task completes"),
    );

    assert!(left.is_valid);
    assert!(right.is_valid);
    assert_eq!(
        usps.calls(),
        1,
        "in-flight deduplication must collapse concurrent identical requests"
    );
}
