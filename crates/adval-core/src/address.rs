//! Caller-facing value types: the validation request and the one result
//! shape every caller sees regardless of which provider answered.

use serde::{Deserialize, Serialize};

use crate::{InputError, ProviderId};

/// Immutable, caller-supplied address to validate.
///
/// Only the street line and the 2-letter state code are mandatory; the
/// constructor rejects anything else as a programmer error rather than
/// letting it reach a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationInput {
    pub street: String,
    pub secondary: Option<String>,
    pub city: Option<String>,
    pub state: String,
    pub postal_code: Option<String>,
}

impl ValidationInput {
    pub fn new(street: impl Into<String>, state: impl Into<String>) -> Result<Self, InputError> {
        let street = street.into();
        if street.trim().is_empty() {
            return Err(InputError::EmptyStreet);
        }

        let state = state.into().trim().to_ascii_uppercase();
        if state.len() != 2 || !state.chars().all(|ch| ch.is_ascii_alphabetic()) {
            return Err(InputError::InvalidState { value: state });
        }

        Ok(Self {
            street,
            secondary: None,
            city: None,
            state,
            postal_code: None,
        })
    }

    pub fn with_secondary(mut self, secondary: impl Into<String>) -> Self {
        self.secondary = Some(secondary.into());
        self
    }

    pub fn with_city(mut self, city: impl Into<String>) -> Self {
        self.city = Some(city.into());
        self
    }

    pub fn with_postal_code(mut self, postal_code: impl Into<String>) -> Self {
        self.postal_code = Some(postal_code.into());
        self
    }
}

/// Provider-standardized address, produced only on confident validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardizedAddress {
    pub street: String,
    pub secondary: Option<String>,
    pub city: String,
    pub state: String,
    /// 5-digit ZIP code.
    pub zip5: String,
    /// 4-digit ZIP extension, when the provider could resolve one.
    pub zip4: Option<String>,
}

/// Normalized outcome of one validate operation.
///
/// `service_unavailable` distinguishes "could not ask anyone right now"
/// from "the address is invalid"; the two never mean the same thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedResult {
    pub is_valid: bool,
    pub standardized: Option<StandardizedAddress>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
    pub service_unavailable: bool,
    /// Provider that produced the answer; `None` for the synthetic
    /// exhaustion result when every provider was unavailable.
    pub provider: Option<ProviderId>,
    pub latency_ms: u64,
    pub did_fallback: bool,
    /// 0-100, higher is more certain. Internal heuristic; only the shape
    /// is guaranteed across providers.
    pub confidence: Option<u8>,
}

impl NormalizedResult {
    /// Confident rejection: the provider asserted the address is not
    /// deliverable. Not retried against other providers.
    pub fn rejected(provider: ProviderId, errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            standardized: None,
            suggestions: Vec::new(),
            errors,
            service_unavailable: false,
            provider: Some(provider),
            latency_ms: 0,
            did_fallback: false,
            confidence: None,
        }
    }

    /// Transient unavailability for one provider: triggers fallback in
    /// waterfall mode and simply does not win the race in hedged mode.
    pub fn unavailable(provider: ProviderId, message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            standardized: None,
            suggestions: Vec::new(),
            errors: vec![message.into()],
            service_unavailable: true,
            provider: Some(provider),
            latency_ms: 0,
            did_fallback: false,
            confidence: None,
        }
    }

    /// Aggregated result after every enabled provider was exhausted
    /// without a definitive answer.
    pub fn exhausted(errors: Vec<String>) -> Self {
        Self {
            is_valid: false,
            standardized: None,
            suggestions: Vec::new(),
            errors,
            service_unavailable: true,
            provider: None,
            latency_ms: 0,
            did_fallback: true,
            confidence: None,
        }
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Whether this is a definitive answer (valid or confidently
    /// rejected) as opposed to a transient failure.
    pub const fn is_definitive(&self) -> bool {
        !self.service_unavailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_requires_non_empty_street() {
        let error = ValidationInput::new("   ", "CA").expect_err("blank street should fail");
        assert_eq!(error, InputError::EmptyStreet);
    }

    #[test]
    fn input_uppercases_and_validates_state() {
        let input = ValidationInput::new("1 Infinite Loop", "ca").expect("valid input");
        assert_eq!(input.state, "CA");

        assert!(ValidationInput::new("1 Infinite Loop", "Cal").is_err());
        assert!(ValidationInput::new("1 Infinite Loop", "C1").is_err());
    }

    #[test]
    fn unavailable_result_is_not_definitive() {
        let result = NormalizedResult::unavailable(ProviderId::Usps, "timed out");
        assert!(!result.is_definitive());
        assert!(!result.is_valid);
        assert!(result.service_unavailable);
    }

    #[test]
    fn rejected_result_is_definitive() {
        let result =
            NormalizedResult::rejected(ProviderId::Smarty, vec![String::from("not found")]);
        assert!(result.is_definitive());
        assert!(!result.service_unavailable);
    }
}
