//! Smarty US street lookup adapter.
//!
//! Single-call batch-style endpoint authenticated via static `auth-id` /
//! `auth-token` query parameters. The response is an array of candidates
//! carrying delivery-point-validation analysis flags; an empty array is
//! the service's "not found" answer and maps to a confident rejection.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use tracing::warn;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::validator::{AddressValidator, ValidateFuture};
use crate::{NormalizedResult, ProviderId, StandardizedAddress, ValidationInput};

use super::{confidence_score, elapsed_ms};

const STREET_API_URL: &str = "https://us-street.api.smarty.com/street-address";

/// Static credential pair for the street API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmartyCredentials {
    pub auth_id: String,
    pub auth_token: String,
}

pub struct SmartyAdapter {
    http_client: Arc<dyn HttpClient>,
    credentials: Option<SmartyCredentials>,
}

impl SmartyAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, credentials: Option<SmartyCredentials>) -> Self {
        Self {
            http_client,
            credentials,
        }
    }

    fn lookup_url(&self, input: &ValidationInput) -> String {
        let mut url = format!(
            "{STREET_API_URL}?street={}&state={}&candidates=1&match=strict",
            urlencoding::encode(&input.street),
            urlencoding::encode(&input.state),
        );
        if let Some(secondary) = input.secondary.as_deref() {
            url.push_str(&format!("&street2={}", urlencoding::encode(secondary)));
        }
        if let Some(city) = input.city.as_deref() {
            url.push_str(&format!("&city={}", urlencoding::encode(city)));
        }
        if let Some(zip) = input.postal_code.as_deref() {
            url.push_str(&format!("&zipcode={}", urlencoding::encode(zip)));
        }
        url
    }

    async fn lookup(&self, input: &ValidationInput) -> NormalizedResult {
        let started = Instant::now();
        let Some(credentials) = &self.credentials else {
            return NormalizedResult::unavailable(
                ProviderId::Smarty,
                "smarty credentials are not configured",
            );
        };

        let auth = HttpAuth::QueryParams(vec![
            (String::from("auth-id"), credentials.auth_id.clone()),
            (String::from("auth-token"), credentials.auth_token.clone()),
        ]);
        let request = HttpRequest::get(self.lookup_url(input)).with_auth(&auth);

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "smarty transport failure");
                return NormalizedResult::unavailable(
                    ProviderId::Smarty,
                    format!("smarty transport failure: {}", error.message()),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        if response.is_auth_failure() {
            return NormalizedResult::unavailable(
                ProviderId::Smarty,
                format!("smarty authentication failed (status {})", response.status),
            )
            .with_latency(elapsed_ms(started));
        }
        if response.is_rate_limited() {
            return NormalizedResult::unavailable(
                ProviderId::Smarty,
                "smarty rate limit or quota exceeded",
            )
            .with_latency(elapsed_ms(started));
        }
        if response.status == 400 {
            return NormalizedResult::rejected(
                ProviderId::Smarty,
                vec![String::from("smarty rejected the address as malformed")],
            )
            .with_latency(elapsed_ms(started));
        }
        if !response.is_success() {
            return NormalizedResult::unavailable(
                ProviderId::Smarty,
                format!("smarty upstream returned status {}", response.status),
            )
            .with_latency(elapsed_ms(started));
        }

        let candidates: Vec<SmartyCandidate> = match serde_json::from_str(&response.body) {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(error = %error, "smarty response shape was unexpected");
                return NormalizedResult::unavailable(
                    ProviderId::Smarty,
                    format!("smarty returned an unexpected response shape: {error}"),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        self.map_candidates(input, candidates)
            .with_latency(elapsed_ms(started))
    }

    fn map_candidates(
        &self,
        input: &ValidationInput,
        candidates: Vec<SmartyCandidate>,
    ) -> NormalizedResult {
        let Some(candidate) = candidates.into_iter().next() else {
            return NormalizedResult::rejected(
                ProviderId::Smarty,
                vec![String::from("no matching address was found")],
            );
        };

        let analysis = candidate.analysis.unwrap_or_default();
        let components = candidate.components.unwrap_or_default();

        let match_code = analysis.dpv_match_code.as_deref().unwrap_or("");
        let delivery_confirmed = matches!(match_code, "Y" | "S" | "D");
        let vacant = analysis.dpv_vacant.as_deref() == Some("Y");

        let mut suggestions = Vec::new();
        let mut errors = Vec::new();

        if let Some(footnotes) = analysis.footnotes.as_deref() {
            if !footnotes.is_empty() {
                suggestions.push(format!(
                    "address components were standardized (footnotes: {footnotes})"
                ));
            }
        }
        match match_code {
            "S" => suggestions.push(String::from(
                "secondary unit information was not recognized and was ignored",
            )),
            "D" => suggestions.push(String::from(
                "address is a multi-unit building; a secondary unit number is required",
            )),
            _ => {}
        }

        if vacant {
            // Vacancy always downgrades a confirmed address.
            errors.push(String::from("address is flagged vacant"));
        }
        if !delivery_confirmed {
            errors.push(String::from("delivery point could not be confirmed"));
        }

        let is_valid = delivery_confirmed && !vacant;
        let standardized = if is_valid {
            Some(StandardizedAddress {
                street: candidate
                    .delivery_line_1
                    .unwrap_or_else(|| input.street.clone()),
                secondary: candidate.delivery_line_2.or_else(|| {
                    components.secondary_designator.as_ref().and_then(|designator| {
                        components
                            .secondary_number
                            .as_ref()
                            .map(|number| format!("{designator} {number}"))
                    })
                }),
                city: components
                    .city_name
                    .unwrap_or_else(|| input.city.clone().unwrap_or_default()),
                state: components
                    .state_abbreviation
                    .unwrap_or_else(|| input.state.clone()),
                zip5: components.zipcode.unwrap_or_default(),
                zip4: components.plus4_code.filter(|plus4| !plus4.is_empty()),
            })
        } else {
            None
        };

        let confidence = confidence_score(
            delivery_confirmed,
            standardized
                .as_ref()
                .map(|address| address.zip4.is_some())
                .unwrap_or(false),
            match_code == "Y",
            analysis.footnotes.as_deref().unwrap_or("").is_empty(),
        );

        NormalizedResult {
            is_valid,
            standardized,
            suggestions,
            errors,
            service_unavailable: false,
            provider: Some(ProviderId::Smarty),
            latency_ms: 0,
            did_fallback: false,
            confidence: Some(confidence),
        }
    }
}

impl AddressValidator for SmartyAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Smarty
    }

    fn is_enabled(&self) -> bool {
        self.credentials.is_some()
    }

    fn validate<'a>(&'a self, input: &'a ValidationInput) -> ValidateFuture<'a> {
        Box::pin(self.lookup(input))
    }
}

#[derive(Debug, Deserialize)]
struct SmartyCandidate {
    #[serde(default)]
    delivery_line_1: Option<String>,
    #[serde(default)]
    delivery_line_2: Option<String>,
    #[serde(default)]
    components: Option<SmartyComponents>,
    #[serde(default)]
    analysis: Option<SmartyAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
struct SmartyComponents {
    #[serde(default)]
    city_name: Option<String>,
    #[serde(default)]
    state_abbreviation: Option<String>,
    #[serde(default)]
    zipcode: Option<String>,
    #[serde(default)]
    plus4_code: Option<String>,
    #[serde(default)]
    secondary_number: Option<String>,
    #[serde(default)]
    secondary_designator: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SmartyAnalysis {
    #[serde(default)]
    dpv_match_code: Option<String>,
    #[serde(default)]
    dpv_vacant: Option<String>,
    #[serde(default)]
    footnotes: Option<String>,
}
