//! Google Address Validation adapter.
//!
//! Single POST endpoint authenticated with a static API key. The response
//! carries a verdict block plus, for US addresses, an optional USPS
//! delivery-point standardization payload; DPV confirmation is preferred
//! over the coarser verdict flags whenever it is present.

use std::sync::Arc;
use std::time::Instant;

use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::http_client::{HttpAuth, HttpClient, HttpRequest};
use crate::validator::{AddressValidator, ValidateFuture};
use crate::{NormalizedResult, ProviderId, StandardizedAddress, ValidationInput};

use super::{confidence_score, elapsed_ms};

const VALIDATE_URL: &str = "https://addressvalidation.googleapis.com/v1:validateAddress";

pub struct GoogleAdapter {
    http_client: Arc<dyn HttpClient>,
    api_key: Option<String>,
}

impl GoogleAdapter {
    pub fn new(http_client: Arc<dyn HttpClient>, api_key: Option<String>) -> Self {
        Self {
            http_client,
            api_key,
        }
    }

    fn request_body(input: &ValidationInput) -> String {
        let mut lines = vec![input.street.clone()];
        if let Some(secondary) = input.secondary.as_deref() {
            lines.push(secondary.to_owned());
        }

        json!({
            "address": {
                "regionCode": "US",
                "administrativeArea": input.state,
                "locality": input.city,
                "postalCode": input.postal_code,
                "addressLines": lines,
            }
        })
        .to_string()
    }

    async fn lookup(&self, input: &ValidationInput) -> NormalizedResult {
        let started = Instant::now();
        let Some(api_key) = &self.api_key else {
            return NormalizedResult::unavailable(
                ProviderId::Google,
                "google api key is not configured",
            );
        };

        let auth = HttpAuth::QueryParams(vec![(String::from("key"), api_key.clone())]);
        let request = HttpRequest::post(VALIDATE_URL)
            .with_json_body(Self::request_body(input))
            .with_auth(&auth);

        let response = match self.http_client.execute(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "google transport failure");
                return NormalizedResult::unavailable(
                    ProviderId::Google,
                    format!("google transport failure: {}", error.message()),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        if response.is_auth_failure() {
            return NormalizedResult::unavailable(
                ProviderId::Google,
                format!("google authentication failed (status {})", response.status),
            )
            .with_latency(elapsed_ms(started));
        }
        if response.is_rate_limited() {
            return NormalizedResult::unavailable(
                ProviderId::Google,
                "google rate limit or quota exceeded",
            )
            .with_latency(elapsed_ms(started));
        }
        if response.status == 400 {
            return NormalizedResult::rejected(
                ProviderId::Google,
                vec![String::from("google rejected the address as malformed")],
            )
            .with_latency(elapsed_ms(started));
        }
        if !response.is_success() {
            return NormalizedResult::unavailable(
                ProviderId::Google,
                format!("google upstream returned status {}", response.status),
            )
            .with_latency(elapsed_ms(started));
        }

        let envelope: GoogleResponse = match serde_json::from_str(&response.body) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(error = %error, "google response shape was unexpected");
                return NormalizedResult::unavailable(
                    ProviderId::Google,
                    format!("google returned an unexpected response shape: {error}"),
                )
                .with_latency(elapsed_ms(started));
            }
        };

        self.map_result(input, envelope)
            .with_latency(elapsed_ms(started))
    }

    fn map_result(&self, input: &ValidationInput, envelope: GoogleResponse) -> NormalizedResult {
        let Some(mut result) = envelope.result else {
            return NormalizedResult::rejected(
                ProviderId::Google,
                vec![String::from("no validation result was returned")],
            );
        };

        let verdict = result.verdict.take().unwrap_or_default();
        let usps = result.usps_data.take().unwrap_or_default();

        // DPV confirmation is the provider's own delivery-point signal;
        // fall back to the verdict flags when it is absent.
        let dpv = usps.dpv_confirmation.as_deref();
        let delivery_confirmed = match dpv {
            Some(code) => matches!(code, "Y" | "S" | "D"),
            None => verdict.address_complete && !verdict.has_unconfirmed_components,
        };
        let vacant = usps.dpv_vacant.as_deref() == Some("Y");

        let mut suggestions = Vec::new();
        let mut errors = Vec::new();

        if verdict.has_inferred_components {
            suggestions.push(String::from("some address components were inferred"));
        }
        if verdict.has_replaced_components {
            suggestions.push(String::from("some address components were replaced"));
        }
        if matches!(dpv, Some("D")) {
            suggestions.push(String::from(
                "address is a multi-unit building; a secondary unit number is required",
            ));
        }

        if vacant {
            errors.push(String::from("address is flagged vacant"));
        }
        if !delivery_confirmed {
            errors.push(String::from("delivery point could not be confirmed"));
        }
        if verdict.has_unconfirmed_components {
            errors.push(String::from("address contains unconfirmed components"));
        }

        let is_valid = delivery_confirmed && !vacant;
        let standardized = if is_valid {
            Some(Self::standardized_from(input, &result, &usps))
        } else {
            None
        };

        let confidence = confidence_score(
            delivery_confirmed,
            standardized
                .as_ref()
                .map(|address| address.zip4.is_some())
                .unwrap_or(false),
            matches!(dpv, Some("Y")),
            !verdict.has_unconfirmed_components,
        );

        NormalizedResult {
            is_valid,
            standardized,
            suggestions,
            errors,
            service_unavailable: false,
            provider: Some(ProviderId::Google),
            latency_ms: 0,
            did_fallback: false,
            confidence: Some(confidence),
        }
    }

    fn standardized_from(
        input: &ValidationInput,
        result: &GoogleResult,
        usps: &GoogleUspsData,
    ) -> StandardizedAddress {
        // Prefer the USPS standardization payload when present; otherwise
        // rebuild from the postal address block.
        if let Some(standardized) = &usps.standardized_address {
            return StandardizedAddress {
                street: standardized
                    .first_address_line
                    .clone()
                    .unwrap_or_else(|| input.street.clone()),
                secondary: standardized.second_address_line.clone(),
                city: standardized
                    .city
                    .clone()
                    .unwrap_or_else(|| input.city.clone().unwrap_or_default()),
                state: standardized
                    .state
                    .clone()
                    .unwrap_or_else(|| input.state.clone()),
                zip5: standardized.zip_code.clone().unwrap_or_default(),
                zip4: standardized
                    .zip_code_extension
                    .clone()
                    .filter(|zip4| !zip4.is_empty()),
            };
        }

        let postal = result
            .address
            .as_ref()
            .and_then(|address| address.postal_address.as_ref());
        let (zip5, zip4) = postal
            .and_then(|postal| postal.postal_code.as_deref())
            .map(split_zip)
            .unwrap_or_default();

        StandardizedAddress {
            street: postal
                .and_then(|postal| postal.address_lines.first().cloned())
                .unwrap_or_else(|| input.street.clone()),
            secondary: postal.and_then(|postal| postal.address_lines.get(1).cloned()),
            city: postal
                .and_then(|postal| postal.locality.clone())
                .unwrap_or_else(|| input.city.clone().unwrap_or_default()),
            state: postal
                .and_then(|postal| postal.administrative_area.clone())
                .unwrap_or_else(|| input.state.clone()),
            zip5,
            zip4,
        }
    }
}

fn split_zip(postal_code: &str) -> (String, Option<String>) {
    match postal_code.split_once('-') {
        Some((zip5, zip4)) if !zip4.is_empty() => (zip5.to_owned(), Some(zip4.to_owned())),
        _ => (postal_code.to_owned(), None),
    }
}

impl AddressValidator for GoogleAdapter {
    fn id(&self) -> ProviderId {
        ProviderId::Google
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    fn validate<'a>(&'a self, input: &'a ValidationInput) -> ValidateFuture<'a> {
        Box::pin(self.lookup(input))
    }
}

#[derive(Debug, Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    result: Option<GoogleResult>,
}

#[derive(Debug, Deserialize)]
struct GoogleResult {
    #[serde(default)]
    verdict: Option<GoogleVerdict>,
    #[serde(default)]
    address: Option<GoogleAddress>,
    #[serde(default, rename = "uspsData")]
    usps_data: Option<GoogleUspsData>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleVerdict {
    #[serde(default)]
    address_complete: bool,
    #[serde(default)]
    has_unconfirmed_components: bool,
    #[serde(default)]
    has_inferred_components: bool,
    #[serde(default)]
    has_replaced_components: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleAddress {
    #[serde(default)]
    postal_address: Option<GooglePostalAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GooglePostalAddress {
    #[serde(default)]
    administrative_area: Option<String>,
    #[serde(default)]
    locality: Option<String>,
    #[serde(default)]
    postal_code: Option<String>,
    #[serde(default)]
    address_lines: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleUspsData {
    #[serde(default)]
    dpv_confirmation: Option<String>,
    #[serde(default)]
    dpv_vacant: Option<String>,
    #[serde(default)]
    standardized_address: Option<GoogleStandardizedAddress>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GoogleStandardizedAddress {
    #[serde(default)]
    first_address_line: Option<String>,
    #[serde(default)]
    second_address_line: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    zip_code: Option<String>,
    #[serde(default)]
    zip_code_extension: Option<String>,
}
